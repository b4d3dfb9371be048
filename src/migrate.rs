//! Legacy store migration
//!
//! Older journals used other field names (`fecha`, `nota`, `texto`...) and
//! negative numbers or empty strings as "no answer" placeholders. A
//! [`Migration`] rewrites the raw JSON document once, before it is parsed as
//! a [`crate::store::Store`].

use crate::error::{JournalError, JournalResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key rename applied to every record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

/// Make `text` carry `keyword` wherever the legacy boolean `flag` is set, so
/// re-deriving the flag from the text preserves it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordBackfill {
    pub flag: String,
    pub text: String,
    pub keyword: String,
}

/// One-off rewrite of a legacy document.
///
/// Cleanup runs against the legacy key names, then renames, then keyword
/// backfill against the new names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    #[serde(default)]
    pub renames: Vec<Rename>,
    /// Numeric keys whose negative values mean "not answered"
    #[serde(default)]
    pub drop_negative: Vec<String>,
    /// Text keys whose empty values mean "not answered"
    #[serde(default)]
    pub drop_empty: Vec<String>,
    #[serde(default)]
    pub backfill_keyword: Vec<KeywordBackfill>,
}

/// What a migration changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub records: usize,
    pub renamed: usize,
    pub dropped_negative: usize,
    pub dropped_empty: usize,
    pub backfilled: usize,
}

impl MigrationReport {
    pub fn changed(&self) -> bool {
        self.renamed + self.dropped_negative + self.dropped_empty + self.backfilled > 0
    }
}

fn rename(from: &str, to: &str) -> Rename {
    Rename {
        from: from.to_string(),
        to: to.to_string(),
    }
}

impl Migration {
    /// Mapping from the Spanish-keyed journal format
    pub fn legacy() -> Self {
        Self {
            renames: vec![
                rename("fecha", "date"),
                rename("nota", "sat"),
                rename("texto", "text"),
                rename("food", "nourr"),
            ],
            drop_negative: ["body", "mind", "no-p", "exp", "nota"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            drop_empty: vec!["texto".to_string()],
            backfill_keyword: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
            && self.drop_negative.is_empty()
            && self.drop_empty.is_empty()
            && self.backfill_keyword.is_empty()
    }

    /// Rewrite every record of a raw store document in place
    pub fn apply(&self, document: &mut Value) -> JournalResult<MigrationReport> {
        let Value::Array(records) = document else {
            return Err(JournalError::CorruptStore(
                "top level is not an array of records".to_string(),
            ));
        };
        let mut report = MigrationReport::default();
        for (position, record) in records.iter_mut().enumerate() {
            let Value::Object(fields) = record else {
                return Err(JournalError::CorruptStore(format!(
                    "record {} is not an object",
                    position
                )));
            };
            self.apply_record(fields, &mut report);
            report.records += 1;
        }
        tracing::info!(
            records = report.records,
            renamed = report.renamed,
            dropped_negative = report.dropped_negative,
            dropped_empty = report.dropped_empty,
            backfilled = report.backfilled,
            "applied migration"
        );
        Ok(report)
    }

    fn apply_record(&self, fields: &mut Map<String, Value>, report: &mut MigrationReport) {
        for key in &self.drop_negative {
            if fields
                .get(key)
                .and_then(Value::as_f64)
                .is_some_and(|v| v < 0.0)
            {
                fields.shift_remove(key);
                report.dropped_negative += 1;
            }
        }
        for key in &self.drop_empty {
            if fields.get(key).and_then(Value::as_str) == Some("") {
                fields.shift_remove(key);
                report.dropped_empty += 1;
            }
        }

        if self
            .renames
            .iter()
            .any(|r| r.from != r.to && fields.contains_key(&r.from))
        {
            let mut renamed = Map::with_capacity(fields.len());
            for (key, value) in std::mem::take(fields) {
                let key = match self.renames.iter().find(|r| r.from == key) {
                    Some(r) if r.to != key => {
                        report.renamed += 1;
                        r.to.clone()
                    }
                    _ => key,
                };
                renamed.insert(key, value);
            }
            *fields = renamed;
        }

        for rule in &self.backfill_keyword {
            if fields.get(&rule.flag) != Some(&Value::Bool(true)) {
                continue;
            }
            let text = match fields.get(&rule.text).and_then(Value::as_str) {
                Some(text) if text.contains(&rule.keyword) => continue,
                Some(text) => format!("{}, {}", rule.keyword, text),
                None => rule.keyword.clone(),
            };
            fields.insert(rule.text.clone(), Value::String(text));
            report.backfilled += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_legacy_migration() {
        let mut document = json!([
            {"fecha": "2015-03-01", "nota": 6.5, "body": -1, "mind": 1, "texto": "", "food": "pan"},
            {"fecha": "2015-03-02", "nota": -1, "texto": "buen día"}
        ]);
        let report = Migration::legacy().apply(&mut document).unwrap();

        assert_eq!(
            document,
            json!([
                {"date": "2015-03-01", "sat": 6.5, "mind": 1, "nourr": "pan"},
                {"date": "2015-03-02", "text": "buen día"}
            ])
        );
        let keys: Vec<&String> = document[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["date", "sat", "mind", "nourr"]);
        assert_eq!(report.records, 2);
        assert_eq!(report.dropped_negative, 2);
        assert_eq!(report.dropped_empty, 1);
        assert_eq!(report.renamed, 5);
        assert!(report.changed());

        let store = Store::from_json_value(document).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_keyword_backfill() {
        let migration = Migration {
            backfill_keyword: vec![KeywordBackfill {
                flag: "pain".to_string(),
                text: "text".to_string(),
                keyword: "PAIN".to_string(),
            }],
            ..Migration::default()
        };
        let mut document = json!([
            {"date": "2020-01-01", "pain": true, "text": "tired"},
            {"date": "2020-01-02", "pain": true},
            {"date": "2020-01-03", "pain": true, "text": "PAIN again"},
            {"date": "2020-01-04", "pain": false, "text": "fine"}
        ]);
        let report = migration.apply(&mut document).unwrap();
        assert_eq!(report.backfilled, 2);
        assert_eq!(document[0]["text"], json!("PAIN, tired"));
        assert_eq!(document[1]["text"], json!("PAIN"));
        assert_eq!(document[2]["text"], json!("PAIN again"));
        assert_eq!(document[3]["text"], json!("fine"));
    }

    #[test]
    fn test_migration_rejects_non_array() {
        let mut document = json!({"fecha": "2015-03-01"});
        assert!(matches!(
            Migration::legacy().apply(&mut document),
            Err(JournalError::CorruptStore(_))
        ));
    }

    #[test]
    fn test_migration_from_toml() {
        let migration: Migration = toml::from_str(
            r#"
drop_negative = ["body"]
[[renames]]
from = "fecha"
to = "date"
"#,
        )
        .unwrap();
        assert_eq!(migration.renames, vec![rename("fecha", "date")]);
        assert!(migration.drop_empty.is_empty());
        assert!(!migration.is_empty());
    }
}
