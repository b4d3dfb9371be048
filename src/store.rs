//! Record store
//!
//! The store owns the ordered history of daily records and its persisted
//! JSON representation. It is mutated only by appending new trailing days,
//! editing one record, or reordering fields per schema. Exactly one process
//! is expected to write the file at a time; concurrent writers race and the
//! last save wins.

use crate::error::{FieldError, JournalError, JournalResult};
use crate::schema::{FieldSpec, Schema, DATE_KEY};
use crate::types::{AppendOutcome, Record, RecordPatch};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Reply from a value source for one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Raw input to be parsed per the field kind
    Raw(String),
    /// Leave the field out of the record
    Skip,
}

/// Supplies field values for days being appended.
///
/// `rejected` carries the reason the previous answer for the same field was
/// refused; the source is asked again until it gives a valid value or skips.
pub trait ValueSource {
    fn ask(
        &mut self,
        date: NaiveDate,
        field: &FieldSpec,
        rejected: Option<&FieldError>,
    ) -> JournalResult<Answer>;
}

impl<F> ValueSource for F
where
    F: FnMut(NaiveDate, &FieldSpec, Option<&FieldError>) -> JournalResult<Answer>,
{
    fn ask(
        &mut self,
        date: NaiveDate,
        field: &FieldSpec,
        rejected: Option<&FieldError>,
    ) -> JournalResult<Answer> {
        self(date, field, rejected)
    }
}

/// Turns the current record into a patch (editor, form, API...)
pub trait RecordEditor {
    fn edit(&mut self, current: &Record) -> JournalResult<RecordPatch>;
}

impl<F> RecordEditor for F
where
    F: FnMut(&Record) -> JournalResult<RecordPatch>,
{
    fn edit(&mut self, current: &Record) -> JournalResult<RecordPatch> {
        self(current)
    }
}

/// Problem found by [`Store::validate`]
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub date: NaiveDate,
    pub field: String,
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    /// Stored value fails the field's type or range check
    Invalid(FieldError),
    /// Derived value disagrees with its source
    StaleDerived,
    /// Key not declared in the schema (kept, not interpreted)
    Unknown,
}

/// Ordered, date-unique sequence of records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
    records: Vec<Record>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store, checking that dates are strictly increasing
    pub fn from_records(records: Vec<Record>) -> JournalResult<Self> {
        for (position, pair) in records.windows(2).enumerate() {
            if pair[1].date <= pair[0].date {
                return Err(JournalError::CorruptStore(format!(
                    "record {}: date {} does not follow {}",
                    position + 1,
                    pair[1].date,
                    pair[0].date
                )));
            }
        }
        Ok(Self { records })
    }

    /// Parse the persisted JSON document
    pub fn from_json_value(value: Value) -> JournalResult<Self> {
        let Value::Array(items) = value else {
            return Err(JournalError::CorruptStore(
                "top level is not an array of records".to_string(),
            ));
        };
        let records = items
            .into_iter()
            .enumerate()
            .map(|(position, item)| Record::from_json(position, item))
            .collect::<JournalResult<Vec<_>>>()?;
        Self::from_records(records)
    }

    /// Read the raw persisted document; `None` when the file does not exist
    pub fn load_value(path: &Path) -> JournalResult<Option<Value>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Err(JournalError::CorruptStore(format!(
                "{} is empty",
                path.display()
            )));
        }
        let value = serde_json::from_str(&content).map_err(|e| {
            JournalError::CorruptStore(format!("{}: {}", path.display(), e))
        })?;
        Ok(Some(value))
    }

    /// Load a store; a missing file is an empty store
    pub fn load(path: &Path) -> JournalResult<Self> {
        match Self::load_value(path)? {
            Some(value) => {
                let store = Self::from_json_value(value)?;
                tracing::debug!(
                    path = %path.display(),
                    records = store.len(),
                    "loaded store"
                );
                Ok(store)
            }
            None => {
                tracing::info!(path = %path.display(), "no store yet, starting empty");
                Ok(Self::new())
            }
        }
    }

    /// Persisted representation: a JSON array, four-space indent, `date` first
    pub fn to_pretty_json(&self) -> JournalResult<Vec<u8>> {
        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.records.serialize(&mut serializer)?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Write the store next to `path` and atomically move it into place
    pub fn save(&self, path: &Path) -> JournalResult<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&self.to_pretty_json()?)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        tracing::info!(path = %path.display(), records = self.len(), "saved store");
        Ok(())
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    /// Record for an exact date
    pub fn get(&self, date: NaiveDate) -> Option<&Record> {
        self.position(date).map(|i| &self.records[i])
    }

    /// Position of the record for an exact date
    pub fn position(&self, date: NaiveDate) -> Option<usize> {
        self.records.binary_search_by_key(&date, |r| r.date).ok()
    }

    /// Append a record after the current last date
    pub fn append(&mut self, record: Record) -> JournalResult<()> {
        if let Some(last) = self.last_date() {
            if record.date <= last {
                return Err(JournalError::InvalidDateRange(format!(
                    "cannot append {} at or before last date {}",
                    record.date, last
                )));
            }
        }
        self.records.push(record);
        Ok(())
    }

    /// Collect and append one record per missing day before `upper`.
    ///
    /// `upper` is exclusive: it is the first date not yet due. Days run from
    /// the day after the last record, or from `upper - 1` on an empty store.
    /// Each active hand-entered field is asked of `source` in schema order,
    /// derived fields are computed, and the record is appended. Either all
    /// missing days are appended or, if the source fails, none are.
    pub fn append_missing_days<S: ValueSource + ?Sized>(
        &mut self,
        schema: &Schema,
        upper: NaiveDate,
        source: &mut S,
    ) -> JournalResult<AppendOutcome> {
        let start = match self.last_date() {
            Some(last) if upper < last => {
                return Err(JournalError::InvalidDateRange(format!(
                    "upper bound {} precedes last recorded date {}",
                    upper, last
                )))
            }
            Some(last) => last.checked_add_days(Days::new(1)),
            None => upper.checked_sub_days(Days::new(1)),
        }
        .ok_or_else(|| JournalError::InvalidDateRange(format!("no day before {}", upper)))?;

        if start >= upper {
            tracing::info!(last = ?self.last_date(), "store already up to date");
            return Ok(AppendOutcome::UpToDate);
        }

        let mut pending = Vec::new();
        let mut day = start;
        while day < upper {
            pending.push(collect_record(schema, day, source)?);
            day = day
                .succ_opt()
                .ok_or_else(|| JournalError::InvalidDateRange(format!("no day after {}", day)))?;
        }

        let dates: Vec<NaiveDate> = pending.iter().map(|r| r.date).collect();
        self.records.extend(pending);
        tracing::info!(appended = dates.len(), "appended missing days");
        Ok(AppendOutcome::Appended(dates))
    }

    /// Apply `patch` to the record at `date` and re-derive implicit fields.
    ///
    /// Patched values must name declared fields and pass their checks; values
    /// for derived fields are ignored since they are recomputed.
    pub fn edit_record(
        &mut self,
        schema: &Schema,
        date: NaiveDate,
        patch: &RecordPatch,
    ) -> JournalResult<&Record> {
        let position = self
            .position(date)
            .ok_or(JournalError::DateNotFound(date))?;

        for (key, value) in &patch.set {
            if key == DATE_KEY {
                return Err(JournalError::UnknownField(key.clone()));
            }
            let spec = schema.resolve(key)?;
            if spec.is_derived() {
                continue;
            }
            spec.validate(value)
                .map_err(|source| JournalError::InvalidValue {
                    field: key.clone(),
                    source,
                })?;
        }

        let current = &self.records[position];
        let mut fields = current.fields.clone();
        for key in &patch.remove {
            fields.shift_remove(key);
        }
        for (key, value) in &patch.set {
            if schema.get(key).is_some_and(|spec| spec.is_derived()) {
                tracing::debug!(field = %key, "ignoring patched value for derived field");
                continue;
            }
            fields.insert(key.clone(), value.clone());
        }
        schema.apply_derivations(&mut fields);

        let edited = reorder_record(schema, &Record { date, fields });
        tracing::info!(%date, set = patch.set.len(), removed = patch.remove.len(), "edited record");
        self.records[position] = edited;
        Ok(&self.records[position])
    }

    /// Hand the record at `date` to `editor` and apply the patch it returns
    pub fn edit_with<E: RecordEditor + ?Sized>(
        &mut self,
        schema: &Schema,
        date: NaiveDate,
        editor: &mut E,
    ) -> JournalResult<&Record> {
        let current = self.get(date).ok_or(JournalError::DateNotFound(date))?;
        let patch = editor.edit(current)?;
        self.edit_record(schema, date, &patch)
    }

    /// Copy of the store with every record's fields in schema order; keys
    /// the schema does not know follow in their stored order
    pub fn reorder(&self, schema: &Schema) -> Store {
        Store {
            records: self
                .records
                .iter()
                .map(|record| reorder_record(schema, record))
                .collect(),
        }
    }

    /// Check every stored value against the schema without changing anything
    pub fn validate(&self, schema: &Schema) -> Vec<Violation> {
        let mut violations = Vec::new();
        for record in &self.records {
            for (key, value) in &record.fields {
                let kind = match schema.get(key) {
                    None => Some(ViolationKind::Unknown),
                    Some(spec) => match spec.validate(value) {
                        Err(e) => Some(ViolationKind::Invalid(e)),
                        Ok(()) => spec
                            .derive
                            .as_ref()
                            .filter(|rule| {
                                Some(rule.evaluate(record.get(&rule.source))) != value.as_bool()
                            })
                            .map(|_| ViolationKind::StaleDerived),
                    },
                };
                if let Some(kind) = kind {
                    violations.push(Violation {
                        date: record.date,
                        field: key.clone(),
                        kind,
                    });
                }
            }
        }
        violations
    }
}

fn collect_record<S: ValueSource + ?Sized>(
    schema: &Schema,
    date: NaiveDate,
    source: &mut S,
) -> JournalResult<Record> {
    let mut fields = Map::new();
    for spec in schema.explicit_fields() {
        let mut rejected: Option<FieldError> = None;
        loop {
            match source.ask(date, spec, rejected.as_ref())? {
                Answer::Skip => break,
                Answer::Raw(raw) => match spec.parse_input(&raw) {
                    Ok(value) => {
                        fields.insert(spec.name.clone(), value);
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%date, field = %spec.name, error = %e, "rejected value");
                        rejected = Some(e);
                    }
                },
            }
        }
    }
    schema.apply_derivations(&mut fields);
    Ok(reorder_record(schema, &Record { date, fields }))
}

/// Schema fields in declaration order, then unknown keys in stored order
pub fn reorder_record(schema: &Schema, record: &Record) -> Record {
    let mut fields = Map::with_capacity(record.fields.len());
    for spec in schema.fields() {
        if let Some(value) = record.fields.get(&spec.name) {
            fields.insert(spec.name.clone(), value.clone());
        }
    }
    for (key, value) in &record.fields {
        if !schema.contains(key) {
            fields.insert(key.clone(), value.clone());
        }
    }
    Record {
        date: record.date,
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, journal_schema, store_of};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn keys(record: &Record) -> Vec<&str> {
        record.fields.keys().map(|k| k.as_str()).collect()
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::load(&dir.path().join("calendar.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar.json");

        for content in [
            "",
            "{\"date\": \"2024-01-01\"}",
            "[{\"date\": \"2024-01-01\"},",
            "[{\"date\": \"2024-01-02\"}, {\"date\": \"2024-01-01\"}]",
            "[{\"date\": \"2024-01-02\"}, {\"date\": \"2024-01-02\"}]",
            "[{\"sat\": 5}]",
        ] {
            std::fs::write(&path, content).unwrap();
            assert!(
                matches!(Store::load(&path), Err(JournalError::CorruptStore(_))),
                "accepted {:?}",
                content
            );
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar.json");
        let store = store_of(vec![
            ("2024-01-01", json!({"sat": 7, "text": "café con leche", "legacy": 1})),
            ("2024-01-03", json!({"sat": 4})),
        ]);

        store.save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("café"));
        assert!(text.starts_with("[\n    {\n        \"date\": \"2024-01-01\""));

        let loaded = Store::load(&path).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(keys(&loaded.records()[0]), vec!["sat", "text", "legacy"]);
    }

    #[test]
    fn test_append_on_empty_store() {
        let schema = journal_schema();
        let mut store = Store::new();
        let mut source = |_: NaiveDate, field: &FieldSpec, _: Option<&FieldError>| -> JournalResult<Answer> {
            Ok(match field.name.as_str() {
                "sat" => Answer::Raw("6".to_string()),
                "text" => Answer::Raw("PAIN in the knee".to_string()),
                _ => Answer::Skip,
            })
        };

        let outcome = store
            .append_missing_days(&schema, date("2024-01-03"), &mut source)
            .unwrap();
        assert_eq!(outcome, AppendOutcome::Appended(vec![date("2024-01-02")]));

        let record = &store.records()[0];
        assert_eq!(keys(record), vec!["sat", "text", "pain"]);
        assert_eq!(record.get("pain"), Some(&json!(true)));
    }

    #[test]
    fn test_append_fills_gap_and_retries_invalid() {
        let schema = journal_schema();
        let mut store = store_of(vec![("2024-01-01", json!({"sat": 5}))]);
        let mut rejections = Vec::new();
        let mut source = |_: NaiveDate,
                          field: &FieldSpec,
                          rejected: Option<&FieldError>|
         -> JournalResult<Answer> {
            if let Some(e) = rejected {
                rejections.push(e.clone());
                return Ok(Answer::Raw("8".to_string()));
            }
            Ok(match field.name.as_str() {
                "sat" => Answer::Raw("12".to_string()),
                _ => Answer::Skip,
            })
        };

        let outcome = store
            .append_missing_days(&schema, date("2024-01-04"), &mut source)
            .unwrap();
        assert_eq!(
            outcome,
            AppendOutcome::Appended(vec![date("2024-01-02"), date("2024-01-03")])
        );
        assert_eq!(rejections.len(), 2);
        assert!(matches!(rejections[0], FieldError::OutOfRange { .. }));
        assert_eq!(store.records()[2].get("sat"), Some(&json!(8)));
        assert_eq!(store.records()[2].get("pain"), Some(&json!(false)));
    }

    #[test]
    fn test_append_up_to_date_and_invalid_bound() {
        let schema = journal_schema();
        let mut store = store_of(vec![("2024-01-05", json!({"sat": 5}))]);
        let mut never = |_: NaiveDate, _: &FieldSpec, _: Option<&FieldError>| -> JournalResult<Answer> {
            panic!("no value should be requested")
        };

        assert_eq!(
            store
                .append_missing_days(&schema, date("2024-01-06"), &mut never)
                .unwrap(),
            AppendOutcome::UpToDate
        );
        assert!(matches!(
            store.append_missing_days(&schema, date("2024-01-01"), &mut never),
            Err(JournalError::InvalidDateRange(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_append_is_all_or_nothing() {
        let schema = journal_schema();
        let mut store = store_of(vec![("2024-01-01", json!({"sat": 5}))]);
        let mut calls = 0;
        let mut source = |_: NaiveDate, _: &FieldSpec, _: Option<&FieldError>| -> JournalResult<Answer> {
            calls += 1;
            if calls > 4 {
                Err(JournalError::Input("end of input".to_string()))
            } else {
                Ok(Answer::Skip)
            }
        };
        assert!(store
            .append_missing_days(&schema, date("2024-01-05"), &mut source)
            .is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_edit_rederives() {
        let schema = journal_schema();
        let mut store = store_of(vec![(
            "2024-01-01",
            json!({"sat": 5, "text": "quiet day", "pain": false}),
        )]);

        let patch = RecordPatch::new().set("text", json!("PAIN after run"));
        store
            .edit_record(&schema, date("2024-01-01"), &patch)
            .unwrap();
        assert_eq!(
            store.get(date("2024-01-01")).unwrap().get("pain"),
            Some(&json!(true))
        );

        let patch = RecordPatch::new().remove("text").set("pain", json!(true));
        let record = store
            .edit_record(&schema, date("2024-01-01"), &patch)
            .unwrap();
        assert_eq!(record.get("pain"), Some(&json!(false)));
        assert_eq!(keys(record), vec!["sat", "pain"]);
    }

    #[test]
    fn test_edit_errors() {
        let schema = journal_schema();
        let mut store = store_of(vec![("2024-01-01", json!({"sat": 5}))]);

        assert!(matches!(
            store.edit_record(&schema, date("2024-01-02"), &RecordPatch::new()),
            Err(JournalError::DateNotFound(_))
        ));
        assert!(matches!(
            store.edit_record(&schema, date("2024-01-01"), &RecordPatch::new().set("mood", json!(3))),
            Err(JournalError::UnknownField(_))
        ));
        assert!(matches!(
            store.edit_record(&schema, date("2024-01-01"), &RecordPatch::new().set("sat", json!(11))),
            Err(JournalError::InvalidValue { .. })
        ));
        assert_eq!(store.records()[0].get("sat"), Some(&json!(5)));
    }

    #[test]
    fn test_edit_with_callback() {
        let schema = journal_schema();
        let mut store = store_of(vec![("2024-01-01", json!({"sat": 5}))]);
        let mut editor = |current: &Record| -> JournalResult<RecordPatch> {
            let sat = current.get("sat").and_then(Value::as_i64).unwrap_or(0);
            Ok(RecordPatch::new().set("sat", json!(sat + 1)))
        };
        let record = store
            .edit_with(&schema, date("2024-01-01"), &mut editor)
            .unwrap();
        assert_eq!(record.get("sat"), Some(&json!(6)));
    }

    #[test]
    fn test_reorder_keeps_unknown_keys_last() {
        let schema = journal_schema();
        let store = store_of(vec![(
            "2024-01-01",
            json!({"zeta": 1, "text": "x", "sat": 3, "alpha": 2, "body": 1}),
        )]);
        let reordered = store.reorder(&schema);
        assert_eq!(
            keys(&reordered.records()[0]),
            vec!["sat", "text", "body", "zeta", "alpha"]
        );
        assert_eq!(reordered.reorder(&schema), reordered);
    }

    #[test]
    fn test_validate_reports_problems() {
        let schema = journal_schema();
        let store = store_of(vec![(
            "2024-01-01",
            json!({"sat": 14, "text": "PAIN", "pain": false, "mystery": 1}),
        )]);
        let kinds: Vec<_> = store
            .validate(&schema)
            .into_iter()
            .map(|v| (v.field, v.kind))
            .collect();
        assert_eq!(kinds.len(), 3);
        assert!(matches!(kinds[0], (ref f, ViolationKind::Invalid(_)) if f == "sat"));
        assert_eq!(kinds[1], ("pain".to_string(), ViolationKind::StaleDerived));
        assert_eq!(kinds[2], ("mystery".to_string(), ViolationKind::Unknown));
    }

    fn arb_record_fields() -> impl Strategy<Value = Vec<(String, i64)>> {
        let names = prop::sample::select(vec![
            "sat", "fz", "text", "pain", "body", "zeta", "alpha", "food", "extra",
        ]);
        prop::collection::vec((names.prop_map(str::to_string), 0i64..3), 0..8)
    }

    proptest! {
        #[test]
        fn test_reorder_idempotent(rows in prop::collection::vec(arb_record_fields(), 0..6)) {
            let schema = journal_schema();
            let records: Vec<Record> = rows
                .into_iter()
                .enumerate()
                .map(|(i, fields)| {
                    let mut record = Record::new(date("2024-01-01") + Days::new(i as u64));
                    for (k, v) in fields {
                        record.fields.insert(k, json!(v));
                    }
                    record
                })
                .collect();
            let store = Store::from_records(records).unwrap();
            let once = store.reorder(&schema);
            prop_assert_eq!(once.reorder(&schema), once.clone());
            for (a, b) in store.records().iter().zip(once.records()) {
                prop_assert_eq!(a.fields.len(), b.fields.len());
                for (k, v) in &a.fields {
                    prop_assert_eq!(b.fields.get(k), Some(v));
                }
            }
        }
    }
}
