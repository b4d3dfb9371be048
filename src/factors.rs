//! Binary factor matrices
//!
//! A factor is something that did or did not happen on a day: a keyword in
//! the free text, or one item of a comma-separated list field such as meals.
//! The matrix holds one 0/1 indicator per factor per record and feeds
//! [`crate::stats::lagged_correlate`].

use crate::error::{JournalError, JournalResult};
use crate::index::IndexRange;
use crate::schema::FieldSpec;
use crate::store::Store;
use crate::types::Record;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Separator between items of list-valued text fields
pub const LIST_SEPARATOR: &str = ", ";

/// Indicator matrix: `values[factor][day]` is 1.0 when the factor occurred
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FactorMatrix {
    pub names: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Vec<f64>>,
}

fn require_text(field: &FieldSpec) -> JournalResult<()> {
    if field.is_text() {
        Ok(())
    } else {
        Err(JournalError::FieldKindMismatch {
            field: field.name.clone(),
            expected: "text",
            actual: field.kind.as_str(),
        })
    }
}

fn records_in<'a>(store: &'a Store, range: IndexRange) -> JournalResult<&'a [Record]> {
    range.check(store.len())?;
    Ok(&store.records()[range.first..=range.last])
}

fn text_of<'a>(record: &'a Record, field: &FieldSpec) -> &'a str {
    record
        .get(&field.name)
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn items<'a>(text: &'a str, separator: &'a str) -> impl Iterator<Item = &'a str> {
    text.split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

impl FactorMatrix {
    /// Number of factors
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Days on which each factor occurred
    pub fn counts(&self) -> Vec<usize> {
        self.values
            .iter()
            .map(|row| row.iter().filter(|&&v| v > 0.0).count())
            .collect()
    }

    /// One factor per keyword, set where the keyword occurs in `text_field`
    pub fn from_keywords(
        store: &Store,
        text_field: &FieldSpec,
        keywords: &[String],
        range: IndexRange,
    ) -> JournalResult<Self> {
        require_text(text_field)?;
        let records = records_in(store, range)?;

        let values = keywords
            .iter()
            .map(|keyword| {
                records
                    .iter()
                    .map(|r| f64::from(u8::from(text_of(r, text_field).contains(keyword.as_str()))))
                    .collect()
            })
            .collect();
        Ok(Self {
            names: keywords.to_vec(),
            dates: records.iter().map(|r| r.date).collect(),
            values,
        })
    }

    /// One factor per distinct item of a list-valued text field.
    ///
    /// Factors are ordered by how many days they occur on, most frequent
    /// first, ties in order of first appearance. Items seen on fewer than
    /// `min_count` days are left out.
    pub fn from_list_field(
        store: &Store,
        field: &FieldSpec,
        separator: &str,
        range: IndexRange,
        min_count: usize,
    ) -> JournalResult<Self> {
        require_text(field)?;
        let records = records_in(store, range)?;

        let mut names: Vec<String> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        let mut slots: HashMap<&str, usize> = HashMap::new();
        for record in records {
            let mut seen_today = Vec::new();
            for item in items(text_of(record, field), separator) {
                let slot = *slots.entry(item).or_insert_with(|| {
                    names.push(item.to_string());
                    counts.push(0);
                    names.len() - 1
                });
                if !seen_today.contains(&slot) {
                    seen_today.push(slot);
                    counts[slot] += 1;
                }
            }
        }

        let mut order: Vec<usize> = (0..names.len())
            .filter(|&slot| counts[slot] >= min_count)
            .collect();
        order.sort_by(|a, b| counts[*b].cmp(&counts[*a]));

        let per_day: Vec<Vec<&str>> = records
            .iter()
            .map(|r| items(text_of(r, field), separator).collect())
            .collect();
        let values = order
            .iter()
            .map(|&slot| {
                per_day
                    .iter()
                    .map(|day| f64::from(u8::from(day.contains(&names[slot].as_str()))))
                    .collect()
            })
            .collect();

        tracing::debug!(
            field = %field.name,
            distinct = names.len(),
            kept = order.len(),
            "built list factor matrix"
        );
        Ok(Self {
            names: order.iter().map(|&slot| names[slot].clone()).collect(),
            dates: records.iter().map(|r| r.date).collect(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{daily_store, date, journal_schema};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn meals() -> Store {
        daily_store(
            "2024-01-01",
            vec![
                json!({"food": "bread, cheese"}),
                json!({"food": "rice, cheese, cheese"}),
                json!({}),
                json!({"food": "bread, apple, "}),
                json!({"food": "cheese"}),
            ],
        )
    }

    #[test]
    fn test_list_field_orders_by_frequency() {
        let schema = journal_schema();
        let store = meals();
        let matrix = FactorMatrix::from_list_field(
            &store,
            schema.resolve("food").unwrap(),
            LIST_SEPARATOR,
            IndexRange::all(&store).unwrap(),
            1,
        )
        .unwrap();

        assert_eq!(matrix.names, vec!["cheese", "bread", "rice", "apple"]);
        assert_eq!(matrix.counts(), vec![3, 2, 1, 1]);
        assert_eq!(matrix.values[0], vec![1.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(matrix.dates.len(), 5);
        assert_eq!(matrix.dates[2], date("2024-01-03"));
    }

    #[test]
    fn test_list_field_min_count() {
        let schema = journal_schema();
        let store = meals();
        let matrix = FactorMatrix::from_list_field(
            &store,
            schema.resolve("food").unwrap(),
            LIST_SEPARATOR,
            IndexRange::new(1, 4).unwrap(),
            2,
        )
        .unwrap();
        assert_eq!(matrix.names, vec!["cheese"]);
        assert_eq!(matrix.values, vec![vec![1.0, 0.0, 0.0, 1.0]]);
    }

    #[test]
    fn test_keywords() {
        let schema = journal_schema();
        let store = daily_store(
            "2024-01-01",
            vec![json!({"text": "PAIN and coffee"}), json!({"text": "tea"}), json!({})],
        );
        let matrix = FactorMatrix::from_keywords(
            &store,
            schema.resolve("text").unwrap(),
            &["coffee".to_string(), "tea".to_string()],
            IndexRange::all(&store).unwrap(),
        )
        .unwrap();
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.values, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
    }

    #[test]
    fn test_requires_text_field() {
        let schema = journal_schema();
        let store = meals();
        assert!(matches!(
            FactorMatrix::from_keywords(
                &store,
                schema.resolve("sat").unwrap(),
                &[],
                IndexRange::all(&store).unwrap()
            ),
            Err(JournalError::FieldKindMismatch { .. })
        ));
    }
}
