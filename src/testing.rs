//! Shared fixtures for unit tests

use crate::schema::{FieldSpec, Schema};
use crate::store::Store;
use crate::types::Record;
use chrono::NaiveDate;
use serde_json::Value;

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// A small journal layout: two scores, free text, one keyword flag and two
/// historical fields.
pub fn journal_schema() -> Schema {
    Schema::new(vec![
        FieldSpec::numeric("sat", 0.0, 10.0),
        FieldSpec::numeric("fz", 0.0, 10.0),
        FieldSpec::boolean("exercise"),
        FieldSpec::text("text"),
        FieldSpec::derived("pain", "text", "PAIN"),
        FieldSpec::numeric("body", 0.0, 2.0).inactive(),
        FieldSpec::text("food").inactive(),
    ])
    .unwrap()
}

/// Store from `(date, object)` pairs; dates must be increasing
pub fn store_of(records: Vec<(&str, Value)>) -> Store {
    let records = records
        .into_iter()
        .map(|(d, value)| {
            let Value::Object(fields) = value else {
                panic!("fixture record for {} is not an object", d);
            };
            Record {
                date: date(d),
                fields,
            }
        })
        .collect();
    Store::from_records(records).unwrap()
}

/// Store with one record per consecutive day starting at `start`
pub fn daily_store(start: &str, records: Vec<Value>) -> Store {
    let first = date(start);
    let records = records
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            let Value::Object(fields) = value else {
                panic!("fixture record {} is not an object", i);
            };
            Record {
                date: first + chrono::Days::new(i as u64),
                fields,
            }
        })
        .collect();
    Store::from_records(records).unwrap()
}
