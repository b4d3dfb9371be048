//! Core types for Daylog
//!
//! This module defines the data that flows between the store and the analysis
//! layer: daily records, edit patches, derived series, periods and the result
//! shapes handed to rendering sinks.

use crate::error::{JournalError, JournalResult};
use crate::schema::DATE_KEY;
use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Date format of the persisted `date` key
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One day of self-reported data
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub date: NaiveDate,
    /// Field values in their stored order; unknown keys are kept verbatim
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            fields: Map::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Build a record from one persisted JSON object.
    ///
    /// `position` is the record's index in the persisted array and only
    /// appears in error messages.
    pub fn from_json(position: usize, value: Value) -> JournalResult<Self> {
        let Value::Object(mut fields) = value else {
            return Err(JournalError::CorruptStore(format!(
                "record {} is not an object",
                position
            )));
        };
        let date = match fields.shift_remove(DATE_KEY) {
            Some(Value::String(s)) => NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| {
                JournalError::CorruptStore(format!("record {}: bad date {:?}: {}", position, s, e))
            })?,
            Some(other) => {
                return Err(JournalError::CorruptStore(format!(
                    "record {}: date is not a string: {}",
                    position, other
                )))
            }
            None => {
                return Err(JournalError::CorruptStore(format!(
                    "record {} has no date",
                    position
                )))
            }
        };
        Ok(Self { date, fields })
    }

    /// Persisted JSON object, `date` first
    pub fn to_json(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert(
            DATE_KEY.to_string(),
            Value::String(self.date.format(DATE_FORMAT).to_string()),
        );
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry(DATE_KEY, &self.date.format(DATE_FORMAT).to_string())?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Changes applied to one record by an edit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    /// Values to insert or replace
    #[serde(default)]
    pub set: Map<String, Value>,
    /// Keys to delete
    #[serde(default)]
    pub remove: Vec<String>,
}

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set.insert(field.into(), value);
        self
    }

    pub fn remove(mut self, field: impl Into<String>) -> Self {
        self.remove.push(field.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

/// Result of `append_missing_days`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "dates", rename_all = "snake_case")]
pub enum AppendOutcome {
    /// The store already reaches the upper bound
    UpToDate,
    /// Dates appended, in order
    Appended(Vec<NaiveDate>),
}

/// One sample of a series; `None` marks a missing value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

impl SeriesPoint {
    pub fn new(date: NaiveDate, value: Option<f64>) -> Self {
        Self { date, value }
    }
}

/// Date-aligned sequence of values derived from the store.
///
/// Series read from the store have strictly increasing dates. Calendar
/// transforms only rely on [`Series::date_bounds`], so hand-built series in
/// any order are accepted. Series are never persisted; build a fresh one
/// whenever the store may have changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    pub points: Vec<SeriesPoint>,
}

impl Series {
    pub fn new(points: Vec<SeriesPoint>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Earliest and latest sample dates, whatever order the points are in
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.points.iter().map(|p| p.date).min()?;
        let last = self.points.iter().map(|p| p.date).max()?;
        Some((first, last))
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Present samples only
    pub fn present(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.points
            .iter()
            .filter_map(|p| p.value.map(|v| (p.date, v)))
    }
}

/// Values between two consecutive marker events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Period {
    /// First date of the run
    pub start: NaiveDate,
    /// Date of the closing marker
    pub end: NaiveDate,
    /// One entry per record in the run, closing record included
    pub values: Vec<Option<f64>>,
}

impl Period {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Sliding-window percentile bands
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileBands {
    /// Requested percentiles, in order
    pub percentiles: Vec<f64>,
    /// First calendar day of each window
    pub starts: Vec<NaiveDate>,
    /// `values[p][w]`: percentile `p` over window `w`; NaN for empty windows
    pub values: Vec<Vec<f64>>,
}

/// Correlation of each factor against a value field at each lag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaggedCorrelation {
    pub factors: Vec<String>,
    pub lags: Vec<u32>,
    /// `correlation[factor][lag]`
    pub correlation: Vec<Vec<f64>>,
    /// Two-sided p-values, same shape as `correlation`
    pub p_values: Vec<Vec<f64>>,
    /// Number of paired samples behind each cell
    pub samples: Vec<Vec<usize>>,
}

/// Column-wise reduction of length-normalized periods
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub periods: usize,
    pub mean: Vec<f64>,
    pub p25: Vec<f64>,
    pub p50: Vec<f64>,
    pub p75: Vec<f64>,
}
