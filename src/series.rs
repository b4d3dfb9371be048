//! Series extraction
//!
//! Turns stored fields into date-aligned numeric series on the common 0-10
//! scale, and provides the transforms the analyses build on: rescaling,
//! calendar moving averages and intervals between events.
//!
//! Missing values stay `None` throughout; nothing is interpolated.

use crate::error::{JournalError, JournalResult};
use crate::index::IndexRange;
use crate::schema::{json_type_name, FieldSpec, SCALE_MAX};
use crate::store::Store;
use crate::types::{Series, SeriesPoint};
use chrono::{Days, NaiveDate};
use serde_json::Value;

/// Truthy test for 0/10-scaled booleans and keyword series
pub fn is_scaled_true(value: f64) -> bool {
    value == SCALE_MAX
}

/// One sample per record in `range`; `None` where the record lacks the field
pub fn read_field(store: &Store, field: &FieldSpec, range: IndexRange) -> JournalResult<Series> {
    if field.is_text() {
        return Err(JournalError::FieldKindMismatch {
            field: field.name.clone(),
            expected: "numeric or boolean",
            actual: field.kind.as_str(),
        });
    }
    range.check(store.len())?;

    let points = store.records()[range.first..=range.last]
        .iter()
        .map(|record| {
            let value = match record.get(&field.name) {
                None | Some(Value::Null) => None,
                Some(value) => {
                    let scaled = field.scaled(value);
                    if scaled.is_none() {
                        tracing::warn!(
                            date = %record.date,
                            field = %field.name,
                            found = json_type_name(value),
                            "ignoring value of unexpected type"
                        );
                    }
                    scaled
                }
            };
            SeriesPoint::new(record.date, value)
        })
        .collect();
    Ok(Series::new(points))
}

/// 10 where `keyword` occurs in the text field, 0 otherwise.
///
/// A record without the text field counts as 0, not as missing.
pub fn keyword_presence(
    store: &Store,
    text_field: &FieldSpec,
    keyword: &str,
    range: IndexRange,
) -> JournalResult<Series> {
    if !text_field.is_text() {
        return Err(JournalError::FieldKindMismatch {
            field: text_field.name.clone(),
            expected: "text",
            actual: text_field.kind.as_str(),
        });
    }
    range.check(store.len())?;

    let points = store.records()[range.first..=range.last]
        .iter()
        .map(|record| {
            let found = record
                .get(&text_field.name)
                .and_then(Value::as_str)
                .is_some_and(|text| text.contains(keyword));
            SeriesPoint::new(record.date, Some(if found { SCALE_MAX } else { 0.0 }))
        })
        .collect();
    Ok(Series::new(points))
}

fn day_offset(origin: NaiveDate, date: NaiveDate) -> usize {
    date.signed_duration_since(origin).num_days().max(0) as usize
}

impl Series {
    /// Linear rescale of `[min, max]` onto `[0, 10]`
    pub fn normalize_to_scale(&self, min: f64, max: f64) -> JournalResult<Series> {
        if !(max > min) {
            return Err(JournalError::InvalidScale { min, max });
        }
        let factor = SCALE_MAX / (max - min);
        Ok(Series::new(
            self.points
                .iter()
                .map(|p| SeriesPoint::new(p.date, p.value.map(|v| (v - min) * factor)))
                .collect(),
        ))
    }

    /// Trailing calendar-window mean.
    ///
    /// Emits one point per calendar day from `first + window - 1` through the
    /// last date. The value is the mean of present samples in
    /// `[d - window + 1, d]`, or `None` when `d` itself has no value. A series
    /// spanning fewer days than the window yields an empty series.
    pub fn moving_average(&self, window_days: u32) -> JournalResult<Series> {
        if window_days == 0 {
            return Err(JournalError::InvalidWindow(window_days));
        }
        let Some((first, last)) = self.date_bounds() else {
            return Ok(Series::default());
        };
        let window = window_days as usize;
        let span = day_offset(first, last) + 1;
        if span < window {
            return Ok(Series::default());
        }

        let mut dense = vec![None; span];
        for point in &self.points {
            dense[day_offset(first, point.date)] = point.value;
        }

        let points = (window - 1..span)
            .map(|offset| {
                let date = first + Days::new(offset as u64);
                let value = dense[offset].map(|_| {
                    let present: Vec<f64> =
                        dense[offset + 1 - window..=offset].iter().flatten().copied().collect();
                    present.iter().sum::<f64>() / present.len() as f64
                });
                SeriesPoint::new(date, value)
            })
            .collect();
        Ok(Series::new(points))
    }

    /// Days between successive truthy samples, dated at the later sample.
    ///
    /// The first truthy sample has no predecessor and produces nothing.
    pub fn intervals<F: Fn(f64) -> bool>(&self, truthy: F) -> Series {
        let mut previous: Option<NaiveDate> = None;
        let mut points = Vec::new();
        for (date, value) in self.present() {
            if !truthy(value) {
                continue;
            }
            if let Some(prev) = previous {
                let days = date.signed_duration_since(prev).num_days() as f64;
                points.push(SeriesPoint::new(date, Some(days)));
            }
            previous = Some(date);
        }
        Series::new(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{daily_store, date, journal_schema, store_of};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn series(start: &str, values: &[Option<f64>]) -> Series {
        let first = date(start);
        Series::new(
            values
                .iter()
                .enumerate()
                .map(|(i, v)| SeriesPoint::new(first + Days::new(i as u64), *v))
                .collect(),
        )
    }

    #[test]
    fn test_read_field_marks_missing() {
        let schema = journal_schema();
        let store = store_of(vec![
            ("2024-01-01", json!({"sat": 5})),
            ("2024-01-02", json!({"fz": 3})),
            ("2024-01-04", json!({"sat": 7})),
            ("2024-01-05", json!({"sat": "seven"})),
        ]);
        let range = IndexRange::all(&store).unwrap();
        let sat = read_field(&store, schema.resolve("sat").unwrap(), range).unwrap();
        assert_eq!(sat.values(), vec![Some(5.0), None, Some(7.0), None]);
        assert_eq!(sat.dates()[2], date("2024-01-04"));

        let partial = read_field(&store, schema.resolve("sat").unwrap(), IndexRange::new(1, 2).unwrap())
            .unwrap();
        assert_eq!(partial.values(), vec![None, Some(7.0)]);
    }

    #[test]
    fn test_read_field_booleans_scale() {
        let schema = journal_schema();
        let store = daily_store(
            "2024-01-01",
            vec![json!({"exercise": true}), json!({"exercise": false}), json!({})],
        );
        let range = IndexRange::all(&store).unwrap();
        let series = read_field(&store, schema.resolve("exercise").unwrap(), range).unwrap();
        assert_eq!(series.values(), vec![Some(10.0), Some(0.0), None]);
    }

    #[test]
    fn test_read_field_rejects_text_and_bad_range() {
        let schema = journal_schema();
        let store = daily_store("2024-01-01", vec![json!({"text": "x"})]);
        assert!(matches!(
            read_field(&store, schema.resolve("text").unwrap(), IndexRange::all(&store).unwrap()),
            Err(JournalError::FieldKindMismatch { .. })
        ));
        assert!(matches!(
            read_field(&store, schema.resolve("sat").unwrap(), IndexRange::new(0, 4).unwrap()),
            Err(JournalError::InvalidDateRange(_))
        ));
    }

    #[test]
    fn test_keyword_presence_absent_is_false() {
        let schema = journal_schema();
        let store = daily_store(
            "2024-01-01",
            vec![
                json!({"text": "cheese, bread"}),
                json!({}),
                json!({"text": "pasta"}),
                json!({"text": "more cheese"}),
            ],
        );
        let series = keyword_presence(
            &store,
            schema.resolve("text").unwrap(),
            "cheese",
            IndexRange::all(&store).unwrap(),
        )
        .unwrap();
        assert_eq!(
            series.values(),
            vec![Some(10.0), Some(0.0), Some(0.0), Some(10.0)]
        );
    }

    #[test]
    fn test_normalize_to_scale() {
        let s = series("2024-01-01", &[Some(0.0), None, Some(2.0), Some(1.0)]);
        let scaled = s.normalize_to_scale(0.0, 2.0).unwrap();
        assert_eq!(scaled.values(), vec![Some(0.0), None, Some(10.0), Some(5.0)]);
        assert!(matches!(
            s.normalize_to_scale(3.0, 3.0),
            Err(JournalError::InvalidScale { .. })
        ));
    }

    #[test]
    fn test_moving_average_calendar_window() {
        let s = series(
            "2024-01-01",
            &[Some(1.0), Some(2.0), None, Some(6.0), Some(8.0), None],
        );
        let avg = s.moving_average(3).unwrap();
        assert_eq!(avg.len(), 6 - 3 + 1);
        assert_eq!(avg.first_date(), Some(date("2024-01-03")));
        assert_eq!(avg.values(), vec![None, Some(4.0), Some(7.0), None]);
    }

    #[test]
    fn test_moving_average_over_gaps() {
        // Dates 1, 2 and 5: the span is 5 days even though only 3 samples exist
        let s = Series::new(vec![
            SeriesPoint::new(date("2024-01-01"), Some(3.0)),
            SeriesPoint::new(date("2024-01-02"), Some(5.0)),
            SeriesPoint::new(date("2024-01-05"), Some(9.0)),
        ]);
        let avg = s.moving_average(2).unwrap();
        assert_eq!(avg.len(), 4);
        assert_eq!(avg.values(), vec![Some(4.0), None, None, Some(9.0)]);
    }

    #[test]
    fn test_moving_average_unordered_points() {
        let s = Series::new(vec![
            SeriesPoint::new(date("2024-01-01"), Some(2.0)),
            SeriesPoint::new(date("2024-01-10"), Some(6.0)),
            SeriesPoint::new(date("2024-01-05"), Some(4.0)),
        ]);
        let avg = s.moving_average(2).unwrap();
        assert_eq!(avg.len(), 9);
        assert_eq!(avg.first_date(), Some(date("2024-01-02")));
        assert_eq!(avg.last_date(), Some(date("2024-01-10")));
        assert_eq!(avg.points[3].value, Some(4.0));
        assert_eq!(avg.points[8].value, Some(6.0));
    }

    #[test]
    fn test_moving_average_short_series() {
        let s = series("2024-01-01", &[Some(1.0), Some(2.0)]);
        assert!(s.moving_average(3).unwrap().is_empty());
        assert!(Series::default().moving_average(3).unwrap().is_empty());
        assert!(matches!(
            s.moving_average(0),
            Err(JournalError::InvalidWindow(0))
        ));
    }

    #[test]
    fn test_intervals_between_events() {
        let mut values = vec![Some(0.0); 21];
        values[5] = Some(10.0);
        values[9] = Some(10.0);
        values[20] = Some(10.0);
        values[12] = None;
        let s = series("2024-01-01", &values);

        let intervals = s.intervals(is_scaled_true);
        assert_eq!(intervals.values(), vec![Some(4.0), Some(11.0)]);
        assert_eq!(
            intervals.dates(),
            vec![date("2024-01-10"), date("2024-01-21")]
        );
    }

    #[test]
    fn test_intervals_single_event() {
        let s = series("2024-01-01", &[Some(0.0), Some(10.0), Some(0.0)]);
        assert!(s.intervals(is_scaled_true).is_empty());
        let generic = series("2024-01-01", &[Some(3.0), Some(0.0), Some(1.0)]);
        assert_eq!(generic.intervals(|v| v > 0.0).values(), vec![Some(2.0)]);
    }
}
