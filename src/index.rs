//! Date index
//!
//! Maps calendar dates to record positions. Lookups clamp to the store
//! bounds instead of failing, so analyses over a window reaching past either
//! end simply use the records that exist.

use crate::error::{JournalError, JournalResult};
use crate::store::Store;
use chrono::{Days, NaiveDate};
use serde::Serialize;

/// Inclusive range of record positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexRange {
    pub first: usize,
    pub last: usize,
}

impl IndexRange {
    pub fn new(first: usize, last: usize) -> JournalResult<Self> {
        if last < first {
            return Err(JournalError::InvalidDateRange(format!(
                "index range {}..={} is reversed",
                first, last
            )));
        }
        Ok(Self { first, last })
    }

    /// Whole store
    pub fn all(store: &Store) -> JournalResult<Self> {
        if store.is_empty() {
            return Err(JournalError::EmptyStore);
        }
        Ok(Self {
            first: 0,
            last: store.len() - 1,
        })
    }

    /// Number of records covered; never zero
    pub fn count(&self) -> usize {
        self.last - self.first + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.first && index <= self.last
    }

    /// Fails unless the range lies inside a store of `len` records
    pub fn check(&self, len: usize) -> JournalResult<()> {
        if self.last >= len {
            return Err(JournalError::InvalidDateRange(format!(
                "index range {}..={} outside store of {} records",
                self.first, self.last, len
            )));
        }
        Ok(())
    }
}

/// Position of the first record dated on or after `date`, clamped to the
/// store: dates before the first record give 0, dates after the last record
/// give the last position
pub fn date_to_index(store: &Store, date: NaiveDate) -> JournalResult<usize> {
    if store.is_empty() {
        return Err(JournalError::DateNotFound(date));
    }
    let position = store.records().partition_point(|r| r.date < date);
    Ok(position.min(store.len() - 1))
}

/// Position of the record for exactly `date`
pub fn exact_index(store: &Store, date: NaiveDate) -> Option<usize> {
    store.position(date)
}

/// Position of the last record dated on or before `date`, clamped to 0
fn last_on_or_before(store: &Store, date: NaiveDate) -> usize {
    store
        .records()
        .partition_point(|r| r.date <= date)
        .saturating_sub(1)
}

/// Records covering a window of `window_days` calendar days.
///
/// Without an anchor the window ends at the last record; with one it starts
/// at `anchor`. Both ends are clamped to the store.
pub fn index_range(
    store: &Store,
    window_days: u32,
    anchor: Option<NaiveDate>,
) -> JournalResult<IndexRange> {
    if window_days == 0 {
        return Err(JournalError::InvalidWindow(window_days));
    }
    let last_date = store.last_date().ok_or(JournalError::EmptyStore)?;
    let span = Days::new(u64::from(window_days - 1));

    match anchor {
        None => {
            let start = last_date.checked_sub_days(span).unwrap_or(NaiveDate::MIN);
            Ok(IndexRange {
                first: date_to_index(store, start)?,
                last: store.len() - 1,
            })
        }
        Some(anchor) => {
            let first = date_to_index(store, anchor)?;
            let end = anchor.checked_add_days(span).unwrap_or(NaiveDate::MAX);
            let last = last_on_or_before(store, end).max(first);
            Ok(IndexRange { first, last })
        }
    }
}

/// Records from `first` through `last` (inclusive, defaulting to the last
/// record), each end clamped to the store
pub fn index_range_between(
    store: &Store,
    first: NaiveDate,
    last: Option<NaiveDate>,
) -> JournalResult<IndexRange> {
    if let Some(last) = last {
        if last < first {
            return Err(JournalError::InvalidDateRange(format!(
                "{} is before {}",
                last, first
            )));
        }
    }
    if store.is_empty() {
        return Err(JournalError::EmptyStore);
    }
    let first_index = date_to_index(store, first)?;
    let last_index = match last {
        Some(last) => last_on_or_before(store, last).max(first_index),
        None => store.len() - 1,
    };
    Ok(IndexRange {
        first: first_index,
        last: last_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, store_of};
    use proptest::prelude::*;
    use serde_json::json;

    fn gappy_store() -> Store {
        store_of(vec![
            ("2024-01-01", json!({})),
            ("2024-01-02", json!({})),
            ("2024-01-05", json!({})),
            ("2024-01-09", json!({})),
        ])
    }

    #[test]
    fn test_date_to_index_clamps() {
        let store = gappy_store();
        assert_eq!(date_to_index(&store, date("2023-12-01")).unwrap(), 0);
        assert_eq!(date_to_index(&store, date("2024-01-02")).unwrap(), 1);
        assert_eq!(date_to_index(&store, date("2024-01-03")).unwrap(), 2);
        assert_eq!(date_to_index(&store, date("2024-01-09")).unwrap(), 3);
        assert_eq!(date_to_index(&store, date("2025-01-01")).unwrap(), 3);
    }

    #[test]
    fn test_date_to_index_empty_store() {
        assert!(matches!(
            date_to_index(&Store::new(), date("2024-01-01")),
            Err(JournalError::DateNotFound(_))
        ));
    }

    #[test]
    fn test_exact_index() {
        let store = gappy_store();
        assert_eq!(exact_index(&store, date("2024-01-05")), Some(2));
        assert_eq!(exact_index(&store, date("2024-01-04")), None);
    }

    #[test]
    fn test_trailing_window() {
        let store = gappy_store();
        assert_eq!(
            index_range(&store, 5, None).unwrap(),
            IndexRange { first: 2, last: 3 }
        );
        assert_eq!(
            index_range(&store, 1000, None).unwrap(),
            IndexRange { first: 0, last: 3 }
        );
    }

    #[test]
    fn test_anchored_window() {
        let store = gappy_store();
        assert_eq!(
            index_range(&store, 3, Some(date("2024-01-02"))).unwrap(),
            IndexRange { first: 1, last: 1 }
        );
        assert_eq!(
            index_range(&store, 4, Some(date("2024-01-02"))).unwrap(),
            IndexRange { first: 1, last: 2 }
        );
        assert_eq!(
            index_range(&store, 30, Some(date("2024-03-01"))).unwrap(),
            IndexRange { first: 3, last: 3 }
        );
    }

    #[test]
    fn test_window_errors() {
        let store = gappy_store();
        assert!(matches!(
            index_range(&store, 0, None),
            Err(JournalError::InvalidWindow(0))
        ));
        assert!(matches!(
            index_range(&Store::new(), 3, None),
            Err(JournalError::EmptyStore)
        ));
        assert!(matches!(
            index_range_between(&store, date("2024-01-05"), Some(date("2024-01-01"))),
            Err(JournalError::InvalidDateRange(_))
        ));
    }

    #[test]
    fn test_range_between() {
        let store = gappy_store();
        assert_eq!(
            index_range_between(&store, date("2024-01-02"), Some(date("2024-01-08"))).unwrap(),
            IndexRange { first: 1, last: 2 }
        );
        assert_eq!(
            index_range_between(&store, date("2024-01-03"), None).unwrap(),
            IndexRange { first: 2, last: 3 }
        );
    }

    proptest! {
        #[test]
        fn test_date_to_index_monotonic(
            gaps in prop::collection::vec(1u64..5, 1..30),
            offsets in prop::collection::vec(0u64..150, 2..20),
        ) {
            let mut records = Vec::new();
            let mut day = date("2024-01-01");
            for gap in gaps {
                records.push(crate::types::Record::new(day));
                day = day + Days::new(gap);
            }
            let store = Store::from_records(records).unwrap();

            let mut offsets = offsets;
            offsets.sort_unstable();
            let mut previous = 0;
            for offset in offsets {
                let index = date_to_index(&store, date("2023-12-15") + Days::new(offset)).unwrap();
                prop_assert!(index >= previous);
                prop_assert!(index < store.len());
                previous = index;
            }
        }
    }
}
