//! Event and period analysis
//!
//! A boolean marker field (a migraine, a run, a trip) splits the journal into
//! periods. This module extracts those periods, resamples them onto a common
//! relative axis so periods of different length can be averaged, and
//! summarises the intervals between events.

use crate::error::{JournalError, JournalResult};
use crate::index::IndexRange;
use crate::schema::FieldSpec;
use crate::series::{is_scaled_true, read_field};
use crate::stats::{percentile, sorted_values};
use crate::store::Store;
use crate::types::{Period, PeriodSummary, Record, Series};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

fn require_boolean(field: &FieldSpec) -> JournalResult<()> {
    if field.is_boolean() {
        Ok(())
    } else {
        Err(JournalError::FieldKindMismatch {
            field: field.name.clone(),
            expected: "boolean",
            actual: field.kind.as_str(),
        })
    }
}

fn marker_set(record: &Record, marker: &FieldSpec) -> bool {
    matches!(record.get(&marker.name), Some(Value::Bool(true)))
}

/// Periods of `value` closed by `marker` events within `range`.
///
/// Each period runs from the record after one marker through the next marker
/// record. The run after the last marker in range has no closing event and is
/// dropped. The run before the first marker in range is kept only when the
/// record just before `range` is itself a marker, so every period is
/// bracketed by two events.
pub fn extract_periods(
    store: &Store,
    marker: &FieldSpec,
    range: IndexRange,
    value: &FieldSpec,
) -> JournalResult<Vec<Period>> {
    require_boolean(marker)?;
    let values = read_field(store, value, range)?;
    let records = &store.records()[range.first..=range.last];

    let mut bracketed = range
        .first
        .checked_sub(1)
        .is_some_and(|before| marker_set(&store.records()[before], marker));
    let mut periods = Vec::new();
    let mut run: Vec<Option<f64>> = Vec::new();
    let mut run_start: Option<NaiveDate> = None;

    for (record, point) in records.iter().zip(&values.points) {
        run_start.get_or_insert(record.date);
        run.push(point.value);
        if marker_set(record, marker) {
            let values = std::mem::take(&mut run);
            if let (true, Some(start)) = (bracketed, run_start.take()) {
                periods.push(Period {
                    start,
                    end: record.date,
                    values,
                });
            }
            bracketed = true;
        }
    }
    tracing::debug!(
        marker = %marker.name,
        periods = periods.len(),
        dropped_tail = run.len(),
        "extracted periods"
    );
    Ok(periods)
}

/// Nearest-neighbour resampling of a period onto `target_len` points.
///
/// Output `i` takes source index `round(i * (n - 1) / (target_len - 1))`,
/// with exact halves rounded down. Nearest-neighbour keeps observed values
/// only, which makes column percentiles differ from a linear interpolation.
pub fn normalize_period(
    values: &[Option<f64>],
    target_len: usize,
) -> JournalResult<Vec<Option<f64>>> {
    if values.is_empty() {
        return Err(JournalError::EmptyPeriod);
    }
    if target_len == 0 {
        return Err(JournalError::InvalidWindow(0));
    }
    if target_len == 1 {
        return Ok(vec![values[0]]);
    }

    let steps = values.len() - 1;
    let den = target_len - 1;
    Ok((0..target_len)
        .map(|i| {
            let num = i * steps;
            let (q, r) = (num / den, num % den);
            let source = if 2 * r > den { q + 1 } else { q };
            values[source]
        })
        .collect())
}

/// Normalize every period to `target_len` points and reduce column-wise over
/// present values; columns with no values are NaN
pub fn average_across_periods(
    periods: &[Period],
    target_len: usize,
) -> JournalResult<PeriodSummary> {
    let resampled = periods
        .iter()
        .map(|p| normalize_period(&p.values, target_len))
        .collect::<JournalResult<Vec<_>>>()?;

    let mut summary = PeriodSummary {
        periods: periods.len(),
        mean: Vec::with_capacity(target_len),
        p25: Vec::with_capacity(target_len),
        p50: Vec::with_capacity(target_len),
        p75: Vec::with_capacity(target_len),
    };
    for column in 0..target_len {
        let sorted = sorted_values(resampled.iter().filter_map(|row| row[column]));
        let mean = if sorted.is_empty() {
            f64::NAN
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };
        summary.mean.push(mean);
        summary.p25.push(percentile(&sorted, 25.0));
        summary.p50.push(percentile(&sorted, 50.0));
        summary.p75.push(percentile(&sorted, 75.0));
    }
    Ok(summary)
}

/// One interval between events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntervalOccurrence {
    /// Date of the event closing the interval
    pub date: NaiveDate,
    pub days: u32,
    /// How many earlier intervals had the same length
    pub rank: usize,
}

/// Distribution of interval lengths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntervalHistogram {
    /// `counts[d]`: number of intervals lasting `d` days
    pub counts: Vec<usize>,
    pub occurrences: Vec<IntervalOccurrence>,
}

/// Where a running streak falls among past intervals
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StreakRank {
    pub days: u32,
    /// Share of past intervals strictly shorter than the streak, in percent
    pub higher_than_pct: f64,
    /// Share of past intervals strictly longer than the streak, in percent
    pub lower_than_pct: f64,
}

impl IntervalHistogram {
    /// Build from an interval series as produced by [`Series::intervals`]
    pub fn from_intervals(intervals: &Series) -> Self {
        let mut histogram = Self::default();
        for (date, value) in intervals.present() {
            let days = value.max(0.0) as u32;
            let slot = days as usize;
            if slot >= histogram.counts.len() {
                histogram.counts.resize(slot + 1, 0);
            }
            histogram.occurrences.push(IntervalOccurrence {
                date,
                days,
                rank: histogram.counts[slot],
            });
            histogram.counts[slot] += 1;
        }
        histogram
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Rank a streak of `days` against the recorded intervals; NaN shares
    /// when there are none
    pub fn rank(&self, days: u32) -> StreakRank {
        let total = self.total();
        let slot = days as usize;
        let shorter: usize = self.counts.iter().take(slot).sum();
        let longer: usize = self.counts.iter().skip(slot + 1).sum();
        let pct = |n: usize| {
            if total == 0 {
                f64::NAN
            } else {
                n as f64 / total as f64 * 100.0
            }
        };
        StreakRank {
            days,
            higher_than_pct: pct(shorter),
            lower_than_pct: pct(longer),
        }
    }
}

/// Dates in `range` on which `marker` is set
pub fn event_dates(
    store: &Store,
    marker: &FieldSpec,
    range: IndexRange,
) -> JournalResult<Vec<NaiveDate>> {
    require_boolean(marker)?;
    Ok(read_field(store, marker, range)?
        .present()
        .filter(|(_, v)| is_scaled_true(*v))
        .map(|(date, _)| date)
        .collect())
}

/// Days from the last `marker` event to the last record, ranked against all
/// intervals between earlier events; `None` if the marker never occurred
pub fn current_streak(store: &Store, marker: &FieldSpec) -> JournalResult<Option<StreakRank>> {
    require_boolean(marker)?;
    let series = read_field(store, marker, IndexRange::all(store)?)?;
    let (Some(last_event), Some(last_day)) = (
        series
            .present()
            .filter(|(_, v)| is_scaled_true(*v))
            .map(|(date, _)| date)
            .last(),
        store.last_date(),
    ) else {
        return Ok(None);
    };
    let days = last_day.signed_duration_since(last_event).num_days().max(0) as u32;
    let histogram = IntervalHistogram::from_intervals(&series.intervals(is_scaled_true));
    Ok(Some(histogram.rank(days)))
}
