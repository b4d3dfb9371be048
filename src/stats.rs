//! Windowed statistics
//!
//! Sliding-window percentile bands over interval series and lagged Pearson
//! correlation of binary factors against a value field. Degenerate inputs
//! (empty windows, constant vectors) produce NaN rather than errors.

use crate::error::{JournalError, JournalResult};
use crate::factors::FactorMatrix;
use crate::schema::FieldSpec;
use crate::store::Store;
use crate::types::{LaggedCorrelation, PercentileBands, Series};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Percentiles used when the caller does not choose any
pub const DEFAULT_PERCENTILES: [f64; 5] = [0.0, 25.0, 50.0, 75.0, 100.0];

/// Linear interpolation between order statistics of an ascending slice.
///
/// `p` is in percent. Returns NaN for an empty slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = p / 100.0 * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}

/// Sort present values ascending, dropping NaN
pub(crate) fn sorted_values(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

pub(crate) fn check_percentiles(percentiles: &[f64]) -> JournalResult<()> {
    match percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
        Some(&p) => Err(JournalError::InvalidPercentile(p)),
        None => Ok(()),
    }
}

/// Percentile bands over every `window_days` window of an interval series,
/// measured from the series' own earliest to latest date.
///
/// See [`sliding_percentiles_between`].
pub fn sliding_percentiles(
    series: &Series,
    window_days: u32,
    percentiles: &[f64],
) -> JournalResult<PercentileBands> {
    match series.date_bounds() {
        Some((first, last)) => {
            sliding_percentiles_between(series, first, last, window_days, percentiles)
        }
        None => {
            check_window(window_days, percentiles)?;
            Ok(empty_bands(percentiles))
        }
    }
}

/// Percentile bands over the calendar `first..=last`, usually the dates of
/// the journal records analysed.
///
/// With `days` the number of calendar days in `first..=last`, windows start at
/// each day offset `s` in `[0, days - window_days)` from `first` and cover the
/// samples dated at offsets `s..=s + window_days`, so the last window reaches
/// `last`. Samples outside `first..=last` are ignored.
pub fn sliding_percentiles_between(
    series: &Series,
    first: NaiveDate,
    last: NaiveDate,
    window_days: u32,
    percentiles: &[f64],
) -> JournalResult<PercentileBands> {
    check_window(window_days, percentiles)?;
    if last < first {
        return Err(JournalError::InvalidDateRange(format!(
            "{} is before {}",
            last, first
        )));
    }

    let mut bands = empty_bands(percentiles);
    let days = last.signed_duration_since(first).num_days() + 1;
    let samples: Vec<(i64, f64)> = series
        .present()
        .map(|(date, value)| (date.signed_duration_since(first).num_days(), value))
        .filter(|(offset, _)| (0..days).contains(offset))
        .collect();
    let window = i64::from(window_days);

    let mut empty_windows = 0usize;
    for start in 0..(days - window).max(0) {
        let window_values = sorted_values(
            samples
                .iter()
                .filter(|(offset, _)| *offset >= start && *offset <= start + window)
                .map(|(_, value)| *value),
        );
        if window_values.is_empty() {
            empty_windows += 1;
        }
        bands.starts.push(first + Days::new(start as u64));
        for (row, &p) in bands.values.iter_mut().zip(percentiles) {
            row.push(percentile(&window_values, p));
        }
    }
    if empty_windows > 0 {
        tracing::debug!(empty_windows, "percentile windows without samples");
    }
    Ok(bands)
}

fn check_window(window_days: u32, percentiles: &[f64]) -> JournalResult<()> {
    if window_days == 0 {
        return Err(JournalError::InvalidWindow(window_days));
    }
    check_percentiles(percentiles)
}

fn empty_bands(percentiles: &[f64]) -> PercentileBands {
    PercentileBands {
        percentiles: percentiles.to_vec(),
        starts: Vec::new(),
        values: vec![Vec::new(); percentiles.len()],
    }
}

/// Pearson correlation with its two-sided significance
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Correlation {
    pub r: f64,
    pub p_value: f64,
    pub n: usize,
}

/// Pearson's r of paired samples and the two-sided p-value of a Student's t
/// test with `n - 2` degrees of freedom.
///
/// Fewer than two pairs or a constant input give NaN for both. Two pairs
/// always correlate perfectly, so their p-value is 1; an exact linear
/// relation over more pairs has p-value 0.
pub fn pearson(x: &[f64], y: &[f64]) -> Correlation {
    let n = x.len().min(y.len());
    let degenerate = Correlation {
        r: f64::NAN,
        p_value: f64::NAN,
        n,
    };
    if n < 2 {
        return degenerate;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        tracing::debug!(n, "zero-variance correlation input");
        return degenerate;
    }

    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    let p_value = if n == 2 {
        1.0
    } else if 1.0 - r.abs() < 1e-12 {
        0.0
    } else {
        let df = (n - 2) as f64;
        let t = r * (df / (1.0 - r * r)).sqrt();
        match StudentsT::new(0.0, 1.0, df) {
            Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
            Err(_) => f64::NAN,
        }
    };
    Correlation { r, p_value, n }
}

/// Correlate every factor against `values` shifted by each lag in
/// `0..lag_window_days`.
///
/// For a factor observed on date `d` the paired value is the one recorded on
/// exactly `d + lag`; dates without such a value are left out. Flagging
/// significant cells is up to the caller.
pub fn lagged_correlate(
    store: &Store,
    factors: &FactorMatrix,
    values: &FieldSpec,
    lag_window_days: u32,
) -> JournalResult<LaggedCorrelation> {
    if values.is_text() {
        return Err(JournalError::FieldKindMismatch {
            field: values.name.clone(),
            expected: "numeric or boolean",
            actual: values.kind.as_str(),
        });
    }
    if lag_window_days == 0 {
        return Err(JournalError::InvalidWindow(lag_window_days));
    }

    let lags: Vec<u32> = (0..lag_window_days).collect();
    let targets: Vec<Vec<Option<f64>>> = lags
        .iter()
        .map(|&lag| {
            factors
                .dates
                .iter()
                .map(|&date| value_at(store, values, date, lag))
                .collect()
        })
        .collect();

    let mut result = LaggedCorrelation {
        factors: factors.names.clone(),
        lags: lags.clone(),
        correlation: Vec::with_capacity(factors.len()),
        p_values: Vec::with_capacity(factors.len()),
        samples: Vec::with_capacity(factors.len()),
    };
    for indicator in &factors.values {
        let mut r_row = Vec::with_capacity(lags.len());
        let mut p_row = Vec::with_capacity(lags.len());
        let mut n_row = Vec::with_capacity(lags.len());
        for target in &targets {
            let (x, y): (Vec<f64>, Vec<f64>) = indicator
                .iter()
                .zip(target)
                .filter_map(|(&f, v)| v.map(|v| (f, v)))
                .unzip();
            let c = pearson(&x, &y);
            r_row.push(c.r);
            p_row.push(c.p_value);
            n_row.push(c.n);
        }
        result.correlation.push(r_row);
        result.p_values.push(p_row);
        result.samples.push(n_row);
    }
    tracing::debug!(
        factors = factors.len(),
        lags = lags.len(),
        field = %values.name,
        "computed lagged correlation"
    );
    Ok(result)
}

fn value_at(store: &Store, field: &FieldSpec, date: NaiveDate, lag: u32) -> Option<f64> {
    let target = date.checked_add_days(Days::new(u64::from(lag)))?;
    store
        .get(target)
        .and_then(|record| record.get(&field.name))
        .and_then(|value| field.scaled(value))
}
