//! Moon phase of journal dates
//!
//! Mean synodic month model anchored on the new moon of 2000-01-06 18:14 UTC.
//! Accurate to a few percent of illumination, which is plenty for binning
//! event dates by phase.

use crate::error::{JournalError, JournalResult};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::f64::consts::TAU;

/// Mean length of a lunation in days
pub const SYNODIC_MONTH_DAYS: f64 = 29.530588853;

/// `num_days_from_ce` of the reference new moon's date
const REFERENCE_NEW_MOON_DAY: i32 = 730_125;
/// Time of day of the reference new moon, in days
const REFERENCE_NEW_MOON_TIME: f64 = (18.0 + 14.0 / 60.0) / 24.0;
/// Dates are evaluated at noon UTC
const EVALUATION_TIME: f64 = 0.5;

/// Days since the most recent new moon at noon UTC on `date`
pub fn moon_age_days(date: NaiveDate) -> f64 {
    let days = f64::from(date.num_days_from_ce() - REFERENCE_NEW_MOON_DAY) + EVALUATION_TIME
        - REFERENCE_NEW_MOON_TIME;
    days.rem_euclid(SYNODIC_MONTH_DAYS)
}

/// Illuminated fraction of the lunar disc at noon UTC, 0 (new) to 1 (full)
pub fn illumination(date: NaiveDate) -> f64 {
    (1.0 - (TAU * moon_age_days(date) / SYNODIC_MONTH_DAYS).cos()) / 2.0
}

/// Counts of dates by illumination over equal-width bins of `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseHistogram {
    /// `bins + 1` bin edges
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
    /// Illumination of each input date, in input order
    pub illumination: Vec<f64>,
}

/// Bin dates by illumination; the last bin includes 1.0
pub fn phase_histogram(dates: &[NaiveDate], bins: usize) -> JournalResult<PhaseHistogram> {
    if bins == 0 {
        return Err(JournalError::InvalidWindow(0));
    }
    let edges = (0..=bins).map(|i| i as f64 / bins as f64).collect();
    let mut counts = vec![0; bins];
    let illumination: Vec<f64> = dates.iter().map(|&d| illumination(d)).collect();
    for &fraction in &illumination {
        let bin = ((fraction * bins as f64) as usize).min(bins - 1);
        counts[bin] += 1;
    }
    Ok(PhaseHistogram {
        edges,
        counts,
        illumination,
    })
}
