//! Event-aligned observation profiles
//!
//! Lines up external dated observations (tracks listened to, places visited)
//! around journal events: for each day offset around an event, what fraction
//! of that day's observations carried each label.

use crate::error::{JournalError, JournalResult};
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

/// Timestamp layouts accepted in the `utc_time` column, after RFC 3339
const UTC_TIME_FORMATS: [&str; 4] = [
    "%d %b %Y, %H:%M",
    "%d %b %Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// One labelled, dated observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    #[serde(alias = "artist")]
    pub label: String,
}

/// Parse newline-delimited JSON observations, one object per line
pub fn parse_observations_ndjson(ndjson: &str) -> JournalResult<Vec<Observation>> {
    let mut observations = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Observation>(trimmed) {
            Ok(observation) => observations.push(observation),
            Err(e) => {
                return Err(JournalError::Parse(format!(
                    "Failed to parse line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(observations)
}

/// One row of a scrobbles export; other columns are ignored
#[derive(Debug, Deserialize)]
struct ScrobbleRow {
    utc_time: String,
    artist: String,
}

/// Calendar day (UTC) of a scrobble timestamp
fn parse_utc_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.naive_utc().date());
    }
    UTC_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|timestamp| timestamp.date())
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}

/// Parse a listening-history CSV export with a header row naming at least
/// `utc_time` and `artist`; each row becomes an observation labelled with the
/// artist on the UTC day it was played
pub fn parse_scrobbles_csv<R: Read>(reader: R) -> JournalResult<Vec<Observation>> {
    let line_error = |line: u64, message: String| {
        JournalError::Parse(format!("Failed to parse line {}: {}", line, message))
    };

    let mut rows = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rows
        .headers()
        .map_err(|e| line_error(1, e.to_string()))?
        .clone();

    let mut observations = Vec::new();
    let mut record = csv::StringRecord::new();
    loop {
        let more = rows
            .read_record(&mut record)
            .map_err(|e| line_error(e.position().map_or(0, |p| p.line()), e.to_string()))?;
        if !more {
            break;
        }
        let line = record.position().map_or(0, |p| p.line());
        let row: ScrobbleRow = record
            .deserialize(Some(&headers))
            .map_err(|e| line_error(line, e.to_string()))?;
        let date = parse_utc_date(&row.utc_time)
            .ok_or_else(|| line_error(line, format!("unrecognised utc_time {:?}", row.utc_time)))?;
        observations.push(Observation {
            date,
            label: row.artist,
        });
    }
    tracing::debug!(observations = observations.len(), "parsed scrobbles");
    Ok(observations)
}

/// Label fractions per day offset around events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedFractions {
    /// Most frequent labels, most frequent first
    pub labels: Vec<String>,
    /// Day offsets from the event, `-side..=side`
    pub offsets: Vec<i64>,
    /// `fractions[label][offset]`; NaN where no observation fell on that offset
    pub fractions: Vec<Vec<f64>>,
    /// Observations of any label counted at each offset
    pub totals: Vec<usize>,
    /// Events that contributed
    pub events: usize,
}

/// Count observations of the `top_n` most frequent labels at each offset
/// within `side_days` of every event, as fractions of all observations at
/// that offset.
///
/// Events before the first observation are ignored, and so is the latest
/// event, whose aftermath may still be incomplete.
pub fn align_observations(
    events: &[NaiveDate],
    observations: &[Observation],
    top_n: usize,
    side_days: u32,
) -> AlignedFractions {
    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    let mut label_counts: Vec<(&str, usize)> = Vec::new();
    for observation in observations {
        let slot = *first_seen
            .entry(observation.label.as_str())
            .or_insert_with(|| {
                label_counts.push((observation.label.as_str(), 0));
                label_counts.len() - 1
            });
        label_counts[slot].1 += 1;
    }
    label_counts.sort_by(|a, b| b.1.cmp(&a.1));
    label_counts.truncate(top_n);
    let top: HashMap<&str, usize> = label_counts
        .iter()
        .enumerate()
        .map(|(row, (label, _))| (*label, row))
        .collect();

    let mut by_date: BTreeMap<NaiveDate, Vec<&str>> = BTreeMap::new();
    for observation in observations {
        by_date
            .entry(observation.date)
            .or_default()
            .push(observation.label.as_str());
    }

    let side = i64::from(side_days);
    let offsets: Vec<i64> = (-side..=side).collect();
    let mut counts = vec![vec![0usize; offsets.len()]; label_counts.len()];
    let mut totals = vec![0usize; offsets.len()];

    let mut aligned: Vec<NaiveDate> = match by_date.keys().next() {
        Some(&first) => events.iter().copied().filter(|d| *d >= first).collect(),
        None => Vec::new(),
    };
    aligned.sort_unstable();
    aligned.pop();

    for event in &aligned {
        for (column, &offset) in offsets.iter().enumerate() {
            let shifted = if offset < 0 {
                event.checked_sub_days(Days::new(offset.unsigned_abs()))
            } else {
                event.checked_add_days(Days::new(offset as u64))
            };
            let Some(labels) = shifted.and_then(|d| by_date.get(&d)) else {
                continue;
            };
            totals[column] += labels.len();
            for label in labels {
                if let Some(&row) = top.get(label) {
                    counts[row][column] += 1;
                }
            }
        }
    }

    let fractions = counts
        .iter()
        .map(|row| {
            row.iter()
                .zip(&totals)
                .map(|(&n, &total)| {
                    if total == 0 {
                        f64::NAN
                    } else {
                        n as f64 / total as f64
                    }
                })
                .collect()
        })
        .collect();

    tracing::debug!(
        events = aligned.len(),
        observations = observations.len(),
        labels = label_counts.len(),
        "aligned observations"
    );
    AlignedFractions {
        labels: label_counts.iter().map(|(l, _)| l.to_string()).collect(),
        offsets,
        fractions,
        totals,
        events: aligned.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::date;
    use pretty_assertions::assert_eq;

    fn obs(d: &str, label: &str) -> Observation {
        Observation {
            date: date(d),
            label: label.to_string(),
        }
    }

    #[test]
    fn test_parse_ndjson() {
        let input = r#"
{"date": "2024-01-01", "artist": "Nina Simone"}

{"date": "2024-01-02", "label": "Björk"}
"#;
        let observations = parse_observations_ndjson(input).unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].label, "Nina Simone");
        assert_eq!(observations[1].label, "Björk");

        let err = parse_observations_ndjson("{\"date\": \"soon\"}").unwrap_err();
        assert!(matches!(err, JournalError::Parse(msg) if msg.contains("line 1")));
    }

    #[test]
    fn test_parse_scrobbles_csv() {
        let input = "\
uts,utc_time,artist,artist_mbid,album,track
1388534400,\"01 Jan 2014, 00:00\",Nina Simone,,Pastel Blues,Sinnerman
1388673300,2014-01-02 14:35:00,Björk,,Homogenic,Jóga
1388793600,2014-01-03T23:59:00+00:00,\"Simon & Garfunkel\",,Bookends,America
";
        let observations = parse_scrobbles_csv(input.as_bytes()).unwrap();
        assert_eq!(
            observations,
            vec![
                obs("2014-01-01", "Nina Simone"),
                obs("2014-01-02", "Björk"),
                obs("2014-01-03", "Simon & Garfunkel"),
            ]
        );
    }

    #[test]
    fn test_parse_scrobbles_csv_errors() {
        let bad_time = "utc_time,artist\nyesterday,Nina Simone\n";
        let err = parse_scrobbles_csv(bad_time.as_bytes()).unwrap_err();
        assert!(
            matches!(&err, JournalError::Parse(msg) if msg.contains("line 2") && msg.contains("yesterday")),
            "{}",
            err
        );

        let no_artist = "utc_time,track\n2014-01-02 14:35:00,Jóga\n";
        assert!(matches!(
            parse_scrobbles_csv(no_artist.as_bytes()),
            Err(JournalError::Parse(_))
        ));
    }

    #[test]
    fn test_align_fractions() {
        let observations = vec![
            obs("2024-01-01", "a"),
            obs("2024-01-04", "a"),
            obs("2024-01-04", "b"),
            obs("2024-01-05", "a"),
            obs("2024-01-09", "b"),
            obs("2024-01-10", "c"),
        ];
        let events = vec![date("2024-01-05"), date("2023-12-01"), date("2024-01-10")];

        let aligned = align_observations(&events, &observations, 2, 1);
        assert_eq!(aligned.labels, vec!["a", "b"]);
        assert_eq!(aligned.offsets, vec![-1, 0, 1]);
        assert_eq!(aligned.events, 1);
        assert_eq!(aligned.totals, vec![2, 1, 0]);
        assert_eq!(aligned.fractions[0][0], 0.5);
        assert_eq!(aligned.fractions[1][0], 0.5);
        assert_eq!(aligned.fractions[0][1], 1.0);
        assert!(aligned.fractions[0][2].is_nan());
    }

    #[test]
    fn test_align_without_observations() {
        let aligned = align_observations(&[date("2024-01-05")], &[], 5, 2);
        assert!(aligned.labels.is_empty());
        assert_eq!(aligned.events, 0);
        assert_eq!(aligned.totals, vec![0; 5]);
    }
}
