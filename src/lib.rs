//! Daylog - personal longitudinal journal store and analytics
//!
//! Daylog keeps one date-indexed record per day of self-reported measurements
//! and turns that history into series and statistics: intervals between
//! events, moving averages, sliding percentile bands, lagged keyword
//! correlation and event-aligned profiles.
//!
//! ## Modules
//!
//! - **Store**: schema-checked records, append/edit/reorder, atomic persistence
//! - **Analysis**: series extraction, windowed statistics, period analysis
//!
//! Rendering is left to callers; every analysis returns plain data.

pub mod alignment;
pub mod config;
pub mod error;
pub mod events;
pub mod factors;
pub mod index;
pub mod migrate;
pub mod moon;
pub mod schema;
pub mod series;
pub mod stats;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::JournalConfig;
pub use error::{FieldError, JournalError, JournalResult};
pub use index::{date_to_index, index_range, IndexRange};
pub use schema::{FieldKind, FieldSpec, Schema};
pub use store::{Answer, RecordEditor, Store, ValueSource};
pub use types::{Record, RecordPatch, Series, SeriesPoint};

/// Daylog version reported by the CLI
pub const DAYLOG_VERSION: &str = env!("CARGO_PKG_VERSION");
