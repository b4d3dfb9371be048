//! Journal configuration
//!
//! A single TOML file names the store location, the day cutoff used to decide
//! which dates are due for entry, the ordered field declarations and an
//! optional legacy migration. It is loaded once per invocation.

use crate::error::{JournalError, JournalResult};
use crate::migrate::Migration;
use crate::schema::{DeriveRule, FieldKind, FieldSpec, Schema, ValueRange};
use chrono::{Days, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default local hour before which the current day is not yet due
pub const DEFAULT_DAY_CUTOFF_HOUR: u32 = 20;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Location of the persisted store
    pub store_path: PathBuf,
    /// Local hour (0-23) from which today counts as a finished day
    #[serde(default = "default_day_cutoff_hour")]
    pub day_cutoff_hour: u32,
    /// Field declarations in display order
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    /// Legacy store migration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration: Option<Migration>,
}

fn default_day_cutoff_hour() -> u32 {
    DEFAULT_DAY_CUTOFF_HOUR
}

fn default_active() -> bool {
    true
}

/// One `[[fields]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derive: Option<DeriveRule>,
}

impl From<&FieldConfig> for FieldSpec {
    fn from(config: &FieldConfig) -> Self {
        FieldSpec {
            name: config.name.clone(),
            kind: config.kind,
            range: config.range.map(|[min, max]| ValueRange::new(min, max)),
            derive: config.derive.clone(),
            active: config.active,
        }
    }
}

impl JournalConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> JournalResult<Self> {
        if !path.exists() {
            return Err(JournalError::ConfigMissing(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content, &path.display().to_string())?;
        tracing::debug!(
            path = %path.display(),
            fields = config.fields.len(),
            "loaded journal configuration"
        );
        Ok(config)
    }

    /// Parse configuration text; `origin` is only used in error messages
    pub fn from_toml_str(content: &str, origin: &str) -> JournalResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| JournalError::ConfigMalformed {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        if config.day_cutoff_hour > 23 {
            return Err(JournalError::ConfigMalformed {
                path: origin.to_string(),
                message: format!("day_cutoff_hour {} is not an hour", config.day_cutoff_hour),
            });
        }
        if config.fields.is_empty() {
            return Err(JournalError::ConfigMalformed {
                path: origin.to_string(),
                message: "no fields declared".to_string(),
            });
        }
        Ok(config)
    }

    /// Build the validated schema from the field declarations
    pub fn schema(&self) -> JournalResult<Schema> {
        Schema::new(self.fields.iter().map(FieldSpec::from).collect())
    }

    /// First date not yet due for entry at local time `now`.
    ///
    /// Before the cutoff hour today is still in progress, so the bound is
    /// today itself; from the cutoff on, today is due and the bound is
    /// tomorrow.
    pub fn upper_bound(&self, now: NaiveDateTime) -> NaiveDate {
        let today = now.date();
        if now.hour() < self.day_cutoff_hour {
            today
        } else {
            today.checked_add_days(Days::new(1)).unwrap_or(today)
        }
    }
}
