//! Field declarations
//!
//! Every journal field has one of three kinds. Each kind knows how to parse
//! user input, check a stored JSON value, format it for display and project it
//! onto the shared 0-10 analysis scale.

use crate::error::FieldError;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Upper end of the common analysis scale; booleans map to 0 or this value
pub const SCALE_MAX: f64 = 10.0;

/// Value kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Numeric,
    Boolean,
    Text,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Numeric => "numeric",
            FieldKind::Boolean => "boolean",
            FieldKind::Text => "text",
        }
    }

    /// Parse raw user input into a JSON value of this kind
    pub fn parse(&self, raw: &str) -> Result<Value, FieldError> {
        match self {
            FieldKind::Numeric => parse_number(raw),
            FieldKind::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" | "true" | "1" => Ok(Value::Bool(true)),
                "n" | "no" | "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(FieldError::NotABoolean(raw.to_string())),
            },
            FieldKind::Text => Ok(Value::String(raw.to_string())),
        }
    }

    /// Check that a stored value has the JSON type this kind expects
    pub fn check(&self, value: &Value) -> Result<(), FieldError> {
        let ok = match self {
            FieldKind::Numeric => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Text => value.is_string(),
        };
        if ok {
            Ok(())
        } else {
            Err(FieldError::WrongType {
                expected: self.as_str(),
                actual: json_type_name(value),
            })
        }
    }

    /// Human-readable rendering of a stored value
    pub fn format(&self, value: &Value) -> String {
        match (self, value) {
            (FieldKind::Boolean, Value::Bool(true)) => "yes".to_string(),
            (FieldKind::Boolean, Value::Bool(false)) => "no".to_string(),
            (_, Value::String(s)) => s.clone(),
            (_, other) => other.to_string(),
        }
    }

    /// Project a stored value onto the 0-10 analysis scale.
    ///
    /// Numbers pass through unchanged, booleans become 0 or 10 and text has
    /// no numeric projection.
    pub fn scaled(&self, value: &Value) -> Option<f64> {
        match (self, value) {
            (FieldKind::Numeric, Value::Number(n)) => n.as_f64(),
            (FieldKind::Boolean, Value::Bool(b)) => Some(if *b { SCALE_MAX } else { 0.0 }),
            _ => None,
        }
    }
}

fn parse_number(raw: &str) -> Result<Value, FieldError> {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Ok(Value::Number(i.into()));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| FieldError::NotANumber(raw.to_string()))
}

/// JSON type name used in diagnostics
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "numeric",
        Value::String(_) => "text",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Inclusive numeric range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Rule marking a field as implicit: true when `keyword` occurs in `source`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeriveRule {
    pub source: String,
    pub keyword: String,
}

impl DeriveRule {
    /// Evaluate the rule against the source field's stored value.
    ///
    /// A missing source counts as no match. Boolean sources (derived fields
    /// feeding other derived fields) are matched on `true`/`false`.
    pub fn evaluate(&self, source: Option<&Value>) -> bool {
        match source {
            Some(Value::String(text)) => text.contains(&self.keyword),
            Some(Value::Bool(b)) => (if *b { "true" } else { "false" }).contains(&self.keyword),
            _ => false,
        }
    }
}

fn default_active() -> bool {
    true
}

/// Declaration of a single journal field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derive: Option<DeriveRule>,
    /// Whether the field is still collected for new days
    #[serde(default = "default_active")]
    pub active: bool,
}

impl FieldSpec {
    pub fn numeric(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Numeric,
            range: Some(ValueRange::new(min, max)),
            derive: None,
            active: true,
        }
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Boolean,
            range: None,
            derive: None,
            active: true,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text,
            range: None,
            derive: None,
            active: true,
        }
    }

    /// Boolean field computed from a keyword in another field
    pub fn derived(
        name: impl Into<String>,
        source: impl Into<String>,
        keyword: impl Into<String>,
    ) -> Self {
        Self {
            derive: Some(DeriveRule {
                source: source.into(),
                keyword: keyword.into(),
            }),
            ..Self::boolean(name)
        }
    }

    /// Mark the field as historical (present in old records, no longer collected)
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == FieldKind::Numeric
    }

    pub fn is_boolean(&self) -> bool {
        self.kind == FieldKind::Boolean
    }

    pub fn is_text(&self) -> bool {
        self.kind == FieldKind::Text
    }

    pub fn is_derived(&self) -> bool {
        self.derive.is_some()
    }

    /// Type and range check of a stored value
    pub fn validate(&self, value: &Value) -> Result<(), FieldError> {
        self.kind.check(value)?;
        if let (Some(range), Some(v)) = (self.range, value.as_f64()) {
            if !range.contains(v) {
                return Err(FieldError::OutOfRange {
                    value: v,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        Ok(())
    }

    /// Parse and validate raw user input
    pub fn parse_input(&self, raw: &str) -> Result<Value, FieldError> {
        let value = self.kind.parse(raw)?;
        self.validate(&value)?;
        Ok(value)
    }

    /// Stored value projected onto the 0-10 scale
    pub fn scaled(&self, value: &Value) -> Option<f64> {
        self.kind.scaled(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_numeric() {
        assert_eq!(FieldKind::Numeric.parse("7").unwrap(), json!(7));
        assert_eq!(FieldKind::Numeric.parse(" 6.5 ").unwrap(), json!(6.5));
        assert!(matches!(
            FieldKind::Numeric.parse("seven"),
            Err(FieldError::NotANumber(_))
        ));
        assert!(FieldKind::Numeric.parse("NaN").is_err());
    }

    #[test]
    fn test_parse_boolean() {
        assert_eq!(FieldKind::Boolean.parse("y").unwrap(), json!(true));
        assert_eq!(FieldKind::Boolean.parse("No").unwrap(), json!(false));
        assert!(FieldKind::Boolean.parse("maybe").is_err());
    }

    #[test]
    fn test_range_validation() {
        let sat = FieldSpec::numeric("sat", 0.0, 10.0);
        assert!(sat.parse_input("10").is_ok());
        assert_eq!(
            sat.parse_input("11").unwrap_err(),
            FieldError::OutOfRange {
                value: 11.0,
                min: 0.0,
                max: 10.0
            }
        );
        assert!(matches!(
            sat.validate(&json!("7")),
            Err(FieldError::WrongType { .. })
        ));
    }

    #[test]
    fn test_scaled_projection() {
        assert_eq!(FieldKind::Boolean.scaled(&json!(true)), Some(10.0));
        assert_eq!(FieldKind::Boolean.scaled(&json!(false)), Some(0.0));
        assert_eq!(FieldKind::Numeric.scaled(&json!(4)), Some(4.0));
        assert_eq!(FieldKind::Text.scaled(&json!("x")), None);
        assert_eq!(FieldKind::Numeric.scaled(&json!(true)), None);
    }

    #[test]
    fn test_derive_rule() {
        let rule = DeriveRule {
            source: "text".to_string(),
            keyword: "PAIN".to_string(),
        };
        assert!(rule.evaluate(Some(&json!("PAIN, bad night"))));
        assert!(!rule.evaluate(Some(&json!("pain lowercase"))));
        assert!(!rule.evaluate(None));
    }

    #[test]
    fn test_field_spec_defaults_active() {
        let spec: FieldSpec = serde_json::from_value(json!({"name": "sat", "kind": "numeric"})).unwrap();
        assert!(spec.active);
        assert_eq!(spec.range, None);

        let retired: FieldSpec =
            serde_json::from_value(json!({"name": "fz", "kind": "numeric", "active": false})).unwrap();
        assert!(!retired.active);
    }
}
