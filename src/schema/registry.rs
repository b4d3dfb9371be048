//! Schema registry
//!
//! Ordered set of field declarations, validated once at construction. The
//! registry resolves names, partitions active and historical fields and
//! computes implicit fields in dependency order.

use crate::error::{JournalError, JournalResult};
use crate::schema::field::{FieldKind, FieldSpec};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Key reserved for the record date
pub const DATE_KEY: &str = "date";

/// Validated, ordered collection of field declarations
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    positions: HashMap<String, usize>,
    /// Indices of derived fields, sources before dependents
    derivation_order: Vec<usize>,
}

impl Schema {
    /// Build a schema, rejecting duplicates, bad ranges, dangling sources and
    /// derivation cycles
    pub fn new(fields: Vec<FieldSpec>) -> JournalResult<Self> {
        let mut positions = HashMap::with_capacity(fields.len());
        for (idx, spec) in fields.iter().enumerate() {
            if spec.name.is_empty() || spec.name == DATE_KEY {
                return Err(invalid(&spec.name, "reserved or empty field name"));
            }
            if positions.insert(spec.name.clone(), idx).is_some() {
                return Err(invalid(&spec.name, "declared more than once"));
            }
            if let Some(range) = spec.range {
                if spec.kind != FieldKind::Numeric {
                    return Err(invalid(&spec.name, "range on a non-numeric field"));
                }
                if !(range.min < range.max) {
                    return Err(invalid(&spec.name, "range minimum must be below maximum"));
                }
            }
            if spec.is_derived() && spec.kind != FieldKind::Boolean {
                return Err(invalid(&spec.name, "derived fields must be boolean"));
            }
        }

        for spec in fields.iter() {
            if let Some(rule) = &spec.derive {
                let source = positions
                    .get(&rule.source)
                    .map(|&i| &fields[i])
                    .ok_or_else(|| JournalError::UnknownField(rule.source.clone()))?;
                if !(source.is_text() || source.is_derived()) {
                    return Err(invalid(
                        &spec.name,
                        "derivation source must be a text or derived field",
                    ));
                }
            }
        }

        let derivation_order = derivation_order(&fields, &positions)?;

        Ok(Self {
            fields,
            positions,
            derivation_order,
        })
    }

    /// Look up a field declaration by name
    pub fn resolve(&self, name: &str) -> JournalResult<&FieldSpec> {
        self.get(name)
            .ok_or_else(|| JournalError::UnknownField(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.positions.get(name).map(|&i| &self.fields[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Declaration position, used for field ordering
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// All fields, active and historical, in declaration order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn active_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.active)
    }

    /// Active fields whose values are entered by hand
    pub fn explicit_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.active_fields().filter(|f| !f.is_derived())
    }

    /// Derived fields in evaluation order.
    ///
    /// This is declaration order, except that a derived field whose source is
    /// itself derived always comes after that source.
    pub fn derived_fields(&self) -> Vec<&FieldSpec> {
        self.derivation_order
            .iter()
            .map(|&i| &self.fields[i])
            .collect()
    }

    /// Recompute derived fields from their sources.
    ///
    /// Historical derived fields are only refreshed where the record already
    /// carries them.
    pub fn apply_derivations(&self, fields: &mut Map<String, Value>) {
        for spec in self.derived_fields() {
            if !spec.active && !fields.contains_key(&spec.name) {
                continue;
            }
            if let Some(rule) = &spec.derive {
                let flag = rule.evaluate(fields.get(&rule.source));
                fields.insert(spec.name.clone(), Value::Bool(flag));
            }
        }
    }
}

fn invalid(field: &str, reason: &str) -> JournalError {
    JournalError::InvalidSchema {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Post-order walk over derivation chains; every derived field has exactly one
/// source, so a chain revisiting one of its own members is a cycle.
fn derivation_order(
    fields: &[FieldSpec],
    positions: &HashMap<String, usize>,
) -> JournalResult<Vec<usize>> {
    let mut order = Vec::new();
    let mut emitted = HashSet::new();

    for start in 0..fields.len() {
        if !fields[start].is_derived() || emitted.contains(&start) {
            continue;
        }

        let mut chain = vec![start];
        let mut on_chain = HashSet::from([start]);
        let mut current = start;
        while let Some(rule) = &fields[current].derive {
            let Some(&next) = positions.get(&rule.source) else {
                break;
            };
            if !fields[next].is_derived() || emitted.contains(&next) {
                break;
            }
            if !on_chain.insert(next) {
                return Err(JournalError::SchemaCycle(fields[next].name.clone()));
            }
            chain.push(next);
            current = next;
        }

        for idx in chain.into_iter().rev() {
            if emitted.insert(idx) {
                order.push(idx);
            }
        }
    }

    Ok(order)
}
