//! Derivation rules for computed panel properties
//!
//! A derived property takes the value of another property of the same
//! channel and maps it through a small declarative rule, for example a
//! battery percentage into `ok`/`low`. The registry only stores rules by
//! name; [`DerivationRule::evaluate`] is offered to consumers that apply them.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::value::PropertyValue;

/// One breakpoint of a threshold rule, bounds inclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    pub value: String,
}

impl ThresholdEntry {
    fn contains(&self, n: f64) -> bool {
        self.min.map_or(true, |min| n >= min) && self.max.map_or(true, |max| n <= max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DerivationRule {
    /// Ordered breakpoints, first match wins
    Threshold { thresholds: Vec<ThresholdEntry> },
    BooleanMap {
        true_value: String,
        false_value: String,
    },
    /// Cover position (0 closed, 100 open) to a status string
    PositionStatus {
        closed_value: String,
        opened_value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partial_value: Option<String>,
    },
}

impl DerivationRule {
    pub fn kind(&self) -> &'static str {
        match self {
            DerivationRule::Threshold { .. } => "threshold",
            DerivationRule::BooleanMap { .. } => "boolean_map",
            DerivationRule::PositionStatus { .. } => "position_status",
        }
    }

    /// Compute the derived value from the source property's value
    ///
    /// Returns `None` when the source value cannot drive this rule; callers
    /// then fall back to the source value.
    pub fn evaluate(&self, source: &PropertyValue) -> Option<PropertyValue> {
        match self {
            DerivationRule::Threshold { thresholds } => {
                let n = numeric(source)?;
                thresholds
                    .iter()
                    .find(|entry| entry.contains(n))
                    .map(|entry| PropertyValue::String(entry.value.clone()))
            }
            DerivationRule::BooleanMap {
                true_value,
                false_value,
            } => {
                let state = match source {
                    PropertyValue::Bool(b) => *b,
                    PropertyValue::Int(_) | PropertyValue::Float(_) => numeric(source)? != 0.0,
                    PropertyValue::String(s) => match s.trim().to_lowercase().as_str() {
                        "true" | "1" | "on" | "yes" => true,
                        "false" | "0" | "off" | "no" => false,
                        _ => return None,
                    },
                    _ => return None,
                };
                let text = if state { true_value } else { false_value };
                Some(PropertyValue::String(text.clone()))
            }
            DerivationRule::PositionStatus {
                closed_value,
                opened_value,
                partial_value,
            } => {
                let position = numeric(source)?;
                let text = if position <= 0.0 {
                    closed_value
                } else if position >= 100.0 {
                    opened_value
                } else {
                    partial_value.as_ref().unwrap_or(closed_value)
                };
                Some(PropertyValue::String(text.clone()))
            }
        }
    }
}

fn numeric(value: &PropertyValue) -> Option<f64> {
    let n = match value {
        PropertyValue::String(s) => s.trim().parse::<f64>().ok()?,
        other => other.as_f64()?,
    };
    (!n.is_nan()).then_some(n)
}

/// A named, reusable derivation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivationDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub rule: DerivationRule,
}

/// Root of the shared derivation-rules document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivationRulesDocument {
    pub version: String,
    #[serde(default)]
    pub derivations: BTreeMap<String, DerivationDefinition>,
}

/// Name to derivation lookup
#[derive(Debug, Default)]
pub struct DerivationRegistry {
    derivations: RwLock<HashMap<String, Arc<DerivationDefinition>>>,
}

impl DerivationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or overwrite a derivation
    pub fn register(&self, name: &str, definition: DerivationDefinition) {
        self.derivations
            .write()
            .insert(name.to_string(), Arc::new(definition));
    }

    pub fn register_all(&self, definitions: &BTreeMap<String, DerivationDefinition>) {
        let mut derivations = self.derivations.write();
        for (name, definition) in definitions {
            derivations.insert(name.clone(), Arc::new(definition.clone()));
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<DerivationDefinition>> {
        self.derivations.read().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.derivations.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.derivations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.derivations.read().keys().cloned().collect();
        names.sort();
        names
    }
}
