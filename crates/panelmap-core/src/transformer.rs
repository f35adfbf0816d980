//! Value transformers between device-native and panel representations
//!
//! Definitions are declared in mapping files (named, under `transformers:`)
//! or inline on a property (`transform:`). They are compiled once into a
//! [`Transformer`], which converts device values to panel values with
//! [`Transformer::read`] and back with [`Transformer::write`].
//!
//! Numeric transformers pass `NaN` and infinities through untouched and
//! never divide by a collapsed range.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::formula::{Formula, FormulaError};
use crate::model::{ResolvedProperty, TransformDirection};
use crate::value::PropertyValue;

/// A named transformer declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformerDefinition {
    Scale {
        #[serde(default)]
        direction: TransformDirection,
        input_range: [f64; 2],
        output_range: [f64; 2],
    },
    Map {
        #[serde(default)]
        direction: TransformDirection,
        #[serde(default)]
        read: Option<BTreeMap<String, serde_json::Value>>,
        #[serde(default)]
        write: Option<BTreeMap<String, serde_json::Value>>,
        #[serde(default)]
        bidirectional: Option<BTreeMap<String, serde_json::Value>>,
        #[serde(default)]
        write_formula: Option<String>,
    },
    Boolean {
        #[serde(default)]
        direction: TransformDirection,
        true_value: serde_json::Value,
        false_value: serde_json::Value,
        #[serde(default)]
        invert: bool,
    },
    Clamp {
        #[serde(default)]
        direction: TransformDirection,
        min: f64,
        max: f64,
    },
    Round {
        #[serde(default)]
        direction: TransformDirection,
        #[serde(default)]
        precision: u32,
    },
    Formula {
        #[serde(default)]
        direction: TransformDirection,
        #[serde(default)]
        read: Option<String>,
        #[serde(default)]
        write: Option<String>,
    },
}

/// Transform declared directly on a property
///
/// The kind is taken from `type` when present, otherwise inferred from the
/// fields that are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InlineTransform {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_range: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_range: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invert: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<BTreeMap<String, serde_json::Value>>,
    /// Formula string, or a read lookup table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<serde_json::Value>,
    /// Formula string, or a write lookup table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write: Option<serde_json::Value>,
}

fn table(value: &Option<serde_json::Value>) -> Option<BTreeMap<String, serde_json::Value>> {
    value.as_ref().and_then(|v| v.as_object()).map(|obj| {
        obj.iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    })
}

fn formula_text(value: &Option<serde_json::Value>) -> Option<String> {
    value.as_ref().and_then(|v| v.as_str()).map(str::to_string)
}

impl InlineTransform {
    /// Equivalent named definition, or `None` for a passthrough
    pub fn to_definition(&self) -> Option<TransformerDefinition> {
        let scale = || TransformerDefinition::Scale {
            direction: TransformDirection::Bidirectional,
            input_range: self.input_range.unwrap_or([0.0, 100.0]),
            output_range: self.output_range.unwrap_or([0.0, 100.0]),
        };
        let boolean = || TransformerDefinition::Boolean {
            direction: TransformDirection::Bidirectional,
            true_value: self.true_value.clone().unwrap_or(serde_json::Value::Bool(true)),
            false_value: self.false_value.clone().unwrap_or(serde_json::Value::Bool(false)),
            invert: self.invert.unwrap_or(false),
        };
        let map = || TransformerDefinition::Map {
            direction: TransformDirection::Bidirectional,
            read: table(&self.read),
            write: table(&self.write),
            bidirectional: self.values.clone(),
            write_formula: None,
        };
        let formula = || TransformerDefinition::Formula {
            direction: TransformDirection::Bidirectional,
            read: formula_text(&self.read),
            write: formula_text(&self.write),
        };

        match self.kind.as_deref().map(str::to_lowercase).as_deref() {
            Some("scale") => return Some(scale()),
            Some("boolean") => return Some(boolean()),
            Some("map") => return Some(map()),
            Some("formula") => return Some(formula()),
            _ => {}
        }

        if self.input_range.is_some() && self.output_range.is_some() {
            Some(scale())
        } else if self.true_value.is_some() || self.false_value.is_some() {
            Some(boolean())
        } else if self.values.is_some() || table(&self.read).is_some() {
            Some(map())
        } else if formula_text(&self.read).is_some() || formula_text(&self.write).is_some() {
            Some(formula())
        } else {
            None
        }
    }
}

/// Non-fatal problem found while compiling a transformer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformerIssue {
    #[error("degenerate {side} range [{min}, {max}], collapsed to {min}")]
    DegenerateRange {
        side: &'static str,
        min: f64,
        max: f64,
    },
    #[error("clamp bounds are inverted (min {min} > max {max})")]
    InvertedBounds { min: f64, max: f64 },
    #[error("formula rejected, value will pass through: {0}")]
    UnsafeFormula(#[from] FormulaError),
}

#[derive(Debug, Clone)]
pub struct ScaleTransformer {
    input: [f64; 2],
    output: [f64; 2],
}

impl ScaleTransformer {
    fn project(value: f64, from: [f64; 2], to: [f64; 2]) -> f64 {
        if from[0] == from[1] {
            return to[0];
        }
        let ratio = (value - from[0]) / (from[1] - from[0]);
        (to[0] + ratio * (to[1] - to[0])).round()
    }

    fn read(&self, value: &PropertyValue) -> PropertyValue {
        match value.as_f64() {
            Some(n) if n.is_finite() => {
                PropertyValue::from_number(Self::project(n, self.input, self.output))
            }
            _ => value.clone(),
        }
    }

    fn write(&self, value: &PropertyValue) -> PropertyValue {
        match value.as_f64() {
            Some(n) if n.is_finite() => {
                PropertyValue::from_number(Self::project(n, self.output, self.input))
            }
            _ => value.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MapTransformer {
    read_table: HashMap<String, PropertyValue>,
    write_table: HashMap<String, PropertyValue>,
    write_formula: Option<Formula>,
}

impl MapTransformer {
    fn read(&self, value: &PropertyValue) -> PropertyValue {
        self.read_table
            .get(&value.lookup_key())
            .cloned()
            .unwrap_or_else(|| value.clone())
    }

    fn write(&self, value: &PropertyValue) -> PropertyValue {
        if let Some(mapped) = self.write_table.get(&value.lookup_key()) {
            return mapped.clone();
        }
        if let (Some(formula), Some(n)) = (&self.write_formula, value.as_f64()) {
            return match formula.evaluate(n) {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "Map write formula failed, passing value through");
                    value.clone()
                }
            };
        }
        value.clone()
    }
}

#[derive(Debug, Clone)]
pub struct BooleanTransformer {
    true_value: PropertyValue,
    false_value: PropertyValue,
    invert: bool,
}

fn same_value(a: &PropertyValue, b: &PropertyValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

impl BooleanTransformer {
    fn read(&self, value: &PropertyValue) -> PropertyValue {
        let state = if same_value(value, &self.true_value) {
            true
        } else if same_value(value, &self.false_value) {
            false
        } else {
            value.truthy()
        };
        PropertyValue::Bool(state != self.invert)
    }

    fn write(&self, value: &PropertyValue) -> PropertyValue {
        if value.truthy() != self.invert {
            self.true_value.clone()
        } else {
            self.false_value.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClampTransformer {
    min: f64,
    max: f64,
}

impl ClampTransformer {
    fn apply(&self, value: &PropertyValue) -> PropertyValue {
        match value.as_f64() {
            Some(n) if n.is_finite() => PropertyValue::from_number(self.min.max(self.max.min(n))),
            _ => value.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoundTransformer {
    factor: f64,
}

impl RoundTransformer {
    fn apply(&self, value: &PropertyValue) -> PropertyValue {
        match value.as_f64() {
            Some(n) if n.is_finite() => {
                let scaled = n * self.factor;
                if scaled.is_finite() {
                    PropertyValue::from_number(scaled.round() / self.factor)
                } else {
                    value.clone()
                }
            }
            _ => value.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormulaTransformer {
    read: Option<Formula>,
    write: Option<Formula>,
    rejected_read: Option<String>,
    rejected_write: Option<String>,
}

impl FormulaTransformer {
    fn run(formula: Option<&Formula>, rejected: Option<&String>, value: &PropertyValue) -> PropertyValue {
        let Some(formula) = formula else {
            if let Some(source) = rejected {
                debug!(formula = %source, "Formula was not compiled, returning value unchanged");
            }
            return value.clone();
        };
        let input = match value {
            PropertyValue::String(s) => s.trim().parse::<f64>().ok(),
            other => other.as_f64(),
        };
        let Some(input) = input else {
            return value.clone();
        };
        match formula.evaluate(input) {
            Ok(result) => result,
            Err(e) => {
                warn!(formula = %formula.source(), error = %e, "Formula evaluation failed");
                value.clone()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum TransformerKind {
    Identity,
    Scale(ScaleTransformer),
    Map(MapTransformer),
    Boolean(BooleanTransformer),
    Clamp(ClampTransformer),
    Round(RoundTransformer),
    Formula(FormulaTransformer),
}

/// A compiled, immutable value converter
#[derive(Debug, Clone)]
pub struct Transformer {
    direction: TransformDirection,
    kind: TransformerKind,
}

fn compile_formula(source: &Option<String>, issues: &mut Vec<TransformerIssue>) -> (Option<Formula>, Option<String>) {
    match source {
        None => (None, None),
        Some(text) => match Formula::compile(text) {
            Ok(formula) => (Some(formula), None),
            Err(e) => {
                warn!(formula = %text, error = %e, "Rejected unsafe or invalid formula");
                issues.push(TransformerIssue::UnsafeFormula(e));
                (None, Some(text.clone()))
            }
        },
    }
}

fn to_values(entries: &BTreeMap<String, serde_json::Value>) -> impl Iterator<Item = (String, PropertyValue)> + '_ {
    entries.iter().map(|(k, v)| (k.clone(), PropertyValue::from(v)))
}

impl Transformer {
    /// Passthrough transformer
    pub fn identity() -> Self {
        Self {
            direction: TransformDirection::Bidirectional,
            kind: TransformerKind::Identity,
        }
    }

    /// Compile a definition, reporting non-fatal issues alongside
    pub fn compile(definition: &TransformerDefinition) -> (Self, Vec<TransformerIssue>) {
        let mut issues = Vec::new();

        let (direction, kind) = match definition {
            TransformerDefinition::Scale {
                direction,
                input_range,
                output_range,
            } => {
                for (side, range) in [("input", input_range), ("output", output_range)] {
                    if range[0] == range[1] {
                        warn!(side, min = range[0], "Scale transformer has a degenerate range");
                        issues.push(TransformerIssue::DegenerateRange {
                            side,
                            min: range[0],
                            max: range[1],
                        });
                    }
                }
                (
                    *direction,
                    TransformerKind::Scale(ScaleTransformer {
                        input: *input_range,
                        output: *output_range,
                    }),
                )
            }
            TransformerDefinition::Map {
                direction,
                read,
                write,
                bidirectional,
                write_formula,
            } => {
                let mut read_table = HashMap::new();
                let mut write_table = HashMap::new();
                if let Some(entries) = read {
                    read_table.extend(to_values(entries));
                }
                if let Some(entries) = write {
                    write_table.extend(to_values(entries));
                }
                if let Some(entries) = bidirectional {
                    for (key, value) in to_values(entries) {
                        write_table.insert(value.lookup_key(), PropertyValue::String(key.clone()));
                        read_table.insert(key, value);
                    }
                }
                let (write_formula, _) = compile_formula(write_formula, &mut issues);
                (
                    *direction,
                    TransformerKind::Map(MapTransformer {
                        read_table,
                        write_table,
                        write_formula,
                    }),
                )
            }
            TransformerDefinition::Boolean {
                direction,
                true_value,
                false_value,
                invert,
            } => (
                *direction,
                TransformerKind::Boolean(BooleanTransformer {
                    true_value: PropertyValue::from(true_value),
                    false_value: PropertyValue::from(false_value),
                    invert: *invert,
                }),
            ),
            TransformerDefinition::Clamp { direction, min, max } => {
                if min > max {
                    issues.push(TransformerIssue::InvertedBounds {
                        min: *min,
                        max: *max,
                    });
                }
                (
                    *direction,
                    TransformerKind::Clamp(ClampTransformer {
                        min: *min,
                        max: *max,
                    }),
                )
            }
            TransformerDefinition::Round {
                direction,
                precision,
            } => (
                *direction,
                TransformerKind::Round(RoundTransformer {
                    factor: 10f64.powi((*precision).min(15) as i32),
                }),
            ),
            TransformerDefinition::Formula {
                direction,
                read,
                write,
            } => {
                let (read, rejected_read) = compile_formula(read, &mut issues);
                let (write, rejected_write) = compile_formula(write, &mut issues);
                (
                    *direction,
                    TransformerKind::Formula(FormulaTransformer {
                        read,
                        write,
                        rejected_read,
                        rejected_write,
                    }),
                )
            }
        };

        (Self { direction, kind }, issues)
    }

    /// Compile an inline transform; unrecognised shapes become identity
    pub fn from_inline(transform: &InlineTransform) -> (Self, Vec<TransformerIssue>) {
        match transform.to_definition() {
            Some(definition) => Self::compile(&definition),
            None => (Self::identity(), Vec::new()),
        }
    }

    pub fn direction(&self) -> TransformDirection {
        self.direction
    }

    pub fn kind(&self) -> &TransformerKind {
        &self.kind
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.kind, TransformerKind::Identity)
    }

    pub fn can_read(&self) -> bool {
        self.direction.can_read()
    }

    pub fn can_write(&self) -> bool {
        self.direction.can_write()
    }

    /// Device value to panel value; passthrough on write-only transformers
    pub fn read(&self, value: &PropertyValue) -> PropertyValue {
        if !self.can_read() {
            return value.clone();
        }
        match &self.kind {
            TransformerKind::Identity => value.clone(),
            TransformerKind::Scale(t) => t.read(value),
            TransformerKind::Map(t) => t.read(value),
            TransformerKind::Boolean(t) => t.read(value),
            TransformerKind::Clamp(t) => t.apply(value),
            TransformerKind::Round(t) => t.apply(value),
            TransformerKind::Formula(t) => {
                FormulaTransformer::run(t.read.as_ref(), t.rejected_read.as_ref(), value)
            }
        }
    }

    /// Panel value to device value; passthrough on read-only transformers
    pub fn write(&self, value: &PropertyValue) -> PropertyValue {
        if !self.can_write() {
            return value.clone();
        }
        match &self.kind {
            TransformerKind::Identity => value.clone(),
            TransformerKind::Scale(t) => t.write(value),
            TransformerKind::Map(t) => t.write(value),
            TransformerKind::Boolean(t) => t.write(value),
            TransformerKind::Clamp(t) => t.apply(value),
            TransformerKind::Round(t) => t.apply(value),
            TransformerKind::Formula(t) => {
                FormulaTransformer::run(t.write.as_ref(), t.rejected_write.as_ref(), value)
            }
        }
    }
}

/// Transformer compiled from a property's inline `transform:` at load time
#[derive(Debug, Clone)]
pub struct CompiledTransform(Arc<Transformer>);

impl CompiledTransform {
    pub fn new(transformer: Transformer) -> Self {
        Self(Arc::new(transformer))
    }

    pub fn transformer(&self) -> Arc<Transformer> {
        self.0.clone()
    }
}

/// Always equal: the compiled form follows `inline_transform`, which is compared instead
impl PartialEq for CompiledTransform {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

/// Transformers registered before any mapping file is read
pub fn builtin_transformers() -> Vec<(&'static str, TransformerDefinition)> {
    use serde_json::Value;

    vec![
        (
            "boolean_state",
            TransformerDefinition::Boolean {
                direction: TransformDirection::Bidirectional,
                true_value: Value::Bool(true),
                false_value: Value::Bool(false),
                invert: false,
            },
        ),
        (
            "boolean_inverted",
            TransformerDefinition::Boolean {
                direction: TransformDirection::Bidirectional,
                true_value: Value::Bool(true),
                false_value: Value::Bool(false),
                invert: true,
            },
        ),
        (
            "percent_to_byte",
            TransformerDefinition::Scale {
                direction: TransformDirection::Bidirectional,
                input_range: [0.0, 255.0],
                output_range: [0.0, 100.0],
            },
        ),
        (
            "percent_clamp",
            TransformerDefinition::Clamp {
                direction: TransformDirection::Bidirectional,
                min: 0.0,
                max: 100.0,
            },
        ),
        (
            "round_1",
            TransformerDefinition::Round {
                direction: TransformDirection::ReadOnly,
                precision: 1,
            },
        ),
    ]
}

/// Name to transformer lookup
///
/// Lookups never fail: unknown names resolve to a shared identity
/// transformer so a typo degrades to passthrough.
#[derive(Debug)]
pub struct TransformerRegistry {
    transformers: RwLock<HashMap<String, Arc<Transformer>>>,
    identity: Arc<Transformer>,
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            transformers: RwLock::new(HashMap::new()),
            identity: Arc::new(Transformer::identity()),
        }
    }

    /// Create a registry holding the built-in transformers
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for (name, definition) in builtin_transformers() {
            registry.register(name, &definition);
        }
        registry
    }

    /// Register or overwrite a transformer
    pub fn register(&self, name: &str, definition: &TransformerDefinition) -> Vec<TransformerIssue> {
        let (transformer, issues) = Transformer::compile(definition);
        self.transformers
            .write()
            .insert(name.to_string(), Arc::new(transformer));
        issues
    }

    /// Register every definition, returning issues keyed by name
    pub fn register_all(
        &self,
        definitions: &BTreeMap<String, TransformerDefinition>,
    ) -> Vec<(String, TransformerIssue)> {
        definitions
            .iter()
            .flat_map(|(name, definition)| {
                self.register(name, definition)
                    .into_iter()
                    .map(move |issue| (name.clone(), issue))
            })
            .collect()
    }

    /// Look up a transformer, identity when unknown
    pub fn get(&self, name: &str) -> Arc<Transformer> {
        self.try_get(name).unwrap_or_else(|| {
            debug!(name, "Unknown transformer, using identity");
            self.identity.clone()
        })
    }

    pub fn try_get(&self, name: &str) -> Option<Arc<Transformer>> {
        self.transformers.read().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.transformers.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.transformers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.transformers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Transformer for a resolved property: inline first, then named
    pub fn for_property(&self, property: &ResolvedProperty) -> Arc<Transformer> {
        if let Some(compiled) = &property.compiled_transform {
            return compiled.transformer();
        }
        // Records built outside the loader carry no compiled form
        if let Some(inline) = &property.inline_transform {
            let (transformer, _) = Transformer::from_inline(inline);
            return Arc::new(transformer);
        }
        match &property.transformer_name {
            Some(name) => self.get(name),
            None => self.identity.clone(),
        }
    }
}
