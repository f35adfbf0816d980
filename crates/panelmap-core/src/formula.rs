//! Restricted arithmetic formulas
//!
//! Formulas come from mapping files, including the user-writable tier, so
//! they are compiled once into an expression tree and checked against a
//! whitelist before use. The grammar is limited to numeric and boolean
//! literals, arithmetic, comparisons, logic, a fixed set of math functions,
//! and the single input variable `value`. Nothing is ever handed to a general
//! purpose interpreter.

use evalexpr::{
    build_operator_tree, ContextWithMutableVariables, HashMapContext, Node, Operator, Value,
};
use thiserror::Error;

use crate::value::PropertyValue;

/// Name of the only variable a formula may read
pub const INPUT_VARIABLE: &str = "value";

/// Functions a formula may call
pub const ALLOWED_FUNCTIONS: &[&str] = &[
    "min",
    "max",
    "floor",
    "ceil",
    "round",
    "if",
    "math::abs",
    "math::sqrt",
    "math::pow",
    "math::exp",
    "math::ln",
    "math::log",
    "math::log2",
    "math::log10",
];

/// Longest formula source accepted, in characters
pub const MAX_FORMULA_LENGTH: usize = 1024;

/// Deepest bracket nesting accepted
pub const MAX_NESTING_DEPTH: usize = 64;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("failed to parse formula '{formula}': {reason}")]
    Parse { formula: String, reason: String },
    #[error("formula '{formula}' reads variable '{name}', only '{INPUT_VARIABLE}' is allowed")]
    DisallowedVariable { formula: String, name: String },
    #[error("formula '{formula}' calls '{name}', which is not an allowed function")]
    DisallowedFunction { formula: String, name: String },
    #[error("formula '{formula}' contains a disallowed construct: {construct}")]
    DisallowedConstruct { formula: String, construct: String },
    #[error("formula evaluation failed: {0}")]
    Evaluation(String),
}

/// A compiled, validated formula
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    tree: Node,
}

impl Formula {
    /// Parse and validate a formula
    pub fn compile(source: &str) -> Result<Self, FormulaError> {
        check_bounds(source)?;

        let tree = build_operator_tree(source).map_err(|e| FormulaError::Parse {
            formula: source.to_string(),
            reason: e.to_string(),
        })?;

        for node in tree.iter() {
            check_node(source, node.operator())?;
        }

        Ok(Self {
            source: source.to_string(),
            tree,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate with `value` bound to the given number
    pub fn evaluate(&self, input: f64) -> Result<PropertyValue, FormulaError> {
        let mut context = HashMapContext::new();
        context
            .set_value(INPUT_VARIABLE.to_string(), Value::Float(input))
            .map_err(|e| FormulaError::Evaluation(e.to_string()))?;

        let result = self
            .tree
            .eval_with_context(&context)
            .map_err(|e| FormulaError::Evaluation(e.to_string()))?;

        match result {
            Value::Float(f) => Ok(PropertyValue::from_number(f)),
            Value::Int(i) => Ok(PropertyValue::Int(i)),
            Value::Boolean(b) => Ok(PropertyValue::Bool(b)),
            other => Err(FormulaError::Evaluation(format!(
                "formula '{}' produced a non-numeric result: {}",
                self.source, other
            ))),
        }
    }
}

/// Reject sources whose tree would be too deep to walk safely
fn check_bounds(formula: &str) -> Result<(), FormulaError> {
    let length = formula.chars().count();
    if length > MAX_FORMULA_LENGTH {
        return Err(FormulaError::DisallowedConstruct {
            formula: truncated(formula),
            construct: format!("{} characters, at most {} allowed", length, MAX_FORMULA_LENGTH),
        });
    }

    let mut depth = 0usize;
    for c in formula.chars() {
        match c {
            '(' => {
                depth += 1;
                if depth > MAX_NESTING_DEPTH {
                    return Err(FormulaError::DisallowedConstruct {
                        formula: truncated(formula),
                        construct: format!("nesting deeper than {} levels", MAX_NESTING_DEPTH),
                    });
                }
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

fn truncated(formula: &str) -> String {
    let mut short: String = formula.chars().take(64).collect();
    if short.len() < formula.len() {
        short.push_str("...");
    }
    short
}

fn check_node(formula: &str, operator: &Operator) -> Result<(), FormulaError> {
    match operator {
        Operator::RootNode
        | Operator::Add
        | Operator::Sub
        | Operator::Neg
        | Operator::Mul
        | Operator::Div
        | Operator::Mod
        | Operator::Exp
        | Operator::Eq
        | Operator::Neq
        | Operator::Gt
        | Operator::Lt
        | Operator::Geq
        | Operator::Leq
        | Operator::And
        | Operator::Or
        | Operator::Not
        | Operator::Tuple => Ok(()),
        Operator::Const { value } => match value {
            Value::Int(_) | Value::Float(_) | Value::Boolean(_) => Ok(()),
            other => Err(FormulaError::DisallowedConstruct {
                formula: formula.to_string(),
                construct: format!("literal {}", other),
            }),
        },
        Operator::VariableIdentifierRead { identifier } => {
            if identifier == INPUT_VARIABLE {
                Ok(())
            } else {
                Err(FormulaError::DisallowedVariable {
                    formula: formula.to_string(),
                    name: identifier.clone(),
                })
            }
        }
        Operator::FunctionIdentifier { identifier } => {
            if ALLOWED_FUNCTIONS.contains(&identifier.as_str()) {
                Ok(())
            } else {
                Err(FormulaError::DisallowedFunction {
                    formula: formula.to_string(),
                    name: identifier.clone(),
                })
            }
        }
        other => Err(FormulaError::DisallowedConstruct {
            formula: formula.to_string(),
            construct: format!("{:?}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let formula = Formula::compile("value * 2 + 1").unwrap();
        assert_eq!(formula.evaluate(4.0).unwrap(), PropertyValue::Int(9));

        let formula = Formula::compile("value / 10").unwrap();
        assert_eq!(formula.evaluate(255.0).unwrap(), PropertyValue::Float(25.5));
    }

    #[test]
    fn test_comparison_and_functions() {
        let formula = Formula::compile("value > 50").unwrap();
        assert_eq!(formula.evaluate(75.0).unwrap(), PropertyValue::Bool(true));

        let formula = Formula::compile("min(max(value, 0), 100)").unwrap();
        assert_eq!(formula.evaluate(140.0).unwrap(), PropertyValue::Int(100));

        let formula = Formula::compile("round(value * 100 / 255)").unwrap();
        assert_eq!(formula.evaluate(255.0).unwrap(), PropertyValue::Int(100));
    }

    #[test]
    fn test_rejects_host_access() {
        let err = Formula::compile("process.exit(1)").unwrap_err();
        assert!(matches!(err, FormulaError::DisallowedFunction { .. }));

        let err = Formula::compile("process.env.HOME").unwrap_err();
        assert!(matches!(err, FormulaError::DisallowedVariable { .. }));
    }

    #[test]
    fn test_rejects_other_variables_and_assignment() {
        assert!(matches!(
            Formula::compile("value + offset").unwrap_err(),
            FormulaError::DisallowedVariable { .. }
        ));
        assert!(Formula::compile("value = 3").is_err());
        assert!(Formula::compile("value + 1; value").is_err());
    }

    #[test]
    fn test_rejects_string_literals() {
        assert!(matches!(
            Formula::compile("\"rm -rf\"").unwrap_err(),
            FormulaError::DisallowedConstruct { .. }
        ));
    }

    #[test]
    fn test_rejects_deep_nesting() {
        let deep = format!("{}value{}", "(".repeat(50_000), ")".repeat(50_000));
        let err = Formula::compile(&deep).unwrap_err();
        assert!(matches!(err, FormulaError::DisallowedConstruct { .. }));
        assert!(err.to_string().len() < 256);

        let limit = format!(
            "{}value{}",
            "(".repeat(MAX_NESTING_DEPTH),
            ")".repeat(MAX_NESTING_DEPTH)
        );
        assert!(Formula::compile(&limit).is_ok());

        let over = format!(
            "{}value{}",
            "(".repeat(MAX_NESTING_DEPTH + 1),
            ")".repeat(MAX_NESTING_DEPTH + 1)
        );
        assert!(Formula::compile(&over).is_err());
    }

    #[test]
    fn test_rejects_long_source() {
        let long = vec!["value"; 300].join(" + ");
        assert!(long.len() > MAX_FORMULA_LENGTH);
        assert!(matches!(
            Formula::compile(&long).unwrap_err(),
            FormulaError::DisallowedConstruct { .. }
        ));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            Formula::compile("value * (").unwrap_err(),
            FormulaError::Parse { .. }
        ));
    }
}
