//! Condition and operand evaluation against a single record.

pub mod pattern;

use crate::core::value::{compare, loosely_equal, lookup_path, type_name};
use crate::core::{PersistenceError, Result};
use crate::parser::ast::{CompareOp, Condition, InList, Operand, Path};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// A record bound to the alias it is addressed by in the query
#[derive(Debug, Clone, Copy)]
pub struct RowScope<'a> {
    pub alias: &'a str,
    pub record: &'a Value,
}

/// Evaluates conditions with a fixed set of bound parameters
pub struct Evaluator<'p> {
    parameters: &'p HashMap<String, Value>,
}

impl<'p> Evaluator<'p> {
    pub fn new(parameters: &'p HashMap<String, Value>) -> Self {
        Self { parameters }
    }

    /// Resolve a path; missing fields are NULL
    pub fn resolve<'r>(&self, path: &Path, row: RowScope<'r>) -> Result<&'r Value> {
        if path.alias != row.alias {
            return Err(PersistenceError::QueryError(format!(
                "Unknown identification variable '{}' in '{}'",
                path.alias, path
            )));
        }
        Ok(lookup_path(row.record, &path.fields))
    }

    pub fn operand(&self, operand: &Operand, row: RowScope<'_>) -> Result<Value> {
        match operand {
            Operand::Path(path) => self.resolve(path, row).cloned(),
            Operand::Parameter(name) => self.parameter(name).cloned(),
            Operand::Literal(value) => Ok(value.clone()),
        }
    }

    fn parameter(&self, name: &str) -> Result<&'p Value> {
        self.parameters.get(name).ok_or_else(|| {
            PersistenceError::QueryError(format!("No value bound for parameter :{}", name))
        })
    }

    /// Does `row` satisfy `condition`? Comparisons involving NULL are false.
    pub fn matches(&self, condition: &Condition, row: RowScope<'_>) -> Result<bool> {
        match condition {
            Condition::And(left, right) => {
                Ok(self.matches(left, row)? && self.matches(right, row)?)
            }
            Condition::Or(left, right) => {
                Ok(self.matches(left, row)? || self.matches(right, row)?)
            }
            Condition::Not(inner) => Ok(!self.matches(inner, row)?),

            Condition::Compare { left, op, right } => {
                let left = self.operand(left, row)?;
                let right = self.operand(right, row)?;
                compare_values(&left, *op, &right)
            }

            Condition::In {
                operand,
                list,
                negated,
            } => {
                let value = self.operand(operand, row)?;
                if value.is_null() {
                    return Ok(false);
                }
                let candidates = match list {
                    InList::Parameter(name) => match self.parameter(name)? {
                        Value::Array(items) => items.clone(),
                        scalar => vec![scalar.clone()],
                    },
                    InList::Values(operands) => operands
                        .iter()
                        .map(|operand| self.operand(operand, row))
                        .collect::<Result<Vec<_>>>()?,
                };
                let found = candidates
                    .iter()
                    .any(|candidate| loosely_equal(&value, candidate));
                Ok(found != *negated)
            }

            Condition::IsNull { operand, negated } => {
                let value = self.operand(operand, row)?;
                Ok(value.is_null() != *negated)
            }

            Condition::Like {
                operand,
                pattern,
                negated,
            } => {
                let value = self.operand(operand, row)?;
                let pattern = self.operand(pattern, row)?;
                match (&value, &pattern) {
                    (Value::String(text), Value::String(like)) => {
                        Ok(pattern::eval_like(text, like)? != *negated)
                    }
                    (Value::Null, _) | (_, Value::Null) => Ok(false),
                    _ => Err(PersistenceError::TypeMismatch(format!(
                        "LIKE expects text, got {} and {}",
                        type_name(&value),
                        type_name(&pattern)
                    ))),
                }
            }
        }
    }
}

fn compare_values(left: &Value, op: CompareOp, right: &Value) -> Result<bool> {
    if left.is_null() || right.is_null() {
        return Ok(false);
    }

    match op {
        CompareOp::Eq => Ok(loosely_equal(left, right)),
        CompareOp::NotEq => Ok(!loosely_equal(left, right)),
        CompareOp::Lt => Ok(compare(left, right)? == Ordering::Less),
        CompareOp::LtEq => Ok(compare(left, right)? != Ordering::Greater),
        CompareOp::Gt => Ok(compare(left, right)? == Ordering::Greater),
        CompareOp::GtEq => Ok(compare(left, right)? != Ordering::Less),
    }
}
