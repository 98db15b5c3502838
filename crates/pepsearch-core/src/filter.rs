//! Declarative filter conditions and the predicate builder.
//!
//! Callers describe filters as a list of [`FilterCondition`]s
//! (`field`, operator string, JSON value). [`build_filter`] turns the list into
//! a [`FilterPredicate`], a conjunction of leaf conditions on payload fields.
//! The predicate serializes to the JSON filter shape understood by the Qdrant
//! REST API and can also be evaluated in-process against a [`Chunk`].
//!
//! # Operators
//!
//! | Operator | Leaf |
//! |----------|------|
//! | `==`, `eq`, `equals` | exact match |
//! | `in` | any-of-set match |
//! | `>=` / `>` | inclusive / exclusive lower bound |
//! | `<=` / `<` | inclusive / exclusive upper bound |
//! | `range` | inclusive `[low, high]` bound |
//!
//! Strict and non-strict comparisons produce different bounds.

use crate::chunk::Chunk;
use crate::error::FilterError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::str::FromStr;

/// One declarative condition, as written by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    #[serde(alias = "operator")]
    pub op: String,
    pub value: Value,
}

impl FilterCondition {
    pub fn new(field: impl Into<String>, op: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: op.into(),
            value: value.into(),
        }
    }
}

/// Parsed filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equals,
    In,
    Gte,
    Gt,
    Lte,
    Lt,
    Range,
}

impl FromStr for FilterOp {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "==" | "eq" | "equals" => Ok(FilterOp::Equals),
            "in" => Ok(FilterOp::In),
            ">=" => Ok(FilterOp::Gte),
            ">" => Ok(FilterOp::Gt),
            "<=" => Ok(FilterOp::Lte),
            "<" => Ok(FilterOp::Lt),
            "range" => Ok(FilterOp::Range),
            other => Err(FilterError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// Conjunction of leaf conditions. All must hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub must: Vec<FieldCondition>,
}

/// Leaf condition on one payload field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub key: String,
    #[serde(flatten)]
    pub condition: FieldMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldMatch {
    Match(MatchValue),
    Range(RangeBound),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchValue {
    /// Exact value
    Value(Value),
    /// Any of the listed values
    Any(Vec<Value>),
}

/// Bounds on a numeric or string field. Unset bounds are open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBound {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gt: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gte: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lt: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lte: Option<Value>,
}

/// Builds a predicate from declarative conditions.
///
/// Returns `Ok(None)` ("no filter") for an empty list. Conditions compose
/// with logical AND, in input order.
///
/// # Errors
///
/// [`FilterError::UnsupportedOperation`] for an unknown operator string and
/// [`FilterError::InvalidValue`] when the value shape does not fit the operator
/// (e.g. `in` without a list, `range` without a two element list).
///
/// # Example
///
/// ```
/// use pepsearch_core::filter::{build_filter, FilterCondition};
/// use serde_json::json;
///
/// let filter = build_filter(&[FilterCondition::new("status", "in", json!(["Final"]))])
///     .unwrap()
///     .unwrap();
/// assert_eq!(filter.must.len(), 1);
/// assert!(build_filter(&[]).unwrap().is_none());
/// ```
pub fn build_filter(conditions: &[FilterCondition]) -> Result<Option<FilterPredicate>, FilterError> {
    if conditions.is_empty() {
        return Ok(None);
    }

    let must = conditions
        .iter()
        .map(build_leaf)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(FilterPredicate { must }))
}

fn build_leaf(cond: &FilterCondition) -> Result<FieldCondition, FilterError> {
    let op: FilterOp = cond.op.parse()?;
    let invalid = |reason: &str| FilterError::InvalidValue {
        field: cond.field.clone(),
        op: cond.op.clone(),
        reason: reason.to_string(),
    };

    let condition = match op {
        FilterOp::Equals => {
            if !is_scalar(&cond.value) {
                return Err(invalid("expected a scalar value"));
            }
            FieldMatch::Match(MatchValue::Value(cond.value.clone()))
        }
        FilterOp::In => match &cond.value {
            Value::Array(values) if values.iter().all(is_scalar) => {
                FieldMatch::Match(MatchValue::Any(values.clone()))
            }
            _ => return Err(invalid("expected a list of scalar values")),
        },
        FilterOp::Gte | FilterOp::Gt | FilterOp::Lte | FilterOp::Lt => {
            if !is_orderable(&cond.value) {
                return Err(invalid("expected a number or string bound"));
            }
            let bound = Some(cond.value.clone());
            let range = match op {
                FilterOp::Gte => RangeBound { gte: bound, ..Default::default() },
                FilterOp::Gt => RangeBound { gt: bound, ..Default::default() },
                FilterOp::Lte => RangeBound { lte: bound, ..Default::default() },
                _ => RangeBound { lt: bound, ..Default::default() },
            };
            FieldMatch::Range(range)
        }
        FilterOp::Range => match &cond.value {
            Value::Array(pair) if pair.len() == 2 && pair.iter().all(is_orderable) => {
                FieldMatch::Range(RangeBound {
                    gte: Some(pair[0].clone()),
                    lte: Some(pair[1].clone()),
                    ..Default::default()
                })
            }
            _ => return Err(invalid("expected a [low, high] pair")),
        },
    };

    Ok(FieldCondition {
        key: cond.field.clone(),
        condition,
    })
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn is_orderable(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_))
}

impl FilterPredicate {
    /// Evaluates the predicate against a chunk's payload.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.must.iter().all(|leaf| leaf.matches(chunk))
    }
}

impl FieldCondition {
    /// Array fields (tags, breadcrumbs) match when any element does.
    /// A missing field never matches.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        match chunk.field(&self.key) {
            Some(Value::Array(items)) => items.iter().any(|v| self.condition.matches_value(v)),
            Some(value) => self.condition.matches_value(&value),
            None => false,
        }
    }
}

impl FieldMatch {
    fn matches_value(&self, value: &Value) -> bool {
        match self {
            FieldMatch::Match(MatchValue::Value(expected)) => value_eq(value, expected),
            FieldMatch::Match(MatchValue::Any(set)) => set.iter().any(|e| value_eq(value, e)),
            FieldMatch::Range(range) => range.contains(value),
        }
    }
}

impl RangeBound {
    pub fn contains(&self, value: &Value) -> bool {
        let check = |bound: &Option<Value>, accept: &[Ordering]| match bound {
            None => true,
            Some(b) => compare(value, b).is_some_and(|ord| accept.contains(&ord)),
        };
        check(&self.gt, &[Ordering::Greater])
            && check(&self.gte, &[Ordering::Greater, Ordering::Equal])
            && check(&self.lt, &[Ordering::Less])
            && check(&self.lte, &[Ordering::Less, Ordering::Equal])
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Numbers compare numerically, strings lexicographically; mixed kinds are unordered.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
