//! Mango selectors: parsing and direct in-memory matching.
//!
//! A selector is a JSON object whose keys are either field paths or logical
//! combinators:
//!
//! ```json
//! {"done": false, "priority": {"$gte": 2}, "$or": [{"owner": "ada"}, {"shared": true}]}
//! ```
//!
//! Parsing turns it into a [`Selector`] tree, rejecting unknown operators and
//! operands of the wrong shape. [`Selector::matches`] evaluates the tree
//! against a document without going through the compiled form.

use crate::{
    error::Result,
    json::{as_text, json_contains, json_eq, JsonType},
    Error, FieldPath,
};
use serde_json::{Map, Value};

/// Numeric ordering comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    pub fn apply(&self, left: f64, right: f64) -> bool {
        match self {
            CmpOp::Gt => left > right,
            CmpOp::Gte => left >= right,
            CmpOp::Lt => left < right,
            CmpOp::Lte => left <= right,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
        }
    }
}

/// A condition applied to the value at one field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Compare(CmpOp, f64),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Type(JsonType),
    All(Vec<Value>),
    /// Nested selector evaluated against each array element.
    ElemMatch(Box<Selector>),
}

/// A parsed selector tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    And(Vec<Selector>),
    Or(Vec<Selector>),
    Nor(Vec<Selector>),
    Not(Box<Selector>),
    Field { path: FieldPath, condition: Condition },
}

const FIELD_OPERATORS: &[&str] = &[
    "$eq",
    "$ne",
    "$gt",
    "$gte",
    "$lt",
    "$lte",
    "$in",
    "$nin",
    "$exists",
    "$type",
    "$all",
    "$elemMatch",
];

impl Selector {
    /// Selector matching every document.
    pub fn all() -> Self {
        Selector::And(Vec::new())
    }

    /// A single field condition.
    pub fn field(path: FieldPath, condition: Condition) -> Self {
        Selector::Field { path, condition }
    }

    /// Parse a top-level Mango selector. `null` is treated as `{}`.
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Selector::all()),
            Value::Object(map) => parse_object(map, false),
            other => Err(Error::InvalidSelector(format!(
                "expected an object, got {}",
                JsonType::of(other)
            ))),
        }
    }

    /// Evaluate the selector against a document (or array element).
    pub fn matches(&self, root: &Value) -> bool {
        match self {
            Selector::And(children) => children.iter().all(|c| c.matches(root)),
            Selector::Or(children) => children.iter().any(|c| c.matches(root)),
            Selector::Nor(children) => !children.iter().any(|c| c.matches(root)),
            Selector::Not(child) => !child.matches(root),
            Selector::Field { path, condition } => condition.matches(path.lookup(root)),
        }
    }

    fn conjunction(mut clauses: Vec<Selector>) -> Self {
        if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Selector::And(clauses)
        }
    }
}

impl Condition {
    /// Evaluate against the value at the condition's path (`None` if absent).
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Condition::Eq(operand) => equals(value, operand),
            Condition::Ne(operand) => !equals(value, operand),
            Condition::Compare(op, operand) => value
                .and_then(|v| match v {
                    Value::Number(n) => n.as_f64(),
                    _ => None,
                })
                .is_some_and(|n| op.apply(n, *operand)),
            Condition::In(operands) => operands.iter().any(|o| equals(value, o)),
            Condition::Nin(operands) => !operands.iter().any(|o| equals(value, o)),
            Condition::Exists(expected) => value.is_some() == *expected,
            Condition::Type(json_type) => value.is_some_and(|v| JsonType::of(v) == *json_type),
            // jsonb containment; the operand is always wrapped as an array.
            Condition::All(operands) => value.is_some_and(|v| {
                v.is_array() && json_contains(v, &Value::Array(operands.clone()))
            }),
            Condition::ElemMatch(selector) => value
                .and_then(Value::as_array)
                .is_some_and(|items| items.iter().any(|item| selector.matches(item))),
        }
    }
}

/// Equality as used by `$eq`, `$ne`, `$in` and `$nin`.
///
/// String operands compare against the field's text form; `null` matches a
/// missing field or JSON null; everything else compares as a JSON value.
fn equals(value: Option<&Value>, operand: &Value) -> bool {
    match operand {
        Value::Null => value.and_then(as_text).is_none(),
        Value::String(expected) => value
            .and_then(as_text)
            .is_some_and(|text| &text == expected),
        _ => value.is_some_and(|v| json_eq(v, operand)),
    }
}

fn parse_object(map: &Map<String, Value>, element: bool) -> Result<Selector> {
    let mut clauses = Vec::with_capacity(map.len());
    for (key, operand) in map {
        match key.as_str() {
            "$and" | "$or" | "$nor" => {
                let children = parse_list(key, operand, element)?;
                clauses.push(match key.as_str() {
                    "$and" => Selector::And(children),
                    "$or" => Selector::Or(children),
                    _ => Selector::Nor(children),
                });
            }
            "$not" => {
                let inner = operand.as_object().ok_or_else(|| Error::InvalidOperand {
                    operator: key.clone(),
                    field: "<root>".into(),
                    reason: "expected a selector object".into(),
                })?;
                clauses.push(Selector::Not(Box::new(parse_object(inner, element)?)));
            }
            op if op.starts_with('$') => {
                if element {
                    // Bare operators inside $elemMatch apply to the element itself.
                    clauses.push(parse_operator(&FieldPath::root(), op, operand)?);
                } else if FIELD_OPERATORS.contains(&op) {
                    return Err(Error::InvalidSelector(format!(
                        "operator {op} must be applied to a field"
                    )));
                } else {
                    return Err(Error::UnsupportedOperator {
                        operator: op.to_string(),
                        field: "<root>".into(),
                    });
                }
            }
            field => {
                let path = FieldPath::parse(field)?;
                clauses.push(parse_field(path, operand)?);
            }
        }
    }
    Ok(Selector::conjunction(clauses))
}

fn parse_list(operator: &str, operand: &Value, element: bool) -> Result<Vec<Selector>> {
    let items = operand.as_array().ok_or_else(|| Error::InvalidOperand {
        operator: operator.to_string(),
        field: "<root>".into(),
        reason: "expected an array of selectors".into(),
    })?;
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => parse_object(map, element),
            other => Err(Error::InvalidOperand {
                operator: operator.to_string(),
                field: "<root>".into(),
                reason: format!("expected a selector object, got {}", JsonType::of(other)),
            }),
        })
        .collect()
}

fn is_operator_map(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn parse_field(path: FieldPath, operand: &Value) -> Result<Selector> {
    match operand {
        Value::Object(map) if is_operator_map(map) => {
            let clauses = map
                .iter()
                .map(|(op, arg)| parse_operator(&path, op, arg))
                .collect::<Result<Vec<_>>>()?;
            Ok(Selector::conjunction(clauses))
        }
        Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => {
            Err(Error::InvalidSelector(format!(
                "field '{path}' mixes operators and literal keys"
            )))
        }
        literal => Ok(Selector::field(path, Condition::Eq(literal.clone()))),
    }
}

fn invalid(operator: &str, path: &FieldPath, reason: impl Into<String>) -> Error {
    Error::InvalidOperand {
        operator: operator.to_string(),
        field: path.to_string(),
        reason: reason.into(),
    }
}

fn numeric_operand(operator: &str, path: &FieldPath, operand: &Value) -> Result<f64> {
    let number = match operand {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number
        .filter(|n| n.is_finite())
        .ok_or_else(|| invalid(operator, path, "expected a number"))
}

fn array_operand(operator: &str, path: &FieldPath, operand: &Value) -> Result<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| invalid(operator, path, "expected an array"))
}

fn parse_operator(path: &FieldPath, operator: &str, operand: &Value) -> Result<Selector> {
    let condition = match operator {
        "$eq" => Condition::Eq(operand.clone()),
        "$ne" => Condition::Ne(operand.clone()),
        "$gt" => Condition::Compare(CmpOp::Gt, numeric_operand(operator, path, operand)?),
        "$gte" => Condition::Compare(CmpOp::Gte, numeric_operand(operator, path, operand)?),
        "$lt" => Condition::Compare(CmpOp::Lt, numeric_operand(operator, path, operand)?),
        "$lte" => Condition::Compare(CmpOp::Lte, numeric_operand(operator, path, operand)?),
        "$in" => Condition::In(array_operand(operator, path, operand)?),
        "$nin" => Condition::Nin(array_operand(operator, path, operand)?),
        "$exists" => Condition::Exists(
            operand
                .as_bool()
                .ok_or_else(|| invalid(operator, path, "expected a boolean"))?,
        ),
        "$type" => Condition::Type(
            operand
                .as_str()
                .and_then(JsonType::parse)
                .ok_or_else(|| invalid(operator, path, "expected a JSON type name"))?,
        ),
        "$all" => Condition::All(array_operand(operator, path, operand)?),
        "$elemMatch" => {
            let map = operand
                .as_object()
                .ok_or_else(|| invalid(operator, path, "expected a selector object"))?;
            Condition::ElemMatch(Box::new(parse_object(map, true)?))
        }
        "$not" => {
            if !operand.is_object() {
                return Err(invalid(operator, path, "expected an operator object"));
            }
            return Ok(Selector::Not(Box::new(parse_field(path.clone(), operand)?)));
        }
        _ => {
            return Err(Error::UnsupportedOperator {
                operator: operator.to_string(),
                field: path.to_string(),
            })
        }
    };
    Ok(Selector::field(path.clone(), condition))
}
