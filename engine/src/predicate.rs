//! Compiled filter predicates.
//!
//! A [`Predicate`] is the backend-facing form of a selector: Mango operators
//! are lowered onto a small set of primitives that map one-to-one onto
//! PostgreSQL `jsonb` expressions (see [`crate::sql`]). [`Predicate::evaluate`]
//! reproduces what those expressions compute, so a table kept in memory can
//! be filtered with exactly the semantics the database would apply.

use crate::{
    json::{as_number, as_text, json_contains, json_eq, JsonType},
    selector::{CmpOp, Condition, Selector},
    FieldPath,
};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Const(bool),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Text form of the field equals the value (`->>` comparison).
    TextEq { path: FieldPath, value: String },
    /// The field equals the value as jsonb.
    JsonEq { path: FieldPath, value: Value },
    /// The field is missing or JSON null.
    IsNull { path: FieldPath },
    /// The field is a number and compares against the value.
    Compare {
        path: FieldPath,
        op: CmpOp,
        value: f64,
    },
    /// The field is present (possibly null).
    Exists { path: FieldPath },
    TypeIs { path: FieldPath, json_type: JsonType },
    /// jsonb containment (`@>`).
    Contains { path: FieldPath, value: Value },
    /// Some element of the array at `path` satisfies the nested predicate,
    /// whose paths are relative to the element.
    ElemMatch {
        path: FieldPath,
        predicate: Box<Predicate>,
    },
}

impl Predicate {
    /// Lower a selector tree.
    pub fn lower(selector: &Selector) -> Predicate {
        match selector {
            Selector::And(children) => Predicate::And(children.iter().map(Self::lower).collect()),
            Selector::Or(children) => Predicate::Or(children.iter().map(Self::lower).collect()),
            Selector::Nor(children) => negate(Predicate::Or(
                children.iter().map(Self::lower).collect(),
            )),
            Selector::Not(child) => negate(Self::lower(child)),
            Selector::Field { path, condition } => lower_condition(path, condition),
        }
    }

    /// Evaluate against a root value (a document, or an array element inside
    /// an element match).
    pub fn evaluate(&self, root: &Value) -> bool {
        match self {
            Predicate::Const(value) => *value,
            Predicate::And(children) => children.iter().all(|c| c.evaluate(root)),
            Predicate::Or(children) => children.iter().any(|c| c.evaluate(root)),
            Predicate::Not(child) => !child.evaluate(root),
            Predicate::TextEq { path, value } => path
                .lookup(root)
                .and_then(as_text)
                .is_some_and(|text| &text == value),
            Predicate::JsonEq { path, value } => {
                path.lookup(root).is_some_and(|v| json_eq(v, value))
            }
            Predicate::IsNull { path } => path.lookup(root).and_then(as_text).is_none(),
            Predicate::Compare { path, op, value } => path
                .lookup(root)
                .and_then(as_number)
                .is_some_and(|n| op.apply(n, *value)),
            Predicate::Exists { path } => path.lookup(root).is_some(),
            Predicate::TypeIs { path, json_type } => path
                .lookup(root)
                .is_some_and(|v| JsonType::of(v) == *json_type),
            Predicate::Contains { path, value } => {
                path.lookup(root).is_some_and(|v| json_contains(v, value))
            }
            Predicate::ElemMatch { path, predicate } => path
                .lookup(root)
                .and_then(Value::as_array)
                .is_some_and(|items| items.iter().any(|item| predicate.evaluate(item))),
        }
    }

    /// Whether the predicate is trivially true (no filter needed).
    pub fn is_always_true(&self) -> bool {
        match self {
            Predicate::Const(value) => *value,
            Predicate::And(children) => children.iter().all(Predicate::is_always_true),
            Predicate::Or(children) => children.iter().any(Predicate::is_always_true),
            Predicate::Not(child) => child.is_always_false(),
            _ => false,
        }
    }

    /// Whether the predicate can never match.
    pub fn is_always_false(&self) -> bool {
        match self {
            Predicate::Const(value) => !*value,
            Predicate::And(children) => children.iter().any(Predicate::is_always_false),
            Predicate::Or(children) => children.iter().all(Predicate::is_always_false),
            Predicate::Not(child) => child.is_always_true(),
            _ => false,
        }
    }
}

fn negate(predicate: Predicate) -> Predicate {
    match predicate {
        Predicate::Const(value) => Predicate::Const(!value),
        other => Predicate::Not(Box::new(other)),
    }
}

fn equality(path: &FieldPath, operand: &Value) -> Predicate {
    let path = path.clone();
    match operand {
        Value::Null => Predicate::IsNull { path },
        Value::String(value) => Predicate::TextEq {
            path,
            value: value.clone(),
        },
        other => Predicate::JsonEq {
            path,
            value: other.clone(),
        },
    }
}

fn membership(path: &FieldPath, operands: &[Value]) -> Predicate {
    Predicate::Or(operands.iter().map(|o| equality(path, o)).collect())
}

fn lower_condition(path: &FieldPath, condition: &Condition) -> Predicate {
    match condition {
        Condition::Eq(operand) => equality(path, operand),
        Condition::Ne(operand) => negate(equality(path, operand)),
        Condition::Compare(op, value) => Predicate::Compare {
            path: path.clone(),
            op: *op,
            value: *value,
        },
        Condition::In(operands) => membership(path, operands),
        Condition::Nin(operands) => negate(membership(path, operands)),
        Condition::Exists(true) => Predicate::Exists { path: path.clone() },
        Condition::Exists(false) => negate(Predicate::Exists { path: path.clone() }),
        Condition::Type(json_type) => Predicate::TypeIs {
            path: path.clone(),
            json_type: *json_type,
        },
        Condition::All(operands) => Predicate::Contains {
            path: path.clone(),
            value: Value::Array(operands.clone()),
        },
        Condition::ElemMatch(selector) => Predicate::ElemMatch {
            path: path.clone(),
            predicate: Box::new(Predicate::lower(selector)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lower(value: Value) -> Predicate {
        Predicate::lower(&Selector::parse(&value).unwrap())
    }

    fn path(field: &str) -> FieldPath {
        FieldPath::parse(field).unwrap()
    }

    #[test]
    fn equality_typing() {
        assert_eq!(
            lower(json!({"name": "ada"})),
            Predicate::TextEq {
                path: path("name"),
                value: "ada".into()
            }
        );
        assert_eq!(
            lower(json!({"done": true})),
            Predicate::JsonEq {
                path: path("done"),
                value: json!(true)
            }
        );
        assert_eq!(
            lower(json!({"gone": null})),
            Predicate::IsNull { path: path("gone") }
        );
    }

    #[test]
    fn negations_are_lowered() {
        assert_eq!(
            lower(json!({"x": {"$nin": []}})),
            Predicate::Not(Box::new(Predicate::Or(vec![])))
        );
        assert!(matches!(
            lower(json!({"$nor": [{"a": 1}]})),
            Predicate::Not(inner) if matches!(*inner, Predicate::Or(_))
        ));
    }

    #[test]
    fn evaluate_text_equality_on_numbers() {
        let predicate = lower(json!({"code": "42"}));
        assert!(predicate.evaluate(&json!({"code": 42})));
        assert!(predicate.evaluate(&json!({"code": "42"})));
        assert!(!predicate.evaluate(&json!({"code": "042"})));
    }

    #[test]
    fn evaluate_elem_match() {
        let predicate = lower(json!({"items": {"$elemMatch": {"n": {"$gt": 1}}}}));
        assert!(predicate.evaluate(&json!({"items": [{"n": 0}, {"n": 2}]})));
        assert!(!predicate.evaluate(&json!({"items": [{"n": 0}]})));
        assert!(!predicate.evaluate(&json!({"items": {"n": 2}})));
    }

    #[test]
    fn always_true() {
        assert!(lower(json!({})).is_always_true());
        assert!(lower(json!({"x": {"$nin": []}})).is_always_true());
        assert!(!lower(json!({"x": 1})).is_always_true());
        assert!(lower(json!({"x": {"$in": []}})).is_always_false());
    }
}
