//! Combinators for reading and comparing vars inside flows.
//!
//! `var("user.age").ge(18)` builds a value that can be evaluated against
//! vars directly or turned into a [`Handler`] wherever a flow accepts one.

use std::cmp::Ordering;

use crate::types::{Handler, Param};
use crate::value::{is_truthy, lookup_path, Value, Vars};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Var(String),
    Literal(Value),
    Get(Box<Expr>, String),
    At(Box<Expr>, usize),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct Accessor {
    expr: Expr,
}

/// Reads a dotted var path; missing paths evaluate to `null`.
pub fn var(path: &str) -> Accessor {
    Accessor {
        expr: Expr::Var(path.to_string()),
    }
}

pub fn literal(value: impl Into<Value>) -> Accessor {
    Accessor {
        expr: Expr::Literal(value.into()),
    }
}

impl Accessor {
    pub fn get(self, key: &str) -> Self {
        self.wrap(|expr| Expr::Get(expr, key.to_string()))
    }

    pub fn at(self, index: usize) -> Self {
        self.wrap(|expr| Expr::At(expr, index))
    }

    pub fn eq(self, other: impl Into<Accessor>) -> Self {
        self.compare(CompareOp::Eq, other.into())
    }

    pub fn ne(self, other: impl Into<Accessor>) -> Self {
        self.compare(CompareOp::Ne, other.into())
    }

    pub fn lt(self, other: impl Into<Accessor>) -> Self {
        self.compare(CompareOp::Lt, other.into())
    }

    pub fn le(self, other: impl Into<Accessor>) -> Self {
        self.compare(CompareOp::Le, other.into())
    }

    pub fn gt(self, other: impl Into<Accessor>) -> Self {
        self.compare(CompareOp::Gt, other.into())
    }

    pub fn ge(self, other: impl Into<Accessor>) -> Self {
        self.compare(CompareOp::Ge, other.into())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        self.wrap(Expr::Not)
    }

    pub fn and(self, other: impl Into<Accessor>) -> Self {
        let other = other.into();
        self.wrap(|expr| Expr::And(expr, Box::new(other.expr)))
    }

    pub fn or(self, other: impl Into<Accessor>) -> Self {
        let other = other.into();
        self.wrap(|expr| Expr::Or(expr, Box::new(other.expr)))
    }

    pub fn evaluate(&self, vars: &Vars) -> Value {
        evaluate(&self.expr, vars)
    }

    pub fn into_handler(self) -> Handler {
        Handler::from_vars(move |vars| self.evaluate(vars))
    }

    fn compare(self, op: CompareOp, other: Accessor) -> Self {
        self.wrap(|expr| Expr::Compare(expr, op, Box::new(other.expr)))
    }

    fn wrap(self, build: impl FnOnce(Box<Expr>) -> Expr) -> Self {
        Self {
            expr: build(Box::new(self.expr)),
        }
    }
}

impl From<Value> for Accessor {
    fn from(value: Value) -> Self {
        literal(value)
    }
}

impl From<&str> for Accessor {
    fn from(value: &str) -> Self {
        literal(value)
    }
}

impl From<bool> for Accessor {
    fn from(value: bool) -> Self {
        literal(value)
    }
}

impl From<i64> for Accessor {
    fn from(value: i64) -> Self {
        literal(value)
    }
}

impl From<i32> for Accessor {
    fn from(value: i32) -> Self {
        literal(value)
    }
}

impl From<f64> for Accessor {
    fn from(value: f64) -> Self {
        literal(value)
    }
}

impl From<Accessor> for Handler {
    fn from(value: Accessor) -> Self {
        value.into_handler()
    }
}

impl From<Accessor> for Param {
    fn from(value: Accessor) -> Self {
        Param::Handler(value.into_handler())
    }
}

fn evaluate(expr: &Expr, vars: &Vars) -> Value {
    match expr {
        Expr::Var(path) => lookup_path(vars, path).cloned().unwrap_or(Value::Null),
        Expr::Literal(value) => value.clone(),
        Expr::Get(inner, key) => match evaluate(inner, vars) {
            Value::Object(entries) => entries.get(key).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        },
        Expr::At(inner, index) => match evaluate(inner, vars) {
            Value::Array(mut items) if *index < items.len() => items.swap_remove(*index),
            _ => Value::Null,
        },
        Expr::Compare(left, op, right) => {
            let (left, right) = (evaluate(left, vars), evaluate(right, vars));
            Value::Bool(compare(&left, *op, &right))
        }
        Expr::Not(inner) => Value::Bool(!is_truthy(&evaluate(inner, vars))),
        Expr::And(left, right) => {
            let left = evaluate(left, vars);
            if is_truthy(&left) {
                evaluate(right, vars)
            } else {
                left
            }
        }
        Expr::Or(left, right) => {
            let left = evaluate(left, vars);
            if is_truthy(&left) {
                left
            } else {
                evaluate(right, vars)
            }
        }
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    };

    match op {
        CompareOp::Eq => ordering.map(Ordering::is_eq).unwrap_or(left == right),
        CompareOp::Ne => !ordering.map(Ordering::is_eq).unwrap_or(left == right),
        CompareOp::Lt => ordering.is_some_and(Ordering::is_lt),
        CompareOp::Le => ordering.is_some_and(Ordering::is_le),
        CompareOp::Gt => ordering.is_some_and(Ordering::is_gt),
        CompareOp::Ge => ordering.is_some_and(Ordering::is_ge),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(value: Value) -> Vars {
        match value {
            Value::Object(map) => map,
            _ => Vars::new(),
        }
    }

    #[test]
    fn comparisons_read_dotted_paths() {
        let env = vars(json!({"user": {"age": 20, "tags": ["a", "b"]}, "i": 3}));
        assert_eq!(var("user.age").ge(18).evaluate(&env), json!(true));
        assert_eq!(var("i").lt(3).evaluate(&env), json!(false));
        assert_eq!(var("user").get("tags").at(1).evaluate(&env), json!("b"));
        assert_eq!(var("missing").eq(Value::Null).evaluate(&env), json!(true));
    }

    #[test]
    fn mixed_type_ordering_is_false() {
        let env = vars(json!({"name": "ada"}));
        assert_eq!(var("name").lt(3).evaluate(&env), json!(false));
        assert_eq!(var("name").ne(3).evaluate(&env), json!(true));
    }

    #[test]
    fn boolean_combinators_short_circuit_like_values() {
        let env = vars(json!({"a": 0, "b": "x"}));
        assert_eq!(var("a").or(var("b")).evaluate(&env), json!("x"));
        assert_eq!(var("a").and(var("b")).evaluate(&env), json!(0));
        assert_eq!(var("a").not().evaluate(&env), json!(true));
    }

    #[test]
    fn into_param_wraps_a_handler() {
        let param: Param = var("i").lt(6).into();
        assert!(param.as_handler().is_some());
    }
}
