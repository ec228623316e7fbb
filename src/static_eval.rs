//! Static expression evaluator
//!
//! Evaluates parsed bindings at compile time against slow view-state data,
//! following JavaScript truthiness and operator semantics. Used by the
//! pre-render transform to inline slow bindings and decide slow conditions.

use serde_json::Value;

use crate::expression::{BinaryOp, Expr, Literal};

/// Looks up an accessor. `None` means the value is not known at compile time
/// and the whole expression stays dynamic; a missing slow value is `Some(Null)`.
pub type Lookup<'a> = dyn Fn(&[String]) -> Option<Value> + 'a;

pub fn static_eval(expr: &Expr, lookup: &Lookup) -> Option<Value> {
    match expr {
        Expr::Accessor(terms) => lookup(terms),
        Expr::Literal(literal) => Some(literal_value(literal)),
        Expr::Not(inner) => static_eval(inner, lookup).map(|v| Value::Bool(!is_truthy(&v))),
        Expr::Binary { op, lhs, rhs } => {
            let left = static_eval(lhs, lookup)?;
            match op {
                BinaryOp::And if !is_truthy(&left) => Some(left),
                BinaryOp::Or if is_truthy(&left) => Some(left),
                BinaryOp::And | BinaryOp::Or => static_eval(rhs, lookup),
                _ => {
                    let right = static_eval(rhs, lookup)?;
                    Some(Value::Bool(compare(*op, &left, &right)))
                }
            }
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            if is_truthy(&static_eval(test, lookup)?) {
                static_eval(consequent, lookup)
            } else {
                static_eval(alternate, lookup)
            }
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Str(s) => Value::String(s.clone()),
        Literal::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    match op {
        BinaryOp::Eq => strict_equals(left, right),
        BinaryOp::NotEq => !strict_equals(left, right),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let (Some(a), Some(b)) = (as_number(left), as_number(right)) else {
                return match (left, right) {
                    (Value::String(a), Value::String(b)) => ordered(op, a.cmp(b)),
                    _ => false,
                };
            };
            match a.partial_cmp(&b) {
                Some(ordering) => ordered(op, ordering),
                None => false,
            }
        }
        BinaryOp::And | BinaryOp::Or => false,
    }
}

fn ordered(op: BinaryOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    matches!(
        (op, ordering),
        (BinaryOp::Lt, Less)
            | (BinaryOp::Le, Less | Equal)
            | (BinaryOp::Gt, Greater)
            | (BinaryOp::Ge, Greater | Equal)
    )
}

fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => as_number(left) == as_number(right),
        _ => left == right,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => None,
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// JavaScript truthiness.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text a value renders as. Missing values render as `undefined`.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "undefined".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Walks `terms` into `data`. A missing step yields `Null`.
pub fn lookup_path(data: &Value, terms: &[String]) -> Value {
    let mut current = data;
    for term in terms {
        match current.get(term) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{parse_condition, parse_value};
    use serde_json::json;

    fn eval(source: &str, data: &Value) -> Option<Value> {
        let expr = parse_value(source).unwrap();
        static_eval(&expr, &|terms: &[String]| Some(lookup_path(data, terms)))
    }

    #[test]
    fn evaluates_with_js_semantics() {
        let data = json!({"count": 3, "name": "", "user": {"admin": true}});
        assert_eq!(eval("count > 2", &data), Some(json!(true)));
        assert_eq!(eval("name || 'anon'", &data), Some(json!("anon")));
        assert_eq!(eval("user.admin ? 'yes' : 'no'", &data), Some(json!("yes")));
        assert_eq!(eval("missing", &data), Some(Value::Null));
    }

    #[test]
    fn unknown_operand_keeps_expression_dynamic() {
        let expr = parse_condition("slow && fast").unwrap();
        let result = static_eval(&expr, &|terms: &[String]| {
            (terms[0] == "slow").then(|| json!(true))
        });
        assert_eq!(result, None);
    }

    #[test]
    fn display_of_values() {
        assert_eq!(display_value(&json!(3.0)), "3");
        assert_eq!(display_value(&json!(2.5)), "2.5");
        assert_eq!(display_value(&Value::Null), "undefined");
    }
}
