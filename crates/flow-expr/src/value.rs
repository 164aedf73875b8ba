//! Helpers over `serde_json::Value`
//!
//! The expression language operates directly on JSON values: flow
//! definitions, session variables and call payloads are all JSON trees,
//! so no separate value type is introduced.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::{EvalError, Result};

/// Check if a JSON value is "truthy".
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Render a value the way templates substitute it: strings unquoted,
/// null as the empty string, everything else in canonical JSON form.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Short type name for diagnostics
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Numeric coercion: numbers pass through, numeric strings parse.
pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Coerce to a number or fail with the offending value's description.
pub(crate) fn require_f64(value: &Value) -> Result<f64> {
    as_f64(value).ok_or_else(|| EvalError::NotNumeric(summary(value)))
}

/// Build a number value, rejecting NaN/infinity. Whole results become
/// integers so they render without a trailing ".0" in templates.
pub(crate) fn number(f: f64) -> Result<Value> {
    if !f.is_finite() {
        return Err(EvalError::NonFinite);
    }
    if f.fract() == 0.0 && f.abs() <= (i64::MAX as f64) {
        return Ok(Value::Number(serde_json::Number::from(f as i64)));
    }
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .ok_or(EvalError::NonFinite)
}

/// Loose equality: numbers compare numerically (1 == 1.0), everything
/// else by structural equality.
pub(crate) fn loose_eq(a: &Value, b: &Value) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}

/// Total ordering used by orderBy / min / max.
///
/// Nulls sort first, then booleans, numbers, strings; composite values
/// fall back to their canonical JSON form so the ordering stays total.
pub(crate) fn ordering(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(_), Value::Number(_)) => {
            let x = as_f64(a).unwrap_or(f64::NAN);
            let y = as_f64(b).unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ if rank(a) != rank(b) => rank(a).cmp(&rank(b)),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn summary(value: &Value) -> String {
    let rendered = display_string(value);
    if rendered.chars().count() > 40 {
        let prefix: String = rendered.chars().take(40).collect();
        format!("{} ({}…)", type_name(value), prefix)
    } else if rendered.is_empty() {
        type_name(value).to_string()
    } else {
        format!("{} ({})", type_name(value), rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!(true)));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!(1)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!("false")));
        assert!(is_truthy(&json!("hello")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!([1])));
    }

    #[test]
    fn test_display_string() {
        assert_eq!(display_string(&Value::Null), "");
        assert_eq!(display_string(&json!("plain")), "plain");
        assert_eq!(display_string(&json!(42)), "42");
        assert_eq!(display_string(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_loose_eq_numbers() {
        assert!(loose_eq(&json!(1), &json!(1.0)));
        assert!(!loose_eq(&json!(1), &json!("1")));
    }

    #[test]
    fn test_ordering_mixed() {
        assert_eq!(ordering(&json!(1), &json!(2)), Ordering::Less);
        assert_eq!(ordering(&json!("a"), &json!("b")), Ordering::Less);
        assert_eq!(ordering(&Value::Null, &json!(0)), Ordering::Less);
    }
}
