//! Coercion rules for the two operations that reinterpret a stored value.
//!
//! `add` narrows the stored value to a number, `push` narrows it to an array.
//! Both are pure so every adaptor applies the same rules.

use serde_json::{Number, Value};

use crate::errors::{json_type_name, StoreError};

/// Numeric increment. A missing or falsy slot (`null`, `false`, `""`) counts as zero.
pub fn add_numbers(existing: Option<&Value>, delta: &Value) -> Result<Value, StoreError> {
    let Value::Number(delta) = delta else {
        return Err(StoreError::type_mismatch(
            "number",
            format!(
                "Value isn't a number (got {}). If you're using '+', then you might not write it.",
                json_type_name(delta)
            ),
        ));
    };
    let current = match existing {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Number::from(0),
        Some(Value::String(s)) if s.is_empty() => Number::from(0),
        Some(Value::Number(n)) => n.clone(),
        Some(other) => {
            return Err(StoreError::type_mismatch(
                "number",
                format!("stored value is a {}, cannot add to it", json_type_name(other)),
            ))
        }
    };

    if let (Some(a), Some(b)) = (current.as_i64(), delta.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Value::Number(sum.into()));
        }
    }
    let sum = current.as_f64().unwrap_or(0.0) + delta.as_f64().unwrap_or(0.0);
    Number::from_f64(sum)
        .map(Value::Number)
        .ok_or_else(|| StoreError::type_mismatch("finite number", format!("{sum} cannot be stored")))
}

/// Array append. A non-array slot is discarded; an array argument is spliced.
pub fn push_values(existing: Option<Value>, value: Value) -> Value {
    let mut items = match existing {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    match value {
        Value::Array(more) => items.extend(more),
        single => items.push(single),
    }
    Value::Array(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_defaults_missing_to_zero() {
        assert_eq!(add_numbers(None, &json!(5)).unwrap(), json!(5));
        assert_eq!(add_numbers(Some(&Value::Null), &json!(-2)).unwrap(), json!(-2));
    }

    #[test]
    fn add_treats_falsy_slots_as_zero() {
        assert_eq!(add_numbers(Some(&json!(false)), &json!(2)).unwrap(), json!(2));
        assert_eq!(add_numbers(Some(&json!("")), &json!(3)).unwrap(), json!(3));
        assert!(add_numbers(Some(&json!(true)), &json!(1)).is_err());
    }

    #[test]
    fn add_keeps_integers_and_falls_back_to_float() {
        assert_eq!(add_numbers(Some(&json!(40)), &json!(2)).unwrap(), json!(42));
        assert_eq!(add_numbers(Some(&json!(1.5)), &json!(1)).unwrap(), json!(2.5));
        assert_eq!(add_numbers(Some(&json!(i64::MAX)), &json!(1)).unwrap(), json!(i64::MAX as f64 + 1.0));
    }

    #[test]
    fn add_rejects_non_numbers() {
        let e = add_numbers(Some(&json!(1)), &json!("+1")).unwrap_err();
        assert!(matches!(e, StoreError::TypeMismatch { .. }));
        assert_eq!(e.expected(), "number");
        let e = add_numbers(Some(&json!("ten")), &json!(1)).unwrap_err();
        assert!(matches!(e, StoreError::TypeMismatch { .. }));
    }

    #[test]
    fn push_replaces_non_arrays() {
        assert_eq!(push_values(Some(json!("scalar")), json!(1)), json!([1]));
        assert_eq!(push_values(None, json!({"a": 1})), json!([{"a": 1}]));
    }

    #[test]
    fn push_splices_arrays_in_order() {
        assert_eq!(push_values(Some(json!([0])), json!([1, 2])), json!([0, 1, 2]));
        assert_eq!(push_values(Some(json!([0])), json!([[1]])), json!([0, [1]]));
    }
}
