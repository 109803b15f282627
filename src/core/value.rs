//! Comparison and path helpers over the JSON records the bridge exchanges with providers.

use crate::core::{PersistenceError, Result};
use serde_json::{Map, Value};
use std::cmp::Ordering;

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NULL",
        Value::Bool(_) => "BOOLEAN",
        Value::Number(n) if n.is_f64() => "FLOAT",
        Value::Number(_) => "INTEGER",
        Value::String(_) => "TEXT",
        Value::Array(_) => "ARRAY",
        Value::Object(_) => "OBJECT",
    }
}

/// Order two scalar values. NULL sorts last; integers and floats compare numerically.
pub fn compare(a: &Value, b: &Value) -> Result<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Ok(Ordering::Equal),
        (Value::Null, _) => Ok(Ordering::Greater),
        (_, Value::Null) => Ok(Ordering::Less),

        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return Ok(x.cmp(&y));
            }
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            match (x.is_nan(), y.is_nan()) {
                (true, true) => Ok(Ordering::Equal),
                (true, false) => Ok(Ordering::Greater),
                (false, true) => Ok(Ordering::Less),
                (false, false) => Ok(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
            }
        }

        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),

        _ => Err(PersistenceError::TypeMismatch(format!(
            "Cannot compare incompatible types: {} and {}",
            type_name(a),
            type_name(b)
        ))),
    }
}

/// Equality used by query predicates: numbers compare by value, everything else structurally.
pub fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => {
            matches!(compare(a, b), Ok(Ordering::Equal))
        }
        _ => a == b,
    }
}

/// Canonical storage key for an entity id. Ids of different JSON types never share a key.
pub fn id_key(id: &Value) -> String {
    id.to_string()
}

/// Read a nested field; missing segments resolve to NULL.
pub fn lookup_path<'a>(record: &'a Value, path: &[String]) -> &'a Value {
    static NULL: Value = Value::Null;
    let mut current = record;
    for segment in path {
        match current.get(segment.as_str()) {
            Some(next) => current = next,
            None => return &NULL,
        }
    }
    current
}

/// Write a nested field, creating intermediate objects as needed.
pub fn set_path(record: &mut Value, path: &[String], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        return Err(PersistenceError::QueryError("Empty field path".into()));
    };

    let mut current = record;
    for segment in parents {
        let object = current.as_object_mut().ok_or_else(|| {
            PersistenceError::TypeMismatch(format!("'{}' is not an object", segment))
        })?;
        current = object
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let object = current.as_object_mut().ok_or_else(|| {
        PersistenceError::TypeMismatch(format!("Cannot set '{}' on a non-object value", last))
    })?;
    object.insert(last.clone(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compare_mixed_numbers() {
        assert_eq!(compare(&json!(1), &json!(1.5)).unwrap(), Ordering::Less);
        assert_eq!(compare(&json!(2), &json!(2)).unwrap(), Ordering::Equal);
        assert!(loosely_equal(&json!(3), &json!(3.0)));
    }

    #[test]
    fn test_null_sorts_last() {
        assert_eq!(compare(&Value::Null, &json!("a")).unwrap(), Ordering::Greater);
        assert_eq!(compare(&json!(0), &Value::Null).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_compare_type_mismatch() {
        let err = compare(&json!("a"), &json!(1)).unwrap_err();
        assert!(matches!(err, PersistenceError::TypeMismatch(_)));
    }

    #[test]
    fn test_paths() {
        let mut record = json!({"id": "1", "author": {"name": "Ann"}});
        let path = vec!["author".to_string(), "name".to_string()];
        assert_eq!(lookup_path(&record, &path), &json!("Ann"));
        assert_eq!(lookup_path(&record, &["missing".to_string()]), &Value::Null);

        set_path(&mut record, &path, json!("Bob")).unwrap();
        set_path(&mut record, &["meta".to_string(), "rev".to_string()], json!(2)).unwrap();
        assert_eq!(record["author"]["name"], json!("Bob"));
        assert_eq!(record["meta"]["rev"], json!(2));
    }

    #[test]
    fn test_id_key() {
        assert_eq!(id_key(&json!("abc")), "\"abc\"");
        assert_eq!(id_key(&json!(42)), "42");
        assert_ne!(id_key(&json!("1")), id_key(&json!(1)));
    }
}
