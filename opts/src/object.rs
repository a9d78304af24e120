//! Path access into JSON value trees

use serde_json::{Map, Value};
use tracing::debug;

/// Descend into `value` along `path`
///
/// Objects are indexed by key, arrays by numeric segment. Any missing step
/// yields `None` rather than an error.
pub fn object_get<'a, S: AsRef<str>>(value: &'a Value, path: &[S]) -> Option<&'a Value> {
    let mut current = value;
    for segment in path {
        let segment = segment.as_ref();
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Replace the value at `path` inside `target`, creating objects as needed
///
/// Intermediate scalars are replaced by empty objects. Array segments must be
/// numeric and may address an existing element or append one past the end.
/// Returns false, leaving `target` untouched, when a segment cannot be placed.
pub fn object_set<S: AsRef<str>>(target: &mut Value, path: &[S], new_value: Value) -> bool {
    if !is_settable(target, path) {
        debug!(path = %join(path), "object_set: array index out of range");
        return false;
    }

    let Some((last, parents)) = path.split_last() else {
        *target = new_value;
        return true;
    };

    let mut current = target;
    for segment in parents {
        current = child_mut(current, segment.as_ref());
    }
    *child_mut(current, last.as_ref()) = new_value;
    true
}

/// Walk `path` without mutating, checking every array step is in range
fn is_settable<S: AsRef<str>>(target: &Value, path: &[S]) -> bool {
    let mut current = Some(target);
    for segment in path {
        let segment = segment.as_ref();
        current = match current {
            Some(Value::Array(items)) => match segment.parse::<usize>() {
                Ok(index) if index <= items.len() => items.get(index),
                _ => return false,
            },
            Some(Value::Object(map)) => map.get(segment),
            // Scalars and missing steps become fresh objects
            _ => None,
        };
    }
    true
}

fn join<S: AsRef<str>>(path: &[S]) -> String {
    path.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(".")
}

fn child_mut<'a>(value: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = match value {
        Value::Array(_) => segment.parse::<usize>().ok(),
        _ => None,
    };

    if let Some(index) = index {
        let Value::Array(items) = value else {
            unreachable!("index is only parsed for arrays");
        };
        if index == items.len() {
            items.push(Value::Null);
        }
        return &mut items[index];
    }

    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    let Value::Object(map) = value else {
        unreachable!("value was just made an object");
    };
    map.entry(segment.to_string()).or_insert(Value::Null)
}

/// Structural equality where `1` and `1.0` are the same number
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len() && xs.iter().all(|(k, x)| ys.get(k).is_some_and(|y| deep_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Truthiness in the loose sense: null, false, zero and "" are falsy
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
