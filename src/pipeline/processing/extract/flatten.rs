use serde_json::{Map, Value};

use crate::domain::{Cell, Record};

/// Separator joining nested key path segments
pub const KEY_SEPARATOR: char = '_';

/// Flatten a JSON object into a single-level record. Nested objects become
/// `parent_child` columns; arrays are kept as their JSON text. Uses an
/// explicit work stack so arbitrarily deep input cannot overflow the call
/// stack.
pub fn flatten_object(object: &Map<String, Value>) -> Record {
    let mut record = Record::new();
    // Each frame holds a key prefix and the remaining entries of one object
    let mut stack: Vec<(String, serde_json::map::Iter<'_>)> = vec![(String::new(), object.iter())];

    while let Some((prefix, entries)) = stack.last_mut() {
        let Some((key, value)) = entries.next() else {
            stack.pop();
            continue;
        };
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}{KEY_SEPARATOR}{key}")
        };
        match value {
            Value::Object(child) => stack.push((path, child.iter())),
            scalar => record.insert(path, scalar_cell(scalar)),
        }
    }
    record
}

/// Record for one JSON item: objects are flattened, anything else is
/// wrapped as `{value: ...}`
pub fn record_from_value(value: &Value) -> Record {
    match value {
        Value::Object(map) => flatten_object(map),
        other => {
            let mut record = Record::new();
            record.insert("value", scalar_cell(other));
            record
        }
    }
}

pub fn scalar_cell(value: &Value) -> Cell {
    match value {
        Value::Null => Cell::Null,
        Value::Bool(b) => Cell::text(b.to_string()),
        Value::Number(n) => n
            .as_f64()
            .map(Cell::Number)
            .unwrap_or_else(|| Cell::text(n.to_string())),
        Value::String(s) => Cell::text(s.as_str()),
        Value::Array(_) | Value::Object(_) => Cell::text(value.to_string()),
    }
}
