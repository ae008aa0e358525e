//! Usage: Normalize the collection shapes the forms API answers with into a flat item list.

use crate::shared::error::AppResult;
use serde_json::Value;

const WRAPPER_KEYS: [&str; 2] = ["results", "data"];

/// What to do with an object that carries neither `results` nor `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShapePolicy {
    /// Treat the object itself as the only element (templates collection).
    CoerceBareObject,
    /// Treat it as an empty page (forms collections).
    WrapperOnly,
}

/// Accepts a bare list, `{"results": [...]}`, `{"data": [...]}` or, per `policy`, a single object.
pub(crate) fn collection_items(value: Value, policy: ShapePolicy) -> AppResult<Vec<Value>> {
    let mut map = match value {
        Value::Array(items) => return Ok(items),
        Value::Object(map) => map,
        other => {
            return Err(format!(
                "UPSTREAM_FORMAT: unexpected collection response type: {}",
                json_type_name(&other)
            )
            .into())
        }
    };

    let wrapped = WRAPPER_KEYS
        .iter()
        .find(|key| map.contains_key(**key))
        .and_then(|key| map.remove(*key));

    match wrapped {
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Null) => Ok(Vec::new()),
        // A wrapper holding a single element rather than a list.
        Some(single) => Ok(vec![single]),
        None if map.is_empty() => Ok(Vec::new()),
        None => match policy {
            ShapePolicy::CoerceBareObject => Ok(vec![Value::Object(map)]),
            ShapePolicy::WrapperOnly => Ok(Vec::new()),
        },
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
