//! Lenient views into untrusted JSON.

use std::sync::LazyLock;

use serde_json::{Map, Value};

static EMPTY_OBJECT: LazyLock<Map<String, Value>> = LazyLock::new(Map::new);

/// The fields of `json` if it is an object, otherwise no fields.
pub fn object_spreadable(json: Option<&Value>) -> &Map<String, Value> {
    match json {
        Some(Value::Object(map)) => map,
        _ => &EMPTY_OBJECT,
    }
}

/// The elements of `json` if it is an array, otherwise none.
pub fn array_spreadable(json: Option<&Value>) -> &[Value] {
    match json {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn spreadable_views() {
        let object = json!({ "sub": "me" });
        assert_eq!(object_spreadable(Some(&object))["sub"], "me");
        assert!(object_spreadable(Some(&json!([1]))).is_empty());
        assert!(object_spreadable(None).is_empty());

        let array = json!([1, 2]);
        assert_eq!(array_spreadable(Some(&array)).len(), 2);
        assert!(array_spreadable(Some(&object)).is_empty());
    }
}
