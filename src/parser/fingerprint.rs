//! Query fingerprinting
//!
//! Two queries share a fingerprint when they differ only in literal values:
//! values become `?`, object keys are sorted and arrays are collapsed to
//! their distinct shapes.

use serde_json::Value;

/// Normalized representation of `query` for operation `op` on `collection`
///
/// Only documents can be fingerprinted; any other JSON kind is an error.
pub fn fingerprint(op: &str, collection: &str, query: &Value) -> Result<String, String> {
    let source = filter_of(query);

    match source {
        Value::Object(_) => {}
        other => return Err(format!("cannot fingerprint {} query", kind(other))),
    }

    let op = op.to_uppercase();
    if collection.is_empty() {
        Ok(format!("{} {}", op, normalize(source)))
    } else {
        Ok(format!("{} {} {}", op, collection, normalize(source)))
    }
}

/// Find-command shaped queries keep the predicate under `filter`
fn filter_of(query: &Value) -> &Value {
    match query.get("filter") {
        Some(filter @ Value::Object(_)) => filter,
        _ => query,
    }
}

fn normalize(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", k, normalize(&map[k])))
                .collect();

            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let mut shapes: Vec<String> = items.iter().map(normalize).collect();
            shapes.sort();
            shapes.dedup();
            format!("[{}]", shapes.join(","))
        }
        _ => "?".to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_values_are_replaced() {
        let a = fingerprint("query", "users", &json!({"name": "bob", "age": 42})).unwrap();
        let b = fingerprint("query", "users", &json!({"age": 7, "name": "alice"})).unwrap();

        assert_eq!(a, "QUERY users {age:?,name:?}");
        assert_eq!(a, b);
    }

    #[test]
    fn test_operators_and_arrays() {
        let fp = fingerprint(
            "find",
            "orders",
            &json!({"$or": [{"status": "open"}, {"status": "new"}, {"total": {"$gt": 10}}]}),
        )
        .unwrap();

        assert_eq!(fp, "FIND orders {$or:[{status:?},{total:{$gt:?}}]}");

        let fp = fingerprint("find", "orders", &json!({"tags": {"$in": [1, 2, 3]}})).unwrap();
        assert_eq!(fp, "FIND orders {tags:{$in:[?]}}");
    }

    #[test]
    fn test_find_command_uses_filter() {
        let fp = fingerprint(
            "query",
            "orders",
            &json!({"find": "orders", "filter": {"status": "open"}, "limit": 5}),
        )
        .unwrap();

        assert_eq!(fp, "QUERY orders {status:?}");
    }

    #[test]
    fn test_non_document_query_is_rejected() {
        let err = fingerprint("query", "users", &json!("db.users.find()")).unwrap_err();
        assert!(err.contains("string"));

        assert!(fingerprint("query", "users", &json!([1, 2])).is_err());
    }

    #[test]
    fn test_command_without_collection() {
        let fp = fingerprint("command", "", &json!({"ping": 1})).unwrap();
        assert_eq!(fp, "COMMAND {ping:?}");
    }
}
