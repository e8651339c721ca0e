//! Schema generation from Rust types, for tool registration ergonomics.

use serde_json::Value;

/// Derive an object-typed JSON Schema for `T`.
pub fn schema_for<T: schemars::JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, JsonSchema)]
    struct AddArgs {
        a: f64,
        b: f64,
    }

    #[test]
    fn generates_object_schema() {
        let schema = schema_for::<AddArgs>();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"].get("a").is_some());
        assert!(schema["properties"].get("b").is_some());
    }

    #[test]
    fn generated_schema_validates_arguments() {
        let schema = schema_for::<AddArgs>();
        assert!(crate::schema::validate(&schema, &serde_json::json!({"a": 1.0, "b": 2.0})).is_ok());
    }
}
