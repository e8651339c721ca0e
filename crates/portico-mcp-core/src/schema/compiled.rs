//! Compiled schema representation and cache.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Accepted `type` keyword values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl SchemaType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::Null => value.is_null(),
            Self::Number => value.is_number(),
            // Floats with a zero fractional part count as integers.
            Self::Integer => match value.as_f64() {
                Some(f) if value.is_number() => f.fract() == 0.0,
                _ => false,
            },
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }
}

/// One validation rule. Rules run in the order they were compiled:
/// type, required, properties, items, enum, pattern, numeric bounds,
/// length bounds.
#[derive(Debug, Clone)]
enum Rule {
    Type(SchemaType),
    Required(Vec<String>),
    Properties(HashMap<String, CompiledNode>),
    Items(Box<CompiledNode>),
    Enum(Vec<Value>),
    Pattern(Regex),
    Minimum(f64),
    Maximum(f64),
    MinLength(usize),
    MaxLength(usize),
}

#[derive(Debug, Clone)]
struct CompiledNode {
    rules: Vec<Rule>,
}

impl CompiledNode {
    fn compile(schema: &Value) -> Result<Self, Vec<String>> {
        let mut rules = Vec::new();

        if let Some(type_name) = schema.get("type").and_then(Value::as_str) {
            // Unknown type names are ignored for forward compatibility.
            if let Some(schema_type) = SchemaType::parse(type_name) {
                rules.push(Rule::Type(schema_type));
            }
        }

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            let names: Vec<String> = required
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            if !names.is_empty() {
                rules.push(Rule::Required(names));
            }
        }

        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            let mut compiled = HashMap::new();
            for (name, prop_schema) in properties {
                compiled.insert(name.clone(), CompiledNode::compile(prop_schema)?);
            }
            rules.push(Rule::Properties(compiled));
        }

        if let Some(items) = schema.get("items") {
            rules.push(Rule::Items(Box::new(CompiledNode::compile(items)?)));
        }

        if let Some(variants) = schema.get("enum").and_then(Value::as_array) {
            rules.push(Rule::Enum(variants.clone()));
        }

        if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
            let regex = Regex::new(pattern)
                .map_err(|e| vec![format!("invalid pattern '{pattern}': {e}")])?;
            rules.push(Rule::Pattern(regex));
        }

        if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64) {
            rules.push(Rule::Minimum(minimum));
        }
        if let Some(maximum) = schema.get("maximum").and_then(Value::as_f64) {
            rules.push(Rule::Maximum(maximum));
        }

        if let Some(min_length) = schema.get("minLength").and_then(Value::as_u64) {
            rules.push(Rule::MinLength(min_length as usize));
        }
        if let Some(max_length) = schema.get("maxLength").and_then(Value::as_u64) {
            rules.push(Rule::MaxLength(max_length as usize));
        }

        Ok(Self { rules })
    }

    fn validate(&self, value: &Value, path: &str, errors: &mut Vec<String>) {
        for rule in &self.rules {
            match rule {
                Rule::Type(expected) => {
                    if !expected.matches(value) {
                        push_error(
                            errors,
                            path,
                            format!("expected {}, got {}", expected.name(), type_name(value)),
                        );
                        // Later rules assume the right type.
                        return;
                    }
                }
                Rule::Required(names) => {
                    if let Some(object) = value.as_object() {
                        for name in names {
                            if !object.contains_key(name) {
                                push_error(
                                    errors,
                                    path,
                                    format!("missing required property: {name}"),
                                );
                            }
                        }
                    }
                }
                Rule::Properties(properties) => {
                    if let Some(object) = value.as_object() {
                        for (name, child) in object {
                            if let Some(compiled) = properties.get(name) {
                                let child_path = join_path(path, name);
                                compiled.validate(child, &child_path, errors);
                            }
                        }
                    }
                }
                Rule::Items(item_schema) => {
                    if let Some(array) = value.as_array() {
                        for (index, item) in array.iter().enumerate() {
                            let child_path = format!("{path}[{index}]");
                            item_schema.validate(item, &child_path, errors);
                        }
                    }
                }
                Rule::Enum(variants) => {
                    if !variants.contains(value) {
                        push_error(errors, path, format!("value not in enum: {value}"));
                    }
                }
                Rule::Pattern(regex) => {
                    if let Some(s) = value.as_str() {
                        if !regex.is_match(s) {
                            push_error(
                                errors,
                                path,
                                format!("string does not match pattern {}", regex.as_str()),
                            );
                        }
                    }
                }
                Rule::Minimum(minimum) => {
                    if let Some(n) = value.as_f64() {
                        if n < *minimum {
                            push_error(errors, path, format!("{n} is below minimum {minimum}"));
                        }
                    }
                }
                Rule::Maximum(maximum) => {
                    if let Some(n) = value.as_f64() {
                        if n > *maximum {
                            push_error(errors, path, format!("{n} is above maximum {maximum}"));
                        }
                    }
                }
                Rule::MinLength(min_length) => {
                    if let Some(s) = value.as_str() {
                        let length = s.chars().count();
                        if length < *min_length {
                            push_error(
                                errors,
                                path,
                                format!("length {length} is below minLength {min_length}"),
                            );
                        }
                    }
                }
                Rule::MaxLength(max_length) => {
                    if let Some(s) = value.as_str() {
                        let length = s.chars().count();
                        if length > *max_length {
                            push_error(
                                errors,
                                path,
                                format!("length {length} is above maxLength {max_length}"),
                            );
                        }
                    }
                }
            }
        }
    }
}

fn join_path(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

fn push_error(errors: &mut Vec<String>, path: &str, message: String) {
    if path.is_empty() {
        errors.push(message);
    } else {
        errors.push(format!("{path}: {message}"));
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A schema compiled to an ordered rule list, keyed by its canonical
/// JSON text.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    root: CompiledNode,
    key: String,
}

impl CompiledSchema {
    pub fn compile(schema: &Value) -> Result<Self, Vec<String>> {
        Ok(Self {
            root: CompiledNode::compile(schema)?,
            key: schema.to_string(),
        })
    }

    /// Stable cache key for this schema. serde_json maps are sorted,
    /// so equal schemas produce equal keys.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn validate(&self, data: &Value) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        self.root.validate(data, "", &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Memoizes compiled schemas by canonical text.
#[derive(Debug, Clone, Default)]
pub struct SchemaCache {
    inner: Arc<Mutex<HashMap<String, Arc<CompiledSchema>>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(&self, schema: &Value) -> Result<Arc<CompiledSchema>, Vec<String>> {
        let key = schema.to_string();
        if let Ok(cache) = self.inner.lock() {
            if let Some(compiled) = cache.get(&key) {
                return Ok(compiled.clone());
            }
        }
        let compiled = Arc::new(CompiledSchema::compile(schema)?);
        if let Ok(mut cache) = self.inner.lock() {
            cache.insert(key, compiled.clone());
        }
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_reuses_compiled_schemas() {
        let cache = SchemaCache::new();
        let schema = json!({"type": "object", "required": ["a"]});
        let first = cache.get_or_compile(&schema).unwrap();
        let second = cache.get_or_compile(&schema).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn key_is_stable_across_key_order() {
        // serde_json sorts object keys, so these parse to equal values.
        let a: Value = serde_json::from_str(r#"{"type":"object","required":["a"]}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"required":["a"],"type":"object"}"#).unwrap();
        let ca = CompiledSchema::compile(&a).unwrap();
        let cb = CompiledSchema::compile(&b).unwrap();
        assert_eq!(ca.key(), cb.key());
    }

    #[test]
    fn invalid_pattern_fails_compilation() {
        let schema = json!({"type": "string", "pattern": "["});
        assert!(CompiledSchema::compile(&schema).is_err());
    }

    #[test]
    fn type_failure_short_circuits_nested_rules() {
        let schema = json!({
            "type": "object",
            "required": ["a"],
            "properties": {"a": {"type": "string"}}
        });
        let compiled = CompiledSchema::compile(&schema).unwrap();
        let errors = compiled.validate(&json!("not an object")).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("expected object"));
    }
}
