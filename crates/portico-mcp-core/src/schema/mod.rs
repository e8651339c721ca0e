//! JSON Schema subset validation.
//!
//! The validator accepts the subset of JSON Schema used for tool
//! arguments and results: `type`, `required`, `properties`, `items`,
//! `enum`, `pattern`, `minimum`, `maximum`, `minLength`, `maxLength`.
//! Unknown keywords are ignored for forward compatibility. Schemas may
//! be pre-compiled into an ordered rule list and cached.

mod compiled;
mod generation;

pub use compiled::{CompiledSchema, SchemaCache};
pub use generation::schema_for;

use serde_json::Value;

/// Validate `data` against `schema`, returning field-qualified error
/// strings on failure. Deterministic: depends only on the inputs.
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    CompiledSchema::compile(schema)?.validate(data)
}

/// Validate and collapse errors into a single tool-level error.
pub fn validate_tool_input(schema: &Value, data: &Value) -> crate::error::Result<()> {
    validate(schema, data).map_err(|errors| {
        crate::error::Error::Tool(crate::error::ToolError::SchemaValidation(errors.join("; ")))
    })
}
