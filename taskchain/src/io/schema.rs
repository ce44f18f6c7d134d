//! JSON Schema checks for payloads received from models and backends.

use anyhow::{Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

pub const TASK_SPLIT_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/task_split.schema.json"
));
pub const VERDICT_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/verdict.schema.json"
));
pub const TASK_ANSWER_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/task_answer.schema.json"
));

/// Validate `instance` against an embedded schema.
///
/// The error lists every violation, joined with `; `.
pub fn validate_schema(schema: &str, label: &str, instance: &Value) -> Result<()> {
    let schema_value: Value =
        serde_json::from_str(schema).map_err(|err| anyhow!("parse {label} schema: {err}"))?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid {label} schema: {err}"))?;
    if !compiled.is_valid(instance) {
        let messages = compiled
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "{label} schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
