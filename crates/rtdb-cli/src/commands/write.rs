//! Write commands - set, push and update

use anyhow::{Context, Result};
use rtdb_client::RtdbClient;
use serde_json::Value;

use crate::output::{OutputContext, PushRow};

/// Parse a command-line value as JSON, falling back to a plain string
pub fn parse_value(value: &str) -> Result<Value> {
    if value.starts_with('{')
        || value.starts_with('[')
        || value.starts_with('"')
        || value == "true"
        || value == "false"
        || value == "null"
    {
        return serde_json::from_str(value).context("Failed to parse value as JSON");
    }
    if let Ok(num) = value.parse::<i64>() {
        return Ok(Value::Number(num.into()));
    }
    Ok(value
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string())))
}

/// Replace the value at `path`
pub async fn set(client: &RtdbClient, path: &str, value: &str, ctx: &OutputContext) -> Result<()> {
    let value = parse_value(value)?;
    client
        .set(path, &value)
        .await
        .with_context(|| format!("Failed to write {}", path))?;

    ctx.success(&format!("Set {}", path));
    Ok(())
}

/// Append a child with a generated key under `path`
pub async fn push(client: &RtdbClient, path: &str, value: &str, ctx: &OutputContext) -> Result<()> {
    let value = parse_value(value)?;
    let pushed = client
        .push(path, &value)
        .await
        .with_context(|| format!("Failed to push to {}", path))?;

    ctx.print_one(&PushRow {
        path: path.to_string(),
        name: pushed.name,
    });
    Ok(())
}

/// Merge the fields of a JSON object into `path`
pub async fn update(
    client: &RtdbClient,
    path: &str,
    value: &str,
    ctx: &OutputContext,
) -> Result<()> {
    let value = parse_value(value)?;
    if !value.is_object() {
        anyhow::bail!("update expects a JSON object, got {}", value);
    }
    client
        .update(path, &value)
        .await
        .with_context(|| format!("Failed to update {}", path))?;

    ctx.success(&format!("Updated {}", path));
    Ok(())
}
