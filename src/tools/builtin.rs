//! Built-in tools for the CLI and quick experiments.

use chrono::{FixedOffset, Utc};

use super::registry::ToolRegistry;
use super::tool::FunctionTool;

/// Registry with every built-in tool registered.
pub fn registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register_tool(current_time_tool());
    registry.register_tool(echo_tool());
    registry
}

/// `current_time`: RFC 3339 timestamp, optionally shifted by `utc_offset_hours`.
pub fn current_time_tool() -> FunctionTool {
    FunctionTool::new("current_time", |args| {
        let offset_hours = args.raw().get("utc_offset_hours").and_then(|v| v.as_i64()).unwrap_or(0);
        let Some(offset) = offset_hours
            .checked_mul(3600)
            .and_then(|secs| i32::try_from(secs).ok())
            .and_then(FixedOffset::east_opt)
        else {
            return Ok(serde_json::json!(format!(
                "utc_offset_hours must be between -23 and 23, got {offset_hours}"
            )));
        };
        Ok(serde_json::json!(Utc::now().with_timezone(&offset).to_rfc3339()))
    })
    .with_description("Current date and time in RFC 3339 format")
}

/// `echo`: returns the `text` argument unchanged.
pub fn echo_tool() -> FunctionTool {
    FunctionTool::new("echo", |args| match args.get_str_opt("text") {
        Some(text) => Ok(serde_json::json!(text)),
        None => Ok(serde_json::json!("parameter 'text' is required")),
    })
    .with_description("Echo the `text` argument back")
}
