//! Typed access to tool call arguments.

use crate::error::AgentRunError;

/// Wrapper around tool call arguments providing typed extraction.
///
/// Arguments arrive as JSON text. Parsing never fails: blank or `null` input
/// becomes an empty object, and text that is not valid JSON is kept as a
/// string value so the executor can decide what to do with it.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
    raw: String,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        let raw = value.to_string();
        Self { value, raw }
    }

    /// Normalize raw JSON text from the service.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let value = if trimmed.is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str::<serde_json::Value>(trimmed) {
                Ok(serde_json::Value::Null) => serde_json::json!({}),
                Ok(value) => value,
                Err(e) => {
                    tracing::debug!(error = %e, "Tool arguments are not valid JSON; passing raw text");
                    serde_json::Value::String(raw.to_string())
                }
            }
        };
        Self {
            value,
            raw: raw.to_string(),
        }
    }

    /// Get the normalized JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// The arguments exactly as received.
    pub fn text(&self) -> &str {
        &self.raw
    }

    /// Whether the received text could not be parsed as JSON.
    pub fn is_malformed(&self) -> bool {
        self.value.is_string() && !self.raw.trim_start().starts_with('"')
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, AgentRunError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentRunError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get a string argument that is present and not blank.
    pub fn get_non_empty_str(&self, key: &str) -> Option<&str> {
        self.get_str_opt(key).filter(|v| !v.trim().is_empty())
    }

    /// Get an integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64, AgentRunError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| AgentRunError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    /// Get a boolean argument.
    pub fn get_bool(&self, key: &str) -> Result<bool, AgentRunError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| AgentRunError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, AgentRunError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            AgentRunError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_null_become_empty_object() {
        for raw in ["", "   ", "null"] {
            let args = ToolArguments::parse(raw);
            assert_eq!(args.raw(), &serde_json::json!({}), "input {raw:?}");
            assert!(!args.is_malformed());
        }
    }

    #[test]
    fn malformed_json_is_kept_as_raw_string() {
        let args = ToolArguments::parse("{city: Paris");
        assert!(args.is_malformed());
        assert_eq!(args.raw(), &serde_json::json!("{city: Paris"));
        assert_eq!(args.text(), "{city: Paris");
        assert!(args.get_str_opt("city").is_none());
    }

    #[test]
    fn object_fields_are_accessible() {
        let args = ToolArguments::parse(r#"{"city": "Oslo", "days": 3, "metric": true}"#);
        assert_eq!(args.get_str("city").unwrap(), "Oslo");
        assert_eq!(args.get_i64("days").unwrap(), 3);
        assert!(args.get_bool("metric").unwrap());
        assert!(args.get_str("country").is_err());
    }

    #[test]
    fn non_empty_str_rejects_blank_values() {
        let args = ToolArguments::parse(r#"{"city": "  "}"#);
        assert!(args.get_non_empty_str("city").is_none());
        assert_eq!(args.get_str_opt("city"), Some("  "));
    }

    #[test]
    fn deserialize_into_struct() {
        #[derive(serde::Deserialize)]
        struct Query {
            city: String,
        }
        let args = ToolArguments::parse(r#"{"city": "Lima"}"#);
        let query: Query = args.deserialize().unwrap();
        assert_eq!(query.city, "Lima");
    }
}
