//! Name-to-executor registry consulted when a run asks for tool outputs.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::arguments::ToolArguments;
use super::tool::{FunctionTool, Tool, ToolExecutionContext};
use crate::error::AgentRunError;

/// How an executor's JSON result becomes the output string sent to the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultFormat {
    /// Strings verbatim, anything else JSON-encoded.
    #[default]
    Text,
    /// Always JSON-encoded, strings included.
    Json,
}

impl ResultFormat {
    pub fn render(self, value: &serde_json::Value) -> String {
        match (self, value) {
            (Self::Text, serde_json::Value::String(s)) => s.clone(),
            _ => value.to_string(),
        }
    }
}

struct Registered {
    tool: Arc<dyn Tool>,
    format: ResultFormat,
}

/// Registry of local tools.
///
/// Read-only once handed to a controller, so one registry can serve any
/// number of concurrent runs.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Registered>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous executor under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, executor: F) -> &mut Self
    where
        F: Fn(&ToolArguments) -> Result<serde_json::Value, AgentRunError> + Send + Sync + 'static,
    {
        self.register_tool(FunctionTool::new(name, executor))
    }

    /// Register a [`Tool`] with the default result format.
    pub fn register_tool(&mut self, tool: impl Tool + 'static) -> &mut Self {
        self.register_with_format(Arc::new(tool), ResultFormat::default())
    }

    /// Register a shared tool with an explicit result format.
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register_with_format(&mut self, tool: Arc<dyn Tool>, format: ResultFormat) -> &mut Self {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Registered { tool, format }).is_some() {
            tracing::warn!(tool = %name, "Replacing previously registered tool");
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Registered names with their descriptions, sorted by name.
    pub fn describe(&self) -> Vec<(&str, &str)> {
        self.tools
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.tool.description()))
            .collect()
    }

    /// Run the tool registered as `name` on raw JSON arguments.
    ///
    /// Returns [`AgentRunError::UnknownTool`] when nothing is registered under
    /// `name`, and [`AgentRunError::ToolExecution`] when the executor fails.
    pub async fn invoke(
        &self,
        name: &str,
        raw_arguments: &str,
        ctx: &ToolExecutionContext,
    ) -> Result<String, AgentRunError> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| AgentRunError::UnknownTool(name.to_string()))?;
        let args = ToolArguments::parse(raw_arguments);

        match entry.tool.execute(&args, ctx).await {
            Ok(value) => Ok(entry.format.render(&value)),
            Err(err @ AgentRunError::ToolExecution { .. }) => Err(err),
            Err(err) => Err(AgentRunError::tool(name, err.to_string())),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}
