//! Tool trait and closure-based tool wrappers.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::arguments::ToolArguments;
use crate::error::AgentRunError;

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutionContext {
    /// Service-assigned id of the call being answered.
    pub call_id: String,
    /// Name the run used to request the tool.
    pub tool_name: String,
    /// Cancelled when the caller abandons the run.
    pub cancel: CancellationToken,
}

/// Core tool trait. Implement to plug a capability into the registry.
///
/// Executors must not retry their own transient failures; retries belong to
/// the run controller.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the run calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Execute the tool with parsed arguments.
    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, AgentRunError>;
}

type SyncHandler = dyn Fn(&ToolArguments) -> Result<serde_json::Value, AgentRunError> + Send + Sync;

/// Tool backed by a synchronous closure, run on the blocking pool.
pub struct FunctionTool {
    name: String,
    description: String,
    handler: Arc<SyncHandler>,
}

impl FunctionTool {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&ToolArguments) -> Result<serde_json::Value, AgentRunError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        _ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, AgentRunError> {
        let handler = self.handler.clone();
        let args = args.clone();
        tokio::task::spawn_blocking(move || handler(&args))
            .await
            .map_err(|e| AgentRunError::tool(&self.name, format!("executor panicked: {e}")))?
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

type AsyncHandler = dyn Fn(ToolArguments, ToolExecutionContext) -> BoxFuture<'static, Result<serde_json::Value, AgentRunError>>
    + Send
    + Sync;

/// Closure-based async tool, for executors that do their own I/O.
pub struct AgentTool {
    name: String,
    description: String,
    handler: Arc<AsyncHandler>,
}

impl AgentTool {
    /// Create a tool from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, AgentRunError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, AgentRunError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn function_tool_runs_sync_closure() {
        let tool = FunctionTool::new("double", |args| {
            let n = args.get_i64("n")?;
            Ok(serde_json::json!(n * 2))
        });
        let result = tool
            .execute(
                &ToolArguments::parse(r#"{"n": 21}"#),
                &ToolExecutionContext::default(),
            )
            .await
            .expect("execute should succeed");
        assert_eq!(result, serde_json::json!(42));
    }

    #[tokio::test]
    async fn agent_tool_sees_call_context() {
        let tool = AgentTool::new("whoami", "echo the call id", |_args, ctx| async move {
            Ok::<_, AgentRunError>(serde_json::json!(ctx.call_id))
        });
        let ctx = ToolExecutionContext {
            call_id: "call_9".into(),
            tool_name: "whoami".into(),
            cancel: CancellationToken::new(),
        };
        let result = tool
            .execute(&ToolArguments::parse("{}"), &ctx)
            .await
            .expect("execute should succeed");
        assert_eq!(result, serde_json::json!("call_9"));
        assert_eq!(tool.description(), "echo the call id");
    }
}
