//! Convenience re-exports for common use.

pub use crate::agent_loop::{
    ApprovalPolicy, RunController, RunOutcome, RunReport, RunRequest,
};
pub use crate::config::{OrchestratorConfig, RunConfig};
pub use crate::error::{AgentRunError, Result};
pub use crate::tools::{AgentTool, FunctionTool, Tool, ToolArguments, ToolRegistry};
pub use crate::transport::{HttpTransport, RunTransport};
pub use crate::types::{PendingAction, Run, RunStatus, Usage};
pub use tokio_util::sync::CancellationToken;
