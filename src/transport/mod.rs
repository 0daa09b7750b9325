//! Remote run service contract.

pub mod http;
pub mod wire;

pub use http::HttpTransport;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Message, Run, RunStep, ToolApproval, ToolOutput};

/// Client handle for the remote run service.
///
/// Implementations must be safe to share across concurrent runs; nothing
/// run-specific lives on the transport.
#[async_trait]
pub trait RunTransport: Send + Sync {
    /// Create an empty conversation thread and return its id.
    async fn create_thread(&self) -> Result<String>;

    /// Append a user message to a thread.
    async fn post_message(&self, thread_id: &str, content: &str) -> Result<()>;

    /// Start a run. Not idempotent: a lost response may still have created
    /// a run, which `list_runs` can recover.
    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<Run>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;

    /// Most recent runs of a thread, newest first.
    async fn list_runs(&self, thread_id: &str) -> Result<Vec<Run>>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<()>;

    async fn submit_approvals(
        &self,
        thread_id: &str,
        run_id: &str,
        approvals: &[ToolApproval],
    ) -> Result<()>;

    /// Steps of a run, oldest first, across all pages. Reporting only.
    async fn list_steps(&self, thread_id: &str, run_id: &str) -> Result<Vec<RunStep>>;

    /// Messages of a thread, oldest first, across all pages. Reporting only.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>>;
}
