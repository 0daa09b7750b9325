//! Run, pending-action, step and message types.
//!
//! These are client-side snapshots of objects owned by the remote service.
//! The client never holds an authoritative copy; it only keeps the last
//! snapshot it fetched.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::usage::Usage;

/// Server-driven run status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    NeedsInput,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Whether the service will never move the run out of this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Error attached to a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub code: String,
    pub message: String,
}

/// One execution of an agent against a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    /// Agent the run was started for, when the service reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<RunError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Run {
    /// Snapshot with just an id and status.
    pub fn new(id: impl Into<String>, thread_id: impl Into<String>, status: RunStatus) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            agent_id: None,
            status,
            pending_action: None,
            last_error: None,
            usage: None,
        }
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_pending_action(mut self, action: PendingAction) -> Self {
        self.pending_action = Some(action);
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_last_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.last_error = Some(RunError {
            code: code.into(),
            message: message.into(),
        });
        self
    }
}

/// A remote-executed tool call awaiting a yes/no decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalCall {
    pub call_id: String,
    pub tool_name: String,
}

/// A local function the run wants invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputCall {
    pub call_id: String,
    pub function_name: String,
    /// Raw JSON-encoded arguments, exactly as the service sent them.
    pub arguments: String,
}

/// Payload attached to a run in `needs_input`.
///
/// Decided once at the protocol boundary; downstream code never re-inspects
/// the wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PendingAction {
    Approval { calls: Vec<ApprovalCall> },
    Output { calls: Vec<OutputCall> },
    Unknown { kind: String },
}

impl PendingAction {
    pub fn kind(&self) -> &str {
        match self {
            Self::Approval { .. } => "approval",
            Self::Output { .. } => "output",
            Self::Unknown { kind } => kind,
        }
    }
}

/// A resolved tool output to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub call_id: String,
    pub output: String,
}

/// A decision for a remote-executed tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolApproval {
    pub call_id: String,
    pub approve: bool,
}

/// How a tool call ended up in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolCallStatus {
    /// Executed locally, output submitted.
    Resolved,
    /// Executor errored; the error text was submitted as output.
    Errored,
    /// No registered tool with this name.
    Unrecognized,
    Approved,
    Denied,
    /// Reported by the service in a run step.
    Reported,
}

/// One entry in the diagnostic trace. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_outputs: Vec<String>,
    pub status: ToolCallStatus,
}

/// Server-reported unit of work within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStep {
    pub id: String,
    pub run_id: String,
    /// Step kind as reported (`tool_calls`, `message_creation`, ...).
    pub kind: String,
    pub status: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Author of a thread message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// A thread message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}
