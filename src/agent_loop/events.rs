//! Run timeline events recorded by the diagnostics collector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReportedError;
use crate::types::{RunStatus, ToolCallRecord, Usage};

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEventPayload {
    MessagePosted {
        thread_id: String,
    },
    RunCreated {
        run_id: String,
        attempt: u32,
    },
    StatusChanged {
        run_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<RunStatus>,
        to: RunStatus,
    },
    ToolDispatched {
        run_id: String,
        record: ToolCallRecord,
    },
    OutputsSubmitted {
        run_id: String,
        count: usize,
    },
    ApprovalsSubmitted {
        run_id: String,
        approved: usize,
        denied: usize,
    },
    StuckQueue {
        run_id: String,
        waited_ms: u64,
        attempt: u32,
    },
    CancelRequested {
        run_id: String,
        reason: String,
        acknowledged: bool,
    },
    UsageReported {
        run_id: String,
        usage: Usage,
    },
    Error {
        error: ReportedError,
    },
}

/// Envelope with ordering and wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: RunEventPayload,
}

/// A status change observed while polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<RunStatus>,
    pub to: RunStatus,
    pub at: DateTime<Utc>,
}
