//! Error classification shared with run reports.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Broad error category used to tell failure modes apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    /// Network or service unavailability.
    Transport,
    /// A `needsInput` payload the client cannot answer.
    Protocol,
    /// A local tool executor failed.
    ToolExecution,
    /// Iteration or retry budget ran out.
    Exhausted,
    /// The service reported the run as failed.
    Remote,
    /// The caller abandoned the run.
    Cancelled,
    Configuration,
    Serialization,
}

/// Serializable error snapshot carried by a run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    pub category: ErrorCategory,
    pub message: String,
}
