//! Terminal outcome of an orchestrated run.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How `execute` ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed,
    Cancelled,
    /// Iteration or retry budget ran out before the run finished.
    GaveUp,
}

impl RunOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Completed
    }
}
