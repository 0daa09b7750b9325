//! Structured trace of one run and the report handed to callers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{AgentRunError, ErrorCategory, ReportedError};
use crate::types::{Message, MessageRole, Run, RunStatus, RunStep, ToolCallRecord, Usage};

use super::events::{RunEvent, RunEventPayload, StatusTransition};
use super::types::RunOutcome;

/// Final artifact of `execute`. Plain data, safe to log or persist as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub report_id: Uuid,
    pub thread_id: String,
    pub agent_id: String,
    /// Last run attempt, if any run was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Every run attempt, oldest first.
    pub run_ids: Vec<String>,
    pub outcome: RunOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_status: Option<RunStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    pub messages: Vec<Message>,
    pub steps: Vec<RunStep>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub transitions: Vec<StatusTransition>,
    pub events: Vec<RunEvent>,
    /// Only present when the service reported usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportedError>,
    pub iterations: u32,
    pub recreations: u32,
    /// A run overstayed the queue timeout and recovery kicked in, whether
    /// or not a replacement run could be started.
    pub stuck_queue_recovered: bool,
    pub cancel_requested: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Accumulates events for one `execute` call.
#[derive(Debug)]
pub struct DiagnosticsCollector {
    thread_id: String,
    agent_id: String,
    started_at: DateTime<Utc>,
    started: Instant,
    seq: u64,
    events: Vec<RunEvent>,
    transitions: Vec<StatusTransition>,
    tool_calls: Vec<ToolCallRecord>,
    run_ids: Vec<String>,
    usage_by_run: BTreeMap<String, Usage>,
    last_status: Option<RunStatus>,
    iterations: u32,
    recreations: u32,
    stuck_queue: bool,
    cancel_requested: bool,
    conclusion: Option<(RunOutcome, Option<ReportedError>)>,
    messages: Vec<Message>,
    steps: Vec<RunStep>,
    report: Option<RunReport>,
}

impl DiagnosticsCollector {
    pub fn new(thread_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            agent_id: agent_id.into(),
            started_at: Utc::now(),
            started: Instant::now(),
            seq: 0,
            events: Vec::new(),
            transitions: Vec::new(),
            tool_calls: Vec::new(),
            run_ids: Vec::new(),
            usage_by_run: BTreeMap::new(),
            last_status: None,
            iterations: 0,
            recreations: 0,
            stuck_queue: false,
            cancel_requested: false,
            conclusion: None,
            messages: Vec::new(),
            steps: Vec::new(),
            report: None,
        }
    }

    /// Record an event. Ignored once the report has been finalized.
    pub fn record(&mut self, payload: RunEventPayload) {
        if self.report.is_some() {
            tracing::debug!(?payload, "Ignoring event recorded after finalize");
            return;
        }

        let timestamp = Utc::now();
        match &payload {
            RunEventPayload::RunCreated { run_id, attempt } => {
                self.run_ids.push(run_id.clone());
                if *attempt > 1 {
                    self.recreations += 1;
                }
                self.last_status = None;
            }
            RunEventPayload::StatusChanged { run_id, from, to } => {
                self.transitions.push(StatusTransition {
                    run_id: run_id.clone(),
                    from: *from,
                    to: *to,
                    at: timestamp,
                });
                self.last_status = Some(*to);
            }
            RunEventPayload::ToolDispatched { record, .. } => {
                self.tool_calls.push(record.clone());
            }
            RunEventPayload::UsageReported { run_id, usage } => {
                self.usage_by_run.insert(run_id.clone(), *usage);
            }
            RunEventPayload::StuckQueue { .. } => {
                self.stuck_queue = true;
            }
            RunEventPayload::CancelRequested { .. } => {
                self.cancel_requested = true;
            }
            _ => {}
        }

        self.seq += 1;
        self.events.push(RunEvent {
            seq: self.seq,
            timestamp,
            payload,
        });
    }

    /// Count a poll and record what it showed. Returns whether the status changed.
    pub fn observe(&mut self, run: &Run) -> bool {
        if self.report.is_some() {
            return false;
        }
        self.iterations += 1;
        if let Some(usage) = run.usage {
            if self.usage_by_run.get(&run.id) != Some(&usage) {
                self.record(RunEventPayload::UsageReported {
                    run_id: run.id.clone(),
                    usage,
                });
            }
        }
        if self.last_status == Some(run.status) {
            return false;
        }
        self.record(RunEventPayload::StatusChanged {
            run_id: run.id.clone(),
            from: self.last_status,
            to: run.status,
        });
        true
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn last_status(&self) -> Option<RunStatus> {
        self.last_status
    }

    /// Run attempts created so far, oldest first.
    pub fn run_ids(&self) -> &[String] {
        &self.run_ids
    }

    /// Record the terminal outcome. The first conclusion wins.
    pub fn conclude(&mut self, outcome: RunOutcome, error: Option<&AgentRunError>) {
        if self.conclusion.is_some() || self.report.is_some() {
            return;
        }
        let reported = error.map(AgentRunError::to_reported);
        if let Some(error) = &reported {
            self.record(RunEventPayload::Error {
                error: error.clone(),
            });
        }
        self.conclusion = Some((outcome, reported));
    }

    pub fn attach_messages(&mut self, messages: Vec<Message>) {
        if self.report.is_none() {
            self.messages = messages;
        }
    }

    pub fn attach_steps(&mut self, steps: Vec<RunStep>) {
        if self.report.is_none() {
            self.steps.extend(steps);
        }
    }

    /// Build the report. Later calls return the same report unchanged.
    pub fn finalize(&mut self) -> RunReport {
        if let Some(report) = &self.report {
            return report.clone();
        }

        let (outcome, error) = self.conclusion.clone().unwrap_or_else(|| {
            (
                RunOutcome::Failed,
                Some(ReportedError {
                    category: ErrorCategory::Protocol,
                    message: "run ended without a recorded outcome".to_string(),
                }),
            )
        });

        let usage = self.usage_by_run.values().fold(None, |acc: Option<Usage>, u| {
            let mut total = acc.unwrap_or_default();
            total.merge(u);
            Some(total)
        });

        let report = RunReport {
            report_id: Uuid::new_v4(),
            thread_id: self.thread_id.clone(),
            agent_id: self.agent_id.clone(),
            run_id: self.run_ids.last().cloned(),
            run_ids: self.run_ids.clone(),
            outcome,
            final_status: self.last_status,
            final_answer: self.final_answer(),
            messages: self.messages.clone(),
            steps: self.steps.clone(),
            tool_calls: self.tool_calls.clone(),
            transitions: self.transitions.clone(),
            events: self.events.clone(),
            usage,
            error,
            iterations: self.iterations,
            recreations: self.recreations,
            stuck_queue_recovered: self.stuck_queue,
            cancel_requested: self.cancel_requested,
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        };
        self.report = Some(report.clone());
        report
    }

    /// Last non-empty assistant message written by one of this call's runs.
    fn final_answer(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == MessageRole::Assistant && !m.text.trim().is_empty())
            .find(|m| {
                m.run_id
                    .as_ref()
                    .is_some_and(|id| self.run_ids.contains(id))
            })
            .map(|m| m.text.clone())
    }
}
