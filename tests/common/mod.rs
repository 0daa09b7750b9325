//! Shared test helpers and a scripted run service.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use agentrun::error::{AgentRunError, Result};
use agentrun::transport::RunTransport;
use agentrun::types::*;

/// A remote call as the scripted service saw it.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    PostMessage { thread_id: String, content: String },
    CreateRun { thread_id: String, agent_id: String },
    GetRun { run_id: String },
    CancelRun { run_id: String },
    ListRuns { thread_id: String },
    SubmitOutputs { run_id: String, outputs: Vec<ToolOutput> },
    SubmitApprovals { run_id: String, approvals: Vec<ToolApproval> },
    ListSteps { run_id: String },
    ListMessages { thread_id: String },
}

/// Snapshot template; ids are filled in when the run is created.
pub fn snapshot(status: RunStatus) -> Run {
    Run::new("", "", status)
}

pub fn needs_outputs(calls: &[(&str, &str, &str)]) -> Run {
    snapshot(RunStatus::NeedsInput).with_pending_action(PendingAction::Output {
        calls: calls
            .iter()
            .map(|(id, name, args)| OutputCall {
                call_id: id.to_string(),
                function_name: name.to_string(),
                arguments: args.to_string(),
            })
            .collect(),
    })
}

pub fn needs_approval(calls: &[(&str, &str)]) -> Run {
    snapshot(RunStatus::NeedsInput).with_pending_action(PendingAction::Approval {
        calls: calls
            .iter()
            .map(|(id, name)| ApprovalCall {
                call_id: id.to_string(),
                tool_name: name.to_string(),
            })
            .collect(),
    })
}

pub fn assistant_message(id: &str, text: &str, run_id: &str) -> Message {
    Message {
        id: id.to_string(),
        role: MessageRole::Assistant,
        text: text.to_string(),
        run_id: Some(run_id.to_string()),
        created_at: None,
    }
}

/// How one submission attempt misbehaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubmitFault {
    /// Retryable 503; nothing recorded server side.
    Unavailable,
    /// Accepted by the service, but the response is lost.
    Timeout,
    /// Non-retryable 400, as for a run that no longer awaits input.
    Rejected,
    /// Never answers.
    Hang,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    /// One script per run, consumed in creation order.
    scripts: VecDeque<Vec<Run>>,
    runs: HashMap<String, (Vec<Run>, usize)>,
    created: u32,
    /// Creation order, oldest first.
    order: Vec<String>,
    cancelled: HashSet<String>,
    get_failures: u32,
    create_failures: u32,
    lost_creates: u32,
    submit_faults: VecDeque<SubmitFault>,
    fail_cancel: bool,
    messages: Vec<Message>,
    steps: HashMap<String, Vec<RunStep>>,
}

/// In-memory run service driven by per-run status scripts.
///
/// Each poll returns the next snapshot of the run's script; the last
/// snapshot repeats forever. Runs created after the scripts run out
/// complete immediately.
#[derive(Default)]
pub struct ScriptedTransport {
    state: Mutex<State>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the snapshots the next created run will go through.
    pub fn script(self, snapshots: Vec<Run>) -> Self {
        self.state.lock().unwrap().scripts.push_back(snapshots);
        self
    }

    /// Fail the next `n` polls with a retryable 503.
    pub fn failing_polls(self, n: u32) -> Self {
        self.state.lock().unwrap().get_failures = n;
        self
    }

    /// Fail the next `n` submissions with a retryable 503.
    pub fn failing_submits(self, n: u32) -> Self {
        self.submit_faults(vec![SubmitFault::Unavailable; n as usize])
    }

    /// Apply `faults` to the next submissions, one per attempt.
    pub fn submit_faults(self, faults: Vec<SubmitFault>) -> Self {
        self.state.lock().unwrap().submit_faults.extend(faults);
        self
    }

    /// Reject the next `n` creates with a retryable 503 before creating anything.
    pub fn failing_creates(self, n: u32) -> Self {
        self.state.lock().unwrap().create_failures = n;
        self
    }

    /// Create the next `n` runs but answer with a timeout.
    pub fn losing_create_responses(self, n: u32) -> Self {
        self.state.lock().unwrap().lost_creates = n;
        self
    }

    pub fn failing_cancel(self) -> Self {
        self.state.lock().unwrap().fail_cancel = true;
        self
    }

    pub fn with_messages(self, messages: Vec<Message>) -> Self {
        self.state.lock().unwrap().messages = messages;
        self
    }

    pub fn with_steps(self, run_id: &str, steps: Vec<RunStep>) -> Self {
        self.state
            .lock()
            .unwrap()
            .steps
            .insert(run_id.to_string(), steps);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CancelRun { run_id } => Some(run_id),
                _ => None,
            })
            .collect()
    }

    pub fn creates(&self) -> usize {
        self.count(|c| matches!(c, Call::CreateRun { .. }))
    }

    pub fn submitted_outputs(&self) -> Vec<ToolOutput> {
        self.calls()
            .into_iter()
            .flat_map(|c| match c {
                Call::SubmitOutputs { outputs, .. } => outputs,
                _ => Vec::new(),
            })
            .collect()
    }

    pub fn submitted_approvals(&self) -> Vec<ToolApproval> {
        self.calls()
            .into_iter()
            .flat_map(|c| match c {
                Call::SubmitApprovals { approvals, .. } => approvals,
                _ => Vec::new(),
            })
            .collect()
    }
}

fn unavailable() -> AgentRunError {
    AgentRunError::api(503, "service unavailable")
}

async fn apply_submit_fault(fault: Option<SubmitFault>) -> Result<()> {
    match fault {
        None => Ok(()),
        Some(SubmitFault::Unavailable) => Err(unavailable()),
        Some(SubmitFault::Timeout) => Err(AgentRunError::Timeout(30_000)),
        Some(SubmitFault::Rejected) => Err(AgentRunError::api(
            400,
            "run is not waiting for tool outputs",
        )),
        Some(SubmitFault::Hang) => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }
}

#[async_trait]
impl RunTransport for ScriptedTransport {
    async fn create_thread(&self) -> Result<String> {
        Ok("thread_new".to_string())
    }

    async fn post_message(&self, thread_id: &str, content: &str) -> Result<()> {
        self.state.lock().unwrap().calls.push(Call::PostMessage {
            thread_id: thread_id.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<Run> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateRun {
            thread_id: thread_id.to_string(),
            agent_id: agent_id.to_string(),
        });
        if state.create_failures > 0 {
            state.create_failures -= 1;
            return Err(unavailable());
        }
        state.created += 1;
        let run_id = format!("run_{}", state.created);
        let script = state
            .scripts
            .pop_front()
            .unwrap_or_else(|| vec![snapshot(RunStatus::Completed)])
            .into_iter()
            .map(|mut run| {
                run.id = run_id.clone();
                run.thread_id = thread_id.to_string();
                run.agent_id = Some(agent_id.to_string());
                run
            })
            .collect::<Vec<_>>();
        state.runs.insert(run_id.clone(), (script, 0));
        state.order.push(run_id.clone());
        if state.lost_creates > 0 {
            state.lost_creates -= 1;
            return Err(AgentRunError::Timeout(30_000));
        }
        Ok(Run::new(run_id, thread_id, RunStatus::Queued).with_agent_id(agent_id))
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<Run> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::GetRun {
            run_id: run_id.to_string(),
        });
        if state.get_failures > 0 {
            state.get_failures -= 1;
            return Err(unavailable());
        }
        let (script, pos) = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| AgentRunError::api(404, format!("no run {run_id}")))?;
        let run = script[(*pos).min(script.len() - 1)].clone();
        *pos += 1;
        Ok(run)
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CancelRun {
            run_id: run_id.to_string(),
        });
        if state.fail_cancel {
            return Err(unavailable());
        }
        state.cancelled.insert(run_id.to_string());
        Ok(())
    }

    async fn list_runs(&self, thread_id: &str) -> Result<Vec<Run>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ListRuns {
            thread_id: thread_id.to_string(),
        });
        let runs = state
            .order
            .iter()
            .rev()
            .filter_map(|run_id| {
                let (script, pos) = state.runs.get(run_id)?;
                let mut run = script[pos.saturating_sub(1).min(script.len() - 1)].clone();
                if state.cancelled.contains(run_id) {
                    run.status = RunStatus::Cancelled;
                    run.pending_action = None;
                }
                Some(run)
            })
            .collect();
        Ok(runs)
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<()> {
        let fault = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::SubmitOutputs {
                run_id: run_id.to_string(),
                outputs: outputs.to_vec(),
            });
            state.submit_faults.pop_front()
        };
        apply_submit_fault(fault).await
    }

    async fn submit_approvals(
        &self,
        _thread_id: &str,
        run_id: &str,
        approvals: &[ToolApproval],
    ) -> Result<()> {
        let fault = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::SubmitApprovals {
                run_id: run_id.to_string(),
                approvals: approvals.to_vec(),
            });
            state.submit_faults.pop_front()
        };
        apply_submit_fault(fault).await
    }

    async fn list_steps(&self, _thread_id: &str, run_id: &str) -> Result<Vec<RunStep>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ListSteps {
            run_id: run_id.to_string(),
        });
        Ok(state.steps.get(run_id).cloned().unwrap_or_default())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ListMessages {
            thread_id: thread_id.to_string(),
        });
        Ok(state.messages.clone())
    }
}
