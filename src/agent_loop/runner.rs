//! Run controller: drives one remote run from creation to a terminal outcome.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{OrchestratorConfig, RunConfig};
use crate::error::{AgentRunError, Result};
use crate::tools::ToolRegistry;
use crate::transport::{HttpTransport, RunTransport};
use crate::types::{PendingAction, Run, RunStatus};
use crate::util::retry::RetryPolicy;

use super::approvals::{ApprovalHandler, ApprovalPolicy};
use super::backoff::{BackoffScheduler, StuckQueuePolicy};
use super::diagnostics::{DiagnosticsCollector, RunReport};
use super::dispatcher::{ActionDispatcher, DispatchOutcome, DispatchTarget};
use super::events::RunEventPayload;
use super::types::RunOutcome;

/// Input to [`RunController::execute`].
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub thread_id: String,
    pub agent_id: String,
    pub message: String,
    pub config: RunConfig,
}

impl RunRequest {
    pub fn new(
        thread_id: impl Into<String>,
        agent_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            agent_id: agent_id.into(),
            message: message.into(),
            config: RunConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }
}

/// Drives remote runs. One controller serves any number of concurrent
/// `execute` calls; all per-run state lives inside the call.
pub struct RunController {
    transport: Arc<dyn RunTransport>,
    dispatcher: ActionDispatcher,
    defaults: RunConfig,
}

impl RunController {
    pub fn new(transport: Arc<dyn RunTransport>, registry: Arc<ToolRegistry>) -> Self {
        let dispatcher =
            ActionDispatcher::new(transport.clone(), registry, ApprovalHandler::default());
        Self {
            transport,
            dispatcher,
            defaults: RunConfig::default(),
        }
    }

    /// Controller over the HTTP transport described by `config`.
    pub fn from_config(config: &OrchestratorConfig, registry: Arc<ToolRegistry>) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config)?);
        Ok(Self::new(transport, registry).with_run_config(config.run.clone()))
    }

    pub fn with_approval_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.dispatcher = ActionDispatcher::new(
            self.transport.clone(),
            self.dispatcher.registry().clone(),
            ApprovalHandler::new(policy),
        );
        self
    }

    /// Limits used by [`RunController::request`].
    pub fn with_run_config(mut self, config: RunConfig) -> Self {
        self.defaults = config;
        self
    }

    pub fn transport(&self) -> &Arc<dyn RunTransport> {
        &self.transport
    }

    /// Build a request carrying this controller's default limits.
    pub fn request(
        &self,
        thread_id: impl Into<String>,
        agent_id: impl Into<String>,
        message: impl Into<String>,
    ) -> RunRequest {
        RunRequest::new(thread_id, agent_id, message).with_config(self.defaults.clone())
    }

    /// Post the message, run the agent and report what happened.
    ///
    /// Never returns an error: every failure ends up in the report. Any
    /// outcome the client decides on other than completion cancels the
    /// remote run first. Triggering `cancel` abandons the run the same way.
    pub async fn execute(&self, request: RunRequest, cancel: CancellationToken) -> RunReport {
        let mut session = Session::new(self, &request, &cancel);
        let Termination { outcome, error } = session.drive().await;

        match &error {
            Some(err) => info!(
                thread_id = %request.thread_id,
                run_id = session.run_id.as_deref().unwrap_or("-"),
                %outcome,
                error = %err,
                "Run finished"
            ),
            None => info!(
                thread_id = %request.thread_id,
                run_id = session.run_id.as_deref().unwrap_or("-"),
                %outcome,
                "Run finished"
            ),
        }
        session.diag.conclude(outcome, error.as_ref());

        if !cancel.is_cancelled() {
            session.collect_history().await;
        }
        session.diag.finalize()
    }
}

struct Termination {
    outcome: RunOutcome,
    error: Option<AgentRunError>,
}

impl Termination {
    fn new(outcome: RunOutcome, error: Option<AgentRunError>) -> Self {
        Self { outcome, error }
    }

    fn from_error(error: AgentRunError) -> Self {
        let outcome = match error {
            AgentRunError::Cancelled => RunOutcome::Cancelled,
            AgentRunError::Exhausted(_) => RunOutcome::GaveUp,
            _ => RunOutcome::Failed,
        };
        Self::new(outcome, Some(error))
    }
}

/// State private to one `execute` call.
struct Session<'a> {
    controller: &'a RunController,
    request: &'a RunRequest,
    cancel: &'a CancellationToken,
    scheduler: BackoffScheduler,
    retry: RetryPolicy,
    diag: DiagnosticsCollector,
    run_id: Option<String>,
    attempt: u32,
}

impl<'a> Session<'a> {
    fn new(
        controller: &'a RunController,
        request: &'a RunRequest,
        cancel: &'a CancellationToken,
    ) -> Self {
        let config = &request.config;
        Self {
            controller,
            request,
            cancel,
            scheduler: BackoffScheduler::new(
                config.poll_interval,
                StuckQueuePolicy {
                    queued_timeout: config.queued_timeout,
                    max_run_retries: config.max_run_retries,
                },
            ),
            retry: RetryPolicy::with_max_attempts(config.transport_attempts),
            diag: DiagnosticsCollector::new(&request.thread_id, &request.agent_id),
            run_id: None,
            attempt: 0,
        }
    }

    /// Retry a transport call, giving up early if the caller cancels.
    async fn call<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry
            .execute_until_cancelled(operation, self.cancel, f)
            .await
    }

    async fn drive(&mut self) -> Termination {
        let transport = self.controller.transport.as_ref();
        let request = self.request;

        if let Err(err) = self
            .call("post_message", || {
                transport.post_message(&request.thread_id, &request.message)
            })
            .await
        {
            return Termination::from_error(err);
        }
        self.diag.record(RunEventPayload::MessagePosted {
            thread_id: request.thread_id.clone(),
        });

        if let Err(err) = self.start_run().await {
            return self.abandon(err).await;
        }

        let mut poll_index = 0u32;
        let mut queued_since: Option<Instant> = None;

        loop {
            let max_polls = request.config.max_poll_iterations;
            if self.diag.iterations() >= max_polls {
                return self
                    .abandon(AgentRunError::Exhausted(format!(
                        "run did not finish within {max_polls} polls"
                    )))
                    .await;
            }

            let run_id = self.current_run_id();
            let run = match self
                .call("get_run", || transport.get_run(&request.thread_id, &run_id))
                .await
            {
                Ok(run) => run,
                Err(err) => return self.abandon(err).await,
            };
            if self.diag.observe(&run) {
                poll_index = 0;
            }
            debug!(
                run_id = %run.id,
                status = %run.status,
                iteration = self.diag.iterations(),
                "Polled run"
            );

            match run.status {
                RunStatus::Queued => {
                    let waited = queued_since.get_or_insert_with(Instant::now).elapsed();
                    if self.scheduler.queued_too_long(waited) {
                        if let Err(err) = self.recover_stuck_queue(waited).await {
                            return self.abandon(err).await;
                        }
                        queued_since = None;
                        poll_index = 0;
                    }
                }
                RunStatus::Running => queued_since = None,
                RunStatus::NeedsInput => {
                    queued_since = None;
                    match self.dispatch(run).await {
                        DispatchOutcome::Submitted { .. } => poll_index = 0,
                        DispatchOutcome::Fatal(err) => return self.abandon(err).await,
                    }
                }
                RunStatus::Completed => return Termination::new(RunOutcome::Completed, None),
                RunStatus::Failed => {
                    let error = run.last_error.unwrap_or_else(|| crate::types::RunError {
                        code: "unknown".to_string(),
                        message: "service reported the run as failed".to_string(),
                    });
                    return Termination::new(
                        RunOutcome::Failed,
                        Some(AgentRunError::RunFailed {
                            code: error.code,
                            message: error.message,
                        }),
                    );
                }
                RunStatus::Cancelled => {
                    return Termination::new(
                        RunOutcome::Cancelled,
                        Some(AgentRunError::RunFailed {
                            code: "cancelled".to_string(),
                            message: "service cancelled the run".to_string(),
                        }),
                    );
                }
            }

            let delay = self.scheduler.next_interval(poll_index);
            poll_index = poll_index.saturating_add(1);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.abandon(AgentRunError::Cancelled).await,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn current_run_id(&self) -> String {
        self.run_id.clone().unwrap_or_default()
    }

    /// Create a run and make it current.
    ///
    /// Creation is not idempotent, so a failed create is never blindly
    /// repeated: the thread is first checked for a run the lost request
    /// may have started.
    async fn start_run(&mut self) -> Result<()> {
        let transport = self.controller.transport.as_ref();
        let request = self.request;
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let created = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = transport.create_run(&request.thread_id, &request.agent_id) => Some(result),
            };
            let err = match created {
                Some(Ok(run)) => {
                    self.adopt(run, false);
                    return Ok(());
                }
                Some(Err(err)) => err,
                None => {
                    // The dropped request may still have reached the service.
                    if let Ok(Some(run)) = self.find_orphan(transport).await {
                        self.adopt(run, true);
                    }
                    return Err(AgentRunError::Cancelled);
                }
            };
            if !err.is_retryable() {
                return Err(err);
            }

            let orphan = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(AgentRunError::Cancelled),
                found = self.find_orphan(transport) => found,
            };
            match orphan {
                Ok(Some(run)) => {
                    self.adopt(run, true);
                    return Ok(());
                }
                Ok(None) => {}
                Err(list_err) => {
                    warn!(thread_id = %request.thread_id, error = %list_err, "Could not list runs after failed create");
                }
            }
            if attempt >= max_attempts {
                return Err(err);
            }

            warn!(
                thread_id = %request.thread_id,
                attempt,
                max_attempts,
                error = %err,
                "Retrying run creation"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(AgentRunError::Cancelled),
                _ = tokio::time::sleep(self.retry.delay(attempt)) => {}
            }
        }

        Err(AgentRunError::Exhausted("create_run: no attempts were made".to_string()))
    }

    /// A live run on the thread for this agent that this session does not know yet.
    async fn find_orphan(&self, transport: &dyn RunTransport) -> Result<Option<Run>> {
        let runs = transport.list_runs(&self.request.thread_id).await?;
        let known = self.diag.run_ids();
        Ok(runs.into_iter().find(|run| {
            !run.status.is_terminal()
                && !known.iter().any(|id| id == &run.id)
                && run
                    .agent_id
                    .as_deref()
                    .map_or(true, |agent| agent == self.request.agent_id)
        }))
    }

    fn adopt(&mut self, run: Run, recovered: bool) {
        self.attempt += 1;
        info!(
            thread_id = %self.request.thread_id,
            run_id = %run.id,
            attempt = self.attempt,
            recovered,
            "Created run"
        );
        self.diag.record(RunEventPayload::RunCreated {
            run_id: run.id.clone(),
            attempt: self.attempt,
        });
        self.run_id = Some(run.id);
    }

    /// Cancel a run stuck in the queue and start a fresh one, if the budget allows.
    async fn recover_stuck_queue(&mut self, waited: std::time::Duration) -> Result<()> {
        let run_id = self.current_run_id();
        warn!(
            run_id = %run_id,
            waited_ms = waited.as_millis() as u64,
            attempt = self.attempt,
            "Run stuck in queue"
        );
        self.diag.record(RunEventPayload::StuckQueue {
            run_id,
            waited_ms: waited.as_millis() as u64,
            attempt: self.attempt,
        });

        let recreations = self.attempt.saturating_sub(1);
        if !self.scheduler.may_recreate(recreations) {
            return Err(AgentRunError::Exhausted(format!(
                "run stayed queued after {} attempts",
                self.attempt
            )));
        }

        self.cancel_remote("stuck in queue").await;
        self.run_id = None;
        self.start_run().await
    }

    async fn dispatch(&mut self, run: Run) -> DispatchOutcome {
        let action = run.pending_action.unwrap_or(PendingAction::Unknown {
            kind: "missing".to_string(),
        });
        debug!(run_id = %run.id, kind = action.kind(), "Dispatching pending action");
        let target = DispatchTarget {
            thread_id: &self.request.thread_id,
            run_id: &run.id,
        };
        self.controller
            .dispatcher
            .resolve(target, &action, &self.retry, self.cancel, &mut self.diag)
            .await
    }

    /// Cancel the current run (best-effort) and end with `error`.
    async fn abandon(&mut self, error: AgentRunError) -> Termination {
        let reason = error.to_string();
        self.cancel_remote(&reason).await;
        Termination::from_error(error)
    }

    /// Single-shot cancel. Failures are logged and recorded, never raised.
    async fn cancel_remote(&mut self, reason: &str) {
        let Some(run_id) = self.run_id.clone() else {
            return;
        };
        let acknowledged = match self
            .controller
            .transport
            .cancel_run(&self.request.thread_id, &run_id)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "Best-effort cancel failed");
                false
            }
        };
        info!(run_id = %run_id, reason, acknowledged, "Cancelled run");
        self.diag.record(RunEventPayload::CancelRequested {
            run_id,
            reason: reason.to_string(),
            acknowledged,
        });
    }

    /// Fetch messages and steps for the report. Failures leave them empty.
    async fn collect_history(&mut self) {
        let transport = self.controller.transport.as_ref();
        let thread_id = self.request.thread_id.as_str();

        match self
            .retry
            .execute("list_messages", || transport.list_messages(thread_id))
            .await
        {
            Ok(messages) => self.diag.attach_messages(messages),
            Err(err) => warn!(thread_id, error = %err, "Could not list messages for report"),
        }

        for run_id in self.diag.run_ids().to_vec() {
            match self
                .retry
                .execute("list_steps", || transport.list_steps(thread_id, &run_id))
                .await
            {
                Ok(steps) => self.diag.attach_steps(steps),
                Err(err) => warn!(run_id = %run_id, error = %err, "Could not list steps for report"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_outcomes() {
        let outcome = |err| Termination::from_error(err).outcome;
        assert_eq!(outcome(AgentRunError::Cancelled), RunOutcome::Cancelled);
        assert_eq!(
            outcome(AgentRunError::Exhausted("polls".into())),
            RunOutcome::GaveUp
        );
        assert_eq!(
            outcome(AgentRunError::Protocol("shape".into())),
            RunOutcome::Failed
        );
        assert_eq!(outcome(AgentRunError::api(503, "down")), RunOutcome::Failed);
    }

    #[test]
    fn request_inherits_controller_limits() {
        let registry = Arc::new(ToolRegistry::new());
        let config = OrchestratorConfig {
            endpoint: Some("http://localhost:9".into()),
            ..Default::default()
        };
        let controller = RunController::from_config(&config, registry)
            .expect("controller should build")
            .with_run_config(RunConfig::builder().max_poll_iterations(7).build());

        let request = controller.request("thread_1", "asst_1", "hi");
        assert_eq!(request.config.max_poll_iterations, 7);
        assert_eq!(RunRequest::new("t", "a", "m").config.max_poll_iterations, 300);
    }
}
