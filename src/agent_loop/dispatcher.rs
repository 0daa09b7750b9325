//! Routes a `needs_input` payload to local tools or the approval handler and
//! submits the result.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AgentRunError;
use crate::tools::{ToolExecutionContext, ToolRegistry};
use crate::transport::RunTransport;
use crate::types::{
    ApprovalCall, OutputCall, PendingAction, ToolCallRecord, ToolCallStatus, ToolOutput,
};
use crate::util::retry::RetryPolicy;

use super::approvals::ApprovalHandler;
use super::diagnostics::DiagnosticsCollector;
use super::events::RunEventPayload;

/// Result of resolving one pending action.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Something was submitted, or may have been; the run can be polled again.
    Submitted { count: usize },
    /// Nothing could be submitted; the run must be cancelled.
    Fatal(AgentRunError),
}

impl DispatchOutcome {
    pub fn submitted(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }

    pub fn fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            Self::Submitted { .. } => None,
            Self::Fatal(err) => Some(err.to_string()),
        }
    }
}

/// Identifies the run an action belongs to.
#[derive(Debug, Clone, Copy)]
pub struct DispatchTarget<'a> {
    pub thread_id: &'a str,
    pub run_id: &'a str,
}

/// Classifies pending actions and answers them.
pub struct ActionDispatcher {
    transport: Arc<dyn RunTransport>,
    registry: Arc<ToolRegistry>,
    approvals: ApprovalHandler,
}

impl ActionDispatcher {
    pub fn new(
        transport: Arc<dyn RunTransport>,
        registry: Arc<ToolRegistry>,
        approvals: ApprovalHandler,
    ) -> Self {
        Self {
            transport,
            registry,
            approvals,
        }
    }

    pub fn approvals(&self) -> &ApprovalHandler {
        &self.approvals
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Resolve `action` for `target`, submitting whatever could be resolved.
    pub async fn resolve(
        &self,
        target: DispatchTarget<'_>,
        action: &PendingAction,
        retry: &RetryPolicy,
        cancel: &CancellationToken,
        diag: &mut DiagnosticsCollector,
    ) -> DispatchOutcome {
        match action {
            PendingAction::Approval { calls } => {
                self.resolve_approvals(target, calls, retry, cancel, diag).await
            }
            PendingAction::Output { calls } => {
                self.resolve_outputs(target, calls, retry, cancel, diag).await
            }
            PendingAction::Unknown { kind } => DispatchOutcome::Fatal(AgentRunError::Protocol(
                format!("unrecognized required action '{kind}'"),
            )),
        }
    }

    async fn resolve_approvals(
        &self,
        target: DispatchTarget<'_>,
        calls: &[ApprovalCall],
        retry: &RetryPolicy,
        cancel: &CancellationToken,
        diag: &mut DiagnosticsCollector,
    ) -> DispatchOutcome {
        let approvals = match self.approvals.build_approvals(calls) {
            Ok(approvals) => approvals,
            Err(err) => return DispatchOutcome::Fatal(err),
        };

        for (call, approval) in calls.iter().zip(&approvals) {
            diag.record(RunEventPayload::ToolDispatched {
                run_id: target.run_id.to_string(),
                record: ToolCallRecord {
                    call_id: call.call_id.clone(),
                    name: call.tool_name.clone(),
                    arguments: String::new(),
                    output: None,
                    nested_outputs: Vec::new(),
                    status: if approval.approve {
                        ToolCallStatus::Approved
                    } else {
                        ToolCallStatus::Denied
                    },
                },
            });
        }

        let submitted = submit(target, "submit_approvals", retry, cancel, || {
            self.transport
                .submit_approvals(target.thread_id, target.run_id, &approvals)
        })
        .await;
        if let Err(err) = submitted {
            return DispatchOutcome::Fatal(err);
        }

        let approved = approvals.iter().filter(|a| a.approve).count();
        debug!(
            run_id = target.run_id,
            approved,
            denied = approvals.len() - approved,
            "Submitted tool approvals"
        );
        diag.record(RunEventPayload::ApprovalsSubmitted {
            run_id: target.run_id.to_string(),
            approved,
            denied: approvals.len() - approved,
        });
        DispatchOutcome::Submitted {
            count: approvals.len(),
        }
    }

    async fn resolve_outputs(
        &self,
        target: DispatchTarget<'_>,
        calls: &[OutputCall],
        retry: &RetryPolicy,
        cancel: &CancellationToken,
        diag: &mut DiagnosticsCollector,
    ) -> DispatchOutcome {
        let mut outputs = Vec::with_capacity(calls.len());

        for call in calls {
            let ctx = ToolExecutionContext {
                call_id: call.call_id.clone(),
                tool_name: call.function_name.clone(),
                cancel: cancel.clone(),
            };
            let (output, status) = match self
                .registry
                .invoke(&call.function_name, &call.arguments, &ctx)
                .await
            {
                Ok(output) => (Some(output), ToolCallStatus::Resolved),
                Err(AgentRunError::UnknownTool(name)) => {
                    warn!(run_id = target.run_id, tool = %name, "No registered tool for call");
                    (None, ToolCallStatus::Unrecognized)
                }
                Err(err) => {
                    warn!(run_id = target.run_id, tool = %call.function_name, error = %err, "Tool failed");
                    (Some(error_output(&err)), ToolCallStatus::Errored)
                }
            };

            if let Some(output) = &output {
                outputs.push(ToolOutput {
                    call_id: call.call_id.clone(),
                    output: output.clone(),
                });
            }
            diag.record(RunEventPayload::ToolDispatched {
                run_id: target.run_id.to_string(),
                record: ToolCallRecord {
                    call_id: call.call_id.clone(),
                    name: call.function_name.clone(),
                    arguments: call.arguments.clone(),
                    output,
                    nested_outputs: Vec::new(),
                    status,
                },
            });
        }

        if outputs.is_empty() {
            let names = calls
                .iter()
                .map(|c| c.function_name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return DispatchOutcome::Fatal(AgentRunError::UnresolvedAction(if calls.is_empty() {
                "output request carried no tool calls".to_string()
            } else {
                format!("no registered tool for any requested call ({names})")
            }));
        }

        let submitted = submit(target, "submit_tool_outputs", retry, cancel, || {
            self.transport
                .submit_tool_outputs(target.thread_id, target.run_id, &outputs)
        })
        .await;
        if let Err(err) = submitted {
            return DispatchOutcome::Fatal(err);
        }

        debug!(
            run_id = target.run_id,
            submitted = outputs.len(),
            requested = calls.len(),
            "Submitted tool outputs"
        );
        diag.record(RunEventPayload::OutputsSubmitted {
            run_id: target.run_id.to_string(),
            count: outputs.len(),
        });
        DispatchOutcome::Submitted {
            count: outputs.len(),
        }
    }
}

/// Submit with retries until `cancel` fires.
///
/// A retry that the service rejects outright usually means an earlier
/// attempt already went through and the run moved on. That counts as
/// submitted so the caller polls again instead of abandoning the run.
async fn submit<F, Fut>(
    target: DispatchTarget<'_>,
    operation: &str,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
    mut call: F,
) -> Result<(), AgentRunError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), AgentRunError>>,
{
    let attempts = AtomicU32::new(0);
    let result = retry
        .execute_until_cancelled(operation, cancel, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            call()
        })
        .await;
    match result {
        Err(err)
            if attempts.load(Ordering::Relaxed) > 1
                && !err.is_retryable()
                && !matches!(err, AgentRunError::Cancelled) =>
        {
            warn!(
                run_id = target.run_id,
                operation,
                error = %err,
                "Retry rejected; assuming an earlier attempt was accepted"
            );
            Ok(())
        }
        other => other,
    }
}

/// Text submitted in place of a failed tool's result.
fn error_output(err: &AgentRunError) -> String {
    match err {
        AgentRunError::ToolExecution { message, .. } => format!("Error: {message}"),
        other => format!("Error: {other}"),
    }
}
