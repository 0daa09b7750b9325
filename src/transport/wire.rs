//! Wire format of the run service and its decoding into domain types.
//!
//! This is the only place that looks at raw payload shapes. Everything past
//! this module works with [`PendingAction`] and friends.

use serde::{Deserialize, Serialize};

use crate::error::{AgentRunError, Result};
use crate::types::{
    ApprovalCall, Message, MessageRole, OutputCall, PendingAction, Run, RunStatus, RunStep,
    ToolApproval, ToolCallRecord, ToolCallStatus, ToolOutput, Usage,
};

#[derive(Debug, Deserialize)]
pub struct WireRun {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub assistant_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub required_action: Option<WireRequiredAction>,
    #[serde(default)]
    pub last_error: Option<WireLastError>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub struct WireRequiredAction {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub submit_tool_outputs: Option<WireToolCalls>,
    #[serde(default)]
    pub submit_tool_approval: Option<WireToolCalls>,
}

#[derive(Debug, Deserialize)]
pub struct WireToolCalls {
    #[serde(default)]
    pub tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub function: Option<WireFunction>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireFunction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireLastError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

/// Map a service status string onto the client state machine.
pub fn parse_status(raw: &str) -> Result<RunStatus> {
    match raw {
        "queued" => Ok(RunStatus::Queued),
        "in_progress" | "cancelling" => Ok(RunStatus::Running),
        "requires_action" => Ok(RunStatus::NeedsInput),
        "completed" => Ok(RunStatus::Completed),
        "failed" | "expired" | "incomplete" => Ok(RunStatus::Failed),
        "cancelled" => Ok(RunStatus::Cancelled),
        other => Err(AgentRunError::Protocol(format!("unknown run status '{other}'"))),
    }
}

impl WireRun {
    pub fn into_run(self) -> Result<Run> {
        let status = parse_status(&self.status)?;
        let pending_action = match status {
            RunStatus::NeedsInput => Some(classify(self.required_action)),
            _ => None,
        };
        Ok(Run {
            id: self.id,
            thread_id: self.thread_id,
            agent_id: self.assistant_id,
            status,
            pending_action,
            last_error: self.last_error.map(|e| crate::types::RunError {
                code: e.code,
                message: e.message,
            }),
            usage: self.usage.map(Usage::from),
        })
    }
}

/// Decide which kind of input a `requires_action` run is waiting for.
fn classify(action: Option<WireRequiredAction>) -> PendingAction {
    let Some(action) = action else {
        return PendingAction::Unknown {
            kind: "missing".to_string(),
        };
    };

    if let Some(approval) = action.submit_tool_approval {
        let calls = approval
            .tool_calls
            .into_iter()
            .map(|call| {
                let tool_name = call
                    .name
                    .or_else(|| call.function.map(|f| f.name))
                    .filter(|n| !n.is_empty())
                    .unwrap_or(call.kind);
                ApprovalCall {
                    call_id: call.id,
                    tool_name,
                }
            })
            .collect();
        return PendingAction::Approval { calls };
    }

    if let Some(outputs) = action.submit_tool_outputs {
        let calls = outputs
            .tool_calls
            .into_iter()
            .map(|call| match call.function {
                Some(function) => OutputCall {
                    call_id: call.id,
                    function_name: function.name,
                    arguments: function.arguments,
                },
                None => OutputCall {
                    call_id: call.id,
                    function_name: call.name.unwrap_or(call.kind),
                    arguments: call.arguments.unwrap_or_default(),
                },
            })
            .collect();
        return PendingAction::Output { calls };
    }

    PendingAction::Unknown {
        kind: if action.kind.is_empty() {
            "unspecified".to_string()
        } else {
            action.kind
        },
    }
}

#[derive(Debug, Deserialize)]
pub struct WireList<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub last_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireThread {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct WireStep {
    pub id: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub step_details: Option<WireStepDetails>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub struct WireStepDetails {
    #[serde(default)]
    pub tool_calls: Vec<WireStepToolCall>,
}

#[derive(Debug, Deserialize)]
pub struct WireStepToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub function: Option<WireFunction>,
    #[serde(default)]
    pub code_interpreter: Option<WireCodeInterpreter>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireCodeInterpreter {
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub outputs: Vec<WireCodeOutput>,
}

#[derive(Debug, Deserialize)]
pub struct WireCodeOutput {
    #[serde(default)]
    pub logs: Option<String>,
}

impl From<WireStepToolCall> for ToolCallRecord {
    fn from(call: WireStepToolCall) -> Self {
        if let Some(function) = call.function {
            return ToolCallRecord {
                call_id: call.id,
                name: function.name,
                arguments: function.arguments,
                output: function.output,
                nested_outputs: Vec::new(),
                status: ToolCallStatus::Reported,
            };
        }
        if let Some(code) = call.code_interpreter {
            return ToolCallRecord {
                call_id: call.id,
                name: call.kind,
                arguments: code.input,
                output: None,
                nested_outputs: code.outputs.into_iter().filter_map(|o| o.logs).collect(),
                status: ToolCallStatus::Reported,
            };
        }
        ToolCallRecord {
            call_id: call.id,
            name: call.name.unwrap_or(call.kind),
            arguments: call.arguments.unwrap_or_default(),
            output: call.output,
            nested_outputs: Vec::new(),
            status: ToolCallStatus::Reported,
        }
    }
}

impl From<WireStep> for RunStep {
    fn from(step: WireStep) -> Self {
        RunStep {
            id: step.id,
            run_id: step.run_id,
            kind: step.kind,
            status: step.status,
            tool_calls: step
                .step_details
                .map(|d| d.tool_calls.into_iter().map(ToolCallRecord::from).collect())
                .unwrap_or_default(),
            usage: step.usage.map(Usage::from),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: Vec<WireContent>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct WireContent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<WireText>,
}

#[derive(Debug, Deserialize)]
pub struct WireText {
    #[serde(default)]
    pub value: String,
}

impl WireMessage {
    pub fn into_message(self) -> Result<Message> {
        let role = self
            .role
            .parse::<MessageRole>()
            .map_err(|_| AgentRunError::Protocol(format!("unknown message role '{}'", self.role)))?;
        let text = self
            .content
            .into_iter()
            .filter(|c| c.kind == "text")
            .filter_map(|c| c.text.map(|t| t.value))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Message {
            id: self.id,
            role,
            text,
            run_id: self.run_id,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CreateRunBody<'a> {
    pub assistant_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct PostMessageBody<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Serialize)]
pub struct WireToolOutput<'a> {
    pub tool_call_id: &'a str,
    pub output: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SubmitOutputsBody<'a> {
    pub tool_outputs: Vec<WireToolOutput<'a>>,
}

impl<'a> SubmitOutputsBody<'a> {
    pub fn new(outputs: &'a [ToolOutput]) -> Self {
        Self {
            tool_outputs: outputs
                .iter()
                .map(|o| WireToolOutput {
                    tool_call_id: &o.call_id,
                    output: &o.output,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WireToolApproval<'a> {
    pub tool_call_id: &'a str,
    pub approve: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitApprovalsBody<'a> {
    pub tool_approvals: Vec<WireToolApproval<'a>>,
}

impl<'a> SubmitApprovalsBody<'a> {
    pub fn new(approvals: &'a [ToolApproval]) -> Self {
        Self {
            tool_approvals: approvals
                .iter()
                .map(|a| WireToolApproval {
                    tool_call_id: &a.call_id,
                    approve: a.approve,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Result<Run> {
        serde_json::from_value::<WireRun>(value)
            .expect("wire run should deserialize")
            .into_run()
    }

    #[test]
    fn output_request_is_classified_from_function_calls() {
        let run = decode(json!({
            "id": "run_1",
            "thread_id": "thread_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [
                        {"id": "call_a", "type": "function", "function": {"name": "fetch_weather", "arguments": "{\"city\":\"Rome\"}"}}
                    ]
                }
            }
        }))
        .unwrap();

        assert_eq!(run.status, RunStatus::NeedsInput);
        assert_eq!(
            run.pending_action,
            Some(PendingAction::Output {
                calls: vec![OutputCall {
                    call_id: "call_a".into(),
                    function_name: "fetch_weather".into(),
                    arguments: "{\"city\":\"Rome\"}".into(),
                }]
            })
        );
    }

    #[test]
    fn approval_request_wins_and_uses_tool_name() {
        let run = decode(json!({
            "id": "run_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_approval",
                "submit_tool_approval": {
                    "tool_calls": [
                        {"id": "call_m", "type": "mcp", "name": "search_docs", "arguments": "{}"},
                        {"id": "call_n", "type": "mcp"}
                    ]
                }
            }
        }))
        .unwrap();

        assert_eq!(
            run.pending_action,
            Some(PendingAction::Approval {
                calls: vec![
                    ApprovalCall {
                        call_id: "call_m".into(),
                        tool_name: "search_docs".into()
                    },
                    ApprovalCall {
                        call_id: "call_n".into(),
                        tool_name: "mcp".into()
                    },
                ]
            })
        );
    }

    #[test]
    fn unrecognized_or_missing_payload_is_unknown() {
        let run = decode(json!({
            "id": "run_1",
            "status": "requires_action",
            "required_action": {"type": "submit_something_else"}
        }))
        .unwrap();
        assert_eq!(
            run.pending_action,
            Some(PendingAction::Unknown {
                kind: "submit_something_else".into()
            })
        );

        let run = decode(json!({"id": "run_1", "status": "requires_action"})).unwrap();
        assert_eq!(
            run.pending_action,
            Some(PendingAction::Unknown {
                kind: "missing".into()
            })
        );
    }

    #[test]
    fn required_action_is_ignored_outside_needs_input() {
        let run = decode(json!({
            "id": "run_1",
            "status": "in_progress",
            "required_action": {"type": "submit_tool_outputs", "submit_tool_outputs": {"tool_calls": []}}
        }))
        .unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.pending_action.is_none());
    }

    #[test]
    fn status_mapping_and_unknown_status() {
        assert_eq!(parse_status("cancelling").unwrap(), RunStatus::Running);
        assert_eq!(parse_status("expired").unwrap(), RunStatus::Failed);
        assert!(matches!(
            parse_status("paused"),
            Err(AgentRunError::Protocol(_))
        ));
    }

    #[test]
    fn list_page_exposes_cursor() {
        let page: WireList<WireThread> = serde_json::from_value(json!({
            "data": [{"id": "a"}, {"id": "b"}],
            "has_more": true,
            "last_id": "b"
        }))
        .unwrap();
        assert_eq!(page.data.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.last_id.as_deref(), Some("b"));

        let single: WireList<WireThread> = serde_json::from_value(json!({"data": []})).unwrap();
        assert!(!single.has_more);
        assert!(single.last_id.is_none());
    }

    #[test]
    fn failed_run_keeps_error_and_usage() {
        let run = decode(json!({
            "id": "run_1",
            "status": "failed",
            "last_error": {"code": "rate_limit_exceeded", "message": "too many"},
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        }))
        .unwrap();
        assert_eq!(run.last_error.unwrap().code, "rate_limit_exceeded");
        assert_eq!(run.usage.unwrap().total_tokens, 7);
    }

    #[test]
    fn step_tool_calls_collect_nested_outputs() {
        let step: RunStep = serde_json::from_value::<WireStep>(json!({
            "id": "step_1",
            "run_id": "run_1",
            "type": "tool_calls",
            "status": "completed",
            "step_details": {
                "type": "tool_calls",
                "tool_calls": [
                    {"id": "c1", "type": "function", "function": {"name": "f", "arguments": "{}", "output": "ok"}},
                    {"id": "c2", "type": "code_interpreter", "code_interpreter": {"input": "print(1)", "outputs": [{"type": "logs", "logs": "1"}]}}
                ]
            }
        }))
        .unwrap()
        .into();

        assert_eq!(step.tool_calls.len(), 2);
        assert_eq!(step.tool_calls[0].output.as_deref(), Some("ok"));
        assert_eq!(step.tool_calls[1].name, "code_interpreter");
        assert_eq!(step.tool_calls[1].nested_outputs, vec!["1".to_string()]);
    }

    #[test]
    fn message_text_parts_are_joined() {
        let message = serde_json::from_value::<WireMessage>(json!({
            "id": "msg_1",
            "role": "assistant",
            "content": [
                {"type": "text", "text": {"value": "line one"}},
                {"type": "image_file", "image_file": {"file_id": "f"}},
                {"type": "text", "text": {"value": "line two"}}
            ]
        }))
        .unwrap()
        .into_message()
        .unwrap();
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.text, "line one\nline two");
    }
}
