//! Approval decisions for tools the service executes itself.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::AgentRunError;
use crate::types::{ApprovalCall, ToolApproval};

/// Per-tool approval predicate.
pub type ApprovalPredicate = Arc<dyn Fn(&ApprovalCall) -> bool + Send + Sync>;

/// Which remote tool calls get approved.
#[derive(Clone, Default)]
pub enum ApprovalPolicy {
    /// Approve every call.
    #[default]
    Always,
    /// Deny every call.
    Never,
    /// Approve only the named tools.
    AllowList(HashSet<String>),
    /// Caller-supplied decision.
    Custom(ApprovalPredicate),
}

impl ApprovalPolicy {
    pub fn allow_list<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllowList(names.into_iter().map(Into::into).collect())
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&ApprovalCall) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    pub fn approves(&self, call: &ApprovalCall) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::AllowList(names) => names.contains(&call.tool_name),
            Self::Custom(predicate) => predicate(call),
        }
    }
}

impl std::fmt::Debug for ApprovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::Never => f.write_str("Never"),
            Self::AllowList(names) => f.debug_tuple("AllowList").field(names).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Builds approval decisions from a policy.
#[derive(Debug, Clone, Default)]
pub struct ApprovalHandler {
    policy: ApprovalPolicy,
}

impl ApprovalHandler {
    pub fn new(policy: ApprovalPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// One decision per call, in call order. An empty list is unresolved.
    pub fn build_approvals(&self, calls: &[ApprovalCall]) -> Result<Vec<ToolApproval>, AgentRunError> {
        if calls.is_empty() {
            return Err(AgentRunError::UnresolvedAction(
                "approval request carried no tool calls".to_string(),
            ));
        }
        Ok(calls
            .iter()
            .map(|call| ToolApproval {
                call_id: call.call_id.clone(),
                approve: self.policy.approves(call),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, tool: &str) -> ApprovalCall {
        ApprovalCall {
            call_id: id.into(),
            tool_name: tool.into(),
        }
    }

    #[test]
    fn default_policy_approves_everything() {
        let handler = ApprovalHandler::default();
        let approvals = handler
            .build_approvals(&[call("a", "search"), call("b", "delete_repo")])
            .unwrap();
        assert_eq!(approvals.len(), 2);
        assert!(approvals.iter().all(|a| a.approve));
        assert_eq!(approvals[1].call_id, "b");
    }

    #[test]
    fn empty_call_list_is_unresolved() {
        let err = ApprovalHandler::default()
            .build_approvals(&[])
            .expect_err("empty list");
        assert!(matches!(err, AgentRunError::UnresolvedAction(_)));
    }

    #[test]
    fn allow_list_denies_other_tools() {
        let handler = ApprovalHandler::new(ApprovalPolicy::allow_list(["search"]));
        let approvals = handler
            .build_approvals(&[call("a", "search"), call("b", "delete_repo")])
            .unwrap();
        assert!(approvals[0].approve);
        assert!(!approvals[1].approve);
    }

    #[test]
    fn custom_predicate_sees_each_call() {
        let handler = ApprovalHandler::new(ApprovalPolicy::custom(|c| c.tool_name.starts_with("read_")));
        let approvals = handler
            .build_approvals(&[call("a", "read_file"), call("b", "write_file")])
            .unwrap();
        assert_eq!(
            approvals.iter().map(|a| a.approve).collect::<Vec<_>>(),
            vec![true, false]
        );
        assert!(!ApprovalPolicy::Never.approves(&call("c", "read_file")));
    }
}
