//! Domain agents. Each owns a tool allowlist and turns a request into text.

use async_trait::async_trait;
use scale_mcp_client::{ToolArguments, ToolContent};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{allowed_tools, AgentKind};
use crate::confirmation::PendingConfirmation;
use crate::errors::AgentError;
use crate::executor::{ToolExecutor, ToolOutcome};
use crate::formatter::ResponseFormatter;

mod admin;
mod health;
mod performance;
mod quota;
mod storage;

pub use admin::AdminAgent;
pub use health::HealthAgent;
pub use performance::PerformanceAgent;
pub use quota::QuotaAgent;
pub use storage::StorageAgent;

/// One user turn as seen by an agent.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub text: String,
    pub conversation_id: String,
    pub params: HashMap<String, String>,
}

impl AgentRequest {
    pub fn new(text: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            conversation_id: conversation_id.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Case-insensitive substring test against any of `keywords`.
    pub fn mentions(&self, keywords: &[&str]) -> bool {
        let lower = self.text.to_lowercase();
        keywords.iter().any(|kw| lower.contains(kw))
    }

    /// Like [`mentions`](Self::mentions) but only whole words count, so
    /// "set" does not match "fileset".
    pub fn mentions_word(&self, words: &[&str]) -> bool {
        self.text
            .split(|c: char| !c.is_alphanumeric())
            .any(|token| words.iter().any(|w| token.eq_ignore_ascii_case(w)))
    }
}

#[async_trait]
pub trait ScaleAgent: Send + Sync {
    fn kind(&self) -> AgentKind;

    fn name(&self) -> &str {
        self.kind().as_str()
    }

    fn description(&self) -> &str;

    fn allowed_tools(&self) -> &'static [&'static str] {
        allowed_tools(self.kind())
    }

    /// Never fails: errors and pending confirmations come back as text.
    async fn process(&self, request: &AgentRequest) -> String;
}

/// Why a handler stopped before producing its answer.
pub(crate) enum Interrupt {
    Confirm(PendingConfirmation),
    Failed(AgentError),
}

impl From<AgentError> for Interrupt {
    fn from(err: AgentError) -> Self {
        Interrupt::Failed(err)
    }
}

pub(crate) type Step<T> = Result<T, Interrupt>;

/// Shared plumbing of the domain agents.
pub(crate) struct AgentCore {
    kind: AgentKind,
    executor: Arc<ToolExecutor>,
    formatter: Arc<dyn ResponseFormatter>,
}

impl AgentCore {
    pub(crate) fn new(
        kind: AgentKind,
        executor: Arc<ToolExecutor>,
        formatter: Arc<dyn ResponseFormatter>,
    ) -> Self {
        Self {
            kind,
            executor,
            formatter,
        }
    }

    pub(crate) fn formatter(&self) -> &dyn ResponseFormatter {
        self.formatter.as_ref()
    }

    /// Call an allowlisted tool. A pending confirmation interrupts the
    /// handler so it can be shown as a prompt.
    pub(crate) async fn fetch(
        &self,
        request: &AgentRequest,
        tool_name: &str,
        arguments: Value,
    ) -> Step<ToolContent> {
        if !allowed_tools(self.kind).contains(&tool_name) {
            warn!(agent = %self.kind, tool_name = %tool_name, "Tool not in allowlist");
            return Err(AgentError::ToolNotAllowed {
                tool: tool_name.to_string(),
                agent: self.kind,
            }
            .into());
        }

        let arguments: ToolArguments = match arguments {
            Value::Object(map) => map,
            Value::Null => ToolArguments::new(),
            other => {
                return Err(AgentError::Validation(format!(
                    "arguments for '{}' must be an object, got {}",
                    tool_name, other
                ))
                .into())
            }
        };

        debug!(agent = %self.kind, tool_name = %tool_name, "Agent calling tool");
        match self
            .executor
            .call_tool(&request.conversation_id, tool_name, arguments)
            .await?
        {
            ToolOutcome::Completed(content) => Ok(content),
            ToolOutcome::AwaitingConfirmation(pending) => Err(Interrupt::Confirm(pending)),
        }
    }

    /// Turn a handler result into the final reply.
    pub(crate) fn finish(&self, step: Step<String>, context: &str) -> String {
        match step {
            Ok(text) => text,
            Err(Interrupt::Confirm(pending)) => self.formatter.format_confirmation(&pending),
            Err(Interrupt::Failed(err)) => {
                warn!(agent = %self.kind, error = %err, "Agent request failed");
                self.formatter.format_error(&err, Some(context))
            }
        }
    }

    /// Render a section that may fail on its own without failing the reply.
    pub(crate) fn section(&self, heading: &str, step: Step<String>) -> Vec<String> {
        match step {
            Ok(body) => vec![format!("**{}:**", heading), body, String::new()],
            Err(Interrupt::Failed(err)) => {
                vec![format!("**{}:** Unable to retrieve ({})", heading, err), String::new()]
            }
            Err(Interrupt::Confirm(pending)) => vec![
                format!("**{}:**", heading),
                self.formatter.format_confirmation(&pending),
                String::new(),
            ],
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn tools_outside_allowlist_are_refused() {
        let session = Arc::new(CannedSession::with(&[("delete_fileset", json!({}))]));
        let core = AgentCore::new(AgentKind::Health, executor_for(session.clone()), formatter());

        let step = core
            .fetch(&request("x", &[]), "delete_fileset", json!({"fileset": "x"}))
            .await;
        let reply = core.finish(step.map(|c| c.to_string()), "health check");

        assert!(reply.contains("Tool 'delete_fileset' is not allowed for agent 'health'"));
        assert!(session.tools_called().is_empty());
    }

    #[test]
    fn mentions_is_case_insensitive() {
        let req = AgentRequest::new("Show NODE status", "c1");
        assert!(req.mentions(&["node"]));
        assert!(!req.mentions(&["fileset"]));
    }

    #[test]
    fn mentions_word_needs_a_whole_word() {
        let req = AgentRequest::new("show quota for fileset scratch", "c1");
        assert!(req.mentions(&["set"]));
        assert!(!req.mentions_word(&["set"]));
        assert!(AgentRequest::new("Set quota", "c1").mentions_word(&["set"]));
    }
}
