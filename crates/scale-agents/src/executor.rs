use scale_mcp_client::{
    ConnectionPool, McpSession, McpSessionTrait, RetryConfig, RetryingInvoker,
    StreamableHttpTransport, ToolArguments, ToolContent, ToolDescriptor, ToolError,
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::Settings;
use crate::confirmation::{ConfirmationGate, PendingConfirmation, Verdict};
use crate::errors::AgentError;

#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Completed(ToolContent),
    AwaitingConfirmation(PendingConfirmation),
}

/// The single path every tool call takes: confirmation gate, then a pooled
/// session with retries, then result normalization.
pub struct ToolExecutor {
    pool: Arc<ConnectionPool>,
    invoker: RetryingInvoker,
    gate: Arc<ConfirmationGate>,
}

impl ToolExecutor {
    pub fn new(pool: Arc<ConnectionPool>, invoker: RetryingInvoker, gate: Arc<ConfirmationGate>) -> Self {
        Self { pool, invoker, gate }
    }

    /// Pool of streamable HTTP sessions to the configured server.
    pub fn from_settings(settings: &Settings, gate: Arc<ConfirmationGate>) -> Self {
        let url = settings.mcp_server_url.clone();
        let timeout = settings.mcp_timeout();
        let pool = ConnectionPool::from_fn(move || {
            let transport = StreamableHttpTransport::new(url.clone()).with_timeout(timeout);
            Arc::new(McpSession::new(transport)) as Arc<dyn McpSessionTrait>
        });
        let invoker =
            RetryingInvoker::new(RetryConfig::default().with_max_attempts(settings.mcp_max_retries));

        Self::new(Arc::new(pool), invoker, gate)
    }

    pub fn gate(&self) -> &Arc<ConfirmationGate> {
        &self.gate
    }

    pub async fn call_tool(
        &self,
        conversation_id: &str,
        tool_name: &str,
        arguments: ToolArguments,
    ) -> Result<ToolOutcome, AgentError> {
        if let Verdict::Pending(pending) = self
            .gate
            .check_before_call(tool_name, &arguments, conversation_id)
            .await
        {
            return Ok(ToolOutcome::AwaitingConfirmation(pending));
        }

        debug!(tool_name = %tool_name, conversation_id = %conversation_id, "Executing tool");
        let invoker = &self.invoker;
        let args = &arguments;
        let raw = self
            .pool
            .run(|session| async move { invoker.call_tool(session.as_ref(), tool_name, args).await })
            .await
            .map_err(|e| {
                error!(tool_name = %tool_name, error = %e, "Tool call failed");
                e
            })?;

        if let Some(message) = ToolContent::reported_error(&raw) {
            return Err(ToolError::Reported {
                tool: tool_name.to_string(),
                message,
            }
            .into());
        }

        Ok(ToolOutcome::Completed(ToolContent::from_result(raw)))
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, AgentError> {
        let tools = self
            .pool
            .run(|session| async move { session.list_tools().await })
            .await?;
        Ok(tools)
    }

    pub async fn shutdown(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirmation::GatePolicy;
    use crate::config::ToolRiskTable;
    use scale_mcp_client::Error;
    use serde_json::{json, Map, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSession {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl McpSessionTrait for RecordingSession {
        async fn initialize(&self) -> Result<(), Error> {
            Ok(())
        }

        async fn call_tool(&self, name: &str, _arguments: &ToolArguments) -> Result<Value, Error> {
            self.calls.lock().unwrap().push(name.to_string());
            match name {
                "failing_tool" => Ok(json!({
                    "isError": true,
                    "content": [{"type": "text", "text": "permission denied"}]
                })),
                _ => Ok(json!({"content": [{"type": "text", "text": "{\"ok\": true}"}]})),
            }
        }

        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, Error> {
            Ok(vec![])
        }

        async fn close(&self) {}

        async fn is_initialized(&self) -> bool {
            true
        }
    }

    fn executor() -> (ToolExecutor, Arc<RecordingSession>) {
        let session = Arc::new(RecordingSession::default());
        let shared = session.clone();
        let pool = ConnectionPool::from_fn(move || shared.clone() as Arc<dyn McpSessionTrait>);
        let gate = ConfirmationGate::new(GatePolicy::default(), ToolRiskTable::new());
        (
            ToolExecutor::new(Arc::new(pool), RetryingInvoker::default(), Arc::new(gate)),
            session,
        )
    }

    #[tokio::test]
    async fn read_only_call_completes_with_normalized_content() {
        let (executor, session) = executor();
        let outcome = executor
            .call_tool("c1", "list_filesets", Map::new())
            .await
            .unwrap();
        assert_eq!(outcome, ToolOutcome::Completed(ToolContent::Json(json!({"ok": true}))));
        assert_eq!(*session.calls.lock().unwrap(), vec!["list_filesets"]);
    }

    #[tokio::test]
    async fn destructive_call_waits_for_confirmation() {
        let (executor, session) = executor();
        let mut args = Map::new();
        args.insert("fileset".into(), json!("x"));

        let outcome = executor.call_tool("c1", "delete_fileset", args.clone()).await.unwrap();
        assert!(matches!(outcome, ToolOutcome::AwaitingConfirmation(_)));
        assert!(session.calls.lock().unwrap().is_empty());

        assert!(executor.gate().resolve("c1", "confirm").await.approved());
        let outcome = executor.call_tool("c1", "delete_fileset", args).await.unwrap();
        assert!(matches!(outcome, ToolOutcome::Completed(_)));
        assert_eq!(*session.calls.lock().unwrap(), vec!["delete_fileset"]);
    }

    #[tokio::test]
    async fn is_error_result_becomes_reported_tool_error() {
        let (executor, _) = executor();
        let err = executor
            .call_tool("c1", "failing_tool", Map::new())
            .await
            .unwrap_err();
        match err {
            AgentError::Mcp(Error::Tool(ToolError::Reported { tool, message })) => {
                assert_eq!(tool, "failing_tool");
                assert_eq!(message, "permission denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
