use std::sync::Arc;
use tracing::{info, warn};

use crate::agents::{
    AdminAgent, AgentRequest, HealthAgent, PerformanceAgent, QuotaAgent, ScaleAgent, StorageAgent,
};
use crate::config::{AgentKind, Settings};
use crate::confirmation::{ConfirmationGate, Resolution};
use crate::errors::AgentError;
use crate::executor::{ToolExecutor, ToolOutcome};
use crate::formatter::{MarkdownFormatter, ResponseFormatter};
use crate::intent::{IntentClassifier, PatternClassifier};
use crate::router::{Route, Router};

/// Entry point for a user turn: settles pending confirmations, then
/// classifies and routes to an agent.
pub struct Orchestrator {
    classifier: Box<dyn IntentClassifier>,
    router: Router,
    executor: Arc<ToolExecutor>,
    formatter: Arc<dyn ResponseFormatter>,
}

impl Orchestrator {
    pub fn new(
        classifier: Box<dyn IntentClassifier>,
        router: Router,
        executor: Arc<ToolExecutor>,
        formatter: Arc<dyn ResponseFormatter>,
    ) -> Self {
        Self {
            classifier,
            router,
            executor,
            formatter,
        }
    }

    /// Wire the agents that `settings` enables against one shared executor
    /// and gate.
    pub fn from_settings(settings: &Settings) -> Result<Self, AgentError> {
        let gate = Arc::new(ConfirmationGate::from_settings(settings));
        let executor = Arc::new(ToolExecutor::from_settings(settings, gate));
        let formatter: Arc<dyn ResponseFormatter> = Arc::new(MarkdownFormatter::default());
        let router = enabled_router(settings, &executor, &formatter);

        Ok(Self::new(
            Box::new(PatternClassifier::try_new()?),
            router,
            executor,
            formatter,
        ))
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    pub async fn process(&self, text: &str, conversation_id: &str) -> Result<String, AgentError> {
        let gate = self.executor.gate();
        if gate.pending_for(conversation_id).await.is_some() {
            let resolution = gate.resolve(conversation_id, text).await;
            info!(
                conversation_id = %conversation_id,
                approved = resolution.approved(),
                "Resolved pending confirmation"
            );
            return Ok(self.settle(resolution, conversation_id).await);
        }

        let classification = self.classifier.classify(text);
        info!(
            intent = %classification.intent,
            confidence = classification.confidence,
            keywords = ?classification.keywords_matched,
            "Intent classified"
        );

        match self.router.route(&classification)? {
            Route::Help => Ok(self.router.help_text()),
            Route::Clarify => Ok(self.router.clarification_text()),
            Route::Agent(agent) => {
                info!(agent = %agent.name(), intent = %classification.intent, "Routing to agent");
                let request = AgentRequest::new(text, conversation_id)
                    .with_params(classification.extracted_params);
                Ok(agent.process(&request).await)
            }
        }
    }

    /// A confirmed call is re-issued as it was deferred; the gate lets it
    /// through once.
    async fn settle(&self, resolution: Resolution, conversation_id: &str) -> String {
        let ack = resolution.message();
        let Resolution::Confirmed {
            tool_name,
            arguments,
        } = resolution
        else {
            return ack;
        };

        let rendered = match self
            .executor
            .call_tool(conversation_id, &tool_name, arguments)
            .await
        {
            Ok(ToolOutcome::Completed(content)) => self
                .formatter
                .format(&content, Some(&format!("Result: {}", tool_name))),
            Ok(ToolOutcome::AwaitingConfirmation(pending)) => {
                warn!(tool_name = %tool_name, "Confirmed call was deferred again");
                self.formatter.format_confirmation(&pending)
            }
            Err(err) => self
                .formatter
                .format_error(&err, Some(&format!("executing {}", tool_name))),
        };
        format!("{}\n\n{}", ack, rendered)
    }

    /// Drop every confirmation the conversation left behind.
    pub async fn end_conversation(&self, conversation_id: &str) -> usize {
        let cleared = self.executor.gate().clear_all(conversation_id).await;
        if cleared > 0 {
            info!(conversation_id = %conversation_id, cleared, "Cleared pending confirmations");
        }
        cleared
    }

    pub async fn shutdown(&self) {
        self.executor.shutdown().await;
    }
}

fn enabled_router(
    settings: &Settings,
    executor: &Arc<ToolExecutor>,
    formatter: &Arc<dyn ResponseFormatter>,
) -> Router {
    let mut router = Router::new(settings.intent_confidence_floor);
    for kind in &settings.enabled_agents {
        let agent: Arc<dyn ScaleAgent> = match kind {
            AgentKind::Health => Arc::new(HealthAgent::new(executor.clone(), formatter.clone())),
            AgentKind::Storage => Arc::new(StorageAgent::new(executor.clone(), formatter.clone())),
            AgentKind::Performance => {
                Arc::new(PerformanceAgent::new(executor.clone(), formatter.clone()))
            }
            AgentKind::Quota => Arc::new(QuotaAgent::new(executor.clone(), formatter.clone())),
            AgentKind::Admin => Arc::new(AdminAgent::new(executor.clone(), formatter.clone())),
        };
        router.register(agent);
    }
    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::{executor_for, formatter, CannedSession};
    use crate::errors::RoutingError;
    use serde_json::json;

    fn orchestrator(session: Arc<CannedSession>, enabled: &[AgentKind]) -> Orchestrator {
        let settings = Settings {
            enabled_agents: enabled.to_vec(),
            ..Settings::default()
        };
        let executor = executor_for(session);
        let formatter = formatter();
        let router = enabled_router(&settings, &executor, &formatter);
        Orchestrator::new(
            Box::new(PatternClassifier::try_new().unwrap()),
            router,
            executor,
            formatter,
        )
    }

    fn all_agents() -> Vec<AgentKind> {
        Settings::default().enabled_agents
    }

    #[tokio::test]
    async fn help_and_clarification() {
        let orch = orchestrator(Arc::new(CannedSession::default()), &all_agents());
        let help = orch.process("help", "c1").await.unwrap();
        assert!(help.starts_with("**IBM Storage Scale Agent System**"));

        let clarify = orch.process("tell me a joke", "c1").await.unwrap();
        assert!(clarify.starts_with("I wasn't sure what you'd like me to help with."));
    }

    #[tokio::test]
    async fn storage_text_reaches_storage_agent_with_params() {
        let session = Arc::new(CannedSession::with(&[(
            "list_filesets",
            json!([{"filesetName": "root"}]),
        )]));
        let orch = orchestrator(session.clone(), &all_agents());

        let reply = orch
            .process("List filesets in filesystem gpfs01", "c1")
            .await
            .unwrap();
        assert!(reply.starts_with("**Filesets in gpfs01**"));
        assert_eq!(session.args_of("list_filesets").unwrap()["filesystem"], "gpfs01");
    }

    #[tokio::test]
    async fn disabled_agent_is_a_routing_error() {
        let orch = orchestrator(Arc::new(CannedSession::default()), &[AgentKind::Health]);
        let err = orch.process("show quota for user alice", "c1").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Routing(RoutingError::AgentNotEnabled {
                agent: AgentKind::Quota,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn confirmed_operation_runs_once() {
        let session = Arc::new(CannedSession::with(&[(
            "delete_fileset",
            json!({"status": "deleted"}),
        )]));
        let orch = orchestrator(session.clone(), &all_agents());

        let prompt = orch
            .process("delete fileset scratch in filesystem gpfs01", "c1")
            .await
            .unwrap();
        assert!(prompt.contains("Confirmation Required"));
        assert!(session.tools_called().is_empty());

        let reply = orch.process("yes please", "c1").await.unwrap();
        assert!(reply.starts_with("Operation `delete_fileset` confirmed. Proceeding..."));
        assert!(reply.contains("**Result: delete_fileset**"));
        assert_eq!(session.tools_called(), vec!["delete_fileset"]);
        assert!(orch.executor().gate().is_empty().await);
    }

    #[tokio::test]
    async fn cancel_drops_the_operation() {
        let session = Arc::new(CannedSession::with(&[("delete_fileset", json!({}))]));
        let orch = orchestrator(session.clone(), &all_agents());

        orch.process("delete fileset scratch in filesystem gpfs01", "c1")
            .await
            .unwrap();
        let reply = orch.process("no, cancel that", "c1").await.unwrap();
        assert_eq!(reply, "Operation `delete_fileset` cancelled.");
        assert!(session.tools_called().is_empty());
        assert!(orch.executor().gate().is_empty().await);
    }

    #[tokio::test]
    async fn quota_and_admin_requests_reach_their_agents() {
        let session = Arc::new(CannedSession::with(&[
            ("get_filesystem", json!({"name": "gpfs01"})),
            ("list_snapshots", json!([{"snapshotName": "nightly"}])),
        ]));
        let orch = orchestrator(session.clone(), &all_agents());

        let reply = orch.process("capacity usage of gpfs01", "c1").await.unwrap();
        assert!(reply.starts_with("**Capacity: gpfs01**"));

        let reply = orch.process("list snapshots in gpfs01", "c1").await.unwrap();
        assert!(reply.starts_with("**Snapshots in gpfs01**"));
        assert_eq!(session.tools_called(), vec!["get_filesystem", "list_snapshots"]);
    }

    #[tokio::test]
    async fn stopping_a_node_waits_for_confirmation() {
        let session = Arc::new(CannedSession::with(&[("stop_nodes", json!({"status": "stopped"}))]));
        let orch = orchestrator(session.clone(), &all_agents());

        let prompt = orch.process("stop node node3", "c1").await.unwrap();
        assert!(prompt.contains("`stop_nodes`"));
        assert!(session.tools_called().is_empty());

        let reply = orch.process("confirm", "c1").await.unwrap();
        assert!(reply.contains("**Result: stop_nodes**"));
        assert_eq!(session.args_of("stop_nodes").unwrap()["nodes"], "node3");
    }

    #[tokio::test]
    async fn end_conversation_clears_pending() {
        let orch = orchestrator(Arc::new(CannedSession::default()), &all_agents());
        orch.process("unmount filesystem gpfs01", "c9").await.unwrap();
        assert_eq!(orch.end_conversation("c9").await, 1);
        assert!(orch.executor().gate().is_empty().await);
    }
}
