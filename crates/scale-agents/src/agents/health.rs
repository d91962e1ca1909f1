use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::{AgentCore, AgentRequest, ScaleAgent, Step};
use crate::config::AgentKind;
use crate::executor::ToolExecutor;
use crate::formatter::ResponseFormatter;

const ALL_NODES: &str = ":all:";

/// Read-only cluster health: node states and events, node status, config and
/// versions, filesystem health and cluster info.
pub struct HealthAgent {
    core: AgentCore,
}

impl HealthAgent {
    pub fn new(executor: Arc<ToolExecutor>, formatter: Arc<dyn ResponseFormatter>) -> Self {
        Self {
            core: AgentCore::new(AgentKind::Health, executor, formatter),
        }
    }

    async fn handle(&self, req: &AgentRequest) -> Step<String> {
        if req.mentions(&["node"]) {
            if req.mentions(&["event"]) {
                return self.node_events(req).await;
            }
            if req.mentions(&["config"]) {
                return self.node_config(req).await;
            }
            if req.mentions(&["version"]) {
                return self.node_version(req).await;
            }
            if req.mentions(&["health", "status", "state"]) {
                return self.node_health(req).await;
            }
            return self.node_status(req).await;
        }

        if req.mentions(&["filesystem", "fs"]) {
            if req.mentions(&["event"]) {
                return self.filesystem_events(req).await;
            }
            return self.filesystem_health(req).await;
        }

        if req.mentions(&["cluster"]) {
            return self.cluster_info(req).await;
        }

        self.overview(req).await
    }

    async fn node_health(&self, req: &AgentRequest) -> Step<String> {
        let node = req.param("node");
        let content = self
            .core
            .fetch(req, "get_node_health_states", json!({"name": node.unwrap_or(ALL_NODES)}))
            .await?;
        let title = match node {
            Some(node) => format!("Health States for Node: {}", node),
            None => "Health States: All Nodes".to_string(),
        };
        Ok(self.core.formatter().format_health(&content, &title))
    }

    async fn node_events(&self, req: &AgentRequest) -> Step<String> {
        let node = req.param("node");
        let content = self
            .core
            .fetch(req, "get_node_health_events", json!({"name": node.unwrap_or(ALL_NODES)}))
            .await?;
        let title = match node {
            Some(node) => format!("Health Events for Node: {}", node),
            None => "Health Events: All Nodes".to_string(),
        };
        Ok(self.core.formatter().format_health(&content, &title))
    }

    async fn node_status(&self, req: &AgentRequest) -> Step<String> {
        let content = self.core.fetch(req, "get_nodes_status", json!({})).await?;
        Ok(self
            .core
            .formatter()
            .format_health(&content, "Node Status Overview"))
    }

    async fn node_config(&self, req: &AgentRequest) -> Step<String> {
        let content = self.core.fetch(req, "get_nodes_config", json!({})).await?;
        Ok(self
            .core
            .formatter()
            .format(&content, Some("Node Configuration")))
    }

    async fn node_version(&self, req: &AgentRequest) -> Step<String> {
        let (content, title) = match req.param("node") {
            Some(node) => (
                self.core
                    .fetch(req, "get_node_version", json!({"node": node}))
                    .await?,
                format!("Version: Node {}", node),
            ),
            None => (
                self.core.fetch(req, "get_version", json!({})).await?,
                "Storage Scale Version".to_string(),
            ),
        };
        Ok(self.core.formatter().format(&content, Some(&title)))
    }

    async fn filesystem_health(&self, req: &AgentRequest) -> Step<String> {
        let Some(filesystem) = req.param("filesystem") else {
            return Ok("Please specify a filesystem name. \
                       Example: 'Show health for filesystem gpfs01'"
                .to_string());
        };
        let content = self
            .core
            .fetch(req, "get_filesystem_health_states", json!({"filesystem": filesystem}))
            .await?;
        Ok(self
            .core
            .formatter()
            .format_health(&content, &format!("Filesystem Health: {}", filesystem)))
    }

    async fn filesystem_events(&self, req: &AgentRequest) -> Step<String> {
        let Some(filesystem) = req.param("filesystem") else {
            return Ok("Please specify a filesystem name. \
                       Example: 'Show events for filesystem gpfs01'"
                .to_string());
        };
        let content = self
            .core
            .fetch(
                req,
                "get_filesystem_health_events",
                json!({"filesystem_name": filesystem}),
            )
            .await?;
        Ok(self
            .core
            .formatter()
            .format_health(&content, &format!("Filesystem Events: {}", filesystem)))
    }

    async fn cluster_info(&self, req: &AgentRequest) -> Step<String> {
        let content = self.core.fetch(req, "list_clusters", json!({})).await?;
        Ok(self
            .core
            .formatter()
            .format(&content, Some("Cluster Information")))
    }

    /// Node status plus health states; each part may fail on its own.
    async fn overview(&self, req: &AgentRequest) -> Step<String> {
        let formatter = self.core.formatter();
        let mut lines = vec!["**Cluster Health Overview**".to_string(), String::new()];

        let status = self
            .core
            .fetch(req, "get_nodes_status", json!({}))
            .await
            .map(|c| formatter.format_health(&c, ""));
        lines.extend(self.core.section("Node Status", status));

        let health = self
            .core
            .fetch(req, "get_node_health_states", json!({"name": ALL_NODES}))
            .await
            .map(|c| formatter.format_health(&c, ""));
        lines.extend(self.core.section("Health States", health));

        Ok(lines.join("\n").trim_end().to_string())
    }
}

#[async_trait]
impl ScaleAgent for HealthAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Health
    }

    fn description(&self) -> &str {
        "Monitors cluster health, node status, and filesystem health events. \
         Provides diagnostics and alerting information for SREs and NOC operators."
    }

    async fn process(&self, request: &AgentRequest) -> String {
        let step = self.handle(request).await;
        self.core.finish(step, "health check")
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use serde_json::json;

    fn agent(session: Arc<CannedSession>) -> HealthAgent {
        HealthAgent::new(executor_for(session), formatter())
    }

    #[tokio::test]
    async fn node_health_defaults_to_all_nodes() {
        let session = Arc::new(CannedSession::with(&[(
            "get_node_health_states",
            json!({"content": [{"type": "text", "text": "{\"states\": [{\"entityName\": \"node1\", \"status\": \"HEALTHY\"}]}"}]}),
        )]));
        let reply = agent(session.clone())
            .process(&request("show node health", &[]))
            .await;

        assert!(reply.starts_with("**Health States: All Nodes**"));
        assert!(reply.contains("🟢 1 healthy"));
        assert_eq!(
            session.args_of("get_node_health_states").unwrap()["name"],
            ":all:"
        );
    }

    #[tokio::test]
    async fn node_version_uses_extracted_node() {
        let session = Arc::new(CannedSession::with(&[("get_node_version", json!({"data": "5.2.1"}))]));
        let reply = agent(session.clone())
            .process(&request("node version of node7", &[("node", "node7")]))
            .await;

        assert_eq!(reply, "**Version: Node node7**\n\n5.2.1");
        assert_eq!(session.args_of("get_node_version").unwrap()["node"], "node7");
    }

    #[tokio::test]
    async fn filesystem_health_requires_a_name() {
        let session = Arc::new(CannedSession::default());
        let reply = agent(session.clone())
            .process(&request("filesystem health", &[]))
            .await;
        assert!(reply.starts_with("Please specify a filesystem name."));
        assert!(session.tools_called().is_empty());
    }

    #[tokio::test]
    async fn overview_survives_a_failed_section() {
        let session = Arc::new(CannedSession::with(&[(
            "get_node_health_states",
            json!({"states": []}),
        )]));
        let reply = agent(session.clone()).process(&request("how are things", &[])).await;

        assert!(reply.starts_with("**Cluster Health Overview**"));
        assert!(reply.contains("**Node Status:** Unable to retrieve"));
        assert!(reply.contains("All systems healthy"));
        assert_eq!(
            session.tools_called(),
            vec!["get_nodes_status", "get_node_health_states"]
        );
    }

    #[tokio::test]
    async fn tool_failure_becomes_error_block() {
        let session = Arc::new(CannedSession::default());
        let reply = agent(session).process(&request("list clusters", &[])).await;
        assert!(reply.starts_with("**❌ Error**"));
        assert!(reply.contains("**Context:** health check"));
    }
}
