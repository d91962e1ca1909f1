use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use super::{AgentCore, AgentRequest, ScaleAgent, Step};
use crate::config::AgentKind;
use crate::executor::ToolExecutor;
use crate::formatter::{list_items, ResponseFormatter};

/// Snapshots, node start/stop, remote clusters, NSDs and cluster
/// configuration.
pub struct AdminAgent {
    core: AgentCore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    DeleteSnapshot,
    CreateSnapshot,
    ListSnapshots,
    UnauthorizeRemote,
    AuthorizeRemote,
    AddRemote,
    DeleteRemote,
    ListRemotes,
    ListNsds,
    Restart,
    StopNodes,
    StartNodes,
    Config,
    Clusters,
}

impl Operation {
    /// "unauthorize" contains "authorize" and "restart" contains "start", so
    /// those are tested first.
    fn detect(req: &AgentRequest) -> Self {
        let removing = req.mentions_word(&["delete", "remove"]);
        if req.mentions(&["snapshot"]) {
            if removing {
                Operation::DeleteSnapshot
            } else if req.mentions_word(&["create", "take", "new"]) {
                Operation::CreateSnapshot
            } else {
                Operation::ListSnapshots
            }
        } else if req.mentions(&["unauthorize"]) {
            Operation::UnauthorizeRemote
        } else if req.mentions(&["authorize"]) {
            Operation::AuthorizeRemote
        } else if req.mentions(&["remote"]) {
            if req.mentions_word(&["add"]) {
                Operation::AddRemote
            } else if removing {
                Operation::DeleteRemote
            } else {
                Operation::ListRemotes
            }
        } else if req.mentions(&["nsd"]) {
            Operation::ListNsds
        } else if req.mentions_word(&["restart"]) {
            Operation::Restart
        } else if req.mentions_word(&["stop"]) {
            Operation::StopNodes
        } else if req.mentions_word(&["start"]) {
            Operation::StartNodes
        } else if req.mentions(&["config", "setting"]) {
            Operation::Config
        } else {
            Operation::Clusters
        }
    }
}

fn ask_for(what: &str, example: &str) -> String {
    format!("Please specify {}. Example: '{}'", what, example)
}

impl AdminAgent {
    pub fn new(executor: Arc<ToolExecutor>, formatter: Arc<dyn ResponseFormatter>) -> Self {
        Self {
            core: AgentCore::new(AgentKind::Admin, executor, formatter),
        }
    }

    async fn handle(&self, req: &AgentRequest) -> Step<String> {
        let op = Operation::detect(req);
        let filesystem = req.param("filesystem");

        match op {
            Operation::DeleteSnapshot | Operation::CreateSnapshot => {
                let (Some(filesystem), Some(snapshot)) = (filesystem, req.param("snapshot")) else {
                    return Ok(ask_for(
                        "both a snapshot and a filesystem",
                        "Create snapshot daily-backup in gpfs01",
                    ));
                };
                let mut args = Map::new();
                args.insert("filesystem".into(), json!(filesystem));
                args.insert("snapshot".into(), json!(snapshot));

                let (tool, verb) = if op == Operation::DeleteSnapshot {
                    ("delete_snapshot", "Deleted")
                } else {
                    if let Some(fileset) = req.param("fileset") {
                        args.insert("fileset".into(), json!(fileset));
                    }
                    ("create_snapshot", "Created")
                };
                let title = format!("Snapshot {}: {}", verb, snapshot);
                self.run(req, tool, Value::Object(args), &title).await
            }

            Operation::ListSnapshots => {
                let Some(filesystem) = filesystem else {
                    return Ok(ask_for("a filesystem name", "List snapshots in gpfs01"));
                };
                let mut args = Map::new();
                args.insert("filesystem".into(), json!(filesystem));
                if let Some(fileset) = req.param("fileset") {
                    args.insert("fileset".into(), json!(fileset));
                }
                let snapshots = self
                    .core
                    .fetch(req, "list_snapshots", Value::Object(args))
                    .await?;
                Ok(self
                    .core
                    .formatter()
                    .format_list(&list_items(&snapshots), &format!("Snapshots in {}", filesystem)))
            }

            Operation::UnauthorizeRemote
            | Operation::AuthorizeRemote
            | Operation::AddRemote
            | Operation::DeleteRemote => {
                let Some(cluster) = req.param("cluster") else {
                    return Ok(ask_for(
                        "the remote cluster name",
                        "Add remote cluster east.example.com",
                    ));
                };
                let (tool, verb) = match op {
                    Operation::UnauthorizeRemote => ("unauthorize_remote_cluster", "Unauthorized"),
                    Operation::AuthorizeRemote => ("authorize_remote_cluster", "Authorized"),
                    Operation::AddRemote => ("add_remote_cluster", "Added"),
                    _ => ("delete_remote_cluster", "Deleted"),
                };
                let title = format!("Remote Cluster {}: {}", verb, cluster);
                self.run(req, tool, json!({"cluster": cluster}), &title).await
            }

            Operation::ListRemotes => {
                self.run(req, "list_remote_clusters", json!({}), "Remote Clusters")
                    .await
            }

            Operation::ListNsds => self.run(req, "list_nsds", json!({}), "NSDs").await,

            Operation::Restart => Ok(
                "Restart is two operations. Say 'stop node <name>', then 'start node <name>'."
                    .to_string(),
            ),

            Operation::StopNodes | Operation::StartNodes => {
                let Some(node) = req.param("node") else {
                    return Ok(ask_for("a node name", "Start node node3"));
                };
                let (tool, verb) = if op == Operation::StopNodes {
                    ("stop_nodes", "Stopped")
                } else {
                    ("start_nodes", "Started")
                };
                let title = format!("Node {}: {}", verb, node);
                self.run(req, tool, json!({"nodes": node}), &title).await
            }

            Operation::Config => {
                self.run(req, "get_nodes_config", json!({}), "Cluster Configuration")
                    .await
            }

            Operation::Clusters => self.run(req, "list_clusters", json!({}), "Clusters").await,
        }
    }

    async fn run(&self, req: &AgentRequest, tool: &str, args: Value, title: &str) -> Step<String> {
        let content = self.core.fetch(req, tool, args).await?;
        Ok(self.core.formatter().format(&content, Some(title)))
    }
}

#[async_trait]
impl ScaleAgent for AdminAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Admin
    }

    fn description(&self) -> &str {
        "Manages snapshots, starts and stops nodes, and administers remote clusters. \
         Deletions, node stops and unauthorizing a cluster require explicit confirmation."
    }

    async fn process(&self, request: &AgentRequest) -> String {
        let step = self.handle(request).await;
        self.core.finish(step, "admin operation")
    }
}
