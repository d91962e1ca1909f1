use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{AgentCore, AgentRequest, ScaleAgent, Step};
use crate::config::AgentKind;
use crate::executor::ToolExecutor;
use crate::formatter::{classify_health, list_items, HealthClass, ResponseFormatter};
use scale_mcp_client::ToolContent;

const ALL_NODES: &str = ":all:";

const BOTTLENECK_WORDS: &[&str] = &[
    "bottleneck",
    "slow",
    "latency",
    "throughput",
    "iops",
    "performance",
    "issue",
    "problem",
];

pub struct PerformanceAgent {
    core: AgentCore,
}

impl PerformanceAgent {
    pub fn new(executor: Arc<ToolExecutor>, formatter: Arc<dyn ResponseFormatter>) -> Self {
        Self {
            core: AgentCore::new(AgentKind::Performance, executor, formatter),
        }
    }

    async fn handle(&self, req: &AgentRequest) -> Step<String> {
        let node = req.mentions(&["node"]);
        let filesystem = req.mentions(&["filesystem", "fs"]);
        let bottleneck = req.mentions(BOTTLENECK_WORDS);

        if bottleneck && node {
            return self.analyze_nodes(req).await;
        }
        if bottleneck && filesystem {
            return self.analyze_filesystem(req).await;
        }
        if req.mentions(&["pool"]) {
            return self.storage_pools(req).await;
        }
        if req.mentions(&["usage", "capacity", "space"]) {
            return self.usage(req).await;
        }
        if node {
            return self.node_performance(req).await;
        }
        if filesystem {
            return self.filesystem_performance(req).await;
        }
        self.overview(req).await
    }

    async fn overview(&self, req: &AgentRequest) -> Step<String> {
        let formatter = self.core.formatter();
        let mut lines = vec!["**Performance Overview**".to_string(), String::new()];

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
        lines.extend(self.core.section("Node Health States", health));

        lines.extend(
            [
                "---",
                "*For detailed analysis, specify a component:*",
                "• 'Analyze node performance for node1'",
                "• 'Check filesystem gpfs01 performance'",
                "• 'Show storage pool usage in gpfs01'",
            ]
            .map(String::from),
        );
        Ok(lines.join("\n"))
    }

    async fn node_performance(&self, req: &AgentRequest) -> Step<String> {
        let node = req.param("node");
        let status = self.core.fetch(req, "get_nodes_status", json!({})).await?;
        let health = self
            .core
            .fetch(req, "get_node_health_states", json!({"name": node.unwrap_or(ALL_NODES)}))
            .await?;

        let formatter = self.core.formatter();
        let title = match node {
            Some(node) => format!("Node Performance: {}", node),
            None => "Node Performance: All Nodes".to_string(),
        };
        Ok([
            format!("**{}**", title),
            String::new(),
            "**Status:**".to_string(),
            formatter.format(&status, None),
            String::new(),
            "**Health States:**".to_string(),
            formatter.format_health(&health, ""),
        ]
        .join("\n"))
    }

    async fn analyze_nodes(&self, req: &AgentRequest) -> Step<String> {
        let node = req.param("node");
        let spec = node.unwrap_or(ALL_NODES);

        self.core.fetch(req, "get_nodes_status", json!({})).await?;
        let health = self
            .core
            .fetch(req, "get_node_health_states", json!({"name": spec}))
            .await?;
        let events = self
            .core
            .fetch(req, "get_node_health_events", json!({"name": spec}))
            .await?;

        let formatter = self.core.formatter();
        let title = match node {
            Some(node) => format!("Node Performance Analysis: {}", node),
            None => "Node Performance Analysis".to_string(),
        };
        Ok([
            format!("**{}**", title),
            String::new(),
            "**Health Analysis:**".to_string(),
            formatter.format_health(&health, ""),
            String::new(),
            "**Recent Events:**".to_string(),
            formatter.format_health(&events, ""),
            String::new(),
            "**Summary:**".to_string(),
            node_summary(&health),
        ]
        .join("\n"))
    }

    async fn filesystem_performance(&self, req: &AgentRequest) -> Step<String> {
        let formatter = self.core.formatter();
        let Some(filesystem) = req.param("filesystem") else {
            let listing = self.core.fetch(req, "list_filesystems", json!({})).await?;
            return Ok(formatter.format(
                &listing,
                Some("Available Filesystems (specify one for performance details)"),
            ));
        };

        let details = self
            .core
            .fetch(req, "get_filesystem", json!({"filesystem": filesystem}))
            .await?;
        let health = self
            .core
            .fetch(req, "get_filesystem_health_states", json!({"filesystem": filesystem}))
            .await?;

        Ok([
            format!("**Filesystem Performance: {}**", filesystem),
            String::new(),
            "**Details:**".to_string(),
            formatter.format(&details, None),
            String::new(),
            "**Health States:**".to_string(),
            formatter.format_health(&health, ""),
        ]
        .join("\n"))
    }

    async fn analyze_filesystem(&self, req: &AgentRequest) -> Step<String> {
        let Some(filesystem) = req.param("filesystem") else {
            return Ok("Please specify a filesystem for performance analysis. \
                       Example: 'Analyze performance bottlenecks in filesystem gpfs01'"
                .to_string());
        };

        self.core
            .fetch(req, "get_filesystem", json!({"filesystem": filesystem}))
            .await?;
        let health = self
            .core
            .fetch(req, "get_filesystem_health_states", json!({"filesystem": filesystem}))
            .await?;
        let pools = self
            .core
            .fetch(req, "list_storage_pools", json!({"filesystem": filesystem}))
            .await?;

        let formatter = self.core.formatter();
        Ok([
            format!("**Filesystem Performance Analysis: {}**", filesystem),
            String::new(),
            "**Health Status:**".to_string(),
            formatter.format_health(&health, ""),
            String::new(),
            "**Storage Pools:**".to_string(),
            formatter.format(&pools, None),
            String::new(),
            "**Analysis Summary:**".to_string(),
            filesystem_summary(&health),
        ]
        .join("\n"))
    }

    async fn storage_pools(&self, req: &AgentRequest) -> Step<String> {
        let Some(filesystem) = req.param("filesystem") else {
            return Ok("Please specify a filesystem. \
                       Example: 'Analyze storage pool performance in filesystem gpfs01'"
                .to_string());
        };

        let pools = self
            .core
            .fetch(req, "list_storage_pools", json!({"filesystem": filesystem}))
            .await?;
        Ok([
            format!("**Storage Pool Analysis: {}**", filesystem),
            String::new(),
            self.core.formatter().format(&pools, None),
            String::new(),
            "*For individual pool details, specify the pool name.*".to_string(),
        ]
        .join("\n"))
    }

    async fn usage(&self, req: &AgentRequest) -> Step<String> {
        let formatter = self.core.formatter();
        match (req.param("filesystem"), req.param("fileset")) {
            (Some(filesystem), Some(fileset)) => {
                let usage = self
                    .core
                    .fetch(
                        req,
                        "get_fileset_usage",
                        json!({"filesystem": filesystem, "fileset_name": fileset}),
                    )
                    .await?;
                Ok(formatter.format(&usage, Some(&format!("Usage Analysis: {}", fileset))))
            }
            (Some(filesystem), None) => {
                let pools = self
                    .core
                    .fetch(req, "list_storage_pools", json!({"filesystem": filesystem}))
                    .await?;
                Ok(formatter.format(&pools, Some(&format!("Storage Utilization: {}", filesystem))))
            }
            _ => Ok("Please specify a filesystem or fileset. \
                     Example: 'Analyze usage for fileset user-homes in gpfs01'"
                .to_string()),
        }
    }
}

fn str_of<'a>(item: &'a Value, key: &str) -> Option<&'a str> {
    item.get(key).and_then(Value::as_str)
}

fn node_summary(health: &ToolContent) -> String {
    let issues: Vec<String> = list_items(health)
        .iter()
        .filter(|state| classify_health(state) == HealthClass::Critical)
        .map(|state| {
            let entity = str_of(state, "entityName").unwrap_or("Unknown");
            let reason = str_of(state, "reason")
                .or_else(|| str_of(state, "message"))
                .unwrap_or("No details");
            format!("• **{}**: {}", entity, reason)
        })
        .collect();

    if issues.is_empty() {
        "✅ No performance issues detected.".to_string()
    } else {
        format!("**Detected Issues:**\n{}", issues.join("\n"))
    }
}

fn filesystem_summary(health: &ToolContent) -> String {
    let issues: Vec<String> = list_items(health)
        .iter()
        .filter(|state| {
            matches!(
                classify_health(state),
                HealthClass::Critical | HealthClass::Warning
            )
        })
        .map(|state| {
            format!(
                "• Health issue: {}",
                str_of(state, "message").unwrap_or("Unknown")
            )
        })
        .collect();

    if issues.is_empty() {
        "✅ No obvious bottlenecks detected.".to_string()
    } else {
        format!("**Potential Bottlenecks:**\n{}", issues.join("\n"))
    }
}

#[async_trait]
impl ScaleAgent for PerformanceAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Performance
    }

    fn description(&self) -> &str {
        "Analyzes performance metrics and identifies bottlenecks. \
         Provides diagnostics for performance engineers and SREs."
    }

    async fn process(&self, request: &AgentRequest) -> String {
        let step = self.handle(request).await;
        self.core.finish(step, "performance analysis")
    }
}
