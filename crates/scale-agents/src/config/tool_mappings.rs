use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolRiskLevel {
    Low,
    High,
    Destructive,
}

impl fmt::Display for ToolRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ToolRiskLevel::Low => "low",
            ToolRiskLevel::High => "high",
            ToolRiskLevel::Destructive => "destructive",
        };
        f.write_str(s)
    }
}

/// The specialized agents requests can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Health,
    Storage,
    Quota,
    Performance,
    Admin,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Health => "health",
            AgentKind::Storage => "storage",
            AgentKind::Quota => "quota",
            AgentKind::Performance => "performance",
            AgentKind::Admin => "admin",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "health" => Ok(AgentKind::Health),
            "storage" => Ok(AgentKind::Storage),
            "quota" => Ok(AgentKind::Quota),
            "performance" => Ok(AgentKind::Performance),
            "admin" => Ok(AgentKind::Admin),
            other => Err(format!("unknown agent '{}'", other)),
        }
    }
}

pub const HEALTH_TOOLS: &[&str] = &[
    "get_node_health_states",
    "get_node_health_events",
    "get_nodes_status",
    "get_nodes_config",
    "get_version",
    "get_node_version",
    "get_filesystem_health_states",
    "get_filesystem_health_events",
    "list_clusters",
];

pub const PERFORMANCE_TOOLS: &[&str] = &[
    "get_nodes_status",
    "get_node_health_states",
    "get_node_health_events",
    "list_filesystems",
    "get_filesystem",
    "get_filesystem_health_states",
    "list_storage_pools",
    "get_fileset_usage",
];

pub const STORAGE_TOOLS: &[&str] = &[
    "list_filesystems",
    "get_filesystem",
    "mount_filesystem",
    "unmount_filesystem",
    "delete_filesystem",
    "list_filesets",
    "get_fileset",
    "create_fileset",
    "delete_fileset",
    "link_fileset",
    "unlink_fileset",
    "list_storage_pools",
];

pub const QUOTA_TOOLS: &[&str] = &[
    "list_quotas",
    "set_quota",
    "delete_quota",
    "get_fileset_usage",
    "get_filesystem",
];

pub const ADMIN_TOOLS: &[&str] = &[
    "list_snapshots",
    "create_snapshot",
    "delete_snapshot",
    "start_nodes",
    "stop_nodes",
    "get_nodes_config",
    "list_clusters",
    "list_remote_clusters",
    "add_remote_cluster",
    "authorize_remote_cluster",
    "unauthorize_remote_cluster",
    "delete_remote_cluster",
    "list_nsds",
];

/// Irreversible or service-affecting. Calls to these are gated behind an
/// explicit confirmation.
pub const DESTRUCTIVE_TOOLS: &[&str] = &[
    "delete_fileset",
    "unlink_fileset",
    "delete_filesystem",
    "unmount_filesystem",
    "delete_quota",
    "delete_snapshot",
    "stop_nodes",
    "delete_remote_cluster",
    "unauthorize_remote_cluster",
];

/// Change cluster state but are easy to undo.
pub const HIGH_RISK_TOOLS: &[&str] = &[
    "create_fileset",
    "link_fileset",
    "mount_filesystem",
    "set_quota",
    "create_snapshot",
    "start_nodes",
    "add_remote_cluster",
    "authorize_remote_cluster",
];

pub fn allowed_tools(kind: AgentKind) -> &'static [&'static str] {
    match kind {
        AgentKind::Health => HEALTH_TOOLS,
        AgentKind::Performance => PERFORMANCE_TOOLS,
        AgentKind::Storage => STORAGE_TOOLS,
        AgentKind::Quota => QUOTA_TOOLS,
        AgentKind::Admin => ADMIN_TOOLS,
    }
}

/// Risk lookup: configured overrides first, then the built-in lists.
/// Anything not listed is low risk.
#[derive(Debug, Clone, Default)]
pub struct ToolRiskTable {
    overrides: HashMap<String, ToolRiskLevel>,
}

impl ToolRiskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: HashMap<String, ToolRiskLevel>) -> Self {
        Self { overrides }
    }

    pub fn risk_level(&self, tool_name: &str) -> ToolRiskLevel {
        if let Some(level) = self.overrides.get(tool_name) {
            return *level;
        }
        if DESTRUCTIVE_TOOLS.contains(&tool_name) {
            ToolRiskLevel::Destructive
        } else if HIGH_RISK_TOOLS.contains(&tool_name) {
            ToolRiskLevel::High
        } else {
            ToolRiskLevel::Low
        }
    }

    pub fn is_destructive(&self, tool_name: &str) -> bool {
        self.risk_level(tool_name) == ToolRiskLevel::Destructive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_levels() {
        let table = ToolRiskTable::new();
        assert_eq!(table.risk_level("delete_fileset"), ToolRiskLevel::Destructive);
        assert_eq!(table.risk_level("create_fileset"), ToolRiskLevel::High);
        assert_eq!(table.risk_level("list_filesets"), ToolRiskLevel::Low);
        assert_eq!(table.risk_level("never_heard_of_it"), ToolRiskLevel::Low);
    }

    #[test]
    fn overrides_win() {
        let table = ToolRiskTable::with_overrides(HashMap::from([
            ("delete_fileset".to_string(), ToolRiskLevel::High),
            ("mount_filesystem".to_string(), ToolRiskLevel::Destructive),
        ]));
        assert!(!table.is_destructive("delete_fileset"));
        assert!(table.is_destructive("mount_filesystem"));
    }

    #[test]
    fn read_only_agents_have_no_mutating_tools() {
        let table = ToolRiskTable::new();
        for tool in HEALTH_TOOLS.iter().chain(PERFORMANCE_TOOLS) {
            assert_eq!(table.risk_level(tool), ToolRiskLevel::Low, "{tool}");
        }
    }

    #[test]
    fn agent_kind_parses_case_insensitively() {
        assert_eq!("Storage".parse::<AgentKind>(), Ok(AgentKind::Storage));
        assert!("backup".parse::<AgentKind>().is_err());
    }

    #[test]
    fn every_destructive_tool_belongs_to_an_agent() {
        let kinds = [
            AgentKind::Health,
            AgentKind::Storage,
            AgentKind::Quota,
            AgentKind::Performance,
            AgentKind::Admin,
        ];
        for tool in DESTRUCTIVE_TOOLS {
            assert!(
                kinds.iter().any(|k| allowed_tools(*k).contains(tool)),
                "{tool} is unreachable"
            );
        }
    }

    #[test]
    fn risk_level_deserializes_lowercase() {
        let level: ToolRiskLevel = serde_json::from_str("\"destructive\"").unwrap();
        assert_eq!(level, ToolRiskLevel::Destructive);
        assert_eq!(level.to_string(), "destructive");
    }
}
