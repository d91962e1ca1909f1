use thiserror::Error;

use crate::config::{AgentKind, ConfigError};
use crate::intent::Intent;

/// The classified intent maps to an agent this deployment does not run.
/// A configuration fault, not a user error.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error(
        "Agent not available: {} (intent: {}, enabled: {})",
        .agent,
        .intent,
        format_agents(.enabled)
    )]
    AgentNotEnabled {
        agent: AgentKind,
        intent: Intent,
        enabled: Vec<AgentKind>,
    },
}

fn format_agents(agents: &[AgentKind]) -> String {
    if agents.is_empty() {
        return "none".to_string();
    }
    agents
        .iter()
        .map(AgentKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Tool '{tool}' is not allowed for agent '{agent}'")]
    ToolNotAllowed { tool: String, agent: AgentKind },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Mcp(#[from] scale_mcp_client::Error),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid classifier pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl From<scale_mcp_client::ToolError> for AgentError {
    fn from(err: scale_mcp_client::ToolError) -> Self {
        AgentError::Mcp(err.into())
    }
}
