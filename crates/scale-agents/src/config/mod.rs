mod base;
pub mod settings;
pub mod tool_mappings;

pub use base::{Config, ConfigError, APP_STRATEGY, CONFIG_PATH_ENV};
pub use settings::Settings;
pub use tool_mappings::{allowed_tools, AgentKind, ToolRiskLevel, ToolRiskTable};
