use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::base::{Config, ConfigError};
use super::tool_mappings::{AgentKind, ToolRiskLevel, ToolRiskTable};

pub const DEFAULT_MCP_SERVER_URL: &str = "http://localhost:8000/mcp";
pub const DEFAULT_MCP_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_MCP_MAX_RETRIES: u32 = 3;
pub const DEFAULT_CONFIRMATION_TTL_SECONDS: u64 = 300;
pub const MAX_CONFIRMATION_TTL_SECONDS: u64 = 24 * 60 * 60;
pub const DEFAULT_INTENT_CONFIDENCE_FLOOR: f64 = 0.3;

/// Typed view over [`Config`] with defaults for every key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub mcp_server_url: String,
    pub mcp_timeout_seconds: u64,
    pub mcp_max_retries: u32,
    pub require_confirmation: bool,
    pub confirmation_ttl_seconds: u64,
    pub confirmation_codes: bool,
    pub intent_confidence_floor: f64,
    pub enabled_agents: Vec<AgentKind>,
    pub tool_risk_overrides: HashMap<String, ToolRiskLevel>,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mcp_server_url: DEFAULT_MCP_SERVER_URL.to_string(),
            mcp_timeout_seconds: DEFAULT_MCP_TIMEOUT_SECONDS,
            mcp_max_retries: DEFAULT_MCP_MAX_RETRIES,
            require_confirmation: true,
            confirmation_ttl_seconds: DEFAULT_CONFIRMATION_TTL_SECONDS,
            confirmation_codes: false,
            intent_confidence_floor: DEFAULT_INTENT_CONFIDENCE_FLOOR,
            enabled_agents: vec![
                AgentKind::Health,
                AgentKind::Storage,
                AgentKind::Quota,
                AgentKind::Performance,
                AgentKind::Admin,
            ],
            tool_risk_overrides: HashMap::new(),
            log_level: "info".to_string(),
        }
    }
}

fn param_or<T: DeserializeOwned>(config: &Config, key: &str, default: T) -> Result<T, ConfigError> {
    match config.get_param(key) {
        Ok(value) => Ok(value),
        Err(ConfigError::NotFound(_)) => Ok(default),
        Err(e) => Err(e),
    }
}

impl Settings {
    /// Read every key from `config`, falling back to the default for keys
    /// that are not set anywhere. The result is validated.
    pub fn load(config: &Config) -> Result<Self, ConfigError> {
        let d = Settings::default();
        let settings = Settings {
            mcp_server_url: param_or(config, "mcp_server_url", d.mcp_server_url)?,
            mcp_timeout_seconds: param_or(config, "mcp_timeout_seconds", d.mcp_timeout_seconds)?,
            mcp_max_retries: param_or(config, "mcp_max_retries", d.mcp_max_retries)?,
            require_confirmation: param_or(config, "require_confirmation", d.require_confirmation)?,
            confirmation_ttl_seconds: param_or(
                config,
                "confirmation_ttl_seconds",
                d.confirmation_ttl_seconds,
            )?,
            confirmation_codes: param_or(config, "confirmation_codes", d.confirmation_codes)?,
            intent_confidence_floor: param_or(
                config,
                "intent_confidence_floor",
                d.intent_confidence_floor,
            )?,
            enabled_agents: param_or(config, "enabled_agents", d.enabled_agents)?,
            tool_risk_overrides: param_or(config, "tool_risk_overrides", d.tool_risk_overrides)?,
            log_level: param_or(config, "log_level", d.log_level)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, reason: String| ConfigError::InvalidValue {
            key: key.to_string(),
            reason,
        };

        scale_mcp_client::StreamableHttpTransport::validate_endpoint(&self.mcp_server_url)
            .map_err(|e| invalid("mcp_server_url", e.to_string()))?;
        if self.mcp_timeout_seconds == 0 {
            return Err(invalid("mcp_timeout_seconds", "must be positive".into()));
        }
        if self.mcp_max_retries == 0 {
            return Err(invalid("mcp_max_retries", "at least one attempt is required".into()));
        }
        if self.confirmation_ttl_seconds == 0
            || self.confirmation_ttl_seconds > MAX_CONFIRMATION_TTL_SECONDS
        {
            return Err(invalid(
                "confirmation_ttl_seconds",
                format!(
                    "{} is outside [1, {}]",
                    self.confirmation_ttl_seconds, MAX_CONFIRMATION_TTL_SECONDS
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.intent_confidence_floor) {
            return Err(invalid(
                "intent_confidence_floor",
                format!("{} is outside [0, 1]", self.intent_confidence_floor),
            ));
        }
        Ok(())
    }

    pub fn mcp_timeout(&self) -> Duration {
        Duration::from_secs(self.mcp_timeout_seconds)
    }

    /// Clamped to the accepted range, so unvalidated settings still yield a
    /// usable duration.
    pub fn confirmation_ttl(&self) -> chrono::Duration {
        let seconds = self
            .confirmation_ttl_seconds
            .clamp(1, MAX_CONFIRMATION_TTL_SECONDS);
        i64::try_from(seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| chrono::Duration::minutes(5))
    }

    pub fn risk_table(&self) -> ToolRiskTable {
        ToolRiskTable::with_overrides(self.tool_risk_overrides.clone())
    }

    pub fn is_enabled(&self, kind: AgentKind) -> bool {
        self.enabled_agents.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::NamedTempFile;

    fn empty_config() -> (NamedTempFile, Config) {
        let file = NamedTempFile::new().unwrap();
        let config = Config::new(file.path());
        (file, config)
    }

    #[test]
    #[serial]
    fn defaults_when_nothing_is_set() {
        let (_file, config) = empty_config();
        let settings = Settings::load(&config).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.mcp_timeout(), Duration::from_secs(30));
        assert_eq!(settings.confirmation_ttl(), chrono::Duration::minutes(5));
    }

    #[test]
    #[serial]
    fn file_values_are_read() {
        let (file, config) = empty_config();
        std::fs::write(
            file.path(),
            concat!(
                "mcp_server_url: http://scale-mcp:9000/mcp\n",
                "mcp_max_retries: 5\n",
                "enabled_agents: [health]\n",
                "tool_risk_overrides:\n",
                "  unlink_fileset: high\n",
            ),
        )
        .unwrap();

        let settings = Settings::load(&config).unwrap();
        assert_eq!(settings.mcp_server_url, "http://scale-mcp:9000/mcp");
        assert_eq!(settings.mcp_max_retries, 5);
        assert!(settings.is_enabled(AgentKind::Health));
        assert!(!settings.is_enabled(AgentKind::Storage));
        assert!(!settings.risk_table().is_destructive("unlink_fileset"));
    }

    #[test]
    #[serial]
    fn env_overrides_file() {
        let (file, config) = empty_config();
        std::fs::write(file.path(), "require_confirmation: true\n").unwrap();

        temp_env::with_vars(
            [
                ("REQUIRE_CONFIRMATION", Some("false")),
                ("MCP_TIMEOUT_SECONDS", Some("5")),
            ],
            || {
                let settings = Settings::load(&config).unwrap();
                assert!(!settings.require_confirmation);
                assert_eq!(settings.mcp_timeout_seconds, 5);
            },
        );
    }

    #[test]
    #[serial]
    fn invalid_values_are_rejected() {
        let (file, config) = empty_config();

        std::fs::write(file.path(), "intent_confidence_floor: 1.5\n").unwrap();
        assert!(matches!(
            Settings::load(&config),
            Err(ConfigError::InvalidValue { .. })
        ));

        std::fs::write(file.path(), "mcp_server_url: not a url\n").unwrap();
        assert!(matches!(
            Settings::load(&config),
            Err(ConfigError::InvalidValue { .. })
        ));

        std::fs::write(file.path(), "mcp_max_retries: many\n").unwrap();
        assert!(matches!(
            Settings::load(&config),
            Err(ConfigError::DeserializeError(_))
        ));
    }

    #[test]
    #[serial]
    fn confirmation_ttl_is_bounded() {
        let (file, config) = empty_config();

        for ttl in ["0", "86401", "10000000000000"] {
            std::fs::write(file.path(), format!("confirmation_ttl_seconds: {ttl}\n")).unwrap();
            match Settings::load(&config) {
                Err(ConfigError::InvalidValue { key, .. }) => {
                    assert_eq!(key, "confirmation_ttl_seconds")
                }
                other => panic!("ttl {ttl} accepted: {other:?}"),
            }
        }

        std::fs::write(file.path(), "confirmation_ttl_seconds: 86400\n").unwrap();
        let settings = Settings::load(&config).unwrap();
        assert_eq!(settings.confirmation_ttl(), chrono::Duration::days(1));

        let unchecked = Settings {
            confirmation_ttl_seconds: 10_000_000_000_000,
            ..Settings::default()
        };
        assert!(unchecked.validate().is_err());
        assert_eq!(unchecked.confirmation_ttl(), chrono::Duration::days(1));
    }
}
