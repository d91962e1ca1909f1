use etcetera::{choose_app_strategy, AppStrategy, AppStrategyArgs};
use once_cell::sync::{Lazy, OnceCell};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub static APP_STRATEGY: Lazy<AppStrategyArgs> = Lazy::new(|| AppStrategyArgs {
    top_level_domain: "io.github".to_string(),
    author: "scale-agents".to_string(),
    app_name: "scale-agents".to_string(),
});

/// Overrides the location of the YAML config file.
pub const CONFIG_PATH_ENV: &str = "SCALE_AGENTS_CONFIG_PATH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration value not found: {0}")]
    NotFound(String),
    #[error("Failed to deserialize value: {0}")]
    DeserializeError(String),
    #[error("Failed to read config file: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Failed to create config directory: {0}")]
    DirectoryError(String),
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::DeserializeError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::DeserializeError(err.to_string())
    }
}

/// Key/value configuration backed by environment variables and a YAML file.
///
/// Values are looked up with the following precedence:
/// 1. Environment variable named after the upper-cased key
///    (`mcp_server_url` checks `MCP_SERVER_URL`), parsed as JSON when it
///    parses, else taken as a string
/// 2. The YAML config file (`~/.config/scale-agents/config.yaml` by default,
///    or the path in `SCALE_AGENTS_CONFIG_PATH`)
///
/// A missing file is treated as empty. Nothing is written unless
/// [`Config::set_param`] is called.
pub struct Config {
    config_path: PathBuf,
}

static GLOBAL_CONFIG: OnceCell<Config> = OnceCell::new();

impl Default for Config {
    fn default() -> Self {
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            return Config {
                config_path: PathBuf::from(path),
            };
        }

        // - macOS/Linux: ~/.config/scale-agents/
        // - Windows:     ~\AppData\Roaming\scale-agents\scale-agents\config\
        let config_path = match choose_app_strategy(APP_STRATEGY.clone()) {
            Ok(strategy) => strategy.config_dir().join("config.yaml"),
            Err(e) => {
                tracing::warn!("No home directory ({}), using ./config.yaml", e);
                PathBuf::from("config.yaml")
            }
        };
        Config { config_path }
    }
}

impl Config {
    pub fn global() -> &'static Config {
        GLOBAL_CONFIG.get_or_init(Config::default)
    }

    pub fn new<P: AsRef<Path>>(config_path: P) -> Self {
        Config {
            config_path: config_path.as_ref().to_path_buf(),
        }
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    pub fn path(&self) -> String {
        self.config_path.to_string_lossy().to_string()
    }

    pub fn load_values(&self) -> Result<HashMap<String, Value>, ConfigError> {
        if !self.config_path.exists() {
            return Ok(HashMap::new());
        }

        let content = std::fs::read_to_string(&self.config_path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }

        let yaml_value: serde_yaml::Value = serde_yaml::from_str(&content)?;
        let json_value: Value = serde_json::to_value(yaml_value)?;

        match json_value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            _ => Ok(HashMap::new()),
        }
    }

    fn save_values(&self, values: HashMap<String, Value>) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::DirectoryError(e.to_string()))?;
            }
        }

        // Sorted output keeps diffs of the file stable.
        let sorted: std::collections::BTreeMap<_, _> = values.into_iter().collect();
        let yaml = serde_yaml::to_string(&sorted)?;
        std::fs::write(&self.config_path, yaml)?;
        Ok(())
    }

    /// Get a configuration value, deserialized into the requested type.
    pub fn get_param<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<T, ConfigError> {
        let env_key = key.to_uppercase();
        if let Ok(val) = env::var(&env_key) {
            let value: Value = serde_json::from_str(&val).unwrap_or(Value::String(val));
            return Ok(serde_json::from_value(value)?);
        }

        let values = self.load_values()?;
        values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))
            .and_then(|v| Ok(serde_json::from_value(v.clone())?))
    }

    /// Write a value to the config file. Environment overrides are untouched.
    pub fn set_param(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let mut values = self.load_values()?;
        values.insert(key.to_string(), value);
        self.save_values(values)
    }

    pub fn delete(&self, key: &str) -> Result<(), ConfigError> {
        let mut values = self.load_values()?;
        values.remove(key);
        self.save_values(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::NamedTempFile;

    #[test]
    fn test_basic_config() -> Result<(), ConfigError> {
        let temp_file = NamedTempFile::new().unwrap();
        let config = Config::new(temp_file.path());

        config.set_param("scale_test_key", Value::String("test_value".to_string()))?;

        let value: String = config.get_param("scale_test_key")?;
        assert_eq!(value, "test_value");
        Ok(())
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() -> Result<(), ConfigError> {
        let temp_file = NamedTempFile::new().unwrap();
        let config = Config::new(temp_file.path());
        config.set_param("scale_env_key", Value::String("from_file".to_string()))?;

        temp_env::with_var("SCALE_ENV_KEY", Some("from_env"), || {
            let value: String = config.get_param("scale_env_key").unwrap();
            assert_eq!(value, "from_env");
        });
        Ok(())
    }

    #[test]
    #[serial]
    fn test_env_value_parsed_as_json() {
        let config = Config::new("/nonexistent/scale-agents/config.yaml");
        temp_env::with_vars(
            [
                ("SCALE_RETRIES", Some("5")),
                ("SCALE_AGENT_LIST", Some("[\"health\",\"storage\"]")),
            ],
            || {
                let retries: u32 = config.get_param("scale_retries").unwrap();
                assert_eq!(retries, 5);
                let agents: Vec<String> = config.get_param("scale_agent_list").unwrap();
                assert_eq!(agents, vec!["health", "storage"]);
            },
        );
    }

    #[test]
    fn test_complex_type() -> Result<(), ConfigError> {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Overrides {
            delete_fileset: String,
        }

        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(
            temp_file.path(),
            "tool_risk_overrides:\n  delete_fileset: high\n",
        )?;
        let config = Config::new(temp_file.path());

        let overrides: Overrides = config.get_param("tool_risk_overrides")?;
        assert_eq!(overrides.delete_fileset, "high");
        Ok(())
    }

    #[test]
    fn test_missing_file_and_value() {
        let config = Config::new("/nonexistent/scale-agents/config.yaml");
        assert!(!config.exists());
        let result: Result<String, ConfigError> = config.get_param("scale_missing_key");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_set_creates_parent_and_delete_removes() -> Result<(), ConfigError> {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().join("nested").join("config.yaml"));

        config.set_param("scale_a", Value::from(1))?;
        config.set_param("scale_b", Value::from(true))?;
        assert!(config.exists());

        config.delete("scale_a")?;
        let values = config.load_values()?;
        assert!(!values.contains_key("scale_a"));
        assert_eq!(values.get("scale_b"), Some(&Value::from(true)));
        Ok(())
    }
}
