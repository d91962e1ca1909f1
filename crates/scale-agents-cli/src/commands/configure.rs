use anyhow::{Context, Result};
use console::style;
use scale_agents::{Config, Settings};
use serde_json::Value;

/// Same rule as environment overrides: JSON if it parses, else a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn handle_config_show(settings: Settings) -> Result<()> {
    let yaml = serde_yaml::to_string(&settings).context("Failed to render settings")?;
    print!("{}", yaml);
    Ok(())
}

pub fn handle_config_set(config: &Config, key: &str, raw: &str) -> Result<()> {
    let value = parse_value(raw);
    let previous = config.load_values()?.remove(key);
    config.set_param(key, value.clone())?;

    // Reject a value that would leave the stored settings unusable.
    if let Err(err) = Settings::load(config) {
        match previous {
            Some(previous) => config.set_param(key, previous)?,
            None => config.delete(key)?,
        }
        return Err(err).with_context(|| format!("Rejected value for '{}'", key));
    }

    println!("{} {} = {}", style("saved").green(), key, value);
    Ok(())
}

pub fn handle_config_path(config: &Config) -> Result<()> {
    println!("{}", config.path());
    Ok(())
}
