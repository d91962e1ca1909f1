use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use scale_agents::{Config, Orchestrator, Settings};

use crate::commands::chat::{handle_ask, handle_chat};
use crate::commands::configure::{handle_config_path, handle_config_set, handle_config_show};
use crate::commands::tools::handle_tools;
use crate::logging::setup_logging;

#[derive(Parser)]
#[command(author, version, about = "Talk to IBM Storage Scale through MCP agents", long_about = None)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "MCP server endpoint, overrides mcp_server_url"
    )]
    server_url: Option<String>,

    #[arg(long, global = true, help = "Emit logs as JSON lines on stderr")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive conversation (default)
    Chat {
        #[arg(
            short,
            long,
            value_name = "ID",
            help = "Conversation id confirmations are scoped to"
        )]
        conversation: Option<String>,
    },

    /// Answer a single request and exit
    Ask {
        #[arg(required = true, num_args = 1.., value_name = "TEXT")]
        text: Vec<String>,
    },

    /// List the tools the MCP server offers
    Tools,

    /// Inspect or change the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective settings
    Show,

    /// Store a value; JSON is parsed, anything else is kept as a string
    Set { key: String, value: String },

    /// Print the configuration file location
    Path,
}

fn load_settings(server_url: Option<String>) -> Result<Settings> {
    let mut settings =
        Settings::load(Config::global()).context("Failed to load scale-agents configuration")?;
    if let Some(url) = server_url {
        settings.mcp_server_url = url;
        settings.validate()?;
    }
    Ok(settings)
}

pub async fn cli() -> Result<()> {
    let cli = Cli::parse();

    // Config commands work even when the stored settings are broken.
    if let Some(Command::Config { command }) = &cli.command {
        return match command {
            ConfigCommand::Show => handle_config_show(load_settings(cli.server_url.clone())?),
            ConfigCommand::Set { key, value } => handle_config_set(Config::global(), key, value),
            ConfigCommand::Path => handle_config_path(Config::global()),
        };
    }

    let settings = load_settings(cli.server_url)?;
    setup_logging(&settings.log_level, cli.log_json)?;

    let orchestrator = Orchestrator::from_settings(&settings)?;
    let result = match cli.command {
        Some(Command::Ask { text }) => handle_ask(&orchestrator, &text.join(" ")).await,
        Some(Command::Tools) => handle_tools(&orchestrator).await,
        Some(Command::Chat { conversation }) => handle_chat(&orchestrator, conversation).await,
        None => handle_chat(&orchestrator, None).await,
        Some(Command::Config { .. }) => Ok(()),
    };
    orchestrator.shutdown().await;
    result
}
