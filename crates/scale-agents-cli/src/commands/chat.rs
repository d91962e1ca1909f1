use anyhow::Result;
use console::style;
use scale_agents::{AgentError, Orchestrator};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

const EXIT_WORDS: &[&str] = &["exit", "quit", "/exit", "/quit"];

fn is_exit(line: &str) -> bool {
    EXIT_WORDS.contains(&line.trim().to_lowercase().as_str())
}

fn new_conversation_id() -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("cli-{}-{}", std::process::id(), millis)
}

/// Routing faults end the turn, not the session.
fn render(reply: Result<String, AgentError>) -> String {
    match reply {
        Ok(text) => text,
        Err(err) => {
            error!(error = %err, "Request failed");
            format!("{} {}", style("error:").red().bold(), err)
        }
    }
}

pub async fn handle_ask(orchestrator: &Orchestrator, text: &str) -> Result<()> {
    let conversation_id = new_conversation_id();
    let reply = orchestrator.process(text, &conversation_id).await;
    orchestrator.end_conversation(&conversation_id).await;
    let failed = reply.is_err();
    println!("{}", render(reply));
    if failed {
        anyhow::bail!("request could not be routed");
    }
    Ok(())
}

pub async fn handle_chat(orchestrator: &Orchestrator, conversation: Option<String>) -> Result<()> {
    let conversation_id = conversation.unwrap_or_else(new_conversation_id);
    println!(
        "{}",
        style("Storage Scale agents. Type 'help' for capabilities, 'exit' to quit.").dim()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", style(">").cyan().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        if is_exit(&line) {
            break;
        }

        let reply = orchestrator.process(line.trim(), &conversation_id).await;
        println!("\n{}\n", render(reply));
    }

    orchestrator.end_conversation(&conversation_id).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_words() {
        assert!(is_exit(" Quit "));
        assert!(is_exit("/exit"));
        assert!(!is_exit("exit the fileset"));
    }

    #[test]
    fn conversation_ids_are_prefixed() {
        assert!(new_conversation_id().starts_with("cli-"));
    }
}
