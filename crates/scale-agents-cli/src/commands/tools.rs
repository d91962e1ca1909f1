use anyhow::Result;
use console::style;
use scale_agents::Orchestrator;
use scale_mcp_client::ToolDescriptor;

fn describe(tool: &ToolDescriptor, risk: &str) -> String {
    let description = tool
        .description
        .as_deref()
        .and_then(|d| d.lines().next())
        .unwrap_or("");
    format!("{:<32} {:<12} {}", tool.name, risk, description)
}

pub async fn handle_tools(orchestrator: &Orchestrator) -> Result<()> {
    let executor = orchestrator.executor();
    let mut tools = executor.list_tools().await?;
    tools.sort_by(|a, b| a.name.cmp(&b.name));

    println!("{}", style(format!("{} tool(s)", tools.len())).bold());
    for tool in &tools {
        let risk = executor.gate().risk_level(&tool.name).to_string();
        println!("{}", describe(tool, &risk));
    }
    Ok(())
}
