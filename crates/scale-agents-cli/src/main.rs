use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    scale_agents_cli::cli::cli().await
}
