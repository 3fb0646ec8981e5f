use anyhow::Result;
use clap::Parser;
use cloud_infra::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up GOOGLE_ACCESS_TOKEN and friends from a local .env if present.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    tracing::info!(config = %cli.config.display(), "cloud-infra starting");

    let result = run(cli).await;
    match &result {
        Ok(_) => tracing::info!("cloud-infra completed successfully"),
        Err(e) => tracing::error!(error = %e, "cloud-infra exited with error"),
    }
    result
}
