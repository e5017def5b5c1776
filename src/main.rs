mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use halo_server_manager::config::ManagerConfig;
use halo_server_manager::Orchestrator;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::Args::parse();

    // 로그는 stderr로, 명령 출력은 stdout으로
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: cli::Args) -> anyhow::Result<()> {
    let config = ManagerConfig::load()?;
    let orch = Orchestrator::new(config).context("initialising orchestrator")?;
    tracing::debug!(
        "[Main] Preferences at {}",
        orch.preferences().path().display()
    );
    cli::run(Arc::new(orch), args.command).await
}
