use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tributary::{LogSink, TracingLog};

mod config;
mod events;
mod todos;

use config::{load_config, DemoConfig};

#[derive(Parser)]
#[command(name = "tributary-demo", about = "Pull-based event pipelines and a reactive store")]
struct Cli {
    /// Optional TOML file layered over the environment
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Button and input pipelines: delay, distinct, zip, merge, concat
    Events,
    /// Counter and todo list driven through store actions
    Todos,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = DemoConfig::from_env()?;
    if let Some(path) = &cli.config {
        config = config.overlay(load_config(path)?);
    }

    // Initialize logging
    let filter = EnvFilter::from_default_env().add_directive("tributary=info".parse()?);
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    config.log_summary();

    let sink: Arc<dyn LogSink> = Arc::new(TracingLog);
    match cli.command {
        Command::Events => events::run(&config, sink).await?,
        Command::Todos => todos::run(&config, sink).await?,
    }

    tracing::info!("All pipelines finished");
    Ok(())
}
