mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use printbox::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), commands::BoxError> {
    // stdout carries results only
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("printbox=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path.clone())?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Encode(args) => commands::encode(&config, args)?,
        Commands::Print(args) => commands::print(&config, args).await?,
        Commands::Status(args) => commands::status(&config, args).await?,
        Commands::Cancel(args) => commands::cancel(&config, args).await?,
    }

    Ok(())
}
