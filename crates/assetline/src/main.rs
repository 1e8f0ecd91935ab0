//! assetline - static-site asset pipeline with a live-reloading dev server.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "assetline")]
#[command(about = "Build and serve static-site assets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to assetline.toml config file
    #[arg(short, long, global = true, default_value = "assetline.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Build markup, then styles, scripts and images
    Build,

    /// Build, then serve with live reload and rebuild on change (default)
    Dev,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command.unwrap_or(Commands::Dev) {
        Commands::Build => commands::build::run(&cli.config).await?,
        Commands::Dev => commands::dev::run(&cli.config).await?,
    }

    Ok(())
}
