// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use lurepl_cli::commands::{self, build::BuildArgs};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lurepl")]
#[command(author = "Maravilla Labs")]
#[command(version)]
#[command(about = "Build worker and dev server for Lua component playgrounds", long_about = None)]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the playground server (WebSocket worker, tool artifacts, static files)
    Serve {
        /// Port to run the server on (overrides lurepl.toml)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to (overrides lurepl.toml)
        #[arg(long)]
        host: Option<String>,
    },
    /// Run one build cycle over a directory of Lua sources
    Build {
        #[command(flatten)]
        args: BuildArgs,
    },
    /// Rebuild a directory of Lua sources on every change
    Watch {
        /// Source directory
        dir: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = "dist")]
        output: PathBuf,
        /// Use the embedded tool artifacts instead of fetching them
        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(host, port).await,
        Commands::Build { args } => commands::build::run(args).await,
        Commands::Watch { dir, output, offline } => commands::watch::run(&dir, &output, offline).await,
    }
}
