//! pushkey CLI - least-privilege CI credentials for ECR pushes
//!
//! This is the main entry point for the pushkey command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (required for rustls 0.23+)
    // This must be done before any TLS operations
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Deploy => commands::deploy::run(config, &cli.aws).await,
        Commands::Init(args) => commands::init::run(args, config, &cli.aws).await,
        Commands::Plan(args) => commands::plan::run(args, config, &cli.aws).await,
        Commands::Apply(args) => commands::apply::run(args, config, &cli.aws).await,
        Commands::Output(args) => commands::outputs::run(args, config),
        Commands::Destroy(args) => commands::destroy::run(args, config, &cli.aws).await,
        Commands::Policy(args) => commands::policy::run(args, config, &cli.aws).await,
        Commands::State(args) => commands::state::run(args, config),
        Commands::Completions(args) => commands::completions::run(args),
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
