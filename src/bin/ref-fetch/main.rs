//! ref-fetch CLI - fetch the upstream source of a project's dependencies

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, ColorArg, Commands, MessageFormat};
use ref_fetch::util::shell::{ColorChoice, Shell};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging; RUST_LOG wins when set
    let default_filter = if cli.verbose {
        "ref_fetch=debug"
    } else if cli.quiet {
        "ref_fetch=error"
    } else {
        "ref_fetch=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let color = match cli.color {
        ColorArg::Auto => ColorChoice::Auto,
        ColorArg::Always => ColorChoice::Always,
        ColorArg::Never => ColorChoice::Never,
    };
    let shell = Arc::new(Shell::from_flags(
        cli.quiet,
        cli.verbose,
        color,
        cli.message_format == MessageFormat::Json,
    ));

    // Execute command
    match cli.command {
        Commands::Fetch(args) => commands::fetch::execute(args, &shell),
        Commands::Cache(args) => commands::cache::execute(args, &shell),
        Commands::Completions(args) => commands::completions::execute(args).map(|()| ExitCode::SUCCESS),
    }
}
