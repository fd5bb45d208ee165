//! Keg CLI - build and install packages from formula files

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use keg::util::diagnostic::emit;
use keg::PipelineError;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let color = !cli.global.no_color && std::io::stderr().is_terminal();

    // Set up logging
    let default_filter = if cli.global.verbose {
        "keg=debug"
    } else {
        "keg=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_ansi(color)
        .init();

    if let Err(e) = run(cli) {
        match e.downcast_ref::<PipelineError>() {
            Some(err) => {
                emit(&err.to_diagnostic(), color);
                std::process::exit(err.exit_code());
            }
            None => {
                eprintln!("error: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let global = cli.global;

    // Execute command
    match cli.command {
        Commands::Install(args) => commands::install::execute(args, &global),
        Commands::Test(args) => commands::test::execute(args, &global),
        Commands::Plan(args) => commands::plan::execute(args, &global),
        Commands::Info(args) => commands::info::execute(args, &global),
        Commands::Outdated(args) => commands::outdated::execute(args, &global),
        Commands::Fetch(args) => commands::fetch::execute(args, &global),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
