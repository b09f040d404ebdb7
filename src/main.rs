mod assets;
mod audit;
mod cli;
mod commands;
mod config;
mod engine;
mod paths;
mod stack;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
    pub parameters: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
        parameters: cli.parameters,
    };

    match cli.command {
        Command::Synth(args) => commands::synth::run(&ctx, args),
        Command::Plan(args) => commands::plan::run(&ctx, args),
        Command::Diff(args) => commands::deploy::diff(&ctx, args),
        Command::Apply(args) => commands::deploy::apply(&ctx, args),
        Command::Destroy(args) => commands::deploy::destroy(&ctx, args),
        Command::Outputs => commands::outputs::run(&ctx),
        Command::Audit => commands::audit::run(&ctx),
        Command::Graph => commands::graph::run(&ctx),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "vfstack", &mut io::stdout());
            Ok(())
        }
    }
}
