use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vfstack")]
#[command(version)]
#[command(about = "Resource graph for the Voice Focus media processing stack", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (vfstack.toml or vfstack.json)
    #[arg(short, long, global = true, env = "VFSTACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Stack parameter override, e.g. -p maxFleetCapacity=3
    #[arg(short, long = "parameter", value_name = "NAME=VALUE", global = true)]
    pub parameters: Vec<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Render the stack template
    Synth(SynthArgs),

    /// Show the creation waves of the stack
    Plan(PlanArgs),

    /// Preview what apply would change
    Diff(DiffArgs),

    /// Reconcile the deployment ledger with the stack
    Apply(ApplyArgs),

    /// Remove every recorded resource
    Destroy(DestroyArgs),

    /// Show the stack outputs
    Outputs,

    /// Check grants and flagged defaults
    Audit,

    /// Print the dependency graph in Graphviz dot format
    Graph,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct SynthArgs {
    /// Directory to write the template into (defaults to the configured output dir)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Substitute parameters, account and region instead of keeping references
    #[arg(long)]
    pub resolved: bool,

    /// Print the template instead of writing it
    #[arg(long)]
    pub stdout: bool,
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Only plan matching resources and their dependencies (e.g. sqs, autoscaling.asg)
    pub target: Option<String>,
}

#[derive(Parser)]
pub struct DiffArgs {
    /// Only diff matching resources (e.g. s3, lambda.Function)
    pub target: Option<String>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Only apply matching resources and their dependencies
    pub target: Option<String>,

    /// Dry run - show what would be done
    #[arg(short, long)]
    pub dry_run: bool,

    /// Number of parallel jobs per wave
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_parameters() {
        let cli = Cli::parse_from([
            "vfstack",
            "apply",
            "-p",
            "maxFleetCapacity=3",
            "--parameter",
            "bucketNamePrefix=demo",
            "-y",
        ]);
        assert_eq!(cli.parameters, ["maxFleetCapacity=3", "bucketNamePrefix=demo"]);
        match cli.command {
            Command::Apply(args) => {
                assert!(args.yes);
                assert_eq!(args.jobs, 4);
            }
            _ => panic!("expected apply"),
        }
    }
}
