//! Command-line interface.
//!
//! clap derive definitions, the per-command handlers and the shared output
//! helpers.

pub mod commands;
pub mod output;
pub mod progress;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "plancell")]
#[command(about = "plancell - LLM-assisted analysis plan runner", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .plancell/config.yaml)
    #[arg(short, long, global = true, env = "PLANCELL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan and run an analysis, appending executed cells to the artifact
    Run(commands::run::RunArgs),

    /// Print the plan for a question without running it
    Plan(commands::plan::PlanArgs),

    /// Show the operation tags and fingerprint of a code file
    Ops(commands::ops::OpsArgs),

    /// Print the effective configuration
    Config,
}

/// Print an error in the requested format and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": chain.get(1..).unwrap_or_default(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", console::style("error:").red().bold());
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_datasets() {
        let cli = Cli::try_parse_from([
            "plancell",
            "run",
            "Which clusters differ between conditions?",
            "-d",
            "ctrl.h5ad",
            "-d",
            "stim.h5ad",
            "--generate-only",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.datasets, vec!["ctrl.h5ad", "stim.h5ad"]);
                assert!(args.generate_only);
                assert!(args.plan_file.is_none());
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["plancell", "-vv", "config"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Config));
    }
}
