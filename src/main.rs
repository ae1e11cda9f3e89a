//! plancell CLI entry point.

use anyhow::Result;
use clap::Parser;

use plancell::cli::{commands, handle_error, Cli, Commands};
use plancell::domain::models::Config;
use plancell::infrastructure::config::ConfigLoader;
use plancell::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    if let Err(err) = run(cli).await {
        handle_error(err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, config, cli.json).await,
        Commands::Plan(args) => commands::plan::execute(args, &config, cli.json).await,
        Commands::Ops(args) => commands::ops::execute(args, cli.json).await,
        Commands::Config => commands::config::execute(&config, cli.json),
    }
}

fn init_logging(config: &Config, verbose: u8) -> Result<LoggerImpl> {
    let log_config = LogConfig::from(&config.logging);
    let log_config = match verbose {
        0 => log_config,
        1 => log_config.with_level("debug"),
        _ => log_config.with_level("trace"),
    };
    LoggerImpl::init(&log_config)
}
