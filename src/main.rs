use std::io;
use std::process;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::generate;
use tracing::error;

use rollout::cli::{self, Cli, Commands};

fn main() -> Result<()> {
    let args = cli::parse_args()?;

    rollout::init_logging(args.command.log_level())?;

    match &args.command {
        Commands::Plan(opts) => {
            if let Err(e) = rollout::run_plan(opts) {
                error!("error planning upgrade: {:#}", e);
                process::exit(1);
            }
        }
        Commands::Upgrade(opts) => {
            if let Err(e) = rollout::run_upgrade(opts) {
                error!("error running upgrade: {:#}", e);
                process::exit(1);
            }
        }
        Commands::Validate(opts) => {
            if let Err(e) = rollout::run_validate(opts) {
                error!("error validating manifest: {:#}", e);
                process::exit(1);
            }
        }
        Commands::Drivers(_) => {
            if let Err(e) = rollout::run_drivers() {
                error!("error listing drivers: {:#}", e);
                process::exit(1);
            }
        }
        Commands::Completions(opts) => {
            generate(opts.shell, &mut Cli::command(), "rollout", &mut io::stdout());
        }
    }

    Ok(())
}
