//! addonctl CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use addonctl_common::DEFAULT_CONFIG_FILE;
use commands::run::{execute, RunOptions};

/// addonctl - manage the Kubernetes addons that make up the cluster platform
#[derive(Parser, Debug)]
#[command(name = "addonctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// The config file to load
    #[arg(long = "config-file", global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,

    /// Print the plan and log every step without touching the cluster
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage addons on an AWS hosted cluster
    Aws(commands::aws::AwsArgs),
    /// Manage addons on a Google hosted cluster
    Gcp(commands::gcp::GcpArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let invocation = match self.command {
            Commands::Aws(args) => args.invocation(),
            Commands::Gcp(args) => args.invocation(),
        };
        let options = RunOptions {
            config_file: &self.config_file,
            dry_run: self.dry_run,
        };
        execute(options, invocation).await
    }
}
