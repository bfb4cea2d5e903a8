use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kickoff_deploy::{DEFAULT_CONFIG_FILENAME, DeployOptions};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "kickoff")]
#[command(
    author,
    version,
    about = "Deploy a compiled contract to a configured network in one shot"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "KICKOFF_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Configuration file. Repeat to layer several files; later files take precedence.
    #[arg(
        short,
        long = "config",
        global = true,
        env = "KICKOFF_CONFIG",
        value_delimiter = ',',
        default_value = DEFAULT_CONFIG_FILENAME
    )]
    pub config: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy a contract and wait for its confirmation.
    Deploy(DeployArgs),

    /// List the declared networks.
    Networks,
}

#[derive(clap::Args)]
pub struct DeployArgs {
    /// Contract name, or `path/to/Source.sol:Name` when the name is ambiguous.
    pub contract: String,

    /// Constructor arguments, in declaration order.
    #[arg(allow_negative_numbers = true)]
    pub args: Vec<String>,

    /// The network to deploy to. Defaults to the configured `default_network`.
    #[arg(short, long, env = "KICKOFF_NETWORK")]
    pub network: Option<String>,

    /// Directory holding compiled artifacts (Hardhat or Foundry layout).
    #[arg(short, long, env = "KICKOFF_ARTIFACTS")]
    pub artifacts: Option<PathBuf>,

    /// Seconds to wait for confirmation before giving up.
    #[arg(long, env = "KICKOFF_TIMEOUT", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Blocks, including the inclusion block, before the deployment counts as confirmed.
    #[arg(long, env = "KICKOFF_CONFIRMATIONS", value_parser = clap::value_parser!(u64).range(1..))]
    pub confirmations: Option<u64>,

    /// Fixed gas limit instead of the node's estimate.
    #[arg(long, env = "KICKOFF_GAS_LIMIT")]
    pub gas_limit: Option<u64>,

    /// Fixed gas price in wei instead of the node's suggestion.
    #[arg(long, env = "KICKOFF_GAS_PRICE")]
    pub gas_price: Option<u128>,
}

impl DeployArgs {
    /// Override the configured options with the flags given on the command line.
    pub fn apply(&self, options: &mut DeployOptions) {
        if let Some(secs) = self.timeout {
            options.confirmation_timeout = std::time::Duration::from_secs(secs);
        }
        if let Some(confirmations) = self.confirmations {
            options.confirmations = confirmations;
        }
        if self.gas_limit.is_some() {
            options.gas_limit = self.gas_limit;
        }
        if self.gas_price.is_some() {
            options.gas_price = self.gas_price;
        }
    }
}
