//! kickoff deploys a compiled contract to a configured network and waits for it to land.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command, DeployArgs};
use kickoff_deploy::{ArtifactStore, DeploymentEvent, DeploymentRequest, KickoffConfig, deploy};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, stdout carries the deployment report.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    let config = KickoffConfig::load(&cli.config).context("Failed to load configuration")?;

    match cli.command {
        Command::Deploy(args) => run_deploy(config, args).await,
        Command::Networks => {
            list_networks(&config);
            Ok(())
        }
    }
}

async fn run_deploy(config: KickoffConfig, args: DeployArgs) -> Result<()> {
    let profile = config.networks.resolve(args.network.as_deref())?;

    let mut options = config.deploy.clone();
    args.apply(&mut options);

    let artifacts = ArtifactStore::new(args.artifacts.clone().unwrap_or(config.artifacts));
    let request = DeploymentRequest::new(args.contract, args.args);

    tracing::debug!(
        network = %profile.name,
        artifacts = %artifacts.root().display(),
        ?options,
        "Deployment settings"
    );

    let result = deploy(
        profile,
        &request,
        &artifacts,
        &options,
        |event: &DeploymentEvent| println!("{event}"),
    )
    .await?;

    tracing::info!(
        address = %result.contract_address,
        tx_hash = %result.transaction_hash,
        gas_used = ?result.gas_used,
        "Done"
    );

    Ok(())
}

fn list_networks(config: &KickoffConfig) {
    if config.networks.is_empty() {
        tracing::warn!("No network declared");
        return;
    }

    let default = config.networks.default_network();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Name", "RPC URL", "Accounts", "Explorer key", "Default"]);

    for profile in config.networks.iter() {
        table.add_row(vec![
            profile.name.clone(),
            profile.rpc_url.to_string(),
            profile.accounts.len().to_string(),
            if profile.explorer_api_key.is_some() { "yes" } else { "no" }.to_string(),
            if default == Some(profile.name.as_str()) { "*" } else { "" }.to_string(),
        ]);
    }

    println!("{table}");
}
