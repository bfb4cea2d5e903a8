//! Tests running the compiled `kickoff` binary.
//!
//! Run with: cargo test -p kickoff --test cli_test

#[path = "../../../crates/deploy/tests/common/mod.rs"]
mod common;

use std::path::PathBuf;
use std::process::{Command, Output};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use common::{ADDRESS_0, Behavior, FakeNode, KEY_0};
use tempdir::TempDir;

/// A temporary directory holding a configuration file.
struct TestContext {
    dir: TempDir,
    config_path: PathBuf,
}

impl TestContext {
    fn new(config: &str) -> Result<Self> {
        let dir = TempDir::new("kickoff-cli")?;
        let config_path = dir.path().join("kickoff.toml");
        std::fs::write(&config_path, config).context("Failed to write config")?;
        std::fs::create_dir_all(dir.path().join("artifacts"))?;

        Ok(Self { dir, config_path })
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        self.command(args).output().context("Failed to run kickoff")
    }

    /// The `kickoff` invocation, isolated from any `KICKOFF_*` variable of the caller.
    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_kickoff"));
        for (var, _) in std::env::vars().filter(|(var, _)| var.starts_with("KICKOFF_")) {
            command.env_remove(var);
        }

        command
            .current_dir(self.dir.path())
            .arg("--config")
            .arg(&self.config_path)
            .args(args);
        command
    }
}

fn unreachable_config() -> String {
    format!(
        r#"
default_network = "local"

[[networks]]
name = "local"
rpc_url = "http://127.0.0.1:1/rpc"
accounts = ["{KEY_0}"]

[[networks]]
name = "truffledashboard"
rpc_url = "http://localhost:24012/rpc"
"#
    )
}

#[test]
fn test_unreachable_endpoint_exits_with_network_error() -> Result<()> {
    let ctx = TestContext::new(&unreachable_config())?;

    let output = ctx.run(&[
        "deploy",
        "CampaignFactory",
        "0x287d7FaA9Da37CB3E8F5B26B2F4318bAB0346060",
    ])?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1), "stderr: {stderr}");
    assert!(stderr.contains("NetworkError"), "stderr: {stderr}");
    assert!(output.stdout.is_empty());

    Ok(())
}

#[test]
fn test_unknown_network_exits_with_configuration_error() -> Result<()> {
    let ctx = TestContext::new(&unreachable_config())?;

    let output = ctx.run(&["deploy", "CampaignFactory", "--network", "polygonMumbai"])?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("ConfigurationError"), "stderr: {stderr}");
    assert!(stderr.contains("polygonMumbai"), "stderr: {stderr}");

    Ok(())
}

#[test]
fn test_network_without_accounts_exits_with_configuration_error() -> Result<()> {
    let ctx = TestContext::new(&unreachable_config())?;

    let output = ctx.run(&["deploy", "CampaignFactory", "--network", "truffledashboard"])?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("ConfigurationError"), "stderr: {stderr}");

    Ok(())
}

#[test]
fn test_duplicate_network_exits_with_configuration_error() -> Result<()> {
    let config = format!(
        "{}\n[[networks]]\nname = \"local\"\nrpc_url = \"http://127.0.0.1:2/rpc\"\naccounts = [\"{KEY_0}\"]\n",
        unreachable_config()
    );
    let ctx = TestContext::new(&config)?;

    let output = ctx.run(&["networks"])?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("ConfigurationError"), "stderr: {stderr}");

    Ok(())
}

#[test]
fn test_networks_lists_declarations() -> Result<()> {
    let ctx = TestContext::new(&unreachable_config())?;

    let output = ctx.run(&["networks"])?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("local"));
    assert!(stdout.contains("truffledashboard"));
    assert!(stdout.contains("http://localhost:24012/rpc"));
    // Secrets never reach the listing.
    assert!(!stdout.contains(&KEY_0[2..]));

    Ok(())
}

#[test]
fn test_missing_config_file() -> Result<()> {
    let ctx = TestContext::new("")?;
    std::fs::remove_file(&ctx.config_path)?;

    let output = ctx.run(&["networks"])?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("ConfigurationError"), "stderr: {stderr}");

    Ok(())
}

/// Start a fake node and a context whose `local` network points at it.
async fn local_deployment(behavior: Behavior) -> Result<(FakeNode, TestContext)> {
    let node = FakeNode::start(behavior).await?;
    let ctx = TestContext::new(&format!(
        r#"
default_network = "local"

[[networks]]
name = "local"
rpc_url = "{}"
accounts = ["{KEY_0}"]

[deploy]
poll_interval_ms = 20
confirmation_timeout_secs = 10
"#,
        node.url
    ))?;
    common::write_campaign_factory(&ctx.dir.path().join("artifacts"))?;

    Ok((node, ctx))
}

/// Deploy `CampaignFactory` without blocking the runtime serving the fake node.
async fn deploy_campaign_factory(ctx: &TestContext) -> Result<Output> {
    tokio::process::Command::from(ctx.command(&[
        "deploy",
        "CampaignFactory",
        "0x287d7FaA9Da37CB3E8F5B26B2F4318bAB0346060",
    ]))
    .output()
    .await
    .context("Failed to run kickoff")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deploy_reports_address_and_exits_zero() -> Result<()> {
    let (node, ctx) = local_deployment(Behavior::Confirm).await?;

    let output = deploy_campaign_factory(&ctx).await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(0), "stderr: {stderr}");

    let deployed = ADDRESS_0.parse::<Address>()?.create(0);
    assert!(
        stdout.contains(&format!("Deploying contracts with the account: {ADDRESS_0}")),
        "stdout: {stdout}"
    );
    assert!(stdout.contains("Account balance: 1000000000000000000000 wei"), "stdout: {stdout}");
    assert!(
        stdout.contains(&format!("CampaignFactory address: {deployed}")),
        "stdout: {stdout}"
    );
    assert_eq!(node.count("eth_sendRawTransaction"), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_receipt_poll_is_logged() -> Result<()> {
    let (node, ctx) = local_deployment(Behavior::FlakyReceipt).await?;

    let output = deploy_campaign_factory(&ctx).await?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(0), "stderr: {stderr}");
    assert!(stderr.contains("Receipt poll failed"), "stderr: {stderr}");
    assert!(stderr.contains("header not found"), "stderr: {stderr}");
    assert!(node.count("eth_getTransactionReceipt") >= 2);

    Ok(())
}
