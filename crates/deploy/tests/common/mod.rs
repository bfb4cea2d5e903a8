//! Shared test infrastructure: an in-process JSON-RPC node and artifact fixtures.

#![allow(dead_code)]

use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_core::{
    primitives::{Address, U256, keccak256},
    sol_types::{Revert, SolError},
};
use anyhow::{Context, Result};
use axum::{Json, Router, extract::State, routing::post};
use kickoff_deploy::{DeployOptions, NetworkDeclaration, NetworkProfile};
use serde_json::{Value, json};
use tempdir::TempDir;

/// Hardhat/Anvil dev account #0.
pub const KEY_0: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const ADDRESS_0: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

pub const CHAIN_ID: u64 = 31337;
pub const REVERT_REASON: &str = "Campaign: invalid token";

pub const CAMPAIGN_FACTORY_ABI: &str = r#"[
    {
        "inputs": [{"internalType": "address", "name": "token", "type": "address"}],
        "stateMutability": "nonpayable",
        "type": "constructor"
    },
    {
        "inputs": [],
        "name": "getDeployedCampaigns",
        "outputs": [{"internalType": "address[]", "name": "", "type": "address[]"}],
        "stateMutability": "view",
        "type": "function"
    }
]"#;

pub const INIT_CODE: &str = "0x6080604052348015600f57600080fd5b50603f80601d6000396000f3fe";

/// How the fake node treats the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Include the transaction in block 1.
    Confirm,
    /// Refuse `eth_sendRawTransaction`.
    RejectSubmission,
    /// Accept the transaction but never produce a receipt.
    NeverConfirm,
    /// Include the transaction with a failed status.
    Revert,
    /// Fail the first receipt poll, then behave like `Confirm`.
    FlakyReceipt,
}

#[derive(Debug)]
pub struct NodeState {
    pub behavior: Behavior,
    pub balance: U256,
    /// Returned by `eth_blockNumber`, then incremented.
    pub head: u64,
    pub contract_address: Address,
    pub calls: Vec<String>,
    pub raw_transactions: Vec<Vec<u8>>,
}

type SharedState = Arc<Mutex<NodeState>>;

/// An in-process JSON-RPC node serving `/rpc` on a random local port.
pub struct FakeNode {
    pub url: String,
    pub state: SharedState,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for FakeNode {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FakeNode {
    pub async fn start(behavior: Behavior) -> Result<Self> {
        let deployer: Address = ADDRESS_0.parse()?;
        let state = Arc::new(Mutex::new(NodeState {
            behavior,
            balance: U256::from(1_000_000_000_000_000_000_000u128),
            head: 1,
            contract_address: deployer.create(0),
            calls: Vec::new(),
            raw_transactions: Vec::new(),
        }));

        let app = Router::new()
            .route("/rpc", post(handle_rpc))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind fake node")?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "Fake node stopped");
            }
        });

        Ok(Self {
            url: format!("http://{addr}/rpc"),
            state,
            handle,
        })
    }

    pub fn set_balance(&self, balance: U256) {
        self.state.lock().unwrap().balance = balance;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|m| m.as_str() == method).count()
    }

    pub fn raw_transactions(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().raw_transactions.clone()
    }
}

async fn handle_rpc(State(state): State<SharedState>, Json(request): Json<Value>) -> Json<Value> {
    let id = request["id"].clone();
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let params = request["params"].clone();

    let mut state = state.lock().unwrap();
    state.calls.push(method.clone());

    let outcome: Result<Value, (i64, String, Option<String>)> = match method.as_str() {
        "eth_chainId" => Ok(json!(format!("0x{CHAIN_ID:x}"))),
        "eth_getBalance" => Ok(json!(format!("0x{:x}", state.balance))),
        "eth_getTransactionCount" => Ok(json!("0x0")),
        "eth_gasPrice" => Ok(json!("0x3b9aca00")),
        "eth_estimateGas" => Ok(json!("0x2dc6c0")),
        "eth_blockNumber" => {
            let head = state.head;
            state.head += 1;
            Ok(json!(format!("0x{head:x}")))
        }
        "eth_sendRawTransaction" => {
            if state.behavior == Behavior::RejectSubmission {
                Err((-32000, "nonce too low".to_string(), None))
            } else {
                let raw = params[0].as_str().unwrap_or_default().trim_start_matches("0x");
                let raw = hex::decode(raw).unwrap_or_default();
                let hash = keccak256(&raw);
                state.raw_transactions.push(raw);
                Ok(json!(hash))
            }
        }
        "eth_getTransactionReceipt" => match state.behavior {
            Behavior::NeverConfirm | Behavior::RejectSubmission => Ok(Value::Null),
            Behavior::FlakyReceipt
                if state.calls.iter().filter(|m| m.as_str() == method).count() == 1 =>
            {
                Err((-32603, "header not found".to_string(), None))
            }
            Behavior::Confirm | Behavior::FlakyReceipt => Ok(json!({
                "transactionHash": params[0],
                "blockNumber": "0x1",
                "status": "0x1",
                "contractAddress": state.contract_address,
                "gasUsed": "0x1e240",
            })),
            Behavior::Revert => Ok(json!({
                "transactionHash": params[0],
                "blockNumber": "0x1",
                "status": "0x0",
                "contractAddress": null,
                "gasUsed": "0x1e240",
            })),
        },
        "eth_call" => {
            let data = Revert {
                reason: REVERT_REASON.to_string(),
            }
            .abi_encode();
            Err((
                3,
                format!("execution reverted: {REVERT_REASON}"),
                Some(format!("0x{}", hex::encode(data))),
            ))
        }
        other => Err((-32601, format!("method {other} not found"), None)),
    };

    Json(match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message, data)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message, "data": data },
        }),
    })
}

/// Route library logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A network profile signing with dev account #0.
pub fn profile(name: &str, rpc_url: &str, accounts: &[&str]) -> NetworkProfile {
    NetworkProfile::from_declaration(NetworkDeclaration {
        name: name.to_string(),
        rpc_url: rpc_url.to_string(),
        accounts: accounts.iter().map(|a| a.to_string()).collect(),
        explorer_api_key: None,
    })
    .expect("valid test profile")
}

/// Options with short waits so failing tests fail fast.
pub fn fast_options() -> DeployOptions {
    DeployOptions {
        confirmation_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(20),
        request_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

/// Write a Hardhat artifact for `CampaignFactory` under `root`.
pub fn write_campaign_factory(root: &Path) -> Result<()> {
    let dir = root.join("contracts/CampaignFactory.sol");
    std::fs::create_dir_all(&dir)?;
    std::fs::write(
        dir.join("CampaignFactory.json"),
        format!(
            r#"{{"_format": "hh-sol-artifact-1", "contractName": "CampaignFactory", "sourceName": "contracts/CampaignFactory.sol", "abi": {CAMPAIGN_FACTORY_ABI}, "bytecode": "{INIT_CODE}", "deployedBytecode": "0x", "linkReferences": {{}}, "deployedLinkReferences": {{}}}}"#
        ),
    )?;
    Ok(())
}

/// A temporary artifacts directory holding `CampaignFactory`.
pub fn artifacts_dir() -> Result<TempDir> {
    let tmp = TempDir::new("kickoff-artifacts")?;
    write_campaign_factory(tmp.path())?;
    Ok(tmp)
}
