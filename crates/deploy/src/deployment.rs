//! The deployment orchestrator.
//!
//! A [`Deployment`] walks through the stages in [`crate::stages`], one network call
//! at a time. Every failure is terminal: there is no retry and nothing to roll back,
//! since a deployment either exists at an address or has no effect.

use std::fmt;

use alloy_core::{
    primitives::{Address, B256, U256, utils::format_ether},
    sol_types::decode_revert_reason,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::{sleep, timeout};

use crate::{
    ArtifactStore, DeployError, DeployOptions, NetworkProfile, Signer,
    rpc::{self, RpcClient, RpcError},
    stages::{
        Confirmed, DeploymentStage, FactoryResolved, Idle, SignerResolved, TransactionSubmitted,
    },
};

/// What to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Contract name, or `path/to/Source.sol:Name`.
    pub contract: String,
    /// Constructor arguments, coerced to the constructor's parameter types.
    pub constructor_args: Vec<String>,
}

impl DeploymentRequest {
    pub fn new(contract: impl Into<String>, constructor_args: Vec<String>) -> Self {
        Self {
            contract: contract.into(),
            constructor_args,
        }
    }
}

/// The outcome of a confirmed deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub contract: String,
    pub network: String,
    pub contract_address: Address,
    pub transaction_hash: B256,
    pub block_number: u64,
    pub gas_used: Option<u64>,
    pub confirmed: bool,
}

/// Progress reported to the operator while a deployment runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentEvent {
    Connected {
        network: String,
        chain_id: u64,
        address: Address,
    },
    Balance {
        address: Address,
        balance: U256,
    },
    Submitted {
        contract: String,
        tx_hash: B256,
        predicted_address: Address,
    },
    Confirmed(DeploymentResult),
}

impl fmt::Display for DeploymentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentEvent::Connected {
                network,
                chain_id,
                address,
            } => {
                writeln!(f, "Network: {network} (chain id {chain_id})")?;
                write!(f, "Deploying contracts with the account: {address}")
            }
            DeploymentEvent::Balance { balance, .. } => {
                write!(f, "Account balance: {balance} wei ({} ETH)", format_ether(*balance))
            }
            DeploymentEvent::Submitted { contract, tx_hash, .. } => {
                write!(f, "{contract} deployment transaction: {tx_hash}")
            }
            DeploymentEvent::Confirmed(result) => {
                write!(
                    f,
                    "{} address: {} (block {})",
                    result.contract, result.contract_address, result.block_number
                )
            }
        }
    }
}

/// Receives [`DeploymentEvent`]s as the deployment advances.
pub trait Reporter {
    fn report(&mut self, event: &DeploymentEvent);
}

impl<F> Reporter for F
where
    F: FnMut(&DeploymentEvent),
{
    fn report(&mut self, event: &DeploymentEvent) {
        self(event)
    }
}

/// A reporter that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Reporter for Silent {
    fn report(&mut self, _event: &DeploymentEvent) {}
}

/// A deployment at stage `S`.
pub struct Deployment<S: DeploymentStage, R: Reporter = Silent> {
    network: String,
    options: DeployOptions,
    reporter: R,
    stage: S,
}

impl<S: DeploymentStage, R: Reporter> Deployment<S, R> {
    fn advance<N: DeploymentStage>(self, stage: N) -> Deployment<N, R> {
        tracing::debug!(network = %self.network, from = S::NAME, to = N::NAME, "Deployment stage transition");
        Deployment {
            network: self.network,
            options: self.options,
            reporter: self.reporter,
            stage,
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Name of the current stage.
    pub fn stage_name(&self) -> &'static str {
        S::NAME
    }
}

impl<R: Reporter> Deployment<Idle, R> {
    /// Prepare a deployment on `profile`.
    pub fn new(profile: NetworkProfile, options: DeployOptions, reporter: R) -> Self {
        Self {
            network: profile.name.clone(),
            options,
            reporter,
            stage: Idle { profile },
        }
    }

    /// Materialize the first account of the profile and connect to its endpoint.
    pub async fn resolve_signer(mut self) -> Result<Deployment<SignerResolved, R>, DeployError> {
        let profile = &self.stage.profile;
        let account = profile.deployer_account()?;

        let rpc = RpcClient::new(profile.rpc_url.as_str(), self.options.request_timeout)
            .map_err(|e| DeployError::Network {
                message: format!("failed to set up RPC client: {e}"),
                source: Some(e),
            })?;

        tracing::info!(network = %profile.name, rpc_url = %profile.rpc_url, "Connecting to network...");

        let signer = Signer::connect(account, rpc).await?;

        self.reporter.report(&DeploymentEvent::Connected {
            network: self.network.clone(),
            chain_id: signer.chain_id(),
            address: signer.address(),
        });

        Ok(self.advance(SignerResolved { signer }))
    }
}

impl<R: Reporter> Deployment<SignerResolved, R> {
    pub fn signer(&self) -> &Signer {
        &self.stage.signer
    }

    /// Query the signer's balance, then load the requested artifact.
    ///
    /// The balance is informational; an empty account still proceeds.
    pub async fn resolve_factory(
        mut self,
        request: &DeploymentRequest,
        artifacts: &ArtifactStore,
    ) -> Result<Deployment<FactoryResolved, R>, DeployError> {
        let signer = self.stage.signer.clone();
        let balance = signer.balance().await?;

        tracing::info!(address = %signer.address(), %balance, "Deployer account");
        self.reporter.report(&DeploymentEvent::Balance {
            address: signer.address(),
            balance,
        });

        let factory = artifacts.factory(&request.contract)?;

        tracing::info!(
            contract = %factory.name,
            artifact = %factory.path.display(),
            bytecode_len = factory.bytecode.len(),
            "Contract factory resolved"
        );

        Ok(self.advance(FactoryResolved {
            signer,
            balance,
            factory,
            constructor_args: request.constructor_args.clone(),
        }))
    }
}

impl<R: Reporter> Deployment<FactoryResolved, R> {
    pub fn balance(&self) -> U256 {
        self.stage.balance
    }

    /// Encode the constructor call, sign it and hand it to the node.
    pub async fn submit(mut self) -> Result<Deployment<TransactionSubmitted, R>, DeployError> {
        let FactoryResolved {
            signer,
            factory,
            constructor_args,
            ..
        } = self.stage.clone();

        let init_code = factory.deploy_data(&constructor_args)?;

        tracing::info!(
            contract = %factory.name,
            args = ?constructor_args,
            "Sending deployment transaction..."
        );

        let pending = signer.deploy(init_code.clone(), &self.options).await?;

        tracing::info!(
            tx_hash = %pending.tx_hash,
            nonce = pending.nonce,
            predicted_address = %pending.predicted_address,
            "Deployment transaction submitted"
        );
        self.reporter.report(&DeploymentEvent::Submitted {
            contract: factory.name.clone(),
            tx_hash: pending.tx_hash,
            predicted_address: pending.predicted_address,
        });

        Ok(self.advance(TransactionSubmitted {
            signer,
            contract: factory.name,
            init_code,
            pending,
        }))
    }
}

/// The subset of a transaction receipt the orchestrator needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    block_number: Option<String>,
    status: Option<String>,
    contract_address: Option<Address>,
    gas_used: Option<String>,
}

impl<R: Reporter> Deployment<TransactionSubmitted, R> {
    pub fn tx_hash(&self) -> B256 {
        self.stage.pending.tx_hash
    }

    /// Wait for the transaction to be included and `confirmations` blocks deep.
    ///
    /// Failed polls are logged and polling continues until the confirmation timeout.
    pub async fn confirm(mut self) -> Result<Deployment<Confirmed, R>, DeployError> {
        let tx_hash = self.stage.pending.tx_hash;
        let bound = self.options.confirmation_timeout;

        tracing::info!(
            %tx_hash,
            confirmations = self.options.confirmations,
            timeout_secs = bound.as_secs(),
            "Waiting for confirmation..."
        );

        let mut last_error = None;
        let waited = timeout(bound, self.wait_for_receipt(&mut last_error)).await;
        let (receipt, block_number) = match waited {
            Ok(found) => found,
            Err(_) => {
                return Err(DeployError::ConfirmationTimeout {
                    tx_hash,
                    timeout: bound,
                    last_error,
                });
            }
        };

        if receipt.status.as_deref().and_then(|s| rpc::parse_u64(s).ok()) == Some(0) {
            let reason = self.revert_reason(block_number).await;
            return Err(DeployError::Revert { tx_hash, reason });
        }

        let predicted = self.stage.pending.predicted_address;
        let contract_address = match receipt.contract_address {
            Some(address) => {
                if address != predicted {
                    tracing::warn!(%address, %predicted, "Receipt contract address differs from the CREATE prediction");
                }
                address
            }
            None => {
                tracing::warn!(%predicted, "Receipt carries no contract address, using the CREATE prediction");
                predicted
            }
        };

        let result = DeploymentResult {
            contract: self.stage.contract.clone(),
            network: self.network.clone(),
            contract_address,
            transaction_hash: tx_hash,
            block_number,
            gas_used: receipt.gas_used.as_deref().and_then(|g| rpc::parse_u64(g).ok()),
            confirmed: true,
        };

        tracing::info!(
            contract = %result.contract,
            address = %result.contract_address,
            block = result.block_number,
            "Deployment confirmed"
        );
        self.reporter.report(&DeploymentEvent::Confirmed(result.clone()));

        Ok(self.advance(Confirmed { result }))
    }

    /// Poll until a receipt is found and deep enough. Returns it with its block number.
    async fn wait_for_receipt(&self, last_error: &mut Option<String>) -> (Receipt, u64) {
        let rpc = self.stage.signer.rpc();
        let tx_hash = self.stage.pending.tx_hash;

        loop {
            match self.poll_once(rpc, tx_hash).await {
                Ok(Some(found)) => return found,
                Ok(None) => {
                    tracing::trace!(%tx_hash, "Transaction not confirmed yet");
                }
                Err(e) => {
                    tracing::warn!(%tx_hash, error = %e, "Receipt poll failed, retrying...");
                    *last_error = Some(e.to_string());
                }
            }

            sleep(self.options.poll_interval).await;
        }
    }

    async fn poll_once(
        &self,
        rpc: &RpcClient,
        tx_hash: B256,
    ) -> Result<Option<(Receipt, u64)>, RpcError> {
        let receipt: Option<Receipt> = rpc
            .call("eth_getTransactionReceipt", vec![json!(tx_hash)])
            .await?;

        let Some(receipt) = receipt else {
            return Ok(None);
        };
        let Some(block_number) = receipt.block_number.as_deref() else {
            return Ok(None);
        };
        let block_number = rpc::parse_u64(block_number).map_err(|message| RpcError::Decode {
            method: "eth_getTransactionReceipt".to_string(),
            message,
        })?;

        if self.options.confirmations > 1 {
            let head = rpc.call_u64("eth_blockNumber", vec![]).await?;
            let depth = head.saturating_sub(block_number) + 1;
            if depth < self.options.confirmations {
                tracing::debug!(block_number, head, depth, "Waiting for more confirmations");
                return Ok(None);
            }
        }

        Ok(Some((receipt, block_number)))
    }

    /// Replay the creation at the parent block to recover why it reverted.
    async fn revert_reason(&self, block_number: u64) -> Option<String> {
        let rpc = self.stage.signer.rpc();
        let call = json!({
            "from": self.stage.signer.address(),
            "data": self.stage.init_code,
            "gas": rpc::quantity(self.stage.pending.gas_limit),
        });
        let at = rpc::quantity(block_number.saturating_sub(1));

        match rpc.call::<serde_json::Value>("eth_call", vec![call, json!(at)]).await {
            Ok(_) => {
                tracing::debug!("Replaying the reverted deployment succeeded, no reason available");
                None
            }
            Err(RpcError::Rejected { message, data, .. }) => data
                .as_deref()
                .and_then(|data| hex::decode(data.trim_start_matches("0x")).ok())
                .and_then(|data| decode_revert_reason(&data))
                .or(Some(message)),
            Err(e) => {
                tracing::debug!(error = %e, "Could not replay the reverted deployment");
                None
            }
        }
    }
}

impl<R: Reporter> Deployment<Confirmed, R> {
    pub fn result(&self) -> &DeploymentResult {
        &self.stage.result
    }

    pub fn into_result(self) -> DeploymentResult {
        self.stage.result
    }
}

/// Run a deployment from start to confirmation.
pub async fn deploy<R: Reporter>(
    profile: &NetworkProfile,
    request: &DeploymentRequest,
    artifacts: &ArtifactStore,
    options: &DeployOptions,
    reporter: R,
) -> Result<DeploymentResult, DeployError> {
    tracing::info!(
        network = %profile.name,
        contract = %request.contract,
        "Starting deployment..."
    );

    let confirmed = Deployment::new(profile.clone(), options.clone(), reporter)
        .resolve_signer()
        .await?
        .resolve_factory(request, artifacts)
        .await?
        .submit()
        .await?
        .confirm()
        .await?;

    Ok(confirmed.into_result())
}
