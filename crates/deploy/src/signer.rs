//! Account secrets and the signer that deploys with them.

use std::{fmt, str::FromStr};

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};
use serde_json::json;

use crate::{
    DeployError, DeployOptions,
    rpc::{self, RpcClient},
};

/// Prefix of an account entry that names an environment variable holding the secret.
pub const ENV_REF_PREFIX: &str = "env:";

/// Minimum number of words in a BIP-39 phrase.
const MIN_MNEMONIC_WORDS: usize = 12;

/// A configured account secret.
///
/// The secret material never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub enum AccountSecret {
    /// A raw 32-byte private key, hex encoded.
    PrivateKey(String),
    /// A BIP-39 phrase; the first account of the standard Ethereum path is used.
    Mnemonic(String),
    /// The name of an environment variable holding a private key or a phrase.
    EnvRef(String),
}

impl fmt::Debug for AccountSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountSecret::PrivateKey(_) => f.write_str("PrivateKey(<redacted>)"),
            AccountSecret::Mnemonic(_) => f.write_str("Mnemonic(<redacted>)"),
            AccountSecret::EnvRef(name) => f.debug_tuple("EnvRef").field(name).finish(),
        }
    }
}

impl FromStr for AccountSecret {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.is_empty() {
            return Err("account secret is empty".to_string());
        }

        if let Some(name) = s.strip_prefix(ENV_REF_PREFIX) {
            if name.is_empty() {
                return Err("environment reference has no variable name".to_string());
            }
            return Ok(AccountSecret::EnvRef(name.to_string()));
        }

        let words = s.split_whitespace().count();
        if words > 1 {
            if words < MIN_MNEMONIC_WORDS {
                return Err(format!(
                    "mnemonic has {words} words, expected at least {MIN_MNEMONIC_WORDS}"
                ));
            }
            return Ok(AccountSecret::Mnemonic(
                s.split_whitespace().collect::<Vec<_>>().join(" "),
            ));
        }

        let key = s.strip_prefix("0x").unwrap_or(s);
        if key.len() != 64 {
            return Err("private key must be 64 hex characters (32 bytes)".to_string());
        }
        if hex::decode(key).is_err() {
            return Err("private key must be valid hexadecimal".to_string());
        }

        Ok(AccountSecret::PrivateKey(s.to_string()))
    }
}

impl AccountSecret {
    /// Turn the secret into a signing key, resolving environment references.
    pub fn to_signer(&self) -> Result<PrivateKeySigner, DeployError> {
        match self {
            AccountSecret::PrivateKey(key) => key
                .parse::<PrivateKeySigner>()
                .map_err(|e| DeployError::config(format!("invalid private key: {e}"))),
            AccountSecret::Mnemonic(phrase) => MnemonicBuilder::<English>::default()
                .phrase(phrase.as_str())
                .index(0)
                .and_then(|builder| builder.build())
                .map_err(|e| DeployError::config(format!("invalid mnemonic: {e}"))),
            AccountSecret::EnvRef(name) => {
                let value = std::env::var(name).map_err(|_| {
                    DeployError::config(format!("environment variable '{name}' is not set"))
                })?;
                let secret = value.parse::<AccountSecret>().map_err(|e| {
                    DeployError::config(format!("environment variable '{name}': {e}"))
                })?;
                if let AccountSecret::EnvRef(_) = secret {
                    return Err(DeployError::config(format!(
                        "environment variable '{name}' refers to another variable"
                    )));
                }
                secret.to_signer()
            }
        }
    }
}

/// A deployment transaction that has been accepted by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeployment {
    /// Hash of the submitted transaction.
    pub tx_hash: B256,
    /// Nonce the transaction was signed with.
    pub nonce: u64,
    /// Address the contract lands at if the transaction succeeds.
    pub predicted_address: Address,
    /// Gas limit the transaction was signed with.
    pub gas_limit: u64,
    /// Gas price in wei the transaction was signed with.
    pub gas_price: u128,
}

/// A local signing key bound to a connected RPC endpoint.
#[derive(Debug, Clone)]
pub struct Signer {
    wallet: PrivateKeySigner,
    rpc: RpcClient,
    chain_id: u64,
}

impl Signer {
    /// Materialize `secret` and connect to the endpoint behind `rpc`.
    ///
    /// The secret is checked before any network traffic.
    pub async fn connect(secret: &AccountSecret, rpc: RpcClient) -> Result<Self, DeployError> {
        let wallet = secret.to_signer()?;

        let chain_id = rpc
            .call_u64("eth_chainId", vec![])
            .await
            .map_err(|e| {
                DeployError::from_rpc(
                    &format!("failed to connect to {}", rpc.url()),
                    e,
                    DeployError::network_rejection,
                )
            })?;

        tracing::debug!(address = %wallet.address(), chain_id, "Signer connected");

        Ok(Self {
            wallet,
            rpc,
            chain_id,
        })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    /// The signer's balance in wei at the latest block.
    pub async fn balance(&self) -> Result<U256, DeployError> {
        self.rpc
            .call_u256(
                "eth_getBalance",
                vec![json!(self.address()), json!("latest")],
            )
            .await
            .map_err(|e| {
                DeployError::from_rpc("failed to query balance", e, DeployError::network_rejection)
            })
    }

    /// Sign and submit a contract creation transaction carrying `init_code`.
    ///
    /// Nonce, gas price and gas limit come from the node unless `options` fixes them.
    pub async fn deploy(
        &self,
        init_code: Bytes,
        options: &DeployOptions,
    ) -> Result<PendingDeployment, DeployError> {
        let from = self.address();

        let nonce = self
            .rpc
            .call_u64("eth_getTransactionCount", vec![json!(from), json!("pending")])
            .await
            .map_err(|e| {
                DeployError::from_rpc("failed to fetch nonce", e, DeployError::submission_rejection)
            })?;

        let gas_price = match options.gas_price {
            Some(price) => price,
            None => self
                .rpc
                .call_u128("eth_gasPrice", vec![])
                .await
                .map_err(|e| {
                    DeployError::from_rpc(
                        "failed to fetch gas price",
                        e,
                        DeployError::submission_rejection,
                    )
                })?,
        };

        let gas_limit = match options.gas_limit {
            Some(limit) => limit,
            None => self
                .rpc
                .call_u64(
                    "eth_estimateGas",
                    vec![json!({ "from": from, "data": init_code })],
                )
                .await
                .map_err(|e| {
                    DeployError::from_rpc(
                        "gas estimation failed",
                        e,
                        DeployError::submission_rejection,
                    )
                })?,
        };

        let max_cost = U256::from(gas_limit) * U256::from(gas_price);
        let balance = self.balance().await?;
        if balance < max_cost {
            return Err(DeployError::submission(format!(
                "insufficient balance: {from} holds {balance} wei, deployment may cost up to {max_cost} wei"
            )));
        }

        let mut tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Create,
            value: U256::ZERO,
            input: init_code,
        };

        let signature = self
            .wallet
            .sign_transaction_sync(&mut tx)
            .map_err(|e| DeployError::submission(format!("failed to sign transaction: {e}")))?;

        let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
        let tx_hash = *envelope.tx_hash();
        let raw = rpc::hex_bytes(&envelope.encoded_2718());

        tracing::debug!(%tx_hash, nonce, gas_limit, gas_price, "Submitting deployment transaction");

        let accepted: B256 = self
            .rpc
            .call("eth_sendRawTransaction", vec![json!(raw)])
            .await
            .map_err(|e| {
                DeployError::from_rpc(
                    "deployment transaction rejected",
                    e,
                    DeployError::submission_rejection,
                )
            })?;

        if accepted != tx_hash {
            tracing::warn!(local = %tx_hash, node = %accepted, "Node reported a different transaction hash");
        }

        Ok(PendingDeployment {
            tx_hash: accepted,
            nonce,
            predicted_address: from.create(nonce),
            gas_limit,
            gas_price,
        })
    }
}
