//! Deployment stage markers for the type-state pipeline.
//!
//! The order is fixed: Idle -> SignerResolved -> FactoryResolved ->
//! TransactionSubmitted -> Confirmed. Each stage carries what the next one needs,
//! so a transition can only be called from the stage that precedes it.

use alloy_core::primitives::{Bytes, U256};

use crate::{ContractFactory, DeploymentResult, NetworkProfile, PendingDeployment, Signer};

/// Nothing has touched the network yet.
#[derive(Debug, Clone)]
pub struct Idle {
    pub(crate) profile: NetworkProfile,
}

/// The signer is materialized and its endpoint answered.
#[derive(Debug, Clone)]
pub struct SignerResolved {
    pub(crate) signer: Signer,
}

/// The contract artifact is loaded and the signer's balance is known.
#[derive(Debug, Clone)]
pub struct FactoryResolved {
    pub(crate) signer: Signer,
    pub(crate) balance: U256,
    pub(crate) factory: ContractFactory,
    pub(crate) constructor_args: Vec<String>,
}

/// The deployment transaction was accepted by the node.
#[derive(Debug, Clone)]
pub struct TransactionSubmitted {
    pub(crate) signer: Signer,
    pub(crate) contract: String,
    pub(crate) init_code: Bytes,
    pub(crate) pending: PendingDeployment,
}

/// The deployment is included and deep enough. Terminal.
#[derive(Debug, Clone)]
pub struct Confirmed {
    pub(crate) result: DeploymentResult,
}

/// Sealed trait for deployment stages.
mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Idle {}
    impl Sealed for super::SignerResolved {}
    impl Sealed for super::FactoryResolved {}
    impl Sealed for super::TransactionSubmitted {}
    impl Sealed for super::Confirmed {}
}

/// Marker trait for valid deployment stages.
pub trait DeploymentStage: sealed::Sealed + Send + Sync + 'static {
    /// Stage name for logs.
    const NAME: &'static str;
}

impl DeploymentStage for Idle {
    const NAME: &'static str = "idle";
}

impl DeploymentStage for SignerResolved {
    const NAME: &'static str = "signer-resolved";
}

impl DeploymentStage for FactoryResolved {
    const NAME: &'static str = "factory-resolved";
}

impl DeploymentStage for TransactionSubmitted {
    const NAME: &'static str = "transaction-submitted";
}

impl DeploymentStage for Confirmed {
    const NAME: &'static str = "confirmed";
}
