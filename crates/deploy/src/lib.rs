//! kickoff-deploy - One-shot contract deployment library.
//!
//! This crate resolves a network from a validated configuration, materializes a
//! signer, loads a compiled contract artifact, and deploys it with constructor
//! arguments, waiting for on-chain confirmation.
//!
//! # Example
//!
//! ```no_run
//! use kickoff_deploy::{ArtifactStore, DeploymentRequest, KickoffConfig, deploy};
//!
//! # async fn example() -> Result<(), kickoff_deploy::DeployError> {
//! let config = KickoffConfig::load(&["kickoff.toml"])?;
//! let profile = config.networks.resolve(Some("local"))?;
//! let request = DeploymentRequest::new(
//!     "CampaignFactory",
//!     vec!["0x287d7FaA9Da37CB3E8F5B26B2F4318bAB0346060".to_string()],
//! );
//!
//! let result = deploy(
//!     profile,
//!     &request,
//!     &ArtifactStore::new(&config.artifacts),
//!     &config.deploy,
//!     |event: &kickoff_deploy::DeploymentEvent| println!("{event}"),
//! )
//! .await?;
//! println!("deployed at {}", result.contract_address);
//! # Ok(())
//! # }
//! ```

mod artifact;
mod config;
mod deployment;
mod error;
pub mod rpc;
mod signer;
pub mod stages;

pub use artifact::{ArtifactStore, ContractFactory};
pub use config::{
    ConfigFile, DEFAULT_ARTIFACTS_DIR, DEFAULT_CONFIG_FILENAME, DeployOptions, DeploySection,
    ENV_PREFIX, KickoffConfig, NetworkDeclaration, NetworkProfile, NetworkRegistry,
};
pub use deployment::{
    Deployment, DeploymentEvent, DeploymentRequest, DeploymentResult, Reporter, Silent, deploy,
};
pub use error::{DeployError, ErrorKind};
pub use signer::{AccountSecret, ENV_REF_PREFIX, PendingDeployment, Signer};
