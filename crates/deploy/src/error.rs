//! Error taxonomy for a deployment run.

use std::time::Duration;

use alloy_core::primitives::B256;

use crate::rpc::RpcError;

/// The kind of a [`DeployError`], named the way it is reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
pub enum ErrorKind {
    #[strum(serialize = "ConfigurationError")]
    Configuration,
    #[strum(serialize = "NetworkError")]
    Network,
    #[strum(serialize = "ArtifactNotFoundError")]
    ArtifactNotFound,
    #[strum(serialize = "SubmissionError")]
    Submission,
    #[strum(serialize = "ConfirmationTimeoutError")]
    ConfirmationTimeout,
    #[strum(serialize = "RevertError")]
    Revert,
}

/// Errors that terminate a deployment run.
///
/// Every variant is fatal for the invocation. The rendered message always starts
/// with the kind name so it can be matched in the operator's error channel.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Missing or invalid network, account, or file configuration.
    #[error("ConfigurationError: {0}")]
    Configuration(String),

    /// The RPC endpoint could not be reached or answered garbage.
    #[error("NetworkError: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<RpcError>,
    },

    /// The named contract has no deployable compiled artifact.
    #[error("ArtifactNotFoundError: {0}")]
    ArtifactNotFound(String),

    /// The deployment transaction was rejected before inclusion.
    #[error("SubmissionError: {message}")]
    Submission {
        message: String,
        #[source]
        source: Option<RpcError>,
    },

    /// The transaction was not observed as confirmed within the bound. It may still land.
    #[error(
        "ConfirmationTimeoutError: transaction {tx_hash} not confirmed within {}s{}",
        .timeout.as_secs_f64(),
        .last_error.as_ref().map(|e| format!(" (last poll error: {e})")).unwrap_or_default()
    )]
    ConfirmationTimeout {
        tx_hash: B256,
        timeout: Duration,
        last_error: Option<String>,
    },

    /// The deployment transaction was included but its execution reverted.
    #[error(
        "RevertError: deployment transaction {tx_hash} reverted: {}",
        .reason.as_deref().unwrap_or("no revert reason available")
    )]
    Revert { tx_hash: B256, reason: Option<String> },
}

impl DeployError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::Configuration(_) => ErrorKind::Configuration,
            DeployError::Network { .. } => ErrorKind::Network,
            DeployError::ArtifactNotFound(_) => ErrorKind::ArtifactNotFound,
            DeployError::Submission { .. } => ErrorKind::Submission,
            DeployError::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
            DeployError::Revert { .. } => ErrorKind::Revert,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        DeployError::Configuration(message.into())
    }

    pub(crate) fn submission(message: impl Into<String>) -> Self {
        DeployError::Submission {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an RPC failure that happened while performing `action`.
    ///
    /// Transport and decoding failures are network errors whatever the step. A
    /// rejection by the node is attributed with `on_rejection`.
    pub(crate) fn from_rpc(
        action: &str,
        err: RpcError,
        on_rejection: fn(String, RpcError) -> DeployError,
    ) -> Self {
        let message = format!("{action}: {err}");
        if err.is_rejection() {
            on_rejection(message, err)
        } else {
            DeployError::Network {
                message,
                source: Some(err),
            }
        }
    }

    /// Rejection mapper for steps where a node error is still a network error.
    pub(crate) fn network_rejection(message: String, source: RpcError) -> Self {
        DeployError::Network {
            message,
            source: Some(source),
        }
    }

    /// Rejection mapper for the submission step.
    pub(crate) fn submission_rejection(message: String, source: RpcError) -> Self {
        DeployError::Submission {
            message,
            source: Some(source),
        }
    }
}
