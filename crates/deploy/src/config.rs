//! Network configuration: declarations, validation and resolution.
//!
//! Configuration is loaded once at startup into a [`NetworkRegistry`] and passed
//! by reference to whoever needs a [`NetworkProfile`]. It is never mutated after
//! loading.
//!
//! # Example
//!
//! ```no_run
//! use kickoff_deploy::KickoffConfig;
//!
//! # fn example() -> Result<(), kickoff_deploy::DeployError> {
//! let config = KickoffConfig::load(&["kickoff.toml"])?;
//! let profile = config.networks.resolve(Some("local"))?;
//! println!("{} -> {}", profile.name, profile.rpc_url);
//! # Ok(())
//! # }
//! ```

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{DeployError, rpc::DEFAULT_REQUEST_TIMEOUT, signer::AccountSecret};

/// Prefix of environment variables overriding configuration keys.
pub const ENV_PREFIX: &str = "KICKOFF_";

/// The default configuration file name.
pub const DEFAULT_CONFIG_FILENAME: &str = "kickoff.toml";

/// The default artifacts directory (Hardhat's layout).
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// A network declaration as written in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDeclaration {
    /// Unique network name.
    pub name: String,
    /// HTTP(S) JSON-RPC endpoint.
    pub rpc_url: String,
    /// Account secrets; the first one signs.
    #[serde(default)]
    pub accounts: Vec<String>,
    /// Block-explorer API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_api_key: Option<String>,
}

/// A validated network profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    pub name: String,
    pub rpc_url: Url,
    pub accounts: Vec<AccountSecret>,
    pub explorer_api_key: Option<String>,
}

impl NetworkProfile {
    /// Validate a declaration.
    ///
    /// Accounts are only parsed, not checked for presence: a profile may be declared
    /// without accounts but will not resolve.
    pub fn from_declaration(decl: NetworkDeclaration) -> Result<Self, DeployError> {
        if decl.name.trim().is_empty() {
            return Err(DeployError::config("network declared with an empty name"));
        }

        if decl.rpc_url.trim().is_empty() {
            return Err(DeployError::config(format!(
                "network '{}' has an empty rpc_url",
                decl.name
            )));
        }

        let rpc_url = Url::parse(decl.rpc_url.trim()).map_err(|e| {
            DeployError::config(format!(
                "network '{}' has an invalid rpc_url '{}': {e}",
                decl.name, decl.rpc_url
            ))
        })?;

        if !matches!(rpc_url.scheme(), "http" | "https") {
            return Err(DeployError::config(format!(
                "network '{}' rpc_url must be http or https, got '{}'",
                decl.name,
                rpc_url.scheme()
            )));
        }

        let accounts = decl
            .accounts
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                raw.parse::<AccountSecret>().map_err(|e| {
                    DeployError::config(format!(
                        "network '{}' account #{index} is invalid: {e}",
                        decl.name
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: decl.name,
            rpc_url,
            accounts,
            explorer_api_key: decl.explorer_api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    /// The account that signs deployments on this network.
    pub fn deployer_account(&self) -> Result<&AccountSecret, DeployError> {
        self.accounts.first().ok_or_else(|| {
            DeployError::config(format!(
                "network '{}' has no configured account",
                self.name
            ))
        })
    }
}

/// The set of configured networks plus the default designation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkRegistry {
    profiles: BTreeMap<String, NetworkProfile>,
    /// Declaration order, for listing.
    order: Vec<String>,
    default_network: Option<String>,
}

impl NetworkRegistry {
    /// Build a registry from the declarations of a single configuration source.
    ///
    /// A name declared twice in the same source is rejected.
    pub fn from_declarations(
        declarations: Vec<NetworkDeclaration>,
        default_network: Option<String>,
    ) -> Result<Self, DeployError> {
        let mut seen = HashSet::new();
        let mut registry = Self::default();

        for decl in declarations {
            if !seen.insert(decl.name.clone()) {
                return Err(DeployError::config(format!(
                    "network '{}' is declared more than once",
                    decl.name
                )));
            }
            registry.insert(NetworkProfile::from_declaration(decl)?);
        }

        registry.set_default(default_network)?;
        Ok(registry)
    }

    /// Insert a profile, replacing any previous profile with the same name.
    ///
    /// Returns the replaced profile.
    pub fn insert(&mut self, profile: NetworkProfile) -> Option<NetworkProfile> {
        let name = profile.name.clone();
        let previous = self.profiles.insert(name.clone(), profile);
        if previous.is_some() {
            tracing::debug!(network = %name, "Network declaration overridden by a later source");
        } else {
            self.order.push(name);
        }
        previous
    }

    /// Layer `other` on top of `self`: its profiles replace same-named ones, and its
    /// default designation, if any, replaces ours.
    pub fn overlay(&mut self, other: NetworkRegistry) {
        let NetworkRegistry {
            mut profiles,
            order,
            default_network,
        } = other;
        for name in order {
            if let Some(profile) = profiles.remove(&name) {
                self.insert(profile);
            }
        }
        if default_network.is_some() {
            self.default_network = default_network;
        }
    }

    /// Designate the default network. It must be declared.
    pub fn set_default(&mut self, default_network: Option<String>) -> Result<(), DeployError> {
        let default_network = default_network.filter(|name| !name.trim().is_empty());
        if let Some(name) = &default_network {
            if !self.profiles.contains_key(name) {
                return Err(DeployError::config(format!(
                    "default network '{name}' is not declared"
                )));
            }
        }
        self.default_network = default_network;
        Ok(())
    }

    /// The default network name, if one is designated.
    pub fn default_network(&self) -> Option<&str> {
        self.default_network.as_deref()
    }

    /// Look up a profile without checking that it can deploy.
    pub fn get(&self, name: &str) -> Option<&NetworkProfile> {
        self.profiles.get(name)
    }

    /// Profiles in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &NetworkProfile> {
        self.order.iter().filter_map(|name| self.profiles.get(name))
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Resolve the profile to deploy on.
    ///
    /// `None` selects the default network. Fails when the name is not declared, when
    /// no default exists, or when the profile has no account to sign with.
    pub fn resolve(&self, name: Option<&str>) -> Result<&NetworkProfile, DeployError> {
        let name = match name {
            Some(name) => name,
            None => self.default_network.as_deref().ok_or_else(|| {
                DeployError::config("no network requested and no default network declared")
            })?,
        };

        let profile = self.profiles.get(name).ok_or_else(|| {
            let known = self.order.join(", ");
            DeployError::config(format!(
                "network '{name}' is not declared (known networks: [{known}])"
            ))
        })?;

        profile.deployer_account()?;

        Ok(profile)
    }
}

/// Tunables for a deployment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    /// Upper bound on the confirmation wait.
    pub confirmation_timeout: Duration,
    /// Interval between receipt polls.
    pub poll_interval: Duration,
    /// Number of blocks, including the inclusion block, before a receipt counts.
    pub confirmations: u64,
    /// Timeout for each individual RPC request.
    pub request_timeout: Duration,
    /// Fixed gas limit instead of `eth_estimateGas`.
    pub gas_limit: Option<u64>,
    /// Fixed gas price in wei instead of `eth_gasPrice`.
    pub gas_price: Option<u128>,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            confirmations: 1,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            gas_limit: None,
            gas_price: None,
        }
    }
}

/// The `[deploy]` section of a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySection {
    pub confirmation_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub confirmations: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<u128>,
}

impl DeploySection {
    /// Apply the keys present in this section to `options`.
    pub fn apply(&self, options: &mut DeployOptions) -> Result<(), DeployError> {
        if let Some(secs) = self.confirmation_timeout_secs {
            if secs == 0 {
                return Err(DeployError::config(
                    "deploy.confirmation_timeout_secs must be positive",
                ));
            }
            options.confirmation_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.poll_interval_ms {
            if ms == 0 {
                return Err(DeployError::config("deploy.poll_interval_ms must be positive"));
            }
            options.poll_interval = Duration::from_millis(ms);
        }
        if let Some(confirmations) = self.confirmations {
            if confirmations == 0 {
                return Err(DeployError::config("deploy.confirmations must be at least 1"));
            }
            options.confirmations = confirmations;
        }
        if let Some(secs) = self.request_timeout_secs {
            if secs == 0 {
                return Err(DeployError::config("deploy.request_timeout_secs must be positive"));
            }
            options.request_timeout = Duration::from_secs(secs);
        }
        if self.gas_limit.is_some() {
            options.gas_limit = self.gas_limit;
        }
        if self.gas_price.is_some() {
            options.gas_price = self.gas_price;
        }
        Ok(())
    }
}

/// One configuration file, as deserialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<PathBuf>,
    #[serde(default)]
    pub networks: Vec<NetworkDeclaration>,
    /// Per-network explorer API keys.
    #[serde(default)]
    pub explorer_api_keys: BTreeMap<String, String>,
    #[serde(default)]
    pub deploy: DeploySection,
}

impl ConfigFile {
    /// Extract a configuration file from a figment.
    pub fn from_figment(figment: Figment) -> Result<Self, DeployError> {
        figment
            .extract()
            .map_err(|e| DeployError::config(format!("invalid configuration: {e}")))
    }

    /// Read one TOML file.
    pub fn read(path: &Path) -> Result<Self, DeployError> {
        if !path.is_file() {
            return Err(DeployError::config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        Self::from_figment(Figment::from(Toml::file(path)))
    }

    /// Collect the `KICKOFF_*` environment overrides, e.g. `KICKOFF_DEFAULT_NETWORK`
    /// or `KICKOFF_DEPLOY__CONFIRMATIONS`.
    ///
    /// Keys only the CLI reads are skipped.
    pub fn from_env() -> Result<Self, DeployError> {
        Self::from_figment(Figment::from(
            Env::prefixed(ENV_PREFIX)
                .split("__")
                .ignore(&["config", "network", "verbosity"]),
        ))
    }

    /// Validate the file on its own into a registry, folding in the explorer key map.
    ///
    /// The default network must be declared in this same file. Layered files are
    /// checked together by [`KickoffConfig::from_files`] instead.
    pub fn into_registry(self) -> Result<NetworkRegistry, DeployError> {
        let ConfigFile {
            default_network,
            mut networks,
            explorer_api_keys,
            ..
        } = self;

        for (network, key) in explorer_api_keys {
            match networks.iter_mut().find(|decl| decl.name == network) {
                Some(decl) => {
                    let has_own_key = decl
                        .explorer_api_key
                        .as_ref()
                        .is_some_and(|own| !own.trim().is_empty());
                    if !has_own_key {
                        decl.explorer_api_key = Some(key);
                    }
                }
                None => {
                    tracing::warn!(network = %network, "Explorer API key set for an undeclared network, ignoring");
                }
            }
        }

        NetworkRegistry::from_declarations(networks, default_network)
    }
}

/// The complete startup configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KickoffConfig {
    pub networks: NetworkRegistry,
    pub artifacts: PathBuf,
    pub deploy: DeployOptions,
}

impl Default for KickoffConfig {
    fn default() -> Self {
        Self {
            networks: NetworkRegistry::default(),
            artifacts: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            deploy: DeployOptions::default(),
        }
    }
}

impl KickoffConfig {
    /// Load configuration files in order, then the `KICKOFF_*` environment on top.
    /// Later sources take precedence.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, DeployError> {
        let mut files = paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let file = ConfigFile::read(path)?;
                tracing::info!(path = %path.display(), networks = file.networks.len(), "Configuration loaded");
                Ok(file)
            })
            .collect::<Result<Vec<_>, DeployError>>()?;
        files.push(ConfigFile::from_env()?);

        Self::from_files(files)
    }

    /// Fold already-parsed configuration files, later ones taking precedence.
    ///
    /// Duplicate names are checked per file. The default network may name a network
    /// from any file and is checked once everything is merged.
    pub fn from_files(files: Vec<ConfigFile>) -> Result<Self, DeployError> {
        let mut config = Self::default();
        let mut default_network = None;

        for mut file in files {
            if let Some(artifacts) = &file.artifacts {
                config.artifacts = artifacts.clone();
            }
            if let Some(name) = file.default_network.take().filter(|n| !n.trim().is_empty()) {
                default_network = Some(name);
            }
            file.deploy.apply(&mut config.deploy)?;
            config.networks.overlay(file.into_registry()?);
        }

        config.networks.set_default(default_network)?;
        Ok(config)
    }
}
