//! Compiled contract artifacts and constructor encoding.
//!
//! Both Hardhat (`artifacts/<source>.sol/<Name>.json`, `bytecode` is a hex string)
//! and Foundry (`out/<source>.sol/<Name>.json`, `bytecode.object` is a hex string)
//! layouts are understood.

use std::{
    fs,
    path::{Path, PathBuf},
};

use alloy_core::{
    dyn_abi::{DynSolValue, Specifier},
    json_abi::JsonAbi,
    primitives::Bytes,
};
use serde::Deserialize;

use crate::DeployError;

/// Directory holding compiler metadata rather than contract artifacts.
const BUILD_INFO_DIR: &str = "build-info";

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    abi: JsonAbi,
    bytecode: BytecodeField,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    Hex(String),
    Object { object: String },
}

impl BytecodeField {
    fn as_hex(&self) -> &str {
        match self {
            BytecodeField::Hex(hex) => hex,
            BytecodeField::Object { object } => object,
        }
    }
}

/// A deployable contract: its ABI and creation bytecode.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractFactory {
    pub name: String,
    pub path: PathBuf,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl ContractFactory {
    /// Read a factory from an artifact file.
    pub fn from_file(name: &str, path: &Path) -> Result<Self, DeployError> {
        let content = fs::read_to_string(path).map_err(|e| {
            DeployError::ArtifactNotFound(format!(
                "failed to read artifact for '{name}' at {}: {e}",
                path.display()
            ))
        })?;

        let artifact: ArtifactFile = serde_json::from_str(&content).map_err(|e| {
            DeployError::ArtifactNotFound(format!(
                "{} is not a compiled artifact for '{name}': {e}",
                path.display()
            ))
        })?;

        let hex_code = artifact.bytecode.as_hex().trim();
        let hex_code = hex_code.strip_prefix("0x").unwrap_or(hex_code);

        if hex_code.is_empty() {
            return Err(DeployError::ArtifactNotFound(format!(
                "'{name}' has no deployable bytecode (abstract contract or interface?)"
            )));
        }
        if hex_code.contains("__") {
            return Err(DeployError::ArtifactNotFound(format!(
                "'{name}' bytecode has unlinked library references"
            )));
        }

        let bytecode = hex::decode(hex_code).map_err(|e| {
            DeployError::ArtifactNotFound(format!("'{name}' bytecode is not valid hex: {e}"))
        })?;

        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            abi: artifact.abi,
            bytecode: bytecode.into(),
        })
    }

    /// Number of constructor parameters.
    pub fn constructor_arity(&self) -> usize {
        self.abi.constructor().map_or(0, |c| c.inputs.len())
    }

    /// Creation bytecode followed by the ABI-encoded constructor arguments.
    ///
    /// Each argument is coerced from its string form into the type declared by the
    /// constructor, e.g. `address`, `uint256`, `bool`, `string`, `[1,2]` or `(a,b)`.
    pub fn deploy_data(&self, args: &[String]) -> Result<Bytes, DeployError> {
        let params = self
            .abi
            .constructor()
            .map(|c| c.inputs.as_slice())
            .unwrap_or_default();

        if params.len() != args.len() {
            return Err(DeployError::submission(format!(
                "constructor of '{}' takes {} argument(s), got {}",
                self.name,
                params.len(),
                args.len()
            )));
        }

        let values = params
            .iter()
            .zip(args)
            .enumerate()
            .map(|(index, (param, arg))| {
                let ty = param.resolve().map_err(|e| {
                    DeployError::submission(format!(
                        "constructor parameter #{index} of '{}' has unsupported type '{}': {e}",
                        self.name, param.ty
                    ))
                })?;
                ty.coerce_str(arg).map_err(|e| {
                    DeployError::submission(format!(
                        "constructor argument #{index} ('{arg}') is not a valid {}: {e}",
                        param.ty
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut data = self.bytecode.to_vec();
        data.extend(DynSolValue::Tuple(values).abi_encode_params());
        Ok(data.into())
    }
}

/// A directory of compiled artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a contract into a deployable factory.
    ///
    /// `name` is either a bare contract name, searched for anywhere under the root, or a
    /// fully qualified `path/to/Source.sol:Name`.
    pub fn factory(&self, name: &str) -> Result<ContractFactory, DeployError> {
        if !self.root.is_dir() {
            return Err(DeployError::ArtifactNotFound(format!(
                "artifacts directory {} does not exist (compile the contracts first)",
                self.root.display()
            )));
        }

        let path = match name.rsplit_once(':') {
            Some((source, contract)) => {
                let path = self.root.join(source).join(format!("{contract}.json"));
                if !path.is_file() {
                    return Err(DeployError::ArtifactNotFound(format!(
                        "no artifact for '{name}' at {}",
                        path.display()
                    )));
                }
                path
            }
            None => self.find_unique(name)?,
        };

        tracing::debug!(contract = %name, path = %path.display(), "Artifact resolved");

        let contract = name.rsplit_once(':').map_or(name, |(_, contract)| contract);
        ContractFactory::from_file(contract, &path)
    }

    fn find_unique(&self, name: &str) -> Result<PathBuf, DeployError> {
        let file_name = format!("{name}.json");
        let mut found = Vec::new();
        collect_matches(&self.root, &file_name, &mut found).map_err(|e| {
            DeployError::ArtifactNotFound(format!(
                "failed to scan {}: {e}",
                self.root.display()
            ))
        })?;

        match found.len() {
            0 => Err(DeployError::ArtifactNotFound(format!(
                "no compiled artifact named '{name}' under {}",
                self.root.display()
            ))),
            1 => Ok(found.remove(0)),
            _ => {
                let candidates = found
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(DeployError::ArtifactNotFound(format!(
                    "'{name}' is ambiguous, use a fully qualified name (candidates: {candidates})"
                )))
            }
        }
    }
}

fn collect_matches(dir: &Path, file_name: &str, found: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            if entry.file_name() != BUILD_INFO_DIR {
                collect_matches(&path, file_name, found)?;
            }
        } else if entry.file_name().to_str() == Some(file_name) {
            found.push(path);
        }
    }

    Ok(())
}
