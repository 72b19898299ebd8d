use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use alloy_primitives::{Address, hex};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    registry::{PartitionKey, Registry, RegistryFormat},
    types::{ContractDeployment, ContractName, DEFAULT_ENV, EnvName},
};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct ChecksummedAddress(Address);

impl Serialize for ChecksummedAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_checksum(None))
    }
}

fn serialize_lowercase<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode_prefixed(address))
}

type ChainContracts = BTreeMap<ContractName, ChecksummedAddress>;

/// Top-level value of `deployments.json`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeploymentsBucket {
    /// Layout without an environment level: `{chainId: {name: address}}`.
    Chain(ChainContracts),
    Env(BTreeMap<String, ChainContracts>),
}

type DeploymentsFile = BTreeMap<EnvName, BTreeMap<String, ChainContracts>>;

#[derive(Debug, Serialize, Deserialize)]
struct NetworkEntry {
    #[serde(serialize_with = "serialize_lowercase")]
    address: Address,
    #[serde(rename = "startBlock", default, skip_serializing_if = "Option::is_none")]
    start_block: Option<u64>,
}

type NetworksFile = BTreeMap<String, BTreeMap<ContractName, NetworkEntry>>;

/// `output` itself, or the format's default file name inside it when it is a directory.
pub fn resolve_output_path(output: &Path, format: &RegistryFormat) -> PathBuf {
    if output.is_dir() {
        output.join(format.default_filename())
    } else {
        output.to_path_buf()
    }
}

pub fn read_registry(path: &Path, format: &RegistryFormat) -> Result<Registry, WriteError> {
    let reader = BufReader::new(File::open(path)?);
    let mut registry = Registry::default();

    match format {
        RegistryFormat::Deployments => {
            let file: BTreeMap<String, DeploymentsBucket> = serde_json::from_reader(reader)?;

            for (key, bucket) in file {
                match bucket {
                    DeploymentsBucket::Chain(contracts) => {
                        debug!(chain = %key, "Moving env-less deployments under the default env");
                        extend_deployments(&mut registry, DEFAULT_ENV, &key, contracts);
                    }
                    DeploymentsBucket::Env(chains) => {
                        for (chain, contracts) in chains {
                            extend_deployments(&mut registry, &key, &chain, contracts);
                        }
                    }
                }
            }
        }
        RegistryFormat::Networks { .. } => {
            let file: NetworksFile = serde_json::from_reader(reader)?;

            for (network, contracts) in file {
                let partition = registry.partition_mut(PartitionKey::new(None, network));

                for (name, entry) in contracts {
                    partition.insert(
                        name,
                        ContractDeployment {
                            address: entry.address,
                            start_block: entry.start_block,
                        },
                    );
                }
            }
        }
    }

    Ok(registry)
}

fn extend_deployments(registry: &mut Registry, env: &str, chain: &str, contracts: ChainContracts) {
    let partition = registry.partition_mut(PartitionKey::new(Some(env), chain));

    for (name, ChecksummedAddress(address)) in contracts {
        partition
            .entry(name)
            .or_insert(ContractDeployment {
                address,
                start_block: None,
            });
    }
}

/// Previously written registry, or an empty one when there is none or it
/// cannot be parsed.
pub fn load_existing(path: &Path, format: &RegistryFormat) -> Registry {
    if !path.exists() {
        debug!(path = %path.display(), "No existing registry");
        return Registry::default();
    }

    match read_registry(path, format) {
        Ok(registry) => {
            debug!(
                path = %path.display(),
                contracts = registry.contract_count(),
                "Loaded existing registry"
            );
            registry
        }
        Err(err) => {
            error!(path = %path.display(), error = %err, "Failed to read existing registry, starting empty");
            Registry::default()
        }
    }
}

pub fn write(path: &Path, format: &RegistryFormat, registry: &mut Registry) -> Result<(), WriteError> {
    let pruned = registry.prune_empty();
    if pruned > 0 {
        debug!(pruned, "Pruned empty partitions");
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        RegistryFormat::Deployments => {
            serde_json::to_writer_pretty(&mut writer, &deployments_file(registry))?
        }
        RegistryFormat::Networks { .. } => {
            serde_json::to_writer_pretty(&mut writer, &networks_file(registry))?
        }
    }

    writer.flush()?;

    info!(
        path = %path.display(),
        contracts = registry.contract_count(),
        "Wrote registry"
    );

    Ok(())
}

fn deployments_file(registry: &Registry) -> DeploymentsFile {
    let mut file = DeploymentsFile::new();

    for (partition, contracts) in registry.partitions() {
        let env = partition.env.as_deref().unwrap_or(DEFAULT_ENV);

        file.entry(env.to_string())
            .or_default()
            .entry(partition.bucket.clone())
            .or_default()
            .extend(
                contracts
                    .iter()
                    .map(|(name, deployment)| (name.clone(), ChecksummedAddress(deployment.address))),
            );
    }

    file
}

fn networks_file(registry: &Registry) -> NetworksFile {
    let mut file = NetworksFile::new();

    for (partition, contracts) in registry.partitions() {
        file.entry(partition.bucket.clone()).or_default().extend(
            contracts.iter().map(|(name, deployment)| {
                (
                    name.clone(),
                    NetworkEntry {
                        address: deployment.address,
                        start_block: deployment.start_block,
                    },
                )
            }),
        );
    }

    file
}
