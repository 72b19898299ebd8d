use std::collections::BTreeMap;

use alloy_primitives::Address;
use thiserror::Error;

use crate::{
    chains,
    types::{ChainId, ContractDeployment, ContractName, DEFAULT_ENV, EnvName, PartitionContracts},
};

pub const DEPLOYMENTS_FILENAME: &str = "deployments.json";

pub const NETWORKS_FILENAME: &str = "networks.json";

/// Location of a bucket of contracts inside a persisted registry.
///
/// `env` is `None` for layouts without an environment level. `bucket` is the
/// chain id for `deployments.json` and the network name for `networks.json`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    pub env: Option<EnvName>,
    pub bucket: String,
}

impl PartitionKey {
    pub fn new(env: Option<&str>, bucket: impl Into<String>) -> Self {
        Self {
            env: env.map(str::to_string),
            bucket: bucket.into(),
        }
    }
}

/// Output shape of a registry file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryFormat {
    /// `{env: {chainId: {name: checksummedAddress}}}`
    Deployments,
    /// `{networkName: {name: {address, startBlock}}}` for a single environment.
    Networks { env: EnvName },
}

impl RegistryFormat {
    pub fn default_filename(&self) -> &'static str {
        match self {
            RegistryFormat::Deployments => DEPLOYMENTS_FILENAME,
            RegistryFormat::Networks { .. } => NETWORKS_FILENAME,
        }
    }

    /// Broadcasts tagged with any other environment are not loaded.
    pub fn env_filter(&self) -> Option<&str> {
        match self {
            RegistryFormat::Deployments => None,
            RegistryFormat::Networks { env } => Some(env),
        }
    }

    /// Whether a deployment without a known block may be recorded.
    pub fn requires_start_block(&self) -> bool {
        matches!(self, RegistryFormat::Networks { .. })
    }

    pub fn partition_key(&self, env: &str, chain_id: ChainId) -> PartitionKey {
        match self {
            RegistryFormat::Deployments => PartitionKey::new(Some(env), chain_id.to_string()),
            RegistryFormat::Networks { .. } => {
                let bucket = chains::network_name(chain_id)
                    .map(str::to_string)
                    .unwrap_or_else(|| chain_id.to_string());

                PartitionKey::new(None, bucket)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Deployment of '{name}' for chain {chain_id} and env '{env}' not found")]
    NotFound {
        name: String,
        chain_id: ChainId,
        env: String,
    },
}

/// In-memory registry, mutated by the engine and persisted by [`crate::write`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Registry {
    partitions: BTreeMap<PartitionKey, PartitionContracts>,
}

impl Registry {
    pub fn get(&self, partition: &PartitionKey, name: &str) -> Option<&ContractDeployment> {
        self.partitions.get(partition)?.get(name)
    }

    pub fn insert(
        &mut self,
        partition: PartitionKey,
        name: ContractName,
        deployment: ContractDeployment,
    ) -> Option<ContractDeployment> {
        self.partition_mut(partition).insert(name, deployment)
    }

    pub fn partition_mut(&mut self, partition: PartitionKey) -> &mut PartitionContracts {
        self.partitions.entry(partition).or_default()
    }

    pub fn partitions(&self) -> impl Iterator<Item = (&PartitionKey, &PartitionContracts)> {
        self.partitions.iter()
    }

    pub fn contract_count(&self) -> usize {
        self.partitions.values().map(BTreeMap::len).sum()
    }

    /// Drops partitions without contracts and returns how many were removed.
    pub fn prune_empty(&mut self) -> usize {
        let before = self.partitions.len();
        self.partitions.retain(|_, contracts| !contracts.is_empty());
        before - self.partitions.len()
    }

    /// Address of `name` in a deployments-shaped registry.
    pub fn deployment_address(
        &self,
        env: Option<&str>,
        chain_id: ChainId,
        name: &str,
    ) -> Result<Address, LookupError> {
        let env = env.unwrap_or(DEFAULT_ENV);
        let partition = RegistryFormat::Deployments.partition_key(env, chain_id);

        self.get(&partition, name)
            .map(|deployment| deployment.address)
            .ok_or_else(|| LookupError::NotFound {
                name: name.to_string(),
                chain_id,
                env: env.to_string(),
            })
    }
}
