use std::collections::BTreeMap;

use alloy_primitives::Address;

pub type ChainId = u64;

pub type ContractName = String;

pub type EnvName = String;

/// Unix timestamp of a broadcast run, as written by forge.
pub type Timestamp = u64;

pub const DEFAULT_ENV: &str = "default";

pub const IMPLEMENTATION_SUFFIX: &str = "Implementation";

pub const PROXY_CONTRACT_NAME: &str = "TransparentUpgradeableProxy";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractDeployment {
    pub address: Address,
    pub start_block: Option<u64>,
}

pub type PartitionContracts = BTreeMap<ContractName, ContractDeployment>;
