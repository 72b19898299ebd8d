use std::collections::HashMap;

use alloy_primitives::Address;
use tracing::{debug, error};

use crate::{
    broadcast::{BroadcastSet, BroadcastTransaction},
    engine::{
        contracts::ContractIndex,
        proxy::{ImplementationBindings, base_name},
    },
    registry::{Registry, RegistryFormat},
    types::{
        ChainId, ContractDeployment, ContractName, IMPLEMENTATION_SUFFIX, PROXY_CONTRACT_NAME,
        Timestamp,
    },
};

/// Applies every deployment of a run set to a registry, newest run last.
pub struct Aggregator<'a> {
    format: &'a RegistryFormat,
    contracts: &'a ContractIndex,
    bindings: &'a ImplementationBindings,
    timestamps: HashMap<ChainId, HashMap<ContractName, Timestamp>>,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        format: &'a RegistryFormat,
        contracts: &'a ContractIndex,
        bindings: &'a ImplementationBindings,
    ) -> Self {
        Self {
            format,
            contracts,
            bindings,
            timestamps: HashMap::new(),
        }
    }

    /// Returns the number of registry entries written.
    pub fn apply(&mut self, broadcasts: &BroadcastSet, registry: &mut Registry) -> usize {
        let mut written = 0;

        for entry in broadcasts.transactions() {
            if self.apply_transaction(broadcasts, entry, registry) {
                written += 1;
            }
        }

        written
    }

    fn apply_transaction(
        &mut self,
        broadcasts: &BroadcastSet,
        entry: &BroadcastTransaction,
        registry: &mut Registry,
    ) -> bool {
        let Some((contract_name, address)) = entry.transaction.named_contract() else {
            return false;
        };

        if !entry.transaction.is_deployment() {
            return false;
        }

        let start_block = broadcasts
            .receipt_for(&entry.transaction)
            .and_then(|receipt| receipt.block_number());

        if start_block.is_none() && self.format.requires_start_block() {
            debug!(
                chain_id = entry.chain_id,
                contract = contract_name,
                %address,
                "No block number for deployment, skipping"
            );
            return false;
        }

        let Some(name) = self.registry_name(entry.chain_id, contract_name, address) else {
            return false;
        };

        let partition = self.format.partition_key(&entry.env, entry.chain_id);

        let last_seen = self
            .timestamps
            .get(&entry.chain_id)
            .and_then(|names| names.get(&name))
            .copied();

        let has_start_block = registry
            .get(&partition, &name)
            .is_some_and(|deployment| deployment.start_block.is_some());

        let should_update = Some(entry.timestamp) > last_seen || !has_start_block;

        if !should_update {
            debug!(
                chain_id = entry.chain_id,
                contract = %name,
                %address,
                timestamp = entry.timestamp,
                "Newer deployment already recorded, skipping"
            );
            return false;
        }

        self.timestamps
            .entry(entry.chain_id)
            .or_default()
            .insert(name.clone(), entry.timestamp);

        debug!(
            chain_id = entry.chain_id,
            env = %entry.env,
            bucket = %partition.bucket,
            contract = %name,
            %address,
            start_block,
            file = %entry.source.display(),
            "Recorded deployment"
        );

        registry.insert(
            partition,
            name,
            ContractDeployment {
                address,
                start_block,
            },
        );

        true
    }

    /// Name a deployment is recorded under, or `None` when it cannot be resolved.
    fn registry_name(
        &self,
        chain_id: ChainId,
        contract_name: &str,
        address: Address,
    ) -> Option<ContractName> {
        if contract_name == PROXY_CONTRACT_NAME {
            let base = self.bindings.base_name_for(chain_id, &address);

            if base.is_none() {
                error!(chain_id, %address, "no implementation found");
            }

            return base.map(str::to_string);
        }

        if self.contracts.is_implementation(chain_id, &address)
            || self.contracts.is_implementation_name(chain_id, contract_name)
        {
            return Some(format!("{}{}", base_name(contract_name), IMPLEMENTATION_SUFFIX));
        }

        Some(contract_name.to_string())
    }
}
