use std::collections::{HashMap, HashSet};

use alloy_primitives::Address;
use tracing::trace;

use crate::{
    broadcast::BroadcastTransaction,
    types::{ChainId, ContractName, IMPLEMENTATION_SUFFIX},
};

/// Names and implementation flags of every contract seen in a run, scoped
/// per chain. Implementations are flagged both by address and by contract
/// name. Entries are only ever added.
#[derive(Debug, Default)]
pub struct ContractIndex {
    names: HashMap<ChainId, HashMap<Address, ContractName>>,
    implementations: HashMap<ChainId, HashSet<Address>>,
    implementation_names: HashMap<ChainId, HashSet<ContractName>>,
}

impl ContractIndex {
    /// Indexes all named transactions regardless of their type or order.
    pub fn build(transactions: &[BroadcastTransaction]) -> Self {
        let mut index = Self::default();

        for entry in transactions {
            if let Some((name, address)) = entry.transaction.named_contract() {
                index.record(entry.chain_id, address, name);
            }
        }

        index
    }

    pub fn record(&mut self, chain_id: ChainId, address: Address, name: &str) {
        trace!(chain_id, %address, contract = name, "Indexed contract name");

        self.names
            .entry(chain_id)
            .or_default()
            .insert(address, name.to_string());

        if name.ends_with(IMPLEMENTATION_SUFFIX) {
            self.mark_implementation(chain_id, address, name);
        }
    }

    pub fn name_of(&self, chain_id: ChainId, address: &Address) -> Option<&str> {
        self.names.get(&chain_id)?.get(address).map(String::as_str)
    }

    pub fn mark_implementation(&mut self, chain_id: ChainId, address: Address, name: &str) {
        self.implementations
            .entry(chain_id)
            .or_default()
            .insert(address);
        self.implementation_names
            .entry(chain_id)
            .or_default()
            .insert(name.to_string());
    }

    pub fn is_implementation(&self, chain_id: ChainId, address: &Address) -> bool {
        self.implementations
            .get(&chain_id)
            .is_some_and(|addresses| addresses.contains(address))
    }

    pub fn is_implementation_name(&self, chain_id: ChainId, name: &str) -> bool {
        self.implementation_names
            .get(&chain_id)
            .is_some_and(|names| names.contains(name))
    }
}
