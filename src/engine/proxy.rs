use std::collections::HashMap;

use alloy_primitives::{Address, B256, b256};
use tracing::debug;

use crate::{
    broadcast::{BroadcastSet, Log},
    engine::contracts::ContractIndex,
    types::{ChainId, ContractName, IMPLEMENTATION_SUFFIX},
};

/// `keccak256("Upgraded(address)")`, emitted by ERC-1967 proxies.
pub const UPGRADED_EVENT_SIGNATURE: B256 =
    b256!("bc7cd75a20ee27fd9adebab32041f755214dbc6bffa90cc0225b39da2e5c2d3b");

/// Proxy address to the base name of the implementation it was upgraded to.
#[derive(Debug, Default)]
pub struct ImplementationBindings {
    proxies: HashMap<ChainId, HashMap<Address, ContractName>>,
}

impl ImplementationBindings {
    pub fn bind(&mut self, chain_id: ChainId, proxy: Address, base_name: &str) {
        self.proxies
            .entry(chain_id)
            .or_default()
            .insert(proxy, base_name.to_string());
    }

    pub fn base_name_for(&self, chain_id: ChainId, proxy: &Address) -> Option<&str> {
        self.proxies.get(&chain_id)?.get(proxy).map(String::as_str)
    }
}

/// `VaultImplementation` -> `Vault`; names without the suffix are returned as is.
pub fn base_name(name: &str) -> &str {
    name.strip_suffix(IMPLEMENTATION_SUFFIX).unwrap_or(name)
}

/// Implementation address carried by an `Upgraded` log, if `log` is one.
pub fn upgraded_implementation(log: &Log) -> Option<Address> {
    match log.topics.as_slice() {
        [signature, implementation, ..] if *signature == UPGRADED_EVENT_SIGNATURE => {
            Some(Address::from_word(*implementation))
        }
        _ => None,
    }
}

/// Walks the receipt logs of every transaction and binds each upgraded proxy
/// to the base name of its implementation.
///
/// Implementations referenced by an upgrade are marked in `contracts` so the
/// aggregator records them under `{base}Implementation`.
pub fn resolve_upgrades(
    broadcasts: &BroadcastSet,
    contracts: &mut ContractIndex,
) -> ImplementationBindings {
    let mut bindings = ImplementationBindings::default();

    for entry in broadcasts.transactions() {
        let Some(receipt) = broadcasts.receipt_for(&entry.transaction) else {
            continue;
        };

        for log in receipt.logs() {
            let Some(implementation) = upgraded_implementation(log) else {
                continue;
            };

            let Some(implementation_name) = contracts
                .name_of(entry.chain_id, &implementation)
                .map(str::to_string)
            else {
                debug!(
                    chain_id = entry.chain_id,
                    proxy = %log.address,
                    %implementation,
                    "Upgrade to an unnamed implementation, ignoring"
                );
                continue;
            };

            let base = base_name(&implementation_name);

            contracts.mark_implementation(entry.chain_id, implementation, &implementation_name);
            bindings.bind(entry.chain_id, log.address, base);

            debug!(
                chain_id = entry.chain_id,
                proxy = %log.address,
                %implementation,
                contract = base,
                "Bound proxy to implementation"
            );
        }
    }

    bindings
}
