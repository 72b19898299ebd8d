use alloy_primitives::Address;
use tracing::{debug, error};

use crate::{
    broadcast::{BroadcastSet, BroadcastTransaction, Transaction},
    registry::{Registry, RegistryFormat},
    types::{ChainId, ContractDeployment},
};

/// Writes the deployments declared under `meta.deployments`, overriding
/// whatever the aggregator recorded for the same names.
///
/// Declarations that cannot be matched to a broadcast transaction with a
/// receipt are logged and skipped. Returns the number of entries written.
pub fn apply_custom_deployments(
    broadcasts: &BroadcastSet,
    format: &RegistryFormat,
    registry: &mut Registry,
) -> usize {
    let mut written = 0;

    for record in broadcasts.records() {
        for (name, address) in &record.deployments {
            let Some(entry) = find_transaction(broadcasts, record.chain_id, name, address) else {
                error!(
                    contract = %name,
                    %address,
                    chain_id = record.chain_id,
                    file = %record.path.display(),
                    "no transaction found"
                );
                continue;
            };

            let Some(receipt) = broadcasts.receipt_for(&entry.transaction) else {
                error!(
                    contract = %name,
                    %address,
                    chain_id = record.chain_id,
                    transaction = entry.transaction.hash.as_deref().unwrap_or_default(),
                    "no receipt found for custom deployment"
                );
                continue;
            };

            let start_block = receipt.block_number();

            if start_block.is_none() && format.requires_start_block() {
                error!(
                    contract = %name,
                    %address,
                    chain_id = record.chain_id,
                    "no block number for custom deployment"
                );
                continue;
            }

            debug!(
                contract = %name,
                %address,
                chain_id = record.chain_id,
                env = %record.env,
                timestamp = record.timestamp,
                start_block,
                "Recorded custom deployment"
            );

            registry.insert(
                format.partition_key(&record.env, record.chain_id),
                name.clone(),
                ContractDeployment {
                    address: *address,
                    start_block,
                },
            );
            written += 1;
        }
    }

    written
}

/// Most recent transaction on `chain_id` that mentions the contract by name or address.
fn find_transaction<'a>(
    broadcasts: &'a BroadcastSet,
    chain_id: ChainId,
    name: &str,
    address: &Address,
) -> Option<&'a BroadcastTransaction> {
    broadcasts
        .transactions()
        .iter()
        .rev()
        .filter(|entry| entry.chain_id == chain_id)
        .find(|entry| mentions(&entry.transaction, name, address))
}

fn mentions(transaction: &Transaction, name: &str, address: &Address) -> bool {
    transaction.contract_name.as_deref() == Some(name)
        || transaction.contract_address.as_ref() == Some(address)
        || transaction
            .additional_addresses()
            .any(|additional| additional == *address)
}
