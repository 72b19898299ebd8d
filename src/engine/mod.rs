//! Resolution of a loaded run set into registry entries.
//!
//! The stages run in a fixed order over the fully loaded transaction list:
//! contract names are indexed, upgrade events bind proxies to implementations,
//! deployments are aggregated in timestamp order and declared custom
//! deployments are applied last.

pub mod aggregate;
pub mod contracts;
pub mod custom;
pub mod proxy;

use tracing::{info, warn};

use crate::{
    broadcast::BroadcastSet,
    chains,
    registry::{Registry, RegistryFormat},
};

use self::{
    aggregate::Aggregator, contracts::ContractIndex, custom::apply_custom_deployments,
    proxy::resolve_upgrades,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub deployments: usize,
    pub custom_deployments: usize,
}

pub fn run(broadcasts: &BroadcastSet, format: &RegistryFormat, registry: &mut Registry) -> RunSummary {
    if let RegistryFormat::Networks { .. } = format {
        for chain_id in broadcasts.chain_ids() {
            if chains::network_name(chain_id).is_none() {
                warn!(chain_id, "Unknown chain id, using it as the network name");
            }
        }
    }

    let mut contracts = ContractIndex::build(broadcasts.transactions());
    let bindings = resolve_upgrades(broadcasts, &mut contracts);

    let deployments = Aggregator::new(format, &contracts, &bindings).apply(broadcasts, registry);
    let custom_deployments = apply_custom_deployments(broadcasts, format, registry);

    info!(
        files = broadcasts.records().len(),
        transactions = broadcasts.transactions().len(),
        deployments,
        custom_deployments,
        "Resolved deployments"
    );

    RunSummary {
        deployments,
        custom_deployments,
    }
}
