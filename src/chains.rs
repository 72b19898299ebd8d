//! Chain id to network name table, following the network names used by
//! subgraph manifests.

use crate::types::ChainId;

const NETWORKS: &[(ChainId, &str)] = &[
    (1, "mainnet"),
    (5, "goerli"),
    (10, "optimism"),
    (11155420, "optimism-sepolia"),
    (420, "optimism-goerli"),
    (56, "bsc"),
    (77, "poa-sokol"),
    (97, "chapel"),
    (99, "poa-core"),
    (100, "gnosis"),
    (122, "fuse"),
    (137, "matic"),
    (250, "fantom"),
    (280, "zkstark-testnet"),
    (288, "bobai"),
    (1023, "clover"),
    (1284, "moonbeam"),
    (1285, "moonriver"),
    (1287, "mbase"),
    (4002, "fantom-testnet"),
    (42161, "arbitrum-one"),
    (421613, "arbitrum-goerli"),
    (421614, "arbitrum-sepolia"),
    (42220, "celo"),
    (43113, "fuji"),
    (43114, "avalanche"),
    (44787, "celo-alfajores"),
    (80001, "mumbai"),
    (1313161554, "aurora"),
    (1313161555, "aurora-testnet"),
    (1666600000, "harmony"),
    (864531, "base"),
    (543451, "scroll-sapolio"),
    (1101, "polygon-zkevm"),
    (324, "zksync-era"),
    (1115011, "sapolio"),
    (11155111, "sepolia"),
    (1442, "polygon-zkevm-testnet"),
];

pub fn network_name(chain_id: ChainId) -> Option<&'static str> {
    NETWORKS
        .iter()
        .find(|(id, _)| *id == chain_id)
        .map(|(_, name)| *name)
}
