use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{ChainId, ContractName, DEFAULT_ENV, EnvName, Timestamp};

/// Pointer files written next to each run; they duplicate the newest run.
const LATEST_RUN_FILENAME: &str = "run-latest.json";

#[derive(Debug, Deserialize)]
pub struct BroadcastFile {
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub receipts: Vec<Receipt>,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub meta: Option<Meta>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Meta {
    #[serde(default, deserialize_with = "string_or_number")]
    pub env: Option<EnvName>,
    #[serde(default)]
    pub deployments: Option<BTreeMap<ContractName, Address>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<TransactionType>,
    #[serde(default)]
    pub contract_name: Option<ContractName>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub additional_contracts: Option<Vec<AdditionalContract>>,
}

impl Transaction {
    pub fn is_deployment(&self) -> bool {
        matches!(
            self.transaction_type,
            Some(TransactionType::Create | TransactionType::Create2)
        )
    }

    /// Name and address, when the transaction carries both.
    pub fn named_contract(&self) -> Option<(&str, Address)> {
        Some((self.contract_name.as_deref()?, self.contract_address?))
    }

    pub fn additional_addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.additional_contracts
            .iter()
            .flatten()
            .map(|contract| contract.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Create,
    Create2,
    Call,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdditionalContract {
    pub address: Address,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub block_number: Option<String>,
    #[serde(default)]
    pub logs: Option<Vec<Log>>,
}

impl Receipt {
    /// Block number as an integer; zero and unparseable values count as unknown.
    pub fn block_number(&self) -> Option<u64> {
        let raw = self.block_number.as_deref()?.trim();

        let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => raw.parse(),
        };

        match parsed {
            Ok(0) => None,
            Ok(block) => Some(block),
            Err(_) => {
                debug!(
                    transaction = %self.transaction_hash,
                    block_number = raw,
                    "Unparseable block number"
                );
                None
            }
        }
    }

    pub fn logs(&self) -> impl Iterator<Item = &Log> {
        self.logs.iter().flatten()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

/// Accepts `"2024"` and `2024` alike.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(
        Option::<StringOrNumber>::deserialize(deserializer)?.map(|value| match value {
            StringOrNumber::String(value) => value,
            StringOrNumber::Number(value) => value.to_string(),
        }),
    )
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Broadcast directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("I/O error reading {}: {source}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed broadcast file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Clone)]
pub struct LoadOptions {
    /// Only keep broadcasts tagged with this environment.
    pub env: Option<EnvName>,
}

/// A broadcast file that passed loading, without its transactions.
#[derive(Debug)]
pub struct BroadcastRecord {
    pub path: PathBuf,
    pub chain_id: ChainId,
    pub env: EnvName,
    pub timestamp: Timestamp,
    pub deployments: BTreeMap<ContractName, Address>,
}

#[derive(Debug)]
pub struct BroadcastTransaction {
    pub transaction: Transaction,
    pub chain_id: ChainId,
    pub env: EnvName,
    pub timestamp: Timestamp,
    pub source: PathBuf,
}

/// Every transaction of a run set in ascending timestamp order, plus the
/// receipts of all files pooled by transaction hash.
#[derive(Debug, Default)]
pub struct BroadcastSet {
    records: Vec<BroadcastRecord>,
    transactions: Vec<BroadcastTransaction>,
    receipts: HashMap<String, Receipt>,
}

impl BroadcastSet {
    pub fn load(root: &Path, options: &LoadOptions) -> Result<Self, LoadError> {
        let files = discover(root)?
            .into_iter()
            .map(|path| read_broadcast_file(&path).map(|file| (path, file)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_files(files, options))
    }

    pub fn from_files(files: Vec<(PathBuf, BroadcastFile)>, options: &LoadOptions) -> Self {
        let mut files: Vec<(PathBuf, ChainId, BroadcastFile)> = files
            .into_iter()
            .filter_map(|(path, file)| match chain_id_from_path(&path) {
                Some(chain_id) => Some((path, chain_id, file)),
                None => {
                    warn!(file = %path.display(), "Parent directory is not a chain id, skipping");
                    None
                }
            })
            .collect();

        files.sort_by_key(|(_, _, file)| file.timestamp);

        let mut set = Self::default();

        for (path, chain_id, file) in files {
            let meta = file.meta.unwrap_or_default();
            let env = meta.env.unwrap_or_else(|| DEFAULT_ENV.to_string());

            if options.env.as_ref().is_some_and(|wanted| *wanted != env) {
                debug!(file = %path.display(), env = %env, "Broadcast belongs to another env, skipping");
                continue;
            }

            debug!(
                file = %path.display(),
                chain_id,
                env = %env,
                timestamp = file.timestamp,
                transactions = file.transactions.len(),
                "Loaded broadcast"
            );

            for receipt in file.receipts {
                set.receipts
                    .entry(receipt.transaction_hash.to_lowercase())
                    .or_insert(receipt);
            }

            for transaction in file.transactions {
                set.transactions.push(BroadcastTransaction {
                    transaction,
                    chain_id,
                    env: env.clone(),
                    timestamp: file.timestamp,
                    source: path.clone(),
                });
            }

            set.records.push(BroadcastRecord {
                path,
                chain_id,
                env,
                timestamp: file.timestamp,
                deployments: meta.deployments.unwrap_or_default(),
            });
        }

        set
    }

    pub fn records(&self) -> &[BroadcastRecord] {
        &self.records
    }

    pub fn transactions(&self) -> &[BroadcastTransaction] {
        &self.transactions
    }

    pub fn receipt_for(&self, transaction: &Transaction) -> Option<&Receipt> {
        let hash = transaction.hash.as_deref()?;
        self.receipts.get(&hash.to_lowercase())
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = ChainId> + '_ {
        let mut chain_ids: Vec<ChainId> = self.records.iter().map(|record| record.chain_id).collect();
        chain_ids.sort_unstable();
        chain_ids.dedup();
        chain_ids.into_iter()
    }
}

/// All broadcast files below `root`, sorted, without `run-latest.json` copies.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>, LoadError> {
    if !root.is_dir() {
        return Err(LoadError::MissingDirectory(root.to_path_buf()));
    }

    let pattern = format!("{}/**/*.json", glob::Pattern::escape(&root.to_string_lossy()));

    let mut paths: Vec<PathBuf> = glob::glob(&pattern)?
        .filter_map(Result::ok)
        .filter(|path| path.is_file())
        .filter(|path| path.file_name().is_some_and(|name| name != LATEST_RUN_FILENAME))
        .collect();

    paths.sort();

    Ok(paths)
}

fn read_broadcast_file(path: &Path) -> Result<BroadcastFile, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::IoError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_reader(BufReader::new(file)).map_err(|source| LoadError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

fn chain_id_from_path(path: &Path) -> Option<ChainId> {
    path.parent()?.file_name()?.to_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn broadcast(value: serde_json::Value) -> BroadcastFile {
        serde_json::from_value(value).unwrap()
    }

    fn write_json(path: &Path, value: &serde_json::Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string(value).unwrap()).unwrap();
    }

    #[test]
    fn test_parse_forge_broadcast() {
        let file = broadcast(json!({
            "transactions": [
                {
                    "hash": "0xabcdef",
                    "transactionType": "CREATE2",
                    "contractName": "Vault",
                    "contractAddress": "0x1234567890123456789012345678901234567890",
                    "function": null,
                    "arguments": null,
                    "additionalContracts": [
                        { "transactionType": "CREATE", "address": "0x1111111111111111111111111111111111111111", "initCode": "0x" }
                    ]
                },
                {
                    "hash": "0xfedcba",
                    "transactionType": "CALL",
                    "contractName": null,
                    "contractAddress": null,
                    "function": "initialize()",
                    "additionalContracts": null
                }
            ],
            "receipts": [
                { "transactionHash": "0xabcdef", "blockNumber": "0x7b", "logs": [] }
            ],
            "timestamp": 1625097600,
            "chain": 1,
            "commit": "abc1234"
        }));

        assert_eq!(file.transactions.len(), 2);
        assert_eq!(file.timestamp, 1625097600);
        assert!(file.meta.is_none());

        let create = &file.transactions[0];
        assert!(create.is_deployment());
        assert_eq!(
            create.named_contract(),
            Some(("Vault", "0x1234567890123456789012345678901234567890".parse().unwrap()))
        );
        assert_eq!(create.additional_addresses().count(), 1);

        let call = &file.transactions[1];
        assert_eq!(call.transaction_type, Some(TransactionType::Call));
        assert!(!call.is_deployment());
        assert!(call.named_contract().is_none());
        assert_eq!(call.additional_addresses().count(), 0);

        assert_eq!(file.receipts[0].block_number(), Some(123));
    }

    #[test]
    fn test_unknown_transaction_type_is_not_a_deployment() {
        let file = broadcast(json!({
            "transactions": [
                { "hash": "0x1", "transactionType": "SELFDESTRUCT" },
                { "hash": "0x2" }
            ],
            "timestamp": 1
        }));

        assert_eq!(file.transactions[0].transaction_type, Some(TransactionType::Other));
        assert!(!file.transactions[0].is_deployment());
        assert!(!file.transactions[1].is_deployment());
    }

    #[test]
    fn test_receipt_block_number_formats() {
        let receipt = |block: Option<&str>| Receipt {
            transaction_hash: "0x1".to_string(),
            block_number: block.map(str::to_string),
            logs: None,
        };

        assert_eq!(receipt(Some("100")).block_number(), Some(100));
        assert_eq!(receipt(Some("0x64")).block_number(), Some(100));
        assert_eq!(receipt(Some("0")).block_number(), None);
        assert_eq!(receipt(Some("0x0")).block_number(), None);
        assert_eq!(receipt(Some("pending")).block_number(), None);
        assert_eq!(receipt(None).block_number(), None);
    }

    #[test]
    fn test_numeric_block_number_and_env() {
        let file = broadcast(json!({
            "transactions": [],
            "receipts": [
                { "transactionHash": "0x1", "blockNumber": 100 },
                { "transactionHash": "0x2", "blockNumber": null }
            ],
            "timestamp": 1,
            "meta": { "env": 2024 }
        }));

        assert_eq!(file.receipts[0].block_number(), Some(100));
        assert_eq!(file.receipts[1].block_number(), None);
        assert_eq!(file.meta.and_then(|meta| meta.env), Some("2024".to_string()));
    }

    #[test]
    fn test_chain_id_from_path() {
        assert_eq!(
            chain_id_from_path(Path::new("broadcast/Deploy.s.sol/1/run-1.json")),
            Some(1)
        );
        assert_eq!(
            chain_id_from_path(Path::new("broadcast/Deploy.s.sol/11155111/run-1.json")),
            Some(11155111)
        );
        assert_eq!(
            chain_id_from_path(Path::new("broadcast/Deploy.s.sol/1/dry-run/run-1.json")),
            None
        );
        assert_eq!(chain_id_from_path(Path::new("run-1.json")), None);
    }

    #[test]
    fn test_from_files_sorts_by_timestamp_and_defaults_env() {
        let later = broadcast(json!({
            "transactions": [{ "hash": "0x2", "transactionType": "CREATE", "contractName": "B", "contractAddress": "0x2222222222222222222222222222222222222222" }],
            "timestamp": 2000,
            "meta": { "env": "staging" }
        }));
        let earlier = broadcast(json!({
            "transactions": [{ "hash": "0x1", "transactionType": "CREATE", "contractName": "A", "contractAddress": "0x1111111111111111111111111111111111111111" }],
            "timestamp": 1000
        }));

        let set = BroadcastSet::from_files(
            vec![
                (PathBuf::from("broadcast/Deploy.s.sol/5/run-2.json"), later),
                (PathBuf::from("broadcast/Deploy.s.sol/1/run-1.json"), earlier),
            ],
            &LoadOptions::default(),
        );

        let names: Vec<_> = set
            .transactions()
            .iter()
            .map(|entry| entry.transaction.contract_name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["A", "B"]);

        assert_eq!(set.records()[0].env, "default");
        assert_eq!(set.records()[0].chain_id, 1);
        assert_eq!(set.records()[1].env, "staging");
        assert_eq!(set.records()[1].chain_id, 5);
        assert_eq!(set.chain_ids().collect::<Vec<_>>(), vec![1, 5]);
    }

    #[test]
    fn test_from_files_filters_env() {
        let production = broadcast(json!({
            "transactions": [{ "hash": "0x1" }],
            "timestamp": 1000,
            "meta": { "env": "production" }
        }));
        let staging = broadcast(json!({
            "transactions": [{ "hash": "0x2" }],
            "timestamp": 2000,
            "meta": { "env": "staging" }
        }));

        let set = BroadcastSet::from_files(
            vec![
                (PathBuf::from("broadcast/1/run-1.json"), production),
                (PathBuf::from("broadcast/5/run-2.json"), staging),
            ],
            &LoadOptions {
                env: Some("production".to_string()),
            },
        );

        assert_eq!(set.records().len(), 1);
        assert_eq!(set.transactions().len(), 1);
        assert_eq!(set.records()[0].env, "production");
    }

    #[test]
    fn test_from_files_skips_non_chain_directories() {
        let file = broadcast(json!({ "transactions": [{ "hash": "0x1" }], "timestamp": 1 }));

        let set = BroadcastSet::from_files(
            vec![(PathBuf::from("broadcast/Deploy.s.sol/1/dry-run/run-1.json"), file)],
            &LoadOptions::default(),
        );

        assert!(set.records().is_empty());
        assert!(set.transactions().is_empty());
    }

    #[test]
    fn test_receipts_are_pooled_across_files() {
        let deploy = broadcast(json!({
            "transactions": [{ "hash": "0xAAAA", "transactionType": "CREATE", "contractName": "Vault", "contractAddress": "0x1111111111111111111111111111111111111111" }],
            "timestamp": 1000
        }));
        let receipts = broadcast(json!({
            "transactions": [],
            "receipts": [
                { "transactionHash": "0xaaaa", "blockNumber": "42" },
                { "transactionHash": "0xaaaa", "blockNumber": "43" }
            ],
            "timestamp": 2000
        }));

        let set = BroadcastSet::from_files(
            vec![
                (PathBuf::from("broadcast/1/run-1.json"), deploy),
                (PathBuf::from("broadcast/1/run-2.json"), receipts),
            ],
            &LoadOptions::default(),
        );

        let transaction = &set.transactions()[0].transaction;
        let receipt = set.receipt_for(transaction).unwrap();
        assert_eq!(receipt.block_number(), Some(42));
    }

    #[test]
    fn test_discover_skips_run_latest() {
        let dir = tempdir().unwrap();
        let run = json!({ "transactions": [], "timestamp": 1 });

        write_json(&dir.path().join("Deploy.s.sol/1/run-1.json"), &run);
        write_json(&dir.path().join("Deploy.s.sol/1/run-latest.json"), &run);
        write_json(&dir.path().join("Deploy.s.sol/5/run-2.json"), &run);
        fs::write(dir.path().join("Deploy.s.sol/5/notes.txt"), "ignored").unwrap();

        let paths = discover(dir.path()).unwrap();

        assert_eq!(
            paths,
            vec![
                dir.path().join("Deploy.s.sol/1/run-1.json"),
                dir.path().join("Deploy.s.sol/5/run-2.json"),
            ]
        );
    }

    #[test]
    fn test_discover_missing_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("broadcast");

        match discover(&missing) {
            Err(LoadError::MissingDirectory(path)) => assert_eq!(path, missing),
            other => panic!("Expected MissingDirectory, got {other:?}"),
        }
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Deploy.s.sol/1/run-1.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        match BroadcastSet::load(dir.path(), &LoadOptions::default()) {
            Err(LoadError::Malformed { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("Expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_load_reads_meta_deployments() {
        let dir = tempdir().unwrap();
        write_json(
            &dir.path().join("Deploy.s.sol/10/run-1.json"),
            &json!({
                "transactions": [],
                "receipts": [],
                "timestamp": 1,
                "meta": {
                    "env": "production",
                    "deployments": { "Vault": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa" }
                }
            }),
        );

        let set = BroadcastSet::load(dir.path(), &LoadOptions::default()).unwrap();

        assert_eq!(set.records().len(), 1);
        let record = &set.records()[0];
        assert_eq!(record.chain_id, 10);
        assert_eq!(record.env, "production");
        assert_eq!(record.deployments.get("Vault"), Some(&Address::repeat_byte(0xaa)));
    }
}
