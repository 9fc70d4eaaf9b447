//! CLI command implementations
//!
//! Both commands open the shard read-only, so inspecting a live data
//! directory never writes to it.

use std::path::Path;

use serde_json::{json, Value};

use crate::observability::Logger;
use crate::store::{KvStoreFactory, ShardStore, StoreConfig};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let data = match cmd {
        Command::Inspect { config } => inspect(&config)?,
        Command::Get {
            config,
            partition,
            key,
            deleted,
        } => get(&config, partition, &key, deleted)?,
    };
    write_response(data)
}

fn open_read_only(config_path: &Path) -> CliResult<ShardStore> {
    let config = StoreConfig::load(config_path)?.with_read_only(true);
    Ok(KvStoreFactory::create(config, Logger::stderr())?)
}

/// State of every owned partition
pub fn inspect(config_path: &Path) -> CliResult<Value> {
    let mut store = open_read_only(config_path)?;

    let mut partitions = Vec::new();
    for (partition, state) in store.list_persisted_partitions() {
        partitions.push(json!({
            "partition": partition,
            "state": serde_json::to_value(&state)?,
        }));
    }

    let data = json!({
        "shard_id": store.config().shard_id,
        "backend": store.engine_name(),
        "file": store.file_path().display().to_string(),
        "revision": store.revision(),
        "partitions": partitions,
    });
    store.close()?;
    Ok(data)
}

/// Metadata of one document
pub fn get(config_path: &Path, partition: u16, key: &str, deleted: bool) -> CliResult<Value> {
    let mut store = open_read_only(config_path)?;
    if !store.owned_partitions().contains(&partition) {
        return Err(CliError::Config(format!(
            "partition {} is not owned by shard {}",
            partition,
            store.config().shard_id
        )));
    }

    let value = store.get(key.as_bytes(), partition, deleted)?;
    let data = serde_json::to_value(&value)?;
    store.close()?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Document;
    use crate::mutation::MutationResult;
    use crate::partition::{LifecycleState, PartitionState};
    use std::fs;
    use tempfile::TempDir;

    fn write_config(temp: &TempDir) -> std::path::PathBuf {
        let data_dir = temp.path().join("data");
        let config_path = temp.path().join("shard.json");
        let config = json!({
            "db_name": data_dir.to_string_lossy(),
            "shard_id": 0,
            "max_shards": 2,
            "max_partitions": 4,
        });
        fs::write(&config_path, config.to_string()).unwrap();
        config_path
    }

    fn populate(config_path: &Path) {
        let config = StoreConfig::load(config_path).unwrap();
        let mut store = KvStoreFactory::create(config, Logger::disabled()).unwrap();
        store
            .update_partition_state(0, PartitionState::with_lifecycle(LifecycleState::Active))
            .unwrap();
        store.begin_transaction().unwrap();
        store
            .set(
                &Document::new(0, "k1", "v1").with_cas(77),
                Box::new(|_: MutationResult| {}),
            )
            .unwrap();
        assert!(store.commit(0, 1, 77, 0).unwrap());
        store.close().unwrap();
    }

    #[test]
    fn test_inspect_lists_owned_partitions() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(&temp);
        populate(&config_path);

        let data = inspect(&config_path).unwrap();
        assert_eq!(data["revision"], 1);
        let partitions = data["partitions"].as_array().unwrap();
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0]["partition"], 0);
        assert_eq!(partitions[0]["state"]["state"], "active");
        assert_eq!(partitions[0]["state"]["max_cas"], 77);
        assert_eq!(partitions[1]["partition"], 2);
        assert_eq!(partitions[1]["state"]["state"], "dead");
    }

    #[test]
    fn test_get_prints_metadata() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(&temp);
        populate(&config_path);

        let data = get(&config_path, 0, "k1", false).unwrap();
        assert_eq!(data["status"], "success");
        assert_eq!(data["item"]["metadata"]["cas"], 77);
        assert_eq!(data["item"]["key"], "k1");

        let missing = get(&config_path, 0, "nope", false).unwrap();
        assert_eq!(missing["status"], "not_found");
    }

    #[test]
    fn test_get_rejects_unowned_partition() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(&temp);
        populate(&config_path);

        let err = get(&config_path, 1, "k1", false).unwrap_err();
        assert_eq!(err.code_str(), "SHARD_CLI_CONFIG_ERROR");
    }

    #[test]
    fn test_missing_config_is_config_error() {
        let temp = TempDir::new().unwrap();
        let err = inspect(&temp.path().join("absent.json")).unwrap_err();
        assert_eq!(err.code_str(), "SHARD_CLI_CONFIG_ERROR");
    }
}
