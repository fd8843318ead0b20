//! File-backed key-value store
//!
//! Keeps the whole keyspace in memory and rewrites a JSON snapshot on every
//! batch. The snapshot goes to a temporary file first and is renamed over
//! the previous one, so readers only ever see a complete batch.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::kv::{scan_prefix, Batch, KvStore, StorageError};

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub file_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".namechain_data"),
            file_name: "chain.json".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }
}

/// Durable [`KvStore`] persisted as a single JSON snapshot
#[derive(Debug)]
pub struct FileStore {
    config: StorageConfig,
    map: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl FileStore {
    /// Open the store, loading the existing snapshot if there is one
    pub fn open(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)?;

        let path = config.data_dir.join(&config.file_name);
        let map = if path.exists() {
            let reader = BufReader::new(fs::File::open(&path)?);
            let encoded: BTreeMap<String, String> = serde_json::from_reader(reader)?;
            let mut map = BTreeMap::new();
            for (key, value) in encoded {
                let key = hex::decode(&key)
                    .map_err(|e| StorageError::InvalidData(format!("key {}: {}", key, e)))?;
                let value = hex::decode(&value)
                    .map_err(|e| StorageError::InvalidData(format!("value: {}", e)))?;
                map.insert(key, value);
            }
            log::debug!("Loaded {} entries from {}", map.len(), path.display());
            map
        } else {
            BTreeMap::new()
        };

        Ok(Self { config, map })
    }

    fn snapshot_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.file_name)
    }

    fn save(&self, map: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<(), StorageError> {
        let encoded: BTreeMap<String, String> = map
            .iter()
            .map(|(key, value)| (hex::encode(key), hex::encode(value)))
            .collect();

        // Write to temporary file first
        let temp_path = self
            .config
            .data_dir
            .join(format!("{}.tmp", self.config.file_name));
        let file = fs::File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &encoded)?;
        writer.flush()?;

        // Atomic rename
        fs::rename(&temp_path, self.snapshot_path())?;
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.map.get(key).cloned())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        Ok(scan_prefix(&self.map, prefix))
    }

    fn write_batch(&mut self, batch: Batch) -> Result<(), StorageError> {
        let mut next = self.map.clone();
        batch.apply_to(&mut next);
        self.save(&next)?;
        self.map = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_reopen_sees_committed_batches() {
        let dir = tempdir().unwrap();
        {
            let mut store = FileStore::open(StorageConfig::in_dir(dir.path())).unwrap();
            let mut batch = Batch::new();
            batch.put(b"k1".to_vec(), b"v1".to_vec());
            batch.put(b"k2".to_vec(), b"v2".to_vec());
            store.write_batch(batch).unwrap();
            store.delete(b"k2").unwrap();
        }

        let store = FileStore::open(StorageConfig::in_dir(dir.path())).unwrap();
        assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get(b"k2").unwrap(), None);
        assert!(!dir.path().join("chain.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_snapshot_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("chain.json"), b"{\"zz\": \"00\"}").unwrap();
        assert!(matches!(
            FileStore::open(StorageConfig::in_dir(dir.path())),
            Err(StorageError::InvalidData(_))
        ));
    }
}
