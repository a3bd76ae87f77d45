use crate::core::cache::KeyValueStore;
use anyhow::Result;
use async_trait::async_trait;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use tracing::debug;

/// Persistent store backed by a single fjall partition. Storage failures are
/// logged and degrade to cache misses; they never fail a fetch.
pub struct DiskStore {
    // Held so the keyspace outlives the partition handle
    _keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self> {
        let keyspace = fjall::Config::new(path).open()?;
        let partition = keyspace.open_partition("fundcmp", PartitionCreateOptions::default())?;
        Ok(Self {
            _keyspace: keyspace,
            partition,
        })
    }
}

#[async_trait]
impl KeyValueStore for DiskStore {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.partition.get(key) {
            Ok(value) => value.map(|slice| slice.to_vec()),
            Err(e) => {
                debug!("Disk store read error: {e}");
                None
            }
        }
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) {
        if let Err(e) = self.partition.insert(key, value) {
            debug!("Disk store write error: {e}");
        }
    }
}
