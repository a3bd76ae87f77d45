use crate::core::cache::KeyValueStore;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory store backed by a HashMap. Used in tests and as the fallback
/// when the on-disk store cannot be opened.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.read().await.get(key).cloned()
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) {
        self.inner.write().await.insert(key.to_vec(), value);
    }
}
