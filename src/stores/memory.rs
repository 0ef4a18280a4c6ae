//! In-memory stores for `--in-memory` mode and tests. Nothing survives a
//! restart.

use super::{ContentStore, MetadataStore, StoreResult, ensure_key_safe};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryContentStore {
    blobs: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every key currently holding a blob, in key order.
    #[cfg(test)]
    pub async fn keys(&self) -> Vec<String> {
        self.blobs.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Bytes) -> StoreResult<()> {
        ensure_key_safe(key)?;
        self.blobs.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.blobs.write().await.remove(key);
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    documents: RwLock<BTreeMap<String, String>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        ensure_key_safe(key)?;
        self.documents.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.documents.write().await.remove(key);
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        Ok(self.documents.read().await.keys().cloned().collect())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
