//! In-memory fakes for the storage traits (testing only)
//!
//! `MemoryBlockStore` and `MemoryManifestStore` satisfy the trait contracts
//! without touching the filesystem.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::blocks::BlockStore;
use crate::digest::BlockDigest;
use crate::error::{StoreError, StoreResult};
use crate::manifest::{CacheKey, Manifest, ManifestStore};

// ---------------------------------------------------------------------------
// MemoryBlockStore
// ---------------------------------------------------------------------------

/// Block store backed by a `HashMap<digest, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: Mutex<HashMap<BlockDigest, Vec<u8>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the bytes stored under `digest`, simulating on-disk rot.
    pub fn tamper(&self, digest: &BlockDigest, data: &[u8]) {
        let mut blocks = self.blocks.lock().unwrap();
        blocks.insert(*digest, data.to_vec());
    }

    /// Drop a block, simulating a partially deleted entry.
    pub fn evict(&self, digest: &BlockDigest) {
        let mut blocks = self.blocks.lock().unwrap();
        blocks.remove(digest);
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockStore for MemoryBlockStore {
    fn put(&self, data: &[u8]) -> StoreResult<BlockDigest> {
        let digest = BlockDigest::compute(data);
        let mut blocks = self.blocks.lock().unwrap();
        blocks.insert(digest, data.to_vec());
        Ok(digest)
    }

    fn get(&self, digest: &BlockDigest) -> StoreResult<Vec<u8>> {
        let blocks = self.blocks.lock().unwrap();
        blocks
            .get(digest)
            .cloned()
            .ok_or(StoreError::NotFound(*digest))
    }

    fn exists(&self, digest: &BlockDigest) -> StoreResult<bool> {
        Ok(self.blocks.lock().unwrap().contains_key(digest))
    }

    fn digests(&self) -> StoreResult<Vec<BlockDigest>> {
        Ok(self.blocks.lock().unwrap().keys().copied().collect())
    }

    fn delete(&self, digest: &BlockDigest) -> StoreResult<bool> {
        Ok(self.blocks.lock().unwrap().remove(digest).is_some())
    }
}

// ---------------------------------------------------------------------------
// MemoryManifestStore
// ---------------------------------------------------------------------------

/// Manifest store backed by a `HashMap<CacheKey, Manifest>`.
#[derive(Debug, Default)]
pub struct MemoryManifestStore {
    manifests: Mutex<HashMap<CacheKey, Manifest>>,
}

impl MemoryManifestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ManifestStore for MemoryManifestStore {
    fn get(&self, key: &CacheKey) -> StoreResult<Option<Manifest>> {
        Ok(self.manifests.lock().unwrap().get(key).cloned())
    }

    fn put(&self, manifest: &Manifest) -> StoreResult<()> {
        let mut manifests = self.manifests.lock().unwrap();
        manifests.insert(manifest.key.clone(), manifest.clone());
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> StoreResult<bool> {
        Ok(self.manifests.lock().unwrap().remove(key).is_some())
    }

    fn list(&self, mission: &str, obsid: &str) -> StoreResult<Vec<CacheKey>> {
        let manifests = self.manifests.lock().unwrap();
        let mut keys: Vec<CacheKey> = manifests
            .keys()
            .filter(|k| k.mission == mission && k.obsid == obsid)
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn all(&self) -> StoreResult<Vec<Manifest>> {
        Ok(self.manifests.lock().unwrap().values().cloned().collect())
    }
}
