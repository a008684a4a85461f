//! Split-record persistence: one metadata block plus any number of array
//! blocks, joined by a manifest.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::blocks::{BlockStore, FsBlockStore};
use crate::digest::BlockDigest;
use crate::error::{StoreError, StoreResult};
use crate::fakes::{MemoryBlockStore, MemoryManifestStore};
use crate::manifest::{
    CacheKey, FsManifestStore, Manifest, ManifestStore, MANIFEST_SCHEMA_VERSION,
};

/// Serialized form of a product as handed to and returned from the store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredArtifact {
    pub meta: Vec<u8>,
    pub arrays: Vec<Vec<u8>>,
}

impl StoredArtifact {
    pub fn new(meta: Vec<u8>) -> Self {
        Self {
            meta,
            arrays: Vec::new(),
        }
    }

    pub fn with_array(mut self, block: Vec<u8>) -> Self {
        self.arrays.push(block);
        self
    }

    pub fn total_bytes(&self) -> usize {
        self.meta.len() + self.arrays.iter().map(Vec::len).sum::<usize>()
    }
}

/// Outcome of [`ArtifactStore::sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Blocks still referenced by a manifest.
    pub live: usize,
    /// Unreferenced blocks deleted.
    pub removed: usize,
}

/// Block store plus manifest store, exposed as whole-artifact load/save.
#[derive(Clone)]
pub struct ArtifactStore {
    blocks: Arc<dyn BlockStore>,
    manifests: Arc<dyn ManifestStore>,
    // Serializes save against sweep so a sweep never sees blocks whose
    // manifest is not yet published.
    gate: Arc<Mutex<()>>,
}

impl ArtifactStore {
    pub fn new(blocks: Arc<dyn BlockStore>, manifests: Arc<dyn ManifestStore>) -> Self {
        Self {
            blocks,
            manifests,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Filesystem store rooted at `root` (`blocks/` and `manifests/` below it).
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref();
        Ok(Self::new(
            Arc::new(FsBlockStore::new(root)?),
            Arc::new(FsManifestStore::new(root)?),
        ))
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryBlockStore::new()),
            Arc::new(MemoryManifestStore::new()),
        )
    }

    /// Persist `artifact` under `key`. Blocks go first; the manifest is
    /// published last so a crash mid-save leaves the previous entry (or no
    /// entry) visible, never a partial one.
    pub fn save(&self, key: &CacheKey, artifact: &StoredArtifact) -> StoreResult<Manifest> {
        let _gate = self.lock();
        let meta = self.blocks.put(&artifact.meta)?;
        let arrays = artifact
            .arrays
            .iter()
            .map(|block| self.blocks.put(block))
            .collect::<StoreResult<Vec<_>>>()?;

        let manifest = Manifest::new(key.clone(), meta, arrays);
        self.manifests.put(&manifest)?;
        tracing::debug!(
            key = %key,
            blocks = manifest.arrays.len() + 1,
            bytes = artifact.total_bytes(),
            "artifact saved"
        );
        Ok(manifest)
    }

    /// Load the artifact published under `key`.
    ///
    /// Returns `Ok(None)` when nothing is published and `Corrupt` when a
    /// manifest exists but its blocks are missing or fail verification.
    pub fn load(&self, key: &CacheKey) -> StoreResult<Option<StoredArtifact>> {
        let Some(manifest) = self.manifests.get(key)? else {
            return Ok(None);
        };
        if manifest.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(StoreError::corrupt(
                key.to_string(),
                format!("unsupported schema version {}", manifest.schema_version),
            ));
        }

        let meta = self.verified_block(key, &manifest.meta)?;
        let arrays = manifest
            .arrays
            .iter()
            .map(|digest| self.verified_block(key, digest))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Some(StoredArtifact { meta, arrays }))
    }

    /// Whether a manifest is published for `key` (blocks are not verified).
    pub fn contains(&self, key: &CacheKey) -> StoreResult<bool> {
        Ok(self.manifests.get(key)?.is_some())
    }

    pub fn remove(&self, key: &CacheKey) -> StoreResult<bool> {
        self.manifests.remove(key)
    }

    pub fn list(&self, mission: &str, obsid: &str) -> StoreResult<Vec<CacheKey>> {
        self.manifests.list(mission, obsid)
    }

    /// Delete every block that no published manifest references.
    ///
    /// Blocks of replaced or removed entries are only reclaimed here.
    /// Concurrent saves through clones of this store wait for the sweep;
    /// other processes sharing the directory are not coordinated with.
    pub fn sweep(&self) -> StoreResult<SweepReport> {
        let _gate = self.lock();
        let live: HashSet<BlockDigest> = self
            .manifests
            .all()?
            .iter()
            .flat_map(Manifest::digests)
            .collect();

        let mut report = SweepReport::default();
        for digest in self.blocks.digests()? {
            if live.contains(&digest) {
                report.live += 1;
            } else if self.blocks.delete(&digest)? {
                report.removed += 1;
            }
        }
        tracing::debug!(live = report.live, removed = report.removed, "blocks swept");
        Ok(report)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn verified_block(&self, key: &CacheKey, digest: &BlockDigest) -> StoreResult<Vec<u8>> {
        let data = match self.blocks.get(digest) {
            Ok(data) => data,
            Err(StoreError::NotFound(d)) => {
                return Err(StoreError::corrupt(
                    key.to_string(),
                    format!("missing block {d}"),
                ))
            }
            Err(e) => return Err(e),
        };
        if !digest.matches(&data) {
            return Err(StoreError::corrupt(
                key.to_string(),
                format!("block {digest} failed digest verification"),
            ));
        }
        Ok(data)
    }
}
