//! Content-addressed block storage.
//!
//! A product is persisted as a handful of blocks (metadata, event columns,
//! bin columns), each addressed by the SHA-256 of its bytes. Blocks are
//! immutable and shared between every manifest that references them;
//! [`crate::ArtifactStore::sweep`] deletes the ones no manifest references.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::digest::BlockDigest;
use crate::error::{StoreError, StoreResult};

/// Content-addressed storage for opaque artifact blocks.
pub trait BlockStore: Send + Sync {
    /// Store `data` and return its digest. Identical blocks are stored once.
    fn put(&self, data: &[u8]) -> StoreResult<BlockDigest>;

    /// Retrieve the block for `digest`.
    fn get(&self, digest: &BlockDigest) -> StoreResult<Vec<u8>>;

    /// Check whether `digest` exists without reading the block.
    fn exists(&self, digest: &BlockDigest) -> StoreResult<bool>;

    /// Digests of every stored block, in no particular order.
    fn digests(&self) -> StoreResult<Vec<BlockDigest>>;

    /// Delete the block for `digest`. Returns whether it existed.
    fn delete(&self, digest: &BlockDigest) -> StoreResult<bool>;
}

/// Block files under `<root>/blocks/<first 2 hex chars>/<remaining hex chars>`.
pub struct FsBlockStore {
    blocks_dir: PathBuf,
}

impl FsBlockStore {
    /// Open a store rooted at `root`, creating `root/blocks/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StoreResult<Self> {
        let blocks_dir = root.as_ref().join("blocks");
        fs::create_dir_all(&blocks_dir)?;
        Ok(Self { blocks_dir })
    }

    fn shard_dir(&self, digest: &BlockDigest) -> PathBuf {
        self.blocks_dir.join(&digest.to_hex()[..2])
    }

    fn block_path(&self, digest: &BlockDigest) -> PathBuf {
        self.shard_dir(digest).join(&digest.to_hex()[2..])
    }

    /// Whether the file at `path` already holds the bytes of `digest`.
    fn holds(path: &Path, digest: &BlockDigest) -> bool {
        fs::read(path).is_ok_and(|existing| digest.matches(&existing))
    }
}

impl BlockStore for FsBlockStore {
    fn put(&self, data: &[u8]) -> StoreResult<BlockDigest> {
        let digest = BlockDigest::compute(data);
        let path = self.block_path(&digest);
        if Self::holds(&path, &digest) {
            return Ok(digest);
        }

        let shard = self.shard_dir(&digest);
        fs::create_dir_all(&shard)?;
        let mut tmp = NamedTempFile::new_in(&shard)?;
        tmp.write_all(data)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        tracing::trace!(digest = %digest, bytes = data.len(), "block stored");
        Ok(digest)
    }

    fn get(&self, digest: &BlockDigest) -> StoreResult<Vec<u8>> {
        fs::read(self.block_path(digest)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(*digest),
            _ => StoreError::Io(e),
        })
    }

    fn exists(&self, digest: &BlockDigest) -> StoreResult<bool> {
        Ok(self.block_path(digest).is_file())
    }

    fn digests(&self) -> StoreResult<Vec<BlockDigest>> {
        let mut out = Vec::new();
        for shard in fs::read_dir(&self.blocks_dir)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            let prefix = shard.file_name().to_string_lossy().into_owned();
            for block in fs::read_dir(shard.path())? {
                let name = block?.file_name();
                // Leftover temp files from an interrupted put do not parse.
                if let Ok(digest) = format!("{prefix}{}", name.to_string_lossy()).parse() {
                    out.push(digest);
                }
            }
        }
        Ok(out)
    }

    fn delete(&self, digest: &BlockDigest) -> StoreResult<bool> {
        match fs::remove_file(self.block_path(digest)) {
            Ok(()) => {
                // Only succeeds once the shard is empty.
                let _ = fs::remove_dir(self.shard_dir(digest));
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
