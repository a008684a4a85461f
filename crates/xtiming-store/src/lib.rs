//! xtiming-store: persistence layer for xtiming artifacts.
//!
//! Products are stored as a metadata block plus array blocks in a
//! content-addressed [`BlockStore`], published through a [`Manifest`]
//! keyed by [`CacheKey`]. [`ArtifactStore`] combines the two.

pub mod artifact;
pub mod blocks;
pub mod digest;
pub mod error;
pub mod fakes;
pub mod manifest;

pub use artifact::{ArtifactStore, StoredArtifact, SweepReport};
pub use blocks::{BlockStore, FsBlockStore};
pub use digest::BlockDigest;
pub use error::{StoreError, StoreResult};
pub use fakes::{MemoryBlockStore, MemoryManifestStore};
pub use manifest::{CacheKey, FsManifestStore, Manifest, ManifestStore, MANIFEST_SCHEMA_VERSION};
