//! Read-through / write-through cache of pipeline products.
//!
//! [`ArtifactCache`] wraps an [`ArtifactStore`] and converts between stored
//! artifacts and typed products. An entry that cannot be read back is
//! treated as absent and recomputed; a failed write is logged and reported
//! through [`Cached::persisted`] but never fails the call. Blocks left
//! unreferenced by an overwrite or an invalidation are swept right away.

mod columns;
mod products;

use std::path::Path;

use serde::Serialize;
use xtiming_store::{ArtifactStore, CacheKey, SweepReport};

use crate::error::{Result, TimingError};
use crate::metrics::METRICS;
use crate::obs;

pub use columns::{Column, ColumnBlock};
pub use products::{Product, ProductKind};

/// How a [`Cached`] value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Loaded from a persisted entry.
    Hit,
    /// Computed because no readable entry existed.
    Miss,
    /// Recomputed because overwrite was requested.
    Overwritten,
}

/// Entries dropped by [`ArtifactCache::invalidate_many`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invalidation {
    /// Keys that had a published entry.
    pub removed: Vec<CacheKey>,
    /// Blocks deleted because nothing references them any more.
    pub blocks_removed: usize,
}

/// A product together with its cache provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub status: CacheStatus,
    /// Whether the value is now persisted under its key.
    pub persisted: bool,
}

impl<T> Cached<T> {
    pub fn is_hit(&self) -> bool {
        self.status == CacheStatus::Hit
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

#[derive(Clone)]
pub struct ArtifactCache {
    store: ArtifactStore,
}

impl ArtifactCache {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(ArtifactStore::open(root)?))
    }

    pub fn in_memory() -> Self {
        Self::new(ArtifactStore::in_memory())
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Load the product stored under `key`, if any.
    ///
    /// Unreadable or inconsistent entries are reported as `CacheCorrupt`.
    pub fn load<P: Product>(&self, key: &CacheKey) -> Result<Option<P>> {
        check_kind::<P>(key)?;
        let artifact = match self.store.load(key) {
            Ok(Some(artifact)) => artifact,
            Ok(None) => return Ok(None),
            Err(err) if err.is_corruption() => return Err(TimingError::corrupt(err)),
            Err(err) => return Err(err.into()),
        };
        P::from_artifact(artifact).map(Some)
    }

    pub fn save<P: Product>(&self, key: &CacheKey, value: &P) -> Result<()> {
        check_kind::<P>(key)?;
        let artifact = value.to_artifact()?;
        self.store.save(key, &artifact)?;
        Ok(())
    }

    /// Return the product under `key`, computing and persisting it when it
    /// is absent, unreadable, or `overwrite` is set.
    ///
    /// Only errors from `compute` are returned; read and write failures of
    /// the cache itself are logged and absorbed.
    pub fn get_or_compute<P, F>(
        &self,
        key: &CacheKey,
        overwrite: bool,
        compute: F,
    ) -> Result<Cached<P>>
    where
        P: Product,
        F: FnOnce() -> Result<P>,
    {
        if !overwrite {
            match self.load::<P>(key) {
                Ok(Some(value)) => {
                    METRICS.inc_cache_hits();
                    obs::emit_cache_hit(key);
                    return Ok(Cached {
                        value,
                        status: CacheStatus::Hit,
                        persisted: true,
                    });
                }
                Ok(None) => {}
                Err(err) => obs::emit_cache_corrupt(key, &err),
            }
        }

        METRICS.inc_cache_misses();
        obs::emit_cache_miss(key, overwrite);
        let value = compute()?;

        let persisted = match self.save(key, &value) {
            Ok(()) => true,
            Err(err) => {
                METRICS.inc_cache_write_failures();
                obs::emit_cache_write_failed(key, &err);
                false
            }
        };
        let status = if overwrite {
            // The replaced entry's blocks are garbage unless shared.
            if persisted {
                self.sweep_logged();
            }
            CacheStatus::Overwritten
        } else {
            CacheStatus::Miss
        };
        Ok(Cached {
            value,
            status,
            persisted,
        })
    }

    /// Keys cached for one observation, sorted.
    pub fn entries(&self, mission: &str, obsid: &str) -> Result<Vec<CacheKey>> {
        Ok(self.store.list(mission, obsid)?)
    }

    /// Drop the entry for `key` and reclaim its blocks. Returns whether an
    /// entry existed.
    pub fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        let dropped = self.invalidate_many(std::slice::from_ref(key))?;
        Ok(!dropped.removed.is_empty())
    }

    /// Drop every entry in `keys`, then sweep once.
    pub fn invalidate_many(&self, keys: &[CacheKey]) -> Result<Invalidation> {
        let mut removed = Vec::new();
        for key in keys {
            if self.store.remove(key)? {
                removed.push(key.clone());
            }
        }
        let report = self.sweep()?;
        Ok(Invalidation {
            removed,
            blocks_removed: report.removed,
        })
    }

    /// Delete blocks no published entry references.
    pub fn sweep(&self) -> Result<SweepReport> {
        let report = self.store.sweep()?;
        obs::emit_cache_swept(report.live, report.removed);
        Ok(report)
    }

    fn sweep_logged(&self) {
        if let Err(err) = self.sweep() {
            obs::emit_cache_sweep_failed(&err);
        }
    }
}

fn check_kind<P: Product>(key: &CacheKey) -> Result<()> {
    if key.kind != P::KIND.as_str() {
        return Err(TimingError::Config(format!(
            "cache key {key} used for a {} product",
            P::KIND
        )));
    }
    Ok(())
}
