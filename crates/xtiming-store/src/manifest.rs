//! Cache keys and the manifests that publish a stored artifact.
//!
//! A manifest is the commit point of an entry: blocks are written first and
//! the manifest last, so an entry is visible only once all of its blocks are.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::digest::BlockDigest;
use crate::error::{StoreError, StoreResult};

/// Manifest layout version. Entries written with another version are
/// treated as corrupt and recomputed.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Identity of one cached product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub mission: String,
    pub obsid: String,
    pub instrument: String,
    /// Product kind, e.g. `calib`, `lc`, `gtis`.
    pub kind: String,
    /// Product parameters (bin width, energy window, ...).
    pub params: BTreeMap<String, String>,
}

impl CacheKey {
    pub fn new(
        mission: impl Into<String>,
        obsid: impl Into<String>,
        instrument: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            mission: mission.into(),
            obsid: obsid.into(),
            instrument: instrument.into(),
            kind: kind.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a product parameter. Values are rendered with `Display`, so
    /// `1.0_f64` and `1_f64` produce the same key.
    pub fn with_param(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Sorted `k=v` pairs joined by `,`; `_` when there are none.
    pub fn params_label(&self) -> String {
        if self.params.is_empty() {
            return "_".to_string();
        }
        self.params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Relative location of this entry: `<mission>/<obsid>/<kind>/<instrument>/<params>`.
    pub fn location(&self) -> PathBuf {
        [
            self.mission.as_str(),
            self.obsid.as_str(),
            self.kind.as_str(),
            self.instrument.as_str(),
            self.params_label().as_str(),
        ]
        .iter()
        .map(|part| path_component(part))
        .collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.mission,
            self.obsid,
            self.kind,
            self.instrument,
            self.params_label()
        )
    }
}

/// Make `raw` safe to use as a single path component.
fn path_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '=' | ',' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Published description of a stored artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub key: CacheKey,
    pub created_at: DateTime<Utc>,
    /// Fixed-schema metadata block.
    pub meta: BlockDigest,
    /// Array blocks, in the order the product wrote them.
    pub arrays: Vec<BlockDigest>,
}

impl Manifest {
    pub fn new(key: CacheKey, meta: BlockDigest, arrays: Vec<BlockDigest>) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            key,
            created_at: Utc::now(),
            meta,
            arrays,
        }
    }

    /// Every block this manifest keeps alive, metadata first.
    pub fn digests(&self) -> impl Iterator<Item = BlockDigest> + '_ {
        std::iter::once(self.meta).chain(self.arrays.iter().copied())
    }
}

/// Keyed storage of manifests.
pub trait ManifestStore: Send + Sync {
    /// Fetch the manifest for `key`; `Ok(None)` when nothing is published.
    fn get(&self, key: &CacheKey) -> StoreResult<Option<Manifest>>;

    /// Publish `manifest`, replacing any previous one for the same key.
    fn put(&self, manifest: &Manifest) -> StoreResult<()>;

    /// Unpublish `key`. Returns whether an entry existed.
    fn remove(&self, key: &CacheKey) -> StoreResult<bool>;

    /// All keys published for one observation, sorted.
    fn list(&self, mission: &str, obsid: &str) -> StoreResult<Vec<CacheKey>>;

    /// Every readable manifest in the store. Unparseable ones are skipped.
    fn all(&self) -> StoreResult<Vec<Manifest>>;
}

/// Filesystem manifest store.
///
/// Layout: `<root>/manifests/<mission>/<obsid>/<kind>/<instrument>/<params>.json`
pub struct FsManifestStore {
    manifests_dir: PathBuf,
}

impl FsManifestStore {
    pub fn new(root: impl AsRef<Path>) -> StoreResult<Self> {
        let manifests_dir = root.as_ref().join("manifests");
        fs::create_dir_all(&manifests_dir)?;
        Ok(Self { manifests_dir })
    }

    fn manifest_path(&self, key: &CacheKey) -> PathBuf {
        // Params labels contain dots (`bin=0.5`), so append rather than set_extension.
        let mut path = self.manifests_dir.join(key.location()).into_os_string();
        path.push(".json");
        PathBuf::from(path)
    }

    fn collect(dir: &Path, out: &mut Vec<PathBuf>) -> StoreResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                Self::collect(&path, out)?;
            } else if path.extension().is_some_and(|ext| ext == "json") {
                out.push(path);
            }
        }
        Ok(())
    }

    /// Parse every manifest below `dir`. I/O errors propagate; a file that
    /// does not parse is logged and skipped.
    fn read_under(dir: &Path) -> StoreResult<Vec<Manifest>> {
        let mut paths = Vec::new();
        Self::collect(dir, &mut paths)?;

        let mut manifests = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = match fs::read(&path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_slice::<Manifest>(&raw) {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable manifest")
                }
            }
        }
        Ok(manifests)
    }
}

impl ManifestStore for FsManifestStore {
    fn get(&self, key: &CacheKey) -> StoreResult<Option<Manifest>> {
        let path = self.manifest_path(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest: Manifest = serde_json::from_slice(&raw)
            .map_err(|e| StoreError::corrupt(key.to_string(), format!("manifest: {e}")))?;
        if &manifest.key != key {
            return Err(StoreError::corrupt(
                key.to_string(),
                format!("manifest belongs to {}", manifest.key),
            ));
        }
        Ok(Some(manifest))
    }

    fn put(&self, manifest: &Manifest) -> StoreResult<()> {
        let path = self.manifest_path(&manifest.key);
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.manifests_dir.clone());
        fs::create_dir_all(&parent)?;

        let content = serde_json::to_vec_pretty(manifest)?;
        let mut tmp = NamedTempFile::new_in(&parent)?;
        tmp.write_all(&content)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> StoreResult<bool> {
        match fs::remove_file(self.manifest_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, mission: &str, obsid: &str) -> StoreResult<Vec<CacheKey>> {
        let dir = self
            .manifests_dir
            .join(path_component(mission))
            .join(path_component(obsid));
        let mut keys: Vec<CacheKey> = Self::read_under(&dir)?
            .into_iter()
            .map(|manifest| manifest.key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn all(&self) -> StoreResult<Vec<Manifest>> {
        Self::read_under(&self.manifests_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CacheKey {
        CacheKey::new("nicer", "1010010101", "XTI", "lc").with_param("bin", 1.0_f64)
    }

    #[test]
    fn float_params_render_canonically() {
        let a = CacheKey::new("m", "o", "i", "lc").with_param("bin", 1.0_f64);
        let b = CacheKey::new("m", "o", "i", "lc").with_param("bin", 1_f64);
        assert_eq!(a, b);
        assert_eq!(a.params_label(), "bin=1");
    }

    #[test]
    fn params_label_is_sorted() {
        let k = CacheKey::new("m", "o", "i", "lc")
            .with_param("emin", 0.2)
            .with_param("bin", 2)
            .with_param("emax", 12);
        assert_eq!(k.params_label(), "bin=2,emax=12,emin=0.2");
    }

    #[test]
    fn empty_params_label() {
        assert_eq!(CacheKey::new("m", "o", "i", "calib").params_label(), "_");
    }

    #[test]
    fn location_is_sanitized() {
        let k = CacheKey::new("nicer", "../etc", "a/b", "lc");
        let loc = k.location();
        let parts: Vec<_> = loc.iter().map(|p| p.to_string_lossy().to_string()).collect();
        assert_eq!(parts, vec!["nicer", ".._etc", "lc", "a_b", "_"]);
        assert!(!parts.iter().any(|p| p == ".."));
    }

    #[test]
    fn fs_manifest_put_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsManifestStore::new(dir.path()).unwrap();
        let k = key();
        assert!(store.get(&k).unwrap().is_none());

        let manifest = Manifest::new(k.clone(), BlockDigest::compute(b"m"), vec![]);
        store.put(&manifest).unwrap();
        assert_eq!(store.get(&k).unwrap(), Some(manifest));

        assert!(store.remove(&k).unwrap());
        assert!(!store.remove(&k).unwrap());
        assert!(store.get(&k).unwrap().is_none());
    }

    #[test]
    fn garbage_manifest_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsManifestStore::new(dir.path()).unwrap();
        let k = key();
        let path = store.manifest_path(&k);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ not json").unwrap();

        match store.get(&k) {
            Err(StoreError::Corrupt { .. }) => {}
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn list_returns_keys_for_one_observation() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsManifestStore::new(dir.path()).unwrap();
        let digest = BlockDigest::compute(b"m");
        let a = CacheKey::new("nicer", "1", "XTI", "calib");
        let b = CacheKey::new("nicer", "1", "XTI", "lc").with_param("bin", 2);
        let other = CacheKey::new("nicer", "2", "XTI", "calib");
        for k in [&a, &b, &other] {
            store.put(&Manifest::new(k.clone(), digest, vec![])).unwrap();
        }

        let listed = store.list("nicer", "1").unwrap();
        assert_eq!(listed, vec![a, b]);
        assert!(store.list("nicer", "404").unwrap().is_empty());
    }
}
