//! Content-addressed, incremental per-file analysis cache.
//!
//! One JSON file per project (`<cache_dir>/analysis_cache.json`) holds
//! `{format_version, fingerprint, entries}`. Entries are keyed by the
//! project-relative, forward-slash path of the analysed file and carry the
//! SHA-256 of its bytes plus an opaque payload.
//!
//! Loading never fails: a missing, corrupt, or mismatched file yields an empty
//! cache and the run recomputes everything. Saving goes through a temporary
//! file and a rename so a crash mid-write keeps the previous cache intact.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::errors::AnalysisError;

/// Bump when the payload layout changes to force a cold start.
pub const CACHE_FORMAT_VERSION: &str = "1.1.0";
pub const CACHE_FILE_NAME: &str = "analysis_cache.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry<P> {
    pub hash: String,
    pub payload: P,
}

#[derive(Serialize, Deserialize)]
struct CacheFile<P> {
    format_version: String,
    fingerprint: String,
    entries: BTreeMap<String, CacheEntry<P>>,
}

#[derive(Deserialize)]
struct CacheHeader {
    format_version: String,
    fingerprint: String,
}

#[derive(Debug)]
pub struct IncrementalCache<P> {
    root: PathBuf,
    path: PathBuf,
    fingerprint: String,
    entries: BTreeMap<String, CacheEntry<P>>,
    dirty: bool,
}

impl<P> IncrementalCache<P>
where
    P: Serialize + DeserializeOwned + Clone,
{
    /// Start with no entries, ignoring whatever is on disk.
    #[must_use]
    pub fn empty(root: &Path, cache_dir: &Path, fingerprint: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            path: cache_dir.join(CACHE_FILE_NAME),
            fingerprint: fingerprint.to_string(),
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load the cache stored under `cache_dir`, or start empty.
    #[must_use]
    pub fn open(root: &Path, cache_dir: &Path, fingerprint: &str) -> Self {
        let mut cache = Self::empty(root, cache_dir, fingerprint);
        let data = match fs::read_to_string(&cache.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %cache.path.display(), "No cache file, starting cold");
                return cache;
            }
            Err(e) => {
                tracing::warn!(path = %cache.path.display(), error = %e, "Cache unreadable, starting cold");
                return cache;
            }
        };

        let header: CacheHeader = match serde_json::from_str(&data) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(path = %cache.path.display(), error = %e, "Cache corrupt, starting cold");
                return cache;
            }
        };
        if header.format_version != CACHE_FORMAT_VERSION {
            tracing::info!(
                stored = %header.format_version,
                current = CACHE_FORMAT_VERSION,
                "Cache format changed, discarding"
            );
            return cache;
        }
        if header.fingerprint != cache.fingerprint {
            tracing::info!("Analysis settings changed, discarding cache");
            return cache;
        }

        match serde_json::from_str::<CacheFile<P>>(&data) {
            Ok(file) => {
                tracing::info!(entries = file.entries.len(), "Loaded analysis cache");
                cache.entries = file.entries;
            }
            Err(e) => {
                tracing::warn!(path = %cache.path.display(), error = %e, "Cache corrupt, starting cold");
            }
        }
        cache
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Portable key for `file`.
    ///
    /// # Errors
    /// `AnalysisError::PathResolution` when `file` is not inside the project root.
    pub fn cache_key(&self, file: &Path) -> Result<String, AnalysisError> {
        cache_key(&self.root, file)
    }

    /// Cached payload for `file`, if its current content hash matches.
    #[must_use]
    pub fn get(&self, file: &Path) -> Option<P> {
        let key = self.key_or_warn(file)?;
        let entry = self.entries.get(&key)?;
        let current = hash_file(file).ok()?;
        (entry.hash == current).then(|| entry.payload.clone())
    }

    /// Record `payload` for `file` under its current content hash.
    /// Files outside the root or unreadable files are skipped with a warning.
    pub fn update(&mut self, file: &Path, payload: P) {
        let Some(key) = self.key_or_warn(file) else {
            return;
        };
        match hash_file(file) {
            Ok(hash) => {
                self.entries.insert(key, CacheEntry { hash, payload });
                self.dirty = true;
            }
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "Cannot hash file, not caching");
            }
        }
    }

    /// Drop entries whose file is not in `known`.
    pub fn prune(&mut self, known: &[PathBuf]) {
        let keep: BTreeSet<String> = known.iter().filter_map(|p| self.key_or_warn(p)).collect();
        let before = self.entries.len();
        self.entries.retain(|k, _| keep.contains(k));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
            tracing::debug!(removed, "Pruned stale cache entries");
        }
    }

    /// Persist when dirty; write-then-rename.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or the write fails.
    pub fn save(&mut self) -> Result<(), AnalysisError> {
        if !self.dirty {
            tracing::debug!("Cache unchanged, skipping write");
            return Ok(());
        }
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = CacheFile {
            format_version: CACHE_FORMAT_VERSION.to_string(),
            fingerprint: self.fingerprint.clone(),
            entries: self.entries.clone(),
        };
        let data = serde_json::to_string(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        let written = fs::write(&tmp, data).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(AnalysisError::Cache(format!("writing {}: {e}", self.path.display())));
        }
        tracing::info!(path = %self.path.display(), entries = self.entries.len(), "Saved analysis cache");
        self.dirty = false;
        Ok(())
    }

    fn key_or_warn(&self, file: &Path) -> Option<String> {
        match self.cache_key(file) {
            Ok(k) => Some(k),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping cache operation");
                None
            }
        }
    }
}

/// Project-relative, forward-slash key. Case-folded where the filesystem
/// usually is case-insensitive.
///
/// # Errors
/// `AnalysisError::PathResolution` when `file` escapes `root`.
pub fn cache_key(root: &Path, file: &Path) -> Result<String, AnalysisError> {
    let unresolved = || AnalysisError::PathResolution { path: file.to_path_buf(), root: root.to_path_buf() };
    let rel = if file.is_absolute() || (root.is_relative() && file.starts_with(root)) {
        file.strip_prefix(root).map_err(|_| unresolved())?
    } else {
        file
    };
    let mut parts: Vec<String> = Vec::new();
    for c in rel.components() {
        match c {
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(unresolved()),
        }
    }
    if parts.is_empty() {
        return Err(unresolved());
    }
    let key = parts.join("/");
    if cfg!(any(target_os = "windows", target_os = "macos")) {
        Ok(key.to_lowercase())
    } else {
        Ok(key)
    }
}

#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// # Errors
/// Returns the underlying IO error if the file cannot be read.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    Ok(content_hash(&fs::read(path)?))
}

/// Remove the cache file under `cache_dir`. Returns whether a file was removed.
///
/// # Errors
/// Returns an IO error other than "not found".
pub fn clear_cache(cache_dir: &Path) -> Result<bool, AnalysisError> {
    match fs::remove_file(cache_dir.join(CACHE_FILE_NAME)) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
