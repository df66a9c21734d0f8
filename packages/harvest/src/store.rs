//! On-disk cache of enriched partitions.
//!
//! One JSON array of flat records per (year, agency) partition, at
//! `<data>/<year>/<agency>.json`. File presence alone marks a partition as
//! done: its content is trusted and never re-fetched. Writes go to a
//! sibling temporary file that is renamed into place, so an interrupted
//! save never leaves a truncated file at the cache path.

use std::path::{Path, PathBuf};

use madzi_api_models::{FlatRecord, PartitionKey};

use crate::HarvestError;
use crate::paths::{ensure_dir, year_dir};

/// A partition file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPartition {
    pub year: i32,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PartitionStore {
    root: PathBuf,
}

impl PartitionStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_for(&self, key: &PartitionKey) -> PathBuf {
        year_dir(&self.root, key.year).join(key.file_name())
    }

    #[must_use]
    pub fn has(&self, key: &PartitionKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Reads a cached partition.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError`] if the file cannot be read or is not a JSON
    /// array of objects.
    pub fn load(&self, key: &PartitionKey) -> Result<Vec<FlatRecord>, HarvestError> {
        load_path(&self.path_for(key))
    }

    /// Writes a partition, creating its year directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError`] if encoding or any filesystem step fails.
    pub fn save(
        &self,
        key: &PartitionKey,
        records: &[FlatRecord],
    ) -> Result<PathBuf, HarvestError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }

        let json = serde_json::to_string_pretty(records)?;
        let staging = path.with_extension("json.partial");
        std::fs::write(&staging, json)?;
        if let Err(e) = std::fs::rename(&staging, &path) {
            let _ = std::fs::remove_file(&staging);
            return Err(e.into());
        }

        Ok(path)
    }

    /// Every partition file under the root, ordered by year then file name.
    /// Directories whose name is not a year are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Io`] if a directory cannot be listed.
    pub fn cached_partitions(&self) -> Result<Vec<CachedPartition>, HarvestError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut years: Vec<(i32, PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(year) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<i32>().ok())
            {
                years.push((year, entry.path()));
            }
        }
        years.sort();

        let mut partitions = Vec::new();
        for (year, dir) in years {
            let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
                .collect();
            files.sort();

            partitions.extend(files.into_iter().map(|path| CachedPartition { year, path }));
        }

        Ok(partitions)
    }
}

/// Reads one partition file.
///
/// # Errors
///
/// Returns [`HarvestError`] if the file cannot be read or decoded.
pub fn load_path(path: &Path) -> Result<Vec<FlatRecord>, HarvestError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
