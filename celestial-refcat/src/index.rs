//! The master index: cell id → shard file, written once per conversion.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use celestial_sky::healpix::npix;
use celestial_sky::CellId;
use serde::{Deserialize, Serialize};

use crate::epoch::Epoch;
use crate::error::{RefcatError, RefcatResult};
use crate::shard::{FileShardHandle, ShardHandle};

pub const INDEX_FILE_NAME: &str = "index.json";

/// File name of the shard holding `cell`.
pub fn shard_file_name(cell: CellId) -> String {
    format!("{}.shard", cell)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Path relative to the catalog directory.
    pub file: String,
    pub records: u64,
}

/// Which ids one input file contributed, and how many of its rows were
/// rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub source: String,
    pub first_id: Option<i64>,
    pub last_id: Option<i64>,
    pub records: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterIndex {
    /// Absent in indexes from before versioning, which read as 0.
    #[serde(default)]
    pub format_version: u32,
    pub depth: u8,
    #[serde(default)]
    pub reference_epoch: Option<Epoch>,
    pub flux_columns: Vec<String>,
    pub shards: BTreeMap<CellId, IndexEntry>,
    #[serde(default)]
    pub provenance: Vec<ProvenanceEntry>,
}

impl MasterIndex {
    pub fn path_in(dir: impl AsRef<Path>) -> std::path::PathBuf {
        dir.as_ref().join(INDEX_FILE_NAME)
    }

    pub fn read(dir: impl AsRef<Path>) -> RefcatResult<Self> {
        let path = Self::path_in(dir);
        let text = fs::read_to_string(&path).map_err(|e| RefcatError::io(&path, e))?;
        let index: Self = serde_json::from_str(&text)
            .map_err(|e| RefcatError::index(format!("{}: {}", path.display(), e)))?;
        index.validate()?;
        Ok(index)
    }

    /// Write `index.json` through a temporary file and rename.
    pub fn write(&self, dir: impl AsRef<Path>) -> RefcatResult<()> {
        let path = Self::path_in(&dir);
        let temp_path = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| RefcatError::index(e.to_string()))?;
        fs::write(&temp_path, text).map_err(|e| RefcatError::io(&temp_path, e))?;
        fs::rename(&temp_path, &path).map_err(|e| RefcatError::io(&path, e))
    }

    pub fn validate(&self) -> RefcatResult<()> {
        if self.depth > celestial_sky::MAX_DEPTH {
            return Err(RefcatError::index(format!("invalid depth {}", self.depth)));
        }
        let limit = npix(self.depth);
        if let Some(cell) = self.shards.keys().copied().find(|&cell| cell >= limit) {
            return Err(RefcatError::index(format!(
                "cell {} out of range for depth {}",
                cell, self.depth
            )));
        }
        Ok(())
    }

    /// Filter names that have a `<filter>_flux` column.
    pub fn filters(&self) -> Vec<String> {
        filters_of(&self.flux_columns)
    }

    pub fn total_records(&self) -> u64 {
        self.shards.values().map(|e| e.records).sum()
    }

    /// Parallel cell and handle lists for the loader.
    pub fn handles(&self, root: impl AsRef<Path>) -> (Vec<CellId>, Vec<Arc<dyn ShardHandle>>) {
        let root = root.as_ref();
        self.shards
            .iter()
            .map(|(&cell, entry)| {
                let handle: Arc<dyn ShardHandle> =
                    Arc::new(FileShardHandle::new(root.join(&entry.file)));
                (cell, handle)
            })
            .unzip()
    }
}

pub(crate) fn filters_of(columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter_map(|c| c.strip_suffix("_flux"))
        .map(str::to_string)
        .collect()
}

impl fmt::Display for MasterIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Format version: {}", self.format_version)?;
        writeln!(f, "HEALPix depth: {}", self.depth)?;
        writeln!(f, "Shards: {} of {}", self.shards.len(), npix(self.depth))?;
        writeln!(f, "Records: {}", self.total_records())?;
        match self.reference_epoch {
            Some(epoch) => writeln!(f, "Reference epoch: {}", epoch)?,
            None => writeln!(f, "Reference epoch: per record")?,
        }
        write!(f, "Filters: {}", self.filters().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> MasterIndex {
        let mut shards = BTreeMap::new();
        shards.insert(
            17,
            IndexEntry {
                file: shard_file_name(17),
                records: 3,
            },
        );
        shards.insert(
            4,
            IndexEntry {
                file: shard_file_name(4),
                records: 2,
            },
        );
        MasterIndex {
            format_version: 1,
            depth: 1,
            reference_epoch: Some(Epoch::from_mjd(58000.0)),
            flux_columns: vec!["a_flux".into(), "a_fluxErr".into(), "b_flux".into()],
            shards,
            provenance: vec![ProvenanceEntry {
                source: "cat.csv".into(),
                first_id: Some(0),
                last_id: Some(4),
                records: 5,
                rejected: 1,
            }],
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample_index();
        index.write(dir.path()).unwrap();
        assert!(!dir.path().join("index.json.tmp").exists());
        let loaded = MasterIndex::read(dir.path()).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.total_records(), 5);
    }

    #[test]
    fn test_missing_version_defaults_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(INDEX_FILE_NAME),
            r#"{ "depth": 2, "flux_columns": ["a_flux", "a_fluxSigma"], "shards": { "5": { "file": "5.shard", "records": 1 } } }"#,
        )
        .unwrap();
        let index = MasterIndex::read(dir.path()).unwrap();
        assert_eq!(index.format_version, 0);
        assert_eq!(index.shards[&5].file, "5.shard");
        assert!(index.provenance.is_empty());
    }

    #[test]
    fn test_rejects_out_of_range_cell() {
        let mut index = sample_index();
        index.shards.insert(
            48,
            IndexEntry {
                file: "48.shard".into(),
                records: 1,
            },
        );
        assert!(matches!(index.validate(), Err(RefcatError::Index { .. })));
    }

    #[test]
    fn test_filters_and_handles() {
        let index = sample_index();
        assert_eq!(index.filters(), vec!["a".to_string(), "b".to_string()]);
        let (cells, handles) = index.handles("/catalog");
        assert_eq!(cells, vec![4, 17]);
        assert_eq!(handles.len(), 2);
        assert!(handles[0].describe().ends_with("4.shard"));
    }

    #[test]
    fn test_display() {
        let text = sample_index().to_string();
        assert!(text.contains("HEALPix depth: 1"));
        assert!(text.contains("Shards: 2 of 48"));
        assert!(text.contains("Filters: a, b"));
    }
}
