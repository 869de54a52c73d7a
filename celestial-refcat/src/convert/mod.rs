//! Catalog conversion: text catalogs in, shards and a master index out.
//!
//! Conversion runs in four steps:
//! 1. Parse every input file in parallel, assigning each record its cell
//! 2. Assign sequential ids (when the inputs carry none) and check id
//!    uniqueness in one serialized pass over all files in input order
//! 3. Write one shard per non-empty cell in parallel into a staging directory
//! 4. Move the shards into place and write `index.json` last
//!
//! Nothing is written before step 3, so a duplicate id leaves the output
//! directory untouched. The index is the commit marker: a directory holding
//! one is never converted into again.

pub mod reader;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use celestial_sky::CellId;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::ConvertConfig;
use crate::error::{RefcatError, RefcatResult};
use crate::index::{shard_file_name, IndexEntry, MasterIndex, ProvenanceEntry, INDEX_FILE_NAME};
use crate::shard::{write_shard_file, Shard, ShardRecord, CURRENT_FORMAT_VERSION};

pub use reader::{read_catalog_file, to_nanojansky, ParsedFile};

const STAGING_DIR_NAME: &str = ".staging";

/// Summary of one conversion run.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub output_dir: PathBuf,
    pub shards_written: usize,
    pub records_written: u64,
    pub rejected: u64,
    /// Records replaced by a later input under `allow_overwrite`.
    pub overwritten: u64,
    pub provenance: Vec<ProvenanceEntry>,
}

pub struct CatalogConverter {
    config: ConvertConfig,
}

impl CatalogConverter {
    pub fn new(config: ConvertConfig) -> RefcatResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    pub fn run(&self, inputs: &[PathBuf], output_dir: &Path) -> RefcatResult<ConversionReport> {
        self.run_with_progress(inputs, output_dir, &|_| {})
    }

    /// As [`run`](Self::run), calling `on_file_parsed` from worker threads as
    /// each input finishes parsing.
    pub fn run_with_progress(
        &self,
        inputs: &[PathBuf],
        output_dir: &Path,
        on_file_parsed: &(dyn Fn(&Path) + Sync),
    ) -> RefcatResult<ConversionReport> {
        let index_path = MasterIndex::path_in(output_dir);
        if index_path.exists() {
            return Err(RefcatError::OutputExists { path: index_path });
        }
        if inputs.is_empty() {
            return Err(RefcatError::configuration("no input files"));
        }
        info!(
            inputs = inputs.len(),
            depth = self.config.depth,
            output = %output_dir.display(),
            "converting catalog"
        );

        let mut parsed = inputs
            .par_iter()
            .map(|path| {
                let file = read_catalog_file(path, &self.config);
                on_file_parsed(path.as_path());
                file
            })
            .collect::<RefcatResult<Vec<_>>>()?;

        if self.config.columns.id.is_none() {
            assign_sequential_ids(&mut parsed, self.config.id_start);
        }
        let provenance = parsed.iter().map(provenance_of).collect::<Vec<_>>();
        let rejected: u64 = parsed.iter().map(|f| f.rejected).sum();

        let (cells, overwritten) = self.merge_unique(parsed)?;
        let records_written: u64 = cells.values().map(|r| r.len() as u64).sum();

        let shards = self.write_shards(cells, output_dir)?;

        let index = MasterIndex {
            format_version: CURRENT_FORMAT_VERSION,
            depth: self.config.depth,
            reference_epoch: self.config.reference_epoch,
            flux_columns: self.config.columns.flux_column_names(),
            shards,
            provenance: provenance.clone(),
        };
        index.write(output_dir)?;

        info!(
            shards = index.shards.len(),
            records = records_written,
            rejected,
            overwritten,
            "conversion complete"
        );
        Ok(ConversionReport {
            output_dir: output_dir.to_path_buf(),
            shards_written: index.shards.len(),
            records_written,
            rejected,
            overwritten,
            provenance,
        })
    }

    /// Serialized id-uniqueness pass, then grouping by cell.
    fn merge_unique(
        &self,
        parsed: Vec<ParsedFile>,
    ) -> RefcatResult<(BTreeMap<CellId, Vec<ShardRecord>>, u64)> {
        // id -> (file, position in file)
        let mut owners: HashMap<i64, (usize, usize)> = HashMap::new();
        let mut dropped: Vec<Vec<bool>> = parsed
            .iter()
            .map(|f| vec![false; f.records.len()])
            .collect();
        let mut overwritten = 0u64;

        for (file_idx, file) in parsed.iter().enumerate() {
            for (rec_idx, (_, record)) in file.records.iter().enumerate() {
                if let Some((prev_file, prev_rec)) = owners.insert(record.id, (file_idx, rec_idx)) {
                    if !self.config.allow_overwrite {
                        return Err(RefcatError::DuplicateId {
                            id: record.id,
                            first: parsed[prev_file].source.clone(),
                            second: file.source.clone(),
                        });
                    }
                    dropped[prev_file][prev_rec] = true;
                    overwritten += 1;
                }
            }
        }
        if overwritten > 0 {
            debug!(overwritten, "later inputs replaced duplicate ids");
        }

        let mut cells: BTreeMap<CellId, Vec<ShardRecord>> = BTreeMap::new();
        for (file, dropped) in parsed.into_iter().zip(dropped) {
            for ((cell, record), dropped) in file.records.into_iter().zip(dropped) {
                if !dropped {
                    cells.entry(cell).or_default().push(record);
                }
            }
        }
        Ok((cells, overwritten))
    }

    fn write_shards(
        &self,
        cells: BTreeMap<CellId, Vec<ShardRecord>>,
        output_dir: &Path,
    ) -> RefcatResult<BTreeMap<CellId, IndexEntry>> {
        let staging = output_dir.join(STAGING_DIR_NAME);
        fs::create_dir_all(&staging).map_err(|e| RefcatError::io(&staging, e))?;

        let result = self.stage_and_commit(cells, &staging, output_dir);
        if staging.exists() {
            // Leftover staged files are never referenced by an index.
            if let Err(e) = fs::remove_dir_all(&staging) {
                warn!(error = %e, path = %staging.display(), "could not remove staging directory");
            }
        }
        result
    }

    fn stage_and_commit(
        &self,
        cells: BTreeMap<CellId, Vec<ShardRecord>>,
        staging: &Path,
        output_dir: &Path,
    ) -> RefcatResult<BTreeMap<CellId, IndexEntry>> {
        let flux_columns = self.config.columns.flux_column_names();
        let written = AtomicU64::new(0);

        let entries = cells
            .into_par_iter()
            .map(|(cell, records)| {
                let file = shard_file_name(cell);
                let shard = Shard {
                    cell,
                    depth: self.config.depth,
                    format_version: CURRENT_FORMAT_VERSION,
                    reference_epoch: self.config.reference_epoch,
                    flux_columns: flux_columns.clone(),
                    records,
                };
                write_shard_file(&shard, staging.join(&file))?;
                written.fetch_add(1, Ordering::Relaxed);
                Ok((
                    cell,
                    IndexEntry {
                        file,
                        records: shard.records.len() as u64,
                    },
                ))
            })
            .collect::<RefcatResult<Vec<_>>>()?;
        debug!(staged = written.load(Ordering::Relaxed), "shards staged");

        for (_, entry) in &entries {
            let from = staging.join(&entry.file);
            let to = output_dir.join(&entry.file);
            fs::rename(&from, &to).map_err(|e| RefcatError::io(&to, e))?;
        }
        Ok(entries.into_iter().collect())
    }
}

fn assign_sequential_ids(parsed: &mut [ParsedFile], start: i64) {
    let mut next = start;
    for file in parsed.iter_mut() {
        for (_, record) in file.records.iter_mut() {
            record.id = next;
            next += 1;
        }
    }
}

fn provenance_of(file: &ParsedFile) -> ProvenanceEntry {
    let ids = file.records.iter().map(|(_, r)| r.id);
    ProvenanceEntry {
        source: file.source.clone(),
        first_id: ids.clone().min(),
        last_id: ids.max(),
        records: file.records.len() as u64,
        rejected: file.rejected,
    }
}

/// True if `dir` already holds a converted catalog.
pub fn is_converted(dir: &Path) -> bool {
    dir.join(INDEX_FILE_NAME).exists()
}
