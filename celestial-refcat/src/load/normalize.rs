//! Flux unit and column-name normalization of loaded shards.

use std::sync::Arc;

use celestial_sky::CellId;
use tracing::{debug, warn};

use crate::epoch::Epoch;
use crate::shard::{Shard, ShardRecord, CURRENT_FORMAT_VERSION};

const JANSKY_TO_NANOJANSKY: f64 = 1e9;
const LEGACY_ERROR_SUFFIX: &str = "_fluxSigma";
const ERROR_SUFFIX: &str = "_fluxErr";
const FLUX_SUFFIX: &str = "_flux";

/// A shard whose fluxes are in nanojansky under `_flux`/`_fluxErr` names.
///
/// Only [`normalize`] builds one, so holding a `NormalizedShard` means the
/// version migration has been applied.
#[derive(Debug, Clone)]
pub struct NormalizedShard {
    cell: CellId,
    reference_epoch: Option<Epoch>,
    flux_columns: Vec<String>,
    records: Vec<ShardRecord>,
}

impl NormalizedShard {
    pub fn cell(&self) -> CellId {
        self.cell
    }

    pub fn reference_epoch(&self) -> Option<Epoch> {
        self.reference_epoch
    }

    pub fn flux_columns(&self) -> &[String] {
        &self.flux_columns
    }

    pub fn records(&self) -> &[ShardRecord] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut [ShardRecord] {
        &mut self.records
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Vec<ShardRecord>) {
        (self.flux_columns, self.records)
    }
}

/// Apply the format-version migration.
///
/// Version 0 stores Jansky with `_fluxSigma` error columns: those are
/// renamed to `_fluxErr` and both flux and error values are scaled by 1e9.
/// Later versions pass through unchanged.
pub fn normalize(shard: &Arc<Shard>) -> NormalizedShard {
    if shard.format_version > CURRENT_FORMAT_VERSION {
        warn!(
            cell = shard.cell,
            version = shard.format_version,
            "shard newer than this reader; treating as nanojansky"
        );
    }
    if shard.format_version >= 1 {
        return NormalizedShard {
            cell: shard.cell,
            reference_epoch: shard.reference_epoch,
            flux_columns: shard.flux_columns.clone(),
            records: shard.records.clone(),
        };
    }

    let scale: Vec<bool> = shard
        .flux_columns
        .iter()
        .map(|c| c.ends_with(FLUX_SUFFIX) || c.ends_with(LEGACY_ERROR_SUFFIX))
        .collect();
    let flux_columns = shard
        .flux_columns
        .iter()
        .map(|c| match c.strip_suffix(LEGACY_ERROR_SUFFIX) {
            Some(base) => format!("{}{}", base, ERROR_SUFFIX),
            None => c.clone(),
        })
        .collect();
    let records = shard
        .records
        .iter()
        .map(|r| {
            let mut record = r.clone();
            for (value, &scaled) in record.fluxes.iter_mut().zip(&scale) {
                if scaled {
                    *value *= JANSKY_TO_NANOJANSKY;
                }
            }
            record
        })
        .collect();

    debug!(cell = shard.cell, records = shard.len(), "migrated version 0 shard to nJy");
    NormalizedShard {
        cell: shard.cell,
        reference_epoch: shard.reference_epoch,
        flux_columns,
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard(version: u32, columns: &[&str], fluxes: Vec<f64>) -> Arc<Shard> {
        let mut shard = Shard::new(0, 0, columns.iter().map(|c| c.to_string()).collect());
        shard.format_version = version;
        shard.records.push(ShardRecord {
            id: 1,
            ra: 0.0,
            dec: 0.0,
            ra_err: None,
            dec_err: None,
            proper_motion: None,
            epoch: None,
            fluxes,
        });
        Arc::new(shard)
    }

    #[test]
    fn test_version_zero_migrates() {
        let raw = shard(0, &["a_flux", "a_fluxSigma", "a_flag"], vec![1.5e-6, 2.0e-7, 3.0]);
        let normalized = normalize(&raw);
        assert_eq!(normalized.flux_columns(), ["a_flux", "a_fluxErr", "a_flag"]);
        let fluxes = &normalized.records()[0].fluxes;
        assert_eq!(fluxes[0], 1.5e-6 * 1e9);
        assert_eq!(fluxes[1], 2.0e-7 * 1e9);
        assert_eq!(fluxes[2], 3.0);
    }

    #[test]
    fn test_version_one_passes_through() {
        let raw = shard(1, &["a_flux", "a_fluxErr"], vec![1500.0, 200.0]);
        let normalized = normalize(&raw);
        assert_eq!(normalized.flux_columns(), ["a_flux", "a_fluxErr"]);
        assert_eq!(normalized.records()[0].fluxes, vec![1500.0, 200.0]);
    }
}
