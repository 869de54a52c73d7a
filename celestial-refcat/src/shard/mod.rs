//! Shards: the immutable per-cell partitions of a reference catalog.
//!
//! A shard holds every record whose position falls in one HEALPix cell at
//! the catalog's depth. Flux values are stored in parallel with the shard's
//! flux column names; their units and error-column naming depend on
//! [`Shard::format_version`]:
//!
//! | Version | Flux units | Error column suffix |
//! |---------|------------|---------------------|
//! | 0 | Jansky | `_fluxSigma` |
//! | 1 | nanojansky | `_fluxErr` |

pub mod codec;
pub mod handle;

use celestial_sky::healpix::npix;
use celestial_sky::{CellId, SkyPoint, MAX_DEPTH};
use serde::{Deserialize, Serialize};

use crate::epoch::Epoch;
use crate::error::{RefcatError, RefcatResult};

pub use codec::{decode_shard, encode_shard, read_shard_file, write_shard_file};
pub use handle::{FileShardHandle, InMemoryShardHandle, ShardArena, ShardHandle};

/// Version written by the converter.
pub const CURRENT_FORMAT_VERSION: u32 = 1;

/// Proper motion in mas/yr. `pm_ra` includes the cos(dec) factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProperMotion {
    pub pm_ra: f64,
    pub pm_dec: f64,
    pub pm_ra_err: Option<f64>,
    pub pm_dec_err: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardRecord {
    pub id: i64,
    /// Degrees.
    pub ra: f64,
    /// Degrees.
    pub dec: f64,
    /// Milliarcseconds on the sky.
    pub ra_err: Option<f64>,
    pub dec_err: Option<f64>,
    pub proper_motion: Option<ProperMotion>,
    /// Epoch of this record's position, overriding the shard's.
    pub epoch: Option<Epoch>,
    /// One value per entry of the owning shard's `flux_columns`.
    pub fluxes: Vec<f64>,
}

impl ShardRecord {
    pub fn position(&self) -> SkyPoint {
        SkyPoint::new(self.ra, self.dec)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shard {
    pub cell: CellId,
    pub depth: u8,
    pub format_version: u32,
    /// Catalog-wide epoch of the stored positions, if known.
    pub reference_epoch: Option<Epoch>,
    pub flux_columns: Vec<String>,
    pub records: Vec<ShardRecord>,
}

impl Shard {
    /// An empty shard at the current format version.
    pub fn new(cell: CellId, depth: u8, flux_columns: Vec<String>) -> Self {
        Self {
            cell,
            depth,
            format_version: CURRENT_FORMAT_VERSION,
            reference_epoch: None,
            flux_columns,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.flux_columns.iter().position(|c| c == name)
    }

    /// Structural checks: valid depth and cell, finite positions and flux
    /// rows matching the column list.
    pub fn validate(&self) -> RefcatResult<()> {
        if self.depth > MAX_DEPTH {
            return Err(RefcatError::shard_format(format!(
                "depth {} exceeds maximum {}",
                self.depth, MAX_DEPTH
            )));
        }
        if self.cell >= npix(self.depth) {
            return Err(RefcatError::shard_format(format!(
                "cell {} out of range for depth {}",
                self.cell, self.depth
            )));
        }
        let columns = self.flux_columns.len();
        for record in &self.records {
            if !record.ra.is_finite() || !record.dec.is_finite() {
                return Err(RefcatError::shard_format(format!(
                    "record {} has a non-finite position",
                    record.id
                )));
            }
            if record.fluxes.len() != columns {
                return Err(RefcatError::shard_format(format!(
                    "record {} has {} flux values for {} columns",
                    record.id,
                    record.fluxes.len(),
                    columns
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, fluxes: Vec<f64>) -> ShardRecord {
        ShardRecord {
            id,
            ra: 10.0,
            dec: 20.0,
            ra_err: None,
            dec_err: None,
            proper_motion: None,
            epoch: None,
            fluxes,
        }
    }

    #[test]
    fn test_validate_flux_width() {
        let mut shard = Shard::new(3, 1, vec!["a_flux".into(), "a_fluxErr".into()]);
        shard.records.push(record(1, vec![1.0, 0.1]));
        assert!(shard.validate().is_ok());
        shard.records.push(record(2, vec![1.0]));
        assert!(matches!(
            shard.validate(),
            Err(RefcatError::ShardFormat { .. })
        ));
    }

    #[test]
    fn test_validate_cell_range() {
        let shard = Shard::new(48, 1, Vec::new());
        assert!(shard.validate().is_err());
        let shard = Shard::new(47, 1, Vec::new());
        assert!(shard.validate().is_ok());
    }

    #[test]
    fn test_column_index() {
        let shard = Shard::new(0, 0, vec!["a_flux".into(), "a_fluxErr".into()]);
        assert_eq!(shard.column_index("a_fluxErr"), Some(1));
        assert_eq!(shard.column_index("b_flux"), None);
    }
}
