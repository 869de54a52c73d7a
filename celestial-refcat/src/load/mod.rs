//! Region queries against a sharded reference catalog.
//!
//! Every query runs the same pipeline:
//!
//! 1. Resolve the requested filter through the configured aliases
//! 2. Check the epoch requirement before touching any shard
//! 3. Cover the query circle with cells and keep the cells we have shards for
//! 4. Materialize those shards in parallel and normalize them to nJy
//! 5. Propagate proper motion to the requested epoch, first widening the
//!    covering if the loaded epochs lie further away than assumed
//! 6. Apply the exact region test
//! 7. Concatenate in ascending cell order, dropping repeated ids
//!
//! The loader holds only its configuration and handles, so concurrent
//! queries share nothing mutable.

pub mod motion;
pub mod normalize;
pub mod table;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use celestial_sky::healpix::npix;
use celestial_sky::sphere::ARCSEC_TO_DEG;
use celestial_sky::{CellId, PixelBox, SkyCircle, SkyPoint, SkyProjection};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::epoch::Epoch;
use crate::error::{RefcatError, RefcatResult};
use crate::index::{filters_of, MasterIndex};
use crate::shard::{ShardHandle, ShardRecord};

pub use motion::{apply_proper_motion, MotionOutcome};
pub use normalize::{normalize, NormalizedShard};
pub use table::{Centroid, ColumnKind, ColumnSpec, RefCatalog, RefRecord};

const MAS_PER_DEGREE: f64 = 3.6e6;

/// A query result: the catalog and the name of its requested-filter flux
/// column, always `<requested>_camFlux`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadResult {
    pub ref_cat: RefCatalog,
    pub flux_field: String,
}

/// Fine-filter predicate applied after proper-motion correction.
enum FineFilter<'a> {
    Circle(SkyCircle),
    Pixels {
        bbox: PixelBox,
        projection: &'a dyn SkyProjection,
    },
}

impl FineFilter<'_> {
    /// `Some(centroid)` when the record is kept; the centroid is set only
    /// for pixel-box queries.
    fn keep(&self, point: &SkyPoint) -> Option<Option<table::Centroid>> {
        match self {
            FineFilter::Circle(circle) => circle.contains(point).then_some(None),
            FineFilter::Pixels { bbox, projection } => {
                let (x, y) = projection.sky_to_pixel(point).ok()?;
                bbox.contains(x, y).then_some(Some(table::Centroid { x, y }))
            }
        }
    }

    fn has_centroids(&self) -> bool {
        matches!(self, FineFilter::Pixels { .. })
    }
}

pub struct ReferenceObjectLoader {
    shards: BTreeMap<CellId, Arc<dyn ShardHandle>>,
    config: LoaderConfig,
    /// Stored flux columns known without loading a shard.
    known_flux_columns: Option<Vec<String>>,
}

impl ReferenceObjectLoader {
    /// Build a loader from parallel lists of cells and their handles.
    pub fn new(
        cells: Vec<CellId>,
        handles: Vec<Arc<dyn ShardHandle>>,
        config: LoaderConfig,
    ) -> RefcatResult<Self> {
        config.validate()?;
        if cells.len() != handles.len() {
            return Err(RefcatError::configuration(format!(
                "{} cells but {} shard handles",
                cells.len(),
                handles.len()
            )));
        }
        let limit = npix(config.depth);
        let mut shards = BTreeMap::new();
        for (cell, handle) in cells.into_iter().zip(handles) {
            if cell >= limit {
                return Err(RefcatError::configuration(format!(
                    "cell {} out of range for depth {}",
                    cell, config.depth
                )));
            }
            if shards.insert(cell, handle).is_some() {
                return Err(RefcatError::configuration(format!(
                    "cell {} listed twice",
                    cell
                )));
            }
        }
        debug!(shards = shards.len(), depth = config.depth, "reference object loader ready");
        Ok(Self {
            shards,
            config,
            known_flux_columns: None,
        })
    }

    /// Loader over a converted catalog directory. The index depth must match
    /// `config.depth`; an unset `catalog_epoch` is taken from the index, and
    /// filters are checked against the index's flux columns even when a
    /// query covers no shard.
    pub fn from_index(
        index: &MasterIndex,
        root: impl AsRef<Path>,
        mut config: LoaderConfig,
    ) -> RefcatResult<Self> {
        if index.depth != config.depth {
            return Err(RefcatError::configuration(format!(
                "catalog was partitioned at depth {} but the loader is configured for depth {}",
                index.depth, config.depth
            )));
        }
        if config.catalog_epoch.is_none() {
            config.catalog_epoch = index.reference_epoch;
        }
        let (cells, handles) = index.handles(root);
        let mut loader = Self::new(cells, handles, config)?;
        loader.known_flux_columns = Some(index.flux_columns.clone());
        Ok(loader)
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.shards.keys().copied()
    }

    /// Records within `radius_deg` of `center` (strictly), with positions
    /// moved to `epoch` when given.
    pub fn load_sky_circle(
        &self,
        center: SkyPoint,
        radius_deg: f64,
        filter: &str,
        epoch: Option<Epoch>,
    ) -> RefcatResult<LoadResult> {
        self.check_epoch(epoch)?;
        let circle = SkyCircle::new(center, radius_deg)?;
        self.run_query(&circle, FineFilter::Circle(circle), filter, epoch)
    }

    /// Records whose pixel position falls inside `bbox` grown by `padding`
    /// pixels (`pixel_margin` when `None`; zero means the exact box). Rows
    /// carry centroid columns.
    pub fn load_pixel_box(
        &self,
        bbox: &PixelBox,
        projection: &dyn SkyProjection,
        filter: &str,
        padding: Option<f64>,
        epoch: Option<Epoch>,
    ) -> RefcatResult<LoadResult> {
        self.check_epoch(epoch)?;
        let padding = padding.unwrap_or(self.config.pixel_margin);
        if !padding.is_finite() || padding < 0.0 {
            return Err(RefcatError::configuration(format!(
                "pixel box padding must be finite and non-negative, got {}",
                padding
            )));
        }
        let padded = bbox.grown(padding);
        let footprint = padded.sky_footprint(projection, self.config.boundary_samples_per_edge)?;
        debug!(
            center = %footprint.center,
            radius_deg = footprint.radius_deg,
            padding,
            "pixel box footprint"
        );
        let fine = FineFilter::Pixels {
            bbox: padded,
            projection,
        };
        self.run_query(&footprint, fine, filter, epoch)
    }

    fn check_epoch(&self, epoch: Option<Epoch>) -> RefcatResult<()> {
        if self.config.require_proper_motion && epoch.is_none() {
            return Err(RefcatError::configuration(
                "require_proper_motion is set but no epoch was provided to the loader",
            ));
        }
        Ok(())
    }

    fn run_query(
        &self,
        region: &SkyCircle,
        fine: FineFilter<'_>,
        filter: &str,
        epoch: Option<Epoch>,
    ) -> RefcatResult<LoadResult> {
        let resolved = self.config.resolve_filter(filter);
        let mut span = self.assumed_epoch_span(epoch);
        let mut cells = self.coarse_cells(region, span)?;
        let mut shards = self.materialize(&cells)?;

        if let Some(target) = epoch {
            loop {
                let observed = max_epoch_span(&shards, target);
                if observed <= span {
                    break;
                }
                debug!(assumed_years = span, observed_years = observed, "widening coarse covering");
                span = observed;
                let wider = self.coarse_cells(region, span)?;
                let extra: Vec<CellId> = wider
                    .iter()
                    .copied()
                    .filter(|c| cells.binary_search(c).is_err())
                    .collect();
                shards.extend(self.materialize(&extra)?);
                shards.sort_by_key(NormalizedShard::cell);
                cells = wider;
            }
            self.correct_proper_motion(&mut shards, target)?;
        }

        let flux_columns = match (&self.known_flux_columns, shards.is_empty()) {
            (Some(known), true) => known.clone(),
            _ => union_flux_columns(&shards),
        };
        let schema_known = !shards.is_empty() || self.known_flux_columns.is_some();
        let (flux_idx, err_idx) = resolve_flux_columns(&flux_columns, filter, &resolved, schema_known)?;
        let mut out_columns = flux_columns.clone();
        let flux_field = format!("{}_camFlux", filter);
        out_columns.push(flux_field.clone());
        out_columns.push(format!("{}_camFluxErr", filter));

        let has_centroids = fine.has_centroids();
        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        let mut candidates = 0usize;
        for shard in shards {
            let (columns, records) = shard.into_parts();
            let positions = column_positions(&columns, &flux_columns);
            for record in records {
                candidates += 1;
                let Some(centroid) = fine.keep(&record.position()) else {
                    continue;
                };
                if !seen.insert(record.id) {
                    continue;
                }
                let fluxes = output_fluxes(&record, &positions, flux_columns.len(), flux_idx, err_idx);
                let mut row = RefRecord::from_shard_record(record, fluxes);
                row.centroid = centroid;
                rows.push(row);
            }
        }

        info!(
            filter,
            resolved = %resolved,
            cells = cells.len(),
            candidates,
            kept = rows.len(),
            "loaded reference objects"
        );
        Ok(LoadResult {
            ref_cat: RefCatalog::new(out_columns, has_centroids, rows),
            flux_field,
        })
    }

    /// Years of proper motion the first covering allows for: the distance to
    /// the catalog epoch when known, otherwise `max_epoch_span_years`.
    fn assumed_epoch_span(&self, epoch: Option<Epoch>) -> f64 {
        match (epoch, self.config.catalog_epoch) {
            (None, _) => 0.0,
            (Some(target), Some(catalog)) => target.years_since(catalog).abs(),
            (Some(_), None) => self.config.max_epoch_span_years,
        }
    }

    /// Cells of the covering that we hold shards for, ascending. The region
    /// is widened by `years` of the fastest allowed proper motion.
    fn coarse_cells(&self, region: &SkyCircle, years: f64) -> RefcatResult<Vec<CellId>> {
        let region = region.widened(self.config.max_proper_motion * years / MAS_PER_DEGREE);
        let margin_deg = self.config.covering_margin_arcsec * ARCSEC_TO_DEG;
        let covering = region.covering(self.config.depth, margin_deg)?;
        let cells: Vec<CellId> = covering
            .into_iter()
            .filter(|c| self.shards.contains_key(c))
            .collect();
        debug!(
            radius_deg = region.radius_deg,
            shards = cells.len(),
            "coarse covering"
        );
        Ok(cells)
    }

    /// One materialization per cell, in parallel; results stay in cell order.
    fn materialize(&self, cells: &[CellId]) -> RefcatResult<Vec<NormalizedShard>> {
        cells
            .par_iter()
            .map(|&cell| {
                let handle = &self.shards[&cell];
                let shard = handle.materialize().map_err(|e| match e {
                    RefcatError::ShardLoad { .. } => e,
                    other => RefcatError::shard_load(cell, other.to_string()),
                })?;
                if shard.cell != cell || shard.depth != self.config.depth {
                    return Err(RefcatError::shard_load(
                        cell,
                        format!(
                            "{} holds cell {} at depth {}, expected cell {} at depth {}",
                            handle.describe(),
                            shard.cell,
                            shard.depth,
                            cell,
                            self.config.depth
                        ),
                    ));
                }
                Ok(normalize(&shard))
            })
            .collect()
    }

    fn correct_proper_motion(
        &self,
        shards: &mut [NormalizedShard],
        target: Epoch,
    ) -> RefcatResult<()> {
        let mut any_motion = false;
        let mut missing_epoch = 0u64;
        for shard in shards.iter_mut() {
            let reference = shard.reference_epoch();
            for record in shard.records_mut() {
                match apply_proper_motion(record, reference, target) {
                    MotionOutcome::Applied => any_motion = true,
                    MotionOutcome::NoProperMotion => {}
                    MotionOutcome::NoEpoch => {
                        if self.config.require_proper_motion {
                            return Err(RefcatError::configuration(format!(
                                "record {} has proper motion but no epoch to propagate from",
                                record.id
                            )));
                        }
                        any_motion = true;
                        missing_epoch += 1;
                    }
                }
            }
        }
        if missing_epoch > 0 {
            warn!(records = missing_epoch, "proper motion not applied: no catalog epoch");
        }
        let loaded = shards.iter().any(|s| !s.records().is_empty());
        if self.config.require_proper_motion && loaded && !any_motion {
            return Err(RefcatError::configuration(
                "require_proper_motion is set but the catalog carries no proper motion",
            ));
        }
        Ok(())
    }
}

fn union_flux_columns(shards: &[NormalizedShard]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for shard in shards {
        for name in shard.flux_columns() {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
    }
    columns
}

/// Largest `|target - epoch|` in years over records with proper motion,
/// using the shard epoch for records without their own.
fn max_epoch_span(shards: &[NormalizedShard], target: Epoch) -> f64 {
    shards
        .iter()
        .flat_map(|shard| {
            let reference = shard.reference_epoch();
            shard
                .records()
                .iter()
                .filter(|r| r.proper_motion.is_some())
                .filter_map(move |r| r.epoch.or(reference))
        })
        .map(|from| target.years_since(from).abs())
        .fold(0.0, f64::max)
}

/// Indices of `<resolved>_flux` and `<resolved>_fluxErr` in `columns`.
/// Without a known schema (nothing loaded, no index) any filter passes.
fn resolve_flux_columns(
    columns: &[String],
    requested: &str,
    resolved: &str,
    schema_known: bool,
) -> RefcatResult<(Option<usize>, Option<usize>)> {
    let flux_name = format!("{}_flux", resolved);
    let err_name = format!("{}_fluxErr", resolved);
    let flux_idx = columns.iter().position(|c| *c == flux_name);
    if flux_idx.is_none() && schema_known {
        return Err(RefcatError::UnknownFilter {
            requested: requested.to_string(),
            resolved: resolved.to_string(),
            available: filters_of(columns),
        });
    }
    let err_idx = columns.iter().position(|c| *c == err_name);
    Ok((flux_idx, err_idx))
}

/// For each shard column, its index in the output column union.
fn column_positions(shard_columns: &[String], union: &[String]) -> Vec<usize> {
    shard_columns
        .iter()
        .filter_map(|c| union.iter().position(|u| u == c))
        .collect()
}

fn output_fluxes(
    record: &ShardRecord,
    positions: &[usize],
    width: usize,
    flux_idx: Option<usize>,
    err_idx: Option<usize>,
) -> Vec<f64> {
    let mut fluxes = vec![f64::NAN; width + 2];
    for (&value, &pos) in record.fluxes.iter().zip(positions) {
        fluxes[pos] = value;
    }
    fluxes[width] = flux_idx.map_or(f64::NAN, |i| fluxes[i]);
    fluxes[width + 1] = err_idx.map_or(f64::NAN, |i| fluxes[i]);
    fluxes
}
