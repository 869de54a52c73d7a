//! Pluggable PSF determination strategies selected by name.
//!
//! A [`DeterminerRegistry`] maps names to constructors. Applications build
//! one at startup, register their strategies, and install it with
//! [`install_global`]; afterwards it is read-only and shared by every
//! caller of [`global`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use celestial_sky::PixelBox;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RefcatError, RefcatResult};

/// Settings shared by every determiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeterminerConfig {
    /// Kernel radius relative to the square root of the stellar quadrupole
    /// moments.
    pub kernel_size: f64,
    pub kernel_size_min: u32,
    pub kernel_size_max: u32,
}

impl Default for DeterminerConfig {
    fn default() -> Self {
        Self {
            kernel_size: 10.0,
            kernel_size_min: 25,
            kernel_size_max: 45,
        }
    }
}

impl DeterminerConfig {
    pub fn validate(&self) -> RefcatResult<()> {
        if !(self.kernel_size.is_finite() && self.kernel_size > 0.0) {
            return Err(RefcatError::configuration(format!(
                "kernel_size must be positive, got {}",
                self.kernel_size
            )));
        }
        if self.kernel_size_min > self.kernel_size_max {
            return Err(RefcatError::configuration(format!(
                "kernel_size_min {} exceeds kernel_size_max {}",
                self.kernel_size_min, self.kernel_size_max
            )));
        }
        Ok(())
    }

    /// Kernel radius in pixels for a star of the given moment width.
    pub fn kernel_radius(&self, width: f64) -> u32 {
        let raw = (self.kernel_size * width).round();
        let lo = self.kernel_size_min as f64;
        let hi = self.kernel_size_max as f64;
        if raw.is_nan() {
            return self.kernel_size_min;
        }
        raw.clamp(lo, hi) as u32
    }
}

/// The image a PSF is being determined for.
#[derive(Debug, Clone, PartialEq)]
pub struct Exposure {
    pub bbox: PixelBox,
    pub filter: Option<String>,
}

/// A star selected as a PSF input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsfCandidate {
    pub x: f64,
    pub y: f64,
    pub flux: f64,
    /// Square root of the source's quadrupole moments, pixels.
    pub width: f64,
}

/// Opaque PSF model produced by a determiner.
#[derive(Debug, Clone, PartialEq)]
pub struct PsfModel {
    kind: String,
    kernel_radius: u32,
    parameters: Vec<f64>,
}

impl PsfModel {
    pub fn new(kind: impl Into<String>, kernel_radius: u32, parameters: Vec<f64>) -> Self {
        Self {
            kind: kind.into(),
            kernel_radius,
            parameters,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn kernel_radius(&self) -> u32 {
        self.kernel_radius
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialCell {
    pub bbox: PixelBox,
    pub candidates: Vec<PsfCandidate>,
}

/// Candidates bucketed into a regular grid over the exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialCellSet {
    cell_size: u32,
    cells: Vec<SpatialCell>,
}

impl SpatialCellSet {
    /// Tile `bbox` with square cells of `cell_size` pixels (the last row and
    /// column are clipped to the box) and drop each candidate into the cell
    /// containing it. Candidates outside the box are ignored; within a cell
    /// they are ordered by decreasing flux.
    pub fn partition(bbox: &PixelBox, cell_size: u32, candidates: &[PsfCandidate]) -> RefcatResult<Self> {
        if cell_size == 0 {
            return Err(RefcatError::configuration("spatial cell size must be positive"));
        }
        let size = cell_size as f64;
        let nx = (((bbox.max_x - bbox.min_x) / size).ceil() as usize).max(1);
        let ny = (((bbox.max_y - bbox.min_y) / size).ceil() as usize).max(1);

        let mut cells = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let min_x = bbox.min_x + i as f64 * size;
                let min_y = bbox.min_y + j as f64 * size;
                let cell_box = PixelBox::new(
                    min_x,
                    min_y,
                    (min_x + size).min(bbox.max_x),
                    (min_y + size).min(bbox.max_y),
                )?;
                cells.push(SpatialCell {
                    bbox: cell_box,
                    candidates: Vec::new(),
                });
            }
        }

        for candidate in candidates {
            if !bbox.contains(candidate.x, candidate.y) {
                continue;
            }
            let i = (((candidate.x - bbox.min_x) / size) as usize).min(nx - 1);
            let j = (((candidate.y - bbox.min_y) / size) as usize).min(ny - 1);
            cells[j * nx + i].candidates.push(*candidate);
        }
        for cell in &mut cells {
            cell.candidates.sort_by(|a, b| b.flux.total_cmp(&a.flux));
        }

        Ok(Self { cell_size, cells })
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    pub fn cells(&self) -> &[SpatialCell] {
        &self.cells
    }

    pub fn candidate_count(&self) -> usize {
        self.cells.iter().map(|c| c.candidates.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PsfDetermination {
    pub model: PsfModel,
    pub cell_set: SpatialCellSet,
}

pub trait PsfDeterminer: Send + Sync {
    fn determine(&self, exposure: &Exposure, candidates: &[PsfCandidate]) -> RefcatResult<PsfDetermination>;
}

pub type DeterminerFactory = fn(&DeterminerConfig) -> Box<dyn PsfDeterminer>;

#[derive(Default)]
pub struct DeterminerRegistry {
    factories: BTreeMap<String, DeterminerFactory>,
}

impl DeterminerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: DeterminerFactory) -> RefcatResult<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(RefcatError::DuplicateDeterminer { name });
        }
        debug!(determiner = %name, "registered PSF determiner");
        self.factories.insert(name, factory);
        Ok(())
    }

    pub fn create(&self, name: &str, config: &DeterminerConfig) -> RefcatResult<Box<dyn PsfDeterminer>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RefcatError::UnknownDeterminer { name: name.to_string() })?;
        config.validate()?;
        Ok(factory(config))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for DeterminerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

static GLOBAL_REGISTRY: OnceLock<DeterminerRegistry> = OnceLock::new();

/// Install the process-wide registry. Only the first call succeeds; the
/// rejected registry is handed back.
pub fn install_global(registry: DeterminerRegistry) -> Result<(), DeterminerRegistry> {
    GLOBAL_REGISTRY.set(registry)
}

/// The process-wide registry, if one has been installed.
pub fn global() -> Option<&'static DeterminerRegistry> {
    GLOBAL_REGISTRY.get()
}
