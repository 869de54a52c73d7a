//! Query regions and their reduction to sky circles for cell covering.

use std::collections::BTreeSet;

use crate::error::{SkyError, SkyResult};
use crate::healpix::{covering_cells, CellId};
use crate::projection::SkyProjection;
use crate::sphere::SkyPoint;

/// A cone on the sky.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyCircle {
    pub center: SkyPoint,
    pub radius_deg: f64,
}

impl SkyCircle {
    pub fn new(center: SkyPoint, radius_deg: f64) -> SkyResult<Self> {
        if !radius_deg.is_finite() || radius_deg < 0.0 {
            return Err(SkyError::invalid_region(format!(
                "radius must be finite and non-negative, got {}",
                radius_deg
            )));
        }
        Ok(Self { center, radius_deg })
    }

    /// Strict containment: points exactly on the rim are outside.
    pub fn contains(&self, point: &SkyPoint) -> bool {
        self.center.separation_deg(point) < self.radius_deg
    }

    /// Cells at `depth` that may hold points of this circle.
    pub fn covering(&self, depth: u8, margin_deg: f64) -> SkyResult<BTreeSet<CellId>> {
        covering_cells(&self.center, self.radius_deg, depth, margin_deg)
    }

    /// The same circle with its radius grown by `extra_deg`.
    pub fn widened(&self, extra_deg: f64) -> Self {
        Self {
            center: self.center,
            radius_deg: self.radius_deg + extra_deg.max(0.0),
        }
    }
}

/// Axis-aligned box in pixel coordinates (inclusive bounds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl PixelBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> SkyResult<Self> {
        let finite = [min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite());
        if !finite || min_x > max_x || min_y > max_y {
            return Err(SkyError::invalid_region(format!(
                "invalid pixel box [{}, {}] x [{}, {}]",
                min_x, max_x, min_y, max_y
            )));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Box covering integer pixels `x0..x0+width`, `y0..y0+height`, whose
    /// centers sit on integer coordinates (edges at half-pixel offsets).
    pub fn from_corner_dimensions(x0: i64, y0: i64, width: u32, height: u32) -> SkyResult<Self> {
        if width == 0 || height == 0 {
            return Err(SkyError::invalid_region("pixel box must be non-empty"));
        }
        Self::new(
            x0 as f64 - 0.5,
            y0 as f64 - 0.5,
            (x0 + width as i64) as f64 - 0.5,
            (y0 + height as i64) as f64 - 0.5,
        )
    }

    /// Grow every edge outward by `padding` pixels. Negative padding is
    /// treated as zero.
    pub fn grown(&self, padding: f64) -> Self {
        let p = padding.max(0.0);
        Self {
            min_x: self.min_x - p,
            min_y: self.min_y - p,
            max_x: self.max_x + p,
            max_y: self.max_y + p,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            0.5 * (self.min_x + self.max_x),
            0.5 * (self.min_y + self.max_y),
        )
    }

    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_x, self.min_y),
            (self.max_x, self.min_y),
            (self.max_x, self.max_y),
            (self.min_x, self.max_y),
        ]
    }

    /// Corners plus `per_edge` evenly spaced interior points on each edge.
    pub fn boundary_samples(&self, per_edge: usize) -> Vec<(f64, f64)> {
        let corners = self.corners();
        let mut samples = Vec::with_capacity(4 * (per_edge + 1));
        for i in 0..4 {
            let (x0, y0) = corners[i];
            let (x1, y1) = corners[(i + 1) % 4];
            samples.push((x0, y0));
            for k in 1..=per_edge {
                let t = k as f64 / (per_edge + 1) as f64;
                samples.push((x0 + t * (x1 - x0), y0 + t * (y1 - y0)));
            }
        }
        samples
    }

    /// Smallest circle about the projected box center that encloses the
    /// projected boundary samples.
    pub fn sky_footprint(
        &self,
        projection: &dyn SkyProjection,
        per_edge: usize,
    ) -> SkyResult<SkyCircle> {
        let (cx, cy) = self.center();
        let center = projection.pixel_to_sky(cx, cy)?;
        let mut radius_deg: f64 = 0.0;
        for (x, y) in self.boundary_samples(per_edge) {
            let p = projection.pixel_to_sky(x, y)?;
            radius_deg = radius_deg.max(center.separation_deg(&p));
        }
        SkyCircle::new(center, radius_deg)
    }
}
