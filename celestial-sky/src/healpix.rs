//! Nested HEALPix partitioning of the sky into catalog cells.
//!
//! A cell id at depth `d` is a nested pixel index in `[0, 12·4^d)`. The
//! nested scheme makes refinement trivial: the children of `c` are
//! `4c..4c+3` and its parent is `c / 4`.
//!
//! [`covering_cells`] answers "which cells can hold a point within this
//! circle". It refines from the 12 base cells and keeps every cell whose
//! center is within the query radius plus the cell's maximum radius plus a
//! caller-supplied boundary margin, so the result is always a superset.

use std::collections::BTreeSet;
use std::f64::consts::{FRAC_PI_2, PI, TAU};

use crate::error::{SkyError, SkyResult};
use crate::sphere::SkyPoint;

/// Nested HEALPix pixel index used as a shard key.
pub type CellId = u64;

/// Deepest supported partition (`nside = 2^29`, `npix < 2^63`).
pub const MAX_DEPTH: u8 = 29;

/// Inflation applied to the analytic maximum pixel radius; HEALPix pixel
/// edges are not great circles.
const PIXEL_RADIUS_SLACK: f64 = 1.05;

// Face layout of the 12 base pixels (ring index and longitude offset).
const JRLL: [i64; 12] = [2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4];
const JPLL: [i64; 12] = [1, 3, 5, 7, 0, 2, 4, 6, 1, 3, 5, 7];

/// `nside = 2^depth`.
pub fn nside(depth: u8) -> u64 {
    1u64 << depth
}

/// Number of cells at `depth`: `12 · nside²`.
pub fn npix(depth: u8) -> u64 {
    12 * nside(depth) * nside(depth)
}

pub fn validate_depth(depth: u8) -> SkyResult<()> {
    if depth > MAX_DEPTH {
        return Err(SkyError::InvalidDepth {
            depth,
            max: MAX_DEPTH,
        });
    }
    Ok(())
}

/// Cell containing `point` at `depth`.
///
/// Implements the Gorski et al. (2005) nested `ang2pix`.
pub fn cell_of(point: &SkyPoint, depth: u8) -> CellId {
    let phi = point.ra_rad();
    let z = libm::sin(point.dec_rad()).clamp(-1.0, 1.0);
    let nside = nside(depth);
    let (face, ix, iy) = compute_face_and_position(phi, z, nside);
    face * nside * nside + xy2pix_nest(ix, iy, depth)
}

/// Center of `cell` at `depth` (nested `pix2ang`).
pub fn cell_center(cell: CellId, depth: u8) -> SkyPoint {
    let nside = nside(depth) as i64;
    let npface = (nside * nside) as u64;
    let face = (cell / npface) as usize;
    let (ix, iy) = pix2xy_nest(cell % npface, depth);
    let (ix, iy) = (ix as i64, iy as i64);

    let jr = JRLL[face] * nside - ix - iy - 1;
    let nl4 = 4 * nside;

    let (nr, z, kshift) = if jr < nside {
        let nr = jr;
        (nr, 1.0 - (nr * nr) as f64 / (3.0 * (nside * nside) as f64), 0)
    } else if jr > 3 * nside {
        let nr = nl4 - jr;
        (nr, (nr * nr) as f64 / (3.0 * (nside * nside) as f64) - 1.0, 0)
    } else {
        let z = (2 * nside - jr) as f64 * 2.0 / (3.0 * nside as f64);
        (nside, z, (jr - nside) & 1)
    };

    let mut jp = (JPLL[face] * nr + ix - iy + 1 + kshift) / 2;
    if jp > nl4 {
        jp -= nl4;
    }
    if jp < 1 {
        jp += nl4;
    }
    let phi = (jp as f64 - (kshift + 1) as f64 * 0.5) * (FRAC_PI_2 / nr as f64);
    SkyPoint::from_radians(phi, libm::asin(z.clamp(-1.0, 1.0)))
}

/// The four cells one level deeper that partition `cell`.
pub fn children(cell: CellId) -> [CellId; 4] {
    let base = cell << 2;
    [base, base + 1, base + 2, base + 3]
}

/// The enclosing cell one level shallower.
pub fn parent(cell: CellId) -> CellId {
    cell >> 2
}

/// Upper bound, in radians, on the distance from any cell center to any of
/// its corners at `depth`.
pub fn max_pixel_radius(depth: u8) -> f64 {
    let nside = nside(depth) as f64;
    let a = z_phi_to_point(2.0 / 3.0, PI / (4.0 * nside));
    let t = 1.0 - 1.0 / nside;
    let b = z_phi_to_point(1.0 - t * t / 3.0, 0.0);
    a.separation_rad(&b)
}

/// Every cell at `depth` that may hold a point within `radius_deg` of
/// `center`. `margin_deg` widens the test to absorb rounding at cell seams.
pub fn covering_cells(
    center: &SkyPoint,
    radius_deg: f64,
    depth: u8,
    margin_deg: f64,
) -> SkyResult<BTreeSet<CellId>> {
    validate_depth(depth)?;
    if !radius_deg.is_finite() || radius_deg < 0.0 {
        return Err(SkyError::invalid_region(format!(
            "radius must be finite and non-negative, got {}",
            radius_deg
        )));
    }
    let reach_rad = (radius_deg + margin_deg.max(0.0)).to_radians();

    if reach_rad >= PI {
        return Ok((0..npix(depth)).collect());
    }

    let mut candidates: Vec<CellId> = (0..12).collect();
    for level in 0..=depth {
        let limit = reach_rad + max_pixel_radius(level) * PIXEL_RADIUS_SLACK;
        candidates.retain(|&cell| center.separation_rad(&cell_center(cell, level)) <= limit);
        if level < depth {
            candidates = candidates.into_iter().flat_map(children).collect();
        }
    }
    Ok(candidates.into_iter().collect())
}

fn z_phi_to_point(z: f64, phi: f64) -> SkyPoint {
    SkyPoint::from_radians(phi, libm::asin(z.clamp(-1.0, 1.0)))
}

/// Determine which of the 12 HEALPix base faces contains the point,
/// and compute the (ix, iy) position within that face.
fn compute_face_and_position(phi: f64, z: f64, nside: u64) -> (u64, u64, u64) {
    let tt = phi_to_tt(phi);
    if libm::fabs(z) <= 2.0 / 3.0 {
        compute_equatorial_face(tt, z, nside)
    } else {
        compute_polar_face(tt, z, nside)
    }
}

/// Map phi onto `[0, 4)`, one unit per quadrant.
fn phi_to_tt(phi: f64) -> f64 {
    let tt = (phi.rem_euclid(TAU)) * 2.0 / PI;
    if tt >= 4.0 {
        0.0
    } else {
        tt
    }
}

/// Equatorial belt (|z| <= 2/3).
fn compute_equatorial_face(tt: f64, z: f64, nside: u64) -> (u64, u64, u64) {
    let ns = nside as f64;
    let temp1 = ns * (0.5 + tt);
    let temp2 = ns * z * 0.75;
    let jp = (temp1 - temp2) as u64;
    let jm = (temp1 + temp2) as u64;
    let ifp = jp / nside;
    let ifm = jm / nside;
    let face = if ifp == ifm {
        ifp | 4
    } else if ifp < ifm {
        ifp
    } else {
        ifm + 8
    };
    let ix = jm & (nside - 1);
    let iy = nside - (jp & (nside - 1)) - 1;
    (face, ix, iy)
}

/// Polar caps (|z| > 2/3).
fn compute_polar_face(tt: f64, z: f64, nside: u64) -> (u64, u64, u64) {
    let ntt = (libm::floor(tt) as u64).min(3);
    let tp = tt - ntt as f64;
    let tmp = nside as f64 * libm::sqrt(3.0 * (1.0 - libm::fabs(z)));
    let jp = ((tp * tmp) as u64).min(nside - 1);
    let jm = (((1.0 - tp) * tmp) as u64).min(nside - 1);
    if z >= 0.0 {
        (ntt, nside - jm - 1, nside - jp - 1)
    } else {
        (ntt + 8, jp, jm)
    }
}

/// Interleave (ix, iy) into a nested index within a face (Z-order curve).
fn xy2pix_nest(ix: u64, iy: u64, depth: u8) -> u64 {
    let mut result: u64 = 0;
    for i in 0..depth as u32 {
        let bit_x = (ix >> i) & 1;
        let bit_y = (iy >> i) & 1;
        result |= (bit_x << (2 * i)) | (bit_y << (2 * i + 1));
    }
    result
}

fn pix2xy_nest(ipf: u64, depth: u8) -> (u64, u64) {
    let mut ix = 0u64;
    let mut iy = 0u64;
    for i in 0..depth as u32 {
        ix |= ((ipf >> (2 * i)) & 1) << i;
        iy |= ((ipf >> (2 * i + 1)) & 1) << i;
    }
    (ix, iy)
}
