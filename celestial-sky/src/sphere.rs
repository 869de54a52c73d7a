//! Points on the celestial sphere and great-circle operations.
//!
//! Bearings follow the reference-catalog convention: measured from east
//! (increasing RA) toward north (increasing Dec), in radians.

use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::fmt;

use crate::error::{SkyError, SkyResult};

/// Milliarcseconds to radians.
#[allow(clippy::excessive_precision)]
pub const MAS_TO_RAD: f64 = 4.848136811095359935899141e-9;

/// Arcseconds to degrees.
pub const ARCSEC_TO_DEG: f64 = 1.0 / 3600.0;

/// A sky position in degrees. RA is kept in `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyPoint {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

impl SkyPoint {
    /// Build a point, folding RA into `[0, 360)`. Dec is taken as given.
    pub fn new(ra_deg: f64, dec_deg: f64) -> Self {
        Self {
            ra_deg: normalize_ra_deg(ra_deg),
            dec_deg,
        }
    }

    /// Build a point, rejecting non-finite values and declinations outside
    /// `[-90, 90]`.
    pub fn try_new(ra_deg: f64, dec_deg: f64) -> SkyResult<Self> {
        if !ra_deg.is_finite() || !dec_deg.is_finite() {
            return Err(SkyError::invalid_coordinate(format!(
                "non-finite position ({}, {})",
                ra_deg, dec_deg
            )));
        }
        if !(-90.0..=90.0).contains(&dec_deg) {
            return Err(SkyError::invalid_coordinate(format!(
                "declination {} outside [-90, 90]",
                dec_deg
            )));
        }
        Ok(Self::new(ra_deg, dec_deg))
    }

    pub fn from_radians(ra: f64, dec: f64) -> Self {
        Self::new(ra.to_degrees(), dec.to_degrees())
    }

    pub fn ra_rad(&self) -> f64 {
        self.ra_deg.to_radians()
    }

    pub fn dec_rad(&self) -> f64 {
        self.dec_deg.to_radians()
    }

    /// Unit vector `[x, y, z]` for this position.
    pub fn to_unit_vector(&self) -> [f64; 3] {
        let (sin_ra, cos_ra) = libm::sincos(self.ra_rad());
        let (sin_dec, cos_dec) = libm::sincos(self.dec_rad());
        [cos_dec * cos_ra, cos_dec * sin_ra, sin_dec]
    }

    /// Great-circle distance to `other` in radians (Vincenty formula, accurate
    /// at all separations).
    pub fn separation_rad(&self, other: &SkyPoint) -> f64 {
        let (sin_lat1, cos_lat1) = libm::sincos(self.dec_rad());
        let (sin_lat2, cos_lat2) = libm::sincos(other.dec_rad());
        let delta_lon = (other.ra_deg - self.ra_deg).to_radians();
        let (sin_dlon, cos_dlon) = libm::sincos(delta_lon);

        let num = libm::sqrt(
            (cos_lat2 * sin_dlon).powi(2)
                + (cos_lat1 * sin_lat2 - sin_lat1 * cos_lat2 * cos_dlon).powi(2),
        );
        let den = sin_lat1 * sin_lat2 + cos_lat1 * cos_lat2 * cos_dlon;
        libm::atan2(num, den)
    }

    /// Great-circle distance to `other` in degrees.
    pub fn separation_deg(&self, other: &SkyPoint) -> f64 {
        self.separation_rad(other).to_degrees()
    }

    /// Initial bearing of the great circle from `self` to `other`, in
    /// `[0, 2π)`, measured from east toward north.
    pub fn bearing_to(&self, other: &SkyPoint) -> f64 {
        let (sin_dec1, cos_dec1) = libm::sincos(self.dec_rad());
        let (sin_dec2, cos_dec2) = libm::sincos(other.dec_rad());
        let (sin_dra, cos_dra) = libm::sincos((other.ra_deg - self.ra_deg).to_radians());

        // Position angle: north through east.
        let position_angle = libm::atan2(
            sin_dra * cos_dec2,
            cos_dec1 * sin_dec2 - sin_dec1 * cos_dec2 * cos_dra,
        );
        normalize_angle(FRAC_PI_2 - position_angle)
    }

    /// Move `distance` radians along the great circle leaving `self` with the
    /// given bearing (east toward north).
    pub fn offset(&self, bearing: f64, distance: f64) -> SkyPoint {
        let position_angle = FRAC_PI_2 - bearing;
        let (sin_pa, cos_pa) = libm::sincos(position_angle);
        let (sin_d, cos_d) = libm::sincos(distance);
        let (sin_dec, cos_dec) = libm::sincos(self.dec_rad());

        let sin_dec2 = (sin_dec * cos_d + cos_dec * sin_d * cos_pa).clamp(-1.0, 1.0);
        let dec2 = libm::asin(sin_dec2);
        let dra = libm::atan2(sin_pa * sin_d * cos_dec, cos_d - sin_dec * sin_dec2);

        SkyPoint::from_radians(self.ra_rad() + dra, dec2)
    }
}

impl fmt::Display for SkyPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}°, {:+.6}°)", self.ra_deg, self.dec_deg)
    }
}

/// Fold an RA in degrees into `[0, 360)`.
pub fn normalize_ra_deg(ra_deg: f64) -> f64 {
    let ra = ra_deg.rem_euclid(360.0);
    // rem_euclid can return exactly 360.0 for tiny negative inputs.
    if ra >= 360.0 {
        0.0
    } else {
        ra
    }
}

fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    if a >= TAU {
        0.0
    } else {
        a
    }
}

/// Smallest signed difference `a - b` between two angles in radians.
pub fn angle_difference(a: f64, b: f64) -> f64 {
    (a - b + PI).rem_euclid(TAU) - PI
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() < tol,
            "expected {a} ~= {b} (diff = {})",
            (a - b).abs()
        );
    }

    #[test]
    fn test_new_normalizes_ra() {
        assert_eq!(SkyPoint::new(-10.0, 0.0).ra_deg, 350.0);
        assert_eq!(SkyPoint::new(360.0, 0.0).ra_deg, 0.0);
        assert_eq!(SkyPoint::new(725.0, 0.0).ra_deg, 5.0);
    }

    #[test]
    fn test_try_new_rejects_bad_input() {
        assert!(SkyPoint::try_new(f64::NAN, 0.0).is_err());
        assert!(SkyPoint::try_new(10.0, 91.0).is_err());
        assert!(SkyPoint::try_new(10.0, f64::INFINITY).is_err());
        assert!(SkyPoint::try_new(10.0, -90.0).is_ok());
    }

    #[test]
    fn test_separation() {
        let a = SkyPoint::new(0.0, 0.0);
        assert_close(a.separation_deg(&a), 0.0, 1e-12);
        assert_close(a.separation_deg(&SkyPoint::new(90.0, 0.0)), 90.0, 1e-10);
        assert_close(
            SkyPoint::new(0.0, 90.0).separation_deg(&SkyPoint::new(0.0, -90.0)),
            180.0,
            1e-10,
        );
        assert_close(a.separation_deg(&SkyPoint::new(180.0, 0.0)), 180.0, 1e-10);
    }

    #[test]
    fn test_separation_across_ra_wrap() {
        let a = SkyPoint::new(359.5, 0.0);
        let b = SkyPoint::new(0.5, 0.0);
        assert_close(a.separation_deg(&b), 1.0, 1e-10);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = SkyPoint::new(100.0, 10.0);
        let north = SkyPoint::new(100.0, 11.0);
        let east = SkyPoint::new(100.5, 10.0);
        assert_close(origin.bearing_to(&north), FRAC_PI_2, 1e-9);
        // Due east along a parallel is not a great circle, but the initial
        // bearing is still close to zero.
        let b = origin.bearing_to(&east);
        assert!(angle_difference(b, 0.0).abs() < 0.01, "bearing {b}");
    }

    #[test]
    fn test_offset_round_trip() {
        let origin = SkyPoint::new(200.0, -35.0);
        for &bearing_deg in &[0.0_f64, 45.0, 90.0, 135.0, 210.0, 300.0] {
            let bearing = bearing_deg.to_radians();
            let distance = (3.0 * ARCSEC_TO_DEG).to_radians();
            let moved = origin.offset(bearing, distance);
            assert_close(origin.separation_rad(&moved), distance, 1e-14);
            let back = origin.bearing_to(&moved);
            assert!(
                angle_difference(back, bearing).abs() < 1e-8,
                "bearing {bearing_deg}: got {}",
                back.to_degrees()
            );
        }
    }

    #[test]
    fn test_offset_zero_distance_is_identity() {
        let origin = SkyPoint::new(12.345, 67.89);
        let moved = origin.offset(1.0, 0.0);
        assert_close(moved.ra_deg, origin.ra_deg, 1e-12);
        assert_close(moved.dec_deg, origin.dec_deg, 1e-12);
    }

    #[test]
    fn test_offset_large_distance() {
        let origin = SkyPoint::new(0.0, 0.0);
        let moved = origin.offset(FRAC_PI_2, 30.0_f64.to_radians());
        assert_close(moved.dec_deg, 30.0, 1e-10);
        assert_close(moved.ra_deg, 0.0, 1e-10);
    }

    #[test]
    fn test_unit_vector() {
        let v = SkyPoint::new(90.0, 0.0).to_unit_vector();
        assert_close(v[0], 0.0, 1e-12);
        assert_close(v[1], 1.0, 1e-12);
        assert_close(v[2], 0.0, 1e-12);
    }
}
