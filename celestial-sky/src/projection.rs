//! Pixel ↔ sky mappings consumed by pixel-box queries.

use crate::error::{SkyError, SkyResult};
use crate::sphere::SkyPoint;

/// A world-coordinate mapping between image pixels and the sky.
pub trait SkyProjection: Send + Sync {
    fn pixel_to_sky(&self, x: f64, y: f64) -> SkyResult<SkyPoint>;

    /// Fails when the point has no image on the pixel grid (for example
    /// behind the tangent plane).
    fn sky_to_pixel(&self, point: &SkyPoint) -> SkyResult<(f64, f64)>;
}

/// Gnomonic (TAN) projection with a linear CD matrix in degrees per pixel.
///
/// `cd[0] = [cd1_1, cd1_2]`, `cd[1] = [cd2_1, cd2_2]`. The first intermediate
/// axis points toward increasing RA.
#[derive(Debug, Clone, PartialEq)]
pub struct TanProjection {
    pub crpix: (f64, f64),
    pub crval: SkyPoint,
    pub cd: [[f64; 2]; 2],
    inverse_cd: [[f64; 2]; 2],
}

impl TanProjection {
    pub fn new(crpix: (f64, f64), crval: SkyPoint, cd: [[f64; 2]; 2]) -> SkyResult<Self> {
        let determinant = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
        if determinant == 0.0 || !determinant.is_finite() {
            return Err(SkyError::NonInvertibleMatrix { determinant });
        }
        let inv = 1.0 / determinant;
        let inverse_cd = [
            [cd[1][1] * inv, -cd[0][1] * inv],
            [-cd[1][0] * inv, cd[0][0] * inv],
        ];
        Ok(Self {
            crpix,
            crval,
            cd,
            inverse_cd,
        })
    }

    /// North-up, east-left projection with square pixels of `scale_deg`.
    pub fn from_scale(crpix: (f64, f64), crval: SkyPoint, scale_deg: f64) -> SkyResult<Self> {
        Self::new(crpix, crval, [[-scale_deg, 0.0], [0.0, scale_deg]])
    }

    /// Pixel scale in degrees, from the CD determinant.
    pub fn pixel_scale(&self) -> f64 {
        let det = self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0];
        det.abs().sqrt()
    }
}

impl SkyProjection for TanProjection {
    fn pixel_to_sky(&self, x: f64, y: f64) -> SkyResult<SkyPoint> {
        if !x.is_finite() || !y.is_finite() {
            return Err(SkyError::invalid_coordinate(format!(
                "non-finite pixel ({}, {})",
                x, y
            )));
        }
        let u = x - self.crpix.0;
        let v = y - self.crpix.1;
        let xi = (self.cd[0][0] * u + self.cd[0][1] * v).to_radians();
        let eta = (self.cd[1][0] * u + self.cd[1][1] * v).to_radians();

        let (sin_d0, cos_d0) = libm::sincos(self.crval.dec_rad());
        let denom = cos_d0 - eta * sin_d0;
        let ra = self.crval.ra_rad() + libm::atan2(xi, denom);
        let dec = libm::atan2(sin_d0 + eta * cos_d0, libm::hypot(xi, denom));
        Ok(SkyPoint::from_radians(ra, dec))
    }

    fn sky_to_pixel(&self, point: &SkyPoint) -> SkyResult<(f64, f64)> {
        let (sin_d0, cos_d0) = libm::sincos(self.crval.dec_rad());
        let (sin_d, cos_d) = libm::sincos(point.dec_rad());
        let (sin_dra, cos_dra) = libm::sincos(point.ra_rad() - self.crval.ra_rad());

        let cos_c = sin_d0 * sin_d + cos_d0 * cos_d * cos_dra;
        if cos_c <= 0.0 {
            return Err(SkyError::behind_tangent_plane(point.ra_deg, point.dec_deg));
        }
        let xi = (cos_d * sin_dra / cos_c).to_degrees();
        let eta = ((cos_d0 * sin_d - sin_d0 * cos_d * cos_dra) / cos_c).to_degrees();

        let u = self.inverse_cd[0][0] * xi + self.inverse_cd[0][1] * eta;
        let v = self.inverse_cd[1][0] * xi + self.inverse_cd[1][1] * eta;
        Ok((u + self.crpix.0, v + self.crpix.1))
    }
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

    fn test_tan() -> TanProjection {
        let arcsec = 1.0 / 3600.0;
        TanProjection::new(
            (512.0, 512.0),
            SkyPoint::new(150.0, 25.0),
            [[-arcsec, 0.1 * arcsec], [0.05 * arcsec, arcsec]],
        )
        .unwrap()
    }

    #[test]
    fn test_crpix_maps_to_crval() {
        let tan = test_tan();
        let p = tan.pixel_to_sky(512.0, 512.0).unwrap();
        assert_close(p.ra_deg, 150.0, 1e-10);
        assert_close(p.dec_deg, 25.0, 1e-10);
    }

    #[test]
    fn test_round_trip() {
        let tan = test_tan();
        for &(x, y) in &[(0.0, 0.0), (1024.0, 1024.0), (256.0, 768.0), (-300.0, 40.0)] {
            let p = tan.pixel_to_sky(x, y).unwrap();
            let (x2, y2) = tan.sky_to_pixel(&p).unwrap();
            assert_close(x, x2, 1e-6);
            assert_close(y, y2, 1e-6);
        }
    }

    #[test]
    fn test_east_left_orientation() {
        let tan = TanProjection::from_scale((0.0, 0.0), SkyPoint::new(10.0, 0.0), 0.01).unwrap();
        let right = tan.pixel_to_sky(100.0, 0.0).unwrap();
        let up = tan.pixel_to_sky(0.0, 100.0).unwrap();
        assert!(right.ra_deg < 10.0);
        assert!(up.dec_deg > 0.0);
        assert_close(tan.pixel_scale(), 0.01, 1e-15);
    }

    #[test]
    fn test_behind_tangent_plane() {
        let tan = test_tan();
        let antipode = SkyPoint::new(330.0, -25.0);
        assert!(matches!(
            tan.sky_to_pixel(&antipode),
            Err(SkyError::BehindTangentPlane { .. })
        ));
    }

    #[test]
    fn test_singular_cd_rejected() {
        let result = TanProjection::new((0.0, 0.0), SkyPoint::new(0.0, 0.0), [[1.0, 2.0], [2.0, 4.0]]);
        assert!(matches!(result, Err(SkyError::NonInvertibleMatrix { .. })));
    }
}
