use std::fmt;

use serde::{Deserialize, Serialize};

/// MJD of J2000.0.
pub const J2000_MJD: f64 = 51544.5;

pub const DAYS_PER_JULIAN_YEAR: f64 = 365.25;

/// An observation or catalog epoch as a Modified Julian Date on the TAI scale.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(f64);

impl Epoch {
    pub fn from_mjd(mjd: f64) -> Self {
        Self(mjd)
    }

    /// Julian epoch such as 2016.0 (Gaia DR3).
    pub fn from_julian_year(year: f64) -> Self {
        Self(J2000_MJD + (year - 2000.0) * DAYS_PER_JULIAN_YEAR)
    }

    pub fn mjd(&self) -> f64 {
        self.0
    }

    pub fn julian_year(&self) -> f64 {
        2000.0 + (self.0 - J2000_MJD) / DAYS_PER_JULIAN_YEAR
    }

    /// Elapsed Julian years from `earlier` to `self` (negative if `self` is
    /// before `earlier`).
    pub fn years_since(&self, earlier: Epoch) -> f64 {
        (self.0 - earlier.0) / DAYS_PER_JULIAN_YEAR
    }

    pub fn plus_years(&self, years: f64) -> Self {
        Self(self.0 + years * DAYS_PER_JULIAN_YEAR)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MJD {:.5} (J{:.3})", self.0, self.julian_year())
    }
}
