//! Sky geometry for HEALPix-sharded reference catalogs.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`sphere`] | [`SkyPoint`], great-circle separation, bearings and offsets |
//! | [`healpix`] | Nested HEALPix cell ids: [`cell_of`], [`cell_center`], [`covering_cells`] |
//! | [`region`] | Query regions ([`SkyCircle`], [`PixelBox`]) and box footprints |
//! | [`projection`] | The [`SkyProjection`] seam and a gnomonic [`TanProjection`] |
//!
//! Cell ids are plain `u64` nested indices. A catalog is partitioned at one
//! fixed depth; the same depth must be used for covering queries at read time.

pub mod error;
pub mod healpix;
pub mod projection;
pub mod region;
pub mod sphere;

pub use error::{SkyError, SkyResult};
pub use healpix::{cell_center, cell_of, children, covering_cells, parent, CellId, MAX_DEPTH};
pub use projection::{SkyProjection, TanProjection};
pub use region::{PixelBox, SkyCircle};
pub use sphere::SkyPoint;
