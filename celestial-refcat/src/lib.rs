//! HEALPix-sharded astrometric reference catalogs.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`convert`] | [`CatalogConverter`]: text catalogs to one shard file per cell plus a master index |
//! | [`load`] | [`ReferenceObjectLoader`]: sky-circle and pixel-box queries with proper-motion correction |
//! | [`shard`] | The shard model, its binary codec and lazy [`ShardHandle`]s |
//! | [`index`] | [`MasterIndex`], the `index.json` describing a converted directory |
//! | [`determiner`] | Name-keyed [`DeterminerRegistry`] of PSF determination strategies |
//! | [`config`] | [`LoaderConfig`] and [`ConvertConfig`], JSON-loadable with defaults |
//! | [`epoch`] | [`Epoch`], an MJD (TAI) instant |
//!
//! A converted directory is read back through its index:
//!
//! ```no_run
//! use celestial_refcat::{LoaderConfig, MasterIndex, ReferenceObjectLoader};
//! use celestial_sky::SkyPoint;
//!
//! # fn main() -> celestial_refcat::RefcatResult<()> {
//! let root = std::path::Path::new("refcat");
//! let index = MasterIndex::read(root)?;
//! let loader = ReferenceObjectLoader::from_index(&index, root, LoaderConfig::default())?;
//! let center = SkyPoint::new(180.0, 0.0);
//! let result = loader.load_sky_circle(center, 0.5, "r", None)?;
//! println!("{} objects, flux column {}", result.ref_cat.len(), result.flux_field);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod convert;
pub mod determiner;
pub mod epoch;
pub mod error;
pub mod index;
pub mod load;
pub mod shard;

pub use config::{ColumnMap, ConvertConfig, Delimiter, FluxColumn, FluxKind, LoaderConfig};
pub use convert::{CatalogConverter, ConversionReport};
pub use determiner::{
    DeterminerConfig, DeterminerFactory, DeterminerRegistry, Exposure, PsfCandidate, PsfDetermination,
    PsfDeterminer, PsfModel, SpatialCellSet,
};
pub use epoch::Epoch;
pub use error::{RefcatError, RefcatResult};
pub use index::MasterIndex;
pub use load::{LoadResult, RefCatalog, RefRecord, ReferenceObjectLoader};
pub use shard::{
    FileShardHandle, InMemoryShardHandle, ProperMotion, Shard, ShardArena, ShardHandle, ShardRecord,
    CURRENT_FORMAT_VERSION,
};
