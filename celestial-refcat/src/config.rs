//! Loader and converter configuration.
//!
//! Both structs deserialize from JSON with every field optional; missing
//! fields take the defaults documented on each field.

use std::collections::BTreeMap;
use std::path::Path;

use celestial_sky::MAX_DEPTH;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::epoch::Epoch;
use crate::error::{RefcatError, RefcatResult};

pub const DEFAULT_DEPTH: u8 = 8;

/// Options for [`ReferenceObjectLoader`](crate::load::ReferenceObjectLoader).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Partition depth the catalog was converted at. Default 8.
    pub depth: u8,
    /// Padding in pixels added to every side of a pixel box when the caller
    /// gives no explicit padding. Default 250.
    pub pixel_margin: f64,
    /// Alias filter name to stored filter name. Default empty.
    pub filter_map: BTreeMap<String, String>,
    /// Resolve every requested filter to this stored filter. Cannot be
    /// combined with `filter_map`. Default unset.
    pub any_filter_maps_to_this: Option<String>,
    /// Fail loads that carry no epoch, and records whose proper motion cannot
    /// be applied. Default false.
    pub require_proper_motion: bool,
    /// Extra radius in arcseconds added to every coarse covering. Default 1.
    pub covering_margin_arcsec: f64,
    /// Upper bound on any record's proper motion, in mas/yr, used to widen
    /// the coarse covering when an epoch is requested. Default 11000.
    pub max_proper_motion: f64,
    /// Reference epoch of the stored positions, when catalog-wide. Filled from
    /// the master index by `from_index` if unset. Default unset.
    pub catalog_epoch: Option<Epoch>,
    /// Assumed bound, in years, on the distance between a requested epoch
    /// and any record's epoch while `catalog_epoch` is unknown. Widens the
    /// coarse covering together with `max_proper_motion`. Default 50.
    pub max_epoch_span_years: f64,
    /// Interior points sampled per pixel-box edge when computing its sky
    /// footprint. Default 8.
    pub boundary_samples_per_edge: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            pixel_margin: 250.0,
            filter_map: BTreeMap::new(),
            any_filter_maps_to_this: None,
            require_proper_motion: false,
            covering_margin_arcsec: 1.0,
            max_proper_motion: 11_000.0,
            catalog_epoch: None,
            max_epoch_span_years: 50.0,
            boundary_samples_per_edge: 8,
        }
    }
}

impl LoaderConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> RefcatResult<Self> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RefcatResult<()> {
        validate_depth(self.depth)?;
        if !self.pixel_margin.is_finite() || self.pixel_margin < 0.0 {
            return Err(RefcatError::configuration(format!(
                "pixel_margin must be finite and non-negative, got {}",
                self.pixel_margin
            )));
        }
        if !self.covering_margin_arcsec.is_finite() || self.covering_margin_arcsec < 0.0 {
            return Err(RefcatError::configuration(format!(
                "covering_margin_arcsec must be finite and non-negative, got {}",
                self.covering_margin_arcsec
            )));
        }
        if !self.max_proper_motion.is_finite() || self.max_proper_motion < 0.0 {
            return Err(RefcatError::configuration(format!(
                "max_proper_motion must be finite and non-negative, got {}",
                self.max_proper_motion
            )));
        }
        if !self.max_epoch_span_years.is_finite() || self.max_epoch_span_years < 0.0 {
            return Err(RefcatError::configuration(format!(
                "max_epoch_span_years must be finite and non-negative, got {}",
                self.max_epoch_span_years
            )));
        }
        if self.any_filter_maps_to_this.is_some() && !self.filter_map.is_empty() {
            return Err(RefcatError::configuration(
                "any_filter_maps_to_this cannot be combined with filter_map",
            ));
        }
        Ok(())
    }

    /// Stored filter name for a requested one.
    pub fn resolve_filter(&self, requested: &str) -> String {
        if let Some(target) = &self.any_filter_maps_to_this {
            return target.clone();
        }
        self.filter_map
            .get(requested)
            .cloned()
            .unwrap_or_else(|| requested.to_string())
    }
}

/// Field separator of converter input files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    #[default]
    Comma,
    Whitespace,
}

/// Units of a flux column in converter input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FluxKind {
    #[default]
    Nanojansky,
    Jansky,
    /// AB magnitude; the error column is a magnitude error.
    AbMagnitude,
}

/// One filter's flux in converter input. Written to shards as
/// `<filter>_flux` and `<filter>_fluxErr` in nanojansky.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FluxColumn {
    pub filter: String,
    pub value: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub kind: FluxKind,
}

/// Input column names for each record field. Optional fields left unset are
/// stored as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnMap {
    /// Integer id column. When unset, ids are assigned sequentially from
    /// `ConvertConfig::id_start` in input order.
    pub id: Option<String>,
    pub ra: String,
    pub dec: String,
    /// Position errors in milliarcseconds.
    pub ra_err: Option<String>,
    pub dec_err: Option<String>,
    /// Proper motion in mas/yr; `pm_ra` includes cos(dec).
    pub pm_ra: Option<String>,
    pub pm_dec: Option<String>,
    pub pm_ra_err: Option<String>,
    pub pm_dec_err: Option<String>,
    /// Per-record epoch as MJD (TAI).
    pub epoch: Option<String>,
    pub fluxes: Vec<FluxColumn>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            id: None,
            ra: "ra".to_string(),
            dec: "dec".to_string(),
            ra_err: None,
            dec_err: None,
            pm_ra: None,
            pm_dec: None,
            pm_ra_err: None,
            pm_dec_err: None,
            epoch: None,
            fluxes: Vec::new(),
        }
    }
}

impl ColumnMap {
    /// Shard flux column names, `<filter>_flux` then `<filter>_fluxErr` per
    /// filter in declaration order.
    pub fn flux_column_names(&self) -> Vec<String> {
        self.fluxes
            .iter()
            .flat_map(|f| [format!("{}_flux", f.filter), format!("{}_fluxErr", f.filter)])
            .collect()
    }
}

/// Options for [`CatalogConverter`](crate::convert::CatalogConverter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    /// Partition depth. Default 8.
    pub depth: u8,
    pub columns: ColumnMap,
    /// Default comma.
    pub delimiter: Delimiter,
    /// First id assigned when `columns.id` is unset. Default 0.
    pub id_start: i64,
    /// Catalog-wide epoch of the stored positions. Default unset.
    pub reference_epoch: Option<Epoch>,
    /// Let a later input replace an earlier record with the same id instead
    /// of aborting. Default false.
    pub allow_overwrite: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            columns: ColumnMap::default(),
            delimiter: Delimiter::Comma,
            id_start: 0,
            reference_epoch: None,
            allow_overwrite: false,
        }
    }
}

impl ConvertConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> RefcatResult<Self> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RefcatResult<()> {
        validate_depth(self.depth)?;
        let mut seen = std::collections::BTreeSet::new();
        for flux in &self.columns.fluxes {
            if flux.filter.is_empty() {
                return Err(RefcatError::configuration("flux filter name is empty"));
            }
            if !seen.insert(flux.filter.as_str()) {
                return Err(RefcatError::configuration(format!(
                    "filter '{}' declared twice",
                    flux.filter
                )));
            }
        }
        if self.columns.pm_ra.is_some() != self.columns.pm_dec.is_some() {
            return Err(RefcatError::configuration(
                "pm_ra and pm_dec must be declared together",
            ));
        }
        Ok(())
    }
}

fn validate_depth(depth: u8) -> RefcatResult<()> {
    if depth > MAX_DEPTH {
        return Err(RefcatError::configuration(format!(
            "depth {} exceeds maximum {}",
            depth, MAX_DEPTH
        )));
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> RefcatResult<T> {
    let text = std::fs::read_to_string(path).map_err(|e| RefcatError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| {
        RefcatError::configuration(format!("invalid config {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.depth, 8);
        assert_eq!(config.pixel_margin, 250.0);
        assert!(!config.require_proper_motion);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resolve_filter() {
        let mut config = LoaderConfig::default();
        config.filter_map.insert("aprime".into(), "a".into());
        assert_eq!(config.resolve_filter("aprime"), "a");
        assert_eq!(config.resolve_filter("b"), "b");

        let config = LoaderConfig {
            any_filter_maps_to_this: Some("g".into()),
            ..LoaderConfig::default()
        };
        assert_eq!(config.resolve_filter("r"), "g");
    }

    #[test]
    fn test_conflicting_filter_options_rejected() {
        let mut config = LoaderConfig {
            any_filter_maps_to_this: Some("g".into()),
            ..LoaderConfig::default()
        };
        config.filter_map.insert("r".into(), "g".into());
        assert!(matches!(
            config.validate(),
            Err(RefcatError::Configuration { .. })
        ));
    }

    #[test]
    fn test_epoch_span_must_be_non_negative() {
        assert_eq!(LoaderConfig::default().max_epoch_span_years, 50.0);
        let config = LoaderConfig {
            max_epoch_span_years: -1.0,
            ..LoaderConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_loader_from_json_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "depth": 4, "filter_map": {{ "r": "a" }}, "catalog_epoch": 57388.5 }}"#
        )
        .unwrap();
        let config = LoaderConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.depth, 4);
        assert_eq!(config.pixel_margin, 250.0);
        assert_eq!(config.resolve_filter("r"), "a");
        assert_eq!(config.catalog_epoch, Some(Epoch::from_julian_year(2016.0)));
    }

    #[test]
    fn test_loader_from_json_rejects_unknown_field() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "pixelMargin": 3 }}"#).unwrap();
        assert!(LoaderConfig::from_json_file(file.path()).is_err());
    }

    #[test]
    fn test_convert_config_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "depth": 2,
                "delimiter": "whitespace",
                "columns": {{
                    "id": "id", "ra": "ra_icrs", "dec": "dec_icrs",
                    "fluxes": [{{ "filter": "a", "value": "a_mag", "error": "a_magErr", "kind": "ab_magnitude" }}]
                }}
            }}"#
        )
        .unwrap();
        let config = ConvertConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.depth, 2);
        assert_eq!(config.delimiter, Delimiter::Whitespace);
        assert_eq!(config.columns.fluxes[0].kind, FluxKind::AbMagnitude);
        assert_eq!(
            config.columns.flux_column_names(),
            vec!["a_flux".to_string(), "a_fluxErr".to_string()]
        );
    }

    #[test]
    fn test_convert_config_rejects_duplicate_filter() {
        let mut config = ConvertConfig::default();
        for _ in 0..2 {
            config.columns.fluxes.push(FluxColumn {
                filter: "a".into(),
                value: "a_flux".into(),
                error: None,
                kind: FluxKind::Jansky,
            });
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_depth_limit() {
        let config = ConvertConfig {
            depth: 30,
            ..ConvertConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
