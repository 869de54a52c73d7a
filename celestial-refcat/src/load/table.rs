//! The result table returned by loader queries.

use serde::Serialize;

use crate::epoch::Epoch;
use crate::shard::ShardRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Int64,
    Float64,
    Flag,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub unit: Option<&'static str>,
}

impl ColumnSpec {
    fn new(name: impl Into<String>, kind: ColumnKind, unit: Option<&'static str>) -> Self {
        Self {
            name: name.into(),
            kind,
            unit,
        }
    }
}

/// Pixel position of a record, present only in pixel-box results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
}

/// One output row. Positions are degrees, position errors milliarcseconds,
/// proper motions mas/yr, fluxes nanojansky.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefRecord {
    pub id: i64,
    pub coord_ra: f64,
    pub coord_dec: f64,
    pub coord_ra_err: Option<f64>,
    pub coord_dec_err: Option<f64>,
    pub pm_ra: Option<f64>,
    pub pm_dec: Option<f64>,
    pub pm_ra_err: Option<f64>,
    pub pm_dec_err: Option<f64>,
    pub epoch: Option<Epoch>,
    /// Parallel to [`RefCatalog::flux_columns`].
    pub fluxes: Vec<f64>,
    pub centroid: Option<Centroid>,
}

impl RefRecord {
    pub(crate) fn from_shard_record(record: ShardRecord, fluxes: Vec<f64>) -> Self {
        let pm = record.proper_motion;
        Self {
            id: record.id,
            coord_ra: record.ra,
            coord_dec: record.dec,
            coord_ra_err: record.ra_err,
            coord_dec_err: record.dec_err,
            pm_ra: pm.map(|p| p.pm_ra),
            pm_dec: pm.map(|p| p.pm_dec),
            pm_ra_err: pm.and_then(|p| p.pm_ra_err),
            pm_dec_err: pm.and_then(|p| p.pm_dec_err),
            epoch: record.epoch,
            fluxes,
            centroid: None,
        }
    }
}

const FIXED_COLUMNS: [(&str, ColumnKind, Option<&str>); 10] = [
    ("id", ColumnKind::Int64, None),
    ("coord_ra", ColumnKind::Float64, Some("deg")),
    ("coord_dec", ColumnKind::Float64, Some("deg")),
    ("coord_raErr", ColumnKind::Float64, Some("mas")),
    ("coord_decErr", ColumnKind::Float64, Some("mas")),
    ("pm_ra", ColumnKind::Float64, Some("mas/yr")),
    ("pm_dec", ColumnKind::Float64, Some("mas/yr")),
    ("pm_raErr", ColumnKind::Float64, Some("mas/yr")),
    ("pm_decErr", ColumnKind::Float64, Some("mas/yr")),
    ("epoch", ColumnKind::Float64, Some("MJD")),
];

/// A reference catalog built fresh for one query.
///
/// Row-oriented storage with a column view: [`column`](Self::column) returns
/// any float column by name with absent values as NaN.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefCatalog {
    schema: Vec<ColumnSpec>,
    flux_columns: Vec<String>,
    has_centroids: bool,
    rows: Vec<RefRecord>,
}

impl RefCatalog {
    pub(crate) fn new(flux_columns: Vec<String>, has_centroids: bool, rows: Vec<RefRecord>) -> Self {
        let mut schema: Vec<ColumnSpec> = FIXED_COLUMNS
            .iter()
            .map(|&(name, kind, unit)| ColumnSpec::new(name, kind, unit))
            .collect();
        for name in &flux_columns {
            schema.push(ColumnSpec::new(name.clone(), ColumnKind::Float64, Some("nJy")));
        }
        if has_centroids {
            schema.push(ColumnSpec::new("centroid_x", ColumnKind::Float64, Some("pixel")));
            schema.push(ColumnSpec::new("centroid_y", ColumnKind::Float64, Some("pixel")));
            schema.push(ColumnSpec::new("hasCentroid", ColumnKind::Flag, None));
        }
        Self {
            schema,
            flux_columns,
            has_centroids,
            rows,
        }
    }

    pub fn schema(&self) -> &[ColumnSpec] {
        &self.schema
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.schema.iter().any(|c| c.name == name)
    }

    pub fn flux_columns(&self) -> &[String] {
        &self.flux_columns
    }

    pub fn rows(&self) -> &[RefRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.rows.iter().map(|r| r.id).collect()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        if !self.contains_column(name) || name == "id" || name == "hasCentroid" {
            return None;
        }
        Some(
            (0..self.rows.len())
                .map(|i| self.float_value(i, name).unwrap_or(f64::NAN))
                .collect(),
        )
    }

    pub fn has_centroid(&self) -> Option<Vec<bool>> {
        self.has_centroids
            .then(|| self.rows.iter().map(|r| r.centroid.is_some()).collect())
    }

    /// Value of a float column in one row; `None` when absent.
    pub fn float_value(&self, row: usize, name: &str) -> Option<f64> {
        let r = self.rows.get(row)?;
        match name {
            "coord_ra" => Some(r.coord_ra),
            "coord_dec" => Some(r.coord_dec),
            "coord_raErr" => r.coord_ra_err,
            "coord_decErr" => r.coord_dec_err,
            "pm_ra" => r.pm_ra,
            "pm_dec" => r.pm_dec,
            "pm_raErr" => r.pm_ra_err,
            "pm_decErr" => r.pm_dec_err,
            "epoch" => r.epoch.map(|e| e.mjd()),
            "centroid_x" if self.has_centroids => r.centroid.map(|c| c.x),
            "centroid_y" if self.has_centroids => r.centroid.map(|c| c.y),
            _ => {
                let idx = self.flux_columns.iter().position(|c| c == name)?;
                r.fluxes.get(idx).copied()
            }
        }
    }
}
