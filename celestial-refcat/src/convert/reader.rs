//! Delimited-text catalog reader.
//!
//! Handles plain or gzipped text with a single header line, which may be
//! prefixed with `#` (as `numpy.savetxt` writes it). Later lines starting
//! with `#` are comments.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use celestial_sky::{cell_of, CellId};
use flate2::read::GzDecoder;
use tracing::{debug, warn};

use crate::config::{ColumnMap, ConvertConfig, Delimiter, FluxKind};
use crate::epoch::Epoch;
use crate::error::{RefcatError, RefcatResult};
use crate::shard::{ProperMotion, ShardRecord};

/// AB magnitude zero point for fluxes in nanojansky.
const AB_ZERO_POINT_NJY: f64 = 31.4;

const JANSKY_TO_NANOJANSKY: f64 = 1e9;

/// Records parsed from one input file, each tagged with its cell.
#[derive(Debug)]
pub struct ParsedFile {
    pub source: String,
    pub records: Vec<(CellId, ShardRecord)>,
    pub rejected: u64,
}

struct FluxIndices {
    value: usize,
    error: Option<usize>,
    kind: FluxKind,
}

struct ColumnIndices {
    id: Option<usize>,
    ra: usize,
    dec: usize,
    ra_err: Option<usize>,
    dec_err: Option<usize>,
    pm_ra: Option<usize>,
    pm_dec: Option<usize>,
    pm_ra_err: Option<usize>,
    pm_dec_err: Option<usize>,
    epoch: Option<usize>,
    fluxes: Vec<FluxIndices>,
    width: usize,
}

impl ColumnIndices {
    fn resolve(header: &[&str], map: &ColumnMap, source: &str) -> RefcatResult<Self> {
        let positions: HashMap<&str, usize> =
            header.iter().enumerate().map(|(i, name)| (*name, i)).collect();
        let required = |name: &str| -> RefcatResult<usize> {
            positions.get(name).copied().ok_or_else(|| {
                RefcatError::configuration(format!("{}: column '{}' not in header", source, name))
            })
        };
        let optional = |name: &Option<String>| -> RefcatResult<Option<usize>> {
            name.as_deref().map(required).transpose()
        };

        let fluxes = map
            .fluxes
            .iter()
            .map(|f| {
                Ok(FluxIndices {
                    value: required(f.value.as_str())?,
                    error: optional(&f.error)?,
                    kind: f.kind,
                })
            })
            .collect::<RefcatResult<Vec<_>>>()?;

        Ok(Self {
            id: optional(&map.id)?,
            ra: required(map.ra.as_str())?,
            dec: required(map.dec.as_str())?,
            ra_err: optional(&map.ra_err)?,
            dec_err: optional(&map.dec_err)?,
            pm_ra: optional(&map.pm_ra)?,
            pm_dec: optional(&map.pm_dec)?,
            pm_ra_err: optional(&map.pm_ra_err)?,
            pm_dec_err: optional(&map.pm_dec_err)?,
            epoch: optional(&map.epoch)?,
            fluxes,
            width: header.len(),
        })
    }
}

fn open_text(path: &Path) -> RefcatResult<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| RefcatError::io(path, e))?;
    if path.extension().is_some_and(|e| e == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn split_fields(line: &str, delimiter: Delimiter) -> Vec<&str> {
    match delimiter {
        Delimiter::Comma => line.split(',').map(str::trim).collect(),
        Delimiter::Whitespace => line.split_whitespace().collect(),
    }
}

/// Parse one catalog file. Bad rows are logged, counted and skipped; a
/// missing declared column fails the whole file.
///
/// Ids are left at 0 when the column map has no id column; the converter
/// assigns them after all files are read.
pub fn read_catalog_file(path: &Path, config: &ConvertConfig) -> RefcatResult<ParsedFile> {
    let source = path.display().to_string();
    let reader = open_text(path)?;
    let mut lines = reader.lines().enumerate();

    let (header_line, header) = loop {
        match lines.next() {
            Some((n, line)) => {
                let line = line.map_err(|e| RefcatError::io(path, e))?;
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    break (n, trimmed.trim_start_matches('#').trim().to_string());
                }
            }
            None => {
                return Err(RefcatError::configuration(format!(
                    "{}: no header line",
                    source
                )))
            }
        }
    };
    let header_fields = split_fields(&header, config.delimiter);
    let indices = ColumnIndices::resolve(&header_fields, &config.columns, &source)?;
    debug!(source = %source, header_line, columns = header_fields.len(), "parsed header");

    let mut records = Vec::new();
    let mut rejected = 0u64;
    for (n, line) in lines {
        let line = line.map_err(|e| RefcatError::io(path, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields = split_fields(trimmed, config.delimiter);
        match parse_row(&fields, &indices) {
            Ok(record) => {
                let cell = cell_of(&record.position(), config.depth);
                records.push((cell, record));
            }
            Err(message) => {
                rejected += 1;
                let err = RefcatError::malformed_record(&source, n as u64 + 1, message);
                debug!("{}", err);
            }
        }
    }

    if rejected > 0 {
        warn!(source = %source, rejected, kept = records.len(), "skipped malformed records");
    }
    Ok(ParsedFile {
        source,
        records,
        rejected,
    })
}

fn parse_row(fields: &[&str], idx: &ColumnIndices) -> Result<ShardRecord, String> {
    if fields.len() != idx.width {
        return Err(format!("expected {} fields, found {}", idx.width, fields.len()));
    }

    let id = match idx.id {
        Some(i) => fields[i]
            .parse::<i64>()
            .map_err(|_| format!("unparsable id '{}'", fields[i]))?,
        None => 0,
    };

    let ra = parse_required(fields[idx.ra], "ra")?;
    let dec = parse_required(fields[idx.dec], "dec")?;
    if !(-90.0..=90.0).contains(&dec) {
        return Err(format!("dec {} outside [-90, 90]", dec));
    }
    if !(0.0..=360.0).contains(&ra) {
        return Err(format!("ra {} outside [0, 360]", ra));
    }
    let ra = if ra == 360.0 { 0.0 } else { ra };

    let value = |i: Option<usize>| i.and_then(|i| parse_optional(fields[i]));

    let proper_motion = match (value(idx.pm_ra), value(idx.pm_dec)) {
        (Some(pm_ra), Some(pm_dec)) => Some(ProperMotion {
            pm_ra,
            pm_dec,
            pm_ra_err: value(idx.pm_ra_err),
            pm_dec_err: value(idx.pm_dec_err),
        }),
        _ => None,
    };

    let mut fluxes = Vec::with_capacity(2 * idx.fluxes.len());
    for flux in &idx.fluxes {
        let raw = parse_optional(fields[flux.value]).unwrap_or(f64::NAN);
        let raw_err = value(flux.error).unwrap_or(f64::NAN);
        let (f, e) = to_nanojansky(raw, raw_err, flux.kind);
        fluxes.push(f);
        fluxes.push(e);
    }

    Ok(ShardRecord {
        id,
        ra,
        dec,
        ra_err: value(idx.ra_err),
        dec_err: value(idx.dec_err),
        proper_motion,
        epoch: value(idx.epoch).map(Epoch::from_mjd),
        fluxes,
    })
}

fn parse_required(field: &str, name: &str) -> Result<f64, String> {
    let value: f64 = field
        .parse()
        .map_err(|_| format!("unparsable {} '{}'", name, field))?;
    if !value.is_finite() {
        return Err(format!("non-finite {}", name));
    }
    Ok(value)
}

/// Empty, unparsable and non-finite values read as absent.
fn parse_optional(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert a flux (or AB magnitude) and its error to nanojansky.
pub fn to_nanojansky(value: f64, error: f64, kind: FluxKind) -> (f64, f64) {
    match kind {
        FluxKind::Nanojansky => (value, error),
        FluxKind::Jansky => (value * JANSKY_TO_NANOJANSKY, error * JANSKY_TO_NANOJANSKY),
        FluxKind::AbMagnitude => {
            let flux = 10f64.powf(-0.4 * (value - AB_ZERO_POINT_NJY));
            let flux_err = 0.4 * std::f64::consts::LN_10 * flux * error;
            (flux, flux_err)
        }
    }
}
