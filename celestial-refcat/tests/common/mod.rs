#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use celestial_refcat::{
    CatalogConverter, ColumnMap, ConversionReport, ConvertConfig, Epoch, FluxColumn, FluxKind,
};
use celestial_sky::SkyPoint;
use flate2::write::GzEncoder;
use flate2::Compression;

pub const DEPTH: u8 = 2;
pub const ID_START: i64 = 25;
pub const REFERENCE_MJD: f64 = 58000.0;
/// Total proper motion of every synthetic star, mas/yr, at 45 degrees.
pub const PM_TOTAL: f64 = 3000.0;
pub const RA_ERR: f64 = 10.0;
pub const DEC_ERR: f64 = 20.0;
pub const PM_RA_ERR: f64 = 5.0;
pub const PM_DEC_ERR: f64 = 7.0;

pub fn assert_close(actual: f64, expected: f64, tol: f64, what: &str) {
    assert!(
        (actual - expected).abs() <= tol,
        "{}: {} != {} (tolerance {})",
        what,
        actual,
        expected,
        tol
    );
}

#[derive(Debug, Clone, Copy)]
pub struct Star {
    pub id: i64,
    pub ra: f64,
    pub dec: f64,
    pub r_flux: f64,
}

impl Star {
    pub fn position(&self) -> SkyPoint {
        SkyPoint::new(self.ra, self.dec)
    }
}

pub fn pm_components() -> (f64, f64) {
    let angle = 45.0_f64.to_radians();
    (PM_TOTAL * angle.cos(), PM_TOTAL * angle.sin())
}

/// A jittered grid over the sphere, in input order. Ids are what the
/// converter assigns sequentially from `ID_START`.
pub fn synthetic_stars() -> Vec<Star> {
    let mut stars = Vec::new();
    for j in 0..17 {
        for i in 0..48 {
            let k = stars.len() as i64;
            stars.push(Star {
                id: ID_START + k,
                ra: 3.75 + 7.5 * i as f64 + 0.37 * (j % 3) as f64,
                dec: -80.0 + 10.0 * j as f64 + 0.21 * (i % 4) as f64,
                r_flux: 1000.0 + k as f64,
            });
        }
    }
    stars
}

fn row(star: &Star) -> String {
    let (pm_ra, pm_dec) = pm_components();
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{}",
        star.ra,
        star.dec,
        RA_ERR,
        DEC_ERR,
        pm_ra,
        pm_dec,
        PM_RA_ERR,
        PM_DEC_ERR,
        star.r_flux,
        star.r_flux * 0.01,
        20.0,
        0.05
    )
}

const HEADER: &str = "# ra,dec,ra_err,dec_err,pm_ra,pm_dec,pm_ra_err,pm_dec_err,r_flux,r_flux_err,g_mag,g_mag_err";

/// Write the synthetic stars as two inputs: a plain CSV with the first half
/// and a gzipped CSV with the rest.
pub fn write_inputs(dir: &Path, stars: &[Star]) -> Vec<PathBuf> {
    let (first, second) = stars.split_at(stars.len() / 2);

    let plain = dir.join("part_a.csv");
    let mut text = String::from(HEADER);
    text.push('\n');
    for star in first {
        text.push_str(&row(star));
        text.push('\n');
    }
    fs::write(&plain, text).unwrap();

    let gz = dir.join("part_b.csv.gz");
    let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
    writeln!(encoder, "{}", HEADER).unwrap();
    writeln!(encoder, "# comment lines are skipped").unwrap();
    for star in second {
        writeln!(encoder, "{}", row(star)).unwrap();
    }
    encoder.finish().unwrap();

    vec![plain, gz]
}

pub fn convert_config() -> ConvertConfig {
    ConvertConfig {
        depth: DEPTH,
        columns: ColumnMap {
            id: None,
            ra: "ra".into(),
            dec: "dec".into(),
            ra_err: Some("ra_err".into()),
            dec_err: Some("dec_err".into()),
            pm_ra: Some("pm_ra".into()),
            pm_dec: Some("pm_dec".into()),
            pm_ra_err: Some("pm_ra_err".into()),
            pm_dec_err: Some("pm_dec_err".into()),
            epoch: None,
            fluxes: vec![
                FluxColumn {
                    filter: "r".into(),
                    value: "r_flux".into(),
                    error: Some("r_flux_err".into()),
                    kind: FluxKind::Nanojansky,
                },
                FluxColumn {
                    filter: "g".into(),
                    value: "g_mag".into(),
                    error: Some("g_mag_err".into()),
                    kind: FluxKind::AbMagnitude,
                },
            ],
        },
        id_start: ID_START,
        reference_epoch: Some(Epoch::from_mjd(REFERENCE_MJD)),
        ..ConvertConfig::default()
    }
}

/// Convert the synthetic catalog into `dir/catalog`.
pub fn build_catalog(dir: &Path) -> (PathBuf, ConversionReport) {
    let inputs = write_inputs(dir, &synthetic_stars());
    let output = dir.join("catalog");
    let converter = CatalogConverter::new(convert_config()).unwrap();
    let report = converter.run(&inputs, &output).unwrap();
    (output, report)
}
