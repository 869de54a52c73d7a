//! Region queries against a converted catalog

use crate::cli::{Cli, OutputFormat, QueryArgs, Region};
use anyhow::Context;
use celestial_refcat::{Epoch, LoadResult, LoaderConfig, MasterIndex, RefCatalog, ReferenceObjectLoader};
use celestial_sky::sphere::ARCSEC_TO_DEG;
use celestial_sky::{PixelBox, SkyPoint, TanProjection};
use std::time::Instant;

pub fn run(args: &QueryArgs, cli: &Cli) -> anyhow::Result<()> {
    let index = MasterIndex::read(&args.catalog)
        .with_context(|| format!("Failed to read index in {:?}", args.catalog))?;
    let config = load_config(args, &index)?;
    let loader = ReferenceObjectLoader::from_index(&index, &args.catalog, config)?;
    let epoch = args.epoch.map(Epoch::from_mjd);

    let start = Instant::now();
    let result = match &args.region {
        Region::Circle { ra, dec, radius } => {
            loader.load_sky_circle(SkyPoint::try_new(*ra, *dec)?, *radius, &args.filter, epoch)?
        }
        Region::Box {
            ra,
            dec,
            scale,
            width,
            height,
            padding,
        } => {
            let bbox = PixelBox::from_corner_dimensions(0, 0, *width, *height)?;
            let crpix = ((*width as f64 - 1.0) / 2.0, (*height as f64 - 1.0) / 2.0);
            let projection = TanProjection::from_scale(crpix, SkyPoint::try_new(*ra, *dec)?, scale * ARCSEC_TO_DEG)?;
            loader.load_pixel_box(&bbox, &projection, &args.filter, *padding, epoch)?
        }
    };
    if cli.verbose {
        eprintln!("Query completed in {:.2} ms", start.elapsed().as_secs_f64() * 1000.0);
    }

    let shown = args.limit.unwrap_or(usize::MAX).min(result.ref_cat.len());
    match args.format {
        OutputFormat::Table => print_table(&result, shown),
        OutputFormat::Json => print_json(&result, shown)?,
        OutputFormat::Csv => print_csv(&result.ref_cat, shown),
    }
    Ok(())
}

fn load_config(args: &QueryArgs, index: &MasterIndex) -> anyhow::Result<LoaderConfig> {
    let mut config = match &args.config {
        Some(path) => LoaderConfig::from_json_file(path)
            .with_context(|| format!("Failed to load loader config {:?}", path))?,
        None => LoaderConfig {
            depth: index.depth,
            ..LoaderConfig::default()
        },
    };
    if args.require_pm {
        config.require_proper_motion = true;
    }
    config.validate()?;
    Ok(config)
}

fn print_table(result: &LoadResult, shown: usize) {
    let cat = &result.ref_cat;
    for (i, row) in cat.rows().iter().take(shown).enumerate() {
        let flux = cat.float_value(i, &result.flux_field).unwrap_or(f64::NAN);
        print!(
            "{:4}: {:>20} RA={:.6}° Dec={:+.6}° {}={:.3}",
            i + 1,
            row.id,
            row.coord_ra,
            row.coord_dec,
            result.flux_field,
            flux
        );
        if let Some(c) = row.centroid {
            print!(" x={:.2} y={:.2}", c.x, c.y);
        }
        println!();
    }

    if cat.is_empty() {
        println!("No reference objects in the region.");
    } else {
        println!("\nTotal results: {}", cat.len());
    }
}

#[derive(serde::Serialize)]
struct JsonResult<'a> {
    flux_field: &'a str,
    count: usize,
    rows: &'a [celestial_refcat::RefRecord],
}

fn print_json(result: &LoadResult, shown: usize) -> anyhow::Result<()> {
    let out = JsonResult {
        flux_field: &result.flux_field,
        count: result.ref_cat.len(),
        rows: &result.ref_cat.rows()[..shown],
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn print_csv(cat: &RefCatalog, shown: usize) {
    let names: Vec<&str> = cat.schema().iter().map(|c| c.name.as_str()).collect();
    println!("{}", names.join(","));
    for (i, row) in cat.rows().iter().take(shown).enumerate() {
        let fields: Vec<String> = names
            .iter()
            .map(|&name| match name {
                "id" => row.id.to_string(),
                "hasCentroid" => row.centroid.is_some().to_string(),
                _ => cat.float_value(i, name).map(|v| v.to_string()).unwrap_or_default(),
            })
            .collect();
        println!("{}", fields.join(","));
    }
}
