//! Catalog conversion

use crate::cli::{Cli, ConvertArgs};
use anyhow::Context;
use celestial_refcat::{CatalogConverter, ConversionReport, ConvertConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Instant;

pub fn run(args: &ConvertArgs, cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(args)?;
    validate_inputs(args)?;
    print_plan(args, &config);
    configure_thread_pool(args.threads);

    let converter = CatalogConverter::new(config)?;
    let pb = create_progress_bar(args.inputs.len() as u64);
    let start = Instant::now();
    let on_parsed = |path: &Path| {
        if cli.verbose {
            pb.println(format!("Parsed {:?}", path.file_name().unwrap_or_default()));
        }
        pb.inc(1);
    };
    let result = converter.run_with_progress(&args.inputs, &args.output, &on_parsed);
    pb.finish_and_clear();

    let report = result.with_context(|| format!("Conversion into {:?} failed", args.output))?;
    print_summary(&report, start.elapsed().as_secs_f64());
    Ok(())
}

fn load_config(args: &ConvertArgs) -> anyhow::Result<ConvertConfig> {
    let mut config = ConvertConfig::from_json_file(&args.config)
        .with_context(|| format!("Failed to load converter config {:?}", args.config))?;
    if let Some(depth) = args.depth {
        config.depth = depth;
    }
    if args.allow_overwrite {
        config.allow_overwrite = true;
    }
    config.validate()?;
    Ok(config)
}

fn validate_inputs(args: &ConvertArgs) -> anyhow::Result<()> {
    for input in &args.inputs {
        if !input.is_file() {
            anyhow::bail!("Input file does not exist: {:?}", input);
        }
    }
    Ok(())
}

fn print_plan(args: &ConvertArgs, config: &ConvertConfig) {
    println!("=== Reference Catalog Conversion ===");
    println!("Input files: {}", args.inputs.len());
    println!("HEALPix depth: {}", config.depth);
    println!("Filters: {}", config.columns.flux_column_names().join(", "));
    match config.reference_epoch {
        Some(epoch) => println!("Reference epoch: {}", epoch),
        None => println!("Reference epoch: per record"),
    }
    println!("Output directory: {:?}", args.output);
    println!("Threads: {}", resolve_threads(args.threads));
    println!();
}

fn resolve_threads(threads: usize) -> usize {
    if threads == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        threads
    }
}

fn configure_thread_pool(threads: usize) {
    rayon::ThreadPoolBuilder::new()
        .num_threads(resolve_threads(threads))
        .build_global()
        .ok();
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

fn print_summary(report: &ConversionReport, seconds: f64) {
    println!("=== Conversion Complete ===");
    println!("Shards written: {}", report.shards_written);
    println!("Records written: {}", report.records_written);
    println!("Rows rejected: {}", report.rejected);
    if report.overwritten > 0 {
        println!("Records overwritten: {}", report.overwritten);
    }
    println!("Output: {:?}", report.output_dir);
    println!("Elapsed: {:.1}s", seconds);
}
