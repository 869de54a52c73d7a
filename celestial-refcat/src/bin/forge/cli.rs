//! CLI argument definitions for forge

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "forge")]
#[command(about = "HEALPix-sharded reference catalog pipeline")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert text catalogs into a sharded catalog directory
    Convert(ConvertArgs),

    /// Load reference objects inside a sky circle or pixel box
    Query(QueryArgs),

    /// Print the master index of a catalog directory
    Info(InfoArgs),
}

#[derive(Parser)]
pub struct ConvertArgs {
    /// Converter configuration (JSON)
    #[arg(long)]
    pub config: PathBuf,

    /// Output catalog directory (must not already hold an index)
    #[arg(long)]
    pub output: PathBuf,

    /// Override the partition depth from the configuration
    #[arg(long)]
    pub depth: Option<u8>,

    /// Replace earlier records that share an id instead of failing
    #[arg(long)]
    pub allow_overwrite: bool,

    /// Number of threads for parallel processing (0 = all cores)
    #[arg(short, long, default_value = "0")]
    pub threads: usize,

    /// Input catalog files (.csv, .txt, optionally .gz)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Parser)]
pub struct QueryArgs {
    /// Catalog directory produced by `forge convert`
    #[arg(long)]
    pub catalog: PathBuf,

    /// Loader configuration (JSON); defaults are used when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Requested filter name
    #[arg(long)]
    pub filter: String,

    /// Observation epoch as MJD (TAI)
    #[arg(long)]
    pub epoch: Option<f64>,

    /// Fail unless an epoch is given and proper motion can be applied
    #[arg(long)]
    pub require_pm: bool,

    /// Maximum number of rows printed
    #[arg(long)]
    pub limit: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub region: Region,
}

#[derive(Subcommand)]
pub enum Region {
    /// Everything strictly within RADIUS degrees of (RA, DEC)
    Circle {
        /// Right ascension of the center in degrees
        ra: f64,
        /// Declination of the center in degrees
        dec: f64,
        /// Radius in degrees
        #[arg(long, default_value = "1.0")]
        radius: f64,
    },
    /// Everything inside a pixel box on a gnomonic projection
    Box {
        /// Tangent point right ascension in degrees
        #[arg(long)]
        ra: f64,
        /// Tangent point declination in degrees
        #[arg(long)]
        dec: f64,
        /// Pixel scale in arcseconds per pixel
        #[arg(long)]
        scale: f64,
        /// Box width in pixels
        #[arg(long)]
        width: u32,
        /// Box height in pixels
        #[arg(long)]
        height: u32,
        /// Padding in pixels (configured pixel_margin when omitted)
        #[arg(long)]
        padding: Option<f64>,
    },
}

#[derive(Parser)]
pub struct InfoArgs {
    /// Catalog directory
    #[arg(long)]
    pub catalog: PathBuf,
}
