//! Forge: reference catalog conversion and query CLI
//!
//! Converts text catalogs into a HEALPix-sharded directory and runs
//! region queries against one.

mod cli;
mod convert;
mod info;
mod query;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Convert(args) => convert::run(args, &cli),
        Commands::Query(args) => query::run(args, &cli),
        Commands::Info(args) => info::run(args),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
