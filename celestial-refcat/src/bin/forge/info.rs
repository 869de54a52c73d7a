//! Catalog directory summary

use crate::cli::InfoArgs;
use anyhow::Context;
use celestial_refcat::MasterIndex;

pub fn run(args: &InfoArgs) -> anyhow::Result<()> {
    let index = MasterIndex::read(&args.catalog)
        .with_context(|| format!("Failed to read index in {:?}", args.catalog))?;
    println!("{}", index);
    if index.provenance.is_empty() {
        return Ok(());
    }
    println!("\nSources:");
    for entry in &index.provenance {
        let ids = match (entry.first_id, entry.last_id) {
            (Some(first), Some(last)) => format!("ids {}..={}", first, last),
            _ => "no ids".to_string(),
        };
        println!(
            "  {}: {}, {} records, {} rejected",
            entry.source, ids, entry.records, entry.rejected
        );
    }
    Ok(())
}
