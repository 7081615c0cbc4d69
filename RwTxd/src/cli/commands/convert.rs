//! CLI command for converting a dictionary to another platform

use std::io::Cursor;
use std::path::Path;
use std::time::Instant;

use anyhow::Context;

use super::read_dictionary;
use crate::batch::OutputFileGuard;
use crate::cli::progress::{DISK, GEAR, LOOKING_GLASS, print_done, print_step};
use crate::engine::Engine;
use crate::pipeline::{TransformOptions, process_dictionary};

pub fn execute(source: &Path, output: &Path, options: &TransformOptions) -> anyhow::Result<()> {
    let start = Instant::now();
    let engine = Engine::new();

    print_step(1, 3, LOOKING_GLASS, "Reading dictionary...");
    let mut txd = read_dictionary(&engine, source)?;

    print_step(
        2,
        3,
        GEAR,
        &format!("Converting {} textures for {}...", txd.texture_count(), options.target_platform),
    );
    let report = process_dictionary(&engine, &mut txd, options, None)?;
    for (name, error) in &report.failed {
        println!("  '{name}' left unchanged: {error}");
    }

    print_step(3, 3, DISK, "Writing dictionary...");
    let data = engine
        .serialize_dictionary(&txd, Cursor::new(Vec::new()))?
        .into_inner();
    OutputFileGuard::new(output)
        .write_all(&data)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!("  {} converted, {} failed", report.processed, report.failed.len());
    print_done(start.elapsed());
    Ok(())
}
