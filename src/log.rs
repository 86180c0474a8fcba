use crate::config::RunConfig;
use crate::jobs::RunContext;
use crate::resolve::Resolution;
use crate::scheduler::{RunSummary, TaskStatus};
use std::time::Duration;

pub fn show_greeting(command: &str) {
    println!("=== AOI Subsetting for 1D Land Datasets ===");
    println!("Running: {}", command);
}

pub fn config_echo(config: &RunConfig, ctx: &RunContext) {
    println!("\nConfiguration:");
    println!("  AOI: {} ({})", ctx.aoi_name, ctx.aoi_path.join(&ctx.aoi_file).display());
    println!("  Generated on: {}", ctx.date_tag());
    println!("  Site dimensions: {}", config.site_dimensions.join(", "));
    println!("  Identifier variable: {}", config.identifier_variable);
    println!("  Chunk size: {}", config.chunk_size);
    println!("  Workers: {}", config.workers);
    if config.strict {
        println!("  Strict mode: failed files abort with a non-zero exit");
    }
}

pub fn show_resolution(resolution: &Resolution) {
    println!("\nAOI Resolution:");
    println!(
        "  {} of {} grid cells selected",
        resolution.len(),
        resolution.grid_len()
    );
    if !resolution.rejected().is_empty() {
        println!("  {} points rejected", resolution.rejected().len());
        for rejected in resolution.rejected().iter().take(10) {
            println!(
                "    point {} {}: {}",
                rejected.position, rejected.point, rejected.reason
            );
        }
        if resolution.rejected().len() > 10 {
            println!("    ...");
        }
    }
}

pub fn show_run_summary(summary: &RunSummary) {
    println!("\nRun Summary:");
    println!("  Files processed: {}", summary.total);
    println!("  Completed: {}", summary.completed);
    println!("  Failed: {}", summary.failed.len());
    for outcome in &summary.failed {
        if let TaskStatus::Failed(reason) = &outcome.status {
            println!("    {}: {}", outcome.task.source_path().display(), reason);
        }
    }
}

pub fn show_farewell_with_timing(elapsed: Duration) {
    println!(
        "\n=== Subsetting completed in {:.2}s ===",
        elapsed.as_secs_f64()
    );
}
