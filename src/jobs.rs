//! # Producers
//!
//! The three subsetting entry points, each taking the same four inputs
//! (`input`, `output`, `aoi_path`, `aoi_file`) through a [`RunContext`]:
//!
//! - [`generate_domain`]: resolves the AOI against a reference domain in any
//!   input mode and writes the 1D AOI domain file.
//! - [`generate_surfdata`]: subsets one surface-property file.
//! - [`generate_forcing`]: runs the [`TaskScheduler`] over a forcing tree.
//!
//! Surfdata and forcing files are resolved against their own `gridID` arrays,
//! so every output shares the ascending grid order of its source.

use crate::config::RunConfig;
use crate::error::{AoiError, AoiResult};
use crate::grid::ReferenceGrid;
use crate::input::{AoiInputKind, AoiPoints};
use crate::resolve::{Resolution, resolve};
use crate::scheduler::{ExecutionStrategy, Task, TaskOutcome, TaskScheduler};
use crate::transcode::{TranscodeOptions, TranscodeReport, find_site_dimension, transcode};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Explicit state shared by every producer of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// AOI name used as the output file prefix
    pub aoi_name: String,
    /// Directory holding the AOI points file
    pub aoi_path: PathBuf,
    /// AOI points file name
    pub aoi_file: String,
    /// Generation timestamp stamped into titles and file names
    pub generated_at: DateTime<Local>,
}

impl RunContext {
    pub fn new<P: AsRef<Path>>(aoi_path: P, aoi_file: &str, generated_at: DateTime<Local>) -> Self {
        Self {
            aoi_name: crate::input::aoi_name(aoi_file).to_string(),
            aoi_path: aoi_path.as_ref().to_path_buf(),
            aoi_file: aoi_file.to_string(),
            generated_at,
        }
    }

    /// Generation date as `yymmdd`.
    pub fn date_tag(&self) -> String {
        self.generated_at.format("%y%m%d").to_string()
    }

    pub fn load_points(&self, config: &RunConfig) -> AoiResult<AoiPoints> {
        AoiPoints::load(&self.aoi_path, &self.aoi_file, &config.identifier_variable)
    }
}

/// Result of one subsetted file.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub destination: PathBuf,
    pub report: TranscodeReport,
    pub resolution: Resolution,
}

/// Transcodes `source` into `destination`, removing the partial destination
/// on failure.
pub fn subset_file(
    source: &Path,
    destination: &Path,
    resolution: &Resolution,
    config: &RunConfig,
    options: &TranscodeOptions,
) -> AoiResult<TranscodeReport> {
    let file = netcdf::open(source)?;
    let site = find_site_dimension(&file, &config.site_dimensions)?;
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    match transcode(&file, destination, &site, resolution, options) {
        Ok(report) => {
            log::debug!(
                "Wrote {} ({} variables, {} sites)",
                destination.display(),
                report.variables,
                report.sites
            );
            Ok(report)
        }
        Err(e) => {
            if destination.exists()
                && let Err(rm) = fs::remove_file(destination)
            {
                log::warn!("Could not remove partial file {}: {}", destination.display(), rm);
            }
            Err(e)
        }
    }
}

/// Resolves `points` against the grid of an open source file.
fn resolve_against(
    file: &netcdf::File,
    points: &AoiPoints,
    config: &RunConfig,
) -> AoiResult<Resolution> {
    let grid = match points.kind() {
        AoiInputKind::Identifier => {
            ReferenceGrid::identifiers_from_file(file, &config.identifier_variable)?
        }
        _ => ReferenceGrid::from_file(file, &config.grid_variables())?,
    };
    let resolution = resolve(&points.input, &grid)?;
    if resolution.is_empty() {
        return Err(AoiError::EmptySelection(crate::grid::file_label(file)));
    }
    Ok(resolution)
}

/// Name of the AOI domain file generated from `reference`.
pub fn domain_file_name(ctx: &RunContext, reference: &Path) -> String {
    let stem = reference
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "domain".to_string());
    format!("{}_{}.c{}.nc", ctx.aoi_name, stem, ctx.date_tag())
}

/// Writes the 1D AOI domain file cut from `reference` into `output_dir`.
pub fn generate_domain(
    reference: &Path,
    output_dir: &Path,
    points: &AoiPoints,
    ctx: &RunContext,
    config: &RunConfig,
) -> AoiResult<FileOutcome> {
    let resolution = {
        let file = netcdf::open(reference)?;
        resolve_against(&file, points, config)?
    };
    let surviving = points.len() - resolution.rejected().len();
    if surviving != resolution.len() {
        log::warn!(
            "{} AOI points map to {} distinct grid cells; the domain keeps {}",
            surviving,
            resolution.len(),
            resolution.len()
        );
    }

    let reference_name = reference
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let destination = output_dir.join(domain_file_name(ctx, reference));
    let mut options = config.transcode_options(format!(
        "1D domain for {}, generated on {} with {}",
        ctx.aoi_name,
        ctx.date_tag(),
        reference_name
    ));
    options.skipped_variables = config.domain_dropped_variables.clone();

    log::info!("Generating AOI domain {}", destination.display());
    let report = subset_file(reference, &destination, &resolution, config, &options)?;
    Ok(FileOutcome {
        destination,
        report,
        resolution,
    })
}

fn title_for(destination: &Path, source: &Path, ctx: &RunContext) -> String {
    format!(
        "{} created from {} on {}",
        destination.display(),
        source.display(),
        ctx.date_tag()
    )
}

/// Subsets one file against its own identifiers into `<output_dir>/<AOI>_<file>`.
pub fn subset_by_identifiers(
    source: &Path,
    destination: &Path,
    points: &AoiPoints,
    ctx: &RunContext,
    config: &RunConfig,
) -> AoiResult<FileOutcome> {
    let resolution = {
        let file = netcdf::open(source)?;
        resolve_against(&file, points, config)?
    };
    let options = config.transcode_options(title_for(destination, source, ctx));
    let report = subset_file(source, destination, &resolution, config, &options)?;
    Ok(FileOutcome {
        destination: destination.to_path_buf(),
        report,
        resolution,
    })
}

/// Subsets a single surface-property file.
pub fn generate_surfdata(
    surfdata: &Path,
    output_dir: &Path,
    points: &AoiPoints,
    ctx: &RunContext,
    config: &RunConfig,
) -> AoiResult<FileOutcome> {
    let file_name = surfdata
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| AoiError::Input(format!("{} is not a file", surfdata.display())))?;
    let destination = output_dir.join(format!("{}_{}", ctx.aoi_name, file_name));
    log::info!("Generating AOI surface data {}", destination.display());
    subset_by_identifiers(surfdata, &destination, points, ctx, config)
}

/// Variable and period fields of a dotted forcing file name
/// (`clmforc.Daymet4.1km.1d.TBOT.2014-01.nc` → `TBOT`, `2014-01`).
pub fn forcing_fields(file_name: &str) -> (&str, &str) {
    let parts: Vec<&str> = file_name.split('.').collect();
    (
        parts.get(4).copied().unwrap_or(""),
        parts.get(5).copied().unwrap_or(""),
    )
}

/// Subsets every forcing file below `input_root` into the mirrored tree under
/// `output_root` with `strategy`, returning one outcome per task it ran.
pub fn generate_forcing(
    input_root: &Path,
    output_root: &Path,
    points: &AoiPoints,
    ctx: &RunContext,
    config: &RunConfig,
    strategy: Box<dyn ExecutionStrategy>,
) -> AoiResult<Vec<TaskOutcome>> {
    let scheduler = TaskScheduler::new(strategy, &config.file_suffix);

    let job = |task: &Task| -> AoiResult<()> {
        let (variable, period) = forcing_fields(&task.file_name);
        log::info!("Processing {} ({}) in {}", variable, period, task.file_name);
        let start = Instant::now();
        let destination = task.destination_path(&ctx.aoi_name);
        subset_by_identifiers(&task.source_path(), &destination, points, ctx, config)?;
        log::info!(
            "Generated 1D forcing for {} from {} in {:.2}s",
            ctx.aoi_name,
            task.file_name,
            start.elapsed().as_secs_f64()
        );
        Ok(())
    };

    scheduler.run(input_root, output_root, &job)
}
