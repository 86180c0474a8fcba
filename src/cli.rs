//! # CLI Module
//!
//! This module provides the command-line interface for aoigen, including:
//! - Argument parsing with clap
//! - Configuration file selection (JSON/YAML) with the AOIGEN_ prefix
//! - One subcommand per producer, each taking four positional paths
//! - Schema inspection, random gridID sampling and shell completions

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Area-of-Interest subsetting for 1D gridded land-model NetCDF datasets
#[derive(Parser, Debug)]
#[command(name = "aoigen")]
#[command(about = "Cut Area-of-Interest subsets out of 1D land-model NetCDF datasets")]
#[command(version)]
#[command(author = "Rogerio Alves <rjmalves@users.noreply.github.com>")]
#[command(long_about = "
aoigen extracts an Area of Interest (AOI) from 1D gridded land-model datasets:
the domain file, surface properties and the atmospheric forcing tree. Every
output keeps the schema of its source; only the site dimension (ni/gridcell)
shrinks to the AOI.

AOI POINT FILES:
  <AOI>_gridID.csv     one grid identifier per line (header skipped)
  <AOI>_gridID.nc      a gridID variable, e.g. a previously generated domain
  <AOI>_xcyc.csv       lon,lat pairs matched to the nearest grid cell
  <AOI>_xcyc_lcc.csv   projected x,y pairs matched to the nearest grid cell

EXAMPLES:
  # 1D AOI domain from a reference domain
  aoigen domain ./domain.lnd.TES_SE.4km.1d.nc ./out ./AKSP_info AKSP_xcyc.csv

  # Surface properties
  aoigen surfdata ./surfdata.TES_SE.4km.1d.nc ./out ./AKSP_info AKSP_gridID.csv

  # Forcing tree with 16 local workers
  AOIGEN_WORKERS=16 aoigen forcing ./forcing ./out/forcing ./AKSP_info AKSP_gridID.csv

  # Inspect a file
  aoigen info ./out/AKSP_domain.lnd.TES_SE.4km.1d.c261018.nc

  # Generate completions
  aoigen completions bash > ~/.bash_completion.d/aoigen
")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode - suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format for structured data
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Configuration file path (JSON or YAML)
    #[arg(short, long, global = true, env = "AOIGEN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate the 1D AOI domain file
    #[command(long_about = "
Resolve the AOI points against a reference 1D domain and write the AOI domain.

Identifier points are matched exactly. Coordinate points outside the domain's
bounding box are reported and dropped; the rest snap to their nearest grid
cell. The output is named <AOI>_<reference stem>.c<yymmdd>.nc.

EXAMPLES:
  aoigen domain ./domain.lnd.TES_SE.4km.1d.nc ./out ./AKSP_info AKSP_gridID.csv
  aoigen domain ./domain.lnd.TES_SE.4km.1d.nc ./out ./AKSP_info AKSP_xcyc_lcc.csv
")]
    Domain {
        /// Reference 1D domain file
        reference: PathBuf,

        /// Output directory
        output_dir: PathBuf,

        /// Directory holding the AOI points file
        aoi_path: PathBuf,

        /// AOI points file name
        aoi_file: String,
    },

    /// Subset a surface-property file
    #[command(long_about = "
Subset one 1D surface-property file to the AOI, writing <AOI>_<file> into the
output directory.

EXAMPLES:
  aoigen surfdata ./surfdata.TES_SE.4km.1d.nc ./out ./AKSP_info AKSP_gridID.csv
")]
    Surfdata {
        /// Source surface-property file
        surfdata: PathBuf,

        /// Output directory
        output_dir: PathBuf,

        /// Directory holding the AOI points file
        aoi_path: PathBuf,

        /// AOI points file name
        aoi_file: String,
    },

    /// Subset every forcing file below a directory
    #[command(long_about = "
Walk the forcing tree and subset every .nc file to the AOI, mirroring the
directory layout under the output root as <AOI>_<file>.

Under a multi-rank launcher (SLURM, Open MPI, PMI) each rank takes its
round-robin share of the files. Otherwise aoigen starts a local pool of
worker processes sized by AOIGEN_WORKERS (or FORCING_SERIAL_WORKERS), 32 by
default, and merges their per-file outcomes.

EXAMPLES:
  aoigen forcing ./forcing ./out/forcing ./AKSP_info AKSP_gridID.csv
  srun -n 64 aoigen forcing ./forcing ./out/forcing ./out AKSP_domain.lnd.TES_SE.4km.1d.c261018.nc
")]
    Forcing {
        /// Root of the forcing tree
        input_root: PathBuf,

        /// Root of the output tree
        output_root: PathBuf,

        /// Directory holding the AOI points file
        aoi_path: PathBuf,

        /// AOI points file name
        aoi_file: String,
    },

    /// Show the schema of a NetCDF file
    #[command(long_about = "
Inspect a NetCDF file and display its dimensions, variables and attributes in
file order.

EXAMPLES:
  aoigen info data.nc
  aoigen info data.nc -n TBOT
  aoigen info data.nc --format json
")]
    Info {
        /// NetCDF file path
        file: PathBuf,

        /// Show only specific variable info
        #[arg(short = 'n', long)]
        variable: Option<String>,

        /// Output format for file information
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Randomly select gridIDs from a domain
    #[command(long_about = "
Randomly select a percentage of the gridIDs of a 1D domain and write them to a
gridID NetCDF file usable as an AOI points file.

Values of --percent below 1 are fractions, others are percents. Without --out
the file is named <case-name><percent>pct_gridID.nc in --output-dir.

EXAMPLES:
  aoigen sample --domain ./domain.nc --percent 5 --case-name TN --seed 42
  aoigen sample --domain ./domain.nc --percent 0.1 --case-name TN --like ./TNdemo_gridID.nc
")]
    Sample {
        /// Domain file with gridID(nj, ni)
        #[arg(long)]
        domain: PathBuf,

        /// Fraction (<1) or percent of cells to select
        #[arg(long, value_parser = parse_percent)]
        percent: f64,

        /// Prefix of the default output name
        #[arg(long)]
        case_name: String,

        /// Output file path
        #[arg(long)]
        out: Option<PathBuf>,

        /// Directory for the default output name
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// RNG seed for reproducible selections
        #[arg(long)]
        seed: Option<u64>,

        /// File whose gridID and global attributes are emulated
        #[arg(long)]
        like: Option<PathBuf>,

        /// Keep the random order instead of sorting
        #[arg(long)]
        no_sort: bool,
    },

    /// Generate shell completions
    #[command(long_about = "
Generate shell completion scripts for bash, zsh, fish, and PowerShell.

EXAMPLES:
  aoigen completions bash > ~/.bash_completion.d/aoigen
  aoigen completions zsh -o _aoigen
")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Domain { .. } => "domain",
            Commands::Surfdata { .. } => "surfdata",
            Commands::Forcing { .. } => "forcing",
            Commands::Info { .. } => "info",
            Commands::Sample { .. } => "sample",
            Commands::Completions { .. } => "completions",
        }
    }
}

#[derive(ValueEnum, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON structured output
    Json,
    /// YAML structured output
    Yaml,
    /// CSV output (where applicable)
    Csv,
}

/// Parse a non-negative fraction or percent
fn parse_percent(s: &str) -> Result<f64, String> {
    let value = s
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("Invalid percent value: {}", s))?;
    if !value.is_finite() || value < 0.0 {
        return Err("Percent must be a non-negative number".to_string());
    }
    Ok(value)
}
