//! # Run Configuration Module
//!
//! This module holds the tunables shared by every producer: worker count, chunk
//! window, NetCDF naming conventions and the copy policy lists. A configuration
//! file is optional; every field has a default matching the TES 1D datasets.
//!
//! ## Sources and Priority
//!
//! 1. Built-in defaults
//! 2. A JSON or YAML file (`--config` / `AOIGEN_CONFIG`), chosen by extension
//! 3. Environment overrides: `AOIGEN_WORKERS` (or `FORCING_SERIAL_WORKERS`),
//!    `AOIGEN_CHUNK_SIZE` and `AOIGEN_STRICT`
//!
//! ## Example Usage
//!
//! ```rust
//! use aoigen::config::RunConfig;
//!
//! let config = RunConfig::from_yaml("workers: 8\nchunk_size: 4\n")?;
//! assert_eq!(config.workers, 8);
//! assert_eq!(config.identifier_variable, "gridID");
//! # Ok::<(), aoigen::error::AoiError>(())
//! ```

use crate::error::{AoiError, AoiResult};
use crate::grid::GridVariables;
use crate::transcode::TranscodeOptions;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Tunables for a subsetting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Local pool size; 1 runs tasks sequentially
    pub workers: usize,
    /// Leading-axis window for rank-3 variables
    pub chunk_size: usize,
    /// Candidate site dimension names, first match wins
    pub site_dimensions: Vec<String>,
    /// Grid cell identifier variable
    pub identifier_variable: String,
    /// Geographic coordinate variables
    pub lon_variable: String,
    pub lat_variable: String,
    /// Projected coordinate variables
    pub x_variable: String,
    pub y_variable: String,
    /// Suffix of forcing files picked up by discovery
    pub file_suffix: String,
    /// Variables created with attributes but no data
    pub attributes_only_variables: Vec<String>,
    /// Variable attributes never copied
    pub dropped_attributes: Vec<String>,
    /// Variables left out of generated domain files
    pub domain_dropped_variables: Vec<String>,
    /// Exit non-zero when any per-file task fails
    pub strict: bool,
    /// Show a progress bar in local pool mode
    pub progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 32,
            chunk_size: crate::chunk::DEFAULT_CHUNK_SIZE,
            site_dimensions: vec!["ni".to_string(), "gridcell".to_string()],
            identifier_variable: "gridID".to_string(),
            lon_variable: "xc".to_string(),
            lat_variable: "yc".to_string(),
            x_variable: "xc_LCC".to_string(),
            y_variable: "yc_LCC".to_string(),
            file_suffix: ".nc".to_string(),
            attributes_only_variables: vec!["lambert_conformal_conic".to_string()],
            dropped_attributes: vec!["_FillValue".to_string()],
            domain_dropped_variables: vec!["lon".to_string(), "lat".to_string()],
            strict: false,
            progress: true,
        }
    }
}

impl RunConfig {
    /// Loads a configuration file, JSON or YAML by extension.
    ///
    /// # Errors
    ///
    /// Returns [`AoiError::Config`] for unknown extensions or malformed
    /// content, and [`AoiError::Io`] when the file cannot be read.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AoiResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("json") => Self::from_json(&content),
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Err(AoiError::Config(format!(
                "unsupported configuration format: {} (expected .json, .yaml or .yml)",
                path.display()
            ))),
        }
    }

    pub fn from_json(json_str: &str) -> AoiResult<Self> {
        let config: RunConfig = serde_json::from_str(json_str)
            .map_err(|e| AoiError::Config(format!("invalid JSON configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml_str: &str) -> AoiResult<Self> {
        let config: RunConfig = serde_yaml::from_str(yaml_str)
            .map_err(|e| AoiError::Config(format!("invalid YAML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) -> AoiResult<()> {
        self.apply_env_with(|key| env::var(key).ok())
    }

    /// Applies overrides read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> AoiResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workers = lookup("AOIGEN_WORKERS").or_else(|| lookup("FORCING_SERIAL_WORKERS"));
        if let Some(value) = workers {
            self.workers = parse_count("AOIGEN_WORKERS", &value)?;
        }
        if let Some(value) = lookup("AOIGEN_CHUNK_SIZE") {
            self.chunk_size = parse_count("AOIGEN_CHUNK_SIZE", &value)?;
        }
        if let Some(value) = lookup("AOIGEN_STRICT") {
            self.strict = parse_flag("AOIGEN_STRICT", &value)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> AoiResult<()> {
        if self.workers == 0 {
            return Err(AoiError::Config("workers must be at least 1".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(AoiError::Config("chunk_size must be at least 1".to_string()));
        }
        if self.site_dimensions.is_empty() {
            return Err(AoiError::Config(
                "site_dimensions must name at least one dimension".to_string(),
            ));
        }
        if self.file_suffix.is_empty() {
            return Err(AoiError::Config("file_suffix must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn grid_variables(&self) -> GridVariables {
        GridVariables {
            identifier: self.identifier_variable.clone(),
            lon: self.lon_variable.clone(),
            lat: self.lat_variable.clone(),
            x: self.x_variable.clone(),
            y: self.y_variable.clone(),
        }
    }

    /// Transcode options carrying this configuration's copy policy.
    pub fn transcode_options(&self, title: String) -> TranscodeOptions {
        TranscodeOptions {
            title,
            chunk_size: self.chunk_size,
            attributes_only_variables: self.attributes_only_variables.clone(),
            dropped_attributes: self.dropped_attributes.clone(),
            skipped_variables: Vec::new(),
        }
    }
}

fn parse_count(key: &str, value: &str) -> AoiResult<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| AoiError::Config(format!("{} must be a positive integer, got '{}'", key, value)))
}

fn parse_flag(key: &str, value: &str) -> AoiResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(AoiError::Config(format!("{} must be a boolean, got '{}'", key, value))),
    }
}
