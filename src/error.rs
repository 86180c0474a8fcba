//! # Error Types
//!
//! A single error enum covers every failure the subsetting pipeline can raise.
//! The variants follow the way failures propagate through a run:
//!
//! - **Input errors** (`Input`, `AoiFileNotFound`, `EmptySelection`) abort the
//!   whole run before any container is written, since every task depends on
//!   one shared AOI resolution.
//! - **Schema and shape errors** (`Schema`, `UnsupportedShape`,
//!   `UnsupportedType`) abort a single file's transcode.
//! - **I/O errors** (`Io`, `Netcdf`) are local to the file being processed.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving or subsetting an area of interest
#[derive(Error, Debug)]
pub enum AoiError {
    #[error("Invalid AOI input: {0}")]
    Input(String),

    #[error("AOI points file not found: {}", .0.display())]
    AoiFileNotFound(PathBuf),

    #[error("AOI resolved to zero grid cells in {0}")]
    EmptySelection(String),

    #[error("Cannot build a spatial index over an empty point set")]
    EmptyIndex,

    #[error("Schema error in {path}: {message}")]
    Schema { path: String, message: String },

    #[error("Unsupported shape for variable '{variable}' with dimensions ({}): only rank 1-3 variables may end with the site dimension", .dimensions.join(", "))]
    UnsupportedShape {
        variable: String,
        dimensions: Vec<String>,
    },

    #[error("Unsupported datatype for variable '{variable}': {vartype}")]
    UnsupportedType { variable: String, vartype: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),
}

/// Result type for AOI operations
pub type AoiResult<T> = Result<T, AoiError>;

impl AoiError {
    pub fn schema<P: ToString, M: ToString>(path: P, message: M) -> Self {
        AoiError::Schema {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_message() {
        let err = AoiError::schema("domain.nc", "missing variable 'gridID'");
        assert_eq!(
            err.to_string(),
            "Schema error in domain.nc: missing variable 'gridID'"
        );
    }

    #[test]
    fn test_unsupported_shape_lists_dimensions() {
        let err = AoiError::UnsupportedShape {
            variable: "PCT_PFT".to_string(),
            dimensions: vec!["time".into(), "lev".into(), "pft".into(), "gridcell".into()],
        };
        assert!(err.to_string().contains("time, lev, pft, gridcell"));
    }

    #[test]
    fn test_missing_aoi_file_names_path() {
        let err = AoiError::AoiFileNotFound(PathBuf::from("/tmp/AKSP_gridID.csv"));
        assert!(err.to_string().contains("AKSP_gridID.csv"));
    }
}
