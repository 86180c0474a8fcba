//! # Schema-Preserving Transcoding
//!
//! Copies a whole NetCDF container into a new file while replacing the site
//! dimension with a resolved AOI selection. Global attributes, dimensions,
//! variables and variable attributes are copied in source order; only the site
//! dimension length, the dropped attributes and the `title` differ.
//!
//! Per-variable data policy, first match wins:
//!
//! 1. attributes-only variables (projection metadata) get no data and keep
//!    their source datatype, even when it is `char` or a string;
//! 2. scalars and variables without the site axis are copied whole;
//! 3. rank 1-2 variables ending in the site axis are gathered in one read;
//! 4. rank 3 variables ending in the site axis go through [`ChunkedArrayCopier`];
//! 5. anything else, including a site axis in a leading position, is an
//!    [`AoiError::UnsupportedShape`].

use crate::chunk::{ChunkedArrayCopier, DEFAULT_CHUNK_SIZE, copy_direct, copy_full};
use crate::error::{AoiError, AoiResult};
use crate::grid::file_label;
use crate::resolve::Resolution;
use netcdf::NcTypeDescriptor;
use std::fs;
use std::path::Path;

/// Runs `$body` with `$t` bound to the Rust type matching a NetCDF numeric type.
macro_rules! with_numeric_type {
    ($vartype:expr, $variable:expr, |$t:ident| $body:expr) => {{
        use netcdf::types::{FloatType, IntType, NcVariableType};
        match $vartype {
            NcVariableType::Int(IntType::U8) => {
                type $t = u8;
                $body
            }
            NcVariableType::Int(IntType::I8) => {
                type $t = i8;
                $body
            }
            NcVariableType::Int(IntType::U16) => {
                type $t = u16;
                $body
            }
            NcVariableType::Int(IntType::I16) => {
                type $t = i16;
                $body
            }
            NcVariableType::Int(IntType::U32) => {
                type $t = u32;
                $body
            }
            NcVariableType::Int(IntType::I32) => {
                type $t = i32;
                $body
            }
            NcVariableType::Int(IntType::U64) => {
                type $t = u64;
                $body
            }
            NcVariableType::Int(IntType::I64) => {
                type $t = i64;
                $body
            }
            NcVariableType::Float(FloatType::F32) => {
                type $t = f32;
                $body
            }
            NcVariableType::Float(FloatType::F64) => {
                type $t = f64;
                $body
            }
            other => Err(AoiError::UnsupportedType {
                variable: $variable.to_string(),
                vartype: format!("{:?}", other),
            }),
        }
    }};
}

/// How a variable's data is carried into the subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPolicy {
    AttributesOnly,
    Full,
    Direct,
    Chunked,
}

/// Knobs of a single transcode.
#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    /// Value of the destination `title` attribute
    pub title: String,
    /// Leading-axis window for rank-3 variables
    pub chunk_size: usize,
    /// Variables created with attributes but no data
    pub attributes_only_variables: Vec<String>,
    /// Variable attributes never copied
    pub dropped_attributes: Vec<String>,
    /// Variables left out of the destination entirely
    pub skipped_variables: Vec<String>,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            attributes_only_variables: vec!["lambert_conformal_conic".to_string()],
            dropped_attributes: vec!["_FillValue".to_string()],
            skipped_variables: Vec::new(),
        }
    }
}

/// What a transcode wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscodeReport {
    pub variables: usize,
    pub subset_variables: usize,
    pub chunked_variables: usize,
    pub chunks: usize,
    pub sites: usize,
}

/// Picks the data policy for a variable named `name` over `dimensions`.
pub fn copy_policy(
    name: &str,
    dimensions: &[String],
    site_dimension: &str,
    options: &TranscodeOptions,
) -> AoiResult<CopyPolicy> {
    if options.attributes_only_variables.iter().any(|v| v == name) {
        return Ok(CopyPolicy::AttributesOnly);
    }
    let unsupported = || AoiError::UnsupportedShape {
        variable: name.to_string(),
        dimensions: dimensions.to_vec(),
    };
    match dimensions.last() {
        None => Ok(CopyPolicy::Full),
        // a site axis anywhere but last cannot be copied whole into the smaller destination
        Some(_) if dimensions[..dimensions.len() - 1].iter().any(|d| d == site_dimension) => {
            Err(unsupported())
        }
        Some(last) if last != site_dimension => Ok(CopyPolicy::Full),
        Some(_) => match dimensions.len() {
            1 | 2 => Ok(CopyPolicy::Direct),
            3 => Ok(CopyPolicy::Chunked),
            _ => Err(unsupported()),
        },
    }
}

/// First of `candidates` present as a dimension of `file`.
pub fn find_site_dimension(file: &netcdf::File, candidates: &[String]) -> AoiResult<String> {
    candidates
        .iter()
        .find(|name| file.dimension(name).is_some())
        .cloned()
        .ok_or_else(|| {
            AoiError::schema(
                file_label(file),
                format!("no site dimension among [{}]", candidates.join(", ")),
            )
        })
}

/// Writes the AOI subset of `source` to `destination`, replacing any file
/// already there.
///
/// The caller owns cleanup: a failed transcode may leave a partial file at
/// `destination`.
pub fn transcode(
    source: &netcdf::File,
    destination: &Path,
    site_dimension: &str,
    resolution: &Resolution,
    options: &TranscodeOptions,
) -> AoiResult<TranscodeReport> {
    let label = file_label(source);
    let site = source.dimension(site_dimension).ok_or_else(|| {
        AoiError::schema(&label, format!("missing site dimension '{}'", site_dimension))
    })?;
    if site.len() != resolution.grid_len() {
        return Err(AoiError::schema(
            &label,
            format!(
                "site dimension '{}' has {} cells but the AOI was resolved over {}",
                site_dimension,
                site.len(),
                resolution.grid_len()
            ),
        ));
    }
    if resolution.is_empty() {
        return Err(AoiError::EmptySelection(label));
    }

    if destination.exists() {
        fs::remove_file(destination)?;
    }
    let mut dst = netcdf::create(destination)?;

    for attr in source.attributes() {
        dst.add_attribute(attr.name(), attr.value()?)?;
    }

    for dim in source.dimensions() {
        let name = dim.name();
        if dim.is_unlimited() {
            dst.add_unlimited_dimension(&name)?;
        } else if name == site_dimension {
            dst.add_dimension(&name, resolution.len())?;
        } else {
            dst.add_dimension(&name, dim.len())?;
        }
    }

    let copier = ChunkedArrayCopier::new(options.chunk_size);
    let mut report = TranscodeReport {
        sites: resolution.len(),
        ..Default::default()
    };

    for var in source.variables() {
        let name = var.name();
        if options.skipped_variables.contains(&name) {
            log::debug!("Skipping variable {}", name);
            continue;
        }
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let policy = copy_policy(&name, &dims, site_dimension, options)?;
        log::debug!("{} ({}) -> {:?}", name, dims.join(", "), policy);

        // metadata-only variables keep their source datatype, numeric or not
        let chunks = if policy == CopyPolicy::AttributesOnly {
            copy_metadata_variable(&var, &mut dst, &dims, &options.dropped_attributes)?;
            0
        } else {
            with_numeric_type!(var.vartype(), name, |T| copy_variable::<T>(
                &var,
                &mut dst,
                &dims,
                policy,
                resolution.indices(),
                &copier,
                &options.dropped_attributes,
            ))?
        };

        report.variables += 1;
        match policy {
            CopyPolicy::Direct => report.subset_variables += 1,
            CopyPolicy::Chunked => {
                report.subset_variables += 1;
                report.chunked_variables += 1;
                report.chunks += chunks;
            }
            _ => {}
        }
    }

    dst.add_attribute("title", options.title.as_str())?;
    Ok(report)
}

/// Creates one destination variable, copies its data per `policy`, then its
/// attributes. Returns the number of chunk windows used.
fn copy_variable<T: NcTypeDescriptor + Copy>(
    source: &netcdf::Variable,
    dst: &mut netcdf::FileMut,
    dims: &[String],
    policy: CopyPolicy,
    indices: &[usize],
    copier: &ChunkedArrayCopier,
    dropped_attributes: &[String],
) -> AoiResult<usize> {
    let dim_refs: Vec<&str> = dims.iter().map(String::as_str).collect();
    let mut target = dst.add_variable::<T>(&source.name(), &dim_refs)?;

    let chunks = match policy {
        CopyPolicy::AttributesOnly => 0,
        CopyPolicy::Full => {
            copy_full::<T>(source, &mut target)?;
            0
        }
        CopyPolicy::Direct => {
            copy_direct::<T>(source, &mut target, indices)?;
            0
        }
        CopyPolicy::Chunked => copier.copy_subset::<T>(source, &mut target, indices)?,
    };

    copy_attributes(source, &mut target, dropped_attributes)?;
    Ok(chunks)
}

/// Creates a data-less destination variable with the source datatype.
fn copy_metadata_variable(
    source: &netcdf::Variable,
    dst: &mut netcdf::FileMut,
    dims: &[String],
    dropped_attributes: &[String],
) -> AoiResult<()> {
    let dim_refs: Vec<&str> = dims.iter().map(String::as_str).collect();
    let mut target = dst.add_variable_with_type(&source.name(), &dim_refs, &source.vartype())?;
    copy_attributes(source, &mut target, dropped_attributes)
}

fn copy_attributes(
    source: &netcdf::Variable,
    target: &mut netcdf::VariableMut<'_>,
    dropped_attributes: &[String],
) -> AoiResult<()> {
    for attr in source.attributes() {
        if dropped_attributes.iter().any(|d| d == attr.name()) {
            continue;
        }
        target.put_attribute(attr.name(), attr.value()?)?;
    }
    Ok(())
}
