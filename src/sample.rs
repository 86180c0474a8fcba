//! # Random gridID Sampling
//!
//! Draws a random subset of the grid cells of a 1D domain and writes their
//! identifiers to a small `gridID` NetCDF file that can be fed back in as an
//! identifier AOI.

use crate::error::{AoiError, AoiResult};
use crate::grid::file_label;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::{Path, PathBuf};

/// Parameters of one sampling run.
#[derive(Debug, Clone)]
pub struct SampleRequest {
    /// Domain file holding `gridID(nj, ni)` with `nj = 1`
    pub domain: PathBuf,
    /// Fraction when below 1, percent otherwise
    pub percent: f64,
    /// Prefix of the default output name
    pub case_name: String,
    /// Explicit output path
    pub out: Option<PathBuf>,
    /// Directory of the default output name
    pub output_dir: PathBuf,
    pub seed: Option<u64>,
    /// File whose `gridID` and global attributes are emulated
    pub like: Option<PathBuf>,
    pub sort: bool,
    pub identifier_variable: String,
}

#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub path: PathBuf,
    pub selected: Vec<i32>,
    pub total: usize,
}

/// Number of cells to draw from `total` for `percent`.
pub fn sample_size(total: usize, percent: f64) -> AoiResult<usize> {
    if percent < 0.0 || percent.is_nan() {
        return Err(AoiError::Input("percent must be non-negative".to_string()));
    }
    let fraction = if percent < 1.0 { percent } else { percent / 100.0 };
    if fraction <= 0.0 {
        return Ok(1);
    }
    let k = (total as f64 * fraction).round() as usize;
    Ok(k.clamp(1, total.max(1)))
}

/// `<case><round(pct)>pct_gridID.nc`
pub fn default_output_name(case_name: &str, percent: f64) -> String {
    let pct = if percent >= 1.0 { percent } else { percent * 100.0 };
    format!("{}{}pct_gridID.nc", case_name, pct.round() as i64)
}

/// Positions of `k` distinct cells out of `total`.
pub fn select_positions(total: usize, k: usize, seed: Option<u64>) -> Vec<usize> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    rand::seq::index::sample(&mut rng, total, k.min(total)).into_vec()
}

fn read_domain_ids(domain: &Path, identifier: &str) -> AoiResult<(Vec<i64>, Vec<(String, netcdf::AttributeValue)>)> {
    let file = netcdf::open(domain)?;
    let var = file.variable(identifier).ok_or_else(|| {
        AoiError::schema(file_label(&file), format!("missing variable '{}'", identifier))
    })?;
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
    match shape.as_slice() {
        [1, _] => {}
        [nj, _] => {
            return Err(AoiError::schema(
                file_label(&file),
                format!("expected first dimension nj=1 for '{}', got {}", identifier, nj),
            ));
        }
        _ => {
            return Err(AoiError::schema(
                file_label(&file),
                format!("expected '{}' to be 2D (nj, ni), got shape {:?}", identifier, shape),
            ));
        }
    }
    let ids = var.get_values::<i64, _>(..)?;
    Ok((ids, attributes_of(var.attributes())))
}

fn attributes_of<'a>(
    attributes: impl Iterator<Item = netcdf::Attribute<'a>>,
) -> Vec<(String, netcdf::AttributeValue)> {
    attributes
        .filter_map(|attr| match attr.value() {
            Ok(value) => Some((attr.name().to_string(), value)),
            Err(e) => {
                log::warn!("Skipping unreadable attribute {}: {}", attr.name(), e);
                None
            }
        })
        .collect()
}

type LikeAttributes = (
    Option<Vec<(String, netcdf::AttributeValue)>>,
    Vec<(String, netcdf::AttributeValue)>,
);

fn read_like(like: Option<&Path>, identifier: &str) -> AoiResult<LikeAttributes> {
    let Some(path) = like.filter(|p| p.exists()) else {
        return Ok((None, Vec::new()));
    };
    let file = netcdf::open(path)?;
    let var_attrs = file
        .variable(identifier)
        .map(|var| attributes_of(var.attributes()));
    Ok((var_attrs, attributes_of(file.attributes())))
}

/// Draws the sample and writes it.
pub fn sample_grid_ids(request: &SampleRequest) -> AoiResult<SampleOutcome> {
    let (ids, domain_attrs) = read_domain_ids(&request.domain, &request.identifier_variable)?;
    let total = ids.len();
    let k = sample_size(total, request.percent)?;
    if total == 0 {
        return Err(AoiError::EmptySelection(request.domain.display().to_string()));
    }

    let mut selected = select_positions(total, k, request.seed)
        .into_iter()
        .map(|pos| {
            i32::try_from(ids[pos])
                .map_err(|_| AoiError::Input(format!("gridID {} does not fit in 32 bits", ids[pos])))
        })
        .collect::<AoiResult<Vec<i32>>>()?;
    if request.sort {
        selected.sort_unstable();
    }

    let (like_var_attrs, like_global_attrs) = read_like(request.like.as_deref(), &request.identifier_variable)?;
    let var_attrs = match like_var_attrs {
        Some(attrs) if !attrs.is_empty() => attrs,
        _ => domain_attrs,
    };

    let path = request.out.clone().unwrap_or_else(|| {
        request
            .output_dir
            .join(default_output_name(&request.case_name, request.percent))
    });
    let domain_name = request
        .domain
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let annotation = format!(
        "Random selection of {}/{} gridIDs ({:.3}%) from {}",
        k,
        total,
        k as f64 / total as f64 * 100.0,
        domain_name
    );

    write_sample(&path, &selected, &request.identifier_variable, &var_attrs, &like_global_attrs, &annotation)?;
    log::info!("{} -> {}", annotation, path.display());

    Ok(SampleOutcome {
        path,
        selected,
        total,
    })
}

fn write_sample(
    path: &Path,
    selected: &[i32],
    identifier: &str,
    var_attrs: &[(String, netcdf::AttributeValue)],
    global_attrs: &[(String, netcdf::AttributeValue)],
    annotation: &str,
) -> AoiResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        fs::remove_file(path)?;
    }

    let mut file = netcdf::create(path)?;
    file.add_dimension("nj", 1)?;
    file.add_dimension("ni", selected.len())?;
    {
        let mut var = file.add_variable::<i32>(identifier, &["nj", "ni"])?;
        for (name, value) in var_attrs {
            if let Err(e) = var.put_attribute(name, value.clone()) {
                log::warn!("Skipping attribute {} on {}: {}", name, identifier, e);
            }
        }
        var.put_values(selected, (0..1, 0..selected.len()))?;
    }

    let mut previous_title = None;
    for (name, value) in global_attrs {
        if name == "title" {
            previous_title = match value {
                netcdf::AttributeValue::Str(s) if !s.is_empty() => Some(s.clone()),
                _ => None,
            };
        }
        if let Err(e) = file.add_attribute(name, value.clone()) {
            log::warn!("Skipping global attribute {}: {}", name, e);
        }
    }
    let title = match previous_title {
        Some(prev) => format!("{} | {}", prev, annotation),
        None => annotation.to_string(),
    };
    file.add_attribute("title", title.as_str())?;
    Ok(())
}
