//! # Chunked Array Copier
//!
//! Subsets variables whose trailing axis is the site axis. Rank-3 variables
//! (typically `time × 1 × site`) are streamed along their leading axis in fixed
//! windows so peak memory stays at `window × middle × sites` values instead of
//! the whole source array. Values are copied bit-for-bit; no fill or
//! interpolation is applied.

use crate::error::{AoiError, AoiResult};
use netcdf::NcTypeDescriptor;
use std::ops::Range;

/// Default leading-axis window, in records.
pub const DEFAULT_CHUNK_SIZE: usize = 16;

/// Gathers `indices` out of every `row_len`-long row of `block`.
///
/// `block` is a row-major array whose last axis has length `row_len`; the
/// output keeps the row order and has `indices.len()` values per row.
pub fn gather_sites<T: Copy>(block: &[T], row_len: usize, indices: &[usize]) -> Vec<T> {
    if row_len == 0 {
        return Vec::new();
    }
    let rows = block.len() / row_len;
    let mut out = Vec::with_capacity(rows * indices.len());
    for row in block.chunks_exact(row_len) {
        out.extend(indices.iter().map(|&idx| row[idx]));
    }
    out
}

/// Reads the hyperslab `ranges` (one per dimension) as a flat row-major vector.
pub(crate) fn read_block<T: NcTypeDescriptor + Copy>(
    var: &netcdf::Variable,
    ranges: &[Range<usize>],
) -> AoiResult<Vec<T>> {
    let values = match ranges {
        [] => var.get_values::<T, _>(..)?,
        [a] => var.get_values::<T, _>((a.clone(),))?,
        [a, b] => var.get_values::<T, _>((a.clone(), b.clone()))?,
        [a, b, c] => var.get_values::<T, _>((a.clone(), b.clone(), c.clone()))?,
        [a, b, c, d] => var.get_values::<T, _>((a.clone(), b.clone(), c.clone(), d.clone()))?,
        _ => var.get_values::<T, _>(..)?,
    };
    Ok(values)
}

/// Writes `values` into the hyperslab `ranges` of `var`.
///
/// Explicit ranges grow unlimited dimensions to fit; ranks above four fall back
/// to the variable's current extent.
pub(crate) fn write_block<T: NcTypeDescriptor + Copy>(
    var: &mut netcdf::VariableMut,
    values: &[T],
    ranges: &[Range<usize>],
) -> AoiResult<()> {
    match ranges {
        [] => var.put_values(values, ..)?,
        [a] => var.put_values(values, (a.clone(),))?,
        [a, b] => var.put_values(values, (a.clone(), b.clone()))?,
        [a, b, c] => var.put_values(values, (a.clone(), b.clone(), c.clone()))?,
        [a, b, c, d] => var.put_values(values, (a.clone(), b.clone(), c.clone(), d.clone()))?,
        _ => var.put_values(values, ..)?,
    }
    Ok(())
}

/// Full extent of a variable as one range per dimension.
pub(crate) fn full_ranges(var: &netcdf::Variable) -> Vec<Range<usize>> {
    var.dimensions().iter().map(|dim| 0..dim.len()).collect()
}

/// Copies a variable unchanged, including variables on unlimited dimensions.
pub fn copy_full<T: NcTypeDescriptor + Copy>(
    source: &netcdf::Variable,
    destination: &mut netcdf::VariableMut,
) -> AoiResult<()> {
    let ranges = full_ranges(source);
    if ranges.iter().any(|r| r.is_empty()) {
        return Ok(());
    }
    let values = read_block::<T>(source, &ranges)?;
    write_block(destination, &values, &ranges)
}

/// Copies `source[..., indices]` in one read for rank-1 and rank-2 variables.
pub fn copy_direct<T: NcTypeDescriptor + Copy>(
    source: &netcdf::Variable,
    destination: &mut netcdf::VariableMut,
    indices: &[usize],
) -> AoiResult<()> {
    let mut ranges = full_ranges(source);
    let Some(site_len) = ranges.last().map(|r| r.end) else {
        return Err(unsupported(source));
    };
    if ranges.iter().any(|r| r.is_empty()) {
        return Ok(());
    }
    let block = read_block::<T>(source, &ranges)?;
    let subset = gather_sites(&block, site_len, indices);
    if let Some(last) = ranges.last_mut() {
        *last = 0..indices.len();
    }
    write_block(destination, &subset, &ranges)
}

/// Streams a rank-3 `lead × middle × site` variable window by window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkedArrayCopier {
    window: usize,
}

impl Default for ChunkedArrayCopier {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ChunkedArrayCopier {
    /// A window of zero is treated as one record.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Leading-axis windows covering `0..lead_len`.
    pub fn windows(&self, lead_len: usize) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..lead_len)
            .step_by(self.window)
            .map(move |start| start..(start + self.window).min(lead_len))
    }

    /// Copies the selected sites of `source` into `destination`, returning the
    /// number of windows processed.
    pub fn copy_subset<T: NcTypeDescriptor + Copy>(
        &self,
        source: &netcdf::Variable,
        destination: &mut netcdf::VariableMut,
        indices: &[usize],
    ) -> AoiResult<usize> {
        let dims = source.dimensions();
        let [lead, middle, site] = dims else {
            return Err(unsupported(source));
        };
        let (lead_len, middle_len, site_len) = (lead.len(), middle.len(), site.len());
        if middle_len == 0 || site_len == 0 {
            return Ok(0);
        }

        let mut processed = 0;
        for window in self.windows(lead_len) {
            let block = read_block::<T>(source, &[window.clone(), 0..middle_len, 0..site_len])?;
            let subset = gather_sites(&block, site_len, indices);
            write_block(
                destination,
                &subset,
                &[window.clone(), 0..middle_len, 0..indices.len()],
            )?;
            log::debug!(
                "{}: copied records {}..{} of {}",
                source.name(),
                window.start,
                window.end,
                lead_len
            );
            processed += 1;
        }
        Ok(processed)
    }
}

fn unsupported(var: &netcdf::Variable) -> AoiError {
    AoiError::UnsupportedShape {
        variable: var.name(),
        dimensions: var.dimensions().iter().map(|d| d.name()).collect(),
    }
}
