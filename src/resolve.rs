//! # AOI Resolution
//!
//! Maps AOI points onto positions in the reference grid. Identifier points are
//! matched by exact set membership; coordinate points are first split into
//! in-extent and out-of-extent partitions, and the in-extent ones are snapped to
//! their nearest reference cell through a [`SpatialIndex`].
//!
//! Whatever the mode, the resulting indices are sorted ascending and unique so
//! every subsetted file shares the same site ordering.

use crate::error::{AoiError, AoiResult};
use crate::grid::{CoordinateSystem, Extent, ReferenceGrid};
use crate::input::AoiInput;
use crate::spatial::SpatialIndex;
use std::collections::HashSet;

/// One AOI point in a single representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridPoint {
    Identifier(i64),
    Coordinate([f64; 2]),
}

impl std::fmt::Display for GridPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridPoint::Identifier(id) => write!(f, "gridID {}", id),
            GridPoint::Coordinate([x, y]) => write!(f, "({},{})", x, y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    OutOfDomain,
    IdentifierNotFound,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::OutOfDomain => write!(f, "out of domain"),
            RejectReason::IdentifierNotFound => write!(f, "identifier not found"),
        }
    }
}

/// An AOI point that did not contribute to the selection.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedPoint {
    /// Position of the point in the AOI file
    pub position: usize,
    pub point: GridPoint,
    pub reason: RejectReason,
}

/// Resolved AOI selection over a reference grid of `mask.len()` cells.
///
/// `indices` is strictly increasing and `indices.len()` equals the number of
/// `true` entries in `mask`.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    indices: Vec<usize>,
    mask: Vec<bool>,
    rejected: Vec<RejectedPoint>,
}

impl Resolution {
    /// Builds a resolution from raw matches in any order, with duplicates.
    pub fn from_matches(
        mut matches: Vec<usize>,
        grid_len: usize,
        rejected: Vec<RejectedPoint>,
    ) -> AoiResult<Self> {
        matches.sort_unstable();
        matches.dedup();
        if let Some(&last) = matches.last()
            && last >= grid_len
        {
            return Err(AoiError::Input(format!(
                "grid position {} is outside a reference grid of {} cells",
                last, grid_len
            )));
        }

        let mut mask = vec![false; grid_len];
        for &idx in &matches {
            mask[idx] = true;
        }
        Ok(Resolution {
            indices: matches,
            mask,
            rejected,
        })
    }

    /// Selects every cell of a grid with `grid_len` cells.
    pub fn identity(grid_len: usize) -> Self {
        Resolution {
            indices: (0..grid_len).collect(),
            mask: vec![true; grid_len],
            rejected: Vec::new(),
        }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn rejected(&self) -> &[RejectedPoint] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Length of the reference grid this selection applies to.
    pub fn grid_len(&self) -> usize {
        self.mask.len()
    }
}

/// Resolves `input` against `grid`.
///
/// # Errors
///
/// - [`AoiError::Input`] when the grid lacks the coordinates the input needs.
/// - [`AoiError::EmptyIndex`] when the grid has no usable coordinates.
pub fn resolve(input: &AoiInput, grid: &ReferenceGrid) -> AoiResult<Resolution> {
    let resolution = match input {
        AoiInput::Identifier(ids) => resolve_identifiers(ids, grid.identifiers())?,
        AoiInput::Geographic(points) => {
            resolve_coordinates(points, grid, CoordinateSystem::Geographic)?
        }
        AoiInput::Projected(points) => {
            resolve_coordinates(points, grid, CoordinateSystem::Projected)?
        }
    };
    log::info!(
        "Resolved {} AOI points to {} grid cells ({} rejected)",
        input.len(),
        resolution.len(),
        resolution.rejected().len()
    );
    Ok(resolution)
}

/// Exact set-membership match of AOI identifiers against the reference identifiers.
pub fn resolve_identifiers(aoi_ids: &[i64], reference: &[i64]) -> AoiResult<Resolution> {
    let wanted: HashSet<i64> = aoi_ids.iter().copied().collect();
    let matches: Vec<usize> = reference
        .iter()
        .enumerate()
        .filter(|(_, id)| wanted.contains(id))
        .map(|(idx, _)| idx)
        .collect();

    let present: HashSet<i64> = reference.iter().copied().collect();
    let rejected: Vec<RejectedPoint> = aoi_ids
        .iter()
        .enumerate()
        .filter(|(_, id)| !present.contains(id))
        .map(|(position, &id)| RejectedPoint {
            position,
            point: GridPoint::Identifier(id),
            reason: RejectReason::IdentifierNotFound,
        })
        .collect();
    if !rejected.is_empty() {
        log::warn!(
            "{} AOI identifiers are not present in the reference grid",
            rejected.len()
        );
        for r in &rejected {
            log::debug!("point {} {} is {}", r.position, r.point, r.reason);
        }
    }

    Resolution::from_matches(matches, reference.len(), rejected)
}

/// Splits points into those inside `extent` and those outside it.
///
/// Kept points carry their original position so rejections can name them.
pub fn partition_by_extent(
    points: &[[f64; 2]],
    extent: &Extent,
) -> (Vec<(usize, [f64; 2])>, Vec<RejectedPoint>) {
    let (kept, outside): (Vec<_>, Vec<_>) = points
        .iter()
        .copied()
        .enumerate()
        .partition(|(_, point)| extent.contains(*point));

    let rejected = outside
        .into_iter()
        .map(|(position, point)| RejectedPoint {
            position,
            point: GridPoint::Coordinate(point),
            reason: RejectReason::OutOfDomain,
        })
        .collect();
    (kept, rejected)
}

fn resolve_coordinates(
    points: &[[f64; 2]],
    grid: &ReferenceGrid,
    system: CoordinateSystem,
) -> AoiResult<Resolution> {
    let coordinates = grid.coordinates(system).ok_or_else(|| {
        AoiError::Input(format!(
            "reference grid carries no {} coordinates",
            system
        ))
    })?;

    let (kept, rejected) = partition_by_extent(points, coordinates.extent());
    for r in &rejected {
        log::warn!("point {} {} is {} and is removed", r.position, r.point, r.reason);
    }

    let index = SpatialIndex::build(coordinates.points())?;
    let targets: Vec<[f64; 2]> = kept.iter().map(|(_, point)| *point).collect();
    let matches = index.query(&targets);
    log::debug!(
        "Matched {} {} points by nearest neighbor",
        matches.len(),
        system
    );

    Resolution::from_matches(matches, grid.len(), rejected)
}
