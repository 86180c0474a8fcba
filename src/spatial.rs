//! # Spatial Index
//!
//! Nearest-neighbor lookup over the reference grid's cell centers, backed by an
//! R*-tree. The index is built once per coordinate system and answers batched
//! queries with the position of the single closest reference point under
//! Euclidean distance in that coordinate space.

use crate::error::{AoiError, AoiResult};
use rstar::RTree;
use rstar::primitives::GeomWithData;

/// A reference point tagged with its position in the source grid.
type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Exact nearest-neighbor index over a fixed set of 2-D points.
///
/// Callers must build the index in the same coordinate space as the points they
/// query with (geographic lon/lat or projected x/y).
///
/// # Examples
///
/// ```rust
/// use aoigen::spatial::SpatialIndex;
///
/// let index = SpatialIndex::build(&[[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]])?;
/// assert_eq!(index.query(&[[9.0, 1.0], [1.0, 8.0]]), vec![1, 2]);
/// # Ok::<(), aoigen::error::AoiError>(())
/// ```
pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
    len: usize,
}

impl SpatialIndex {
    /// Bulk-loads the index from `points`, remembering each point's position.
    ///
    /// Fails with [`AoiError::EmptyIndex`] when `points` is empty.
    pub fn build(points: &[[f64; 2]]) -> AoiResult<Self> {
        if points.is_empty() {
            return Err(AoiError::EmptyIndex);
        }
        let indexed: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .map(|(idx, point)| GeomWithData::new(*point, idx))
            .collect();

        Ok(SpatialIndex {
            tree: RTree::bulk_load(indexed),
            len: points.len(),
        })
    }

    /// Position of the reference point closest to `target`.
    pub fn nearest(&self, target: [f64; 2]) -> Option<usize> {
        self.tree.nearest_neighbor(&target).map(|point| point.data)
    }

    /// Batched nearest-neighbor query (k = 1), one result per target in input order.
    pub fn query(&self, targets: &[[f64; 2]]) -> Vec<usize> {
        targets
            .iter()
            .filter_map(|target| self.nearest(*target))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
