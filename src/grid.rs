//! # Reference Grid
//!
//! The reference grid is the full 1D land domain an AOI is cut from: an ordered
//! list of grid cells, each carrying an identifier and, when the source provides
//! them, a geographic (lon/lat) and a projected (Lambert conformal conic)
//! coordinate pair. It is loaded once and shared read-only by every task.

use crate::error::{AoiError, AoiResult};

/// Names of the variables a reference grid is read from.
#[derive(Debug, Clone, PartialEq)]
pub struct GridVariables {
    /// Grid cell identifier variable
    pub identifier: String,
    /// Geographic longitude of the cell center
    pub lon: String,
    /// Geographic latitude of the cell center
    pub lat: String,
    /// Projected x of the cell center
    pub x: String,
    /// Projected y of the cell center
    pub y: String,
}

impl Default for GridVariables {
    fn default() -> Self {
        Self {
            identifier: "gridID".to_string(),
            lon: "xc".to_string(),
            lat: "yc".to_string(),
            x: "xc_LCC".to_string(),
            y: "yc_LCC".to_string(),
        }
    }
}

/// Coordinate systems an AOI point may be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSystem {
    /// Longitude / latitude in degrees
    Geographic,
    /// Planar map projection coordinates
    Projected,
}

impl std::fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinateSystem::Geographic => write!(f, "geographic"),
            CoordinateSystem::Projected => write!(f, "projected"),
        }
    }
}

/// Axis-aligned bounding extent of a point set (bounds inclusive).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn from_points(points: &[[f64; 2]]) -> Option<Self> {
        let mut iter = points.iter().filter(|p| p[0].is_finite() && p[1].is_finite());
        let first = iter.next()?;
        let mut extent = Extent {
            min_x: first[0],
            max_x: first[0],
            min_y: first[1],
            max_y: first[1],
        };
        for p in iter {
            extent.min_x = extent.min_x.min(p[0]);
            extent.max_x = extent.max_x.max(p[0]);
            extent.min_y = extent.min_y.min(p[1]);
            extent.max_y = extent.max_y.max(p[1]);
        }
        Some(extent)
    }

    pub fn contains(&self, point: [f64; 2]) -> bool {
        point[0] >= self.min_x
            && point[0] <= self.max_x
            && point[1] >= self.min_y
            && point[1] <= self.max_y
    }
}

/// Cell centers of the reference grid in one coordinate system.
#[derive(Debug, Clone)]
pub struct CoordinateSet {
    points: Vec<[f64; 2]>,
    extent: Extent,
}

impl CoordinateSet {
    pub fn new(points: Vec<[f64; 2]>) -> AoiResult<Self> {
        let extent = Extent::from_points(&points).ok_or(AoiError::EmptyIndex)?;
        Ok(Self { points, extent })
    }

    pub fn from_axes(xs: &[f64], ys: &[f64]) -> AoiResult<Self> {
        if xs.len() != ys.len() {
            return Err(AoiError::Input(format!(
                "coordinate axes differ in length ({} vs {})",
                xs.len(),
                ys.len()
            )));
        }
        Self::new(xs.iter().zip(ys).map(|(&x, &y)| [x, y]).collect())
    }

    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    pub fn extent(&self) -> &Extent {
        &self.extent
    }
}

/// The full source grid an AOI is resolved against.
#[derive(Debug, Clone)]
pub struct ReferenceGrid {
    identifiers: Vec<i64>,
    geographic: Option<CoordinateSet>,
    projected: Option<CoordinateSet>,
}

impl ReferenceGrid {
    /// Builds a grid from in-memory parts; coordinate sets must match the
    /// identifier count.
    pub fn new(
        identifiers: Vec<i64>,
        geographic: Option<CoordinateSet>,
        projected: Option<CoordinateSet>,
    ) -> AoiResult<Self> {
        for set in [&geographic, &projected].into_iter().flatten() {
            if set.points().len() != identifiers.len() {
                return Err(AoiError::Input(format!(
                    "reference grid has {} identifiers but {} coordinate pairs",
                    identifiers.len(),
                    set.points().len()
                )));
            }
        }
        Ok(Self {
            identifiers,
            geographic,
            projected,
        })
    }

    /// Loads identifiers and every coordinate representation present in `file`.
    ///
    /// The identifier variable is required; coordinate pairs are optional and
    /// only checked when a resolution asks for them.
    pub fn from_file(file: &netcdf::File, names: &GridVariables) -> AoiResult<Self> {
        let path = file_label(file);
        let identifiers = read_identifiers(file, &names.identifier)?;

        let geographic = read_coordinate_set(file, &names.lon, &names.lat)?;
        let projected = read_coordinate_set(file, &names.x, &names.y)?;
        log::debug!(
            "Loaded reference grid from {}: {} cells (geographic: {}, projected: {})",
            path,
            identifiers.len(),
            geographic.is_some(),
            projected.is_some()
        );

        Self::new(identifiers, geographic, projected)
    }

    /// Loads only the identifier array, which is all identifier-mode resolution needs.
    pub fn identifiers_from_file(file: &netcdf::File, identifier: &str) -> AoiResult<Self> {
        Self::new(read_identifiers(file, identifier)?, None, None)
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn identifiers(&self) -> &[i64] {
        &self.identifiers
    }

    pub fn coordinates(&self, system: CoordinateSystem) -> Option<&CoordinateSet> {
        match system {
            CoordinateSystem::Geographic => self.geographic.as_ref(),
            CoordinateSystem::Projected => self.projected.as_ref(),
        }
    }
}

/// Reads an identifier variable of any integer or float type, flattened.
pub fn read_identifiers(file: &netcdf::File, name: &str) -> AoiResult<Vec<i64>> {
    let var = file
        .variable(name)
        .ok_or_else(|| AoiError::schema(file_label(file), format!("missing variable '{}'", name)))?;
    Ok(var.get_values::<i64, _>(..)?)
}

fn read_coordinate_set(
    file: &netcdf::File,
    x_name: &str,
    y_name: &str,
) -> AoiResult<Option<CoordinateSet>> {
    let (Some(x_var), Some(y_var)) = (file.variable(x_name), file.variable(y_name)) else {
        return Ok(None);
    };
    let xs = x_var.get_values::<f64, _>(..)?;
    let ys = y_var.get_values::<f64, _>(..)?;
    if xs.is_empty() {
        return Ok(None);
    }
    CoordinateSet::from_axes(&xs, &ys).map(Some)
}

/// Best-effort label for a file in messages.
pub(crate) fn file_label(file: &netcdf::File) -> String {
    file.path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "<netcdf>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_from_points() {
        let extent = Extent::from_points(&[[0.0, 10.0], [10.0, 0.0], [5.0, 5.0]]).unwrap();
        assert_eq!(extent.min_x, 0.0);
        assert_eq!(extent.max_x, 10.0);
        assert_eq!(extent.min_y, 0.0);
        assert_eq!(extent.max_y, 10.0);
        assert!(extent.contains([10.0, 10.0]));
        assert!(extent.contains([0.0, 0.0]));
        assert!(!extent.contains([15.0, 5.0]));
        assert!(!extent.contains([5.0, -0.1]));
    }

    #[test]
    fn test_extent_skips_non_finite() {
        let extent = Extent::from_points(&[[f64::NAN, 1.0], [2.0, 3.0]]).unwrap();
        assert_eq!(extent.min_x, 2.0);
        assert!(Extent::from_points(&[]).is_none());
    }

    #[test]
    fn test_grid_rejects_mismatched_coordinates() {
        let coords = CoordinateSet::new(vec![[0.0, 0.0]]).unwrap();
        let result = ReferenceGrid::new(vec![1, 2], Some(coords), None);
        assert!(matches!(result, Err(AoiError::Input(_))));
    }

    #[test]
    fn test_coordinate_lookup_by_system() {
        let geo = CoordinateSet::from_axes(&[-84.0, -83.0], &[35.0, 36.0]).unwrap();
        let grid = ReferenceGrid::new(vec![7, 8], Some(geo), None).unwrap();
        assert_eq!(grid.len(), 2);
        assert!(grid.coordinates(CoordinateSystem::Geographic).is_some());
        assert!(grid.coordinates(CoordinateSystem::Projected).is_none());
        assert_eq!(grid.identifiers(), &[7, 8]);
    }
}
