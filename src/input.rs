//! # AOI Point Input Module
//!
//! This module loads the user-supplied Area of Interest point file. The file
//! kind is decided once, from its name, and the parsed payload is carried in a
//! tagged [`AoiInput`] so resolution never has to re-inspect file names.
//!
//! ## Supported Files
//!
//! | File name pattern    | Kind        | Payload                         |
//! |----------------------|-------------|---------------------------------|
//! | `*xcyc_lcc.csv`      | Projected   | `(xc_LCC, yc_LCC)` per line     |
//! | `*xcyc.csv`          | Geographic  | `(lon, lat)` per line           |
//! | any other `*.csv`    | Identifier  | one `gridID` per line           |
//! | `*.nc`               | Identifier  | the file's `gridID` variable    |
//!
//! CSV files always start with one header line, which is skipped. Fields may be
//! separated by commas or whitespace.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use aoigen::input::AoiPoints;
//!
//! let points = AoiPoints::load("./AKSP_info", "AKSP_xcyc.csv", "gridID")?;
//! println!("{} points for {}", points.len(), points.name);
//! # Ok::<(), aoigen::error::AoiError>(())
//! ```

use crate::error::{AoiError, AoiResult};
use crate::grid::read_identifiers;
use std::fs;
use std::path::{Path, PathBuf};

/// The three ways an AOI point file can describe its points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AoiInputKind {
    Identifier,
    Geographic,
    Projected,
}

impl AoiInputKind {
    /// Detects the input kind from a file name.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use aoigen::input::AoiInputKind;
    ///
    /// assert_eq!(AoiInputKind::detect("AKSP_xcyc_lcc.csv")?, AoiInputKind::Projected);
    /// assert_eq!(AoiInputKind::detect("AKSP_xcyc.csv")?, AoiInputKind::Geographic);
    /// assert_eq!(AoiInputKind::detect("AKSP_gridID.nc")?, AoiInputKind::Identifier);
    /// assert!(AoiInputKind::detect("AKSP.txt").is_err());
    /// # Ok::<(), aoigen::error::AoiError>(())
    /// ```
    pub fn detect(file_name: &str) -> AoiResult<Self> {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with("xcyc_lcc.csv") {
            Ok(AoiInputKind::Projected)
        } else if lower.ends_with("xcyc.csv") {
            Ok(AoiInputKind::Geographic)
        } else if lower.ends_with(".csv") || lower.ends_with(".nc") {
            Ok(AoiInputKind::Identifier)
        } else {
            Err(AoiError::Input(format!(
                "unsupported AOI file '{}': expected <AOI>_gridID.csv|.nc, <AOI>_xcyc.csv or <AOI>_xcyc_lcc.csv",
                file_name
            )))
        }
    }
}

impl std::fmt::Display for AoiInputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AoiInputKind::Identifier => write!(f, "identifier"),
            AoiInputKind::Geographic => write!(f, "geographic"),
            AoiInputKind::Projected => write!(f, "projected"),
        }
    }
}

/// Parsed AOI points, one representation per invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum AoiInput {
    Identifier(Vec<i64>),
    Geographic(Vec<[f64; 2]>),
    Projected(Vec<[f64; 2]>),
}

impl AoiInput {
    pub fn kind(&self) -> AoiInputKind {
        match self {
            AoiInput::Identifier(_) => AoiInputKind::Identifier,
            AoiInput::Geographic(_) => AoiInputKind::Geographic,
            AoiInput::Projected(_) => AoiInputKind::Projected,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AoiInput::Identifier(ids) => ids.len(),
            AoiInput::Geographic(points) | AoiInput::Projected(points) => points.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An AOI point set together with the name it is published under.
#[derive(Debug, Clone)]
pub struct AoiPoints {
    /// AOI name: the file name up to its first underscore
    pub name: String,
    /// Full path of the points file
    pub source: PathBuf,
    /// Parsed points
    pub input: AoiInput,
}

impl AoiPoints {
    /// Loads `aoi_file` from the directory `aoi_path`.
    ///
    /// # Arguments
    ///
    /// * `aoi_path` - Directory holding the AOI points file
    /// * `aoi_file` - File name; its suffix selects the [`AoiInputKind`]
    /// * `identifier_variable` - Variable read from `.nc` identifier files
    ///
    /// # Errors
    ///
    /// Returns [`AoiError::AoiFileNotFound`] when the file does not exist and
    /// [`AoiError::Input`] when it cannot be parsed.
    pub fn load<P: AsRef<Path>>(
        aoi_path: P,
        aoi_file: &str,
        identifier_variable: &str,
    ) -> AoiResult<Self> {
        let source = aoi_path.as_ref().join(aoi_file);
        let kind = AoiInputKind::detect(aoi_file)?;
        if !source.is_file() {
            return Err(AoiError::AoiFileNotFound(source));
        }

        let input = match kind {
            AoiInputKind::Identifier if is_netcdf(aoi_file) => {
                let file = netcdf::open(&source)?;
                AoiInput::Identifier(read_identifiers(&file, identifier_variable)?)
            }
            AoiInputKind::Identifier => {
                AoiInput::Identifier(parse_identifier_csv(&fs::read_to_string(&source)?)?)
            }
            AoiInputKind::Geographic => {
                AoiInput::Geographic(parse_coordinate_csv(&fs::read_to_string(&source)?)?)
            }
            AoiInputKind::Projected => {
                AoiInput::Projected(parse_coordinate_csv(&fs::read_to_string(&source)?)?)
            }
        };

        log::info!(
            "Loaded {} {} AOI points from {}",
            input.len(),
            kind,
            source.display()
        );

        Ok(AoiPoints {
            name: aoi_name(aoi_file).to_string(),
            source,
            input,
        })
    }

    pub fn kind(&self) -> AoiInputKind {
        self.input.kind()
    }

    pub fn len(&self) -> usize {
        self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }
}

/// AOI name derived from a points file name (`AKSP_gridID.csv` → `AKSP`).
pub fn aoi_name(aoi_file: &str) -> &str {
    let base = Path::new(aoi_file)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(aoi_file);
    base.split('_').next().unwrap_or(base)
}

fn is_netcdf(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(".nc")
}

fn data_lines(content: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    content
        .lines()
        .enumerate()
        .skip(1)
        .map(|(idx, line)| {
            let fields = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|field| !field.is_empty())
                .collect::<Vec<_>>();
            (idx + 1, fields)
        })
        .filter(|(_, fields)| !fields.is_empty())
}

fn parse_float(field: &str, line: usize) -> AoiResult<f64> {
    field
        .parse::<f64>()
        .map_err(|_| AoiError::Input(format!("line {}: '{}' is not a number", line, field)))
}

/// Parses a one-column identifier CSV (header line skipped).
pub fn parse_identifier_csv(content: &str) -> AoiResult<Vec<i64>> {
    let mut ids = Vec::new();
    for (line, fields) in data_lines(content) {
        let field = fields[0];
        let id = match field.parse::<i64>() {
            Ok(id) => id,
            Err(_) => {
                let value = parse_float(field, line)?;
                if value.fract() != 0.0 || !value.is_finite() {
                    return Err(AoiError::Input(format!(
                        "line {}: '{}' is not an integer grid identifier",
                        line, field
                    )));
                }
                value as i64
            }
        };
        ids.push(id);
    }
    Ok(ids)
}

/// Parses a two-column `(x, y)` coordinate CSV (header line skipped).
pub fn parse_coordinate_csv(content: &str) -> AoiResult<Vec<[f64; 2]>> {
    let mut points = Vec::new();
    for (line, fields) in data_lines(content) {
        if fields.len() < 2 {
            return Err(AoiError::Input(format!(
                "line {}: expected two coordinate columns, found {}",
                line,
                fields.len()
            )));
        }
        points.push([parse_float(fields[0], line)?, parse_float(fields[1], line)?]);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_detect_kind_by_suffix() {
        assert_eq!(AoiInputKind::detect("AKSP_gridID.csv").unwrap(), AoiInputKind::Identifier);
        assert_eq!(AoiInputKind::detect("MOF21points_xcyc.csv").unwrap(), AoiInputKind::Geographic);
        assert_eq!(AoiInputKind::detect("AKSP_xcyc_lcc.csv").unwrap(), AoiInputKind::Projected);
        assert_eq!(AoiInputKind::detect("AKSP_gridID.nc").unwrap(), AoiInputKind::Identifier);
        assert!(matches!(AoiInputKind::detect("AKSP.json"), Err(AoiError::Input(_))));
    }

    #[test]
    fn test_aoi_name() {
        assert_eq!(aoi_name("AKSP_gridID.csv"), "AKSP");
        assert_eq!(aoi_name("MOF21points_xcyc.csv"), "MOF21points");
        assert_eq!(aoi_name("plain.csv"), "plain.csv");
    }

    #[test]
    fn test_parse_identifiers_skips_header() {
        let ids = parse_identifier_csv("gridID\n12\n10\n\n11.0\n").unwrap();
        assert_eq!(ids, vec![12, 10, 11]);
    }

    #[test]
    fn test_parse_identifiers_rejects_fraction() {
        assert!(parse_identifier_csv("gridID\n12.5\n").is_err());
        assert!(parse_identifier_csv("gridID\nabc\n").is_err());
    }

    #[test]
    fn test_parse_coordinates_comma_and_space() {
        let points = parse_coordinate_csv("xc,yc\n-84.1,35.2\n-83.9 35.3\n").unwrap();
        assert_eq!(points, vec![[-84.1, 35.2], [-83.9, 35.3]]);
        assert!(parse_coordinate_csv("xc,yc\n-84.1\n").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = AoiPoints::load(dir.path(), "AKSP_gridID.csv", "gridID");
        assert!(matches!(result, Err(AoiError::AoiFileNotFound(_))));
    }

    #[test]
    fn test_load_projected_csv() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("AKSP_xcyc_lcc.csv"), "xc_LCC,yc_LCC\n100.0,200.0\n")?;
        let points = AoiPoints::load(dir.path(), "AKSP_xcyc_lcc.csv", "gridID")?;
        assert_eq!(points.name, "AKSP");
        assert_eq!(points.kind(), AoiInputKind::Projected);
        assert_eq!(points.input, AoiInput::Projected(vec![[100.0, 200.0]]));
        Ok(())
    }
}
