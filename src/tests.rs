use crate::config::RunConfig;
use crate::error::AoiError;
use crate::input::{AoiInput, AoiPoints};
use crate::jobs::*;
use crate::resolve::Resolution;
use crate::sample::*;
use crate::scheduler::*;
use crate::schema::*;
use crate::transcode::*;
use chrono::{Local, TimeZone};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const GRID_SIDE: usize = 10;
const GRID_CELLS: usize = GRID_SIDE * GRID_SIDE;
const FIRST_ID: i32 = 5000;

/// Writes a 10x10 reference domain flattened to `(nj = 1, ni = 100)`.
///
/// Cell `i` sits at column `i % 10`, row `i / 10`, with gridID `5000 + i`,
/// geographic coordinates `(260 + col, 60 + row)` and projected coordinates
/// `(4000 * col, 4000 * row)`.
fn create_domain(path: &Path) -> TestResult {
    let ids: Vec<i32> = (0..GRID_CELLS as i32).map(|i| FIRST_ID + i).collect();
    let cols: Vec<f64> = (0..GRID_CELLS).map(|i| (i % GRID_SIDE) as f64).collect();
    let rows: Vec<f64> = (0..GRID_CELLS).map(|i| (i / GRID_SIDE) as f64).collect();
    let xc: Vec<f64> = cols.iter().map(|c| 260.0 + c).collect();
    let yc: Vec<f64> = rows.iter().map(|r| 60.0 + r).collect();
    let x_lcc: Vec<f64> = cols.iter().map(|c| 4000.0 * c).collect();
    let y_lcc: Vec<f64> = rows.iter().map(|r| 4000.0 * r).collect();
    let mask: Vec<i32> = (0..GRID_CELLS as i32).map(|i| i % 2).collect();

    let mut file = netcdf::create(path)?;
    file.add_attribute("title", "Reference domain")?;
    file.add_attribute("source", "synthetic test grid")?;
    file.add_dimension("nj", 1)?;
    file.add_dimension("ni", GRID_CELLS)?;
    file.add_dimension("nv", 4)?;

    {
        let mut var = file.add_variable::<i32>("gridID", &["nj", "ni"])?;
        var.put_attribute("long_name", "grid cell identifier")?;
        var.put_values(ids.as_slice(), (0..1, 0..GRID_CELLS))?;
    }
    for (name, values) in [("xc", &xc), ("yc", &yc), ("xc_LCC", &x_lcc), ("yc_LCC", &y_lcc)] {
        let mut var = file.add_variable::<f64>(name, &["nj", "ni"])?;
        var.put_attribute("units", "synthetic")?;
        var.put_values(values.as_slice(), (0..1, 0..GRID_CELLS))?;
    }
    for (name, values) in [("lon", &xc), ("lat", &yc)] {
        let mut var = file.add_variable::<f64>(name, &["ni"])?;
        var.put_values(values.as_slice(), (0..GRID_CELLS,))?;
    }
    {
        let mut var = file.add_variable::<i32>("mask", &["nj", "ni"])?;
        var.put_attribute("_FillValue", -9999i32)?;
        var.put_attribute("long_name", "land mask")?;
        var.put_values(mask.as_slice(), (0..1, 0..GRID_CELLS))?;
    }
    {
        let mut var = file.add_variable::<f64>("nv_weight", &["nv"])?;
        var.put_values(&[0.25f64, 0.25, 0.25, 0.25][..], (0..4,))?;
    }
    {
        let mut var = file.add_variable::<i32>("lambert_conformal_conic", &[])?;
        var.put_attribute("grid_mapping_name", "lambert_conformal_conic")?;
        var.put_attribute("standard_parallel", vec![30.0f64, 60.0])?;
    }
    Ok(())
}

fn tbot(record: usize, site: usize) -> f32 {
    (record * 1000 + site) as f32
}

/// Writes a forcing file with `records` steps on an unlimited time axis over
/// `sites` cells whose gridIDs are `5000 + site`.
fn create_forcing(path: &Path, records: usize, sites: usize) -> TestResult {
    let ids: Vec<i32> = (0..sites as i32).map(|i| FIRST_ID + i).collect();
    let times: Vec<f64> = (0..records).map(|t| t as f64 * 0.125).collect();
    let mut data = Vec::with_capacity(records * sites);
    for t in 0..records {
        for s in 0..sites {
            data.push(tbot(t, s));
        }
    }

    let mut file = netcdf::create(path)?;
    file.add_attribute("title", "Synthetic forcing")?;
    file.add_unlimited_dimension("time")?;
    file.add_dimension("nj", 1)?;
    file.add_dimension("ni", sites)?;

    {
        let mut var = file.add_variable::<f64>("time", &["time"])?;
        var.put_attribute("units", "days since 2014-01-01 00:00:00")?;
        var.put_values(times.as_slice(), (0..records,))?;
    }
    {
        let mut var = file.add_variable::<i32>("gridID", &["ni"])?;
        var.put_values(ids.as_slice(), (0..sites,))?;
    }
    {
        let mut var = file.add_variable::<f32>("TBOT", &["time", "nj", "ni"])?;
        var.put_attribute("_FillValue", 1.0e36f32)?;
        var.put_attribute("units", "K")?;
        var.put_values(data.as_slice(), (0..records, 0..1, 0..sites))?;
    }
    Ok(())
}

/// Writes a surface-property file on a `gridcell` axis whose gridIDs run in
/// descending order.
fn create_surfdata(path: &Path) -> TestResult {
    let ids: Vec<i64> = (0..GRID_CELLS as i64)
        .map(|i| FIRST_ID as i64 + GRID_CELLS as i64 - 1 - i)
        .collect();
    let sand: Vec<f64> = (0..3 * GRID_CELLS)
        .map(|k| ((k / GRID_CELLS) * 1000 + k % GRID_CELLS) as f64)
        .collect();

    let mut file = netcdf::create(path)?;
    file.add_attribute("title", "Synthetic surface data")?;
    file.add_dimension("gridcell", GRID_CELLS)?;
    file.add_dimension("nlevsoi", 3)?;
    file.add_dimension("natpft", 2)?;

    {
        let mut var = file.add_variable::<i64>("gridID", &["gridcell"])?;
        var.put_values(ids.as_slice(), (0..GRID_CELLS,))?;
    }
    {
        let mut var = file.add_variable::<f64>("PCT_SAND", &["nlevsoi", "gridcell"])?;
        var.put_attribute("units", "%")?;
        var.put_values(sand.as_slice(), (0..3, 0..GRID_CELLS))?;
    }
    {
        let mut var = file.add_variable::<u8>("natpft", &["natpft"])?;
        var.put_values(&[0u8, 1][..], (0..2,))?;
    }
    Ok(())
}

/// Writes a file holding a rank-4 variable that ends in the site axis.
fn create_rank_four(path: &Path, sites: usize) -> TestResult {
    let ids: Vec<i32> = (0..sites as i32).map(|i| FIRST_ID + i).collect();
    let values: Vec<f64> = (0..8 * sites).map(|v| v as f64).collect();

    let mut file = netcdf::create(path)?;
    file.add_dimension("a", 2)?;
    file.add_dimension("b", 2)?;
    file.add_dimension("c", 2)?;
    file.add_dimension("ni", sites)?;
    {
        let mut var = file.add_variable::<i32>("gridID", &["ni"])?;
        var.put_values(ids.as_slice(), (0..sites,))?;
    }
    {
        let mut var = file.add_variable::<f64>("PCT", &["a", "b", "c", "ni"])?;
        var.put_values(values.as_slice(), (0..2, 0..2, 0..2, 0..sites))?;
    }
    Ok(())
}

fn test_context(aoi_dir: &Path, aoi_file: &str) -> RunContext {
    let at = Local
        .with_ymd_and_hms(2026, 10, 18, 12, 0, 0)
        .single()
        .expect("fixed local timestamp");
    RunContext::new(aoi_dir, aoi_file, at)
}

fn test_config() -> RunConfig {
    RunConfig {
        progress: false,
        ..RunConfig::default()
    }
}

fn schema_of(path: &Path) -> ContainerSchema {
    let file = netcdf::open(path).unwrap();
    ContainerSchema::from_file(&file).unwrap()
}

fn values_of(path: &Path, variable: &str) -> Vec<f64> {
    let file = netcdf::open(path).unwrap();
    let var = file.variable(variable).unwrap();
    var.get_values::<f64, _>(..).unwrap()
}

fn global_text(path: &Path, name: &str) -> Option<String> {
    let file = netcdf::open(path).unwrap();
    let attr = file.attribute(name)?;
    match attr.value().unwrap() {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

/// Schema without its title and path, plus every variable's data as f64.
fn content_dump(path: &Path) -> (ContainerSchema, Vec<(String, Vec<f64>)>) {
    let schema = schema_of(path).without_title();
    let file = netcdf::open(path).unwrap();
    let data = file
        .variables()
        .map(|var| (var.name(), var.get_values::<f64, _>(..).unwrap()))
        .collect();
    (schema, data)
}

fn write_aoi(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[cfg(test)]
mod transcode_tests {
    use super::*;

    #[test]
    fn test_identity_subset_preserves_schema_and_data() -> TestResult {
        let dir = tempdir()?;
        let source_path = dir.path().join("domain.nc");
        let destination = dir.path().join("copy.nc");
        create_domain(&source_path)?;

        let source = netcdf::open(&source_path)?;
        let options = TranscodeOptions {
            title: "identity copy".to_string(),
            ..Default::default()
        };
        let report = transcode(
            &source,
            &destination,
            "ni",
            &Resolution::identity(GRID_CELLS),
            &options,
        )?;
        assert_eq!(report.sites, GRID_CELLS);
        assert_eq!(report.variables, 10);

        let mut expected = schema_of(&source_path).expected_subset(
            "ni",
            GRID_CELLS,
            &options.dropped_attributes,
        );
        expected.path.clear();
        assert_eq!(schema_of(&destination).without_title(), expected);

        for name in ["gridID", "xc", "yc_LCC", "lon", "mask", "nv_weight"] {
            assert_eq!(values_of(&destination, name), values_of(&source_path, name));
        }
        Ok(())
    }

    #[test]
    fn test_subset_keeps_source_order_and_values() -> TestResult {
        let dir = tempdir()?;
        let source_path = dir.path().join("forcing.nc");
        let destination = dir.path().join("subset.nc");
        create_forcing(&source_path, 12, 50)?;

        let source = netcdf::open(&source_path)?;
        let resolution = Resolution::from_matches(vec![49, 3, 10, 3], 50, Vec::new())?;
        transcode(&source, &destination, "ni", &resolution, &TranscodeOptions::default())?;

        let out = netcdf::open(&destination)?;
        assert_eq!(out.dimension("ni").unwrap().len(), 3);
        let ids = out.variable("gridID").unwrap().get_values::<i32, _>(..)?;
        assert_eq!(ids, vec![5003, 5010, 5049]);

        let values = out.variable("TBOT").unwrap().get_values::<f32, _>(..)?;
        let expected: Vec<f32> = (0..12)
            .flat_map(|t| [3, 10, 49].into_iter().map(move |s| tbot(t, s)))
            .collect();
        assert_eq!(values, expected);
        assert_eq!(values_of(&destination, "time"), values_of(&source_path, "time"));
        Ok(())
    }

    #[test]
    fn test_chunk_window_does_not_change_output() -> TestResult {
        let dir = tempdir()?;
        let source_path = dir.path().join("forcing.nc");
        create_forcing(&source_path, 100, 50)?;
        let source = netcdf::open(&source_path)?;

        let picks: Vec<usize> = (0..50).step_by(5).chain([1, 2, 48, 49]).collect();
        let resolution = Resolution::from_matches(picks, 50, Vec::new())?;
        assert_eq!(resolution.len(), 14);

        let mut dumps = Vec::new();
        for (window, chunks) in [(1, 100), (7, 15), (16, 7), (100, 1), (250, 1)] {
            let destination = dir.path().join(format!("window_{}.nc", window));
            let options = TranscodeOptions {
                title: "chunked".to_string(),
                chunk_size: window,
                ..Default::default()
            };
            let report = transcode(&source, &destination, "ni", &resolution, &options)?;
            assert_eq!(report.chunked_variables, 1);
            assert_eq!(report.chunks, chunks, "window {}", window);
            dumps.push(content_dump(&destination).1);
        }
        assert!(dumps.windows(2).all(|pair| pair[0] == pair[1]));
        Ok(())
    }

    #[test]
    fn test_unlimited_dimension_stays_unlimited() -> TestResult {
        let dir = tempdir()?;
        let source_path = dir.path().join("forcing.nc");
        let destination = dir.path().join("subset.nc");
        create_forcing(&source_path, 20, 8)?;

        let source = netcdf::open(&source_path)?;
        let resolution = Resolution::from_matches(vec![0, 7], 8, Vec::new())?;
        transcode(&source, &destination, "ni", &resolution, &TranscodeOptions::default())?;

        let schema = schema_of(&destination);
        let time = schema.dimension("time").unwrap();
        assert!(time.is_unlimited);
        assert_eq!(time.length, 20);
        assert_eq!(schema.variable("TBOT").unwrap().shape, vec![20, 1, 2]);
        Ok(())
    }

    #[test]
    fn test_fill_value_dropped_and_title_set() -> TestResult {
        let dir = tempdir()?;
        let source_path = dir.path().join("forcing.nc");
        let destination = dir.path().join("subset.nc");
        create_forcing(&source_path, 4, 6)?;

        let source = netcdf::open(&source_path)?;
        let options = TranscodeOptions {
            title: "AOI subset".to_string(),
            ..Default::default()
        };
        transcode(&source, &destination, "ni", &Resolution::identity(6), &options)?;

        let schema = schema_of(&destination);
        let tbot = schema.variable("TBOT").unwrap();
        assert!(tbot.attributes.iter().all(|a| a.name != "_FillValue"));
        assert!(tbot.attributes.iter().any(|a| a.name == "units" && a.value == "K"));
        assert_eq!(global_text(&destination, "title").as_deref(), Some("AOI subset"));
        Ok(())
    }

    #[test]
    fn test_attributes_only_variable_keeps_metadata() -> TestResult {
        let dir = tempdir()?;
        let source_path = dir.path().join("domain.nc");
        let destination = dir.path().join("subset.nc");
        create_domain(&source_path)?;

        let source = netcdf::open(&source_path)?;
        let resolution = Resolution::from_matches(vec![5], GRID_CELLS, Vec::new())?;
        transcode(&source, &destination, "ni", &resolution, &TranscodeOptions::default())?;

        let schema = schema_of(&destination);
        let lcc = schema.variable("lambert_conformal_conic").unwrap();
        assert!(lcc.dimensions.is_empty());
        assert!(lcc.attributes.iter().any(|a| a.name == "grid_mapping_name"));
        assert_eq!(schema.variable("nv_weight").unwrap().shape, vec![4]);
        Ok(())
    }

    #[test]
    fn test_char_projection_variable_is_carried() -> TestResult {
        use netcdf::types::NcVariableType;

        let dir = tempdir()?;
        let source_path = dir.path().join("char_projection.nc");
        let destination = dir.path().join("subset.nc");
        {
            let ids: Vec<i32> = (0..4).map(|i| FIRST_ID + i).collect();
            let mut file = netcdf::create(&source_path)?;
            file.add_dimension("ni", 4)?;
            {
                let mut var = file.add_variable::<i32>("gridID", &["ni"])?;
                var.put_values(ids.as_slice(), (0..4,))?;
            }
            let mut var =
                file.add_variable_with_type("lambert_conformal_conic", &[], &NcVariableType::Char)?;
            var.put_attribute("grid_mapping_name", "lambert_conformal_conic")?;
            var.put_attribute("longitude_of_central_meridian", -100.0f64)?;
        }

        let source = netcdf::open(&source_path)?;
        let resolution = Resolution::from_matches(vec![1, 3], 4, Vec::new())?;
        let report = transcode(&source, &destination, "ni", &resolution, &TranscodeOptions::default())?;
        assert_eq!(report.variables, 2);

        let schema = schema_of(&destination);
        let lcc = schema.variable("lambert_conformal_conic").unwrap();
        assert_eq!(lcc.data_type, format_variable_type(&NcVariableType::Char));
        assert!(lcc.attributes.iter().any(|a| a.name == "grid_mapping_name"));
        assert!(lcc.attributes.iter().any(|a| a.name == "longitude_of_central_meridian"));
        assert_eq!(values_of(&destination, "gridID"), vec![5001.0, 5003.0]);
        Ok(())
    }

    #[test]
    fn test_skipped_variables_are_left_out() -> TestResult {
        let dir = tempdir()?;
        let source_path = dir.path().join("domain.nc");
        let destination = dir.path().join("subset.nc");
        create_domain(&source_path)?;

        let source = netcdf::open(&source_path)?;
        let options = TranscodeOptions {
            skipped_variables: vec!["lon".to_string(), "lat".to_string()],
            ..Default::default()
        };
        let report = transcode(&source, &destination, "ni", &Resolution::identity(GRID_CELLS), &options)?;
        assert_eq!(report.variables, 8);

        let out = netcdf::open(&destination)?;
        assert!(out.variable("lon").is_none());
        assert!(out.variable("lat").is_none());
        assert!(out.variable("xc").is_some());
        Ok(())
    }

    #[test]
    fn test_site_length_mismatch_is_schema_error() -> TestResult {
        let dir = tempdir()?;
        let source_path = dir.path().join("forcing.nc");
        create_forcing(&source_path, 2, 10)?;
        let source = netcdf::open(&source_path)?;

        let result = transcode(
            &source,
            &dir.path().join("out.nc"),
            "ni",
            &Resolution::identity(12),
            &TranscodeOptions::default(),
        );
        assert!(matches!(result, Err(AoiError::Schema { .. })));

        let result = transcode(
            &source,
            &dir.path().join("out.nc"),
            "gridcell",
            &Resolution::identity(10),
            &TranscodeOptions::default(),
        );
        assert!(matches!(result, Err(AoiError::Schema { .. })));
        Ok(())
    }

    #[test]
    fn test_empty_selection_is_rejected_before_writing() -> TestResult {
        let dir = tempdir()?;
        let source_path = dir.path().join("forcing.nc");
        let destination = dir.path().join("out.nc");
        create_forcing(&source_path, 2, 10)?;
        let source = netcdf::open(&source_path)?;

        let empty = Resolution::from_matches(Vec::new(), 10, Vec::new())?;
        let result = transcode(&source, &destination, "ni", &empty, &TranscodeOptions::default());
        assert!(matches!(result, Err(AoiError::EmptySelection(_))));
        assert!(!destination.exists());
        Ok(())
    }

    #[test]
    fn test_unsupported_shape_removes_partial_file() -> TestResult {
        let dir = tempdir()?;
        let source_path = dir.path().join("rank4.nc");
        let destination = dir.path().join("nested").join("out.nc");
        create_rank_four(&source_path, 6)?;

        let result = subset_file(
            &source_path,
            &destination,
            &Resolution::identity(6),
            &test_config(),
            &TranscodeOptions::default(),
        );
        match result {
            Err(AoiError::UnsupportedShape { variable, dimensions }) => {
                assert_eq!(variable, "PCT");
                assert_eq!(dimensions, vec!["a", "b", "c", "ni"]);
            }
            other => panic!("expected UnsupportedShape, got {:?}", other),
        }
        assert!(!destination.exists());
        Ok(())
    }

    #[test]
    fn test_find_site_dimension_candidates() -> TestResult {
        let dir = tempdir()?;
        let surf = dir.path().join("surf.nc");
        create_surfdata(&surf)?;
        let file = netcdf::open(&surf)?;

        let candidates = test_config().site_dimensions;
        assert_eq!(find_site_dimension(&file, &candidates)?, "gridcell");
        assert!(find_site_dimension(&file, &["ni".to_string()]).is_err());
        Ok(())
    }
}

#[cfg(test)]
mod producer_tests {
    use super::*;

    #[test]
    fn test_domain_from_identifier_csv() -> TestResult {
        let dir = tempdir()?;
        let reference = dir.path().join("domain.lnd.test.nc");
        let out_dir = dir.path().join("out");
        create_domain(&reference)?;
        write_aoi(dir.path(), "AKSP_gridID.csv", "gridID\n5099\n5000.0\n5050\n12345\n");

        let config = test_config();
        let ctx = test_context(dir.path(), "AKSP_gridID.csv");
        let points = ctx.load_points(&config)?;
        let outcome = generate_domain(&reference, &out_dir, &points, &ctx, &config)?;

        assert_eq!(
            outcome.destination,
            out_dir.join("AKSP_domain.lnd.test.c261018.nc")
        );
        assert_eq!(outcome.resolution.indices(), &[0, 50, 99]);
        assert_eq!(outcome.resolution.rejected().len(), 1);

        assert_eq!(
            values_of(&outcome.destination, "gridID"),
            vec![5000.0, 5050.0, 5099.0]
        );
        assert_eq!(
            global_text(&outcome.destination, "title").as_deref(),
            Some("1D domain for AKSP, generated on 261018 with domain.lnd.test.nc")
        );
        let out = netcdf::open(&outcome.destination)?;
        assert!(out.variable("lon").is_none());
        assert!(out.variable("lat").is_none());
        assert_eq!(out.dimension("ni").unwrap().len(), 3);
        Ok(())
    }

    #[test]
    fn test_domain_from_geographic_points() -> TestResult {
        let dir = tempdir()?;
        let reference = dir.path().join("domain.lnd.test.nc");
        create_domain(&reference)?;
        write_aoi(
            dir.path(),
            "AKSP_xcyc.csv",
            "lon,lat\n263.2,61.1\n262.0,65.0\n250.0,61.0\n263.0,61.0\n",
        );

        let config = test_config();
        let ctx = test_context(dir.path(), "AKSP_xcyc.csv");
        let points = ctx.load_points(&config)?;
        assert!(matches!(points.input, AoiInput::Geographic(_)));

        let outcome = generate_domain(&reference, dir.path(), &points, &ctx, &config)?;
        // two points snap to cell 13, one lies west of the grid
        assert_eq!(outcome.resolution.indices(), &[13, 52]);
        assert_eq!(outcome.resolution.rejected().len(), 1);
        assert_eq!(outcome.resolution.rejected()[0].position, 2);
        assert_eq!(values_of(&outcome.destination, "gridID"), vec![5013.0, 5052.0]);
        assert_eq!(values_of(&outcome.destination, "xc"), vec![263.0, 262.0]);
        Ok(())
    }

    #[test]
    fn test_domain_from_projected_points() -> TestResult {
        let dir = tempdir()?;
        let reference = dir.path().join("domain.lnd.test.nc");
        create_domain(&reference)?;
        write_aoi(
            dir.path(),
            "AKSP_xcyc_lcc.csv",
            "x y\n12100 8000\n-5000 0\n",
        );

        let config = test_config();
        let ctx = test_context(dir.path(), "AKSP_xcyc_lcc.csv");
        let points = ctx.load_points(&config)?;
        assert!(matches!(points.input, AoiInput::Projected(_)));

        let outcome = generate_domain(&reference, dir.path(), &points, &ctx, &config)?;
        assert_eq!(outcome.resolution.indices(), &[23]);
        assert_eq!(values_of(&outcome.destination, "gridID"), vec![5023.0]);
        Ok(())
    }

    #[test]
    fn test_domain_with_no_surviving_points_fails() -> TestResult {
        let dir = tempdir()?;
        let reference = dir.path().join("domain.lnd.test.nc");
        create_domain(&reference)?;
        write_aoi(dir.path(), "AKSP_gridID.csv", "gridID\n1\n2\n");

        let config = test_config();
        let ctx = test_context(dir.path(), "AKSP_gridID.csv");
        let points = ctx.load_points(&config)?;
        let result = generate_domain(&reference, dir.path(), &points, &ctx, &config);
        assert!(matches!(result, Err(AoiError::EmptySelection(_))));
        assert!(!dir.path().join("AKSP_domain.lnd.test.c261018.nc").exists());
        Ok(())
    }

    #[test]
    fn test_missing_aoi_file_is_reported() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path(), "AKSP_gridID.csv");
        let result = ctx.load_points(&test_config());
        assert!(matches!(result, Err(AoiError::AoiFileNotFound(_))));
    }

    #[test]
    fn test_surfdata_from_generated_domain() -> TestResult {
        let dir = tempdir()?;
        let reference = dir.path().join("domain.lnd.test.nc");
        let surfdata = dir.path().join("surfdata.test.nc");
        let out_dir = dir.path().join("out");
        create_domain(&reference)?;
        create_surfdata(&surfdata)?;
        write_aoi(dir.path(), "AKSP_gridID.csv", "gridID\n5000\n5050\n5099\n");

        let config = test_config();
        let ctx = test_context(dir.path(), "AKSP_gridID.csv");
        let points = ctx.load_points(&config)?;
        let domain = generate_domain(&reference, &out_dir, &points, &ctx, &config)?;

        // the generated domain is itself a valid identifier AOI
        let domain_name = domain.destination.file_name().unwrap().to_str().unwrap();
        let nc_ctx = test_context(&out_dir, domain_name);
        let nc_points = nc_ctx.load_points(&config)?;
        assert_eq!(nc_points.name, "AKSP");
        assert!(matches!(&nc_points.input, AoiInput::Identifier(ids) if ids == &vec![5000, 5050, 5099]));

        let outcome = generate_surfdata(&surfdata, &out_dir, &nc_points, &nc_ctx, &config)?;
        assert_eq!(outcome.destination, out_dir.join("AKSP_surfdata.test.nc"));
        // descending source ids: 5099 at 0, 5050 at 49, 5000 at 99
        assert_eq!(outcome.resolution.indices(), &[0, 49, 99]);
        assert_eq!(
            values_of(&outcome.destination, "gridID"),
            vec![5099.0, 5050.0, 5000.0]
        );
        assert_eq!(
            values_of(&outcome.destination, "PCT_SAND"),
            vec![0.0, 49.0, 99.0, 1000.0, 1049.0, 1099.0, 2000.0, 2049.0, 2099.0]
        );
        assert_eq!(values_of(&outcome.destination, "natpft"), vec![0.0, 1.0]);

        let title = global_text(&outcome.destination, "title").unwrap();
        assert!(title.ends_with(&format!(
            "created from {} on 261018",
            surfdata.display()
        )));
        Ok(())
    }

    #[test]
    fn test_rerun_is_idempotent() -> TestResult {
        let dir = tempdir()?;
        let surfdata = dir.path().join("surfdata.test.nc");
        create_surfdata(&surfdata)?;
        write_aoi(dir.path(), "AKSP_gridID.csv", "gridID\n5010\n5020\n5030\n");

        let config = test_config();
        let ctx = test_context(dir.path(), "AKSP_gridID.csv");
        let points = ctx.load_points(&config)?;

        let first = generate_surfdata(&surfdata, dir.path(), &points, &ctx, &config)?;
        let first_dump = content_dump(&first.destination);
        let first_title = global_text(&first.destination, "title");

        let second = generate_surfdata(&surfdata, dir.path(), &points, &ctx, &config)?;
        assert_eq!(first.destination, second.destination);
        assert_eq!(content_dump(&second.destination), first_dump);
        assert_eq!(global_text(&second.destination, "title"), first_title);
        Ok(())
    }
}

#[cfg(test)]
mod forcing_tests {
    use super::*;

    const FORCING_NAMES: [&str; 2] = [
        "clmforc.Daymet4.1km.1d.TBOT.2014-01.nc",
        "clmforc.Daymet4.1km.1d.TBOT.2014-02.nc",
    ];

    /// Two valid forcing files in nested directories plus one unreadable file.
    fn create_forcing_tree(root: &Path) -> TestResult {
        let tbot = root.join("TBOT");
        fs::create_dir_all(&tbot)?;
        for name in FORCING_NAMES {
            create_forcing(&tbot.join(name), 24, 20)?;
        }
        fs::create_dir_all(root.join("broken"))?;
        fs::write(root.join("broken").join("corrupt.nc"), b"not a netcdf file")?;
        fs::write(root.join("README.txt"), b"ignored")?;
        Ok(())
    }

    fn run_forcing(workers: usize, rank: Option<RankEnvironment>) -> TestResult {
        let dir = tempdir()?;
        let input_root = dir.path().join("forcing");
        let output_root = dir.path().join("out");
        create_forcing_tree(&input_root)?;
        write_aoi(dir.path(), "AKSP_gridID.csv", "gridID\n5019\n5002\n");

        let config = RunConfig {
            workers,
            ..test_config()
        };
        let ctx = test_context(dir.path(), "AKSP_gridID.csv");
        let points = ctx.load_points(&config)?;
        let strategy = select_strategy(rank, config.workers, config.progress, None);
        let outcomes =
            generate_forcing(&input_root, &output_root, &points, &ctx, &config, strategy)?;

        let expected_tasks = match rank {
            Some(env) => partition(3, env.rank, env.world_size).len(),
            None => 3,
        };
        assert_eq!(outcomes.len(), expected_tasks);

        for outcome in &outcomes {
            let destination = outcome.task.destination_path("AKSP");
            if outcome.task.file_name == "corrupt.nc" {
                assert!(!outcome.is_success());
                assert!(!destination.exists());
                continue;
            }
            assert!(outcome.is_success(), "{:?}", outcome.status);
            assert_eq!(destination.parent().unwrap(), output_root.join("TBOT"));
            assert_eq!(values_of(&destination, "gridID"), vec![5002.0, 5019.0]);
            let values = values_of(&destination, "TBOT");
            assert_eq!(values.len(), 24 * 2);
            assert_eq!(values[2], tbot(1, 2) as f64);
            assert_eq!(values[3], tbot(1, 19) as f64);
        }
        Ok(())
    }

    #[test]
    fn test_forcing_sequential_collects_failures() -> TestResult {
        run_forcing(1, None)
    }

    #[test]
    fn test_forcing_pool_collects_failures() -> TestResult {
        run_forcing(4, None)
    }

    #[test]
    fn test_forcing_rank_share() -> TestResult {
        run_forcing(1, Some(RankEnvironment { rank: 0, world_size: 2 }))?;
        run_forcing(1, Some(RankEnvironment { rank: 1, world_size: 2 }))
    }

    #[test]
    fn test_forcing_summary() -> TestResult {
        let dir = tempdir()?;
        let input_root = dir.path().join("forcing");
        create_forcing_tree(&input_root)?;
        write_aoi(dir.path(), "AKSP_gridID.csv", "gridID\n5000\n");

        let config = test_config();
        let ctx = test_context(dir.path(), "AKSP_gridID.csv");
        let points = ctx.load_points(&config)?;
        let outcomes =
            generate_forcing(
                &input_root,
                &dir.path().join("out"),
                &points,
                &ctx,
                &config,
                Box::new(SequentialStrategy),
            )?;

        let summary = RunSummary::from_outcomes(&outcomes);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].task.file_name, "corrupt.nc");
        assert!(!summary.is_success());
        Ok(())
    }

    #[test]
    fn test_forcing_missing_root_fails_the_run() {
        let dir = tempdir().unwrap();
        write_aoi(dir.path(), "AKSP_gridID.csv", "gridID\n5000\n");
        let config = test_config();
        let ctx = test_context(dir.path(), "AKSP_gridID.csv");
        let points = ctx.load_points(&config).unwrap();

        let result = generate_forcing(
            &dir.path().join("absent"),
            &dir.path().join("out"),
            &points,
            &ctx,
            &config,
            Box::new(SequentialStrategy),
        );
        assert!(matches!(result, Err(AoiError::Input(_))));
    }
}

#[cfg(test)]
mod sample_tests {
    use super::*;

    fn request(dir: &Path, domain: PathBuf) -> SampleRequest {
        SampleRequest {
            domain,
            percent: 10.0,
            case_name: "TN".to_string(),
            out: None,
            output_dir: dir.to_path_buf(),
            seed: Some(42),
            like: None,
            sort: true,
            identifier_variable: "gridID".to_string(),
        }
    }

    #[test]
    fn test_sample_writes_sorted_subset() -> TestResult {
        let dir = tempdir()?;
        let domain = dir.path().join("domain.lnd.test.nc");
        create_domain(&domain)?;

        let outcome = sample_grid_ids(&request(dir.path(), domain))?;
        assert_eq!(outcome.path, dir.path().join("TN10pct_gridID.nc"));
        assert_eq!(outcome.total, GRID_CELLS);
        assert_eq!(outcome.selected.len(), 10);
        assert!(outcome.selected.windows(2).all(|w| w[0] < w[1]));
        assert!(outcome
            .selected
            .iter()
            .all(|id| (FIRST_ID..FIRST_ID + GRID_CELLS as i32).contains(id)));

        let file = netcdf::open(&outcome.path)?;
        let var = file.variable("gridID").unwrap();
        assert_eq!(var.dimensions().iter().map(|d| d.len()).collect::<Vec<_>>(), vec![1, 10]);
        assert_eq!(var.get_values::<i32, _>(..)?, outcome.selected);
        assert!(var.attribute("long_name").is_some());
        assert_eq!(
            global_text(&outcome.path, "title").as_deref(),
            Some("Random selection of 10/100 gridIDs (10.000%) from domain.lnd.test.nc")
        );

        // the sample is itself an identifier AOI
        let points = AoiPoints::load(dir.path(), "TN10pct_gridID.nc", "gridID")?;
        assert_eq!(points.len(), 10);
        Ok(())
    }

    #[test]
    fn test_sample_is_reproducible_with_seed() -> TestResult {
        let dir = tempdir()?;
        let domain = dir.path().join("domain.lnd.test.nc");
        create_domain(&domain)?;

        let mut first = request(dir.path(), domain.clone());
        first.out = Some(dir.path().join("a.nc"));
        let mut second = request(dir.path(), domain);
        second.out = Some(dir.path().join("b.nc"));

        assert_eq!(
            sample_grid_ids(&first)?.selected,
            sample_grid_ids(&second)?.selected
        );
        Ok(())
    }

    #[test]
    fn test_sample_like_file_extends_title() -> TestResult {
        let dir = tempdir()?;
        let domain = dir.path().join("domain.lnd.test.nc");
        let like = dir.path().join("TNdemo_gridID.nc");
        create_domain(&domain)?;
        {
            let mut file = netcdf::create(&like)?;
            file.add_attribute("title", "TN demo")?;
            file.add_attribute("institution", "ORNL")?;
            file.add_dimension("nj", 1)?;
            file.add_dimension("ni", 1)?;
            let mut var = file.add_variable::<i32>("gridID", &["nj", "ni"])?;
            var.put_attribute("description", "demo identifiers")?;
            var.put_values(&[5000i32][..], (0..1, 0..1))?;
        }

        let mut req = request(dir.path(), domain);
        req.like = Some(like);
        req.percent = 0.05;
        let outcome = sample_grid_ids(&req)?;
        assert_eq!(outcome.selected.len(), 5);

        assert_eq!(
            global_text(&outcome.path, "title").as_deref(),
            Some("TN demo | Random selection of 5/100 gridIDs (5.000%) from domain.lnd.test.nc")
        );
        assert_eq!(global_text(&outcome.path, "institution").as_deref(), Some("ORNL"));
        let file = netcdf::open(&outcome.path)?;
        let var = file.variable("gridID").unwrap();
        assert!(var.attribute("description").is_some());
        assert!(var.attribute("long_name").is_none());
        Ok(())
    }

    #[test]
    fn test_sample_requires_single_row_domain() -> TestResult {
        let dir = tempdir()?;
        let surf = dir.path().join("surf.nc");
        create_surfdata(&surf)?;
        let result = sample_grid_ids(&request(dir.path(), surf));
        assert!(matches!(result, Err(AoiError::Schema { .. })));
        Ok(())
    }
}

#[cfg(test)]
mod info_tests {
    use super::*;

    #[test]
    fn test_container_schema_in_file_order() -> TestResult {
        let dir = tempdir()?;
        let path = dir.path().join("forcing.nc");
        create_forcing(&path, 3, 4)?;

        let schema = get_container_schema(&path, None)?;
        let names: Vec<&str> = schema.variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["time", "gridID", "TBOT"]);
        let dims: Vec<&str> = schema.dimensions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(dims, vec!["time", "nj", "ni"]);
        assert_eq!(schema.global_attribute("title"), Some("Synthetic forcing"));
        Ok(())
    }

    #[test]
    fn test_container_schema_single_variable() -> TestResult {
        let dir = tempdir()?;
        let path = dir.path().join("forcing.nc");
        create_forcing(&path, 3, 4)?;

        let schema = get_container_schema(&path, Some("TBOT"))?;
        assert_eq!(schema.variables.len(), 1);
        assert_eq!(schema.variables[0].shape, vec![3, 1, 4]);
        assert!(get_container_schema(&path, Some("QBOT")).is_err());
        Ok(())
    }

    #[test]
    fn test_schema_serializes_to_json() -> TestResult {
        let dir = tempdir()?;
        let path = dir.path().join("forcing.nc");
        create_forcing(&path, 3, 4)?;

        let schema = get_container_schema(&path, None)?;
        let json = serde_json::to_string(&schema)?;
        let back: ContainerSchema = serde_json::from_str(&json)?;
        assert_eq!(back, schema);
        Ok(())
    }
}
