use std::fs;
use tempfile::tempdir;

use township_grid::application::{ArealizeSpec, FeatureSpec};
use township_grid::common::AttrValue;
use township_grid::domains::aggregate::{AggFunc, Fallback};
use township_grid::domains::grid::Squaring;
use township_grid::domains::join::{OverlayMode, PointMissPolicy};
use township_grid::domains::voronoi::DegenerateYearPolicy;
use township_grid::Config;

const CONFIG: &str = r#"
[grid]
source = "data/plss_sections.geojson"
squaring = "all"

[study]
years = [2016, 2017, 2018]
reference_crs = "EPSG:4326"

[output]
dir = "features"

[[datasets]]
name = "groundwater"
sources = ["data/wells_2016.geojson", "data/wells_2017.geojson"]
year_column = "MSMT_DATE"
arealize = { kind = "voronoi", on_degenerate = "containing_cell" }
point_miss = "error"
fill_default = 0
features = { kind = "numeric", columns = ["DEPTH"], func = "median", fallback = "global_mean" }

[[datasets]]
name = "soils"
sources = ["data/soils.geojson"]
static_year = 2016
overlay = "identity"
area_crs = "EPSG:3310"
min_coverage = 0.05
renormalize = true
features = { kind = "categorical", column = "TEXTURE", prefix = "SOIL_" }
propagate = { source_year = 2016, target_years = [2017, 2018] }
"#;

#[tokio::test]
async fn loads_datasets_and_policies_from_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, CONFIG).unwrap();

    let config = Config::from_file(&path).await.unwrap();
    assert_eq!(config.grid.group_key, "TOWNSHIP_RANGE");
    assert_eq!(config.grid.squaring, Squaring::All);
    assert_eq!(config.study.years, vec![2016, 2017, 2018]);
    assert_eq!(config.output.dir.to_str(), Some("features"));
    assert_eq!(config.datasets.len(), 2);

    let groundwater = &config.datasets[0];
    assert_eq!(groundwater.arealize, ArealizeSpec::Voronoi { on_degenerate: DegenerateYearPolicy::ContainingCell });
    assert_eq!(groundwater.point_miss, PointMissPolicy::Error);
    assert_eq!(groundwater.overlay, OverlayMode::Intersection);
    assert_eq!(groundwater.fill_default, AttrValue::Number(0.0));
    assert_eq!(
        groundwater.features,
        FeatureSpec::Numeric { columns: vec!["DEPTH".into()], func: AggFunc::Median, fallback: Fallback::GlobalMean }
    );

    let soils = &config.datasets[1];
    assert_eq!(soils.area_crs.map(|c| c.epsg()), Some(3310));
    assert_eq!(soils.fill_default, AttrValue::Null);
    assert_eq!(soils.propagate.as_ref().map(|p| p.target_years.clone()), Some(vec![2017, 2018]));
    assert!(soils.renormalize);
}

#[tokio::test]
async fn missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    assert!(Config::from_file(dir.path().join("absent.toml")).await.is_err());
}

#[test]
fn datasets_need_a_year_source() {
    let text = r#"
[grid]
source = "grid.geojson"

[[datasets]]
name = "wells"
sources = ["wells.geojson"]
features = { kind = "category_count", column = "TYPE" }
"#;
    let err = Config::from_toml_str(text).unwrap_err();
    assert!(err.to_string().contains("year_column"));
}

#[test]
fn unknown_crs_is_rejected() {
    let text = r#"
[grid]
source = "grid.geojson"

[study]
reference_crs = "EPSG:9999"
"#;
    assert!(Config::from_toml_str(text).is_err());
}

#[test]
fn environment_overrides_file_settings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[grid]\nsource = \"grid.geojson\"\n\n[output]\ndir = \"from-file\"\n").unwrap();

    std::env::set_var("TRGRID__OUTPUT__DIR", "from-env");
    let config = Config::load_layered(&path);
    std::env::remove_var("TRGRID__OUTPUT__DIR");

    assert_eq!(config.unwrap().output.dir.to_str(), Some("from-env"));
}
