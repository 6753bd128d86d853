mod common;

use common::*;
use geo::{Area, Geometry, MultiPolygon};
use township_grid::common::{AttrValue, FeatureError};
use township_grid::domains::geometry::Crs;
use township_grid::domains::join::{
    assign_to_cells, clip_to_boundary, clip_to_grid, JoinOptions, OverlayMode, PointMissPolicy,
};

fn area_of(geometry: &Geometry<f64>) -> f64 {
    geometry.unsigned_area()
}

#[test]
fn clip_cuts_straddling_polygons_and_keeps_boundary_points() {
    let grid = four_cell_grid();
    let input = layer(
        "mixed",
        vec![
            polygon(square(1.5, 1.5, 1.0), 2016, &[]),
            polygon(square(5.0, 5.0, 1.0), 2016, &[]),
            point(2.0, 1.0, 2016, &[]),
            point(2.5, 1.0, 2016, &[]),
        ],
    );
    let clipped = clip_to_boundary(input, grid.boundary());
    assert_eq!(clipped.len(), 2);
    assert!((area_of(&clipped.records[0].geometry) - 0.25).abs() < 1e-9);
    assert!(matches!(clipped.records[1].geometry, Geometry::Point(_)));
}

#[test]
fn clipping_is_idempotent() {
    let grid = four_cell_grid();
    let input = layer("p", vec![polygon(square(1.5, -0.5, 1.0), 2016, &[]), point(0.5, 0.5, 2016, &[])]);
    let once = clip_to_boundary(input, grid.boundary());
    let twice = clip_to_boundary(once.clone(), grid.boundary());
    assert_eq!(once.len(), twice.len());
    for (a, b) in once.records.iter().zip(&twice.records) {
        assert!((area_of(&a.geometry) - area_of(&b.geometry)).abs() < 1e-9);
    }
}

#[test]
fn mismatched_crs_fails_before_clipping() {
    let grid = four_cell_grid();
    let input = township_grid::domains::geometry::Layer::new("utm", Crs::from_epsg(32611).unwrap(), vec![]);
    assert!(matches!(clip_to_grid(input, &grid, PointMissPolicy::Drop), Err(FeatureError::Projection { .. })));
}

#[test]
fn points_outside_the_grid_honour_the_miss_policy_when_clipping() {
    let grid = four_cell_grid();
    let input = layer("wells", vec![point(0.5, 0.5, 2016, &[]), point(9.0, 9.0, 2016, &[])]);

    let kept = clip_to_grid(input.clone(), &grid, PointMissPolicy::Drop).unwrap();
    assert_eq!(kept.len(), 1);

    let err = clip_to_grid(input, &grid, PointMissPolicy::Error).unwrap_err();
    assert!(matches!(err, FeatureError::JoinCoverage { unmatched: 1 }));
}

#[test]
fn points_take_their_cell_and_misses_are_dropped() {
    let grid = four_cell_grid();
    let input = layer(
        "wells",
        vec![point(0.5, 0.5, 2016, &[]), point(1.5, 1.5, 2017, &[]), point(9.0, 9.0, 2016, &[])],
    );
    let outcome = assign_to_cells(input, &grid, &JoinOptions::default()).unwrap();
    assert_eq!(outcome.missed, 1);
    assert_eq!(codes(&outcome.layer.records), vec![Some("A1".to_string()), Some("B2".to_string())]);
}

#[test]
fn strict_point_policy_reports_coverage() {
    let grid = four_cell_grid();
    let input = layer("wells", vec![point(0.5, 0.5, 2016, &[]), point(9.0, 9.0, 2016, &[])]);
    let options = JoinOptions { miss: PointMissPolicy::Error, ..JoinOptions::default() };
    match assign_to_cells(input, &grid, &options) {
        Err(FeatureError::JoinCoverage { unmatched }) => assert_eq!(unmatched, 1),
        other => panic!("expected a coverage error, got {:?}", other.map(|o| o.layer.len())),
    }
}

#[test]
fn polygons_split_along_cell_boundaries() {
    let grid = four_cell_grid();
    let crop = AttrValue::from("corn");
    let input = layer("crops", vec![polygon(square(0.5, 0.5, 1.0), 2016, &[("CROP", crop.clone())])]);
    let outcome = assign_to_cells(input, &grid, &JoinOptions::default()).unwrap();

    let records = &outcome.layer.records;
    assert_eq!(records.len(), 4);
    for record in records {
        assert!((area_of(&record.geometry) - 0.25).abs() < 1e-9);
        assert_eq!(record.attr("CROP"), &crop);
    }
    let total: f64 = records.iter().map(|r| area_of(&r.geometry)).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn identity_overlay_keeps_the_outside_remainder() {
    let grid = four_cell_grid();
    let input = layer("crops", vec![polygon(square(1.5, 1.5, 1.0), 2016, &[])]);

    let intersection = assign_to_cells(input.clone(), &grid, &JoinOptions::default()).unwrap();
    assert_eq!(intersection.layer.len(), 1);
    assert_eq!(intersection.unassigned, 0);

    let options = JoinOptions { overlay: OverlayMode::Identity, ..JoinOptions::default() };
    let identity = assign_to_cells(input, &grid, &options).unwrap();
    assert_eq!(identity.unassigned, 1);
    let remainder = identity.layer.records.iter().find(|r| r.cell.is_none()).unwrap();
    assert!((area_of(&remainder.geometry) - 0.75).abs() < 1e-9);
}

#[test]
fn zero_area_polygons_are_degenerate() {
    let grid = four_cell_grid();
    let flat = geo::Polygon::new(vec![(0.1, 0.1), (0.9, 0.1), (0.5, 0.1), (0.1, 0.1)].into(), vec![]);
    let input = layer("flat", vec![polygon(flat, 2016, &[])]);
    let err = assign_to_cells(input, &grid, &JoinOptions::default()).unwrap_err();
    assert!(matches!(err, FeatureError::GeometryDegenerate { .. }));
}

#[test]
fn multi_polygons_join_piecewise() {
    let grid = four_cell_grid();
    let parts = MultiPolygon::new(vec![square(0.25, 0.25, 0.5), square(1.25, 1.25, 0.5)]);
    let record = township_grid::common::ObservationRecord::new(Geometry::MultiPolygon(parts), Default::default())
        .with_year(2018);
    let outcome = assign_to_cells(layer("m", vec![record]), &grid, &JoinOptions::default()).unwrap();
    assert_eq!(codes(&outcome.layer.records), vec![Some("A1".to_string()), Some("B2".to_string())]);
}
