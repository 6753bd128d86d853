mod common;

use common::*;
use geo::{Area, Contains, Geometry, Point};
use rand::{rngs::StdRng, Rng, SeedableRng};
use township_grid::common::{AttrValue, FeatureError};
use township_grid::domains::geometry::as_multi_polygon;
use township_grid::domains::voronoi::{tessellate, tessellate_by_year, DegenerateYearPolicy};

#[test]
fn fewer_than_three_sites_are_degenerate() {
    let grid = four_cell_grid();
    let points = vec![point(0.5, 0.5, 2016, &[]), point(1.5, 1.5, 2016, &[]), point(0.5, 0.5, 2016, &[])];
    let err = tessellate(&points, grid.boundary()).unwrap_err();
    assert!(matches!(err, FeatureError::GeometryDegenerate { .. }));
}

#[test]
fn regions_contain_their_site_and_keep_attributes() {
    let grid = four_cell_grid();
    let points = vec![
        point(0.5, 0.5, 2016, &[("V", AttrValue::Number(1.0))]),
        point(1.5, 0.5, 2016, &[("V", AttrValue::Number(2.0))]),
        point(1.0, 1.5, 2016, &[("V", AttrValue::Number(3.0))]),
    ];
    let regions = tessellate(&points, grid.boundary()).unwrap();
    assert_eq!(regions.len(), 3);
    for (input, region) in points.iter().zip(&regions) {
        let Geometry::Point(site) = input.geometry else { unreachable!() };
        assert!(as_multi_polygon(&region.geometry).unwrap().contains(&site));
        assert_eq!(region.attributes, input.attributes);
        assert_eq!(region.year, Some(2016));
    }
    let total: f64 = regions.iter().map(|r| r.geometry.unsigned_area()).sum();
    assert!((total - 4.0).abs() < 1e-6);
}

#[test]
fn duplicate_sites_share_a_region() {
    let grid = four_cell_grid();
    let points = vec![
        point(0.5, 0.5, 2016, &[]),
        point(0.5, 0.5, 2016, &[("DUP", AttrValue::from("yes"))]),
        point(1.5, 0.5, 2016, &[]),
        point(1.0, 1.5, 2016, &[]),
    ];
    let regions = tessellate(&points, grid.boundary()).unwrap();
    assert_eq!(regions.len(), 4);
    assert_eq!(regions[0].geometry, regions[1].geometry);
}

#[test]
fn random_sites_partition_the_boundary() {
    let grid = four_cell_grid();
    let mut rng = StdRng::seed_from_u64(7);
    let points: Vec<_> = (0..40)
        .map(|_| point(rng.gen_range(0.0..2.0), rng.gen_range(0.0..2.0), 2016, &[]))
        .collect();
    let regions = tessellate(&points, grid.boundary()).unwrap();
    assert_eq!(regions.len(), points.len());

    let total: f64 = regions.iter().map(|r| r.geometry.unsigned_area()).sum();
    assert!((total - 4.0).abs() < 1e-6, "regions cover {} instead of 4", total);

    // Any location belongs to the region of its nearest site.
    let sample = Point::new(0.3, 1.7);
    let nearest = points
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let d = |r: &township_grid::common::ObservationRecord| match r.geometry {
                Geometry::Point(p) => (p.x() - sample.x()).powi(2) + (p.y() - sample.y()).powi(2),
                _ => f64::INFINITY,
            };
            d(*a).total_cmp(&d(*b))
        })
        .map(|(i, _)| i)
        .unwrap();
    assert!(as_multi_polygon(&regions[nearest].geometry).unwrap().contains(&sample));
}

#[test]
fn degenerate_years_follow_the_policy() {
    let grid = four_cell_grid();
    let input = layer(
        "wells",
        vec![
            point(0.5, 0.5, 2016, &[]),
            point(1.5, 0.5, 2016, &[]),
            point(1.0, 1.5, 2016, &[]),
            point(0.5, 1.5, 2017, &[]),
        ],
    );

    let skipped = tessellate_by_year(input.clone(), &grid, DegenerateYearPolicy::Skip).unwrap();
    assert_eq!(skipped.skipped_years, vec![Some(2017)]);
    assert_eq!(skipped.layer.len(), 3);

    let err = tessellate_by_year(input.clone(), &grid, DegenerateYearPolicy::Error).unwrap_err();
    assert!(matches!(err, FeatureError::GeometryDegenerate { .. }));

    let by_cell = tessellate_by_year(input, &grid, DegenerateYearPolicy::ContainingCell).unwrap();
    assert_eq!(by_cell.layer.len(), 4);
    let last = by_cell.layer.records.last().unwrap();
    assert_eq!(last.year, Some(2017));
    assert!((last.geometry.unsigned_area() - 1.0).abs() < 1e-9);
}
