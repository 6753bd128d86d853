#![allow(dead_code)]

use geo::{Geometry, Point, Polygon, Rect};
use std::collections::BTreeMap;

use township_grid::common::{AttrValue, Attributes, ObservationRecord};
use township_grid::domains::geometry::{Crs, Layer};
use township_grid::domains::grid::{GridCell, RegionGrid};

pub fn square(x: f64, y: f64, size: f64) -> Polygon<f64> {
    Rect::new((x, y), (x + size, y + size)).to_polygon()
}

pub fn attrs(pairs: &[(&str, AttrValue)]) -> Attributes {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<BTreeMap<_, _>>()
}

pub fn point(x: f64, y: f64, year: i32, pairs: &[(&str, AttrValue)]) -> ObservationRecord {
    ObservationRecord::new(Geometry::Point(Point::new(x, y)), attrs(pairs)).with_year(year)
}

pub fn polygon(poly: Polygon<f64>, year: i32, pairs: &[(&str, AttrValue)]) -> ObservationRecord {
    ObservationRecord::new(Geometry::Polygon(poly), attrs(pairs)).with_year(year)
}

/// 2x2 grid of unit cells: A1 A2 on the bottom row, B1 B2 on top.
pub fn four_cell_grid() -> RegionGrid {
    let cells = vec![
        GridCell::new("A1", square(0.0, 0.0, 1.0)),
        GridCell::new("A2", square(1.0, 0.0, 1.0)),
        GridCell::new("B1", square(0.0, 1.0, 1.0)),
        GridCell::new("B2", square(1.0, 1.0, 1.0)),
    ];
    RegionGrid::from_cells(Crs::wgs84(), cells).unwrap()
}

pub fn layer(name: &str, records: Vec<ObservationRecord>) -> Layer {
    Layer::new(name, Crs::wgs84(), records)
}

pub fn codes(records: &[ObservationRecord]) -> Vec<Option<String>> {
    records.iter().map(|r| r.cell.clone()).collect()
}
