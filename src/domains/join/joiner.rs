use geo::{Area, BooleanOps, BoundingRect, Geometry, Intersects, MultiPolygon};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::{log_dropped, FeatureError, FeatureResult, ObservationRecord, Stage};
use crate::domains::geometry::{as_multi_polygon, into_geometry, union_all, without_slivers, Layer};
use crate::domains::grid::RegionGrid;

/// What happens to polygon area that falls outside every grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlayMode {
    /// Keep it as a record without a cell code.
    Identity,
    /// Discard it.
    #[default]
    Intersection,
}

/// What happens to a record that matches no grid cell at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PointMissPolicy {
    /// Drop it and log the count.
    #[default]
    Drop,
    /// Fail the join with a coverage error.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JoinOptions {
    #[serde(default)]
    pub overlay: OverlayMode,
    #[serde(default)]
    pub miss: PointMissPolicy,
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub layer: Layer,
    /// Records that matched no cell and were dropped.
    pub missed: usize,
    /// Records kept without a cell code (identity overlay remainders).
    pub unassigned: usize,
}

/// Keeps only what lies inside `boundary`. Polygons crossing it are cut to the
/// intersection; points on the boundary line stay.
pub fn clip_to_boundary(layer: Layer, boundary: &MultiPolygon<f64>) -> Layer {
    let clipped = clip(layer, boundary);
    clipped.log();
    clipped.layer
}

/// Clips to the grid boundary after checking that the layer shares the grid's CRS.
/// A point outside the boundary lies outside every cell, so it counts as a join miss
/// under `miss`.
pub fn clip_to_grid(layer: Layer, grid: &RegionGrid, miss: PointMissPolicy) -> FeatureResult<Layer> {
    layer.ensure_crs(&grid.crs())?;
    let clipped = clip(layer, grid.boundary());
    if clipped.points_outside > 0 && miss == PointMissPolicy::Error {
        return Err(FeatureError::JoinCoverage { unmatched: clipped.points_outside });
    }
    clipped.log();
    Ok(clipped.layer)
}

struct Clipped {
    layer: Layer,
    total: usize,
    points_outside: usize,
    shapes_outside: usize,
}

impl Clipped {
    fn log(&self) {
        log_dropped(Stage::Clip, "a point outside the region boundary", self.points_outside, self.total);
        log_dropped(Stage::Clip, "geometry outside the region boundary", self.shapes_outside, self.total);
    }
}

fn clip(layer: Layer, boundary: &MultiPolygon<f64>) -> Clipped {
    let total = layer.len();
    let mut records = Vec::with_capacity(total);
    let mut points_outside = 0usize;
    let mut shapes_outside = 0usize;
    for record in &layer.records {
        match &record.geometry {
            Geometry::Point(p) => {
                if boundary.intersects(p) {
                    records.push(record.clone());
                } else {
                    points_outside += 1;
                }
            }
            geometry => {
                let Some(mp) = as_multi_polygon(geometry) else {
                    shapes_outside += 1;
                    continue;
                };
                let whole = mp.unsigned_area();
                let clipped = without_slivers(boundary.intersection(&mp), whole);
                if clipped.0.is_empty() {
                    shapes_outside += 1;
                } else {
                    records.push(record.with_geometry(into_geometry(clipped)));
                }
            }
        }
    }
    debug!(kept = records.len(), total, "clipped to boundary");
    Clipped { layer: layer.with_records(records), total, points_outside, shapes_outside }
}

/// Attaches cell codes. Points take the code of their containing cell; polygons are split
/// along cell boundaries into one record per (polygon, cell) piece. Each year is joined on
/// its own since locations may move between years.
pub fn assign_to_cells(layer: Layer, grid: &RegionGrid, options: &JoinOptions) -> FeatureResult<JoinOutcome> {
    layer.ensure_crs(&grid.crs())?;
    let total = layer.len();
    let template = layer.with_records(Vec::new());

    let mut out = Vec::with_capacity(total);
    let mut missed = 0usize;
    let mut unmatched = 0usize;
    let mut unassigned = 0usize;
    let mut polygons = 0usize;
    let mut degenerate = 0usize;

    for (year, records) in layer.partition_by_year() {
        let before = out.len();
        for record in records {
            match &record.geometry {
                Geometry::Point(p) => match grid.cell_for_point(p) {
                    Some(cell) => {
                        let mut joined = record.clone();
                        joined.cell = Some(cell.code.clone());
                        out.push(joined);
                    }
                    None => {
                        missed += 1;
                        unmatched += 1;
                    }
                },
                geometry => {
                    let Some(mp) = as_multi_polygon(geometry) else {
                        missed += 1;
                        unmatched += 1;
                        continue;
                    };
                    polygons += 1;
                    match overlay(&record, &mp, grid, options.overlay) {
                        Overlay::Degenerate => degenerate += 1,
                        Overlay::Pieces { pieces, remainder } => {
                            let matched = !pieces.is_empty();
                            if !matched {
                                unmatched += 1;
                                if remainder.is_none() {
                                    missed += 1;
                                }
                            }
                            out.extend(pieces);
                            if let Some(rest) = remainder {
                                unassigned += 1;
                                out.push(rest);
                            }
                        }
                    }
                }
            }
        }
        debug!(?year, records = out.len() - before, "year joined to grid");
    }

    if polygons > 0 && degenerate == polygons {
        return Err(FeatureError::degenerate(format!(
            "all {} polygons of `{}` have zero area",
            polygons, template.name
        )));
    }
    if unmatched > 0 && options.miss == PointMissPolicy::Error {
        return Err(FeatureError::JoinCoverage { unmatched });
    }
    log_dropped(Stage::Assign, "zero-area polygons", degenerate, total);
    log_dropped(Stage::Assign, "no containing grid cell", missed, total);

    Ok(JoinOutcome { layer: template.with_records(out), missed, unassigned })
}

enum Overlay {
    Degenerate,
    Pieces {
        pieces: Vec<ObservationRecord>,
        remainder: Option<ObservationRecord>,
    },
}

fn overlay(record: &ObservationRecord, mp: &MultiPolygon<f64>, grid: &RegionGrid, mode: OverlayMode) -> Overlay {
    let whole = mp.unsigned_area();
    let Some(rect) = mp.bounding_rect().filter(|_| whole > 0.0) else {
        return Overlay::Degenerate;
    };

    let mut pieces = Vec::new();
    let mut touched = Vec::new();
    for cell in grid.cells_intersecting(&rect) {
        let piece = without_slivers(mp.intersection(&MultiPolygon::new(vec![cell.polygon.clone()])), whole);
        if piece.0.is_empty() {
            continue;
        }
        let mut split = record.with_geometry(into_geometry(piece));
        split.cell = Some(cell.code.clone());
        pieces.push(split);
        touched.push(&cell.polygon);
    }

    let remainder = match mode {
        OverlayMode::Intersection => None,
        OverlayMode::Identity => {
            let covered = union_all(touched.iter().copied());
            let rest = without_slivers(mp.difference(&covered), whole);
            (!rest.0.is_empty()).then(|| {
                let mut outside = record.with_geometry(into_geometry(rest));
                outside.cell = None;
                outside
            })
        }
    };
    Overlay::Pieces { pieces, remainder }
}
