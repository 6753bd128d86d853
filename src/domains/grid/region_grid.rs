use geo::{Area, BoundingRect, ConvexHull, Geometry, Intersects, MultiPolygon, Point, Polygon, Rect};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use crate::common::{log_dropped, AttrValue, Attributes, FeatureError, FeatureResult, ObservationRecord, Stage, CELL_COLUMN};
use crate::domains::geometry::{as_multi_polygon, close_holes, union_all, Crs, Layer};

type CellEntry = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// How dissolved survey groups are simplified into cell shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Squaring {
    /// Only multi-part groups are replaced by their bounding rectangle.
    #[default]
    MultiPartOnly,
    /// Every group is replaced by its bounding rectangle.
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub code: String,
    pub polygon: Polygon<f64>,
    pub area: f64,
}

impl GridCell {
    pub fn new(code: impl Into<String>, polygon: Polygon<f64>) -> Self {
        let area = polygon.unsigned_area();
        Self { code: code.into(), polygon, area }
    }
}

/// The fixed administrative grid of a study region: cells sorted by code, the hole-free
/// region boundary and an R-tree over cell envelopes. Immutable once built.
pub struct RegionGrid {
    crs: Crs,
    cells: Vec<GridCell>,
    boundary: MultiPolygon<f64>,
    index: RTree<CellEntry>,
}

impl fmt::Debug for RegionGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionGrid")
            .field("crs", &self.crs)
            .field("cells", &self.cells.len())
            .field("boundary_parts", &self.boundary.0.len())
            .finish()
    }
}

impl RegionGrid {
    /// Dissolves survey polygons by `group_key` into one cell per group.
    ///
    /// Groups that dissolve into several parts are squared: the convex hull of all their
    /// vertices is replaced by its axis-aligned bounding rectangle. The region boundary is
    /// the union of the resulting cells with interior holes closed.
    pub fn build_from_survey(survey: &Layer, group_key: &str, squaring: Squaring) -> FeatureResult<RegionGrid> {
        let mut groups: BTreeMap<String, Vec<Polygon<f64>>> = BTreeMap::new();
        let mut skipped = 0usize;
        for record in &survey.records {
            let label = record.attr(group_key).label();
            match (label, as_multi_polygon(&record.geometry)) {
                (Some(code), Some(mp)) => groups.entry(code).or_default().extend(mp.0),
                _ => skipped += 1,
            }
        }
        log_dropped(Stage::Load, format!("no `{}` label or no polygon", group_key).as_str(), skipped, survey.len());

        if groups.is_empty() {
            return Err(FeatureError::schema(format!(
                "survey `{}` has no polygons labelled by `{}`",
                survey.name, group_key
            )));
        }

        let mut cells = Vec::with_capacity(groups.len());
        for (code, polygons) in groups {
            let dissolved = union_all(&polygons);
            let polygon = match dissolved.0.len() {
                0 => {
                    debug!(cell = %code, "group dissolved to nothing");
                    continue;
                }
                1 if squaring == Squaring::MultiPartOnly => {
                    let mut parts = dissolved.0;
                    parts.remove(0)
                }
                _ => match square(&dissolved) {
                    Some(p) => p,
                    None => continue,
                },
            };
            cells.push(GridCell::new(code, polygon));
        }

        let grid = RegionGrid::from_cells(survey.crs, cells)?;
        info!(cells = grid.cells.len(), "region grid built");
        Ok(grid)
    }

    /// Assembles a grid from prepared cells. Codes must be unique.
    pub fn from_cells(crs: Crs, mut cells: Vec<GridCell>) -> FeatureResult<RegionGrid> {
        if cells.is_empty() {
            return Err(FeatureError::schema("a region grid needs at least one cell"));
        }
        cells.sort_by(|a, b| a.code.cmp(&b.code));
        if let Some(pair) = cells.windows(2).find(|w| w[0].code == w[1].code) {
            return Err(FeatureError::schema(format!("duplicate cell code `{}`", pair[0].code)));
        }

        let boundary = close_holes(union_all(cells.iter().map(|c| &c.polygon)));
        let entries = cells
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| {
                cell.polygon
                    .bounding_rect()
                    .map(|r| CellEntry::new(Rectangle::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y]), i))
            })
            .collect();
        Ok(RegionGrid { crs, cells, boundary, index: RTree::bulk_load(entries) })
    }

    pub fn crs(&self) -> Crs {
        self.crs
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn codes(&self) -> Vec<String> {
        self.cells.iter().map(|c| c.code.clone()).collect()
    }

    pub fn cell(&self, code: &str) -> Option<&GridCell> {
        self.cells
            .binary_search_by(|c| c.code.as_str().cmp(code))
            .ok()
            .map(|i| &self.cells[i])
    }

    pub fn boundary(&self) -> &MultiPolygon<f64> {
        &self.boundary
    }

    /// Every cell containing `point`, boundary included, in code order. A point on a shared
    /// edge is contained by each neighbour.
    pub fn cells_containing(&self, point: &Point<f64>) -> Vec<&GridCell> {
        let mut hits: Vec<usize> = self
            .index
            .locate_in_envelope_intersecting(&AABB::from_point([point.x(), point.y()]))
            .map(|entry| entry.data)
            .filter(|&i| self.cells[i].polygon.intersects(point))
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|i| &self.cells[i]).collect()
    }

    /// The cell a point is assigned to. On shared edges the lowest code wins.
    pub fn cell_for_point(&self, point: &Point<f64>) -> Option<&GridCell> {
        self.cells_containing(point).into_iter().next()
    }

    /// Cells whose envelope intersects `rect`, in code order.
    pub fn cells_intersecting(&self, rect: &Rect<f64>) -> Vec<&GridCell> {
        let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        let mut hits: Vec<usize> = self
            .index
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.data)
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|i| &self.cells[i]).collect()
    }

    /// Exports the grid as a layer, one record per cell.
    pub fn to_layer(&self, name: &str) -> Layer {
        let records = self
            .cells
            .iter()
            .map(|cell| {
                let mut attributes = Attributes::new();
                attributes.insert(CELL_COLUMN.to_string(), AttrValue::Text(cell.code.clone()));
                attributes.insert("AREA".to_string(), AttrValue::Number(cell.area));
                ObservationRecord {
                    geometry: Geometry::Polygon(cell.polygon.clone()),
                    year: None,
                    cell: Some(cell.code.clone()),
                    attributes,
                }
            })
            .collect();
        Layer::new(name, self.crs, records)
    }
}

fn square(shape: &MultiPolygon<f64>) -> Option<Polygon<f64>> {
    let hull = shape.convex_hull();
    hull.bounding_rect().map(|r| r.to_polygon())
}
