use geo::{Area, BooleanOps, BoundingRect, Centroid, Contains, Coord, Geometry, LineString, MultiPolygon, Point, Polygon, Rect};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn, Span};

use crate::common::{log_dropped, FeatureError, FeatureResult, ObservationRecord, Stage};
use crate::domains::geometry::{into_geometry, without_slivers, Layer};
use crate::domains::grid::RegionGrid;

type Site = GeomWithData<[f64; 2], usize>;

/// Minimum number of distinct sites a year needs to be tessellated.
pub const MIN_SITES: usize = 3;

/// What to do with a year that has fewer than [`MIN_SITES`] distinct points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateYearPolicy {
    /// Leave the year out.
    #[default]
    Skip,
    /// Fail the run.
    Error,
    /// Give each point the polygon of the grid cell containing it.
    ContainingCell,
}

#[derive(Debug, Clone)]
pub struct TessellationOutcome {
    pub layer: Layer,
    pub skipped_years: Vec<Option<i32>>,
}

/// Voronoi tessellation of one year's points, bounded by `boundary`.
///
/// Every input record comes back with the clipped region of its site as geometry. Records
/// sharing a location share a region. Fails with a degenerate-geometry error when fewer
/// than three distinct sites are given.
pub fn tessellate(points: &[ObservationRecord], boundary: &MultiPolygon<f64>) -> FeatureResult<Vec<ObservationRecord>> {
    let mut site_ids: BTreeMap<(OrderedFloat<f64>, OrderedFloat<f64>), usize> = BTreeMap::new();
    let mut sites: Vec<Coord<f64>> = Vec::new();
    let mut site_of_record = Vec::with_capacity(points.len());
    for record in points {
        let Geometry::Point(p) = &record.geometry else {
            return Err(FeatureError::schema("tessellation needs point geometry"));
        };
        let key = (OrderedFloat(p.x()), OrderedFloat(p.y()));
        let id = *site_ids.entry(key).or_insert_with(|| {
            sites.push(p.0);
            sites.len() - 1
        });
        site_of_record.push(id);
    }
    if sites.len() < MIN_SITES {
        return Err(FeatureError::degenerate(format!(
            "{} distinct point(s), tessellation needs at least {}",
            sites.len(),
            MIN_SITES
        )));
    }

    let envelope = envelope(boundary, &sites)?;
    let index: RTree<Site> = RTree::bulk_load(sites.iter().enumerate().map(|(i, c)| Site::new([c.x, c.y], i)).collect());

    let diagram: Vec<Polygon<f64>> = (0..sites.len())
        .map(|i| voronoi_region(i, &sites, &index, &envelope))
        .collect();

    // Region order is not trusted: every region is matched back to the site it contains.
    let mut regions: Vec<Option<MultiPolygon<f64>>> = vec![None; sites.len()];
    for region in diagram {
        let Some(site) = generating_site(&region, &sites, &index) else {
            continue;
        };
        if regions[site].is_some() {
            warn!(site, "two Voronoi regions matched the same site");
            continue;
        }
        let whole = region.unsigned_area();
        let clipped = without_slivers(boundary.intersection(&MultiPolygon::new(vec![region])), whole);
        regions[site] = (!clipped.0.is_empty()).then_some(clipped);
    }

    let mut out = Vec::with_capacity(points.len());
    let mut outside = 0usize;
    for (record, &site) in points.iter().zip(&site_of_record) {
        match &regions[site] {
            Some(region) => out.push(record.with_geometry(into_geometry(region.clone()))),
            None => outside += 1,
        }
    }
    log_dropped(Stage::Tessellate, "a Voronoi region outside the boundary", outside, points.len());
    Ok(out)
}

/// Tessellates every year of a point layer on its own, in parallel, and concatenates the
/// years in ascending order.
pub fn tessellate_by_year(layer: Layer, grid: &RegionGrid, policy: DegenerateYearPolicy) -> FeatureResult<TessellationOutcome> {
    layer.ensure_crs(&grid.crs())?;
    let template = layer.with_records(Vec::new());
    let years: Vec<(Option<i32>, Vec<ObservationRecord>)> = layer.partition_by_year().into_iter().collect();

    // Rayon workers do not inherit the caller's span.
    let span = Span::current();
    let results = years
        .into_par_iter()
        .map(|(year, points)| {
            let _entered = span.enter();
            tessellate_year(year, points, grid, policy)
        })
        .collect::<FeatureResult<Vec<_>>>()?;

    let mut records = Vec::new();
    let mut skipped_years = Vec::new();
    for (year, regions, skipped) in results {
        if skipped {
            skipped_years.push(year);
        }
        records.extend(regions);
    }
    Ok(TessellationOutcome { layer: template.with_records(records), skipped_years })
}

fn tessellate_year(
    year: Option<i32>,
    points: Vec<ObservationRecord>,
    grid: &RegionGrid,
    policy: DegenerateYearPolicy,
) -> FeatureResult<(Option<i32>, Vec<ObservationRecord>, bool)> {
    match tessellate(&points, grid.boundary()) {
        Ok(regions) => Ok((year, regions, false)),
        Err(FeatureError::GeometryDegenerate { reason }) => match policy {
            DegenerateYearPolicy::Error => Err(FeatureError::degenerate(format!("year {:?}: {}", year, reason))),
            DegenerateYearPolicy::Skip => {
                warn!(?year, %reason, "year skipped");
                Ok((year, Vec::new(), true))
            }
            DegenerateYearPolicy::ContainingCell => {
                debug!(?year, %reason, "year arealized by containing cell");
                Ok((year, arealize_by_cell(&points, grid), false))
            }
        },
        Err(other) => Err(other),
    }
}

/// Replaces each point with the polygon of the grid cell containing it.
pub fn arealize_by_cell(points: &[ObservationRecord], grid: &RegionGrid) -> Vec<ObservationRecord> {
    let mut missed = 0usize;
    let out: Vec<ObservationRecord> = points
        .iter()
        .filter_map(|record| {
            let cell = match &record.geometry {
                Geometry::Point(p) => grid.cell_for_point(p),
                _ => None,
            };
            if cell.is_none() {
                missed += 1;
            }
            cell.map(|c| record.with_geometry(Geometry::Polygon(c.polygon.clone())))
        })
        .collect();
    log_dropped(Stage::Tessellate, "no containing grid cell", missed, points.len());
    out
}

/// Bounding box of the boundary and all sites, padded so every region is closed.
fn envelope(boundary: &MultiPolygon<f64>, sites: &[Coord<f64>]) -> FeatureResult<Rect<f64>> {
    let bounds = boundary
        .bounding_rect()
        .ok_or_else(|| FeatureError::degenerate("tessellation boundary is empty"))?;
    let (mut min, mut max) = (bounds.min(), bounds.max());
    for c in sites {
        min.x = min.x.min(c.x);
        min.y = min.y.min(c.y);
        max.x = max.x.max(c.x);
        max.y = max.y.max(c.y);
    }
    let span = (max.x - min.x).max(max.y - min.y);
    let pad = if span > 0.0 { span * 0.1 } else { 1.0 };
    Ok(Rect::new(
        Coord { x: min.x - pad, y: min.y - pad },
        Coord { x: max.x + pad, y: max.y + pad },
    ))
}

/// Region of site `i`: the envelope cut by the bisector half-plane of each neighbour,
/// nearest first, until no farther site can reach the region.
fn voronoi_region(i: usize, sites: &[Coord<f64>], index: &RTree<Site>, envelope: &Rect<f64>) -> Polygon<f64> {
    let site = sites[i];
    let mut ring: Vec<Coord<f64>> = envelope.to_polygon().exterior().coords().copied().collect();
    ring.pop();

    for neighbour in index.nearest_neighbor_iter(&[site.x, site.y]) {
        let j = neighbour.data;
        if j == i {
            continue;
        }
        let other = sites[j];
        let reach = ring.iter().map(|c| dist2(*c, site)).fold(0.0, f64::max);
        if dist2(other, site) > 4.0 * reach {
            break;
        }
        ring = clip_half_plane(&ring, site, other);
        if ring.len() < 3 {
            break;
        }
    }
    Polygon::new(LineString::from(ring), Vec::new())
}

/// Keeps the side of the perpendicular bisector of `site`–`other` that contains `site`.
fn clip_half_plane(ring: &[Coord<f64>], site: Coord<f64>, other: Coord<f64>) -> Vec<Coord<f64>> {
    let normal = other - site;
    let mid = (site + other) / 2.0;
    let side = |c: Coord<f64>| (c.x - mid.x) * normal.x + (c.y - mid.y) * normal.y;

    let mut out: Vec<Coord<f64>> = Vec::with_capacity(ring.len() + 1);
    for k in 0..ring.len() {
        let a = ring[k];
        let b = ring[(k + 1) % ring.len()];
        let (sa, sb) = (side(a), side(b));
        if sa <= 0.0 {
            push_distinct(&mut out, a);
        }
        if (sa <= 0.0) != (sb <= 0.0) {
            let t = sa / (sa - sb);
            push_distinct(&mut out, a + (b - a) * t);
        }
    }
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

fn push_distinct(out: &mut Vec<Coord<f64>>, c: Coord<f64>) {
    if out.last() != Some(&c) {
        out.push(c);
    }
}

fn dist2(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let d = a - b;
    d.x * d.x + d.y * d.y
}

/// Spatial join of a region to its site: the site inside the region, or failing that the
/// site nearest to the region's centroid.
fn generating_site(region: &Polygon<f64>, sites: &[Coord<f64>], index: &RTree<Site>) -> Option<usize> {
    let rect = region.bounding_rect()?;
    let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
    let mut inside: Vec<usize> = index
        .locate_in_envelope(&envelope)
        .map(|s| s.data)
        .filter(|&i| region.contains(&Point::from(sites[i])))
        .collect();
    inside.sort_unstable();
    if let Some(&first) = inside.first() {
        return Some(first);
    }
    let centroid = region.centroid()?;
    index.nearest_neighbor(&[centroid.x(), centroid.y()]).map(|s| s.data)
}
