use geo::{Area, BooleanOps, Geometry, MultiPolygon, Polygon};

/// Overlay pieces smaller than this fraction of their source polygon are float noise.
pub const SLIVER_RATIO: f64 = 1e-9;

pub fn as_multi_polygon(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        Geometry::Rect(r) => Some(MultiPolygon::new(vec![r.to_polygon()])),
        _ => None,
    }
}

/// Collapses a one-part multi-polygon back into a polygon.
pub fn into_geometry(mp: MultiPolygon<f64>) -> Geometry<f64> {
    if mp.0.len() == 1 {
        let mut parts = mp.0;
        Geometry::Polygon(parts.remove(0))
    } else {
        Geometry::MultiPolygon(mp)
    }
}

pub fn union_all<'a>(polygons: impl IntoIterator<Item = &'a Polygon<f64>>) -> MultiPolygon<f64> {
    polygons
        .into_iter()
        .fold(MultiPolygon::new(Vec::new()), |acc, p| acc.union(&MultiPolygon::new(vec![p.clone()])))
}

/// Replaces every polygon by its exterior ring.
pub fn close_holes(mp: MultiPolygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(
        mp.0.into_iter()
            .map(|p| Polygon::new(p.exterior().clone(), Vec::new()))
            .collect(),
    )
}

/// Drops overlay pieces that are float noise relative to `whole_area`.
pub fn without_slivers(mp: MultiPolygon<f64>, whole_area: f64) -> MultiPolygon<f64> {
    let min_area = whole_area.abs() * SLIVER_RATIO;
    MultiPolygon::new(mp.0.into_iter().filter(|p| p.unsigned_area() > min_area).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Rect};

    fn square(x: f64, y: f64) -> Polygon<f64> {
        Rect::new((x, y), (x + 1.0, y + 1.0)).to_polygon()
    }

    #[test]
    fn union_of_adjacent_squares_is_one_polygon() {
        let merged = union_all(&[square(0.0, 0.0), square(1.0, 0.0)]);
        assert_eq!(merged.0.len(), 1);
        assert!((merged.unsigned_area() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn close_holes_keeps_only_exteriors() {
        let ring = LineString::from(vec![(0.0, 0.0), (3.0, 0.0), (3.0, 3.0), (0.0, 3.0), (0.0, 0.0)]);
        let hole = LineString::from(vec![(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 2.0), (1.0, 1.0)]);
        let donut: MultiPolygon<f64> = MultiPolygon::new(vec![Polygon::new(ring, vec![hole])]);
        assert!((donut.unsigned_area() - 8.0).abs() < 1e-12);
        let filled = close_holes(donut);
        assert!(filled.0[0].interiors().is_empty());
        assert!((filled.unsigned_area() - 9.0).abs() < 1e-12);
    }
}
