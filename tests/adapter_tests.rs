mod common;

use common::*;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

use township_grid::adapters::inbound::{CsvTableSource, GeoJsonSource, MemorySource};
use township_grid::adapters::outbound::{CsvFeatureSink, GeoJsonGridWriter};
use township_grid::common::{AttrValue, FeatureError, FeatureRecord};
use township_grid::domains::geometry::{attach_attributes, Crs, GeometryStore, JoinKeys, JoinType};
use township_grid::domains::output::to_table;
use township_grid::domains::ports::{AttributeTableSource, FeatureSink, GeometrySource};

const WELLS: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        { "type": "Feature", "properties": {"WELL": "w1", "DEPTH": 12.5}, "geometry": { "type": "Point", "coordinates": [0.5, 0.5] } },
        { "type": "Feature", "properties": {"WELL": "w2", "DEPTH": null}, "geometry": { "type": "MultiPoint", "coordinates": [[1.5, 0.5], [1.5, 1.5]] } },
        { "type": "Feature", "properties": {"WELL": "w3"}, "geometry": null },
        { "type": "Feature", "properties": {"WELL": "w4"}, "geometry": { "type": "LineString", "coordinates": [[0, 0], [1, 1]] } }
    ]
}"#;

#[test]
fn geojson_source_reads_features_and_counts_missing_geometry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wells.geojson");
    fs::write(&path, WELLS).unwrap();

    let read = GeoJsonSource::new().read_layer(&path).unwrap();
    assert_eq!(read.layer.name, "wells");
    assert_eq!(read.layer.crs, Crs::wgs84());
    assert_eq!(read.layer.len(), 3);
    assert_eq!(read.dropped, 1);
    assert_eq!(read.layer.records[0].attr("DEPTH"), &AttrValue::Number(12.5));
}

#[test]
fn store_explodes_multi_points_and_drops_unusable_geometry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wells.geojson");
    fs::write(&path, WELLS).unwrap();

    let store = GeometryStore::new(Arc::new(GeoJsonSource::new()));
    let loaded = store.load("wells", &[&path]).unwrap();
    assert_eq!(loaded.read, 4);
    assert_eq!(loaded.dropped, 2);
    assert_eq!(loaded.layer.len(), 3);
    assert!(loaded.layer.records.iter().all(|r| r.attributes.contains_key("DEPTH")));
}

#[test]
fn legacy_crs_member_is_honoured() {
    let text = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::3310" } },
        "features": [
            { "type": "Feature", "properties": {}, "geometry": { "type": "Point", "coordinates": [0.0, -4000000.0] } }
        ]
    }"#;
    let read = GeoJsonSource::new().parse_str("ca.geojson", text).unwrap();
    assert_eq!(read.layer.crs.epsg(), 3310);
}

#[test]
fn malformed_geojson_is_a_format_error() {
    let err = GeoJsonSource::new().parse_str("broken.geojson", "{ not json").unwrap_err();
    assert!(matches!(err, FeatureError::Format { ref origin, .. } if origin == "broken.geojson"));
}

#[test]
fn sources_without_shared_columns_do_not_concatenate() {
    let source = MemorySource::new()
        .with_layer("a", layer("a", vec![point(0.5, 0.5, 2016, &[("X", AttrValue::Number(1.0))])]))
        .with_layer("b", layer("b", vec![point(0.5, 0.5, 2016, &[("Y", AttrValue::Number(1.0))])]))
        .with_layer("c", layer("c", vec![point(0.5, 0.5, 2016, &[("X", AttrValue::from("one"))])]));
    let store = GeometryStore::new(Arc::new(source));

    let disjoint = store.load("ab", &["a", "b"]).unwrap_err();
    assert!(matches!(disjoint, FeatureError::SchemaMismatch { .. }));
    let conflicting = store.load("ac", &["a", "c"]).unwrap_err();
    assert!(matches!(conflicting, FeatureError::SchemaMismatch { .. }));
}

#[test]
fn store_reprojects_onto_the_reference_system() {
    let utm = Crs::from_epsg(32611).unwrap();
    let projected = township_grid::domains::geometry::reproject(
        &geo::Geometry::Point(geo::Point::new(-117.0, 34.0)),
        &Crs::wgs84(),
        &utm,
    )
    .unwrap();
    let record = township_grid::common::ObservationRecord::new(projected, Default::default());
    let source = MemorySource::new().with_layer("utm", township_grid::domains::geometry::Layer::new("utm", utm, vec![record]));

    let loaded = GeometryStore::new(Arc::new(source)).load("utm", &["utm"]).unwrap();
    let geo::Geometry::Point(p) = loaded.layer.records[0].geometry else { panic!("expected a point") };
    assert!((p.x() + 117.0).abs() < 1e-6);
    assert!((p.y() - 34.0).abs() < 1e-6);
}

#[test]
fn csv_tables_attach_on_normalized_labels() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("depths.csv");
    fs::write(&path, "ID;DEPTH;WELL\n10;55;primary\n11;60;backup\n").unwrap();
    let table = CsvTableSource::new().read_table(&path).unwrap();

    let wells = layer(
        "wells",
        vec![
            point(0.5, 0.5, 2016, &[("ID", AttrValue::Number(10.0)), ("WELL", AttrValue::from("w1"))]),
            point(1.5, 0.5, 2016, &[("ID", AttrValue::Number(99.0)), ("WELL", AttrValue::from("w2"))]),
        ],
    );
    let keys = JoinKeys { left: "ID".into(), right: "ID".into() };

    let left = attach_attributes(wells.clone(), &table, &keys, JoinType::Left).unwrap();
    assert_eq!(left.len(), 2);
    assert_eq!(left.records[0].attr("DEPTH"), &AttrValue::Number(55.0));
    assert_eq!(left.records[0].attr("WELL_right"), &AttrValue::from("primary"));
    assert!(left.records[1].attr("DEPTH").is_null());

    let inner = attach_attributes(wells, &table, &keys, JoinType::Inner).unwrap();
    assert_eq!(inner.len(), 1);
}

#[test]
fn csv_sink_writes_keys_then_features() {
    let dir = tempdir().unwrap();
    let records = vec![
        FeatureRecord::new("A2", 2016).with_feature("DEPTH", 12.5),
        FeatureRecord::new("A1", 2016).with_feature("DEPTH", AttrValue::Null),
    ];
    let table = to_table(records, &[] as &[&str], None).table;
    let written = CsvFeatureSink::new(dir.path().join("out")).write_table("wells", &table).unwrap();

    let text = fs::read_to_string(written).unwrap();
    assert_eq!(text, "TOWNSHIP_RANGE,YEAR,DEPTH\nA1,2016,\nA2,2016,12.5\n");
}

#[test]
fn grid_export_round_trips_through_geojson() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("grid.geojson");
    GeoJsonGridWriter::write(&four_cell_grid().to_layer("grid"), &path).unwrap();

    let read = GeoJsonSource::new().read_layer(&path).unwrap();
    assert_eq!(read.layer.len(), 4);
    assert_eq!(read.layer.records[3].attr("TOWNSHIP_RANGE"), &AttrValue::from("B2"));
}
