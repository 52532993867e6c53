use geo::{polygon, Area, BooleanOps, MultiPolygon};
use ndarray::Array2;
use std::collections::BTreeMap;
use tidegates::types::{DemRaster, Feature, FeatureLayer, FieldValue, GeoTransform};
use tidegates::{FloodError, FloodMapper};

/// Identity-ish transform: one world unit per cell, y growing with row
fn unit_transform() -> GeoTransform {
    GeoTransform {
        top_left_x: 0.0,
        pixel_width: 1.0,
        rotation_x: 0.0,
        top_left_y: 0.0,
        rotation_y: 0.0,
        pixel_height: 1.0,
    }
}

/// 5x5 DEM with elevations rising row-major from 0 to 10 m
fn ramp_dem() -> DemRaster {
    let data = Array2::from_shape_fn((5, 5), |(r, c)| (r * 5 + c) as f32 * (10.0 / 24.0));
    DemRaster {
        data,
        transform: unit_transform(),
        nodata: -999.0,
        epsg: None,
    }
}

fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
    MultiPolygon(vec![polygon![
        (x: x0, y: y0),
        (x: x1, y: y0),
        (x: x1, y: y1),
        (x: x0, y: y1),
        (x: x0, y: y0),
    ]])
}

fn zone(id: i64, geometry: MultiPolygon<f64>) -> Feature {
    let mut feature = Feature::new(geometry);
    feature
        .fields
        .insert("GeoID".to_string(), FieldValue::Integer(id));
    feature
}

fn whole_grid_zone() -> FeatureLayer {
    let mut zones = FeatureLayer::new(None);
    zones.push(zone(1, square(0.0, 0.0, 5.0, 5.0)));
    zones
}

#[test]
fn test_flooded_area_covers_exactly_the_low_cells() {
    let dem = ramp_dem();
    let zones = whole_grid_zone();
    let mapper = FloodMapper::new(&dem, &zones, "GeoID").unwrap();

    let layer = mapper.flood_extent(5.0).unwrap();
    assert_eq!(layer.len(), 1);

    // 13 of the 25 ramp values are at or below 5 m
    let record = &layer.records[0];
    assert_eq!(record.zone_id, 1);
    assert!((record.geometry.unsigned_area() - 13.0).abs() < 1e-9);
    assert_eq!(record.elevation_m, 5.0);

    // the minimum guaranteed attribute: the elevation in feet
    let elev_ft = record.fields["flood_elev"].as_real().unwrap();
    assert!((elev_ft - 5.0 / 0.3048).abs() < 1e-9);
}

#[test]
fn test_count_of_impact_end_to_end() {
    let dem = ramp_dem();
    let zones = whole_grid_zone();
    let mapper = FloodMapper::new(&dem, &zones, "GeoID").unwrap();
    let mut layer = mapper.flood_extent(5.0).unwrap();

    // three buildings, two inside the flooded cells (rows 0-1), one on dry
    // ground in the bottom row
    let mut buildings = FeatureLayer::new(None);
    for (id, geometry) in [
        (101, square(0.2, 0.2, 0.8, 0.8)),
        (102, square(1.2, 1.2, 1.8, 1.8)),
        (103, square(4.2, 4.2, 4.8, 4.8)),
    ] {
        let mut feature = Feature::new(geometry);
        feature
            .fields
            .insert("STRUCT_ID".to_string(), FieldValue::Integer(id));
        buildings.push(feature);
    }

    tidegates::count_of_impact(&mut layer, &buildings, "STRUCT_ID", "N_bldgs").unwrap();
    assert_eq!(layer.records[0].fields["N_bldgs"], FieldValue::Integer(2));
}

#[test]
fn test_flooded_area_monotonic_in_elevation() {
    let dem = ramp_dem();
    let zones = whole_grid_zone();
    let mapper = FloodMapper::new(&dem, &zones, "GeoID").unwrap();

    let mut previous: Option<MultiPolygon<f64>> = None;
    for elevation in [1.0, 3.0, 5.0, 7.0, 9.0] {
        let layer = mapper.flood_extent(elevation).unwrap();
        let geometry = layer.records[0].geometry.clone();
        if let Some(lower) = previous {
            // the lower flood must be entirely inside the higher one
            let outside = lower.difference(&geometry);
            assert!(
                outside.unsigned_area() < 1e-9,
                "flood at lower elevation escaped the higher flood"
            );
            assert!(lower.unsigned_area() <= geometry.unsigned_area() + 1e-9);
        }
        previous = Some(geometry);
    }
}

#[test]
fn test_dry_zone_produces_no_record() {
    let dem = ramp_dem();
    let mut zones = FeatureLayer::new(None);
    // left half floods at 2 m, the high-ground corner does not
    zones.push(zone(1, square(0.0, 0.0, 5.0, 2.0)));
    zones.push(zone(2, square(3.0, 4.0, 5.0, 5.0)));

    let mapper = FloodMapper::new(&dem, &zones, "GeoID").unwrap();
    let layer = mapper.flood_extent(2.0).unwrap();

    assert_eq!(layer.len(), 1);
    assert_eq!(layer.records[0].zone_id, 1);
}

#[test]
fn test_repeat_runs_are_identical() {
    let dem = ramp_dem();
    let zones = whole_grid_zone();
    let mapper = FloodMapper::new(&dem, &zones, "GeoID").unwrap();

    let first = mapper.flood_extent(4.2).unwrap();
    let second = mapper.flood_extent(4.2).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_mismatched_spatial_references_rejected() {
    let mut dem = ramp_dem();
    dem.epsg = Some(26910);
    let mut zones = whole_grid_zone();
    zones.epsg = Some(4326);

    let result = FloodMapper::new(&dem, &zones, "GeoID");
    assert!(matches!(result, Err(FloodError::Configuration(_))));
}

#[test]
fn test_non_finite_elevation_rejected() {
    let dem = ramp_dem();
    let zones = whole_grid_zone();
    let mapper = FloodMapper::new(&dem, &zones, "GeoID").unwrap();

    for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let result = mapper.flood_extent(bad);
        assert!(matches!(result, Err(FloodError::Configuration(_))));
    }
}

#[test]
fn test_missing_zone_id_field() {
    let dem = ramp_dem();
    let mut zones = FeatureLayer::new(None);
    zones.push(Feature::new(square(0.0, 0.0, 5.0, 5.0)));

    let result = FloodMapper::new(&dem, &zones, "GeoID");
    assert!(matches!(result, Err(FloodError::NotFound(_))));
}

#[test]
fn test_duplicate_zone_ids_rejected() {
    let dem = ramp_dem();
    let mut zones = FeatureLayer::new(None);
    zones.push(zone(1, square(0.0, 0.0, 2.0, 2.0)));
    zones.push(zone(1, square(2.0, 2.0, 4.0, 4.0)));

    let result = FloodMapper::new(&dem, &zones, "GeoID");
    assert!(matches!(result, Err(FloodError::Configuration(_))));
}

#[test]
fn test_tiny_memory_budget_is_resource_exhaustion() {
    let dem = ramp_dem();
    let zones = whole_grid_zone();
    let mapper = FloodMapper::new(&dem, &zones, "GeoID")
        .unwrap()
        .with_memory_budget(16);

    let result = mapper.flood_extent(5.0);
    match result {
        Err(FloodError::ResourceExhaustion(message)) => {
            assert!(message.contains("coarser"), "remedy missing: {}", message);
        }
        other => panic!("expected resource exhaustion, got {:?}", other.map(|l| l.len())),
    }
}

#[test]
fn test_nodata_cells_never_flood() {
    let mut dem = ramp_dem();
    dem.data[[0, 0]] = -999.0; // would otherwise flood at any elevation
    let zones = whole_grid_zone();
    let mapper = FloodMapper::new(&dem, &zones, "GeoID").unwrap();

    let layer = mapper.flood_extent(5.0).unwrap();
    assert!((layer.records[0].geometry.unsigned_area() - 12.0).abs() < 1e-9);
}
