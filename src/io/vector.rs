//! Polygon layer I/O through GDAL/OGR.
//!
//! Geometries cross the GDAL boundary as WKT, which keeps the in-memory
//! pipeline on plain `geo` types.

use crate::io::workspace::Workspace;
use crate::types::{
    Feature, FeatureLayer, FieldValue, FloodError, FloodLayer, FloodResult,
};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{Geometry, LayerAccess, LayerOptions};
use gdal::{Dataset, DriverManager};
use geo::MultiPolygon;
use std::path::Path;
use wkt::{ToWkt, TryFromWkt};

/// Read the first layer of a vector dataset into memory.
///
/// Only polygon and multi-polygon geometries are accepted; every feature's
/// attribute row comes along.
pub fn read_layer<P: AsRef<Path>>(path: P) -> FloodResult<FeatureLayer> {
    let path = path.as_ref();
    log::info!("Loading polygon layer from: {}", path.display());

    if !path.exists() {
        return Err(FloodError::NotFound(format!(
            "layer {} does not exist",
            path.display()
        )));
    }

    let dataset = Dataset::open(path)?;
    let mut layer = dataset.layer(0)?;

    let epsg = layer
        .spatial_ref()
        .and_then(|srs| srs.auth_code().ok())
        .map(|code| code as u32);

    let mut out = FeatureLayer::new(epsg);
    for feature in layer.features() {
        let geometry = feature.geometry().ok_or_else(|| {
            FloodError::Configuration(format!(
                "feature without geometry in {}",
                path.display()
            ))
        })?;
        let geometry = parse_multipolygon(&geometry.wkt()?)?;

        let mut record = Feature::new(geometry);
        for (name, value) in feature.fields() {
            if let Some(value) = convert_field(value) {
                record.fields.insert(name, value);
            }
        }
        out.push(record);
    }

    log::debug!("Loaded {} features from {}", out.len(), path.display());
    Ok(out)
}

/// Write a feature layer to a workspace output name, honoring the
/// overwrite policy
pub fn write_feature_layer(
    workspace: &Workspace,
    name: &str,
    layer: &FeatureLayer,
) -> FloodResult<std::path::PathBuf> {
    let path = workspace.prepare_output(name)?;
    write_feature_layer_to_path(&path, layer)?;
    Ok(path)
}

/// Write a feature layer to an already-prepared path
pub fn write_feature_layer_to_path(path: &Path, layer: &FeatureLayer) -> FloodResult<()> {
    log::info!(
        "Writing {} features to {}",
        layer.len(),
        path.display()
    );

    // union of the attribute fields across all features, typed by first use
    let mut field_defs: Vec<(String, &FieldValue)> = Vec::new();
    for feature in &layer.features {
        for (name, value) in &feature.fields {
            if !field_defs.iter().any(|(n, _)| n == name) {
                field_defs.push((name.clone(), value));
            }
        }
    }
    field_defs.sort_by(|(a, _), (b, _)| a.cmp(b));

    with_output_layer(path, layer.epsg, |ogr_layer| {
        let defs: Vec<(&str, u32)> = field_defs
            .iter()
            .map(|(name, value)| (name.as_str(), ogr_field_type(value)))
            .collect();
        ogr_layer.create_defn_fields(&defs)?;

        for feature in &layer.features {
            let geometry = Geometry::from_wkt(&feature.geometry.wkt_string())?;
            let names: Vec<&str> = feature.fields.keys().map(|n| n.as_str()).collect();
            let values: Vec<gdal::vector::FieldValue> =
                feature.fields.values().map(to_gdal_field).collect();
            ogr_layer.create_feature_fields(geometry, &names, &values)?;
        }
        Ok(())
    })
}

/// Write a flood layer to a workspace output name, honoring the overwrite
/// policy.
///
/// The attribute table carries the zone identifier under the layer's id
/// field plus every stamped field (`flood_elev` at minimum).
pub fn write_flood_layer(
    workspace: &Workspace,
    name: &str,
    layer: &FloodLayer,
) -> FloodResult<std::path::PathBuf> {
    let path = workspace.prepare_output(name)?;
    write_flood_layer_to_path(&path, layer)?;
    Ok(path)
}

/// Write a flood layer to an already-prepared path
pub fn write_flood_layer_to_path(path: &Path, layer: &FloodLayer) -> FloodResult<()> {
    log::info!(
        "Writing {} flooded-zone records to {}",
        layer.len(),
        path.display()
    );

    let field_names = layer.field_names();

    with_output_layer(path, layer.epsg, |ogr_layer| {
        let mut defs: Vec<(&str, u32)> =
            vec![(layer.id_field.as_str(), gdal_sys::OGRFieldType::OFTInteger64)];
        for name in &field_names {
            let value = layer
                .records
                .iter()
                .find_map(|r| r.fields.get(name))
                .ok_or_else(|| FloodError::Processing(format!("field {} has no values", name)))?;
            defs.push((name.as_str(), ogr_field_type(value)));
        }
        ogr_layer.create_defn_fields(&defs)?;

        for record in &layer.records {
            let geometry = Geometry::from_wkt(&record.geometry.wkt_string())?;
            let mut names: Vec<&str> = vec![layer.id_field.as_str()];
            let mut values = vec![gdal::vector::FieldValue::Integer64Value(record.zone_id)];
            for (name, value) in &record.fields {
                names.push(name.as_str());
                values.push(to_gdal_field(value));
            }
            ogr_layer.create_feature_fields(geometry, &names, &values)?;
        }
        Ok(())
    })
}

/// Create the output dataset/layer and hand it to `build`; the dataset
/// flushes to disk when it drops at the end of this call
fn with_output_layer<F>(path: &Path, epsg: Option<u32>, build: F) -> FloodResult<()>
where
    F: FnOnce(&mut gdal::vector::Layer) -> FloodResult<()>,
{
    let driver = DriverManager::get_driver_by_name(driver_for_path(path)?)?;
    let mut dataset = driver.create_vector_only(path)?;

    let srs = match epsg {
        Some(code) => Some(SpatialRef::from_epsg(code)?),
        None => None,
    };
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("layer")
        .to_string();

    let mut layer = dataset.create_layer(LayerOptions {
        name: &name,
        srs: srs.as_ref(),
        ty: gdal_sys::OGRwkbGeometryType::wkbMultiPolygon,
        options: None,
    })?;
    build(&mut layer)
}

/// Pick the OGR driver from the output extension
fn driver_for_path(path: &Path) -> FloodResult<&'static str> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("shp") => Ok("ESRI Shapefile"),
        Some("geojson") | Some("json") => Ok("GeoJSON"),
        Some("gpkg") => Ok("GPKG"),
        other => Err(FloodError::Configuration(format!(
            "unsupported output format {:?} for {} (use .shp, .geojson, or .gpkg)",
            other.unwrap_or(""),
            path.display()
        ))),
    }
}

fn ogr_field_type(value: &FieldValue) -> u32 {
    match value {
        FieldValue::Integer(_) => gdal_sys::OGRFieldType::OFTInteger64,
        FieldValue::Real(_) => gdal_sys::OGRFieldType::OFTReal,
        FieldValue::Text(_) => gdal_sys::OGRFieldType::OFTString,
    }
}

fn to_gdal_field(value: &FieldValue) -> gdal::vector::FieldValue {
    match value {
        FieldValue::Integer(v) => gdal::vector::FieldValue::Integer64Value(*v),
        FieldValue::Real(v) => gdal::vector::FieldValue::RealValue(*v),
        FieldValue::Text(v) => gdal::vector::FieldValue::StringValue(v.clone()),
    }
}

fn convert_field(value: Option<gdal::vector::FieldValue>) -> Option<FieldValue> {
    match value? {
        gdal::vector::FieldValue::IntegerValue(v) => Some(FieldValue::Integer(v as i64)),
        gdal::vector::FieldValue::Integer64Value(v) => Some(FieldValue::Integer(v)),
        gdal::vector::FieldValue::RealValue(v) => Some(FieldValue::Real(v)),
        gdal::vector::FieldValue::StringValue(v) => Some(FieldValue::Text(v)),
        // list/date fields play no role in the pipeline
        _ => None,
    }
}

/// Coerce a WKT geometry into a multi-polygon
fn parse_multipolygon(wkt_text: &str) -> FloodResult<MultiPolygon<f64>> {
    let geometry = geo::Geometry::<f64>::try_from_wkt_str(wkt_text)
        .map_err(|e| FloodError::Processing(format!("failed to parse geometry WKT: {}", e)))?;
    match geometry {
        geo::Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        other => Err(FloodError::Configuration(format!(
            "expected polygon geometry, got {:?}",
            geometry_kind(&other)
        ))),
    }
}

fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}
