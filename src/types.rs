use geo::MultiPolygon;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier tying a zone-of-influence record to one tidegate
pub type ZoneId = i64;

/// 2D elevation samples (row x column), vertical units = meters
pub type ElevationGrid = Array2<f32>;

/// Geospatial transformation parameters (GDAL affine convention)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Build from the 6-element array returned by GDAL
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    /// Map fractional grid coordinates (column, row) to world coordinates.
    ///
    /// Integer inputs land on cell corners; (col + 0.5, row + 0.5) is a
    /// cell center.
    pub fn grid_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// Area of one grid cell in world units squared
    pub fn cell_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y).abs()
    }
}

/// Digital elevation model held fully in memory.
///
/// Samples are meters above the vertical datum; `nodata` cells never count
/// as flooded.
#[derive(Debug, Clone)]
pub struct DemRaster {
    pub data: ElevationGrid,
    pub transform: GeoTransform,
    pub nodata: f32,
    /// EPSG code of the spatial reference, if the source declared one
    pub epsg: Option<u32>,
}

impl DemRaster {
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Whether a sample is the nodata sentinel (or not a finite number)
    pub fn is_nodata(&self, value: f32) -> bool {
        !value.is_finite() || value == self.nodata
    }
}

/// A single attribute value in a vector layer's table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Real(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Real(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// One record of a polygon layer: geometry plus attribute table row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub geometry: MultiPolygon<f64>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Feature {
    pub fn new(geometry: MultiPolygon<f64>) -> Self {
        Self {
            geometry,
            fields: BTreeMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Polygon layer (zones of influence, wetlands, building footprints)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureLayer {
    pub features: Vec<Feature>,
    /// EPSG code of the spatial reference, if the source declared one
    pub epsg: Option<u32>,
}

impl FeatureLayer {
    pub fn new(epsg: Option<u32>) -> Self {
        Self {
            features: Vec::new(),
            epsg,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }
}

/// One flooded-area record: the flooded portion of one zone of influence
/// at one evaluated elevation.
///
/// `elevation_m` is exactly the threshold the geometry was derived with;
/// the user-facing feet value lives in the `flood_elev` attribute field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodRecord {
    pub zone_id: ZoneId,
    pub elevation_m: f64,
    pub geometry: MultiPolygon<f64>,
    pub fields: BTreeMap<String, FieldValue>,
}

/// Derived flood-extent layer: one record per (zone x elevation) pair with
/// any flooded area.
///
/// Zones with zero flooded area produce no record at all, while aggregate
/// fields written by the zonal aggregator are populated on every record that
/// does exist. Callers joining back to the zones layer must handle the
/// missing-record case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodLayer {
    /// Name of the zone-identifier field, carried through to outputs
    pub id_field: String,
    pub records: Vec<FloodRecord>,
    pub epsg: Option<u32>,
}

impl FloodLayer {
    pub fn new(id_field: impl Into<String>, epsg: Option<u32>) -> Self {
        Self {
            id_field: id_field.into(),
            records: Vec::new(),
            epsg,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Union of attribute field names across all records, in stable order
    pub fn field_names(&self) -> Vec<String> {
        let mut names = std::collections::BTreeSet::new();
        for record in &self.records {
            for name in record.fields.keys() {
                names.insert(name.clone());
            }
        }
        names.into_iter().collect()
    }

    /// Concatenate per-elevation layers into one combined layer.
    ///
    /// Records are kept as-is (the elevation field keeps them distinct);
    /// all inputs must share the same id field.
    pub fn merge(layers: Vec<FloodLayer>) -> FloodResult<FloodLayer> {
        let mut iter = layers.into_iter();
        let mut combined = iter.next().ok_or_else(|| {
            FloodError::Configuration("cannot merge an empty list of flood layers".to_string())
        })?;
        for layer in iter {
            if layer.id_field != combined.id_field {
                return Err(FloodError::Configuration(format!(
                    "cannot merge flood layers keyed on '{}' and '{}'",
                    combined.id_field, layer.id_field
                )));
            }
            combined.records.extend(layer.records);
        }
        Ok(combined)
    }
}

/// Error types for the flood-assessment pipeline
#[derive(Debug, thiserror::Error)]
pub enum FloodError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("output already exists: {0}")]
    AlreadyExists(String),

    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("processing error: {0}")]
    Processing(String),
}

/// Result type for flood-assessment operations
pub type FloodResult<T> = Result<T, FloodError>;
