use crate::types::{DemRaster, FloodError, FloodResult, GeoTransform};
use gdal::Dataset;
use ndarray::Array2;
use std::path::Path;

/// Digital Elevation Model reader
pub struct DemReader;

impl DemReader {
    /// Read a full DEM into memory from any GDAL-supported raster format.
    ///
    /// Band 1 is read; the band's nodata value defaults to -32768 when the
    /// source does not declare one.
    pub fn read<P: AsRef<Path>>(dem_path: P) -> FloodResult<DemRaster> {
        let path = dem_path.as_ref();
        log::info!("Loading DEM from: {}", path.display());

        if !path.exists() {
            return Err(FloodError::NotFound(format!(
                "DEM {} does not exist",
                path.display()
            )));
        }

        let dataset = Dataset::open(path)?;
        let geo_transform = dataset.geo_transform()?;
        let (width, height) = dataset.raster_size();
        log::debug!("DEM size: {}x{}", width, height);
        log::debug!("DEM geotransform: {:?}", geo_transform);

        let rasterband = dataset.rasterband(1)?;
        let nodata = rasterband.no_data_value().unwrap_or(-32768.0) as f32;
        let band_data = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

        let data = Array2::from_shape_vec((height, width), band_data.data)
            .map_err(|e| FloodError::Processing(format!("failed to reshape DEM data: {}", e)))?;

        let epsg = dataset
            .spatial_ref()
            .ok()
            .and_then(|srs| srs.auth_code().ok())
            .map(|code| code as u32);

        Ok(DemRaster {
            data,
            transform: GeoTransform::from_gdal(geo_transform),
            nodata,
            epsg,
        })
    }
}
