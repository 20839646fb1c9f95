use crate::accumulate::PixelCountGrid;
use crate::error::{ExtractError, Result};
use crate::io::RasterReader;
use crate::raster::{GeoReference, GeoTransform, RasterGrid};
use gdal::raster::{Buffer, RasterBand};
use gdal::{Dataset, DriverManager, Metadata};
use log::{debug, info};
use ndarray::Array2;
use std::path::Path;

/// Reads band 1 of any GDAL-supported raster
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalReader;

impl RasterReader for GdalReader {
    fn read(&self, path: &Path) -> Result<RasterGrid> {
        debug!("Opening raster with GDAL: {}", path.display());
        let dataset = Dataset::open(path)?;

        let rasterband: RasterBand = dataset.rasterband(1)?;
        let width = rasterband.x_size();
        let height = rasterband.y_size();

        if width == 0 || height == 0 {
            return Err(ExtractError::InvalidDimensions(width, height));
        }

        let nodata = rasterband.no_data_value();
        let geotransform = dataset.geo_transform()?;

        let buffer = rasterband.read_as::<f64>((0, 0), (width, height), (width, height), None)?;
        let data_vec: Vec<f64> = buffer.into_iter().collect();
        let data = Array2::from_shape_vec((height, width), data_vec)?;

        let projection = dataset.projection();
        let georef = GeoReference {
            transform: GeoTransform::from_gdal(geotransform),
            projection: if projection.is_empty() {
                None
            } else {
                Some(projection)
            },
            geo_keys: None,
        };

        debug!("Raster dimensions: {}x{}, nodata: {:?}", width, height, nodata);
        Ok(RasterGrid::from_raw(data, georef, nodata))
    }
}

/// Write occurrence counts as a 32-bit unsigned GeoTIFF through GDAL,
/// copying the geotransform and projection of the first image
pub fn write_count_grid<P: AsRef<Path>>(counts: &PixelCountGrid, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Creating count raster: {}", path.display());

    let (height, width) = counts.shape();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type::<u32, _>(path, width, height, 1)?;

    let georef = counts.georef();
    dataset.set_geo_transform(&georef.transform.to_gdal())?;
    if let Some(projection) = &georef.projection {
        dataset.set_projection(projection)?;
    }

    let mut raster_band = dataset.rasterband(1)?;
    let data: Vec<u32> = counts.counts().iter().copied().collect();
    let mut buffer = Buffer::new((width, height), data);
    raster_band.write((0, 0), (width, height), &mut buffer)?;
    raster_band.set_description("positive_count")?;

    info!(
        "Wrote {}x{} count grid over {} images",
        width,
        height,
        counts.image_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::write_grid;
    use gdal::spatial_ref::SpatialRef;
    use ndarray::arr2;
    use tempfile::tempdir;

    fn wgs84() -> GeoReference {
        GeoReference {
            transform: GeoTransform::new(5.0, 46.0, 0.25, -0.25),
            projection: Some(SpatialRef::from_epsg(4326).unwrap().to_wkt().unwrap()),
            geo_keys: None,
        }
    }

    #[test]
    fn test_count_grid_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("count.tif");
        let counts = PixelCountGrid::new(arr2(&[[0u32, 2, 5], [1, 0, 3]]), wgs84(), 5);

        write_count_grid(&counts, &path).unwrap();
        let grid = GdalReader.read(&path).unwrap();

        assert_eq!(grid.shape(), (2, 3));
        assert_eq!(grid.value_at(0, 0), 0.0);
        assert_eq!(grid.value_at(0, 2), 5.0);
        assert_eq!(grid.transform(), &wgs84().transform);
        let projection = grid.georef().projection.clone().unwrap();
        assert!(projection.contains("WGS"));
    }

    #[test]
    fn test_reads_tiff_written_natively() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sm_20200106.tif");
        let source = RasterGrid::new(
            arr2(&[[0.25, f64::NAN], [0.5, 0.75]]),
            GeoReference::from_transform(GeoTransform::new(100.0, 203.0, 1.0, -1.0)),
        );
        write_grid(&source, &path).unwrap();

        let grid = GdalReader.read(&path).unwrap();
        assert_eq!(grid.value_at(0, 0), 0.25);
        assert!(grid.value_at(0, 1).is_nan());
        assert_eq!(grid.value_at(1, 1), 0.75);
        assert_eq!(grid.cell_at(100.5, 201.5), Some((1, 0)));
    }
}
