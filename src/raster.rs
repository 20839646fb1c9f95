//! In-memory raster grid with its georeference.

use ndarray::Array2;

/// Affine transform in GDAL coefficient order:
/// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`.
///
/// For north-up images the rotation terms are zero and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    /// North-up transform without rotation
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Map coordinates of the centre of cell `(row, col)`
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let col_f = col as f64 + 0.5;
        let row_f = row as f64 + 0.5;
        (
            self.origin_x + col_f * self.pixel_width + row_f * self.row_rotation,
            self.origin_y + col_f * self.col_rotation + row_f * self.pixel_height,
        )
    }

    /// Fractional `(col, row)` for map coordinates, NaN for a degenerate transform
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;

        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;
        (col, row)
    }
}

impl Default for GeoTransform {
    /// Unit cells with the origin at (0, 0), y growing downwards
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

/// GeoTIFF key directory with its parameter tags, kept as read
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoKeys {
    pub directory: Vec<u16>,
    pub double_params: Vec<f64>,
    pub ascii_params: Option<String>,
}

/// Georeference shared by every grid read from the same archive.
///
/// `projection` is WKT from GDAL; `geo_keys` is the raw key directory from
/// the TIFF reader. Writers copy whichever is present and never invent one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoReference {
    pub transform: GeoTransform,
    pub projection: Option<String>,
    pub geo_keys: Option<GeoKeys>,
}

impl GeoReference {
    /// Transform only, with no coordinate system attached
    pub fn from_transform(transform: GeoTransform) -> Self {
        Self {
            transform,
            ..Default::default()
        }
    }
}

/// A single-band raster with missing cells stored as NaN.
///
/// Readers translate the source no-data value to NaN on load, so every
/// consumer checks `is_nan()` only.
#[derive(Debug, Clone)]
pub struct RasterGrid {
    data: Array2<f64>,
    georef: GeoReference,
    source_nodata: Option<f64>,
}

impl RasterGrid {
    pub fn new(data: Array2<f64>, georef: GeoReference) -> Self {
        Self {
            data,
            georef,
            source_nodata: None,
        }
    }

    /// Build a grid from raw values, mapping `nodata` cells to NaN
    pub fn from_raw(mut data: Array2<f64>, georef: GeoReference, nodata: Option<f64>) -> Self {
        if let Some(nd) = nodata {
            if !nd.is_nan() {
                data.mapv_inplace(|v| if v == nd { f64::NAN } else { v });
            }
        }
        Self {
            data,
            georef,
            source_nodata: nodata,
        }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn georef(&self) -> &GeoReference {
        &self.georef
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.georef.transform
    }

    /// No-data value declared by the source file, if any
    pub fn source_nodata(&self) -> Option<f64> {
        self.source_nodata
    }

    /// Value at `(row, col)`; NaN when outside the grid or missing
    pub fn value_at(&self, row: usize, col: usize) -> f64 {
        self.data.get((row, col)).copied().unwrap_or(f64::NAN)
    }

    /// Cell covering map coordinates `(x, y)`, if it lies inside the grid
    pub fn cell_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (col, row) = self.georef.transform.geo_to_pixel(x, y);
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row.floor() as usize, col.floor() as usize);
        if row < self.rows() && col < self.cols() {
            Some((row, col))
        } else {
            None
        }
    }
}
