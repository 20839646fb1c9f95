use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Feature collection lacks required attribute '{attribute}'{}", describe_index(.feature_index))]
    MissingRequiredAttribute {
        attribute: String,
        feature_index: Option<usize>,
    },

    #[error("Feature {feature_index} has an unparsable event date: {value}")]
    InvalidEventDate { feature_index: usize, value: String },

    #[error("Raster {path} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        path: PathBuf,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Empty input: {0}")]
    EmptyInput(&'static str),

    #[error("Cannot read image {path}: {reason}")]
    UnreadableImage { path: PathBuf, reason: String },

    #[error("Cannot read raster {path}: {reason}")]
    UnreadableRaster { path: PathBuf, reason: String },

    #[error("Unsupported feature geometry: {0}")]
    UnsupportedGeometry(String),

    #[error("Invalid window: {days_before} days before, {days_after} days after (both must be non-negative)")]
    InvalidWindow { days_before: i64, days_after: i64 },

    #[error("Invalid buffer distance: {0} (must be finite and non-negative)")]
    InvalidBuffer(f64),

    #[error("Unknown aggregation function: {0}")]
    UnknownAggregate(String),

    #[error("Invalid acquisition date '{value}' for {path}")]
    InvalidAcquisitionDate { path: PathBuf, value: String },

    #[error("Input raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Unsupported raster data type: {0}")]
    UnsupportedDataType(String),
}

fn describe_index(feature_index: &Option<usize>) -> String {
    match feature_index {
        Some(i) => format!(" (feature {})", i),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
