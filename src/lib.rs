// Library exports for testing and reuse

pub mod accumulate;
pub mod acquisition;
pub mod aggregate;
pub mod cli;
pub mod error;
pub mod extract;
pub mod feature;
#[cfg(feature = "gdal")]
pub mod gdal_io;
pub mod io;
pub mod options;
pub mod output;
pub mod raster;
pub mod sample;
pub mod window;

// Re-export commonly used types
pub use accumulate::{accumulate, accumulate_with, AccumulationOutcome, PixelCountGrid};
pub use acquisition::{scan_archive, Acquisition, AcquisitionIndex};
pub use aggregate::AggregateFn;
pub use error::{ExtractError, Result};
pub use extract::{
    AggregationSpec, ExtractedValue, ExtractionEntry, ExtractionOutcome, FeatureExtraction,
    WindowedExtractor,
};
pub use feature::{load_geojson, FeatureGeometry, FeatureRecord, VectorFeature};
pub use io::{GeoTiffReader, RasterReader};
pub use options::{ExecutionMode, RunOptions, UnreadablePolicy};
pub use raster::{GeoReference, GeoTransform, RasterGrid};
pub use window::ExtractionWindow;
