use crate::output::OutputFormat;
use crate::window::{DEFAULT_DAYS_AFTER, DEFAULT_DAYS_BEFORE};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sm-extract")]
#[command(about = "Extract time-windowed soil-moisture values at landslide locations")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Number of threads (default: all available)
    #[arg(short, long, value_name = "N", global = true)]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sample rasters dated inside each feature's window
    Extract(ExtractArgs),
    /// Count, per pixel, the images with a strictly positive value
    Accumulate(AccumulateArgs),
}

#[derive(ClapArgs, Debug)]
pub struct ExtractArgs {
    /// GeoJSON FeatureCollection of dated features
    #[arg(short, long, value_name = "FILE")]
    pub features: PathBuf,

    /// Directory holding the raster archive
    #[arg(short, long, value_name = "DIR", required_unless_present = "listing")]
    pub rasters: Option<PathBuf>,

    /// File name pattern inside the archive directory
    #[arg(long, default_value = "*.tif")]
    pub pattern: String,

    /// CSV listing with `path,date` columns, instead of parsing dates from file names
    #[arg(long, value_name = "FILE", conflicts_with = "rasters")]
    pub listing: Option<PathBuf>,

    /// Feature attribute holding the event date
    #[arg(long, default_value = crate::feature::DEFAULT_DATE_FIELD)]
    pub date_field: String,

    /// Days before the event date to include
    #[arg(long, default_value_t = i64::from(DEFAULT_DAYS_BEFORE), allow_negative_numbers = true)]
    pub days_before: i64,

    /// Days after the event date to include
    #[arg(long, default_value_t = i64::from(DEFAULT_DAYS_AFTER), allow_negative_numbers = true)]
    pub days_after: i64,

    /// Buffer radius around point features, in map units
    #[arg(long, value_name = "DISTANCE", allow_negative_numbers = true)]
    pub point_buffer: Option<f64>,

    /// Comma-separated summaries over buffered or polygon cells (mean,min,max,median,sum,sd,count)
    #[arg(long, value_name = "LIST")]
    pub aggre_fun: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Output path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Sample features of each raster in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Skip unreadable rasters instead of aborting
    #[arg(long)]
    pub skip_unreadable: bool,
}

#[derive(ClapArgs, Debug)]
pub struct AccumulateArgs {
    /// Directory of rasters to count over
    #[arg(short, long, value_name = "DIR", required_unless_present = "inputs")]
    pub rasters: Option<PathBuf>,

    /// File name pattern inside the raster directory
    #[arg(long, default_value = "*.tif")]
    pub pattern: String,

    /// Explicit raster paths, instead of a directory
    #[arg(short, long, value_name = "FILE", num_args = 1.., conflicts_with = "rasters")]
    pub inputs: Vec<PathBuf>,

    /// Output GeoTIFF path (32-bit unsigned counts)
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Fold images in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Skip unreadable images instead of aborting
    #[arg(long)]
    pub skip_unreadable: bool,
}
