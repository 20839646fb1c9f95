use clap::Parser;
use env_logger::Env;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use sm_window_extract::acquisition::{glob_paths, read_listing, scan_archive};
use sm_window_extract::aggregate::parse_aggregates;
use sm_window_extract::cli::{AccumulateArgs, Args, Command, ExtractArgs};
use sm_window_extract::error::{ExtractError, Result};
use sm_window_extract::extract::{AggregationSpec, WindowedExtractor};
use sm_window_extract::feature::load_geojson;
use sm_window_extract::accumulate::PixelCountGrid;
use sm_window_extract::io::RasterReader;
use sm_window_extract::options::{
    ExecutionMode, Progress, ProgressFn, RunOptions, UnreadablePolicy,
};
use sm_window_extract::output::write_results;
use sm_window_extract::window::ExtractionWindow;
use sm_window_extract::{accumulate_with, ExtractionOutcome};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    info!("=== Soil Moisture Window Extraction ===");

    // Set thread pool size if specified
    if let Some(n_threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()
        {
            warn!("Could not size the thread pool: {}", e);
        } else {
            info!("Using {} threads", n_threads);
        }
    } else {
        info!("Using all available threads");
    }

    let reader = raster_reader();
    match args.command {
        Command::Extract(extract) => run_extract(extract, reader.as_ref()),
        Command::Accumulate(accumulate) => run_accumulate(accumulate, reader.as_ref()),
    }?;

    info!("=== Done! ===");
    Ok(())
}

#[cfg(feature = "gdal")]
fn raster_reader() -> Box<dyn RasterReader> {
    Box::new(sm_window_extract::gdal_io::GdalReader)
}

#[cfg(not(feature = "gdal"))]
fn raster_reader() -> Box<dyn RasterReader> {
    Box::new(sm_window_extract::io::GeoTiffReader)
}

#[cfg(feature = "gdal")]
fn write_count_grid(counts: &PixelCountGrid, path: &Path) -> Result<()> {
    sm_window_extract::gdal_io::write_count_grid(counts, path)
}

#[cfg(not(feature = "gdal"))]
fn write_count_grid(counts: &PixelCountGrid, path: &Path) -> Result<()> {
    sm_window_extract::io::write_count_grid(counts, path)
}

fn log_progress(progress: &Progress<'_>) {
    debug!(
        "[{}/{}] {}",
        progress.completed,
        progress.total,
        progress.path.display()
    );
}

fn run_options(parallel: bool, skip_unreadable: bool) -> RunOptions<'static> {
    let progress: ProgressFn<'static> = &log_progress;
    RunOptions {
        on_unreadable: if skip_unreadable {
            UnreadablePolicy::SkipAndReport
        } else {
            UnreadablePolicy::Abort
        },
        mode: if parallel {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        },
        progress: Some(progress),
    }
}

fn run_extract(args: ExtractArgs, reader: &dyn RasterReader) -> Result<()> {
    let window = ExtractionWindow::try_new(args.days_before, args.days_after)?;
    let functions = match &args.aggre_fun {
        Some(list) => parse_aggregates(list)?,
        None => Vec::new(),
    };
    let spec = AggregationSpec {
        buffer: args.point_buffer,
        functions,
    };
    if let Some(buffer) = spec.buffer {
        info!("Point buffer: {} map units", buffer);
    }
    if !spec.functions.is_empty() {
        let names: Vec<&str> = spec.functions.iter().map(|f| f.name()).collect();
        info!("Aggregation: {}", names.join(", "));
    }

    let records = load_geojson(&args.features)?;

    let acquisitions = match (&args.listing, &args.rasters) {
        (Some(listing), _) => read_listing(listing)?,
        (None, Some(dir)) => scan_archive(dir, &args.pattern)?,
        (None, None) => return Err(ExtractError::EmptyInput("no raster archive or listing given")),
    };

    let extractor = WindowedExtractor::new(reader, window, spec)?
        .with_options(run_options(args.parallel, args.skip_unreadable));
    let ExtractionOutcome { results, skipped } =
        extractor.extract_records(records, &args.date_field, &acquisitions)?;

    for path in &skipped {
        warn!("Skipped: {}", path.display());
    }

    let matched = results.iter().filter(|r| !r.entries.is_empty()).count();
    info!("{} of {} features matched at least one acquisition", matched, results.len());

    match &args.output {
        Some(path) => info!("Writing output: {}", path.display()),
        None => debug!("Writing output to stdout"),
    }
    write_results(&results, args.format, args.output.as_deref())
}

fn run_accumulate(args: AccumulateArgs, reader: &dyn RasterReader) -> Result<()> {
    let paths: Vec<PathBuf> = match &args.rasters {
        Some(dir) => {
            info!("Scanning rasters: {}/{}", dir.display(), args.pattern);
            glob_paths(dir, &args.pattern)?
        }
        None => args.inputs.clone(),
    };

    let outcome = accumulate_with(
        &paths,
        reader,
        &run_options(args.parallel, args.skip_unreadable),
    )?;
    for path in &outcome.skipped {
        warn!("Skipped: {}", path.display());
    }

    let (rows, cols) = outcome.grid.shape();
    info!(
        "Counted {} images over {}x{} pixels",
        outcome.grid.image_count(),
        cols,
        rows
    );

    info!("Writing output: {}", args.output.display());
    write_count_grid(&outcome.grid, &args.output)
}
