//! Per-pixel occurrence counts over a stack of equally shaped rasters.
//!
//! Every image is reclassified to 1 where its value is strictly positive and 0
//! elsewhere (zero, negative and missing cells alike), then summed cell by
//! cell. Missing cells count as 0 here; they are not propagated.

use crate::error::{ExtractError, Result};
use crate::io::RasterReader;
use crate::options::{ExecutionMode, RunOptions, UnreadablePolicy};
use crate::raster::{GeoReference, RasterGrid};
use log::{debug, info, warn};
use ndarray::{Array2, Zip};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Count of images with a strictly positive value, per cell
#[derive(Debug, Clone, PartialEq)]
pub struct PixelCountGrid {
    counts: Array2<u32>,
    georef: GeoReference,
    image_count: usize,
}

impl PixelCountGrid {
    pub fn new(counts: Array2<u32>, georef: GeoReference, image_count: usize) -> Self {
        Self {
            counts,
            georef,
            image_count,
        }
    }

    pub fn counts(&self) -> &Array2<u32> {
        &self.counts
    }

    pub fn into_counts(self) -> Array2<u32> {
        self.counts
    }

    /// Georeference copied from the first image
    pub fn georef(&self) -> &GeoReference {
        &self.georef
    }

    /// Number of images folded into the counts
    pub fn image_count(&self) -> usize {
        self.image_count
    }

    pub fn shape(&self) -> (usize, usize) {
        self.counts.dim()
    }
}

#[derive(Debug, Clone)]
pub struct AccumulationOutcome {
    pub grid: PixelCountGrid,
    /// Unreadable paths left out under [`UnreadablePolicy::SkipAndReport`]
    pub skipped: Vec<PathBuf>,
}

/// 1 where the value is strictly positive, else 0
pub fn classify_positive(data: &Array2<f64>) -> Array2<u32> {
    data.mapv(|v| u32::from(v > 0.0))
}

/// Add the positive-cell mask of `data` into `counts`
pub fn add_positive(counts: &mut Array2<u32>, data: &Array2<f64>) {
    Zip::from(counts).and(data).for_each(|count, &v| {
        if v > 0.0 {
            *count += 1;
        }
    });
}

/// Count positive cells across `paths`, aborting on any unreadable image
pub fn accumulate<P: AsRef<Path>>(paths: &[P], reader: &dyn RasterReader) -> Result<PixelCountGrid> {
    accumulate_with(paths, reader, &RunOptions::default()).map(|outcome| outcome.grid)
}

pub fn accumulate_with<P: AsRef<Path>>(
    paths: &[P],
    reader: &dyn RasterReader,
    options: &RunOptions<'_>,
) -> Result<AccumulationOutcome> {
    if paths.is_empty() {
        return Err(ExtractError::EmptyInput("no image paths to accumulate"));
    }

    let total = paths.len();
    info!("Accumulating positive-cell counts over {} images", total);
    let completed = AtomicUsize::new(0);
    let report = |path: &Path| {
        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        options.report(done, total, path);
    };

    // The first readable image fixes shape and georeference
    let mut skipped = Vec::new();
    let mut first = None;
    for (i, path) in paths.iter().enumerate() {
        let path = path.as_ref();
        let grid = read_image(reader, path, options.on_unreadable)?;
        report(path);
        match grid {
            Some(grid) => {
                first = Some((i, grid));
                break;
            }
            None => skipped.push((i, path.to_path_buf())),
        }
    }
    let Some((first_index, first)) = first else {
        return Err(ExtractError::EmptyInput("none of the images could be read"));
    };

    let expected = first.shape();
    let georef = first.georef().clone();
    let mut counts = classify_positive(first.data());
    drop(first);
    debug!(
        "Reference shape {:?} from {}",
        expected,
        paths[first_index].as_ref().display()
    );

    let rest_start = first_index + 1;
    let rest: Vec<(usize, &Path)> = paths[rest_start..]
        .iter()
        .enumerate()
        .map(|(i, p)| (rest_start + i, p.as_ref()))
        .collect();

    let mut folded = 1;
    match options.mode {
        ExecutionMode::Sequential => {
            for (i, path) in rest {
                match read_image(reader, path, options.on_unreadable)? {
                    Some(grid) => {
                        check_shape(path, expected, &grid)?;
                        add_positive(&mut counts, grid.data());
                        folded += 1;
                    }
                    None => skipped.push((i, path.to_path_buf())),
                }
                report(path);
            }
        }
        ExecutionMode::Parallel => {
            let zeros = || (Array2::<u32>::zeros(expected), 0usize, Vec::new());
            let (partial, n, mut partial_skipped) = rest
                .par_iter()
                .try_fold(zeros, |(mut acc, mut n, mut skipped), &(i, path)| {
                    match read_image(reader, path, options.on_unreadable)? {
                        Some(grid) => {
                            check_shape(path, expected, &grid)?;
                            add_positive(&mut acc, grid.data());
                            n += 1;
                        }
                        None => skipped.push((i, path.to_path_buf())),
                    }
                    report(path);
                    Ok::<_, ExtractError>((acc, n, skipped))
                })
                .try_reduce(zeros, |(mut a, na, mut sa), (b, nb, sb)| {
                    a += &b;
                    sa.extend(sb);
                    Ok((a, na + nb, sa))
                })?;
            counts += &partial;
            folded += n;
            skipped.append(&mut partial_skipped);
        }
    }

    skipped.sort_by_key(|(i, _)| *i);
    let skipped: Vec<PathBuf> = skipped.into_iter().map(|(_, p)| p).collect();
    if !skipped.is_empty() {
        warn!("Skipped {} unreadable images", skipped.len());
    }
    info!("Folded {} images into a {}x{} count grid", folded, expected.1, expected.0);

    Ok(AccumulationOutcome {
        grid: PixelCountGrid {
            counts,
            georef,
            image_count: folded,
        },
        skipped,
    })
}

/// `Ok(None)` when the image is unreadable and the policy says skip
fn read_image(
    reader: &dyn RasterReader,
    path: &Path,
    policy: UnreadablePolicy,
) -> Result<Option<RasterGrid>> {
    match reader.read(path) {
        Ok(grid) => Ok(Some(grid)),
        Err(e) => match policy {
            UnreadablePolicy::Abort => Err(ExtractError::UnreadableImage {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
            UnreadablePolicy::SkipAndReport => {
                warn!("Skipping unreadable image {}: {}", path.display(), e);
                Ok(None)
            }
        },
    }
}

fn check_shape(path: &Path, expected: (usize, usize), grid: &RasterGrid) -> Result<()> {
    let found = grid.shape();
    if found != expected {
        return Err(ExtractError::ShapeMismatch {
            path: path.to_path_buf(),
            expected,
            found,
        });
    }
    Ok(())
}
