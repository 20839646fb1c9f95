//! Windowed spatial-temporal join between dated features and raster acquisitions.
//!
//! Each feature selects the acquisitions dated inside its window, both ends
//! included. Acquisitions are then visited in ascending date order and every
//! selected raster is read once and sampled for all features that want it, so
//! each feature's entries come out sorted by date and only one grid is held in
//! memory at a time.

use crate::acquisition::{Acquisition, AcquisitionIndex};
use crate::aggregate::AggregateFn;
use crate::error::{ExtractError, Result};
use crate::feature::{features_from_records, FeatureGeometry, FeatureRecord, VectorFeature};
use crate::io::RasterReader;
use crate::options::{ExecutionMode, RunOptions, UnreadablePolicy};
use crate::raster::RasterGrid;
use crate::sample::{sample_area, sample_point, sample_target, SampleTarget};
use crate::window::ExtractionWindow;
use chrono::NaiveDate;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::ops::Range;
use std::path::PathBuf;

/// Buffer and summary settings applied at every feature
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationSpec {
    /// Radius around point features, in map units; `None` or 0 samples the single cell
    pub buffer: Option<f64>,
    /// Summaries over the intersecting cells; empty keeps the raw cell values
    pub functions: Vec<AggregateFn>,
}

impl AggregationSpec {
    pub fn validate(&self) -> Result<()> {
        if let Some(distance) = self.buffer {
            if !distance.is_finite() || distance < 0.0 {
                return Err(ExtractError::InvalidBuffer(distance));
            }
        }
        Ok(())
    }
}

/// Value(s) extracted for one feature from one acquisition
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedValue {
    /// Single covering cell; NaN when outside the grid or missing
    Value(f64),
    /// One result per requested function; NaN when no valid cell intersects
    Aggregates(Vec<(AggregateFn, f64)>),
    /// Raw intersecting cell values, missing cells as NaN
    Cells(Vec<f64>),
}

impl ExtractedValue {
    /// True when the geometry found no valid data in this raster
    pub fn is_missing(&self) -> bool {
        match self {
            ExtractedValue::Value(v) => v.is_nan(),
            ExtractedValue::Aggregates(values) => values.iter().all(|(_, v)| v.is_nan()),
            ExtractedValue::Cells(values) => values.iter().all(|v| v.is_nan()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionEntry {
    pub date: NaiveDate,
    pub path: PathBuf,
    pub value: ExtractedValue,
}

/// A feature with its entries, ascending by acquisition date
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureExtraction {
    pub feature: VectorFeature,
    pub entries: Vec<ExtractionEntry>,
}

#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    /// One element per input feature, in input order
    pub results: Vec<FeatureExtraction>,
    /// Unreadable rasters left out under [`UnreadablePolicy::SkipAndReport`]
    pub skipped: Vec<PathBuf>,
}

pub struct WindowedExtractor<'a> {
    reader: &'a dyn RasterReader,
    window: ExtractionWindow,
    spec: AggregationSpec,
    options: RunOptions<'a>,
}

impl<'a> WindowedExtractor<'a> {
    pub fn new(
        reader: &'a dyn RasterReader,
        window: ExtractionWindow,
        spec: AggregationSpec,
    ) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            reader,
            window,
            spec,
            options: RunOptions::default(),
        })
    }

    pub fn with_options(mut self, options: RunOptions<'a>) -> Self {
        self.options = options;
        self
    }

    pub fn window(&self) -> ExtractionWindow {
        self.window
    }

    /// Check event dates on raw records, then extract.
    ///
    /// A record without the date attribute fails the whole call before any raster is read.
    pub fn extract_records(
        &self,
        records: Vec<FeatureRecord>,
        date_field: &str,
        acquisitions: &[Acquisition],
    ) -> Result<ExtractionOutcome> {
        let features = features_from_records(records, date_field)?;
        self.run(features, acquisitions)
    }

    pub fn extract(
        &self,
        features: &[VectorFeature],
        acquisitions: &[Acquisition],
    ) -> Result<ExtractionOutcome> {
        self.run(features.to_vec(), acquisitions)
    }

    fn run(
        &self,
        features: Vec<VectorFeature>,
        acquisitions: &[Acquisition],
    ) -> Result<ExtractionOutcome> {
        let index = AcquisitionIndex::new(acquisitions.to_vec());
        info!(
            "Extracting {} features against {} acquisitions (window -{}/+{} days)",
            features.len(),
            index.len(),
            self.window.days_before,
            self.window.days_after
        );

        if self.spec.buffer.is_some_and(|b| b > 0.0)
            && features
                .iter()
                .any(|f| matches!(f.geometry, FeatureGeometry::Area(_)))
        {
            warn!("Point buffer is ignored for polygon features");
        }

        let ranges: Vec<Range<usize>> = features
            .iter()
            .map(|f| {
                let (start, end) = self.window.bounds(f.event_date);
                index.range(start, end)
            })
            .collect();

        let empty = ranges.iter().filter(|r| r.is_empty()).count();
        if empty > 0 {
            info!("{} features have no acquisition inside their window", empty);
        }

        let targets: Vec<SampleTarget<'_>> = features
            .iter()
            .map(|f| sample_target(&f.geometry, self.spec.buffer))
            .collect();

        let plan = acquisition_members(&ranges, index.len());
        let total = plan.len();
        info!("{} acquisitions fall inside at least one window", total);

        let mut entries: Vec<Vec<ExtractionEntry>> = vec![Vec::new(); features.len()];
        let mut skipped = Vec::new();

        for (done, (j, members)) in plan.into_iter().enumerate() {
            let Some(acq) = index.get(j) else { continue };

            let Some(grid) = self.read_acquisition(acq)? else {
                skipped.push(acq.path.clone());
                self.options.report(done + 1, total, &acq.path);
                continue;
            };

            debug!("{}: sampling {} features", acq.date, members.len());

            let values: Vec<ExtractedValue> = match self.options.mode {
                ExecutionMode::Sequential => members
                    .iter()
                    .map(|&i| extract_value(&grid, &targets[i], &self.spec))
                    .collect(),
                ExecutionMode::Parallel => members
                    .par_iter()
                    .map(|&i| extract_value(&grid, &targets[i], &self.spec))
                    .collect(),
            };

            for (i, value) in members.into_iter().zip(values) {
                entries[i].push(ExtractionEntry {
                    date: acq.date,
                    path: acq.path.clone(),
                    value,
                });
            }

            self.options.report(done + 1, total, &acq.path);
        }

        let results = features
            .into_iter()
            .zip(entries)
            .map(|(feature, entries)| FeatureExtraction { feature, entries })
            .collect();

        if !skipped.is_empty() {
            warn!("Skipped {} unreadable rasters", skipped.len());
        }

        Ok(ExtractionOutcome { results, skipped })
    }

    fn read_acquisition(&self, acq: &Acquisition) -> Result<Option<RasterGrid>> {
        match self.reader.read(&acq.path) {
            Ok(grid) => Ok(Some(grid)),
            Err(e) => match self.options.on_unreadable {
                UnreadablePolicy::Abort => Err(ExtractError::UnreadableRaster {
                    path: acq.path.clone(),
                    reason: e.to_string(),
                }),
                UnreadablePolicy::SkipAndReport => {
                    warn!("Skipping unreadable raster {}: {}", acq.path.display(), e);
                    Ok(None)
                }
            },
        }
    }
}

/// Acquisitions that at least one range covers, ascending, each with the
/// ascending indices of the features whose range holds it.
///
/// Sweeps the acquisition axis once, adding a feature where its range starts
/// and dropping it where the range ends.
fn acquisition_members(ranges: &[Range<usize>], len: usize) -> Vec<(usize, Vec<usize>)> {
    let mut starts: Vec<Vec<usize>> = vec![Vec::new(); len];
    let mut ends: Vec<Vec<usize>> = vec![Vec::new(); len + 1];
    for (i, r) in ranges.iter().enumerate().filter(|(_, r)| !r.is_empty()) {
        starts[r.start].push(i);
        ends[r.end].push(i);
    }

    let mut active = BTreeSet::new();
    let mut plan = Vec::new();
    for (j, starting) in starts.into_iter().enumerate() {
        for i in &ends[j] {
            active.remove(i);
        }
        active.extend(starting);
        if !active.is_empty() {
            plan.push((j, active.iter().copied().collect()));
        }
    }
    plan
}

fn extract_value(grid: &RasterGrid, target: &SampleTarget<'_>, spec: &AggregationSpec) -> ExtractedValue {
    match target {
        SampleTarget::Cell(point) => ExtractedValue::Value(sample_point(grid, point)),
        SampleTarget::Area(area) => {
            let cells = sample_area(grid, area);
            if spec.functions.is_empty() {
                ExtractedValue::Cells(cells)
            } else {
                ExtractedValue::Aggregates(
                    spec.functions.iter().map(|f| (*f, f.apply(&cells))).collect(),
                )
            }
        }
    }
}
