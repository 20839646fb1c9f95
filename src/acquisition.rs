//! Raster acquisitions: a path plus the date the image was taken.

use crate::error::{ExtractError, Result};
use chrono::NaiveDate;
use glob::glob;
use log::{debug, info, warn};
use regex::Regex;
use serde::Deserialize;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub path: PathBuf,
    pub date: NaiveDate,
}

impl Acquisition {
    pub fn new(path: impl Into<PathBuf>, date: NaiveDate) -> Self {
        Self {
            path: path.into(),
            date,
        }
    }

    /// Build an acquisition from a path whose file name embeds the date
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let name = path.file_name()?.to_str()?;
        let date = parse_date_from_name(name)?;
        Some(Self { path, date })
    }
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|\D)(\d{4})[-_.]?(\d{2})[-_.]?(\d{2})")
            .expect("date pattern is a valid regex")
    })
}

/// First `YYYYMMDD`, `YYYY-MM-DD`, `YYYY_MM_DD` or `YYYY.MM.DD` run that is a real date
pub fn parse_date_from_name(name: &str) -> Option<NaiveDate> {
    date_pattern().captures_iter(name).find_map(|caps| {
        let end = caps.get(0)?.end();
        if name[end..].starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        let year = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let day = caps[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// List rasters in `dir` matching `pattern`, dating each from its file name.
///
/// Files without a recognisable date are skipped with a warning.
pub fn scan_archive(dir: &Path, pattern: &str) -> Result<Vec<Acquisition>> {
    let full_pattern = dir.join(pattern).to_string_lossy().to_string();
    info!("Scanning for rasters with pattern: {}", full_pattern);

    let mut acquisitions = Vec::new();
    for entry in glob(&full_pattern)? {
        match entry {
            Ok(path) => match Acquisition::from_path(path.clone()) {
                Some(acq) => acquisitions.push(acq),
                None => warn!("No acquisition date in file name, skipping: {}", path.display()),
            },
            Err(e) => warn!("Bad path from glob: {:?}", e),
        }
    }

    info!("Found {} dated rasters", acquisitions.len());
    Ok(acquisitions)
}

/// Expand a glob pattern into raster paths, in lexical order
pub fn glob_paths(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full_pattern = dir.join(pattern).to_string_lossy().to_string();
    let mut paths = Vec::new();
    for entry in glob(&full_pattern)? {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => warn!("Bad path from glob: {:?}", e),
        }
    }
    Ok(paths)
}

#[derive(Debug, Deserialize)]
struct ListingRow {
    path: PathBuf,
    date: String,
}

/// Read a sidecar listing CSV with `path,date` columns.
///
/// Relative paths resolve against the listing's directory.
pub fn read_listing(listing: &Path) -> Result<Vec<Acquisition>> {
    info!("Reading acquisition listing: {}", listing.display());
    let base = listing.parent().unwrap_or_else(|| Path::new(""));

    let mut reader = csv::Reader::from_path(listing)?;
    let mut acquisitions = Vec::new();
    for row in reader.deserialize() {
        let row: ListingRow = row?;
        let path = if row.path.is_absolute() {
            row.path
        } else {
            base.join(row.path)
        };
        let date = NaiveDate::parse_from_str(row.date.trim(), "%Y-%m-%d").map_err(|_| {
            ExtractError::InvalidAcquisitionDate {
                path: path.clone(),
                value: row.date.clone(),
            }
        })?;
        acquisitions.push(Acquisition { path, date });
    }

    info!("Listing holds {} acquisitions", acquisitions.len());
    Ok(acquisitions)
}

/// Acquisitions sorted ascending by date for range lookups.
///
/// Sorting is stable, so same-day acquisitions keep their listing order.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionIndex {
    sorted: Vec<Acquisition>,
}

impl AcquisitionIndex {
    pub fn new(mut acquisitions: Vec<Acquisition>) -> Self {
        acquisitions.sort_by_key(|a| a.date);
        debug!("Indexed {} acquisitions", acquisitions.len());
        Self {
            sorted: acquisitions,
        }
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Acquisition> {
        self.sorted.get(index)
    }

    pub fn as_slice(&self) -> &[Acquisition] {
        &self.sorted
    }

    /// Index range of acquisitions dated within `[start, end]`, both ends included
    pub fn range(&self, start: NaiveDate, end: NaiveDate) -> Range<usize> {
        if start > end {
            return 0..0;
        }
        let lo = self.sorted.partition_point(|a| a.date < start);
        let hi = self.sorted.partition_point(|a| a.date <= end);
        lo..hi
    }

    pub fn within(&self, start: NaiveDate, end: NaiveDate) -> &[Acquisition] {
        &self.sorted[self.range(start, end)]
    }
}
