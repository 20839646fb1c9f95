//! Extraction result writers.
//!
//! JSON keeps one object per feature with its attributes and nested entries.
//! CSV is a long table with one row per feature, date and statistic. Missing
//! values are written as JSON `null` and as empty CSV fields.

use crate::error::Result;
use crate::extract::{ExtractedValue, FeatureExtraction};
use crate::feature::AttributeValue;
use clap::ValueEnum;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Serialize)]
struct JsonFeature<'a> {
    index: usize,
    id: Option<&'a str>,
    event_date: String,
    attributes: &'a BTreeMap<String, AttributeValue>,
    entries: Vec<JsonEntry<'a>>,
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    date: String,
    path: String,
    value: JsonValue<'a>,
}

struct JsonValue<'a>(&'a ExtractedValue);

impl Serialize for JsonValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            ExtractedValue::Value(v) => finite(*v).serialize(serializer),
            ExtractedValue::Cells(values) => serializer.collect_seq(values.iter().map(|v| finite(*v))),
            ExtractedValue::Aggregates(values) => {
                let mut map = serializer.serialize_map(Some(values.len()))?;
                for (f, v) in values {
                    map.serialize_entry(f.name(), &finite(*v))?;
                }
                map.end()
            }
        }
    }
}

fn finite(v: f64) -> Option<f64> {
    if v.is_nan() {
        None
    } else {
        Some(v)
    }
}

pub fn write_json<W: Write>(results: &[FeatureExtraction], writer: W) -> Result<()> {
    let features: Vec<JsonFeature<'_>> = results
        .iter()
        .enumerate()
        .map(|(index, r)| JsonFeature {
            index,
            id: r.feature.id.as_deref(),
            event_date: r.feature.event_date.to_string(),
            attributes: &r.feature.attributes,
            entries: r
                .entries
                .iter()
                .map(|e| JsonEntry {
                    date: e.date.to_string(),
                    path: e.path.display().to_string(),
                    value: JsonValue(&e.value),
                })
                .collect(),
        })
        .collect();

    serde_json::to_writer_pretty(writer, &features)?;
    Ok(())
}

#[derive(Serialize)]
struct CsvRow<'a> {
    feature_index: usize,
    id: Option<&'a str>,
    event_date: String,
    date: Option<String>,
    path: Option<String>,
    stat: Option<&'a str>,
    value: Option<f64>,
}

/// Long format; a feature without entries still gets one row with empty value columns
pub fn write_csv<W: Write>(results: &[FeatureExtraction], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    for (index, r) in results.iter().enumerate() {
        let id = r.feature.id.as_deref();
        let event_date = r.feature.event_date.to_string();
        let row = |date: Option<String>, path: Option<String>, stat: Option<&'static str>, value: f64| CsvRow {
            feature_index: index,
            id,
            event_date: event_date.clone(),
            date,
            path,
            stat,
            value: finite(value),
        };

        if r.entries.is_empty() {
            wtr.serialize(row(None, None, None, f64::NAN))?;
            continue;
        }

        for e in &r.entries {
            let date = Some(e.date.to_string());
            let path = Some(e.path.display().to_string());
            match &e.value {
                ExtractedValue::Value(v) => {
                    wtr.serialize(row(date, path, Some("value"), *v))?;
                }
                ExtractedValue::Aggregates(values) => {
                    for (f, v) in values {
                        wtr.serialize(row(date.clone(), path.clone(), Some(f.name()), *v))?;
                    }
                }
                ExtractedValue::Cells(values) => {
                    for v in values {
                        wtr.serialize(row(date.clone(), path.clone(), Some("cell"), *v))?;
                    }
                }
            }
        }
    }

    wtr.flush()?;
    Ok(())
}

/// Write to `path`, or to stdout when no path is given
pub fn write_results(
    results: &[FeatureExtraction],
    format: OutputFormat,
    path: Option<&Path>,
) -> Result<()> {
    let writer: Box<dyn Write> = match path {
        Some(p) => Box::new(BufWriter::new(File::create(p)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    match format {
        OutputFormat::Json => {
            let mut writer = writer;
            write_json(results, &mut writer)?;
            writeln!(writer)?;
            writer.flush()?;
        }
        OutputFormat::Csv => write_csv(results, writer)?,
    }
    Ok(())
}
