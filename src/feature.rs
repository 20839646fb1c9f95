//! Dated vector features and GeoJSON loading.
//!
//! Raw records carry an open attribute bag. Conversion into a
//! [`VectorFeature`] pulls the event date out of that bag and fails when it is
//! absent, so a feature that reaches the extractor always has a date.

use crate::error::{ExtractError, Result};
use chrono::NaiveDate;
use geo::{Coord, LineString, MultiPolygon, Point, Polygon};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const DEFAULT_DATE_FIELD: &str = "event_date";

/// Attribute value passed through unchanged from input to output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<Value> for AttributeValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => AttributeValue::Null,
            Value::Bool(b) => AttributeValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Int(i),
                None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => AttributeValue::String(s),
            // Nested values are kept as their JSON text
            other => AttributeValue::String(other.to_string()),
        }
    }
}

/// Geometry of a feature: a point, or an area in map units
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureGeometry {
    Point(Point<f64>),
    Area(MultiPolygon<f64>),
}

impl From<Point<f64>> for FeatureGeometry {
    fn from(point: Point<f64>) -> Self {
        FeatureGeometry::Point(point)
    }
}

impl From<Polygon<f64>> for FeatureGeometry {
    fn from(polygon: Polygon<f64>) -> Self {
        FeatureGeometry::Area(MultiPolygon::new(vec![polygon]))
    }
}

impl From<MultiPolygon<f64>> for FeatureGeometry {
    fn from(polygons: MultiPolygon<f64>) -> Self {
        FeatureGeometry::Area(polygons)
    }
}

/// A feature as read from the collection, before its date is checked
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub id: Option<String>,
    pub geometry: FeatureGeometry,
    pub properties: BTreeMap<String, AttributeValue>,
}

impl FeatureRecord {
    pub fn new(geometry: impl Into<FeatureGeometry>) -> Self {
        Self {
            id: None,
            geometry: geometry.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// A feature with a guaranteed event date.
///
/// `attributes` still holds every input property, the date field included.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFeature {
    pub id: Option<String>,
    pub geometry: FeatureGeometry,
    pub event_date: NaiveDate,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl VectorFeature {
    pub fn new(geometry: impl Into<FeatureGeometry>, event_date: NaiveDate) -> Self {
        Self {
            id: None,
            geometry: geometry.into(),
            event_date,
            attributes: BTreeMap::new(),
        }
    }

    /// Promote a record, reading its event date from `date_field`
    pub fn from_record(index: usize, record: FeatureRecord, date_field: &str) -> Result<Self> {
        let event_date = match record.properties.get(date_field) {
            None | Some(AttributeValue::Null) => {
                return Err(ExtractError::MissingRequiredAttribute {
                    attribute: date_field.to_string(),
                    feature_index: Some(index),
                })
            }
            Some(value) => parse_event_date(value).ok_or_else(|| ExtractError::InvalidEventDate {
                feature_index: index,
                value: format!("{:?}", value),
            })?,
        };

        Ok(Self {
            id: record.id,
            geometry: record.geometry,
            event_date,
            attributes: record.properties,
        })
    }
}

/// Convert a whole collection, failing on the first record without a usable date.
///
/// When no record carries `date_field` at all the error names no feature.
pub fn features_from_records(
    records: Vec<FeatureRecord>,
    date_field: &str,
) -> Result<Vec<VectorFeature>> {
    if !records.is_empty() && !records.iter().any(|r| r.properties.contains_key(date_field)) {
        return Err(ExtractError::MissingRequiredAttribute {
            attribute: date_field.to_string(),
            feature_index: None,
        });
    }

    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| VectorFeature::from_record(i, record, date_field))
        .collect()
}

/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, an ISO datetime, or an integer `YYYYMMDD`
pub fn parse_event_date(value: &AttributeValue) -> Option<NaiveDate> {
    match value {
        AttributeValue::String(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(s, "%Y/%m/%d"))
                .ok()
                .or_else(|| {
                    // Datetime: keep the calendar day
                    let head = s.get(..10)?;
                    let rest = &s[10..];
                    if rest.starts_with('T') || rest.starts_with(' ') {
                        NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
                    } else {
                        None
                    }
                })
        }
        AttributeValue::Int(n) if (10_000_101..=99_991_231).contains(n) => {
            let n = *n as i32;
            NaiveDate::from_ymd_opt(n / 10_000, (n / 100 % 100) as u32, (n % 100) as u32)
        }
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct GeoJsonCollection {
    features: Vec<GeoJsonFeature>,
}

#[derive(Debug, Deserialize)]
struct GeoJsonFeature {
    #[serde(default)]
    id: Option<Value>,
    geometry: Option<GeoJsonGeometry>,
    #[serde(default)]
    properties: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJsonGeometry {
    Point { coordinates: Vec<f64> },
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Unsupported,
}

fn ring(coords: &[Vec<f64>]) -> Option<LineString<f64>> {
    coords
        .iter()
        .map(|c| match c.as_slice() {
            [x, y, ..] => Some(Coord { x: *x, y: *y }),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .map(LineString::new)
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    let interiors = interiors
        .iter()
        .map(|r| ring(r))
        .collect::<Option<Vec<_>>>()?;
    Some(Polygon::new(ring(exterior)?, interiors))
}

fn convert_geometry(index: usize, geometry: Option<GeoJsonGeometry>) -> Result<FeatureGeometry> {
    let converted = match geometry {
        Some(GeoJsonGeometry::Point { coordinates }) => match coordinates.as_slice() {
            [x, y, ..] => Some(FeatureGeometry::Point(Point::new(*x, *y))),
            _ => None,
        },
        Some(GeoJsonGeometry::Polygon { coordinates }) => {
            polygon(&coordinates).map(FeatureGeometry::from)
        }
        Some(GeoJsonGeometry::MultiPolygon { coordinates }) => coordinates
            .iter()
            .map(|p| polygon(p))
            .collect::<Option<Vec<_>>>()
            .map(|ps| FeatureGeometry::Area(MultiPolygon::new(ps))),
        Some(GeoJsonGeometry::Unsupported) | None => None,
    };

    converted.ok_or_else(|| {
        ExtractError::UnsupportedGeometry(format!(
            "feature {} needs a Point, Polygon or MultiPolygon geometry",
            index
        ))
    })
}

/// Parse a GeoJSON FeatureCollection from text
pub fn parse_geojson(text: &str) -> Result<Vec<FeatureRecord>> {
    let collection: GeoJsonCollection = serde_json::from_str(text)?;
    collection_to_records(collection)
}

/// Read a GeoJSON FeatureCollection file into raw records, in file order
pub fn load_geojson(path: &Path) -> Result<Vec<FeatureRecord>> {
    info!("Reading features: {}", path.display());
    let file = File::open(path)?;
    let collection: GeoJsonCollection = serde_json::from_reader(BufReader::new(file))?;
    let records = collection_to_records(collection)?;
    info!("Loaded {} features", records.len());
    Ok(records)
}

fn collection_to_records(collection: GeoJsonCollection) -> Result<Vec<FeatureRecord>> {
    collection
        .features
        .into_iter()
        .enumerate()
        .map(|(i, f)| {
            let geometry = convert_geometry(i, f.geometry)?;
            let id = f.id.map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            });
            let properties = f
                .properties
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, AttributeValue::from(v)))
                .collect();
            debug!("Feature {}: id={:?}", i, id);
            Ok(FeatureRecord {
                id,
                geometry,
                properties,
            })
        })
        .collect()
}
