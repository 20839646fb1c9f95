use ndarray::{arr2, Array2};
use sm_window_extract::acquisition::scan_archive;
use sm_window_extract::extract::{AggregationSpec, ExtractedValue, WindowedExtractor};
use sm_window_extract::feature::{load_geojson, DEFAULT_DATE_FIELD};
use sm_window_extract::io::{decode_grid, write_count_grid, write_grid, GeoTiffReader};
use sm_window_extract::output::{write_results, OutputFormat};
use sm_window_extract::{
    accumulate, AggregateFn, ExtractError, ExtractionWindow, GeoReference, GeoTransform,
    RasterGrid,
};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tempfile::tempdir;

/// 3x3 grid covering x in [100, 103], y in [200, 203]
fn georef() -> GeoReference {
    GeoReference::from_transform(GeoTransform::new(100.0, 203.0, 1.0, -1.0))
}

fn write_raster(dir: &Path, name: &str, data: Array2<f64>) {
    write_grid(&RasterGrid::new(data, georef()), dir.join(name)).unwrap();
}

const FEATURES: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": "slide-1",
      "properties": { "event_date": "2020-01-10", "trigger": "rainfall" },
      "geometry": { "type": "Point", "coordinates": [100.5, 202.5] }
    },
    {
      "type": "Feature",
      "id": "slide-2",
      "properties": { "event_date": "2020-01-13" },
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[100.1, 200.1], [102.9, 200.1], [102.9, 201.9], [100.1, 201.9], [100.1, 200.1]]]
      }
    }
  ]
}"#;

#[test]
fn test_extract_from_geotiff_archive() {
    let dir = tempdir().unwrap();
    let archive = dir.path().join("sm");
    fs::create_dir(&archive).unwrap();

    write_raster(&archive, "sm_20200104.tif", Array2::from_elem((3, 3), 0.1));
    write_raster(
        &archive,
        "sm_20200106.tif",
        arr2(&[[0.2, 0.2, 0.2], [0.3, f64::NAN, 0.5], [0.4, 0.4, 0.4]]),
    );
    write_raster(&archive, "sm_20200112.tif", Array2::from_elem((3, 3), 0.5));
    fs::write(archive.join("readme.tif"), b"no date here").unwrap();

    let features_path = dir.path().join("slides.geojson");
    fs::write(&features_path, FEATURES).unwrap();

    let acquisitions = scan_archive(&archive, "*.tif").unwrap();
    assert_eq!(acquisitions.len(), 3);

    let reader = GeoTiffReader;
    let spec = AggregationSpec {
        buffer: None,
        functions: vec![AggregateFn::Mean, AggregateFn::Count],
    };
    let extractor = WindowedExtractor::new(&reader, ExtractionWindow::default(), spec).unwrap();
    let records = load_geojson(&features_path).unwrap();
    let outcome = extractor
        .extract_records(records, DEFAULT_DATE_FIELD, &acquisitions)
        .unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert!(outcome.skipped.is_empty());

    // Point: window 2020-01-05..=2020-01-10 holds only the 01-06 image
    let point = &outcome.results[0];
    assert_eq!(point.feature.id.as_deref(), Some("slide-1"));
    assert_eq!(point.entries.len(), 1);
    assert_eq!(point.entries[0].value, ExtractedValue::Value(0.2));

    // Polygon: window 2020-01-08..=2020-01-13 holds only the 01-12 image
    let polygon = &outcome.results[1];
    assert_eq!(polygon.entries.len(), 1);
    assert_eq!(
        polygon.entries[0].value,
        ExtractedValue::Aggregates(vec![(AggregateFn::Mean, 0.5), (AggregateFn::Count, 6.0)])
    );

    let out = dir.path().join("result.json");
    write_results(&outcome.results, OutputFormat::Json, Some(&out)).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(parsed[0]["attributes"]["trigger"], "rainfall");
    assert_eq!(parsed[1]["entries"][0]["value"]["count"], 6.0);
}

#[test]
fn test_extract_fails_without_event_dates() {
    let dir = tempdir().unwrap();
    write_raster(dir.path(), "sm_20200106.tif", Array2::from_elem((3, 3), 0.2));
    let features_path = dir.path().join("slides.geojson");
    fs::write(&features_path, FEATURES.replace("event_date", "date")).unwrap();

    let acquisitions = scan_archive(dir.path(), "*.tif").unwrap();
    let reader = GeoTiffReader;
    let extractor = WindowedExtractor::new(
        &reader,
        ExtractionWindow::default(),
        AggregationSpec::default(),
    )
    .unwrap();

    let err = extractor
        .extract_records(
            load_geojson(&features_path).unwrap(),
            DEFAULT_DATE_FIELD,
            &acquisitions,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ExtractError::MissingRequiredAttribute { feature_index: None, .. }
    ));
}

#[test]
fn test_accumulate_and_write_counts() {
    let dir = tempdir().unwrap();
    let stack = [
        arr2(&[[0.5, 0.0], [0.2, -0.1]]),
        arr2(&[[0.1, 0.3], [0.0, 0.0]]),
        arr2(&[[f64::NAN, 0.0], [0.4, 0.0]]),
    ];
    let paths: Vec<_> = stack
        .iter()
        .enumerate()
        .map(|(i, data)| {
            let path = dir.path().join(format!("wet_{i}.tif"));
            write_grid(&RasterGrid::new(data.clone(), georef()), &path).unwrap();
            path
        })
        .collect();

    let counts = accumulate(&paths, &GeoTiffReader).unwrap();
    assert_eq!(counts.counts(), &arr2(&[[2u32, 1], [2, 0]]));
    assert_eq!(counts.image_count(), 3);

    let out = dir.path().join("count.tif");
    write_count_grid(&counts, &out).unwrap();
    let decoded = decode_grid(BufReader::new(File::open(&out).unwrap())).unwrap();
    assert_eq!(decoded.shape(), (2, 2));
    assert_eq!(decoded.value_at(0, 0), 2.0);
    assert_eq!(decoded.value_at(1, 1), 0.0);
    assert_eq!(*decoded.transform(), georef().transform);
}

#[test]
fn test_accumulate_rejects_mismatched_stack() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.tif");
    let b = dir.path().join("b.tif");
    write_grid(&RasterGrid::new(Array2::from_elem((2, 2), 1.0), georef()), &a).unwrap();
    write_grid(&RasterGrid::new(Array2::from_elem((3, 2), 1.0), georef()), &b).unwrap();

    let err = accumulate(&[a, b.clone()], &GeoTiffReader).unwrap_err();
    match err {
        ExtractError::ShapeMismatch { path, expected, found } => {
            assert_eq!(path, b);
            assert_eq!(expected, (2, 2));
            assert_eq!(found, (3, 2));
        }
        other => panic!("unexpected error: {other}"),
    }
}
