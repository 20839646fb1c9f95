//! Raster sampling at feature geometries.
//!
//! Points read the single cell that covers them. Areas (polygons and buffered
//! points) use the cell-centre rule: a cell belongs to the area when its
//! centre lies strictly inside it. Cells whose centre sits on the boundary are
//! left out, and an area too small to hold any centre intersects no cells.

use crate::feature::FeatureGeometry;
use crate::raster::RasterGrid;
use geo::{BoundingRect, Contains, LineString, MultiPolygon, Point, Polygon};
use std::f64::consts::PI;

/// Segments used to approximate a circular point buffer
pub const BUFFER_SEGMENTS: usize = 64;

/// Value of the cell covering `point`; NaN outside the grid or on missing data
pub fn sample_point(grid: &RasterGrid, point: &Point<f64>) -> f64 {
    match grid.cell_at(point.x(), point.y()) {
        Some((row, col)) => grid.value_at(row, col),
        None => f64::NAN,
    }
}

/// Values of every cell whose centre lies inside `area`, in row-major order.
///
/// Missing cells are included as NaN.
pub fn sample_area(grid: &RasterGrid, area: &MultiPolygon<f64>) -> Vec<f64> {
    let Some(bbox) = area.bounding_rect() else {
        return Vec::new();
    };

    let (rows, cols) = grid.shape();
    let Some((row_range, col_range)) = candidate_window(grid, bbox.min(), bbox.max(), rows, cols)
    else {
        return Vec::new();
    };

    let transform = grid.transform();
    let mut values = Vec::new();
    for row in row_range {
        for col in col_range.clone() {
            let (x, y) = transform.cell_center(row, col);
            if area.contains(&Point::new(x, y)) {
                values.push(grid.value_at(row, col));
            }
        }
    }
    values
}

/// Row/column ranges whose cells can have a centre inside the box
fn candidate_window(
    grid: &RasterGrid,
    min: geo::Coord<f64>,
    max: geo::Coord<f64>,
    rows: usize,
    cols: usize,
) -> Option<(std::ops::Range<usize>, std::ops::Range<usize>)> {
    let transform = grid.transform();
    let corners = [
        transform.geo_to_pixel(min.x, min.y),
        transform.geo_to_pixel(min.x, max.y),
        transform.geo_to_pixel(max.x, min.y),
        transform.geo_to_pixel(max.x, max.y),
    ];
    if corners.iter().any(|(c, r)| !c.is_finite() || !r.is_finite()) {
        return None;
    }

    let col_min = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
    let col_max = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
    let row_min = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
    let row_max = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);

    let clamp = |v: f64, limit: usize| v.max(0.0).min(limit as f64) as usize;
    let row_range = clamp(row_min.floor(), rows)..clamp(row_max.ceil(), rows);
    let col_range = clamp(col_min.floor(), cols)..clamp(col_max.ceil(), cols);

    if row_range.is_empty() || col_range.is_empty() {
        None
    } else {
        Some((row_range, col_range))
    }
}

/// Circle of radius `distance` around `point`, as a polygon
pub fn buffer_point(point: &Point<f64>, distance: f64, segments: usize) -> Polygon<f64> {
    let n = segments.max(4);
    let r = distance.abs();
    let (cx, cy) = (point.x(), point.y());

    let mut coords = Vec::with_capacity(n + 1);
    for i in 0..n {
        let angle = 2.0 * PI * i as f64 / n as f64;
        coords.push((cx + r * angle.cos(), cy + r * angle.sin()));
    }
    coords.push(coords[0]);

    Polygon::new(LineString::from(coords), vec![])
}

/// What a geometry resolves to once the buffer setting is applied
pub enum SampleTarget<'a> {
    Cell(&'a Point<f64>),
    Area(std::borrow::Cow<'a, MultiPolygon<f64>>),
}

/// Buffered points become areas; polygons ignore the buffer
pub fn sample_target(geometry: &FeatureGeometry, buffer: Option<f64>) -> SampleTarget<'_> {
    match (geometry, buffer) {
        (FeatureGeometry::Point(p), Some(distance)) if distance > 0.0 => {
            let circle = buffer_point(p, distance, BUFFER_SEGMENTS);
            SampleTarget::Area(std::borrow::Cow::Owned(MultiPolygon::new(vec![circle])))
        }
        (FeatureGeometry::Point(p), _) => SampleTarget::Cell(p),
        (FeatureGeometry::Area(area), _) => SampleTarget::Area(std::borrow::Cow::Borrowed(area)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{GeoReference, GeoTransform};
    use geo::Area;
    use ndarray::Array2;

    /// 4x4 grid, 1-unit cells, origin (0, 4); value = row * 10 + col
    fn grid() -> RasterGrid {
        let data = Array2::from_shape_fn((4, 4), |(r, c)| (r * 10 + c) as f64);
        RasterGrid::new(
            data,
            GeoReference::from_transform(GeoTransform::new(0.0, 4.0, 1.0, -1.0)),
        )
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)]),
            vec![],
        )])
    }

    #[test]
    fn test_sample_point_covering_cell() {
        let g = grid();
        assert_eq!(sample_point(&g, &Point::new(0.5, 3.5)), 0.0);
        assert_eq!(sample_point(&g, &Point::new(2.2, 1.7)), 22.0);
    }

    #[test]
    fn test_sample_point_outside_is_missing() {
        let g = grid();
        assert!(sample_point(&g, &Point::new(5.0, 1.0)).is_nan());
        assert!(sample_point(&g, &Point::new(1.0, 4.5)).is_nan());
    }

    #[test]
    fn test_sample_area_cell_centre_rule() {
        let g = grid();
        // Covers centres (0.5, 3.5), (1.5, 3.5), (0.5, 2.5), (1.5, 2.5)
        let mut values = sample_area(&g, &square(0.2, 2.2, 1.8, 3.8));
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(values, vec![0.0, 1.0, 10.0, 11.0]);
    }

    #[test]
    fn test_sample_area_too_small_for_any_centre() {
        let g = grid();
        assert!(sample_area(&g, &square(0.6, 3.6, 0.9, 3.9)).is_empty());
    }

    #[test]
    fn test_sample_area_outside_grid() {
        let g = grid();
        assert!(sample_area(&g, &square(10.0, 10.0, 12.0, 12.0)).is_empty());
    }

    #[test]
    fn test_sample_area_clipped_at_edge() {
        let g = grid();
        // Half of the box hangs off the right edge
        let values = sample_area(&g, &square(3.2, 0.2, 6.0, 0.8));
        assert_eq!(values, vec![33.0]);
    }

    #[test]
    fn test_buffer_point_area() {
        let circle = buffer_point(&Point::new(0.0, 0.0), 10.0, 64);
        let expected = PI * 100.0;
        assert!((circle.unsigned_area() - expected).abs() / expected < 0.01);
        assert_eq!(circle.exterior().0.len(), 65);
    }

    #[test]
    fn test_sample_target_buffer_only_applies_to_points() {
        let point = FeatureGeometry::Point(Point::new(1.0, 1.0));
        assert!(matches!(sample_target(&point, None), SampleTarget::Cell(_)));
        assert!(matches!(sample_target(&point, Some(0.0)), SampleTarget::Cell(_)));
        assert!(matches!(sample_target(&point, Some(2.0)), SampleTarget::Area(_)));

        let area = FeatureGeometry::Area(square(0.0, 0.0, 1.0, 1.0));
        match sample_target(&area, Some(5.0)) {
            SampleTarget::Area(a) => assert_eq!(*a, square(0.0, 0.0, 1.0, 1.0)),
            SampleTarget::Cell(_) => panic!("polygon sampled as a cell"),
        }
    }

    #[test]
    fn test_buffered_point_collects_neighbourhood() {
        let g = grid();
        // Radius 1.2 around the centre of cell (1, 1) reaches its four edge neighbours
        let point = FeatureGeometry::Point(Point::new(1.5, 2.5));
        let target = sample_target(&point, Some(1.2));
        let SampleTarget::Area(area) = target else {
            panic!("expected an area");
        };
        let mut values = sample_area(&g, &area);
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(values, vec![1.0, 10.0, 11.0, 12.0, 21.0]);
    }
}
