//! Projection of map features onto section lines.
//!
//! Section lines have few vertices, so the nearest segment is found by a
//! linear scan.

use serde::{Deserialize, Serialize};

use crate::error::{Result, XsecError};
use crate::geometry::{distance, Point, SectionLine};

/// Where a map point lands on a section line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Distance along the line from its first vertex.
    pub station: f64,
    /// Distance from the map point to `on_line`.
    pub perpendicular_offset: f64,
    pub nearest_segment_index: usize,
    /// The closest point on the line.
    pub on_line: Point,
}

/// Closest point on `line` to `point`, without any tolerance check.
///
/// When two segments are equally close the lower segment index wins.
pub fn nearest_on_line(line: &SectionLine, point: Point) -> Projection {
    let stations = line.stations();
    let mut best: Option<Projection> = None;
    for (idx, seg) in line.segments().enumerate() {
        let t = seg.closest_parameter(point);
        let on_line = seg.point_at(t);
        let offset = distance(point, on_line);
        if best.map_or(true, |b| offset < b.perpendicular_offset) {
            best = Some(Projection {
                station: stations[idx] + t * seg.length(),
                perpendicular_offset: offset,
                nearest_segment_index: idx,
                on_line,
            });
        }
    }
    // a SectionLine always has at least one segment
    best.unwrap_or(Projection {
        station: 0.0,
        perpendicular_offset: distance(point, line.vertices()[0]),
        nearest_segment_index: 0,
        on_line: line.vertices()[0],
    })
}

/// Projects `point` onto `line`.
///
/// Returns [`XsecError::ProjectionOutOfTolerance`] when the perpendicular
/// offset exceeds `snap_tolerance`; the error still carries the projection.
pub fn project_point(line: &SectionLine, point: Point, snap_tolerance: f64) -> Result<Projection> {
    let projection = nearest_on_line(line, point);
    if projection.perpendicular_offset > snap_tolerance {
        return Err(XsecError::ProjectionOutOfTolerance {
            feature_id: None,
            section_id: line.section_id().to_string(),
            point,
            projection,
            tolerance: snap_tolerance,
        });
    }
    Ok(projection)
}

/// Mapview-X of `point` for a stacked section: the raw easting.
///
/// Fails with [`XsecError::InvalidConvention`] unless every segment of the
/// line is within `azimuth_tolerance` degrees of east-west.
pub fn stacked_x(line: &SectionLine, point: Point, azimuth_tolerance: f64) -> Result<f64> {
    Ok(line.as_stacked(azimuth_tolerance)?.mapview_x(point))
}

/// Station of `point` for a traditional section.
pub fn traditional_station(line: &SectionLine, point: Point, snap_tolerance: f64) -> Result<Projection> {
    project_point(line, point, snap_tolerance)
}

/// Projects each vertex of a line feature; tolerance is left to the caller.
pub fn project_polyline(line: &SectionLine, vertices: &[Point]) -> Vec<Projection> {
    vertices.iter().map(|v| nearest_on_line(line, *v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::build_section_line;

    fn line(pts: &[(f64, f64)]) -> SectionLine {
        build_section_line("7", pts.iter().map(|&(x, y)| Point::new(x, y)).collect()).unwrap()
    }

    #[test]
    fn east_west_line_station_equals_easting() {
        let l = line(&[(0.0, 0.0), (100.0, 0.0)]);
        let p = Point::new(50.0, 0.0);
        assert_eq!(stacked_x(&l, p, 0.5).unwrap(), 50.0);
        let proj = traditional_station(&l, p, 1.0).unwrap();
        assert!((proj.station - 50.0).abs() < 1e-9);
        assert!(proj.perpendicular_offset.abs() < 1e-9);
    }

    #[test]
    fn diagonal_line_projection() {
        let l = line(&[(0.0, 0.0), (70.0, 70.0)]);
        let proj = traditional_station(&l, Point::new(35.0, 35.0), 1.0).unwrap();
        assert!((proj.station - 49.497474683).abs() < 1e-6);
        assert!(proj.perpendicular_offset < 1e-9);
        assert!(matches!(
            stacked_x(&l, Point::new(35.0, 35.0), 0.5),
            Err(XsecError::InvalidConvention { .. })
        ));
    }

    #[test]
    fn out_of_tolerance_carries_projection() {
        let l = line(&[(0.0, 0.0), (100.0, 0.0)]);
        let err = project_point(&l, Point::new(40.0, 30.0), 10.0).unwrap_err();
        match err {
            XsecError::ProjectionOutOfTolerance { projection, tolerance, .. } => {
                assert!((projection.station - 40.0).abs() < 1e-9);
                assert!((projection.perpendicular_offset - 30.0).abs() < 1e-9);
                assert_eq!(tolerance, 10.0);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn equidistant_point_prefers_lower_segment() {
        // point sits on the bisector of the corner at (10, 0)
        let l = line(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let proj = nearest_on_line(&l, Point::new(12.0, -2.0));
        assert_eq!(proj.nearest_segment_index, 0);
        assert!((proj.station - 10.0).abs() < 1e-9);
    }

    #[test]
    fn bent_line_station_accumulates() {
        let l = line(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let proj = nearest_on_line(&l, Point::new(12.0, 6.0));
        assert_eq!(proj.nearest_segment_index, 1);
        assert!((proj.station - 16.0).abs() < 1e-9);
        assert!((proj.perpendicular_offset - 2.0).abs() < 1e-9);
    }

    #[test]
    fn polyline_vertices_projected_in_order() {
        let l = line(&[(0.0, 0.0), (100.0, 0.0)]);
        let pts = [Point::new(10.0, 5.0), Point::new(20.0, -5.0), Point::new(90.0, 0.0)];
        let stations: Vec<f64> = project_polyline(&l, &pts).iter().map(|p| p.station).collect();
        assert_eq!(stations, vec![10.0, 20.0, 90.0]);
    }
}
