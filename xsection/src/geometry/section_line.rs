//! Cross-section lines with precomputed stationing.

use serde::{Deserialize, Serialize};

use super::{distance, Point, Segment};
use crate::error::{Result, XsecError};

/// Ordered polyline along which a cross section is drawn.
///
/// Construction validates the geometry once and stores the cumulative station
/// of each vertex, so station lookups by vertex index are O(1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SectionLineRecord", into = "SectionLineRecord")]
pub struct SectionLine {
    section_id: String,
    vertices: Vec<Point>,
    stations: Vec<f64>,
}

/// Serialised shape of a [`SectionLine`]; stationing is rebuilt on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionLineRecord {
    pub section_id: String,
    pub vertices: Vec<Point>,
}

impl TryFrom<SectionLineRecord> for SectionLine {
    type Error = XsecError;

    fn try_from(rec: SectionLineRecord) -> Result<Self> {
        build_section_line(rec.section_id, rec.vertices)
    }
}

impl From<SectionLine> for SectionLineRecord {
    fn from(line: SectionLine) -> Self {
        Self {
            section_id: line.section_id,
            vertices: line.vertices,
        }
    }
}

/// Whether mapview-X is meaningful for a line, derived from its geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eligibility {
    /// Every segment is within tolerance of due east-west.
    Stacked { deviation_degrees: f64 },
    /// At least one segment exceeds the tolerance.
    Ineligible { deviation_degrees: f64 },
}

/// A section line proven to be east-west within a tolerance.
///
/// Only obtainable through [`SectionLine::as_stacked`], so code holding one
/// never has to trust a caller-supplied flag.
#[derive(Debug, Clone, Copy)]
pub struct StackedLine<'a> {
    line: &'a SectionLine,
    deviation_degrees: f64,
}

impl<'a> StackedLine<'a> {
    pub fn deviation_degrees(&self) -> f64 {
        self.deviation_degrees
    }

    /// Mapview-X of a point: its raw easting.
    pub fn mapview_x(&self, point: Point) -> f64 {
        point.x
    }

    /// Point on the line at easting `x`, taken from the first segment that
    /// spans it.
    pub fn point_at_easting(&self, x: f64) -> Option<Point> {
        self.line.segments().find_map(|seg| {
            let (lo, hi) = (seg.start.x.min(seg.end.x), seg.start.x.max(seg.end.x));
            if x < lo || x > hi || hi == lo {
                return None;
            }
            Some(seg.point_at((x - seg.start.x) / (seg.end.x - seg.start.x)))
        })
    }

    /// Westernmost and easternmost easting of the line.
    pub fn x_extent(&self) -> (f64, f64) {
        self.line.vertices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v.x), hi.max(v.x))
        })
    }
}

/// Constructs a [`SectionLine`] from its vertices.
///
/// Fails with [`XsecError::DegenerateGeometry`] when there are fewer than two
/// distinct vertices, when two consecutive vertices coincide, or when the line
/// crosses or doubles back over itself.
pub fn build_section_line(section_id: impl Into<String>, vertices: Vec<Point>) -> Result<SectionLine> {
    let section_id = section_id.into();
    let degenerate = |reason: String, vertices: &[Point]| XsecError::DegenerateGeometry {
        section_id: section_id.clone(),
        reason,
        vertices: vertices.to_vec(),
    };

    if vertices.iter().any(|v| !v.x.is_finite() || !v.y.is_finite()) {
        return Err(degenerate("non-finite vertex coordinate".into(), &vertices));
    }
    let distinct = vertices
        .first()
        .map(|first| 1 + usize::from(vertices.iter().any(|v| v != first)))
        .unwrap_or(0);
    if distinct < 2 {
        return Err(degenerate(
            format!("needs at least 2 distinct vertices, got {distinct}"),
            &vertices,
        ));
    }

    let mut stations = Vec::with_capacity(vertices.len());
    stations.push(0.0);
    for (idx, pair) in vertices.windows(2).enumerate() {
        let len = distance(pair[0], pair[1]);
        if len == 0.0 {
            return Err(degenerate(
                format!("zero-length segment between vertices {} and {}", idx, idx + 1),
                &vertices,
            ));
        }
        stations.push(stations[idx] + len);
    }

    if let Some((i, j)) = first_self_intersection(&vertices) {
        return Err(degenerate(
            format!("segments {i} and {j} intersect"),
            &vertices,
        ));
    }

    log::debug!(
        "built section line {} with {} vertices, length {:.3}",
        section_id,
        vertices.len(),
        stations[stations.len() - 1]
    );

    Ok(SectionLine {
        section_id,
        vertices,
        stations,
    })
}

fn first_self_intersection(vertices: &[Point]) -> Option<(usize, usize)> {
    let segments: Vec<Segment> = vertices.windows(2).map(|p| Segment::new(p[0], p[1])).collect();
    for i in 0..segments.len() {
        // adjacent segments share a vertex; only a fold back onto itself counts
        if let Some(next) = segments.get(i + 1) {
            let (ax, ay) = segments[i].direction();
            let (bx, by) = next.direction();
            let cross = ax * by - ay * bx;
            let dot = ax * bx + ay * by;
            if cross.abs() < 1e-12 && dot < 0.0 {
                return Some((i, i + 1));
            }
        }
        for j in (i + 2)..segments.len() {
            if segments[i].intersects(&segments[j]) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Station distance at `vertex_index`, or `None` if the index is out of range.
pub fn cumulative_station(line: &SectionLine, vertex_index: usize) -> Option<f64> {
    line.stations.get(vertex_index).copied()
}

/// Maximum absolute deviation in degrees of any segment from due east or due
/// west, whichever is closer.
pub fn azimuth_deviation(line: &SectionLine) -> f64 {
    line.segments()
        .map(|s| s.east_west_deviation())
        .fold(0.0, f64::max)
}

impl SectionLine {
    pub fn section_id(&self) -> &str {
        &self.section_id
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Cumulative station of every vertex.
    pub fn stations(&self) -> &[f64] {
        &self.stations
    }

    /// Total length of the line.
    pub fn length(&self) -> f64 {
        self.stations[self.stations.len() - 1]
    }

    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        self.vertices.windows(2).map(|p| Segment::new(p[0], p[1]))
    }

    /// Classifies the line against an azimuth tolerance in degrees.
    pub fn eligibility(&self, tolerance_degrees: f64) -> Eligibility {
        let deviation_degrees = azimuth_deviation(self);
        if deviation_degrees <= tolerance_degrees {
            Eligibility::Stacked { deviation_degrees }
        } else {
            Eligibility::Ineligible { deviation_degrees }
        }
    }

    /// Returns the stacked-capable view of the line or
    /// [`XsecError::InvalidConvention`] if it is not east-west.
    pub fn as_stacked(&self, tolerance_degrees: f64) -> Result<StackedLine<'_>> {
        match self.eligibility(tolerance_degrees) {
            Eligibility::Stacked { deviation_degrees } => Ok(StackedLine {
                line: self,
                deviation_degrees,
            }),
            Eligibility::Ineligible { deviation_degrees } => Err(XsecError::InvalidConvention {
                section_id: self.section_id.clone(),
                deviation_degrees,
                tolerance_degrees,
            }),
        }
    }

}
