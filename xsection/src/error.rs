//! Error types for section geometry, projection and conversion.

use thiserror::Error;

use crate::geometry::Point;
use crate::projection::Projection;

/// Errors raised by the cross-section engine.
///
/// Every variant carries the identifiers needed to locate the offending
/// feature or line. None of them are fatal: an error aborts only the single
/// operation that raised it.
#[derive(Error, Debug)]
pub enum XsecError {
    /// Fewer than two distinct vertices, or a zero-length segment.
    #[error("degenerate section line {section_id}: {reason}")]
    DegenerateGeometry {
        section_id: String,
        reason: String,
        vertices: Vec<Point>,
    },

    /// The projected point lies farther from the line than the snap tolerance.
    ///
    /// Carries the computed projection so callers can still accept or snap it.
    #[error(
        "{} at ({:.3}, {:.3}) projects {:.3} m from section {section_id} (tolerance {tolerance:.3} m)",
        .feature_id.as_deref().unwrap_or("point"),
        .point.x,
        .point.y,
        .projection.perpendicular_offset
    )]
    ProjectionOutOfTolerance {
        feature_id: Option<String>,
        section_id: String,
        point: Point,
        projection: Projection,
        tolerance: f64,
    },

    /// Mapview-X was requested on a line that is not east-west.
    #[error(
        "section {section_id} deviates {deviation_degrees:.4} deg from east-west (tolerance {tolerance_degrees:.4} deg); mapview-x is undefined"
    )]
    InvalidConvention {
        section_id: String,
        deviation_degrees: f64,
        tolerance_degrees: f64,
    },

    /// A whole dataset could not be converted to the stacked convention.
    #[error(
        "section {section_id} is not eligible for stacked display: deviation {deviation_degrees:.4} deg exceeds {tolerance_degrees:.4} deg"
    )]
    IneligibleLine {
        section_id: String,
        deviation_degrees: f64,
        tolerance_degrees: f64,
    },

    /// Vertical display bands of stacked sections collide.
    #[error("vertical display bands overlap: {}", format_pairs(.section_ids))]
    Overlap { section_ids: Vec<(String, String)> },

    /// A dataset is governed by a different convention than the operation needs.
    #[error("section {section_id} is in {found} convention, expected {expected}")]
    ConventionMismatch {
        section_id: String,
        expected: String,
        found: String,
    },

    /// A stacked dataset has no vertical band assigned.
    #[error("section {section_id} has no vertical band assigned")]
    MissingBand { section_id: String },

    /// A record references a section the caller did not supply.
    #[error("unknown section {section_id}")]
    UnknownSection { section_id: String },

    /// A section line cannot be removed while records reference it.
    #[error("section {section_id} is still referenced by {} record(s)", .feature_ids.len())]
    LineInUse {
        section_id: String,
        feature_ids: Vec<String>,
    },

    /// A conversion mapping write lost an optimistic-concurrency race.
    #[error("conversion mapping for {section_id} changed: expected version {expected}, found {found}")]
    VersionConflict {
        section_id: String,
        expected: u64,
        found: u64,
    },

    /// The mapping marks sections as converted but no converted copy of them
    /// is at hand, so writing the raw records would lose the derived values.
    #[error(
        "section(s) {} already {convention} in the mapping but missing from {output}; refusing to overwrite it with unconverted records",
        .section_ids.join(", ")
    )]
    AlreadyConverted {
        section_ids: Vec<String>,
        convention: String,
        output: String,
    },

    /// Configuration value out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("geojson: {0}")]
    GeoJson(String),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn format_pairs(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(a, b)| format!("{a} <-> {b}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for cross-section operations.
pub type Result<T> = std::result::Result<T, XsecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_message_names_sections() {
        let err = XsecError::Overlap {
            section_ids: vec![("27".into(), "28".into()), ("28".into(), "29".into())],
        };
        let msg = err.to_string();
        assert!(msg.contains("27 <-> 28"));
        assert!(msg.contains("28 <-> 29"));
    }
}
