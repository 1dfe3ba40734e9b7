//! Display-space transforms for stacked and traditional sections.
//!
//! A stacked display shares one horizontal axis (easting) across many
//! sections, so each section is given its own vertical slot. Slot `n` holds
//! elevations from zero up to `relief_m`, shifted down by `n * relief_m` and
//! exaggerated by `vertical_exaggeration`, around a fixed `datum`:
//!
//! `y = (elevation * elevation_to_m - relief_m * n) * vertical_exaggeration + datum`
//!
//! The traditional display instead plots true elevation and compresses the
//! horizontal axis: distance along the line is converted to elevation units
//! and divided by `traditional_exaggeration`. The two exaggerations are
//! independent, so a stacked plot drawn at one can be redrawn at another.

use serde::{Deserialize, Serialize};

use crate::dataset::{Convention, SectionDataset};
use crate::error::{Result, XsecError};
use crate::geometry::StackedLine;
use crate::projection::nearest_on_line;

/// Layout constants of the display coordinate systems.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackedFrame {
    /// Factor converting record elevations to meters (0.3048 for feet).
    pub elevation_to_m: f64,
    /// Elevation range in meters reserved for one section.
    pub relief_m: f64,
    /// Exaggeration of the stacked display's vertical axis.
    pub vertical_exaggeration: f64,
    /// Horizontal compression of the traditional display.
    pub traditional_exaggeration: f64,
    /// Display-y of elevation zero in band zero.
    pub datum: f64,
}

impl Default for StackedFrame {
    fn default() -> Self {
        Self {
            elevation_to_m: 0.3048,
            relief_m: 700.0,
            vertical_exaggeration: 50.0,
            traditional_exaggeration: 50.0,
            datum: 23_100_000.0,
        }
    }
}

/// Vertical display-y interval occupied by one stacked section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerticalBand {
    pub index: i64,
    pub bottom: f64,
    pub top: f64,
}

impl VerticalBand {
    /// True when the open intervals share a positive length.
    pub fn overlaps(&self, other: &VerticalBand) -> bool {
        self.bottom < other.top && other.bottom < self.top
    }

    /// Grows the band so it contains `y`.
    pub fn include(&mut self, y: f64) {
        self.bottom = self.bottom.min(y);
        self.top = self.top.max(y);
    }
}

impl StackedFrame {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("elevation_to_m", self.elevation_to_m),
            ("relief_m", self.relief_m),
            ("vertical_exaggeration", self.vertical_exaggeration),
            ("traditional_exaggeration", self.traditional_exaggeration),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(XsecError::InvalidConfig(format!(
                    "frame.{name} must be positive, got {value}"
                )));
            }
        }
        if !self.datum.is_finite() {
            return Err(XsecError::InvalidConfig("frame.datum must be finite".into()));
        }
        Ok(())
    }

    /// Stacked display-y of an elevation drawn in `band`.
    pub fn display_y(&self, elevation: f64, band: i64) -> f64 {
        (elevation * self.elevation_to_m - self.relief_m * band as f64) * self.vertical_exaggeration
            + self.datum
    }

    /// Inverse of [`StackedFrame::display_y`].
    pub fn elevation_at(&self, display_y: f64, band: i64) -> f64 {
        (display_y - self.datum) / (self.vertical_exaggeration * self.elevation_to_m)
            + self.relief_m * band as f64 / self.elevation_to_m
    }

    /// The slot reserved for `band`: elevations from zero to `relief_m`.
    pub fn band(&self, index: i64) -> VerticalBand {
        let bottom = (-self.relief_m * index as f64) * self.vertical_exaggeration + self.datum;
        VerticalBand {
            index,
            bottom,
            top: bottom + self.relief_m * self.vertical_exaggeration,
        }
    }

    /// Traditional display-x of a horizontal distance in meters.
    pub fn traditional_x(&self, distance: f64) -> f64 {
        distance / self.elevation_to_m / self.traditional_exaggeration
    }
}

/// Where one record is drawn in a display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayPoint {
    pub feature_id: String,
    pub section_id: String,
    pub x: f64,
    pub y: f64,
}

/// Display coordinates of every record of a converted dataset.
///
/// Stacked datasets plot easting against the band-shifted display-y and need
/// a band. Traditional datasets plot compressed station against elevation.
pub fn display_points(dataset: &SectionDataset, frame: &StackedFrame) -> Result<Vec<DisplayPoint>> {
    let convention = dataset.convention.ok_or_else(|| XsecError::ConventionMismatch {
        section_id: dataset.section_id().to_string(),
        expected: "stacked or traditional".into(),
        found: "unconverted".into(),
    })?;
    let band = match convention {
        Convention::Stacked => Some(dataset.band.ok_or_else(|| XsecError::MissingBand {
            section_id: dataset.section_id().to_string(),
        })?),
        Convention::Traditional => None,
    };
    let points = dataset
        .records
        .iter()
        .map(|r| {
            let (x, y) = match band {
                Some(band) => (
                    r.display_x.unwrap_or(r.map_x),
                    frame.display_y(r.elevation, band),
                ),
                None => {
                    let station = r
                        .station
                        .unwrap_or_else(|| nearest_on_line(&dataset.line, r.location()).station);
                    (frame.traditional_x(station), r.elevation)
                }
            };
            DisplayPoint {
                feature_id: r.feature_id.clone(),
                section_id: r.section_id.clone(),
                x,
                y,
            }
        })
        .collect();
    Ok(points)
}

/// Redraws points from a stacked display as a traditional display of the
/// same section.
///
/// Horizontal distance is measured from the western end of `line`. Elevation
/// is recovered from the display-y of `band`.
pub fn stacked_to_traditional(
    line: &StackedLine<'_>,
    band: i64,
    points: &[DisplayPoint],
    frame: &StackedFrame,
) -> Vec<DisplayPoint> {
    let (west, _) = line.x_extent();
    points
        .iter()
        .map(|p| DisplayPoint {
            x: frame.traditional_x(p.x - west),
            y: frame.elevation_at(p.y, band),
            ..p.clone()
        })
        .collect()
}
