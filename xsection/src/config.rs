//! Tolerances and thresholds shared by projection, conversion and QC.

use serde::{Deserialize, Serialize};

use crate::display::StackedFrame;
use crate::error::{Result, XsecError};

/// Recognised engine options. Distances are meters, angles degrees.
///
/// Every field has a default so a partial JSON document is a valid config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XsecConfig {
    /// Maximum perpendicular offset accepted by `project_point`.
    pub snap_tolerance: f64,
    /// Maximum segment deviation from east-west for stacked display.
    pub azimuth_tolerance: f64,
    /// Station gap between consecutive boundary records reported by QC.
    pub gap_threshold: f64,
    /// Station and elevation distance under which two records are duplicates.
    pub duplicate_epsilon: f64,
    /// Perpendicular offset above which QC warns about a record.
    pub offset_warning: f64,
    /// Slack allowed when checking boundary stations for monotonicity.
    pub station_epsilon: f64,
    /// Vertical band layout of the stacked display.
    pub frame: StackedFrame,
}

impl Default for XsecConfig {
    fn default() -> Self {
        Self {
            snap_tolerance: 50.0,
            azimuth_tolerance: 0.5,
            gap_threshold: 1000.0,
            duplicate_epsilon: 0.01,
            offset_warning: 50.0,
            station_epsilon: 1e-6,
            frame: StackedFrame::default(),
        }
    }
}

impl XsecConfig {
    /// Rejects negative or non-finite settings.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("snap_tolerance", self.snap_tolerance),
            ("azimuth_tolerance", self.azimuth_tolerance),
            ("gap_threshold", self.gap_threshold),
            ("duplicate_epsilon", self.duplicate_epsilon),
            ("offset_warning", self.offset_warning),
            ("station_epsilon", self.station_epsilon),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(XsecError::InvalidConfig(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        if self.azimuth_tolerance >= 90.0 {
            return Err(XsecError::InvalidConfig(format!(
                "azimuth_tolerance must be below 90 degrees, got {}",
                self.azimuth_tolerance
            )));
        }
        self.frame.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: XsecConfig = serde_json::from_str(r#"{"snap_tolerance": 5.0}"#).unwrap();
        assert_eq!(cfg.snap_tolerance, 5.0);
        assert_eq!(cfg.azimuth_tolerance, XsecConfig::default().azimuth_tolerance);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn negative_tolerance_rejected() {
        let cfg = XsecConfig {
            gap_threshold: -1.0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(XsecError::InvalidConfig(_))));
    }
}
