//! Feature records and the section datasets that group them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XsecError};
use crate::geometry::{Point, SectionLine};

/// Which horizontal coordinate governs a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Convention {
    /// Horizontal axis is station along the section line.
    Traditional,
    /// Horizontal axis is map easting; east-west lines only.
    Stacked,
}

impl Convention {
    pub fn as_str(&self) -> &'static str {
        match self {
            Convention::Traditional => "traditional",
            Convention::Stacked => "stacked",
        }
    }
}

impl std::fmt::Display for Convention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Convention {
    type Err = XsecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "traditional" => Ok(Convention::Traditional),
            "stacked" => Ok(Convention::Stacked),
            other => Err(XsecError::InvalidConfig(format!("unknown convention '{other}'"))),
        }
    }
}

/// Point features are unordered; boundary records are vertices of a line
/// feature and ordered by `sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureKind {
    Point,
    Boundary { boundary_id: String, sequence: u32 },
}

/// A feature tied to a section, e.g. a borehole pick or a stratigraphic
/// boundary vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub feature_id: String,
    pub kind: FeatureKind,
    pub map_x: f64,
    pub map_y: f64,
    pub elevation: f64,
    pub section_id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Traditional horizontal coordinate, set by projection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<f64>,
    /// Stacked horizontal coordinate; only defined on east-west lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perpendicular_offset: Option<f64>,
    #[serde(default)]
    pub projects_cleanly: bool,
}

impl FeatureRecord {
    /// Creates a point record with no derived fields.
    pub fn point(
        feature_id: impl Into<String>,
        section_id: impl Into<String>,
        map_x: f64,
        map_y: f64,
        elevation: f64,
    ) -> Self {
        Self {
            feature_id: feature_id.into(),
            kind: FeatureKind::Point,
            map_x,
            map_y,
            elevation,
            section_id: section_id.into(),
            attributes: BTreeMap::new(),
            station: None,
            display_x: None,
            perpendicular_offset: None,
            projects_cleanly: false,
        }
    }

    /// Creates one vertex of a boundary line feature.
    pub fn boundary(
        feature_id: impl Into<String>,
        section_id: impl Into<String>,
        boundary_id: impl Into<String>,
        sequence: u32,
        map_x: f64,
        map_y: f64,
        elevation: f64,
    ) -> Self {
        Self {
            kind: FeatureKind::Boundary {
                boundary_id: boundary_id.into(),
                sequence,
            },
            ..Self::point(feature_id, section_id, map_x, map_y, elevation)
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn location(&self) -> Point {
        Point::new(self.map_x, self.map_y)
    }

    pub fn boundary_id(&self) -> Option<&str> {
        match &self.kind {
            FeatureKind::Boundary { boundary_id, .. } => Some(boundary_id),
            FeatureKind::Point => None,
        }
    }

    /// Horizontal display coordinate under `convention`.
    pub fn horizontal(&self, convention: Convention) -> Option<f64> {
        match convention {
            Convention::Traditional => self.station,
            Convention::Stacked => self.display_x,
        }
    }
}

/// One cross section: its line and the records drawn on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionDataset {
    pub line: SectionLine,
    /// Convention the horizontal coordinates were last derived under.
    #[serde(default)]
    pub convention: Option<Convention>,
    /// Vertical slot in a stacked display.
    #[serde(default)]
    pub band: Option<i64>,
    #[serde(default)]
    pub records: Vec<FeatureRecord>,
}

impl SectionDataset {
    pub fn new(line: SectionLine, records: Vec<FeatureRecord>) -> Self {
        Self {
            line,
            convention: None,
            band: None,
            records,
        }
    }

    pub fn with_band(mut self, band: i64) -> Self {
        self.band = Some(band);
        self
    }

    pub fn section_id(&self) -> &str {
        self.line.section_id()
    }

    /// Boundary records grouped by boundary id, each group ordered by
    /// sequence.
    pub fn boundaries(&self) -> BTreeMap<&str, Vec<&FeatureRecord>> {
        let mut groups: BTreeMap<&str, Vec<(u32, &FeatureRecord)>> = BTreeMap::new();
        for rec in &self.records {
            if let FeatureKind::Boundary { boundary_id, sequence } = &rec.kind {
                groups.entry(boundary_id.as_str()).or_default().push((*sequence, rec));
            }
        }
        groups
            .into_iter()
            .map(|(id, mut recs)| {
                recs.sort_by_key(|(seq, _)| *seq);
                (id, recs.into_iter().map(|(_, r)| r).collect())
            })
            .collect()
    }
}

/// Section lines keyed by section id.
#[derive(Debug, Clone, Default)]
pub struct SectionCatalog {
    lines: BTreeMap<String, SectionLine>,
}

impl SectionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a line, returning the previous one.
    pub fn insert(&mut self, line: SectionLine) -> Option<SectionLine> {
        self.lines.insert(line.section_id().to_string(), line)
    }

    pub fn get(&self, section_id: &str) -> Option<&SectionLine> {
        self.lines.get(section_id)
    }

    pub fn contains(&self, section_id: &str) -> bool {
        self.lines.contains_key(section_id)
    }

    pub fn lines(&self) -> impl Iterator<Item = &SectionLine> {
        self.lines.values()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Removes a line only if no record still references it.
    pub fn remove_line(&mut self, section_id: &str, records: &[FeatureRecord]) -> Result<SectionLine> {
        let referencing: Vec<String> = records
            .iter()
            .filter(|r| r.section_id == section_id)
            .map(|r| r.feature_id.clone())
            .collect();
        if !referencing.is_empty() {
            return Err(XsecError::LineInUse {
                section_id: section_id.to_string(),
                feature_ids: referencing,
            });
        }
        self.lines.remove(section_id).ok_or_else(|| XsecError::UnknownSection {
            section_id: section_id.to_string(),
        })
    }

    /// Groups records into one dataset per known line. Records whose section
    /// id matches no line are returned separately.
    pub fn assemble(&self, records: Vec<FeatureRecord>) -> (Vec<SectionDataset>, Vec<FeatureRecord>) {
        let mut grouped: BTreeMap<String, Vec<FeatureRecord>> = BTreeMap::new();
        let mut orphans = Vec::new();
        for rec in records {
            if self.contains(&rec.section_id) {
                grouped.entry(rec.section_id.clone()).or_default().push(rec);
            } else {
                orphans.push(rec);
            }
        }
        let datasets = self
            .lines
            .values()
            .map(|line| {
                let recs = grouped.remove(line.section_id()).unwrap_or_default();
                SectionDataset::new(line.clone(), recs)
            })
            .collect();
        (datasets, orphans)
    }
}
