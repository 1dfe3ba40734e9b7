//! Quality-control checks for section datasets.
//!
//! Every check runs independently and contributes zero or more findings.
//! Nothing here mutates data or stops early: the caller always gets the full
//! list and decides what to fix.

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::config::XsecConfig;
use crate::dataset::{Convention, FeatureRecord, SectionDataset};
use crate::error::Result;
use crate::geometry::{azimuth_deviation, Point, SectionLine};
use crate::projection::nearest_on_line;

/// ERROR blocks downstream use of the data; WARNING does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Warning,
    Error,
}

/// Which rule produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Alignment,
    Monotonicity,
    Duplicate,
    Gap,
    Orphan,
    LargeOffset,
    Fold,
    DuplicateLine,
    LineInUse,
}

/// A single rule violation with enough context to locate and fix it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub check: Check,
    pub section_id: String,
    pub feature_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<String>,
    pub message: String,
}

impl Finding {
    fn new(severity: Severity, check: Check, section_id: &str, message: String) -> Self {
        Self {
            severity,
            check,
            section_id: section_id.to_string(),
            feature_ids: Vec::new(),
            location: None,
            station: None,
            expected: None,
            found: None,
            message,
        }
    }

    fn features<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    fn at(mut self, location: Point, station: Option<f64>) -> Self {
        self.location = Some(location);
        self.station = station;
        self
    }

    fn expected_found(mut self, expected: String, found: String) -> Self {
        self.expected = Some(expected);
        self.found = Some(found);
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Station of a record: the assigned one, else a fresh projection.
fn station_of(line: &SectionLine, rec: &FeatureRecord) -> f64 {
    rec.station
        .unwrap_or_else(|| nearest_on_line(line, rec.location()).station)
}

fn offset_of(line: &SectionLine, rec: &FeatureRecord) -> f64 {
    rec.perpendicular_offset
        .unwrap_or_else(|| nearest_on_line(line, rec.location()).perpendicular_offset)
}

/// Runs the full battery of checks against one dataset.
pub fn run_qc(dataset: &SectionDataset, config: &XsecConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    findings.extend(check_alignment(dataset, config));
    findings.extend(check_monotonicity(dataset, config));
    findings.extend(check_duplicates(dataset, config));
    findings.extend(check_gaps(dataset, config));
    findings.extend(check_orphans(dataset));
    findings.extend(check_offsets(dataset, config));
    findings.extend(check_folds(dataset));
    log::debug!(
        "qc of section {}: {} finding(s)",
        dataset.section_id(),
        findings.len()
    );
    findings
}

/// ERROR when a dataset tagged stacked sits on a line that is not east-west.
pub fn check_alignment(dataset: &SectionDataset, config: &XsecConfig) -> Vec<Finding> {
    if dataset.convention != Some(Convention::Stacked) {
        return Vec::new();
    }
    let deviation = azimuth_deviation(&dataset.line);
    if deviation <= config.azimuth_tolerance {
        return Vec::new();
    }
    vec![Finding::new(
        Severity::Error,
        Check::Alignment,
        dataset.section_id(),
        format!(
            "stacked section deviates {:.4} deg from east-west",
            deviation
        ),
    )
    .at(dataset.line.vertices()[0], None)
    .expected_found(
        format!("<= {:.4} deg", config.azimuth_tolerance),
        format!("{deviation:.4} deg"),
    )]
}

/// ERROR when boundary stations decrease along the boundary's vertex order.
pub fn check_monotonicity(dataset: &SectionDataset, config: &XsecConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (boundary_id, recs) in dataset.boundaries() {
        for pair in recs.windows(2) {
            let prev = station_of(&dataset.line, pair[0]);
            let cur = station_of(&dataset.line, pair[1]);
            if cur + config.station_epsilon < prev {
                findings.push(
                    Finding::new(
                        Severity::Error,
                        Check::Monotonicity,
                        dataset.section_id(),
                        format!("boundary {boundary_id} turns back along the section"),
                    )
                    .features([pair[0].feature_id.as_str(), pair[1].feature_id.as_str()])
                    .at(pair[1].location(), Some(cur))
                    .expected_found(format!("station >= {prev:.3}"), format!("{cur:.3}")),
                );
            }
        }
    }
    findings
}

/// WARNING for records sharing section, station and elevation within
/// `duplicate_epsilon`. Each cluster of duplicates yields one finding.
///
/// Clusters are anchored on their lowest-station record: every member lies
/// within `duplicate_epsilon` of the anchor, so a run of records spaced just
/// under the epsilon never collapses into one cluster.
pub fn check_duplicates(dataset: &SectionDataset, config: &XsecConfig) -> Vec<Finding> {
    let eps = config.duplicate_epsilon;
    let mut by_section: BTreeMap<&str, Vec<(f64, &FeatureRecord)>> = BTreeMap::new();
    for rec in &dataset.records {
        by_section
            .entry(rec.section_id.as_str())
            .or_default()
            .push((station_of(&dataset.line, rec), rec));
    }

    let mut findings = Vec::new();
    for (section_id, mut recs) in by_section {
        recs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut assigned = vec![false; recs.len()];
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        for anchor in 0..recs.len() {
            if assigned[anchor] {
                continue;
            }
            let (station, rec) = recs[anchor];
            let mut members = vec![anchor];
            for j in (anchor + 1)..recs.len() {
                if recs[j].0 - station > eps {
                    break;
                }
                if !assigned[j] && (recs[j].1.elevation - rec.elevation).abs() <= eps {
                    assigned[j] = true;
                    members.push(j);
                }
            }
            clusters.push(members);
        }
        for members in clusters.iter().filter(|m| m.len() > 1) {
            let (station, first) = recs[members[0]];
            findings.push(
                Finding::new(
                    Severity::Warning,
                    Check::Duplicate,
                    section_id,
                    format!(
                        "{} records share station {:.3} and elevation {:.3}",
                        members.len(),
                        station,
                        first.elevation
                    ),
                )
                .features(members.iter().map(|&i| recs[i].1.feature_id.as_str()))
                .at(first.location(), Some(station)),
            );
        }
    }
    findings
}

/// WARNING when consecutive boundary records leave a station gap larger
/// than `gap_threshold`.
pub fn check_gaps(dataset: &SectionDataset, config: &XsecConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (boundary_id, recs) in dataset.boundaries() {
        for pair in recs.windows(2) {
            let a = station_of(&dataset.line, pair[0]);
            let b = station_of(&dataset.line, pair[1]);
            let gap = (b - a).abs();
            if gap > config.gap_threshold {
                findings.push(
                    Finding::new(
                        Severity::Warning,
                        Check::Gap,
                        dataset.section_id(),
                        format!("boundary {boundary_id} has a {gap:.3} m gap; data may be missing"),
                    )
                    .features([pair[0].feature_id.as_str(), pair[1].feature_id.as_str()])
                    .at(pair[0].location(), Some(a))
                    .expected_found(
                        format!("gap <= {:.3}", config.gap_threshold),
                        format!("{gap:.3}"),
                    ),
                );
            }
        }
    }
    findings
}

/// ERROR for records whose section id does not match the dataset's line.
pub fn check_orphans(dataset: &SectionDataset) -> Vec<Finding> {
    dataset
        .records
        .iter()
        .filter(|r| r.section_id != dataset.section_id())
        .map(|r| {
            let message = format!(
                "feature {} does not belong to section {}",
                r.feature_id,
                dataset.section_id()
            );
            orphan_finding(r, dataset.section_id(), message)
        })
        .collect()
}

fn orphan_finding(rec: &FeatureRecord, expected: &str, message: String) -> Finding {
    Finding::new(Severity::Error, Check::Orphan, &rec.section_id, message)
            .features([rec.feature_id.as_str()])
        .at(rec.location(), None)
        .expected_found(expected.to_string(), rec.section_id.clone())
}

/// WARNING for records lying farther from the line than `offset_warning`.
pub fn check_offsets(dataset: &SectionDataset, config: &XsecConfig) -> Vec<Finding> {
    dataset
        .records
        .iter()
        .filter(|r| r.section_id == dataset.section_id())
        .filter_map(|r| {
            let offset = offset_of(&dataset.line, r);
            (offset > config.offset_warning).then(|| {
                Finding::new(
                    Severity::Warning,
                    Check::LargeOffset,
                    dataset.section_id(),
                    format!("feature {} lies {:.3} m off the section line", r.feature_id, offset),
                )
                .features([r.feature_id.as_str()])
                .at(r.location(), r.station)
                .expected_found(
                    format!("offset <= {:.3}", config.offset_warning),
                    format!("{offset:.3}"),
                )
            })
        })
        .collect()
}

/// WARNING where a boundary doubles back horizontally on either side of its
/// lowest vertex, i.e. it was drawn on top of itself.
pub fn check_folds(dataset: &SectionDataset) -> Vec<Finding> {
    let convention = dataset.convention.unwrap_or(Convention::Stacked);
    let mut findings = Vec::new();
    for (boundary_id, recs) in dataset.boundaries() {
        if recs.len() < 3 {
            continue;
        }
        let xs: Vec<f64> = recs
            .iter()
            .map(|r| r.horizontal(convention).unwrap_or(r.map_x))
            .collect();
        let zs: Vec<f64> = recs.iter().map(|r| r.elevation).collect();
        let fold = fold_vertices(&xs, &zs);
        if fold.is_empty() {
            continue;
        }
        let first = fold[0];
        findings.push(
            Finding::new(
                Severity::Warning,
                Check::Fold,
                dataset.section_id(),
                format!("boundary {boundary_id} is drawn back over itself"),
            )
            .features(fold.iter().map(|&i| recs[i].feature_id.as_str()))
            .at(recs[first].location(), recs[first].station),
        );
    }
    findings
}

/// Indices of vertices where the horizontal direction reverses, walking
/// outward from the lowest vertex.
fn fold_vertices(xs: &[f64], zs: &[f64]) -> Vec<usize> {
    let n = xs.len();
    let left_to_right = xs[0] < xs[n - 1];
    if xs[0] == xs[n - 1] {
        return Vec::new();
    }
    let min_z = zs.iter().copied().fold(f64::INFINITY, f64::min);
    let lowest: Vec<usize> = (0..n).filter(|&i| zs[i] == min_z).collect();
    let (lo, hi) = (lowest[0], lowest[lowest.len() - 1]);

    let mut hits = Vec::new();
    let mut push = |i: usize, j: usize| {
        for k in [i, j] {
            if !hits.contains(&k) {
                hits.push(k);
            }
        }
    };
    // before the lowest vertex x should move away from it toward the start
    for i in (0..lo).rev() {
        let reversed = if left_to_right { xs[i] > xs[i + 1] } else { xs[i] < xs[i + 1] };
        if reversed {
            push(i, i + 1);
        }
    }
    for i in (hi + 1)..n {
        let reversed = if left_to_right { xs[i] < xs[i - 1] } else { xs[i] > xs[i - 1] };
        if reversed {
            push(i - 1, i);
        }
    }
    hits.sort_unstable();
    hits
}

/// Checks a whole catalog: each section id must name exactly one line and
/// every record must reference an existing line.
pub fn check_catalog(lines: &[SectionLine], records: &[FeatureRecord]) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for line in lines {
        *counts.entry(line.section_id()).or_default() += 1;
    }
    for (id, count) in counts.iter().filter(|(_, c)| **c > 1) {
        findings.push(
            Finding::new(
                Severity::Error,
                Check::DuplicateLine,
                id,
                format!("section id {id} names {count} lines"),
            )
            .expected_found("1 line".into(), format!("{count} lines")),
        );
    }
    for rec in records.iter().filter(|r| !counts.contains_key(r.section_id.as_str())) {
        let message = format!(
            "feature {} references section {} which has no line",
            rec.feature_id, rec.section_id
        );
        findings.push(orphan_finding(rec, "an existing section", message));
    }
    findings
}

/// ERROR if any record still references `section_id`, meaning the line
/// cannot be deleted yet.
pub fn check_line_removal(section_id: &str, records: &[FeatureRecord]) -> Vec<Finding> {
    let ids: Vec<&str> = records
        .iter()
        .filter(|r| r.section_id == section_id)
        .map(|r| r.feature_id.as_str())
        .collect();
    if ids.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        Severity::Error,
        Check::LineInUse,
        section_id,
        format!(
            "section {section_id} is referenced by {} record(s); reassign or remove them first",
            ids.len()
        ),
    )
    .features(ids)]
}

/// Counts of findings by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QcSummary {
    pub errors: usize,
    pub warnings: usize,
}

impl QcSummary {
    pub fn of(findings: &[Finding]) -> Self {
        findings.iter().fold(Self::default(), |mut s, f| {
            match f.severity {
                Severity::Error => s.errors += 1,
                Severity::Warning => s.warnings += 1,
            }
            s
        })
    }

    pub fn is_blocking(&self) -> bool {
        self.errors > 0
    }
}

/// Receives QC findings for display to an operator.
pub trait FindingSink {
    fn report(&mut self, findings: &[Finding]) -> Result<()>;
}

impl FindingSink for Vec<Finding> {
    fn report(&mut self, findings: &[Finding]) -> Result<()> {
        self.extend_from_slice(findings);
        Ok(())
    }
}

/// Sends findings to the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl FindingSink for LogSink {
    fn report(&mut self, findings: &[Finding]) -> Result<()> {
        for f in findings {
            match f.severity {
                Severity::Error => log::error!(
                    "[{:?}] section {} {:?}: {}",
                    f.check,
                    f.section_id,
                    f.feature_ids,
                    f.message
                ),
                Severity::Warning => log::warn!(
                    "[{:?}] section {} {:?}: {}",
                    f.check,
                    f.section_id,
                    f.feature_ids,
                    f.message
                ),
            }
        }
        Ok(())
    }
}

/// Writes findings as a pretty-printed JSON array.
pub struct JsonSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FindingSink for JsonSink<W> {
    fn report(&mut self, findings: &[Finding]) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, findings)?;
        writeln!(self.writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::to_traditional;
    use crate::geometry::build_section_line;

    fn ew(id: &str) -> SectionLine {
        build_section_line(id, vec![Point::new(0.0, 0.0), Point::new(5000.0, 0.0)]).unwrap()
    }

    #[test]
    fn clean_dataset_has_no_findings() {
        let ds = SectionDataset::new(
            ew("1"),
            vec![
                FeatureRecord::boundary("b0", "1", "till", 0, 10.0, 0.0, 100.0),
                FeatureRecord::boundary("b1", "1", "till", 1, 20.0, 0.0, 90.0),
                FeatureRecord::point("p", "1", 15.0, 2.0, 95.0),
            ],
        );
        let cfg = XsecConfig::default();
        let before = ds.clone();
        assert!(run_qc(&ds, &cfg).is_empty());
        assert_eq!(ds, before);
    }

    #[test]
    fn identical_records_give_one_duplicate_warning() {
        let cfg = XsecConfig::default();
        let mut a = FeatureRecord::point("a", "1", 12.0, 0.0, 100.0);
        let mut b = FeatureRecord::point("b", "1", 12.0, 0.0, 100.0);
        a.station = Some(12.0);
        b.station = Some(12.0);
        let ds = SectionDataset::new(ew("1"), vec![a, b]);
        let findings = run_qc(&ds, &cfg);
        assert_eq!(findings.len(), 1);
        let f = &findings[0];
        assert_eq!(f.severity, Severity::Warning);
        assert_eq!(f.check, Check::Duplicate);
        assert_eq!(f.feature_ids, vec!["a", "b"]);
    }

    #[test]
    fn evenly_spaced_near_duplicates_do_not_chain() {
        let cfg = XsecConfig {
            duplicate_epsilon: 0.01,
            ..XsecConfig::default()
        };
        let records = [("a", 10.000), ("b", 10.008), ("c", 10.016), ("d", 10.024)]
            .into_iter()
            .map(|(id, x)| {
                let mut r = FeatureRecord::point(id, "1", x, 0.0, 100.0);
                r.station = Some(x);
                r
            })
            .collect();
        let ds = SectionDataset::new(ew("1"), records);
        let findings = check_duplicates(&ds, &cfg);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].feature_ids, vec!["a", "b"]);
        assert_eq!(findings[1].feature_ids, vec!["c", "d"]);
    }

    #[test]
    fn decreasing_boundary_station_is_error() {
        let cfg = XsecConfig::default();
        let ds = SectionDataset::new(
            ew("1"),
            vec![
                FeatureRecord::boundary("b0", "1", "till", 0, 30.0, 0.0, 100.0),
                FeatureRecord::boundary("b1", "1", "till", 1, 20.0, 0.0, 90.0),
            ],
        );
        let findings = check_monotonicity(&ds, &cfg);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Error);
        assert_eq!(findings[0].feature_ids, vec!["b0", "b1"]);
        assert_eq!(findings[0].station, Some(20.0));
    }

    #[test]
    fn points_may_be_unordered() {
        let cfg = XsecConfig::default();
        let ds = SectionDataset::new(
            ew("1"),
            vec![
                FeatureRecord::point("p1", "1", 30.0, 0.0, 100.0),
                FeatureRecord::point("p2", "1", 20.0, 0.0, 90.0),
            ],
        );
        assert!(check_monotonicity(&ds, &cfg).is_empty());
    }

    #[test]
    fn gap_warning_uses_threshold() {
        let cfg = XsecConfig {
            gap_threshold: 100.0,
            ..Default::default()
        };
        let ds = SectionDataset::new(
            ew("1"),
            vec![
                FeatureRecord::boundary("b0", "1", "till", 0, 0.0, 0.0, 100.0),
                FeatureRecord::boundary("b1", "1", "till", 1, 50.0, 0.0, 100.0),
                FeatureRecord::boundary("b2", "1", "till", 2, 400.0, 0.0, 100.0),
            ],
        );
        let findings = check_gaps(&ds, &cfg);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].feature_ids, vec!["b1", "b2"]);
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn orphan_and_alignment_errors_collected_together() {
        let cfg = XsecConfig::default();
        let line = build_section_line("d", vec![Point::new(0.0, 0.0), Point::new(70.0, 70.0)]).unwrap();
        let mut ds = SectionDataset::new(
            line,
            vec![
                FeatureRecord::point("ok", "d", 10.0, 10.0, 1.0),
                FeatureRecord::point("lost", "zz", 20.0, 20.0, 1.0),
            ],
        );
        ds.convention = Some(Convention::Stacked);
        let findings = run_qc(&ds, &cfg);
        let checks: Vec<Check> = findings.iter().map(|f| f.check).collect();
        assert_eq!(checks, vec![Check::Alignment, Check::Orphan]);
        assert!(findings.iter().all(|f| f.is_blocking()));
        assert_eq!(findings[1].found.as_deref(), Some("zz"));
        assert_eq!(findings[1].message, "feature lost does not belong to section d");
        assert_eq!(QcSummary::of(&findings).errors, 2);
    }

    #[test]
    fn large_offset_flagged_after_traditional_conversion() {
        let cfg = XsecConfig::default();
        let ds = SectionDataset::new(ew("1"), vec![FeatureRecord::point("far", "1", 10.0, 80.0, 0.0)]);
        let trad = to_traditional(&ds, &cfg);
        let findings = run_qc(&trad, &cfg);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].check, Check::LargeOffset);
    }

    #[test]
    fn fold_detected_left_of_lowest_vertex() {
        // drawn left to right, but the line swings back before its low point
        let xs = [0.0, 20.0, 10.0, 30.0, 40.0];
        let zs = [100.0, 95.0, 90.0, 80.0, 95.0];
        assert_eq!(fold_vertices(&xs, &zs), vec![1, 2]);
        let clean = [0.0, 10.0, 20.0, 30.0, 40.0];
        assert!(fold_vertices(&clean, &zs).is_empty());
    }

    #[test]
    fn catalog_reports_duplicate_lines_and_orphans() {
        let lines = vec![ew("1"), ew("1"), ew("2")];
        let recs = vec![
            FeatureRecord::point("a", "2", 1.0, 0.0, 0.0),
            FeatureRecord::point("b", "3", 1.0, 0.0, 0.0),
        ];
        let findings = check_catalog(&lines, &recs);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].check, Check::DuplicateLine);
        assert_eq!(findings[1].check, Check::Orphan);
        assert_eq!(findings[1].feature_ids, vec!["b"]);
        assert!(findings[1].message.contains("section 3 which has no line"));
    }

    #[test]
    fn line_removal_blocked_by_references() {
        let recs = vec![
            FeatureRecord::point("a", "2", 1.0, 0.0, 0.0),
            FeatureRecord::point("b", "2", 1.0, 0.0, 0.0),
        ];
        let findings = check_line_removal("2", &recs);
        assert_eq!(findings[0].feature_ids, vec!["a", "b"]);
        assert!(check_line_removal("9", &recs).is_empty());
    }

    #[test]
    fn json_sink_writes_array() {
        let findings = vec![Finding::new(Severity::Warning, Check::Gap, "1", "gap".into())];
        let mut sink = JsonSink::new(Vec::new());
        sink.report(&findings).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let back: Vec<Finding> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, findings);
        assert!(text.contains("\"WARNING\""));
    }
}
