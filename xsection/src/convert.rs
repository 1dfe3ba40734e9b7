//! Conversion of section datasets between stacked and traditional display.
//!
//! Conversions are pure: they return a new dataset and leave the input
//! untouched. Elevations and attributes are never modified, only the
//! horizontal coordinate governed by the target convention.

use serde::Serialize;

use crate::config::XsecConfig;
use crate::dataset::{Convention, FeatureRecord, SectionDataset};
use crate::display::{display_points, DisplayPoint, VerticalBand};
use crate::error::{Result, XsecError};
use crate::geometry::{Eligibility, Point, StackedLine};
use crate::projection::project_polyline;

fn stacked_view<'a>(dataset: &'a SectionDataset, config: &XsecConfig) -> Result<StackedLine<'a>> {
    let line = &dataset.line;
    match line.eligibility(config.azimuth_tolerance) {
        Eligibility::Stacked { .. } => line.as_stacked(config.azimuth_tolerance),
        Eligibility::Ineligible { deviation_degrees } => Err(XsecError::IneligibleLine {
            section_id: line.section_id().to_string(),
            deviation_degrees,
            tolerance_degrees: config.azimuth_tolerance,
        }),
    }
}

/// Converts every record of `dataset` to the stacked convention.
///
/// The owning line must pass the east-west check; otherwise the whole dataset
/// fails with [`XsecError::IneligibleLine`] and nothing is converted.
pub fn to_stacked(dataset: &SectionDataset, config: &XsecConfig) -> Result<SectionDataset> {
    let stacked = stacked_view(dataset, config)?;
    if dataset.line.vertices().len() > 2 {
        log::warn!(
            "section {} has {} vertices; check that it runs straight east-west",
            dataset.section_id(),
            dataset.line.vertices().len()
        );
    }

    let mut out = dataset.clone();
    for rec in &mut out.records {
        rec.display_x = Some(stacked.mapview_x(rec.location()));
    }
    out.convention = Some(Convention::Stacked);
    log::info!(
        "converted {} record(s) of section {} to stacked (deviation {:.4} deg)",
        out.records.len(),
        out.section_id(),
        stacked.deviation_degrees()
    );
    Ok(out)
}

/// Converts every record of `dataset` to the traditional convention.
///
/// Always succeeds: records farther than the snap tolerance from the line get
/// `projects_cleanly = false` and are left for QC to report.
pub fn to_traditional(dataset: &SectionDataset, config: &XsecConfig) -> SectionDataset {
    let mut out = dataset.clone();
    let locations: Vec<Point> = out.records.iter().map(|r| r.location()).collect();
    let projections = project_polyline(&out.line, &locations);
    let mut unclean = 0usize;
    for (rec, proj) in out.records.iter_mut().zip(projections) {
        rec.station = Some(proj.station);
        rec.perpendicular_offset = Some(proj.perpendicular_offset);
        rec.projects_cleanly = proj.perpendicular_offset <= config.snap_tolerance;
        if !rec.projects_cleanly {
            unclean += 1;
            log::debug!(
                "feature {} lies {:.3} m off section {}",
                rec.feature_id,
                proj.perpendicular_offset,
                out.line.section_id()
            );
        }
    }
    out.convention = Some(Convention::Traditional);
    log::info!(
        "converted {} record(s) of section {} to traditional ({} beyond snap tolerance)",
        out.records.len(),
        out.section_id(),
        unclean
    );
    out
}

/// Converts to whichever convention is requested.
pub fn convert(dataset: &SectionDataset, target: Convention, config: &XsecConfig) -> Result<SectionDataset> {
    match target {
        Convention::Stacked => to_stacked(dataset, config),
        Convention::Traditional => Ok(to_traditional(dataset, config)),
    }
}

/// One section placed in a stacked display group.
#[derive(Debug, Clone, Serialize)]
pub struct StackedMember {
    pub dataset: SectionDataset,
    /// Vertical display interval the section occupies.
    pub band: VerticalBand,
}

impl StackedMember {
    pub fn section_id(&self) -> &str {
        self.dataset.section_id()
    }
}

/// Several stacked sections sharing one easting axis.
#[derive(Debug, Clone, Serialize)]
pub struct StackedGroup {
    /// Members ordered from the top band down.
    pub members: Vec<StackedMember>,
    /// Westernmost and easternmost easting across all members.
    pub x_extent: (f64, f64),
}

impl StackedGroup {
    /// Display coordinates of every record in the group, top band first.
    pub fn display_points(&self, config: &XsecConfig) -> Result<Vec<DisplayPoint>> {
        let mut points = Vec::new();
        for m in &self.members {
            points.extend(display_points(&m.dataset, &config.frame)?);
        }
        Ok(points)
    }
}

/// Combines stacked datasets into one display group.
///
/// Every member must be in the stacked convention, have an east-west line and
/// a band assigned. A member's band is its frame slot, widened to contain its
/// records' display-y. Fails with [`XsecError::Overlap`] naming every pair of
/// sections whose bands collide.
pub fn merge_stacked_group(datasets: &[SectionDataset], config: &XsecConfig) -> Result<StackedGroup> {
    let mut members = Vec::with_capacity(datasets.len());
    let mut x_extent = (f64::INFINITY, f64::NEG_INFINITY);

    for ds in datasets {
        let stacked = stacked_view(ds, config)?;
        if ds.convention != Some(Convention::Stacked) {
            return Err(XsecError::ConventionMismatch {
                section_id: ds.section_id().to_string(),
                expected: Convention::Stacked.to_string(),
                found: ds
                    .convention
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unconverted".into()),
            });
        }
        let index = ds.band.ok_or_else(|| XsecError::MissingBand {
            section_id: ds.section_id().to_string(),
        })?;

        let mut band = config.frame.band(index);
        for rec in &ds.records {
            band.include(config.frame.display_y(rec.elevation, index));
        }

        let (lo, hi) = stacked.x_extent();
        x_extent = (x_extent.0.min(lo), x_extent.1.max(hi));
        for x in ds.records.iter().filter_map(|r| r.display_x) {
            x_extent = (x_extent.0.min(x), x_extent.1.max(x));
        }

        members.push(StackedMember {
            dataset: ds.clone(),
            band,
        });
    }

    let mut conflicts = Vec::new();
    for i in 0..members.len() {
        for j in (i + 1)..members.len() {
            if members[i].band.overlaps(&members[j].band) {
                conflicts.push((
                    members[i].section_id().to_string(),
                    members[j].section_id().to_string(),
                ));
            }
        }
    }
    if !conflicts.is_empty() {
        return Err(XsecError::Overlap {
            section_ids: conflicts,
        });
    }

    members.sort_by_key(|m| m.band.index);
    log::info!("merged {} stacked section(s)", members.len());
    Ok(StackedGroup { members, x_extent })
}

/// Copies the records drawn on one stacked section onto other stacked
/// sections at the same easting and elevation.
///
/// Each copy takes the target's section id and the target line's northing
/// at its easting, so it projects cleanly. Records whose easting falls
/// outside a target line are skipped.
pub fn replicate_records(
    source: &SectionDataset,
    targets: &[SectionDataset],
    config: &XsecConfig,
) -> Result<Vec<SectionDataset>> {
    stacked_view(source, config)?;
    let mut out = Vec::with_capacity(targets.len());
    for target in targets {
        let stacked = stacked_view(target, config)?;
        let mut copy = target.clone();
        for rec in &source.records {
            let Some(on_target) = stacked.point_at_easting(rec.map_x) else {
                log::warn!(
                    "feature {} at easting {:.3} is outside section {}",
                    rec.feature_id,
                    rec.map_x,
                    target.section_id()
                );
                continue;
            };
            copy.records.push(FeatureRecord {
                section_id: target.section_id().to_string(),
                map_y: on_target.y,
                display_x: Some(rec.map_x),
                station: None,
                perpendicular_offset: None,
                projects_cleanly: false,
                ..rec.clone()
            }
            .with_attribute("source_section", source.section_id()));
        }
        copy.convention = Some(Convention::Stacked);
        out.push(copy);
    }
    Ok(out)
}
