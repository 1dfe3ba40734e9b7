//! GeoJSON exchange of section lines and feature records.
//!
//! Lines are `LineString` features carrying a `section_id` property and an
//! optional integer `band`. Records are `Point` features; `feature_id`,
//! `section_id`, `elevation`, `boundary_id` and `sequence` are read from the
//! properties, together with the derived `station`, `display_x`,
//! `perpendicular_offset` and `projects_cleanly` values written by
//! [`records_to_geojson`]. Every other property becomes a record attribute.

use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue};

use crate::dataset::{FeatureKind, FeatureRecord, SectionCatalog, SectionDataset};
use crate::error::{Result, XsecError};
use crate::geometry::{build_section_line, Point, SectionLine};

const RESERVED: &[&str] = &[
    "feature_id",
    "section_id",
    "elevation",
    "boundary_id",
    "sequence",
    "station",
    "display_x",
    "perpendicular_offset",
    "projects_cleanly",
];

/// A section line read from GeoJSON plus its stacked display band, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionFeature {
    pub line: SectionLine,
    pub band: Option<i64>,
}

fn features(text: &str) -> Result<Vec<Feature>> {
    let gj: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| XsecError::GeoJson(e.to_string()))?;
    match gj {
        GeoJson::FeatureCollection(fc) => Ok(fc.features),
        GeoJson::Feature(f) => Ok(vec![f]),
        GeoJson::Geometry(_) => Err(XsecError::GeoJson(
            "expected a Feature or FeatureCollection, found a bare geometry".into(),
        )),
    }
}

fn string_prop(f: &Feature, key: &str) -> Option<String> {
    match f.property(key)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_string(f: &Feature, key: &str, index: usize) -> Result<String> {
    string_prop(f, key)
        .ok_or_else(|| XsecError::GeoJson(format!("feature {index} has no '{key}' property")))
}

fn feature_id(f: &Feature, index: usize) -> Result<String> {
    if let Some(id) = string_prop(f, "feature_id") {
        return Ok(id);
    }
    match &f.id {
        Some(geojson::feature::Id::String(s)) => Ok(s.clone()),
        Some(geojson::feature::Id::Number(n)) => Ok(n.to_string()),
        None => Err(XsecError::GeoJson(format!("feature {index} has no id"))),
    }
}

/// Parses section lines from a GeoJSON document.
pub fn parse_lines_geojson(text: &str) -> Result<Vec<SectionFeature>> {
    let mut out = Vec::new();
    for (i, f) in features(text)?.into_iter().enumerate() {
        let section_id = required_string(&f, "section_id", i)?;
        let band = f.property("band").and_then(JsonValue::as_i64);
        let geometry = f
            .geometry
            .ok_or_else(|| XsecError::GeoJson(format!("section {section_id} has no geometry")))?;
        let ls = geo_types::LineString::<f64>::try_from(geometry.value).map_err(|e| {
            XsecError::GeoJson(format!("section {section_id} is not a LineString: {e}"))
        })?;
        let vertices: Vec<Point> = ls.coords().map(|c| Point::from(*c)).collect();
        let line = build_section_line(section_id, vertices)?;
        out.push(SectionFeature { line, band });
    }
    log::debug!("read {} section line(s) from geojson", out.len());
    Ok(out)
}

/// Parses feature records from a GeoJSON document of `Point` features.
///
/// Elevation comes from the `elevation` property, falling back to the third
/// coordinate of the point.
pub fn parse_records_geojson(text: &str) -> Result<Vec<FeatureRecord>> {
    let mut out = Vec::new();
    for (i, f) in features(text)?.into_iter().enumerate() {
        let feature_id = feature_id(&f, i)?;
        let section_id = required_string(&f, "section_id", i)?;
        let position = match f.geometry.as_ref().map(|g| &g.value) {
            Some(geojson::Value::Point(p)) if p.len() >= 2 => p.clone(),
            _ => {
                return Err(XsecError::GeoJson(format!(
                    "feature {feature_id} is not a Point"
                )))
            }
        };
        let elevation = f
            .property("elevation")
            .and_then(JsonValue::as_f64)
            .or_else(|| position.get(2).copied())
            .ok_or_else(|| XsecError::GeoJson(format!("feature {feature_id} has no elevation")))?;

        let mut rec = match string_prop(&f, "boundary_id") {
            Some(boundary_id) => {
                let sequence = f
                    .property("sequence")
                    .and_then(JsonValue::as_u64)
                    .and_then(|s| u32::try_from(s).ok())
                    .ok_or_else(|| {
                        XsecError::GeoJson(format!(
                            "boundary vertex {feature_id} has no valid 'sequence'"
                        ))
                    })?;
                FeatureRecord::boundary(
                    feature_id,
                    section_id,
                    boundary_id,
                    sequence,
                    position[0],
                    position[1],
                    elevation,
                )
            }
            None => FeatureRecord::point(feature_id, section_id, position[0], position[1], elevation),
        };
        let number = |key: &str| f.property(key).and_then(JsonValue::as_f64);
        rec.station = number("station");
        rec.display_x = number("display_x");
        rec.perpendicular_offset = number("perpendicular_offset");
        rec.projects_cleanly = f
            .property("projects_cleanly")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false);
        if let Some(props) = f.properties {
            for (k, v) in props {
                if !RESERVED.contains(&k.as_str()) && k != "band" {
                    rec.attributes.insert(k, v);
                }
            }
        }
        out.push(rec);
    }
    log::debug!("read {} record(s) from geojson", out.len());
    Ok(out)
}

/// Reads a lines file and a records file and groups the records by section.
/// Records naming an unknown section come back as the second element.
pub fn read_sections_geojson(
    lines_path: &str,
    records_path: &str,
) -> Result<(Vec<SectionDataset>, Vec<FeatureRecord>)> {
    let lines = parse_lines_geojson(&super::read_to_string(lines_path)?)?;
    let records = parse_records_geojson(&super::read_to_string(records_path)?)?;
    let mut catalog = SectionCatalog::new();
    for f in &lines {
        if catalog.insert(f.line.clone()).is_some() {
            log::warn!("section {} defined more than once; keeping the last", f.line.section_id());
        }
    }
    let (mut datasets, orphans) = catalog.assemble(records);
    for ds in &mut datasets {
        ds.band = lines
            .iter()
            .rev()
            .find(|f| f.line.section_id() == ds.section_id())
            .and_then(|f| f.band);
    }
    Ok((datasets, orphans))
}

fn collection(features: Vec<Feature>) -> Result<String> {
    let fc = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    Ok(serde_json::to_string_pretty(&fc)?)
}

fn feature(value: geojson::Value, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Writes section lines as a GeoJSON `FeatureCollection`.
pub fn lines_to_geojson(lines: &[SectionFeature]) -> Result<String> {
    let features = lines
        .iter()
        .map(|f| {
            let ls: geo_types::LineString<f64> =
                f.line.vertices().iter().map(|&p| geo_types::Coord::from(p)).collect();
            let mut props = JsonObject::new();
            props.insert("section_id".into(), f.line.section_id().into());
            if let Some(band) = f.band {
                props.insert("band".into(), band.into());
            }
            feature(geojson::Value::from(&ls), props)
        })
        .collect();
    collection(features)
}

/// Writes records as 3D `Point` features with their derived coordinates.
pub fn records_to_geojson(records: &[FeatureRecord]) -> Result<String> {
    let features = records
        .iter()
        .map(|r| {
            let mut props: JsonObject = r.attributes.clone().into_iter().collect();
            props.insert("feature_id".into(), r.feature_id.clone().into());
            props.insert("section_id".into(), r.section_id.clone().into());
            props.insert("elevation".into(), r.elevation.into());
            if let FeatureKind::Boundary { boundary_id, sequence } = &r.kind {
                props.insert("boundary_id".into(), boundary_id.clone().into());
                props.insert("sequence".into(), (*sequence).into());
            }
            for (key, value) in [
                ("station", r.station),
                ("display_x", r.display_x),
                ("perpendicular_offset", r.perpendicular_offset),
            ] {
                if let Some(v) = value {
                    props.insert(key.into(), v.into());
                }
            }
            if r.station.is_some() || r.projects_cleanly {
                props.insert("projects_cleanly".into(), r.projects_cleanly.into());
            }
            feature(geojson::Value::Point(vec![r.map_x, r.map_y, r.elevation]), props)
        })
        .collect();
    collection(features)
}
