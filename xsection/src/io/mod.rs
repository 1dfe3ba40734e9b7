//! File input and output for section data.

use std::fs::File;
use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::XsecConfig;
use crate::error::Result;

pub mod exchange;

pub use exchange::{
    lines_to_geojson, parse_lines_geojson, parse_records_geojson, read_sections_geojson,
    records_to_geojson, SectionFeature,
};

/// Reads a file to string.
pub fn read_to_string(path: &str) -> Result<String> {
    let mut buffer = String::new();
    File::open(path)?.read_to_string(&mut buffer)?;
    Ok(buffer)
}

/// Writes a string to a file, replacing any existing contents.
pub fn write_string(path: &str, contents: &str) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

/// Reads any serde type from a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &str) -> Result<T> {
    let contents = read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Writes any serde type as pretty-printed JSON.
pub fn write_json<T: Serialize + ?Sized>(path: &str, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_string(path, &json)
}

/// Loads a config file and checks its values.
pub fn read_config(path: &str) -> Result<XsecConfig> {
    let cfg: XsecConfig = read_json(path)?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{FeatureRecord, SectionDataset};
    use crate::error::XsecError;
    use crate::geometry::{build_section_line, Point};
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    #[test]
    fn dataset_json_file_roundtrip() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let file = tmp.child("sections.json");
        let line = build_section_line("7", vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]).unwrap();
        let ds = vec![SectionDataset::new(line, vec![FeatureRecord::point("a", "7", 1.0, 0.0, 2.0)]).with_band(3)];
        write_json(file.path().to_str().unwrap(), &ds).unwrap();
        file.assert(predicate::str::contains("\"band\": 3"));
        let back: Vec<SectionDataset> = read_json(file.path().to_str().unwrap()).unwrap();
        assert_eq!(back, ds);
    }

    #[test]
    fn invalid_line_rejected_on_load() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let file = tmp.child("bad.json");
        file.write_str(r#"{"line": {"section_id": "x", "vertices": [{"x": 1.0, "y": 1.0}]}}"#)
            .unwrap();
        let res: Result<SectionDataset> = read_json(file.path().to_str().unwrap());
        assert!(matches!(res, Err(XsecError::Json(_))));
    }

    #[test]
    fn config_file_is_validated() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let good = tmp.child("good.json");
        good.write_str(r#"{"gap_threshold": 250.0}"#).unwrap();
        assert_eq!(read_config(good.path().to_str().unwrap()).unwrap().gap_threshold, 250.0);
        let bad = tmp.child("bad.json");
        bad.write_str(r#"{"snap_tolerance": -1.0}"#).unwrap();
        assert!(matches!(
            read_config(bad.path().to_str().unwrap()),
            Err(XsecError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(read_to_string("/nonexistent/xsec.json"), Err(XsecError::Io(_))));
    }
}
