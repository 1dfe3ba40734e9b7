//! Conversion mapping: which convention governs each section.
//!
//! The mapping is the only shared mutable state in the engine. Each entry is
//! a versioned record keyed by section id; writers state the version they
//! read and the write fails with [`XsecError::VersionConflict`] if another
//! writer got there first. A version of `0` means "no record yet".

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::config::XsecConfig;
use crate::convert;
use crate::dataset::{Convention, SectionDataset};
use crate::error::{Result, XsecError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub section_id: String,
    pub convention: Convention,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Storage for conversion mapping records.
pub trait MappingStore {
    fn get(&self, section_id: &str) -> Result<Option<MappingRecord>>;

    /// Stores `convention` for `section_id` if the current version equals
    /// `expected_version`, returning the new record.
    fn compare_and_set(
        &mut self,
        section_id: &str,
        expected_version: u64,
        convention: Convention,
    ) -> Result<MappingRecord>;

    fn records(&self) -> Result<Vec<MappingRecord>>;
}

/// In-process mapping table.
#[derive(Debug, Clone, Default)]
pub struct ConversionMapping {
    records: HashMap<String, MappingRecord>,
}

impl ConversionMapping {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MappingStore for ConversionMapping {
    fn get(&self, section_id: &str) -> Result<Option<MappingRecord>> {
        Ok(self.records.get(section_id).cloned())
    }

    fn compare_and_set(
        &mut self,
        section_id: &str,
        expected_version: u64,
        convention: Convention,
    ) -> Result<MappingRecord> {
        let found = self.records.get(section_id).map_or(0, |r| r.version);
        if found != expected_version {
            return Err(XsecError::VersionConflict {
                section_id: section_id.to_string(),
                expected: expected_version,
                found,
            });
        }
        let rec = MappingRecord {
            section_id: section_id.to_string(),
            convention,
            version: found + 1,
            updated_at: Utc::now(),
        };
        self.records.insert(section_id.to_string(), rec.clone());
        Ok(rec)
    }

    fn records(&self) -> Result<Vec<MappingRecord>> {
        let mut all: Vec<MappingRecord> = self.records.values().cloned().collect();
        all.sort_by(|a, b| a.section_id.cmp(&b.section_id));
        Ok(all)
    }
}

/// Mapping table persisted in SQLite so separate tool runs share it.
pub struct MappingDb {
    conn: Connection,
}

impl MappingDb {
    pub fn open(path: &str) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversion_mapping (
                section_id TEXT PRIMARY KEY,
                convention TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )?;
        Ok(Self { conn })
    }

    fn current_version(&self, section_id: &str) -> Result<u64> {
        let v: Option<i64> = self
            .conn
            .query_row(
                "SELECT version FROM conversion_mapping WHERE section_id = ?1",
                params![section_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(v.unwrap_or(0) as u64)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, i64, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode(raw: (String, String, i64, String)) -> Result<MappingRecord> {
    let (section_id, convention, version, updated_at) = raw;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| XsecError::InvalidConfig(format!("bad timestamp for {section_id}: {e}")))?
        .with_timezone(&Utc);
    Ok(MappingRecord {
        convention: convention.parse()?,
        section_id,
        version: version as u64,
        updated_at,
    })
}

impl MappingStore for MappingDb {
    fn get(&self, section_id: &str) -> Result<Option<MappingRecord>> {
        let raw = self
            .conn
            .query_row(
                "SELECT section_id, convention, version, updated_at
                 FROM conversion_mapping WHERE section_id = ?1",
                params![section_id],
                row_to_record,
            )
            .optional()?;
        raw.map(decode).transpose()
    }

    fn compare_and_set(
        &mut self,
        section_id: &str,
        expected_version: u64,
        convention: Convention,
    ) -> Result<MappingRecord> {
        let now = Utc::now();
        let changed = if expected_version == 0 {
            self.conn.execute(
                "INSERT INTO conversion_mapping (section_id, convention, version, updated_at)
                 VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT(section_id) DO NOTHING",
                params![section_id, convention.as_str(), now.to_rfc3339()],
            )?
        } else {
            self.conn.execute(
                "UPDATE conversion_mapping
                 SET convention = ?2, version = version + 1, updated_at = ?3
                 WHERE section_id = ?1 AND version = ?4",
                params![
                    section_id,
                    convention.as_str(),
                    now.to_rfc3339(),
                    expected_version as i64
                ],
            )?
        };
        if changed == 0 {
            return Err(XsecError::VersionConflict {
                section_id: section_id.to_string(),
                expected: expected_version,
                found: self.current_version(section_id)?,
            });
        }
        self.get(section_id)?.ok_or_else(|| XsecError::UnknownSection {
            section_id: section_id.to_string(),
        })
    }

    fn records(&self) -> Result<Vec<MappingRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT section_id, convention, version, updated_at
             FROM conversion_mapping ORDER BY section_id",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        let mut res = Vec::new();
        for r in rows {
            res.push(decode(r?)?);
        }
        Ok(res)
    }
}

/// Result of a mapping-guarded conversion.
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub dataset: SectionDataset,
    pub record: MappingRecord,
    /// False when the mapping already showed the target convention.
    pub converted: bool,
}

/// Converts `dataset` unless the mapping says it is already in `target`.
///
/// The already-converted check reads the mapping, never the data. On that
/// path the records come back as given, tagged with the mapped convention,
/// so callers holding an earlier converted copy should keep using it. A
/// concurrent writer changing the record between read and write surfaces as
/// [`XsecError::VersionConflict`].
pub fn convert_guarded<S: MappingStore + ?Sized>(
    store: &mut S,
    dataset: &SectionDataset,
    target: Convention,
    config: &XsecConfig,
) -> Result<ConversionOutcome> {
    let current = store.get(dataset.section_id())?;
    if let Some(rec) = current.as_ref().filter(|r| r.convention == target) {
        log::info!(
            "section {} already {} (mapping version {}); skipping",
            rec.section_id,
            target,
            rec.version
        );
        let mut unchanged = dataset.clone();
        unchanged.convention = Some(rec.convention);
        return Ok(ConversionOutcome {
            dataset: unchanged,
            record: rec.clone(),
            converted: false,
        });
    }
    let expected = current.map_or(0, |r| r.version);
    let converted = convert::convert(dataset, target, config)?;
    let record = store.compare_and_set(dataset.section_id(), expected, target)?;
    Ok(ConversionOutcome {
        dataset: converted,
        record,
        converted: true,
    })
}
