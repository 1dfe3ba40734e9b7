//! Core library for converting geological cross sections between stacked
//! (map easting) and traditional (station along line) display.

pub mod batch;
pub mod config;
pub mod convert;
pub mod dataset;
pub mod display;
pub mod error;
pub mod geometry;
pub mod io;
pub mod mapping;
pub mod projection;
pub mod qc;

pub use config::XsecConfig;
pub use convert::{convert, merge_stacked_group, replicate_records, to_stacked, to_traditional, StackedGroup};
pub use dataset::{Convention, FeatureKind, FeatureRecord, SectionCatalog, SectionDataset};
pub use display::{display_points, DisplayPoint};
pub use error::{Result, XsecError};
pub use geometry::{build_section_line, Point, SectionLine};
pub use mapping::{convert_guarded, ConversionMapping, MappingDb, MappingStore};
pub use projection::{project_point, Projection};
pub use qc::{run_qc, Finding, Severity};
