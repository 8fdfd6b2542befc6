//! The `Cell` data container and its constituent tables (spec.md §3).

pub mod table;

use std::path::PathBuf;
use std::time::SystemTime;

pub use table::{RawRow, RawTable, StepRow, StepsTable, SummaryRow, SummaryTable};

/// Cycle mode, controlling polarity convention and coulombic-efficiency
/// step ordering (spec.md §4.2 rule 3, I6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleMode {
    Anode,
    Cathode,
    Full,
}

/// Identity record for a source file, used to detect staleness of a
/// persisted cell against its source (spec.md §3.1 "FileID").
#[derive(Debug, Clone)]
pub struct FileId {
    pub path: PathBuf,
    pub size: u64,
    pub last_modified: Option<SystemTime>,
    pub last_accessed: Option<SystemTime>,
    pub created: Option<SystemTime>,
    pub location: String,
}

impl FileId {
    pub fn from_path(path: &std::path::Path, location: impl Into<String>) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            last_modified: meta.modified().ok(),
            last_accessed: meta.accessed().ok(),
            created: meta.created().ok(),
            location: location.into(),
        })
    }

    /// A source is stale relative to this FileID if its size or
    /// modification time differ.
    pub fn is_stale_against(&self, current: &FileId) -> bool {
        self.size != current.size || self.last_modified != current.last_modified
    }
}

/// Cell-level metadata: physical properties that do not change across a
/// test (spec.md §6 "Cell metadata exposed after load").
#[derive(Debug, Clone, Default)]
pub struct CellMetadata {
    pub cell_name: Option<String>,
    pub start_datetime: Option<chrono::NaiveDateTime>,
    pub time_zone: Option<String>,
    pub comment: Option<String>,
    pub raw_id: Option<String>,
    pub cellpy_file_version: Option<u32>,
    pub tester: Option<String>,
    pub material: Option<String>,
    pub mass_active: Option<f64>,
    pub mass_total: Option<f64>,
    /// `None` means "not declared by the loader or caller"; the summarizer
    /// logs a fallback of `1.0` rather than silently defaulting (spec.md §9
    /// open question on the historic instrument-specific `1.0` default).
    pub nominal_capacity: Option<f64>,
    pub nominal_capacity_specifics: Option<crate::units::SpecificMode>,
    pub active_electrode_area: Option<f64>,
    pub active_electrode_thickness: Option<f64>,
    pub active_electrode_volume: Option<f64>,
    pub electrolyte_volume: Option<f64>,
    pub electrode_descriptor: Option<String>,
    pub cell_descriptor: Option<String>,
    pub separator_descriptor: Option<String>,
    pub collector_descriptor: Option<String>,
    /// Free-text provenance field carried from `original_source/` loaders
    /// that record the raw data directory; not consumed by derived columns.
    pub raw_data_dir: Option<PathBuf>,
}

/// Per-test metadata: properties of the specific cycling program run
/// (spec.md §6).
#[derive(Debug, Clone)]
pub struct TestMetadata {
    pub cycle_mode: CycleMode,
    pub voltage_lim_low: Option<f64>,
    pub voltage_lim_high: Option<f64>,
    pub channel_index: Option<u32>,
    pub test_id: Option<String>,
    pub creator: Option<String>,
}

impl Default for TestMetadata {
    fn default() -> Self {
        Self {
            cycle_mode: CycleMode::Full,
            voltage_lim_low: None,
            voltage_lim_high: None,
            channel_index: None,
            test_id: None,
            creator: None,
        }
    }
}

/// Raw-unit declaration for one loader (spec.md §4.5): string-valued unit
/// labels for each quantity the loader reports.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct RawUnits {
    pub current: String,
    pub charge: String,
    pub mass: String,
    pub voltage: String,
    pub time: String,
    pub resistance: String,
}

impl Default for RawUnits {
    fn default() -> Self {
        Self {
            current: "A".to_string(),
            charge: "Ah".to_string(),
            mass: "g".to_string(),
            voltage: "V".to_string(),
            time: "sec".to_string(),
            resistance: "ohm".to_string(),
        }
    }
}

/// Process-wide canonical unit system (spec.md §4.5).
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct CellpyUnits {
    pub current: String,
    pub charge: String,
    pub voltage: String,
    pub time: String,
    pub resistance: String,
    pub specific_gravimetric: String,
    pub specific_areal: String,
    pub specific_volumetric: String,
}

impl Default for CellpyUnits {
    fn default() -> Self {
        Self {
            current: "A".to_string(),
            charge: "mAh".to_string(),
            voltage: "V".to_string(),
            time: "sec".to_string(),
            resistance: "ohm".to_string(),
            specific_gravimetric: "g".to_string(),
            specific_areal: "cm**2".to_string(),
            specific_volumetric: "cm**3".to_string(),
        }
    }
}

/// The Cell container (spec.md §3.1): raw/steps/summary tables, file
/// identifiers, and metadata. Owns all four tables exclusively; mutated
/// only by the loader (raw + initial metadata), the step classifier
/// (steps), and the summarizer (summary).
#[derive(Debug, Clone)]
pub struct Cell {
    pub raw: RawTable,
    pub steps: StepsTable,
    pub summary: SummaryTable,
    pub files: Vec<FileId>,
    pub metadata: CellMetadata,
    pub test_metadata: TestMetadata,
    pub raw_units: RawUnits,
    pub cellpy_units: CellpyUnits,
}

impl Cell {
    pub fn empty(test_metadata: TestMetadata, raw_units: RawUnits) -> Self {
        Self {
            raw: RawTable::default(),
            steps: StepsTable::default(),
            summary: SummaryTable::default(),
            files: Vec::new(),
            metadata: CellMetadata::default(),
            test_metadata,
            raw_units,
            cellpy_units: CellpyUnits::default(),
        }
    }

    /// Nominal capacity resolved from metadata, falling back to `1.0` with
    /// a logged warning when absent (spec.md §9 open question).
    pub fn nominal_capacity_or_fallback(&self) -> f64 {
        match self.metadata.nominal_capacity {
            Some(c) => c,
            None => {
                tracing::warn!(
                    cell = ?self.metadata.cell_name,
                    "nominal_capacity missing; falling back to 1.0 (specific-capacity columns will equal absolute values)"
                );
                1.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fileid_staleness_detects_size_change() {
        let a = FileId {
            path: "a.txt".into(),
            size: 100,
            last_modified: None,
            last_accessed: None,
            created: None,
            location: "local".into(),
        };
        let mut b = a.clone();
        b.size = 200;
        assert!(a.is_stale_against(&b));
        assert!(!a.is_stale_against(&a.clone()));
    }

    #[test]
    fn nominal_capacity_fallback_logs_and_defaults() {
        let cell = Cell::empty(TestMetadata::default(), RawUnits::default());
        assert_eq!(cell.nominal_capacity_or_fallback(), 1.0);
    }
}
