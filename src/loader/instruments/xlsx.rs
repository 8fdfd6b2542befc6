//! Neware XLSX reader (spec.md §4.1 "a spreadsheet-style export"; §6 "a
//! workbook containing sheets named 'step', 'record', and 'unit'; the unit
//! sheet declares cell-level metadata... in fixed positions").
//!
//! `calamine` is the one dependency in this crate with no counterpart in
//! the teacher or any other example repo (see DESIGN.md) — no pack repo
//! touches spreadsheets, and none of the teacher's formats need one.

use calamine::{open_workbook_auto, Data, DataType, Reader};

use crate::error::{CellpyError, Result};
use crate::loader::config::{FormattersConfig, LoaderConfig};
use crate::loader::frame::{ColumnData, NativeFrame};
use crate::loader::{FormatReader, ProcessingContext, QueryResult};
use crate::model::CellMetadata;

/// Fixed `(row, col)` positions on the "unit" sheet carrying cell-level
/// metadata, per the worked layout this crate's Neware exports use.
const UNIT_SHEET_MASS_CELL: (u32, u32) = (1, 1);
const UNIT_SHEET_NOMINAL_CAPACITY_CELL: (u32, u32) = (2, 1);

pub struct XlsxReader;

impl FormatReader for XlsxReader {
    fn query_file(&self, path: &std::path::Path, config: &LoaderConfig, _ctx: &ProcessingContext) -> Result<QueryResult> {
        let mut workbook = open_workbook_auto(path).map_err(|e| CellpyError::UnreadableFile {
            path: path.to_path_buf(),
            config: config.name.clone(),
            reason: e.to_string(),
        })?;

        let record = workbook
            .worksheet_range("record")
            .map_err(|e| CellpyError::UnreadableFile {
                path: path.to_path_buf(),
                config: config.name.clone(),
                reason: e.to_string(),
            })?;

        let mut rows = record.rows();
        let header_row = rows.next().ok_or_else(|| CellpyError::UnrecognizedFormat {
            path: path.to_path_buf(),
            config: config.name.clone(),
        })?;
        let headers: Vec<String> = header_row.iter().map(cell_to_string).collect();

        let mut columns: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(col) = columns.get_mut(i) {
                    col.push(cell_to_string(cell));
                }
            }
        }

        let mut frame = NativeFrame::new();
        for (name, values) in headers.into_iter().zip(columns) {
            frame.push_column(name, ColumnData::Text(values));
        }

        let metadata = workbook
            .worksheet_range("unit")
            .ok()
            .map(|unit_sheet| read_unit_sheet_metadata(&unit_sheet))
            .unwrap_or_default();

        Ok(QueryResult { frame, metadata })
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn read_unit_sheet_metadata(unit_sheet: &calamine::Range<Data>) -> CellMetadata {
    let get_float = |pos: (u32, u32)| unit_sheet.get_value(pos).and_then(|c| c.as_f64());
    CellMetadata {
        mass_active: get_float(UNIT_SHEET_MASS_CELL),
        nominal_capacity: get_float(UNIT_SHEET_NOMINAL_CAPACITY_CELL),
        ..CellMetadata::default()
    }
}

/// spec.md §4.1 built-in "xlsx" loader for Neware spreadsheet exports.
///
/// Like the Neware TXT preset, current is already signed, so
/// `split_current` is left out of `post_processors`.
pub fn neware_xlsx() -> LoaderConfig {
    let post_processors: Vec<String> = crate::loader::config::DEFAULT_POST_PROCESSOR_ORDER
        .iter()
        .filter(|p| **p != "split_current")
        .map(|p| p.to_string())
        .collect();
    LoaderConfig {
        name: "neware-xlsx".to_string(),
        post_processors,
        rename_headers: [
            ("Cycle Index", "cycle_index"),
            ("Step Index", "step_index"),
            ("Total Time", "test_time"),
            ("Current(A)", "current"),
            ("Voltage(V)", "voltage"),
            ("Capacity(Ah)", "capacity"),
            ("Status", "state"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
        columns_to_keep: [
            "cycle_index",
            "step_index",
            "test_time",
            "current",
            "voltage",
            "capacity",
            "state",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
        states: [("CC Chg", "charge"), ("CC DChg", "discharge")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        formatters: FormattersConfig::default(),
        ..LoaderConfig::default()
    }
}

pub fn xlsx_loader(config: LoaderConfig) -> crate::loader::AutoLoader<XlsxReader> {
    crate::loader::AutoLoader::new(config, XlsxReader)
}
