//! The native frame: an ordered set of columns in whatever type the source
//! format yields them, before renaming/typing settles them into a
//! [`crate::model::table::RawTable`] (spec.md §4.1 post-processor pipeline).

use std::collections::HashMap;

/// One column's data, either still textual (labels, raw timestamp strings)
/// or already numeric (most instrument exports are numeric-first).
#[derive(Debug, Clone)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            ColumnData::Numeric(v) => Some(v),
            ColumnData::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            ColumnData::Text(v) => Some(v),
            ColumnData::Numeric(_) => None,
        }
    }

    /// Coerces a text column to numeric; non-coercible cells become NaN
    /// (spec.md §4.1 "numeric columns are coerced... non-coercible cells
    /// become NaN").
    pub fn coerce_numeric(&self) -> Vec<f64> {
        match self {
            ColumnData::Numeric(v) => v.clone(),
            ColumnData::Text(v) => v
                .iter()
                .map(|s| s.trim().parse::<f64>().unwrap_or(f64::NAN))
                .collect(),
        }
    }
}

/// An ordered, named column set, preserving native column order so that
/// `select_columns_to_keep` and `get_column_names` behave predictably.
#[derive(Debug, Clone, Default)]
pub struct NativeFrame {
    columns: Vec<(String, ColumnData)>,
}

impl NativeFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_column(&mut self, name: impl Into<String>, data: ColumnData) {
        self.columns.push((name.into(), data));
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ColumnData> {
        self.columns.iter_mut().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    pub fn remove(&mut self, name: &str) -> Option<ColumnData> {
        let idx = self.columns.iter().position(|(n, _)| n == name)?;
        Some(self.columns.remove(idx).1)
    }

    pub fn insert_or_replace(&mut self, name: impl Into<String>, data: ColumnData) {
        let name = name.into();
        if let Some(slot) = self.columns.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = data;
        } else {
            self.columns.push((name, data));
        }
    }

    pub fn rename(&mut self, renames: &HashMap<String, String>) {
        for (name, _) in self.columns.iter_mut() {
            if let Some(target) = renames.get(name.as_str()) {
                *name = target.clone();
            }
        }
    }

    /// Drops every column not named in `keep`, preserving order, unless
    /// `keep_all` is set (spec.md §4.1 "a list of columns to keep... unless
    /// keep_all_columns is set").
    pub fn retain_columns(&mut self, keep: &[String], keep_all: bool) {
        if keep_all {
            return;
        }
        self.columns.retain(|(n, _)| keep.contains(n));
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|(_, d)| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.row_count() == 0
    }

    pub fn numeric(&self, name: &str) -> Option<Vec<f64>> {
        self.get(name).map(|d| d.coerce_numeric())
    }

    pub fn text(&self, name: &str) -> Option<Vec<String>> {
        self.get(name).map(|d| match d {
            ColumnData::Text(v) => v.clone(),
            ColumnData::Numeric(v) => v.iter().map(|n| n.to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_replaces_matching_names_only() {
        let mut frame = NativeFrame::new();
        frame.push_column("Cyc#", ColumnData::Numeric(vec![1.0, 2.0]));
        frame.push_column("Volts", ColumnData::Numeric(vec![3.0, 3.1]));
        let mut renames = HashMap::new();
        renames.insert("Cyc#".to_string(), "cycle_index".to_string());
        frame.rename(&renames);
        assert_eq!(frame.column_names(), vec!["cycle_index", "Volts"]);
    }

    #[test]
    fn retain_columns_drops_unlisted() {
        let mut frame = NativeFrame::new();
        frame.push_column("a", ColumnData::Numeric(vec![1.0]));
        frame.push_column("b", ColumnData::Numeric(vec![2.0]));
        frame.retain_columns(&["a".to_string()], false);
        assert_eq!(frame.column_names(), vec!["a"]);
    }

    #[test]
    fn coerce_numeric_maps_unparsable_to_nan() {
        let data = ColumnData::Text(vec!["1.5".to_string(), "oops".to_string()]);
        let coerced = data.coerce_numeric();
        assert_eq!(coerced[0], 1.5);
        assert!(coerced[1].is_nan());
    }
}
