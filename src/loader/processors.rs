//! Pre- and post-processing passes (spec.md §4.1). Each function is a
//! single narrow transformation of a [`NativeFrame`]; [`run_post_processors`]
//! walks the fixed canonical order and applies only the passes a
//! configuration requested.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{CellpyError, Result};
use crate::loader::config::LoaderConfig;
use crate::loader::frame::{ColumnData, NativeFrame};
use crate::loader::ProcessingContext;
use crate::model::table::{RawRow, RawTable};
use crate::model::CellpyUnits;
use crate::units;

/// spec.md §4.1 "remove_empty_lines — strips blank lines from a text file,
/// writing a uniquely-named temporary copy."
pub fn remove_empty_lines(path: &Path, ctx: &ProcessingContext) -> std::io::Result<PathBuf> {
    let text = std::fs::read_to_string(path)?;
    let filtered: String = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let out_path = ctx.scratch_file("stripped.txt");
    std::fs::write(&out_path, filtered)?;
    Ok(out_path)
}

fn resolve_state_label<'a>(native: &str, states: &'a HashMap<String, String>) -> Option<&'a str> {
    if let Some(mapped) = states.get(native) {
        return Some(mapped.as_str());
    }
    match native.trim().to_ascii_lowercase().as_str() {
        "c" | "charge" => Some("charge"),
        "d" | "discharge" => Some("discharge"),
        _ => None,
    }
}

/// Parses `"HH:MM:SS"` / `"HH:MM:SS.fff"` into seconds; falls back to a
/// plain numeric parse for formats that already report elapsed seconds.
fn parse_duration_seconds(raw: &str) -> f64 {
    let parts: Vec<&str> = raw.trim().split(':').collect();
    if parts.len() == 3 {
        if let (Ok(h), Ok(m), Ok(s)) = (
            parts[0].parse::<f64>(),
            parts[1].parse::<f64>(),
            parts[2].parse::<f64>(),
        ) {
            return h * 3600.0 + m * 60.0 + s;
        }
    }
    raw.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// spec.md §4.1 post-processor pipeline, run in the fixed canonical order,
/// limited to the passes `config.post_processors` names. Consumes the
/// `NativeFrame` a format-specific loader produced and returns a typed
/// [`RawTable`].
pub fn run_post_processors(
    mut frame: NativeFrame,
    config: &LoaderConfig,
    cellpy_units: &CellpyUnits,
) -> Result<RawTable> {
    for pass in config.ordered_post_processors() {
        match pass {
            "get_column_names" => {
                tracing::debug!(columns = ?frame.column_names(), "loaded native columns");
            }
            "rename_headers" => frame.rename(&config.rename_headers),
            "select_columns_to_keep" => {
                frame.retain_columns(&config.columns_to_keep, config.keep_all_columns)
            }
            "update_headers_with_units" => {
                for native_col in config.unit_labels.keys() {
                    if frame.get(native_col).is_none() {
                        tracing::warn!(column = %native_col, "unit_labels entry for absent column");
                    }
                }
            }
            "cumulate_capacity_within_cycle" => cumulate_capacity_within_cycle(&mut frame),
            "split_capacity" => split_capacity(&mut frame, config),
            "split_current" => split_current(&mut frame, config),
            "set_cycle_number_not_zero" => set_cycle_number_not_zero(&mut frame),
            "set_index" => set_index(&mut frame),
            "convert_date_time_to_datetime" => convert_date_time_to_datetime(&mut frame),
            "convert_step_time_to_timedelta" => convert_elapsed_to_seconds(&mut frame, "step_time"),
            "convert_test_time_to_timedelta" => convert_elapsed_to_seconds(&mut frame, "test_time"),
            "convert_units" => convert_units(&mut frame, config, cellpy_units),
            _ => unreachable!("validated against DEFAULT_POST_PROCESSOR_ORDER"),
        }
    }
    finalize_raw_table(&frame, &config.name)
}

/// Re-accumulates a per-step-resetting `capacity` column into a
/// cycle-cumulative one (spec.md §4.1 processor list item
/// `cumulate_capacity_within_cycle`; several instruments reset capacity to
/// zero at the start of every step rather than every cycle).
fn cumulate_capacity_within_cycle(frame: &mut NativeFrame) {
    let Some(capacity) = frame.numeric("capacity") else {
        return;
    };
    let cycles = frame.numeric("cycle_index").unwrap_or_default();
    let mut out = Vec::with_capacity(capacity.len());
    let mut carry = 0.0;
    let mut prev_cycle = f64::NAN;
    let mut prev_value = 0.0;
    for (i, &value) in capacity.iter().enumerate() {
        let cycle = cycles.get(i).copied().unwrap_or(0.0);
        if cycle != prev_cycle {
            carry = 0.0;
            prev_value = 0.0;
            prev_cycle = cycle;
        } else if value + 1e-12 < prev_value {
            carry += prev_value;
        }
        prev_value = value;
        out.push(value + carry);
    }
    frame.insert_or_replace("capacity", ColumnData::Numeric(out));
}

/// Groups row indices by cycle, each group kept in ascending row order
/// (== ascending `data_point` once it exists; row order otherwise).
fn indices_by_cycle(cycles: &[f64]) -> HashMap<i64, Vec<usize>> {
    let mut groups: HashMap<i64, Vec<usize>> = HashMap::new();
    for (i, &cycle) in cycles.iter().enumerate() {
        groups.entry(cycle as i64).or_default().push(i);
    }
    groups
}

/// One phase of `_state_splitter`: within each cycle, rows whose state
/// label matches `is_match` get `sign * base[row]`; every row after the
/// last match in that cycle holds that match's value (forward-filled).
/// Rows before the first match, or between two non-adjacent matches, are
/// left untouched in `temp` — ported as-is from
/// `examples/original_source/cellpy/readers/instruments/processors/post_processors.py::_state_splitter`.
fn apply_state_phase(
    temp: &mut [f64],
    groups: &HashMap<i64, Vec<usize>>,
    data_point: &[f64],
    base: &[f64],
    is_match: impl Fn(usize) -> bool,
    sign: f64,
) {
    for rows in groups.values() {
        let matched: Vec<usize> = rows.iter().copied().filter(|&i| is_match(i)).collect();
        let Some(&last) = matched.last() else { continue };
        for &i in &matched {
            temp[i] = sign * base[i];
        }
        let last_val = temp[last];
        let last_point = data_point[last];
        for &i in rows {
            if data_point[i] > last_point {
                temp[i] = last_val;
            }
        }
    }
}

/// spec.md §4.1 "split_capacity: many instruments report a single
/// cumulative capacity column and a state label; this pass separates it
/// into charge_capacity and discharge_capacity, forward-filling each
/// channel's last value across the rows the other channel owns."
fn split_capacity(frame: &mut NativeFrame, config: &LoaderConfig) {
    if frame.get("charge_capacity").is_some() && frame.get("discharge_capacity").is_some() {
        return;
    }
    let Some(capacity) = frame.numeric("capacity") else {
        return;
    };
    let state = frame
        .text("state")
        .unwrap_or_else(|| vec![String::new(); capacity.len()]);
    let cycles = frame.numeric("cycle_index").unwrap_or_default();
    let data_point = frame
        .numeric("data_point")
        .unwrap_or_else(|| (0..capacity.len()).map(|i| i as f64).collect());
    let groups = indices_by_cycle(&cycles);

    let mut charge = vec![0.0; capacity.len()];
    let mut discharge = vec![0.0; capacity.len()];
    apply_state_phase(
        &mut charge,
        &groups,
        &data_point,
        &capacity,
        |i| resolve_state_label(&state[i], &config.states) == Some("charge"),
        1.0,
    );
    apply_state_phase(
        &mut discharge,
        &groups,
        &data_point,
        &capacity,
        |i| resolve_state_label(&state[i], &config.states) == Some("discharge"),
        1.0,
    );
    for (i, label) in state.iter().enumerate() {
        if resolve_state_label(label, &config.states).is_none() {
            tracing::warn!(row = i, %label, "unresolved state label in split_capacity");
        }
    }
    frame.insert_or_replace("charge_capacity", ColumnData::Numeric(charge));
    frame.insert_or_replace("discharge_capacity", ColumnData::Numeric(discharge));
    frame.remove("capacity");
}

/// spec.md §4.1 "split_current: derives a signed current from an
/// instrument-reported magnitude plus a state label" (Maccor: `Amps` is
/// unsigned, sign comes from the `State` column). Mirrors the original's
/// `split_current`, which runs the same `_state_splitter` over `current`
/// with `n_charge=1, n_discharge=-1` and writes both phases back into the
/// single `current` column — the discharge phase overwrites the charge
/// phase's forward-fill wherever the two overlap.
fn split_current(frame: &mut NativeFrame, config: &LoaderConfig) {
    let Some(current) = frame.numeric("current") else {
        return;
    };
    let Some(state) = frame.text("state") else {
        return;
    };
    let cycles = frame.numeric("cycle_index").unwrap_or_default();
    let data_point = frame
        .numeric("data_point")
        .unwrap_or_else(|| (0..current.len()).map(|i| i as f64).collect());
    let groups = indices_by_cycle(&cycles);

    let mut signed = vec![0.0; current.len()];
    apply_state_phase(
        &mut signed,
        &groups,
        &data_point,
        &current,
        |i| resolve_state_label(&state[i], &config.states) == Some("charge"),
        1.0,
    );
    apply_state_phase(
        &mut signed,
        &groups,
        &data_point,
        &current,
        |i| resolve_state_label(&state[i], &config.states) == Some("discharge"),
        -1.0,
    );
    frame.insert_or_replace("current", ColumnData::Numeric(signed));
}

/// spec.md §4.1 "set_cycle_number_not_zero: shifts a 0-based cycle index to
/// 1-based."
fn set_cycle_number_not_zero(frame: &mut NativeFrame) {
    let Some(cycles) = frame.numeric("cycle_index") else {
        return;
    };
    let min = cycles.iter().cloned().fold(f64::INFINITY, f64::min);
    if min == 0.0 {
        let shifted: Vec<f64> = cycles.iter().map(|c| c + 1.0).collect();
        frame.insert_or_replace("cycle_index", ColumnData::Numeric(shifted));
    }
}

/// spec.md §4.1 "set_index: ensures the raw table is indexed by data_point
/// without dropping the column." Synthesizes one if the source never
/// reported it.
fn set_index(frame: &mut NativeFrame) {
    if frame.get("data_point").is_some() {
        return;
    }
    let n = frame.row_count();
    frame.insert_or_replace(
        "data_point",
        ColumnData::Numeric((0..n).map(|i| i as f64).collect()),
    );
}

/// spec.md §4.1 "convert_date_time_to_datetime... parse timestamp...
/// columns into a canonical absolute-time... representation." Accepts
/// `"YYYY-MM-DD HH:MM:SS"` text or synthesizes one from `test_time` seconds
/// past a Unix epoch when the source carries no timestamp column at all.
fn convert_date_time_to_datetime(frame: &mut NativeFrame) {
    if frame.get("date_time").is_some() {
        return;
    }
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let test_time = frame.numeric("test_time").unwrap_or_default();
    let synthesized: Vec<String> = test_time
        .iter()
        .map(|secs| (epoch + Duration::milliseconds((secs * 1000.0) as i64)).to_string())
        .collect();
    tracing::warn!("date_time column absent; synthesizing from test_time past the Unix epoch");
    frame.insert_or_replace("date_time", ColumnData::Text(synthesized));
}

fn convert_elapsed_to_seconds(frame: &mut NativeFrame, column: &str) {
    let Some(data) = frame.get(column) else { return };
    if let ColumnData::Text(values) = data {
        let seconds: Vec<f64> = values.iter().map(|s| parse_duration_seconds(s)).collect();
        frame.insert_or_replace(column, ColumnData::Numeric(seconds));
    }
}

/// spec.md §4.1 "convert_units: multiplies each numeric column by the
/// symbolic factor (raw_unit / cellpy_unit) for that quantity."
fn convert_units(frame: &mut NativeFrame, config: &LoaderConfig, cellpy_units: &CellpyUnits) {
    let pairs: [(&str, &str, &str); 5] = [
        ("current", &config.raw_units.current, &cellpy_units.current),
        ("voltage", &config.raw_units.voltage, &cellpy_units.voltage),
        ("charge_capacity", &config.raw_units.charge, &cellpy_units.charge),
        ("discharge_capacity", &config.raw_units.charge, &cellpy_units.charge),
        (
            "internal_resistance",
            &config.raw_units.resistance,
            &cellpy_units.resistance,
        ),
    ];
    for (column, raw_unit, cellpy_unit) in pairs {
        if raw_unit == cellpy_unit {
            continue;
        }
        let Some(values) = frame.numeric(column) else { continue };
        match units::conversion_factor(raw_unit, cellpy_unit) {
            Ok(factor) => {
                let scaled: Vec<f64> = values.iter().map(|v| v * factor).collect();
                frame.insert_or_replace(column, ColumnData::Numeric(scaled));
            }
            Err(err) => tracing::warn!(%column, %err, "convert_units: skipping unconvertible column"),
        }
    }
}

/// Builds the typed [`RawTable`] from the fully post-processed frame.
/// spec.md §4.1 "Failure semantics": raises `MissingRequiredColumn` for any
/// of cycle_index/data_point/step_index/test_time/step_time/current/voltage
/// /charge_capacity/discharge_capacity/date_time.
fn finalize_raw_table(frame: &NativeFrame, config_name: &str) -> Result<RawTable> {
    let required = [
        "data_point",
        "test_time",
        "cycle_index",
        "step_index",
        "current",
        "voltage",
        "charge_capacity",
        "discharge_capacity",
    ];
    for column in required {
        if frame.get(column).is_none() {
            return Err(CellpyError::MissingRequiredColumn {
                column: column.to_string(),
                config: config_name.to_string(),
            });
        }
    }

    let data_point = frame.numeric("data_point").unwrap();
    let test_time = frame.numeric("test_time").unwrap();
    let step_time = frame
        .numeric("step_time")
        .unwrap_or_else(|| vec![0.0; data_point.len()]);
    let cycle_index = frame.numeric("cycle_index").unwrap();
    let step_index = frame.numeric("step_index").unwrap();
    let sub_step_index = frame
        .numeric("sub_step_index")
        .unwrap_or_else(|| vec![0.0; data_point.len()]);
    let current = frame.numeric("current").unwrap();
    let voltage = frame.numeric("voltage").unwrap();
    let charge_capacity = frame.numeric("charge_capacity").unwrap();
    let discharge_capacity = frame.numeric("discharge_capacity").unwrap();
    let internal_resistance = frame.numeric("internal_resistance");
    let date_time_text = frame.text("date_time");

    let n = data_point.len();
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let date_time = date_time_text
            .as_ref()
            .and_then(|v| v.get(i))
            .and_then(|s| parse_date_time(s))
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap());

        rows.push(RawRow {
            data_point: data_point[i] as i64,
            test_time: test_time[i],
            step_time: step_time[i],
            date_time,
            cycle_index: cycle_index[i] as i64,
            step_index: step_index[i] as i64,
            sub_step_index: sub_step_index[i] as i64,
            current: current[i],
            voltage: voltage[i],
            charge_capacity: charge_capacity[i],
            discharge_capacity: discharge_capacity[i],
            internal_resistance: internal_resistance.as_ref().map(|v| v[i]).filter(|v| !v.is_nan()),
        });
    }
    rows.sort_by_key(|r| r.data_point);
    Ok(RawTable { rows, auxiliary: HashMap::new() })
}

fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::frame::ColumnData;

    fn frame_with(columns: &[(&str, Vec<f64>)]) -> NativeFrame {
        let mut frame = NativeFrame::new();
        for (name, values) in columns {
            frame.push_column(*name, ColumnData::Numeric(values.clone()));
        }
        frame
    }

    /// Scenario S1: split_capacity forward-fills each channel's last value
    /// across the rows the other channel owns, so the final row of each
    /// cycle carries both the cycle's charge and discharge totals (not a
    /// zero in whichever channel that row's own state isn't).
    #[test]
    fn split_capacity_forward_fills_across_opposite_states() {
        let mut frame = frame_with(&[
            ("capacity", vec![0.0, 0.001, 0.0005, 0.001, 0.0005]),
            ("cycle_index", vec![1.0, 1.0, 1.0, 2.0, 2.0]),
        ]);
        frame.push_column(
            "state",
            ColumnData::Text(vec!["C", "C", "D", "C", "D"].into_iter().map(String::from).collect()),
        );
        let config = LoaderConfig::default();
        split_capacity(&mut frame, &config);
        assert_eq!(
            frame.numeric("charge_capacity").unwrap(),
            vec![0.0, 0.001, 0.001, 0.001, 0.001]
        );
        assert_eq!(
            frame.numeric("discharge_capacity").unwrap(),
            vec![0.0, 0.0, 0.0005, 0.0, 0.0005]
        );
    }

    #[test]
    fn cumulate_capacity_within_cycle_resets_per_cycle_not_per_step() {
        let mut frame = frame_with(&[
            ("capacity", vec![0.1, 0.2, 0.0, 0.1, 0.3]),
            ("cycle_index", vec![1.0, 1.0, 1.0, 2.0, 2.0]),
        ]);
        cumulate_capacity_within_cycle(&mut frame);
        let got = frame.numeric("capacity").unwrap();
        assert_eq!(got, vec![0.1, 0.2, 0.2, 0.1, 0.3]);
    }

    #[test]
    fn set_cycle_number_not_zero_shifts_when_zero_based() {
        let mut frame = frame_with(&[("cycle_index", vec![0.0, 0.0, 1.0])]);
        set_cycle_number_not_zero(&mut frame);
        assert_eq!(frame.numeric("cycle_index").unwrap(), vec![1.0, 1.0, 2.0]);
    }

    #[test]
    fn set_cycle_number_not_zero_is_noop_when_already_one_based() {
        let mut frame = frame_with(&[("cycle_index", vec![1.0, 2.0])]);
        set_cycle_number_not_zero(&mut frame);
        assert_eq!(frame.numeric("cycle_index").unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn convert_units_scales_matching_columns() {
        let mut frame = frame_with(&[("charge_capacity", vec![1.0, 2.0])]);
        let mut config = LoaderConfig::default();
        config.raw_units.charge = "Ah".to_string();
        let cellpy_units = CellpyUnits {
            charge: "mAh".to_string(),
            ..CellpyUnits::default()
        };
        convert_units(&mut frame, &config, &cellpy_units);
        assert_eq!(frame.numeric("charge_capacity").unwrap(), vec![1000.0, 2000.0]);
    }

    #[test]
    fn finalize_raises_on_missing_required_column() {
        let frame = frame_with(&[("data_point", vec![0.0])]);
        let err = finalize_raw_table(&frame, "test");
        assert!(matches!(err, Err(CellpyError::MissingRequiredColumn { .. })));
    }

    #[test]
    fn missing_date_time_is_synthesized_from_test_time() {
        let mut frame = frame_with(&[("test_time", vec![0.0, 1.5])]);
        convert_date_time_to_datetime(&mut frame);
        assert!(frame.get("date_time").is_some());
    }
}
