//! Row-oriented representations of the raw, steps, and summary tables.
//!
//! Each table is a `Vec` of a plain row struct, mirroring the teacher's
//! `Vec<StepResult>` telemetry pattern rather than a columnar dataframe —
//! the core never needs random column algebra outside the summarizer's
//! vectorised sweeps, which iterate rows directly.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::classify::StepType;

/// One sampled measurement (spec.md §3.1 "Raw table").
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub data_point: i64,
    pub test_time: f64,
    pub step_time: f64,
    pub date_time: NaiveDateTime,
    pub cycle_index: i64,
    pub step_index: i64,
    pub sub_step_index: i64,
    pub current: f64,
    pub voltage: f64,
    pub charge_capacity: f64,
    pub discharge_capacity: f64,
    pub internal_resistance: Option<f64>,
}

/// The raw table plus any preserved auxiliary columns (spec.md §3.1:
/// "Auxiliary columns may exist and are preserved untouched if requested"),
/// keyed by their canonical or native column name and aligned by row index.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub rows: Vec<RawRow>,
    pub auxiliary: HashMap<String, Vec<f64>>,
}

impl RawTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn distinct_cycle_indices(&self) -> Vec<i64> {
        let mut cycles: Vec<i64> = self.rows.iter().map(|r| r.cycle_index).collect();
        cycles.sort_unstable();
        cycles.dedup();
        cycles
    }

    pub fn rows_for_cycle(&self, cycle_index: i64) -> impl Iterator<Item = &RawRow> {
        self.rows.iter().filter(move |r| r.cycle_index == cycle_index)
    }
}

/// Per-column statistics block for one of the eight stat-bearing sources
/// (spec.md §3.1, §4.2 "Per-segment statistics").
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepStats {
    pub first: f64,
    pub last: f64,
    pub min: f64,
    pub max: f64,
    pub avr: f64,
    pub std: f64,
    pub delta: f64,
}

impl StepStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let first = values[0];
        let last = *values.last().unwrap();
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let n = values.len() as f64;
        let avr = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - avr).powi(2)).sum::<f64>() / n;
        Self {
            first,
            last,
            min,
            max,
            avr,
            std: variance.sqrt(),
            delta: last - first,
        }
    }
}

/// One row of the steps table: aggregated statistics for a contiguous
/// (cycle, step, sub_step) segment (spec.md §3.1 "Steps table").
#[derive(Debug, Clone, PartialEq)]
pub struct StepRow {
    pub cycle: i64,
    pub step: i64,
    pub ustep: i64,
    pub sub_step: i64,
    pub step_type: StepType,
    pub sub_type: String,
    pub info: String,
    pub voltage: StepStats,
    pub current: StepStats,
    pub charge: StepStats,
    pub discharge: StepStats,
    pub internal_resistance: StepStats,
    pub point: StepStats,
    pub test_time: StepStats,
    pub step_time: StepStats,
    pub rate_avr: f64,
    pub point_first: i64,
    pub point_last: i64,
}

#[derive(Debug, Clone, Default)]
pub struct StepsTable {
    pub rows: Vec<StepRow>,
}

impl StepsTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows_for_cycle(&self, cycle: i64) -> impl Iterator<Item = &StepRow> {
        self.rows.iter().filter(move |s| s.cycle == cycle)
    }

    /// The last step row (by `point_last`) of a cycle, used by the
    /// summarizer's end-of-cycle selection (spec.md §4.3 "Selection").
    pub fn last_step_of_cycle(&self, cycle: i64) -> Option<&StepRow> {
        self.rows_for_cycle(cycle).max_by_key(|s| s.point_last)
    }

    pub fn first_step_of_type(&self, cycle: i64, types: &[StepType]) -> Option<&StepRow> {
        self.rows_for_cycle(cycle)
            .filter(|s| types.contains(&s.step_type))
            .min_by_key(|s| s.point_first)
    }
}

/// One row of the per-cycle summary table (spec.md §4.3).
#[derive(Debug, Clone, Default)]
pub struct SummaryRow {
    pub cycle_index: i64,
    pub data_point: i64,
    pub test_time: f64,
    pub date_time: Option<NaiveDateTime>,
    pub discharge_capacity: f64,
    pub charge_capacity: f64,

    pub coulombic_efficiency: f64,
    pub cumulated_coulombic_efficiency: f64,
    pub coulombic_difference: f64,
    pub cumulated_coulombic_difference: f64,

    pub cumulated_charge_capacity: f64,
    pub cumulated_discharge_capacity: f64,
    pub discharge_capacity_loss: f64,
    pub charge_capacity_loss: f64,
    pub cumulated_discharge_capacity_loss: f64,
    pub cumulated_charge_capacity_loss: f64,

    pub shifted_charge_capacity: f64,
    pub shifted_discharge_capacity: f64,

    pub cumulated_ric: f64,
    pub cumulated_ric_sei: f64,
    pub cumulated_ric_disconnect: f64,

    pub end_voltage_discharge: Option<f64>,
    pub end_voltage_charge: Option<f64>,
    pub ir_discharge: Option<f64>,
    pub ir_charge: Option<f64>,

    pub charge_c_rate: Option<f64>,
    pub discharge_c_rate: Option<f64>,

    pub normalized_cycle_index: f64,

    /// Specific-variant columns keyed by `"<base>_<postfix>"` (spec.md §4.3
    /// "Specific variants"), e.g. `"charge_capacity_gravimetric"`.
    pub specific: HashMap<String, f64>,
}

#[derive(Debug, Clone, Default)]
pub struct SummaryTable {
    pub rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_stats_basic() {
        let stats = StepStats::from_values(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.first, 1.0);
        assert_eq!(stats.last, 4.0);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.avr, 2.5);
        assert_eq!(stats.delta, 3.0);
    }

    #[test]
    fn step_stats_empty_is_zeroed() {
        let stats = StepStats::from_values(&[]);
        assert_eq!(stats, StepStats::default());
    }

    #[test]
    fn distinct_cycles_sorted_and_deduped() {
        use chrono::NaiveDate;
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut table = RawTable::default();
        for (dp, cyc) in [(0, 2), (1, 1), (2, 1), (3, 2)] {
            table.rows.push(RawRow {
                data_point: dp,
                test_time: dp as f64,
                step_time: 0.0,
                date_time: epoch,
                cycle_index: cyc,
                step_index: 1,
                sub_step_index: 0,
                current: 0.0,
                voltage: 0.0,
                charge_capacity: 0.0,
                discharge_capacity: 0.0,
                internal_resistance: None,
            });
        }
        assert_eq!(table.distinct_cycle_indices(), vec![1, 2]);
    }
}
