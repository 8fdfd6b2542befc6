//! Selector: chooses the "end of cycle" raw row per cycle for summary
//! aggregation, optionally excluding specific step types or explicit
//! `(cycle, step)` pairs (spec.md §4.4).

use crate::classify::StepType;
use crate::model::table::{RawRow, RawTable, StepsTable};

/// Built-in and custom selector variants (spec.md §4.4).
#[derive(Debug, Clone)]
pub enum SelectorKind {
    /// Exclude step types whose name starts with "cv_".
    NonCv,
    NonRest,
    NonOcv,
    OnlyCv,
    Custom {
        exclude_types: Vec<StepType>,
        exclude_steps: Vec<(i64, i64)>,
    },
}

impl SelectorKind {
    fn excludes(&self, cycle: i64, step: i64, step_type: StepType) -> bool {
        match self {
            SelectorKind::NonCv => step_type.starts_with_cv(),
            SelectorKind::NonRest => step_type == StepType::Rest,
            SelectorKind::NonOcv => {
                matches!(step_type, StepType::OcvrlxUp | StepType::OcvrlxDown)
            }
            SelectorKind::OnlyCv => !step_type.starts_with_cv(),
            SelectorKind::Custom {
                exclude_types,
                exclude_steps,
            } => exclude_types.contains(&step_type) || exclude_steps.contains(&(cycle, step)),
        }
    }
}

/// One per-cycle representative row, ready for the summarizer: the raw
/// end-of-cycle measurement with excluded-step capacity contributions
/// already subtracted.
#[derive(Debug, Clone)]
pub struct RepresentativeRow {
    pub cycle_index: i64,
    pub data_point: i64,
    pub test_time: f64,
    pub date_time: chrono::NaiveDateTime,
    pub charge_capacity: f64,
    pub discharge_capacity: f64,
}

/// Selects one representative row per cycle, applying `kind`'s exclusions
/// (spec.md §4.4: "Exclusion subtracts the (last - first) delta of each
/// excluded segment from the capacity channels of the representative row;
/// zero-filled if a cycle has no excluded segments").
pub fn select(raw: &RawTable, steps: &StepsTable, kind: &SelectorKind) -> Vec<RepresentativeRow> {
    let mut out = Vec::new();
    for cycle in raw.distinct_cycle_indices() {
        let Some(last_step) = steps.last_step_of_cycle(cycle) else {
            continue;
        };
        let Some(end_row) = find_row_by_point(raw, last_step.point_last) else {
            continue;
        };

        let mut charge_adjust = 0.0;
        let mut discharge_adjust = 0.0;
        for step in steps.rows_for_cycle(cycle) {
            if kind.excludes(step.cycle, step.step, step.step_type) {
                charge_adjust += step.charge.delta;
                discharge_adjust += step.discharge.delta;
            }
        }

        out.push(RepresentativeRow {
            cycle_index: cycle,
            data_point: end_row.data_point,
            test_time: end_row.test_time,
            date_time: end_row.date_time,
            charge_capacity: end_row.charge_capacity - charge_adjust,
            discharge_capacity: end_row.discharge_capacity - discharge_adjust,
        });
    }
    out
}

/// The unfiltered selector: every cycle's end-of-cycle row, unmodified.
pub fn select_all(raw: &RawTable, steps: &StepsTable) -> Vec<RepresentativeRow> {
    let mut out = Vec::new();
    for cycle in raw.distinct_cycle_indices() {
        let Some(last_step) = steps.last_step_of_cycle(cycle) else {
            continue;
        };
        let Some(end_row) = find_row_by_point(raw, last_step.point_last) else {
            continue;
        };
        out.push(RepresentativeRow {
            cycle_index: cycle,
            data_point: end_row.data_point,
            test_time: end_row.test_time,
            date_time: end_row.date_time,
            charge_capacity: end_row.charge_capacity,
            discharge_capacity: end_row.discharge_capacity,
        });
    }
    out
}

fn find_row_by_point(raw: &RawTable, data_point: i64) -> Option<&RawRow> {
    raw.rows.iter().find(|r| r.data_point == data_point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::table::{StepRow, StepStats};
    use chrono::NaiveDate;

    fn epoch() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn raw_row(dp: i64, cycle: i64, charge: f64, discharge: f64) -> RawRow {
        RawRow {
            data_point: dp,
            test_time: dp as f64,
            step_time: 0.0,
            date_time: epoch(),
            cycle_index: cycle,
            step_index: 1,
            sub_step_index: 0,
            current: 0.0,
            voltage: 0.0,
            charge_capacity: charge,
            discharge_capacity: discharge,
            internal_resistance: None,
        }
    }

    fn step_row(
        cycle: i64,
        step: i64,
        ustep: i64,
        step_type: StepType,
        point_first: i64,
        point_last: i64,
        charge_delta: f64,
        discharge_delta: f64,
    ) -> StepRow {
        StepRow {
            cycle,
            step,
            ustep,
            sub_step: 0,
            step_type,
            sub_type: String::new(),
            info: String::new(),
            voltage: StepStats::default(),
            current: StepStats::default(),
            charge: StepStats {
                delta: charge_delta,
                ..StepStats::default()
            },
            discharge: StepStats {
                delta: discharge_delta,
                ..StepStats::default()
            },
            internal_resistance: StepStats::default(),
            point: StepStats::default(),
            test_time: StepStats::default(),
            step_time: StepStats::default(),
            rate_avr: 0.0,
            point_first,
            point_last,
        }
    }

    /// Scenario S6: charge 0->0.6, cv_charge 0.6->0.61, discharge 0->0.58;
    /// non-cv selection should subtract the cv_charge delta (0.01).
    #[test]
    fn scenario_s6_non_cv_subtracts_cv_tail() {
        let raw = RawTable {
            rows: vec![raw_row(2, 1, 0.61, 0.58)],
            auxiliary: Default::default(),
        };
        let steps = StepsTable {
            rows: vec![
                step_row(1, 1, 0, StepType::Charge, 0, 0, 0.6, 0.0),
                step_row(1, 2, 1, StepType::CvCharge, 1, 1, 0.01, 0.0),
                step_row(1, 3, 2, StepType::Discharge, 2, 2, 0.0, 0.58),
            ],
        };
        let selected = select(&raw, &steps, &SelectorKind::NonCv);
        assert_eq!(selected.len(), 1);
        assert!((selected[0].charge_capacity - 0.60).abs() < 1e-9);
        assert!((selected[0].discharge_capacity - 0.58).abs() < 1e-9);
    }

    #[test]
    fn no_excluded_segments_is_zero_fill() {
        let raw = RawTable {
            rows: vec![raw_row(0, 1, 1.0, 0.5)],
            auxiliary: Default::default(),
        };
        let steps = StepsTable {
            rows: vec![step_row(1, 1, 0, StepType::Charge, 0, 0, 1.0, 0.5)],
        };
        let selected = select(&raw, &steps, &SelectorKind::NonRest);
        assert_eq!(selected[0].charge_capacity, 1.0);
        assert_eq!(selected[0].discharge_capacity, 0.5);
    }
}
