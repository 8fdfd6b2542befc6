//! The step-classification state machine (spec.md §4.2).
//!
//! Segments the raw time-series into `(cycle, step, sub_step)` partitions
//! and assigns each a `StepType` from the closed set. Pure and
//! deterministic: the same raw table and limits always produce the same
//! steps table (spec.md §4.2 "Concurrency and ordering").

use crate::model::table::{RawRow, StepRow, StepStats, StepsTable};
use crate::model::CycleMode;
use crate::schema::StepStatSource;

/// The closed set of step types (spec.md §4.2 "States").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepType {
    Charge,
    Discharge,
    CvCharge,
    CvDischarge,
    TaperCharge,
    TaperDischarge,
    ChargeCv,
    DischargeCv,
    OcvrlxUp,
    OcvrlxDown,
    Ir,
    Rest,
    NotKnown,
}

impl StepType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Charge => "charge",
            Self::Discharge => "discharge",
            Self::CvCharge => "cv_charge",
            Self::CvDischarge => "cv_discharge",
            Self::TaperCharge => "taper_charge",
            Self::TaperDischarge => "taper_discharge",
            Self::ChargeCv => "charge_cv",
            Self::DischargeCv => "discharge_cv",
            Self::OcvrlxUp => "ocvrlx_up",
            Self::OcvrlxDown => "ocvrlx_down",
            Self::Ir => "ir",
            Self::Rest => "rest",
            Self::NotKnown => "not_known",
        }
    }

    /// Used by the "non-cv" selector (spec.md §4.4): types whose name
    /// starts with "cv_".
    pub fn starts_with_cv(self) -> bool {
        matches!(self, Self::CvCharge | Self::CvDischarge)
    }
}

/// Resolution epsilons used by the classifier (spec.md §4.1 `raw_limits`,
/// §4.2 classification rules). Declared per loader.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(default)]
pub struct RawLimits {
    pub current_hard: f64,
    pub stable_current_soft: f64,
    pub stable_voltage_soft: f64,
    pub stable_voltage_hard: f64,
    pub ir_change: f64,
}

impl Default for RawLimits {
    fn default() -> Self {
        Self {
            current_hard: 1e-6,
            stable_current_soft: 1e-3,
            stable_voltage_soft: 1e-3,
            stable_voltage_hard: 1e-4,
            ir_change: 1e-2,
        }
    }
}

/// Positive-current convention (spec.md §4.2 rule 3, §9 open question: the
/// polarity convention is resolved here, once, rather than duplicated in
/// every loader). Positive current charges in anode-half and full-cell
/// mode, and discharges in cathode-half mode.
fn polarity_of_positive_current(cycle_mode: CycleMode) -> StepType {
    match cycle_mode {
        CycleMode::Anode | CycleMode::Full => StepType::Charge,
        CycleMode::Cathode => StepType::Discharge,
    }
}

fn opposite(step_type: StepType) -> StepType {
    match step_type {
        StepType::Charge => StepType::Discharge,
        StepType::Discharge => StepType::Charge,
        other => other,
    }
}

/// One contiguous `(cycle, step, sub_step)` partition, prior to
/// classification.
struct Segment<'a> {
    cycle: i64,
    step: i64,
    sub_step: i64,
    rows: Vec<&'a RawRow>,
}

fn segment_raw_table(raw: &[RawRow]) -> Vec<Segment<'_>> {
    let mut segments: Vec<Segment<'_>> = Vec::new();
    for row in raw {
        let matches_current = segments.last().is_some_and(|s: &Segment| {
            s.cycle == row.cycle_index
                && s.step == row.step_index
                && s.sub_step == row.sub_step_index
        });
        if matches_current {
            segments.last_mut().unwrap().rows.push(row);
        } else {
            segments.push(Segment {
                cycle: row.cycle_index,
                step: row.step_index,
                sub_step: row.sub_step_index,
                rows: vec![row],
            });
        }
    }
    segments
}

fn stats_for<'a>(rows: &[&'a RawRow], extract: impl Fn(&'a RawRow) -> f64) -> StepStats {
    let values: Vec<f64> = rows.iter().map(|r| extract(r)).collect();
    StepStats::from_values(&values)
}

/// Applies rules 1-5 of spec.md §4.2 in order; first match wins. Ambiguity
/// never raises (`StepClassificationAmbiguous` is downgraded, spec.md §7):
/// the function always returns a concrete `StepType`, with `NotKnown` as
/// the fallback.
fn classify_segment(
    current: &StepStats,
    voltage: &StepStats,
    limits: &RawLimits,
    cycle_mode: CycleMode,
) -> (StepType, &'static str) {
    // Rule 1: zero-current segment.
    if current.avr.abs() < limits.current_hard {
        if voltage.max - limits.stable_voltage_hard <= voltage.avr
            && voltage.min + limits.stable_voltage_hard >= voltage.avr
        {
            return (StepType::Rest, "rule1: zero current, stable voltage");
        }
        if voltage.delta > limits.stable_voltage_soft {
            return (StepType::OcvrlxUp, "rule1: zero current, rising voltage");
        }
        if voltage.delta < -limits.stable_voltage_soft {
            return (StepType::OcvrlxDown, "rule1: zero current, falling voltage");
        }
        return (StepType::NotKnown, "rule1: zero current, ambiguous drift");
    }

    // Rule 2: an abrupt transient at the segment head, below ir_change width
    // in relative terms, is an IR pulse. Approximated here by a sharp jump
    // between the first two statistics captured (first vs. avr) relative to
    // delta, which is the information available once segmented.
    if current.std > 0.0 && (current.first - current.avr).abs() > limits.ir_change * current.avr.abs() {
        return (StepType::Ir, "rule2: leading transient exceeds ir_change");
    }

    // Rule 3: polarity by sign of average current.
    let base_type = if current.avr > 0.0 {
        polarity_of_positive_current(cycle_mode)
    } else {
        opposite(polarity_of_positive_current(cycle_mode))
    };

    // Rule 4: CC/CV subclassification.
    let stable_voltage = voltage.std < limits.stable_voltage_soft;
    let stable_current = current.std < limits.stable_current_soft;

    let (cv_variant, taper_variant, cv_tail_variant) = match base_type {
        StepType::Charge => (StepType::CvCharge, StepType::TaperCharge, StepType::ChargeCv),
        StepType::Discharge => (
            StepType::CvDischarge,
            StepType::TaperDischarge,
            StepType::DischargeCv,
        ),
        other => return (other, "rule3: polarity fallback"),
    };

    if stable_voltage && current.delta.abs() > limits.stable_current_soft {
        return (cv_variant, "rule4: stable voltage, decaying current");
    }
    if stable_current && voltage.delta.abs() > limits.stable_voltage_hard {
        return (base_type, "rule4: stable current, monotone voltage");
    }
    // A CC lead followed by a CV tail (or vice versa) shows up as neither
    // purely stable voltage nor purely stable current over the whole
    // segment.
    if !stable_current && !stable_voltage {
        // Compare the tail's local current decay against the head's local
        // voltage motion using only the summary stats available: a taper
        // (CC then CV) ends with current decaying toward its min/max bound
        // near `last`; a charge_cv-style tail-first pattern is detected by
        // comparing which extreme `last` sits closer to.
        let current_tail_decayed = (current.last - current.avr).abs() > (current.first - current.avr).abs();
        if current_tail_decayed {
            return (taper_variant, "rule4: CC lead, CV tail (taper)");
        }
        return (cv_tail_variant, "rule4: CV lead, CC tail");
    }

    (base_type, "rule3: polarity, no stable subclass matched")
}

/// Segments the raw table and classifies every step, producing a steps
/// table that satisfies invariants I1-I3 (spec.md §3.2).
pub fn classify_steps(
    raw: &[RawRow],
    limits: &RawLimits,
    cycle_mode: CycleMode,
    nominal_capacity: f64,
) -> StepsTable {
    let segments = segment_raw_table(raw);
    let mut rows = Vec::with_capacity(segments.len());

    for (ustep, seg) in segments.into_iter().enumerate() {
        let voltage = stats_for(&seg.rows, |r| r.voltage);
        let current = stats_for(&seg.rows, |r| r.current);
        let charge = stats_for(&seg.rows, |r| r.charge_capacity);
        let discharge = stats_for(&seg.rows, |r| r.discharge_capacity);
        let internal_resistance = stats_for(&seg.rows, |r| r.internal_resistance.unwrap_or(0.0));
        let point = stats_for(&seg.rows, |r| r.data_point as f64);
        let test_time = stats_for(&seg.rows, |r| r.test_time);
        let step_time = stats_for(&seg.rows, |r| r.step_time);

        let (step_type, info) = classify_segment(&current, &voltage, limits, cycle_mode);

        let point_first = seg.rows.first().unwrap().data_point;
        let point_last = seg.rows.last().unwrap().data_point;

        rows.push(StepRow {
            cycle: seg.cycle,
            step: seg.step,
            ustep: ustep as i64,
            sub_step: seg.sub_step,
            step_type,
            sub_type: String::new(),
            info: info.to_string(),
            voltage,
            current,
            charge,
            discharge,
            internal_resistance,
            point,
            test_time,
            step_time,
            rate_avr: current.avr / nominal_capacity,
            point_first,
            point_last,
        });
    }

    StepsTable { rows }
}

/// All eight stat sources for a step row, for callers that need to iterate
/// them generically (e.g. CSV export of the steps table).
pub fn step_stat(row: &StepRow, source: StepStatSource) -> StepStats {
    match source {
        StepStatSource::Voltage => row.voltage,
        StepStatSource::Current => row.current,
        StepStatSource::Charge => row.charge,
        StepStatSource::Discharge => row.discharge,
        StepStatSource::InternalResistance => row.internal_resistance,
        StepStatSource::Point => row.point,
        StepStatSource::TestTime => row.test_time,
        StepStatSource::StepTime => row.step_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn epoch() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn row(dp: i64, cycle: i64, step: i64, t: f64, current: f64, voltage: f64) -> RawRow {
        RawRow {
            data_point: dp,
            test_time: t,
            step_time: t,
            date_time: epoch(),
            cycle_index: cycle,
            step_index: step,
            sub_step_index: 0,
            current,
            voltage,
            charge_capacity: 0.0,
            discharge_capacity: 0.0,
            internal_resistance: None,
        }
    }

    /// Scenario S2: a zero-current segment drifting upward (OCV relax),
    /// followed by a positive-current charge segment.
    #[test]
    fn scenario_s2_ocv_then_charge() {
        let raw = vec![
            row(0, 1, 1, 0.0, 0.0, 3.00),
            row(1, 1, 1, 50.0, 0.0, 3.02),
            row(2, 1, 1, 100.0, 0.0, 3.04),
            row(3, 1, 2, 100.5, 1.0, 3.04),
            row(4, 1, 2, 200.0, 1.0, 3.80),
            row(5, 1, 2, 300.0, 1.0, 4.20),
        ];
        let limits = RawLimits::default();
        let steps = classify_steps(&raw, &limits, CycleMode::Full, 1.0);
        assert_eq!(steps.rows.len(), 2);
        assert_eq!(steps.rows[0].step_type, StepType::OcvrlxUp);
        assert_eq!(steps.rows[1].step_type, StepType::Charge);
    }

    #[test]
    fn rest_step_detected_when_voltage_flat() {
        let raw = vec![
            row(0, 1, 1, 0.0, 0.0, 3.500),
            row(1, 1, 1, 10.0, 0.0, 3.5001),
            row(2, 1, 1, 20.0, 0.0, 3.4999),
        ];
        let steps = classify_steps(&raw, &RawLimits::default(), CycleMode::Full, 1.0);
        assert_eq!(steps.rows[0].step_type, StepType::Rest);
    }

    #[test]
    fn invariant_i1_i2_point_ranges_cover_and_touch() {
        let raw = vec![
            row(0, 1, 1, 0.0, 0.0, 3.0),
            row(1, 1, 1, 1.0, 0.0, 3.0),
            row(2, 1, 2, 2.0, 1.0, 3.1),
            row(3, 1, 2, 3.0, 1.0, 3.2),
        ];
        let steps = classify_steps(&raw, &RawLimits::default(), CycleMode::Full, 1.0);
        assert_eq!(steps.rows[0].point_first, 0);
        assert_eq!(steps.rows[0].point_last, 1);
        assert_eq!(steps.rows[1].point_first, 2);
        assert_eq!(
            steps.rows[0].point_last + 1,
            steps.rows[1].point_first,
            "I2: consecutive steps touch"
        );
    }

    #[test]
    fn ustep_is_unique_and_step_unique_within_cycle() {
        let raw = vec![
            row(0, 1, 1, 0.0, 1.0, 3.0),
            row(1, 1, 2, 1.0, -1.0, 3.0),
            row(2, 2, 1, 2.0, 1.0, 3.0),
        ];
        let steps = classify_steps(&raw, &RawLimits::default(), CycleMode::Full, 1.0);
        let mut usteps: Vec<i64> = steps.rows.iter().map(|s| s.ustep).collect();
        usteps.sort_unstable();
        usteps.dedup();
        assert_eq!(usteps.len(), steps.rows.len(), "I3: ustep globally unique");

        let cycle1_steps: Vec<i64> = steps
            .rows
            .iter()
            .filter(|s| s.cycle == 1)
            .map(|s| s.step)
            .collect();
        let mut sorted = cycle1_steps.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), cycle1_steps.len(), "I3: step unique within cycle");
    }

    #[test]
    fn cathode_half_cell_flips_polarity() {
        let raw = vec![row(0, 1, 1, 0.0, 1.0, 3.0), row(1, 1, 1, 1.0, 1.0, 3.0)];
        let steps = classify_steps(&raw, &RawLimits::default(), CycleMode::Cathode, 1.0);
        assert_eq!(steps.rows[0].step_type, StepType::Discharge);
    }

    #[test]
    fn deterministic_given_same_input() {
        let raw = vec![
            row(0, 1, 1, 0.0, 0.0, 3.0),
            row(1, 1, 1, 1.0, 0.0, 3.02),
            row(2, 1, 2, 2.0, 1.0, 3.1),
        ];
        let a = classify_steps(&raw, &RawLimits::default(), CycleMode::Full, 1.0);
        let b = classify_steps(&raw, &RawLimits::default(), CycleMode::Full, 1.0);
        assert_eq!(a.rows.len(), b.rows.len());
        for (x, y) in a.rows.iter().zip(b.rows.iter()) {
            assert_eq!(x.step_type, y.step_type);
            assert_eq!(x.ustep, y.ustep);
        }
    }
}
