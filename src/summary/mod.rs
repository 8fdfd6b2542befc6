//! The per-cycle summarizer (spec.md §4.3).
//!
//! Consumes a fully populated `Cell` (raw + steps tables) and a selector,
//! and produces the summary table: capacity/efficiency columns, cumulative
//! and shifted columns, RIC family, end-voltage/IR columns, C-rates,
//! normalized cycle index, and specific (gravimetric/areal/volumetric)
//! variants. All derived columns are vectorised sweeps over the selected
//! per-cycle frame in cycle-ascending order (spec.md §9: "use an
//! iterator-pair sweep (previous, current) ... in one pass").

use crate::classify::StepType;
use crate::error::{CellpyError, Result};
use crate::model::table::{SummaryRow, SummaryTable};
use crate::model::{Cell, CycleMode};
use crate::schema::{SpecificColumnKey, SummaryHeader};
use crate::selector::{select, RepresentativeRow, SelectorKind};
use crate::units::{self, SpecificMode};

/// Options controlling which optional columns the summarizer populates
/// (spec.md §4.3 "Voltages, if ... `find_end_voltage`", "IR, if ...
/// `find_ir`", and the normalized-cycle-index reference-cycle override).
#[derive(Debug, Clone, Default)]
pub struct SummaryOptions {
    pub find_end_voltage: bool,
    pub find_ir: bool,
    /// When set, `normalized_cycle_index` divides by the mean first-capacity
    /// over these cycles instead of the cell-level nominal capacity.
    pub reference_cycles: Option<Vec<i64>>,
}

/// Returns `(first, second)` per I6: anode-half is discharge-then-charge,
/// full/cathode-half is charge-then-discharge.
fn first_second(cycle_mode: CycleMode, charge: f64, discharge: f64) -> (f64, f64) {
    match cycle_mode {
        CycleMode::Anode => (discharge, charge),
        CycleMode::Full | CycleMode::Cathode => (charge, discharge),
    }
}

/// Cumulative sum where a `None` term contributes nothing to the running
/// total and is itself reported as `None` (spec.md §4.3 Algorithms: "the
/// first row receiving the 'no previous' sentinel... callers treat the
/// first-cycle losses and RICs as undefined").
fn cumulative_skip_none(terms: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut running = 0.0;
    terms
        .iter()
        .map(|t| match t {
            None => None,
            Some(v) => {
                running += v;
                Some(running)
            }
        })
        .collect()
}

fn cumulative(values: &[f64]) -> Vec<f64> {
    let mut running = 0.0;
    values
        .iter()
        .map(|v| {
            running += v;
            running
        })
        .collect()
}

/// Previous-value shift: `None` at index 0, `Some(values[i-1])` after.
fn shift_prev(values: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        out.push(if i == 0 { None } else { Some(values[i - 1]) });
    }
    out
}

/// Computes the per-cycle summary table for `cell` (spec.md §4.3).
///
/// # Errors
///
/// Returns `MissingRequiredColumn` if the raw table has rows but lacks a
/// cycle index or capacity reading (unreachable for loader-produced
/// tables, reachable for hand-built ones); returns `EmptyCell` if the raw
/// table has no rows at all.
pub fn summarize(
    cell: &Cell,
    selector_kind: &SelectorKind,
    options: &SummaryOptions,
) -> Result<SummaryTable> {
    if cell.raw.is_empty() {
        return Err(CellpyError::EmptyCell {
            config: cell.metadata.raw_id.clone().unwrap_or_default(),
        });
    }

    let mut frame = select(&cell.raw, &cell.steps, selector_kind);
    frame.sort_by_key(|r| r.cycle_index);
    let n = frame.len();
    let cycle_mode = cell.test_metadata.cycle_mode;

    let charge: Vec<f64> = frame.iter().map(|r| r.charge_capacity).collect();
    let discharge: Vec<f64> = frame.iter().map(|r| r.discharge_capacity).collect();
    let (firsts, seconds): (Vec<f64>, Vec<f64>) = frame
        .iter()
        .map(|r| first_second(cycle_mode, r.charge_capacity, r.discharge_capacity))
        .collect();

    let coulombic_efficiency: Vec<f64> = firsts
        .iter()
        .zip(&seconds)
        .map(|(f, s)| 100.0 * s / f)
        .collect();
    let cumulated_coulombic_efficiency = cumulative(&coulombic_efficiency);
    let coulombic_difference: Vec<f64> = firsts.iter().zip(&seconds).map(|(f, s)| f - s).collect();
    let cumulated_coulombic_difference = cumulative(&coulombic_difference);

    let cumulated_charge_capacity = cumulative(&charge);
    let cumulated_discharge_capacity = cumulative(&discharge);

    let prev_discharge = shift_prev(&discharge);
    let prev_charge = shift_prev(&charge);
    let discharge_capacity_loss: Vec<Option<f64>> = prev_discharge
        .iter()
        .zip(&discharge)
        .map(|(p, c)| p.map(|p| p - c))
        .collect();
    let charge_capacity_loss: Vec<Option<f64>> = prev_charge
        .iter()
        .zip(&charge)
        .map(|(p, c)| p.map(|p| p - c))
        .collect();
    let cumulated_discharge_capacity_loss = cumulative_skip_none(&discharge_capacity_loss);
    let cumulated_charge_capacity_loss = cumulative_skip_none(&charge_capacity_loss);

    let shifted_terms: Vec<f64> = firsts.iter().zip(&seconds).map(|(f, s)| f - s).collect();
    let shifted_charge_capacity = cumulative(&shifted_terms);
    let shifted_discharge_capacity: Vec<f64> = shifted_charge_capacity
        .iter()
        .zip(&firsts)
        .map(|(s, f)| s + f)
        .collect();

    let prev_first = shift_prev(&firsts);
    let prev_second = shift_prev(&seconds);
    let ric_terms: Vec<Option<f64>> = prev_first
        .iter()
        .zip(&seconds)
        .zip(&prev_second)
        .map(|((pf, s), ps)| match (pf, ps) {
            (Some(pf), Some(ps)) if *ps != 0.0 => Some((pf - s) / ps),
            _ => None,
        })
        .collect();
    let ric_sei_terms: Vec<Option<f64>> = firsts
        .iter()
        .zip(&prev_second)
        .map(|(f, ps)| match ps {
            Some(ps) if *ps != 0.0 => Some((f - ps) / ps),
            _ => None,
        })
        .collect();
    let ric_disconnect_terms: Vec<Option<f64>> = prev_second
        .iter()
        .zip(&seconds)
        .map(|(ps, s)| match ps {
            Some(ps) if *ps != 0.0 => Some((ps - s) / ps),
            _ => None,
        })
        .collect();
    let cumulated_ric = cumulative_skip_none(&ric_terms);
    let cumulated_ric_sei = cumulative_skip_none(&ric_sei_terms);
    let cumulated_ric_disconnect = cumulative_skip_none(&ric_disconnect_terms);

    let nominal_capacity = resolve_nominal_capacity(cell, &firsts, &frame, options);

    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let r = &frame[i];
        let cycle = r.cycle_index;

        let (end_voltage_discharge, end_voltage_charge) = if options.find_end_voltage {
            (
                cell.steps
                    .rows_for_cycle(cycle)
                    .filter(|s| s.step_type == StepType::Discharge)
                    .max_by_key(|s| s.point_last)
                    .map(|s| s.voltage.last)
                    .or(Some(0.0)),
                cell.steps
                    .rows_for_cycle(cycle)
                    .filter(|s| s.step_type == StepType::Charge)
                    .max_by_key(|s| s.point_last)
                    .map(|s| s.voltage.last)
                    .or(Some(0.0)),
            )
        } else {
            (None, None)
        };

        let (ir_discharge, ir_charge) = if options.find_ir {
            (
                cell.steps
                    .rows_for_cycle(cycle)
                    .filter(|s| s.step_type == StepType::Discharge)
                    .min_by_key(|s| s.point_first)
                    .map(|s| s.internal_resistance.first)
                    .or(Some(0.0)),
                cell.steps
                    .rows_for_cycle(cycle)
                    .filter(|s| s.step_type == StepType::Charge)
                    .min_by_key(|s| s.point_first)
                    .map(|s| s.internal_resistance.first)
                    .or(Some(0.0)),
            )
        } else {
            (None, None)
        };

        let current_factor =
            units::conversion_factor(&cell.raw_units.current, &cell.cellpy_units.current)
                .unwrap_or(1.0);
        // end_voltage/IR/C-rate match the exact step type only (never the
        // cv_/taper_ variants), per the original's `get_step_numbers(...,
        // allctypes=False)` and `c_rates_to_summary`'s `steps.type ==
        // "charge"` comparison.
        let discharge_c_rate = cell
            .steps
            .first_step_of_type(cycle, &[StepType::Discharge])
            .map(|s| s.rate_avr * current_factor);
        let charge_c_rate = cell
            .steps
            .first_step_of_type(cycle, &[StepType::Charge])
            .map(|s| s.rate_avr * current_factor);

        rows.push(SummaryRow {
            cycle_index: cycle,
            data_point: r.data_point,
            test_time: r.test_time,
            date_time: Some(r.date_time),
            discharge_capacity: r.discharge_capacity,
            charge_capacity: r.charge_capacity,
            coulombic_efficiency: coulombic_efficiency[i],
            cumulated_coulombic_efficiency: cumulated_coulombic_efficiency[i],
            coulombic_difference: coulombic_difference[i],
            cumulated_coulombic_difference: cumulated_coulombic_difference[i],
            cumulated_charge_capacity: cumulated_charge_capacity[i],
            cumulated_discharge_capacity: cumulated_discharge_capacity[i],
            discharge_capacity_loss: discharge_capacity_loss[i].unwrap_or(f64::NAN),
            charge_capacity_loss: charge_capacity_loss[i].unwrap_or(f64::NAN),
            cumulated_discharge_capacity_loss: cumulated_discharge_capacity_loss[i]
                .unwrap_or(f64::NAN),
            cumulated_charge_capacity_loss: cumulated_charge_capacity_loss[i].unwrap_or(f64::NAN),
            shifted_charge_capacity: shifted_charge_capacity[i],
            shifted_discharge_capacity: shifted_discharge_capacity[i],
            cumulated_ric: cumulated_ric[i].unwrap_or(f64::NAN),
            cumulated_ric_sei: cumulated_ric_sei[i].unwrap_or(f64::NAN),
            cumulated_ric_disconnect: cumulated_ric_disconnect[i].unwrap_or(f64::NAN),
            end_voltage_discharge,
            end_voltage_charge,
            ir_discharge,
            ir_charge,
            charge_c_rate,
            discharge_c_rate,
            normalized_cycle_index: cumulated_charge_capacity[i] / nominal_capacity,
            specific: specific_variants(cell, &charge, &discharge, &cumulated_charge_capacity,
                &cumulated_discharge_capacity, &coulombic_difference,
                &cumulated_coulombic_difference, &discharge_capacity_loss,
                &charge_capacity_loss, &cumulated_discharge_capacity_loss,
                &cumulated_charge_capacity_loss, &shifted_charge_capacity,
                &shifted_discharge_capacity, i),
        });
    }

    Ok(SummaryTable { rows })
}

fn resolve_nominal_capacity(
    cell: &Cell,
    firsts: &[f64],
    frame: &[RepresentativeRow],
    options: &SummaryOptions,
) -> f64 {
    if let Some(ref_cycles) = &options.reference_cycles {
        let matched: Vec<f64> = frame
            .iter()
            .zip(firsts)
            .filter(|(r, _)| ref_cycles.contains(&r.cycle_index))
            .map(|(_, f)| *f)
            .collect();
        if !matched.is_empty() {
            return matched.iter().sum::<f64>() / matched.len() as f64;
        }
    }
    cell.nominal_capacity_or_fallback()
}

#[allow(clippy::too_many_arguments)]
fn specific_variants(
    cell: &Cell,
    charge: &[f64],
    discharge: &[f64],
    cum_charge: &[f64],
    cum_discharge: &[f64],
    coulombic_diff: &[f64],
    cum_coulombic_diff: &[f64],
    discharge_loss: &[Option<f64>],
    charge_loss: &[Option<f64>],
    cum_discharge_loss: &[Option<f64>],
    cum_charge_loss: &[Option<f64>],
    shifted_charge: &[f64],
    shifted_discharge: &[f64],
    i: usize,
) -> std::collections::HashMap<String, f64> {
    let mut out = std::collections::HashMap::new();
    let base_values: [(SummaryHeader, Option<f64>); 12] = [
        (SummaryHeader::DischargeCapacity, Some(discharge[i])),
        (SummaryHeader::ChargeCapacity, Some(charge[i])),
        (SummaryHeader::CumulatedChargeCapacity, Some(cum_charge[i])),
        (
            SummaryHeader::CumulatedDischargeCapacity,
            Some(cum_discharge[i]),
        ),
        (SummaryHeader::CoulombicDifference, Some(coulombic_diff[i])),
        (
            SummaryHeader::CumulatedCoulombicDifference,
            Some(cum_coulombic_diff[i]),
        ),
        (SummaryHeader::DischargeCapacityLoss, discharge_loss[i]),
        (SummaryHeader::ChargeCapacityLoss, charge_loss[i]),
        (
            SummaryHeader::CumulatedDischargeCapacityLoss,
            cum_discharge_loss[i],
        ),
        (
            SummaryHeader::CumulatedChargeCapacityLoss,
            cum_charge_loss[i],
        ),
        (SummaryHeader::ShiftedChargeCapacity, Some(shifted_charge[i])),
        (
            SummaryHeader::ShiftedDischargeCapacity,
            Some(shifted_discharge[i]),
        ),
    ];

    for (base, value) in base_values {
        let Some(value) = value else { continue };
        for mode in [
            SpecificMode::Gravimetric,
            SpecificMode::Areal,
            SpecificMode::Volumetric,
            SpecificMode::Absolute,
        ] {
            if let Some(factor) = specific_factor(cell, mode) {
                let key = SpecificColumnKey { base, postfix: mode };
                out.insert(key.column_name(), value * factor);
            }
        }
    }
    out
}

fn specific_factor(cell: &Cell, mode: SpecificMode) -> Option<f64> {
    let (normalizer_value, normalizer_unit, specific_unit) = match mode {
        SpecificMode::Absolute => (1.0, "1", "1"),
        SpecificMode::Gravimetric => (
            cell.metadata.mass_active.or(cell.metadata.mass_total)?,
            cell.raw_units.mass.as_str(),
            cell.cellpy_units.specific_gravimetric.as_str(),
        ),
        SpecificMode::Areal => (
            cell.metadata.active_electrode_area?,
            cell.cellpy_units.specific_areal.as_str(),
            cell.cellpy_units.specific_areal.as_str(),
        ),
        SpecificMode::Volumetric => (
            cell.metadata.active_electrode_volume?,
            cell.cellpy_units.specific_volumetric.as_str(),
            cell.cellpy_units.specific_volumetric.as_str(),
        ),
    };
    units::specific_conversion_factor(
        &cell.raw_units.charge,
        &cell.cellpy_units.charge,
        specific_unit,
        normalizer_value,
        normalizer_unit,
        mode,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::table::{RawRow, RawTable, StepRow, StepStats, StepsTable};
    use crate::model::{CellMetadata, CellpyUnits, RawUnits, TestMetadata};
    use chrono::NaiveDate;

    fn epoch() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn build_cell(charges: &[f64], discharges: &[f64]) -> Cell {
        let mut raw = RawTable::default();
        let mut steps = StepsTable::default();
        for (i, (c, d)) in charges.iter().zip(discharges).enumerate() {
            let dp = i as i64;
            raw.rows.push(RawRow {
                data_point: dp,
                test_time: dp as f64,
                step_time: 0.0,
                date_time: epoch(),
                cycle_index: dp + 1,
                step_index: 1,
                sub_step_index: 0,
                current: 0.0,
                voltage: 3.5,
                charge_capacity: *c,
                discharge_capacity: *d,
                internal_resistance: None,
            });
            steps.rows.push(StepRow {
                cycle: dp + 1,
                step: 1,
                ustep: dp,
                sub_step: 0,
                step_type: StepType::Charge,
                sub_type: String::new(),
                info: String::new(),
                voltage: StepStats { last: 3.5, ..StepStats::default() },
                current: StepStats::default(),
                charge: StepStats { delta: *c, ..StepStats::default() },
                discharge: StepStats { delta: *d, ..StepStats::default() },
                internal_resistance: StepStats::default(),
                point: StepStats::default(),
                test_time: StepStats::default(),
                step_time: StepStats::default(),
                rate_avr: 0.1,
                point_first: dp,
                point_last: dp,
            });
        }

        Cell {
            raw,
            steps,
            summary: SummaryTable::default(),
            files: Vec::new(),
            metadata: CellMetadata {
                nominal_capacity: Some(1.0),
                ..CellMetadata::default()
            },
            test_metadata: TestMetadata {
                cycle_mode: CycleMode::Full,
                ..TestMetadata::default()
            },
            raw_units: RawUnits::default(),
            cellpy_units: CellpyUnits::default(),
        }
    }

    /// Scenario S3: full-cell mode coulombic efficiency and differences.
    #[test]
    fn scenario_s3_coulombic_efficiency_and_difference() {
        let cell = build_cell(&[1.00, 0.95, 0.90], &[0.98, 0.93, 0.88]);
        let summary = summarize(&cell, &SelectorKind::NonRest, &SummaryOptions::default()).unwrap();
        let eff: Vec<f64> = summary.rows.iter().map(|r| r.coulombic_efficiency).collect();
        assert!((eff[0] - 98.0).abs() < 1e-6);
        assert!((eff[1] - 97.894736842).abs() < 1e-6);
        assert!((eff[2] - 97.777777778).abs() < 1e-6);

        let diff: Vec<f64> = summary.rows.iter().map(|r| r.coulombic_difference).collect();
        assert!(diff.iter().all(|d| (d - 0.02).abs() < 1e-9));

        let cum_diff: Vec<f64> = summary
            .rows
            .iter()
            .map(|r| r.cumulated_coulombic_difference)
            .collect();
        assert!((cum_diff[0] - 0.02).abs() < 1e-9);
        assert!((cum_diff[1] - 0.04).abs() < 1e-9);
        assert!((cum_diff[2] - 0.06).abs() < 1e-9);
    }

    /// Scenario S5: shifted capacity balance.
    #[test]
    fn scenario_s5_shifted_capacity() {
        let cell = build_cell(&[1.0, 0.9, 0.8], &[0.9, 0.8, 0.7]);
        let summary = summarize(&cell, &SelectorKind::NonRest, &SummaryOptions::default()).unwrap();
        let shifted_charge: Vec<f64> = summary.rows.iter().map(|r| r.shifted_charge_capacity).collect();
        assert!((shifted_charge[0] - 0.1).abs() < 1e-9);
        assert!((shifted_charge[1] - 0.2).abs() < 1e-9);
        assert!((shifted_charge[2] - 0.3).abs() < 1e-9);

        let shifted_discharge: Vec<f64> =
            summary.rows.iter().map(|r| r.shifted_discharge_capacity).collect();
        for v in shifted_discharge {
            assert!((v - 1.1).abs() < 1e-9);
        }
    }

    /// P4: cumulative charge capacity is a running sum.
    #[test]
    fn property_p4_cumulative_charge_capacity() {
        let cell = build_cell(&[1.0, 0.9, 0.8], &[0.9, 0.8, 0.7]);
        let summary = summarize(&cell, &SelectorKind::NonRest, &SummaryOptions::default()).unwrap();
        for k in 1..summary.rows.len() {
            let expected =
                summary.rows[k - 1].cumulated_charge_capacity + summary.rows[k].charge_capacity;
            assert!((summary.rows[k].cumulated_charge_capacity - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn first_cycle_losses_and_ric_are_nan() {
        let cell = build_cell(&[1.0, 0.9], &[0.9, 0.8]);
        let summary = summarize(&cell, &SelectorKind::NonRest, &SummaryOptions::default()).unwrap();
        assert!(summary.rows[0].charge_capacity_loss.is_nan());
        assert!(summary.rows[0].cumulated_ric.is_nan());
        assert!(!summary.rows[1].charge_capacity_loss.is_nan());
    }

    #[test]
    fn empty_cell_raises() {
        let cell = build_cell(&[], &[]);
        let err = summarize(&cell, &SelectorKind::NonRest, &SummaryOptions::default());
        assert!(matches!(err, Err(CellpyError::EmptyCell { .. })));
    }
}
