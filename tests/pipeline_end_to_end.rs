//! End-to-end test chaining a built-in instrument loader, the step
//! classifier, and the summarizer over one synthetic two-cycle export
//! (spec.md §8 Scenario S1, carried through to the summary table).
//!
//! Each cycle discharges then charges. `split_capacity` forward-fills each
//! channel's last reading across the rows the other channel owns (spec.md
//! §4.1), so the cycle's last raw row — the selector's end-of-cycle
//! representative — carries both the cycle's total charge_capacity (its own
//! reading) and its total discharge_capacity (forward-filled from the
//! discharge steps earlier in the cycle), not a zero in either channel.

use cellcore::classify::classify_steps;
use cellcore::loader::instruments::txt_delimited::{maccor_txt, txt_loader};
use cellcore::loader::{Loader, ProcessingContext};
use cellcore::model::CellMetadata;
use cellcore::selector::SelectorKind;
use cellcore::summary::{summarize, SummaryOptions};

fn write_maccor_export(path: &std::path::Path) {
    // Amps is an unsigned magnitude (Maccor's own convention); split_current
    // recovers the sign from the State column, per maccor_txt()'s
    // post_processors. Amp-hr accumulates across the whole cycle without
    // resetting at the discharge/charge step boundary (Maccor does not need
    // cumulate_capacity_within_cycle), resetting only between cycles.
    std::fs::write(
        path,
        "Cyc#,Step,TestTime,Amps,Volts,Amp-hr,State\n\
         1,1,0,0.01,3.40,0.0000,D\n\
         1,1,1,0.01,3.00,0.0010,D\n\
         1,2,2,0.01,3.00,0.0010,C\n\
         1,2,3,0.01,3.40,0.0022,C\n\
         2,1,4,0.01,3.40,0.0000,D\n\
         2,1,5,0.01,3.00,0.0011,D\n\
         2,2,6,0.01,3.00,0.0011,C\n\
         2,2,7,0.01,3.40,0.0024,C\n",
    )
    .unwrap();
}

#[test]
fn loader_classify_and_summarize_agree_on_two_cycles() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = std::env::temp_dir();
    let path = dir.join("cellcore-test-pipeline-maccor.csv");
    write_maccor_export(&path);

    let config = maccor_txt();
    let loader = txt_loader(config);
    let ctx = ProcessingContext::new(&path, dir.clone());
    let mut cell = loader.load(&path, &ctx).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(cell.raw.distinct_cycle_indices(), vec![1, 2]);
    // split_current recovered the sign: discharge rows go negative.
    assert!(cell.raw.rows[0].current < 0.0);
    assert!(cell.raw.rows[2].current > 0.0);
    // The cycle's last row (a charge row) already carries its own
    // charge_capacity and the forward-filled discharge_capacity reached
    // earlier in the cycle — both nonzero.
    let last_cycle1 = &cell.raw.rows[3];
    assert!(last_cycle1.charge_capacity > 0.0);
    assert!(last_cycle1.discharge_capacity > 0.0);

    cell.metadata = CellMetadata {
        nominal_capacity: Some(0.0012),
        ..CellMetadata::default()
    };
    cell.steps = classify_steps(
        &cell.raw.rows,
        &loader.raw_limits(),
        cell.test_metadata.cycle_mode,
        cell.nominal_capacity_or_fallback(),
    );
    assert!(!cell.steps.is_empty());
    assert_eq!(cell.steps.rows_for_cycle(1).count(), 2);
    assert_eq!(cell.steps.rows_for_cycle(2).count(), 2);

    let summary = summarize(&cell, &SelectorKind::NonRest, &SummaryOptions::default()).unwrap();
    assert_eq!(summary.rows.len(), 2);

    let first = &summary.rows[0];
    let second = &summary.rows[1];
    assert_eq!(first.cycle_index, 1);
    assert_eq!(second.cycle_index, 2);

    // Both channels are nonzero at the representative row of each cycle.
    assert!((first.charge_capacity - 0.0022).abs() < 1e-9);
    assert!((first.discharge_capacity - 0.0010).abs() < 1e-9);
    assert!((second.charge_capacity - 0.0024).abs() < 1e-9);
    assert!((second.discharge_capacity - 0.0011).abs() < 1e-9);

    let expected_ce_first = 100.0 * 0.0010 / 0.0022;
    assert!((first.coulombic_efficiency - expected_ce_first).abs() < 1e-6);

    // The first row has no predecessor: the cumulative charge capacity
    // series starts at its own value, and loss columns that need a
    // previous row report NaN rather than zero (spec.md §4.3).
    assert_eq!(first.cumulated_charge_capacity, first.charge_capacity);
    assert!(first.charge_capacity_loss.is_nan());
    assert!(!second.charge_capacity_loss.is_nan());
    assert!(
        (second.cumulated_charge_capacity - (first.cumulated_charge_capacity + second.charge_capacity)).abs()
            < 1e-9
    );
}
