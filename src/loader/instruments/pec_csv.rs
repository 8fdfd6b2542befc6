//! PEC CSV reader (spec.md §4.1 "a PEC CSV reader"): comma-delimited,
//! reusing the shared [`TxtReader`] with PEC's own native column dictionary.

use crate::loader::config::{FormattersConfig, LoaderConfig};
use crate::loader::instruments::txt_delimited::TxtReader;
use crate::loader::AutoLoader;

pub fn pec_csv() -> LoaderConfig {
    // PEC already reports a signed current; split_current (derive sign from
    // state) is grounded only in Maccor's descriptor (spec.md/DESIGN.md), so
    // it's left out here the same way as Neware's.
    let post_processors: Vec<String> = crate::loader::config::DEFAULT_POST_PROCESSOR_ORDER
        .iter()
        .filter(|p| **p != "split_current")
        .map(|p| p.to_string())
        .collect();
    LoaderConfig {
        name: "pec-csv".to_string(),
        post_processors,
        rename_headers: [
            ("Cycle No", "cycle_index"),
            ("Step No", "step_index"),
            ("Test Time (Sec)", "test_time"),
            ("Current (A)", "current"),
            ("Voltage (V)", "voltage"),
            ("Step Capacity (Ah)", "capacity"),
            ("Step Type", "state"),
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
        states: [("CC-Chg", "charge"), ("CC-DChg", "discharge")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        formatters: FormattersConfig {
            delimiter: ",".to_string(),
            ..FormattersConfig::default()
        },
        ..LoaderConfig::default()
    }
}

pub fn pec_loader(config: LoaderConfig) -> AutoLoader<TxtReader> {
    AutoLoader::new(config, TxtReader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pec_csv_preset_uses_comma_and_maps_state_labels() {
        let config = pec_csv();
        assert_eq!(config.formatters.delimiter, ",");
        assert_eq!(config.states.get("CC-Chg"), Some(&"charge".to_string()));
    }
}
