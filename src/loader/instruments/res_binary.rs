//! Arbin `.res` loader (spec.md §4.1, §6 "a three-table relational blob...
//! extracted either by an ODBC driver when available or by a subprocess
//! tool emitting CSV").
//!
//! spec.md §1 Non-goals: "no database query layer beyond an
//! instrument-loader variant that receives a pre-materialized table" — this
//! loader does not speak the proprietary Jet/ODBC format itself; it reads
//! the CSV the vendor-side extraction subprocess already produced (the
//! "normal" measurement table), which is the materialized table the
//! Non-goal refers to. Column names come from Arbin's fixed dictionary.

use crate::loader::config::{FormattersConfig, LoaderConfig};
use crate::loader::instruments::txt_delimited::TxtReader;
use crate::loader::AutoLoader;

pub fn arbin_res() -> LoaderConfig {
    LoaderConfig {
        name: "res-binary".to_string(),
        rename_headers: [
            ("Cycle_Index", "cycle_index"),
            ("Step_Index", "step_index"),
            ("Test_Time(s)", "test_time"),
            ("Step_Time(s)", "step_time"),
            ("Current(A)", "current"),
            ("Voltage(V)", "voltage"),
            ("Charge_Capacity(Ah)", "charge_capacity"),
            ("Discharge_Capacity(Ah)", "discharge_capacity"),
            ("Internal_Resistance(Ohm)", "internal_resistance"),
            ("Data_Point", "data_point"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
        columns_to_keep: [
            "cycle_index",
            "step_index",
            "test_time",
            "step_time",
            "current",
            "voltage",
            "charge_capacity",
            "discharge_capacity",
            "internal_resistance",
            "data_point",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
        formatters: FormattersConfig {
            delimiter: ",".to_string(),
            ..FormattersConfig::default()
        },
        ..LoaderConfig::default()
    }
}

pub fn res_loader(config: LoaderConfig) -> AutoLoader<TxtReader> {
    AutoLoader::new(config, TxtReader)
}
