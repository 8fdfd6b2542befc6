//! Arbin SQL loader (spec.md §6 "SQL source: a server/database pair;
//! queries return the three row-sets above").
//!
//! spec.md §1 Non-goals: "no database query layer beyond an
//! instrument-loader variant that receives a pre-materialized table" — the
//! outbound query itself is out of scope; this loader consumes the already
//! materialized result set (a CSV dump of the query), sharing Arbin's
//! column dictionary with [`super::res_binary`].

use crate::loader::config::{FormattersConfig, LoaderConfig};
use crate::loader::instruments::txt_delimited::TxtReader;
use crate::loader::AutoLoader;

pub fn arbin_sql() -> LoaderConfig {
    let arbin = super::res_binary::arbin_res();
    LoaderConfig {
        name: "sql-table".to_string(),
        rename_headers: arbin.rename_headers,
        columns_to_keep: arbin.columns_to_keep,
        formatters: FormattersConfig {
            delimiter: ",".to_string(),
            ..FormattersConfig::default()
        },
        ..LoaderConfig::default()
    }
}

pub fn sql_loader(config: LoaderConfig) -> AutoLoader<TxtReader> {
    AutoLoader::new(config, TxtReader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_arbin_column_dictionary_with_res_binary() {
        let sql = arbin_sql();
        let res = super::super::res_binary::arbin_res();
        assert_eq!(sql.rename_headers, res.rename_headers);
    }
}
