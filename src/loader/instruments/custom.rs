//! `CustomLoader` (spec.md §4.1: "reads the descriptor from a yaml file,
//! then behaves as a TxtLoader with keep_all_columns as the default and
//! instrument-independent rename rules").

use std::path::Path;

use crate::error::Result;
use crate::loader::config::LoaderConfig;
use crate::loader::instruments::txt_delimited::TxtReader;
use crate::loader::{AutoLoader, Loader, ProcessingContext};

/// Builds a [`LoaderConfig`] from a user-supplied yaml descriptor, applying
/// the custom-loader defaults the declarative file may omit.
pub fn config_from_yaml_file(path: &Path) -> std::result::Result<LoaderConfig, crate::loader::config::ConfigError> {
    let mut config = LoaderConfig::from_yaml_file(path)?;
    if config.name.is_empty() {
        config.name = "custom".to_string();
    }
    // spec.md §4.1: "keep_all_columns as the default" distinguishes
    // CustomLoader from the built-in instrument loaders, which default to
    // an explicit keep list.
    if config.columns_to_keep.is_empty() {
        config.keep_all_columns = true;
    }
    Ok(config)
}

pub fn custom_loader(config: LoaderConfig) -> AutoLoader<TxtReader> {
    AutoLoader::new(config, TxtReader)
}

/// Convenience entry point: read the yaml descriptor, build the loader, and
/// load `data_path` in one call.
pub fn load_with_yaml_descriptor(
    descriptor_path: &Path,
    data_path: &Path,
    ctx: &ProcessingContext,
) -> Result<crate::model::Cell> {
    let config = config_from_yaml_file(descriptor_path).map_err(|e| crate::error::CellpyError::UnreadableFile {
        path: descriptor_path.to_path_buf(),
        config: "custom".to_string(),
        reason: e.to_string(),
    })?;
    custom_loader(config).load(data_path, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_descriptor_defaults_to_keep_all_columns() {
        let dir = std::env::temp_dir();
        let path = dir.join("cellcore-test-custom.yaml");
        std::fs::write(
            &path,
            "name: lab-custom\nrename_headers:\n  t: test_time\n",
        )
        .unwrap();
        let config = config_from_yaml_file(&path).unwrap();
        assert!(config.keep_all_columns);
        assert_eq!(config.name, "lab-custom");
        std::fs::remove_file(&path).ok();
    }
}
