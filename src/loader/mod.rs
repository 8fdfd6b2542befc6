//! The instrument-loader framework (spec.md §4.1): an abstract loader
//! contract, a name-keyed registry, a declarative configuration descriptor,
//! and the fixed post-processor pipeline every concrete loader forwards to.
//!
//! Grounded on the teacher's device/config split: [`config::LoaderConfig`]
//! plays the role of `ScenarioConfig` (value-typed, `#[serde(default)]`,
//! collected validation errors) and [`Loader`] plays the role of the
//! `Device` trait (a narrow contract several concrete types implement).

pub mod config;
pub mod frame;
pub mod instruments;
pub mod processors;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::classify::RawLimits;
use crate::error::{CellpyError, Result};
use crate::model::{Cell, CellMetadata, TestMetadata};

pub use config::LoaderConfig;
pub use frame::NativeFrame;

/// Per-load scratch space and source identity (spec.md §5 "Shared
/// resources: the temporary directory is shared by all loaders; each uses a
/// uniquely-named scratch file derived from the source path").
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    pub source_path: PathBuf,
    pub scratch_dir: PathBuf,
}

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

impl ProcessingContext {
    pub fn new(source_path: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    /// A scratch file path unique to this source and this call, so
    /// concurrent loads of different files never collide.
    pub fn scratch_file(&self, suffix: &str) -> PathBuf {
        let stem = self
            .source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("source");
        let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.scratch_dir.join(format!("{stem}-{n}-{suffix}"))
    }
}

/// The result of a format-specific read: the native tabular data plus any
/// cell-level metadata the format's own header sheet/section carries
/// (spec.md §6 "Cell metadata exposed after load").
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub frame: NativeFrame,
    pub metadata: CellMetadata,
}

/// A format-specific table reader: the only piece that differs between
/// concrete instrument loaders (spec.md §4.1 "Each is thin: it extracts
/// columns, computes unit fractions, and forwards everything else to
/// post-processors").
pub trait FormatReader {
    fn query_file(&self, path: &Path, config: &LoaderConfig, ctx: &ProcessingContext) -> Result<QueryResult>;
}

/// The loader contract (spec.md §4.1 "Contract").
pub trait Loader {
    fn load(&self, path: &Path, ctx: &ProcessingContext) -> Result<Cell>;
    fn raw_limits(&self) -> RawLimits;
}

/// spec.md §4.1 "AutoLoader: a template that runs pre-processors, then a
/// format-specific query_file to obtain a table, then post-processors."
/// Every concrete instrument loader in this crate is an `AutoLoader`
/// parameterised by its [`FormatReader`]; no loader subclasses another.
pub struct AutoLoader<R: FormatReader> {
    pub config: LoaderConfig,
    pub reader: R,
}

impl<R: FormatReader> AutoLoader<R> {
    pub fn new(config: LoaderConfig, reader: R) -> Self {
        Self { config, reader }
    }

    fn run_pre_processors(&self, path: &Path, ctx: &ProcessingContext) -> Result<PathBuf> {
        let mut current = path.to_path_buf();
        for pass in &self.config.pre_processors {
            if pass == "remove_empty_lines" {
                current = processors::remove_empty_lines(&current, ctx).map_err(|e| {
                    CellpyError::UnreadableFile {
                        path: current.clone(),
                        config: self.config.name.clone(),
                        reason: e.to_string(),
                    }
                })?;
            }
        }
        Ok(current)
    }
}

impl<R: FormatReader> Loader for AutoLoader<R> {
    fn load(&self, path: &Path, ctx: &ProcessingContext) -> Result<Cell> {
        if !path.exists() {
            return Err(CellpyError::FileNotFound {
                path: path.to_path_buf(),
                config: self.config.name.clone(),
            });
        }
        let staged_path = self.run_pre_processors(path, ctx)?;
        let query = self.reader.query_file(&staged_path, &self.config, ctx)?;
        let cellpy_units = crate::model::CellpyUnits::default();
        let raw = processors::run_post_processors(query.frame, &self.config, &cellpy_units)?;

        let mut cell = Cell::empty(
            TestMetadata {
                cycle_mode: self.config.cycle_mode,
                ..TestMetadata::default()
            },
            self.config.raw_units.clone(),
        );
        cell.raw = raw;
        cell.metadata = query.metadata;
        Ok(cell)
    }

    fn raw_limits(&self) -> RawLimits {
        self.config.raw_limits
    }
}

/// spec.md §4.1 "Registry. A name -> descriptor/loader mapping... A loader
/// may be selected by exact name, by yaml-file path, or by matching a
/// filename extension." Process-wide and immutable after construction
/// (spec.md §5).
pub struct Registry {
    by_name: HashMap<String, LoaderConfig>,
    by_extension: HashMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
            by_extension: HashMap::new(),
        }
    }

    /// The registry pre-populated with this crate's built-in instrument
    /// configurations (spec.md §4.1 "Built-in names include res-binary,
    /// sql-table, h5-columnar, txt-delimited (two variants), xlsx, csv, and
    /// custom").
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_with_extension(instruments::txt_delimited::maccor_txt(), "txt");
        registry.register(instruments::txt_delimited::neware_txt());
        registry.register_with_extension(instruments::xlsx::neware_xlsx(), "xlsx");
        registry.register_with_extension(instruments::pec_csv::pec_csv(), "csv");
        registry.register(instruments::res_binary::arbin_res());
        registry.register(instruments::sql_table::arbin_sql());
        registry.register(instruments::h5_columnar::arbin_h5());
        registry
    }

    pub fn register(&mut self, config: LoaderConfig) {
        self.by_name.insert(config.name.clone(), config);
    }

    pub fn register_with_extension(&mut self, config: LoaderConfig, extension: &str) {
        self.by_extension
            .insert(extension.trim_start_matches('.').to_ascii_lowercase(), config.name.clone());
        self.register(config);
    }

    pub fn by_name(&self, name: &str) -> Option<&LoaderConfig> {
        self.by_name.get(name)
    }

    pub fn by_path(&self, path: &Path) -> Option<&LoaderConfig> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let name = self.by_extension.get(&ext)?;
        self.by_name(name)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_by_name_and_extension() {
        let registry = Registry::with_builtins();
        assert!(registry.by_name("maccor-txt").is_some());
        let resolved = registry.by_path(Path::new("export.xlsx")).unwrap();
        assert_eq!(resolved.name, "neware-xlsx");
    }

    #[test]
    fn unresolved_extension_is_none() {
        let registry = Registry::with_builtins();
        assert!(registry.by_path(Path::new("export.bin")).is_none());
    }

    #[test]
    fn scratch_files_are_unique_per_call() {
        let ctx = ProcessingContext::new("/tmp/source.txt", std::env::temp_dir());
        let a = ctx.scratch_file("x");
        let b = ctx.scratch_file("x");
        assert_ne!(a, b);
    }
}
