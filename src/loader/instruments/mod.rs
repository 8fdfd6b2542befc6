//! Concrete instrument loaders (spec.md §4.1 "Instrument Loaders"). Every
//! loader here is an [`super::AutoLoader`] parameterised by a thin
//! [`super::FormatReader`]; none subclasses another.

pub mod custom;
pub mod h5_columnar;
pub mod pec_csv;
pub mod res_binary;
pub mod sql_table;
pub mod txt_delimited;
pub mod xlsx;
