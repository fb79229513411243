// file: src/exporter/mod.rs
// description: csv dataset storage and json report export
// reference: internal module structure

pub mod csv;
pub mod json;

pub use self::csv::CsvStore;
pub use self::json::{JsonExporter, LoadingsReport};
