// file: src/analysis/mod.rs
// description: metric table analysis module exports
// reference: internal module structure

pub mod pca;

pub use pca::{MetricTable, PrincipalComponent, component_loadings, first_component};
