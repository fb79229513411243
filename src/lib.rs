// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod analysis;
pub mod captioner;
pub mod config;
pub mod error;
pub mod exporter;
pub mod models;
pub mod pipeline;
pub mod sources;
pub mod utils;

pub use analysis::{MetricTable, PrincipalComponent, component_loadings};
pub use captioner::{Captioner, OpenAiCaptionClient, RetryPolicy};
pub use config::{AnalysisConfig, CaptionerConfig, Config, DatasetConfig, EvaluationConfig};
pub use error::{PipelineError, Result};
pub use exporter::{CsvStore, JsonExporter, LoadingsReport};
pub use models::{CaptionRecord, ComponentLoadings, Loading, OriginalPrompt, PromptRecord};
pub use pipeline::{CaptionRunner, PipelineStats, ProgressTracker, RunOptions, RunSummary};
pub use sources::{
    CivitaiSource, EnhancedFolder, LexicaExtraction, LexicaSource, OriginalPromptCollector,
};
pub use utils::{OperationTimer, PerformanceMetrics, Validator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let config = Config::default_config();
        let _policy = RetryPolicy::from_config(&config.captioner);
        let _options = RunOptions::new("captions.csv");
    }
}
