// file: src/config.rs
// description: application configuration management with toml support
// reference: https://docs.rs/config

use crate::error::{PipelineError, Result};
use crate::utils::Validator;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub captioner: CaptionerConfig,
    pub dataset: DatasetConfig,
    pub evaluation: EvaluationConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptionerConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub instruction: String,
    pub max_tokens: u32,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub request_delay_ms: u64,
    pub rate_limit_backoff_ms: u64,
    pub max_consecutive_failures: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetConfig {
    pub download_timeout_secs: u64,
    pub allowed_extensions: Vec<String>,
    pub max_consecutive_failures: usize,
    pub download_workers: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvaluationConfig {
    pub model_folders: Vec<String>,
    pub num_samples: usize,
    pub save_interval: usize,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    pub faithfulness_columns: Vec<String>,
    pub richness_columns: Vec<String>,
}

pub const DEFAULT_INSTRUCTION: &str = "Describe this image briefly, including the subject(s) and visual details. Use one clear sentence.";

impl CaptionerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder.add_source(config::File::from(Path::new("config/default.toml")));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("T2I_EVAL")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("evaluation.model_folders")
                .with_list_parse_key("dataset.allowed_extensions"),
        );

        let settings = builder
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        config.apply_env_api_key();
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        let mut config = Self {
            captioner: CaptionerConfig {
                endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
                api_key: None,
                model: "gpt-4o-mini".to_string(),
                instruction: DEFAULT_INSTRUCTION.to_string(),
                max_tokens: 100,
                retries: 3,
                retry_delay_ms: 1500,
                request_delay_ms: 1500,
                rate_limit_backoff_ms: 5000,
                max_consecutive_failures: 10,
                timeout_secs: 60,
            },
            dataset: DatasetConfig {
                download_timeout_secs: 10,
                allowed_extensions: vec![
                    "jpg".to_string(),
                    "jpeg".to_string(),
                    "png".to_string(),
                    "webp".to_string(),
                ],
                max_consecutive_failures: 20,
                download_workers: 4,
            },
            evaluation: EvaluationConfig {
                model_folders: vec![
                    "T5".to_string(),
                    "BART".to_string(),
                    "QWEN".to_string(),
                    "DEEPSEEK".to_string(),
                ],
                num_samples: 200,
                save_interval: 50,
                output_dir: PathBuf::from("model_outputs"),
            },
            analysis: AnalysisConfig {
                faithfulness_columns: [
                    "h_bleu", "h_rouge", "h_bert", "h_cosine", "h_entail", "h_novelty", "h_lora",
                ]
                .iter()
                .map(|c| c.to_string())
                .collect(),
                richness_columns: [
                    "ttr_diff",
                    "density_diff",
                    "adj_ratio_diff",
                    "noun_ratio_diff",
                    "verb_ratio_diff",
                    "ner_diff",
                ]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            },
        };
        config.apply_env_api_key();
        config
    }

    /// Falls back to `OPENAI_API_KEY` when no key is configured.
    fn apply_env_api_key(&mut self) {
        let configured = self
            .captioner
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());

        if !configured {
            self.captioner.api_key = std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty());
        }
    }

    pub fn validate(&self) -> Result<()> {
        Validator::validate_url(&self.captioner.endpoint)?;

        if self.captioner.retries == 0 {
            return Err(PipelineError::Config(
                "captioner.retries must be greater than 0".to_string(),
            ));
        }

        if self.captioner.max_tokens == 0 {
            return Err(PipelineError::Config(
                "captioner.max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.dataset.download_workers == 0 {
            return Err(PipelineError::Config(
                "dataset.download_workers must be greater than 0".to_string(),
            ));
        }

        if self.evaluation.num_samples == 0 {
            return Err(PipelineError::Config(
                "evaluation.num_samples must be greater than 0".to_string(),
            ));
        }

        if self.evaluation.save_interval == 0 {
            return Err(PipelineError::Config(
                "evaluation.save_interval must be greater than 0".to_string(),
            ));
        }

        if self.evaluation.model_folders.is_empty() {
            return Err(PipelineError::Config(
                "evaluation.model_folders must not be empty".to_string(),
            ));
        }

        if self.analysis.faithfulness_columns.is_empty() || self.analysis.richness_columns.is_empty()
        {
            return Err(PipelineError::Config(
                "analysis column lists must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.captioner.model, "gpt-4o-mini");
        assert_eq!(config.evaluation.model_folders.len(), 4);
        assert_eq!(config.analysis.faithfulness_columns.len(), 7);
        assert_eq!(config.analysis.richness_columns.len(), 6);
    }

    #[test]
    fn test_validate_rejects_zero_save_interval() {
        let mut config = Config::default_config();
        config.evaluation.save_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let mut config = Config::default_config();
        config.captioner.endpoint = "api.openai.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_and_api_key_fallback() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.toml");
        fs::write(&path, toml_for(&Config::default_config())).unwrap();

        // SAFETY: these keys are set and cleared only by this test.
        unsafe {
            std::env::set_var("T2I_EVAL__CAPTIONER__MODEL", "gpt-4o");
            std::env::set_var("T2I_EVAL__EVALUATION__MODEL_FOLDERS", "T5,QWEN");
            std::env::set_var("OPENAI_API_KEY", "sk-from-env");
        }

        let loaded = Config::load(Some(&path));

        unsafe {
            std::env::remove_var("T2I_EVAL__CAPTIONER__MODEL");
            std::env::remove_var("T2I_EVAL__EVALUATION__MODEL_FOLDERS");
            std::env::remove_var("OPENAI_API_KEY");
        }

        let config = loaded.unwrap();
        assert_eq!(config.captioner.model, "gpt-4o");
        assert_eq!(config.evaluation.model_folders, vec!["T5", "QWEN"]);
        assert_eq!(config.captioner.api_key.as_deref(), Some("sk-from-env"));
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.toml");
        let defaults = Config::default_config();
        let mut text = toml_for(&defaults);
        text = text.replace("num_samples = 200", "num_samples = 25");
        fs::write(&path, text).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.evaluation.num_samples, 25);
        assert_eq!(config.dataset.max_consecutive_failures, 20);
    }

    fn toml_for(config: &Config) -> String {
        let quote_list = |items: &[String]| {
            items
                .iter()
                .map(|i| format!("\"{}\"", i))
                .collect::<Vec<_>>()
                .join(", ")
        };

        format!(
            "[captioner]\n\
             endpoint = \"{}\"\n\
             model = \"{}\"\n\
             instruction = \"{}\"\n\
             max_tokens = {}\n\
             retries = {}\n\
             retry_delay_ms = {}\n\
             request_delay_ms = {}\n\
             rate_limit_backoff_ms = {}\n\
             max_consecutive_failures = {}\n\
             timeout_secs = {}\n\n\
             [dataset]\n\
             download_timeout_secs = {}\n\
             allowed_extensions = [{}]\n\
             max_consecutive_failures = {}\n\
             download_workers = {}\n\n\
             [evaluation]\n\
             model_folders = [{}]\n\
             num_samples = {}\n\
             save_interval = {}\n\
             output_dir = \"{}\"\n\n\
             [analysis]\n\
             faithfulness_columns = [{}]\n\
             richness_columns = [{}]\n",
            config.captioner.endpoint,
            config.captioner.model,
            config.captioner.instruction,
            config.captioner.max_tokens,
            config.captioner.retries,
            config.captioner.retry_delay_ms,
            config.captioner.request_delay_ms,
            config.captioner.rate_limit_backoff_ms,
            config.captioner.max_consecutive_failures,
            config.captioner.timeout_secs,
            config.dataset.download_timeout_secs,
            quote_list(&config.dataset.allowed_extensions),
            config.dataset.max_consecutive_failures,
            config.dataset.download_workers,
            quote_list(&config.evaluation.model_folders),
            config.evaluation.num_samples,
            config.evaluation.save_interval,
            config.evaluation.output_dir.display(),
            quote_list(&config.analysis.faithfulness_columns),
            quote_list(&config.analysis.richness_columns),
        )
    }
}
