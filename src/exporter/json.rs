// file: src/exporter/json.rs
// description: json export of principal component loading reports

use crate::error::{PipelineError, Result};
use crate::models::ComponentLoadings;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct JsonExporter {
    output_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoadingsReport {
    pub exported_at: String,
    pub groups: Vec<ComponentLoadings>,
}

impl LoadingsReport {
    pub fn new(groups: Vec<ComponentLoadings>) -> Self {
        Self {
            exported_at: Utc::now().to_rfc3339(),
            groups,
        }
    }
}

impl JsonExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).map_err(|source| PipelineError::FileOperation {
            path: output_dir.clone(),
            source,
        })?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn export_loadings(
        &self,
        file_name: &str,
        report: &LoadingsReport,
        pretty: bool,
    ) -> Result<PathBuf> {
        let path = self.output_dir.join(file_name);

        let body = if pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        };

        fs::write(&path, body).map_err(|source| PipelineError::FileOperation {
            path: path.clone(),
            source,
        })?;

        info!(
            "Exported {} loading groups to {}",
            report.groups.len(),
            path.display()
        );
        Ok(path)
    }
}
