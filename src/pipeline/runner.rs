// file: src/pipeline/runner.rs
// description: resumable captioning run over prompt records with failure cutoff
// reference: orchestrates encoding, captioning and checkpointed csv output

use crate::captioner::{Captioner, RetryPolicy, encode_image_png_base64};
use crate::error::{PipelineError, Result};
use crate::exporter::CsvStore;
use crate::models::{CaptionRecord, PromptRecord};
use crate::pipeline::progress::ProgressTracker;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output: PathBuf,
    pub checkpoint: Option<PathBuf>,
    pub save_interval: usize,
    pub resume: bool,
    pub sort_by_id: bool,
    pub request_delay: Duration,
    pub max_consecutive_failures: usize,
}

impl RunOptions {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            checkpoint: None,
            save_interval: 50,
            resume: false,
            sort_by_id: false,
            request_delay: Duration::ZERO,
            max_consecutive_failures: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub captioned: usize,
    pub failed: usize,
    pub skipped: usize,
    pub resumed: usize,
    pub aborted: bool,
    pub written: usize,
}

pub struct CaptionRunner<C: Captioner> {
    captioner: C,
    retry: RetryPolicy,
    image_dir: PathBuf,
    label: String,
    show_progress: bool,
    colored: bool,
}

impl<C: Captioner> CaptionRunner<C> {
    pub fn new(
        captioner: C,
        retry: RetryPolicy,
        image_dir: impl Into<PathBuf>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            captioner,
            retry,
            image_dir: image_dir.into(),
            label: label.into(),
            show_progress: true,
            colored: true,
        }
    }

    pub fn with_progress(mut self, show_progress: bool, colored: bool) -> Self {
        self.show_progress = show_progress;
        self.colored = colored;
        self
    }

    pub fn captioner(&self) -> &C {
        &self.captioner
    }

    pub async fn run(&self, records: Vec<PromptRecord>, options: &RunOptions) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut kept: Vec<CaptionRecord> = Vec::new();

        let pending: Vec<PromptRecord> = if options.resume && options.output.is_file() {
            let existing = CsvStore::read_captions(&options.output)?;
            let done: HashSet<String> = existing
                .iter()
                .map(|r| r.image_filename.clone())
                .collect();

            kept = existing.into_iter().filter(|r| r.has_caption()).collect();
            summary.resumed = kept.len();

            info!(
                "[{}] Resuming: {} captioned rows already in {}",
                self.label,
                kept.len(),
                options.output.display()
            );

            records
                .into_iter()
                .filter(|r| !done.contains(&r.image_filename))
                .collect()
        } else {
            records
        };

        if pending.is_empty() {
            info!("[{}] Nothing left to caption", self.label);
            if !options.resume || !options.output.is_file() {
                CsvStore::write_captions(&options.output, &kept)?;
                summary.written = kept.len();
            }
            return Ok(summary);
        }

        info!(
            "[{}] Starting captioning for {} images",
            self.label,
            pending.len()
        );

        let progress = if self.show_progress {
            ProgressTracker::with_color(pending.len(), self.colored)
        } else {
            ProgressTracker::hidden(pending.len())
        };

        let mut captioned: Vec<CaptionRecord> = Vec::new();
        let mut consecutive_failures = 0usize;
        let total = pending.len();

        for (index, record) in pending.into_iter().enumerate() {
            progress.set_message(record.id.clone());
            let image_path = self.image_dir.join(&record.image_filename);

            if !image_path.is_file() {
                debug!("[{}] [{}] Image missing, skipping", self.label, record.id);
                summary.skipped += 1;
                progress.inc_skipped();
            } else {
                match self.caption_one(&record.id, image_path).await {
                    Ok(caption) => {
                        captioned.push(record.with_caption(caption));
                        summary.captioned += 1;
                        consecutive_failures = 0;
                        progress.inc_captioned();

                        if !options.request_delay.is_zero() {
                            tokio::time::sleep(options.request_delay).await;
                        }
                    }
                    Err(e) => {
                        warn!("[{}] [{}] Captioning failed: {}", self.label, record.id, e);
                        summary.failed += 1;
                        consecutive_failures += 1;
                        progress.inc_failed();

                        if options.max_consecutive_failures > 0
                            && consecutive_failures >= options.max_consecutive_failures
                        {
                            warn!(
                                "[{}] {} consecutive failures, stopping early",
                                self.label, consecutive_failures
                            );
                            summary.aborted = true;
                            break;
                        }
                    }
                }
            }

            let processed = index + 1;
            if let Some(checkpoint) = &options.checkpoint
                && (processed % options.save_interval.max(1) == 0 || processed == total)
            {
                let snapshot = self.combine(&kept, &captioned, options.sort_by_id);
                CsvStore::write_captions(checkpoint, &snapshot)?;
                info!(
                    "[{}] Auto-saved {} records to {}",
                    self.label,
                    snapshot.len(),
                    checkpoint.display()
                );
            }
        }

        progress.finish();
        let stats = progress.get_stats();
        debug!(
            "[{}] {:.2} items/s, {:.1}% success",
            self.label,
            stats.items_per_second(),
            stats.success_rate()
        );

        let combined = self.combine(&kept, &captioned, options.sort_by_id);
        CsvStore::write_captions(&options.output, &combined)?;
        summary.written = combined.len();

        info!(
            "[{}] Saved {} records to {}",
            self.label,
            combined.len(),
            options.output.display()
        );
        Ok(summary)
    }

    async fn caption_one(&self, id: &str, image_path: PathBuf) -> Result<String> {
        let encoded = tokio::task::spawn_blocking(move || encode_image_png_base64(&image_path))
            .await
            .map_err(|e| PipelineError::Image(format!("Encoding task failed: {}", e)))??;

        self.retry
            .run(id, || self.captioner.caption(&encoded))
            .await
    }

    fn combine(
        &self,
        kept: &[CaptionRecord],
        captioned: &[CaptionRecord],
        sort_by_id: bool,
    ) -> Vec<CaptionRecord> {
        let mut combined: Vec<CaptionRecord> = kept.iter().chain(captioned).cloned().collect();
        if sort_by_id {
            CaptionRecord::sort_by_id(&mut combined);
        }
        combined
    }
}
