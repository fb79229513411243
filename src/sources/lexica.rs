// file: src/sources/lexica.rs
// description: Lexica parquet shard reader with ordered concurrent image download
// reference: https://docs.rs/parquet

use super::list_files;
use crate::captioner::verify_image_bytes;
use crate::config::DatasetConfig;
use crate::error::{PipelineError, Result};
use crate::models::PromptRecord;
use crate::utils::Validator;
use arrow::compute::cast;
use arrow_array::{Array, ArrayRef, BinaryArray, RecordBatch, StringArray, StructArray};
use arrow_schema::DataType;
use futures::stream::{self, StreamExt};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use reqwest::Client;
use std::fs::{self, File};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where a row's image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageRef {
    Inline(Vec<u8>),
    Url(String),
    /// An image struct whose byte payload is null.
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexicaRow {
    pub prompt: String,
    pub image: ImageRef,
}

#[derive(Debug, Default)]
pub struct LexicaExtraction {
    pub records: Vec<PromptRecord>,
    pub downloaded: usize,
    pub reused: usize,
    pub failures: usize,
    pub aborted: bool,
}

pub struct LexicaSource {
    data_dir: PathBuf,
    image_dir: PathBuf,
    config: DatasetConfig,
    client: Client,
}

struct Planned {
    prompt: String,
    ext: String,
    payload: Result<Vec<u8>>,
}

impl LexicaSource {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        image_dir: impl Into<PathBuf>,
        config: DatasetConfig,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()?;

        Ok(Self {
            data_dir: data_dir.into(),
            image_dir: image_dir.into(),
            config,
            client,
        })
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub async fn extract_and_download(&self) -> Result<LexicaExtraction> {
        fs::create_dir_all(&self.image_dir).map_err(|source| PipelineError::FileOperation {
            path: self.image_dir.clone(),
            source,
        })?;

        let mut extraction = LexicaExtraction::default();
        let mut next_id: u64 = 1;
        let mut consecutive_fails = 0usize;

        for shard in list_files(&self.data_dir, "parquet")? {
            info!("Processing {}", shard.display());

            let rows = match read_shard(&shard) {
                Ok(rows) if rows.is_empty() => {
                    info!("Skipping {} (no rows)", shard.display());
                    continue;
                }
                Ok(rows) => rows,
                Err(e) => {
                    error!("Failed to read {}: {}", shard.display(), e);
                    continue;
                }
            };

            let planned = stream::iter(rows.into_iter().filter_map(|row| self.plan(row)))
                .buffered(self.config.download_workers.max(1));
            futures::pin_mut!(planned);

            while let Some(item) = planned.next().await {
                match self.store(item, next_id) {
                    Ok(stored) => {
                        if stored.reused {
                            extraction.reused += 1;
                        } else {
                            extraction.downloaded += 1;
                        }
                        extraction.records.push(stored.record);
                        next_id += 1;
                        consecutive_fails = 0;
                    }
                    Err(e) => {
                        debug!("Image fetch failed: {}", e);
                        extraction.failures += 1;
                        consecutive_fails += 1;
                        if consecutive_fails >= self.config.max_consecutive_failures {
                            break;
                        }
                    }
                }
            }

            if consecutive_fails >= self.config.max_consecutive_failures {
                warn!(
                    "Aborting: {} consecutive download failures",
                    self.config.max_consecutive_failures
                );
                extraction.aborted = true;
                break;
            }
        }

        info!(
            "Extracted {} images ({} downloaded, {} reused, {} failures)",
            extraction.records.len(),
            extraction.downloaded,
            extraction.reused,
            extraction.failures
        );
        Ok(extraction)
    }

    /// Resolves a row to its payload future; rows with an unsupported url
    /// extension are dropped without counting as failures.
    fn plan(&self, row: LexicaRow) -> Option<impl Future<Output = Planned> + '_> {
        let ext = match &row.image {
            ImageRef::Url(url) => {
                let ext = Validator::url_extension(url);
                if Validator::validate_image_extension(&ext, &self.config.allowed_extensions)
                    .is_err()
                {
                    debug!("Unsupported image url {}", url);
                    return None;
                }
                ext
            }
            ImageRef::Inline(_) | ImageRef::Empty => "png".to_string(),
        };

        Some(async move {
            let payload = match row.image {
                ImageRef::Inline(bytes) => Ok(bytes),
                ImageRef::Url(url) => self.fetch(&url).await,
                ImageRef::Empty => Err(PipelineError::Validation(
                    "image struct without bytes".to_string(),
                )),
            };

            Planned {
                prompt: row.prompt,
                ext,
                payload,
            }
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    fn store(&self, item: Planned, id_number: u64) -> Result<Stored> {
        let id = format!("img_{:07}", id_number);
        let image_filename = format!("{}.{}", id, item.ext);
        let path = self.image_dir.join(&image_filename);

        let bytes = item.payload?;
        if bytes.is_empty() {
            return Err(PipelineError::Validation("empty image payload".to_string()));
        }

        // Only a row that produced its own payload may claim an existing file.
        if path.exists() {
            debug!("{} already on disk, reusing", image_filename);
            return Ok(Stored {
                record: PromptRecord::new(id, item.prompt, image_filename),
                reused: true,
            });
        }

        verify_image_bytes(&bytes)?;

        fs::write(&path, &bytes).map_err(|source| PipelineError::FileOperation {
            path: path.clone(),
            source,
        })?;

        Ok(Stored {
            record: PromptRecord::new(id, item.prompt, image_filename),
            reused: false,
        })
    }
}

struct Stored {
    record: PromptRecord,
    reused: bool,
}

/// Reads one shard into rows that carry both a prompt and an image ref.
pub fn read_shard(path: &Path) -> Result<Vec<LexicaRow>> {
    let file = File::open(path).map_err(|source| PipelineError::FileOperation {
        path: path.to_path_buf(),
        source,
    })?;

    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        rows.extend(rows_from_batch(&batch?)?);
    }

    Ok(rows)
}

fn rows_from_batch(batch: &RecordBatch) -> Result<Vec<LexicaRow>> {
    let text_col = string_column(batch.column_by_name("text"))?;
    let prompt_col = string_column(batch.column_by_name("prompt"))?;
    let image = batch.column_by_name("image");
    let url_col = string_column(batch.column_by_name("url"))?;

    let image_struct = image.and_then(|col| col.as_any().downcast_ref::<StructArray>());
    let image_strings = match image {
        Some(col) if image_struct.is_none() => string_column(Some(col)).ok().flatten(),
        _ => None,
    };

    let struct_bytes = match image_struct.and_then(|s| s.column_by_name("bytes")) {
        Some(col) => Some(binary_column(col)?),
        None => None,
    };
    let struct_url = string_column(image_struct.and_then(|s| s.column_by_name("url")))?;

    let mut rows = Vec::with_capacity(batch.num_rows());

    for i in 0..batch.num_rows() {
        let Some(prompt) = non_empty(&text_col, i).or_else(|| non_empty(&prompt_col, i)) else {
            continue;
        };

        let from_image = match (image_struct, &image_strings) {
            (Some(s), _) if s.is_valid(i) => {
                if let Some(bytes) = &struct_bytes {
                    if bytes.is_valid(i) && !bytes.value(i).is_empty() {
                        Some(ImageRef::Inline(bytes.value(i).to_vec()))
                    } else {
                        Some(ImageRef::Empty)
                    }
                } else {
                    non_empty(&struct_url, i).map(ImageRef::Url)
                }
            }
            (None, Some(_)) => non_empty(&image_strings, i).map(ImageRef::Url),
            _ => None,
        };

        let Some(image) = from_image.or_else(|| non_empty(&url_col, i).map(ImageRef::Url)) else {
            continue;
        };

        rows.push(LexicaRow { prompt, image });
    }

    Ok(rows)
}

fn string_column(column: Option<&ArrayRef>) -> Result<Option<StringArray>> {
    let Some(column) = column else {
        return Ok(None);
    };

    if !matches!(
        column.data_type(),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
    ) {
        return Ok(None);
    }

    let casted = cast(column, &DataType::Utf8)?;
    Ok(casted.as_any().downcast_ref::<StringArray>().cloned())
}

fn binary_column(column: &ArrayRef) -> Result<BinaryArray> {
    let casted = cast(column, &DataType::Binary)?;
    casted
        .as_any()
        .downcast_ref::<BinaryArray>()
        .cloned()
        .ok_or_else(|| PipelineError::Parquet("image.bytes is not binary".to_string()))
}

fn non_empty(column: &Option<StringArray>, i: usize) -> Option<String> {
    let column = column.as_ref()?;
    if column.is_null(i) {
        return None;
    }
    let value = column.value(i).trim();
    (!value.is_empty()).then(|| value.to_string())
}
