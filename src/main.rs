// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use t2i_eval::utils::logging::{
    format_error, format_info, format_step, format_success, format_warning,
};
use t2i_eval::{
    CaptionRunner, CivitaiSource, Config, CsvStore, EnhancedFolder, JsonExporter, LexicaSource,
    LoadingsReport, MetricTable, OpenAiCaptionClient, OperationTimer, OriginalPromptCollector,
    RetryPolicy, RunOptions, RunSummary, component_loadings,
};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "t2i_eval")]
#[command(author = "t2i_eval contributors")]
#[command(version = "0.1.0")]
#[command(about = "Dataset captioning and metric analysis for prompt-enhanced text-to-image evaluation", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract Civitai prompts from metadata JSON and caption the images
    Civitai {
        #[arg(short, long, value_name = "DIR")]
        dir: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Pause after each successful caption (overrides captioner.request_delay_ms)
        #[arg(long, value_name = "MS")]
        request_delay_ms: Option<u64>,

        #[arg(long)]
        resume: bool,
    },

    /// Store Lexica parquet images locally and caption them
    Lexica {
        #[arg(long, value_name = "DIR")]
        data_dir: PathBuf,

        #[arg(long, value_name = "DIR", default_value = "lexica_images")]
        image_dir: PathBuf,

        #[arg(short, long, value_name = "FILE", default_value = "lexica_captions.csv")]
        output: PathBuf,

        #[arg(long)]
        no_resume: bool,

        /// Only extract and download, skip captioning
        #[arg(long)]
        skip_captions: bool,
    },

    /// Caption enhanced-prompt images per model folder
    Enhanced {
        #[arg(long, value_name = "DIR")]
        base_dir: PathBuf,

        #[arg(long, value_delimiter = ',')]
        models: Option<Vec<String>>,

        #[arg(long, value_name = "NUM")]
        num_samples: Option<usize>,

        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        #[arg(long)]
        resume: bool,
    },

    /// Consolidate numbered original prompt files into one CSV
    Originals {
        #[arg(short, long, value_name = "DIR", default_value = "ORIGINAL")]
        input: PathBuf,

        #[arg(
            short,
            long,
            value_name = "FILE",
            default_value = "model_outputs/ORIGINAL_prompts.csv"
        )]
        output: PathBuf,
    },

    /// First principal component loadings of the faithfulness and richness metrics
    Pca {
        #[arg(long, value_name = "FILE")]
        faithfulness: PathBuf,

        #[arg(long, value_name = "FILE")]
        richness: PathBuf,

        #[arg(short, long, value_name = "DIR")]
        export: Option<PathBuf>,

        #[arg(short, long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    t2i_eval::utils::logging::init_logger(cli.color, cli.verbose);

    info!("T2I evaluation toolkit");
    info!("Loading configuration from: {}", cli.config.display());

    let config = if cli.config.exists() {
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        warn!(
            "Config file {} not found, using default configuration",
            cli.config.display()
        );
        Config::default_config()
    };

    match cli.command {
        Commands::Civitai {
            dir,
            output,
            request_delay_ms,
            resume,
        } => {
            cmd_civitai(&config, cli.color, dir, output, request_delay_ms, resume).await?;
        }
        Commands::Lexica {
            data_dir,
            image_dir,
            output,
            no_resume,
            skip_captions,
        } => {
            cmd_lexica(
                &config,
                cli.color,
                data_dir,
                image_dir,
                output,
                !no_resume,
                skip_captions,
            )
            .await?;
        }
        Commands::Enhanced {
            base_dir,
            models,
            num_samples,
            output_dir,
            resume,
        } => {
            cmd_enhanced(
                &config,
                cli.color,
                &base_dir,
                models,
                num_samples,
                output_dir,
                resume,
            )
            .await?;
        }
        Commands::Originals { input, output } => {
            cmd_originals(&input, &output)?;
        }
        Commands::Pca {
            faithfulness,
            richness,
            export,
            pretty,
        } => {
            cmd_pca(&config, &faithfulness, &richness, export, pretty)?;
        }
    }

    Ok(())
}

fn caption_runner(
    config: &Config,
    colored: bool,
    image_dir: &Path,
    label: &str,
) -> Result<CaptionRunner<OpenAiCaptionClient>> {
    let client = OpenAiCaptionClient::new(&config.captioner)
        .context("Failed to create caption client")?;
    info!("Captioning with model {}", client.model());

    Ok(CaptionRunner::new(
        client,
        RetryPolicy::from_config(&config.captioner),
        image_dir,
        label,
    )
    .with_progress(true, colored))
}

fn base_options(config: &Config, output: PathBuf) -> RunOptions {
    let mut options = RunOptions::new(output);
    options.request_delay = config.captioner.request_delay();
    options.max_consecutive_failures = config.captioner.max_consecutive_failures;
    options
}

fn report_run(label: &str, summary: &RunSummary, output: &Path) {
    if summary.aborted {
        println!(
            "{}",
            format_error(&format!(
                "[{}] Stopped early after repeated caption failures",
                label
            ))
        );
    }

    println!(
        "{}",
        format_success(&format!(
            "[{}] {} captioned, {} failed, {} skipped, {} resumed -> {} ({} rows)",
            label,
            summary.captioned,
            summary.failed,
            summary.skipped,
            summary.resumed,
            output.display(),
            summary.written
        ))
    );
}

async fn cmd_civitai(
    config: &Config,
    colored: bool,
    dir: PathBuf,
    output: Option<PathBuf>,
    request_delay_ms: Option<u64>,
    resume: bool,
) -> Result<()> {
    let timer = OperationTimer::new("civitai captioning");

    let source = CivitaiSource::new(dir);
    let records = source
        .extract_prompts()
        .context("Failed to extract Civitai prompts")?;

    if records.is_empty() {
        println!("{}", format_warning("No usable Civitai prompts found"));
        return Ok(());
    }

    let output = output.unwrap_or_else(|| source.default_output());
    let mut options = base_options(config, output);
    options.resume = resume;
    if let Some(ms) = request_delay_ms {
        options.request_delay = Duration::from_millis(ms);
    }

    let runner = caption_runner(config, colored, source.dir(), "civitai")?;
    let summary = runner.run(records, &options).await?;

    report_run("civitai", &summary, &options.output);
    timer.finish_with_count(summary.captioned);
    Ok(())
}

async fn cmd_lexica(
    config: &Config,
    colored: bool,
    data_dir: PathBuf,
    image_dir: PathBuf,
    output: PathBuf,
    resume: bool,
    skip_captions: bool,
) -> Result<()> {
    let timer = OperationTimer::new("lexica extraction");

    let source = LexicaSource::new(data_dir, image_dir, config.dataset.clone())
        .context("Failed to create Lexica source")?;
    let extraction = source
        .extract_and_download()
        .await
        .context("Lexica extraction failed")?;

    println!(
        "{}",
        format_info(&format!(
            "{} images ready ({} downloaded, {} reused, {} download failures)",
            extraction.records.len(),
            extraction.downloaded,
            extraction.reused,
            extraction.failures
        ))
    );

    if extraction.aborted {
        println!(
            "{}",
            format_warning("Extraction stopped early after repeated download failures")
        );
    }

    timer.checkpoint("extraction finished");

    if skip_captions {
        let prompts_path = output.with_extension("prompts.csv");
        CsvStore::write_prompts(&prompts_path, &extraction.records)?;
        println!(
            "{}",
            format_success(&format!("Prompts written to {}", prompts_path.display()))
        );
        timer.finish_with_count(extraction.records.len());
        return Ok(());
    }

    let mut options = base_options(config, output);
    options.resume = resume;

    let runner = caption_runner(config, colored, source.image_dir(), "lexica")?;
    let summary = runner.run(extraction.records, &options).await?;

    report_run("lexica", &summary, &options.output);
    timer.finish_with_count(summary.captioned);
    Ok(())
}

async fn cmd_enhanced(
    config: &Config,
    colored: bool,
    base_dir: &Path,
    models: Option<Vec<String>>,
    num_samples: Option<usize>,
    output_dir: Option<PathBuf>,
    resume: bool,
) -> Result<()> {
    let models = models.unwrap_or_else(|| config.evaluation.model_folders.clone());
    let num_samples = num_samples.unwrap_or(config.evaluation.num_samples);
    let output_dir = output_dir.unwrap_or_else(|| config.evaluation.output_dir.clone());

    let timer = OperationTimer::new("enhanced captioning");
    let mut total_captioned = 0;

    for (step, model) in models.iter().enumerate() {
        println!(
            "{}",
            format_step(step + 1, models.len(), &format!("Captioning {}", model))
        );

        let folder = EnhancedFolder::new(base_dir, model.as_str(), num_samples);
        let records = match folder.scan() {
            Ok(records) => records,
            Err(e) => {
                error!("[{}] Cannot read {}: {}", model, folder.folder().display(), e);
                continue;
            }
        };

        let mut options = base_options(config, output_dir.join(folder.output_file()));
        options.checkpoint = Some(output_dir.join(folder.checkpoint_file()));
        options.save_interval = config.evaluation.save_interval;
        options.sort_by_id = true;
        options.resume = resume;

        let runner = caption_runner(config, colored, folder.folder(), model)?;
        let summary = runner.run(records, &options).await?;

        report_run(model, &summary, &options.output);
        total_captioned += summary.captioned;
        timer.checkpoint(&format!("{} done", model));
    }

    timer.finish_with_count(total_captioned);
    Ok(())
}

fn cmd_originals(input: &Path, output: &Path) -> Result<()> {
    let prompts = OriginalPromptCollector::new(input)
        .collect()
        .context("Failed to collect original prompts")?;

    CsvStore::write_originals(output, &prompts)?;

    println!(
        "{}",
        format_success(&format!(
            "Saved {} prompts to {}",
            prompts.len(),
            output.display()
        ))
    );
    Ok(())
}

fn cmd_pca(
    config: &Config,
    faithfulness: &Path,
    richness: &Path,
    export: Option<PathBuf>,
    pretty: bool,
) -> Result<()> {
    let groups = [
        ("Faithfulness", faithfulness, &config.analysis.faithfulness_columns),
        ("Richness", richness, &config.analysis.richness_columns),
    ];

    let mut results = Vec::with_capacity(groups.len());

    for (name, path, columns) in groups {
        let table = MetricTable::from_csv(path, columns)
            .with_context(|| format!("Failed to load {}", path.display()))?;

        if table.dropped > 0 {
            warn!(
                "{}: dropped {} incomplete rows from {}",
                name,
                table.dropped,
                path.display()
            );
        }

        let loadings = component_loadings(name, &path.display().to_string(), &table)
            .with_context(|| format!("PCA failed for {}", name))?;

        println!("\n{}", loadings.format());
        results.push(loadings);
    }

    if let Some(dir) = export {
        let exporter = JsonExporter::new(dir)?;
        let report = LoadingsReport::new(results);
        let path = exporter.export_loadings("pca_loadings.json", &report, pretty)?;
        println!(
            "{}",
            format_success(&format!("Loadings exported to {}", path.display()))
        );
    }

    Ok(())
}
