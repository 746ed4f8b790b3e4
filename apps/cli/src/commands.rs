//! CLI command definitions, routing, and tracing setup.

use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use curator_core::{Curator, FetchOptions, GenerateOptions, PagedFeed, PipelineState};
use curator_shared::{
    AppConfig, DatasetId, QaPage, Stage, init_config, load_config, validate_config,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::output;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Curator: build deduplicated QA datasets from web pages.
#[derive(Parser)]
#[command(
    name = "curator",
    version,
    about = "Generate, deduplicate, browse, and export QA datasets via a curation service.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Curation service base URL (overrides the config file).
    #[arg(long, env = "CURATOR_API_BASE_URL", global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Generation knobs shared by `generate` and `run`.
#[derive(clap::Args, Debug, Clone)]
pub(crate) struct GenerateArgs {
    /// Source page URL.
    pub url: String,

    /// Dataset name.
    #[arg(short, long)]
    pub name: String,

    /// Target language of the generated pairs (e.g. en, fr).
    #[arg(long)]
    pub language: Option<String>,

    /// Model used for QA generation.
    #[arg(long)]
    pub model_qa: Option<String>,

    /// Model used for source text cleaning.
    #[arg(long)]
    pub model_cleaning: Option<String>,

    /// Duplicate threshold sent with the generation (0.0-1.0).
    #[arg(long)]
    pub threshold: Option<f64>,
}

impl GenerateArgs {
    /// CLI values over config defaults.
    fn options(&self, config: &AppConfig) -> GenerateOptions {
        let defaults = GenerateOptions::from(&config.generation);
        GenerateOptions {
            target_language: self.language.clone().or(defaults.target_language),
            model_qa: self.model_qa.clone().or(defaults.model_qa),
            model_cleaning: self.model_cleaning.clone().or(defaults.model_cleaning),
            similarity_threshold: self.threshold.or(defaults.similarity_threshold),
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Inspect and manage datasets.
    Datasets {
        #[command(subcommand)]
        action: DatasetsAction,
    },

    /// Generate a QA dataset from a web page.
    Generate(GenerateArgs),

    /// Find near-duplicate questions in a dataset.
    Analyze {
        /// Dataset ID.
        dataset_id: String,

        /// Similarity threshold (0.0-1.0).
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Remove near-duplicate questions from a dataset.
    Clean {
        /// Dataset ID.
        dataset_id: String,

        /// Similarity threshold (0.0-1.0).
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Generate, analyze, and clean in one go, then show the first page.
    Run(GenerateArgs),

    /// Browse the QA items of a dataset.
    Qa {
        /// Dataset ID.
        dataset_id: String,

        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: u64,

        /// Items per page (defaults to the configured page size).
        #[arg(long)]
        limit: Option<u32>,

        /// Load every page.
        #[arg(long, conflicts_with = "page")]
        all: bool,
    },

    /// Export a dataset to Langfuse.
    Export {
        /// Dataset name.
        dataset_name: String,

        /// Name of the dataset on the Langfuse side.
        #[arg(long)]
        langfuse_name: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Dataset subcommands.
#[derive(Subcommand)]
pub(crate) enum DatasetsAction {
    /// List all datasets.
    List,
    /// Show one dataset.
    Show {
        /// Dataset ID.
        id: String,
    },
    /// Delete a dataset and its records.
    Delete {
        /// Dataset ID.
        id: String,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "curator=warn",
        1 => "curator=info",
        2 => "curator=debug",
        _ => "curator=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(cli.base_url.as_deref())?;

    match cli.command {
        Command::Datasets { action } => match action {
            DatasetsAction::List => cmd_datasets_list(&config).await,
            DatasetsAction::Show { id } => cmd_datasets_show(&config, &id).await,
            DatasetsAction::Delete { id } => cmd_datasets_delete(&config, &id).await,
        },
        Command::Generate(args) => cmd_generate(&config, &args).await,
        Command::Analyze {
            dataset_id,
            threshold,
        } => cmd_analyze(config, &dataset_id, threshold).await,
        Command::Clean {
            dataset_id,
            threshold,
        } => cmd_clean(config, &dataset_id, threshold).await,
        Command::Run(args) => cmd_run(&config, &args).await,
        Command::Qa {
            dataset_id,
            page,
            limit,
            all,
        } => cmd_qa(config, &dataset_id, page, limit, all).await,
        Command::Export {
            dataset_name,
            langfuse_name,
        } => cmd_export(&config, &dataset_name, langfuse_name.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

/// Config file values with the `--base-url` override applied.
fn resolve_config(base_url: Option<&str>) -> Result<AppConfig> {
    let mut config = load_config()?;
    if let Some(url) = base_url {
        config.api.base_url = url.to_string();
        validate_config(&config)?;
    }
    Ok(config)
}

fn with_threshold(mut config: AppConfig, threshold: Option<f64>) -> Result<AppConfig> {
    if threshold.is_some() {
        config.similarity.threshold = threshold;
        validate_config(&config)?;
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_datasets_list(config: &AppConfig) -> Result<()> {
    let curator = Curator::from_config(config)?;
    let datasets = curator.registry.list().await;

    if let Some(error) = curator.registry.snapshot().error {
        return Err(eyre!("failed to list datasets: {error}"));
    }
    output::print_datasets(&datasets);
    Ok(())
}

async fn cmd_datasets_show(config: &AppConfig, id: &str) -> Result<()> {
    let curator = Curator::from_config(config)?;
    let dataset = curator.registry.find(&DatasetId::from(id)).await?;
    output::print_dataset(&dataset);
    Ok(())
}

async fn cmd_datasets_delete(config: &AppConfig, id: &str) -> Result<()> {
    let curator = Curator::from_config(config)?;
    let response = curator.registry.remove(&DatasetId::from(id)).await?;

    println!();
    println!("  {}", response.message);
    println!("  Dataset: {}", response.dataset_id);
    println!("  Records: {}", response.records_deleted);
    println!();
    Ok(())
}

async fn cmd_generate(config: &AppConfig, args: &GenerateArgs) -> Result<()> {
    let curator = Curator::from_config(config)?;
    info!(url = %args.url, name = %args.name, "generating dataset");

    let spinner = spinner(format!("Generating QA pairs from {}", args.url))?;
    let result = curator
        .pipeline
        .generate(&args.url, &args.name, args.options(config))
        .await;
    spinner.finish_and_clear();

    output::print_generation(&result?);
    Ok(())
}

async fn cmd_analyze(config: AppConfig, dataset_id: &str, threshold: Option<f64>) -> Result<()> {
    let curator = Curator::from_config(&with_threshold(config, threshold)?)?;
    let id = DatasetId::from(dataset_id);

    let spinner = spinner(format!("Analyzing similarities in {id}"))?;
    let result = curator.pipeline.analyze(Some(&id)).await?;
    spinner.finish_and_clear();

    match result {
        Some(analysis) => {
            output::print_analysis(&analysis);
            Ok(())
        }
        None => Err(stage_failure(&curator.pipeline.snapshot(), Stage::Analysis)),
    }
}

async fn cmd_clean(config: AppConfig, dataset_id: &str, threshold: Option<f64>) -> Result<()> {
    let curator = Curator::from_config(&with_threshold(config, threshold)?)?;
    let id = DatasetId::from(dataset_id);

    let spinner = spinner(format!("Removing near-duplicates from {id}"))?;
    let result = curator.pipeline.clean(Some(&id)).await?;
    spinner.finish_and_clear();

    match result {
        Some(cleaning) => {
            output::print_cleaning(&cleaning);
            Ok(())
        }
        None => Err(stage_failure(&curator.pipeline.snapshot(), Stage::Cleaning)),
    }
}

async fn cmd_run(config: &AppConfig, args: &GenerateArgs) -> Result<()> {
    let curator = Curator::from_config(config)?;
    info!(url = %args.url, name = %args.name, "running full pipeline");

    let spinner = spinner("Starting pipeline")?;
    let mut updates = curator.pipeline.subscribe();

    let run = curator
        .pipeline
        .run(&args.url, &args.name, args.options(config));
    tokio::pin!(run);

    let outcome = loop {
        tokio::select! {
            outcome = &mut run => break outcome,
            changed = updates.changed() => {
                if changed.is_err() {
                    break (&mut run).await;
                }
                let state = updates.borrow_and_update().clone();
                spinner.set_message(progress_message(&state));
            }
        }
    };
    spinner.finish_and_clear();

    let outputs = outcome?;
    for stage_output in &outputs {
        output::print_stage_output(stage_output);
    }

    let Some(id) = outputs.first().map(|o| o.dataset_id().clone()) else {
        return Ok(());
    };
    let page = curator.feed.go_to_page(&id, 1).await?;
    output::print_qa_page(&page, &curator.feed.snapshot());
    Ok(())
}

async fn cmd_qa(
    mut config: AppConfig,
    dataset_id: &str,
    page: u64,
    limit: Option<u32>,
    all: bool,
) -> Result<()> {
    if let Some(limit) = limit {
        config.pagination.page_size = limit;
        validate_config(&config)?;
    }
    let curator = Curator::from_config(&config)?;
    let id = DatasetId::from(dataset_id);

    if !all {
        let qa_page = curator.feed.go_to_page(&id, page).await?;
        output::print_qa_page(&qa_page, &curator.feed.snapshot());
        return Ok(());
    }

    let (first, pages) =
        load_all_pages(&curator.feed, &id, u64::from(config.pagination.page_size)).await?;

    let state = curator.feed.snapshot();
    output::print_qa_items(&state.items);
    println!();
    println!(
        "  {} of {} items from '{}' ({pages} pages)",
        state.items.len(),
        state.total_count,
        first.dataset_name
    );
    println!();
    Ok(())
}

/// Walk the feed from the first page until nothing more comes back.
async fn load_all_pages(feed: &PagedFeed, id: &DatasetId, limit: u64) -> Result<(QaPage, u32)> {
    let first = feed
        .fetch_page(
            id,
            FetchOptions {
                limit,
                ..FetchOptions::default()
            },
        )
        .await?;
    let mut pages = 1;
    while let Some(next) = feed.load_more(id).await? {
        pages += 1;
        info!(pages, offset = next.offset, "loaded page");
        if next.returned_count == 0 {
            break;
        }
    }
    Ok((first, pages))
}

async fn cmd_export(
    config: &AppConfig,
    dataset_name: &str,
    langfuse_name: Option<&str>,
) -> Result<()> {
    let curator = Curator::from_config(config)?;

    let spinner = spinner(format!("Exporting '{dataset_name}'"))?;
    let result = curator.export.export(dataset_name, langfuse_name).await;
    spinner.finish_and_clear();

    let body = result?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress helpers
// ---------------------------------------------------------------------------

fn spinner(message: impl Into<String>) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}

/// Spinner line for the stage currently running.
fn progress_message(state: &PipelineState) -> String {
    let running = Stage::ALL
        .into_iter()
        .find(|&stage| state.status(stage).is_pending());

    match running {
        Some(Stage::Generation) => "Generating QA pairs".into(),
        Some(Stage::Analysis) => "Analyzing similarities".into(),
        Some(Stage::Cleaning) => "Removing near-duplicates".into(),
        None => Stage::ALL
            .into_iter()
            .map(|stage| format!("{stage}: {}", state.status(stage)))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn stage_failure(state: &PipelineState, stage: Stage) -> color_eyre::eyre::Report {
    let message = state.error.as_deref().unwrap_or("unknown error");
    eyre!("{stage} failed: {message}")
}
