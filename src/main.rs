//! oaift CLI - Synthetic fine-tuning datasets and fine-tuning jobs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use oaift::models::ApiConfig;
use oaift::{
    Config, FineTuneOptions, FineTunePipeline, GenerateOptions, GeneratePipeline, OpenAiClient,
    Project,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "oaift")]
#[command(version)]
#[command(about = "Generate fine-tuning datasets and manage fine-tuning jobs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding all projects
    #[arg(long, global = true, default_value = "projects")]
    projects_dir: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project with a template configuration
    Init {
        /// Project name
        #[arg(short, long)]
        name: String,
    },

    /// Generate a training dataset from the project's topics
    Generate {
        /// Project name
        #[arg(short, long)]
        project: String,

        /// Dataset name (defaults to `{project}-{unix millis}`)
        #[arg(short, long)]
        name: Option<String>,

        /// Overwrite an existing dataset of the same name
        #[arg(long)]
        force: bool,

        /// Send requests; without this only the requests are previewed
        #[arg(long)]
        apply: bool,
    },

    /// Create and manage fine-tuned models
    #[command(subcommand)]
    FineTune(FineTuneCommands),

    /// Manage uploaded files
    #[command(subcommand)]
    Files(FilesCommands),

    /// Inspect fine-tuning jobs
    #[command(subcommand)]
    Jobs(JobsCommands),
}

#[derive(Subcommand)]
enum FineTuneCommands {
    /// Consolidate datasets, validate them and optionally start a job
    Create {
        /// Project name
        #[arg(short, long)]
        project: String,

        /// Fine-tune name
        #[arg(short, long)]
        name: String,

        /// Comma-separated dataset names, consolidated in order
        #[arg(short, long, value_delimiter = ',', required = true)]
        datasets: Vec<String>,

        /// Replace a fine-tune that was already submitted
        #[arg(long)]
        force: bool,

        /// Upload and create the job; without this only the preview is written
        #[arg(long)]
        apply: bool,
    },

    /// List fine-tuned models owned by this account
    List,

    /// Delete a fine-tuned model
    Delete {
        /// Model id
        #[arg(long)]
        id: String,

        #[arg(long)]
        apply: bool,
    },
}

#[derive(Subcommand)]
enum FilesCommands {
    /// List uploaded files
    List,

    /// Print the content of a file
    Read {
        #[arg(long)]
        id: String,
    },

    /// Delete the given files
    Delete {
        /// Comma-separated file ids
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<String>,

        #[arg(long)]
        apply: bool,
    },
}

#[derive(Subcommand)]
enum JobsCommands {
    /// List jobs, or show one job in detail
    List {
        #[arg(long)]
        id: Option<String>,
    },

    /// Cancel a running job
    Cancel {
        #[arg(long)]
        id: String,
    },

    /// Show the events of a job
    Events {
        #[arg(long)]
        id: String,
    },
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn client_for(api: &ApiConfig) -> Result<OpenAiClient> {
    let api_key = api.resolve_api_key().context("Failed to resolve API key")?;
    Ok(OpenAiClient::from_config(api, api_key)?)
}

/// Client for commands that are not tied to a project.
fn default_client() -> Result<OpenAiClient> {
    client_for(&ApiConfig::default())
}

fn load_project(cli: &Cli, name: &str) -> Result<(Project, Config)> {
    let project = Project::new(&cli.projects_dir, name)?;
    let config = project
        .load_config()
        .with_context(|| format!("Failed to load config from {:?}", project.config_path()))?;
    Ok((project, config))
}

fn timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match &cli.command {
        Commands::Init { name } => {
            let project = Project::new(&cli.projects_dir, name)?;
            let path = project
                .init()
                .with_context(|| format!("Failed to initialize project '{name}'"))?;
            println!("Created {}", path.display());
        }

        Commands::Generate {
            project,
            name,
            force,
            apply,
        } => {
            let (project, config) = load_project(&cli, project)?;

            if !apply {
                GeneratePipeline::preview(&config)?;
                return Ok(());
            }

            let client = Arc::new(client_for(&config.api)?);
            let pipeline = GeneratePipeline::new(project, config, Arc::clone(&client));
            let summary = pipeline
                .run(&GenerateOptions {
                    name: name.clone(),
                    force: *force,
                })
                .await?;

            let (requests_sent, _) = client.usage();
            let tokens = &summary.report.tokens;
            println!("\n=== Generation Complete ===");
            println!("Dataset:     {}", summary.dataset.name());
            println!("Requests:    {}", summary.report.requests);
            println!("Records:     {}", summary.report.records);
            println!("Dropped:     {}", summary.dropped);
            println!("HTTP calls:  {requests_sent}");
            println!(
                "Tokens:      {} prompt + {} completion = {}",
                tokens.usage.prompt_tokens, tokens.usage.completion_tokens, tokens.usage.total_tokens
            );
            println!("Output:      {:?}", summary.dataset.dir());
        }

        Commands::FineTune(FineTuneCommands::Create {
            project,
            name,
            datasets,
            force,
            apply,
        }) => {
            let (project, config) = load_project(&cli, project)?;
            let options = FineTuneOptions {
                name: name.clone(),
                datasets: datasets.clone(),
                force: *force,
            };

            if !apply {
                let pipeline = FineTunePipeline::new(project, config);
                let prepared = pipeline.prepare(&options).await?;
                let preview = &prepared.preview;
                println!("\n=== Fine-tune Preview ===");
                println!("Examples:    {}", preview.dataset_size);
                if let Some(tokens) = preview.n_billing_tokens_in_dataset {
                    println!("Billing tok: {tokens}");
                }
                if let Some(epochs) = preview.n_epochs {
                    println!("Epochs:      {epochs}");
                }
                println!("Report:      {:?}", prepared.namespace.preview_path());
                info!("Validation passed; pass --apply to upload and create the job");
                return Ok(());
            }

            let client = client_for(&config.api)?;
            let pipeline = FineTunePipeline::new(project, config);
            let record = pipeline.run(&client, &options).await?;

            println!("\n=== Fine-tuning Job Created ===");
            println!("Job:         {}", record.job.id);
            println!("Status:      {}", record.job.status);
            println!("Base model:  {}", record.job.model);
            println!("File:        {}", record.training_file.id);
            println!("Datasets:    {}", record.datasets.join(", "));
        }

        Commands::FineTune(FineTuneCommands::List) => {
            let models = default_client()?.list_models().await?;
            for model in models.iter().filter(|m| m.is_user_owned()) {
                println!("{}  {}", timestamp(model.created), model.id);
            }
        }

        Commands::FineTune(FineTuneCommands::Delete { id, apply }) => {
            if !apply {
                warn!(model = %id, "Would delete model; pass --apply to delete");
                return Ok(());
            }
            let status = default_client()?.delete_model(id).await?;
            println!("{}  deleted={}", status.id, status.deleted);
        }

        Commands::Files(FilesCommands::List) => {
            let files = default_client()?.list_files().await?;
            for file in &files {
                println!(
                    "{}  {}  {:>10} bytes  {}  {}",
                    file.id,
                    timestamp(file.created_at),
                    file.bytes,
                    file.purpose,
                    file.filename
                );
            }
        }

        Commands::Files(FilesCommands::Read { id }) => {
            let content = default_client()?.file_content(id).await?;
            println!("{content}");
        }

        Commands::Files(FilesCommands::Delete { ids, apply }) => {
            if !apply {
                warn!(files = ?ids, "Would delete files; pass --apply to delete");
                return Ok(());
            }
            let client = default_client()?;
            for id in ids {
                let status = client
                    .delete_file(id)
                    .await
                    .with_context(|| format!("Failed to delete file {id}"))?;
                println!("{}  deleted={}", status.id, status.deleted);
            }
        }

        Commands::Jobs(JobsCommands::List { id: Some(id) }) => {
            let job = default_client()?.retrieve_fine_tune_job(id).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
        }

        Commands::Jobs(JobsCommands::List { id: None }) => {
            let jobs = default_client()?.list_fine_tune_jobs().await?;
            for job in &jobs {
                println!(
                    "{}  {:<18}  {}  {}",
                    job.id,
                    job.status,
                    job.model,
                    job.fine_tuned_model.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Jobs(JobsCommands::Cancel { id }) => {
            let job = default_client()?.cancel_fine_tune_job(id).await?;
            println!("{}  {}", job.id, job.status);
        }

        Commands::Jobs(JobsCommands::Events { id }) => {
            let events = default_client()?.list_fine_tune_events(id).await?;
            for event in &events {
                println!(
                    "{}  {:<5}  {}",
                    timestamp(event.created_at),
                    event.level,
                    event.message
                );
            }
        }
    }

    Ok(())
}
