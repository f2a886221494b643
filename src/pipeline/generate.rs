//! Dataset generation pipeline.
//!
//! Pipeline flow:
//! Config → Requests → Batches → Raw completions → Training records → JSONL + usage report

use crate::client::{ChatCompletion, ChatRequest, OpenAiClient};
use crate::models::{Config, GenerationReport, OaiftError, Result, TokenUsage, UsageReport};
use crate::pipeline::{build_requests, extract_records};
use crate::pool::BatchExecutor;
use crate::workspace::{self, DatasetNamespace, Project};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Flags of one `generate` invocation.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Dataset name; `{project}-{millis}` when absent
    pub name: Option<String>,
    /// Overwrite an existing dataset of the same name
    pub force: bool,
}

/// Result of a completed generation run.
#[derive(Debug, Clone)]
pub struct GenerateSummary {
    pub dataset: DatasetNamespace,
    pub report: GenerationReport,
    pub dropped: usize,
}

/// Sum usage over every completion that reported it; the model comes from the
/// first completion.
pub fn usage_report(completions: &[ChatCompletion]) -> UsageReport {
    let mut usage = TokenUsage::default();
    for reported in completions.iter().filter_map(|c| c.usage.as_ref()) {
        usage.add(reported);
    }
    UsageReport {
        usage,
        model: completions.first().map(|c| c.model.clone()),
    }
}

/// Generation pipeline for one project.
pub struct GeneratePipeline {
    project: Project,
    config: Config,
    client: Arc<OpenAiClient>,
}

impl GeneratePipeline {
    pub fn new(project: Project, config: Config, client: Arc<OpenAiClient>) -> Self {
        Self {
            project,
            config,
            client,
        }
    }

    /// Log the requests a run would send; touches neither network nor disk.
    pub fn preview(config: &Config) -> Result<Vec<ChatRequest>> {
        let requests = build_requests(&config.generation);
        for (index, request) in requests.iter().enumerate() {
            let json = serde_json::to_string_pretty(request)
                .map_err(|e| OaiftError::Internal(format!("Failed to serialize request: {}", e)))?;
            info!(index = index, "Request preview\n{}", json);
        }
        info!(
            requests = requests.len(),
            batches = BatchExecutor::new(config.generation.batch_size)
                .plan(requests.len())
                .len(),
            "Preview only; pass --apply to generate"
        );
        Ok(requests)
    }

    /// Run generation and write the dataset artifacts.
    pub async fn run(&self, options: &GenerateOptions) -> Result<GenerateSummary> {
        let start = Instant::now();

        let dataset = match &options.name {
            Some(name) => {
                let dataset = self.project.dataset(name)?;
                dataset.claim(options.force)?;
                dataset
            }
            None => {
                let dataset = self.project.dataset(&self.project.default_dataset_name())?;
                dataset.claim(true)?;
                dataset
            }
        };

        let generation = &self.config.generation;
        let requests = build_requests(generation);
        let total = requests.len();
        let executor = BatchExecutor::new(generation.batch_size);
        let batches = executor.plan(total).len();

        info!(
            project = %self.project.name(),
            dataset = %dataset.name(),
            model = %generation.model,
            requests = total,
            batches = batches,
            "Starting generation"
        );

        let pb = ProgressBar::new(batches as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} batches {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );

        let raw_path = dataset.raw_completions_path();
        let client = Arc::clone(&self.client);
        let completions = executor
            .run(
                requests,
                |request| {
                    let client = Arc::clone(&client);
                    async move { client.chat_completion(&request).await }
                },
                |number, batch| {
                    workspace::append_jsonl(&raw_path, batch)?;
                    pb.inc(1);
                    debug!(batch = number, path = %raw_path.display(), "Raw completions appended");
                    Ok(())
                },
            )
            .await;

        let completions = match completions {
            Ok(c) => c,
            Err(e) => {
                pb.abandon_with_message("failed");
                return Err(e);
            }
        };

        let extraction = extract_records(&completions, generation);
        workspace::write_jsonl(&dataset.training_set_path(), &extraction.records)?;

        let report = GenerationReport {
            tokens: usage_report(&completions),
            config: generation.clone(),
            requests: total,
            records: extraction.records.len(),
        };
        workspace::write_json(&dataset.report_path(), &report)?;

        pb.finish_with_message(format!(
            "{} records, {} dropped",
            extraction.records.len(),
            extraction.dropped
        ));

        info!(
            dataset = %dataset.name(),
            records = report.records,
            dropped = extraction.dropped,
            total_tokens = report.tokens.usage.total_tokens,
            runtime = format!("{:.1}s", start.elapsed().as_secs_f64()),
            "Generation complete"
        );

        Ok(GenerateSummary {
            dataset,
            report,
            dropped: extraction.dropped,
        })
    }
}
