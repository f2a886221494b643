//! oaift - Synthetic fine-tuning datasets and fine-tuning jobs for OpenAI-compatible APIs.
//!
//! ## Architecture
//!
//! A project is a directory with an `oaift.toml`. Runs write into named
//! namespaces below it:
//! - **Datasets**: raw completions, a JSONL training set and a usage report
//! - **Fine-tunes**: a consolidated training set, the validator's preview
//!   report and, once submitted, the job report
//!
//! ## Pipelines
//!
//! - **Generate**: Topics → Chat requests → Batches → Function calls → Training records
//! - **Fine-tune**: Datasets → Consolidated JSONL → External validator → Gate → Upload → Job
//!
//! Remote calls share one explicitly constructed [`OpenAiClient`] with bounded
//! retries and timeouts. Model output is only trusted through the closed set
//! of structured-output intents in [`functions`].

pub mod client;
pub mod functions;
pub mod models;
pub mod pipeline;
pub mod pool;
pub mod validator;
pub mod workspace;

// Re-exports for convenience
pub use client::OpenAiClient;
pub use functions::Intent;
pub use models::{Config, OaiftError, PreviewReport, Result, TrainingRecord};
pub use pipeline::{
    FineTuneOptions, FineTunePipeline, GenerateOptions, GeneratePipeline, interpolate,
};
pub use pool::BatchExecutor;
pub use validator::ValidatorBridge;
pub use workspace::Project;
