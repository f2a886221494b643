//! Dataset, report and record types.
//!
//! These types represent the data flowing from generation through
//! consolidation to job submission.

use crate::client::{FileObject, FineTuneJob};
use crate::models::{Config, GenerationConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message, used both in requests and in training records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One training example: the system prompt followed by conversation turns.
///
/// Serialized as one line of the training set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub messages: Vec<Message>,
}

/// Summed token counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Token usage across a generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub usage: TokenUsage,
    /// Model reported by the first completion
    pub model: Option<String>,
}

/// Contents of `generated_report.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub tokens: UsageReport,
    pub config: GenerationConfig,
    /// Requests sent
    pub requests: usize,
    /// Training records written
    pub records: usize,
}

/// Summary statistics emitted by the validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p5: f64,
    pub p95: f64,
}

/// Structured report produced by the external validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewReport {
    pub dataset_size: u64,
    pub format_errors: BTreeMap<String, u64>,
    pub n_missing_system: u64,
    pub n_missing_user: u64,
    pub n_messages: Vec<u64>,
    pub convo_lens: Vec<u64>,
    pub assistant_message_lens: Vec<u64>,
    pub num_messages_per_example: Option<Distribution>,
    pub num_total_tokens_per_example: Option<Distribution>,
    pub num_assistant_tokens_per_example: Option<Distribution>,
    pub n_too_long: u64,
    pub n_epochs: Option<u64>,
    pub n_train_examples: Option<u64>,
    pub n_billing_tokens_in_dataset: Option<u64>,
}

impl PreviewReport {
    /// Reasons this dataset must not be submitted. Empty means it passes.
    pub fn gate_failures(&self) -> Vec<String> {
        let mut reasons: Vec<String> = self
            .format_errors
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(kind, count)| format!("format_errors.{kind}={count}"))
            .collect();

        if self.n_missing_system > 0 {
            reasons.push(format!("n_missing_system={}", self.n_missing_system));
        }
        if self.n_missing_user > 0 {
            reasons.push(format!("n_missing_user={}", self.n_missing_user));
        }
        if self.n_too_long > 0 {
            reasons.push(format!("n_too_long={}", self.n_too_long));
        }
        reasons
    }
}

/// Contents of `ft_report.json`, written once the remote job exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FineTuneJobRecord {
    pub config: Config,
    pub training_file: FileObject,
    pub job: FineTuneJob,
    pub datasets: Vec<String>,
}
