//! Bridge to the external dataset validator.
//!
//! The validator is any program that takes a JSONL training file as its last
//! argument and prints one JSON preview report on stdout. Its whole stdout is
//! collected until exit and parsed once; a non-zero exit is fatal.

use crate::models::{OaiftError, PreviewReport, Result, ValidatorConfig};
use crate::workspace;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Runs the configured validator process.
#[derive(Debug, Clone)]
pub struct ValidatorBridge {
    command: String,
    args: Vec<String>,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl ValidatorBridge {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
            working_dir: None,
        }
    }

    /// Run from `dir`, so relative command arguments resolve against it.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn from_config(config: &ValidatorConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Run the validator on `dataset` and return its stdout.
    pub async fn run(&self, dataset: &Path) -> Result<String> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args).stdin(Stdio::null()).kill_on_drop(true);
        match &self.working_dir {
            Some(dir) => {
                let dataset = std::path::absolute(dataset)
                    .map_err(|e| OaiftError::io("resolving dataset path", e))?;
                cmd.current_dir(dir).arg(dataset);
            }
            None => {
                cmd.arg(dataset);
            }
        }

        debug!(
            command = %self.command,
            args = ?self.args,
            dataset = %dataset.display(),
            "Spawning validator"
        );

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(OaiftError::ValidatorSpawn {
                    program: self.command.clone(),
                    source: e,
                });
            }
            Err(_) => return Err(OaiftError::ValidatorTimeout(self.timeout)),
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            let status = match output.status.code() {
                Some(code) => format!("exit code {code}"),
                None => "a signal".to_string(),
            };
            return Err(OaiftError::ValidatorFailed { status, stderr });
        }
        if !stderr.is_empty() {
            debug!(stderr = %stderr, "Validator wrote to stderr");
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Validate `dataset` and persist the report at `report_path`.
    ///
    /// The report is written before it is interpreted, so it is available for
    /// inspection even when it fails to parse or fails the gate.
    pub async fn preview(&self, dataset: &Path, report_path: &Path) -> Result<PreviewReport> {
        let stdout = self.run(dataset).await?;

        let value: serde_json::Value = match serde_json::from_str(stdout.trim()) {
            Ok(v) => v,
            Err(e) => {
                tokio::fs::write(report_path, &stdout)
                    .await
                    .map_err(|e| OaiftError::io("writing raw validator output", e))?;
                return Err(OaiftError::ParseError(format!(
                    "validator output is not JSON ({}); raw output saved to {}",
                    e,
                    report_path.display()
                )));
            }
        };

        workspace::write_json(report_path, &value)?;
        let report: PreviewReport = serde_json::from_value(value).map_err(|e| {
            OaiftError::ParseError(format!(
                "validator report has an unexpected shape: {} (see {})",
                e,
                report_path.display()
            ))
        })?;

        info!(
            dataset_size = report.dataset_size,
            n_too_long = report.n_too_long,
            billing_tokens = ?report.n_billing_tokens_in_dataset,
            path = %report_path.display(),
            "Preview report saved"
        );
        Ok(report)
    }
}

/// Refuse to continue when the report carries any error field.
pub fn gate(report: &PreviewReport, report_path: &Path) -> Result<()> {
    let reasons = report.gate_failures();
    if reasons.is_empty() {
        return Ok(());
    }

    warn!(reasons = ?reasons, "Dataset failed validation");
    Err(OaiftError::ValidationGate {
        report: report_path.to_path_buf(),
        reasons,
    })
}
