//! Fine-tune job creation pipeline.
//!
//! Pipeline flow:
//! Datasets → Consolidated JSONL → Validator → Gate → Upload → Job → Report
//!
//! Nothing is uploaded unless the validator's report passes the gate.

use crate::client::{
    FINE_TUNE_PURPOSE, FineTuneJobRequest, Hyperparameters, OpenAiClient,
};
use crate::models::{Config, FineTuneJobRecord, PreviewReport, Result};
use crate::pipeline::consolidate;
use crate::validator::{self, ValidatorBridge};
use crate::workspace::{self, FineTuneNamespace, Project};
use std::path::PathBuf;
use tracing::info;

/// Flags of one `fine-tune create` invocation.
#[derive(Debug, Clone)]
pub struct FineTuneOptions {
    pub name: String,
    pub datasets: Vec<String>,
    /// Replace a namespace that already has a submitted job
    pub force: bool,
}

/// A consolidated dataset whose preview report passed the gate.
#[derive(Debug, Clone)]
pub struct PreparedFineTune {
    pub namespace: FineTuneNamespace,
    pub training_set: PathBuf,
    pub preview: PreviewReport,
    pub datasets: Vec<String>,
}

pub struct FineTunePipeline {
    project: Project,
    config: Config,
    validator: ValidatorBridge,
}

impl FineTunePipeline {
    pub fn new(project: Project, config: Config) -> Self {
        let validator = ValidatorBridge::from_config(&config.validator).in_dir(project.root());
        Self {
            project,
            config,
            validator,
        }
    }

    /// Replace the validator from the config.
    pub fn with_validator(mut self, validator: ValidatorBridge) -> Self {
        self.validator = validator;
        self
    }

    /// Consolidate, validate and gate. Never talks to the remote API.
    pub async fn prepare(&self, options: &FineTuneOptions) -> Result<PreparedFineTune> {
        let namespace = self.project.fine_tune(&options.name)?;
        namespace.prepare(options.force)?;

        info!(
            project = %self.project.name(),
            fine_tune = %namespace.name(),
            datasets = ?options.datasets,
            "Preparing fine-tune"
        );

        let training_set = consolidate(&self.project, &options.datasets, &namespace)?;
        let preview_path = namespace.preview_path();
        let preview = self.validator.preview(&training_set, &preview_path).await?;
        validator::gate(&preview, &preview_path)?;

        Ok(PreparedFineTune {
            namespace,
            training_set,
            preview,
            datasets: options.datasets.clone(),
        })
    }

    /// Upload the prepared file, create the job and write `ft_report.json`.
    pub async fn submit(
        &self,
        client: &OpenAiClient,
        prepared: PreparedFineTune,
    ) -> Result<FineTuneJobRecord> {
        let namespace = prepared.namespace;
        let settings = &self.config.fine_tune;

        let training_file = client
            .upload_file(&prepared.training_set, FINE_TUNE_PURPOSE)
            .await?;
        info!(file_id = %training_file.id, bytes = training_file.bytes, "Training file uploaded");

        let request = FineTuneJobRequest {
            model: settings.base_model.clone(),
            training_file: training_file.id.clone(),
            hyperparameters: Hyperparameters {
                n_epochs: settings.epochs,
            },
            suffix: Some(
                settings
                    .suffix
                    .clone()
                    .unwrap_or_else(|| namespace.name().to_string()),
            ),
        };
        let job = client.create_fine_tune_job(&request).await?;

        let record = FineTuneJobRecord {
            config: self.config.clone(),
            training_file,
            job,
            datasets: prepared.datasets,
        };
        workspace::write_json(&namespace.report_path(), &record)?;

        info!(
            job_id = %record.job.id,
            status = %record.job.status,
            report = %namespace.report_path().display(),
            "Fine-tuning job created"
        );
        Ok(record)
    }

    /// Prepare and submit in one go.
    pub async fn run(
        &self,
        client: &OpenAiClient,
        options: &FineTuneOptions,
    ) -> Result<FineTuneJobRecord> {
        let prepared = self.prepare(options).await?;
        self.submit(client, prepared).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::{Epochs, OaiftError};
    use mockito::Matcher;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    const CLEAN_REPORT: &str = r#"{"dataset_size": 2, "format_errors": {}, "n_missing_system": 0, "n_missing_user": 0, "n_too_long": 0}"#;
    const MISSING_SYSTEM_REPORT: &str = r#"{"dataset_size": 2, "format_errors": {}, "n_missing_system": 1, "n_missing_user": 0, "n_too_long": 0}"#;

    fn printing(report: &str) -> ValidatorBridge {
        ValidatorBridge::new(
            "sh",
            vec![
                "-c".to_string(),
                format!("printf '%s' '{report}'"),
                "sh".to_string(),
            ],
            Duration::from_secs(10),
        )
    }

    fn setup(tmp: &TempDir, epochs: &str) -> (Project, Config) {
        let project = Project::new(tmp.path(), "acme").unwrap();
        for (name, line) in [("one", "L1\n"), ("two", "L2\n")] {
            let dataset = project.dataset(name).unwrap();
            dataset.claim(false).unwrap();
            fs::write(dataset.training_set_path(), line).unwrap();
        }
        let config: Config = toml::from_str(&format!(
            r#"
[generation]
system = "S"
template = "T"
topics = ["a"]

[fine_tune]
epochs = {epochs}
"#
        ))
        .unwrap();
        (project, config)
    }

    fn options(force: bool) -> FineTuneOptions {
        FineTuneOptions {
            name: "ft".to_string(),
            datasets: vec!["one".to_string(), "two".to_string()],
            force,
        }
    }

    fn client(server: &mockito::ServerGuard) -> OpenAiClient {
        OpenAiClient::new("test-key".to_string(), server.url(), 5, 1).unwrap()
    }

    #[tokio::test]
    async fn test_gate_failure_never_uploads() {
        let tmp = TempDir::new().unwrap();
        let (project, config) = setup(&tmp, "\"auto\"");
        let mut server = mockito::Server::new_async().await;
        let upload = server
            .mock("POST", "/files")
            .expect(0)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/fine_tuning/jobs")
            .expect(0)
            .create_async()
            .await;

        let pipeline = FineTunePipeline::new(project.clone(), config)
            .with_validator(printing(MISSING_SYSTEM_REPORT));
        let err = pipeline
            .run(&client(&server), &options(false))
            .await
            .unwrap_err();

        upload.assert_async().await;
        create.assert_async().await;
        assert!(matches!(err, OaiftError::ValidationGate { ref reasons, .. }
            if reasons == &vec!["n_missing_system=1".to_string()]));

        let namespace = project.fine_tune("ft").unwrap();
        let preview: PreviewReport =
            serde_json::from_str(&fs::read_to_string(namespace.preview_path()).unwrap()).unwrap();
        assert_eq!(preview.n_missing_system, 1);
        assert!(!namespace.is_submitted());
    }

    #[tokio::test]
    async fn test_prepare_then_submit_writes_job_report() {
        let tmp = TempDir::new().unwrap();
        let (project, config) = setup(&tmp, "3");
        let mut server = mockito::Server::new_async().await;
        let upload = server
            .mock("POST", "/files")
            .with_status(200)
            .with_body(
                r#"{"id": "file-1", "filename": "training_set.jsonl", "bytes": 5,
                    "created_at": 1700000000, "purpose": "fine-tune"}"#,
            )
            .expect(1)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/fine_tuning/jobs")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "gpt-3.5-turbo",
                "training_file": "file-1",
                "hyperparameters": {"n_epochs": 3},
                "suffix": "ft"
            })))
            .with_status(200)
            .with_body(
                r#"{"id": "ftjob-1", "status": "validating_files", "model": "gpt-3.5-turbo",
                    "training_file": "file-1"}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let pipeline =
            FineTunePipeline::new(project.clone(), config).with_validator(printing(CLEAN_REPORT));

        // A dry run persists the preview only
        let prepared = pipeline.prepare(&options(false)).await.unwrap();
        assert_eq!(prepared.preview.dataset_size, 2);
        assert_eq!(fs::read_to_string(&prepared.training_set).unwrap(), "L1\nL2");
        assert!(!prepared.namespace.is_submitted());

        // The same namespace is reused for the applied run
        let record = pipeline.run(&client(&server), &options(false)).await.unwrap();

        upload.assert_async().await;
        create.assert_async().await;
        assert_eq!(record.job.id, "ftjob-1");
        assert_eq!(record.training_file.id, "file-1");
        assert_eq!(record.datasets, vec!["one", "two"]);
        assert_eq!(record.config.fine_tune.epochs, Epochs::Count(3));

        let namespace = project.fine_tune("ft").unwrap();
        let saved: FineTuneJobRecord =
            serde_json::from_str(&fs::read_to_string(namespace.report_path()).unwrap()).unwrap();
        assert_eq!(saved.job.id, "ftjob-1");

        // A submitted namespace needs --force
        assert!(matches!(
            pipeline.prepare(&options(false)).await,
            Err(OaiftError::NamespaceExists { .. })
        ));
        pipeline.prepare(&options(true)).await.unwrap();
    }
}
