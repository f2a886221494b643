//! On-disk project layout.
//!
//! ```text
//! <projects_dir>/<project>/oaift.toml
//! <projects_dir>/<project>/datasets/<name>/...
//! <projects_dir>/<project>/fine-tunes/<name>/...
//! ```
//!
//! A namespace directory belongs to the single run that claimed it; nothing
//! here locks against concurrent invocations.

use crate::models::{CONFIG_FILE, CONFIG_TEMPLATE, Config, OaiftError, Result};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DATASETS_DIR: &str = "datasets";
pub const FINE_TUNES_DIR: &str = "fine-tunes";

pub const CHAT_COMPLETIONS_FILE: &str = "chat_completions.jsonl";
pub const TRAINING_SET_FILE: &str = "training_set.jsonl";
pub const GENERATED_REPORT_FILE: &str = "generated_report.json";
pub const FT_PREVIEW_FILE: &str = "ft_preview.json";
pub const FT_REPORT_FILE: &str = "ft_report.json";

/// Default validator, scaffolded into every new project.
pub const VALIDATOR_SCRIPT_PATH: &str = "scripts/validate.py";
pub const VALIDATOR_SCRIPT: &str = include_str!("../scripts/validate.py");

/// Reject names that would escape their parent directory.
fn check_name(kind: &str, name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(OaiftError::InvalidInput(format!(
            "{kind} name '{name}' must be a plain directory name"
        )));
    }
    Ok(())
}

/// A project directory holding a config and its namespaces.
#[derive(Debug, Clone)]
pub struct Project {
    name: String,
    root: PathBuf,
}

impl Project {
    pub fn new(projects_dir: &Path, name: &str) -> Result<Self> {
        check_name("Project", name)?;
        Ok(Self {
            name: name.to_string(),
            root: projects_dir.join(name),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Load and validate the project's `oaift.toml`.
    pub fn load_config(&self) -> Result<Config> {
        Ok(Config::from_file(&self.config_path())?)
    }

    /// Scaffold a new project: config template, namespace directories and
    /// the default validator script.
    ///
    /// Refuses to write into a directory that already has content.
    pub fn init(&self) -> Result<PathBuf> {
        if self.root.exists() {
            let mut entries = fs::read_dir(&self.root)
                .map_err(|e| OaiftError::io("reading project directory", e))?;
            if entries.next().is_some() {
                return Err(OaiftError::NamespaceExists {
                    kind: "Project",
                    name: self.name.clone(),
                    path: self.root.clone(),
                });
            }
        }

        let script_path = self.root.join(VALIDATOR_SCRIPT_PATH);
        let script_dir = script_path.parent().unwrap_or(&self.root).to_path_buf();
        for dir in [
            self.root.join(DATASETS_DIR),
            self.root.join(FINE_TUNES_DIR),
            script_dir,
        ] {
            fs::create_dir_all(&dir)
                .map_err(|e| OaiftError::io("creating project directory", e))?;
        }
        fs::write(&script_path, VALIDATOR_SCRIPT)
            .map_err(|e| OaiftError::io("writing validator script", e))?;

        let config_path = self.config_path();
        fs::write(&config_path, CONFIG_TEMPLATE)
            .map_err(|e| OaiftError::io("writing project config", e))?;

        info!(project = %self.name, path = %config_path.display(), "Project initialized");
        Ok(config_path)
    }

    /// `{project}-{unix millis}`; unique in practice, so never collision-checked.
    pub fn default_dataset_name(&self) -> String {
        format!("{}-{}", self.name, chrono::Utc::now().timestamp_millis())
    }

    pub fn dataset(&self, name: &str) -> Result<DatasetNamespace> {
        check_name("Dataset", name)?;
        Ok(DatasetNamespace {
            name: name.to_string(),
            dir: self.root.join(DATASETS_DIR).join(name),
        })
    }

    pub fn fine_tune(&self, name: &str) -> Result<FineTuneNamespace> {
        check_name("Fine-tune", name)?;
        Ok(FineTuneNamespace {
            name: name.to_string(),
            dir: self.root.join(FINE_TUNES_DIR).join(name),
        })
    }
}

/// Output directory of one generation run.
#[derive(Debug, Clone)]
pub struct DatasetNamespace {
    name: String,
    dir: PathBuf,
}

impl DatasetNamespace {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn raw_completions_path(&self) -> PathBuf {
        self.dir.join(CHAT_COMPLETIONS_FILE)
    }

    pub fn training_set_path(&self) -> PathBuf {
        self.dir.join(TRAINING_SET_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(GENERATED_REPORT_FILE)
    }

    pub fn exists(&self) -> bool {
        self.dir.exists()
    }

    /// Take ownership of the namespace for a new run.
    ///
    /// An existing namespace is an error unless `force`, in which case its
    /// previous artifacts are removed.
    pub fn claim(&self, force: bool) -> Result<()> {
        if self.exists() {
            if !force {
                return Err(OaiftError::NamespaceExists {
                    kind: "Dataset",
                    name: self.name.clone(),
                    path: self.dir.clone(),
                });
            }
            info!(dataset = %self.name, "Overwriting existing dataset");
            for path in [
                self.raw_completions_path(),
                self.training_set_path(),
                self.report_path(),
            ] {
                remove_if_present(&path)?;
            }
        }

        fs::create_dir_all(&self.dir)
            .map_err(|e| OaiftError::io("creating dataset directory", e))?;
        debug!(path = %self.dir.display(), "Dataset namespace ready");
        Ok(())
    }
}

/// Output directory of one fine-tune run.
#[derive(Debug, Clone)]
pub struct FineTuneNamespace {
    name: String,
    dir: PathBuf,
}

impl FineTuneNamespace {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn training_set_path(&self) -> PathBuf {
        self.dir.join(TRAINING_SET_FILE)
    }

    pub fn preview_path(&self) -> PathBuf {
        self.dir.join(FT_PREVIEW_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join(FT_REPORT_FILE)
    }

    /// A job has already been created from this namespace.
    pub fn is_submitted(&self) -> bool {
        self.report_path().exists()
    }

    /// Ready the namespace for consolidation.
    ///
    /// Preview-only namespaces are reused so a dry run can be followed by an
    /// applied one; a namespace with a submitted job needs `force`.
    pub fn prepare(&self, force: bool) -> Result<()> {
        if self.is_submitted() {
            if !force {
                return Err(OaiftError::NamespaceExists {
                    kind: "Fine-tune",
                    name: self.name.clone(),
                    path: self.dir.clone(),
                });
            }
            info!(fine_tune = %self.name, "Overwriting submitted fine-tune namespace");
            remove_if_present(&self.report_path())?;
        }

        fs::create_dir_all(&self.dir)
            .map_err(|e| OaiftError::io("creating fine-tune directory", e))?;
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(OaiftError::io(format!("removing {}", path.display()), e)),
    }
}

/// Write pretty JSON via a temp file and rename.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let file = File::create(&temp_path).map_err(|e| OaiftError::io("creating temp file", e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| OaiftError::Internal(format!("Serializing {}: {}", path.display(), e)))?;
    writer
        .flush()
        .map_err(|e| OaiftError::io("flushing temp file", e))?;
    drop(writer);

    fs::rename(&temp_path, path)
        .map_err(|e| OaiftError::io(format!("renaming into {}", path.display()), e))?;
    Ok(())
}

/// Write one JSON document per line, replacing the file.
pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let file = File::create(path).map_err(|e| OaiftError::io("creating JSONL file", e))?;
    write_lines(BufWriter::new(file), items, path)
}

/// Append one JSON document per line, creating the file if needed.
pub fn append_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| OaiftError::io("opening JSONL file", e))?;
    write_lines(BufWriter::new(file), items, path)
}

fn write_lines<T: Serialize, W: Write>(mut writer: W, items: &[T], path: &Path) -> Result<()> {
    for item in items {
        let json = serde_json::to_string(item)
            .map_err(|e| OaiftError::Internal(format!("Failed to serialize line: {}", e)))?;
        writeln!(writer, "{}", json)
            .map_err(|e| OaiftError::io(format!("writing {}", path.display()), e))?;
    }
    writer
        .flush()
        .map_err(|e| OaiftError::io(format!("flushing {}", path.display()), e))
}
