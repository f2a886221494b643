//! Consolidation of generated datasets into one fine-tuning file.

use crate::models::{OaiftError, Result};
use crate::workspace::{FineTuneNamespace, Project};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Concatenate the training sets of `datasets`, in order, into the
/// namespace's training file.
///
/// Contents are joined byte for byte and only trailing whitespace is trimmed;
/// records are not re-serialized. Every source is read before anything is
/// written, so a missing dataset leaves the namespace untouched.
pub fn consolidate(
    project: &Project,
    datasets: &[String],
    target: &FineTuneNamespace,
) -> Result<PathBuf> {
    if datasets.is_empty() {
        return Err(OaiftError::InvalidInput(
            "at least one dataset is required".to_string(),
        ));
    }

    let mut combined = String::new();
    for name in datasets {
        let path = project.dataset(name)?.training_set_path();
        if !path.is_file() {
            return Err(OaiftError::DatasetNotFound {
                name: name.clone(),
                path,
            });
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| OaiftError::io(format!("reading {}", path.display()), e))?;
        debug!(dataset = %name, bytes = content.len(), "Read training set");
        combined.push_str(&content);
    }

    let output = target.training_set_path();
    fs::write(&output, combined.trim_end())
        .map_err(|e| OaiftError::io("writing consolidated training set", e))?;

    info!(
        datasets = datasets.len(),
        path = %output.display(),
        "Datasets consolidated"
    );
    Ok(output)
}
