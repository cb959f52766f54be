use std::fs;
use std::sync::LazyLock;

use camino::Utf8Path;
use regex::Regex;
use serde::Serialize;

use crate::error::SddmError;

pub const PIPELINE_FILE: &str = "etl_pipeline.py";
pub const PIPELINE_STUB: &str = "# Pipeline script";

static DESCRIPTOR_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^descriktor_(\d+)\.json$").unwrap());

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDescriptor {
    pub folder: String,
    pub descriptor_file: String,
    pub counter: u64,
    pub pipeline_created: bool,
}

/// Adds the next `descriktor_<n>.json` stub to `folder` and makes sure the
/// pipeline script exists. Earlier stubs are never overwritten.
pub fn generate_example_descriptor(folder: &Utf8Path) -> Result<GeneratedDescriptor, SddmError> {
    fs::create_dir_all(folder.as_std_path())
        .map_err(|err| SddmError::Filesystem(err.to_string()))?;

    let counter = next_counter(folder)?;
    let descriptor_file = format!("descriktor_{counter}.json");
    let descriptor_path = folder.join(&descriptor_file);
    fs::write(descriptor_path.as_std_path(), b"{}")
        .map_err(|err| SddmError::Filesystem(err.to_string()))?;
    tracing::info!(file = %descriptor_path, "created descriptor stub");

    let pipeline_path = folder.join(PIPELINE_FILE);
    let pipeline_created = !pipeline_path.as_std_path().exists();
    if pipeline_created {
        fs::write(pipeline_path.as_std_path(), PIPELINE_STUB)
            .map_err(|err| SddmError::Filesystem(err.to_string()))?;
    }

    Ok(GeneratedDescriptor {
        folder: folder.to_string(),
        descriptor_file,
        counter,
        pipeline_created,
    })
}

fn next_counter(folder: &Utf8Path) -> Result<u64, SddmError> {
    let entries =
        fs::read_dir(folder.as_std_path()).map_err(|err| SddmError::Filesystem(err.to_string()))?;
    let mut latest: Option<u64> = None;
    for entry in entries {
        let entry = entry.map_err(|err| SddmError::Filesystem(err.to_string()))?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(captures) = DESCRIPTOR_FILE.captures(file_name) else {
            continue;
        };
        if let Ok(value) = captures[1].parse::<u64>() {
            latest = Some(latest.map_or(value, |current| current.max(value)));
        }
    }
    match latest {
        None => Ok(0),
        Some(value) => value.checked_add(1).ok_or_else(|| {
            SddmError::Filesystem(format!("descriptor counter exhausted in {folder}"))
        }),
    }
}
