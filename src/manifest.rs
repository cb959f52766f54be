use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::domain::DescriptorName;
use crate::error::SddmError;
use crate::store::Store;

/// JSON summary of a descriptor folder, synthesized at download time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorManifest {
    pub name: String,
    pub origin: Option<String>,
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Metadata,
    Pipeline,
    Container,
    Other,
}

pub fn classify(path: &Utf8Path) -> FileKind {
    let file_name = path.file_name().unwrap_or_default();
    if file_name.to_ascii_lowercase().contains("dockerfile") {
        return FileKind::Container;
    }
    match path.extension().map(str::to_ascii_lowercase).as_deref() {
        Some("json") => FileKind::Metadata,
        Some("py") => FileKind::Pipeline,
        _ => FileKind::Other,
    }
}

impl DescriptorManifest {
    /// Walks `folder` and classifies its files. Paths are relative to `folder`.
    pub fn from_folder(
        name: &DescriptorName,
        folder: &Utf8Path,
        origin: Option<String>,
    ) -> Result<Self, SddmError> {
        let mut files = Vec::new();
        let mut pipeline = Vec::new();
        let mut docker = None;

        for relative in Store::list_files(folder)? {
            match classify(&relative) {
                FileKind::Metadata => {
                    if let Some(file_name) = relative.file_name() {
                        files.push(file_name.to_string());
                    }
                }
                FileKind::Pipeline => pipeline.push(relative.to_string()),
                FileKind::Container => {
                    if docker.is_none() {
                        docker = Some(relative.to_string());
                    }
                }
                FileKind::Other => {}
            }
        }

        files.sort();
        files.dedup();

        Ok(Self {
            name: name.to_string(),
            origin,
            files,
            pipeline: (!pipeline.is_empty()).then_some(pipeline),
            docker,
        })
    }
}
