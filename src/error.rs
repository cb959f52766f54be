use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SddmError {
    #[error("path must use forward slashes: {0}")]
    #[diagnostic(help("write the path like `folder/` or `./data/out`"))]
    InvalidPathSeparator(String),

    #[error("invalid descriptor path: {0}")]
    InvalidDescriptorPath(String),

    #[error("invalid descriptor name: {0}")]
    InvalidDescriptorName(String),

    #[error("descriptor not found: {name}. Pick from {available:?}")]
    DescriptorNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("branch {branch} has no descriptor folder {name}")]
    DescriptorFolderMissing { name: String, branch: String },

    #[error("not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("`{command}` exited with {status}: {stderr}")]
    GitCommand {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("merge of {branch} failed: {message}")]
    MergeFailed { branch: String, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
