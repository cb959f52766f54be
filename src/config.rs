use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::SddmError;

pub const CONFIG_FILE_NAME: &str = "sddm.json";
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_COMMIT_MESSAGE: &str = "Added software defined dataset.";
pub const DEFAULT_PIPELINES_DIR: &str = "pipelines";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub trunk: Option<String>,
    #[serde(default)]
    pub remote: Option<String>,
    #[serde(default)]
    pub commit_message: Option<String>,
    #[serde(default)]
    pub pipelines_dir: Option<String>,
    #[serde(default)]
    pub merge_branches: Vec<String>,
    #[serde(default)]
    pub push: Option<bool>,
    #[serde(default)]
    pub git: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    /// `None` means detect `main`/`master` from the local branches.
    pub trunk: Option<String>,
    pub remote: String,
    pub commit_message: String,
    pub pipelines_dir: String,
    pub merge_branches: Vec<String>,
    pub push: bool,
    pub git: PathBuf,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolution order: explicit path, `<repo>/sddm.json`, the user config
    /// directory, then built-in defaults.
    pub fn resolve(path: Option<&str>, repo_root: &Path) -> Result<ResolvedConfig, SddmError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::default_locations(repo_root)
                .into_iter()
                .find(|candidate| candidate.is_file()),
        };

        let Some(config_path) = config_path else {
            tracing::debug!("no config file found, using defaults");
            return Ok(ResolvedConfig::default());
        };

        tracing::debug!(path = %config_path.display(), "loading config");
        let content = fs::read_to_string(&config_path)
            .map_err(|_| SddmError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SddmError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    pub fn default_locations(repo_root: &Path) -> Vec<PathBuf> {
        let mut locations = vec![repo_root.join(CONFIG_FILE_NAME)];
        if let Some(dirs) = BaseDirs::new() {
            locations.push(dirs.config_dir().join("sddm").join("config.json"));
        }
        locations
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            trunk: config.trunk.filter(|value| !value.trim().is_empty()),
            remote: config
                .remote
                .unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
            commit_message: config
                .commit_message
                .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string()),
            pipelines_dir: config
                .pipelines_dir
                .unwrap_or_else(|| DEFAULT_PIPELINES_DIR.to_string()),
            merge_branches: config.merge_branches,
            push: config.push.unwrap_or(true),
            git: PathBuf::from(config.git.unwrap_or_else(|| "git".to_string())),
        }
    }
}
