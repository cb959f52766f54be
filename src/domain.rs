use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SddmError;

static DESCRIPTOR_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());

/// Name of a descriptor folder, which is also the name of the branch storing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DescriptorName(String);

impl DescriptorName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the name from the final segment of a descriptor folder path.
    pub fn from_folder(path: &Utf8Path) -> Result<Self, SddmError> {
        let segment = path
            .file_name()
            .ok_or_else(|| SddmError::InvalidDescriptorPath(path.to_string()))?;
        segment.parse()
    }

    /// Wraps a name already known to be a branch. Branch names may contain `/`,
    /// which `FromStr` rejects for new descriptors.
    pub(crate) fn existing_branch(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for DescriptorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DescriptorName {
    type Err = SddmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().trim_end_matches('/');
        let is_valid = DESCRIPTOR_NAME.is_match(normalized)
            && !normalized.contains("..")
            && !normalized.ends_with(".lock");
        if !is_valid {
            return Err(SddmError::InvalidDescriptorName(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl AsRef<str> for DescriptorName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Accepts only paths written with forward slashes and returns them normalized.
///
/// `folder/` and `./folder` both normalize to `folder`; a bare `folder` is rejected.
pub fn slash_path(value: &str) -> Result<Utf8PathBuf, SddmError> {
    let trimmed = value.trim();
    if !trimmed.contains('/') || trimmed.contains('\\') {
        return Err(SddmError::InvalidPathSeparator(value.to_string()));
    }
    let mut normalized = Utf8PathBuf::new();
    for component in Utf8Path::new(trimmed).components() {
        match component {
            camino::Utf8Component::CurDir => {}
            camino::Utf8Component::ParentDir => {
                if normalized.file_name().is_some() {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_str()),
        }
    }
    if normalized.as_str().is_empty() {
        normalized.push(".");
    }
    Ok(normalized)
}

/// Short branch names in the order git listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BranchList(Vec<String>);

impl BranchList {
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    /// Parses `git branch --list --format=%(refname:short)` output.
    pub fn parse_local(output: &str) -> Self {
        let names = output
            .lines()
            .map(|line| line.trim().trim_start_matches("* ").trim())
            .filter(|line| !line.is_empty() && !line.starts_with('('))
            .map(str::to_string)
            .collect();
        Self(names)
    }

    /// Parses `git branch --remotes` output, keeping only branches of `remote`
    /// with the `<remote>/` prefix removed.
    pub fn parse_remote(output: &str, remote: &str) -> Self {
        let prefix = format!("{remote}/");
        let names = output
            .lines()
            .map(str::trim)
            .filter(|line| !line.contains(" -> "))
            .filter_map(|line| line.strip_prefix(prefix.as_str()))
            .filter(|name| !name.is_empty() && *name != "HEAD")
            .map(str::to_string)
            .collect();
        Self(names)
    }

    /// Exact membership, so `data` never matches `data2`.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|branch| branch == name)
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn without(&self, excluded: &str) -> Vec<String> {
        self.0
            .iter()
            .filter(|branch| branch.as_str() != excluded)
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parses the `True|False` positional of `download`.
pub fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(format!("expected True or False, got `{value}`")),
    }
}
