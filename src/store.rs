use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::{Builder, TempDir};

use crate::domain::DescriptorName;
use crate::error::SddmError;

/// Handle on the git working tree that stores descriptor folders.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn open(root: &Utf8Path) -> Result<Self, SddmError> {
        if !root.join(".git").as_std_path().exists() {
            return Err(SddmError::NotARepository(root.as_std_path().to_path_buf()));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn from_current_dir() -> Result<Self, SddmError> {
        let cwd = std::env::current_dir().map_err(|err| SddmError::Filesystem(err.to_string()))?;
        let root = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|_| SddmError::Filesystem("invalid repository path".to_string()))?;
        Self::open(&root)
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn descriptor_dir(&self, name: &DescriptorName) -> Utf8PathBuf {
        self.root.join(name.as_str())
    }

    /// Resolves a user supplied path against the repository root.
    pub fn resolve(&self, path: &Utf8Path) -> Utf8PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn manifest_path(out_dir: &Utf8Path, name: &DescriptorName) -> Utf8PathBuf {
        out_dir.join(format!("{name}.json"))
    }

    pub fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), SddmError> {
        let parent = path
            .parent()
            .ok_or_else(|| SddmError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| SddmError::Filesystem(err.to_string()))?;
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| SddmError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix("sddm-manifest")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| SddmError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| SddmError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| SddmError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// Copies into a sibling temp dir first so `dest` never holds a partial tree.
    pub fn copy_dir_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), SddmError> {
        let parent = dest
            .parent()
            .ok_or_else(|| SddmError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| SddmError::Filesystem(err.to_string()))?;
        let temp_dir = Builder::new()
            .prefix("sddm-copy")
            .tempdir_in(parent.as_std_path())
            .map_err(|err| SddmError::Filesystem(err.to_string()))?;
        let temp_path = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf())
            .map_err(|_| SddmError::Filesystem("invalid temp dir".to_string()))?;
        Self::copy_dir_recursive(source, &temp_path)?;
        fs::rename(temp_path.as_std_path(), dest.as_std_path())
            .map_err(|err| SddmError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// Symlinks to directories are skipped; symlinks to files are copied as files.
    pub fn copy_dir_recursive(source: &Utf8Path, dest: &Utf8Path) -> Result<(), SddmError> {
        fs::create_dir_all(dest.as_std_path())
            .map_err(|err| SddmError::Filesystem(err.to_string()))?;
        for entry in walk_dir(source.as_std_path())? {
            let relative = entry
                .path
                .strip_prefix(source.as_std_path())
                .map_err(|err| SddmError::Filesystem(err.to_string()))?;
            if relative.starts_with(".git") {
                continue;
            }
            let target = dest.as_std_path().join(relative);
            if entry.is_dir {
                fs::create_dir_all(&target)
                    .map_err(|err| SddmError::Filesystem(err.to_string()))?;
            } else if entry.path.is_dir() {
                tracing::warn!(path = %entry.path.display(), "skipping symlinked directory");
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|err| SddmError::Filesystem(err.to_string()))?;
                }
                fs::copy(&entry.path, &target).map_err(|err| SddmError::Filesystem(err.to_string()))?;
            }
        }
        Ok(())
    }

    /// Files below `root`, relative to it, in sorted order.
    pub fn list_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, SddmError> {
        let mut files = Vec::new();
        for entry in walk_dir(root.as_std_path())? {
            if entry.is_dir || !entry.path.is_file() {
                continue;
            }
            let relative = entry
                .path
                .strip_prefix(root.as_std_path())
                .map_err(|err| SddmError::Filesystem(err.to_string()))?;
            let relative = Utf8PathBuf::from_path_buf(relative.to_path_buf())
                .map_err(|_| SddmError::Filesystem("non-utf8 file path in descriptor".to_string()))?;
            files.push(relative);
        }
        files.sort();
        Ok(files)
    }

    /// Moves `dir` into a temporary sibling under the repository root so a
    /// checkout can populate its old location.
    pub fn park_dir(&self, dir: &Utf8Path) -> Result<ParkedDir, SddmError> {
        let holder = Builder::new()
            .prefix("sddm-upload")
            .tempdir_in(self.root.as_std_path())
            .map_err(|err| SddmError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(holder.path().join("descriptor"))
            .map_err(|_| SddmError::Filesystem("invalid temp dir".to_string()))?;
        fs::rename(dir.as_std_path(), path.as_std_path())
            .map_err(|err| SddmError::Filesystem(err.to_string()))?;
        tracing::debug!(from = %dir, to = %path, "parked descriptor folder");
        Ok(ParkedDir {
            holder: Some(holder),
            path,
        })
    }
}

/// A folder moved aside by [`Store::park_dir`].
#[derive(Debug)]
pub struct ParkedDir {
    holder: Option<TempDir>,
    path: Utf8PathBuf,
}

impl ParkedDir {
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Moves the parked folder to `dest`. Returns `false` when the folder was
    /// already moved elsewhere. If `dest` is occupied the parked copy is kept
    /// on disk and reported in the error.
    pub fn restore_to(mut self, dest: &Utf8Path) -> Result<bool, SddmError> {
        if !self.path.as_std_path().exists() {
            return Ok(false);
        }
        if dest.as_std_path().exists() {
            if let Some(holder) = self.holder.take() {
                let _ = holder.keep();
            }
            return Err(SddmError::Filesystem(format!(
                "{dest} already exists; descriptor folder kept at {}",
                self.path
            )));
        }
        fs::rename(self.path.as_std_path(), dest.as_std_path()).map_err(|err| {
            if let Some(holder) = self.holder.take() {
                let _ = holder.keep();
            }
            SddmError::Filesystem(format!("{err}; descriptor folder kept at {}", self.path))
        })?;
        Ok(true)
    }
}

struct WalkEntry {
    path: PathBuf,
    is_dir: bool,
}

/// Depth-first listing that never follows symlinks into directories.
fn walk_dir(root: &Path) -> Result<Vec<WalkEntry>, SddmError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = fs::read_dir(&path).map_err(|err| SddmError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| SddmError::Filesystem(err.to_string()))?;
            let is_dir = entry
                .file_type()
                .map_err(|err| SddmError::Filesystem(err.to_string()))?
                .is_dir();
            let path = entry.path();
            if is_dir {
                stack.push(path.clone());
            }
            items.push(WalkEntry { path, is_dir });
        }
    }
    Ok(items)
}
