use std::fmt;
use std::fs;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{DescriptorName, slash_path};
use crate::error::SddmError;
use crate::git::GitClient;
use crate::manifest::DescriptorManifest;
use crate::store::Store;

#[derive(Debug, Clone, Copy)]
pub struct UploadOptions {
    pub push: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub name: String,
    pub branch_created: bool,
    pub copied: bool,
    pub committed: bool,
    pub pushed: bool,
    pub uploaded_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub trunk: String,
    pub descriptors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadAction {
    Manifest,
    Copied,
    SkippedExisting,
    SkippedMissing,
}

impl fmt::Display for DownloadAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadAction::Manifest => write!(f, "manifest"),
            DownloadAction::Copied => write!(f, "copied"),
            DownloadAction::SkippedExisting => write!(f, "skipped-existing"),
            DownloadAction::SkippedMissing => write!(f, "skipped-missing"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub name: String,
    pub fetched: bool,
    pub action: DownloadAction,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<DescriptorManifest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub branch: String,
    pub trunk: String,
    pub committed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeAllResult {
    pub merges: Vec<MergeResult>,
    pub pushed: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: impl Into<String>) {
    sink.event(ProgressEvent {
        message: message.into(),
        elapsed: None,
    });
}

/// Descriptor store manager: maps descriptor folders onto branches of one
/// working tree.
#[derive(Clone)]
pub struct App<G: GitClient> {
    store: Store,
    git: G,
    config: ResolvedConfig,
}

impl<G: GitClient> App<G> {
    pub fn new(store: Store, git: G, config: ResolvedConfig) -> Self {
        Self { store, git, config }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Configured trunk, or `main`/`master` as found among local branches.
    pub fn trunk(&self) -> Result<String, SddmError> {
        if let Some(trunk) = &self.config.trunk {
            return Ok(trunk.clone());
        }
        let branches = self.git.local_branches()?;
        let detected = ["main", "master"]
            .into_iter()
            .find(|candidate| branches.contains(candidate))
            .unwrap_or("main");
        Ok(detected.to_string())
    }

    pub fn upload(
        &self,
        path: &str,
        options: UploadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<UploadResult, SddmError> {
        let relative = slash_path(path)?;
        let source = self.store.resolve(&relative);
        if !source.as_std_path().is_dir() {
            return Err(SddmError::InvalidDescriptorPath(path.to_string()));
        }
        let name = DescriptorName::from_folder(&relative)?;
        let trunk = self.trunk()?;
        if name.as_str() == trunk {
            return Err(SddmError::InvalidDescriptorName(name.to_string()));
        }

        emit(sink, format!("phase=Resolve; descriptor {name}"));
        let branches = self.git.local_branches()?;
        let branch_created = !branches.contains(name.as_str());
        let dest = self.store.descriptor_dir(&name);

        // An untracked folder at the branch's own path blocks the checkout.
        let parked = if !branch_created && source == dest {
            tracing::info!(branch = %name, "moving untracked descriptor folder aside");
            Some(self.store.park_dir(&source)?)
        } else {
            None
        };

        let switched = if branch_created {
            tracing::info!(branch = %name, "creating descriptor branch");
            self.git.create_branch(name.as_str())
        } else {
            self.git.checkout(name.as_str())
        };
        if let Err(err) = switched {
            if let Some(parked) = parked {
                parked.restore_to(&source)?;
            }
            return Err(err);
        }

        let result = self.restoring_branch(&trunk, || {
            let copied = !dest.as_std_path().exists();
            if copied {
                emit(sink, "phase=Store; copying descriptor folder");
                match &parked {
                    Some(parked) => {
                        fs::rename(parked.path().as_std_path(), dest.as_std_path())
                            .map_err(|err| SddmError::Filesystem(err.to_string()))?;
                    }
                    None => Store::copy_dir_recursive(&source, &dest)?,
                }
            }

            self.git.stage(name.as_str())?;
            let committed = self.git.has_staged_changes()?;
            if committed {
                self.git.commit(&self.config.commit_message)?;
            } else {
                tracing::info!(branch = %name, "nothing to commit");
            }

            let pushed = options.push;
            if pushed {
                emit(sink, "phase=Push; uploading descriptor to remote");
                let start = Instant::now();
                self.git.push(&self.config.remote, name.as_str())?;
                sink.event(ProgressEvent {
                    message: "git.push".to_string(),
                    elapsed: Some(start.elapsed()),
                });
            }

            Ok(UploadResult {
                name: name.to_string(),
                branch_created,
                copied,
                committed,
                pushed,
                uploaded_at: chrono::Utc::now().to_rfc3339(),
            })
        });

        // Back on the trunk the folder is untracked again.
        match parked.map(|parked| parked.restore_to(&source)) {
            Some(Err(err)) if result.is_ok() => Err(err),
            Some(Err(err)) => {
                tracing::warn!(error = %err, "failed to put descriptor folder back");
                result
            }
            _ => result,
        }
    }

    pub fn descriptors(&self, sink: &dyn ProgressSink) -> Result<ListResult, SddmError> {
        emit(sink, "phase=Resolve; listing branches");
        let trunk = self.trunk()?;
        let descriptors = self.git.local_branches()?.without(&trunk);
        Ok(ListResult { trunk, descriptors })
    }

    pub fn download(
        &self,
        name: &str,
        out_dir: &str,
        as_json: bool,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, SddmError> {
        let out_relative = slash_path(out_dir)?;
        let out = self.store.resolve(&out_relative);
        fs::create_dir_all(out.as_std_path())
            .map_err(|err| SddmError::Filesystem(err.to_string()))?;

        let requested = name.trim().trim_end_matches('/');
        let trunk = self.trunk()?;
        let descriptors = self.git.local_branches()?.without(&trunk);

        emit(sink, format!("phase=Resolve; descriptor {requested}"));
        let fetched = if descriptors.iter().any(|branch| branch == requested) {
            false
        } else {
            let remote = self.git.remote_branches(&self.config.remote)?;
            if requested.is_empty() || requested == trunk || !remote.contains(requested) {
                return Err(SddmError::DescriptorNotFound {
                    name: requested.to_string(),
                    available: descriptors,
                });
            }
            tracing::info!(branch = %requested, remote = %self.config.remote, "fetching descriptor branch");
            self.git.fetch(&self.config.remote, requested)?;
            self.git.track_remote_branch(&self.config.remote, requested)?;
            true
        };
        let name = DescriptorName::existing_branch(requested);

        let previous = self.git.current_branch()?.unwrap_or_else(|| trunk.clone());
        self.git.checkout(name.as_str())?;

        self.restoring_branch(&previous, || {
            let folder = self.store.descriptor_dir(&name);
            if as_json {
                if !folder.as_std_path().is_dir() {
                    return Err(SddmError::DescriptorFolderMissing {
                        name: name.to_string(),
                        branch: name.to_string(),
                    });
                }
                emit(sink, "phase=Verify; building manifest");
                let origin = self.git.remote_url(&self.config.remote)?;
                let manifest = DescriptorManifest::from_folder(&name, &folder, origin)?;
                let path = Store::manifest_path(&out, &name);
                Store::write_json_atomic(&path, &manifest)?;
                return Ok(DownloadResult {
                    name: name.to_string(),
                    fetched,
                    action: DownloadAction::Manifest,
                    path: path.to_string(),
                    manifest: Some(manifest),
                });
            }

            let dest = out.join(name.as_str());
            let action = if dest.as_std_path().exists() {
                DownloadAction::SkippedExisting
            } else if !folder.as_std_path().is_dir() {
                DownloadAction::SkippedMissing
            } else {
                emit(sink, "phase=Store; copying descriptor folder");
                Store::copy_dir_atomic(&folder, &dest)?;
                DownloadAction::Copied
            };
            Ok(DownloadResult {
                name: name.to_string(),
                fetched,
                action,
                path: dest.to_string(),
                manifest: None,
            })
        })
    }

    /// Merges only the pipelines directory of `branch` into the trunk.
    pub fn merge_branch(
        &self,
        branch: &str,
        sink: &dyn ProgressSink,
    ) -> Result<MergeResult, SddmError> {
        let trunk = self.trunk()?;
        let branches = self.git.local_branches()?;
        if branch == trunk || !branches.contains(branch) {
            return Err(SddmError::DescriptorNotFound {
                name: branch.to_string(),
                available: branches.without(&trunk),
            });
        }

        emit(sink, format!("phase=Merge; switching to {trunk}"));
        self.git.checkout(&trunk)?;

        emit(sink, format!("phase=Merge; merging {branch} into {trunk}"));
        if let Err(err) = self.git.merge_no_commit(branch) {
            if self.git.merge_in_progress().unwrap_or(false) {
                self.git.abort_merge()?;
            }
            return Err(SddmError::MergeFailed {
                branch: branch.to_string(),
                message: err.to_string(),
            });
        }

        if !self.git.merge_in_progress()? {
            tracing::info!(%branch, %trunk, "already up to date");
            return Ok(MergeResult {
                branch: branch.to_string(),
                trunk,
                committed: false,
            });
        }

        let pipelines = self.config.pipelines_dir.as_str();
        self.git.restore_except(pipelines)?;
        if self.store.root().join(pipelines).as_std_path().exists() {
            self.git.stage(pipelines)?;
        }
        self.git
            .commit(&format!("Merged {pipelines} folder from {branch} into {trunk}"))?;

        Ok(MergeResult {
            branch: branch.to_string(),
            trunk,
            committed: true,
        })
    }

    /// Merges each branch in order (the configured list when `branches` is
    /// empty), then optionally pushes the trunk.
    pub fn merge_branches(
        &self,
        branches: &[String],
        push: bool,
        sink: &dyn ProgressSink,
    ) -> Result<MergeAllResult, SddmError> {
        let branches = if branches.is_empty() {
            self.config.merge_branches.as_slice()
        } else {
            branches
        };

        let mut merges = Vec::with_capacity(branches.len());
        for branch in branches {
            merges.push(self.merge_branch(branch, sink)?);
        }

        if push && !merges.is_empty() {
            let trunk = self.trunk()?;
            emit(sink, "phase=Push; pushing trunk");
            self.git.push(&self.config.remote, &trunk)?;
        }

        Ok(MergeAllResult {
            pushed: push && !merges.is_empty(),
            merges,
        })
    }

    /// Runs `body`, then checks out `branch` whatever the outcome. The body's
    /// error wins over a failed checkout.
    fn restoring_branch<T>(
        &self,
        branch: &str,
        body: impl FnOnce() -> Result<T, SddmError>,
    ) -> Result<T, SddmError> {
        let result = body();
        let restored = self.git.checkout(branch);
        match (result, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(restore_err)) => {
                tracing::warn!(%branch, error = %restore_err, "failed to restore branch");
                Err(err)
            }
        }
    }
}
