use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use sddm::app::{App, DownloadAction, ProgressEvent, ProgressSink, UploadOptions};
use sddm::config::ResolvedConfig;
use sddm::domain::BranchList;
use sddm::error::SddmError;
use sddm::git::GitClient;
use sddm::manifest::DescriptorManifest;
use sddm::store::Store;

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Default)]
struct MockState {
    branches: Vec<String>,
    remote: Vec<String>,
    current: String,
    calls: Vec<String>,
    staged_changes: bool,
    merge_head: bool,
    fail_push: bool,
    fail_merge: bool,
    fail_checkout: Option<String>,
    tracked: Option<TrackedFolder>,
}

/// Folder committed on `branch`: checking the branch out writes it to disk and
/// refuses to clobber an untracked copy, leaving the branch removes it.
struct TrackedFolder {
    branch: String,
    folder: Utf8PathBuf,
}

#[derive(Clone, Default)]
struct MockGit {
    state: Arc<Mutex<MockState>>,
}

impl MockGit {
    fn with_branches(branches: &[&str]) -> Self {
        let git = MockGit::default();
        {
            let mut state = git.state.lock().unwrap();
            state.branches = branches.iter().map(|b| b.to_string()).collect();
            state.current = branches.first().map(|b| b.to_string()).unwrap_or_default();
            state.staged_changes = true;
        }
        git
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn branches(&self) -> Vec<String> {
        self.state.lock().unwrap().branches.clone()
    }

    fn current(&self) -> String {
        self.state.lock().unwrap().current.clone()
    }

    fn log(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn failure(command: &str) -> SddmError {
    SddmError::GitCommand {
        command: command.to_string(),
        status: "exit status: 1".to_string(),
        stderr: "mock failure".to_string(),
    }
}

impl GitClient for MockGit {
    fn local_branches(&self) -> Result<BranchList, SddmError> {
        Ok(BranchList::new(self.branches()))
    }

    fn remote_branches(&self, _remote: &str) -> Result<BranchList, SddmError> {
        Ok(BranchList::new(self.state.lock().unwrap().remote.clone()))
    }

    fn current_branch(&self) -> Result<Option<String>, SddmError> {
        Ok(Some(self.current()))
    }

    fn create_branch(&self, name: &str) -> Result<(), SddmError> {
        self.log(format!("checkout -b {name}"));
        let mut state = self.state.lock().unwrap();
        state.branches.push(name.to_string());
        state.current = name.to_string();
        Ok(())
    }

    fn checkout(&self, branch: &str) -> Result<(), SddmError> {
        self.log(format!("checkout {branch}"));
        let mut state = self.state.lock().unwrap();
        if !state.branches.iter().any(|b| b == branch)
            || state.fail_checkout.as_deref() == Some(branch)
        {
            return Err(failure("checkout"));
        }
        if let Some(tracked) = &state.tracked {
            if tracked.branch == branch {
                if tracked.folder.as_std_path().exists() {
                    return Err(failure("checkout"));
                }
                std::fs::create_dir_all(tracked.folder.as_std_path()).unwrap();
                std::fs::write(tracked.folder.join("descriktor_0.json").as_std_path(), "{}")
                    .unwrap();
            } else if state.current == tracked.branch {
                std::fs::remove_dir_all(tracked.folder.as_std_path()).unwrap();
            }
        }
        state.current = branch.to_string();
        Ok(())
    }

    fn fetch(&self, remote: &str, branch: &str) -> Result<(), SddmError> {
        self.log(format!("fetch {remote} {branch}"));
        Ok(())
    }

    fn track_remote_branch(&self, remote: &str, branch: &str) -> Result<(), SddmError> {
        self.log(format!("branch --track {branch} {remote}/{branch}"));
        self.state.lock().unwrap().branches.push(branch.to_string());
        Ok(())
    }

    fn stage(&self, path: &str) -> Result<(), SddmError> {
        self.log(format!("add {path}"));
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool, SddmError> {
        Ok(self.state.lock().unwrap().staged_changes)
    }

    fn commit(&self, message: &str) -> Result<(), SddmError> {
        self.log(format!("commit {message}"));
        Ok(())
    }

    fn push(&self, remote: &str, branch: &str) -> Result<(), SddmError> {
        self.log(format!("push {remote} {branch}"));
        if self.state.lock().unwrap().fail_push {
            return Err(failure("push"));
        }
        Ok(())
    }

    fn remote_url(&self, _remote: &str) -> Result<Option<String>, SddmError> {
        Ok(Some("https://example.org/descriptors.git".to_string()))
    }

    fn merge_no_commit(&self, branch: &str) -> Result<(), SddmError> {
        self.log(format!("merge {branch}"));
        let fail = self.state.lock().unwrap().fail_merge;
        if fail {
            return Err(failure("merge"));
        }
        Ok(())
    }

    fn abort_merge(&self) -> Result<(), SddmError> {
        self.log("merge --abort".to_string());
        self.state.lock().unwrap().merge_head = false;
        Ok(())
    }

    fn merge_in_progress(&self) -> Result<bool, SddmError> {
        Ok(self.state.lock().unwrap().merge_head)
    }

    fn restore_except(&self, keep: &str) -> Result<(), SddmError> {
        self.log(format!("restore except {keep}"));
        Ok(())
    }
}

struct Fixture {
    _temp: tempfile::TempDir,
    root: Utf8PathBuf,
    git: MockGit,
    app: App<MockGit>,
}

fn fixture(branches: &[&str]) -> Fixture {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    std::fs::create_dir(root.join(".git").as_std_path()).unwrap();
    let store = Store::open(&root).unwrap();
    let git = MockGit::with_branches(branches);
    let app = App::new(store, git.clone(), ResolvedConfig::default());
    Fixture {
        _temp: temp,
        root,
        git,
        app,
    }
}

fn leftover_temp_dirs(root: &Utf8PathBuf) -> usize {
    std::fs::read_dir(root.as_std_path())
        .unwrap()
        .filter(|entry| {
            let entry = entry.as_ref().unwrap();
            entry.file_name().to_string_lossy().starts_with("sddm-")
        })
        .count()
}

fn write_descriptor(root: &Utf8PathBuf, relative: &str, files: &[&str]) {
    let folder = root.join(relative);
    std::fs::create_dir_all(folder.as_std_path()).unwrap();
    for file in files {
        std::fs::write(folder.join(file).as_std_path(), "{}").unwrap();
    }
}

#[test]
fn upload_creates_branch_when_only_superstring_exists() {
    let fx = fixture(&["main", "data2"]);
    write_descriptor(&fx.root, "incoming/data", &["descriktor_0.json", "etl_pipeline.py"]);

    let result = fx
        .app
        .upload("incoming/data/", UploadOptions { push: true }, &NoopSink)
        .unwrap();

    assert!(result.branch_created);
    assert!(result.copied);
    assert!(result.committed);
    assert!(result.pushed);
    let created = fx.git.branches().into_iter().filter(|b| b == "data").count();
    assert_eq!(created, 1);
    assert!(fx.root.join("data/etl_pipeline.py").as_std_path().exists());
    assert_eq!(
        fx.git.calls(),
        vec![
            "checkout -b data".to_string(),
            "add data".to_string(),
            "commit Added software defined dataset.".to_string(),
            "push origin data".to_string(),
            "checkout main".to_string(),
        ]
    );
    assert_eq!(fx.git.current(), "main");
}

#[test]
fn upload_switches_to_existing_branch_and_keeps_present_folder() {
    let fx = fixture(&["main", "wind"]);
    write_descriptor(&fx.root, "wind", &["descriktor_0.json"]);
    {
        let mut state = fx.git.state.lock().unwrap();
        state.staged_changes = false;
        state.tracked = Some(TrackedFolder {
            branch: "wind".to_string(),
            folder: fx.root.join("wind"),
        });
    }

    let result = fx
        .app
        .upload("./wind", UploadOptions { push: false }, &NoopSink)
        .unwrap();

    assert!(!result.branch_created);
    assert!(!result.copied);
    assert!(!result.committed);
    assert!(!result.pushed);
    assert_eq!(
        fx.git.calls(),
        vec![
            "checkout wind".to_string(),
            "add wind".to_string(),
            "checkout main".to_string(),
        ]
    );
    assert!(fx.root.join("wind/descriktor_0.json").as_std_path().exists());
    assert_eq!(leftover_temp_dirs(&fx.root), 0);
}

#[test]
fn upload_fills_existing_branch_from_in_tree_folder() {
    let fx = fixture(&["main", "wind"]);
    write_descriptor(&fx.root, "wind", &["descriktor_0.json", "etl_pipeline.py"]);

    let result = fx
        .app
        .upload("wind/", UploadOptions { push: false }, &NoopSink)
        .unwrap();

    assert!(!result.branch_created);
    assert!(result.copied);
    assert!(result.committed);
    assert!(fx.root.join("wind/etl_pipeline.py").as_std_path().exists());
    assert_eq!(leftover_temp_dirs(&fx.root), 0);
}

#[test]
fn upload_puts_folder_back_when_checkout_fails() {
    let fx = fixture(&["main", "wind"]);
    write_descriptor(&fx.root, "wind", &["descriktor_0.json"]);
    fx.git.state.lock().unwrap().fail_checkout = Some("wind".to_string());

    let err = fx
        .app
        .upload("wind/", UploadOptions { push: false }, &NoopSink)
        .unwrap_err();

    assert_matches!(err, SddmError::GitCommand { .. });
    assert!(fx.root.join("wind/descriktor_0.json").as_std_path().exists());
    assert_eq!(leftover_temp_dirs(&fx.root), 0);
    assert_eq!(fx.git.current(), "main");
}

#[test]
fn upload_returns_to_trunk_when_push_fails() {
    let fx = fixture(&["main"]);
    write_descriptor(&fx.root, "incoming/wind", &["a.json"]);
    fx.git.state.lock().unwrap().fail_push = true;

    let err = fx
        .app
        .upload("incoming/wind", UploadOptions { push: true }, &NoopSink)
        .unwrap_err();

    assert_matches!(err, SddmError::GitCommand { .. });
    assert_eq!(fx.git.current(), "main");
}

#[test]
fn upload_validates_path() {
    let fx = fixture(&["main"]);
    write_descriptor(&fx.root, "wind", &["a.json"]);

    assert_matches!(
        fx.app.upload("wind", UploadOptions { push: false }, &NoopSink),
        Err(SddmError::InvalidPathSeparator(_))
    );
    assert_matches!(
        fx.app.upload("missing/", UploadOptions { push: false }, &NoopSink),
        Err(SddmError::InvalidDescriptorPath(_))
    );
    assert!(fx.git.calls().is_empty());
}

#[test]
fn descriptors_never_include_trunk() {
    let fx = fixture(&["sample1", "master", "sample2"]);
    let result = fx.app.descriptors(&NoopSink).unwrap();
    assert_eq!(result.trunk, "master");
    assert_eq!(result.descriptors, vec!["sample1", "sample2"]);
}

#[test]
fn download_unknown_descriptor_lists_options() {
    let fx = fixture(&["main", "wind"]);
    let err = fx
        .app
        .download("rain", "out/", false, &NoopSink)
        .unwrap_err();

    assert_matches!(err, SddmError::DescriptorNotFound { name, available } => {
        assert_eq!(name, "rain");
        assert_eq!(available, vec!["wind".to_string()]);
    });
}

#[test]
fn download_unparseable_name_is_not_found() {
    let fx = fixture(&["main", "wind"]);
    let err = fx
        .app
        .download("no such", "out/", false, &NoopSink)
        .unwrap_err();

    assert_matches!(err, SddmError::DescriptorNotFound { name, available } => {
        assert_eq!(name, "no such");
        assert_eq!(available, vec!["wind".to_string()]);
    });
    assert!(fx.git.calls().is_empty());
}

#[test]
fn download_listed_branch_with_slash() {
    let fx = fixture(&["main", "team/wind"]);
    write_descriptor(&fx.root, "team/wind", &["a.json"]);
    assert_eq!(
        fx.app.descriptors(&NoopSink).unwrap().descriptors,
        vec!["team/wind".to_string()]
    );

    let result = fx
        .app
        .download("team/wind/", "out/", false, &NoopSink)
        .unwrap();
    assert_eq!(result.name, "team/wind");
    assert_eq!(result.action, DownloadAction::Copied);
    assert!(fx.root.join("out/team/wind/a.json").as_std_path().exists());

    let result = fx.app.download("team/wind", "out/", true, &NoopSink).unwrap();
    assert_eq!(result.action, DownloadAction::Manifest);
    assert!(fx.root.join("out/team/wind.json").as_std_path().exists());
    assert_eq!(fx.git.current(), "main");
}

#[test]
fn download_trunk_is_not_a_descriptor() {
    let fx = fixture(&["main", "wind"]);
    fx.git.state.lock().unwrap().remote = vec!["main".to_string()];
    let err = fx.app.download("main", "out/", false, &NoopSink).unwrap_err();
    assert_matches!(err, SddmError::DescriptorNotFound { .. });
}

#[test]
fn download_fetches_remote_only_branch() {
    let fx = fixture(&["main"]);
    fx.git.state.lock().unwrap().remote = vec!["main".to_string(), "wind".to_string()];
    write_descriptor(&fx.root, "wind", &["a.json"]);

    let result = fx.app.download("wind", "out/", false, &NoopSink).unwrap();

    assert!(result.fetched);
    assert_eq!(result.action, DownloadAction::Copied);
    assert!(fx.root.join("out/wind/a.json").as_std_path().exists());
    let calls = fx.git.calls();
    assert_eq!(calls[0], "fetch origin wind");
    assert_eq!(calls[1], "branch --track wind origin/wind");
    assert_eq!(calls.last().unwrap(), "checkout main");
}

#[test]
fn download_json_classifies_descriptor_files() {
    let fx = fixture(&["main", "wind"]);
    write_descriptor(&fx.root, "wind", &["a.json", "b.py", "Dockerfile", "notes.txt"]);

    let result = fx.app.download("wind/", "out/", true, &NoopSink).unwrap();

    assert_eq!(result.action, DownloadAction::Manifest);
    let content = std::fs::read_to_string(fx.root.join("out/wind.json").as_std_path()).unwrap();
    let manifest: DescriptorManifest = serde_json::from_str(&content).unwrap();
    assert_eq!(manifest.name, "wind");
    assert_eq!(manifest.files, vec!["a.json"]);
    assert_eq!(manifest.pipeline, Some(vec!["b.py".to_string()]));
    assert_eq!(manifest.docker.as_deref(), Some("Dockerfile"));
    assert_eq!(
        manifest.origin.as_deref(),
        Some("https://example.org/descriptors.git")
    );
    assert_eq!(fx.git.current(), "main");
}

#[test]
fn download_without_folder_leaves_output_unchanged() {
    let fx = fixture(&["main", "wind"]);

    let result = fx.app.download("wind", "out/", false, &NoopSink).unwrap();

    assert_eq!(result.action, DownloadAction::SkippedMissing);
    let entries = std::fs::read_dir(fx.root.join("out").as_std_path())
        .unwrap()
        .count();
    assert_eq!(entries, 0);
}

#[test]
fn download_json_without_folder_restores_branch() {
    let fx = fixture(&["main", "wind"]);
    let err = fx.app.download("wind", "out/", true, &NoopSink).unwrap_err();
    assert_matches!(err, SddmError::DescriptorFolderMissing { .. });
    assert_eq!(fx.git.current(), "main");
}

#[test]
fn merge_branch_keeps_only_pipelines() {
    let fx = fixture(&["master", "sample1"]);
    fx.git.state.lock().unwrap().merge_head = true;
    std::fs::create_dir_all(fx.root.join("pipelines").as_std_path()).unwrap();

    let result = fx.app.merge_branch("sample1", &NoopSink).unwrap();

    assert!(result.committed);
    assert_eq!(result.trunk, "master");
    assert_eq!(
        fx.git.calls(),
        vec![
            "checkout master".to_string(),
            "merge sample1".to_string(),
            "restore except pipelines".to_string(),
            "add pipelines".to_string(),
            "commit Merged pipelines folder from sample1 into master".to_string(),
        ]
    );
}

#[test]
fn merge_branch_up_to_date_skips_commit() {
    let fx = fixture(&["main", "sample1"]);
    let result = fx.app.merge_branch("sample1", &NoopSink).unwrap();
    assert!(!result.committed);
    assert!(!fx.git.calls().iter().any(|call| call.starts_with("commit")));
}

#[test]
fn merge_failure_is_aborted() {
    let fx = fixture(&["main", "sample1"]);
    {
        let mut state = fx.git.state.lock().unwrap();
        state.fail_merge = true;
        state.merge_head = true;
    }
    let err = fx.app.merge_branch("sample1", &NoopSink).unwrap_err();
    assert_matches!(err, SddmError::MergeFailed { branch, .. } => assert_eq!(branch, "sample1"));
    assert!(fx.git.calls().contains(&"merge --abort".to_string()));
}

#[test]
fn merge_branches_pushes_trunk_once() {
    let fx = fixture(&["main", "sample1", "sample2"]);
    fx.git.state.lock().unwrap().merge_head = true;

    let branches = vec!["sample1".to_string(), "sample2".to_string()];
    let result = fx.app.merge_branches(&branches, true, &NoopSink).unwrap();

    assert_eq!(result.merges.len(), 2);
    assert!(result.pushed);
    let pushes: Vec<_> = fx
        .git
        .calls()
        .into_iter()
        .filter(|call| call.starts_with("push"))
        .collect();
    assert_eq!(pushes, vec!["push origin main".to_string()]);
}
