#![allow(dead_code)]

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use trustree_git::{AuthRepo, Error as GitError, Result as GitResult, SignedTarget};

/// In-memory authentication repository: JSON documents and signed
/// targets keyed by commit. Counts metadata reads so tests can assert a
/// commit is never loaded twice.
pub struct FakeAuthRepo {
    name: String,
    root_dir: PathBuf,
    head: Option<String>,
    files: HashMap<(String, String), Value>,
    targets: HashMap<String, BTreeMap<String, SignedTarget>>,
    pub json_reads: Cell<usize>,
}

impl FakeAuthRepo {
    pub fn new(root_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root_dir: root_dir.into(),
            head: None,
            files: HashMap::new(),
            targets: HashMap::new(),
            json_reads: Cell::new(0),
        }
    }

    pub fn set_head(&mut self, commit: &str) {
        self.head = Some(commit.to_string());
    }

    pub fn put_json(&mut self, commit: &str, path: &str, value: Value) {
        self.files
            .insert((commit.to_string(), path.to_string()), value);
    }

    pub fn sign_target(&mut self, commit: &str, path: &str, custom: Value) {
        let custom = custom.as_object().cloned().unwrap_or_default();
        self.targets
            .entry(commit.to_string())
            .or_default()
            .insert(path.to_string(), SignedTarget { custom });
    }
}

impl AuthRepo for FakeAuthRepo {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> PathBuf {
        self.root_dir.join(&self.name)
    }

    fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn default_branch(&self) -> &str {
        "main"
    }

    fn head_commit_sha(&self) -> Option<String> {
        self.head.clone()
    }

    fn get_json(&self, commit: &str, path: &str) -> GitResult<Value> {
        self.json_reads.set(self.json_reads.get() + 1);
        self.files
            .get(&(commit.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| GitError::NoSuchRevisionPath {
                path: path.to_string(),
                commit: commit.to_string(),
            })
    }

    fn signed_targets_with_custom_data(
        &self,
        commit: &str,
        _roles: &[String],
    ) -> GitResult<BTreeMap<String, SignedTarget>> {
        Ok(self.targets.get(commit).cloned().unwrap_or_default())
    }

    fn list_files_at_revision(&self, commit: &str, dir: &str) -> GitResult<Vec<String>> {
        Err(GitError::NoSuchRevisionPath {
            path: dir.to_string(),
            commit: commit.to_string(),
        })
    }

    fn checkout_paths(&self, _commit: &str, _paths: &[String]) -> GitResult<()> {
        Ok(())
    }

    fn top_commit_of_branch(&self, _branch: &str) -> GitResult<String> {
        Err(GitError::RepositoryNotFound { path: self.path() })
    }

    fn all_commits_since_commit(&self, _since: Option<&str>) -> GitResult<Vec<String>> {
        Ok(Vec::new())
    }
}

pub fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
