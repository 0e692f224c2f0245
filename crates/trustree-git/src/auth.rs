//! Authentication repository access
//!
//! An authentication repository holds signed manifests describing a set of
//! target repositories. The [`AuthRepo`] trait is the seam behind which
//! the git plumbing and the trust-verification subsystem live: everything
//! the resolution engine needs is "validated JSON content at a commit"
//! plus commit enumeration. [`GitAuthRepository`] is the git2-backed
//! implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{ObjectType, Repository};
use serde_json::{Map, Value};

use crate::repository::{GitRepository, RepositoryHandle};
use crate::{Error, Result};

/// Directory holding role metadata files inside an authentication repository
pub const METADATA_DIRECTORY_NAME: &str = "metadata";

/// Directory holding target files and manifests inside an authentication repository
pub const TARGETS_DIRECTORY_NAME: &str = "targets";

const TARGETS_ROLE: &str = "targets";

/// A single signed target entry: the custom attributes the signing
/// pipeline attached to a target path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignedTarget {
    pub custom: Map<String, Value>,
}

/// Metadata access for an authentication repository at specific revisions.
///
/// Signature checking, root-of-trust and threshold logic happen upstream;
/// implementations of this trait only surface the already-validated
/// content. The store and the lifecycle dispatcher are written against
/// this trait so tests can substitute in-memory fakes.
pub trait AuthRepo {
    /// Repository name in `namespace/name` form
    fn name(&self) -> &str;

    /// Filesystem path of the repository; also its cache identity
    fn path(&self) -> PathBuf;

    /// Root directory of the repository library this repository belongs to
    fn root_dir(&self) -> &Path;

    /// The branch updates are validated against
    fn default_branch(&self) -> &str;

    /// Current HEAD commit, or `None` when the repository does not exist
    /// or has no commits yet
    fn head_commit_sha(&self) -> Option<String>;

    /// Parsed JSON content of `path` at `commit`.
    ///
    /// Fails with [`Error::NoSuchRevisionPath`] when the object is absent
    /// at that revision and [`Error::InvalidJson`] when it exists but does
    /// not parse — callers rely on the distinction.
    fn get_json(&self, commit: &str, path: &str) -> Result<Value>;

    /// Signed target paths with their custom data for the given roles at
    /// `commit`. An empty `roles` slice means "all roles".
    fn signed_targets_with_custom_data(
        &self,
        commit: &str,
        roles: &[String],
    ) -> Result<BTreeMap<String, SignedTarget>>;

    /// Names of the files directly under `dir` at `commit`
    fn list_files_at_revision(&self, commit: &str, dir: &str) -> Result<Vec<String>>;

    /// Check out the given paths from `commit` into the working tree
    fn checkout_paths(&self, commit: &str, paths: &[String]) -> Result<()>;

    /// Tip commit of a local branch
    fn top_commit_of_branch(&self, branch: &str) -> Result<String>;

    /// All commits reachable from HEAD and not from `since`, oldest first
    fn all_commits_since_commit(&self, since: Option<&str>) -> Result<Vec<String>>;

    /// JSON summary of this repository, embedded in lifecycle hook payloads
    fn summary(&self) -> Value {
        serde_json::json!({
            "name": self.name(),
            "path": self.path(),
        })
    }
}

/// git2-backed authentication repository.
///
/// The underlying repository is opened per operation rather than held
/// open, so a handle can be constructed before the repository exists on
/// disk. Host assignments are resolved after construction and set exactly
/// once via [`GitAuthRepository::set_hosts`].
#[derive(Debug, Clone)]
pub struct GitAuthRepository {
    repo: GitRepository,
    default_branch: String,
    hosts: BTreeMap<String, Value>,
}

impl GitAuthRepository {
    pub fn new(
        root_dir: impl Into<PathBuf>,
        name: impl Into<String>,
        urls: Vec<String>,
        custom: Map<String, Value>,
    ) -> Result<Self> {
        Ok(Self {
            repo: GitRepository::new(root_dir, name, urls, custom)?,
            default_branch: "main".to_string(),
            hosts: BTreeMap::new(),
        })
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    // Inherent accessors so call sites need neither trait in scope.
    pub fn name(&self) -> &str {
        self.repo.name()
    }

    pub fn path(&self) -> PathBuf {
        self.repo.path()
    }

    pub fn root_dir(&self) -> &Path {
        self.repo.root_dir()
    }

    pub fn urls(&self) -> &[String] {
        self.repo.urls()
    }

    pub fn custom(&self) -> &Map<String, Value> {
        self.repo.custom()
    }

    /// Hosts this repository was assigned to during dependency resolution
    pub fn hosts(&self) -> &BTreeMap<String, Value> {
        &self.hosts
    }

    /// Set the resolved host assignments. Called once, post-construction.
    pub fn set_hosts(&mut self, hosts: BTreeMap<String, Value>) {
        self.hosts = hosts;
    }

    fn open(&self) -> Result<Repository> {
        let path = self.repo.path();
        Repository::open(&path).map_err(|_| Error::RepositoryNotFound { path })
    }

    fn blob_at_revision(&self, commit: &str, path: &str) -> Result<Vec<u8>> {
        let repo = self.open()?;
        let spec = format!("{commit}:{path}");
        let object = repo
            .revparse_single(&spec)
            .map_err(|_| Error::NoSuchRevisionPath {
                path: path.to_string(),
                commit: commit.to_string(),
            })?;
        let blob = object.peel_to_blob().map_err(|_| Error::NoSuchRevisionPath {
            path: path.to_string(),
            commit: commit.to_string(),
        })?;
        Ok(blob.content().to_vec())
    }

    /// Role names to read for a signed-targets query: the requested roles
    /// verbatim, or `targets` plus its delegations when none are given.
    fn roles_to_read(&self, commit: &str, roles: &[String]) -> Result<Vec<String>> {
        if !roles.is_empty() {
            return Ok(roles.to_vec());
        }
        let targets_path = format!("{METADATA_DIRECTORY_NAME}/{TARGETS_ROLE}.json");
        let document = match self.get_json(commit, &targets_path) {
            Ok(document) => document,
            Err(Error::NoSuchRevisionPath { .. } | Error::RepositoryNotFound { .. }) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        let mut names = vec![TARGETS_ROLE.to_string()];
        if let Some(delegations) = document
            .pointer("/signed/delegations/roles")
            .and_then(Value::as_array)
        {
            for role in delegations {
                if let Some(name) = role.get("name").and_then(Value::as_str) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }
}

impl RepositoryHandle for GitAuthRepository {
    fn name(&self) -> &str {
        self.repo.name()
    }

    fn root_dir(&self) -> &Path {
        self.repo.root_dir()
    }

    fn urls(&self) -> &[String] {
        self.repo.urls()
    }

    fn custom(&self) -> &Map<String, Value> {
        self.repo.custom()
    }
}

impl AuthRepo for GitAuthRepository {
    fn name(&self) -> &str {
        self.repo.name()
    }

    fn path(&self) -> PathBuf {
        self.repo.path()
    }

    fn root_dir(&self) -> &Path {
        self.repo.root_dir()
    }

    fn default_branch(&self) -> &str {
        &self.default_branch
    }

    fn head_commit_sha(&self) -> Option<String> {
        let repo = Repository::open(self.repo.path()).ok()?;
        let head = repo.head().ok()?.peel_to_commit().ok()?;
        Some(head.id().to_string())
    }

    fn get_json(&self, commit: &str, path: &str) -> Result<Value> {
        let content = self.blob_at_revision(commit, path)?;
        serde_json::from_slice(&content).map_err(|e| Error::InvalidJson {
            path: path.to_string(),
            commit: commit.to_string(),
            message: e.to_string(),
        })
    }

    fn signed_targets_with_custom_data(
        &self,
        commit: &str,
        roles: &[String],
    ) -> Result<BTreeMap<String, SignedTarget>> {
        let mut targets = BTreeMap::new();
        for role in self.roles_to_read(commit, roles)? {
            let role_path = format!("{METADATA_DIRECTORY_NAME}/{role}.json");
            let document = self.get_json(commit, &role_path)?;
            let Some(signed_targets) = document
                .pointer("/signed/targets")
                .and_then(Value::as_object)
            else {
                continue;
            };
            for (target_path, info) in signed_targets {
                let custom = info
                    .get("custom")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                targets.insert(target_path.clone(), SignedTarget { custom });
            }
        }
        Ok(targets)
    }

    fn list_files_at_revision(&self, commit: &str, dir: &str) -> Result<Vec<String>> {
        let repo = self.open()?;
        let spec = format!("{commit}:{dir}");
        let object = repo
            .revparse_single(&spec)
            .map_err(|_| Error::NoSuchRevisionPath {
                path: dir.to_string(),
                commit: commit.to_string(),
            })?;
        let tree = object.peel_to_tree().map_err(|_| Error::NoSuchRevisionPath {
            path: dir.to_string(),
            commit: commit.to_string(),
        })?;
        let mut names = Vec::new();
        for entry in tree.iter() {
            if entry.kind() == Some(ObjectType::Blob)
                && let Some(name) = entry.name()
            {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn checkout_paths(&self, commit: &str, paths: &[String]) -> Result<()> {
        tracing::debug!(
            "{}: checking out {} path(s) from revision {commit}",
            self.repo.name(),
            paths.len()
        );
        let repo = self.open()?;
        let object = repo.revparse_single(commit)?;
        let mut builder = CheckoutBuilder::new();
        builder.force();
        for path in paths {
            builder.path(path);
        }
        repo.checkout_tree(&object, Some(&mut builder))?;
        Ok(())
    }

    fn top_commit_of_branch(&self, branch: &str) -> Result<String> {
        let repo = self.open()?;
        let reference = repo.find_reference(&format!("refs/heads/{branch}"))?;
        let commit = reference.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    fn all_commits_since_commit(&self, since: Option<&str>) -> Result<Vec<String>> {
        let repo = self.open()?;
        let head = repo.head()?.peel_to_commit()?;
        let mut revwalk = repo.revwalk()?;
        revwalk.push(head.id())?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL)?;
        if let Some(since) = since {
            revwalk.hide(git2::Oid::from_str(since)?)?;
        }
        let mut commits = Vec::new();
        for oid in revwalk {
            commits.push(oid?.to_string());
        }
        commits.reverse();
        Ok(commits)
    }

    fn summary(&self) -> Value {
        serde_json::json!({
            "name": self.repo.name(),
            "path": self.repo.path(),
            "urls": self.repo.urls(),
            "default_branch": self.default_branch,
            "hosts": self.hosts,
        })
    }
}
