//! Commit-indexed repository store
//!
//! The store resolves and caches the repository graph an authentication
//! repository describes: plain targets from repositories.json and nested
//! authentication repositories from dependencies.json, each indexed by
//! (auth repo path, commit). A commit is loaded at most once — repeated
//! update validation over long commit windows must not re-read metadata.
//!
//! The store is an owned object handed to every resolution call. It has
//! no concurrency guard: one writer per store, per the single-writer
//! update model.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use trustree_git::{AuthRepo, GitAuthRepository, RepositoryHandle};

use crate::custom::{is_subset, merge_custom};
use crate::factory::{AuthRepositoryFactory, ClassPolicy, DefaultAuthFactory};
use crate::hosts::resolve_hosts;
use crate::manifests::{self, HostsFile, REPOSITORIES_JSON_PATH};
use crate::urls::resolve_urls;
use crate::{Error, Result};

const REPOSITORIES_KIND: &str = "Repositories";
const DEPENDENCIES_KIND: &str = "Included authentication repositories";

type CommitIndexed<T> = HashMap<PathBuf, HashMap<String, BTreeMap<String, T>>>;

/// Options for [`RepositoryStore::load_repositories`].
#[derive(Clone, Default)]
pub struct LoadOptions {
    /// Handle-type selection per path
    pub policy: ClassPolicy,
    /// Root directory target paths are resolved against; defaults to the
    /// auth repo's library root
    pub root_dir: Option<PathBuf>,
    /// When set, repositories declared in repositories.json but not backed
    /// by a signed target are skipped entirely
    pub only_load_targets: bool,
    /// Commits to load; defaults to `[HEAD]`
    pub commits: Option<Vec<String>>,
    /// Roles whose signed targets select the repositories to load. A
    /// non-empty list forces `only_load_targets`.
    pub roles: Vec<String>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self {
            only_load_targets: true,
            ..Self::default()
        }
    }
}

/// Options for [`RepositoryStore::load_dependencies`].
#[derive(Clone)]
pub struct DependencyLoadOptions {
    /// Constructor for nested authentication repository handles
    pub factory: Arc<dyn AuthRepositoryFactory>,
    /// Root directory dependency paths are resolved against; defaults to
    /// the auth repo's library root
    pub root_dir: Option<PathBuf>,
    /// Commits to load; defaults to `[HEAD]`
    pub commits: Option<Vec<String>>,
    /// Host declarations inherited from ancestor authentication
    /// repositories, oldest ancestor first
    pub ancestor_hosts: Vec<HostsFile>,
}

impl Default for DependencyLoadOptions {
    fn default() -> Self {
        Self {
            factory: Arc::new(DefaultAuthFactory),
            root_dir: None,
            commits: None,
            ancestor_hosts: Vec::new(),
        }
    }
}

/// Commit-indexed cache of resolved repository graphs.
///
/// Targets and dependencies are held in two independent maps with the
/// same key structure; a path may in principle appear in both files and
/// the two never merge.
#[derive(Debug, Default)]
pub struct RepositoryStore {
    repositories: CommitIndexed<Box<dyn RepositoryHandle>>,
    dependencies: CommitIndexed<GitAuthRepository>,
}

impl RepositoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve and cache the target repositories declared at `commits`.
    ///
    /// Commits already present for this auth repo are skipped, whatever
    /// options the earlier load used. A commit with no usable
    /// repositories.json is recorded as an empty entry so it is never
    /// re-read. A failing repository aborts the whole commit's pass: the
    /// entry stays empty rather than partially populated.
    pub fn load_repositories<A: AuthRepo>(
        &mut self,
        auth_repo: &A,
        options: LoadOptions,
    ) -> Result<()> {
        let Some(commits) = resolve_commits(
            auth_repo,
            options.commits.clone(),
            "cannot load target repositories",
        ) else {
            return Ok(());
        };

        tracing::debug!(
            "Loading {}'s target repositories at revisions {}",
            auth_repo.path().display(),
            commits.join(", ")
        );

        let root_dir = options
            .root_dir
            .clone()
            .unwrap_or_else(|| auth_repo.root_dir().to_path_buf());
        let only_load_targets = options.only_load_targets || !options.roles.is_empty();

        let by_commit = self.repositories.entry(auth_repo.path()).or_default();

        for commit in &commits {
            if by_commit.contains_key(commit) {
                continue;
            }
            // Recorded up front: the commit counts as visited even when
            // repositories.json is absent or the pass below fails.
            by_commit.insert(commit.clone(), BTreeMap::new());

            let Some(declared) = manifests::load_repositories_json(auth_repo, commit)? else {
                continue;
            };
            let mirrors = manifests::load_mirrors_json(auth_repo, commit)?;
            let targets = auth_repo.signed_targets_with_custom_data(commit, &options.roles)?;

            let mut loaded: BTreeMap<String, Box<dyn RepositoryHandle>> = BTreeMap::new();
            for (path, spec) in &declared.repositories {
                let target = targets.get(path);
                if target.is_none() && only_load_targets {
                    continue;
                }
                let urls = resolve_urls(mirrors.as_deref(), path, spec)?;
                let custom = merge_custom(&spec.custom, target.map(|t| &t.custom));
                let handle = options
                    .policy
                    .factory_for(path)
                    .create(&root_dir, path, urls, custom)
                    .map_err(|e| instantiation_error(auth_repo, &root_dir, path, e))?;
                loaded.insert(path.clone(), handle);
            }

            tracing::debug!(
                "Loaded the following repositories at revision {}: {}",
                commit,
                joined_keys(&loaded)
            );
            by_commit.insert(commit.clone(), loaded);
        }
        Ok(())
    }

    /// Resolve and cache the nested authentication repositories declared
    /// at `commits`, attaching the host set each one resolves to from the
    /// ancestor declarations, the parent's hosts.json and its own
    /// hosts.json at the commit.
    pub fn load_dependencies<A: AuthRepo>(
        &mut self,
        auth_repo: &A,
        options: DependencyLoadOptions,
    ) -> Result<()> {
        let Some(commits) = resolve_commits(
            auth_repo,
            options.commits.clone(),
            "cannot load included authentication repositories",
        ) else {
            return Ok(());
        };

        tracing::debug!(
            "Loading {}'s included authentication repositories at revisions {}",
            auth_repo.path().display(),
            commits.join(", ")
        );

        let root_dir = options
            .root_dir
            .clone()
            .unwrap_or_else(|| auth_repo.root_dir().to_path_buf());

        let by_commit = self.dependencies.entry(auth_repo.path()).or_default();

        for commit in &commits {
            if by_commit.contains_key(commit) {
                continue;
            }
            by_commit.insert(commit.clone(), BTreeMap::new());

            let Some(declared) = manifests::load_dependencies_json(auth_repo, commit)? else {
                continue;
            };
            let mirrors = manifests::load_mirrors_json(auth_repo, commit)?;

            let mut declarations = options.ancestor_hosts.clone();
            if let Some(own) = manifests::load_hosts_json(auth_repo, commit)? {
                declarations.push(own);
            }

            let mut loaded: BTreeMap<String, GitAuthRepository> = BTreeMap::new();
            for (path, spec) in &declared.dependencies {
                let urls = resolve_urls(mirrors.as_deref(), path, spec)?;
                let custom = merge_custom(&spec.custom, None);
                let mut nested = options
                    .factory
                    .create(&root_dir, path, urls, custom)
                    .map_err(|e| instantiation_error(auth_repo, &root_dir, path, e))?;

                // The parent's commit sha means nothing inside the nested
                // repository; its own declarations are read at its head,
                // when it exists on disk at all.
                let mut nested_declarations = declarations.clone();
                if let Some(head) = nested.head_commit_sha()
                    && let Some(own) = manifests::load_hosts_json(&nested, &head)?
                {
                    nested_declarations.push(own);
                }
                let hosts = resolve_hosts(nested.name(), &nested_declarations);
                nested.set_hosts(hosts);
                loaded.insert(path.clone(), nested);
            }

            tracing::debug!(
                "Loaded the following contained authentication repositories at revision {}: {}",
                commit,
                joined_keys(&loaded)
            );
            by_commit.insert(commit.clone(), loaded);
        }
        Ok(())
    }

    /// The exact target map stored for `commit` (HEAD when omitted).
    pub fn get_repositories<A: AuthRepo>(
        &self,
        auth_repo: &A,
        commit: Option<&str>,
    ) -> Result<&BTreeMap<String, Box<dyn RepositoryHandle>>> {
        at_commit(&self.repositories, auth_repo, commit, REPOSITORIES_KIND)
    }

    /// The exact dependency map stored for `commit` (HEAD when omitted).
    pub fn get_auth_repositories<A: AuthRepo>(
        &self,
        auth_repo: &A,
        commit: Option<&str>,
    ) -> Result<&BTreeMap<String, GitAuthRepository>> {
        at_commit(&self.dependencies, auth_repo, commit, DEPENDENCIES_KIND)
    }

    /// Single-path lookup; `None` when the path is absent from an
    /// otherwise loaded commit.
    pub fn get_repository<A: AuthRepo>(
        &self,
        auth_repo: &A,
        path: &str,
        commit: Option<&str>,
    ) -> Result<Option<&dyn RepositoryHandle>> {
        Ok(self
            .get_repositories(auth_repo, commit)?
            .get(path)
            .map(|handle| handle.as_ref()))
    }

    /// Single-path dependency lookup; `None` when the path is absent from
    /// an otherwise loaded commit.
    pub fn get_auth_repository<A: AuthRepo>(
        &self,
        auth_repo: &A,
        path: &str,
        commit: Option<&str>,
    ) -> Result<Option<&GitAuthRepository>> {
        Ok(self.get_auth_repositories(auth_repo, commit)?.get(path))
    }

    /// Overlay the target maps of `commits` in the given order; later
    /// commits overwrite earlier entries at the same path. Pass commits
    /// oldest first for latest-wins semantics.
    pub fn get_deduplicated_repositories<A: AuthRepo>(
        &self,
        auth_repo: &A,
        commits: &[String],
    ) -> Result<BTreeMap<String, &dyn RepositoryHandle>> {
        tracing::debug!(
            "Auth repo {}: getting a deduplicated list of repositories",
            auth_repo.path().display()
        );
        Ok(
            deduplicated(&self.repositories, auth_repo, commits, REPOSITORIES_KIND)?
                .into_iter()
                .map(|(path, handle)| (path, handle.as_ref()))
                .collect(),
        )
    }

    /// Overlay the dependency maps of `commits` in the given order; later
    /// commits overwrite earlier entries at the same path.
    pub fn get_deduplicated_auth_repositories<A: AuthRepo>(
        &self,
        auth_repo: &A,
        commits: &[String],
    ) -> Result<BTreeMap<String, &GitAuthRepository>> {
        tracing::debug!(
            "Auth repo {}: getting a deduplicated list of included authentication repositories",
            auth_repo.path().display()
        );
        deduplicated(&self.dependencies, auth_repo, commits, DEPENDENCIES_KIND)
    }

    /// Loaded repositories whose merged custom data contains `filter` as
    /// a subset. An empty filter matches everything; zero matches is a
    /// hard failure so callers treat "nothing matched" and "bad query"
    /// identically.
    pub fn get_repositories_by_custom_data<A: AuthRepo>(
        &self,
        auth_repo: &A,
        commit: Option<&str>,
        filter: &Map<String, Value>,
    ) -> Result<Vec<&dyn RepositoryHandle>> {
        tracing::debug!(
            "Auth repo {}: finding repositories by custom data {filter:?}",
            auth_repo.path().display()
        );
        let repositories = self.get_repositories(auth_repo, commit)?;
        let found: Vec<&dyn RepositoryHandle> = repositories
            .values()
            .filter(|handle| filter.is_empty() || is_subset(filter, handle.custom()))
            .map(|handle| handle.as_ref())
            .collect();
        if found.is_empty() {
            tracing::error!(
                "Auth repo {}: repositories associated with custom data {filter:?} not found",
                auth_repo.path().display()
            );
            return Err(Error::RepositoriesNotFound {
                message: format!("Repositories associated with custom data {filter:?} not found"),
            });
        }
        Ok(found)
    }

    /// True when at least one loaded commit holds at least one repository.
    pub fn repositories_loaded<A: AuthRepo>(&self, auth_repo: &A) -> bool {
        self.repositories
            .get(&auth_repo.path())
            .is_some_and(|by_commit| by_commit.values().any(|loaded| !loaded.is_empty()))
    }

    /// Drop every cached target graph. Intended for isolation between
    /// independent resolution runs.
    pub fn clear_repositories(&mut self) {
        self.repositories.clear();
    }

    /// Drop every cached dependency graph.
    pub fn clear_dependencies(&mut self) {
        self.dependencies.clear();
    }
}

/// Declared repository paths at `commit` (HEAD when omitted) whose merged
/// custom data contains `filter` as a subset. Reads the declared set from
/// repositories.json, independent of any store state.
pub fn get_repositories_paths_by_custom_data<A: AuthRepo>(
    auth_repo: &A,
    commit: Option<&str>,
    filter: &Map<String, Value>,
) -> Result<Vec<String>> {
    let commit = match commit {
        Some(commit) => commit.to_string(),
        None => auth_repo.head_commit_sha().ok_or_else(|| Error::RepositoriesNotFound {
            message: format!(
                "Authentication repository {} does not have a head commit",
                auth_repo.path().display()
            ),
        })?,
    };
    tracing::debug!(
        "Auth repo {}: finding paths of repositories by custom data {filter:?}",
        auth_repo.path().display()
    );
    let declared = manifests::load_repositories_json(auth_repo, &commit)?.ok_or_else(|| {
        Error::InvalidOrMissingMetadata {
            message: format!("{REPOSITORIES_JSON_PATH} not available at revision {commit}"),
        }
    })?;
    let targets = auth_repo.signed_targets_with_custom_data(&commit, &[])?;

    let paths: Vec<String> = declared
        .repositories
        .iter()
        .filter(|(path, spec)| {
            filter.is_empty()
                || is_subset(
                    filter,
                    &merge_custom(&spec.custom, targets.get(*path).map(|t| &t.custom)),
                )
        })
        .map(|(path, _)| path.clone())
        .collect();

    if paths.is_empty() {
        tracing::error!(
            "Auth repo {}: repositories associated with custom data {filter:?} not found",
            auth_repo.path().display()
        );
        return Err(Error::RepositoriesNotFound {
            message: format!("Repositories associated with custom data {filter:?} not found"),
        });
    }
    Ok(paths)
}

/// Commits to load: the explicit list, or `[HEAD]`. `None` means the
/// repository does not exist yet — logged, not an error.
fn resolve_commits<A: AuthRepo>(
    auth_repo: &A,
    commits: Option<Vec<String>>,
    cannot: &str,
) -> Option<Vec<String>> {
    match commits {
        Some(commits) => Some(commits),
        None => match auth_repo.head_commit_sha() {
            Some(head) => Some(vec![head]),
            None => {
                tracing::info!("Authentication repository does not exist - {cannot}");
                None
            }
        },
    }
}

fn instantiation_error<A: AuthRepo>(
    auth_repo: &A,
    root_dir: &std::path::Path,
    path: &str,
    error: Error,
) -> Error {
    tracing::error!(
        "Auth repo {}: an error occurred while instantiating repository {}: {}",
        auth_repo.path().display(),
        path,
        error
    );
    match error {
        already @ Error::RepositoryInstantiation { .. } => already,
        other => Error::RepositoryInstantiation {
            path: root_dir.join(path).display().to_string(),
            message: other.to_string(),
        },
    }
}

fn at_commit<'a, T, A: AuthRepo>(
    map: &'a CommitIndexed<T>,
    auth_repo: &A,
    commit: Option<&str>,
    kind: &str,
) -> Result<&'a BTreeMap<String, T>> {
    let all = map
        .get(&auth_repo.path())
        .ok_or_else(|| never_loaded(auth_repo, kind))?;
    let commit = match commit {
        Some(commit) => commit.to_string(),
        None => auth_repo
            .head_commit_sha()
            .ok_or_else(|| never_loaded(auth_repo, kind))?,
    };
    let loaded = all
        .get(&commit)
        .ok_or_else(|| never_loaded_at(auth_repo, &commit, kind))?;
    tracing::debug!(
        "Auth repo {}: found the following at revision {}: {}",
        auth_repo.path().display(),
        commit,
        joined_keys(loaded)
    );
    Ok(loaded)
}

fn deduplicated<'a, T, A: AuthRepo>(
    map: &'a CommitIndexed<T>,
    auth_repo: &A,
    commits: &[String],
    kind: &str,
) -> Result<BTreeMap<String, &'a T>> {
    let all = map
        .get(&auth_repo.path())
        .ok_or_else(|| never_loaded(auth_repo, kind))?;
    let mut deduplicated = BTreeMap::new();
    for commit in commits {
        let loaded = all
            .get(commit)
            .ok_or_else(|| never_loaded_at(auth_repo, commit, kind))?;
        for (path, handle) in loaded {
            // later commits overwrite earlier entries at the same path
            deduplicated.insert(path.clone(), handle);
        }
    }
    Ok(deduplicated)
}

fn never_loaded<A: AuthRepo>(auth_repo: &A, kind: &str) -> Error {
    let message = format!(
        "{kind} defined in authentication repository {} have not been loaded",
        auth_repo.path().display()
    );
    tracing::error!("{message}");
    Error::RepositoriesNotFound { message }
}

fn never_loaded_at<A: AuthRepo>(auth_repo: &A, commit: &str, kind: &str) -> Error {
    let message = format!(
        "{kind} defined in authentication repository {} at revision {commit} have not been loaded",
        auth_repo.path().display()
    );
    tracing::error!("{message}");
    Error::RepositoriesNotFound { message }
}

fn joined_keys<T>(map: &BTreeMap<String, T>) -> String {
    map.keys().cloned().collect::<Vec<_>>().join(", ")
}
