//! Signed manifest formats
//!
//! The four JSON manifests live at fixed paths under the authentication
//! repository's targets directory. `repositories.json` is required for a
//! commit to contribute target repositories; `mirrors.json`,
//! `dependencies.json` and `hosts.json` are optional and their absence is
//! treated as "no data". Invalid JSON in a required file propagates.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use trustree_git::{AuthRepo, Error as GitError, TARGETS_DIRECTORY_NAME};

use crate::{Error, Result};

pub const REPOSITORIES_JSON_NAME: &str = "repositories.json";
pub const MIRRORS_JSON_NAME: &str = "mirrors.json";
pub const DEPENDENCIES_JSON_NAME: &str = "dependencies.json";
pub const HOSTS_JSON_NAME: &str = "hosts.json";

pub const REPOSITORIES_JSON_PATH: &str = "targets/repositories.json";
pub const MIRRORS_JSON_PATH: &str = "targets/mirrors.json";
pub const DEPENDENCIES_JSON_PATH: &str = "targets/dependencies.json";
pub const HOSTS_JSON_PATH: &str = "targets/hosts.json";

/// One repository declaration from repositories.json or dependencies.json.
/// Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoSpec {
    #[serde(default)]
    pub urls: Option<Vec<String>>,
    #[serde(default)]
    pub custom: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoriesFile {
    pub repositories: BTreeMap<String, RepoSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MirrorsFile {
    pub mirrors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DependenciesFile {
    pub dependencies: BTreeMap<String, RepoSpec>,
}

/// One host declaration from hosts.json: the auth repos belonging to the
/// host plus arbitrary host metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostSpec {
    #[serde(default)]
    pub auth_repos: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// hosts.json: host name to declaration
pub type HostsFile = BTreeMap<String, HostSpec>;

fn parse_manifest<T: serde::de::DeserializeOwned>(
    value: Value,
    path: &str,
    commit: &str,
) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::InvalidOrMissingMetadata {
        message: format!("{path} not a valid json at revision {commit}: {e}"),
    })
}

fn metadata_error(error: GitError, path: &str, commit: &str) -> Error {
    match error {
        GitError::InvalidJson { message, .. } => Error::InvalidOrMissingMetadata {
            message: format!("{path} not a valid json at revision {commit}: {message}"),
        },
        GitError::NoSuchRevisionPath { .. } => Error::InvalidOrMissingMetadata {
            message: format!("{path} not available at revision {commit}"),
        },
        other => Error::Git(other),
    }
}

/// Read repositories.json at `commit`. Absence is tolerated (`Ok(None)`),
/// invalid JSON propagates.
pub fn load_repositories_json<A: AuthRepo>(
    auth_repo: &A,
    commit: &str,
) -> Result<Option<RepositoriesFile>> {
    match auth_repo.get_json(commit, REPOSITORIES_JSON_PATH) {
        Ok(value) => Ok(Some(parse_manifest(value, REPOSITORIES_JSON_PATH, commit)?)),
        Err(e @ GitError::NoSuchRevisionPath { .. }) => {
            tracing::debug!("Skipping commit {commit} due to: {e}");
            Ok(None)
        }
        Err(e) => Err(metadata_error(e, REPOSITORIES_JSON_PATH, commit)),
    }
}

/// Read dependencies.json at `commit`. Absence is tolerated (`Ok(None)`),
/// invalid JSON propagates.
pub fn load_dependencies_json<A: AuthRepo>(
    auth_repo: &A,
    commit: &str,
) -> Result<Option<DependenciesFile>> {
    match auth_repo.get_json(commit, DEPENDENCIES_JSON_PATH) {
        Ok(value) => Ok(Some(parse_manifest(value, DEPENDENCIES_JSON_PATH, commit)?)),
        Err(e @ GitError::NoSuchRevisionPath { .. }) => {
            tracing::debug!("Skipping commit {commit} due to: {e}");
            Ok(None)
        }
        Err(e) => Err(metadata_error(e, DEPENDENCIES_JSON_PATH, commit)),
    }
}

/// Read mirrors.json at `commit`. A missing or unusable file yields no
/// mirrors; the URLs are then expected in repositories.json.
pub fn load_mirrors_json<A: AuthRepo>(auth_repo: &A, commit: &str) -> Result<Option<Vec<String>>> {
    let value = match auth_repo.get_json(commit, MIRRORS_JSON_PATH) {
        Ok(value) => value,
        Err(GitError::NoSuchRevisionPath { .. } | GitError::InvalidJson { .. }) => {
            tracing::debug!(
                "{MIRRORS_JSON_PATH} not available at revision {commit}. \
                 Expecting to find urls in {REPOSITORIES_JSON_PATH}"
            );
            return Ok(None);
        }
        Err(e) => return Err(Error::Git(e)),
    };
    match serde_json::from_value::<MirrorsFile>(value) {
        Ok(file) => Ok(Some(file.mirrors)),
        Err(e) => {
            tracing::debug!("{MIRRORS_JSON_PATH} unusable at revision {commit}: {e}");
            Ok(None)
        }
    }
}

/// Read hosts.json at `commit`. Missing file (or a repository that is not
/// on disk at all) contributes no declarations; invalid JSON propagates.
pub fn load_hosts_json<A: AuthRepo>(auth_repo: &A, commit: &str) -> Result<Option<HostsFile>> {
    match auth_repo.get_json(commit, HOSTS_JSON_PATH) {
        Ok(value) => Ok(Some(parse_manifest(value, HOSTS_JSON_PATH, commit)?)),
        Err(GitError::NoSuchRevisionPath { .. } | GitError::RepositoryNotFound { .. }) => Ok(None),
        Err(e) => Err(metadata_error(e, HOSTS_JSON_PATH, commit)),
    }
}

/// Targets-directory-relative path helper, mirroring the manifest layout
pub fn target_path(relative: &str) -> String {
    format!("{TARGETS_DIRECTORY_NAME}/{relative}")
}
