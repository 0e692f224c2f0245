//! Repository graph resolution for signed authentication repositories
//!
//! This crate turns the signed manifests of an authentication repository
//! into usable repository handles, implementing:
//!
//! - **Manifest loading**: repositories.json, dependencies.json,
//!   mirrors.json and hosts.json read at specific commits
//! - **RepositoryStore**: commit-indexed cache of resolved target
//!   repositories and nested authentication repositories
//! - **URL and custom-data resolution**: mirror template rendering and
//!   declaration/signed-target merging
//! - **Host resolution**: union of host declarations across the
//!   authentication repository hierarchy
//! - **Lifecycle dispatch**: hook scripts executed per repo, host and
//!   update event with transient/persistent state threading
//!
//! # Architecture
//!
//! `trustree-core` sits above the git access layer:
//!
//! ```text
//!        callers (updater, tooling)
//!                    |
//!              trustree-core
//!                    |
//!               trustree-git
//! ```

pub mod custom;
pub mod error;
pub mod factory;
pub mod hosts;
pub mod lifecycle;
pub mod manifests;
pub mod store;
pub mod urls;

pub use custom::{is_subset, merge_custom};
pub use error::{Error, Result};
pub use factory::{
    AuthRepositoryFactory, ClassPolicy, DefaultAuthFactory, DefaultFactory, RepositoryFactory,
    DEFAULT_POLICY_KEY,
};
pub use hosts::resolve_hosts;
pub use lifecycle::{
    handle_host_event, handle_repo_event, handle_update_event, CommitsData, Event, HookSettings,
    LifecycleStage, PERSISTENT_FILE_NAME,
};
pub use manifests::{
    HostSpec, HostsFile, RepoSpec, DEPENDENCIES_JSON_PATH, HOSTS_JSON_PATH, MIRRORS_JSON_PATH,
    REPOSITORIES_JSON_PATH,
};
pub use store::{
    get_repositories_paths_by_custom_data, DependencyLoadOptions, LoadOptions, RepositoryStore,
};
pub use urls::resolve_urls;
