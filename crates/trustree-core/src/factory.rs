//! Repository factories and class-selection policy
//!
//! The store never names a concrete handle type: it asks a
//! [`ClassPolicy`] for the factory responsible for a path and constructs
//! through it. The policy is a mapping-or-default object — an explicit
//! replacement for selecting implementation classes out of a dictionary
//! at runtime.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Map, Value};
use trustree_git::{GitAuthRepository, GitRepository, RepositoryHandle};

use crate::Result;

/// Key of the fallback entry in a per-path policy mapping
pub const DEFAULT_POLICY_KEY: &str = "default";

/// Strategy for constructing target repository handles.
///
/// Returning `Box<dyn RepositoryHandle>` makes conformance to the handle
/// contract a compile-time bound; no produced object needs re-checking.
pub trait RepositoryFactory {
    fn create(
        &self,
        root_dir: &Path,
        name: &str,
        urls: Vec<String>,
        custom: Map<String, Value>,
    ) -> Result<Box<dyn RepositoryHandle>>;
}

/// Constructs the system default handle type, [`GitRepository`]
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFactory;

impl RepositoryFactory for DefaultFactory {
    fn create(
        &self,
        root_dir: &Path,
        name: &str,
        urls: Vec<String>,
        custom: Map<String, Value>,
    ) -> Result<Box<dyn RepositoryHandle>> {
        Ok(Box::new(GitRepository::new(root_dir, name, urls, custom)?))
    }
}

static DEFAULT_FACTORY: DefaultFactory = DefaultFactory;

/// How the store selects a factory for each repository path.
#[derive(Clone, Default)]
pub enum ClassPolicy {
    /// Every path gets the system default handle type
    #[default]
    Default,
    /// A single factory is used for every path
    Single(Arc<dyn RepositoryFactory>),
    /// Per-path factories with an optional [`DEFAULT_POLICY_KEY`] fallback;
    /// paths matching neither fall back to the system default
    PerPath(HashMap<String, Arc<dyn RepositoryFactory>>),
}

impl ClassPolicy {
    /// Resolve the factory responsible for `path`.
    pub fn factory_for(&self, path: &str) -> &dyn RepositoryFactory {
        match self {
            Self::Default => &DEFAULT_FACTORY,
            Self::Single(factory) => factory.as_ref(),
            Self::PerPath(factories) => factories
                .get(path)
                .or_else(|| factories.get(DEFAULT_POLICY_KEY))
                .map(|factory| factory.as_ref())
                .unwrap_or(&DEFAULT_FACTORY),
        }
    }
}

/// Strategy for constructing nested authentication repository handles.
pub trait AuthRepositoryFactory {
    fn create(
        &self,
        root_dir: &Path,
        name: &str,
        urls: Vec<String>,
        custom: Map<String, Value>,
    ) -> Result<GitAuthRepository>;
}

/// Constructs a plain [`GitAuthRepository`] with the default branch
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAuthFactory;

impl AuthRepositoryFactory for DefaultAuthFactory {
    fn create(
        &self,
        root_dir: &Path,
        name: &str,
        urls: Vec<String>,
        custom: Map<String, Value>,
    ) -> Result<GitAuthRepository> {
        Ok(GitAuthRepository::new(root_dir, name, urls, custom)?)
    }
}
