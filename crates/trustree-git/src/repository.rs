//! Target repository handles

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::{Error, Result};

/// Capability contract every repository handle produced by a factory must
/// satisfy: identity and path awareness, plus the resolved fetch URLs and
/// merged custom data attached at instantiation time.
pub trait RepositoryHandle: fmt::Debug {
    /// Repository name in `namespace/name` form
    fn name(&self) -> &str;

    /// Root directory relative to which the repository path is resolved
    fn root_dir(&self) -> &Path;

    /// Filesystem path of the repository (root_dir/name)
    fn path(&self) -> PathBuf {
        self.root_dir().join(self.name())
    }

    /// Resolved fetch URLs, in mirror order
    fn urls(&self) -> &[String];

    /// Merged custom data (repository-declared overlaid by signed-target data)
    fn custom(&self) -> &Map<String, Value>;
}

/// The default target repository handle.
///
/// Immutable after construction; all fields are fixed when the repository
/// factory instantiates the handle for a (root, name, urls, custom) tuple.
#[derive(Debug, Clone)]
pub struct GitRepository {
    root_dir: PathBuf,
    name: String,
    urls: Vec<String>,
    custom: Map<String, Value>,
}

impl GitRepository {
    /// Create a handle for `root_dir/name` with the given resolved URLs and
    /// merged custom data.
    pub fn new(
        root_dir: impl Into<PathBuf>,
        name: impl Into<String>,
        urls: Vec<String>,
        custom: Map<String, Value>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
            return Err(Error::InvalidRepositoryName { name });
        }
        Ok(Self {
            root_dir: root_dir.into(),
            name,
            urls,
            custom,
        })
    }
}

impl RepositoryHandle for GitRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn urls(&self) -> &[String] {
        &self.urls
    }

    fn custom(&self) -> &Map<String, Value> {
        &self.custom
    }
}
