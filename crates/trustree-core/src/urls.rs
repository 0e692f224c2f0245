//! Fetch URL resolution
//!
//! A repository's fetch URLs come either from its own declaration in
//! repositories.json or from the mirror templates in mirrors.json, with
//! `{org_name}`/`{repo_name}` substituted from the repository path.

use crate::manifests::{RepoSpec, MIRRORS_JSON_PATH, REPOSITORIES_JSON_PATH};
use crate::{Error, Result};

const ORG_NAME_PLACEHOLDER: &str = "{org_name}";
const REPO_NAME_PLACEHOLDER: &str = "{repo_name}";

/// Resolve the fetch URLs for `path`.
///
/// Explicitly declared URLs are returned verbatim. Otherwise every mirror
/// template is rendered in order; this requires the path to be in
/// `org_name/repo_name` form. Missing both sources, or a malformed path,
/// is a [`Error::RepositoryInstantiation`].
pub fn resolve_urls(
    mirrors: Option<&[String]>,
    path: &str,
    spec: &RepoSpec,
) -> Result<Vec<String>> {
    if let Some(urls) = &spec.urls {
        return Ok(urls.clone());
    }

    let Some(mirrors) = mirrors else {
        return Err(Error::RepositoryInstantiation {
            path: path.to_string(),
            message: format!(
                "{MIRRORS_JSON_PATH} does not exist or is not valid and no urls of \
                 {path} specified in {REPOSITORIES_JSON_PATH}"
            ),
        });
    };

    let (org_name, repo_name) = match path.split_once('/') {
        Some((org, name)) if !org.is_empty() && !name.is_empty() && !name.contains('/') => {
            (org, name)
        }
        _ => {
            return Err(Error::RepositoryInstantiation {
                path: path.to_string(),
                message: "repository name is not in the org_name/repo_name format".to_string(),
            });
        }
    };

    Ok(mirrors
        .iter()
        .map(|mirror| {
            mirror
                .replace(ORG_NAME_PLACEHOLDER, org_name)
                .replace(REPO_NAME_PLACEHOLDER, repo_name)
        })
        .collect())
}
