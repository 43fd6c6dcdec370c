//! URL to filesystem path resolution.
//!
//! Implements the trailing-slash conventions for static sites:
//!
//! * `resource.html` exists: `/resource` matches, `/resource/` redirects
//!   to `/resource`.
//! * `resource/index.html` exists: `/resource` redirects to `/resource/`,
//!   `/resource/` matches.
//! * both exist: `/resource` serves `resource.html`, `/resource/` serves
//!   the index; no redirect is issued.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

use crate::config::{ServerConfig, absolute_path};
use crate::error::ServeError;

/// Outcome of resolving a request URL against the served directory.
///
/// Produced fresh per request; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// 200 with the file to serve.
    File(PathBuf),
    /// 301/302 to a normalized URL.
    Redirect { status: u16, url: String },
    /// Nothing matched.
    NotFound,
}

impl RouteDecision {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::File(_) => 200,
            Self::Redirect { status, .. } => *status,
            Self::NotFound => 404,
        }
    }
}

/// Map a request URL to a file-serving decision.
///
/// Pure function over filesystem state; the only failure mode is a
/// decoded path escaping the served directory.
pub fn resolve(request_url: &str, config: &ServerConfig) -> Result<RouteDecision, ServeError> {
    // Only the path component participates in routing.
    let mut url = request_url;
    for sep in ['?', '#'] {
        if let Some(idx) = url.find(sep) {
            url = &url[..idx];
        }
    }

    // Mount-point handling: requests to `/` redirect into the prefix,
    // anything outside it is a 404, and the prefix is stripped before
    // file resolution (keeping the leading slash).
    if config.path_prefix != "/" {
        if url == "/" {
            return Ok(RouteDecision::Redirect {
                status: 302,
                url: config.path_prefix.clone(),
            });
        }
        match url.strip_prefix(config.path_prefix.as_str()) {
            Some(rest) => {
                return resolve_local(&format!("/{rest}"), url, config);
            }
            None => return Ok(RouteDecision::NotFound),
        }
    }

    resolve_local(url, url, config)
}

/// Resolve a prefix-stripped path. `public_url` is the original path used
/// to build redirect targets (prefix re-added for free, it was never
/// stripped from it).
fn resolve_local(
    url: &str,
    public_url: &str,
    config: &ServerConfig,
) -> Result<RouteDecision, ServeError> {
    let raw_path = served_file_path(url, None, config)?;
    if exists_as_file(&raw_path) {
        return Ok(RouteDecision::File(raw_path));
    }

    let index_path = served_file_path(url, Some(&config.index_file_name), config)?;
    let index_exists = index_path.exists();

    let html_path = served_file_path(url, Some(".html"), config)?;
    let html_exists = html_path.exists();

    let trailing_slash = url.ends_with('/');

    // /resource/ => /resource/index.html
    if index_exists && trailing_slash {
        return Ok(RouteDecision::File(index_path));
    }
    // /resource => resource.html
    if html_exists && !trailing_slash {
        return Ok(RouteDecision::File(html_path));
    }
    // /resource => redirect to /resource/
    if index_exists && !trailing_slash {
        return Ok(RouteDecision::Redirect {
            status: 301,
            url: format!("{public_url}/"),
        });
    }
    // /resource/ => redirect to /resource
    if html_exists && trailing_slash {
        return Ok(RouteDecision::Redirect {
            status: 301,
            url: public_url[..public_url.len() - 1].to_string(),
        });
    }

    Ok(RouteDecision::NotFound)
}

/// Compute the filesystem candidate for a URL path, with containment
/// checks.
///
/// `filename` distinguishes the three candidate shapes:
/// * `None` — the direct request; the only shape aliases apply to.
/// * `Some(".html")` — the extensionless candidate (`/res` → `res.html`).
/// * `Some(name)` — the index candidate (`/res/` → `res/<name>`).
pub fn served_file_path(
    url: &str,
    filename: Option<&str>,
    config: &ServerConfig,
) -> Result<PathBuf, ServeError> {
    let decoded = percent_decode_str(url)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| url.to_string());

    let computed = match filename {
        Some(".html") => {
            let trimmed = decoded.trim_end_matches('/');
            config.dir.join(format!("{}.html", trimmed.trim_start_matches('/')))
        }
        Some(name) => config
            .dir
            .join(decoded.trim_start_matches('/'))
            .join(name),
        None => config.dir.join(decoded.trim_start_matches('/')),
    };

    // Aliases may legitimately point outside the served directory, but
    // never outside the process working directory.
    if filename.is_none() {
        if let Some(alias_target) = config.match_alias(&decoded) {
            let cwd = absolute_path(Path::new("."));
            if !absolute_path(&alias_target).starts_with(&cwd) {
                return Err(ServeError::PathTraversal(decoded));
            }
            return Ok(alias_target);
        }
    }

    let served_root = absolute_path(&config.dir);
    if !absolute_path(&computed).starts_with(&served_root) {
        return Err(ServeError::PathTraversal(decoded));
    }

    Ok(computed)
}

fn exists_as_file(path: &Path) -> bool {
    path.exists() && !path.is_dir()
}

/// Invert the resolution conventions: the URLs that could legitimately
/// serve `path`.
///
/// `dir/index.html` maps to `/dir/index.html` and `/dir/`;
/// `dir/name.html` maps to `/dir/name.html` and `/dir/name`. The reload
/// coordinator uses this to target DOM patches at the right live page,
/// so it must mirror [`resolve`] exactly.
pub fn urls_for_file(path: &Path, config: &ServerConfig) -> Vec<String> {
    let rel = match path.strip_prefix(&config.dir) {
        Ok(rel) => rel,
        Err(_) => return Vec::new(),
    };

    // Mounted under the prefix, mirroring what resolve() strips off.
    let mut url = config.path_prefix.clone();
    url.push_str(&rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"));

    let mut urls = vec![url.clone()];

    let index_suffix = format!("/{}", config.index_file_name);
    if url.ends_with(&index_suffix) {
        urls.push(url[..url.len() - config.index_file_name.len()].to_string());
    } else if let Some(stripped) = url.strip_suffix(".html") {
        urls.push(stripped.to_string());
    }

    urls
}
