//! Server configuration.
//!
//! Configuration is resolved once at startup from three layers: built-in
//! defaults, an optional `emberserve.toml`, and CLI flags (highest
//! precedence). The resolved [`ServerConfig`] is immutable afterwards;
//! changing options means constructing a new server.
//!
//! # Example
//!
//! ```toml
//! dir = "_site"
//! port = 8080
//! live_reload = true
//! dom_diff = true
//! path_prefix = "/"
//!
//! [aliases]
//! "/img/" = "assets/images/"
//!
//! [headers]
//! "X-Served-By" = "emberserve"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::Cli;
use crate::server::pipeline::{Middleware, OnRequestHandler};

/// Default WebSocket port for the live reload channel.
pub const DEFAULT_WS_PORT: u16 = 35729;

/// TLS key/cert paths. Both must be present to enable HTTPS.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HttpsConfig {
    pub key: Option<PathBuf>,
    pub cert: Option<PathBuf>,
}

impl HttpsConfig {
    /// HTTPS is only enabled when both halves are configured.
    pub fn is_enabled(&self) -> bool {
        self.key.is_some() && self.cert.is_some()
    }
}

/// Resolved server configuration. Immutable after construction.
#[derive(Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory to serve.
    pub dir: PathBuf,

    /// HTTP port number to start binding from.
    pub port: u16,

    /// Push change notifications to connected browsers.
    pub live_reload: bool,

    /// Apply DOM patches for HTML changes instead of reloading.
    pub dom_diff: bool,

    /// Virtual folder name for injected browser scripts.
    pub injected_scripts_folder: String,

    /// Number of times to increment the port when it is in use.
    pub port_retry_budget: u16,

    /// Optional TLS material.
    pub https: HttpsConfig,

    /// Virtual base path the site is mounted under.
    /// Always normalized to `/` or `/seg/.../`.
    pub path_prefix: String,

    /// Filename that satisfies a directory request.
    pub index_file_name: String,

    /// URL prefix → filesystem source mappings. Targets are checked for
    /// existence per request, so files may appear after startup.
    pub aliases: BTreeMap<String, String>,

    /// Default headers applied to every static response.
    pub headers: BTreeMap<String, String>,

    /// Character encoding advertised for HTML responses.
    pub encoding: String,

    /// Extra paths to watch besides `dir`.
    pub watch: Vec<PathBuf>,

    /// URL-pattern → handler hooks, dispatched before everything else.
    /// Registered programmatically, not from the config file.
    #[serde(skip)]
    pub on_request: Vec<(String, OnRequestHandler)>,

    /// User middleware, run between the built-in stages in this order.
    #[serde(skip)]
    pub middleware: Vec<Middleware>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            port: 8080,
            live_reload: true,
            dom_diff: true,
            injected_scripts_folder: ".ember".to_string(),
            port_retry_budget: 10,
            https: HttpsConfig::default(),
            path_prefix: "/".to_string(),
            index_file_name: "index.html".to_string(),
            aliases: BTreeMap::new(),
            headers: BTreeMap::new(),
            encoding: "utf-8".to_string(),
            watch: Vec::new(),
            on_request: Vec::new(),
            middleware: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load from `emberserve.toml` (if present) and apply CLI overrides.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(text) => toml::from_str(&text)
                .with_context(|| format!("failed to parse {}", cli.config.display()))?,
            Err(_) => Self::default(),
        };

        if let Some(dir) = &cli.dir {
            config.dir = dir.clone();
        }
        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(prefix) = &cli.path_prefix {
            config.path_prefix = prefix.clone();
        }
        if cli.no_live_reload {
            config.live_reload = false;
        }
        if cli.no_dom_diff {
            config.dom_diff = false;
        }
        config.watch.extend(cli.watch.iter().cloned());

        config.path_prefix = normalize_path_prefix(&config.path_prefix);
        Ok(config)
    }

    /// Parse a TOML string into a config with the prefix normalized.
    /// Used by tests and embedders that bypass the CLI.
    #[allow(dead_code)]
    pub fn from_toml(text: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(text)?;
        config.path_prefix = normalize_path_prefix(&config.path_prefix);
        Ok(config)
    }

    /// Register a URL-pattern hook. Patterns support `:name` segments.
    /// Embedding surface; the CLI has no flag for it.
    #[allow(dead_code)]
    pub fn on_request(mut self, pattern: impl Into<String>, handler: OnRequestHandler) -> Self {
        self.on_request.push((pattern.into(), handler));
        self
    }

    /// Append a user middleware. Middleware run in registration order.
    /// Embedding surface; the CLI has no flag for it.
    #[allow(dead_code)]
    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// URL path that serves the reload client script.
    pub fn reload_client_url(&self) -> String {
        format!("/{}/reload-client.js", self.injected_scripts_folder)
    }

    /// URL path that serves the DOM-merge library asset.
    pub fn morph_url(&self) -> String {
        format!("/{}/morph.js", self.injected_scripts_folder)
    }

    /// Match a URL path against the alias table.
    ///
    /// Returns the mapped filesystem path only when the target exists on
    /// disk right now; otherwise resolution falls through as if no alias
    /// were configured.
    pub fn match_alias(&self, url_path: &str) -> Option<PathBuf> {
        for (prefix, source) in &self.aliases {
            if prefix.is_empty() {
                continue;
            }
            if let Some(rest) = url_path.strip_prefix(prefix.as_str()) {
                let candidate = PathBuf::from(format!("{source}{rest}"));
                if candidate.exists() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

/// Normalize a path prefix so it always starts and ends with `/`.
///
/// `/p`, `p/` and `p` all normalize to `/p/`; empty and `/` stay `/`.
pub fn normalize_path_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix == "/" {
        return "/".to_string();
    }
    let mut out = String::with_capacity(prefix.len() + 2);
    if !prefix.starts_with('/') {
        out.push('/');
    }
    out.push_str(prefix);
    if !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Absolute form of a path without requiring it to exist.
pub fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_dots(path)
    } else {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        normalize_dots(&cwd.join(path))
    }
}

/// Collapse `.` and `..` components lexically (no filesystem access, so
/// candidates that do not exist yet can still be containment-checked).
fn normalize_dots(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert!(config.live_reload);
        assert!(config.dom_diff);
        assert_eq!(config.path_prefix, "/");
        assert_eq!(config.index_file_name, "index.html");
        assert_eq!(config.injected_scripts_folder, ".ember");
        assert_eq!(config.port_retry_budget, 10);
    }

    #[test]
    fn test_from_toml() {
        let config = ServerConfig::from_toml(
            "port = 3000\nlive_reload = false\npath_prefix = \"docs\"",
        )
        .unwrap();
        assert_eq!(config.port, 3000);
        assert!(!config.live_reload);
        assert_eq!(config.path_prefix, "/docs/");
        // untouched fields keep defaults
        assert!(config.dom_diff);
    }

    #[test]
    fn test_normalize_path_prefix() {
        assert_eq!(normalize_path_prefix(""), "/");
        assert_eq!(normalize_path_prefix("/"), "/");
        assert_eq!(normalize_path_prefix("p"), "/p/");
        assert_eq!(normalize_path_prefix("/p"), "/p/");
        assert_eq!(normalize_path_prefix("p/"), "/p/");
        assert_eq!(normalize_path_prefix("/a/b/"), "/a/b/");
    }

    #[test]
    fn test_https_enabled_requires_both() {
        let mut https = HttpsConfig::default();
        assert!(!https.is_enabled());
        https.key = Some(PathBuf::from("key.pem"));
        assert!(!https.is_enabled());
        https.cert = Some(PathBuf::from("cert.pem"));
        assert!(https.is_enabled());
    }

    #[test]
    fn test_match_alias_requires_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("logo.png");
        std::fs::write(&target, b"png").unwrap();

        let mut config = ServerConfig::default();
        config.aliases.insert(
            "/img/".to_string(),
            format!("{}/", dir.path().display()),
        );

        assert_eq!(config.match_alias("/img/logo.png"), Some(target));
        // missing target falls through
        assert_eq!(config.match_alias("/img/missing.png"), None);
        // non-matching prefix falls through
        assert_eq!(config.match_alias("/css/site.css"), None);
    }

    #[test]
    fn test_normalize_dots() {
        assert_eq!(
            normalize_dots(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
    }
}
