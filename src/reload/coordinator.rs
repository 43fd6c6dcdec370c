//! Reload coordination.
//!
//! Turns a batch of changed files into one reload notification: classify
//! the batch (stylesheet-only or not), collect fresh markup for changed
//! HTML files, and fan the result out to every connected client. The
//! client decides locally whether to hot-swap CSS, patch the DOM, or
//! fall back to a full navigation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::reload::broadcast::ConnectionSet;
use crate::reload::message::{ReloadMessage, ReloadSubtype, TemplateEntry};
use crate::server::router;

pub struct ReloadCoordinator {
    config: Arc<ServerConfig>,
    connections: ConnectionSet,
}

impl ReloadCoordinator {
    pub fn new(config: Arc<ServerConfig>, connections: ConnectionSet) -> Self {
        Self {
            config,
            connections,
        }
    }

    /// Notify clients about a batch of changed files.
    pub fn reload_files(&self, files: &[PathBuf]) {
        let event = self.build_event(files);
        self.reload(event);
    }

    /// Broadcast a reload event after gating its templates.
    pub fn reload(&self, event: ReloadMessage) {
        self.connections.broadcast(&self.gate(event));
    }

    /// Last check before the wire: with diffing disabled every template
    /// is stripped, which makes clients fall back to a full reload; with
    /// it enabled, only templates whose source file is actually in the
    /// change batch survive. Stale entries must never reach a client.
    fn gate(&self, mut event: ReloadMessage) -> ReloadMessage {
        if let ReloadMessage::Reload {
            ref files,
            ref mut build,
            ..
        } = event
        {
            if self.config.dom_diff {
                build
                    .templates
                    .retain(|entry| files.contains(&entry.input_path));
            } else {
                build.templates.clear();
            }
        }
        event
    }

    /// Console line shown in every connected browser.
    /// Embedding surface; nothing in the CLI path generates these.
    #[allow(dead_code)]
    pub fn send_message(&self, message: impl Into<String>) {
        self.connections.broadcast(&ReloadMessage::msg(message));
    }

    /// Error surfaced in every connected browser.
    #[allow(dead_code)]
    pub fn send_error(&self, message: impl Into<String>) {
        self.connections.broadcast(&ReloadMessage::error(message));
    }

    #[allow(dead_code)]
    pub fn client_count(&self) -> usize {
        self.connections.client_count()
    }

    /// Classify a change batch and collect re-rendered templates.
    fn build_event(&self, files: &[PathBuf]) -> ReloadMessage {
        let subtype = classify(files);

        let mut templates = Vec::new();
        if subtype.is_none() && self.config.dom_diff {
            for file in files {
                if !is_html(file) {
                    continue;
                }
                let Ok(content) = fs::read_to_string(file) else {
                    // Deleted or unreadable; the client full-reloads.
                    continue;
                };
                let input_path = file.display().to_string();
                for url in router::urls_for_file(file, &self.config) {
                    templates.push(TemplateEntry {
                        url,
                        input_path: input_path.clone(),
                        content: content.clone(),
                    });
                }
            }
        }

        let files = files.iter().map(|f| f.display().to_string()).collect();
        ReloadMessage::reload(subtype, files, templates)
    }
}

/// A batch made up entirely of stylesheets hot-swaps; anything else
/// goes through the default path. An empty batch counts as all-CSS,
/// where the hot-swap is a harmless no-op.
fn classify(files: &[PathBuf]) -> Option<ReloadSubtype> {
    files
        .iter()
        .all(|f| f.extension().is_some_and(|ext| ext == "css"))
        .then_some(ReloadSubtype::Css)
}

fn is_html(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "html")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn coordinator(dir: &TempDir, dom_diff: bool) -> ReloadCoordinator {
        let config = ServerConfig {
            dir: dir.path().to_path_buf(),
            dom_diff,
            ..ServerConfig::default()
        };
        ReloadCoordinator::new(Arc::new(config), ConnectionSet::new())
    }

    #[test]
    fn test_css_only_batch_classifies_css() {
        assert_eq!(
            classify(&[PathBuf::from("/site/a.css"), PathBuf::from("/site/b.css")]),
            Some(ReloadSubtype::Css)
        );
        // vacuously all-CSS
        assert_eq!(classify(&[]), Some(ReloadSubtype::Css));
    }

    #[test]
    fn test_mixed_batch_classifies_default() {
        assert_eq!(
            classify(&[PathBuf::from("/site/a.css"), PathBuf::from("/site/b.html")]),
            None
        );
    }

    #[test]
    fn test_event_carries_templates_for_changed_html() {
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("about.html");
        fs::write(&page, "<html><body>v2</body></html>").unwrap();

        let coordinator = coordinator(&dir, true);
        let event = coordinator.build_event(&[page.clone()]);

        match event {
            ReloadMessage::Reload {
                subtype,
                files,
                build,
            } => {
                assert_eq!(subtype, None);
                assert_eq!(files, vec![page.display().to_string()]);
                // /about and /about.html style URLs both map back
                assert!(!build.templates.is_empty());
                for entry in &build.templates {
                    assert_eq!(entry.input_path, page.display().to_string());
                    assert_eq!(entry.content, "<html><body>v2</body></html>");
                }
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_css_event_has_no_templates() {
        let dir = TempDir::new().unwrap();
        let sheet = dir.path().join("style.css");
        fs::write(&sheet, "body{}").unwrap();

        let coordinator = coordinator(&dir, true);
        match coordinator.build_event(&[sheet]) {
            ReloadMessage::Reload { subtype, build, .. } => {
                assert_eq!(subtype, Some(ReloadSubtype::Css));
                assert!(build.templates.is_empty());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_gate_drops_templates_for_unchanged_files() {
        let dir = TempDir::new().unwrap();
        let coordinator = coordinator(&dir, true);

        let entry = |url: &str, input_path: &str| TemplateEntry {
            url: url.to_string(),
            input_path: input_path.to_string(),
            content: "<html></html>".to_string(),
        };
        let event = ReloadMessage::reload(
            None,
            vec!["/site/fresh.html".to_string()],
            vec![
                entry("/fresh/", "/site/fresh.html"),
                entry("/stale/", "/site/stale.html"),
            ],
        );

        match coordinator.gate(event) {
            ReloadMessage::Reload { build, .. } => {
                assert_eq!(build.templates.len(), 1);
                assert_eq!(build.templates[0].input_path, "/site/fresh.html");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_dom_diff_gate_strips_templates() {
        let dir = TempDir::new().unwrap();
        let page = dir.path().join("index.html");
        fs::write(&page, "<html></html>").unwrap();

        let coordinator = coordinator(&dir, false);
        match coordinator.build_event(&[page.clone()]) {
            ReloadMessage::Reload { build, .. } => assert!(build.templates.is_empty()),
            other => panic!("unexpected message: {other:?}"),
        }

        // even a handcrafted event loses its templates at the gate
        let event = ReloadMessage::reload(
            None,
            vec![page.display().to_string()],
            vec![TemplateEntry {
                url: "/".to_string(),
                input_path: page.display().to_string(),
                content: "<html></html>".to_string(),
            }],
        );
        match coordinator.gate(event) {
            ReloadMessage::Reload { build, .. } => assert!(build.templates.is_empty()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_deleted_file_still_listed() {
        let dir = TempDir::new().unwrap();
        let gone = dir.path().join("gone.html");

        let coordinator = coordinator(&dir, true);
        match coordinator.build_event(&[gone.clone()]) {
            ReloadMessage::Reload { files, build, .. } => {
                assert_eq!(files, vec![gone.display().to_string()]);
                assert!(build.templates.is_empty());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
