//! Live-reload message protocol.
//!
//! JSON messages sent over the WebSocket to browser clients. The wire
//! names use the `eleventy.*` prefix so existing reload clients and
//! tooling that already speak this protocol keep working.
//!
//! # Message Types
//!
//! - `eleventy.status`: connection lifecycle ("connected")
//! - `eleventy.msg`: freeform log line for the browser console
//! - `eleventy.error`: server-side error, shown by the client
//! - `eleventy.reload`: content changed; carries the changed files and
//!   fresh template content for DOM patching

use serde::{Deserialize, Serialize};

/// How the client should apply a reload. `None` on the wire means the
/// default path (DOM patch or full reload); the key is omitted entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadSubtype {
    /// Only stylesheets changed; hot-swap without navigation.
    Css,
}

/// One re-rendered template: its canonical URL, the source path that
/// produced it, and the full new markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub url: String,
    #[serde(rename = "inputPath")]
    pub input_path: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildPayload {
    pub templates: Vec<TemplateEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Reload message sent over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReloadMessage {
    #[serde(rename = "eleventy.status")]
    Status { status: String },

    #[serde(rename = "eleventy.msg")]
    Msg { message: String },

    #[serde(rename = "eleventy.error")]
    Error { error: ErrorPayload },

    #[serde(rename = "eleventy.reload")]
    Reload {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtype: Option<ReloadSubtype>,
        files: Vec<String>,
        build: BuildPayload,
    },
}

impl ReloadMessage {
    /// Greeting sent to every client right after the handshake.
    pub fn connected() -> Self {
        Self::Status {
            status: "connected".to_string(),
        }
    }

    /// Shutdown notice; clients arm their reconnect listeners on it.
    pub fn disconnected() -> Self {
        Self::Status {
            status: "disconnected".to_string(),
        }
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self::Msg {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: ErrorPayload {
                message: message.into(),
            },
        }
    }

    pub fn reload(
        subtype: Option<ReloadSubtype>,
        files: Vec<String>,
        templates: Vec<TemplateEntry>,
    ) -> Self {
        Self::Reload {
            subtype,
            files,
            build: BuildPayload { templates },
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"eleventy.reload","files":[],"build":{"templates":[]}}"#.to_string()
        })
    }

    #[allow(dead_code)]
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let json = ReloadMessage::connected().to_json();
        assert_eq!(json, r#"{"type":"eleventy.status","status":"connected"}"#);
    }

    #[test]
    fn test_error_wire_format() {
        let json = ReloadMessage::error("boom").to_json();
        assert_eq!(json, r#"{"type":"eleventy.error","error":{"message":"boom"}}"#);
    }

    #[test]
    fn test_reload_wire_format() {
        let msg = ReloadMessage::reload(
            Some(ReloadSubtype::Css),
            vec!["/style.css".to_string()],
            Vec::new(),
        );
        let json = msg.to_json();
        assert!(json.contains(r#""type":"eleventy.reload""#));
        assert!(json.contains(r#""subtype":"css""#));
        assert!(json.contains(r#""files":["/style.css"]"#));
        assert!(json.contains(r#""templates":[]"#));
    }

    #[test]
    fn test_default_reload_omits_subtype_key() {
        // Clients treat a missing subtype as the default path; the key
        // never appears with a placeholder value.
        let msg = ReloadMessage::reload(None, vec!["a.html".to_string()], Vec::new());
        let json = msg.to_json();
        assert!(!json.contains("subtype"));

        let parsed = ReloadMessage::from_json(&json).unwrap();
        match parsed {
            ReloadMessage::Reload { subtype, .. } => assert_eq!(subtype, None),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_template_entry_uses_input_path_key() {
        let msg = ReloadMessage::reload(
            None,
            vec!["about.html".to_string()],
            vec![TemplateEntry {
                url: "/about/".to_string(),
                input_path: "about.html".to_string(),
                content: "<html></html>".to_string(),
            }],
        );
        let json = msg.to_json();
        assert!(json.contains(r#""inputPath":"about.html""#));
        assert!(json.contains(r#""url":"/about/""#));
    }

    #[test]
    fn test_round_trip() {
        let msg = ReloadMessage::msg("build finished");
        let parsed = ReloadMessage::from_json(&msg.to_json()).unwrap();
        match parsed {
            ReloadMessage::Msg { message } => assert_eq!(message, "build finished"),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
