//! Embedded browser assets.
//!
//! The reload client and the DOM-merge library are compiled into the
//! binary and served from the configured virtual scripts folder. The
//! client script carries a `__WS_PORT__` placeholder filled in per
//! server instance, since the notification channel binds its own port.
//!
//! # Usage
//!
//! ```ignore
//! use embed::{RELOAD_CLIENT_JS, ReloadClientVars};
//!
//! let js = RELOAD_CLIENT_JS.render(&ReloadClientVars { ws_port: 35729 });
//! ```

mod template;

pub use template::{Template, TemplateVars};

/// Variables for reload-client.js.
pub struct ReloadClientVars {
    pub ws_port: u16,
}

impl TemplateVars for ReloadClientVars {
    fn apply(&self, content: &str) -> String {
        content.replace("__WS_PORT__", &self.ws_port.to_string())
    }
}

/// Browser-side reload agent, served at `/<folder>/reload-client.js`.
pub const RELOAD_CLIENT_JS: Template<ReloadClientVars> =
    Template::new(include_str!("../client/reload-client.js"));

/// Minimal DOM-merge library, served at `/<folder>/morph.js` when DOM
/// diffing is enabled.
pub const MORPH_JS: &str = include_str!("../client/morph.js");
