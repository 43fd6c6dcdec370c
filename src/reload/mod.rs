//! Live reload over WebSocket.
//!
//! ```text
//! FileWatcher -> ReloadCoordinator -> ConnectionSet -> Browser
//!   (debounce)     (classify)          (broadcast)
//! ```
//!
//! # Modules
//!
//! - `broadcast` - WebSocket client registry and fan-out
//! - `coordinator` - change classification and reload notifications
//! - `message` - wire protocol (`eleventy.*` JSON messages)
//! - `watcher` - debounced filesystem watcher

pub mod broadcast;
pub mod coordinator;
pub mod message;
pub mod watcher;

pub use broadcast::ConnectionSet;
pub use coordinator::ReloadCoordinator;
pub use message::{ReloadMessage, ReloadSubtype, TemplateEntry};
pub use watcher::FileWatcher;
