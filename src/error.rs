//! Server error types.
//!
//! Routing failures and missing files never surface as errors: they resolve
//! into a `RouteDecision` status code inside the pipeline. Only conditions
//! the pipeline cannot answer locally live here.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the dev server.
#[derive(Debug, Error)]
pub enum ServeError {
    /// A decoded request path resolved outside the served directory.
    /// Mapped to 403 at the pipeline boundary, never to file content.
    #[error("request path escapes the served directory: {0}")]
    PathTraversal(String),

    /// The middleware chain finished without any handler producing or
    /// forwarding a response. Mapped to HTTP 500.
    #[error("no middleware produced a response for `{0}`")]
    PipelineContract(String),

    /// Every port in the retry budget was already bound.
    #[error("failed to bind after {attempts} attempts (ports {first}-{last}): {source}")]
    BindConflict {
        attempts: u16,
        first: u16,
        last: u16,
        #[source]
        source: std::io::Error,
    },

    /// TLS was requested but the key/cert files could not be read.
    #[error("failed to read TLS material from `{0}`")]
    TlsRead(PathBuf, #[source] std::io::Error),

    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),
}
