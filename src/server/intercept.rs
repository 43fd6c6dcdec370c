//! Response interception.
//!
//! Every request gets an [`InterceptedResponse`]: an owned decorator over
//! the eventual transport response. Pipeline stages write status, headers
//! and body into it; nothing touches the wire until the server flushes
//! the finished value. Deferring the flush is what makes the HTML rewrite
//! possible — the injected script changes `Content-Length`, so headers
//! cannot be sent before the body is final.
//!
//! Text writes accumulate in a string buffer and are eligible for the
//! HTML transform. Binary writes switch the body to raw bytes which are
//! forwarded untouched, preserving correct behavior for non-text content.

use crate::error::ServeError;
use crate::utils::mime;

/// Buffered response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Empty,
    Text(String),
    Binary(Vec<u8>),
}

impl Body {
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Text(s) => s.len(),
            Self::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decorator over the outbound response. Owns its own buffer and a
/// finalize-once flag; the underlying transport object is never touched
/// until the server flushes this value.
#[derive(Debug)]
pub struct InterceptedResponse {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: Body,
    /// Content type to fall back to when no explicit header was set
    /// (extension-based lookup by the static responder).
    fallback_content_type: Option<&'static str>,
    finalized: bool,
}

impl Default for InterceptedResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptedResponse {
    pub fn new() -> Self {
        Self {
            status: None,
            headers: Vec::new(),
            body: Body::Empty,
            fallback_content_type: None,
            finalized: false,
        }
    }

    pub fn status(&self) -> u16 {
        self.status.unwrap_or(200)
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = Some(status);
    }

    /// Set a header, replacing any earlier value for the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        for (existing, existing_value) in &mut self.headers {
            if existing.eq_ignore_ascii_case(name) {
                *existing_value = value;
                return;
            }
        }
        self.headers.push((name.to_string(), value));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Append text to the buffered body. A binary body stays binary;
    /// interleaving text into a byte stream would corrupt it.
    pub fn write_text(&mut self, chunk: &str) {
        match &mut self.body {
            Body::Text(buffer) => buffer.push_str(chunk),
            Body::Empty => self.body = Body::Text(chunk.to_string()),
            Body::Binary(buffer) => buffer.extend_from_slice(chunk.as_bytes()),
        }
    }

    /// Replace the body with raw bytes (pass-through path, no transform).
    pub fn write_bytes(&mut self, bytes: Vec<u8>) {
        match &mut self.body {
            Body::Binary(buffer) => buffer.extend_from_slice(&bytes),
            _ => self.body = Body::Binary(bytes),
        }
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Replace pending content wholesale. Later pipeline stages may use
    /// this right up until the response is flushed.
    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    pub fn set_fallback_content_type(&mut self, content_type: &'static str) {
        self.fallback_content_type = Some(content_type);
    }

    /// Mark the response as produced. The first call wins; repeated calls
    /// report `false` so callers can treat them as a no-op instead of
    /// double-sending.
    pub fn finalize(&mut self) -> bool {
        if self.finalized {
            return false;
        }
        self.finalized = true;
        true
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// The most specific content type known: an explicit header set by
    /// the pipeline wins over the extension-based fallback.
    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type").or(self.fallback_content_type)
    }

    /// Finish the response: run the HTML transform when (and only when)
    /// the content type is `text/html` and the body is buffered text,
    /// then fix up `Content-Length`.
    ///
    /// A chain that produced neither headers nor body is a pipeline
    /// contract violation — someone must produce or forward a response.
    pub fn into_sendable(
        mut self,
        request_path: &str,
        transform_html: impl FnOnce(String) -> String,
    ) -> Result<(u16, Vec<(String, String)>, Body), ServeError> {
        if self.status.is_none() && self.headers.is_empty() && self.body.is_empty() {
            return Err(ServeError::PipelineContract(request_path.to_string()));
        }

        let is_html = self.content_type().is_some_and(mime::is_html);
        let body = std::mem::replace(&mut self.body, Body::Empty);
        self.body = match body {
            Body::Text(text) if is_html => {
                let transformed = transform_html(text);
                self.set_header("Content-Length", transformed.len().to_string());
                Body::Text(transformed)
            }
            other => other,
        };

        if self.header("Content-Length").is_none() {
            self.set_header("Content-Length", self.body.len().to_string());
        }
        if self.header("Content-Type").is_none() {
            if let Some(fallback) = self.fallback_content_type {
                self.set_header("Content-Type", fallback);
            }
        }

        Ok((self.status(), self.headers, self.body))
    }
}
