//! Range requests for media seeking.
//!
//! Ranged responses stream straight from the file handle and never pass
//! through the buffered interception path: a partial body must not be
//! rewritten, and large media files should not be pulled into memory.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::Result;
use tiny_http::{Header, Request, Response, StatusCode};

use crate::error::ServeError;
use crate::utils::mime;

/// Extract the `Range` header value, if the request carries one.
pub fn range_header(request: &Request) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case("range"))
        .map(|h| h.value.to_string())
}

/// Stream a `206 Partial Content` response for one byte range.
pub fn respond_range(request: Request, path: &Path, range: &str) -> Result<()> {
    let content_type = mime::from_path(path);
    let file_size = fs::metadata(path)
        .map_err(|e| ServeError::Io(path.to_path_buf(), e))?
        .len();
    let (start, end) = parse_range(range, file_size);
    let length = end - start + 1;

    let mut file = fs::File::open(path).map_err(|e| ServeError::Io(path.to_path_buf(), e))?;
    file.seek(SeekFrom::Start(start))?;
    let reader = file.take(length);

    let content_range = format!("bytes {start}-{end}/{file_size}");
    let response = Response::new(
        StatusCode(206),
        vec![
            Header::from_bytes("Content-Type", content_type).unwrap(),
            Header::from_bytes("Content-Range", content_range.as_bytes()).unwrap(),
            Header::from_bytes("Accept-Ranges", "bytes").unwrap(),
        ],
        reader,
        Some(length as usize),
        None,
    );
    request.respond(response)?;
    Ok(())
}

/// Resolve a `Range` header value to inclusive `(start, end)` offsets.
/// Unparseable input degrades to the full file rather than erroring.
fn parse_range(range: &str, file_size: u64) -> (u64, u64) {
    let last = file_size.saturating_sub(1);
    let range = range.trim();
    let range = range.strip_prefix("bytes=").unwrap_or(range);
    let parts: Vec<&str> = range.split('-').collect();

    match parts.as_slice() {
        // "0-499"
        [s, e] if !s.is_empty() && !e.is_empty() => {
            let start: u64 = s.trim().parse().unwrap_or(0);
            let end: u64 = e.trim().parse().unwrap_or(last);
            (start.min(last), end.min(last))
        }
        // "500-" open-ended
        [s, ""] if !s.is_empty() => {
            let start: u64 = s.trim().parse().unwrap_or(0);
            (start.min(last), last)
        }
        // "-500" suffix
        ["", e] if !e.is_empty() => {
            let suffix: u64 = e.trim().parse().unwrap_or(0);
            (file_size.saturating_sub(suffix), last)
        }
        _ => (0, last),
    }
}
