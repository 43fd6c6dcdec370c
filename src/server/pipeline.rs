//! Middleware pipeline.
//!
//! Handlers run as an ordered list folded into one pass: each returns
//! [`Flow::Continue`] to hand off to the next handler or [`Flow::Done`]
//! after finalizing the response, which short-circuits the rest of the
//! chain. Stage order is fixed:
//!
//! 1. pre-stage built-in — injected-folder assets and `on_request`
//!    URL-pattern hooks;
//! 2. user middleware, in registration order;
//! 3. post-stage built-in — the filesystem responder backed by the
//!    router, plus the custom 404 page.
//!
//! Whatever any stage produces still goes through the HTML rewrite at
//! flush time unless the body is binary.

use std::fs;

use anyhow::Result;
use rustc_hash::FxHashMap;

use crate::config::ServerConfig;
use crate::embed::{RELOAD_CLIENT_JS, ReloadClientVars};
use crate::error::ServeError;
use crate::server::intercept::InterceptedResponse;
use crate::server::router::{self, RouteDecision};
use crate::utils::mime;

/// Continuation signal returned by every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Hand off to the next handler in the chain.
    Continue,
    /// Response finalized; later handlers must not run.
    Done,
}

/// Request data visible to handlers. Per-request, never shared.
#[derive(Debug, Clone)]
pub struct RequestCtx {
    pub method: String,
    /// Path plus query string, exactly as received.
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl RequestCtx {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path component only.
    pub fn path(&self) -> &str {
        let mut path = self.url.as_str();
        for sep in ['?', '#'] {
            if let Some(idx) = path.find(sep) {
                path = &path[..idx];
            }
        }
        path
    }

    /// Client fetches (not navigations) advertise a `Sec-Fetch-Mode`
    /// other than `navigate`; those must not get the reload script.
    pub fn is_navigation(&self) -> bool {
        match self.header("Sec-Fetch-Mode") {
            Some(mode) => mode == "navigate",
            None => true,
        }
    }
}

/// User middleware: inspect the request, optionally write into the
/// response, and either continue or finalize.
pub type Middleware =
    Box<dyn Fn(&RequestCtx, &mut InterceptedResponse) -> Result<Flow> + Send + Sync>;

/// Context handed to an `on_request` hook.
#[allow(dead_code)]
pub struct OnRequestCtx<'a> {
    pub url: &'a str,
    pub pattern: &'a str,
    pub groups: FxHashMap<String, String>,
}

/// What an `on_request` hook produced. `Pass` falls through to the next
/// pattern; anything else is written directly. Only hook code (an
/// embedding surface) constructs these.
#[allow(dead_code)]
pub enum OnRequestResult {
    Pass,
    Text(String),
    Response {
        status: u16,
        headers: Vec<(String, String)>,
        body: String,
    },
}

pub type OnRequestHandler = Box<dyn Fn(&OnRequestCtx) -> OnRequestResult + Send + Sync>;

/// Run the full chain for one request.
pub fn run(
    config: &ServerConfig,
    ws_port: Option<u16>,
    ctx: &RequestCtx,
    res: &mut InterceptedResponse,
) -> Result<()> {
    if pre_stage(config, ws_port, ctx, res)? == Flow::Done {
        return Ok(());
    }

    for middleware in &config.middleware {
        if res.is_finalized() {
            return Ok(());
        }
        if middleware(ctx, res)? == Flow::Done {
            return Ok(());
        }
    }

    if !res.is_finalized() {
        post_stage(config, ctx, res)?;
    }
    Ok(())
}

/// Pre-stage built-in: `on_request` hooks, then the injected assets.
/// Always the first handler in the chain.
pub fn pre_stage(
    config: &ServerConfig,
    ws_port: Option<u16>,
    ctx: &RequestCtx,
    res: &mut InterceptedResponse,
) -> Result<Flow> {
    let path = ctx.path();

    for (pattern, handler) in &config.on_request {
        let full_pattern = mounted_pattern(pattern, config);
        let Some(groups) = match_pattern(&full_pattern, path) else {
            continue;
        };

        let hook_ctx = OnRequestCtx {
            url: &ctx.url,
            pattern,
            groups,
        };
        match handler(&hook_ctx) {
            OnRequestResult::Pass => continue,
            OnRequestResult::Text(body) => {
                res.write_text(&body);
                res.finalize();
                return Ok(Flow::Done);
            }
            OnRequestResult::Response {
                status,
                headers,
                body,
            } => {
                res.set_status(status);
                for (name, value) in headers {
                    res.set_header(&name, value);
                }
                res.write_text(&body);
                res.finalize();
                return Ok(Flow::Done);
            }
        }
    }

    if path == config.reload_client_url() {
        if config.live_reload {
            let js = RELOAD_CLIENT_JS.render(&ReloadClientVars {
                ws_port: ws_port.unwrap_or(crate::config::DEFAULT_WS_PORT),
            });
            res.set_header("Content-Type", mime::types::JAVASCRIPT);
            res.write_text(&js);
            res.finalize();
            return Ok(Flow::Done);
        }
    } else if path == config.morph_url() && config.dom_diff {
        res.set_header("Content-Type", mime::types::JAVASCRIPT);
        res.write_text(crate::embed::MORPH_JS);
        res.finalize();
        return Ok(Flow::Done);
    }

    Ok(Flow::Continue)
}

/// Post-stage built-in: the filesystem responder. Always the last
/// handler; everything unanswered ends here.
pub fn post_stage(
    config: &ServerConfig,
    ctx: &RequestCtx,
    res: &mut InterceptedResponse,
) -> Result<Flow> {
    match router::resolve(&ctx.url, config) {
        Ok(RouteDecision::File(path)) => {
            serve_file(&path, config, res)?;
        }
        Ok(RouteDecision::Redirect { status, url }) => {
            res.set_status(status);
            res.set_header("Location", url);
            res.finalize();
        }
        Ok(RouteDecision::NotFound) => {
            serve_not_found(config, res)?;
        }
        Err(ServeError::PathTraversal(path)) => {
            // Never serve outside-root content; answer with a plain 403.
            crate::log!("error"; "rejected path traversal: {}", path);
            res.set_status(403);
            res.set_header("Content-Type", mime::types::PLAIN);
            res.write_text("403 Forbidden");
            res.finalize();
        }
        Err(e) => return Err(e.into()),
    }
    Ok(Flow::Done)
}

/// Read a matched file into the response buffer. HTML is buffered as
/// text so the flush-time rewrite can see it; everything else rides the
/// binary pass-through.
fn serve_file(path: &std::path::Path, config: &ServerConfig, res: &mut InterceptedResponse) -> Result<()> {
    let content_type = mime::from_path(path);
    let bytes = fs::read(path).map_err(|e| ServeError::Io(path.to_path_buf(), e))?;

    for (name, value) in &config.headers {
        res.set_header(name, value.clone());
    }
    res.set_fallback_content_type(content_type);

    if mime::is_html(content_type) {
        if config.encoding == "utf-8" {
            res.write_text(&String::from_utf8_lossy(&bytes));
        } else {
            // Markup in another charset cannot pass through the string
            // buffer without mangling it; it rides the binary path and
            // skips the rewrite.
            res.set_header("Content-Type", mime::html_with_charset(&config.encoding));
            res.write_bytes(bytes);
        }
    } else {
        res.write_bytes(bytes);
    }

    res.finalize();
    Ok(())
}

/// 404: project-supplied `404.html` when present, plain text otherwise.
fn serve_not_found(config: &ServerConfig, res: &mut InterceptedResponse) -> Result<()> {
    res.set_status(404);

    let custom = config.dir.join("404.html");
    if custom.is_file() {
        serve_file(&custom, config, res)?;
        return Ok(());
    }

    res.set_header("Content-Type", mime::types::PLAIN);
    res.write_text("404 Not Found");
    res.finalize();
    Ok(())
}

/// Mount a hook pattern under the path prefix.
fn mounted_pattern(pattern: &str, config: &ServerConfig) -> String {
    let pattern = pattern.strip_prefix('/').unwrap_or(pattern);
    format!("{}{}", config.path_prefix, pattern)
}

/// Segment-wise URL pattern match. `:name` segments capture; everything
/// else compares literally.
fn match_pattern(pattern: &str, path: &str) -> Option<FxHashMap<String, String>> {
    let pattern_segments: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    if pattern_segments.len() != path_segments.len() {
        return None;
    }

    let mut groups = FxHashMap::default();
    for (pat, seg) in pattern_segments.iter().zip(&path_segments) {
        if let Some(name) = pat.strip_prefix(':') {
            if seg.is_empty() {
                return None;
            }
            groups.insert(name.to_string(), seg.to_string());
        } else if pat != seg {
            return None;
        }
    }
    Some(groups)
}
