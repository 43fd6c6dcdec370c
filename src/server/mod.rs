//! Development HTTP server with live reload.

pub mod binder;
pub mod inject;
pub mod intercept;
pub mod pipeline;
pub mod range;
pub mod router;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Result;
use crossbeam::channel;
use parking_lot::Mutex;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use crate::config::ServerConfig;
use crate::log;
use crate::reload::{ConnectionSet, FileWatcher, ReloadCoordinator};
use crate::server::intercept::{Body, InterceptedResponse};
use crate::server::pipeline::RequestCtx;
use crate::server::router::RouteDecision;

/// A bound development server. Construction binds both sockets (HTTP
/// and, with live reload enabled, the WebSocket listener); [`run`]
/// starts the blocking request loop; [`close`] shuts everything down
/// and is safe to call from any thread, any number of times.
///
/// [`run`]: DevServer::run
/// [`close`]: DevServer::close
pub struct DevServer {
    config: Arc<ServerConfig>,
    http: Arc<Server>,
    addr: SocketAddr,
    ws_port: Option<u16>,
    coordinator: Arc<ReloadCoordinator>,
    connections: ConnectionSet,
    running: Arc<AtomicBool>,
    ws_acceptor: Mutex<Option<JoinHandle<()>>>,
    watcher: Mutex<Option<FileWatcher>>,
    watch_pump: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl DevServer {
    /// Bind the server sockets without starting the request loop.
    pub fn bind(config: ServerConfig) -> Result<Arc<Self>> {
        let (http, addr) = binder::bind_http(&config)?;
        let running = Arc::new(AtomicBool::new(true));
        let connections = ConnectionSet::new();

        let mut ws_port = None;
        let mut ws_acceptor = None;
        if config.live_reload {
            let (listener, port) =
                binder::bind_ws(crate::config::DEFAULT_WS_PORT, config.port_retry_budget)?;
            let handle = connections.spawn_acceptor(listener, Arc::clone(&running))?;
            crate::debug!("reload"; "ws://localhost:{}", port);
            ws_port = Some(port);
            ws_acceptor = Some(handle);
        }

        let config = Arc::new(config);
        let coordinator = Arc::new(ReloadCoordinator::new(
            Arc::clone(&config),
            connections.clone(),
        ));

        Ok(Arc::new(Self {
            config,
            http: Arc::new(http),
            addr,
            ws_port,
            coordinator,
            connections,
            running,
            ws_acceptor: Mutex::new(ws_acceptor),
            watcher: Mutex::new(None),
            watch_pump: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }

    #[allow(dead_code)]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    #[allow(dead_code)]
    pub fn ws_port(&self) -> Option<u16> {
        self.ws_port
    }

    /// Embedding surface: push custom messages or errors to clients.
    #[allow(dead_code)]
    pub fn coordinator(&self) -> &Arc<ReloadCoordinator> {
        &self.coordinator
    }

    /// Browser-facing URL for the bound server.
    pub fn local_url(&self) -> String {
        let scheme = if self.config.https.is_enabled() {
            "https"
        } else {
            "http"
        };
        format!("{}://localhost:{}{}", scheme, self.port(), self.config.path_prefix)
    }

    /// Start watching and run the request loop. Blocks until [`close`]
    /// is called.
    ///
    /// [`close`]: DevServer::close
    pub fn run(self: &Arc<Self>) -> Result<()> {
        if self.config.live_reload {
            self.start_watcher()?;
        }

        log!("serve"; "{}", self.local_url());

        // Requests are handled off the accept thread so one slow
        // response cannot stall the rest.
        let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build()?;

        for request in self.http.incoming_requests() {
            if !self.running.load(Ordering::Relaxed) {
                let _ = request.respond(Response::empty(StatusCode(503)));
                continue;
            }
            let server = Arc::clone(self);
            pool.spawn(move || {
                if let Err(e) = server.handle_request(request) {
                    log!("serve"; "request error: {e}");
                }
            });
        }

        // unblock() ends incoming_requests; finish draining the pool
        // before joining the acceptor.
        drop(pool);
        if let Some(handle) = self.ws_acceptor.lock().take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn start_watcher(self: &Arc<Self>) -> Result<()> {
        let mut paths: Vec<PathBuf> = vec![self.config.dir.clone()];
        paths.extend(self.config.watch.iter().cloned());

        let (batch_tx, batch_rx) = channel::unbounded::<Vec<PathBuf>>();
        let watcher = FileWatcher::start(&paths, batch_tx)?;

        let coordinator = Arc::clone(&self.coordinator);
        let pump = std::thread::spawn(move || {
            while let Ok(batch) = batch_rx.recv() {
                log!("watch"; "{} file(s) changed", batch.len());
                coordinator.reload_files(&batch);
            }
        });

        *self.watcher.lock() = Some(watcher);
        *self.watch_pump.lock() = Some(pump);
        Ok(())
    }

    /// Shut down: tell connected clients, close the WebSocket side,
    /// unblock the request loop, stop watching. Repeat calls are no-ops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        log!("serve"; "shutting down");

        self.connections
            .broadcast(&crate::reload::ReloadMessage::disconnected());
        self.running.store(false, Ordering::Relaxed);
        self.connections.close_all();
        self.http.unblock();

        // Dropping the watcher disconnects its channels; the pump
        // thread ends once the batch sender is gone.
        *self.watcher.lock() = None;
        if let Some(pump) = self.watch_pump.lock().take() {
            let _ = pump.join();
        }
    }

    fn handle_request(&self, request: Request) -> Result<()> {
        let ctx = RequestCtx {
            method: request.method().to_string(),
            url: request.url().to_string(),
            headers: request
                .headers()
                .iter()
                .map(|h| (h.field.as_str().as_str().to_string(), h.value.to_string()))
                .collect(),
        };

        // Ranged requests stream straight from disk; buffering a media
        // seek would defeat the point.
        if ctx.method != "HEAD" {
            if let Some(range_value) = ctx.header("Range").map(str::to_string) {
                if let Ok(RouteDecision::File(path)) = router::resolve(&ctx.url, &self.config) {
                    return range::respond_range(request, &path, &range_value);
                }
            }
        }

        let mut res = InterceptedResponse::new();
        pipeline::run(&self.config, self.ws_port, &ctx, &mut res)?;

        let inject_script =
            self.config.live_reload && ctx.method != "HEAD" && ctx.is_navigation();
        let config = Arc::clone(&self.config);
        let sendable = res.into_sendable(ctx.path(), move |html| {
            if inject_script {
                inject::augment_html(html, &config)
            } else {
                html
            }
        });
        let (status, headers, body) = match sendable {
            Ok(parts) => parts,
            Err(e) => return send_error_page(request, &e.into()),
        };

        crate::debug!("serve"; "{} {} -> {}", ctx.method, ctx.url, status);
        send(request, status, headers, body)
    }
}

/// Last-resort 500 page for failures past the pipeline boundary.
fn send_error_page(request: Request, error: &anyhow::Error) -> Result<()> {
    let detail = format!("{error:#}");
    let msg = crate::utils::html::escape(&detail);
    let body = format!(
        "<html><head><title>Error</title></head><body><h1>Internal Error</h1><pre>{msg}</pre></body></html>",
    );
    let response = Response::from_data(body.into_bytes())
        .with_status_code(StatusCode(500))
        .with_header(
            Header::from_bytes("Content-Type", crate::utils::mime::types::HTML).unwrap(),
        );
    request.respond(response)?;
    Ok(())
}

/// Flush a buffered response over tiny_http. `Content-Length` comes
/// from the body length tiny_http already knows; forwarding our own
/// copy would duplicate the header.
fn send(
    request: Request,
    status: u16,
    headers: Vec<(String, String)>,
    body: Body,
) -> Result<()> {
    let is_head = request.method() == &Method::Head;

    let tiny_headers: Vec<Header> = headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("Content-Length"))
        .filter_map(|(name, value)| Header::from_bytes(name.as_bytes(), value.as_bytes()).ok())
        .collect();

    if is_head {
        let mut response = Response::empty(StatusCode(status));
        for header in tiny_headers {
            response = response.with_header(header);
        }
        request.respond(response)?;
        return Ok(());
    }

    let data = match body {
        Body::Empty => Vec::new(),
        Body::Text(s) => s.into_bytes(),
        Body::Binary(b) => b,
    };
    let mut response = Response::from_data(data).with_status_code(StatusCode(status));
    for header in tiny_headers {
        response = response.with_header(header);
    }
    request.respond(response)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use tempfile::TempDir;

    fn fixture(files: &[(&str, &str)]) -> (TempDir, ServerConfig) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
        }
        let config = ServerConfig {
            dir: dir.path().to_path_buf(),
            port: 0,
            // tests run in parallel and all start the WS walk from the
            // same default port
            port_retry_budget: 32,
            ..ServerConfig::default()
        };
        (dir, config)
    }

    fn start(config: ServerConfig) -> (Arc<DevServer>, std::thread::JoinHandle<()>) {
        let server = DevServer::bind(config).unwrap();
        let runner = Arc::clone(&server);
        let handle = std::thread::spawn(move || {
            runner.run().unwrap();
        });
        (server, handle)
    }

    fn raw_request(port: u16, request: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream.write_all(request.as_bytes()).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    fn get(port: u16, path: &str) -> String {
        raw_request(
            port,
            &format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
        )
    }

    #[test]
    fn test_serves_html_with_reload_script() {
        let (_dir, config) = fixture(&[("index.html", "<html><head></head><body>hi</body></html>")]);
        let (server, handle) = start(config);

        let response = get(server.port(), "/");
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("reload-client.js"));
        assert!(response.contains("hi"));

        server.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_fetch_mode_skips_injection() {
        let (_dir, config) = fixture(&[("index.html", "<html><head></head></html>")]);
        let (server, handle) = start(config);

        let response = raw_request(
            server.port(),
            "GET / HTTP/1.1\r\nHost: localhost\r\nSec-Fetch-Mode: cors\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(!response.contains("reload-client.js"));

        server.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_head_request_has_no_body() {
        let (_dir, config) = fixture(&[("index.html", "<html>page</html>")]);
        let (server, handle) = start(config);

        let response = raw_request(
            server.port(),
            "HEAD / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(!response.contains("page"));

        server.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_range_request_streams_partial() {
        let (_dir, config) = fixture(&[("data.bin", "0123456789")]);
        let (server, handle) = start(config);

        let response = raw_request(
            server.port(),
            "GET /data.bin HTTP/1.1\r\nHost: localhost\r\nRange: bytes=2-5\r\nConnection: close\r\n\r\n",
        );
        assert!(response.starts_with("HTTP/1.1 206"));
        assert!(response.contains("Content-Range: bytes 2-5/10"));
        assert!(response.ends_with("2345"));

        server.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_slow_middleware_response_is_awaited() {
        let (_dir, config) = fixture(&[]);
        let config = config.with_middleware(Box::new(|_, res| {
            std::thread::sleep(std::time::Duration::from_millis(100));
            res.set_header("Content-Type", "text/plain");
            res.write_text("eventually");
            res.finalize();
            Ok(crate::server::pipeline::Flow::Done)
        }));
        let (server, handle) = start(config);

        let response = get(server.port(), "/anything");
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("eventually"));

        server.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_missing_path_is_404() {
        let (_dir, config) = fixture(&[]);
        let (server, handle) = start(config);

        let response = get(server.port(), "/nothing-here");
        assert!(response.starts_with("HTTP/1.1 404"));

        server.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_middleware_html_also_gets_injected() {
        let (_dir, config) = fixture(&[]);
        let config = config.with_middleware(Box::new(|_, res| {
            res.set_header("Content-Type", "text/html");
            res.write_text("<html><head></head><body>generated</body></html>");
            res.finalize();
            Ok(crate::server::pipeline::Flow::Done)
        }));
        let (server, handle) = start(config);

        let response = get(server.port(), "/generated");
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("generated"));
        assert!(response.contains("reload-client.js"));

        server.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_middleware_done_without_response_is_500() {
        let (_dir, config) = fixture(&[]);
        let config = config.with_middleware(Box::new(|_, _| {
            // claims to have answered but wrote nothing
            Ok(crate::server::pipeline::Flow::Done)
        }));
        let (server, handle) = start(config);

        let response = get(server.port(), "/");
        assert!(response.starts_with("HTTP/1.1 500"));
        assert!(response.contains("Internal Error"));

        server.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_dir, config) = fixture(&[]);
        let (server, handle) = start(config);

        server.close();
        server.close();
        handle.join().unwrap();
    }

    #[test]
    fn test_live_reload_disabled_skips_ws() {
        let (_dir, mut config) = fixture(&[("index.html", "<html><head></head></html>")]);
        config.live_reload = false;
        let (server, handle) = start(config);

        assert!(server.ws_port().is_none());
        let response = get(server.port(), "/");
        assert!(!response.contains("reload-client.js"));

        server.close();
        handle.join().unwrap();
    }
}
