//! Port binding with sequential retry.
//!
//! Both listening sockets (HTTP and the reload WebSocket) walk forward
//! from their preferred port, one port at a time, until a bind succeeds
//! or the retry budget runs out. Exhaustion reports the whole scanned
//! range plus the last OS error so the failure is diagnosable.

use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};

use tiny_http::{Server, SslConfig};

use crate::config::ServerConfig;
use crate::error::ServeError;

const BIND_INTERFACE: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Bind the HTTP (or HTTPS, when configured) server socket.
pub fn bind_http(config: &ServerConfig) -> Result<(Server, SocketAddr), ServeError> {
    let budget = config.port_retry_budget.max(1);
    let base_port = config.port;
    let mut last_error: Option<io::Error> = None;

    for offset in 0..budget {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(BIND_INTERFACE, port);

        let attempt = if config.https.is_enabled() {
            Server::https(addr, tls_config(config)?)
        } else {
            Server::http(addr)
        };

        match attempt {
            Ok(server) => {
                if offset > 0 {
                    crate::log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                let bound = server
                    .server_addr()
                    .to_ip()
                    .unwrap_or(SocketAddr::new(BIND_INTERFACE, port));
                return Ok((server, bound));
            }
            Err(e) => last_error = Some(io::Error::other(e)),
        }
    }

    Err(bind_conflict(base_port, budget, last_error))
}

/// Bind the WebSocket listener, same retry walk as the HTTP socket.
pub fn bind_ws(base_port: u16, budget: u16) -> Result<(TcpListener, u16), ServeError> {
    let budget = budget.max(1);
    let mut last_error: Option<io::Error> = None;

    for offset in 0..budget {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(SocketAddr::new(BIND_INTERFACE, port)) {
            Ok(listener) => {
                let actual = listener
                    .local_addr()
                    .map(|a| a.port())
                    .unwrap_or(port);
                return Ok((listener, actual));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(bind_conflict(base_port, budget, last_error))
}

fn bind_conflict(base_port: u16, budget: u16, last_error: Option<io::Error>) -> ServeError {
    ServeError::BindConflict {
        attempts: budget,
        first: base_port,
        last: base_port.saturating_add(budget - 1),
        source: last_error.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrInUse)),
    }
}

fn tls_config(config: &ServerConfig) -> Result<SslConfig, ServeError> {
    let key_path = config.https.key.clone().unwrap_or_default();
    let cert_path = config.https.cert.clone().unwrap_or_default();

    let private_key =
        fs::read(&key_path).map_err(|e| ServeError::TlsRead(key_path.clone(), e))?;
    let certificate =
        fs::read(&cert_path).map_err(|e| ServeError::TlsRead(cert_path.clone(), e))?;

    Ok(SslConfig {
        certificate,
        private_key,
    })
}
