//! WebSocket client registry and fan-out.
//!
//! Connections live in a shared mutex-guarded list. Broadcast walks the
//! list with `retain_mut`, dropping any client whose socket errors, so a
//! closed browser tab disappears on the next send instead of poisoning
//! later fan-outs.

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tungstenite::protocol::Message;
use tungstenite::WebSocket;

use crate::reload::message::ReloadMessage;

#[derive(Clone, Default)]
pub struct ConnectionSet {
    clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Perform the handshake and register the client. Every accepted
    /// client is greeted with the connected status message first.
    pub fn accept(&self, stream: TcpStream) {
        match tungstenite::accept(stream) {
            Ok(mut ws) => {
                let greeting = ReloadMessage::connected().to_json();
                if let Err(e) = ws.send(Message::Text(greeting.into())) {
                    crate::log!("reload"; "failed to greet client: {}", e);
                    return;
                }
                let mut clients = self.clients.lock();
                clients.push(ws);
                crate::debug!("reload"; "client connected (total: {})", clients.len());
            }
            Err(e) => {
                crate::log!("reload"; "handshake failed: {}", e);
            }
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Send a message to every connected client, pruning dead sockets.
    ///
    /// The list is drained up front so the lock is never held during a
    /// network write; one client with a full send buffer must not stall
    /// the acceptor or other broadcasters. Clients accepted while the
    /// sends are in flight get the next message.
    pub fn broadcast(&self, msg: &ReloadMessage) {
        let payload = msg.to_json();
        let mut snapshot = std::mem::take(&mut *self.clients.lock());

        if snapshot.is_empty() {
            crate::debug!("reload"; "no clients connected");
            return;
        }

        let before = snapshot.len();
        snapshot.retain_mut(|ws| match ws.send(Message::Text(payload.clone().into())) {
            Ok(_) => true,
            Err(e) => {
                crate::debug!("reload"; "client disconnected: {}", e);
                false
            }
        });
        crate::debug!("reload"; "broadcast to {} clients", before);
        self.clients.lock().append(&mut snapshot);
    }

    /// Close every connection. Used during shutdown; send failures are
    /// irrelevant at that point.
    pub fn close_all(&self) {
        let mut clients = std::mem::take(&mut *self.clients.lock());
        for ws in &mut clients {
            let _ = ws.close(None);
            let _ = ws.flush();
        }
    }

    /// Run the accept loop on a background thread until `running` drops.
    /// The listener polls non-blocking so the thread can observe the
    /// shutdown flag.
    pub fn spawn_acceptor(
        &self,
        listener: TcpListener,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>> {
        listener.set_nonblocking(true)?;
        let set = self.clone();

        Ok(thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        crate::debug!("reload"; "incoming connection: {}", addr);
                        // Handshake needs blocking reads.
                        let _ = stream.set_nonblocking(false);
                        set.accept(stream);
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(100));
                    }
                    Err(e) => {
                        crate::log!("reload"; "accept error: {}", e);
                        thread::sleep(Duration::from_millis(100));
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::binder;
    use tungstenite::client::connect;

    fn start_server() -> (ConnectionSet, u16, Arc<AtomicBool>, JoinHandle<()>) {
        let (listener, port) = binder::bind_ws(0, 1).unwrap();
        let set = ConnectionSet::new();
        let running = Arc::new(AtomicBool::new(true));
        let handle = set.spawn_acceptor(listener, Arc::clone(&running)).unwrap();
        (set, port, running, handle)
    }

    #[test]
    fn test_client_greeted_on_connect() {
        let (set, port, running, handle) = start_server();

        let (mut ws, _) = connect(format!("ws://127.0.0.1:{port}")).unwrap();
        let greeting = ws.read().unwrap();
        assert_eq!(
            greeting.to_text().unwrap(),
            r#"{"type":"eleventy.status","status":"connected"}"#
        );

        running.store(false, Ordering::Relaxed);
        let _ = ws.close(None);
        handle.join().unwrap();
        drop(set);
    }

    #[test]
    fn test_broadcast_reaches_client() {
        let (set, port, running, handle) = start_server();

        let (mut ws, _) = connect(format!("ws://127.0.0.1:{port}")).unwrap();
        let _ = ws.read().unwrap(); // greeting

        // Wait for the acceptor thread to register the client.
        for _ in 0..50 {
            if set.client_count() == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(set.client_count(), 1);

        set.broadcast(&ReloadMessage::msg("hello"));
        let received = ws.read().unwrap();
        assert!(received.to_text().unwrap().contains("hello"));

        running.store(false, Ordering::Relaxed);
        let _ = ws.close(None);
        handle.join().unwrap();
    }

    #[test]
    fn test_clients_survive_consecutive_broadcasts() {
        let (set, port, running, handle) = start_server();

        let (mut ws, _) = connect(format!("ws://127.0.0.1:{port}")).unwrap();
        let _ = ws.read().unwrap(); // greeting
        for _ in 0..50 {
            if set.client_count() == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(set.client_count(), 1);

        // the send path drains and re-registers; a healthy client must
        // stay on the list and receive every message
        set.broadcast(&ReloadMessage::msg("first"));
        assert_eq!(set.client_count(), 1);
        set.broadcast(&ReloadMessage::msg("second"));
        assert_eq!(set.client_count(), 1);

        assert!(ws.read().unwrap().to_text().unwrap().contains("first"));
        assert!(ws.read().unwrap().to_text().unwrap().contains("second"));

        running.store(false, Ordering::Relaxed);
        let _ = ws.close(None);
        handle.join().unwrap();
    }

    #[test]
    fn test_close_all_empties_registry() {
        let (set, port, running, handle) = start_server();

        let (mut ws, _) = connect(format!("ws://127.0.0.1:{port}")).unwrap();
        let _ = ws.read().unwrap();
        for _ in 0..50 {
            if set.client_count() == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        set.close_all();
        assert_eq!(set.client_count(), 0);

        running.store(false, Ordering::Relaxed);
        handle.join().unwrap();
    }
}
