//! Named server registry.
//!
//! Map from a name to a running [`DevServer`]. Asking for the same name
//! twice returns the already-bound instance instead of binding a second
//! socket; teardown closes and forgets it. The registry is an owned
//! value handed by reference to whoever needs one, so embedders can run
//! several independent registries in one process.

// Parts of this API exist for embedding, not the CLI.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use crate::config::ServerConfig;
use crate::server::DevServer;

#[derive(Default)]
pub struct ServerRegistry {
    servers: Mutex<BTreeMap<String, Arc<DevServer>>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the server registered under `name`, binding a new one from
    /// `config` if none exists yet. The config is only consulted on
    /// first use for a given name.
    pub fn create_or_fetch(&self, name: &str, config: ServerConfig) -> Result<Arc<DevServer>> {
        let mut servers = self.servers.lock();
        if let Some(server) = servers.get(name) {
            return Ok(Arc::clone(server));
        }
        let server = DevServer::bind(config)?;
        servers.insert(name.to_string(), Arc::clone(&server));
        Ok(server)
    }

    pub fn get(&self, name: &str) -> Option<Arc<DevServer>> {
        self.servers.lock().get(name).map(Arc::clone)
    }

    /// Close the named server and drop it from the registry.
    pub fn teardown(&self, name: &str) {
        if let Some(server) = self.servers.lock().remove(name) {
            server.close();
        }
    }

    /// Close every registered server. Used on process shutdown.
    pub fn teardown_all(&self) {
        let servers: Vec<_> = {
            let mut map = self.servers.lock();
            std::mem::take(&mut *map).into_values().collect()
        };
        for server in servers {
            server.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ServerConfig {
            dir: dir.path().to_path_buf(),
            port: 0,
            live_reload: false,
            ..ServerConfig::default()
        };
        // leak so the directory survives for the server's lifetime
        std::mem::forget(dir);
        config
    }

    #[test]
    fn test_same_name_returns_same_instance() {
        let registry = ServerRegistry::new();
        let first = registry.create_or_fetch("a", test_config()).unwrap();
        let second = registry.create_or_fetch("a", test_config()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        registry.teardown("a");
        assert!(registry.get("a").is_none());
    }

    #[test]
    fn test_distinct_names_bind_distinct_ports() {
        let registry = ServerRegistry::new();
        let one = registry.create_or_fetch("b", test_config()).unwrap();
        let two = registry.create_or_fetch("c", test_config()).unwrap();
        assert_ne!(one.port(), two.port());
        registry.teardown_all();
    }

    #[test]
    fn test_registries_are_independent() {
        let left = ServerRegistry::new();
        let right = ServerRegistry::new();
        let one = left.create_or_fetch("shared-name", test_config()).unwrap();
        let two = right.create_or_fetch("shared-name", test_config()).unwrap();
        assert!(!Arc::ptr_eq(&one, &two));
        left.teardown_all();
        right.teardown_all();
    }
}
