//! The process-wide server instance registry.
//!
//! The registry owns every instance: it maps opaque positive handles to
//! instance records, allocates handles in creation order and drives the
//! lifecycle. The single registry lock covers map mutation and lookup
//! (plus engine construction during create, so handle order matches
//! call order); it is never held while an instance is serving or
//! shutting down.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ServerConfig;
use crate::engine::DavEngine;
use crate::errors::{Error, Result};
use crate::instance::{ServerInstance, State};
use crate::logging;

/// Opaque identifier of a server instance at the boundary. Always
/// positive; zero and negative values are reserved for error signaling,
/// and a handle is never reused within the process lifetime.
pub type Handle = i32;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}

/// The process-wide registry backing the C interface.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

pub struct Registry {
    inner: Mutex<Inner>,
}

struct Inner {
    servers: HashMap<Handle, Arc<ServerInstance>>,
    next_handle: Handle,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            inner: Mutex::new(Inner {
                servers: HashMap::new(),
                next_handle: 1,
            }),
        }
    }

    /// Initialize logging, construct the engine and insert the instance
    /// in Created state. On any failure nothing is inserted and the
    /// handle counter does not advance, keeping handle values dense.
    pub fn create(&self, config: ServerConfig) -> Result<Handle> {
        logging::init(config.debug())?;

        let mut inner = self.inner.lock();
        let engine = DavEngine::construct(&config)?;
        let handle = inner.next_handle;
        inner.next_handle += 1;
        inner
            .servers
            .insert(handle, Arc::new(ServerInstance::new(handle, config, engine)));
        debug!("created server {handle}");
        Ok(handle)
    }

    /// Start accepting connections. Returns once the engine has
    /// committed to listening; the accept loop runs independently of
    /// the calling thread.
    pub fn start(&self, handle: Handle) -> Result<()> {
        self.lookup(handle)?.start()
    }

    /// Stop accepting connections and release the listening socket.
    /// Idempotent; the port is free for reuse once this returns.
    pub fn stop(&self, handle: Handle) -> Result<()> {
        self.lookup(handle)?.stop()
    }

    /// The instance's summary string, computed at creation time.
    pub fn info(&self, handle: Handle) -> Result<String> {
        Ok(self.lookup(handle)?.summary.clone())
    }

    /// Current lifecycle state of an instance.
    pub fn state(&self, handle: Handle) -> Result<State> {
        Ok(self.lookup(handle)?.state())
    }

    /// Per-user directory scoping is not implemented in this version:
    /// the engine fixes its user set at construction time.
    pub fn add_user(
        &self,
        _handle: Handle,
        _username: &str,
        _password: &str,
        _directory: &str,
    ) -> Result<()> {
        Err(Error::Unsupported("add_user"))
    }

    /// See [`Registry::add_user`].
    pub fn remove_user(&self, _handle: Handle, _username: &str) -> Result<()> {
        Err(Error::Unsupported("remove_user"))
    }

    /// Number of live instances.
    pub fn len(&self) -> usize {
        self.inner.lock().servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every instance still running and clear the registry. Safe
    /// to call with zero instances; shutdown errors are logged, not
    /// surfaced.
    pub fn cleanup_all(&self) {
        let drained: Vec<Arc<ServerInstance>> = {
            let mut inner = self.inner.lock();
            inner.servers.drain().map(|(_, server)| server).collect()
        };
        for server in &drained {
            if let Err(e) = server.stop() {
                warn!("cleanup: server {}: {e}", server.handle);
            }
        }
        if !drained.is_empty() {
            info!("cleaned up {} server(s)", drained.len());
        }
    }

    fn lookup(&self, handle: Handle) -> Result<Arc<ServerInstance>> {
        self.inner
            .lock()
            .servers
            .get(&handle)
            .cloned()
            .ok_or(Error::ServerNotFound(handle))
    }
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use std::path::Path;

    fn config(root: &Path) -> ServerConfig {
        ConfigBuilder::new(root)
            .address("127.0.0.1")
            .port(4918)
            .build()
            .unwrap()
    }

    #[test]
    fn handles_are_dense_and_increasing() {
        let registry = Registry::new();
        let dir = tempfile::tempdir().unwrap();
        for expected in 1..=3 {
            assert_eq!(registry.create(config(dir.path())).unwrap(), expected);
        }
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn failed_create_does_not_consume_a_handle() {
        let registry = Registry::new();
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(registry.create(config(dir.path())).unwrap(), 1);
        let err = registry
            .create(config(&dir.path().join("missing")))
            .unwrap_err();
        assert!(matches!(err, Error::HandlerInit(_)));
        assert_eq!(registry.create(config(dir.path())).unwrap(), 2);
    }

    #[test]
    fn rejected_config_issues_no_handle() {
        let registry = Registry::new();
        let dir = tempfile::tempdir().unwrap();

        // TLS without a key never reaches the registry.
        let err = ConfigBuilder::new(dir.path())
            .tls("cert.pem", "")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(registry.create(config(dir.path())).unwrap(), 1);
    }

    #[test]
    fn unknown_handles_are_not_found() {
        let registry = Registry::new();
        assert!(matches!(registry.start(42), Err(Error::ServerNotFound(42))));
        assert!(matches!(registry.stop(42), Err(Error::ServerNotFound(42))));
        assert!(matches!(registry.info(42), Err(Error::ServerNotFound(42))));
    }

    #[test]
    fn stop_is_idempotent() {
        let registry = Registry::new();
        let dir = tempfile::tempdir().unwrap();
        let handle = registry.create(config(dir.path())).unwrap();

        // never started: stopping succeeds trivially, twice
        assert!(registry.stop(handle).is_ok());
        assert!(registry.stop(handle).is_ok());
        assert_eq!(registry.state(handle).unwrap(), State::Stopped);
        // the record is still introspectable
        assert!(registry.info(handle).is_ok());
    }

    #[test]
    fn no_restart_after_stop() {
        let registry = Registry::new();
        let dir = tempfile::tempdir().unwrap();
        let handle = registry.create(config(dir.path())).unwrap();
        registry.stop(handle).unwrap();
        assert!(matches!(
            registry.start(handle),
            Err(Error::ServerNotFound(_))
        ));
    }

    #[test]
    fn user_management_is_unsupported() {
        let registry = Registry::new();
        let dir = tempfile::tempdir().unwrap();
        let handle = registry.create(config(dir.path())).unwrap();

        // same outcome for live and bogus handles
        for h in [handle, 999] {
            assert!(matches!(
                registry.add_user(h, "alice", "secret", "/srv"),
                Err(Error::Unsupported(_))
            ));
            assert!(matches!(
                registry.remove_user(h, "alice"),
                Err(Error::Unsupported(_))
            ));
        }
    }

    #[test]
    fn cleanup_clears_but_never_reuses_handles() {
        let registry = Registry::new();
        let dir = tempfile::tempdir().unwrap();
        let first = registry.create(config(dir.path())).unwrap();
        let second = registry.create(config(dir.path())).unwrap();

        registry.cleanup_all();
        assert!(registry.is_empty());
        for handle in [first, second] {
            assert!(matches!(
                registry.info(handle),
                Err(Error::ServerNotFound(_))
            ));
        }
        // the counter keeps going after cleanup
        assert_eq!(registry.create(config(dir.path())).unwrap(), 3);

        // cleanup with zero instances is fine
        registry.cleanup_all();
        registry.cleanup_all();
    }
}
