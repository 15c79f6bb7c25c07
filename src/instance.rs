//! Per-instance lifecycle state.

use parking_lot::Mutex;

use crate::config::ServerConfig;
use crate::engine::DavEngine;
use crate::errors::{Error, Result};
use crate::registry::Handle;

/// Lifecycle states of a server instance. Destroyed is represented by
/// removal from the registry; a removed handle is never looked up
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Engine constructed, not accepting connections.
    Created,
    /// Accepting connections.
    Running,
    /// Engine shut down, resources released.
    Stopped,
}

/// One server instance, owned exclusively by the registry.
///
/// Transitions are guarded by the instance's own mutex, independent of
/// the registry lock, so that two concurrent stops observe one
/// well-defined outcome: one performs the shutdown, the other sees
/// Stopped and succeeds trivially.
pub(crate) struct ServerInstance {
    pub(crate) handle: Handle,
    pub(crate) config: ServerConfig,
    pub(crate) summary: String,
    engine: DavEngine,
    state: Mutex<State>,
}

impl ServerInstance {
    pub(crate) fn new(handle: Handle, config: ServerConfig, engine: DavEngine) -> ServerInstance {
        let summary = config.summary();
        ServerInstance {
            handle,
            config,
            summary,
            engine,
            state: Mutex::new(State::Created),
        }
    }

    pub(crate) fn state(&self) -> State {
        *self.state.lock()
    }

    /// Created → Running. Running is a no-op success. There is no
    /// restart transition: a Stopped instance is beyond its serving
    /// life and reports not found, as a removed handle would.
    pub(crate) fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            State::Running => Ok(()),
            State::Stopped => Err(Error::ServerNotFound(self.handle)),
            State::Created => {
                self.engine.start()?;
                *state = State::Running;
                info!(
                    "server {} started on {}:{}",
                    self.handle,
                    self.config.address(),
                    self.config.port()
                );
                Ok(())
            }
        }
    }

    /// Any state → Stopped, idempotently. A shutdown error is surfaced
    /// but the instance still ends up Stopped.
    pub(crate) fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            State::Created | State::Stopped => {
                *state = State::Stopped;
                Ok(())
            }
            State::Running => {
                let result = self.engine.shutdown();
                *state = State::Stopped;
                match result {
                    Ok(()) => {
                        info!("server {} stopped", self.handle);
                        Ok(())
                    }
                    Err(e) => {
                        warn!("server {} stopped with error: {e}", self.handle);
                        Err(e)
                    }
                }
            }
        }
    }
}
