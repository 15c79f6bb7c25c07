//! Classified failures of the registry and its boundary operations.

use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the registry, the engine adapter and the C
/// boundary. Every failure is reported synchronously to the caller of
/// the failing operation; none of them leaves a partially-constructed
/// instance reachable through a handle.
///
/// At the C boundary the variants cross as the negative integer codes
/// declared in [`crate::capi`].
#[derive(Debug)]
pub enum Error {
    /// The configuration was rejected before any resource was allocated.
    InvalidConfig(String),
    /// The logging subsystem could not be initialized.
    LoggerInit(String),
    /// The underlying engine could not be constructed or bound.
    HandlerInit(String),
    /// The handle was never issued, or the instance is beyond its
    /// serving life.
    ServerNotFound(i32),
    /// The engine reported an error while shutting down. The instance
    /// is nonetheless marked stopped.
    ShutdownFailed(String),
    /// The caller-supplied buffer cannot hold the result. Nothing was
    /// written.
    BufferTooSmall { needed: usize, capacity: usize },
    /// The capability is intentionally absent in this version.
    Unsupported(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Error::LoggerInit(msg) => write!(f, "logger init failed: {msg}"),
            Error::HandlerInit(msg) => write!(f, "handler init failed: {msg}"),
            Error::ServerNotFound(handle) => write!(f, "server {handle} not found"),
            Error::ShutdownFailed(msg) => write!(f, "shutdown failed: {msg}"),
            Error::BufferTooSmall { needed, capacity } => {
                write!(f, "buffer too small: need {needed} bytes, capacity is {capacity}")
            }
            Error::Unsupported(op) => write!(f, "{op} is not supported in this version"),
        }
    }
}

impl StdError for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failure() {
        let err = Error::InvalidConfig("port 0 out of range".to_string());
        assert_eq!(err.to_string(), "invalid config: port 0 out of range");

        let err = Error::BufferTooSmall { needed: 64, capacity: 8 };
        assert!(err.to_string().contains("need 64 bytes"));
    }
}
