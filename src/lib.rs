//! ## Embedded WebDAV servers behind a C-callable interface
//!
//! This library is the management layer between a host application and
//! the [`dav-server`] WebDAV protocol engine. It lets the host create,
//! start, stop, introspect and tear down independent server instances
//! inside a single process, each with its own address, filesystem root,
//! authentication policy and TLS configuration, safely from multiple
//! threads and across a language boundary.
//!
//! The library implements no WebDAV semantics itself. HTTP method
//! dispatch, XML parsing, locking and filesystem mapping belong to the
//! engine; this crate constructs the engine, serves it, and manages the
//! lifecycle:
//!
//! - a [`Registry`] maps opaque positive integer handles to instances
//!   and allocates handles in creation order, never reusing one;
//! - every instance moves through Created → Running → Stopped, with
//!   idempotent stops and no restart (create a new instance instead);
//! - configuration is validated before any resource is committed, so a
//!   failed create consumes nothing;
//! - a process-wide log level can be changed from any thread at any
//!   time.
//!
//! ## Rust hosts
//!
//! ```no_run
//! use dav_embed::{registry, ConfigBuilder};
//!
//! let config = ConfigBuilder::new("/tmp")
//!     .address("127.0.0.1")
//!     .port(4918)
//!     .build()
//!     .unwrap();
//!
//! let handle = registry().create(config).unwrap();
//! registry().start(handle).unwrap();
//! // ... the accept loop runs on its own runtime ...
//! registry().stop(handle).unwrap();
//! registry().cleanup_all();
//! ```
//!
//! ## Foreign hosts
//!
//! The [`capi`] module exports the flat `webdav_*` function surface
//! declared in `include/dav_embed.h`, built as both a static and a
//! shared library. Handles and error codes are plain C integers;
//! strings cross the boundary either through caller-supplied buffers or
//! as explicit transfers of ownership.
//!
//! [`dav-server`]: https://crates.io/crates/dav-server

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

mod config;
mod engine;
mod errors;
mod instance;
mod logging;
mod registry;

pub mod capi;

pub use crate::config::{
    ConfigBuilder, ServerConfig, DEFAULT_ADDRESS, DEFAULT_PORT, DEFAULT_PREFIX,
};
pub use crate::errors::{Error, Result};
pub use crate::instance::State;
pub use crate::logging::{log_level, set_log_level, LogLevel};
pub use crate::registry::{registry, Handle, Registry};
