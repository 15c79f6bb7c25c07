//! The C-callable boundary.
//!
//! Symbol-for-symbol counterpart of `include/dav_embed.h`. Errors cross
//! as small negative integers; success is zero, or the handle itself
//! for creation. No textual messages cross the boundary in this
//! version.
//!
//! Two string disciplines exist for results. `webdav_get_server_info`
//! writes into a caller-supplied buffer and returns the written length,
//! refusing with [`WEBDAV_ERROR_BUFFER_TOO_SMALL`] (and writing
//! nothing) when the summary plus its NUL terminator does not fit.
//! `webdav_get_version` transfers ownership of an allocated string to
//! the caller, who must release it with `webdav_free_string` exactly
//! once; releasing twice, or releasing memory this library did not
//! allocate, is undefined and is the caller's obligation to avoid.
//!
//! A panic must never unwind into foreign frames, so every entry point
//! is wrapped in `catch_unwind`.

use std::ffi::{CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use libc::{c_char, c_int};

use crate::config::ConfigBuilder;
use crate::errors::Error;
use crate::logging::{set_log_level, LogLevel};
use crate::registry::{registry, Handle};

pub const WEBDAV_SUCCESS: c_int = 0;
pub const WEBDAV_ERROR_INVALID_CONFIG: c_int = -1;
pub const WEBDAV_ERROR_LOGGER_INIT: c_int = -2;
pub const WEBDAV_ERROR_HANDLER_INIT: c_int = -3;
pub const WEBDAV_ERROR_SERVER_NOT_FOUND: c_int = -1;
pub const WEBDAV_ERROR_SHUTDOWN_FAILED: c_int = -2;
pub const WEBDAV_ERROR_BUFFER_TOO_SMALL: c_int = -2;
pub const WEBDAV_ERROR_UNSUPPORTED: c_int = -1;

pub const WEBDAV_LOG_DEBUG: c_int = 0;
pub const WEBDAV_LOG_INFO: c_int = 1;
pub const WEBDAV_LOG_WARN: c_int = 2;
pub const WEBDAV_LOG_ERROR: c_int = 3;

/// Borrow an optional C string. Null means absent; the bytes must be
/// valid UTF-8.
unsafe fn optional_str(ptr: *const c_char) -> Result<Option<String>, Error> {
    if ptr.is_null() {
        return Ok(None);
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Ok(Some(s.to_string())),
        Err(_) => Err(Error::InvalidConfig(
            "string arguments must be valid UTF-8".to_string(),
        )),
    }
}

unsafe fn required_str(ptr: *const c_char, what: &str) -> Result<String, Error> {
    optional_str(ptr)?.ok_or_else(|| Error::InvalidConfig(format!("{what} must not be null")))
}

#[allow(clippy::too_many_arguments)]
unsafe fn create_server_inner(
    address: *const c_char,
    port: c_int,
    directory: *const c_char,
    username: *const c_char,
    password: *const c_char,
    tls: c_int,
    cert_file: *const c_char,
    key_file: *const c_char,
    prefix: *const c_char,
    no_password: c_int,
    behind_proxy: c_int,
    debug: c_int,
) -> Result<Handle, Error> {
    if !(1..=65535).contains(&port) {
        return Err(Error::InvalidConfig(format!("port {port} out of range")));
    }
    let address = required_str(address, "address")?;
    let directory = required_str(directory, "directory")?;
    let username = optional_str(username)?;
    let password = optional_str(password)?;
    let cert = optional_str(cert_file)?;
    let key = optional_str(key_file)?;
    let prefix = optional_str(prefix)?.unwrap_or_default();

    let mut builder = ConfigBuilder::new(directory)
        .address(address)
        .port(port as u16)
        .prefix(prefix)
        .no_password(no_password != 0)
        .behind_proxy(behind_proxy != 0)
        .debug(debug != 0);
    if let (Some(username), Some(password)) = (username, password) {
        builder = builder.credentials(username, password);
    }
    if tls != 0 {
        builder = builder.tls(cert.unwrap_or_default(), key.unwrap_or_default());
    }

    registry().create(builder.build()?)
}

/// Create a server instance. Returns a positive handle, or
/// [`WEBDAV_ERROR_INVALID_CONFIG`], [`WEBDAV_ERROR_LOGGER_INIT`] or
/// [`WEBDAV_ERROR_HANDLER_INIT`]. A failed create issues no handle and
/// leaves the registry unchanged.
///
/// # Safety
///
/// Every string argument must be null or point to a NUL-terminated
/// string that stays valid for the duration of the call.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn webdav_create_server(
    address: *const c_char,
    port: c_int,
    directory: *const c_char,
    username: *const c_char,
    password: *const c_char,
    tls: c_int,
    cert_file: *const c_char,
    key_file: *const c_char,
    prefix: *const c_char,
    no_password: c_int,
    behind_proxy: c_int,
    debug: c_int,
) -> c_int {
    let result = catch_unwind(AssertUnwindSafe(|| {
        create_server_inner(
            address,
            port,
            directory,
            username,
            password,
            tls,
            cert_file,
            key_file,
            prefix,
            no_password,
            behind_proxy,
            debug,
        )
    }));
    match result {
        Ok(Ok(handle)) => handle,
        Ok(Err(err)) => {
            warn!("create server failed: {err}");
            match err {
                Error::InvalidConfig(_) => WEBDAV_ERROR_INVALID_CONFIG,
                Error::LoggerInit(_) => WEBDAV_ERROR_LOGGER_INIT,
                _ => WEBDAV_ERROR_HANDLER_INIT,
            }
        }
        Err(_) => WEBDAV_ERROR_HANDLER_INIT,
    }
}

/// Start a created server. Returns [`WEBDAV_SUCCESS`] once the instance
/// is accepting connections, [`WEBDAV_ERROR_SERVER_NOT_FOUND`] for an
/// unknown or already-stopped handle, or [`WEBDAV_ERROR_HANDLER_INIT`]
/// when the listener cannot be bound.
#[no_mangle]
pub extern "C" fn webdav_start_server(server_id: c_int) -> c_int {
    match catch_unwind(AssertUnwindSafe(|| registry().start(server_id))) {
        Ok(Ok(())) => WEBDAV_SUCCESS,
        Ok(Err(Error::ServerNotFound(_))) => WEBDAV_ERROR_SERVER_NOT_FOUND,
        Ok(Err(err)) => {
            warn!("start server {server_id} failed: {err}");
            WEBDAV_ERROR_HANDLER_INIT
        }
        Err(_) => WEBDAV_ERROR_HANDLER_INIT,
    }
}

/// Stop a server. Idempotent: stopping an already-stopped or
/// never-started instance returns [`WEBDAV_SUCCESS`]. On
/// [`WEBDAV_ERROR_SHUTDOWN_FAILED`] the instance is nonetheless marked
/// stopped and its port released as far as the engine allows.
#[no_mangle]
pub extern "C" fn webdav_stop_server(server_id: c_int) -> c_int {
    match catch_unwind(AssertUnwindSafe(|| registry().stop(server_id))) {
        Ok(Ok(())) => WEBDAV_SUCCESS,
        Ok(Err(Error::ServerNotFound(_))) => WEBDAV_ERROR_SERVER_NOT_FOUND,
        Ok(Err(_)) | Err(_) => WEBDAV_ERROR_SHUTDOWN_FAILED,
    }
}

unsafe fn get_server_info_inner(
    server_id: c_int,
    info_buffer: *mut c_char,
    buffer_size: c_int,
) -> Result<c_int, Error> {
    let info = registry().info(server_id)?;
    let bytes = info.as_bytes();
    let capacity = if buffer_size > 0 { buffer_size as usize } else { 0 };
    // The summary plus its NUL terminator must fit; nothing is written
    // otherwise.
    if info_buffer.is_null() || bytes.len() >= capacity {
        return Err(Error::BufferTooSmall {
            needed: bytes.len() + 1,
            capacity,
        });
    }
    ptr::copy_nonoverlapping(bytes.as_ptr(), info_buffer as *mut u8, bytes.len());
    *info_buffer.add(bytes.len()) = 0;
    Ok(bytes.len() as c_int)
}

/// Copy the instance summary into `info_buffer` and return its length
/// (excluding the NUL terminator). Returns
/// [`WEBDAV_ERROR_SERVER_NOT_FOUND`] for an unknown handle and
/// [`WEBDAV_ERROR_BUFFER_TOO_SMALL`] when the summary does not fit, in
/// which case the buffer is left untouched.
///
/// # Safety
///
/// `info_buffer` must be null or point to at least `buffer_size`
/// writable bytes.
#[no_mangle]
pub unsafe extern "C" fn webdav_get_server_info(
    server_id: c_int,
    info_buffer: *mut c_char,
    buffer_size: c_int,
) -> c_int {
    let result = catch_unwind(AssertUnwindSafe(|| {
        get_server_info_inner(server_id, info_buffer, buffer_size)
    }));
    match result {
        Ok(Ok(len)) => len,
        Ok(Err(Error::ServerNotFound(_))) => WEBDAV_ERROR_SERVER_NOT_FOUND,
        Ok(Err(_)) | Err(_) => WEBDAV_ERROR_BUFFER_TOO_SMALL,
    }
}

/// Set the process-wide log level (`WEBDAV_LOG_DEBUG` ..
/// `WEBDAV_LOG_ERROR`). Returns -1 for a level outside that range.
#[no_mangle]
pub extern "C" fn webdav_set_log_level(level: c_int) -> c_int {
    match LogLevel::from_code(level) {
        Some(level) => {
            set_log_level(level);
            WEBDAV_SUCCESS
        }
        None => -1,
    }
}

/// Per-user directories are not supported in this version; always
/// returns [`WEBDAV_ERROR_UNSUPPORTED`], regardless of handle validity.
#[no_mangle]
pub extern "C" fn webdav_add_user(
    _server_id: c_int,
    _username: *const c_char,
    _password: *const c_char,
    _directory: *const c_char,
) -> c_int {
    WEBDAV_ERROR_UNSUPPORTED
}

/// See [`webdav_add_user`].
#[no_mangle]
pub extern "C" fn webdav_remove_user(_server_id: c_int, _username: *const c_char) -> c_int {
    WEBDAV_ERROR_UNSUPPORTED
}

/// The library version as an owned string, or null when allocation
/// fails. Release with `webdav_free_string` exactly once.
#[no_mangle]
pub extern "C" fn webdav_get_version() -> *mut c_char {
    let version = concat!("dav-embed ", env!("CARGO_PKG_VERSION"));
    match CString::new(version) {
        Ok(s) => s.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Release a string previously returned by this library. Null is a
/// no-op.
///
/// # Safety
///
/// `s` must be null or a pointer obtained from this library that has
/// not been released before.
#[no_mangle]
pub unsafe extern "C" fn webdav_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// Stop every running instance and clear the registry. Safe to call
/// with zero instances; intended to run once at process shutdown.
#[no_mangle]
pub extern "C" fn webdav_cleanup() {
    let _ = catch_unwind(AssertUnwindSafe(|| registry().cleanup_all()));
}
