//! Server instance configuration.
//!
//! A [`ServerConfig`] is built with [`ConfigBuilder`] and validated once
//! at construction; it is immutable afterwards. Validation is pure: it
//! never touches the filesystem or the network. Whether the root
//! directory exists and whether the port can be bound is checked by the
//! engine adapter when the instance is constructed and started.

use std::path::{Path, PathBuf};

use crate::errors::{Error, Result};

pub const DEFAULT_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 6065;
pub const DEFAULT_PREFIX: &str = "/";

/// Validated configuration of one server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub(crate) address: String,
    pub(crate) port: u16,
    pub(crate) root: PathBuf,
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) tls: bool,
    pub(crate) cert: Option<PathBuf>,
    pub(crate) key: Option<PathBuf>,
    pub(crate) prefix: String,
    pub(crate) no_password: bool,
    pub(crate) behind_proxy: bool,
    pub(crate) debug: bool,
}

impl ServerConfig {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn tls(&self) -> bool {
        self.tls
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Human-readable one-line description of the instance: address,
    /// port, root, authentication mode and TLS mode.
    pub fn summary(&self) -> String {
        let auth = if self.username.is_some() {
            if self.no_password {
                "basic (password check disabled)"
            } else {
                "basic"
            }
        } else {
            "open"
        };
        let tls = if self.tls { "enabled" } else { "disabled" };
        format!(
            "Server Address: {}:{}, Root: {}, Auth: {}, TLS: {}",
            self.address,
            self.port,
            self.root.display(),
            auth,
            tls
        )
    }

    // Checks run in order and stop at the first failure.
    fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(Error::InvalidConfig("address must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig("port must be in range 1-65535".to_string()));
        }
        if self.root.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("root directory must not be empty".to_string()));
        }
        if self.tls {
            if self.cert.as_ref().map_or(true, |c| c.as_os_str().is_empty()) {
                return Err(Error::InvalidConfig(
                    "cert must be defined if TLS is activated".to_string(),
                ));
            }
            if self.key.as_ref().map_or(true, |k| k.as_os_str().is_empty()) {
                return Err(Error::InvalidConfig(
                    "key must be defined if TLS is activated".to_string(),
                ));
            }
        }
        if !self.prefix.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "prefix {:?} must start with '/'",
                self.prefix
            )));
        }
        Ok(())
    }
}

/// Builder for a [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    address: String,
    port: u16,
    root: PathBuf,
    username: Option<String>,
    password: Option<String>,
    tls: bool,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
    prefix: String,
    no_password: bool,
    behind_proxy: bool,
    debug: bool,
}

impl ConfigBuilder {
    /// Create a builder serving `root`, listening on the default
    /// address and port, with no authentication and no TLS.
    pub fn new(root: impl Into<PathBuf>) -> ConfigBuilder {
        ConfigBuilder {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            root: root.into(),
            username: None,
            password: None,
            tls: false,
            cert: None,
            key: None,
            prefix: DEFAULT_PREFIX.to_string(),
            no_password: false,
            behind_proxy: false,
            debug: false,
        }
    }

    /// Host or IP address to listen on.
    pub fn address(self, address: impl Into<String>) -> Self {
        let mut this = self;
        this.address = address.into();
        this
    }

    /// Port to listen on.
    pub fn port(self, port: u16) -> Self {
        let mut this = self;
        this.port = port;
        this
    }

    /// Require basic authentication with this username and password.
    pub fn credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        let mut this = self;
        this.username = Some(username.into());
        this.password = Some(password.into());
        this
    }

    /// Serve over TLS with this certificate and private key.
    pub fn tls(self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        let mut this = self;
        this.tls = true;
        this.cert = Some(cert.into());
        this.key = Some(key.into());
        this
    }

    /// URL prefix to be stripped off before mapping the request path to
    /// the filesystem. An empty prefix is normalized to `/`.
    pub fn prefix(self, prefix: impl Into<String>) -> Self {
        let mut this = self;
        this.prefix = prefix.into();
        this
    }

    /// Accept any password for a configured user. Only intended when
    /// authentication is delegated to another service.
    pub fn no_password(self, no_password: bool) -> Self {
        let mut this = self;
        this.no_password = no_password;
        this
    }

    /// Trust `X-Forwarded-For` when reporting client addresses.
    pub fn behind_proxy(self, behind_proxy: bool) -> Self {
        let mut this = self;
        this.behind_proxy = behind_proxy;
        this
    }

    /// Raise the process log level to debug when this instance is
    /// created.
    pub fn debug(self, debug: bool) -> Self {
        let mut this = self;
        this.debug = debug;
        this
    }

    /// Validate and produce the immutable configuration.
    pub fn build(self) -> Result<ServerConfig> {
        let prefix = if self.prefix.is_empty() {
            DEFAULT_PREFIX.to_string()
        } else {
            self.prefix
        };
        let config = ServerConfig {
            address: self.address,
            port: self.port,
            root: self.root,
            username: self.username,
            password: self.password,
            tls: self.tls,
            cert: self.cert,
            key: self.key,
            prefix,
            no_password: self.no_password,
            behind_proxy: self.behind_proxy,
            debug: self.debug,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConfigBuilder {
        ConfigBuilder::new("/srv/dav")
    }

    #[test]
    fn defaults() {
        let config = base().build().unwrap();
        assert_eq!(config.address(), DEFAULT_ADDRESS);
        assert_eq!(config.port(), DEFAULT_PORT);
        assert_eq!(config.prefix(), "/");
        assert!(!config.tls());
        assert!(!config.debug());
    }

    #[test]
    fn rejects_empty_address() {
        let err = base().address("").build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_port_zero() {
        let err = base().port(0).build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_empty_root() {
        let err = ConfigBuilder::new("").build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_tls_without_key() {
        let err = base().tls("cert.pem", "").build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn empty_prefix_is_normalized() {
        let config = base().prefix("").build().unwrap();
        assert_eq!(config.prefix(), "/");
    }

    #[test]
    fn rejects_relative_prefix() {
        let err = base().prefix("dav").build().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn summary_reports_auth_and_tls_modes() {
        let open = base().build().unwrap();
        assert!(open.summary().contains("Auth: open"));
        assert!(open.summary().contains("TLS: disabled"));

        let closed = base()
            .credentials("webdav", "secret")
            .tls("cert.pem", "key.pem")
            .build()
            .unwrap();
        assert!(closed.summary().contains("Auth: basic"));
        assert!(closed.summary().contains("TLS: enabled"));
        // credentials never leak into the summary
        assert!(!closed.summary().contains("secret"));
    }
}
