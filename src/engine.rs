//! Adapter around the external WebDAV protocol engine.
//!
//! One [`DavEngine`] per server instance. `construct` builds the
//! `dav_server` handler for the instance's root directory, loads TLS
//! material and checks the root; it does not bind the port. `start`
//! binds the listener and moves the accept loop onto the shared
//! runtime; `shutdown` signals the loop and waits for the listening
//! socket to be released.
//!
//! Authentication is decided here, in front of the protocol handler:
//! the engine takes the configured user/password pair and the
//! no-password flag and answers 401 itself. The registry never sees an
//! auth outcome.

use std::convert::Infallible;
use std::fs::File;
use std::io::BufReader;
use std::net::{SocketAddr, TcpListener as StdTcpListener, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dav_server::{body::Body, fakels::FakeLs, localfs::LocalFs, DavHandler};
use headers::{authorization::Basic, Authorization, HeaderMapExt};
use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;

use crate::config::ServerConfig;
use crate::errors::{Error, Result};

lazy_static! {
    // One multi-threaded runtime hosts every accept loop in the
    // process. Initialized on the first start.
    static ref RUNTIME: std::io::Result<Runtime> = tokio::runtime::Builder::new_multi_thread()
        .thread_name("dav-embed")
        .enable_all()
        .build();
}

fn runtime() -> Result<&'static Runtime> {
    RUNTIME
        .as_ref()
        .map_err(|e| Error::HandlerInit(format!("tokio runtime unavailable: {e}")))
}

/// The constructed engine of one instance, plus its listener while
/// serving.
pub(crate) struct DavEngine {
    address: String,
    port: u16,
    handler: DavHandler,
    auth: AuthPolicy,
    tls: Option<TlsAcceptor>,
    serving: Mutex<Option<ServeTask>>,
}

impl std::fmt::Debug for DavEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DavEngine")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}

struct ServeTask {
    shutdown: oneshot::Sender<()>,
    done: tokio::task::JoinHandle<()>,
}

impl DavEngine {
    /// Construct the engine for a validated config. Fails when the root
    /// directory is missing or not a directory, or when the TLS
    /// material cannot be loaded.
    pub(crate) fn construct(config: &ServerConfig) -> Result<DavEngine> {
        let meta = std::fs::metadata(&config.root).map_err(|e| {
            Error::HandlerInit(format!("root directory {}: {e}", config.root.display()))
        })?;
        if !meta.is_dir() {
            return Err(Error::HandlerInit(format!(
                "root directory {} is not a directory",
                config.root.display()
            )));
        }

        let tls = match (&config.cert, &config.key) {
            (Some(cert), Some(key)) if config.tls => Some(load_tls(cert, key)?),
            _ => None,
        };

        if config.username.is_none() {
            warn!("unprotected config: no username set, so no authentication will be used");
        }
        if config.no_password {
            warn!("unprotected config: password check is disabled, only intended when delegating authentication to another service");
        }

        let mut builder = DavHandler::builder()
            .filesystem(LocalFs::new(&config.root, false, false, false))
            .locksystem(FakeLs::new());
        if config.prefix != "/" {
            builder = builder.strip_prefix(config.prefix.as_str());
        }

        Ok(DavEngine {
            address: config.address.clone(),
            port: config.port,
            handler: builder.build_handler(),
            auth: AuthPolicy {
                username: config.username.clone(),
                password: config.password.clone(),
                no_password: config.no_password,
                behind_proxy: config.behind_proxy,
            },
            tls,
            serving: Mutex::new(None),
        })
    }

    /// Bind the listener and spawn the accept loop. Returns once the
    /// listener is committed; a no-op when already serving.
    pub(crate) fn start(&self) -> Result<()> {
        let mut serving = self.serving.lock();
        if serving.is_some() {
            return Ok(());
        }

        let rt = runtime()?;
        let addr = self.resolve_addr()?;
        let std_listener = StdTcpListener::bind(addr)
            .map_err(|e| Error::HandlerInit(format!("bind {addr}: {e}")))?;
        std_listener
            .set_nonblocking(true)
            .map_err(|e| Error::HandlerInit(format!("bind {addr}: {e}")))?;
        let listener = {
            let _guard = rt.enter();
            TcpListener::from_std(std_listener)
                .map_err(|e| Error::HandlerInit(format!("bind {addr}: {e}")))?
        };

        let (tx, rx) = oneshot::channel();
        let done = rt.spawn(accept_loop(
            listener,
            self.handler.clone(),
            self.auth.clone(),
            self.tls.clone(),
            rx,
        ));
        info!(
            "listening on {}://{addr}",
            if self.tls.is_some() { "https" } else { "http" }
        );
        *serving = Some(ServeTask { shutdown: tx, done });
        Ok(())
    }

    /// Stop accepting connections and wait for the listening socket to
    /// be released. A no-op when not serving.
    pub(crate) fn shutdown(&self) -> Result<()> {
        let task = match self.serving.lock().take() {
            Some(task) => task,
            None => return Ok(()),
        };
        let rt = runtime()?;
        let _ = task.shutdown.send(());
        rt.block_on(task.done)
            .map_err(|e| Error::ShutdownFailed(format!("accept loop did not terminate cleanly: {e}")))
    }

    fn resolve_addr(&self) -> Result<SocketAddr> {
        (self.address.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                Error::HandlerInit(format!("address {}:{}: {e}", self.address, self.port))
            })?
            .next()
            .ok_or_else(|| {
                Error::HandlerInit(format!(
                    "address {}:{}: no usable address",
                    self.address, self.port
                ))
            })
    }
}

/// The credentials the engine checks requests against.
#[derive(Clone)]
struct AuthPolicy {
    username: Option<String>,
    password: Option<String>,
    no_password: bool,
    behind_proxy: bool,
}

impl AuthPolicy {
    /// Decide the auth outcome for one request; `None` means
    /// authorized.
    fn deny<B>(&self, req: &Request<B>, peer: SocketAddr) -> Option<Response<Body>> {
        let expected = match &self.username {
            Some(username) => username,
            None => return None,
        };
        let remote = self.remote_addr(req, peer);
        match req.headers().typed_get::<Authorization<Basic>>() {
            Some(Authorization(basic)) if basic.username() == expected => {
                if self.no_password || Some(basic.password()) == self.password.as_deref() {
                    debug!("user authorized: {} from {remote}", basic.username());
                    None
                } else {
                    info!("invalid password for user {} from {remote}", basic.username());
                    Some(unauthorized())
                }
            }
            Some(Authorization(basic)) => {
                info!("invalid username {} from {remote}", basic.username());
                Some(unauthorized())
            }
            None => Some(unauthorized()),
        }
    }

    // The first X-Forwarded-For entry is the client when a proxy sits
    // in front of us; the socket peer otherwise.
    fn remote_addr<B>(&self, req: &Request<B>, peer: SocketAddr) -> String {
        if self.behind_proxy {
            if let Some(forwarded) = req
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
            {
                if let Some(client) = forwarded.split(',').next() {
                    let client = client.trim();
                    if !client.is_empty() {
                        return client.to_string();
                    }
                }
            }
        }
        peer.to_string()
    }
}

fn unauthorized() -> Response<Body> {
    Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header("WWW-Authenticate", "Basic realm=\"Restricted\"")
        .body(Body::from("Not authorized".to_string()))
        .unwrap()
}

async fn accept_loop(
    listener: TcpListener,
    handler: DavHandler,
    auth: AuthPolicy,
    tls: Option<TlsAcceptor>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                };
                tokio::spawn(serve_connection(
                    stream,
                    peer,
                    handler.clone(),
                    auth.clone(),
                    tls.clone(),
                ));
            }
        }
    }
    // Dropping the listener here releases the port.
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: DavHandler,
    auth: AuthPolicy,
    tls: Option<TlsAcceptor>,
) {
    let service = service_fn(move |req: Request<hyper::Body>| {
        let handler = handler.clone();
        let auth = auth.clone();
        async move {
            if let Some(denied) = auth.deny(&req, peer) {
                return Ok::<_, Infallible>(denied);
            }
            Ok(handler.handle(req).await)
        }
    });

    let served = match tls {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(stream) => Http::new().serve_connection(stream, service).await,
            Err(e) => {
                debug!("TLS handshake with {peer} failed: {e}");
                return;
            }
        },
        None => Http::new().serve_connection(stream, service).await,
    };
    if let Err(e) = served {
        debug!("connection from {peer} ended with error: {e}");
    }
}

fn load_tls(cert: &Path, key: &Path) -> Result<TlsAcceptor> {
    let certs = load_certs(cert)?;
    let key = load_private_key(key)?;
    let config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::HandlerInit(format!("invalid TLS material: {e}")))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<rustls::Certificate>> {
    let file = File::open(path)
        .map_err(|e| Error::HandlerInit(format!("cert file {}: {e}", path.display())))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .map_err(|e| Error::HandlerInit(format!("cert file {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(Error::HandlerInit(format!(
            "cert file {}: no certificates found",
            path.display()
        )));
    }
    Ok(certs.into_iter().map(rustls::Certificate).collect())
}

fn load_private_key(path: &Path) -> Result<rustls::PrivateKey> {
    let file = File::open(path)
        .map_err(|e| Error::HandlerInit(format!("key file {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    loop {
        match rustls_pemfile::read_one(&mut reader)
            .map_err(|e| Error::HandlerInit(format!("key file {}: {e}", path.display())))?
        {
            Some(rustls_pemfile::Item::PKCS8Key(key))
            | Some(rustls_pemfile::Item::RSAKey(key))
            | Some(rustls_pemfile::Item::ECKey(key)) => return Ok(rustls::PrivateKey(key)),
            Some(_) => continue,
            None => {
                return Err(Error::HandlerInit(format!(
                    "key file {}: no private key found",
                    path.display()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use std::io::Write;

    #[test]
    fn construct_requires_existing_root() {
        let config = ConfigBuilder::new("/definitely/not/here")
            .build()
            .unwrap();
        let err = DavEngine::construct(&config).unwrap_err();
        assert!(matches!(err, Error::HandlerInit(_)));
    }

    #[test]
    fn construct_rejects_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::File::create(&file).unwrap();
        let config = ConfigBuilder::new(&file).build().unwrap();
        let err = DavEngine::construct(&config).unwrap_err();
        assert!(matches!(err, Error::HandlerInit(_)));
    }

    #[test]
    fn construct_rejects_garbage_tls_material() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        write!(std::fs::File::create(&cert).unwrap(), "not a certificate").unwrap();
        write!(std::fs::File::create(&key).unwrap(), "not a key").unwrap();
        let config = ConfigBuilder::new(dir.path())
            .tls(&cert, &key)
            .build()
            .unwrap();
        let err = DavEngine::construct(&config).unwrap_err();
        assert!(matches!(err, Error::HandlerInit(_)));
    }

    #[test]
    fn unresolvable_address_fails_at_start() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigBuilder::new(dir.path())
            .address("host.invalid.")
            .port(4918)
            .build()
            .unwrap();
        let engine = DavEngine::construct(&config).unwrap();
        assert!(matches!(engine.start(), Err(Error::HandlerInit(_))));
    }
}
