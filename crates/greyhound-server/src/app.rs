//! Server lifecycle: listeners, accept loops, and shutdown.
//!
//! One plain listener is always bound; a TLS listener with identical
//! routing is added when `securePort` (with its key material) is
//! configured. Each connection is served by hyper's auto protocol builder
//! on its own task, so slow streams never block the accept loops.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_native_tls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use greyhound_core::DirectoryOpener;

use crate::auth::Auth;
use crate::config::Configuration;
use crate::manager::Manager;
use crate::router::Router;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("failed to load TLS identity: {0}")]
    Tls(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A running service instance.
pub struct App {
    manager: Arc<Manager>,
    addr: SocketAddr,
    secure_addr: Option<SocketAddr>,
    shutdown: Vec<oneshot::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl App {
    /// Bind the configured listeners and start serving.
    pub async fn start(config: Configuration) -> Result<App, AppError> {
        let opener = Arc::new(
            DirectoryOpener::new(config.cache_bytes).with_arbiter(config.arbiter.clone()),
        );
        let auth = config.auth.as_ref().map(Auth::new);
        let manager = Manager::new(&config, opener, auth);
        let router = Arc::new(Router::new(manager.clone()));

        let mut app = App {
            manager,
            addr: ([0, 0, 0, 0], 0).into(),
            secure_addr: None,
            shutdown: Vec::new(),
            handles: Vec::new(),
        };

        app.addr = app
            .listen(config.http.port, router.clone(), None)
            .await?;
        info!(addr = %app.addr, "HTTP listening");

        if let Some(port) = config.http.secure_port {
            let acceptor = load_tls(&config)?;
            let addr = app.listen(port, router, Some(acceptor)).await?;
            info!(addr = %addr, "HTTPS listening");
            app.secure_addr = Some(addr);
        }

        Ok(app)
    }

    async fn listen(
        &mut self,
        port: u16,
        router: Arc<Router>,
        tls: Option<TlsAcceptor>,
    ) -> Result<SocketAddr, AppError> {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AppError::Bind { addr, source })?;
        let local = listener.local_addr()?;

        let (tx, rx) = oneshot::channel::<()>();
        self.shutdown.push(tx);
        self.handles.push(tokio::spawn(async move {
            tokio::select! {
                () = serve(listener, router, tls) => debug!("accept loop ended"),
                _ = rx => debug!(addr = %local, "listener shutting down"),
            }
        }));

        Ok(local)
    }

    /// The bound plain-HTTP address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn secure_addr(&self) -> Option<SocketAddr> {
        self.secure_addr
    }

    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    /// Stop the listeners and join the sweeper.
    pub async fn stop(mut self) {
        for tx in self.shutdown.drain(..) {
            let _ = tx.send(());
        }
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        self.manager.shutdown().await;
        info!("stopped");
    }
}

impl Drop for App {
    fn drop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

async fn serve(listener: TcpListener, router: Arc<Router>, tls: Option<TlsAcceptor>) {
    let tls = tls.map(Arc::new);
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let router = router.clone();
                let tls = tls.clone();
                tokio::spawn(async move {
                    match tls {
                        None => serve_connection(stream, router, peer).await,
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => serve_connection(stream, router, peer).await,
                            Err(e) => warn!(peer = %peer, error = %e, "TLS handshake failed"),
                        },
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
            }
        }
    }
}

async fn serve_connection<S>(stream: S, router: Arc<Router>, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let router = router.clone();
        async move { Ok::<_, Infallible>(router.route(req).await) }
    });

    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
    {
        warn!(peer = %peer, error = %e, "HTTP connection error");
    }
}

fn load_tls(config: &Configuration) -> Result<TlsAcceptor, AppError> {
    let (Some(key), Some(cert)) = (&config.http.key_file, &config.http.cert_file) else {
        return Err(AppError::Tls(
            "securePort requires keyFile and certFile".to_string(),
        ));
    };
    let cert_pem = std::fs::read(cert)?;
    let key_pem = std::fs::read(key)?;
    let identity = native_tls::Identity::from_pkcs8(&cert_pem, &key_pem)
        .map_err(|e| AppError::Tls(e.to_string()))?;
    let acceptor = native_tls::TlsAcceptor::new(identity).map_err(|e| AppError::Tls(e.to_string()))?;
    Ok(TlsAcceptor::from(acceptor))
}
