//! Test harness: a running service over a temporary resource directory,
//! plus a stub upstream authorization endpoint.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use greyhound_server::{App, Configuration};

use super::dataset::write_ellipsoid;

/// A service instance over a fresh temporary data directory holding the
/// `ellipsoid` resource.
pub struct TestServer {
    app: Option<App>,
    client: reqwest::Client,
    base: String,
    _data: TempDir,
}

impl TestServer {
    pub async fn start() -> TestServer {
        Self::with_config(|_| {}).await
    }

    /// Start with a configuration tweak applied on top of the test
    /// defaults (temp search path, ephemeral port).
    pub async fn with_config(tweak: impl FnOnce(&mut Configuration)) -> TestServer {
        let data = TempDir::new().unwrap();
        write_ellipsoid(data.path());

        let mut config = Configuration {
            paths: vec![data.path().to_path_buf()],
            ..Configuration::default()
        };
        config.http.port = 0;
        tweak(&mut config);

        let app = App::start(config).await.unwrap();
        let base = format!("http://127.0.0.1:{}", app.addr().port());

        TestServer {
            app: Some(app),
            client: reqwest::Client::new(),
            base,
            _data: data,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }

    pub async fn get_with(&self, path: &str, build: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder) -> reqwest::Response {
        build(self.client.get(self.url(path))).send().await.unwrap()
    }

    pub async fn get_json(&self, path: &str) -> serde_json::Value {
        let response = self.get(path).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {path}");
        response.json().await.unwrap()
    }

    pub async fn get_bytes(&self, path: &str) -> Vec<u8> {
        let response = self.get(path).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {path}");
        response.bytes().await.unwrap().to_vec()
    }

    pub async fn stop(mut self) {
        if let Some(app) = self.app.take() {
            app.stop().await;
        }
    }
}

/// A minimal upstream authorization endpoint: authorizes requests whose
/// `token` query parameter equals the configured value, and counts every
/// check it serves.
pub struct StubAuth {
    pub addr: SocketAddr,
    pub checks: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl StubAuth {
    pub async fn start(token: &str) -> StubAuth {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let checks = Arc::new(AtomicUsize::new(0));
        let token = token.to_string();

        let counter = checks.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let counter = counter.clone();
                let token = token.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let counter = counter.clone();
                        let token = token.clone();
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            let authorized = req
                                .uri()
                                .query()
                                .unwrap_or("")
                                .split('&')
                                .any(|pair| pair == format!("token={token}"));
                            let status = if authorized {
                                StatusCode::NO_CONTENT
                            } else {
                                StatusCode::UNAUTHORIZED
                            };
                            let mut response = Response::new(Full::new(Bytes::new()));
                            *response.status_mut() = status;
                            Ok::<_, Infallible>(response)
                        }
                    });
                    let _ = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        StubAuth { addr, checks, handle }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl Drop for StubAuth {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
