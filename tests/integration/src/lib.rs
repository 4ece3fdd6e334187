//! Integration tests for fetchbridge.
//!
//! Each test serves a [`FetchAdapter`] behind a real hyper server bound to an
//! ephemeral loopback port and talks to it with `reqwest`.
//!
//! Run them with:
//! ```text
//! cargo test -p fetchbridge-integration
//! ```

mod test_cancel;
mod test_direct;
mod test_middleware;

use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use fetchbridge_core::{BoxError, FetchBody, FetchRequest, FetchRequestExt, FetchResponse};
use fetchbridge_http::{
    BridgeHttpService, ExchangeOptions, FetchAdapter, FetchHandler, HandlerContext,
};
use futures::{SinkExt, StreamExt};
use futures::future::BoxFuture;
use http::header::CONTENT_TYPE;
use http::{Method, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A server running on its own task until dropped.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Serve `adapter` with default exchange options.
    pub async fn start<H: FetchHandler>(adapter: FetchAdapter<H>) -> Self {
        Self::start_with(adapter, ExchangeOptions::default()).await
    }

    /// Serve `adapter` with the given exchange options.
    pub async fn start_with<H: FetchHandler>(
        adapter: FetchAdapter<H>,
        options: ExchangeOptions,
    ) -> Self {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("failed to bind test listener: {e}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|e| panic!("failed to read listener address: {e}"));
        let service = BridgeHttpService::new(adapter, options);

        let task = tokio::spawn(async move {
            let http = HttpConnBuilder::new(TokioExecutor::new());
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                let conn = http
                    .serve_connection(TokioIo::new(stream), service.clone())
                    .into_owned();
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        tracing::debug!(error = %e, "test connection ended with error");
                    }
                });
            }
        });

        Self { addr, task }
    }

    /// Absolute URL of `path` on this server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Create an HTTP client for the test server.
#[must_use]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap_or_else(|e| panic!("failed to build client: {e}"))
}

/// Value stored in the handler context by resolvers and interceptors.
#[derive(Debug, Clone)]
pub struct Label(pub String);

/// Handler used by every test.
///
/// | Route | Behavior |
/// |-------|----------|
/// | `GET /hello` | `200 ok` with two `set-cookie` headers |
/// | `* /inspect/...` | reports the URL and body size it received |
/// | `POST /echo` | streams the request body back |
/// | `GET /context` | body is the [`Label`] from the handler context |
/// | `GET /fail` | handler error |
/// | `GET /wait` | waits for the abort signal, then fails |
/// | `GET /events` | one event, then holds the stream open until aborted |
/// | `GET`/`HEAD /large` | [`LARGE_CHUNKS`] chunks of 16 KiB, counted as they are pulled |
#[derive(Debug, Default)]
pub struct TestHandler {
    middleware: bool,
    calls: AtomicUsize,
    aborts: AtomicUsize,
    aborted: Notify,
    streamed: Arc<AtomicUsize>,
}

/// Number of chunks in the `/large` body.
pub const LARGE_CHUNKS: usize = 64;

impl TestHandler {
    /// A handler that does not take part in interception.
    #[must_use]
    pub fn direct() -> Self {
        Self::default()
    }

    /// A handler that accepts middleware contexts.
    #[must_use]
    pub fn with_middleware() -> Self {
        Self {
            middleware: true,
            ..Self::default()
        }
    }

    /// Number of handler invocations so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of aborts observed by the handler so far.
    #[must_use]
    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    /// Number of `/large` chunks pulled by the relay so far.
    #[must_use]
    pub fn streamed_chunks(&self) -> usize {
        self.streamed.load(Ordering::SeqCst)
    }

    /// Wait until the handler observes an abort.
    pub async fn wait_for_abort(&self) {
        self.aborted.notified().await;
    }

    fn record_abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.aborted.notify_one();
    }
}

impl FetchHandler for TestHandler {
    fn supports_middleware(&self) -> bool {
        self.middleware
    }

    fn handle<'a>(
        &'a self,
        request: FetchRequest,
        context: HandlerContext<'a>,
    ) -> BoxFuture<'a, Result<FetchResponse, BoxError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let method = request.method().clone();
            let path = request.uri().path().to_owned();

            match (method, path.as_str()) {
                (Method::GET, "/hello") => Ok(http::Response::builder()
                    .status(StatusCode::OK)
                    .header(CONTENT_TYPE, "text/plain")
                    .header("set-cookie", "a=1")
                    .header("set-cookie", "b=2")
                    .body(FetchBody::from("ok"))?),
                (_, p) if p.starts_with("/inspect") => {
                    let uri = request.uri().to_string();
                    let body = request.into_body().bytes().await?;
                    Ok(http::Response::builder()
                        .header("x-seen-uri", uri)
                        .header("x-seen-body-len", body.len())
                        .body(FetchBody::empty())?)
                }
                (Method::POST, "/echo") => Ok(http::Response::new(request.into_body())),
                (Method::GET, "/context") => {
                    let label = context.get::<Label>().map_or("none", |l| l.0.as_str());
                    Ok(http::Response::new(FetchBody::from_string(label)))
                }
                (Method::GET, "/fail") => Err("handler exploded".into()),
                (Method::GET, "/wait") => {
                    request.signal().aborted().await;
                    self.record_abort();
                    Err("client went away".into())
                }
                (Method::GET, "/events") => Ok(events(&request)),
                (Method::GET | Method::HEAD, "/large") => Ok(large(Arc::clone(&self.streamed))),
                _ => Ok(http::Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(FetchBody::empty())?),
            }
        })
    }
}

/// One event, then an open stream until the client disconnects.
fn events(request: &FetchRequest) -> FetchResponse {
    let signal = request.signal();
    let (mut tx, rx) = futures::channel::mpsc::channel::<Result<Bytes, BoxError>>(1);

    tokio::spawn(async move {
        if tx.send(Ok(Bytes::from_static(b"data: one\n\n"))).await.is_ok() {
            signal.aborted().await;
        }
    });

    let mut response = http::Response::new(FetchBody::from_stream(rx));
    response.headers_mut().insert(
        CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    response
}

/// A body larger than the response channel, counting each chunk pulled.
fn large(streamed: Arc<AtomicUsize>) -> FetchResponse {
    let chunks = futures::stream::iter(0..LARGE_CHUNKS).map(move |_| {
        streamed.fetch_add(1, Ordering::SeqCst);
        Ok::<_, BoxError>(Bytes::from(vec![b'x'; 16 * 1024]))
    });
    http::Response::new(FetchBody::from_stream(chunks))
}
