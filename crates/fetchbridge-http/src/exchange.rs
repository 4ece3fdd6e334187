//! Callback-style request/response objects backed by hyper.
//!
//! [`IncomingRequest`] wraps a hyper request without buffering its body.
//! [`OutgoingResponse`] buffers status and headers until they are committed,
//! then hands an `http::Response<ExchangeBody>` to the paired
//! [`PendingResponse`] and streams written chunks through a bounded channel.
//!
//! # Connection lifecycle
//!
//! The exchange counts as "closed" once nobody can observe the response any
//! more: the [`PendingResponse`] was dropped before a head arrived (client
//! went away while the handler was running), or the [`ExchangeBody`] was
//! dropped (response fully delivered or connection reset). Close callbacks
//! registered through [`ServerResponse::on_close`] run exactly once at that
//! point.
//!
//! Responses to `HEAD` requests commit their head as usual but discard body
//! writes, since hyper never sends them.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use bytes::Bytes;
use fetchbridge_core::{BoxError, BridgeConfig, FetchBody, RawHeaders};
use futures::future::BoxFuture;
use http::header::{HOST, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use http_body::{Body, Frame};
use hyper::ext::ReasonPhrase;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::server::{CloseCallback, ServerRequest, ServerResponse};

/// Number of body chunks buffered between the writer and hyper.
const BODY_CHANNEL_CAPACITY: usize = 16;

/// How inbound hyper requests are turned into [`IncomingRequest`]s.
#[derive(Debug, Clone)]
pub struct ExchangeOptions {
    /// Scheme reported when no trusted proxy header overrides it.
    pub scheme: String,
    /// Whether `x-forwarded-proto` / `x-forwarded-host` are trusted.
    pub trust_proxy: bool,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            scheme: "http".to_owned(),
            trust_proxy: false,
        }
    }
}

impl ExchangeOptions {
    /// Derive options from the server configuration.
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            scheme: config.scheme.clone(),
            trust_proxy: config.trust_proxy,
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Inbound request of one exchange.
#[derive(Debug)]
pub struct IncomingRequest {
    method: Method,
    url: String,
    protocol: String,
    host: Option<String>,
    headers: RawHeaders,
    body: Option<FetchBody>,
}

impl IncomingRequest {
    /// Create a request with no host, headers or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            protocol: "http".to_owned(),
            host: None,
            headers: RawHeaders::new(),
            body: None,
        }
    }

    /// Wrap a hyper request. The body is attached as a stream.
    pub fn from_hyper<B>(req: http::Request<B>, options: &ExchangeOptions) -> Self
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();

        let url = parts
            .uri
            .path_and_query()
            .map_or_else(|| "/".to_owned(), ToString::to_string);

        let protocol = trusted_forwarded(&parts.headers, "x-forwarded-proto", options)
            .map_or_else(|| options.scheme.clone(), |p| p.to_ascii_lowercase());

        let host = trusted_forwarded(&parts.headers, "x-forwarded-host", options)
            .or_else(|| {
                parts
                    .headers
                    .get(HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(ToOwned::to_owned)
            })
            .or_else(|| parts.uri.authority().map(ToString::to_string));

        Self {
            headers: RawHeaders::from_header_map(&parts.headers),
            method: parts.method,
            url,
            protocol,
            host,
            body: Some(FetchBody::from_body(body)),
        }
    }

    /// Set the protocol scheme.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Set the host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Add a header value.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Attach a body.
    #[must_use]
    pub fn with_body(mut self, body: FetchBody) -> Self {
        self.body = Some(body);
        self
    }
}

/// First comma-separated value of a proxy header, if proxies are trusted.
fn trusted_forwarded(headers: &HeaderMap, name: &str, options: &ExchangeOptions) -> Option<String> {
    if !options.trust_proxy {
        return None;
    }
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

impl ServerRequest for IncomingRequest {
    fn method(&self) -> &Method {
        &self.method
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    fn headers(&self) -> &RawHeaders {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut RawHeaders {
        &mut self.headers
    }

    fn take_body(&mut self) -> Option<FetchBody> {
        self.body.take()
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Close callbacks, run when the last strong reference goes away.
#[derive(Default)]
struct CloseState {
    callbacks: Mutex<Vec<CloseCallback>>,
}

impl fmt::Debug for CloseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseState")
            .field("callbacks", &self.callbacks.lock().len())
            .finish()
    }
}

impl Drop for CloseState {
    fn drop(&mut self) {
        let callbacks = std::mem::take(self.callbacks.get_mut());
        if !callbacks.is_empty() {
            debug!(count = callbacks.len(), "exchange closed, running close callbacks");
        }
        for callback in callbacks {
            callback();
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "connection closed")
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Response body streamed from an [`OutgoingResponse`] to hyper.
#[derive(Debug, Default)]
pub struct ExchangeBody {
    rx: Option<mpsc::Receiver<io::Result<Bytes>>>,
    abort: Option<oneshot::Receiver<io::Error>>,
    link: Option<Arc<CloseState>>,
}

impl ExchangeBody {
    /// A body with no content and no lifecycle attached.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    fn finish(&mut self) {
        self.rx = None;
        self.abort = None;
        self.link = None;
    }
}

impl Body for ExchangeBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        // An abort wins over buffered chunks, however full the channel is.
        if let Some(abort) = this.abort.as_mut() {
            match Pin::new(abort).poll(cx) {
                Poll::Ready(Ok(err)) => {
                    this.finish();
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(Err(_)) => this.abort = None,
                Poll::Pending => {}
            }
        }

        let Some(rx) = this.rx.as_mut() else {
            return Poll::Ready(None);
        };
        match rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(chunk.map(Frame::data))),
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.rx.is_none()
    }
}

/// Receiving side of an [`OutgoingResponse`]: resolves to the committed head.
#[derive(Debug)]
pub struct PendingResponse {
    head_rx: oneshot::Receiver<http::Response<ExchangeBody>>,
    link: Arc<CloseState>,
}

impl PendingResponse {
    /// Wait for the response head.
    ///
    /// Returns `None` if the [`OutgoingResponse`] was dropped without ever
    /// committing headers.
    pub async fn head(self) -> Option<http::Response<ExchangeBody>> {
        let Self { head_rx, link } = self;
        let head = head_rx.await.ok();
        drop(link);
        head
    }
}

/// Outbound response of one exchange.
#[derive(Debug)]
pub struct OutgoingResponse {
    status: StatusCode,
    status_message: Option<String>,
    headers: HeaderMap,
    head_tx: Option<oneshot::Sender<http::Response<ExchangeBody>>>,
    body_tx: Option<mpsc::Sender<io::Result<Bytes>>>,
    abort_tx: Option<oneshot::Sender<io::Error>>,
    link: Weak<CloseState>,
    discard_body: bool,
    headers_sent: bool,
    finished: bool,
}

impl OutgoingResponse {
    /// Create a response and the handle that receives its head.
    #[must_use]
    pub fn channel() -> (Self, PendingResponse) {
        Self::channel_for(&Method::GET)
    }

    /// Create a response for a request with the given method.
    ///
    /// For `HEAD`, body writes are accepted and dropped.
    #[must_use]
    pub fn channel_for(method: &Method) -> (Self, PendingResponse) {
        let link = Arc::new(CloseState::default());
        let (head_tx, head_rx) = oneshot::channel();
        let response = Self {
            status: StatusCode::OK,
            status_message: None,
            headers: HeaderMap::new(),
            head_tx: Some(head_tx),
            body_tx: None,
            abort_tx: None,
            link: Arc::downgrade(&link),
            discard_body: method == Method::HEAD,
            headers_sent: false,
            finished: false,
        };
        (response, PendingResponse { head_rx, link })
    }

    /// Current status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Custom status message, if one was set.
    #[must_use]
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// Headers set so far.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Drop every header set so far. No effect once headers are sent.
    pub fn clear_headers(&mut self) {
        if !self.headers_sent {
            self.headers.clear();
            self.status_message = None;
        }
    }

    /// Abort the response stream so the client sees a reset instead of a
    /// truncated body that looks complete.
    pub fn destroy(&mut self) {
        self.body_tx = None;
        if let Some(abort_tx) = self.abort_tx.take() {
            let aborted = io::Error::new(io::ErrorKind::ConnectionAborted, "response destroyed");
            if abort_tx.send(aborted).is_err() {
                debug!("response body already dropped while destroying response");
            }
        }
        self.head_tx = None;
        self.headers_sent = true;
        self.finished = true;
    }

    fn commit(&mut self) -> io::Result<()> {
        if self.headers_sent {
            return Ok(());
        }
        self.headers_sent = true;

        let head_tx = self.head_tx.take().ok_or_else(closed_error)?;
        let link = self.link.upgrade().ok_or_else(closed_error)?;

        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
        let (abort_tx, abort_rx) = oneshot::channel();
        let mut head = http::Response::new(ExchangeBody {
            rx: Some(body_rx),
            abort: Some(abort_rx),
            link: Some(link),
        });
        *head.status_mut() = self.status;
        *head.headers_mut() = self.headers.clone();
        if let Some(reason) = self.custom_reason() {
            head.extensions_mut().insert(reason);
        }

        head_tx.send(head).map_err(|_| closed_error())?;
        self.body_tx = Some(body_tx);
        self.abort_tx = Some(abort_tx);
        Ok(())
    }

    fn custom_reason(&self) -> Option<ReasonPhrase> {
        let message = self.status_message.as_deref()?;
        if message.is_empty() || Some(message) == self.status.canonical_reason() {
            return None;
        }
        ReasonPhrase::try_from(message.as_bytes()).ok()
    }
}

impl ServerResponse for OutgoingResponse {
    fn set_status(&mut self, status: StatusCode) {
        if !self.headers_sent {
            self.status = status;
        }
    }

    fn set_status_message(&mut self, message: &str) {
        if !self.headers_sent {
            self.status_message = Some(message.to_owned());
        }
    }

    fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        if !self.headers_sent {
            self.headers.append(name, value);
        }
    }

    fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    fn flush_headers(&mut self) {
        if let Err(err) = self.commit() {
            debug!(error = %err, "failed to flush response headers");
        }
    }

    fn write(&mut self, chunk: Bytes) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            if self.finished {
                return Err(io::Error::other("write after end"));
            }
            self.commit()?;
            if self.discard_body {
                return Ok(());
            }
            let body_tx = self.body_tx.as_ref().ok_or_else(closed_error)?;
            body_tx.send(Ok(chunk)).await.map_err(|_| closed_error())
        })
    }

    fn end(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            if self.finished {
                return Ok(());
            }
            self.finished = true;
            self.commit()?;
            self.body_tx = None;
            Ok(())
        })
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn on_close(&mut self, callback: CloseCallback) {
        match self.link.upgrade() {
            Some(state) => state.callbacks.lock().push(callback),
            None => callback(),
        }
    }
}
