//! Callback-style server objects.
//!
//! These traits describe the request/response pair a callback server hands
//! to its middleware chain for one exchange, together with the error
//! continuation used to pass failures back to the server. The bridge only
//! reads the request and mutates the response through these interfaces; it
//! never touches the server's listen or routing machinery.

use std::io;

use bytes::Bytes;
use fetchbridge_core::{BridgeError, FetchBody, RawHeaders};
use futures::future::BoxFuture;
use http::{HeaderName, HeaderValue, Method, StatusCode};

/// Callback registered for the outbound connection's "closed" event.
pub type CloseCallback = Box<dyn FnOnce() + Send + 'static>;

/// Inbound request as exposed by the callback server.
pub trait ServerRequest: Send + Sync {
    /// HTTP method.
    fn method(&self) -> &Method;

    /// Path and query, as received on the request line.
    fn url(&self) -> &str;

    /// Protocol scheme, `"http"` or `"https"`.
    fn protocol(&self) -> &str;

    /// Host (with port, if any) the request was addressed to.
    fn host(&self) -> Option<&str>;

    /// Header collection keyed by lowercase name.
    fn headers(&self) -> &RawHeaders;

    /// Mutable header collection, for middleware that rewrites requests.
    fn headers_mut(&mut self) -> &mut RawHeaders;

    /// Take the readable body stream. Returns `None` once taken.
    fn take_body(&mut self) -> Option<FetchBody>;
}

/// Outbound response as exposed by the callback server.
///
/// Status and headers are buffered until the first write, an explicit
/// [`flush_headers`](ServerResponse::flush_headers) or
/// [`end`](ServerResponse::end); after that
/// [`headers_sent`](ServerResponse::headers_sent) is `true` and further
/// status or header changes are ignored.
pub trait ServerResponse: Send + Sync {
    /// Set the status code.
    fn set_status(&mut self, status: StatusCode);

    /// Set the status message sent on the status line.
    fn set_status_message(&mut self, message: &str);

    /// Add a header value, keeping existing values for the same name.
    fn append_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Whether the status line and headers have been committed.
    fn headers_sent(&self) -> bool;

    /// Commit the status line and headers without writing body bytes.
    fn flush_headers(&mut self);

    /// Write a body chunk, committing headers first if needed.
    fn write(&mut self, chunk: Bytes) -> BoxFuture<'_, io::Result<()>>;

    /// Finish the response.
    fn end(&mut self) -> BoxFuture<'_, io::Result<()>>;

    /// Whether [`end`](ServerResponse::end) has completed.
    fn is_finished(&self) -> bool;

    /// Register a callback for the outbound connection's "closed" event.
    ///
    /// The callback runs once, when the response has been fully delivered or
    /// the client went away. If the connection is already closed it runs
    /// immediately.
    fn on_close(&mut self, callback: CloseCallback);
}

/// The callback server's error continuation.
///
/// Errors raised inside an exchange are handed here instead of being
/// dropped inside a future the server never observes.
pub trait Next: Send {
    /// Pass an error to the server's error handling.
    fn call(self, error: BridgeError);
}

impl<F> Next for F
where
    F: FnOnce(BridgeError) + Send,
{
    fn call(self, error: BridgeError) {
        self(error);
    }
}
