//! Interception mode: a per-exchange context with a memoized continuation.
//!
//! An [`Interceptor`] receives a [`MiddlewareContext`] and decides how the
//! exchange proceeds. It may call [`MiddlewareContext::advance`] to run the
//! application handler (any number of times; the handler runs at most once),
//! rewrite the inbound request, write to the outbound response directly, or
//! return a replacement response.

use fetchbridge_core::{BoxError, BridgeError, BridgeResult, FetchResponse, Mode};
use futures::future::BoxFuture;
use tracing::debug;

use crate::handler::{FetchHandler, HandlerContext};
use crate::request::create_fetch_request;
use crate::server::{ServerRequest, ServerResponse};

/// Caller-supplied logic wrapped around the application handler.
pub trait Interceptor: Send + Sync + 'static {
    /// Run for one exchange.
    ///
    /// Returning `Some(response)` replaces whatever the continuation
    /// recorded. Returning `None` without advancing, while headers are
    /// still unsent, makes the adapter advance on the interceptor's behalf.
    fn intercept<'a>(
        &'a self,
        cx: &'a mut MiddlewareContext<'_>,
    ) -> BoxFuture<'a, Result<Option<FetchResponse>, BoxError>>;
}

#[derive(Debug)]
enum Continuation {
    Pending,
    Ready(FetchResponse),
    Failed,
}

/// State shared between the adapter, the interceptor and the handler for
/// one exchange.
pub struct MiddlewareContext<'a> {
    request: &'a mut dyn ServerRequest,
    response: &'a mut dyn ServerResponse,
    handler: &'a dyn FetchHandler,
    mode: Mode,
    values: http::Extensions,
    continuation: Continuation,
}

impl std::fmt::Debug for MiddlewareContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareContext")
            .field("method", self.request.method())
            .field("url", &self.request.url())
            .field("headers_sent", &self.response.headers_sent())
            .field("mode", &self.mode)
            .field("continuation", &self.continuation)
            .finish_non_exhaustive()
    }
}

impl<'a> MiddlewareContext<'a> {
    pub(crate) fn new(
        request: &'a mut dyn ServerRequest,
        response: &'a mut dyn ServerResponse,
        handler: &'a dyn FetchHandler,
        mode: Mode,
    ) -> Self {
        Self {
            request,
            response,
            handler,
            mode,
            values: http::Extensions::new(),
            continuation: Continuation::Pending,
        }
    }

    /// The inbound request.
    #[must_use]
    pub fn request(&self) -> &dyn ServerRequest {
        &*self.request
    }

    /// The inbound request, for rewriting before the handler runs.
    pub fn request_mut(&mut self) -> &mut dyn ServerRequest {
        &mut *self.request
    }

    /// The outbound response.
    #[must_use]
    pub fn response(&self) -> &dyn ServerResponse {
        &*self.response
    }

    /// The outbound response, for writing to it directly.
    pub fn response_mut(&mut self) -> &mut dyn ServerResponse {
        &mut *self.response
    }

    /// Operating mode of the adapter.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Typed values handed to the application handler.
    #[must_use]
    pub fn values(&self) -> &http::Extensions {
        &self.values
    }

    /// Mutable access to the values handed to the application handler.
    pub fn values_mut(&mut self) -> &mut http::Extensions {
        &mut self.values
    }

    /// Whether the continuation has run, successfully or not.
    #[must_use]
    pub fn is_advanced(&self) -> bool {
        !matches!(self.continuation, Continuation::Pending)
    }

    /// The response recorded by the continuation, if it succeeded.
    #[must_use]
    pub fn recorded(&self) -> Option<&FetchResponse> {
        match &self.continuation {
            Continuation::Ready(response) => Some(response),
            _ => None,
        }
    }

    /// Run the application handler and record its response.
    ///
    /// The first call builds the standards request and invokes the handler.
    /// Later calls return the recorded response without invoking it again;
    /// if the first call failed they return
    /// [`BridgeError::ContinuationFailed`].
    pub async fn advance(&mut self) -> BridgeResult<&mut FetchResponse> {
        if let Continuation::Pending = self.continuation {
            match self.invoke().await {
                Ok(response) => self.continuation = Continuation::Ready(response),
                Err(err) => {
                    self.continuation = Continuation::Failed;
                    return Err(err);
                }
            }
        }

        match &mut self.continuation {
            Continuation::Ready(response) => Ok(response),
            Continuation::Pending | Continuation::Failed => Err(BridgeError::ContinuationFailed),
        }
    }

    async fn invoke(&mut self) -> BridgeResult<FetchResponse> {
        let mut request = create_fetch_request(&mut *self.request, &mut *self.response)?;
        request.extensions_mut().insert(self.mode);

        debug!(uri = %request.uri(), "continuation invoking handler");
        self.handler
            .handle(request, HandlerContext::Middleware(&self.values))
            .await
            .map_err(BridgeError::Handler)
    }

    pub(crate) fn into_recorded(self) -> Option<FetchResponse> {
        match self.continuation {
            Continuation::Ready(response) => Some(response),
            Continuation::Pending | Continuation::Failed => None,
        }
    }
}
