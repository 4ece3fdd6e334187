//! Application handler boundary.

use fetchbridge_core::{BoxError, FetchRequest, FetchResponse};
use futures::future::BoxFuture;

use crate::server::{ServerRequest, ServerResponse};

/// Values a [`LoadContextResolver`] hands to the application handler.
pub type LoadContext = http::Extensions;

/// Extra context passed alongside the request to a [`FetchHandler`].
#[derive(Debug)]
pub enum HandlerContext<'a> {
    /// Direct mode without a resolver.
    Empty,
    /// Direct mode: the value produced by the configured resolver.
    Load(LoadContext),
    /// Interception mode: the values stored on the middleware context.
    Middleware(&'a http::Extensions),
}

impl HandlerContext<'_> {
    /// Look up a typed value, whichever kind of context this is.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        match self {
            Self::Empty => None,
            Self::Load(values) => values.get::<T>(),
            Self::Middleware(values) => values.get::<T>(),
        }
    }

    /// Whether the handler runs under an interceptor.
    #[must_use]
    pub fn is_middleware(&self) -> bool {
        matches!(self, Self::Middleware(_))
    }
}

/// Trait the application must implement to be served through the bridge.
///
/// The handler receives a fully built standards request and returns a
/// standards response. It never sees the callback server's objects; it
/// learns about client disconnects through the request's
/// [`AbortSignal`](fetchbridge_core::AbortSignal).
pub trait FetchHandler: Send + Sync + 'static {
    /// Whether this handler understands middleware contexts.
    ///
    /// An adapter only runs its interceptor when this returns `true`.
    fn supports_middleware(&self) -> bool {
        false
    }

    /// Handle one request.
    fn handle<'a>(
        &'a self,
        request: FetchRequest,
        context: HandlerContext<'a>,
    ) -> BoxFuture<'a, Result<FetchResponse, BoxError>>;
}

/// Produces the per-request [`LoadContext`] in direct mode.
///
/// Plain closures returning `Result<LoadContext, BoxError>` implement this
/// trait; implement it by hand for asynchronous resolution.
pub trait LoadContextResolver: Send + Sync + 'static {
    /// Resolve the context for one exchange.
    fn resolve<'a>(
        &'a self,
        request: &'a dyn ServerRequest,
        response: &'a dyn ServerResponse,
    ) -> BoxFuture<'a, Result<LoadContext, BoxError>>;
}

impl<F> LoadContextResolver for F
where
    F: Fn(&dyn ServerRequest, &dyn ServerResponse) -> Result<LoadContext, BoxError>
        + Send
        + Sync
        + 'static,
{
    fn resolve<'a>(
        &'a self,
        request: &'a dyn ServerRequest,
        response: &'a dyn ServerResponse,
    ) -> BoxFuture<'a, Result<LoadContext, BoxError>> {
        let resolved = self(request, response);
        Box::pin(futures::future::ready(resolved))
    }
}

/// Default handler that fails every request.
#[derive(Debug, Clone, Default)]
pub struct NotImplementedHandler;

impl FetchHandler for NotImplementedHandler {
    fn handle<'a>(
        &'a self,
        request: FetchRequest,
        _context: HandlerContext<'a>,
    ) -> BoxFuture<'a, Result<FetchResponse, BoxError>> {
        Box::pin(async move {
            Err(format!("no handler configured for {} {}", request.method(), request.uri()).into())
        })
    }
}
