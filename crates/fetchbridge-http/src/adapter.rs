//! The handler adapter: one exchange from inbound request to relayed
//! response.
//!
//! # Modes
//!
//! The adapter picks its strategy once, in [`FetchAdapterBuilder::build`]:
//!
//! - **Interception** when the handler reports
//!   [`supports_middleware`](FetchHandler::supports_middleware) and an
//!   [`Interceptor`] is configured. Any configured resolver is ignored.
//! - **Direct** otherwise. The optional [`LoadContextResolver`] runs before
//!   the handler, unless the handler supports middleware.
//!
//! Errors from any phase go to the callback server's [`Next`]. The adapter
//! never writes an error response itself.

use std::fmt;
use std::sync::Arc;

use fetchbridge_core::{BridgeError, BridgeResult, Mode};
use tracing::{debug, warn};

use crate::handler::{FetchHandler, HandlerContext, LoadContextResolver};
use crate::middleware::{Interceptor, MiddlewareContext};
use crate::relay::send_fetch_response;
use crate::request::create_fetch_request;
use crate::server::{Next, ServerRequest, ServerResponse};

enum Strategy {
    Direct {
        resolver: Option<Arc<dyn LoadContextResolver>>,
    },
    Intercept {
        interceptor: Arc<dyn Interceptor>,
    },
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { resolver } => f
                .debug_struct("Direct")
                .field("resolver", &resolver.as_ref().map(|_| "..."))
                .finish(),
            Self::Intercept { .. } => f.debug_struct("Intercept").finish_non_exhaustive(),
        }
    }
}

/// Serves a [`FetchHandler`] on a callback-style server.
///
/// Cheap to clone; all configuration is shared and read-only.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use fetchbridge_core::{BoxError, FetchBody, FetchRequest, FetchResponse, Mode};
/// use fetchbridge_http::{
///     FetchAdapter, FetchHandler, HandlerContext, IncomingRequest, OutgoingResponse,
///     ServerResponse,
/// };
/// use futures::future::BoxFuture;
///
/// struct Hello;
///
/// impl FetchHandler for Hello {
///     fn handle<'a>(
///         &'a self,
///         _request: FetchRequest,
///         _context: HandlerContext<'a>,
///     ) -> BoxFuture<'a, Result<FetchResponse, BoxError>> {
///         Box::pin(async { Ok(http::Response::new(FetchBody::from("hello"))) })
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let adapter = FetchAdapter::builder(Arc::new(Hello)).mode(Mode::Test).build();
///
/// let mut req = IncomingRequest::new(http::Method::GET, "/").with_host("localhost");
/// let (mut res, _pending) = OutgoingResponse::channel();
/// adapter.try_serve(&mut req, &mut res).await.unwrap();
/// assert!(res.is_finished());
/// # });
/// ```
pub struct FetchAdapter<H: FetchHandler> {
    handler: Arc<H>,
    strategy: Arc<Strategy>,
    mode: Mode,
}

impl<H: FetchHandler> fmt::Debug for FetchAdapter<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchAdapter")
            .field("strategy", &self.strategy)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl<H: FetchHandler> Clone for FetchAdapter<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            strategy: Arc::clone(&self.strategy),
            mode: self.mode,
        }
    }
}

impl<H: FetchHandler> FetchAdapter<H> {
    /// Create an adapter in direct mode with the ambient operating mode.
    pub fn new(handler: Arc<H>) -> Self {
        Self::builder(handler).build()
    }

    /// Start configuring an adapter.
    pub fn builder(handler: Arc<H>) -> FetchAdapterBuilder<H> {
        FetchAdapterBuilder {
            handler,
            resolver: None,
            interceptor: None,
            mode: None,
        }
    }

    /// Operating mode handed to the handler.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether exchanges run through the interceptor.
    #[must_use]
    pub fn is_intercepting(&self) -> bool {
        matches!(*self.strategy, Strategy::Intercept { .. })
    }

    /// Run one exchange, handing any failure to `next`.
    pub async fn serve<N: Next>(
        &self,
        req: &mut dyn ServerRequest,
        res: &mut dyn ServerResponse,
        next: N,
    ) {
        if let Err(err) = self.try_serve(req, res).await {
            warn!(phase = ?err.phase(), error = %err, "exchange failed, forwarding error");
            next.call(err);
        }
    }

    /// Run one exchange and return the failure instead of forwarding it.
    pub async fn try_serve(
        &self,
        req: &mut dyn ServerRequest,
        res: &mut dyn ServerResponse,
    ) -> BridgeResult<()> {
        match &*self.strategy {
            Strategy::Direct { resolver } => {
                self.serve_direct(resolver.as_deref(), req, res).await
            }
            Strategy::Intercept { interceptor } => {
                self.serve_intercepted(interceptor.as_ref(), req, res).await
            }
        }
    }

    async fn serve_direct(
        &self,
        resolver: Option<&dyn LoadContextResolver>,
        req: &mut dyn ServerRequest,
        res: &mut dyn ServerResponse,
    ) -> BridgeResult<()> {
        let mut request = create_fetch_request(&mut *req, &mut *res)?;
        request.extensions_mut().insert(self.mode);

        let context = match resolver {
            Some(resolver) if !self.handler.supports_middleware() => {
                let values = resolver
                    .resolve(&*req, &*res)
                    .await
                    .map_err(BridgeError::LoadContext)?;
                HandlerContext::Load(values)
            }
            _ => HandlerContext::Empty,
        };

        debug!(method = %request.method(), uri = %request.uri(), "invoking handler");
        let response = self
            .handler
            .handle(request, context)
            .await
            .map_err(BridgeError::Handler)?;

        send_fetch_response(res, response).await
    }

    async fn serve_intercepted(
        &self,
        interceptor: &dyn Interceptor,
        req: &mut dyn ServerRequest,
        res: &mut dyn ServerResponse,
    ) -> BridgeResult<()> {
        let mut cx =
            MiddlewareContext::new(&mut *req, &mut *res, self.handler.as_ref(), self.mode);

        let replacement = interceptor
            .intercept(&mut cx)
            .await
            .map_err(BridgeError::from_interceptor)?;

        if replacement.is_none() && !cx.is_advanced() && !cx.response().headers_sent() {
            debug!("interceptor did not advance, running continuation");
            cx.advance().await?;
        }

        let recorded = cx.into_recorded();
        if res.headers_sent() {
            debug!("headers already sent by interceptor, skipping relay");
            return Ok(());
        }

        match replacement.or(recorded) {
            Some(response) => send_fetch_response(res, response).await,
            None => Err(BridgeError::ContinuationFailed),
        }
    }
}

/// Builder for [`FetchAdapter`].
pub struct FetchAdapterBuilder<H: FetchHandler> {
    handler: Arc<H>,
    resolver: Option<Arc<dyn LoadContextResolver>>,
    interceptor: Option<Arc<dyn Interceptor>>,
    mode: Option<Mode>,
}

impl<H: FetchHandler> fmt::Debug for FetchAdapterBuilder<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchAdapterBuilder")
            .field("resolver", &self.resolver.is_some())
            .field("interceptor", &self.interceptor.is_some())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl<H: FetchHandler> FetchAdapterBuilder<H> {
    /// Resolve a [`LoadContext`](crate::handler::LoadContext) per request in
    /// direct mode.
    #[must_use]
    pub fn resolver(mut self, resolver: impl LoadContextResolver) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Wrap the handler with an interceptor.
    #[must_use]
    pub fn interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptor = Some(Arc::new(interceptor));
        self
    }

    /// Override the operating mode. Defaults to [`Mode::from_env`].
    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Fix the strategy and build the adapter.
    pub fn build(self) -> FetchAdapter<H> {
        let supports_middleware = self.handler.supports_middleware();
        let strategy = match self.interceptor {
            Some(interceptor) if supports_middleware => {
                if self.resolver.is_some() {
                    warn!("handler supports middleware, ignoring load context resolver");
                }
                Strategy::Intercept { interceptor }
            }
            Some(_) => {
                warn!("handler does not support middleware, ignoring interceptor");
                Strategy::Direct {
                    resolver: self.resolver,
                }
            }
            None => Strategy::Direct {
                resolver: self.resolver,
            },
        };

        FetchAdapter {
            handler: self.handler,
            strategy: Arc::new(strategy),
            mode: self.mode.unwrap_or_else(Mode::from_env),
        }
    }
}
