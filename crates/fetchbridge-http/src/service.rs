//! Hyper `Service` running one bridged exchange per request.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use fetchbridge_core::{BoxError, BridgeError, Mode};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use http::StatusCode;
use http_body::Body;
use tracing::{Instrument, debug, warn};

use crate::adapter::FetchAdapter;
use crate::exchange::{ExchangeBody, ExchangeOptions, IncomingRequest, OutgoingResponse};
use crate::handler::FetchHandler;
use crate::server::ServerResponse;

/// Hyper `Service` implementation for a [`FetchAdapter`].
///
/// Every request becomes an [`IncomingRequest`] / [`OutgoingResponse`] pair
/// and is served on its own task, so the handler keeps running (and can
/// observe its abort signal) after the client disconnects. Errors the
/// adapter forwards are answered by a final error handler: `500 text/plain`
/// while headers are unsent, otherwise the response stream is aborted.
pub struct BridgeHttpService<H: FetchHandler> {
    adapter: FetchAdapter<H>,
    options: Arc<ExchangeOptions>,
}

impl<H: FetchHandler> BridgeHttpService<H> {
    /// Create a new `BridgeHttpService`.
    pub fn new(adapter: FetchAdapter<H>, options: ExchangeOptions) -> Self {
        Self {
            adapter,
            options: Arc::new(options),
        }
    }

    /// The adapter serving each exchange.
    pub fn adapter(&self) -> &FetchAdapter<H> {
        &self.adapter
    }
}

impl<H: FetchHandler> fmt::Debug for BridgeHttpService<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeHttpService")
            .field("adapter", &self.adapter)
            .field("options", &self.options)
            .finish()
    }
}

impl<H: FetchHandler> Clone for BridgeHttpService<H> {
    fn clone(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
            options: Arc::clone(&self.options),
        }
    }
}

impl<H, B> hyper::service::Service<http::Request<B>> for BridgeHttpService<H>
where
    H: FetchHandler,
    B: Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<ExchangeBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let adapter = self.adapter.clone();
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "exchange",
            request_id = %request_id,
            method = %req.method(),
            path = %req.uri().path(),
        );

        let (outgoing, pending) = OutgoingResponse::channel_for(req.method());
        let incoming = IncomingRequest::from_hyper(req, &self.options);
        tokio::spawn(run_exchange(adapter, incoming, outgoing).instrument(span));

        Box::pin(async move {
            let response = match pending.head().await {
                Some(head) => head,
                None => {
                    warn!(request_id = %request_id, "exchange ended without a response");
                    fallback_response()
                }
            };
            Ok(add_common_headers(response, &request_id))
        })
    }
}

/// Serve one exchange and answer any forwarded error.
async fn run_exchange<H: FetchHandler>(
    adapter: FetchAdapter<H>,
    mut req: IncomingRequest,
    mut res: OutgoingResponse,
) {
    let mut failure = None;
    adapter
        .serve(&mut req, &mut res, |err: BridgeError| failure = Some(err))
        .await;

    if let Some(err) = failure {
        respond_with_error(&mut res, &err, adapter.mode()).await;
    }
    debug!("exchange finished");
}

/// Final error handler of the callback server.
async fn respond_with_error(res: &mut OutgoingResponse, err: &BridgeError, mode: Mode) {
    if res.headers_sent() {
        debug!("headers already sent, aborting response stream");
        res.destroy();
        return;
    }

    let body = if mode.is_development() {
        format!("Internal Server Error: {err}\n")
    } else {
        "Internal Server Error\n".to_owned()
    };

    res.clear_headers();
    res.set_status(StatusCode::INTERNAL_SERVER_ERROR);
    res.append_header(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    res.append_header(CONTENT_LENGTH, HeaderValue::from(body.len()));

    if let Err(e) = res.write(Bytes::from(body)).await {
        debug!(error = %e, "failed to write error response");
        return;
    }
    if let Err(e) = res.end().await {
        debug!(error = %e, "failed to finish error response");
    }
}

fn fallback_response() -> http::Response<ExchangeBody> {
    let mut response = http::Response::new(ExchangeBody::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Add common response headers to every response.
fn add_common_headers(
    mut response: http::Response<ExchangeBody>,
    request_id: &str,
) -> http::Response<ExchangeBody> {
    if let Ok(hv) = HeaderValue::from_str(request_id) {
        response.headers_mut().entry("x-request-id").or_insert(hv);
    }
    response
}
