//! Building a [`FetchRequest`] from a callback server's inbound request.

use fetchbridge_core::{
    AbortController, BridgeError, BridgeResult, FetchBody, FetchRequest, translate_headers_into,
};
use http::uri::{Authority, PathAndQuery, Scheme, Uri};
use http::Method;
use tracing::debug;

use crate::server::{ServerRequest, ServerResponse};

/// Assemble the absolute request URL from its parts.
///
/// A path that does not start with `/` is prefixed with one, so `//x` style
/// inputs never turn into a different authority.
pub fn resolve_url(protocol: &str, host: &str, path: &str) -> BridgeResult<Uri> {
    if host.is_empty() {
        return Err(BridgeError::MissingHost);
    }

    let path = if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    };

    let invalid = |source: http::Error| BridgeError::InvalidUrl {
        url: format!("{protocol}://{host}{path}"),
        source,
    };

    let scheme = Scheme::try_from(protocol).map_err(|e| invalid(e.into()))?;
    let authority = Authority::try_from(host).map_err(|e| invalid(e.into()))?;
    let path_and_query = PathAndQuery::try_from(path.as_str()).map_err(|e| invalid(e.into()))?;

    Uri::builder()
        .scheme(scheme)
        .authority(authority)
        .path_and_query(path_and_query)
        .build()
        .map_err(invalid)
}

/// Build the standards request for one exchange.
///
/// The returned request carries an [`AbortSignal`](fetchbridge_core::AbortSignal)
/// that fires when `res` reports its connection closed. `GET` and `HEAD`
/// requests always get an empty body; other methods take the inbound body
/// stream as-is.
pub fn create_fetch_request<Q, S>(req: &mut Q, res: &mut S) -> BridgeResult<FetchRequest>
where
    Q: ServerRequest + ?Sized,
    S: ServerResponse + ?Sized,
{
    let host = req
        .host()
        .filter(|host| !host.is_empty())
        .ok_or(BridgeError::MissingHost)?;
    let uri = resolve_url(req.protocol(), host, req.url())?;
    let method = req.method().clone();

    let controller = AbortController::new();
    let signal = controller.signal();
    res.on_close(Box::new(move || {
        if controller.abort() {
            debug!("outbound connection closed, request signal aborted");
        }
    }));

    let body = if matches!(method, Method::GET | Method::HEAD) {
        FetchBody::empty()
    } else {
        req.take_body().unwrap_or_default()
    };

    let mut builder = http::Request::builder().method(method).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        translate_headers_into(req.headers(), headers);
    }

    let mut request = builder.body(body)?;
    request.extensions_mut().insert(signal);
    Ok(request)
}
