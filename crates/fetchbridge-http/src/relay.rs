//! Replaying a [`FetchResponse`] onto a callback server's outbound response.

use fetchbridge_core::{BridgeError, BridgeResult, FetchResponse, FetchResponseExt};
use http::header::CONTENT_TYPE;
use http::HeaderMap;
use http_body::Body;
use http_body_util::BodyExt;
use tracing::debug;

use crate::server::ServerResponse;

/// Copy status, headers and body of `response` onto `res` and finalize it.
///
/// Every header value is appended, so repeated headers such as `set-cookie`
/// arrive as separate header lines. Body frames are written as they arrive;
/// trailers are dropped.
pub async fn send_fetch_response<S>(res: &mut S, response: FetchResponse) -> BridgeResult<()>
where
    S: ServerResponse + ?Sized,
{
    let status_text = response.status_text().to_owned();
    let (parts, mut body) = response.into_parts();

    res.set_status(parts.status);
    if !status_text.is_empty() {
        res.set_status_message(&status_text);
    }
    for (name, value) in &parts.headers {
        res.append_header(name.clone(), value.clone());
    }
    if is_event_stream(&parts.headers) {
        res.flush_headers();
    }

    if body.is_end_stream() {
        debug!(status = %parts.status, "relaying response without body");
        return res.end().await.map_err(BridgeError::Write);
    }

    let mut written = 0usize;
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(BridgeError::Body)?;
        let Ok(data) = frame.into_data() else {
            continue;
        };
        if data.is_empty() {
            continue;
        }
        written += data.len();
        res.write(data).await.map_err(BridgeError::Write)?;
    }

    debug!(status = %parts.status, bytes = written, "relayed streamed response");
    res.end().await.map_err(BridgeError::Write)
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("text/event-stream"))
}
