//! Demo application served by the binary.
//!
//! | Route | Behavior |
//! |-------|----------|
//! | `GET /` | plain-text greeting |
//! | `POST /echo` | streams the request body back |
//! | `GET /cookies` | two `set-cookie` headers |
//! | `GET /slow?ms=N` | waits `N` ms, giving up when the client disconnects |
//! | `GET /events` | a short `text/event-stream` |
//! | `GET /health`, `GET /_health` | answered by the interceptor |

use std::time::{Duration, Instant};

use bytes::Bytes;
use fetchbridge_core::{BoxError, FetchBody, FetchRequest, FetchRequestExt, FetchResponse};
use fetchbridge_http::{FetchHandler, HandlerContext, Interceptor, MiddlewareContext};
use futures::SinkExt;
use futures::future::BoxFuture;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use tracing::{debug, info};

use crate::VERSION;

/// Default delay of `/slow`.
const DEFAULT_SLOW_MS: u64 = 2_000;

/// Number of events sent by `/events`.
const EVENT_COUNT: usize = 3;

/// Interval between events sent by `/events`.
const EVENT_INTERVAL: Duration = Duration::from_millis(100);

/// When the interceptor started working on the exchange.
#[derive(Debug, Clone, Copy)]
pub struct StartedAt(pub Instant);

/// The demo application.
#[derive(Debug, Clone, Default)]
pub struct DemoHandler;

impl FetchHandler for DemoHandler {
    fn supports_middleware(&self) -> bool {
        true
    }

    fn handle<'a>(
        &'a self,
        request: FetchRequest,
        context: HandlerContext<'a>,
    ) -> BoxFuture<'a, Result<FetchResponse, BoxError>> {
        Box::pin(async move {
            if let Some(StartedAt(started)) = context.get::<StartedAt>() {
                debug!(queued_us = started.elapsed().as_micros(), "handler started");
            }

            let path = request.uri().path().to_owned();
            match (request.method().clone(), path.as_str()) {
                (Method::GET, "/") => text(StatusCode::OK, "hello from fetchbridge\n"),
                (Method::POST, "/echo") => echo(request),
                (Method::GET, "/cookies") => cookies(),
                (Method::GET, "/slow") => slow(request).await,
                (Method::GET, "/events") => Ok(events(&request)),
                _ => text(StatusCode::NOT_FOUND, "not found\n"),
            }
        })
    }
}

fn text(status: StatusCode, body: &'static str) -> Result<FetchResponse, BoxError> {
    let response = http::Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(FetchBody::from(body))?;
    Ok(response)
}

fn echo(request: FetchRequest) -> Result<FetchResponse, BoxError> {
    let (parts, body) = request.into_parts();
    let mut builder = http::Response::builder().status(StatusCode::OK);
    if let Some(content_type) = parts.headers.get(CONTENT_TYPE) {
        builder = builder.header(CONTENT_TYPE, content_type);
    }
    Ok(builder.body(body)?)
}

fn cookies() -> Result<FetchResponse, BoxError> {
    let response = http::Response::builder()
        .status(StatusCode::OK)
        .header("set-cookie", "session=demo; Path=/; HttpOnly")
        .header("set-cookie", "theme=dark; Path=/")
        .body(FetchBody::from("cookies set\n"))?;
    Ok(response)
}

async fn slow(request: FetchRequest) -> Result<FetchResponse, BoxError> {
    let delay = request
        .uri()
        .query()
        .and_then(|query| {
            query
                .split('&')
                .find_map(|pair| pair.strip_prefix("ms="))
                .and_then(|ms| ms.parse().ok())
        })
        .unwrap_or(DEFAULT_SLOW_MS);

    let signal = request.signal();
    tokio::select! {
        () = tokio::time::sleep(Duration::from_millis(delay)) => {
            text(StatusCode::OK, "finally done\n")
        }
        () = signal.aborted() => {
            info!(delay_ms = delay, "client went away, abandoning slow response");
            Err("request aborted by client".into())
        }
    }
}

fn events(request: &FetchRequest) -> FetchResponse {
    let signal = request.signal();
    let (mut tx, rx) = futures::channel::mpsc::channel::<Result<Bytes, BoxError>>(1);

    tokio::spawn(async move {
        for id in 1..=EVENT_COUNT {
            let event = Bytes::from(format!("id: {id}\ndata: tick {id}\n\n"));
            if tx.send(Ok(event)).await.is_err() {
                break;
            }
            tokio::select! {
                () = tokio::time::sleep(EVENT_INTERVAL) => {}
                () = signal.aborted() => {
                    debug!("event stream aborted");
                    break;
                }
            }
        }
    });

    let mut response = http::Response::new(FetchBody::from_stream(rx));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    response
        .headers_mut()
        .insert("cache-control", HeaderValue::from_static("no-cache"));
    response
}

/// Answers health checks directly and stamps every other response with its
/// handling time.
#[derive(Debug, Clone, Default)]
pub struct DemoInterceptor;

impl Interceptor for DemoInterceptor {
    fn intercept<'a>(
        &'a self,
        cx: &'a mut MiddlewareContext<'_>,
    ) -> BoxFuture<'a, Result<Option<FetchResponse>, BoxError>> {
        Box::pin(async move {
            if is_health_check(cx.request().method(), cx.request().url()) {
                let body = serde_json::to_vec(&serde_json::json!({
                    "status": "running",
                    "version": VERSION,
                }))?;
                let res = cx.response_mut();
                res.set_status(StatusCode::OK);
                res.append_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                res.write(Bytes::from(body)).await?;
                res.end().await?;
                return Ok(None);
            }

            let started = Instant::now();
            cx.values_mut().insert(StartedAt(started));
            let response = cx.advance().await?;
            let elapsed = format!("{:.3}ms", started.elapsed().as_secs_f64() * 1_000.0);
            response.headers_mut().insert(
                HeaderName::from_static("x-response-time"),
                HeaderValue::from_str(&elapsed)?,
            );
            Ok(None)
        })
    }
}

/// Check whether the request targets a health-check endpoint.
fn is_health_check(method: &Method, url: &str) -> bool {
    let path = url.split('?').next().unwrap_or_default();
    *method == Method::GET && matches!(path, "/health" | "/_health")
}
