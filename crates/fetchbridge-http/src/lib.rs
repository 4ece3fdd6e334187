//! Bridge between callback-style HTTP servers and fetch-standard handlers.
//!
//! This crate provides:
//!
//! - **Server traits**: the callback server's request/response pair and its
//!   error continuation ([`ServerRequest`], [`ServerResponse`], [`Next`])
//! - **Request builder**: inbound request to [`FetchRequest`](fetchbridge_core::FetchRequest),
//!   with an abort signal tied to the outbound connection
//! - **Response relay**: [`FetchResponse`](fetchbridge_core::FetchResponse) back
//!   onto the outbound response, streamed
//! - **Adapter**: direct and middleware-interception modes around one
//!   [`FetchHandler`] call
//! - **Exchange / Service**: a hyper-backed callback server and a hyper
//!   `Service` that serves an adapter

pub mod adapter;
pub mod exchange;
pub mod handler;
pub mod middleware;
pub mod relay;
pub mod request;
pub mod server;
pub mod service;

pub use adapter::{FetchAdapter, FetchAdapterBuilder};
pub use exchange::{
    ExchangeBody, ExchangeOptions, IncomingRequest, OutgoingResponse, PendingResponse,
};
pub use handler::{
    FetchHandler, HandlerContext, LoadContext, LoadContextResolver, NotImplementedHandler,
};
pub use middleware::{Interceptor, MiddlewareContext};
pub use relay::send_fetch_response;
pub use request::{create_fetch_request, resolve_url};
pub use server::{CloseCallback, Next, ServerRequest, ServerResponse};
pub use service::BridgeHttpService;
