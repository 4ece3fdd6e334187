//! Core types for fetchbridge.
//!
//! This crate provides the fetch-standard side of the bridge: the
//! [`FetchBody`] used by standards requests and responses, the header
//! translator that turns a callback server's raw header collection into an
//! [`http::HeaderMap`], the one-shot [`AbortController`] / [`AbortSignal`]
//! pair, configuration, and the error type shared by every crate in the
//! workspace.

mod body;
mod config;
mod error;
pub mod headers;
mod signal;
mod types;

pub use body::{BoxError, FetchBody};
pub use config::{BridgeConfig, Mode};
pub use error::{BridgeError, BridgeResult, ErrorPhase};
pub use headers::{RawHeaderValue, RawHeaders, translate_headers, translate_headers_into};
pub use signal::{AbortController, AbortSignal};
pub use types::{FetchRequest, FetchRequestExt, FetchResponse, FetchResponseExt, StatusText};
