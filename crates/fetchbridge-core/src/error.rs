//! Error types for fetchbridge.

use crate::body::BoxError;

/// Stage of an exchange at which an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorPhase {
    /// Building the standards request (malformed host or URL).
    Construction,
    /// Resolving the load context or running the application handler.
    Handler,
    /// Running caller-supplied interception logic.
    Interception,
    /// Writing the response back onto the callback server.
    Relay,
    /// Invalid configuration.
    Config,
}

/// Error raised while bridging one exchange.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The inbound request carries no usable host.
    #[error("inbound request has no host")]
    MissingHost,

    /// The absolute request URL could not be assembled.
    #[error("invalid request URL {url:?}: {source}")]
    InvalidUrl {
        /// The URL as far as it could be assembled.
        url: String,
        /// The underlying parse failure.
        #[source]
        source: http::Error,
    },

    /// The standards request could not be built.
    #[error("failed to build request: {0}")]
    Request(#[from] http::Error),

    /// The load context resolver failed.
    #[error("load context resolver failed: {0}")]
    LoadContext(#[source] BoxError),

    /// The application handler failed.
    #[error("request handler failed: {0}")]
    Handler(#[source] BoxError),

    /// The continuation was invoked again after failing.
    #[error("continuation already failed for this exchange")]
    ContinuationFailed,

    /// Caller-supplied interception logic failed.
    #[error("interceptor failed: {0}")]
    Interceptor(#[source] BoxError),

    /// The response body stream yielded an error mid-relay.
    #[error("response body stream failed: {0}")]
    Body(#[source] BoxError),

    /// Writing to the outbound response failed.
    #[error("failed to write response: {0}")]
    Write(#[source] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Wrap an interceptor failure, unwrapping bridge errors that were
    /// propagated through it unchanged.
    #[must_use]
    pub fn from_interceptor(err: BoxError) -> Self {
        match err.downcast::<Self>() {
            Ok(bridge) => *bridge,
            Err(other) => Self::Interceptor(other),
        }
    }

    /// The stage of the exchange this error belongs to.
    #[must_use]
    pub fn phase(&self) -> ErrorPhase {
        match self {
            Self::MissingHost | Self::InvalidUrl { .. } | Self::Request(_) => {
                ErrorPhase::Construction
            }
            Self::LoadContext(_) | Self::Handler(_) | Self::ContinuationFailed => {
                ErrorPhase::Handler
            }
            Self::Interceptor(_) => ErrorPhase::Interception,
            Self::Body(_) | Self::Write(_) => ErrorPhase::Relay,
            Self::Config(_) => ErrorPhase::Config,
        }
    }
}

/// Convenience result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
