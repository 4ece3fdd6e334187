//! Fetch-standard request and response aliases.

use std::borrow::Cow;
use std::fmt;

use crate::body::FetchBody;
use crate::config::Mode;
use crate::signal::AbortSignal;

/// A standards-form request handed to the application handler.
pub type FetchRequest = http::Request<FetchBody>;

/// A standards-form response returned by the application handler.
pub type FetchResponse = http::Response<FetchBody>;

/// Custom status message carried in a response's extensions.
///
/// When absent, the canonical reason phrase of the status code is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusText(Cow<'static, str>);

impl StatusText {
    /// Create a status text.
    pub fn new(text: impl Into<Cow<'static, str>>) -> Self {
        Self(text.into())
    }

    /// The status text as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatusText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accessors for data the bridge attaches to a [`FetchRequest`].
pub trait FetchRequestExt {
    /// Abort signal tied to the outbound connection.
    ///
    /// Requests not built by the bridge get a signal that never fires.
    fn signal(&self) -> AbortSignal;

    /// Operating mode the adapter was configured with, if any.
    fn mode(&self) -> Option<Mode>;
}

impl FetchRequestExt for FetchRequest {
    fn signal(&self) -> AbortSignal {
        self.extensions()
            .get::<AbortSignal>()
            .cloned()
            .unwrap_or_default()
    }

    fn mode(&self) -> Option<Mode> {
        self.extensions().get::<Mode>().copied()
    }
}

/// Accessors for a [`FetchResponse`] status line.
pub trait FetchResponseExt {
    /// Status message to send, falling back to the canonical reason phrase.
    fn status_text(&self) -> &str;

    /// Set a custom status message.
    fn set_status_text(&mut self, text: impl Into<Cow<'static, str>>);
}

impl FetchResponseExt for FetchResponse {
    fn status_text(&self) -> &str {
        self.extensions().get::<StatusText>().map_or_else(
            || self.status().canonical_reason().unwrap_or_default(),
            StatusText::as_str,
        )
    }

    fn set_status_text(&mut self, text: impl Into<Cow<'static, str>>) {
        self.extensions_mut().insert(StatusText::new(text));
    }
}
