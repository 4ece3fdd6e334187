//! Body type shared by fetch-standard requests and responses.
//!
//! [`FetchBody`] supports three modes:
//!
//! - **Empty**: no content (body-less methods, 204/304 responses).
//! - **Buffered**: small payloads produced in memory by a handler.
//! - **Streaming**: a type-erased [`http_body::Body`], used for inbound uploads
//!   and for responses rendered incrementally. Streaming bodies are never
//!   collected by the bridge itself.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use http_body::{Body, Frame, SizeHint};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};

/// Boxed error type used at the collaborator boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body of a [`FetchRequest`](crate::FetchRequest) or
/// [`FetchResponse`](crate::FetchResponse).
#[derive(Debug, Default)]
pub enum FetchBody {
    /// No content.
    #[default]
    Empty,
    /// Fully buffered content.
    Buffered(Full<Bytes>),
    /// Content produced frame by frame.
    Streaming(BoxBody<Bytes, BoxError>),
}

impl FetchBody {
    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create a buffered body from a UTF-8 string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self::Buffered(Full::new(Bytes::from(s.into())))
    }

    /// Wrap any `http_body::Body` without buffering it.
    pub fn from_body<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        Self::Streaming(body.map_err(Into::into).boxed())
    }

    /// Wrap a stream of byte chunks without buffering it.
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let frames = stream.map(|chunk| -> Result<Frame<Bytes>, BoxError> {
            chunk.map(Frame::data).map_err(Into::into)
        });
        Self::Streaming(BoxBody::new(StreamBody::new(frames)))
    }

    /// Whether this body is backed by a stream.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }

    /// Read the whole body into memory.
    ///
    /// Intended for handlers and tests; the bridge never calls this on the
    /// relay path.
    pub async fn bytes(self) -> Result<Bytes, BoxError> {
        Ok(self.collect().await?.to_bytes())
    }

    /// Read the whole body as UTF-8 text.
    pub async fn text(self) -> Result<String, BoxError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

impl From<Bytes> for FetchBody {
    fn from(data: Bytes) -> Self {
        Self::from_bytes(data)
    }
}

impl From<Vec<u8>> for FetchBody {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}

impl From<String> for FetchBody {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl From<&'static str> for FetchBody {
    fn from(s: &'static str) -> Self {
        Self::from_bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl Body for FetchBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Empty => Poll::Ready(None),
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Streaming(inner) => Pin::new(inner).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Buffered(full) => full.is_end_stream(),
            Self::Streaming(inner) => inner.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Self::Empty => SizeHint::with_exact(0),
            Self::Buffered(full) => full.size_hint(),
            Self::Streaming(inner) => inner.size_hint(),
        }
    }
}
