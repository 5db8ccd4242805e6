use crate::error::Result;
use crate::message::Frame;
use async_trait::async_trait;

/// Response headers that open an event stream.
pub const STREAM_HEADERS: [(&str, &str); 3] = [
    ("Content-Type", "text/event-stream"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
];

/// The writing half of one streaming client connection.
///
/// Implemented by the HTTP layer on top of its response body. The serving loop
/// in [`crate::Hub::serve`] owns the sink for the lifetime of the connection.
#[async_trait]
pub trait EventSink: Send {
    /// Whether frames written to this sink reach the client before the
    /// response completes. Sinks that can only buffer the whole response are
    /// rejected before a subscriber is registered.
    fn supports_flush(&self) -> bool;

    /// Emit [`STREAM_HEADERS`] and flush so the client sees the stream open
    /// before any event arrives.
    async fn open(&mut self) -> Result<()>;

    async fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    async fn flush(&mut self) -> Result<()>;
}
