//! HTTP side of the event stream.
//!
//! The broadcast hub itself lives in the `sse` crate; this module only adapts
//! an axum response body into an [`sse::EventSink`] and exposes the handler.

pub mod handler;
