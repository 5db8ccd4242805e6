//! Server-Sent Events (SSE) broadcasting.
//!
//! This crate provides the transport-agnostic core of the event stream: a
//! [`Hub`] that fans pre-formatted frames out to every connected client.
//!
//! # Architecture
//!
//! - **One subscriber per connection**: each streaming client gets a bounded
//!   buffer of [`connection::CLIENT_BUFFER`] frames, registered for exactly as
//!   long as its serving loop runs.
//! - **Non-blocking fan-out**: a broadcast offers the frame to every buffer
//!   under a shared read lock and never waits. A full buffer means that client
//!   misses the frame; nobody else is slowed down.
//! - **Ephemeral messages**: there is no replay. Clients only see frames
//!   broadcast while they are connected.
//! - **Guaranteed cleanup**: a [`connection::Subscription`] unregisters itself
//!   on drop, so disconnects, cancelled tasks and failed writes all leave the
//!   registry consistent.
//!
//! # Wire format
//!
//! Every frame is `event: <name>\n` + `data: <payload>\n` + `\n`, with the
//! payload kept on a single `data:` line.
//!
//! # Modules
//!
//! - `connection`: subscriber registry and the RAII subscription handle
//! - `hub`: publishing API and the per-connection serving loop
//! - `message`: frame formatting
//! - `sink`: the [`EventSink`] trait implemented by the HTTP layer

pub mod connection;
pub mod error;
pub mod hub;
pub mod message;
pub mod sink;

pub use error::{Error, ErrorKind, Result};
pub use hub::Hub;
pub use message::Frame;
pub use sink::{EventSink, STREAM_HEADERS};
