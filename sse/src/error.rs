//! Error types for the `sse` crate.
//!
//! Follows the same pattern as the other crates in the workspace: a root `Error`
//! struct holding an `error_kind` and the optional underlying `source`.

use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The transport cannot flush frames to the client incrementally.
    StreamingUnsupported,
    /// A `send_json` payload could not be serialized.
    Serialization,
    /// Writing or flushing a frame to the transport failed.
    Transport,
}

impl Error {
    pub fn streaming_unsupported() -> Self {
        Self {
            source: None,
            error_kind: ErrorKind::StreamingUnsupported,
        }
    }

    pub fn transport(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            source: Some(err.into()),
            error_kind: ErrorKind::Transport,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.error_kind, &self.source) {
            (ErrorKind::StreamingUnsupported, _) => write!(f, "streaming unsupported"),
            (ErrorKind::Serialization, Some(source)) => {
                write!(f, "sse: failed to marshal JSON: {source}")
            }
            (ErrorKind::Serialization, None) => write!(f, "sse: failed to marshal JSON"),
            (ErrorKind::Transport, Some(source)) => write!(f, "sse: transport error: {source}"),
            (ErrorKind::Transport, None) => write!(f, "sse: transport error"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Serialization,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::transport(err)
    }
}
