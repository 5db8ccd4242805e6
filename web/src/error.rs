//! Error types for the `web` layer.
//!
//! Errors are modeled as a root `Error` holding a tree of `error_kind` enums
//! plus the original `source`. Request errors carry the HTTP status they map
//! to, configuration errors are raised while assembling the server and are
//! fatal at startup, and internal errors surface as 500 responses.

use std::error::Error as StdError;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::*;
use serde::Serialize;

use crate::csp::pattern::ParsePatternError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
    message: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Request(RequestErrorKind),
    Config(ConfigErrorKind),
    Internal(InternalErrorKind),
}

/// Client errors, each mapping to one HTTP status.
#[derive(Debug, PartialEq)]
pub enum RequestErrorKind {
    NotFound,
}

#[derive(Debug, PartialEq)]
pub enum ConfigErrorKind {
    DuplicatePattern,
    InvalidPattern,
    PolicyFile,
}

#[derive(Debug, PartialEq)]
pub enum InternalErrorKind {
    StreamingUnsupported,
    Serialization,
    Transport,
    Server,
    Other,
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: &'static str,
    error: String,
}

impl Error {
    fn new(error_kind: ErrorKind) -> Self {
        Self {
            source: None,
            error_kind,
            message: None,
        }
    }

    pub fn request(kind: RequestErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(ErrorKind::Request(kind))
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(ErrorKind::Internal(InternalErrorKind::Other))
        }
    }

    pub fn server(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            source: Some(err.into()),
            ..Self::new(ErrorKind::Internal(InternalErrorKind::Server))
        }
    }

    pub(crate) fn invalid_pattern(err: ParsePatternError) -> Self {
        Self {
            source: Some(Box::new(err)),
            ..Self::new(ErrorKind::Config(ConfigErrorKind::InvalidPattern))
        }
    }

    pub(crate) fn duplicate_pattern(pattern: &str, existing: &str) -> Self {
        let message = if pattern == existing {
            format!("multiple registrations for {pattern}")
        } else {
            format!("multiple registrations for {pattern} (conflicts with {existing})")
        };
        Self {
            message: Some(message),
            ..Self::new(ErrorKind::Config(ConfigErrorKind::DuplicatePattern))
        }
    }

    pub(crate) fn policy_file(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            source: Some(err.into()),
            ..Self::new(ErrorKind::Config(ConfigErrorKind::PolicyFile))
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.error_kind {
            ErrorKind::Request(kind) => match kind {
                RequestErrorKind::NotFound => StatusCode::NOT_FOUND,
            },
            ErrorKind::Config(_) | ErrorKind::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let prefix = match &self.error_kind {
            ErrorKind::Request(_) => {
                let status = self.status_code();
                status
                    .canonical_reason()
                    .unwrap_or(status.as_str())
                    .to_lowercase()
            }
            ErrorKind::Config(ConfigErrorKind::DuplicatePattern) => "web".to_owned(),
            ErrorKind::Config(ConfigErrorKind::InvalidPattern) => "web".to_owned(),
            ErrorKind::Config(ConfigErrorKind::PolicyFile) => {
                "invalid Content-Security-Policy file".to_owned()
            }
            ErrorKind::Internal(InternalErrorKind::StreamingUnsupported) => {
                "streaming unsupported".to_owned()
            }
            ErrorKind::Internal(InternalErrorKind::Serialization) => {
                "serialization failed".to_owned()
            }
            ErrorKind::Internal(InternalErrorKind::Transport) => "transport error".to_owned(),
            ErrorKind::Internal(InternalErrorKind::Server) => "server error".to_owned(),
            ErrorKind::Internal(InternalErrorKind::Other) => "internal error".to_owned(),
        };

        f.write_str(&prefix)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<sse::Error> for Error {
    fn from(err: sse::Error) -> Self {
        let kind = match err.error_kind {
            sse::ErrorKind::StreamingUnsupported => InternalErrorKind::StreamingUnsupported,
            sse::ErrorKind::Serialization => InternalErrorKind::Serialization,
            sse::ErrorKind::Transport => InternalErrorKind::Transport,
        };
        Self {
            source: err.source,
            ..Self::new(ErrorKind::Internal(kind))
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Details of server-side failures stay in the log.
        let error = match &self.error_kind {
            ErrorKind::Request(_) => self.to_string(),
            ErrorKind::Config(_) | ErrorKind::Internal(_) => {
                error!("{status}: {self}");
                status
                    .canonical_reason()
                    .unwrap_or("internal server error")
                    .to_lowercase()
            }
        };

        (
            status,
            Json(ErrorResponse {
                status: "error",
                error,
            }),
        )
            .into_response()
    }
}
