use std::fmt;
use std::sync::Arc;

/// Event name used by [`crate::Hub::send`].
pub const DEFAULT_EVENT: &str = "message";

/// A pre-formatted event-stream record.
///
/// Frames are built once per broadcast and shared by every subscriber, so
/// cloning only bumps a reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Arc<str>);

impl Frame {
    /// Formats `event: <event>\ndata: <data>\n\n`.
    ///
    /// `data` is written as a single `data:` line and is not split on
    /// embedded newlines.
    pub fn new(event: &str, data: &str) -> Self {
        let mut record = String::with_capacity(event.len() + data.len() + 16);
        record.push_str("event: ");
        record.push_str(event);
        record.push('\n');
        record.push_str("data: ");
        record.push_str(data);
        record.push_str("\n\n");
        Self(record.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}
