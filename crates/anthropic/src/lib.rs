//! Folds an Anthropic-style streaming response into a finished message.
//!
//! Raw bytes go through four stages:
//!
//! 1. A frame reader splits them into `data:` frame lines.
//! 2. [`decode_frame`] parses one line into a [`RawEvent`].
//! 3. [`build_chunk`] maps the event to at most one
//!    [`MessageChunk`](streamfold_message::MessageChunk).
//! 4. [`FoldResponse`] left-folds the chunks and finalizes tool calls,
//!    producing an [`AccumulatedMessage`] when the stream ends.

#[macro_use]
extern crate tracing;

mod builder;
mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::time::Duration;

use streamfold_message::{AccumulatedMessage, ToolCallParseError};

pub use builder::build_chunk;
pub use config::{StreamConfig, StreamConfigBuilder};
pub use proto::{
    BlockDelta, ContentBlock, InvocationMetrics, MessageDeltaFields,
    MessageStart, RawEvent, UsageReport, decode_frame,
};
pub use response::FoldResponse;

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A frame is not valid JSON, or a known event is malformed. The
    /// stream can continue with the next frame.
    Protocol,
    /// Tool call arguments are not valid JSON at the end of the stream.
    /// Text and the other tool calls are still valid.
    ToolCallParse,
    /// No frame arrived within the configured window.
    StreamTimeout,
    /// The byte source failed.
    Transport,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Protocol => write!(f, "Protocol error"),
            ErrorKind::ToolCallParse => write!(f, "Tool call parse error"),
            ErrorKind::StreamTimeout => write!(f, "Stream timeout"),
            ErrorKind::Transport => write!(f, "Transport error"),
        }
    }
}

/// Error type for [`FoldResponse`].
#[derive(Clone, Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
    tool_call_errors: Vec<ToolCallParseError>,
    partial: Option<Box<AccumulatedMessage>>,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
            tool_call_errors: Vec::new(),
            partial: None,
        }
    }

    fn stream_timeout(timeout: Duration) -> Self {
        Self::new(
            format!("no frame received within {timeout:?}"),
            ErrorKind::StreamTimeout,
        )
    }

    fn tool_call_parse(
        errors: Vec<ToolCallParseError>,
        partial: AccumulatedMessage,
    ) -> Self {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            message,
            kind: ErrorKind::ToolCallParse,
            tool_call_errors: errors,
            partial: Some(Box::new(partial)),
        }
    }

    #[inline]
    fn with_partial(mut self, partial: AccumulatedMessage) -> Self {
        self.partial = Some(Box::new(partial));
        self
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the tool calls that failed to parse.
    #[inline]
    pub fn tool_call_errors(&self) -> &[ToolCallParseError] {
        &self.tool_call_errors
    }

    /// Returns the part of the message that was valid before the error.
    #[inline]
    pub fn partial(&self) -> Option<&AccumulatedMessage> {
        self.partial.as_deref()
    }

    /// Consumes the error, returning the partial message.
    #[inline]
    pub fn into_partial(self) -> Option<AccumulatedMessage> {
        self.partial.map(|partial| *partial)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl StdError for Error {}

impl From<io::FramesError> for Error {
    fn from(err: io::FramesError) -> Self {
        match err {
            io::FramesError::ChunksError(err) => {
                Error::new(err.to_string(), ErrorKind::Transport)
            }
            io::FramesError::InvalidPayload => {
                Error::new("invalid event payload", ErrorKind::Protocol)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::stream_timeout(Duration::from_millis(20));
        assert_eq!(err.kind(), ErrorKind::StreamTimeout);
        assert_eq!(
            err.to_string(),
            "Stream timeout: no frame received within 20ms"
        );
        assert!(err.partial().is_none());

        let err = Error::from(io::FramesError::InvalidPayload);
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }
}
