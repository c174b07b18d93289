use std::time::Duration;

/// Errors that end a single streamed chat turn.
///
/// Malformed lines never surface here; they are skipped by the reader.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The response carried no body to read from.
    #[error("no stream available")]
    NoStream,
    /// Reading the next chunk from the byte stream failed.
    #[error("stream read failed: {0}")]
    Transport(String),
    /// The backend sent an explicit `type: "error"` record.
    ///
    /// Displays exactly the upstream message.
    #[error("{0}")]
    Upstream(String),
}

impl StreamError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> String {
        match self {
            Self::Upstream(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Top-level error type for `FlowStateClient` calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// The chat session has no access token.
    #[error("authentication required")]
    Unauthenticated,
    /// The call needs a thread id and the session has none.
    #[error("chat session has no thread id")]
    MissingThread,
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// The request could not be sent or its response not read.
    #[error("transport error: {0}")]
    Transport(String),
    /// The backend answered with a non-success status.
    #[error("backend returned status {status}: {body}")]
    Http { status: u16, body: String },
    /// The backend answered with a body of unexpected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The streamed turn did not finish within the configured limit.
    #[error("stream timed out after {0:?}")]
    Timeout(Duration),
    /// The streamed turn failed after the response was opened.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl ClientError {
    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }
}
