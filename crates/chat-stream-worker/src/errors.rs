/// Failures observed while fetching or decoding one task's stream.
///
/// The `Display` text is the human-readable message delivered to the caller;
/// internal detail (for example the underlying `reqwest` error) is kept in the
/// variant for logging only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Server answered `401 Unauthorized`.
    #[error("authentication failed, verify credential")]
    Authentication,
    /// Server answered with a non-success status other than 401.
    #[error("request failed, status code: {status}")]
    TransportStatus { status: u16 },
    /// Success status, but the response carries no readable body.
    #[error("server returned no stream data")]
    EmptyBody,
    /// Sending the request or reading a chunk failed.
    #[error("request failed, retry later")]
    Network { detail: String },
    /// One SSE event carried a payload that is not valid JSON.
    #[error("error parsing stream data, retry later")]
    Parse { detail: String },
}

impl StreamError {
    /// Creates a network failure with internal detail.
    pub fn network(detail: impl Into<String>) -> Self {
        Self::Network {
            detail: detail.into(),
        }
    }

    /// Creates a parse failure with internal detail.
    pub fn parse(detail: impl Into<String>) -> Self {
        Self::Parse {
            detail: detail.into(),
        }
    }

    /// Returns `false` only for per-event parse failures, which never end a task.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Parse { .. })
    }

    /// Returns the fixed message shown to end users.
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// Returns the internal detail when the variant carries one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Network { detail } | Self::Parse { detail } => Some(detail),
            _ => None,
        }
    }
}

/// Top-level error type for the worker API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// Invalid client or worker configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid task request.
    #[error("validation error: {0}")]
    Validation(String),
    /// Task ended with a terminal failure.
    #[error(transparent)]
    Failed(StreamError),
    /// Task channel closed before a terminal event was observed.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl WorkerError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<StreamError> for WorkerError {
    fn from(value: StreamError) -> Self {
        WorkerError::Failed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_message_embeds_code() {
        let err = StreamError::TransportStatus { status: 503 };
        assert_eq!(err.user_message(), "request failed, status code: 503");
        assert!(err.is_terminal());
    }

    #[test]
    fn parse_errors_are_not_terminal_and_hide_detail() {
        let err = StreamError::parse("expected value at line 1 column 1");
        assert!(!err.is_terminal());
        assert_eq!(err.user_message(), "error parsing stream data, retry later");
        assert_eq!(err.detail(), Some("expected value at line 1 column 1"));
    }

    #[test]
    fn failed_worker_error_displays_stream_message() {
        let err = WorkerError::from(StreamError::Authentication);
        assert_eq!(err.to_string(), "authentication failed, verify credential");
    }
}
