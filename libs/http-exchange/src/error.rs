use std::io;
use thiserror::Error;

/// Coarse classification of a [`ClientError`].
///
/// Lets callers tell programmer mistakes (state, configuration) apart from
/// transient transport failures without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request or response was used out of order (e.g. body read after close)
    State,
    /// The request could not be configured (bad URL, header, certificate, file)
    Configuration,
    /// Connect, TLS handshake, write or read failed
    Io,
    /// The response body was not valid structured data
    Parse,
}

/// Errors produced while building, sending or reading an HTTP exchange
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("State error: {0}")]
    State(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ClientError {
    pub(crate) fn state(msg: impl Into<String>) -> Self {
        ClientError::State(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        ClientError::Configuration(msg.into())
    }

    /// Which of the four error classes this error belongs to
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::State(_) => ErrorKind::State,
            ClientError::Configuration(_) => ErrorKind::Configuration,
            ClientError::Connection(_)
            | ClientError::Timeout(_)
            | ClientError::Io(_)
            | ClientError::Transport(_) => ErrorKind::Io,
            ClientError::Parse(_) => ErrorKind::Parse,
        }
    }

    /// Whether retrying the same exchange could succeed.
    ///
    /// Only transport failures qualify; the crate itself never retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Io
    }

    /// Classify a reqwest failure raised while the exchange was on the wire
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(err.to_string())
        } else if err.is_connect() {
            ClientError::Connection(err.to_string())
        } else if err.is_builder() {
            ClientError::Configuration(err.to_string())
        } else {
            ClientError::Transport(err)
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ClientError::state("x").kind(), ErrorKind::State);
        assert_eq!(ClientError::config("x").kind(), ErrorKind::Configuration);
        assert_eq!(ClientError::Connection("refused".into()).kind(), ErrorKind::Io);
        assert_eq!(ClientError::Timeout("read".into()).kind(), ErrorKind::Io);
        assert_eq!(
            ClientError::from(io::Error::other("broken pipe")).kind(),
            ErrorKind::Io
        );
        assert_eq!(ClientError::Parse("eof".into()).kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_only_io_is_retryable() {
        assert!(ClientError::Connection("refused".into()).is_retryable());
        assert!(!ClientError::config("bad pem").is_retryable());
        assert!(!ClientError::state("closed").is_retryable());
        assert!(!ClientError::Parse("eof".into()).is_retryable());
    }

    #[test]
    fn test_serde_json_error_is_parse() {
        let err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        assert_eq!(ClientError::from(err).kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_display_carries_detail() {
        let err = ClientError::config("trusted root set but target is not https");
        assert_eq!(
            err.to_string(),
            "Configuration error: trusted root set but target is not https"
        );
    }
}
