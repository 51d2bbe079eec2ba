//! Protocol errors and their coarse classification.

use std::time::Duration;

use gossian_pipeline::PipelineError;
use serde::{Deserialize, Serialize};

/// Errors that can occur while reading or writing a session message.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A message did not follow the wire format.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A parameter was well-formed but out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A length prefix or text line exceeded the configured limit.
    #[error("payload of {len} bytes exceeds the limit of {max} bytes")]
    PayloadTooLarge {
        /// Announced or observed length.
        len: u64,
        /// Configured limit.
        max: u64,
    },

    /// The socket failed or the peer closed it mid-message.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// A read or write did not finish before its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// The four error categories a session can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad radius, sigma or quality; the request is rejected unprocessed.
    InvalidParameter,
    /// Framing or decoding failure; the connection closes without a reply.
    MalformedMessage,
    /// I/O failure, deadline, or premature close.
    ConnectionError,
    /// The image codec failed to encode the result.
    CodecError,
}

impl ProtocolError {
    /// Category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed(_) | Self::PayloadTooLarge { .. } => ErrorKind::MalformedMessage,
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::Io(_) | Self::Timeout(_) => ErrorKind::ConnectionError,
        }
    }
}

impl From<&PipelineError> for ErrorKind {
    /// Decode failures count as malformed messages; encode failures as
    /// codec errors. A cancelled blur means the connection went away.
    fn from(err: &PipelineError) -> Self {
        match err {
            PipelineError::InvalidParameter(_) => Self::InvalidParameter,
            PipelineError::EmptyInput | PipelineError::ImageDecode(_) => Self::MalformedMessage,
            PipelineError::ImageEncode(_) | PipelineError::WorkerPool => Self::CodecError,
            PipelineError::Cancelled => Self::ConnectionError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_kinds() {
        assert_eq!(
            ProtocolError::Malformed("x".into()).kind(),
            ErrorKind::MalformedMessage
        );
        assert_eq!(
            ProtocolError::PayloadTooLarge { len: 2, max: 1 }.kind(),
            ErrorKind::MalformedMessage
        );
        assert_eq!(
            ProtocolError::InvalidParameter("x".into()).kind(),
            ErrorKind::InvalidParameter
        );
        assert_eq!(
            ProtocolError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::ConnectionError
        );
        let eof = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        assert_eq!(ProtocolError::from(eof).kind(), ErrorKind::ConnectionError);
    }

    #[test]
    fn pipeline_error_kinds() {
        assert_eq!(
            ErrorKind::from(&PipelineError::EmptyInput),
            ErrorKind::MalformedMessage
        );
        assert_eq!(
            ErrorKind::from(&PipelineError::InvalidParameter("r".into())),
            ErrorKind::InvalidParameter
        );
        assert_eq!(
            ErrorKind::from(&PipelineError::WorkerPool),
            ErrorKind::CodecError
        );
        assert_eq!(
            ErrorKind::from(&PipelineError::Cancelled),
            ErrorKind::ConnectionError
        );
    }
}
