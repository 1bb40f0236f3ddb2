//! Transport and decode errors.

use std::time::Duration;

use dc_core::PollError;
use thiserror::Error;

/// Errors while moving frames over a socket.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed by peer")]
    Closed,

    /// No delimiter within the size limit; the stream cannot be resynchronized.
    #[error("frame exceeds {max} bytes without a delimiter")]
    TooLarge { max: usize },
}

/// A frame was received but its content is not the expected message.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("unexpected root element <{found}>, expected <{expected}>")]
    UnexpectedRoot {
        expected: &'static str,
        found: String,
    },

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("reply is missing <{0}>")]
    MissingField(&'static str),
}

impl From<quick_xml::DeError> for DecodeError {
    fn from(err: quick_xml::DeError) -> Self {
        Self::Xml(err.to_string())
    }
}

impl From<quick_xml::Error> for DecodeError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}

impl From<DecodeError> for PollError {
    fn from(err: DecodeError) -> Self {
        PollError::decode(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_display() {
        assert_eq!(FrameError::Closed.to_string(), "connection closed by peer");
        assert_eq!(
            FrameError::TooLarge { max: 16 }.to_string(),
            "frame exceeds 16 bytes without a delimiter"
        );
        assert_eq!(
            FrameError::Timeout(Duration::from_secs(5)).to_string(),
            "timed out after 5s"
        );
    }

    #[test]
    fn test_decode_error_into_poll_error() {
        let err: PollError = DecodeError::MissingField("nonce").into();
        assert_eq!(err, PollError::Decode("reply is missing <nonce>".to_string()));
    }
}
