use core::fmt;

use super::opt::parse_error::OptParseError;

/// Errors encounterable while parsing a message from bytes
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord)]
pub enum MessageParseError {
  /// Reached end of stream before parsing was finished
  UnexpectedEndOfStream,

  /// Token length was > 8
  InvalidTokenLength(u8),

  /// Version was not 1
  UnsupportedVersion(u8),

  /// Error parsing option
  OptParseError(OptParseError),

  /// The message type is invalid (see [`Type`](crate::Type) for information & valid values)
  InvalidType(u8),

  /// The options of a stream frame ran past the body length declared in its header
  FrameLengthMismatch {
    /// body length declared in the frame header
    declared: usize,
  },
}

impl MessageParseError {
  /// Shorthand for [`MessageParseError::UnexpectedEndOfStream`]
  pub fn eof() -> Self {
    Self::UnexpectedEndOfStream
  }
}

impl From<OptParseError> for MessageParseError {
  fn from(e: OptParseError) -> Self {
    match e {
      | OptParseError::UnexpectedEndOfStream => Self::UnexpectedEndOfStream,
      | e => Self::OptParseError(e),
    }
  }
}

impl fmt::Display for MessageParseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::UnexpectedEndOfStream => write!(f, "message truncated"),
      | Self::InvalidTokenLength(n) => write!(f, "token length {} exceeds 8", n),
      | Self::UnsupportedVersion(v) => write!(f, "CoAP version {} not supported", v),
      | Self::OptParseError(e) => write!(f, "malformed option: {:?}", e),
      | Self::InvalidType(t) => write!(f, "invalid message type {}", t),
      | Self::FrameLengthMismatch { declared } => {
        write!(f, "options overran the declared frame body of {} bytes", declared)
      },
    }
  }
}

impl std::error::Error for MessageParseError {}
