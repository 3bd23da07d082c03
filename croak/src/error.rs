use core::fmt;

use croak_msg::{MessageParseError, MessageToBytesError};

/// Ways a block-wise transfer can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
  /// A block's payload did not match the size in its Block option
  SizeMismatch,
  /// The reassembled body would exceed the configured maximum
  EntityTooLarge,
  /// Blocks were missing, out of order, or the transfer state was lost
  EntityIncomplete,
  /// The resource's ETag changed more often than allowed during a Block2 download
  ResourceChangedTooOften,
  /// The peer used BERT without both sides advertising it in CSM
  BertNotNegotiated,
}

/// Errors surfaced by the messaging layer, either returned
/// synchronously or delivered to a transaction's callback
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
  /// A confirmable message was transmitted the maximum number of times
  /// without an acknowledgement, or a delayed response never arrived
  Timeout,
  /// An inbound packet could not be understood. It was dropped
  /// (and answered with a Reset when enough of the header was readable).
  Malformed {
    /// The raw bytes, for diagnostics
    bytes: Vec<u8>,
    /// The decode failure, `None` when the packet parsed but
    /// its code makes no sense for its type
    cause: Option<MessageParseError>,
  },
  /// The per-address queue is full
  TooManyRequestsForEndpoint,
  /// See [`BlockError`]
  Block(BlockError),
  /// The message is larger than the peer accepts and block-wise
  /// transfer is not available to split it
  MessageTooLarge {
    /// Encoded size of the message
    size: usize,
    /// Largest message the peer accepts
    max: usize,
  },
  /// The engine was stopped before the transaction completed
  Stopped,
  /// The stream to the peer was closed before the transaction completed
  SocketClosed,
  /// The transport failed to send (`Debug` representation of its error)
  Transport(String),
  /// The clock failed to provide a timestamp
  Clock,
  /// The peer answered with a Reset
  Reset,
  /// An outbound message could not be serialized
  Encode(MessageToBytesError),
}

impl From<BlockError> for Error {
  fn from(e: BlockError) -> Self {
    Error::Block(e)
  }
}

impl From<MessageToBytesError> for Error {
  fn from(e: MessageToBytesError) -> Self {
    Error::Encode(e)
  }
}

impl fmt::Display for BlockError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::SizeMismatch => write!(f, "block size mismatch"),
      | Self::EntityTooLarge => write!(f, "request entity too large"),
      | Self::EntityIncomplete => write!(f, "request entity incomplete"),
      | Self::ResourceChangedTooOften => write!(f, "resource changed too many times"),
      | Self::BertNotNegotiated => write!(f, "BERT used without being negotiated"),
    }
  }
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::Timeout => write!(f, "timed out"),
      | Self::Malformed { bytes,
                          cause: Some(e), } => write!(f, "malformed packet ({} bytes): {}", bytes.len(), e),
      | Self::Malformed { bytes, cause: None } => {
        write!(f, "malformed packet ({} bytes)", bytes.len())
      },
      | Self::TooManyRequestsForEndpoint => write!(f, "too many requests queued for endpoint"),
      | Self::Block(e) => write!(f, "block-wise transfer failed: {}", e),
      | Self::MessageTooLarge { size, max } => {
        write!(f, "message of {} bytes exceeds the peer's maximum of {}", size, max)
      },
      | Self::Stopped => write!(f, "stopped"),
      | Self::SocketClosed => write!(f, "socket closed"),
      | Self::Transport(e) => write!(f, "transport error: {}", e),
      | Self::Clock => write!(f, "clock error"),
      | Self::Reset => write!(f, "peer replied with reset"),
      | Self::Encode(e) => write!(f, "{}", e),
    }
  }
}

impl std::error::Error for BlockError {}
impl std::error::Error for Error {}
