use toad_cursor::Cursor;

/// Trait for converting a sequence of bytes into some data structure
pub trait TryFromBytes<A: AsRef<[u8]>>: Sized {
  /// Error type yielded if conversion fails
  type Error;

  /// Try to convert from some sequence of bytes `A`
  /// into `Self`
  fn try_from_bytes(bytes: A) -> Result<Self, Self::Error>;
}

/// A _piece_ of a message that knows how to parse itself
/// by advancing a cursor over the message's bytes.
pub(crate) trait TryConsumeBytes<A: AsRef<[u8]>>: Sized {
  type Error;

  fn try_consume_bytes(bytes: &mut Cursor<A>) -> Result<Self, Self::Error>;
}
