use super::MessageParseError;

/// Indicates if this message is of
/// type Confirmable (0), Non-confirmable (1), Acknowledgement (2), or Reset (3).
///
/// Stream transports (CoAP over TCP) have no message type; messages decoded
/// from a stream frame always carry [`Type::Con`] and the type is ignored when
/// encoding one.
///
/// See [RFC7252 - Message Details](https://datatracker.ietf.org/doc/html/rfc7252#section-3) for context
#[derive(Copy, Clone, Hash, Eq, Ord, PartialEq, PartialOrd, Debug)]
pub enum Type {
  /// Requires an Acknowledgement or Reset from the recipient,
  /// and is retransmitted until one arrives.
  Con,
  /// Does not require acknowledgement; used for messages that are
  /// repeated regularly anyway, such as sensor readings.
  Non,
  /// Acknowledges that a specific Confirmable message arrived.
  ///
  /// May carry a piggybacked response, or be empty when the
  /// response will be sent separately.
  Ack,
  /// Indicates that a specific message was received, but some context
  /// is missing to properly process it.
  ///
  /// Provoking a Reset with an empty Confirmable message is the
  /// inexpensive liveness check known as "CoAP ping".
  Reset,
}

impl TryFrom<u8> for Type {
  type Error = MessageParseError;

  fn try_from(b: u8) -> Result<Self, Self::Error> {
    match b {
      | 0 => Ok(Type::Con),
      | 1 => Ok(Type::Non),
      | 2 => Ok(Type::Ack),
      | 3 => Ok(Type::Reset),
      | _ => Err(MessageParseError::InvalidType(b)),
    }
  }
}

impl From<Type> for u8 {
  fn from(t: Type) -> u8 {
    match t {
      | Type::Con => 0,
      | Type::Non => 1,
      | Type::Ack => 2,
      | Type::Reset => 3,
    }
  }
}
