use toad_cursor::Cursor;
use toad_macros::rfc_7252_doc;

/// Message Code
pub mod code;

/// Message parsing errors
pub mod parse_error;

/// Message ID
pub mod id;

/// Message Options
pub mod opt;

/// Message Type
pub mod ty;

/// Message Token
pub mod token;

/// Message Version
pub mod ver;

pub use code::*;
pub use id::*;
pub use opt::*;
pub use parse_error::*;
pub use token::*;
pub use ty::*;
pub use ver::*;

use crate::from_bytes::TryConsumeBytes;
use crate::TryFromBytes;

#[doc = rfc_7252_doc!("5.5")]
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Payload(pub Vec<u8>);

impl Payload {
  /// Borrow the payload bytes
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }

  /// Number of bytes in the payload
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// `true` if there is no payload
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl From<Vec<u8>> for Payload {
  fn from(bytes: Vec<u8>) -> Self {
    Self(bytes)
  }
}

impl From<&[u8]> for Payload {
  fn from(bytes: &[u8]) -> Self {
    Self(bytes.to_vec())
  }
}

impl From<&str> for Payload {
  fn from(s: &str) -> Self {
    Self(s.as_bytes().to_vec())
  }
}

/// Struct representing the first byte of a message.
///
/// ```text
/// CoAP version
/// |
/// |  Message type (request, response, empty)
/// |  |
/// |  |  Length of token, in bytes. (4-bit integer)
/// |  |  |
/// vv vv vvvv
/// 01 00 0000
/// ```
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub(crate) struct Byte1 {
  pub(crate) ver: Version,
  pub(crate) ty: Type,
  pub(crate) tkl: u8,
}

impl TryFrom<u8> for Byte1 {
  type Error = MessageParseError;

  fn try_from(b: u8) -> Result<Self, Self::Error> {
    let ver = b >> 6; // bits 0 & 1
    let ty = b >> 4 & 0b11; // bits 2 & 3
    let tkl = b & 0b1111u8; // last 4 bits

    Ok(Byte1 { ver: Version(ver),
               ty: Type::try_from(ty)?,
               tkl })
  }
}

/// # `Message` struct
/// Low-level representation of a CoAP message, close to the actual byte layout.
///
/// The same struct is used for datagram and stream framing;
/// see [`crate::tcp`] for the stream codec, which ignores [`Message::ty`]
/// and [`Message::id`].
///
/// <details>
/// <summary><b>RFC7252 - CoAP Messaging Model</b></summary>
#[doc = concat!("\n#", rfc_7252_doc!("2.1"))]
/// </details>
/// <details>
/// <summary><b>RFC7252 - CoAP Message Binary Format</b></summary>
#[doc = concat!("\n#", rfc_7252_doc!("3"))]
/// </details>
///
/// ```
/// use croak_msg::*;
/// # //                       version  token len  code (2.05 Content)
/// # //                       |        |          /
/// # //                       |  type  |         /  message ID
/// # //                       |  |     |        |   |
/// # //                       vv vv vvvv vvvvvvvv vvvvvvvvvvvvvvvv
/// # let header: [u8; 4] = 0b_01_00_0001_01000101_0000000000000001u32.to_be_bytes();
/// # let token: [u8; 1] = [254u8];
/// # let content_format: &[u8] = &[50];
/// # let options: [&[u8]; 2] = [&[0b_1100_0001u8], content_format];
/// # let payload: [&[u8]; 2] = [&[0b_11111111u8], b"hello, world!"];
/// let packet: Vec<u8> = /* bytes! */
/// # [header.as_ref(), token.as_ref(), options.concat().as_ref(), payload.concat().as_ref()].concat();
///
/// let msg = Message::try_from_bytes(&packet).unwrap();
///
/// let expected = Message::new(Type::Con, code::CONTENT, Id(1), Token::from_slice(&[254]).unwrap())
///                  .with_opts(OptionSet::new().with_content_format(ContentFormat::JSON))
///                  .with_payload("hello, world!");
///
/// assert_eq!(msg, expected);
/// assert_eq!(msg.try_into_bytes().unwrap(), packet);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Message {
  /// see [`Id`] for details
  pub id: Id,
  /// see [`Type`] for details
  pub ty: Type,
  /// see [`Version`] for details
  pub ver: Version,
  /// see [`Token`] for details
  pub token: Token,
  /// see [`Code`] for details
  pub code: Code,
  /// see [`OptionSet`] for details
  pub opts: OptionSet,
  /// see [`Payload`]
  pub payload: Payload,
}

impl Message {
  /// Create a message with no options and no payload
  pub fn new(ty: Type, code: Code, id: Id, token: Token) -> Self {
    Self { id,
           ty,
           ver: Version::default(),
           token,
           code,
           opts: OptionSet::new(),
           payload: Payload::default() }
  }

  /// Replace the payload
  pub fn with_payload(self, payload: impl Into<Payload>) -> Self {
    Self { payload: payload.into(),
           ..self }
  }

  /// Replace the options
  pub fn with_opts(self, opts: OptionSet) -> Self {
    Self { opts, ..self }
  }

  /// Replace the options with the result of a function of the current options
  ///
  /// ```
  /// use croak_msg::{Code, Id, Message, Token, Type};
  ///
  /// let msg = Message::new(Type::Con, Code::GET, Id(1), Token::default())
  ///             .map_opts(|o| o.with_path("hello"));
  /// assert_eq!(msg.opts.path(), "hello");
  /// ```
  pub fn map_opts(self, f: impl FnOnce(OptionSet) -> OptionSet) -> Self {
    Self { opts: f(self.opts),
           ..self }
  }

  /// Create a new message that ACKs this one.
  ///
  /// This needs an [`Id`] to assign to the newly created message;
  /// the token is copied so a response can be piggybacked onto it.
  ///
  /// ```
  /// use croak_msg::{Code, Id, Message, Token, Type};
  ///
  /// let req = Message::new(Type::Con, Code::GET, Id(1), Token::from_slice(&[1]).unwrap());
  /// let ack = req.ack(req.id);
  ///
  /// assert_eq!(ack.ty, Type::Ack);
  /// assert_eq!(ack.code, Code::EMPTY);
  /// assert_eq!(ack.token, req.token);
  /// ```
  pub fn ack(&self, id: Id) -> Self {
    Self::new(Type::Ack, Code::EMPTY, id, self.token)
  }

  /// An Empty ACK for this message: same id, no token.
  ///
  /// Sent in reply to a request whose response will be sent separately,
  /// or to a separate Confirmable response.
  pub fn empty_ack_for(msg: &Message) -> Self {
    Self::new(Type::Ack, Code::EMPTY, msg.id, Token::default())
  }

  /// A Reset rejecting this message
  pub fn reset(&self) -> Self {
    Self::new(Type::Reset, Code::EMPTY, self.id, Token::default())
  }

  /// Is this message a CoAP ping? (a Confirmable message with
  /// no request or response semantics)
  pub fn is_ping(&self) -> bool {
    self.ty == Type::Con
    && matches!(self.code.kind(), CodeKind::Empty | CodeKind::Unrecognized)
  }

  /// Does this message have code 0.00?
  pub fn is_empty(&self) -> bool {
    self.code == Code::EMPTY
  }

  /// The request method, if this is a request
  pub fn method(&self) -> Option<Method> {
    self.code.method()
  }

  /// Interpret this message as a signal, if its code is 7.01..=7.05
  pub fn signaling(&self) -> Option<Signaling> {
    Signaling::parse(self.code, &self.opts)
  }

  /// Create a signaling message (stream transports only)
  pub fn from_signaling(sig: &Signaling, token: Token) -> Self {
    Self::new(Type::Con, sig.code(), Id(0), token).with_opts(sig.options())
  }

  /// The first critical option in this message that this library does not understand.
  ///
  /// Which option numbers are understood depends on the code:
  /// requests and responses use [`RECOGNIZED`], signaling messages
  /// the options of their signal.
  ///
  /// ```
  /// use croak_msg::{Code, Id, Message, OptNumber, OptionSet, Token, Type};
  ///
  /// let ok = Message::new(Type::Con, Code::GET, Id(1), Token::default())
  ///            .with_opts(OptionSet::new().with_path("a").insert(OptNumber(2052), &b"x"[..]));
  /// assert_eq!(ok.unrecognized_critical(), None);
  ///
  /// let bad = ok.map_opts(|o| o.insert(OptNumber(9), &b"x"[..]));
  /// assert_eq!(bad.unrecognized_critical(), Some(OptNumber(9)));
  /// ```
  pub fn unrecognized_critical(&self) -> Option<OptNumber> {
    let recognized: &[OptNumber] = match self.code {
      | code::CSM => &[csm::MAX_MESSAGE_SIZE, csm::BLOCK_WISE_TRANSFER],
      | code::PING | code::PONG => &[ping::CUSTODY],
      | code::RELEASE => &[release::ALTERNATIVE_ADDRESS, release::HOLD_OFF],
      | code::ABORT => &[abort::BAD_CSM_OPTION],
      | _ => &RECOGNIZED,
    };

    self.opts
        .iter()
        .map(|(n, _)| *n)
        .find(|n| n.is_critical() && !recognized.contains(n))
  }

  /// Read the type and id of a datagram without parsing the rest of it.
  ///
  /// Used to answer messages that fail to parse with a Reset.
  ///
  /// ```
  /// use croak_msg::{Id, Message, Type};
  ///
  /// assert_eq!(Message::peek_header(&[0b01_00_0000, 0, 0, 9, 0xFF]),
  ///            Some((Type::Con, Id(9))));
  /// assert_eq!(Message::peek_header(&[0b01_00_0000, 0]), None);
  /// ```
  pub fn peek_header(bytes: &[u8]) -> Option<(Type, Id)> {
    match bytes {
      | [b1, _, a, b, ..] => {
        let byte1 = Byte1::try_from(*b1).ok()?;
        Some((byte1.ty, Id::from_be_bytes([*a, *b])))
      },
      | _ => None,
    }
  }
}

impl<Bytes: AsRef<[u8]>> TryFromBytes<Bytes> for Message {
  type Error = MessageParseError;

  fn try_from_bytes(bytes: Bytes) -> Result<Self, Self::Error> {
    let mut bytes = Cursor::new(bytes);

    let Byte1 { tkl, ty, ver } = bytes.next()
                                      .ok_or_else(MessageParseError::eof)?
                                      .try_into()?;

    if ver != Version::default() {
      return Err(Self::Error::UnsupportedVersion(ver.0));
    }

    if tkl > 8 {
      return Err(Self::Error::InvalidTokenLength(tkl));
    }

    let code: Code = bytes.next().ok_or_else(MessageParseError::eof)?.into();
    let id: Id = Id::try_consume_bytes(&mut bytes)?;

    let token = bytes.take_exact(tkl as usize)
                     .and_then(Token::from_slice)
                     .ok_or_else(MessageParseError::eof)?;

    let opts = OptionSet::try_consume_bytes(&mut bytes)?;
    let payload = Payload(bytes.take_until_end().to_vec());

    Ok(Message { id,
                 ty,
                 ver,
                 code,
                 token,
                 opts,
                 payload })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_msg() {
    let (expect, msg) = crate::test_msg();
    assert_eq!(Message::try_from_bytes(&msg).unwrap(), expect)
  }

  #[test]
  fn parse_byte1() {
    let byte = 0b_01_10_0011u8;
    let byte = Byte1::try_from(byte).unwrap();
    assert_eq!(byte,
               Byte1 { ver: Version(1),
                       ty: Type::Ack,
                       tkl: 3 })
  }

  #[test]
  fn parse_id() {
    let mut id_bytes = Cursor::new(34u16.to_be_bytes());
    let id = Id::try_consume_bytes(&mut id_bytes).unwrap();
    assert_eq!(id, Id(34));
  }

  #[test]
  fn parse_errors() {
    assert_eq!(Message::try_from_bytes([0b10_00_0000, 1, 0, 0]),
               Err(MessageParseError::UnsupportedVersion(2)));
    assert_eq!(Message::try_from_bytes([0b01_00_1001, 1, 0, 0]),
               Err(MessageParseError::InvalidTokenLength(9)));
    assert_eq!(Message::try_from_bytes([0b01_00_0000, 1, 0]),
               Err(MessageParseError::UnexpectedEndOfStream));
    assert_eq!(Message::try_from_bytes([0b01_00_0010, 1, 0, 0, 1]),
               Err(MessageParseError::UnexpectedEndOfStream));
    assert_eq!(Message::try_from_bytes([0b01_00_0000, 1, 0, 0, 0b1111_0000]),
               Err(MessageParseError::OptParseError(OptParseError::OptionDeltaReservedValue(15))));
    assert_eq!(Message::try_from_bytes([0b01_00_0000, 1, 0, 0, 0b0001_0010, 1]),
               Err(MessageParseError::UnexpectedEndOfStream));
  }

  #[test]
  fn empty_payload_after_marker_is_accepted() {
    let msg = Message::try_from_bytes([0b01_00_0000, 0b010_00101, 0, 1, 0xFF]).unwrap();
    assert!(msg.payload.is_empty());
    assert_eq!(msg.code, code::CONTENT);
  }

  #[test]
  fn unrecognized_codes_still_decode() {
    let msg = Message::try_from_bytes([0b01_00_0000, 0b000_01010, 0, 1]).unwrap();
    assert_eq!(msg.code.kind(), CodeKind::Unrecognized);
    assert!(msg.is_ping());

    let non = Message { ty: Type::Non,
                        ..msg };
    assert!(!non.is_ping());
  }

  #[test]
  fn signaling_options_checked_against_signal() {
    let csm = Message::from_signaling(&Signaling::Csm { max_message_size: Some(2048),
                                                        block_wise: true },
                                      Token::default());
    assert_eq!(csm.unrecognized_critical(), None);
    assert_eq!(csm.signaling(),
               Some(Signaling::Csm { max_message_size: Some(2048),
                                     block_wise: true }));

    let csm = csm.map_opts(|o| o.insert(OptNumber(3), &b"h"[..]));
    assert_eq!(csm.unrecognized_critical(), Some(OptNumber(3)));
  }

  #[test]
  fn reset_and_empty_ack() {
    let req = Message::new(Type::Con, Code::GET, Id(7), Token::from_slice(&[1, 2]).unwrap());

    let rst = req.reset();
    assert_eq!((rst.ty, rst.id, rst.code), (Type::Reset, Id(7), Code::EMPTY));
    assert!(rst.token.is_empty());

    let ack = Message::empty_ack_for(&req);
    assert_eq!((ack.ty, ack.id), (Type::Ack, Id(7)));
    assert!(ack.token.is_empty() && ack.is_empty());
  }
}
