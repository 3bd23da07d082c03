//! Message framing for reliable stream transports (RFC 8323 CoAP over TCP).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Len  |  TKL  | Extended Length (0, 8, 16 or 32 bits)
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      Code     | Token (if any, TKL bytes) ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Options (if any) ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |1 1 1 1 1 1 1 1|    Payload (if any) ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! `Len` counts the bytes of the options, payload marker and payload.
//! There is no version, type or message id; decoded messages carry
//! [`Type::Con`] and [`Id(0)`](Id), and both are ignored when encoding.

use tinyvec::ArrayVec;
use toad_cursor::Cursor;

use crate::from_bytes::TryConsumeBytes;
use crate::to_bytes::{check_opts, extend_opts_and_payload};
use crate::*;

const EXT_8: usize = 13;
const EXT_16: usize = 269;
const EXT_32: usize = 65805;

fn ext_len(nibble: u8) -> usize {
  match nibble {
    | 13 => 1,
    | 14 => 2,
    | 15 => 4,
    | _ => 0,
  }
}

fn len_nibble(len: usize) -> Result<(u8, ArrayVec<[u8; 4]>), MessageToBytesError> {
  let mut ext = ArrayVec::new();
  match len {
    | n if n < EXT_8 => Ok((n as u8, ext)),
    | n if n < EXT_16 => {
      ext.push((n - EXT_8) as u8);
      Ok((13, ext))
    },
    | n if n < EXT_32 => {
      ext.extend(((n - EXT_16) as u16).to_be_bytes());
      Ok((14, ext))
    },
    | n => {
      let n = u32::try_from(n - EXT_32).map_err(|_| MessageToBytesError::FrameTooLong(len))?;
      ext.extend(n.to_be_bytes());
      Ok((15, ext))
    },
  }
}

/// Encode a message as a stream frame
///
/// ```
/// use croak_msg::{code, tcp, Message, Signaling, Token};
///
/// let csm = Message::from_signaling(&Signaling::Csm { max_message_size: Some(1152),
///                                                     block_wise: false },
///                                   Token::default());
///
/// assert_eq!(tcp::encode(&csm).unwrap(), vec![0x30, 0xE1, 0x22, 0x04, 0x80]);
/// ```
pub fn encode(msg: &Message) -> Result<Vec<u8>, MessageToBytesError> {
  check_opts(&msg.opts)?;

  let body_len = msg.opts.wire_size()
                 + match msg.payload.len() {
                   | 0 => 0,
                   | n => n + 1,
                 };
  let (nibble, ext) = len_nibble(body_len)?;
  let tkl = msg.token.0.len() as u8;

  let mut bytes = Vec::with_capacity(2 + ext.len() + tkl as usize + body_len);
  bytes.push((nibble << 4) | tkl);
  bytes.extend(ext);
  bytes.push(msg.code.into());
  bytes.extend(msg.token.as_bytes());

  extend_opts_and_payload(&mut bytes, msg.opts.clone(), msg.payload.clone());

  Ok(bytes)
}

/// Total size of the frame at the start of `bytes`.
///
/// Yields [`nb::Error::WouldBlock`] when not even the length
/// header has arrived yet; `bytes` may be shorter than the frame.
///
/// ```
/// use croak_msg::tcp;
///
/// // 7.02 Ping, no token
/// assert_eq!(tcp::frame_len(&[0x00, 0xE2]), Ok(2));
///
/// // 2-byte extended length, header incomplete
/// assert_eq!(tcp::frame_len(&[0xE0, 0x00]), Err(nb::Error::WouldBlock));
/// ```
pub fn frame_len(bytes: &[u8]) -> nb::Result<usize, MessageParseError> {
  let b0 = *bytes.first().ok_or(nb::Error::<MessageParseError>::WouldBlock)?;
  let (nibble, tkl) = (b0 >> 4, b0 & 0b1111);

  if tkl > 8 {
    return Err(nb::Error::Other(MessageParseError::InvalidTokenLength(tkl)));
  }

  let ext = ext_len(nibble);
  let len = match (nibble, bytes.get(1..1 + ext).ok_or(nb::Error::<MessageParseError>::WouldBlock)?) {
    | (13, &[a]) => a as usize + EXT_8,
    | (14, &[a, b]) => u16::from_be_bytes([a, b]) as usize + EXT_16,
    | (15, &[a, b, c, d]) => u32::from_be_bytes([a, b, c, d]) as usize + EXT_32,
    | (n, _) => n as usize,
  };

  Ok(1 + ext + 1 + tkl as usize + len)
}

/// Decode the frame at the start of `bytes`, yielding the message and
/// the number of bytes it occupied.
///
/// Yields [`nb::Error::WouldBlock`] until the whole frame is available;
/// bytes after the frame are left alone.
///
/// ```
/// use croak_msg::{code, tcp, Code, Id, Message, OptionSet, Token, Type};
///
/// let get = Message::new(Type::Con, Code::GET, Id(0), Token::from_slice(&[9]).unwrap())
///             .with_opts(OptionSet::new().with_path("hello"));
/// let mut stream = tcp::encode(&get).unwrap();
/// let frame_len = stream.len();
///
/// assert_eq!(tcp::decode(&stream[..frame_len - 1]), Err(nb::Error::WouldBlock));
///
/// stream.extend([0x00, 0xE2]);
/// assert_eq!(tcp::decode(&stream), Ok((get, frame_len)));
/// ```
pub fn decode(bytes: &[u8]) -> nb::Result<(Message, usize), MessageParseError> {
  let total = frame_len(bytes)?;
  let frame = bytes.get(..total).ok_or(nb::Error::<MessageParseError>::WouldBlock)?;

  let b0 = frame.first().copied().ok_or_else(MessageParseError::eof)?;
  let (ext, tkl) = (ext_len(b0 >> 4), (b0 & 0b1111) as usize);
  let declared = total - (2 + ext + tkl);

  let mut cursor = Cursor::new(frame.get(1 + ext..).ok_or_else(MessageParseError::eof)?);

  let code: Code = cursor.next().ok_or_else(MessageParseError::eof)?.into();
  let token = cursor.take_exact(tkl)
                    .and_then(Token::from_slice)
                    .ok_or_else(MessageParseError::eof)?;

  let opts = OptionSet::try_consume_bytes(&mut cursor).map_err(|e| match e {
               | OptParseError::UnexpectedEndOfStream => {
                 MessageParseError::FrameLengthMismatch { declared }
               },
               | e => MessageParseError::from(e),
             })?;
  let payload = Payload(cursor.take_until_end().to_vec());

  let msg = Message { id: Id(0),
                      ty: Type::Con,
                      ver: Version::default(),
                      code,
                      token,
                      opts,
                      payload };

  Ok((msg, total))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assert_eqb_iter;

  fn msg(payload_len: usize) -> Message {
    Message::new(Type::Con, code::CONTENT, Id(0), Token::from_slice(&[1, 2, 3]).unwrap())
      .with_opts(OptionSet::new().with_content_format(ContentFormat::OCTET_STREAM))
      .with_payload(vec![7u8; payload_len])
  }

  #[test]
  fn length_thresholds() {
    // options (2 bytes) + marker (1) + payload
    for (payload_len, nibble, ext) in [(9, 12, 0),
                                       (10, 13, 1),
                                       (265, 13, 1),
                                       (266, 14, 2),
                                       (65801, 14, 2),
                                       (65802, 15, 4)]
    {
      let m = msg(payload_len);
      let bytes = encode(&m).unwrap();
      assert_eq!(bytes[0] >> 4, nibble, "payload {}", payload_len);
      assert_eq!(bytes.len(), 1 + ext + 1 + 3 + 2 + 1 + payload_len);
      assert_eq!(frame_len(&bytes), Ok(bytes.len()));
      assert_eq!(decode(&bytes), Ok((m, bytes.len())));
    }
  }

  #[test]
  fn ignores_type_and_id() {
    let m = Message::new(Type::Non, code::PONG, Id(1234), Token::default());
    let bytes = encode(&m).unwrap();
    assert_eqb_iter!(bytes, [0x00u8, 0xE3]);

    let (decoded, _) = decode(&bytes).unwrap();
    assert_eq!((decoded.ty, decoded.id), (Type::Con, Id(0)));
  }

  #[test]
  fn options_without_payload() {
    let m = msg(0);
    let bytes = encode(&m).unwrap();
    assert_eq!(bytes[0] >> 4, 2);
    assert_eq!(decode(&bytes), Ok((m, bytes.len())));
  }

  #[test]
  fn option_overrunning_frame() {
    // len = 1, but the option header declares a 2 byte value
    let bytes = [0x10, 0x45, 0x12, 0xAA, 0xBB];
    assert_eq!(decode(&bytes),
               Err(nb::Error::Other(MessageParseError::FrameLengthMismatch { declared: 1 })));
  }

  #[test]
  fn bad_token_length() {
    assert_eq!(frame_len(&[0x09, 0x45]),
               Err(nb::Error::Other(MessageParseError::InvalidTokenLength(9))));
  }

  #[test]
  fn incomplete() {
    assert_eq!(frame_len(&[]), Err(nb::Error::WouldBlock));
    assert_eq!(decode(&[0x20, 0x45, 0xC1]), Err(nb::Error::WouldBlock));
  }
}
