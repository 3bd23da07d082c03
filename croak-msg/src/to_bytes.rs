use core::fmt;

use tinyvec::ArrayVec;

use crate::*;

/// Trait allowing fallible conversion into bytes
pub trait TryIntoBytes {
  /// Error yielded when the value cannot be represented as bytes
  type Error;

  /// Try to convert into a collection of bytes
  ///
  /// ```
  /// use croak_msg::{Code, Id, Message, OptionSet, Token, TryIntoBytes, Type};
  ///
  /// let msg = Message::new(Type::Con, Code::GET, Id(1), Token::default())
  ///             .with_opts(OptionSet::new().with_path("hello"));
  ///
  /// let bytes: Vec<u8> = msg.try_into_bytes().unwrap();
  /// assert_eq!(bytes, vec![0x40, 0x01, 0x00, 0x01, 0xB5, b'h', b'e', b'l', b'l', b'o']);
  /// ```
  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error>;
}

/// Errors encounterable serializing to bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageToBytesError {
  /// An option delta or value length exceeded [`MAX_DELTA_OR_LEN`]
  OptionTooLong {
    /// the option number
    number: u32,
    /// the delta or length that did not fit
    size: usize,
  },
  /// The version is not encodable in 2 bits
  InvalidVersion(u8),
  /// A stream frame body is longer than the 4-byte extended length can express
  FrameTooLong(usize),
}

impl fmt::Display for MessageToBytesError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::OptionTooLong { number, size } => {
        write!(f, "option {} too long to encode ({} bytes)", number, size)
      },
      | Self::InvalidVersion(v) => write!(f, "version {} does not fit in 2 bits", v),
      | Self::FrameTooLong(n) => write!(f, "frame body of {} bytes is too long", n),
    }
  }
}

impl std::error::Error for MessageToBytesError {}

/// Check that every option of a set is encodable
pub(crate) fn check_opts(opts: &OptionSet) -> Result<(), MessageToBytesError> {
  let mut prev = 0u32;
  opts.iter().try_for_each(|(n, vs)| {
               let delta = n.0 - prev;
               prev = n.0;
               let too_long = |size: usize| MessageToBytesError::OptionTooLong { number: n.0,
                                                                                 size };

               if delta > MAX_DELTA_OR_LEN {
                 return Err(too_long(delta as usize));
               }

               match vs.iter().find(|v| v.0.len() > MAX_DELTA_OR_LEN as usize) {
                 | Some(v) => Err(too_long(v.0.len())),
                 | None => Ok(()),
               }
             })
}

impl Message {
  /// Number of bytes this message occupies as a datagram
  pub fn wire_size(&self) -> usize {
    let header_size = 4;
    let payload_size = match self.payload.0.len() {
      | 0 => 0,
      | n => n + 1,
    };

    header_size + self.token.0.len() + self.opts.wire_size() + payload_size
  }
}

impl TryIntoBytes for Message {
  type Error = MessageToBytesError;

  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error> {
    if self.ver.0 > 0b11 {
      return Err(Self::Error::InvalidVersion(self.ver.0));
    }

    check_opts(&self.opts)?;

    let mut bytes = Vec::with_capacity(self.wire_size());

    let byte1: u8 = Byte1 { tkl: self.token.0.len() as u8,
                            ver: self.ver,
                            ty: self.ty }.into();
    let code: u8 = self.code.into();
    let id: [u8; 2] = self.id.into();

    bytes.push(byte1);
    bytes.push(code);

    bytes.extend(id);
    bytes.extend(self.token.as_bytes());

    extend_opts_and_payload(&mut bytes, self.opts, self.payload);

    Ok(bytes)
  }
}

/// Options, payload marker and payload; shared by datagram and stream framing
pub(crate) fn extend_opts_and_payload(bytes: &mut Vec<u8>, opts: OptionSet, payload: Payload) {
  for opt in opts.opts() {
    opt.extend_bytes(bytes);
  }

  if !payload.0.is_empty() {
    bytes.push(0b11111111);
    bytes.extend(payload.0);
  }
}

pub(crate) fn opt_len_or_delta(val: u32) -> (u8, Option<ArrayVec<[u8; 2]>>) {
  match val {
    | n if n >= 269 => {
      let mut bytes = ArrayVec::new();
      bytes.extend(((n - 269) as u16).to_be_bytes());
      (14, Some(bytes))
    },
    | n if n >= 13 => {
      let mut bytes = ArrayVec::new();
      bytes.push((n - 13) as u8);
      (13, Some(bytes))
    },
    | n => (n as u8, None),
  }
}

impl From<Byte1> for u8 {
  fn from(b: Byte1) -> u8 {
    let ver = b.ver.0 << 6;
    let ty = u8::from(b.ty) << 4;
    let tkl = b.tkl;

    ver | ty | tkl
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{assert_eqb, assert_eqb_iter};

  #[test]
  fn msg() {
    let (msg, expected) = test_msg();
    let actual: Vec<u8> = msg.try_into_bytes().unwrap();
    assert_eqb_iter!(actual, expected);
  }

  #[test]
  fn byte_1() {
    let byte = Byte1 { ver: Version(1),
                       ty: Type::Ack,
                       tkl: 3 };
    let actual: u8 = byte.into();
    let expected = 0b_01_10_0011u8;
    assert_eqb!(actual, expected)
  }

  #[test]
  fn id() {
    let id = Id(16);
    let actual = u16::from_be_bytes(id.into());
    assert_eqb!(actual, 16)
  }

  #[test]
  fn opt() {
    use core::iter::repeat;
    let cases: [(u32, Vec<u8>, Vec<u8>); 5] =
      [(24,
        repeat(1).take(100).collect(),
        [[0b1101_1101u8, 24 - 13, 100 - 13].as_ref(),
         repeat(1).take(100).collect::<Vec<u8>>().as_ref()].concat()),
       (1, vec![1], vec![0b0001_0001, 1]),
       (12, vec![], vec![0b1100_0000]),
       (24, vec![1], vec![0b1101_0001, 11, 1]),
       (24,
        repeat(1).take(300).collect(),
        [[0b1101_1110, 24 - 13].as_ref(),
         (300u16 - 269).to_be_bytes().as_ref(),
         repeat(1).take(300).collect::<Vec<u8>>().as_ref()].concat())];

    cases.into_iter().for_each(|(delta, values, expected)| {
                       let opt = Opt { delta: OptDelta(delta),
                                       value: OptValue(values) };
                       assert_eq!(opt.wire_size(), expected.len());

                       let mut actual = Vec::<u8>::new();
                       opt.extend_bytes(&mut actual);
                       assert_eqb_iter!(actual, expected)
                     });
  }

  #[test]
  fn delta_and_length_boundaries() {
    for (n, head, ext) in [(12u32, 12u8, vec![]),
                           (13, 13, vec![0]),
                           (255, 13, vec![242]),
                           (256, 13, vec![243]),
                           (268, 13, vec![255]),
                           (269, 14, vec![0, 0]),
                           (MAX_DELTA_OR_LEN, 14, vec![0xFF, 0xFF])]
    {
      let (actual_head, actual_ext) = opt_len_or_delta(n);
      assert_eq!(actual_head, head);
      assert_eq!(actual_ext.map(|a| a.to_vec()).unwrap_or_default(), ext);
    }
  }

  #[test]
  fn option_number_too_large() {
    let msg = Message::new(Type::Con, Code::GET, Id(0), Token::default())
              .map_opts(|o| o.insert(OptNumber(MAX_DELTA_OR_LEN + 1), &b"x"[..]));

    assert_eq!(msg.try_into_bytes(),
               Err(MessageToBytesError::OptionTooLong { number: MAX_DELTA_OR_LEN + 1,
                                                        size: MAX_DELTA_OR_LEN as usize + 1 }));
  }

  #[test]
  fn no_payload_marker() {
    let msg = Message::new(Type::Con, code::CONTENT, Id(0), Token::default());

    assert_ne!(msg.try_into_bytes().unwrap().last(), Some(&0b11111111));
  }

  #[test]
  fn wire_size_matches_encoding() {
    let (msg, expected) = test_msg();
    assert_eq!(msg.wire_size(), expected.len());
  }
}
