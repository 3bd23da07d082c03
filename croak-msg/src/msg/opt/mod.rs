use std::collections::BTreeMap;

use toad_cursor::Cursor;
use toad_macros::rfc_7252_doc;

use crate::from_bytes::*;

/// Option parsing errors
pub mod parse_error;
pub use parse_error::*;

/// Known option numbers, block option & content formats
pub mod known;
pub use known::*;

/// The option collection attached to every [`Message`](crate::Message)
pub mod set;
pub use set::*;

/// Signaling options carried by 7.xx messages
pub mod signaling;
pub use signaling::*;

/// Largest value expressible in an option delta or length field
/// (two extended bytes + 269)
pub const MAX_DELTA_OR_LEN: u32 = 0xFFFF + 269;

pub(crate) fn parse_opt_len_or_delta<A: AsRef<[u8]>>(head: u8,
                                                     bytes: &mut Cursor<A>,
                                                     reserved_err: OptParseError)
                                                     -> Result<u32, OptParseError> {
  match head {
    | 13 => {
      let n = bytes.next().ok_or_else(OptParseError::eof)?;
      Ok((n as u32) + 13)
    },
    | 14 => match bytes.take_exact(2) {
      | Some(&[a, b]) => Ok(u16::from_be_bytes([a, b]) as u32 + 269),
      | _ => Err(OptParseError::eof()),
    },
    | 15 => Err(reserved_err),
    | _ => Ok(head as u32),
  }
}

#[doc = rfc_7252_doc!("5.4")]
/// <details><summary><b>RFC7252 Section 3.1 Option binary format</b></summary>
#[doc = concat!("\n#", rfc_7252_doc!("3.1"))]
/// </details>
///
/// # `Opt` struct
/// Wire-level representation of a single option: the delta from the
/// previous option's number, and the raw value.
///
/// Messages store options by absolute [`OptNumber`] in an [`OptionSet`];
/// `Opt`s only exist while reading or writing bytes.
#[derive(Clone, PartialEq, PartialOrd, Debug, Default)]
pub struct Opt {
  /// See [`OptDelta`]
  pub delta: OptDelta,
  /// See [`OptValue`]
  pub value: OptValue,
}

impl Opt {
  /// Number of bytes this option occupies on the wire
  pub fn wire_size(&self) -> usize {
    let ext = |n: u32| match n {
      | n if n >= 269 => 2,
      | n if n >= 13 => 1,
      | _ => 0,
    };

    1 + ext(self.delta.0) + ext(self.value.0.len() as u32) + self.value.0.len()
  }

  /// Given a collection to [`Extend`] and an Opt, add that Opt's bytes to the collection.
  pub fn extend_bytes(self, bytes: &mut impl Extend<u8>) {
    let (del, del_bytes) = crate::to_bytes::opt_len_or_delta(self.delta.0);
    let (len, len_bytes) = crate::to_bytes::opt_len_or_delta(self.value.0.len() as u32);

    bytes.extend(Some((del << 4) | len));

    if let Some(bs) = del_bytes {
      bytes.extend(bs);
    }

    if let Some(bs) = len_bytes {
      bytes.extend(bs);
    }

    bytes.extend(self.value.0);
  }
}

/// The "Option Delta" is the difference between this Option's Number
/// and the previous Option's number.
///
/// # Related
/// - [RFC7252#section-3.1 Option Format](https://datatracker.ietf.org/doc/html/rfc7252#section-3.1)
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct OptDelta(pub u32);

#[doc = rfc_7252_doc!("5.4.6")]
/// <details><summary><b>RFC7252 Section 12.2 Core CoAP Option Numbers</b></summary>
#[doc = concat!("\n#", rfc_7252_doc!("12.2"))]
/// </details>
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct OptNumber(pub u32);

#[doc = rfc_7252_doc!("5.4.1")]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptionMustBeProcessed {
  /// This option must be processed,
  /// and a message that ignores it
  /// will be rejected.
  ///
  /// Corresponds to the option being "critical"
  /// in strict CoAP terms
  Yes,
  /// This option does not _need_ to
  /// be processed.
  ///
  /// Corresponds to the option being "elective"
  /// in strict CoAP terms
  No,
}

#[doc = rfc_7252_doc!("5.4.2")]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WhenOptionUnsupportedByProxy {
  /// This option must be understood by proxies
  /// and may not be forwarded blindly ("UnSafe")
  Error,
  /// This option may be forwarded blindly by proxies
  /// that do not understand it ("SafeToForward")
  Forward,
}

#[doc = rfc_7252_doc!("5.4.2")]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WhenOptionChanges {
  /// The option is part of the cache key
  ResponseChanges,
  /// "NoCacheKey"; different values for this option
  /// should yield the same cached response.
  ResponseDoesNotChange,
}

impl OptNumber {
  /// Whether or not this option may be ignored by a server
  pub fn must_be_processed(&self) -> OptionMustBeProcessed {
    match self.0 & 0b1 {
      | 1 => OptionMustBeProcessed::Yes,
      | _ => OptionMustBeProcessed::No,
    }
  }

  /// Whether or not this option may be forwarded blindly by
  /// a proxy that does not support processing it
  pub fn when_unsupported_by_proxy(&self) -> WhenOptionUnsupportedByProxy {
    match (self.0 & 0b10) >> 1 {
      | 1 => WhenOptionUnsupportedByProxy::Error,
      | _ => WhenOptionUnsupportedByProxy::Forward,
    }
  }

  /// Whether or not different values for this option should
  /// yield proxies' cached response
  pub fn when_option_changes(&self) -> WhenOptionChanges {
    match (self.0 & 0b11110) == 0b11100 {
      | true => WhenOptionChanges::ResponseDoesNotChange,
      | false => WhenOptionChanges::ResponseChanges,
    }
  }

  /// Shorthand for `self.must_be_processed() == OptionMustBeProcessed::Yes`
  pub fn is_critical(&self) -> bool {
    self.must_be_processed() == OptionMustBeProcessed::Yes
  }

  /// Should this option participate in a message's cache key?
  pub fn include_in_cache_key(&self) -> bool {
    self.when_option_changes() == WhenOptionChanges::ResponseChanges
  }
}

#[doc = rfc_7252_doc!("3.2")]
#[derive(Default, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct OptValue(pub Vec<u8>);

impl OptValue {
  /// Encode an unsigned integer using the fewest bytes possible
  /// (big-endian, no leading zeroes; zero is the empty value)
  ///
  /// ```
  /// use croak_msg::OptValue;
  ///
  /// assert_eq!(OptValue::uint(0).0, Vec::<u8>::new());
  /// assert_eq!(OptValue::uint(60).0, vec![60]);
  /// assert_eq!(OptValue::uint(1152).0, vec![0x04, 0x80]);
  /// ```
  pub fn uint(n: u32) -> Self {
    let bytes = n.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    Self(bytes[skip..].to_vec())
  }

  /// Decode an unsigned integer value, yielding `None` if
  /// the value is longer than 4 bytes.
  ///
  /// ```
  /// use croak_msg::OptValue;
  ///
  /// assert_eq!(OptValue(vec![]).as_uint(), Some(0));
  /// assert_eq!(OptValue(vec![1, 0]).as_uint(), Some(256));
  /// assert_eq!(OptValue(vec![1; 5]).as_uint(), None);
  /// ```
  pub fn as_uint(&self) -> Option<u32> {
    match self.0.len() {
      | n if n > 4 => None,
      | _ => Some(self.0.iter().fold(0u32, |n, b| (n << 8) | *b as u32)),
    }
  }

  /// Borrow the value as utf8, if it is utf8
  pub fn as_str(&self) -> Option<&str> {
    core::str::from_utf8(&self.0).ok()
  }

  /// Borrow the value bytes
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }
}

impl From<&str> for OptValue {
  fn from(s: &str) -> Self {
    Self(s.as_bytes().to_vec())
  }
}

impl From<&[u8]> for OptValue {
  fn from(s: &[u8]) -> Self {
    Self(s.to_vec())
  }
}

impl<Bytes: AsRef<[u8]>> TryConsumeBytes<Bytes> for OptionSet {
  type Error = OptParseError;

  fn try_consume_bytes(bytes: &mut Cursor<Bytes>) -> Result<Self, Self::Error> {
    let mut opts = BTreeMap::<OptNumber, Vec<OptValue>>::new();
    let mut number = 0u32;

    loop {
      match Opt::try_consume_bytes(bytes) {
        | Ok(Opt { delta, value }) => {
          number = number.checked_add(delta.0)
                         .ok_or(OptParseError::OptionNumberOverflow)?;
          opts.entry(OptNumber(number)).or_default().push(value);
        },
        | Err(OptParseError::OptionsExhausted) => break Ok(OptionSet::from(opts)),
        | Err(e) => break Err(e),
      }
    }
  }
}

impl<Bytes: AsRef<[u8]>> TryConsumeBytes<Bytes> for Opt {
  type Error = OptParseError;

  fn try_consume_bytes(bytes: &mut Cursor<Bytes>) -> Result<Self, Self::Error> {
    let byte1 = bytes.next()
                     .ok_or(OptParseError::OptionsExhausted)
                     .and_then(|b| {
                       if b == 0b11111111 {
                         Err(OptParseError::OptionsExhausted)
                       } else {
                         Ok(b)
                       }
                     })?;

    // delta's extended bytes precede the length's extended bytes
    let delta = parse_opt_len_or_delta(byte1 >> 4,
                                       bytes,
                                       OptParseError::OptionDeltaReservedValue(15))?;
    let delta = OptDelta(delta);

    let len = parse_opt_len_or_delta(byte1 & 0b00001111,
                                     bytes,
                                     OptParseError::ValueLengthReservedValue(15))?
              as usize;

    let value = bytes.take_exact(len)
                     .ok_or(OptParseError::UnexpectedEndOfStream)?
                     .to_vec();

    Ok(Opt { delta,
             value: OptValue(value) })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_opt() {
    let mut opt_bytes = Cursor::new([0b00010001, 0b00000001]);
    let opt = Opt::try_consume_bytes(&mut opt_bytes).unwrap();
    assert_eq!(opt,
               Opt { delta: OptDelta(1),
                     value: OptValue(vec![1]) });

    let mut opt_bytes = Cursor::new([0b11010001, 0b00000001, 0b00000001]);
    let opt = Opt::try_consume_bytes(&mut opt_bytes).unwrap();
    assert_eq!(opt,
               Opt { delta: OptDelta(14),
                     value: OptValue(vec![1]) });

    let mut opt_bytes = Cursor::new([0b11100001, 0b00000000, 0b00000001, 0b00000001]);
    let opt = Opt::try_consume_bytes(&mut opt_bytes).unwrap();
    assert_eq!(opt,
               Opt { delta: OptDelta(270),
                     value: OptValue(vec![1]) });
  }

  #[test]
  fn parse_opts_running_sum() {
    let mut opt_bytes = Cursor::new([0b10110001, b'a', 0b00000001, b'b', 0b00010000, 0b11111111]);
    let opts = OptionSet::try_consume_bytes(&mut opt_bytes).unwrap();

    assert_eq!(opts.get(OptNumber(11)),
               Some(&[OptValue(vec![b'a']), OptValue(vec![b'b'])][..]));
    assert_eq!(opts.get(OptNumber(12)), Some(&[OptValue(vec![])][..]));
  }

  #[test]
  fn reserved_nibbles() {
    let mut delta_15 = Cursor::new([0b11110001, 0]);
    assert_eq!(Opt::try_consume_bytes(&mut delta_15),
               Err(OptParseError::OptionDeltaReservedValue(15)));

    let mut len_15 = Cursor::new([0b00011111, 0]);
    assert_eq!(Opt::try_consume_bytes(&mut len_15),
               Err(OptParseError::ValueLengthReservedValue(15)));
  }

  #[test]
  fn truncated_value() {
    let mut opt_bytes = Cursor::new([0b00010011, 1, 2]);
    assert_eq!(Opt::try_consume_bytes(&mut opt_bytes),
               Err(OptParseError::UnexpectedEndOfStream));
  }

  #[test]
  fn opt_number_qualities() {
    // critical, safe-to-fwd, cache-key
    let if_match = OptNumber(1);

    // critical, unsafe-to-fwd, cache-key
    let uri_host = OptNumber(3);

    // elective, safe-to-fwd, cache-key
    let etag = OptNumber(4);

    // elective, safe-to-fwd, no-cache-key
    let size1 = OptNumber(60);

    assert!(if_match.is_critical() && uri_host.is_critical());
    assert!(!etag.is_critical() && !size1.is_critical());

    assert_eq!(uri_host.when_unsupported_by_proxy(),
               WhenOptionUnsupportedByProxy::Error);
    assert_eq!(etag.when_unsupported_by_proxy(),
               WhenOptionUnsupportedByProxy::Forward);

    assert!(if_match.include_in_cache_key());
    assert!(etag.include_in_cache_key());
    assert_eq!(size1.when_option_changes(),
               WhenOptionChanges::ResponseDoesNotChange);
  }
}
