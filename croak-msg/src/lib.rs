//! Low-level representation of CoAP messages.
//!
//! The most notable item in `croak_msg` is [`Message`];
//! a CoAP message very close to the actual byte layout,
//! readable from and writable to both framings CoAP is carried in:
//!
//! - datagrams (RFC 7252 over UDP) with [`TryFromBytes`] / [`TryIntoBytes`]
//! - streams (RFC 8323 over TCP) with [`tcp::encode`], [`tcp::decode`] and [`tcp::frame_len`]
//!
//! Options are kept in an [`OptionSet`] keyed by option number, with typed
//! accessors for the options of RFC 7252, RFC 7641 and RFC 7959
//! (including the [`Block`] options used by block-wise transfers) and a
//! [`Signaling`] view of the options carried by 7.xx messages.
//!
//! ```
//! use croak_msg::*;
//!
//! let req = Message::new(Type::Con, Code::GET, Id(1), Token::from_slice(&[1]).unwrap())
//!             .with_opts(OptionSet::new().with_path("hello"));
//!
//! let datagram = req.clone().try_into_bytes().unwrap();
//! assert_eq!(Message::try_from_bytes(&datagram).unwrap(), req);
//!
//! let frame = tcp::encode(&req).unwrap();
//! let (decoded, _) = tcp::decode(&frame).unwrap();
//! assert_eq!(decoded.opts.path(), "hello");
//! ```
//!
//! ## Performance
//! This crate uses `criterion` to measure encoding and decoding
//! against `coap_lite::Packet`; see `benches/codec.rs`.

#![doc(html_root_url = "https://docs.rs/croak-msg/0.1.0")]
#![cfg_attr(not(test), forbid(missing_debug_implementations, unreachable_pub))]
#![cfg_attr(not(test), deny(unsafe_code))]
#![cfg_attr(any(docsrs, feature = "docs"), feature(doc_cfg))]
#![deny(missing_docs)]

#[doc(hidden)]
pub mod from_bytes;

/// Message structs
pub mod msg;

/// Stream framing
pub mod tcp;

#[doc(hidden)]
pub mod to_bytes;

mod cache_key;

pub use cache_key::*;
#[doc(inline)]
pub use from_bytes::TryFromBytes;
#[doc(inline)]
pub use msg::*;
#[doc(inline)]
pub use to_bytes::{MessageToBytesError, TryIntoBytes};

#[cfg(test)]
pub(crate) fn test_msg() -> (Message, Vec<u8>) {
  let header: [u8; 4] = 0b0100_0001_0100_0101_0000_0000_0000_0001_u32.to_be_bytes();
  let token: [u8; 1] = [254u8];
  let content_format: &[u8] = b"application/json";
  let options: [&[u8]; 2] = [&[0b_1100_1101u8, 0b00000011u8], content_format];
  let payload: [&[u8]; 2] = [&[0b1111_1111_u8], b"hello, world!"];
  let bytes = [header.as_ref(),
               token.as_ref(),
               options.concat().as_ref(),
               payload.concat().as_ref()].concat();

  let msg = Message { id: Id(1),
                      ty: Type::Con,
                      ver: Version(1),
                      token: Token(tinyvec::array_vec!([u8; 8] => 254)),
                      opts: OptionSet::new().set(OptNumber(12), content_format),
                      code: Code { class: 2,
                                   detail: 5 },
                      payload: Payload(b"hello, world!".to_vec()) };
  (msg, bytes)
}

#[cfg(test)]
#[allow(missing_docs)]
pub(crate) mod tests {
  #[macro_export]
  macro_rules! assert_eqb {
    ($actual:expr, $expected:expr) => {
      if $actual != $expected {
        panic!("expected {:08b} to equal {:08b}", $actual, $expected)
      }
    };
  }

  #[macro_export]
  macro_rules! assert_eqb_iter {
    ($actual:expr, $expected:expr) => {
      if $actual.iter().ne($expected.iter()) {
        panic!("expected {:?} to equal {:?}",
               $actual.into_iter()
                      .map(|b| format!("{:08b}", b))
                      .collect::<Vec<_>>(),
               $expected.into_iter()
                        .map(|b| format!("{:08b}", b))
                        .collect::<Vec<_>>())
      }
    };
  }
}
