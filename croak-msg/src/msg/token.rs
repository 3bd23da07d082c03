use core::fmt;

use tinyvec::ArrayVec;
use toad_macros::rfc_7252_doc;

#[doc = rfc_7252_doc!("5.3.1")]
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Token(pub ArrayVec<[u8; 8]>);

impl Token {
  /// Take an arbitrary-length sequence of bytes and turn it into an opaque message token
  ///
  /// Uses the BLAKE2 hashing algorithm.
  ///
  /// ```
  /// use croak_msg::Token;
  ///
  /// let a = Token::opaque(&[0, 1, 2]);
  /// let b = Token::opaque(&[0, 1, 2]);
  /// assert_eq!(a, b);
  /// assert_eq!(a.0.len(), 8);
  /// ```
  pub fn opaque(data: &[u8]) -> Token {
    use blake2::digest::consts::U8;
    use blake2::{Blake2b, Digest};

    let mut digest = Blake2b::<U8>::new();
    digest.update(data);
    Token(Into::<[u8; 8]>::into(digest.finalize()).into())
  }

  /// Copy a token out of a byte slice, yielding `None` if it is longer than 8 bytes
  ///
  /// ```
  /// use croak_msg::Token;
  ///
  /// assert_eq!(Token::from_slice(&[1, 2]).map(|t| t.0.len()), Some(2));
  /// assert_eq!(Token::from_slice(&[0; 9]), None);
  /// ```
  pub fn from_slice(bytes: &[u8]) -> Option<Token> {
    ArrayVec::try_from(bytes).ok().map(Token)
  }

  /// Is this the zero-length token?
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Borrow the token bytes
  pub fn as_bytes(&self) -> &[u8] {
    self.0.as_slice()
  }
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "0x")?;
    self.0.iter().try_for_each(|b| write!(f, "{:02x}", b))
  }
}
