use core::fmt;

use toad_macros::rfc_7252_doc;

macro_rules! code {
  (rfc7252($section:literal) $name:ident = $c:literal * $d:literal) => {
    #[doc = rfc_7252_doc!($section)]
    #[allow(clippy::zero_prefixed_literal)]
    pub const $name: Code = Code::new($c, $d);
  };
  ($(#[doc = $doc:expr])* $name:ident = $c:literal * $d:literal) => {
    $(#[doc = $doc])*
    #[allow(clippy::zero_prefixed_literal)]
    pub const $name: Code = Code::new($c, $d);
  };
}

/// # Message Code
/// 8-bit unsigned integer, split into a 3-bit class (most
/// significant bits) and a 5-bit detail (least significant bits),
/// documented as "c.dd" where "c" is a digit from 0 to 7 for the
/// 3-bit subfield and "dd" are two digits from 00 to 31 for the
/// 5-bit subfield.
///
/// The class can indicate a request (0), a success response (2),
/// a client error response (4), a server error response (5)
/// or a signaling message on a stream transport (7).
///
/// As a special case, Code 0.00 indicates an Empty message.
///
/// ```
/// use croak_msg::{code, Code, CodeKind, Method};
///
/// assert_eq!(Code::from(0b010_00101), code::CONTENT);
/// assert_eq!(code::CONTENT.to_string(), "2.05");
/// assert_eq!(Code::GET.method(), Some(Method::Get));
/// assert_eq!(code::CSM.kind(), CodeKind::Signaling);
/// ```
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Code {
  /// The "class" of message codes identify it as a request or response, and provides the class of response status:
  ///
  /// |class|meaning|
  /// |---|---|
  /// |`0`|Message is a request|
  /// |`2`|Message is a success response|
  /// |`4`|Message is a client error response|
  /// |`5`|Message is a server error response|
  /// |`7`|Message is a signaling message (stream transports only)|
  pub class: u8,

  /// 2-digit integer (range `[0, 32)`) that provides granular information about the response status.
  ///
  /// Will always be `0` for empty messages.
  pub detail: u8,
}

/// Whether a code is for a request, response, signaling or empty message
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum CodeKind {
  /// 0.00, a message with no request or response semantics
  /// (empty ACK, Reset, or a CoAP ping)
  Empty,
  /// A request method, see [`Method`]
  Request,
  /// A response code of class 2, 4 or 5
  Response,
  /// One of the signaling codes 7.01 through 7.05
  Signaling,
  /// Any other value; not a method and not a response this
  /// library understands.
  Unrecognized,
}

/// Request methods, the codes of class 0 other than 0.00
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[allow(missing_docs)]
pub enum Method {
  Get,
  Post,
  Put,
  Delete,
  Fetch,
  Patch,
  IPatch,
}

impl Method {
  /// The code that represents this method on the wire
  pub const fn code(&self) -> Code {
    match self {
      | Method::Get => Code::GET,
      | Method::Post => Code::POST,
      | Method::Put => Code::PUT,
      | Method::Delete => Code::DELETE,
      | Method::Fetch => Code::FETCH,
      | Method::Patch => Code::PATCH,
      | Method::IPatch => Code::IPATCH,
    }
  }
}

impl From<Method> for Code {
  fn from(m: Method) -> Code {
    m.code()
  }
}

impl Code {
  /// Create a new Code
  ///
  /// ```
  /// use croak_msg::Code;
  ///
  /// let content = Code::new(2, 05);
  /// ```
  pub const fn new(class: u8, detail: u8) -> Self {
    Self { class, detail }
  }

  /// 0.00, the code of empty messages
  pub const EMPTY: Self = Self::new(0, 0);

  /// [`Method::Get`]
  pub const GET: Self = Self::new(0, 1);

  /// [`Method::Post`]
  pub const POST: Self = Self::new(0, 2);

  /// [`Method::Put`]
  pub const PUT: Self = Self::new(0, 3);

  /// [`Method::Delete`]
  pub const DELETE: Self = Self::new(0, 4);

  /// [`Method::Fetch`] (RFC 8132)
  pub const FETCH: Self = Self::new(0, 5);

  /// [`Method::Patch`] (RFC 8132)
  pub const PATCH: Self = Self::new(0, 6);

  /// [`Method::IPatch`] (RFC 8132)
  pub const IPATCH: Self = Self::new(0, 7);

  /// Get the request method this code represents, if any
  pub fn method(&self) -> Option<Method> {
    match (self.class, self.detail) {
      | (0, 1) => Some(Method::Get),
      | (0, 2) => Some(Method::Post),
      | (0, 3) => Some(Method::Put),
      | (0, 4) => Some(Method::Delete),
      | (0, 5) => Some(Method::Fetch),
      | (0, 6) => Some(Method::Patch),
      | (0, 7) => Some(Method::IPatch),
      | _ => None,
    }
  }

  /// Classify this code
  pub fn kind(&self) -> CodeKind {
    match (self.class, self.detail) {
      | (0, 0) => CodeKind::Empty,
      | (0, _) if self.method().is_some() => CodeKind::Request,
      | (2 | 4 | 5, _) => CodeKind::Response,
      | (7, 1..=5) => CodeKind::Signaling,
      | _ => CodeKind::Unrecognized,
    }
  }

  /// Is this a request method?
  pub fn is_request(&self) -> bool {
    self.kind() == CodeKind::Request
  }

  /// Is this a class 7 signaling code?
  pub fn is_signaling(&self) -> bool {
    self.kind() == CodeKind::Signaling
  }

  /// Is this a response code of class 4 or 5?
  pub fn is_error(&self) -> bool {
    matches!(self.class, 4 | 5)
  }
}

impl From<u8> for Code {
  fn from(b: u8) -> Self {
    Code { class: b >> 5,
           detail: b & 0b0001_1111 }
  }
}

impl From<Code> for u8 {
  fn from(code: Code) -> u8 {
    (code.class << 5) | (code.detail & 0b0001_1111)
  }
}

impl fmt::Display for Code {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{:02}", self.class, self.detail)
  }
}

// 2.xx
code!(rfc7252("5.9.1.1") CREATED = 2 * 01);
code!(rfc7252("5.9.1.2") DELETED = 2 * 02);
code!(rfc7252("5.9.1.3") VALID   = 2 * 03);
code!(rfc7252("5.9.1.4") CHANGED = 2 * 04);
code!(rfc7252("5.9.1.5") CONTENT = 2 * 05);
code!(
  #[doc = concat!(
    "## [2.31 Continue](https://www.rfc-editor.org/rfc/rfc7959#section-2.9.1)\n",
    "The transfer of this block of the request body was successful\n",
    "and the server encourages sending further blocks; the outcome of the\n",
    "whole block-wise request cannot be determined yet.",
  )]
  CONTINUE = 2 * 31
);

// 4.xx
code!(rfc7252("5.9.2.1")  BAD_REQUEST                = 4 * 00);
code!(rfc7252("5.9.2.2")  UNAUTHORIZED               = 4 * 01);
code!(rfc7252("5.9.2.3")  BAD_OPTION                 = 4 * 02);
code!(rfc7252("5.9.2.4")  FORBIDDEN                  = 4 * 03);
code!(rfc7252("5.9.2.5")  NOT_FOUND                  = 4 * 04);
code!(rfc7252("5.9.2.6")  METHOD_NOT_ALLOWED         = 4 * 05);
code!(rfc7252("5.9.2.7")  NOT_ACCEPTABLE             = 4 * 06);
code!(
  #[doc = concat!(
    "## [4.08 Request Entity Incomplete](https://www.rfc-editor.org/rfc/rfc7959#section-2.9.2)\n",
    "The server has not received the blocks of the request body that\n",
    "it needs to proceed, because they were never sent, were sent out of order,\n",
    "or were discarded after too long.",
  )]
  REQUEST_ENTITY_INCOMPLETE = 4 * 08
);
code!(rfc7252("5.9.2.8")  PRECONDITION_FAILED        = 4 * 12);
code!(rfc7252("5.9.2.9")  REQUEST_ENTITY_TOO_LARGE   = 4 * 13);
code!(rfc7252("5.9.2.10") UNSUPPORTED_CONTENT_FORMAT = 4 * 15);

// 5.xx
code!(rfc7252("5.9.3.1") INTERNAL_SERVER_ERROR  = 5 * 00);
code!(rfc7252("5.9.3.2") NOT_IMPLEMENTED        = 5 * 01);
code!(rfc7252("5.9.3.3") BAD_GATEWAY            = 5 * 02);
code!(rfc7252("5.9.3.4") SERVICE_UNAVAILABLE    = 5 * 03);
code!(rfc7252("5.9.3.5") GATEWAY_TIMEOUT        = 5 * 04);
code!(rfc7252("5.9.3.6") PROXYING_NOT_SUPPORTED = 5 * 05);

// 7.xx (RFC 8323)
code!(
  /// Capabilities and Settings Message; carries Max-Message-Size and Block-Wise-Transfer
  CSM = 7 * 01
);
code!(
  /// Liveness probe on a stream transport, answered with [`PONG`]
  PING = 7 * 02
);
code!(
  /// Answer to [`PING`], echoing its token
  PONG = 7 * 03
);
code!(
  /// The sender will close the connection and asks the peer to stop using it
  RELEASE = 7 * 04
);
code!(
  /// The sender aborts the connection immediately
  ABORT = 7 * 05
);

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assert_eqb;

  #[test]
  fn parse_code() {
    let byte = 0b_01_000101u8;
    let code = Code::from(byte);
    assert_eq!(code, Code { class: 2, detail: 5 })
  }

  #[test]
  fn serialize_code() {
    let actual: u8 = CONTENT.into();
    assert_eqb!(actual, 0b0100_0101_u8);

    let actual: u8 = REQUEST_ENTITY_INCOMPLETE.into();
    assert_eqb!(actual, 0b1000_1000_u8);
  }

  #[test]
  fn kinds() {
    assert_eq!(Code::EMPTY.kind(), CodeKind::Empty);
    assert_eq!(Code::IPATCH.kind(), CodeKind::Request);
    assert_eq!(Code::new(0, 8).kind(), CodeKind::Unrecognized);
    assert_eq!(CONTINUE.kind(), CodeKind::Response);
    assert_eq!(Code::new(4, 29).kind(), CodeKind::Response);
    assert_eq!(ABORT.kind(), CodeKind::Signaling);
    assert_eq!(Code::new(7, 6).kind(), CodeKind::Unrecognized);
    assert_eq!(Code::new(3, 0).kind(), CodeKind::Unrecognized);
  }

  #[test]
  fn display() {
    assert_eq!(REQUEST_ENTITY_TOO_LARGE.to_string(), "4.13");
    assert_eq!(Code::GET.to_string(), "0.01");
  }
}
