use core::fmt;

/// Content-Format option value
///
/// A numeric identifier registered with IANA for an internet media type
/// and content coding. Unregistered numbers are kept as-is.
///
/// ```
/// use croak_msg::ContentFormat;
///
/// assert_eq!(ContentFormat::JSON.mime(), Some("application/json"));
/// assert_eq!(ContentFormat(9999).mime(), None);
/// assert_eq!(ContentFormat::TEXT.to_string(), "text/plain;charset=utf-8");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ContentFormat(pub u16);

impl ContentFormat {
  /// `text/plain;charset=utf-8`
  pub const TEXT: Self = Self(0);
  /// `application/link-format`
  pub const LINK_FORMAT: Self = Self(40);
  /// `application/xml`
  pub const XML: Self = Self(41);
  /// `application/octet-stream`
  pub const OCTET_STREAM: Self = Self(42);
  /// `application/exi`
  pub const EXI: Self = Self(47);
  /// `application/json`
  pub const JSON: Self = Self(50);
  /// `application/cbor`
  pub const CBOR: Self = Self(60);
  /// `application/senml+json`
  pub const SENML_JSON: Self = Self(110);
  /// `application/senml+cbor`
  pub const SENML_CBOR: Self = Self(112);

  /// The media type this format is registered for, if it is one we know
  pub fn mime(&self) -> Option<&'static str> {
    match self.0 {
      | 0 => Some("text/plain;charset=utf-8"),
      | 40 => Some("application/link-format"),
      | 41 => Some("application/xml"),
      | 42 => Some("application/octet-stream"),
      | 47 => Some("application/exi"),
      | 50 => Some("application/json"),
      | 60 => Some("application/cbor"),
      | 110 => Some("application/senml+json"),
      | 112 => Some("application/senml+cbor"),
      | _ => None,
    }
  }
}

impl fmt::Display for ContentFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.mime() {
      | Some(mime) => f.write_str(mime),
      | None => write!(f, "ct={}", self.0),
    }
  }
}
