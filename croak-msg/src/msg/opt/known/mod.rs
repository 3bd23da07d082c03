use crate::OptNumber;

/// Content-Format values
pub mod content_format;
pub use content_format::*;

/// Block1 / Block2 option values
pub mod block;
pub use block::*;

macro_rules! opt {
  (rfc7252($section:literal) $name:ident = $n:literal) => {
    #[doc = ::toad_macros::rfc_7252_doc!($section)]
    pub const $name: crate::OptNumber = crate::OptNumber($n);
  };
  ($(#[doc = $doc:expr])* $name:ident = $n:literal) => {
    $(#[doc = $doc])*
    pub const $name: crate::OptNumber = crate::OptNumber($n);
  };
}

pub(crate) use opt;

/// Options that may occur at most once in a message
pub mod no_repeat {
  use super::opt;

  opt!(rfc7252("5.10.1") HOST = 3);
  opt!(rfc7252("5.10.8.2") IF_NONE_MATCH = 5);
  opt!(
    /// Observe (RFC 7641); registration / sequence number of a notification.
    ///
    /// The value 0 is sent as an empty option.
    OBSERVE = 6
  );
  opt!(
    /// See [`HOST`]
    PORT = 7
  );
  opt!(rfc7252("5.10.3") CONTENT_FORMAT = 12);
  opt!(rfc7252("5.10.5") MAX_AGE = 14);
  opt!(rfc7252("5.10.4") ACCEPT = 17);
  opt!(
    /// Block2 (RFC 7959); the block of the response body being carried or requested
    BLOCK2 = 23
  );
  opt!(
    /// Block1 (RFC 7959); the block of the request body being carried or acknowledged
    BLOCK1 = 27
  );
  opt!(
    /// Size2 (RFC 7959); total size of the response body
    SIZE2 = 28
  );
  opt!(rfc7252("5.10.2") PROXY_URI = 35);
  opt!(
    /// See [`PROXY_URI`]
    PROXY_SCHEME = 39
  );
  opt!(rfc7252("5.10.9") SIZE1 = 60);
}

/// Options that may occur more than once in a message
pub mod repeat {
  use super::opt;

  opt!(rfc7252("5.10.8.1") IF_MATCH = 1);
  opt!(
    #[doc = concat!(
      toad_macros::rfc_7252_doc!("5.10.6"),
      "\n<details><summary>ETag as a Request Option</summary>\n\n",
      toad_macros::rfc_7252_doc!("5.10.6.2"),
      "\n</details><details><summary>ETag as a Response Option</summary>\n\n",
      toad_macros::rfc_7252_doc!("5.10.6.1"),
      "</details>"
    )]
    ETAG = 4
  );
  opt!(rfc7252("5.10.7") LOCATION_PATH = 8);
  opt!(
    /// One segment of the request path; see [`super::no_repeat::HOST`]
    PATH = 11
  );
  opt!(
    /// One `key=value` argument of the request query; see [`super::no_repeat::HOST`]
    QUERY = 15
  );
  opt!(
    /// See [`LOCATION_PATH`]
    LOCATION_QUERY = 20
  );
}

/// Every option number this library interprets in request & response messages.
///
/// Used by [`Message::unrecognized_critical`](crate::Message::unrecognized_critical);
/// critical options outside this set cause a request to be rejected.
pub const RECOGNIZED: [OptNumber; 19] = [repeat::IF_MATCH,
                                         no_repeat::HOST,
                                         repeat::ETAG,
                                         no_repeat::IF_NONE_MATCH,
                                         no_repeat::OBSERVE,
                                         no_repeat::PORT,
                                         repeat::LOCATION_PATH,
                                         repeat::PATH,
                                         no_repeat::CONTENT_FORMAT,
                                         no_repeat::MAX_AGE,
                                         repeat::QUERY,
                                         no_repeat::ACCEPT,
                                         repeat::LOCATION_QUERY,
                                         no_repeat::BLOCK2,
                                         no_repeat::BLOCK1,
                                         no_repeat::SIZE2,
                                         no_repeat::PROXY_URI,
                                         no_repeat::PROXY_SCHEME,
                                         no_repeat::SIZE1];
