use core::fmt;
use core::hash::{Hash, Hasher};

use blake2::digest::consts::U8;
use blake2::{Blake2b, Digest};

use crate::Message;

/// [`Hasher`] producing a 64-bit BLAKE2b digest
#[derive(Clone, Default)]
pub struct Blake2Hasher(Blake2b<U8>);

impl fmt::Debug for Blake2Hasher {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Blake2Hasher").finish()
  }
}

impl Hasher for Blake2Hasher {
  fn finish(&self) -> u64 {
    u64::from_be_bytes(self.0.clone().finalize().into())
  }

  fn write(&mut self, bytes: &[u8]) {
    self.0.update(bytes);
  }
}

/// Default hasher used for [`CacheKey`]
///
/// Hashes the message code and the values of every option
/// that is not marked NoCacheKey.
#[derive(Debug, Clone, Default)]
pub struct DefaultCacheKey(Blake2Hasher);

impl DefaultCacheKey {
  /// Create a new `DefaultCacheKey`
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheKey for DefaultCacheKey {
  type Hasher = Blake2Hasher;

  fn hasher(&mut self) -> &mut Self::Hasher {
    &mut self.0
  }

  fn add_cache_key(&mut self, msg: &Message) {
    msg.code.hash(&mut self.0);
    msg.opts.iter().for_each(|(num, vals)| {
                     if num.include_in_cache_key() {
                       num.hash(&mut self.0);
                       vals.iter().for_each(|v| v.hash(&mut self.0))
                     }
                   });
  }
}

/// The cache key can be used to compare messages for representing
/// the same action against the same resource; for example requests
/// with different IDs but the same method and cache-key affecting options
/// (ex. path, query parameters) will yield the same cache-key.
///
/// [`DefaultCacheKey`] Provides a default implementation.
pub trait CacheKey
  where Self: Sized + fmt::Debug
{
  /// Type used to generate hashes
  type Hasher: Hasher;

  #[allow(missing_docs)]
  fn hasher(&mut self) -> &mut Self::Hasher;

  /// Add this message's cache key to the hasher's internal state.
  fn add_cache_key(&mut self, msg: &Message);

  /// Add this message's cache key to the hasher's internal state and yield the [`u64`] hash.
  fn cache_key(&mut self, msg: &Message) -> u64 {
    self.add_cache_key(msg);
    self.hasher().finish()
  }
}

impl Message {
  /// [`DefaultCacheKey`] of this message
  ///
  /// ```
  /// use croak_msg::{Code, Id, Message, OptionSet, Token, Type};
  ///
  /// let a = Message::new(Type::Con, Code::GET, Id(1), Token::default())
  ///           .with_opts(OptionSet::new().with_path("temp").with_size2(0));
  /// let b = Message::new(Type::Non, Code::GET, Id(2), Token::from_slice(&[1]).unwrap())
  ///           .with_opts(OptionSet::new().with_path("temp"));
  /// let c = b.clone().map_opts(|o| o.with_path("humidity"));
  ///
  /// assert_eq!(a.cache_key(), b.cache_key());
  /// assert_ne!(a.cache_key(), c.cache_key());
  /// ```
  pub fn cache_key(&self) -> u64 {
    DefaultCacheKey::new().cache_key(self)
  }
}
