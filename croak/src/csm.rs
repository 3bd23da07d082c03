use std::net::SocketAddr;

use croak_msg::{BlockSize, Signaling};

use crate::config::Csm;
use crate::shard::Sharded;

/// What a stream peer can handle, as announced in its CSM
/// (RFC 8323 section 5.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capabilities {
  /// Largest message (options + payload) the peer accepts
  pub max_message_size: u32,
  /// Whether the peer supports block-wise transfers
  pub block_wise: bool,
}

impl Default for Capabilities {
  fn default() -> Self {
    Self::BASE
  }
}

impl From<Csm> for Capabilities {
  fn from(c: Csm) -> Self {
    Self { max_message_size: c.max_message_size,
           block_wise: c.block_wise }
  }
}

impl Capabilities {
  /// Assumed of every peer until its CSM arrives
  pub const BASE: Self = Self { max_message_size: 1152,
                                block_wise: false };

  /// Component-wise minimum; what both ends can handle
  ///
  /// ```
  /// use croak::csm::Capabilities;
  ///
  /// let a = Capabilities { max_message_size: 8192, block_wise: true };
  /// let b = Capabilities { max_message_size: 2048, block_wise: false };
  /// assert_eq!(a.min(b), Capabilities { max_message_size: 2048, block_wise: false });
  /// ```
  pub fn min(self, other: Self) -> Self {
    Self { max_message_size: self.max_message_size.min(other.max_message_size),
           block_wise: self.block_wise && other.block_wise }
  }

  /// Block-wise Extension for Reliable Transport (RFC 8323 section 6)
  /// is used when both sides do block-wise and messages may be
  /// larger than the base size.
  pub fn is_bert(&self) -> bool {
    self.block_wise && self.max_message_size > Self::BASE.max_message_size
  }

  /// Block size to use for bodies that do not fit in one message
  ///
  /// ```
  /// use croak::csm::Capabilities;
  /// use croak_msg::BlockSize;
  ///
  /// let bert = Capabilities { max_message_size: 8192, block_wise: true };
  /// assert_eq!(bert.block_size(), Some(BlockSize::Bert));
  ///
  /// let small = Capabilities { max_message_size: 600, block_wise: true };
  /// assert_eq!(small.block_size(), Some(BlockSize::S512));
  ///
  /// assert_eq!(Capabilities::BASE.block_size(), None);
  /// ```
  pub fn block_size(&self) -> Option<BlockSize> {
    match (self.block_wise, self.is_bert()) {
      | (false, _) => None,
      | (true, true) => Some(BlockSize::Bert),
      | (true, false) => Some(BlockSize::fit(self.max_message_size as usize)),
    }
  }

  /// Largest payload a single outbound message should carry
  ///
  /// BERT messages carry as many 1024-byte blocks as fit,
  /// leaving room for the header and options.
  ///
  /// ```
  /// use croak::csm::Capabilities;
  ///
  /// let bert = Capabilities { max_message_size: 8192, block_wise: true };
  /// assert_eq!(bert.max_outbound_payload(), 7 * 1024);
  ///
  /// let small = Capabilities { max_message_size: 600, block_wise: true };
  /// assert_eq!(small.max_outbound_payload(), 512);
  ///
  /// assert_eq!(Capabilities::BASE.max_outbound_payload(), 1152);
  /// ```
  pub fn max_outbound_payload(&self) -> usize {
    let max = self.max_message_size as usize;
    match self.block_size() {
      | None => max,
      | Some(BlockSize::Bert) if max / 1024 > 1 => (max / 1024 - 1) * 1024,
      | Some(BlockSize::Bert) => 1024,
      | Some(size) => size.size(),
    }
  }

  /// Does a body of `len` bytes need to be sent block-wise?
  pub fn use_block_transfer(&self, len: usize) -> bool {
    self.block_wise && len > self.max_outbound_payload()
  }

  /// The CSM signal announcing these capabilities
  pub fn signal(&self) -> Signaling {
    Signaling::Csm { max_message_size: Some(self.max_message_size),
                     block_wise: self.block_wise }
  }
}

/// Local capabilities plus what has been agreed with each connected peer
#[derive(Debug)]
pub struct CapabilitiesStore {
  local: Capabilities,
  peers: Sharded<SocketAddr, Capabilities>,
}

impl CapabilitiesStore {
  /// Create a store advertising `local`
  pub fn new(local: Capabilities) -> Self {
    Self { local,
           peers: Sharded::default() }
  }

  /// What we advertise
  pub fn local(&self) -> Capabilities {
    self.local
  }

  /// What has been agreed with `addr`, [`Capabilities::BASE`]
  /// if its CSM has not arrived yet.
  pub fn get(&self, addr: SocketAddr) -> Capabilities {
    self.peers.get(&addr, |c| c.copied()).unwrap_or(Capabilities::BASE)
  }

  /// Record a CSM from `addr`, yielding what both can handle.
  ///
  /// A CSM without Max-Message-Size keeps the size agreed earlier
  /// (the base size if this is the peer's first CSM).
  pub fn put_peer(&self, addr: SocketAddr, max_message_size: Option<u32>, block_wise: bool) -> Capabilities {
    self.peers.update(addr, |prev| {
                let prev_max = prev.unwrap_or(Capabilities::BASE).max_message_size;
                let theirs = Capabilities { max_message_size: max_message_size.unwrap_or(prev_max),
                                            block_wise };
                let agreed = self.local.min(theirs);
                (Some(agreed), agreed)
              })
  }

  /// Forget `addr` (disconnected)
  pub fn remove(&self, addr: SocketAddr) {
    self.peers.remove(&addr);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test::addr;

  #[test]
  fn peers_default_to_base() {
    let store = CapabilitiesStore::new(Capabilities { max_message_size: 4096,
                                                      block_wise: true });
    assert_eq!(store.get(addr(1)), Capabilities::BASE);

    let agreed = store.put_peer(addr(1), Some(65_535), true);
    assert_eq!(agreed,
               Capabilities { max_message_size: 4096,
                              block_wise: true });
    assert_eq!(store.get(addr(1)), agreed);
    assert!(agreed.is_bert());

    store.remove(addr(1));
    assert_eq!(store.get(addr(1)), Capabilities::BASE);
  }

  #[test]
  fn block_transfer_threshold() {
    let caps = Capabilities { max_message_size: 1152,
                              block_wise: true };
    assert!(!caps.is_bert());
    assert_eq!(caps.block_size(), Some(BlockSize::S1024));
    assert!(!caps.use_block_transfer(1024));
    assert!(caps.use_block_transfer(1025));

    assert!(!Capabilities::BASE.use_block_transfer(1_000_000));
  }

  #[test]
  fn later_csm_keeps_size_when_absent() {
    let store = CapabilitiesStore::new(Capabilities { max_message_size: 8192,
                                                      block_wise: true });

    // first CSM without a size falls back to the base size
    assert_eq!(store.put_peer(addr(1), None, true).max_message_size, 1152);

    assert_eq!(store.put_peer(addr(1), Some(4096), true).max_message_size, 4096);
    assert_eq!(store.put_peer(addr(1), None, true),
               Capabilities { max_message_size: 4096,
                              block_wise: true });
  }
}
