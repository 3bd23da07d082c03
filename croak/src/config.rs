use croak_msg::BlockSize;
use embedded_time::duration::Milliseconds;

use crate::retry::{Attempts, Strategy};
use crate::time::Millis;
use crate::transaction::Priority;

/// Configuration options related to outbound confirmable messages
/// and the transactions that track them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transactions {
  /// Maximum number of transactions queued for a single remote address.
  ///
  /// Requests beyond this fail with [`Error::TooManyRequestsForEndpoint`](crate::Error::TooManyRequestsForEndpoint).
  ///
  /// ```
  /// use croak::config::Transactions;
  ///
  /// assert_eq!(Transactions::default().max_queue_size, 100);
  /// ```
  pub max_queue_size: usize,

  /// Retransmission strategy for confirmable messages sent to unicast addresses.
  ///
  /// Defaults to an exponential strategy with an initial timeout
  /// between 2 and 3 seconds (RFC 7252 `ACK_TIMEOUT` * `ACK_RANDOM_FACTOR`):
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Transactions;
  /// use croak::retry::Strategy;
  ///
  /// assert_eq!(Transactions::default().strategy,
  ///            Strategy::Exponential { init_min: Milliseconds(2_000),
  ///                                    init_max: Milliseconds(3_000) });
  /// ```
  pub strategy: Strategy,

  /// Number of times a confirmable message is transmitted (including the first)
  /// before it times out.
  ///
  /// Defaults to 5 (1 transmission + `MAX_RETRANSMIT` = 4).
  /// ```
  /// use croak::config::Transactions;
  /// use croak::retry::Attempts;
  ///
  /// assert_eq!(Transactions::default().max_attempts, Attempts(5));
  /// ```
  pub max_attempts: Attempts,

  /// Strategy for confirmable messages sent to multicast addresses.
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Transactions;
  /// use croak::retry::Strategy;
  ///
  /// assert_eq!(Transactions::default().multicast_strategy,
  ///            Strategy::Delay { min: Milliseconds(5_000),
  ///                              max: Milliseconds(5_000) });
  /// ```
  pub multicast_strategy: Strategy,

  /// Transmissions to multicast addresses; defaults to 1 (never retransmitted)
  pub multicast_max_attempts: Attempts,

  /// How long a request stays correlated by token after it was acknowledged
  /// with an empty ACK (or sent non-confirmable) and no response arrived.
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Transactions;
  ///
  /// assert_eq!(Transactions::default().delayed_transaction_timeout,
  ///            Milliseconds(120_000u64));
  /// ```
  #[cfg_attr(feature = "serde", serde(with = "crate::time::serde_millis"))]
  pub delayed_transaction_timeout: Millis,

  /// Priority of requests sent without an explicit one
  pub default_priority: Priority,
}

/// Configuration of the inbound duplicate detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dedup {
  /// How long a (message id, address) pair is remembered
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Dedup;
  ///
  /// assert_eq!(Dedup::default().timeout, Milliseconds(30_000u64));
  /// ```
  #[cfg_attr(feature = "serde", serde(with = "crate::time::serde_millis"))]
  pub timeout: Millis,

  /// How often the embedding application should call
  /// [`DuplicateDetector::clean`](crate::dedup::DuplicateDetector::clean)
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Dedup;
  ///
  /// assert_eq!(Dedup::default().clean_interval, Milliseconds(10_000u64));
  /// ```
  #[cfg_attr(feature = "serde", serde(with = "crate::time::serde_millis"))]
  pub clean_interval: Millis,

  /// Number of entries above which the oldest ones are evicted,
  /// with a 1% margin before eviction kicks in.
  ///
  /// ```
  /// use croak::config::Dedup;
  ///
  /// assert_eq!(Dedup::default().max_size, 10_000);
  /// ```
  pub max_size: usize,
}

/// Configuration of block-wise transfers (RFC 7959)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockWise {
  /// Block size used for datagram transfers; `None` disables splitting
  /// outbound bodies. Inbound Block1 / Block2 options are honored either way.
  ///
  /// On stream transports the size is negotiated by CSM instead.
  ///
  /// ```
  /// use croak::config::BlockWise;
  ///
  /// assert_eq!(BlockWise::default().size, None);
  /// ```
  #[cfg_attr(feature = "serde", serde(with = "serde_block_size"))]
  pub size: Option<BlockSize>,

  /// Largest body that will be reassembled from incoming blocks
  ///
  /// ```
  /// use croak::config::BlockWise;
  ///
  /// assert_eq!(BlockWise::default().max_incoming_transfer_size, 10 * 1024 * 1024);
  /// ```
  pub max_incoming_transfer_size: usize,

  /// How many times a Block2 download restarts because the
  /// resource's ETag changed, before giving up
  ///
  /// ```
  /// use croak::config::BlockWise;
  ///
  /// assert_eq!(BlockWise::default().max_resource_changes, 3);
  /// ```
  pub max_resource_changes: u8,

  /// How long a partially received Block1 upload is kept
  /// without a new block arriving
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::BlockWise;
  ///
  /// assert_eq!(BlockWise::default().status_lifetime, Milliseconds(300_000u64));
  /// ```
  #[cfg_attr(feature = "serde", serde(with = "crate::time::serde_millis"))]
  pub status_lifetime: Millis,
}

/// Capabilities advertised in our CSM on stream transports.
///
/// `max_message_size` also caps outbound datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Csm {
  /// ```
  /// use croak::config::Csm;
  ///
  /// assert_eq!(Csm::default().max_message_size, 1152);
  /// ```
  pub max_message_size: u32,
  /// ```
  /// use croak::config::Csm;
  ///
  /// assert!(!Csm::default().block_wise);
  /// ```
  pub block_wise: bool,
}

impl Default for Transactions {
  fn default() -> Self {
    Transactions { max_queue_size: 100,
                   strategy: Strategy::Exponential { init_min: Milliseconds(2_000),
                                                     init_max: Milliseconds(3_000) },
                   max_attempts: Attempts(5),
                   multicast_strategy: Strategy::Delay { min: Milliseconds(5_000),
                                                         max: Milliseconds(5_000) },
                   multicast_max_attempts: Attempts(1),
                   delayed_transaction_timeout: Milliseconds(120_000),
                   default_priority: Priority::Normal }
  }
}

impl Default for Dedup {
  fn default() -> Self {
    Dedup { timeout: Milliseconds(30_000),
            clean_interval: Milliseconds(10_000),
            max_size: 10_000 }
  }
}

impl Default for BlockWise {
  fn default() -> Self {
    BlockWise { size: None,
                max_incoming_transfer_size: 10 * 1024 * 1024,
                max_resource_changes: 3,
                status_lifetime: Milliseconds(300_000) }
  }
}

impl Default for Csm {
  fn default() -> Self {
    Csm { max_message_size: 1152,
          block_wise: false }
  }
}

/// Runtime config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
  /// See [`Transactions`]
  pub transactions: Transactions,
  /// See [`Dedup`]
  pub dedup: Dedup,
  /// See [`BlockWise`]
  pub block: BlockWise,
  /// See [`Csm`]
  pub csm: Csm,
  /// How often the embedding application should call `resend_timeouts`
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Config;
  ///
  /// assert_eq!(Config::default().sweep_interval, Milliseconds(1_000u64));
  /// ```
  #[cfg_attr(feature = "serde", serde(with = "crate::time::serde_millis"))]
  pub sweep_interval: Millis,
}

impl Default for Config {
  fn default() -> Self {
    Config { transactions: Transactions::default(),
             dedup: Dedup::default(),
             block: BlockWise::default(),
             csm: Csm::default(),
             sweep_interval: Milliseconds(1_000) }
  }
}

impl Config {
  /// Same config with datagram block-wise transfers of `size`
  ///
  /// ```
  /// use croak::config::Config;
  /// use croak_msg::BlockSize;
  ///
  /// let config = Config::default().with_block_size(BlockSize::S64);
  /// assert_eq!(config.block.size, Some(BlockSize::S64));
  /// ```
  pub fn with_block_size(self, size: BlockSize) -> Self {
    Self { block: BlockWise { size: Some(size),
                              ..self.block },
           ..self }
  }

  /// Longest a confirmable message can go unacknowledged before timing out
  pub fn max_transmit_wait_millis(&self) -> u64 {
    self.transactions
        .strategy
        .max_time(self.transactions.max_attempts)
        .0
  }
}

#[cfg(feature = "serde")]
mod serde_block_size {
  use croak_msg::BlockSize;
  use serde::{Deserialize, Deserializer, Serializer};

  pub(super) fn serialize<S: Serializer>(size: &Option<BlockSize>, s: S) -> Result<S::Ok, S::Error> {
    match size {
      | Some(size) => s.serialize_some(&size.szx()),
      | None => s.serialize_none(),
    }
  }

  pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<BlockSize>, D::Error> {
    Option::<u8>::deserialize(d).map(|szx| szx.and_then(BlockSize::from_szx))
  }
}
