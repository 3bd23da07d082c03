//! Outbound exchanges and their lifecycle
//!
//! A [`Transaction`] is queued per destination address, becomes
//! *active* when it reaches the head of its queue (it is sent and
//! retransmitted until acknowledged), and is then either completed or,
//! when the peer acknowledges with an empty ACK, moved to the
//! *delayed* set where it waits for a separate response matched by token.

use core::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use croak_msg::{Id, Message, Token, Type};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::block::outbound::Transfer;
use crate::messaging::{Callback, Outcome};
use crate::net::Addrd;
use crate::retry::Attempts;

mod manager;
mod queue;

pub(crate) use manager::TransactionManager;

/// Order in which queued requests to the same address are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Priority {
  /// Sent before everything else (block-wise continuations use this)
  High,
  /// The default
  Normal,
  /// Sent after everything else
  Low,
}

impl Default for Priority {
  fn default() -> Self {
    Self::Normal
  }
}

/// How responses are matched to a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionId {
  /// Confirmable message awaiting its ACK, matched by message id
  Mid(Id, SocketAddr),
  /// Request awaiting a response, matched by token
  Token(Token, SocketAddr),
}

impl TransactionId {
  /// Identify a message about to be sent.
  ///
  /// Confirmable datagrams are matched by message id until
  /// acknowledged, everything else by token.
  pub fn of(msg: Addrd<&Message>, stream: bool) -> Self {
    match (stream, msg.data().ty) {
      | (false, Type::Con) => Self::Mid(msg.data().id, msg.addr()),
      | _ => Self::Token(msg.data().token, msg.addr()),
    }
  }

  /// The peer address
  pub fn addr(&self) -> SocketAddr {
    match self {
      | Self::Mid(_, a) | Self::Token(_, a) => *a,
    }
  }
}

/// An outbound message and the state needed to see it through
pub(crate) struct Transaction {
  pub(crate) id: TransactionId,
  /// The message on the wire (for block-wise transfers, the current block)
  pub(crate) msg: Addrd<Message>,
  pub(crate) priority: Priority,
  pub(crate) attempts: Attempts,
  /// When the next retransmission (or expiry) is due. `Some` iff active.
  pub(crate) timeout_at: Option<u64>,
  /// Present for requests; drives block-wise continuation
  pub(crate) transfer: Option<Transfer>,
  callback: Callback,
}

impl fmt::Debug for Transaction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Transaction")
     .field("id", &self.id)
     .field("msg", &self.msg)
     .field("priority", &self.priority)
     .field("attempts", &self.attempts)
     .field("timeout_at", &self.timeout_at)
     .field("transfer", &self.transfer)
     .finish()
  }
}

impl Transaction {
  pub(crate) fn new(id: TransactionId,
                    msg: Addrd<Message>,
                    priority: Priority,
                    transfer: Option<Transfer>,
                    callback: Callback)
                    -> Self {
    Self { id,
           msg,
           priority,
           attempts: Attempts(0),
           timeout_at: None,
           transfer,
           callback }
  }

  pub(crate) fn is_active(&self) -> bool {
    self.timeout_at.is_some()
  }

  pub(crate) fn is_multicast(&self) -> bool {
    self.msg.addr().ip().is_multicast()
  }

  pub(crate) fn token(&self) -> Token {
    self.msg.data().token
  }

  /// Does this transaction wait for a response, rather than just an ACK?
  pub(crate) fn expects_response(&self) -> bool {
    self.transfer.is_some()
  }

  /// Match by token from now on
  pub(crate) fn into_delayed(self) -> Self {
    Self { id: TransactionId::Token(self.token(), self.msg.addr()),
           ..self }
  }

  /// Replace the message on the wire (the next block of a transfer),
  /// resetting retransmission state
  pub(crate) fn continue_with(self, msg: Message, transfer: Transfer, stream: bool) -> Self {
    let msg = Addrd(msg, self.msg.addr());
    Self { id: TransactionId::of(msg.as_ref(), stream),
           msg,
           priority: Priority::High,
           attempts: Attempts(0),
           timeout_at: None,
           transfer: Some(transfer),
           ..self }
  }

  /// Deliver the outcome, consuming the transaction
  pub(crate) fn complete(self, outcome: Outcome) {
    (self.callback)(outcome)
  }
}

/// Hands out message ids, starting from a random one and wrapping at 65535
#[derive(Debug)]
pub struct IdSupplier(AtomicU16);

impl IdSupplier {
  /// Start from a random id drawn from `seed`
  pub fn new(seed: u64) -> Self {
    Self(AtomicU16::new(ChaCha8Rng::seed_from_u64(seed).gen()))
  }

  /// The next message id
  pub fn next(&self) -> Id {
    Id(self.0.fetch_add(1, Ordering::Relaxed))
  }
}

/// Hands out opaque 8-byte tokens
#[derive(Debug)]
pub struct TokenSupplier {
  seed: u64,
  count: AtomicU64,
}

impl TokenSupplier {
  /// Tokens depend on `seed` and a counter, so two suppliers
  /// seeded differently do not collide
  pub fn new(seed: u64) -> Self {
    Self { seed,
           count: AtomicU64::new(0) }
  }

  /// The next token
  pub fn next(&self) -> Token {
    let n = self.count.fetch_add(1, Ordering::Relaxed);
    let bytes = {
      let (a, b) = (self.seed.to_be_bytes(), n.to_be_bytes());
      let mut bytes = [0u8; 16];
      bytes[..8].copy_from_slice(&a);
      bytes[8..].copy_from_slice(&b);
      bytes
    };

    Token::opaque(&bytes)
  }
}
