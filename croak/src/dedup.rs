use croak_msg::{Id, Message};

use crate::config::Dedup;
use crate::net::Addrd;
use crate::shard::Sharded;

#[derive(Debug, Clone)]
struct Entry {
  seen_at: u64,
  /// `None` while the request is still being processed
  response: Option<Message>,
}

/// Result of [`DuplicateDetector::check`]
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
  /// First time this (message id, address) pair was seen; it is now
  /// recorded as "processing"
  New,
  /// A retransmission. Carries the cached response to replay, or
  /// `None` if the original is still being processed.
  Duplicate(Option<Message>),
}

/// Remembers recently received (message id, address) pairs and
/// the responses sent for them, so that retransmitted confirmable
/// and non-confirmable messages are not processed twice.
///
/// Entries expire after [`Dedup::timeout`]; the embedding application
/// calls [`DuplicateDetector::clean`] every [`Dedup::clean_interval`].
/// When the detector grows more than 1% beyond [`Dedup::max_size`],
/// the oldest entries are evicted.
#[derive(Debug)]
pub struct DuplicateDetector {
  config: Dedup,
  entries: Sharded<Addrd<Id>, Entry>,
}

impl DuplicateDetector {
  /// Create an empty detector
  pub fn new(config: Dedup) -> Self {
    Self { config,
           entries: Sharded::default() }
  }

  fn expired(&self, entry: &Entry, now: u64) -> bool {
    now.saturating_sub(entry.seen_at) >= self.config.timeout.0
  }

  /// Look up `key`, recording it as being processed if it is new
  ///
  /// ```
  /// use croak::config::Dedup;
  /// use croak::dedup::{DuplicateDetector, Seen};
  /// use croak::net::Addrd;
  /// use croak_msg::Id;
  ///
  /// let dedup = DuplicateDetector::new(Dedup::default());
  /// let key = Addrd(Id(1), "127.0.0.1:5683".parse().unwrap());
  ///
  /// assert_eq!(dedup.check(key, 0), Seen::New);
  /// assert_eq!(dedup.check(key, 10), Seen::Duplicate(None));
  /// ```
  pub fn check(&self, key: Addrd<Id>, now: u64) -> Seen {
    let seen = self.entries.update(key, |prev| match prev {
                             | Some(e) if !self.expired(&e, now) => {
                               let seen = Seen::Duplicate(e.response.clone());
                               (Some(e), seen)
                             },
                             | _ => (Some(Entry { seen_at: now,
                                                  response: None }),
                                     Seen::New),
                           });

    if seen == Seen::New {
      self.trim();
    }

    seen
  }

  /// Record the response sent for `key`, to be replayed when it is retransmitted
  pub fn put_response(&self, key: Addrd<Id>, response: Message, now: u64) {
    self.entries.update(key, |prev| {
                  let seen_at = prev.map(|e| e.seen_at).unwrap_or(now);
                  (Some(Entry { seen_at,
                                response: Some(response) }),
                   ())
                });
  }

  /// Remove expired entries, yielding how many were removed
  pub fn clean(&self, now: u64) -> usize {
    let removed = self.entries.drain_where(|_, e| self.expired(e, now)).len();
    if removed > 0 {
      log::debug!("removed {} expired message ids, {} remain", removed, self.len());
    }
    removed
  }

  /// Evict the oldest entries once we are 1% over capacity
  fn trim(&self) {
    let max = self.config.max_size;
    if self.entries.len() <= max + max / 100 {
      return;
    }

    // entries may have been cleaned since the length was read
    let mut stamps = Vec::new();
    self.entries
        .for_each_shard(|map| stamps.extend(map.values().map(|e| e.seen_at)));
    let len = stamps.len();
    if len <= max + max / 100 {
      return;
    }
    stamps.sort_unstable();

    let evict = len - max;
    let cutoff = stamps[evict - 1];

    let mut budget = evict;
    let evicted = self.entries
                      .drain_where(|_, e| {
                        if budget > 0 && e.seen_at <= cutoff {
                          budget -= 1;
                          true
                        } else {
                          false
                        }
                      })
                      .len();

    log::warn!("duplicate detector over capacity ({} > {}), evicted {} oldest entries",
               len,
               max,
               evicted);
  }

  /// Forget everything
  pub fn clear(&self) {
    self.entries.for_each_shard(|map| map.clear());
  }

  /// Number of remembered message ids
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Is nothing remembered?
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use croak_msg::{code, Token, Type};
  use embedded_time::duration::Milliseconds;

  use super::*;
  use crate::test::addr;

  fn config(max_size: usize) -> Dedup {
    Dedup { timeout: Milliseconds(1_000),
            clean_interval: Milliseconds(100),
            max_size }
  }

  #[test]
  fn replays_cached_response() {
    let dedup = DuplicateDetector::new(config(10));
    let key = Addrd(Id(7), addr(1));
    let resp = Message::new(Type::Ack, code::CONTENT, Id(7), Token::default());

    assert_eq!(dedup.check(key, 0), Seen::New);
    dedup.put_response(key, resp.clone(), 5);
    assert_eq!(dedup.check(key, 10), Seen::Duplicate(Some(resp)));

    // same id from a different peer is unrelated
    assert_eq!(dedup.check(Addrd(Id(7), addr(2)), 10), Seen::New);
  }

  #[test]
  fn entries_expire() {
    let dedup = DuplicateDetector::new(config(10));
    let key = Addrd(Id(1), addr(1));

    assert_eq!(dedup.check(key, 0), Seen::New);
    assert_eq!(dedup.clean(999), 0);
    assert_eq!(dedup.clean(1_000), 1);
    assert!(dedup.is_empty());
    assert_eq!(dedup.check(key, 1_001), Seen::New);
  }

  #[test]
  fn expired_entry_is_new_before_clean() {
    let dedup = DuplicateDetector::new(config(10));
    let key = Addrd(Id(1), addr(1));

    assert_eq!(dedup.check(key, 0), Seen::New);
    assert_eq!(dedup.check(key, 5_000), Seen::New);
  }

  #[test]
  fn trims_oldest_over_capacity() {
    let dedup = DuplicateDetector::new(config(100));

    // 101 entries is within the 1% margin
    (0..101u16).for_each(|n| {
                 dedup.check(Addrd(Id(n), addr(1)), n as u64);
               });
    assert_eq!(dedup.len(), 101);

    dedup.check(Addrd(Id(101), addr(1)), 101);
    assert_eq!(dedup.len(), 100);

    // the two oldest are gone
    assert_eq!(dedup.check(Addrd(Id(1), addr(1)), 200), Seen::New);
    assert_eq!(dedup.check(Addrd(Id(101), addr(1)), 200),
               Seen::Duplicate(None));
  }

  #[test]
  fn trim_races_with_clean() {
    use std::sync::Arc;
    use std::thread;

    let dedup = Arc::new(DuplicateDetector::new(config(1)));

    let cleaner = {
      let dedup = dedup.clone();
      thread::spawn(move || {
        (0..5_000).for_each(|_| {
                    dedup.clean(u64::MAX);
                  })
      })
    };

    (0..5_000u16).for_each(|n| {
                   dedup.check(Addrd(Id(n), addr(1)), 0);
                 });

    cleaner.join().unwrap();
    assert!(dedup.len() <= 2);
  }
}
