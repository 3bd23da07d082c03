use core::fmt;
use core::ops::RangeInclusive;

use embedded_time::duration::Milliseconds;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use toad_stem::Stem;

use crate::config::Transactions;
use crate::time::Millis;

/// A number of attempts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attempts(pub u16);

/// Strategy to employ when retransmitting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Strategy {
  /// Generate a random delay between `min` and `max`,
  /// and wait until this delay has passed before the second attempt.
  ///
  /// After each failed attempt, double the delay before retrying again.
  Exponential {
    /// Minimum (inclusive) delay for second attempt
    #[cfg_attr(feature = "serde", serde(with = "crate::time::serde_millis"))]
    init_min: Millis,
    /// Maximum (inclusive) delay for second attempt
    #[cfg_attr(feature = "serde", serde(with = "crate::time::serde_millis"))]
    init_max: Millis,
  },
  /// Generate a random delay between `min` and `max`,
  /// and wait until this delay has passed between attempts.
  Delay {
    /// Minimum (inclusive) delay for attempts
    #[cfg_attr(feature = "serde", serde(with = "crate::time::serde_millis"))]
    min: Millis,
    /// Maximum (inclusive) delay for attempts
    #[cfg_attr(feature = "serde", serde(with = "crate::time::serde_millis"))]
    max: Millis,
  },
}

impl Strategy {
  /// Are min & max delays the same? if so, we should probably skip the random number generation.
  pub fn has_jitter(&self) -> bool {
    let rng = self.range();
    rng.start() != rng.end()
  }

  /// Get the min & max durations as an inclusive range
  pub fn range(&self) -> RangeInclusive<u64> {
    match self {
      | &Self::Delay { min: Milliseconds(min),
                       max: Milliseconds(max), } => (min..=max),

      | &Self::Exponential { init_min: Milliseconds(min),
                             init_max: Milliseconds(max), } => (min..=max),
    }
  }

  /// Get the amount of time this strategy will take if all attempts fail
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::retry::{Attempts, Strategy};
  ///
  /// let exp = Strategy::Exponential { init_min: Milliseconds(100),
  ///                                   init_max: Milliseconds(200) };
  /// // 200 + 400 + 800
  /// assert_eq!(exp.max_time(Attempts(3)), Milliseconds(1_400u64));
  /// ```
  pub fn max_time(&self, max_attempts: Attempts) -> Millis {
    Milliseconds(match self {
                   | Self::Exponential { init_max, .. } => {
                     (1..=max_attempts.0).map(|n| Self::total_delay_exp(*init_max, n))
                                         .sum()
                   },
                   | Self::Delay { max: Milliseconds(max),
                                   .. } => max * max_attempts.0 as u64,
                 })
  }

  /// How long to wait after the `attempt`th send, given the initial delay
  pub fn delay(&self, init: Millis, attempt: Attempts) -> Millis {
    match self {
      | Self::Exponential { .. } => Milliseconds(Self::total_delay_exp(init, attempt.0)),
      | Self::Delay { .. } => init,
    }
  }

  /// Given the initial delay and number of attempts that have been performed,
  /// yields the delay until the next retry should be attempted.
  const fn total_delay_exp(Milliseconds(init): Milliseconds<u64>, attempt: u16) -> u64 {
    // | attempt | delay            |
    // | 1       | init             |
    // | 2       | init * 2         |
    // | 3       | init * 4         |
    // | n       | init * 2^(n-1)   |
    init * 2u64.pow(attempt.saturating_sub(1) as u32)
  }
}

/// Decides how long to wait for an acknowledgement after each transmission
/// of a confirmable message.
///
/// `attempt` is 1 for the first transmission. `None` means the
/// transaction is exhausted and must fail with [`Error::Timeout`](crate::Error::Timeout).
pub trait TransmissionTimeout: fmt::Debug + Send + Sync {
  /// Timeout after the `attempt`th transmission to a unicast address
  fn timeout(&self, attempt: Attempts) -> Option<Millis>;

  /// Timeout after the `attempt`th transmission to a multicast address
  fn multicast_timeout(&self, attempt: Attempts) -> Option<Millis>;
}

/// [`TransmissionTimeout`] driven by a pair of [`Strategy`]s.
///
/// Jitter is drawn from a [`ChaCha8Rng`] for every call, so two
/// transactions started at the same instant do not retransmit in lockstep.
///
/// ```
/// use embedded_time::duration::Milliseconds;
/// use croak::config::Transactions;
/// use croak::retry::{Attempts, StrategyTimeout, TransmissionTimeout};
///
/// let timeout = StrategyTimeout::new(&Transactions::default(), 0);
///
/// let first = timeout.timeout(Attempts(1)).unwrap();
/// assert!(first >= Milliseconds(2_000u64) && first <= Milliseconds(3_000u64));
/// assert_eq!(timeout.timeout(Attempts(6)), None);
/// ```
#[derive(Debug)]
pub struct StrategyTimeout {
  strategy: Strategy,
  max_attempts: Attempts,
  multicast_strategy: Strategy,
  multicast_max_attempts: Attempts,
  rand: Stem<ChaCha8Rng>,
}

impl StrategyTimeout {
  /// Build from the transaction config, seeding the jitter generator with `seed`
  pub fn new(config: &Transactions, seed: u64) -> Self {
    Self { strategy: config.strategy,
           max_attempts: config.max_attempts,
           multicast_strategy: config.multicast_strategy,
           multicast_max_attempts: config.multicast_max_attempts,
           rand: Stem::new(ChaCha8Rng::seed_from_u64(seed)) }
  }

  fn next(&self, strategy: Strategy, max: Attempts, attempt: Attempts) -> Option<Millis> {
    if attempt.0 == 0 || attempt > max {
      return None;
    }

    let init = if strategy.has_jitter() {
      let range = strategy.range();
      Milliseconds(self.rand.map_mut(|r| r.gen_range(range.clone())))
    } else {
      Milliseconds(*strategy.range().start())
    };

    Some(strategy.delay(init, attempt))
  }
}

impl TransmissionTimeout for StrategyTimeout {
  fn timeout(&self, attempt: Attempts) -> Option<Millis> {
    self.next(self.strategy, self.max_attempts, attempt)
  }

  fn multicast_timeout(&self, attempt: Attempts) -> Option<Millis> {
    self.next(self.multicast_strategy, self.multicast_max_attempts, attempt)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn fixed(strategy: Strategy, max_attempts: u16) -> StrategyTimeout {
    let config = Transactions { strategy,
                                max_attempts: Attempts(max_attempts),
                                ..Transactions::default() };
    StrategyTimeout::new(&config, 1234)
  }

  #[test]
  fn exp_calculation() {
    let init = Milliseconds(100);
    assert_eq!(Strategy::total_delay_exp(init, 1), 100);
    assert_eq!(Strategy::total_delay_exp(init, 2), 200);
    assert_eq!(Strategy::total_delay_exp(init, 3), 400);
  }

  #[test]
  fn exponential_doubles_until_exhausted() {
    let t = fixed(Strategy::Exponential { init_min: Milliseconds(1000),
                                          init_max: Milliseconds(1000) },
                  4);

    let delays = (1..=5).map(|n| t.timeout(Attempts(n)))
                        .collect::<Vec<_>>();

    assert_eq!(delays,
               vec![Some(Milliseconds(1000)),
                    Some(Milliseconds(2000)),
                    Some(Milliseconds(4000)),
                    Some(Milliseconds(8000)),
                    None]);
  }

  #[test]
  fn delay_is_flat() {
    let t = fixed(Strategy::Delay { min: Milliseconds(500),
                                    max: Milliseconds(500) },
                  3);

    assert_eq!(t.timeout(Attempts(1)), Some(Milliseconds(500)));
    assert_eq!(t.timeout(Attempts(3)), Some(Milliseconds(500)));
    assert_eq!(t.timeout(Attempts(4)), None);
  }

  #[test]
  fn jitter_stays_in_range() {
    let t = fixed(Strategy::Delay { min: Milliseconds(10),
                                    max: Milliseconds(20) },
                  u16::MAX);

    for n in 1..200 {
      let Milliseconds(ms) = t.timeout(Attempts(n)).unwrap();
      assert!((10..=20).contains(&ms), "{}", ms);
    }
  }

  #[test]
  fn multicast_uses_its_own_schedule() {
    let t = StrategyTimeout::new(&Transactions::default(), 0);
    assert_eq!(t.multicast_timeout(Attempts(1)), Some(Milliseconds(5000)));
    assert_eq!(t.multicast_timeout(Attempts(2)), None);
  }
}
