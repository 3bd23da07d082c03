use embedded_time::duration::Milliseconds;
use embedded_time::rate::Fraction;

use crate::Error;

/// A duration, in milliseconds
pub type Millis = Milliseconds<u64>;

/// Supertrait of [`embedded_time::Clock`] pinning the
/// type of "ticks" to u64
pub trait Clock: embedded_time::Clock<T = u64> {}
impl<C: embedded_time::Clock<T = u64>> Clock for C {}

/// Milliseconds elapsed since the clock's epoch
///
/// ```
/// use croak::time::{now_millis, StdClock};
///
/// let clock = StdClock::new();
/// assert!(now_millis(&clock).unwrap() < 1000);
/// ```
pub fn now_millis<C: Clock>(clock: &C) -> Result<u64, Error> {
  let now = clock.try_now().map_err(|_| Error::Clock)?;
  Millis::try_from(now.duration_since_epoch()).map(|Milliseconds(ms)| ms)
                                               .map_err(|_| Error::Clock)
}

/// Implement [`embedded_time::Clock`] using [`std::time`] primitives
#[derive(Debug, Clone, Copy)]
pub struct StdClock(std::time::Instant);

impl Default for StdClock {
  fn default() -> Self {
    Self::new()
  }
}

impl StdClock {
  /// Create a new clock whose epoch is now
  pub fn new() -> Self {
    Self(std::time::Instant::now())
  }
}

impl embedded_time::Clock for StdClock {
  type T = u64;

  // microseconds
  const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

  fn try_now(&self) -> Result<embedded_time::Instant<Self>, embedded_time::clock::Error> {
    let elapsed = std::time::Instant::now().duration_since(self.0);
    Ok(embedded_time::Instant::new(elapsed.as_micros() as u64))
  }
}

/// `#[serde(with = "...")]` helper storing [`Millis`] as a plain integer
#[cfg(feature = "serde")]
pub(crate) mod serde_millis {
  use embedded_time::duration::Milliseconds;
  use serde::{Deserialize, Deserializer, Serializer};

  use super::Millis;

  pub(crate) fn serialize<S: Serializer>(Milliseconds(ms): &Millis, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(*ms)
  }

  pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Millis, D::Error> {
    u64::deserialize(d).map(Milliseconds)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test::ClockMock;

  #[test]
  fn mock_ticks_are_millis() {
    let clock = ClockMock::new();
    clock.set(1_500);
    assert_eq!(now_millis(&clock), Ok(1_500));

    clock.advance(500);
    assert_eq!(now_millis(&clock), Ok(2_000));
  }
}
