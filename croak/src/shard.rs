use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use toad_stem::Stem;

const SHARDS: usize = 16;

/// A map split over independently locked [`Stem`]s, so that work on
/// one key (usually a peer address) never waits on unrelated keys.
///
/// Closures passed to the methods here run while their shard is held;
/// they must not call back into the same map.
#[derive(Debug)]
pub(crate) struct Sharded<K, V> {
  shards: Vec<Stem<HashMap<K, V>>>,
}

impl<K, V> Default for Sharded<K, V> {
  fn default() -> Self {
    Self { shards: (0..SHARDS).map(|_| Stem::new(HashMap::new())).collect() }
  }
}

/// Run a `FnOnce` through [`Stem::map_mut`], which accepts `FnMut`
fn map_mut_once<T, R>(stem: &Stem<T>, f: impl FnOnce(&mut T) -> R) -> R {
  let mut f = Some(f);
  stem.map_mut(|t| match Option::take(&mut f) {
        | Some(f) => f(t),
        | None => unreachable!("Stem::map_mut invokes its closure once"),
      })
}

impl<K, V> Sharded<K, V> where K: Hash + Eq
{
  fn shard(&self, k: &K) -> &Stem<HashMap<K, V>> {
    let mut h = DefaultHasher::new();
    k.hash(&mut h);
    &self.shards[h.finish() as usize % SHARDS]
  }

  /// Read-compute-replace the value at `k`.
  ///
  /// `f` receives the current value (if any) by value and
  /// yields the replacement (`None` removes the key) plus a result.
  pub(crate) fn update<R>(&self, k: K, f: impl FnOnce(Option<V>) -> (Option<V>, R)) -> R {
    map_mut_once(self.shard(&k), move |map| {
      let (next, r) = f(map.remove(&k));
      if let Some(v) = next {
        map.insert(k, v);
      }
      r
    })
  }

  /// Borrow the value at `k`
  pub(crate) fn get<R>(&self, k: &K, mut f: impl FnMut(Option<&V>) -> R) -> R {
    self.shard(k).map_ref(|map| f(map.get(k)))
  }

  pub(crate) fn insert(&self, k: K, v: V) -> Option<V> {
    self.update(k, |prev| (Some(v), prev))
  }

  pub(crate) fn remove(&self, k: &K) -> Option<V> {
    self.shard(k).map_mut(|map| map.remove(k))
  }

  /// Visit every shard in turn, mutably
  pub(crate) fn for_each_shard(&self, mut f: impl FnMut(&mut HashMap<K, V>)) {
    self.shards.iter().for_each(|s| s.map_mut(|map| f(map)));
  }

  /// Remove and yield every entry matching `pred`.
  ///
  /// `pred` is invoked exactly once per entry.
  pub(crate) fn drain_where(&self, mut pred: impl FnMut(&K, &V) -> bool) -> Vec<(K, V)> {
    let mut out = Vec::new();
    self.for_each_shard(|map| {
          if map.is_empty() {
            return;
          }

          let (taken, kept): (Vec<_>, Vec<_>) = map.drain().partition(|(k, v)| pred(k, v));
          map.extend(kept);
          out.extend(taken);
        });
    out
  }

  pub(crate) fn len(&self) -> usize {
    self.shards.iter().map(|s| s.map_ref(|map| map.len())).sum()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn update_replaces_and_removes() {
    let map = Sharded::<u8, u32>::default();

    let prev = map.update(1, |v| (Some(v.unwrap_or(0) + 10), v));
    assert_eq!(prev, None);
    assert_eq!(map.get(&1, |v| v.copied()), Some(10));

    map.update(1, |_| (None, ()));
    assert_eq!(map.len(), 0);
  }

  #[test]
  fn drain_where_spans_shards() {
    let map = Sharded::<u32, u32>::default();
    (0..100).for_each(|n| {
              map.insert(n, n);
            });

    let mut odd = map.drain_where(|k, _| k % 2 == 1)
                     .into_iter()
                     .map(|(k, _)| k)
                     .collect::<Vec<_>>();
    odd.sort();

    assert_eq!(odd, (0..100).filter(|n| n % 2 == 1).collect::<Vec<_>>());
    assert_eq!(map.len(), 50);
  }
}
