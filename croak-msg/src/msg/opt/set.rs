use std::collections::BTreeMap;

use super::known::no_repeat::*;
use super::known::repeat::*;
use super::known::{Block, ContentFormat};
use super::{Opt, OptDelta, OptNumber, OptValue};

/// Max-Age assumed when a message carries no Max-Age option
pub const DEFAULT_MAX_AGE: u32 = 60;

/// Every option in a message, keyed by absolute option number.
///
/// Values of repeatable options are kept in the order they were
/// inserted (or read off the wire). Options this library does not
/// know about are kept as-is and written back out.
///
/// Construction is by value; every `with_*`, [`OptionSet::insert`],
/// [`OptionSet::set`] and [`OptionSet::remove`] call consumes the set
/// and yields a new one.
///
/// ```
/// use croak_msg::{ContentFormat, OptionSet};
///
/// let opts = OptionSet::new().with_path("sensors/temp")
///                            .with_query("unit=c&precise")
///                            .with_content_format(ContentFormat::JSON);
///
/// assert_eq!(opts.path(), "sensors/temp");
/// assert_eq!(opts.path_segments(), vec!["sensors", "temp"]);
/// assert_eq!(opts.query().as_deref(), Some("unit=c&precise"));
/// assert_eq!(opts.content_format(), Some(ContentFormat::JSON));
/// assert_eq!(opts.max_age(), 60);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OptionSet(BTreeMap<OptNumber, Vec<OptValue>>);

impl From<BTreeMap<OptNumber, Vec<OptValue>>> for OptionSet {
  fn from(map: BTreeMap<OptNumber, Vec<OptValue>>) -> Self {
    Self(map.into_iter().filter(|(_, vs)| !vs.is_empty()).collect())
  }
}

impl From<OptionSet> for BTreeMap<OptNumber, Vec<OptValue>> {
  fn from(set: OptionSet) -> Self {
    set.0
  }
}

impl FromIterator<(OptNumber, OptValue)> for OptionSet {
  fn from_iter<I: IntoIterator<Item = (OptNumber, OptValue)>>(iter: I) -> Self {
    iter.into_iter()
        .fold(Self::new(), |set, (n, v)| set.insert(n, v))
  }
}

impl OptionSet {
  /// An empty set
  pub fn new() -> Self {
    Self::default()
  }

  /// All values of an option, `None` if it is absent
  pub fn get(&self, n: OptNumber) -> Option<&[OptValue]> {
    self.0.get(&n).map(|vs| vs.as_slice())
  }

  /// The first value of an option
  pub fn first(&self, n: OptNumber) -> Option<&OptValue> {
    self.0.get(&n).and_then(|vs| vs.first())
  }

  /// Is the option present at all?
  pub fn contains(&self, n: OptNumber) -> bool {
    self.0.contains_key(&n)
  }

  /// Number of distinct option numbers
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// `true` if there are no options
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Option numbers and their values, ascending by number
  pub fn iter(&self) -> impl Iterator<Item = (&OptNumber, &Vec<OptValue>)> {
    self.0.iter()
  }

  /// Append a value to an option
  pub fn insert(mut self, n: OptNumber, v: impl Into<OptValue>) -> Self {
    self.0.entry(n).or_default().push(v.into());
    self
  }

  /// Replace all values of an option with a single value
  pub fn set(mut self, n: OptNumber, v: impl Into<OptValue>) -> Self {
    self.0.insert(n, vec![v.into()]);
    self
  }

  /// Replace all values of an option
  pub fn set_all<V: Into<OptValue>>(mut self, n: OptNumber, vs: impl IntoIterator<Item = V>) -> Self {
    let vs = vs.into_iter().map(Into::into).collect::<Vec<_>>();
    if vs.is_empty() {
      self.0.remove(&n);
    } else {
      self.0.insert(n, vs);
    }
    self
  }

  /// Remove every value of an option
  pub fn remove(mut self, n: OptNumber) -> Self {
    self.0.remove(&n);
    self
  }

  /// The options in wire order, with each option's delta from the previous one
  pub fn opts(&self) -> impl Iterator<Item = Opt> + '_ {
    let mut prev = 0u32;
    self.0
        .iter()
        .flat_map(|(n, vs)| vs.iter().map(move |v| (*n, v)))
        .map(move |(n, v)| {
          let delta = OptDelta(n.0 - prev);
          prev = n.0;
          Opt { delta,
                value: v.clone() }
        })
  }

  /// Number of bytes the options occupy on the wire
  pub fn wire_size(&self) -> usize {
    self.opts().map(|o| o.wire_size()).sum()
  }

  fn uint(&self, n: OptNumber) -> Option<u32> {
    self.first(n).and_then(OptValue::as_uint)
  }

  fn str(&self, n: OptNumber) -> Option<&str> {
    self.first(n).and_then(OptValue::as_str)
  }

  fn strs(&self, n: OptNumber) -> Vec<&str> {
    self.get(n)
        .unwrap_or_default()
        .iter()
        .filter_map(OptValue::as_str)
        .collect()
  }

  fn joined(&self, n: OptNumber, sep: &str) -> Option<String> {
    self.get(n).map(|_| self.strs(n).join(sep))
  }

  fn split(self, n: OptNumber, s: &str, sep: char) -> Self {
    self.set_all(n,
                 s.split(sep)
                  .filter(|seg| !seg.is_empty())
                  .map(OptValue::from))
  }

  /// If-Match values; an empty value matches any representation
  pub fn if_match(&self) -> Vec<&[u8]> {
    self.get(IF_MATCH)
        .unwrap_or_default()
        .iter()
        .map(OptValue::as_bytes)
        .collect()
  }

  /// Add an If-Match value
  pub fn with_if_match(self, etag: &[u8]) -> Self {
    self.insert(IF_MATCH, etag)
  }

  /// Uri-Host, `""` when absent
  pub fn host(&self) -> &str {
    self.str(HOST).unwrap_or("")
  }

  /// Set Uri-Host; the empty host is the default and is not written
  pub fn with_host(self, host: &str) -> Self {
    match host {
      | "" => self.remove(HOST),
      | h => self.set(HOST, h),
    }
  }

  /// The first ETag
  pub fn etag(&self) -> Option<&[u8]> {
    self.first(ETAG).map(OptValue::as_bytes)
  }

  /// Every ETag (requests may carry several)
  pub fn etags(&self) -> Vec<&[u8]> {
    self.get(ETAG)
        .unwrap_or_default()
        .iter()
        .map(OptValue::as_bytes)
        .collect()
  }

  /// Add an ETag
  pub fn with_etag(self, etag: &[u8]) -> Self {
    self.insert(ETAG, etag)
  }

  /// Is If-None-Match present?
  pub fn if_none_match(&self) -> bool {
    self.contains(IF_NONE_MATCH)
  }

  /// Set or clear If-None-Match
  pub fn with_if_none_match(self, present: bool) -> Self {
    match present {
      | true => self.set(IF_NONE_MATCH, OptValue::default()),
      | false => self.remove(IF_NONE_MATCH),
    }
  }

  /// Observe registration or notification sequence number
  pub fn observe(&self) -> Option<u32> {
    self.uint(OBSERVE)
  }

  /// Set Observe
  pub fn with_observe(self, n: u32) -> Self {
    self.set(OBSERVE, OptValue::uint(n))
  }

  /// Uri-Port
  pub fn port(&self) -> Option<u16> {
    self.uint(PORT).and_then(|p| u16::try_from(p).ok())
  }

  /// Set Uri-Port
  pub fn with_port(self, port: u16) -> Self {
    self.set(PORT, OptValue::uint(port as u32))
  }

  /// Location-Path segments joined with `/`
  pub fn location_path(&self) -> Option<String> {
    self.joined(LOCATION_PATH, "/")
  }

  /// Set Location-Path from a `/`-separated path
  pub fn with_location_path(self, path: &str) -> Self {
    self.split(LOCATION_PATH, path, '/')
  }

  /// Uri-Path segments joined with `/`, `"/"` when absent
  pub fn path(&self) -> String {
    self.joined(PATH, "/").unwrap_or_else(|| "/".into())
  }

  /// Uri-Path segments
  pub fn path_segments(&self) -> Vec<&str> {
    self.strs(PATH)
  }

  /// Set Uri-Path from a `/`-separated path.
  ///
  /// Empty segments are dropped, so `"/"` writes no option at all.
  pub fn with_path(self, path: &str) -> Self {
    self.split(PATH, path, '/')
  }

  /// Content-Format
  pub fn content_format(&self) -> Option<ContentFormat> {
    self.uint(CONTENT_FORMAT)
        .and_then(|n| u16::try_from(n).ok())
        .map(ContentFormat)
  }

  /// Set Content-Format
  pub fn with_content_format(self, f: ContentFormat) -> Self {
    self.set(CONTENT_FORMAT, OptValue::uint(f.0 as u32))
  }

  /// Max-Age in seconds, [`DEFAULT_MAX_AGE`] when absent
  pub fn max_age(&self) -> u32 {
    self.uint(MAX_AGE).unwrap_or(DEFAULT_MAX_AGE)
  }

  /// Set Max-Age; the default is not written
  pub fn with_max_age(self, seconds: u32) -> Self {
    match seconds {
      | DEFAULT_MAX_AGE => self.remove(MAX_AGE),
      | n => self.set(MAX_AGE, OptValue::uint(n)),
    }
  }

  /// Uri-Query arguments joined with `&`
  pub fn query(&self) -> Option<String> {
    self.joined(QUERY, "&")
  }

  /// Uri-Query arguments
  pub fn query_params(&self) -> Vec<&str> {
    self.strs(QUERY)
  }

  /// Set Uri-Query from a `&`-separated string
  pub fn with_query(self, query: &str) -> Self {
    self.split(QUERY, query, '&')
  }

  /// Accept
  pub fn accept(&self) -> Option<ContentFormat> {
    self.uint(ACCEPT)
        .and_then(|n| u16::try_from(n).ok())
        .map(ContentFormat)
  }

  /// Set Accept
  pub fn with_accept(self, f: ContentFormat) -> Self {
    self.set(ACCEPT, OptValue::uint(f.0 as u32))
  }

  /// Location-Query arguments joined with `&`
  pub fn location_query(&self) -> Option<String> {
    self.joined(LOCATION_QUERY, "&")
  }

  /// Set Location-Query from a `&`-separated string
  pub fn with_location_query(self, query: &str) -> Self {
    self.split(LOCATION_QUERY, query, '&')
  }

  /// Block2
  pub fn block2(&self) -> Option<Block> {
    self.uint(BLOCK2).map(Block::from_value)
  }

  /// Set Block2
  pub fn with_block2(self, b: Block) -> Self {
    self.set(BLOCK2, OptValue::uint(b.value()))
  }

  /// Block1
  pub fn block1(&self) -> Option<Block> {
    self.uint(BLOCK1).map(Block::from_value)
  }

  /// Set Block1
  pub fn with_block1(self, b: Block) -> Self {
    self.set(BLOCK1, OptValue::uint(b.value()))
  }

  /// Size2
  pub fn size2(&self) -> Option<u32> {
    self.uint(SIZE2)
  }

  /// Set Size2
  pub fn with_size2(self, n: u32) -> Self {
    self.set(SIZE2, OptValue::uint(n))
  }

  /// Size1
  pub fn size1(&self) -> Option<u32> {
    self.uint(SIZE1)
  }

  /// Set Size1
  pub fn with_size1(self, n: u32) -> Self {
    self.set(SIZE1, OptValue::uint(n))
  }

  /// Proxy-Uri
  pub fn proxy_uri(&self) -> Option<&str> {
    self.str(PROXY_URI)
  }

  /// Set Proxy-Uri
  pub fn with_proxy_uri(self, uri: &str) -> Self {
    self.set(PROXY_URI, uri)
  }

  /// Proxy-Scheme
  pub fn proxy_scheme(&self) -> Option<&str> {
    self.str(PROXY_SCHEME)
  }

  /// Set Proxy-Scheme
  pub fn with_proxy_scheme(self, scheme: &str) -> Self {
    self.set(PROXY_SCHEME, scheme)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::BlockSize;

  #[test]
  fn defaults_are_elided_and_synthesized() {
    let opts = OptionSet::new().with_max_age(60).with_host("").with_path("/");
    assert!(opts.is_empty());
    assert_eq!(opts.max_age(), 60);
    assert_eq!(opts.host(), "");
    assert_eq!(opts.path(), "/");

    let opts = opts.with_max_age(10).with_host("coap.me");
    assert_eq!(opts.len(), 2);
    assert_eq!(opts.max_age(), 10);
    assert_eq!(opts.host(), "coap.me");
  }

  #[test]
  fn repeated_options_keep_order() {
    let opts = OptionSet::new().with_etag(b"b").with_etag(b"a");
    assert_eq!(opts.etags(), vec![&b"b"[..], &b"a"[..]]);
    assert_eq!(opts.etag(), Some(&b"b"[..]));

    let opts = OptionSet::new().with_location_path("/a//b/").with_location_query("x=1&y");
    assert_eq!(opts.location_path().as_deref(), Some("a/b"));
    assert_eq!(opts.location_query().as_deref(), Some("x=1&y"));
  }

  #[test]
  fn wire_order_and_deltas() {
    let opts = OptionSet::new().with_size1(300)
                               .with_path("a/b")
                               .with_host("h")
                               .insert(OptNumber(2048), &b"x"[..]);

    let numbers_and_deltas = opts.opts().map(|o| o.delta.0).collect::<Vec<_>>();
    assert_eq!(numbers_and_deltas, vec![3, 8, 0, 49, 1988]);
  }

  #[test]
  fn block_options() {
    let b = Block::new(4, BlockSize::S64, true);
    let opts = OptionSet::new().with_block1(b).with_block2(b.with_more(false));
    assert_eq!(opts.block1(), Some(b));
    assert_eq!(opts.block2(), Some(b.with_more(false)));
    assert_eq!(opts.remove(BLOCK1).block1(), None);
  }

  #[test]
  fn unknown_options_retained() {
    let opts = OptionSet::new().insert(OptNumber(65000), &b"v"[..]);
    assert_eq!(opts.get(OptNumber(65000)), Some(&[OptValue(b"v".to_vec())][..]));
  }

  #[test]
  fn if_none_match_and_observe() {
    let opts = OptionSet::new().with_if_none_match(true).with_observe(0);
    assert!(opts.if_none_match());
    assert_eq!(opts.first(OBSERVE), Some(&OptValue(vec![])));
    assert_eq!(opts.observe(), Some(0));
    assert!(!opts.with_if_none_match(false).if_none_match());
  }
}
