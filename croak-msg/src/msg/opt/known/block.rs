use core::fmt;

/// Size of the blocks a block-wise transfer is split into.
///
/// On the wire this is the 3-bit `SZX` field of a Block option; sizes are
/// `2^(SZX + 4)` bytes. `SZX = 7` is reserved by RFC 7959 and used by
/// RFC 8323 for BERT, meaning "one or more 1024-byte blocks per message".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub enum BlockSize {
  S16,
  S32,
  S64,
  S128,
  S256,
  S512,
  S1024,
  /// Block-wise Extended Length; 1024 byte blocks, possibly several per message
  Bert,
}

impl BlockSize {
  /// The `SZX` field for this size
  pub const fn szx(&self) -> u8 {
    match self {
      | Self::S16 => 0,
      | Self::S32 => 1,
      | Self::S64 => 2,
      | Self::S128 => 3,
      | Self::S256 => 4,
      | Self::S512 => 5,
      | Self::S1024 => 6,
      | Self::Bert => 7,
    }
  }

  /// Get the size for an `SZX` field, `None` if `szx > 7`
  pub const fn from_szx(szx: u8) -> Option<Self> {
    match szx {
      | 0 => Some(Self::S16),
      | 1 => Some(Self::S32),
      | 2 => Some(Self::S64),
      | 3 => Some(Self::S128),
      | 4 => Some(Self::S256),
      | 5 => Some(Self::S512),
      | 6 => Some(Self::S1024),
      | 7 => Some(Self::Bert),
      | _ => None,
    }
  }

  /// Number of bytes in one block (1024 for BERT)
  pub const fn size(&self) -> usize {
    match self {
      | Self::Bert => 1024,
      | s => 1 << (s.szx() + 4),
    }
  }

  /// Is this [`BlockSize::Bert`]?
  pub const fn is_bert(&self) -> bool {
    matches!(self, Self::Bert)
  }

  /// The largest non-BERT size that is `<= max`, never smaller than 16.
  ///
  /// ```
  /// use croak_msg::BlockSize;
  ///
  /// assert_eq!(BlockSize::fit(65), BlockSize::S64);
  /// assert_eq!(BlockSize::fit(1), BlockSize::S16);
  /// assert_eq!(BlockSize::fit(1_000_000), BlockSize::S1024);
  /// ```
  pub fn fit(max: usize) -> Self {
    (0..=6u8).rev()
             .filter_map(Self::from_szx)
             .find(|s| s.size() <= max)
             .unwrap_or(Self::S16)
  }

  /// Number of blocks carried by a single message whose
  /// payload may be at most `max_payload` bytes long.
  ///
  /// Always 1 for non-BERT sizes.
  ///
  /// ```
  /// use croak_msg::BlockSize;
  ///
  /// assert_eq!(BlockSize::Bert.blocks_per_message(4096), 4);
  /// assert_eq!(BlockSize::Bert.blocks_per_message(4095), 3);
  /// assert_eq!(BlockSize::S512.blocks_per_message(4096), 1);
  /// ```
  pub fn blocks_per_message(&self, max_payload: usize) -> usize {
    match self {
      | Self::Bert => (max_payload / self.size()).max(1),
      | _ => 1,
    }
  }
}

/// Three items of information may need to be transferred in a
/// Block (Block1 or Block2) option:
/// * the size of the block ([`Block::size`])
/// * whether more blocks are following ([`Block::more`])
/// * the relative number of the block ([`Block::num`]) within a sequence of blocks with the given size.
///
/// ```
/// use croak_msg::{Block, BlockSize};
///
/// let b = Block::new(2, BlockSize::S32, false);
/// assert_eq!(b.value(), 33);
/// assert_eq!(Block::from_value(33), b);
/// assert_eq!(b.to_string(), "2|last|32");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block {
  num: u32,
  size: BlockSize,
  more: bool,
}

impl Block {
  /// Create a block option value
  pub const fn new(num: u32, size: BlockSize, more: bool) -> Self {
    Self { num, size, more }
  }

  /// Relative number of the block within the transfer
  pub const fn num(&self) -> u32 {
    self.num
  }

  /// Size of the blocks
  pub const fn size(&self) -> BlockSize {
    self.size
  }

  /// Are more blocks following this one?
  pub const fn more(&self) -> bool {
    self.more
  }

  /// Is this a BERT block?
  pub const fn is_bert(&self) -> bool {
    self.size.is_bert()
  }

  /// Copy of this block with a different `more` flag
  pub const fn with_more(self, more: bool) -> Self {
    Self { more, ..self }
  }

  /// The numeric option value, `num << 4 | more << 3 | szx`
  pub fn value(&self) -> u32 {
    (self.num << 4) | (u32::from(self.more) << 3) | self.size.szx() as u32
  }

  /// Parse an option value. Every 3-bit `SZX` is meaningful, so this cannot fail.
  pub fn from_value(n: u32) -> Self {
    Self { num: n >> 4,
           more: n & 0b1000 != 0,
           size: BlockSize::from_szx((n & 0b111) as u8).unwrap_or(BlockSize::Bert) }
  }

  /// Byte offset into the whole body where this block starts
  pub fn offset(&self) -> usize {
    self.num as usize * self.size.size()
  }

  /// Slice the part of `body` carried by this block.
  ///
  /// BERT blocks carry as many 1024-byte blocks as fit in `max_payload`.
  /// Yields an empty slice if the block starts past the end of `body`.
  ///
  /// ```
  /// use croak_msg::{Block, BlockSize};
  ///
  /// let body = [0u8; 100];
  /// assert_eq!(Block::new(1, BlockSize::S64, false).slice(&body, 64).len(), 36);
  /// assert_eq!(Block::new(2, BlockSize::S64, false).slice(&body, 64).len(), 0);
  /// ```
  pub fn slice<'a>(&self, body: &'a [u8], max_payload: usize) -> &'a [u8] {
    let start = self.offset();
    if start >= body.len() {
      return &[];
    }

    let len = self.size.size() * self.size.blocks_per_message(max_payload);
    let end = (start + len).min(body.len());
    &body[start..end]
  }

  /// The block that follows this one in a body of `body_len` bytes.
  ///
  /// `sent_blocks` is how many blocks the previous message actually carried;
  /// BERT transfers advance the block number by that count, others by 1.
  ///
  /// ```
  /// use croak_msg::{Block, BlockSize};
  ///
  /// let first = Block::new(0, BlockSize::S64, true);
  /// assert_eq!(first.next(300, 1, 64), Block::new(1, BlockSize::S64, true));
  /// assert_eq!(Block::new(3, BlockSize::S64, true).next(300, 1, 64),
  ///            Block::new(4, BlockSize::S64, false));
  ///
  /// let bert = Block::new(0, BlockSize::Bert, true);
  /// assert_eq!(bert.next(10_000, 4, 4096), Block::new(4, BlockSize::Bert, true));
  /// ```
  pub fn next(&self, body_len: usize, sent_blocks: usize, max_payload: usize) -> Self {
    let step = match self.is_bert() {
      | true => sent_blocks.max(1) as u32,
      | false => 1,
    };
    let num = self.num + step;
    let next = Self { num, ..*self };

    let left = body_len.saturating_sub(next.offset());
    let per_message = self.size.size() * self.size.blocks_per_message(max_payload);

    next.with_more(left > per_message)
  }

  /// An intermediate (more = true) block must carry exactly one
  /// block of payload, or a positive multiple of 1024 bytes for BERT.
  ///
  /// Always true for the last block.
  pub fn is_valid_intermediate(&self, payload_len: usize) -> bool {
    match (self.more, self.is_bert()) {
      | (false, _) => true,
      | (true, true) => payload_len > 0 && payload_len % self.size.size() == 0,
      | (true, false) => payload_len == self.size.size(),
    }
  }

  /// The last (more = false) block may be shorter than a block,
  /// BERT last blocks are only limited by the max message size.
  ///
  /// Always true for intermediate blocks.
  pub fn is_valid_last(&self, payload_len: usize) -> bool {
    match (self.more, self.is_bert()) {
      | (true, _) | (false, true) => true,
      | (false, false) => payload_len <= self.size.size(),
    }
  }
}

impl fmt::Display for Block {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let more = if self.more { "more" } else { "last" };
    match self.size {
      | BlockSize::Bert => write!(f, "{}|{}|BERT", self.num, more),
      | s => write!(f, "{}|{}|{}", self.num, more, s.size()),
    }
  }
}

/// Split `body` into the sequence of blocks a sender would transmit,
/// starting at block 0.
///
/// ```
/// use croak_msg::{split_blocks, BlockSize};
///
/// let body = vec![7u8; 300];
/// let blocks = split_blocks(&body, BlockSize::S64, 64);
/// assert_eq!(blocks.len(), 5);
/// assert!(blocks[..4].iter().all(|(b, _)| b.more()));
/// assert_eq!(blocks[4].1.len(), 44);
/// ```
pub fn split_blocks(body: &[u8], size: BlockSize, max_payload: usize) -> Vec<(Block, &[u8])> {
  let per_message = size.size() * size.blocks_per_message(max_payload);
  let mut block = Block::new(0, size, body.len() > per_message);
  let mut out = Vec::new();

  loop {
    let part = block.slice(body, max_payload);
    out.push((block, part));

    if !block.more() {
      break out;
    }

    block = block.next(body.len(), part.len() / size.size(), max_payload);
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn block_value() {
    let b = Block::from_value(33);
    assert_eq!(b.size(), BlockSize::S32);
    assert_eq!(b.num(), 2);
    assert!(!b.more());

    let b = Block::from_value(59);
    assert_eq!(b.size(), BlockSize::S128);
    assert_eq!(b.num(), 3);
    assert!(b.more());

    let b = Block::from_value(0b1_1111);
    assert_eq!(b.size(), BlockSize::Bert);
    assert_eq!(b.num(), 1);
    assert!(b.more());
  }

  #[test]
  fn sizes() {
    assert_eq!(BlockSize::S16.size(), 16);
    assert_eq!(BlockSize::S1024.size(), 1024);
    assert_eq!(BlockSize::Bert.size(), 1024);
    assert_eq!(BlockSize::from_szx(8), None);
  }

  #[test]
  fn split_reassembles_exactly() {
    let body = (0..=255u8).cycle().take(1000).collect::<Vec<_>>();

    for size in [BlockSize::S16, BlockSize::S64, BlockSize::S256, BlockSize::S1024] {
      let blocks = split_blocks(&body, size, size.size());
      let expected_count = (body.len() + size.size() - 1) / size.size();
      assert_eq!(blocks.len(), expected_count);

      let (last, init) = blocks.split_last().unwrap();
      assert!(init.iter().all(|(b, _)| b.more()));
      assert!(!last.0.more());

      let joined = blocks.iter().flat_map(|(_, part)| part.iter().copied()).collect::<Vec<_>>();
      assert_eq!(joined, body);
    }
  }

  #[test]
  fn bert_advances_by_sub_block_count() {
    let body = vec![1u8; 10 * 1024 + 10];
    let blocks = split_blocks(&body, BlockSize::Bert, 3 * 1024);

    let nums = blocks.iter().map(|(b, _)| b.num()).collect::<Vec<_>>();
    assert_eq!(nums, vec![0, 3, 6, 9]);
    assert_eq!(blocks[0].1.len(), 3 * 1024);
    assert_eq!(blocks[3].1.len(), 1024 + 10);
    assert!(!blocks[3].0.more());
  }

  #[test]
  fn validity() {
    let mid = Block::new(1, BlockSize::S64, true);
    assert!(mid.is_valid_intermediate(64));
    assert!(!mid.is_valid_intermediate(63));
    assert!(mid.is_valid_last(1));

    let last = Block::new(1, BlockSize::S64, false);
    assert!(last.is_valid_last(64));
    assert!(!last.is_valid_last(65));

    let bert = Block::new(0, BlockSize::Bert, true);
    assert!(bert.is_valid_intermediate(2048));
    assert!(!bert.is_valid_intermediate(0));
    assert!(!bert.is_valid_intermediate(1500));
    assert!(bert.with_more(false).is_valid_last(5000));
  }
}
