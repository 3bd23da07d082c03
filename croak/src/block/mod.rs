//! Block-wise transfers (RFC 7959, and BERT from RFC 8323 section 6)
//!
//! * [`outbound`] drives a client's transfer: uploading a large
//!   request body with Block1 and downloading a large response with Block2.
//! * [`inbound`] serves the other side: reassembling Block1 uploads and
//!   slicing large responses into Block2 blocks.

use croak_msg::BlockSize;

use crate::config::BlockWise;
use crate::csm::Capabilities;

/// Reassembly of Block1 requests and slicing of Block2 responses
pub mod inbound;

/// Client side transfers
pub mod outbound;

/// Which block size to use and how much payload a single message may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockParams {
  /// Preferred block size
  pub size: BlockSize,
  /// Largest payload in one message. Equal to `size` except for BERT,
  /// where it is a multiple of 1024.
  pub max_payload: usize,
}

impl BlockParams {
  /// Parameters agreed with a stream peer, if it does block-wise transfers at all
  pub fn from_capabilities(caps: Capabilities) -> Option<Self> {
    caps.block_size().map(|size| Self { size,
                                        max_payload: caps.max_outbound_payload() })
  }

  /// Parameters for datagram transfers.
  ///
  /// BERT is only defined for reliable transports, so it is
  /// replaced by 1024-byte blocks.
  ///
  /// ```
  /// use croak::block::BlockParams;
  /// use croak::config::BlockWise;
  /// use croak_msg::BlockSize;
  ///
  /// let config = BlockWise { size: Some(BlockSize::Bert), ..BlockWise::default() };
  /// assert_eq!(BlockParams::from_config(&config),
  ///            Some(BlockParams { size: BlockSize::S1024, max_payload: 1024 }));
  /// ```
  pub fn from_config(config: &BlockWise) -> Option<Self> {
    config.size
          .map(|size| if size.is_bert() { BlockSize::S1024 } else { size })
          .map(Self::of_size)
  }

  /// Non-BERT parameters for `size`
  pub fn of_size(size: BlockSize) -> Self {
    Self { size,
           max_payload: size.size() }
  }

  /// Payload bytes per message
  pub fn per_message(&self) -> usize {
    self.size.size() * self.size.blocks_per_message(self.max_payload)
  }

  /// Must a body of `len` bytes be split?
  pub fn needs_blocks(&self, len: usize) -> bool {
    len > self.per_message()
  }

  /// Same parameters with a smaller block size proposed by the peer.
  ///
  /// Larger sizes are ignored, BERT stays BERT only if the peer asked for it.
  pub fn shrink_to(self, size: BlockSize) -> Self {
    match (self.size, size) {
      | (BlockSize::Bert, BlockSize::Bert) => self,
      | (BlockSize::Bert, smaller) => Self::of_size(smaller),
      | (_, BlockSize::Bert) => self,
      | (ours, theirs) if theirs.size() < ours.size() => Self::of_size(theirs),
      | _ => self,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn shrink_only_goes_down() {
    let p = BlockParams::of_size(BlockSize::S256);
    assert_eq!(p.shrink_to(BlockSize::S64), BlockParams::of_size(BlockSize::S64));
    assert_eq!(p.shrink_to(BlockSize::S1024), p);
    assert_eq!(p.shrink_to(BlockSize::Bert), p);

    let bert = BlockParams { size: BlockSize::Bert,
                             max_payload: 4096 };
    assert_eq!(bert.per_message(), 4096);
    assert_eq!(bert.shrink_to(BlockSize::S512), BlockParams::of_size(BlockSize::S512));
  }

  #[test]
  fn capabilities_without_block_wise() {
    assert_eq!(BlockParams::from_capabilities(Capabilities::BASE), None);

    let caps = Capabilities { max_message_size: 4096,
                              block_wise: true };
    assert_eq!(BlockParams::from_capabilities(caps),
               Some(BlockParams { size: BlockSize::Bert,
                                  max_payload: 3072 }));
  }
}
