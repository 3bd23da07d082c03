use std::net::SocketAddr;

use croak_msg::no_repeat::{BLOCK1, SIZE1};
use croak_msg::{code, Block, BlockSize, Code, Message, Token, Type};

use super::BlockParams;
use crate::config::BlockWise;
use crate::net::Addrd;
use crate::shard::Sharded;

/// A partially received Block1 upload
#[derive(Debug)]
struct Assembly {
  token: Token,
  buffer: Vec<u8>,
  last_seen: u64,
}

/// Result of feeding a request to [`Uploads::on_request`]
#[derive(Debug, Clone, PartialEq)]
pub enum Assembled {
  /// Answer the request with this response; the handler must not see it
  Reply(Message),
  /// The request is whole and should be handled.
  ///
  /// `block1` is the last block of an upload, to be echoed
  /// (with `more = false`) in the response.
  Complete {
    /// The request, with the reassembled body and no Block1 / Size1
    request: Message,
    /// The last block received, if the body was uploaded in blocks
    block1: Option<Block>,
  },
}

/// A response to `req` with no payload, to be sent as-is or
/// adjusted to the request's type by the messaging layer
pub(crate) fn reply(req: &Message, code: Code) -> Message {
  Message::new(Type::Ack, code, req.id, req.token)
}

/// Block1 uploads in progress, keyed by path and peer address
#[derive(Debug)]
pub struct Uploads {
  config: BlockWise,
  transfers: Sharded<(String, SocketAddr), Assembly>,
}

impl Uploads {
  /// Create an empty store
  pub fn new(config: BlockWise) -> Self {
    Self { config,
           transfers: Sharded::default() }
  }

  /// Number of uploads in progress
  pub fn len(&self) -> usize {
    self.transfers.len()
  }

  /// Are no uploads in progress?
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Feed an inbound request through Block1 reassembly.
  ///
  /// `params` are the local block preferences (used to downsize the
  /// client), `bert` whether BERT was negotiated with the peer.
  pub fn on_request(&self,
                    req: Addrd<Message>,
                    params: Option<BlockParams>,
                    bert: bool,
                    now: u64)
                    -> Assembled {
    let Addrd(req, addr) = req;

    let block = match req.opts.block1() {
      | Some(b) => b,
      | None => return Assembled::Complete { request: req,
                                             block1: None },
    };

    if block.is_bert() && !bert {
      log::warn!("{} used BERT without negotiating it", addr);
      return Assembled::Reply(reply(&req, code::BAD_OPTION));
    }

    let key = (req.opts.path(), addr);
    let len = req.payload.len();
    let max = self.config.max_incoming_transfer_size;

    let too_large = |preferred: BlockSize| {
      reply(&req, code::REQUEST_ENTITY_TOO_LARGE).map_opts(|o| {
                                                    o.with_block1(Block::new(0, preferred, false))
                                                     .with_size1(max as u32)
                                                  })
    };
    let preferred = params.map(|p| p.size).unwrap_or_else(|| block.size());

    if let Some(err) = self.check_size(&req, block) {
      self.transfers.remove(&key);
      return Assembled::Reply(err);
    }

    let outcome = self.transfers.update(key.clone(), |state| {
      let mut state = match (block.num(), state) {
        | (0, _) => {
          if req.opts.size1().map(|n| n as usize > max).unwrap_or(false) {
            return (None, Err(too_large(preferred)));
          }

          let capacity = req.opts
                            .size1()
                            .map(|n| n as usize)
                            .unwrap_or(4 * block.size().size().max(len));
          Assembly { token: req.token,
                     buffer: Vec::with_capacity(capacity),
                     last_seen: now }
        },
        | (_, None) => {
          log::debug!("block {} for {} from {} with no upload in progress", block, key.0, addr);
          return (None, Err(reply(&req, code::REQUEST_ENTITY_INCOMPLETE)));
        },
        | (_, Some(st)) if st.token != req.token => {
          log::debug!("token changed during upload to {} from {}", key.0, addr);
          return (None, Err(reply(&req, code::REQUEST_ENTITY_INCOMPLETE)));
        },
        | (_, Some(st)) => st,
      };

      let offset = block.offset();
      let have = state.buffer.len();

      if have < offset {
        return (None, Err(reply(&req, code::REQUEST_ENTITY_INCOMPLETE)));
      }

      if have == offset {
        if have + len > max {
          return (None, Err(too_large(preferred)));
        }
        state.buffer.extend_from_slice(req.payload.as_bytes());
      }

      state.last_seen = now;

      match block.more() {
        | true => (Some(state), Ok(None)),
        | false => (None, Ok(Some(state.buffer))),
      }
    });

    match outcome {
      | Err(resp) => Assembled::Reply(resp),
      | Ok(None) => {
        let ack = match params {
          | Some(p) if !block.is_bert() => block_with_size(block, p.shrink_to(block.size()).size),
          | _ => block,
        };
        Assembled::Reply(reply(&req, code::CONTINUE).map_opts(|o| o.with_block1(ack)))
      },
      | Ok(Some(body)) => {
        log::debug!("reassembled {} byte upload to {} from {}", body.len(), key.0, addr);
        let request = req.with_payload(body)
                         .map_opts(|o| o.remove(BLOCK1).remove(SIZE1));
        Assembled::Complete { request,
                              block1: Some(block) }
      },
    }
  }

  /// Validate the payload length against the Block1 option.
  ///
  /// An intermediate block shorter than its size means the client
  /// cannot send blocks that large, so it is told a size that fits
  /// with 4.13. Anything else is 4.00.
  fn check_size(&self, req: &Message, block: Block) -> Option<Message> {
    let len = req.payload.len();

    if !block.is_bert() && block.more() && len > 0 && len < block.size().size() {
      let fits = BlockSize::fit(len);
      return Some(reply(req, code::REQUEST_ENTITY_TOO_LARGE).map_opts(|o| {
                                                               o.with_block1(Block::new(0, fits, false))
                                                             }));
    }

    if !block.is_valid_intermediate(len) || !block.is_valid_last(len) {
      return Some(reply(req, code::BAD_REQUEST).with_payload("block size mismatch"));
    }

    None
  }

  /// Discard uploads that have not progressed within the configured lifetime,
  /// yielding how many were removed
  pub fn prune(&self, now: u64) -> usize {
    let ttl = self.config.status_lifetime.0;
    let removed = self.transfers
                      .drain_where(|_, a| now.saturating_sub(a.last_seen) >= ttl)
                      .len();
    if removed > 0 {
      log::debug!("removed {} expired block-wise uploads", removed);
    }
    removed
  }

  /// Discard every upload in progress
  pub fn clear(&self) {
    self.transfers.for_each_shard(|map| map.clear());
  }

  /// Forget every upload from `addr`
  pub fn forget_peer(&self, addr: SocketAddr) {
    self.transfers.drain_where(|(_, a), _| *a == addr);
  }
}

/// Same block position, different size. The number is converted so
/// the block still starts at the same offset.
fn block_with_size(block: Block, size: BlockSize) -> Block {
  Block::new((block.offset() / size.size()) as u32, size, block.more())
}

/// Slice a handler's response into the Block2 block the request asked for
/// (or the first block, if it is too large for one message).
///
/// Size2 is included in block 0 when the request carried Size2.
/// A block past the end of the body yields 4.00. Only success (2.xx)
/// responses are sliced.
pub fn slice_response(req: &Message, resp: Message, params: Option<BlockParams>, bert: bool) -> Message {
  if resp.code.class != 2 {
    return resp;
  }

  let wanted = req.opts.block2();
  let len = resp.payload.len();

  let p = match (wanted, params) {
    | (Some(b), Some(p)) if b.is_bert() && bert && p.size.is_bert() => p,
    | (Some(b), _) if b.is_bert() => BlockParams::of_size(BlockSize::S1024),
    | (Some(b), Some(p)) if !p.size.is_bert() => p.shrink_to(b.size()),
    | (Some(b), _) => BlockParams::of_size(b.size()),
    | (None, Some(p)) if p.needs_blocks(len) => p,
    | (None, _) => return resp,
  };

  let offset = wanted.map(|b| b.offset()).unwrap_or(0);
  if offset > 0 && offset >= len {
    return reply(req, code::BAD_REQUEST).with_payload("block out of range");
  }

  let block = Block::new((offset / p.size.size()) as u32,
                         p.size,
                         offset + p.per_message() < len);
  let part = block.slice(resp.payload.as_bytes(), p.max_payload)
                  .to_vec();

  resp.with_payload(part).map_opts(|o| {
                           let o = o.with_block2(block);
                           match (block.num(), req.opts.size2()) {
                             | (0, Some(_)) => o.with_size2(len as u32),
                             | _ => o,
                           }
                         })
}

#[cfg(test)]
mod tests {
  use croak_msg::Id;
  use embedded_time::duration::Milliseconds;

  use super::*;
  use crate::test::addr;

  fn put(num: u32, more: bool, payload: Vec<u8>) -> Addrd<Message> {
    let msg = Message::new(Type::Con, Code::PUT, Id(num as u16), Token::from_slice(&[9]).unwrap())
      .map_opts(|o| o.with_path("upload").with_block1(Block::new(num, BlockSize::S64, more)))
      .with_payload(payload);
    Addrd(msg, addr(1))
  }

  fn code_of(a: &Assembled) -> Code {
    match a {
      | Assembled::Reply(m) => m.code,
      | Assembled::Complete { .. } => panic!("expected a reply"),
    }
  }

  #[test]
  fn reassembles_300_bytes() {
    let up = Uploads::new(BlockWise::default());
    let body = (0..300).map(|n| n as u8).collect::<Vec<_>>();

    for n in 0..4u32 {
      let part = body[n as usize * 64..(n as usize + 1) * 64].to_vec();
      match up.on_request(put(n, true, part), None, false, 0) {
        | Assembled::Reply(m) => {
          assert_eq!(m.code, code::CONTINUE);
          assert_eq!(m.opts.block1(), Some(Block::new(n, BlockSize::S64, true)));
        },
        | other => panic!("{:?}", other),
      }
    }

    match up.on_request(put(4, false, body[256..].to_vec()), None, false, 0) {
      | Assembled::Complete { request, block1 } => {
        assert_eq!(request.payload.0, body);
        assert_eq!(request.opts.block1(), None);
        assert_eq!(block1, Some(Block::new(4, BlockSize::S64, false)));
      },
      | other => panic!("{:?}", other),
    }

    assert!(up.is_empty());
  }

  #[test]
  fn plain_request_passes_through() {
    let up = Uploads::new(BlockWise::default());
    let req = Message::new(Type::Con, Code::GET, Id(1), Token::default());
    assert_eq!(up.on_request(Addrd(req.clone(), addr(1)), None, false, 0),
               Assembled::Complete { request: req,
                                     block1: None });
  }

  #[test]
  fn continuation_without_state_is_incomplete() {
    let up = Uploads::new(BlockWise::default());
    let a = up.on_request(put(2, true, vec![0; 64]), None, false, 0);
    assert_eq!(code_of(&a), code::REQUEST_ENTITY_INCOMPLETE);
  }

  #[test]
  fn token_change_is_incomplete() {
    let up = Uploads::new(BlockWise::default());
    up.on_request(put(0, true, vec![0; 64]), None, false, 0);

    let other = put(1, true, vec![0; 64]).map(|m| Message { token: Token::from_slice(&[1]).unwrap(),
                                                            ..m });
    assert_eq!(code_of(&up.on_request(other, None, false, 0)),
               code::REQUEST_ENTITY_INCOMPLETE);
    assert!(up.is_empty());
  }

  #[test]
  fn short_intermediate_block_suggests_size() {
    let up = Uploads::new(BlockWise::default());
    match up.on_request(put(0, true, vec![0; 40]), None, false, 0) {
      | Assembled::Reply(m) => {
        assert_eq!(m.code, code::REQUEST_ENTITY_TOO_LARGE);
        assert_eq!(m.opts.block1().map(|b| b.size()), Some(BlockSize::S32));
      },
      | other => panic!("{:?}", other),
    }
  }

  #[test]
  fn long_last_block_is_bad_request() {
    let up = Uploads::new(BlockWise::default());
    up.on_request(put(0, true, vec![0; 64]), None, false, 0);
    let a = up.on_request(put(1, false, vec![0; 65]), None, false, 0);
    assert_eq!(code_of(&a), code::BAD_REQUEST);
    assert!(up.is_empty());
  }

  #[test]
  fn oversized_upload_is_rejected() {
    let up = Uploads::new(BlockWise { max_incoming_transfer_size: 100,
                                      ..BlockWise::default() });

    let announced = put(0, true, vec![0; 64]).map(|m| m.map_opts(|o| o.with_size1(1000)));
    assert_eq!(code_of(&up.on_request(announced, None, false, 0)),
               code::REQUEST_ENTITY_TOO_LARGE);

    up.on_request(put(0, true, vec![0; 64]), None, false, 0);
    assert_eq!(code_of(&up.on_request(put(1, true, vec![0; 64]), None, false, 0)),
               code::REQUEST_ENTITY_TOO_LARGE);
  }

  #[test]
  fn retransmitted_block_is_not_appended_twice() {
    let up = Uploads::new(BlockWise::default());
    up.on_request(put(0, true, vec![1; 64]), None, false, 0);
    up.on_request(put(0, true, vec![1; 64]), None, false, 0);
    up.on_request(put(1, true, vec![2; 64]), None, false, 0);
    up.on_request(put(1, true, vec![2; 64]), None, false, 0);

    match up.on_request(put(2, false, vec![3; 1]), None, false, 0) {
      | Assembled::Complete { request, .. } => assert_eq!(request.payload.len(), 129),
      | other => panic!("{:?}", other),
    }
  }

  #[test]
  fn continue_downsizes_to_local_preference() {
    let up = Uploads::new(BlockWise::default());
    let a = up.on_request(put(0, true, vec![0; 64]),
                          Some(BlockParams::of_size(BlockSize::S32)),
                          false,
                          0);
    match a {
      | Assembled::Reply(m) => {
        assert_eq!(m.code, code::CONTINUE);
        assert_eq!(m.opts.block1(), Some(Block::new(0, BlockSize::S32, true)));
      },
      | other => panic!("{:?}", other),
    }
  }

  #[test]
  fn bert_requires_negotiation() {
    let up = Uploads::new(BlockWise::default());
    let req = put(0, true, vec![0; 1024]).map(|m| {
                                           m.map_opts(|o| o.with_block1(Block::new(0, BlockSize::Bert, true)))
                                         });
    assert_eq!(code_of(&up.on_request(req.clone(), None, false, 0)), code::BAD_OPTION);
    assert_eq!(code_of(&up.on_request(req, None, true, 0)), code::CONTINUE);
  }

  #[test]
  fn stale_uploads_are_pruned() {
    let up = Uploads::new(BlockWise { status_lifetime: Milliseconds(1_000),
                                      ..BlockWise::default() });
    up.on_request(put(0, true, vec![0; 64]), None, false, 0);
    assert_eq!(up.prune(999), 0);
    assert_eq!(up.prune(1_000), 1);
    assert!(up.is_empty());
  }

  #[test]
  fn slices_block2() {
    let get = |block: Option<Block>| {
      Message::new(Type::Con, Code::GET, Id(1), Token::default()).map_opts(|o| match block {
                                                                   | Some(b) => o.with_block2(b),
                                                                   | None => o,
                                                                 })
    };
    let resp = reply(&get(None), code::CONTENT).with_payload(vec![7; 100]);
    let p = Some(BlockParams::of_size(BlockSize::S32));

    let first = slice_response(&get(None), resp.clone(), p, false);
    assert_eq!(first.opts.block2(), Some(Block::new(0, BlockSize::S32, true)));
    assert_eq!(first.payload.len(), 32);
    assert_eq!(first.opts.size2(), None);

    let with_size = slice_response(&get(None).map_opts(|o| o.with_size2(0)), resp.clone(), p, false);
    assert_eq!(with_size.opts.size2(), Some(100));

    let last = slice_response(&get(Some(Block::new(3, BlockSize::S32, false))), resp.clone(), p, false);
    assert_eq!(last.opts.block2(), Some(Block::new(3, BlockSize::S32, false)));
    assert_eq!(last.payload.len(), 4);

    let past = slice_response(&get(Some(Block::new(4, BlockSize::S32, false))), resp.clone(), p, false);
    assert_eq!(past.code, code::BAD_REQUEST);

    // fits in one message
    let small = reply(&get(None), code::CONTENT).with_payload("hi");
    assert_eq!(slice_response(&get(None), small.clone(), p, false), small);

    // diagnostic payloads of errors are never split
    let error = reply(&get(None), code::INTERNAL_SERVER_ERROR).with_payload(vec![b'e'; 100]);
    assert_eq!(slice_response(&get(None), error.clone(), p, false), error);
    assert_eq!(slice_response(&get(Some(Block::new(1, BlockSize::S32, false))), error.clone(), p, false),
               error);
  }
}
