use core::mem;

use croak_msg::no_repeat::{BLOCK1, BLOCK2, OBSERVE, SIZE1, SIZE2};
use croak_msg::{code, Block, Message};

use super::BlockParams;
use crate::config::BlockWise;
use crate::error::{BlockError, Error};

/// What to do after a response arrived for a block-wise transfer
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
  /// Send this request next, keeping the transaction alive
  Send(Message),
  /// The exchange is finished with this (reassembled) response
  Done(Message),
  /// The transfer cannot continue
  Fail(Error),
}

/// Client state of a request that may be uploaded with Block1
/// and whose response may come back in Block2 blocks.
///
/// Every request gets one, so that a server may start a Block2
/// download on any response.
#[derive(Debug, Clone)]
pub(crate) struct Transfer {
  /// The request with its whole body
  request: Message,
  params: Option<BlockParams>,
  /// The last Block1 sent, if the body was split
  block1: Option<Block>,
  /// Block2 payload received so far
  received: Vec<u8>,
  etag: Option<Vec<u8>>,
  restarts: u8,
  /// Both sides advertised BERT
  bert: bool,
}

impl Transfer {
  /// Begin a transfer, yielding the first message to send
  pub(crate) fn start(request: Message, params: Option<BlockParams>) -> (Message, Self) {
    let mut t = Self { request,
                       params,
                       block1: None,
                       received: Vec::new(),
                       etag: None,
                       restarts: 0,
                       bert: params.map(|p| p.size.is_bert()).unwrap_or(false) };

    let first = match params {
      | Some(p) if p.needs_blocks(t.request.payload.len()) => t.upload(0, p),
      | _ => t.request.clone(),
    };

    (first, t)
  }

  /// The request carrying the body starting at byte `offset`
  fn upload(&mut self, offset: usize, p: BlockParams) -> Message {
    let total = self.request.payload.len();
    let block = Block::new((offset / p.size.size()) as u32,
                           p.size,
                           offset + p.per_message() < total);
    let part = block.slice(self.request.payload.as_bytes(), p.max_payload)
                    .to_vec();

    self.block1 = Some(block);
    self.params = Some(p);

    log::debug!("uploading block {} of {} byte body", block, total);
    self.request
        .clone()
        .with_payload(part)
        .map_opts(|o| match block.num() {
          | 0 => o.with_block1(block).with_size1(total as u32),
          | _ => o.with_block1(block).remove(SIZE1),
        })
  }

  /// The request asking for `block` of the response body
  fn download(&self, block: Block) -> Message {
    log::debug!("requesting response block {}", block);
    self.request
        .clone()
        .with_payload(Vec::<u8>::new())
        .map_opts(|o| {
          o.remove(BLOCK1)
           .remove(SIZE1)
           .remove(SIZE2)
           .remove(OBSERVE)
           .with_block2(block)
        })
  }

  /// Handle a response to the last request sent
  pub(crate) fn on_response(mut self, resp: Message, config: &BlockWise) -> (Step, Option<Self>) {
    let (sent, params) = match (self.block1, self.params) {
      | (Some(sent), Some(params)) => (sent, params),
      | _ => return self.on_block2(resp, config),
    };

    if resp.code == code::REQUEST_ENTITY_TOO_LARGE {
      return match resp.opts.block1().map(|b| params.shrink_to(b.size())) {
        | Some(smaller) if smaller != params => {
          log::debug!("peer asked for {} byte blocks, restarting upload", smaller.size.size());
          let msg = self.upload(0, smaller);
          (Step::Send(msg), Some(self))
        },
        | _ => (Step::Done(resp), None),
      };
    }

    if !sent.more() {
      return self.on_block2(resp, config);
    }

    if resp.code != code::CONTINUE {
      // the server answered before the upload finished
      return (Step::Done(resp), None);
    }

    let sent_len = sent.slice(self.request.payload.as_bytes(), params.max_payload)
                       .len();
    let next = resp.opts
                   .block1()
                   .map(|b| params.shrink_to(b.size()))
                   .unwrap_or(params);

    let msg = self.upload(sent.offset() + sent_len, next);
    (Step::Send(msg), Some(self))
  }

  fn on_block2(mut self, resp: Message, config: &BlockWise) -> (Step, Option<Self>) {
    let block = match resp.opts.block2() {
      | Some(b) if !resp.code.is_error() => b,
      | _ => return (Step::Done(resp), None),
    };

    if block.is_bert() && !self.bert {
      log::warn!("peer sent a BERT block, but BERT was not negotiated");
      return (Step::Fail(BlockError::BertNotNegotiated.into()), None);
    }

    let etag = resp.opts.etag().map(<[u8]>::to_vec);

    if block.num() > 0 && etag != self.etag {
      if self.restarts >= config.max_resource_changes {
        log::warn!("resource changed {} times during block-wise transfer, giving up",
                   self.restarts + 1);
        return (Step::Fail(BlockError::ResourceChangedTooOften.into()), None);
      }

      self.restarts += 1;
      self.received.clear();
      self.etag = None;
      let msg = self.download(Block::new(0, block.size(), false));
      return (Step::Send(msg), Some(self));
    }

    if block.num() == 0 {
      self.received.clear();
      self.etag = etag;
    }

    let len = resp.payload.len();

    if block.offset() != self.received.len() {
      return (Step::Fail(BlockError::EntityIncomplete.into()), None);
    }

    if !block.is_valid_intermediate(len) || !block.is_valid_last(len) {
      return (Step::Fail(BlockError::SizeMismatch.into()), None);
    }

    if self.received.len() + len > config.max_incoming_transfer_size {
      return (Step::Fail(BlockError::EntityTooLarge.into()), None);
    }

    self.received.extend_from_slice(resp.payload.as_bytes());

    if block.more() {
      let step = match block.is_bert() {
        | true => (len / block.size().size()) as u32,
        | false => 1,
      };
      let msg = self.download(Block::new(block.num() + step, block.size(), false));
      (Step::Send(msg), Some(self))
    } else {
      let body = mem::take(&mut self.received);
      (Step::Done(resp.with_payload(body).map_opts(|o| o.remove(BLOCK2))), None)
    }
  }
}
