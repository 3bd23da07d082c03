use core::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use croak_msg::{tcp, CodeKind, Message, Signaling, Token};

use super::{serve, Callback, Outcome, Pending, RequestHandler};
use crate::block::inbound::Uploads;
use crate::block::outbound::{Step, Transfer};
use crate::block::BlockParams;
use crate::config::Config;
use crate::csm::{Capabilities, CapabilitiesStore};
use crate::error::Error;
use crate::logging::msg_summary;
use crate::net::{Addrd, Transport};
use crate::retry::StrategyTimeout;
use crate::shard::Sharded;
use crate::time::{now_millis, Clock};
use crate::transaction::{Priority, TokenSupplier, Transaction, TransactionId, TransactionManager};

/// Length nibble, up to 4 extended length bytes, code and an 8 byte token
const MAX_FRAME_HEADER: usize = 1 + 4 + 1 + 8;

/// CoAP over a reliable stream transport (RFC 8323)
///
/// There are no message types, message ids, ACKs or retransmissions on
/// streams: requests and responses are matched by token alone, and a
/// request that gets no response fails after
/// [`delayed_transaction_timeout`](crate::config::Transactions::delayed_transaction_timeout).
///
/// The embedding application owns the connections. It reports each
/// new connection with [`on_connected`](TcpMessaging::on_connected)
/// (which sends our CSM), hands over bytes as they are read with
/// [`handle_bytes`](TcpMessaging::handle_bytes) and reports closed
/// connections with [`on_disconnected`](TcpMessaging::on_disconnected).
pub struct TcpMessaging<T, C, H> {
  transport: T,
  clock: C,
  handler: H,
  config: Config,
  caps: CapabilitiesStore,
  buffers: Sharded<SocketAddr, Vec<u8>>,
  uploads: Uploads,
  transactions: TransactionManager,
  tokens: TokenSupplier,
  stopped: AtomicBool,
}

impl<T, C, H> fmt::Debug for TcpMessaging<T, C, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TcpMessaging")
     .field("config", &self.config)
     .field("caps", &self.caps)
     .field("transactions", &self.transactions.len())
     .field("uploads", &self.uploads.len())
     .field("stopped", &self.stopped)
     .finish()
  }
}

impl<T, C, H> TcpMessaging<T, C, H>
  where T: Transport,
        C: Clock,
        H: RequestHandler
{
  /// Create the engine, advertising [`Config::csm`] to every peer
  pub fn new(transport: T, clock: C, handler: H, config: Config) -> Result<Self, Error> {
    let seed = now_millis(&clock)?;
    Ok(Self { transport,
              clock,
              handler,
              config,
              caps: CapabilitiesStore::new(config.csm.into()),
              buffers: Sharded::default(),
              uploads: Uploads::new(config.block),
              transactions: TransactionManager::new(&config.transactions,
                                                    Box::new(StrategyTimeout::new(&config.transactions, seed))),
              tokens: TokenSupplier::new(seed),
              stopped: AtomicBool::new(false) })
  }

  /// What was agreed with `addr`
  pub fn capabilities(&self, addr: SocketAddr) -> Capabilities {
    self.caps.get(addr)
  }

  /// Number of requests awaiting a response
  pub fn transaction_count(&self) -> usize {
    self.transactions.len()
  }

  fn now(&self) -> Result<u64, Error> {
    now_millis(&self.clock)
  }

  fn check_running(&self) -> Result<(), Error> {
    match self.stopped.load(Ordering::SeqCst) {
      | true => Err(Error::Stopped),
      | false => Ok(()),
    }
  }

  fn send_frame(&self, msg: Addrd<&Message>) -> Result<(), Error> {
    log::trace!("-> {} {}", msg.addr(), msg_summary(msg.data()));
    let bytes = tcp::encode(msg.data())?;
    self.transport
        .send(Addrd(&bytes, msg.addr()))
        .map_err(|e| {
          log::error!("failed to send to {}: {:?}", msg.addr(), e);
          Error::Transport(format!("{:?}", e))
        })
  }

  fn signal(&self, sig: &Signaling, token: Token, addr: SocketAddr) -> Result<(), Error> {
    self.send_frame(Addrd(&Message::from_signaling(sig, token), addr))
  }

  /// A connection to `addr` was established; sends our CSM
  pub fn on_connected(&self, addr: SocketAddr) -> Result<(), Error> {
    self.check_running()?;
    log::debug!("connected to {}, sending CSM", addr);
    self.signal(&self.caps.local().signal(), Token::default(), addr)
  }

  /// The connection to `addr` closed.
  ///
  /// Requests awaiting a response from it fail with [`Error::SocketClosed`].
  pub fn on_disconnected(&self, addr: SocketAddr) {
    log::debug!("disconnected from {}", addr);
    self.caps.remove(addr);
    self.buffers.remove(&addr);
    self.uploads.forget_peer(addr);
    self.transactions
        .remove_peer(addr)
        .into_iter()
        .for_each(|t| t.complete(Outcome::Failed(Error::SocketClosed)));
  }

  /// Abort the connection to `addr` (7.05) and forget it
  fn abort(&self, addr: SocketAddr, bad_csm_option: Option<u32>) {
    log::warn!("aborting connection to {}", addr);
    self.signal(&Signaling::Abort { bad_csm_option }, Token::default(), addr)
        .ok();
    self.on_disconnected(addr);
  }

  /// Process bytes read from the connection to a peer.
  ///
  /// Bytes may contain any number of frames, and frames may be split
  /// across calls. A malformed or oversized frame aborts the connection.
  pub fn handle_bytes(&self, bytes: Addrd<&[u8]>) -> Result<(), Error> {
    self.check_running()?;
    let now = self.now()?;
    let addr = bytes.addr();

    let mut buf = self.buffers.remove(&addr).unwrap_or_default();
    buf.extend_from_slice(bytes.data());

    let max = self.caps.local().max_message_size as usize + MAX_FRAME_HEADER;
    let mut consumed = 0;
    let mut result = Ok(());

    loop {
      let rest = &buf[consumed..];

      match tcp::frame_len(rest) {
        | Ok(len) if len > max => {
          self.abort(addr, None);
          return Err(Error::MessageTooLarge { size: len, max });
        },
        | _ => (),
      }

      match tcp::decode(rest) {
        | Ok((msg, len)) => {
          consumed += len;
          if let Err(e) = self.on_message(Addrd(msg, addr), now) {
            result = Err(e);
          }
        },
        | Err(nb::Error::WouldBlock) => break,
        | Err(nb::Error::Other(e)) => {
          log::warn!("malformed frame from {}: {}", addr, e);
          self.abort(addr, None);
          return Err(Error::Malformed { bytes: rest.to_vec(),
                                        cause: Some(e) });
        },
      }
    }

    buf.drain(..consumed);
    if !buf.is_empty() {
      self.buffers.insert(addr, buf);
    }

    result
  }

  fn on_message(&self, msg: Addrd<Message>, now: u64) -> Result<(), Error> {
    log::trace!("<- {} {}", msg.addr(), msg_summary(msg.data()));

    match msg.data().code.kind() {
      | CodeKind::Signaling => self.on_signal(msg, now),
      | CodeKind::Response => {
        let t = self.transactions.take_delayed(msg.data().token, msg.addr());
        match t {
          | Some(t) => self.on_response(t, msg, now),
          | None => {
            log::debug!("ignoring response from {} matching no request", msg.addr());
            Ok(())
          },
        }
      },
      | CodeKind::Request => self.on_request(msg, now),
      | CodeKind::Empty => Ok(()),
      | CodeKind::Unrecognized => {
        log::warn!("ignoring message with unrecognized code {} from {}",
                   msg.data().code,
                   msg.addr());
        Ok(())
      },
    }
  }

  fn on_signal(&self, msg: Addrd<Message>, now: u64) -> Result<(), Error> {
    let addr = msg.addr();

    if let Some(n) = msg.data().unrecognized_critical() {
      log::warn!("signal from {} carries unrecognized critical option {}", addr, n.0);
      self.abort(addr, Some(n.0));
      return Err(Error::Malformed { bytes: Vec::new(),
                                    cause: None });
    }

    match msg.data().signaling() {
      | Some(Signaling::Csm { max_message_size,
                              block_wise, }) => {
        let agreed = self.caps.put_peer(addr, max_message_size, block_wise);
        log::debug!("{} sent CSM, agreed on {:?}", addr, agreed);
        Ok(())
      },
      | Some(Signaling::Ping { custody }) => {
        self.signal(&Signaling::Pong { custody }, msg.data().token, addr)
      },
      | Some(Signaling::Pong { .. }) => {
        if let Some(t) = self.transactions.take_delayed(msg.data().token, addr) {
          t.complete(Outcome::Response(msg));
        }
        Ok(())
      },
      | Some(Signaling::Release { alternative_addresses,
                                  hold_off, }) => {
        log::info!("{} is releasing the connection (alternatives: {:?}, hold off: {:?}s)",
                   addr,
                   alternative_addresses,
                   hold_off);
        Ok(())
      },
      | Some(Signaling::Abort { bad_csm_option }) => {
        log::warn!("{} aborted the connection (bad CSM option: {:?})", addr, bad_csm_option);
        self.on_disconnected(addr);
        Ok(())
      },
      | None => {
        log::debug!("ignoring unknown signal {} from {} at {}", msg.data().code, addr, now);
        Ok(())
      },
    }
  }

  fn on_request(&self, req: Addrd<Message>, now: u64) -> Result<(), Error> {
    let addr = req.addr();
    let token = req.data().token;
    let caps = self.caps.get(addr);

    let resp = serve(&self.handler,
                     &self.uploads,
                     req,
                     BlockParams::from_capabilities(caps),
                     caps.is_bert(),
                     now);

    self.send_frame(Addrd(&Message { token, ..resp }, addr))
  }

  fn on_response(&self, mut t: Transaction, resp: Addrd<Message>, now: u64) -> Result<(), Error> {
    let addr = resp.addr();
    let transfer = match t.transfer.take() {
      | Some(tr) => tr,
      | None => {
        t.complete(Outcome::Response(resp));
        return Ok(());
      },
    };

    match transfer.on_response(resp.unwrap(), &self.config.block) {
      | (Step::Done(resp), _) => t.complete(Outcome::Response(Addrd(resp, addr))),
      | (Step::Fail(e), _) => t.complete(Outcome::Failed(e)),
      | (Step::Send(next), Some(transfer)) => {
        let t = t.continue_with(next, transfer, true);
        return self.track_and_send(t, now);
      },
      | (Step::Send(_), None) => unreachable!("a transfer that continues is handed back"),
    }

    Ok(())
  }

  /// Wait for a response to `t` and send its message.
  /// If the send fails the transaction is failed too.
  fn track_and_send(&self, t: Transaction, now: u64) -> Result<(), Error> {
    let msg = t.msg.clone();
    self.transactions.add_delayed(t, now);

    self.send_frame(msg.as_ref()).map_err(|e| {
                                   if let Some(t) = self.transactions.take_delayed(msg.data().token, msg.addr()) {
                                     t.complete(Outcome::Failed(e.clone()));
                                   }
                                   e
                                 })
  }

  /// Send a request; `callback` receives the response.
  ///
  /// Bodies too large for one message are uploaded block-wise if the
  /// peer's CSM allowed it (as BERT if both sides allow messages larger
  /// than 1152 bytes); otherwise the request fails with
  /// [`Error::MessageTooLarge`].
  pub fn send_request(&self, req: Addrd<Message>, callback: Callback) -> Result<(), Error> {
    self.check_running()?;
    let now = self.now()?;
    let addr = req.addr();

    let mut req = req.unwrap();
    if req.token.is_empty() {
      req.token = self.tokens.next();
    }

    let caps = self.caps.get(addr);
    let (first, transfer) = Transfer::start(req, BlockParams::from_capabilities(caps));

    let size = tcp::encode(&first)?.len();
    let max = caps.max_message_size as usize;
    if size > max {
      return Err(Error::MessageTooLarge { size, max });
    }

    let first = Addrd(first, addr);
    let t = Transaction::new(TransactionId::of(first.as_ref(), true),
                             first,
                             Priority::default(),
                             Some(transfer),
                             callback);

    let msg = t.msg.clone();
    self.transactions.add_delayed(t, now);
    self.send_frame(msg.as_ref()).map_err(|e| {
                                   self.transactions.take_delayed(msg.data().token, addr);
                                   e
                                 })
  }

  /// [`send_request`](Self::send_request), yielding a handle to the outcome
  pub fn request(&self, req: Addrd<Message>) -> Result<Pending, Error> {
    let (pending, callback) = Pending::new();
    self.send_request(req, callback)?;
    Ok(pending)
  }

  /// Send a message that is not a request (a notification, a
  /// response sent later). Streams are reliable, so `callback`
  /// receives [`Outcome::Sent`] once the frame is written.
  pub fn send_message(&self, msg: Addrd<Message>, callback: Callback) -> Result<(), Error> {
    self.check_running()?;
    self.send_frame(msg.as_ref())?;
    callback(Outcome::Sent);
    Ok(())
  }

  /// Send a 7.02 Ping; completes with [`Outcome::Response`] carrying the Pong
  pub fn ping(&self, addr: SocketAddr, custody: bool) -> Result<Pending, Error> {
    self.check_running()?;
    let now = self.now()?;
    let (pending, callback) = Pending::new();

    let ping = Message::from_signaling(&Signaling::Ping { custody }, self.tokens.next());
    let ping = Addrd(ping, addr);
    let t = Transaction::new(TransactionId::of(ping.as_ref(), true),
                             ping,
                             Priority::default(),
                             None,
                             callback);

    self.track_and_send(t, now)?;
    Ok(pending)
  }

  /// Fail requests whose response did not arrive in time with
  /// [`Error::Timeout`] and discard stale uploads.
  ///
  /// Call every [`Config::sweep_interval`].
  pub fn resend_timeouts(&self) -> Result<(), Error> {
    self.check_running()?;
    let now = self.now()?;

    self.transactions
        .sweep(now)
        .expired
        .into_iter()
        .for_each(|t| t.complete(Outcome::Failed(Error::Timeout)));

    self.uploads.prune(now);
    Ok(())
  }

  /// Fail every pending request with [`Error::Stopped`], forget
  /// all per-peer state and refuse further work
  pub fn stop(&self) {
    self.stopped.store(true, Ordering::SeqCst);
    self.transactions
        .drain()
        .into_iter()
        .for_each(|t| t.complete(Outcome::Failed(Error::Stopped)));
    self.buffers.for_each_shard(|map| map.clear());
    self.uploads.clear();
  }
}
