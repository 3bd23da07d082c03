use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use croak_msg::{CodeKind, Id, Message, Token, TryFromBytes, TryIntoBytes, Type};

use super::{serve, Callback, Outcome, Pending, RequestHandler};
use crate::block::inbound::Uploads;
use crate::block::outbound::{Step, Transfer};
use crate::block::BlockParams;
use crate::config::Config;
use crate::dedup::{DuplicateDetector, Seen};
use crate::error::Error;
use crate::logging::msg_summary;
use crate::net::{Addrd, Transport};
use crate::retry::{StrategyTimeout, TransmissionTimeout};
use crate::time::{now_millis, Clock};
use crate::transaction::{IdSupplier, Priority, TokenSupplier, Transaction, TransactionId, TransactionManager};

type DuplicateHook = Box<dyn Fn(Addrd<&Message>) + Send + Sync>;

/// CoAP over a datagram transport (RFC 7252 + RFC 7959)
///
/// ```
/// use croak::config::Config;
/// use croak::messaging::udp::UdpMessaging;
/// use croak::messaging::{response, HandlerError};
/// use croak::net::Addrd;
/// use croak::time::StdClock;
/// use croak_msg::{code, Message};
/// use std::net::UdpSocket;
///
/// let sock = UdpSocket::bind("127.0.0.1:0").unwrap();
/// let server = UdpMessaging::new(sock,
///                                StdClock::new(),
///                                |_: Addrd<&Message>| -> Result<Message, HandlerError> {
///                                  Ok(response(code::CONTENT).with_payload("hello"))
///                                },
///                                Config::default()).unwrap();
/// assert_eq!(server.transaction_count(), 0);
/// ```
pub struct UdpMessaging<T, C, H> {
  transport: T,
  clock: C,
  handler: H,
  config: Config,
  params: Option<BlockParams>,
  transactions: TransactionManager,
  dedup: DuplicateDetector,
  uploads: Uploads,
  ids: IdSupplier,
  tokens: TokenSupplier,
  stopped: AtomicBool,
  on_duplicate: Option<DuplicateHook>,
}

impl<T, C, H> fmt::Debug for UdpMessaging<T, C, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("UdpMessaging")
     .field("config", &self.config)
     .field("transactions", &self.transactions.len())
     .field("dedup", &self.dedup.len())
     .field("uploads", &self.uploads.len())
     .field("stopped", &self.stopped)
     .finish()
  }
}

impl<T, C, H> UdpMessaging<T, C, H>
  where T: Transport,
        C: Clock,
        H: RequestHandler
{
  /// Create the engine. The clock seeds message ids, tokens and retransmission jitter.
  pub fn new(transport: T, clock: C, handler: H, config: Config) -> Result<Self, Error> {
    let seed = now_millis(&clock)?;
    Ok(Self { transport,
              clock,
              handler,
              config,
              params: BlockParams::from_config(&config.block),
              transactions: TransactionManager::new(&config.transactions,
                                                    Box::new(StrategyTimeout::new(&config.transactions, seed))),
              dedup: DuplicateDetector::new(config.dedup),
              uploads: Uploads::new(config.block),
              ids: IdSupplier::new(seed),
              tokens: TokenSupplier::new(seed),
              stopped: AtomicBool::new(false),
              on_duplicate: None })
  }

  /// Use a custom retransmission schedule
  pub fn with_timeout(self, timeout: impl TransmissionTimeout + 'static) -> Self {
    Self { transactions: TransactionManager::new(&self.config.transactions, Box::new(timeout)),
           ..self }
  }

  /// Invoke `f` with every retransmitted inbound message that was filtered out
  pub fn with_duplicate_hook(self, f: impl Fn(Addrd<&Message>) + Send + Sync + 'static) -> Self {
    Self { on_duplicate: Some(Box::new(f)),
           ..self }
  }

  /// The runtime config
  pub fn config(&self) -> &Config {
    &self.config
  }

  /// The inbound duplicate detector
  pub fn dedup(&self) -> &DuplicateDetector {
    &self.dedup
  }

  /// Number of queued, active and delayed outbound transactions
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

  fn send_raw(&self, msg: Addrd<&Message>) -> Result<(), Error> {
    log::trace!("-> {} {}", msg.addr(), msg_summary(msg.data()));
    let bytes = (*msg.data()).clone().try_into_bytes()?;
    self.transport
        .send(Addrd(&bytes, msg.addr()))
        .map_err(|e| {
          log::error!("failed to send to {}: {:?}", msg.addr(), e);
          Error::Transport(format!("{:?}", e))
        })
  }

  /// Drop a transaction whose first transmission failed, sending
  /// whatever the manager released in its place
  fn abandon(&self, msg: &Addrd<Message>, e: Error, now: u64) -> Error {
    let (_, next) = self.transactions.remove(t_id(msg), now);
    self.transmit(next, now);
    e
  }

  /// Send messages released by the transaction manager. A failed send fails
  /// its transaction, which may release the next one in turn.
  fn transmit(&self, msg: Option<Addrd<Message>>, now: u64) {
    let mut next = msg;
    while let Some(msg) = next.take() {
      if let Err(e) = self.send_raw(msg.as_ref()) {
        let (t, after) = self.transactions.remove(TransactionId::of(msg.as_ref(), false), now);
        if let Some(t) = t {
          t.complete(Outcome::Failed(e));
        }
        next = after;
      }
    }
  }

  /// Send a request; `callback` receives the response.
  ///
  /// Confirmable requests are queued behind other requests to the same
  /// address and retransmitted until acknowledged. Bodies larger than the
  /// configured block size are uploaded block-wise, and responses sent
  /// in blocks are reassembled before `callback` sees them.
  ///
  /// A message id is assigned, and a token if the request has none.
  pub fn send_request(&self, req: Addrd<Message>, priority: Priority, callback: Callback) -> Result<(), Error> {
    self.check_running()?;
    let now = self.now()?;
    let addr = req.addr();

    let mut req = req.unwrap();
    req.id = self.ids.next();
    if req.token.is_empty() {
      req.token = self.tokens.next();
    }

    let (first, transfer) = Transfer::start(req, self.params);

    let max = self.config.csm.max_message_size as usize;
    if first.wire_size() > max {
      return Err(Error::MessageTooLarge { size: first.wire_size(),
                                          max });
    }

    let first = Addrd(first, addr);
    let t = Transaction::new(TransactionId::of(first.as_ref(), false),
                             first.clone(),
                             priority,
                             Some(transfer),
                             callback);

    match first.data().ty {
      | Type::Con => {
        let send = self.transactions.add(t, false, now)?;
        if let Some(msg) = send {
          self.send_raw(msg.as_ref())
              .map_err(|e| self.abandon(&msg, e, now))?;
        }
        Ok(())
      },
      | _ => {
        let token = first.data().token;
        self.transactions.add_delayed(t, now);
        self.send_raw(first.as_ref()).map_err(|e| {
                                       self.transactions.take_delayed(token, addr);
                                       e
                                     })
      },
    }
  }

  /// [`send_request`](Self::send_request) with the default priority,
  /// yielding a handle to the outcome
  pub fn request(&self, req: Addrd<Message>) -> Result<Pending, Error> {
    let (pending, callback) = Pending::new();
    self.send_request(req, self.config.transactions.default_priority, callback)?;
    Ok(pending)
  }

  /// Send a message that is not a request (a notification, a separate
  /// response, ...). Confirmable messages are retransmitted until
  /// acknowledged and `callback` receives [`Outcome::Sent`] on the ACK;
  /// everything else completes as soon as it is handed to the transport.
  pub fn send_message(&self, msg: Addrd<Message>, callback: Callback) -> Result<(), Error> {
    self.check_running()?;
    let now = self.now()?;

    let msg = msg.map(|m| match m.ty {
                   | Type::Con | Type::Non => Message { id: self.ids.next(),
                                                        ..m },
                   | _ => m,
                 });

    if msg.data().ty != Type::Con {
      self.send_raw(msg.as_ref())?;
      callback(Outcome::Sent);
      return Ok(());
    }

    let t = Transaction::new(TransactionId::of(msg.as_ref(), false),
                             msg,
                             self.config.transactions.default_priority,
                             None,
                             callback);
    let send = self.transactions.add(t, false, now)?;
    if let Some(msg) = send {
      self.send_raw(msg.as_ref())
          .map_err(|e| self.abandon(&msg, e, now))?;
    }
    Ok(())
  }

  /// Send a CoAP ping (an empty confirmable message).
  ///
  /// Completes with [`Outcome::Response`] carrying the peer's Reset.
  pub fn ping(&self, addr: std::net::SocketAddr) -> Result<Pending, Error> {
    let (pending, callback) = Pending::new();
    let ping = Message::new(Type::Con, croak_msg::Code::EMPTY, Id(0), Token::default());
    self.send_message(Addrd(ping, addr), callback)?;
    Ok(pending)
  }

  /// Process one inbound datagram
  pub fn handle_inbound(&self, dgram: Addrd<&[u8]>) -> Result<(), Error> {
    self.check_running()?;
    let now = self.now()?;
    let addr = dgram.addr();

    let msg = match Message::try_from_bytes(dgram.data()) {
      | Ok(msg) => msg,
      | Err(e) => {
        log::warn!("dropping malformed datagram from {}: {}", addr, e);
        if let Some((Type::Con, id)) = Message::peek_header(dgram.data()) {
          let reset = Message::new(Type::Reset, croak_msg::Code::EMPTY, id, Token::default());
          self.send_raw(Addrd(&reset, addr)).ok();
        }
        return Err(Error::Malformed { bytes: dgram.data().to_vec(),
                                      cause: Some(e) });
      },
    };

    log::trace!("<- {} {}", addr, msg_summary(&msg));

    match (msg.ty, msg.code.kind()) {
      | (Type::Con, CodeKind::Empty | CodeKind::Unrecognized) => {
        log::debug!("answering ping from {}", addr);
        self.send_raw(Addrd(&msg.reset(), addr))
      },
      | (Type::Ack | Type::Reset, _) => self.on_ack_or_reset(Addrd(msg, addr), now),
      | (Type::Con | Type::Non, CodeKind::Response) => self.on_separate_response(Addrd(msg, addr), now),
      | (Type::Con | Type::Non, CodeKind::Request) => self.on_request(Addrd(msg, addr), now),
      | _ => {
        log::warn!("dropping {} from {}", msg_summary(&msg), addr);
        if msg.ty == Type::Con {
          self.send_raw(Addrd(&msg.reset(), addr)).ok();
        }
        Err(Error::Malformed { bytes: dgram.data().to_vec(),
                               cause: None })
      },
    }
  }

  fn on_ack_or_reset(&self, msg: Addrd<Message>, now: u64) -> Result<(), Error> {
    let id = TransactionId::Mid(msg.data().id, msg.addr());
    let t = match self.transactions.remove_and_lock(id) {
      | Some(t) => t,
      | None => {
        log::debug!("ignoring {} from {} matching no transaction",
                    msg_summary(msg.data()),
                    msg.addr());
        return Ok(());
      },
    };

    let mut release = None;
    let mut complete = None;

    match (msg.data().ty, msg.data().code.kind()) {
      | (Type::Reset, _) if t.msg.data().is_empty() => complete = Some((t, Outcome::Response(msg))),
      | (Type::Reset, _) => complete = Some((t, Outcome::Failed(Error::Reset))),
      | (Type::Ack, CodeKind::Empty) if t.expects_response() => self.transactions.add_delayed(t, now),
      | (Type::Ack, CodeKind::Empty) => complete = Some((t, Outcome::Sent)),
      | (Type::Ack, CodeKind::Response) if t.expects_response() => release = self.on_response(t, msg, now),
      | (Type::Ack, _) => {
        log::warn!("unexpected {} acknowledging {:?}", msg_summary(msg.data()), t.id);
        complete = Some((t, Outcome::Failed(Error::Malformed { bytes: Vec::new(),
                                                               cause: None })));
      },
      | _ => unreachable!("on_ack_or_reset is only invoked with ACK or Reset"),
    }

    let next = self.transactions.unlock_or_remove(id, now);
    if let Some((t, outcome)) = complete {
      t.complete(outcome);
    }
    self.transmit(release, now);
    self.transmit(next, now);
    Ok(())
  }

  /// Feed a response into the transaction's block-wise transfer, either
  /// completing it or queueing the next block request (which is then
  /// yielded if it can be sent immediately)
  fn on_response(&self, mut t: Transaction, resp: Addrd<Message>, now: u64) -> Option<Addrd<Message>> {
    let addr = resp.addr();
    let transfer = match t.transfer.take() {
      | Some(tr) => tr,
      | None => {
        t.complete(Outcome::Response(resp));
        return None;
      },
    };

    match transfer.on_response(resp.unwrap(), &self.config.block) {
      | (Step::Done(resp), _) => {
        t.complete(Outcome::Response(Addrd(resp, addr)));
        None
      },
      | (Step::Fail(e), _) => {
        t.complete(Outcome::Failed(e));
        None
      },
      | (Step::Send(next), Some(transfer)) => {
        let next = Message { id: self.ids.next(),
                             ty: t.msg.data().ty,
                             ..next };
        let t = t.continue_with(next, transfer, false);

        match t.msg.data().ty {
          | Type::Con => match self.transactions.add(t, true, now) {
            | Ok(send) => send,
            | Err(e) => {
              log::error!("could not queue block continuation: {}", e);
              None
            },
          },
          | _ => {
            let msg = t.msg.clone();
            self.transactions.add_delayed(t, now);
            Some(msg)
          },
        }
      },
      | (Step::Send(_), None) => unreachable!("a transfer that continues is handed back"),
    }
  }

  fn on_separate_response(&self, msg: Addrd<Message>, now: u64) -> Result<(), Error> {
    let addr = msg.addr();
    let key = Addrd(msg.data().id, addr);

    match self.dedup.check(key, now) {
      | Seen::New => (),
      | seen => return self.on_duplicate(msg.as_ref(), seen),
    }

    let ack = Message::empty_ack_for(msg.data());
    let token = msg.data().token;

    let t = self.transactions
                .take_delayed(token, addr)
                .or_else(|| self.transactions.take_active_by_token(token, addr));

    let t = match t {
      | Some(t) => t,
      | None if msg.data().opts.observe().is_some() => {
        log::debug!("notification from {} for an exchange that already completed", addr);
        if msg.data().ty == Type::Con {
          self.dedup.put_response(key, ack.clone(), now);
          self.send_raw(Addrd(&ack, addr))?;
        }
        return Ok(());
      },
      | None => {
        log::debug!("rejecting response from {} matching no request", addr);
        let reset = msg.data().reset();
        self.dedup.put_response(key, reset.clone(), now);
        return self.send_raw(Addrd(&reset, addr));
      },
    };

    if msg.data().ty == Type::Con {
      self.dedup.put_response(key, ack.clone(), now);
      self.send_raw(Addrd(&ack, addr))?;
    }

    let id = t.id;
    let release = self.on_response(t, msg, now);
    let next = self.transactions.unlock_or_remove(id, now);
    self.transmit(release, now);
    self.transmit(next, now);
    Ok(())
  }

  fn on_request(&self, req: Addrd<Message>, now: u64) -> Result<(), Error> {
    let addr = req.addr();
    let key = Addrd(req.data().id, addr);

    match self.dedup.check(key, now) {
      | Seen::New => (),
      | seen => return self.on_duplicate(req.as_ref(), seen),
    }

    let (ty, id, token) = (req.data().ty, req.data().id, req.data().token);
    let resp = serve(&self.handler, &self.uploads, req, self.params, false, now);
    let resp = match ty {
      | Type::Con => Message { ty: Type::Ack,
                               id,
                               token,
                               ..resp },
      | _ => Message { ty: Type::Non,
                       id: self.ids.next(),
                       token,
                       ..resp },
    };

    self.dedup.put_response(key, resp.clone(), now);
    self.send_raw(Addrd(&resp, addr))
  }

  fn on_duplicate(&self, msg: Addrd<&Message>, seen: Seen) -> Result<(), Error> {
    log::debug!("duplicate {:?} from {}", msg.data().id, msg.addr());
    if let Some(hook) = &self.on_duplicate {
      hook(msg);
    }

    match seen {
      | Seen::Duplicate(Some(resp)) => self.send_raw(Addrd(&resp, msg.addr())),
      | _ => Ok(()),
    }
  }

  /// Retransmit confirmable messages whose ACK is overdue and fail
  /// the transactions that ran out of attempts (or whose delayed
  /// response never came) with [`Error::Timeout`].
  ///
  /// Call every [`Config::sweep_interval`].
  pub fn resend_timeouts(&self) -> Result<(), Error> {
    self.check_running()?;
    let now = self.now()?;
    let sweep = self.transactions.sweep(now);

    sweep.resend
         .into_iter()
         .chain(sweep.send)
         .for_each(|msg| self.transmit(Some(msg), now));

    sweep.expired
         .into_iter()
         .for_each(|t| t.complete(Outcome::Failed(Error::Timeout)));

    self.uploads.prune(now);
    Ok(())
  }

  /// Forget expired message ids, yielding how many were removed.
  ///
  /// Call every [`Dedup::clean_interval`](crate::config::Dedup::clean_interval).
  pub fn clean_duplicates(&self) -> Result<usize, Error> {
    let now = self.now()?;
    Ok(self.dedup.clean(now))
  }

  /// Fail every pending transaction with [`Error::Stopped`], forget
  /// all per-peer state and refuse further work
  pub fn stop(&self) {
    self.stopped.store(true, Ordering::SeqCst);
    self.transactions
        .drain()
        .into_iter()
        .for_each(|t| t.complete(Outcome::Failed(Error::Stopped)));
    self.dedup.clear();
    self.uploads.clear();
  }
}

fn t_id(msg: &Addrd<Message>) -> TransactionId {
  TransactionId::of(msg.as_ref(), false)
}
