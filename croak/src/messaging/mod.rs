//! Glue between a transport, the codec, the transaction manager,
//! duplicate detection and block-wise transfers.
//!
//! [`udp::UdpMessaging`] speaks RFC 7252 over datagrams,
//! [`tcp::TcpMessaging`] speaks RFC 8323 over streams.
//! Both are driven by the embedding application: it hands them inbound
//! bytes and calls `resend_timeouts` every [`Config::sweep_interval`](crate::config::Config::sweep_interval).

use core::convert::Infallible;
use core::fmt;
use std::sync::mpsc;

use croak_msg::{code, Code, Id, Message, Token, Type};

use crate::block::inbound::{self, Assembled, Uploads};
use crate::block::BlockParams;
use crate::error::Error;
use crate::net::Addrd;

/// Datagram transport
pub mod udp;

/// Stream transport
pub mod tcp;

/// How an outbound exchange ended.
///
/// Delivered exactly once per exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
  /// The message was acknowledged, or (when not confirmable) handed to the transport
  Sent,
  /// The response to a request (reassembled, if it came in blocks).
  ///
  /// Also delivered for a ping: the Reset or Pong that answered it.
  Response(Addrd<Message>),
  /// The exchange failed
  Failed(Error),
}

/// Invoked with the [`Outcome`] of an exchange
pub type Callback = Box<dyn FnOnce(Outcome) + Send + Sync>;

/// Handle to the [`Outcome`] of an exchange started with a channel-backed callback
///
/// ```
/// use croak::messaging::{Outcome, Pending};
///
/// let (pending, callback) = Pending::new();
/// assert_eq!(pending.poll(), Err(nb::Error::WouldBlock));
///
/// callback(Outcome::Sent);
/// assert_eq!(pending.poll(), Ok(Outcome::Sent));
/// ```
#[derive(Debug)]
pub struct Pending(mpsc::Receiver<Outcome>);

impl Pending {
  /// A handle and the callback that completes it
  pub fn new() -> (Self, Callback) {
    let (tx, rx) = mpsc::channel();
    let callback = move |o: Outcome| {
      // the handle may have been dropped; nobody is waiting then
      tx.send(o).ok();
    };
    (Self(rx), Box::new(callback))
  }

  /// Check for the outcome without blocking.
  ///
  /// Yields [`Outcome::Failed`]`(`[`Error::Stopped`]`)` if the
  /// callback was dropped without being invoked.
  pub fn poll(&self) -> nb::Result<Outcome, Infallible> {
    match self.0.try_recv() {
      | Ok(o) => Ok(o),
      | Err(mpsc::TryRecvError::Empty) => Err(nb::Error::WouldBlock),
      | Err(mpsc::TryRecvError::Disconnected) => Ok(Outcome::Failed(Error::Stopped)),
    }
  }

  /// Block until the outcome arrives
  pub fn wait(self) -> Outcome {
    self.0.recv().unwrap_or(Outcome::Failed(Error::Stopped))
  }
}

/// A request that could not be handled, turned into an error response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
  /// Response code (4.xx or 5.xx)
  pub code: Code,
  /// Diagnostic payload
  pub reason: Option<String>,
}

impl HandlerError {
  /// 4.04 Not Found
  pub fn not_found() -> Self {
    Self { code: code::NOT_FOUND,
           reason: None }
  }

  /// 4.00 Bad Request
  pub fn bad_request(reason: impl ToString) -> Self {
    Self { code: code::BAD_REQUEST,
           reason: Some(reason.to_string()) }
  }

  /// 5.00 Internal Server Error
  pub fn internal(reason: impl ToString) -> Self {
    Self { code: code::INTERNAL_SERVER_ERROR,
           reason: Some(reason.to_string()) }
  }

  fn into_response(self) -> Message {
    let resp = response(self.code);
    match self.reason {
      | Some(r) => resp.with_payload(r.as_str()),
      | None => resp,
    }
  }
}

impl fmt::Display for HandlerError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.reason {
      | Some(r) => write!(f, "{}: {}", self.code, r),
      | None => write!(f, "{}", self.code),
    }
  }
}

/// A response skeleton with `code`.
///
/// Type, message id and token are filled in when it is sent.
///
/// ```
/// use croak::messaging::response;
/// use croak_msg::code;
///
/// let resp = response(code::CONTENT).with_payload("hello");
/// assert_eq!(resp.code, code::CONTENT);
/// ```
pub fn response(code: Code) -> Message {
  Message::new(Type::Ack, code, Id(0), Token::default())
}

/// Answers inbound requests.
///
/// The request is whole (block-wise uploads are reassembled first),
/// and the response is sliced into blocks afterwards if necessary;
/// a handler never sees Block1 or Block2 options it has to act on.
///
/// Closures of the right shape are handlers:
/// ```
/// use croak::messaging::{response, HandlerError, RequestHandler};
/// use croak::net::Addrd;
/// use croak_msg::{code, Message};
///
/// fn takes_handler(_: impl RequestHandler) {}
///
/// takes_handler(|req: Addrd<&Message>| match req.data().opts.path().as_str() {
///                 | "hello" => Ok(response(code::CONTENT).with_payload("hello")),
///                 | _ => Err(HandlerError::not_found()),
///               });
/// ```
pub trait RequestHandler: Send + Sync {
  /// Produce the response to `req` (see [`response`])
  fn handle(&self, req: Addrd<&Message>) -> Result<Message, HandlerError>;
}

impl<F> RequestHandler for F where F: Fn(Addrd<&Message>) -> Result<Message, HandlerError> + Send + Sync
{
  fn handle(&self, req: Addrd<&Message>) -> Result<Message, HandlerError> {
    self(req)
  }
}

/// Handler for endpoints that only act as clients: answers every request with 4.04
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

impl RequestHandler for NotFound {
  fn handle(&self, _: Addrd<&Message>) -> Result<Message, HandlerError> {
    Err(HandlerError::not_found())
  }
}

/// Run a request through critical option checks, Block1 reassembly,
/// the handler and Block2 slicing, yielding the response skeleton
/// (type, id and token still to be set).
pub(crate) fn serve<H: RequestHandler>(handler: &H,
                                       uploads: &Uploads,
                                       req: Addrd<Message>,
                                       params: Option<BlockParams>,
                                       bert: bool,
                                       now: u64)
                                       -> Message {
  if let Some(n) = req.data().unrecognized_critical() {
    log::debug!("rejecting request from {} with unrecognized critical option {}",
                req.addr(),
                n.0);
    return response(code::BAD_OPTION).with_payload(format!("unrecognized option {}", n.0).as_str());
  }

  let addr = req.addr();
  match uploads.on_request(req, params, bert, now) {
    | Assembled::Reply(resp) => resp,
    | Assembled::Complete { request, block1 } => {
      let resp = handler.handle(Addrd(&request, addr))
                        .unwrap_or_else(HandlerError::into_response);
      let resp = match block1 {
        | Some(b) => resp.map_opts(|o| o.with_block1(b.with_more(false))),
        | None => resp,
      };
      inbound::slice_response(&request, resp, params, bert)
    },
  }
}

#[cfg(test)]
mod tests {
  use croak_msg::{OptNumber, OptionSet};

  use super::*;
  use crate::config::BlockWise;
  use crate::test::addr;

  fn hello(req: Addrd<&Message>) -> Result<Message, HandlerError> {
    match req.data().opts.path().as_str() {
      | "hello" => Ok(response(code::CONTENT).with_payload("hello")),
      | _ => Err(HandlerError::not_found()),
    }
  }

  fn get(path: &str) -> Addrd<Message> {
    Addrd(Message::new(Type::Con, Code::GET, Id(1), Token::default()).with_opts(OptionSet::new().with_path(path)),
          addr(1))
  }

  #[test]
  fn serve_calls_handler() {
    let uploads = Uploads::new(BlockWise::default());

    let ok = serve(&hello, &uploads, get("hello"), None, false, 0);
    assert_eq!(ok.code, code::CONTENT);
    assert_eq!(ok.payload.as_bytes(), b"hello");

    let missing = serve(&hello, &uploads, get("nope"), None, false, 0);
    assert_eq!(missing.code, code::NOT_FOUND);
  }

  #[test]
  fn critical_option_never_reaches_handler() {
    let uploads = Uploads::new(BlockWise::default());
    let panics = |_: Addrd<&Message>| -> Result<Message, HandlerError> { panic!("handler called") };

    let req = get("hello").map(|m| m.map_opts(|o| o.insert(OptNumber(9), &b"x"[..])));
    assert_eq!(serve(&panics, &uploads, req, None, false, 0).code,
               code::BAD_OPTION);
  }

  #[test]
  fn pending_disconnected_is_stopped() {
    let (pending, callback) = Pending::new();
    drop(callback);
    assert_eq!(pending.wait(), Outcome::Failed(Error::Stopped));
  }
}
