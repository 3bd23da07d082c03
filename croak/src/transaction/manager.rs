use core::mem;
use std::net::SocketAddr;

use croak_msg::{Message, Token};

use super::queue::TransactionQueue;
use super::{Transaction, TransactionId};
use crate::config::Transactions;
use crate::error::Error;
use crate::net::Addrd;
use crate::retry::{Attempts, TransmissionTimeout};
use crate::shard::Sharded;
use crate::time::Millis;

/// Work produced by [`TransactionManager::sweep`]
#[derive(Debug, Default)]
pub(crate) struct Sweep {
  /// Retransmissions of active transactions
  pub(crate) resend: Vec<Addrd<Message>>,
  /// Transactions that ran out of attempts, or delayed ones whose
  /// response never came. Each must be failed with [`Error::Timeout`].
  pub(crate) expired: Vec<Transaction>,
  /// Queued transactions that became active because the one
  /// before them expired
  pub(crate) send: Vec<Addrd<Message>>,
}

/// Owns every outbound transaction: one queue per address,
/// plus the delayed set keyed by (token, address).
///
/// None of the methods invoke callbacks; transactions leaving the
/// manager are handed back to the caller, which completes them once
/// no shard is held.
#[derive(Debug)]
pub(crate) struct TransactionManager {
  queues: Sharded<SocketAddr, TransactionQueue>,
  delayed: Sharded<(Token, SocketAddr), Transaction>,
  max_queue_size: usize,
  delayed_timeout: u64,
  timeout: Box<dyn TransmissionTimeout>,
}

impl TransactionManager {
  pub(crate) fn new(config: &Transactions, timeout: Box<dyn TransmissionTimeout>) -> Self {
    Self { queues: Sharded::default(),
           delayed: Sharded::default(),
           max_queue_size: config.max_queue_size,
           delayed_timeout: config.delayed_transaction_timeout.0,
           timeout }
  }

  fn delay(&self, t: &Transaction) -> Option<Millis> {
    match t.is_multicast() {
      | true => self.timeout.multicast_timeout(t.attempts),
      | false => self.timeout.timeout(t.attempts),
    }
  }

  /// Count a transmission of `t` and schedule its timeout
  fn transmit(&self, t: &mut Transaction, now: u64) -> Option<Addrd<Message>> {
    t.attempts = Attempts(t.attempts.0 + 1);
    let delay = self.delay(t)?;
    t.timeout_at = Some(now + delay.0);
    Some(t.msg.clone())
  }

  fn activate_head(&self, q: &mut TransactionQueue, now: u64) -> Option<Addrd<Message>> {
    if !q.head_waiting() {
      return None;
    }

    let t = q.head_mut()?;
    match self.transmit(t, now) {
      | Some(msg) => {
        log::debug!("sending {:?} (attempt {})", t.id, t.attempts.0);
        Some(msg)
      },
      | None => {
        // no attempts allowed at all; expire on the next sweep
        t.timeout_at = Some(now);
        None
      },
    }
  }

  /// Queue `t`, yielding the message to send now if it went straight to the head
  pub(crate) fn add(&self, t: Transaction, force: bool, now: u64) -> Result<Option<Addrd<Message>>, Error> {
    let addr = t.msg.addr();
    self.queues.update(addr, |q| {
                 match q.unwrap_or_default().add(t, force, self.max_queue_size) {
                   | Ok(mut q) => {
                     let send = self.activate_head(&mut q, now);
                     (Some(q), Ok(send))
                   },
                   | Err((q, t)) => {
                     log::warn!("{} transactions queued for {}, rejecting {:?}", q.len(), addr, t.id);
                     (Some(q).filter(|q| !q.is_empty()), Err(Error::TooManyRequestsForEndpoint))
                   },
                 }
               })
  }

  /// Remove `id` from its queue while its response is processed.
  ///
  /// Nothing else is sent to that address until [`unlock_or_remove`](Self::unlock_or_remove).
  pub(crate) fn remove_and_lock(&self, id: TransactionId) -> Option<Transaction> {
    self.queues.update(id.addr(), |q| match q {
                 | Some(q) => {
                   let (q, t) = q.remove_and_lock(id);
                   (Some(q).filter(|q| !q.is_empty()), t)
                 },
                 | None => (None, None),
               })
  }

  /// Unlock (or drop) `id`, yielding the next message to send to that address
  pub(crate) fn unlock_or_remove(&self, id: TransactionId, now: u64) -> Option<Addrd<Message>> {
    self.queues
        .update(id.addr(), |q| match q.and_then(|q| q.unlock_or_remove(id)) {
          | Some(mut q) => {
            let send = self.activate_head(&mut q, now);
            (Some(q), send)
          },
          | None => (None, None),
        })
  }

  /// Drop `id` without locking (e.g. its transmission failed),
  /// yielding it and the next message to send to that address
  pub(crate) fn remove(&self, id: TransactionId, now: u64) -> (Option<Transaction>, Option<Addrd<Message>>) {
    if let TransactionId::Token(token, addr) = id {
      if let Some(t) = self.delayed.remove(&(token, addr)) {
        return (Some(t), None);
      }
    }

    self.queues.update(id.addr(), |q| match q {
                 | Some(q) => {
                   let (mut q, t) = q.remove(id);
                   let send = self.activate_head(&mut q, now);
                   (Some(q).filter(|q| !q.is_empty()), (t, send))
                 },
                 | None => (None, (None, None)),
               })
  }

  /// Remove and lock the active transaction to `addr` awaiting a
  /// response with `token` (a separate response that overtook its ACK)
  pub(crate) fn take_active_by_token(&self, token: Token, addr: SocketAddr) -> Option<Transaction> {
    self.queues.update(addr, |q| match q {
                 | Some(q) => {
                   let (q, t) = q.take_active_by_token(token);
                   (Some(q).filter(|q| !q.is_empty()), t)
                 },
                 | None => (None, None),
               })
  }

  /// Track `t` by token until a response arrives or the delayed timeout passes
  pub(crate) fn add_delayed(&self, t: Transaction, now: u64) {
    let mut t = t.into_delayed();
    t.timeout_at = Some(now + self.delayed_timeout);
    log::debug!("{:?} awaiting a separate response", t.id);
    self.delayed.insert((t.token(), t.msg.addr()), t);
  }

  pub(crate) fn take_delayed(&self, token: Token, addr: SocketAddr) -> Option<Transaction> {
    self.delayed.remove(&(token, addr))
  }

  /// Retransmit or expire every transaction whose timeout has passed
  pub(crate) fn sweep(&self, now: u64) -> Sweep {
    let mut sweep = Sweep::default();

    self.queues.for_each_shard(|map| {
                 map.values_mut().for_each(|q| {
                                   let owned = mem::take(q);
                                   *q = self.sweep_queue(owned, now, &mut sweep);
                                 });
                 map.retain(|_, q| !q.is_empty());
               });

    let expired = self.delayed
                      .drain_where(|_, t| t.timeout_at.map(|at| at <= now).unwrap_or(true));
    sweep.expired.extend(expired.into_iter().map(|(_, t)| t));

    sweep
  }

  fn sweep_queue(&self, mut q: TransactionQueue, now: u64, sweep: &mut Sweep) -> TransactionQueue {
    let due = matches!(q.head_mut(), Some(t) if t.timeout_at.map(|at| at <= now).unwrap_or(false));
    if !due {
      return q;
    }

    match q.head_mut().and_then(|t| self.transmit(t, now)) {
      | Some(msg) => {
        sweep.resend.push(msg);
        q
      },
      | None => {
        let (mut q, t) = q.pop_active();
        if let Some(t) = t {
          log::warn!("{:?} timed out after {} attempts", t.id, t.attempts.0 - 1);
          sweep.expired.push(t);
        }
        sweep.send.extend(self.activate_head(&mut q, now));
        q
      },
    }
  }

  /// Remove every transaction to `addr`
  pub(crate) fn remove_peer(&self, addr: SocketAddr) -> Vec<Transaction> {
    let mut out = self.queues
                      .remove(&addr)
                      .map(TransactionQueue::drain)
                      .unwrap_or_default();
    out.extend(self.delayed
                   .drain_where(|(_, a), _| *a == addr)
                   .into_iter()
                   .map(|(_, t)| t));
    out
  }

  /// Remove every transaction
  pub(crate) fn drain(&self) -> Vec<Transaction> {
    let mut out = self.queues
                      .drain_where(|_, _| true)
                      .into_iter()
                      .flat_map(|(_, q)| q.drain())
                      .collect::<Vec<_>>();
    out.extend(self.delayed
                   .drain_where(|_, _| true)
                   .into_iter()
                   .map(|(_, t)| t));
    out
  }

  /// Number of queued, active and delayed transactions
  pub(crate) fn len(&self) -> usize {
    let mut queued = 0;
    self.queues
        .for_each_shard(|map| queued += map.values().map(TransactionQueue::len).sum::<usize>());
    queued + self.delayed.len()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use croak_msg::{Code, Id, Type};
  use embedded_time::duration::Milliseconds;

  use super::*;
  use crate::block::outbound::Transfer;
  use crate::messaging::Outcome;
  use crate::retry::{Strategy, StrategyTimeout};
  use crate::test::addr;
  use crate::transaction::Priority;

  fn manager(max_attempts: u16) -> TransactionManager {
    let config = Transactions { strategy: Strategy::Exponential { init_min: Milliseconds(1_000),
                                                                  init_max: Milliseconds(1_000) },
                                max_attempts: Attempts(max_attempts),
                                ..Transactions::default() };
    TransactionManager::new(&config, Box::new(StrategyTimeout::new(&config, 0)))
  }

  fn request(n: u16, outcomes: &Arc<Mutex<Vec<Outcome>>>) -> Transaction {
    let msg = Message::new(Type::Con, Code::GET, Id(n), Token::from_slice(&n.to_be_bytes()).unwrap());
    let (_, transfer) = Transfer::start(msg.clone(), None);
    let outcomes = outcomes.clone();
    Transaction::new(TransactionId::Mid(Id(n), addr(1)),
                     Addrd(msg, addr(1)),
                     Priority::Normal,
                     Some(transfer),
                     Box::new(move |o| outcomes.lock().unwrap().push(o)))
  }

  #[test]
  fn one_in_flight_per_address() {
    let m = manager(5);
    let outcomes = Arc::new(Mutex::new(vec![]));

    let first = m.add(request(1, &outcomes), false, 0).unwrap();
    assert_eq!(first.map(|a| a.data().id), Some(Id(1)));
    assert_eq!(m.add(request(2, &outcomes), false, 0).unwrap(), None);
    assert_eq!(m.len(), 2);

    let id = TransactionId::Mid(Id(1), addr(1));
    let done = m.remove_and_lock(id).unwrap();
    done.complete(Outcome::Sent);

    let next = m.unlock_or_remove(id, 10);
    assert_eq!(next.map(|a| a.data().id), Some(Id(2)));
    assert_eq!(outcomes.lock().unwrap().len(), 1);
  }

  #[test]
  fn retransmits_then_times_out_once() {
    let m = manager(3);
    let outcomes = Arc::new(Mutex::new(vec![]));
    m.add(request(1, &outcomes), false, 0).unwrap();
    m.add(request(2, &outcomes), false, 0).unwrap();

    assert_eq!(m.sweep(999).resend.len(), 0);
    assert_eq!(m.sweep(1_000).resend.len(), 1);
    // 1000 + 2000
    assert_eq!(m.sweep(2_999).resend.len(), 0);
    assert_eq!(m.sweep(3_000).resend.len(), 1);

    // 3000 + 4000
    let sweep = m.sweep(7_000);
    assert!(sweep.resend.is_empty());
    assert_eq!(sweep.expired.len(), 1);
    assert_eq!(sweep.send.iter().map(|a| a.data().id).collect::<Vec<_>>(), vec![Id(2)]);
    sweep.expired
         .into_iter()
         .for_each(|t| t.complete(Outcome::Failed(Error::Timeout)));

    let later = m.sweep(7_500);
    assert!(later.expired.is_empty());
    assert_eq!(outcomes.lock().unwrap().as_slice(), &[Outcome::Failed(Error::Timeout)]);
  }

  #[test]
  fn overflow_at_request_101() {
    let m = manager(5);
    let outcomes = Arc::new(Mutex::new(vec![]));

    (0..100).for_each(|n| {
              m.add(request(n, &outcomes), false, 0).unwrap();
            });

    assert_eq!(m.add(request(100, &outcomes), false, 0),
               Err(Error::TooManyRequestsForEndpoint));
    assert_eq!(m.len(), 100);
  }

  #[test]
  fn delayed_by_token() {
    let m = manager(5);
    let outcomes = Arc::new(Mutex::new(vec![]));
    let t = request(1, &outcomes);
    let token = t.token();

    m.add_delayed(t, 0);
    assert!(m.take_delayed(token, addr(2)).is_none());
    assert!(m.take_delayed(token, addr(1)).is_some());

    m.add_delayed(request(2, &outcomes), 0);
    assert!(m.sweep(119_999).expired.is_empty());
    assert_eq!(m.sweep(120_000).expired.len(), 1);
    assert_eq!(m.len(), 0);
  }

  #[test]
  fn separate_response_overtaking_ack() {
    let m = manager(5);
    let outcomes = Arc::new(Mutex::new(vec![]));
    let t = request(1, &outcomes);
    let token = t.token();
    m.add(t, false, 0).unwrap();

    let t = m.take_active_by_token(token, addr(1)).unwrap();
    assert_eq!(m.unlock_or_remove(t.id, 0), None);
    assert_eq!(m.len(), 0);
  }
}
