use super::{Transaction, TransactionId};

/// Transactions waiting to be sent to one address.
///
/// At most one transaction per address is in flight: the head, once
/// activated. While a response is being processed the finished
/// transaction's id stays *locked* so nothing else is started until
/// [`unlock_or_remove`](TransactionQueue::unlock_or_remove) is called.
///
/// Queues are values: every operation consumes the queue and yields
/// its replacement.
#[derive(Debug, Default)]
pub(crate) struct TransactionQueue {
  items: Vec<Transaction>,
  locked: Option<TransactionId>,
}

impl TransactionQueue {
  /// Enqueue `t` behind everything of equal or higher priority.
  ///
  /// An active head is never displaced. Unless `force`d, a queue already
  /// holding `max` transactions (a locked id counting as one) rejects `t`.
  pub(crate) fn add(mut self, t: Transaction, force: bool, max: usize) -> Result<Self, (Self, Transaction)> {
    let size = self.items.len() + self.locked.map(|_| 1).unwrap_or(0);
    if !force && size >= max {
      return Err((self, t));
    }

    let skip = match self.items.first() {
      | Some(head) if head.is_active() => 1,
      | _ => 0,
    };

    let ix = self.items
                 .iter()
                 .enumerate()
                 .skip(skip)
                 .find(|(_, other)| other.priority > t.priority)
                 .map(|(ix, _)| ix)
                 .unwrap_or(self.items.len());

    self.items.insert(ix, t);
    Ok(self)
  }

  /// Should the head be activated?
  pub(crate) fn head_waiting(&self) -> bool {
    self.locked.is_none() && self.items.first().map(|t| !t.is_active()).unwrap_or(false)
  }

  pub(crate) fn head_mut(&mut self) -> Option<&mut Transaction> {
    self.items.first_mut()
  }

  /// Remove the transaction `id`, locking the queue on it
  pub(crate) fn remove_and_lock(mut self, id: TransactionId) -> (Self, Option<Transaction>) {
    match self.position(id) {
      | Some(ix) => {
        self.locked = Some(id);
        let t = self.items.remove(ix);
        (self, Some(t))
      },
      | None => (self, None),
    }
  }

  /// Release the lock held by `id`, or drop `id` if it is still queued.
  ///
  /// `None` when nothing is left in the queue.
  pub(crate) fn unlock_or_remove(mut self, id: TransactionId) -> Option<Self> {
    if self.locked == Some(id) {
      self.locked = None;
    } else if let Some(ix) = self.position(id) {
      self.items.remove(ix);
    }

    match (self.items.is_empty(), self.locked) {
      | (true, None) => None,
      | _ => Some(self),
    }
  }

  /// Remove the transaction `id` without locking
  pub(crate) fn remove(mut self, id: TransactionId) -> (Self, Option<Transaction>) {
    let t = self.position(id).map(|ix| self.items.remove(ix));
    (self, t)
  }

  /// Remove the active head if it expects a response carrying `token`
  pub(crate) fn take_active_by_token(self, token: croak_msg::Token) -> (Self, Option<Transaction>) {
    let id = match self.items.first() {
      | Some(head) if head.is_active() && head.token() == token && head.expects_response() => head.id,
      | _ => return (self, None),
    };

    self.remove_and_lock(id)
  }

  /// Take the active head, leaving the rest of the queue
  pub(crate) fn pop_active(mut self) -> (Self, Option<Transaction>) {
    match self.items.first() {
      | Some(head) if head.is_active() => {
        let t = self.items.remove(0);
        (self, Some(t))
      },
      | _ => (self, None),
    }
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.items.is_empty() && self.locked.is_none()
  }

  pub(crate) fn len(&self) -> usize {
    self.items.len()
  }

  pub(crate) fn drain(self) -> Vec<Transaction> {
    self.items
  }

  fn position(&self, id: TransactionId) -> Option<usize> {
    self.items.iter().position(|t| t.id == id)
  }
}
