use croak_msg::Message;

/// One-line description of a message for trace logs,
/// e.g. `Response: Ack 2.05 with 5 byte payload`
pub(crate) fn msg_summary(msg: &Message) -> String {
  format!("{:?}: {:?} {} with {} byte payload",
          msg.code.kind(),
          msg.ty,
          msg.code,
          msg.payload.len())
}

#[cfg(test)]
mod tests {
  use croak_msg::{code, Id, Token, Type};

  use super::*;

  #[test]
  fn summary() {
    let msg = Message::new(Type::Ack, code::CONTENT, Id(1), Token::default()).with_payload("hello");
    assert_eq!(msg_summary(&msg), "Response: Ack 2.05 with 5 byte payload");
  }
}
