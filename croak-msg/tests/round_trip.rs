use croak_msg::*;
use itertools::iproduct;

/// Values either side of the 4-bit nibble, 1-byte extension and
/// 2-byte extension thresholds
const BOUNDARIES: [u32; 9] = [0, 12, 13, 14, 255, 256, 268, 269, 1000];

fn value(len: u32) -> Vec<u8> {
  (0..len).map(|n| (n % 256) as u8).collect()
}

fn messages() -> impl Iterator<Item = Message> {
  let payloads: [&[u8]; 3] = [&[], b"x", &[0xAB; 300]];

  iproduct!(0..=8usize, BOUNDARIES, BOUNDARIES, payloads).map(|(tkl, delta, len, payload)| {
    let token = Token::from_slice(&[0x5A; 8][..tkl]).unwrap();
    let opts = OptionSet::new().insert(OptNumber(1), value(len).as_slice())
                               .insert(OptNumber(1 + delta), value(len).as_slice());

    Message::new(Type::Non, code::CONTENT, Id(0xBEEF), token).with_opts(opts)
                                                             .with_payload(payload)
  })
}

#[test]
fn datagram_round_trip() {
  for msg in messages() {
    let bytes = msg.clone().try_into_bytes().unwrap();
    assert_eq!(bytes.len(), msg.wire_size());
    assert_eq!(Message::try_from_bytes(&bytes), Ok(msg));
  }
}

#[test]
fn stream_round_trip() {
  for msg in messages() {
    let bytes = tcp::encode(&msg).unwrap();
    assert_eq!(tcp::frame_len(&bytes), Ok(bytes.len()));

    // frames carry no type or message id
    let expected = Message { ty: Type::Con,
                             id: Id(0),
                             ..msg };
    assert_eq!(tcp::decode(&bytes), Ok((expected, bytes.len())));
  }
}
