use croak_msg::*;

#[test]
fn coap_lite_reads_our_datagrams() {
  let msg = Message::new(Type::Con, code::CONTENT, Id(4321), Token::from_slice(&[1, 2, 3]).unwrap())
    .with_opts(OptionSet::new().with_content_format(ContentFormat::TEXT)
                               .with_max_age(30)
                               .with_etag(b"v1"))
    .with_payload("hello");

  let bytes = msg.try_into_bytes().unwrap();
  let packet = coap_lite::Packet::from_bytes(&bytes).unwrap();

  assert_eq!(packet.header.message_id, 4321);
  assert_eq!(packet.payload, b"hello".to_vec());
}

#[test]
fn we_read_coap_lite_datagrams() {
  let mut packet = coap_lite::Packet::new();
  packet.header.message_id = 77;
  packet.payload = vec![0xAB; 300];

  let bytes = packet.to_bytes().unwrap();
  let msg = Message::try_from_bytes(&bytes).unwrap();

  assert_eq!(msg.id, Id(77));
  assert_eq!(msg.payload.as_bytes(), &[0xAB; 300][..]);
}

#[test]
fn long_options_survive_both_ways() {
  let path = "a".repeat(300);
  let msg = Message::new(Type::Non, Code::PUT, Id(9), Token::default())
    .with_opts(OptionSet::new().with_path(&path).insert(OptNumber(2000), &b"x"[..]))
    .with_payload(vec![1, 2, 3]);

  let bytes = msg.clone().try_into_bytes().unwrap();
  let packet = coap_lite::Packet::from_bytes(&bytes).unwrap();
  assert_eq!(packet.header.message_id, 9);
  assert_eq!(packet.payload, vec![1, 2, 3]);

  let ours = Message::try_from_bytes(packet.to_bytes().unwrap()).unwrap();
  assert_eq!(ours.opts.path(), path);
  assert_eq!(ours.payload, msg.payload);
}
