use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use croak_msg::*;

#[derive(Debug, PartialEq, PartialOrd, Ord, Eq)]
struct TestInput {
  tkl: u8,
  n_opts: u32,
  opt_size: usize,
  payload_size: usize,
}

impl TestInput {
  fn message(&self) -> Message {
    let token = Token::from_slice(&vec![1u8; self.tkl as usize]).unwrap_or_default();

    // elective, unknown, spaced out so deltas need extended bytes now and then
    let opts = (0..self.n_opts).map(|n| (OptNumber(2 + n * 20), OptValue(vec![1; self.opt_size])))
                               .collect::<OptionSet>();

    Message::new(Type::Non, code::CONTENT, Id(1), token).with_opts(opts)
                                                         .with_payload(vec![1u8; self.payload_size])
  }

  fn bytes(&self) -> Vec<u8> {
    self.message().try_into_bytes().unwrap()
  }

  fn coap_lite_packet(&self) -> coap_lite::Packet {
    coap_lite::Packet::from_bytes(&self.bytes()).unwrap()
  }
}

fn inputs() -> Vec<TestInput> {
  [(0, 0, 0, 0),
   (4, 4, 8, 16),
   (4, 8, 32, 16),
   (8, 8, 64, 128),
   (8, 16, 64, 1024),
   (8, 32, 512, 4096)].into_iter()
                      .map(|(tkl, n_opts, opt_size, payload_size)| TestInput { tkl,
                                                                              n_opts,
                                                                              opt_size,
                                                                              payload_size })
                      .collect()
}

fn message_to_bytes(c: &mut Criterion) {
  let mut group = c.benchmark_group("msg/to_bytes");
  group.measurement_time(std::time::Duration::from_secs(5));

  for inp in inputs().iter() {
    let size = inp.bytes().len();

    group.bench_with_input(BenchmarkId::new("croak_msg/udp/size", size), inp, |b, inp| {
           b.iter_batched(|| inp.message(),
                          |m| m.try_into_bytes().unwrap(),
                          BatchSize::SmallInput)
         });

    group.bench_with_input(BenchmarkId::new("croak_msg/tcp/size", size), inp, |b, inp| {
           b.iter_batched(|| inp.message(),
                          |m| tcp::encode(&m).unwrap(),
                          BatchSize::SmallInput)
         });

    let cl_packet = inp.coap_lite_packet();
    group.bench_with_input(BenchmarkId::new("coap_lite/size", size),
                           &cl_packet,
                           |b, inp| b.iter(|| inp.to_bytes()));
  }
  group.finish();
}

fn message_from_bytes(c: &mut Criterion) {
  let mut group = c.benchmark_group("msg/from_bytes");
  group.measurement_time(std::time::Duration::from_secs(5));

  for inp in inputs().iter() {
    let bytes = inp.bytes();
    let frame = tcp::encode(&inp.message()).unwrap();

    group.bench_with_input(BenchmarkId::new("croak_msg/udp/size", bytes.len()),
                           &bytes,
                           |b, bytes| b.iter(|| Message::try_from_bytes(bytes).unwrap()));

    group.bench_with_input(BenchmarkId::new("croak_msg/tcp/size", bytes.len()),
                           &frame,
                           |b, frame| b.iter(|| tcp::decode(frame).unwrap()));

    group.bench_with_input(BenchmarkId::new("coap_lite/size", bytes.len()),
                           &bytes,
                           |b, bytes| b.iter(|| coap_lite::Packet::from_bytes(bytes).unwrap()));
  }
  group.finish();
}

criterion_group!(benches, message_to_bytes, message_from_bytes);
criterion_main!(benches);
