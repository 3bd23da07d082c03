//! `croak` is a CoAP protocol engine: everything between "bytes arrived"
//! and "here is a response" that RFC 7252 (CoAP over UDP), RFC 7959
//! (block-wise transfers) and RFC 8323 (CoAP over TCP, including BERT)
//! ask of an endpoint.
//!
//! - Outbound confirmable messages are queued per peer, retransmitted
//!   with exponential backoff and matched to their ACK, Reset or
//!   separate response ([`transaction`], [`retry`])
//! - Inbound retransmissions are detected and answered with the cached
//!   response ([`dedup`])
//! - Large bodies are split into and reassembled from Block1 / Block2
//!   blocks on both the client and server side ([`block`])
//! - Stream peers exchange Capabilities and Settings Messages, pings
//!   and aborts ([`csm`], [`messaging::tcp`])
//!
//! The codec itself lives in the `croak-msg` crate.
//!
//! ## Driving the engine
//! `croak` does no IO of its own and spawns no threads. The embedding
//! application owns the sockets and the clock:
//!
//! ```
//! use std::net::UdpSocket;
//!
//! use croak::config::Config;
//! use croak::messaging::udp::UdpMessaging;
//! use croak::messaging::{response, HandlerError, Outcome};
//! use croak::net::Addrd;
//! use croak::time::StdClock;
//! use croak_msg::{code, Code, Id, Message, OptionSet, Token, Type};
//!
//! fn hello(req: Addrd<&Message>) -> Result<Message, HandlerError> {
//!   match req.data().opts.path().as_str() {
//!     | "hello" => Ok(response(code::CONTENT).with_payload("hello")),
//!     | _ => Err(HandlerError::not_found()),
//!   }
//! }
//!
//! let server_sock = UdpSocket::bind("127.0.0.1:0").unwrap();
//! let client_sock = UdpSocket::bind("127.0.0.1:0").unwrap();
//! let server_addr = server_sock.local_addr().unwrap();
//!
//! let server = UdpMessaging::new(server_sock.try_clone().unwrap(), StdClock::new(), hello, Config::default()).unwrap();
//! let client = UdpMessaging::new(client_sock.try_clone().unwrap(), StdClock::new(), hello, Config::default()).unwrap();
//!
//! let get = Message::new(Type::Con, Code::GET, Id(0), Token::default()).with_opts(OptionSet::new().with_path("hello"));
//! let pending = client.request(Addrd(get, server_addr)).unwrap();
//!
//! let mut buf = [0u8; 1152];
//! let (n, from) = server_sock.recv_from(&mut buf).unwrap();
//! server.handle_inbound(Addrd(&buf[..n], from)).unwrap();
//!
//! let (n, from) = client_sock.recv_from(&mut buf).unwrap();
//! client.handle_inbound(Addrd(&buf[..n], from)).unwrap();
//!
//! match pending.wait() {
//!   | Outcome::Response(resp) => assert_eq!(resp.data().payload.as_bytes(), b"hello"),
//!   | other => panic!("{:?}", other),
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/croak/0.1.0")]
#![cfg_attr(any(docsrs, feature = "docs"), feature(doc_cfg))]
// -
// deny
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(not(test), deny(unsafe_code))]
// -
// warnings
#![cfg_attr(not(test), warn(unreachable_pub))]


pub(crate) mod logging;
pub(crate) mod shard;

/// Block-wise transfers
pub mod block;

/// Runtime configuration
pub mod config;

/// Capabilities and Settings Messages (stream transports)
pub mod csm;

/// Inbound duplicate detection
pub mod dedup;

/// Datagram and stream messaging engines
pub mod messaging;

/// Network abstractions
pub mod net;

/// Retransmission schedules
pub mod retry;

/// Time abstractions
pub mod time;

/// Outbound transactions
pub mod transaction;

mod error;

#[doc(inline)]
pub use error::{BlockError, Error};
