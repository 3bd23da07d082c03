use std::net::{SocketAddr, UdpSocket};

/// Data that came from (or is going to) a network peer
#[derive(PartialEq, PartialOrd, Eq, Ord, Hash, Debug, Clone, Copy)]
pub struct Addrd<T>(pub T, pub SocketAddr);

impl<T> Addrd<T> {
  /// Borrow the contents of this Addressed
  pub fn as_ref(&self) -> Addrd<&T> {
    Addrd(self.data(), self.addr())
  }

  /// Discard the socket and get the data in this Addressed
  pub fn unwrap(self) -> T {
    self.0
  }

  /// Map the data contained in this Addressed
  pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Addrd<R> {
    Addrd(f(self.0), self.1)
  }

  /// Borrow the contents of the addressed item
  pub fn data(&self) -> &T {
    &self.0
  }

  /// Copy the socket address for the data
  pub fn addr(&self) -> SocketAddr {
    self.1
  }
}

/// The outbound half of a network connector.
///
/// Receiving is left to the embedding application, which hands
/// inbound bytes to the messaging layer; on stream transports it also
/// reports connects and disconnects.
pub trait Transport: Send + Sync {
  /// The error yielded by sends
  type Error: core::fmt::Debug;

  /// Send `bytes` to the address they are tagged with.
  ///
  /// Datagram transports send one datagram, stream transports
  /// write one frame to the connection to that peer.
  fn send(&self, bytes: Addrd<&[u8]>) -> Result<(), Self::Error>;
}

impl Transport for UdpSocket {
  type Error = std::io::Error;

  fn send(&self, bytes: Addrd<&[u8]>) -> Result<(), Self::Error> {
    self.send_to(bytes.data(), bytes.addr()).map(|_| ())
  }
}

impl<T: Transport> Transport for std::sync::Arc<T> {
  type Error = T::Error;

  fn send(&self, bytes: Addrd<&[u8]>) -> Result<(), Self::Error> {
    T::send(self, bytes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn udp_socket_sends_datagrams() {
    let a = UdpSocket::bind("127.0.0.1:0").unwrap();
    let b = UdpSocket::bind("127.0.0.1:0").unwrap();

    Transport::send(&a, Addrd(&[1u8, 2, 3][..], b.local_addr().unwrap())).unwrap();

    let mut buf = [0u8; 8];
    let (n, from) = b.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], &[1, 2, 3]);
    assert_eq!(from, a.local_addr().unwrap());
  }

  #[test]
  fn addrd_map() {
    let addr: SocketAddr = "127.0.0.1:5683".parse().unwrap();
    let a = Addrd(2u8, addr).map(|n| n * 2);
    assert_eq!(a, Addrd(4, addr));
  }
}
