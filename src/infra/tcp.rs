//! TCP transport for sessions.

use std::io;
use std::net::{IpAddr, Shutdown, TcpStream};

use crate::core::Connection;

impl Connection for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            // The peer may have reset the connection already.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Canonical peer address of a stream.
///
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`, seen on dual-stack
/// listeners) are reported as plain IPv4 so they compare equal to IPv4
/// allow-list entries.
///
/// # Errors
///
/// Propagates the error from `peer_addr`.
pub fn peer_origin(stream: &TcpStream) -> io::Result<IpAddr> {
    Ok(stream.peer_addr()?.ip().to_canonical())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_peer_origin_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (mut server_side, _) = listener.accept().unwrap();

        assert_eq!(peer_origin(&server_side).unwrap(), IpAddr::from([127, 0, 0, 1]));
        server_side.close().unwrap();
        // Closing twice is harmless.
        let _ = server_side.close();
        drop(client);
    }
}
