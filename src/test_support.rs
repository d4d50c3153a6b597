//! Shared test-only harness helpers, used by the `#[cfg(test)]` modules
//! throughout the crate instead of each one hand-rolling its own socket
//! setup.

#![cfg(test)]

use std::net::TcpListener;

use tokio::io::{duplex, DuplexStream};

/// Binds an ephemeral port on `127.0.0.1`, reads back the OS-assigned
/// port number, and drops the listener immediately so the caller can
/// bind or connect to it next.
pub fn random_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind ephemeral port");
    listener
        .local_addr()
        .expect("bound listener has a local address")
        .port()
}

/// An in-process duplex pair standing in for a live SMTP connection:
/// `client` is handed to the code under test, `server` is driven by
/// hand in the test body to script replies.
pub fn mock_smtp_pair(buffer: usize) -> (DuplexStream, DuplexStream) {
    duplex(buffer)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn random_port_is_nonzero() {
        assert_ne!(random_port(), 0);
    }

    #[tokio::test]
    async fn mock_smtp_pair_round_trips_bytes() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (mut client, mut server) = mock_smtp_pair(64);
        client.write_all(b"EHLO\r\n").await.unwrap();
        let mut buf = [0u8; 6];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"EHLO\r\n");
    }
}
