use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use dns_types::protocol::types::{DATAGRAM_MAX_LEN, HEADER_LEN};

/// Size of the receive buffer: one more than the largest datagram we
/// accept, so that anything bigger is seen as too long rather than
/// silently cut down to size.
pub const RECV_BUFFER_LEN: usize = DATAGRAM_MAX_LEN + 1;

/// Wait up to `wait` for a datagram.  `Ok(None)` means nothing
/// arrived in time.
///
/// # Errors
///
/// If the socket reports an error.
pub async fn recv_udp_bytes_from(
    sock: &UdpSocket,
    buf: &mut [u8],
    wait: Duration,
) -> Result<Option<(usize, SocketAddr)>, io::Error> {
    match timeout(wait, sock.recv_from(buf)).await {
        Ok(Ok(received)) => Ok(Some(received)),
        Ok(Err(error)) => Err(error),
        Err(_) => Ok(None),
    }
}

/// Write a serialised response to a UDP peer.
///
/// # Errors
///
/// If the response is not a plausible DNS message, or the send fails.
pub async fn send_udp_bytes_to(
    sock: &UdpSocket,
    target: SocketAddr,
    bytes: &[u8],
) -> Result<(), io::Error> {
    if bytes.len() < HEADER_LEN || bytes.len() > DATAGRAM_MAX_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to send {} octet response", bytes.len()),
        ));
    }

    sock.send_to(bytes, target).await?;
    Ok(())
}
