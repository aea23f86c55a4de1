use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// The standard DNS port.
pub const DEFAULT_PORT: u16 = 53;

/// How long a receive waits before the stop channel is checked again.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long to wait between failed attempts to bind the socket.
pub const DEFAULT_BIND_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Where and how a `CaptiveDns` listens.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Settings {
    /// Local address to bind.  Defaults to all interfaces, since the
    /// scope filter decides who gets answers.
    pub bind_address: IpAddr,

    /// UDP port to bind.  Port 0 asks the OS to pick one.
    pub port: u16,

    /// Upper bound on how long `stop` waits for the serving task to
    /// notice it.
    pub poll_interval: Duration,

    /// Backoff between bind attempts.
    pub bind_retry_interval: Duration,
}

impl Settings {
    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            bind_retry_interval: DEFAULT_BIND_RETRY_INTERVAL,
        }
    }
}
