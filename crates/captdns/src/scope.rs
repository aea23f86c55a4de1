use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// The network interface the responder serves: the address handed out
/// in every A answer, and the subnet whose clients get answers at all.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct InterfaceInfo {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl InterfaceInfo {
    pub fn new(address: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        Self { address, netmask }
    }

    /// Build from a CIDR-style prefix length, eg `/24`.  Returns
    /// `None` if the prefix is over 32.
    pub fn from_prefix(address: Ipv4Addr, prefix_len: u8) -> Option<Self> {
        let mask = match prefix_len {
            0 => 0,
            1..=32 => u32::MAX << (32 - prefix_len),
            _ => return None,
        };
        Some(Self::new(address, Ipv4Addr::from(mask)))
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) & u32::from(self.netmask))
    }

    /// Whether a peer is on this interface's subnet.  IPv4-mapped IPv6
    /// addresses are unwrapped; any other IPv6 peer is out of scope.
    pub fn contains(&self, peer: IpAddr) -> bool {
        let peer = match peer {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => v4,
                None => return false,
            },
        };

        u32::from(peer) & u32::from(self.netmask) == u32::from(self.network())
    }
}

impl fmt::Display for InterfaceInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} netmask {}", self.address, self.netmask)
    }
}
