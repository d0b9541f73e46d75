//! Provides the address range walked by a scan.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use cidr_utils::cidr::{IpCidr, IpInet};

/// Every address contained in a CIDR prefix, walked in ascending order.
///
/// The range owns an immutable prefix and a cursor. The cursor starts at the
/// network address and the walk stops the first time stepping it leaves the
/// prefix, so both the network and the broadcast address are yielded and a
/// prefix at the very top of the address space never wraps around.
///
/// ```rust
/// # use sshscan::address::AddressRange;
/// let range: AddressRange = "10.0.0.0/30".parse().unwrap();
/// let hosts = range.map(|ip| ip.to_string()).collect::<Vec<_>>();
///
/// assert_eq!(hosts, ["10.0.0.0", "10.0.0.1", "10.0.0.2", "10.0.0.3"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRange {
    cidr: IpCidr,
    cursor: Option<IpAddr>,
}

impl AddressRange {
    pub fn new(cidr: IpCidr) -> Self {
        Self {
            cursor: Some(cidr.first_address()),
            cidr,
        }
    }

    /// The prefix being walked.
    pub const fn cidr(&self) -> &IpCidr {
        &self.cidr
    }

    /// Rewinds the cursor to the network address.
    pub fn restart(&mut self) {
        self.cursor = Some(self.cidr.first_address());
    }

    /// Total number of addresses in the prefix, saturating at `u128::MAX`
    /// for a whole IPv6 space.
    pub fn len(&self) -> u128 {
        let total_bits: u8 = if self.cidr.is_ipv4() { 32 } else { 128 };
        let host_bits = u32::from(total_bits - self.cidr.network_length());

        1u128.checked_shl(host_bits).unwrap_or(u128::MAX)
    }

    /// A prefix always holds at least its network address.
    pub const fn is_empty(&self) -> bool {
        false
    }
}

impl Iterator for AddressRange {
    type Item = IpAddr;

    fn next(&mut self) -> Option<IpAddr> {
        let current = self.cursor?;

        self.cursor = successor(current).filter(|next| self.cidr.contains(next));

        Some(current)
    }
}

impl FromStr for AddressRange {
    type Err = String;

    /// Accepts `10.0.0.0/24`, a bare address (a single-host prefix) and a
    /// prefix with host bits set, which is narrowed to its network.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let cidr = match IpCidr::from_str(s) {
            Ok(cidr) => cidr,
            Err(_) => IpInet::from_str(s)
                .map(|inet| inet.network())
                .map_err(|e| format!("Invalid subnet '{s}': {e}"))?,
        };

        Ok(Self::new(cidr))
    }
}

/// Clap value parser for the subnet argument.
pub fn parse_subnet(input: &str) -> Result<AddressRange, String> {
    input.parse()
}

/// The next address up, or `None` past the top of the address space.
fn successor(addr: IpAddr) -> Option<IpAddr> {
    match addr {
        IpAddr::V4(v4) => u32::from(v4)
            .checked_add(1)
            .map(|n| IpAddr::V4(Ipv4Addr::from(n))),
        IpAddr::V6(v6) => u128::from(v6)
            .checked_add(1)
            .map(|n| IpAddr::V6(Ipv6Addr::from(n))),
    }
}
