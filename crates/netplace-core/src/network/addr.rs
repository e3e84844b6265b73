//! Address arithmetic shared by subnets and the allocation search.
//!
//! Both families are widened to `u128` so IPv4 and IPv6 blocks go through
//! the same code. Callers never mix families in one computation.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::IpNetwork;

use crate::error::{Error, Result};

/// Largest number of addresses a single `"a - b"` list entry may expand to
pub const MAX_RANGE_EXPANSION: u128 = 65_536;

pub(crate) fn to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u32::from(v4) as u128,
        IpAddr::V6(v6) => u128::from(v6),
    }
}

pub(crate) fn from_u128(value: u128, ipv4: bool) -> IpAddr {
    if ipv4 {
        IpAddr::V4(Ipv4Addr::from(value as u32))
    } else {
        IpAddr::V6(Ipv6Addr::from(value))
    }
}

/// Inclusive address interval, the unit the allocation search works with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct AddrBlock {
    pub first: u128,
    pub last: u128,
}

impl AddrBlock {
    pub fn host(ip: IpAddr) -> Self {
        let value = to_u128(ip);
        Self {
            first: value,
            last: value,
        }
    }

    pub fn of(network: &IpNetwork) -> Self {
        Self {
            first: to_u128(network.network()),
            last: to_u128(network.broadcast()),
        }
    }

    pub fn overlaps(&self, other: &AddrBlock) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

/// Number of host bits for a family
pub(crate) fn max_prefix(ipv4: bool) -> u8 {
    if ipv4 { 32 } else { 128 }
}

/// Size of a `/prefix` block, `None` when it spans the whole IPv6 space
/// or the prefix is longer than the family allows
pub(crate) fn block_size(prefix: u8, ipv4: bool) -> Option<u128> {
    let host_bits = u32::from(max_prefix(ipv4).checked_sub(prefix)?);
    1u128.checked_shl(host_bits)
}

/// Canonical record form of a single address (`/32` or `/128`)
pub fn host_network(ip: IpAddr) -> IpNetwork {
    IpNetwork::from(ip)
}

/// Parse a list of addresses where entries are single addresses or
/// inclusive `"first - last"` ranges.
pub fn parse_ip_list<S: AsRef<str>>(entries: &[S]) -> Result<Vec<IpAddr>> {
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.as_ref().trim();
        match entry.split_once('-') {
            Some((first, last)) => {
                let first = parse_ip(first.trim())?;
                let last = parse_ip(last.trim())?;
                if first.is_ipv4() != last.is_ipv4() {
                    return Err(Error::config(format!(
                        "IP range '{}' mixes address families",
                        entry
                    )));
                }
                let (lo, hi) = (to_u128(first), to_u128(last));
                if lo > hi {
                    return Err(Error::config(format!(
                        "IP range '{}' ends before it starts",
                        entry
                    )));
                }
                if hi - lo >= MAX_RANGE_EXPANSION {
                    return Err(Error::config(format!(
                        "IP range '{}' is larger than {} addresses",
                        entry, MAX_RANGE_EXPANSION
                    )));
                }
                out.extend((lo..=hi).map(|value| from_u128(value, first.is_ipv4())));
            }
            None => out.push(parse_ip(entry)?),
        }
    }
    Ok(out)
}

fn parse_ip(value: &str) -> Result<IpAddr> {
    value
        .parse()
        .map_err(|e| Error::config(format!("Invalid IP address '{}': {}", value, e)))
}
