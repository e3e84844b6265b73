//! First-fit address search over a sorted exclusion set.
//!
//! The search starts one address past the subnet's network address, aligned
//! up to the allocation block size, and walks the exclusions in order. Any
//! exclusion that overlaps the candidate block pushes the candidate to the
//! next aligned block after it. A candidate that runs past the end of the
//! range means the subnet is exhausted.

use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;

use ipnetwork::IpNetwork;

use crate::network::Subnet;
use crate::network::addr::{self, AddrBlock};

/// Build the sorted exclusion set for `subnet`: recorded blocks of the same
/// family plus its restricted and static addresses.
pub(crate) fn exclusions<'a>(
    subnet: &Subnet,
    recorded: impl IntoIterator<Item = &'a IpNetwork>,
) -> Vec<AddrBlock> {
    let ipv4 = subnet.is_ipv4();
    let mut blocks: Vec<AddrBlock> = recorded
        .into_iter()
        .filter(|network| network.is_ipv4() == ipv4)
        .map(AddrBlock::of)
        .collect();
    blocks.extend(
        subnet
            .restricted_ips
            .iter()
            .chain(subnet.static_ips.iter())
            .filter(|ip| ip.is_ipv4() == ipv4)
            .map(|ip| AddrBlock::host(*ip)),
    );
    blocks.sort();
    blocks
}

/// Smallest free `/allocation_prefix` block in `subnet` avoiding every
/// block in `excluded` (sorted by first address)
pub(crate) fn first_free_block(subnet: &Subnet, excluded: &[AddrBlock]) -> Option<IpNetwork> {
    let ipv4 = subnet.is_ipv4();
    let prefix = subnet.allocation_prefix();
    let size = addr::block_size(prefix, ipv4)?;
    let range = subnet.block();

    let mut candidate = align_up(range.first.checked_add(1)?, size)?;
    for block in excluded {
        let end = candidate.checked_add(size - 1)?;
        if block.last < candidate {
            continue;
        }
        if block.first > end {
            break;
        }
        candidate = align_up(block.last.checked_add(1)?, size)?;
    }

    let end = candidate.checked_add(size - 1)?;
    if end > range.last {
        return None;
    }
    IpNetwork::new(addr::from_u128(candidate, ipv4), prefix).ok()
}

/// First pool address not in `taken`, in address order
pub(crate) fn first_free_vip(pool: &BTreeSet<IpAddr>, taken: &HashSet<IpAddr>) -> Option<IpAddr> {
    pool.iter().find(|ip| !taken.contains(ip)).copied()
}

fn align_up(value: u128, size: u128) -> Option<u128> {
    match value % size {
        0 => Some(value),
        rem => value.checked_add(size - rem),
    }
}
