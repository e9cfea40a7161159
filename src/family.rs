//! Address family and the resolution hint a `Protocol` can carry.
//!
//! `cping/protocols/icmp.py`'s `Session` derives its ICMP type byte (8 vs.
//! 128) from whichever family `getaddrinfo` happened to resolve first; the
//! `-4`/`-6` CLI flags (external to this crate, see SPEC_FULL.md) need a way
//! to pin that choice instead of leaving it to resolution order, which is
//! what `resolve`'s `hint` parameter is for.

use std::net::{SocketAddr, ToSocketAddrs};

/// IPv4 or IPv6. Doubles as the ICMP echo type selector (see
/// `icmp::session::IcmpSession`) and as an address-resolution filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    fn matches(self, addr: &SocketAddr) -> bool {
        match self {
            Family::V4 => addr.is_ipv4(),
            Family::V6 => addr.is_ipv6(),
        }
    }
}

/// Resolves `address` via the platform resolver, returning the first result
/// matching `hint` if given, or simply the first result otherwise. `None` if
/// resolution fails or no result matches the hint.
pub fn resolve(address: &str, hint: Option<Family>) -> Option<SocketAddr> {
    let mut addrs = (address, 0u16).to_socket_addrs().ok()?;
    match hint {
        Some(family) => addrs.find(|addr| family.matches(addr)),
        None => addrs.next(),
    }
}
