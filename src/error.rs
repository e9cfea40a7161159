//! Typed, construction-time errors.
//!
//! Per-host runtime failures are not represented here — those are recorded as
//! `Host::status()` strings (see host.rs) so a failing probe never panics or
//! unwinds out of its thread. These types are for the fatal, fail-fast path:
//! bad constructor arguments and socket setup that can't succeed at all.

use std::io;

use thiserror::Error;

/// Invalid configuration passed to a `Protocol` constructor or setter.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("port {0} is out of range (must be 1-65535)")]
    PortOutOfRange(u32),
}

/// Failure to stand up the process-wide ICMP receiver. Opening either
/// socket is attempted independently — an IPv4-only or IPv6-only host is
/// still usable — so this only surfaces when *neither* socket could be
/// opened, carrying both underlying errors.
#[derive(Debug, Error)]
pub enum IcmpError {
    #[error("no usable ICMP socket: IPv4 failed with {v4}, IPv6 failed with {v6}")]
    NoUsableSocket { v4: io::Error, v6: io::Error },
}
