//! Per-host ICMP echo session: identifier/sequence bookkeeping and the wire
//! format.
//!
//! The packet is `!BBHHHHf` in the Python original: type, code, checksum,
//! identifier, sequence, identifier (again), timestamp — 14 bytes. The
//! identifier is duplicated into the payload because some platforms rewrite
//! the header's copy before userspace ever sees it, so the receiver always
//! demultiplexes on the payload copy, never the header one.

use std::sync::OnceLock;
use std::time::Instant;

use rand::Rng;

use crate::family::Family;

/// Size in bytes of the packed `!BBHHHHf` struct.
pub const PACKET_SIZE: usize = 14;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Seconds elapsed since an arbitrary, process-wide origin — the Rust
/// analogue of `time.perf_counter()`. Only differences between two calls
/// are meaningful.
fn now() -> f32 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_secs_f32()
}

impl Family {
    fn icmp_type(self) -> u8 {
        match self {
            Family::V4 => 8,   // Echo Request
            Family::V6 => 128, // Echo Request
        }
    }
}

/// A single host's ICMP echo session: owns an identifier unique among
/// currently-registered sessions and the next sequence number to send.
pub struct IcmpSession {
    family: Family,
    pub identifier: u16,
    pub sequence: u16,
}

impl IcmpSession {
    /// Builds a session for `family` with a random identifier not already
    /// present in `taken` (the receiver's registry keys).
    pub fn new(family: Family, taken: impl Fn(u16) -> bool) -> Self {
        let mut rng = rand::thread_rng();
        let sequence = rng.gen_range(1..=u16::MAX);

        let identifier = loop {
            let candidate = rng.gen_range(1..=u16::MAX);
            if !taken(candidate) {
                break candidate;
            }
        };

        Self {
            family,
            identifier,
            sequence,
        }
    }

    /// Builds the next echo request, advancing `sequence`. Returns the wire
    /// bytes and the timestamp embedded in them (for latency accounting by
    /// the caller, though the receiver recomputes it independently).
    pub fn create_echo(&mut self) -> Vec<u8> {
        self.sequence = self.sequence.wrapping_add(1);

        let mut packet = Vec::with_capacity(PACKET_SIZE);
        packet.push(self.family.icmp_type());
        packet.push(0); // code
        packet.extend_from_slice(&0u16.to_be_bytes()); // checksum placeholder
        packet.extend_from_slice(&self.identifier.to_be_bytes());
        packet.extend_from_slice(&self.sequence.to_be_bytes());
        packet.extend_from_slice(&self.identifier.to_be_bytes());
        packet.extend_from_slice(&now().to_be_bytes());

        if self.family == Family::V4 {
            let checksum = checksum(&packet);
            packet[2..4].copy_from_slice(&checksum.to_be_bytes());
        }

        packet
    }
}

/// RFC1071 one's-complement checksum. Not meant for ICMPv6, which needs an
/// IPv6 pseudo-header and is left to the kernel.
pub fn checksum(data: &[u8]) -> u16 {
    let mut padded;
    let data = if data.len() % 2 == 1 {
        padded = data.to_vec();
        padded.push(0);
        &padded[..]
    } else {
        data
    };

    let mut sum: u32 = 0;
    for chunk in data.chunks_exact(2) {
        sum += u16::from_ne_bytes([chunk[0], chunk[1]]) as u32;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    (!sum as u16).to_be()
}

/// A parsed incoming echo reply.
pub struct Reply {
    pub sequence: u16,
    pub identifier: u16,
    pub timestamp: f32,
}

/// Parses the trailing `PACKET_SIZE` bytes of a received datagram — some
/// platforms (notably macOS) include the IPv4 header ahead of the ICMP
/// payload, so only the tail is ever assumed stable.
pub fn parse_reply(data: &[u8]) -> Option<Reply> {
    if data.len() < PACKET_SIZE {
        return None;
    }

    let tail = &data[data.len() - PACKET_SIZE..];
    let sequence = u16::from_be_bytes([tail[6], tail[7]]);
    let identifier = u16::from_be_bytes([tail[8], tail[9]]);
    let timestamp = f32::from_be_bytes([tail[10], tail[11], tail[12], tail[13]]);

    Some(Reply {
        sequence,
        identifier,
        timestamp,
    })
}

/// Seconds since the shared epoch — exposed so the receiver can compute
/// latency against the same clock `create_echo` stamped its packets with.
pub fn elapsed_since(timestamp: f32) -> f64 {
    (now() - timestamp) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_of_zeroed_header_is_nonzero() {
        let packet = vec![8u8, 0, 0, 0, 0, 1, 0, 1, 0, 1, 0, 0, 0, 0];
        assert_ne!(checksum(&packet), 0);
    }

    #[test]
    fn create_echo_round_trips_identifier_and_sequence() {
        let mut session = IcmpSession::new(Family::V4, |_| false);
        let identifier = session.identifier;
        let packet = session.create_echo();

        let reply = parse_reply(&packet).unwrap();
        assert_eq!(reply.identifier, identifier);
        assert_eq!(reply.sequence, session.sequence);
    }

    #[test]
    fn new_session_avoids_taken_identifiers() {
        let mut seen = std::collections::HashSet::new();
        seen.insert(42u16);
        let session = IcmpSession::new(Family::V4, |id| seen.contains(&id) || id == 42);
        assert_ne!(session.identifier, 42);
    }

    #[test]
    fn parse_reply_rejects_short_packets() {
        assert!(parse_reply(&[0u8; 4]).is_none());
    }

    #[test]
    fn parse_reply_takes_the_trailing_bytes_ignoring_a_leading_ip_header() {
        let mut session = IcmpSession::new(Family::V4, |_| false);
        let packet = session.create_echo();

        let mut with_ip_header = vec![0u8; 20];
        with_ip_header.extend_from_slice(&packet);

        let reply = parse_reply(&with_ip_header).unwrap();
        assert_eq!(reply.identifier, session.identifier);
    }
}
