//! The ICMP `Protocol` implementation: per-host probe loop driving the
//! shared receiver.
//!
//! Possible results, same as the Python original's docstring:
//!   * latency=x, error=false: ICMP echo reply
//!   * latency=x, error=true:  late reply
//!   * latency=-1, error=false: timeout

use std::sync::Arc;
use std::time::Duration;

use socket2::SockAddr;
use tracing::debug;

use crate::family::{self, Family};
use crate::host::{Host, Protocol};
use crate::signal::ManualResetEvent;
use crate::store::ProbeResult;

use super::receiver;
use super::session::IcmpSession;

/// ICMP echo probing.
pub struct IcmpProtocol {
    interval: f64,
    family: Option<Family>,
}

impl IcmpProtocol {
    pub fn new(interval: f64) -> Self {
        Self {
            interval,
            family: None,
        }
    }

    /// Restricts address resolution to `family`, instead of taking whichever
    /// family `getaddrinfo` happens to resolve first. Used by callers (e.g.
    /// a `-4`/`-6` CLI flag) that need to pin the family explicitly.
    pub fn with_family(mut self, family: Family) -> Self {
        self.family = Some(family);
        self
    }
}

impl Protocol for IcmpProtocol {
    fn interval(&self) -> f64 {
        self.interval
    }

    fn ping_loop(&self, host: &Arc<Host>) {
        let receiver = match receiver::ensure_receiver() {
            Ok(receiver) => receiver,
            Err(error) => {
                host.set_status(error.to_string());
                return;
            }
        };

        let target = match family::resolve(host.address(), self.family) {
            Some(addr) => addr,
            None => {
                host.set_status("Host resolution failed");
                return;
            }
        };

        let family = if target.is_ipv4() {
            Family::V4
        } else {
            Family::V6
        };

        let receiver_for_lookup = receiver.clone();
        let mut session = IcmpSession::new(family, |id| receiver_for_lookup.is_identifier_taken(id));
        let receive_event = ManualResetEvent::new();

        receiver.register(session.identifier, host, receive_event.clone(), self.interval);

        while !host.stop_signal().is_set() {
            receive_event.clear();
            let mut latency = -1.0;
            let request = session.create_echo();
            let sequence = session.sequence;

            // Initially hidden to avoid showing a downed result.
            host.add_result(ProbeResult::new(latency, false, true, Some(sequence)));

            let socket = match receiver.socket_for(family) {
                Some(socket) => socket,
                None => {
                    host.set_status("no usable ICMP socket for this address family");
                    break;
                }
            };

            let send_result = socket.send_to(&request, &SockAddr::from(target));
            if let Err(error) = send_result {
                host.set_status(error.to_string());
                break;
            }

            debug!(host = host.address(), sequence, "ICMP echo sent");

            if receive_event.wait(Duration::from_secs_f64(self.interval)) {
                if let Some(updated) = host.results().latency_of(sequence) {
                    latency = updated;
                }
            }

            host.results().unhide(sequence);
            host.wait(latency);
        }

        receiver.unregister(session.identifier);
    }
}
