//! Process-wide ICMP receiver.
//!
//! One thread services both the IPv4 and IPv6 raw sockets for the whole
//! process (`Ping.icmpv4_socket`/`icmpv6_socket`/`receiver()` in the Python
//! original), demultiplexing replies to whichever host registered the
//! identifier found in the payload. Lazily started on first use and never
//! torn down — it's daemonized the same way the original's receiver thread
//! is, living for the life of the process.

use std::collections::HashMap;
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::{Arc, Weak};
use std::thread;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use parking_lot::Mutex;
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use tracing::{debug, trace, warn};

use crate::error::IcmpError;
use crate::family::Family;
use crate::host::Host;
use crate::signal::ManualResetEvent;

use super::session;

const RECV_BUF_SIZE: usize = 8192;

struct RegistryEntry {
    host: Weak<Host>,
    event: ManualResetEvent,
    interval: f64,
}

pub struct Receiver {
    socket_v4: Option<Socket>,
    socket_v6: Option<Socket>,
    registry: Mutex<HashMap<u16, RegistryEntry>>,
}

static INSTANCE: Mutex<Option<Arc<Receiver>>> = Mutex::new(None);

/// Opens and configures a single ICMP datagram socket for `domain`.
fn open_one(domain: Domain, protocol: SockProtocol) -> std::io::Result<Socket> {
    let socket = Socket::new(domain, Type::DGRAM, Some(protocol))?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Returns the process-wide receiver, starting its thread and opening its
/// sockets on first call.
pub fn ensure_receiver() -> Result<Arc<Receiver>, IcmpError> {
    let mut guard = INSTANCE.lock();
    if let Some(receiver) = guard.as_ref() {
        return Ok(receiver.clone());
    }

    let receiver = Arc::new(Receiver::open()?);
    let worker = receiver.clone();
    thread::Builder::new()
        .name("cping-icmp-receiver".into())
        .spawn(move || worker.run())
        .expect("failed to spawn ICMP receiver thread");

    *guard = Some(receiver.clone());
    Ok(receiver)
}

impl Receiver {
    fn open() -> Result<Self, IcmpError> {
        let (socket_v4, error_v4) = match open_one(Domain::IPV4, SockProtocol::ICMPV4) {
            Ok(socket) => (Some(socket), None),
            Err(error) => {
                warn!(%error, "failed to open IPv4 ICMP socket, IPv4 probing disabled");
                (None, Some(error))
            }
        };

        let (socket_v6, error_v6) = match open_one(Domain::IPV6, SockProtocol::ICMPV6) {
            Ok(socket) => (Some(socket), None),
            Err(error) => {
                warn!(%error, "failed to open IPv6 ICMP socket, IPv6 probing disabled");
                (None, Some(error))
            }
        };

        if socket_v4.is_none() && socket_v6.is_none() {
            return Err(IcmpError::NoUsableSocket {
                v4: error_v4.expect("v4 error present when its socket is absent"),
                v6: error_v6.expect("v6 error present when its socket is absent"),
            });
        }

        Ok(Self {
            socket_v4,
            socket_v6,
            registry: Mutex::new(HashMap::new()),
        })
    }

    pub fn is_identifier_taken(&self, identifier: u16) -> bool {
        self.registry.lock().contains_key(&identifier)
    }

    pub fn register(&self, identifier: u16, host: &Arc<Host>, event: ManualResetEvent, interval: f64) {
        self.registry.lock().insert(
            identifier,
            RegistryEntry {
                host: Arc::downgrade(host),
                event,
                interval,
            },
        );
    }

    pub fn unregister(&self, identifier: u16) {
        self.registry.lock().remove(&identifier);
    }

    pub fn socket_for(&self, family: Family) -> Option<&Socket> {
        match family {
            Family::V4 => self.socket_v4.as_ref(),
            Family::V6 => self.socket_v6.as_ref(),
        }
    }

    fn run(self: Arc<Self>) {
        // Indices into `fds` aren't fixed: whichever of the two sockets
        // actually opened (at least one did, or `open` would have failed)
        // gets tagged with its family so results can be matched back up
        // after `poll` returns.
        loop {
            let mut fds = Vec::with_capacity(2);
            let mut families = Vec::with_capacity(2);

            if let Some(socket) = self.socket_v4.as_ref() {
                let fd: BorrowedFd = socket.as_fd();
                fds.push(PollFd::new(fd, PollFlags::POLLIN));
                families.push(Family::V4);
            }
            if let Some(socket) = self.socket_v6.as_ref() {
                let fd: BorrowedFd = socket.as_fd();
                fds.push(PollFd::new(fd, PollFlags::POLLIN));
                families.push(Family::V6);
            }

            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(error) => {
                    warn!(%error, "poll on ICMP sockets failed");
                    continue;
                }
            }

            for (fd, family) in fds.iter().zip(families.iter()) {
                let readable = fd
                    .revents()
                    .map(|events| events.contains(PollFlags::POLLIN))
                    .unwrap_or(false);

                if readable {
                    self.drain(*family);
                }
            }
        }
    }

    fn drain(&self, family: Family) {
        let socket = match self.socket_for(family) {
            Some(socket) => socket,
            None => return,
        };

        loop {
            let mut uninit = [std::mem::MaybeUninit::<u8>::uninit(); RECV_BUF_SIZE];

            match socket.recv(&mut uninit) {
                Ok(len) => {
                    // SAFETY: `recv` guarantees the first `len` bytes were
                    // written by the kernel.
                    let data = unsafe {
                        std::slice::from_raw_parts(uninit.as_ptr() as *const u8, len)
                    };
                    self.handle_packet(data);
                }
                Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(error) => {
                    warn!(%error, "error reading from ICMP socket");
                    break;
                }
            }
        }
    }

    fn handle_packet(&self, data: &[u8]) {
        let reply = match session::parse_reply(data) {
            Some(reply) => reply,
            None => return,
        };

        let (host, event, interval) = {
            let registry = self.registry.lock();
            match registry.get(&reply.identifier) {
                Some(entry) => match entry.host.upgrade() {
                    Some(host) => (host, entry.event.clone(), entry.interval),
                    None => return,
                },
                None => {
                    trace!(identifier = reply.identifier, "reply for unknown identifier");
                    return;
                }
            }
        };

        let latency = session::elapsed_since(reply.timestamp);
        let found = host
            .results()
            .update_by_info(reply.sequence, latency, interval);

        if !found {
            return;
        }

        if latency <= interval {
            event.set();
        } else {
            debug!(
                host = host.address(),
                sequence = reply.sequence,
                "late ICMP reply"
            );
        }
    }
}
