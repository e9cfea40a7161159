//! TCP connect-based probing.
//!
//! Possible results, matching the Python original's docstring:
//!   * latency=x, error=false: successful handshake
//!   * latency=x, error=true:  connection failure (e.g. TCP-RST)
//!   * latency=-1, error=false: timeout
//!
//! Unlike ICMP, TCP needs no shared receiver or registry — the connect
//! itself blocks until there's an answer, so everything happens on the
//! host's own probe thread.

use std::net::TcpStream;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::ConfigError;
use crate::family::{self, Family};
use crate::host::{Host, Protocol};
use crate::store::ProbeResult;

fn validate_port(port: u32) -> Result<u16, ConfigError> {
    if port == 0 || port > u16::MAX as u32 {
        Err(ConfigError::PortOutOfRange(port))
    } else {
        Ok(port as u16)
    }
}

/// TCP connect probing. `port` can be changed while a probe loop is running
/// (read fresh every iteration), matching the Python original's mutable
/// `port` property.
pub struct TcpProtocol {
    port: AtomicU16,
    interval: f64,
    family: Option<Family>,
}

impl TcpProtocol {
    /// Builds a TCP prober for `port`.
    ///
    /// # Errors
    /// Returns `ConfigError::PortOutOfRange` if `port` is 0 (ports 1-65535
    /// are valid, matching the 1-65535 check in the Python original — `u16`
    /// already rules out anything above 65535).
    pub fn new(port: u32, interval: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            port: AtomicU16::new(validate_port(port)?),
            interval,
            family: None,
        })
    }

    /// Restricts address resolution to `family` rather than whichever family
    /// `getaddrinfo` resolves first. See `IcmpProtocol::with_family`.
    pub fn with_family(mut self, family: Family) -> Self {
        self.family = Some(family);
        self
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Acquire)
    }

    pub fn set_port(&self, port: u32) -> Result<(), ConfigError> {
        let port = validate_port(port)?;
        self.port.store(port, Ordering::Release);
        Ok(())
    }
}

impl Protocol for TcpProtocol {
    fn interval(&self) -> f64 {
        self.interval
    }

    fn ping_loop(&self, host: &Arc<Host>) {
        let address = match family::resolve(host.address(), self.family) {
            Some(addr) => addr,
            None => {
                host.set_status("Host resolution failed");
                return;
            }
        };

        while !host.stop_signal().is_set() {
            // Read the port fresh every iteration so a mid-flight change
            // takes effect on the next probe.
            let port = self.port();
            let mut location = address;
            location.set_port(port);

            let checkpoint = Instant::now();
            let timeout = Duration::from_secs_f64(self.interval.max(0.0));

            let (latency, error) = match TcpStream::connect_timeout(&location, timeout) {
                Ok(_) => (checkpoint.elapsed().as_secs_f64(), false),
                Err(io_error) => classify(&io_error, checkpoint),
            };

            debug!(host = host.address(), port, latency, error, "TCP probe");
            host.add_result(ProbeResult::new(latency, error, false, None));
            host.wait(latency);
        }
    }
}

/// Classifies a failed connect attempt into `(latency, error)`. A TCP-level
/// rejection (RST, reset, refused) got an answer, so it counts as a timed
/// result with `error=true`; anything else (including a real timeout) is
/// reported as the `-1` timeout sentinel.
fn classify(io_error: &std::io::Error, checkpoint: Instant) -> (f64, bool) {
    match io_error.raw_os_error() {
        Some(errno) if errno == libc::ECONNREFUSED || errno == libc::ECONNRESET => {
            (checkpoint.elapsed().as_secs_f64(), true)
        }
        _ => (-1.0, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn rejects_port_zero() {
        assert!(matches!(
            TcpProtocol::new(0, 1.0),
            Err(ConfigError::PortOutOfRange(0))
        ));
    }

    #[test]
    fn rejects_port_above_u16_max() {
        assert!(TcpProtocol::new(70_000, 1.0).is_err());
    }

    #[test]
    fn accepts_valid_port() {
        assert!(TcpProtocol::new(8080, 1.0).is_ok());
    }

    #[test]
    fn host_unreachable_and_network_unreachable_classify_as_timeouts_not_errors() {
        let checkpoint = Instant::now();

        let unreachable =
            std::io::Error::from_raw_os_error(libc::EHOSTUNREACH);
        assert_eq!(classify(&unreachable, checkpoint), (-1.0, false));

        let net_unreachable =
            std::io::Error::from_raw_os_error(libc::ENETUNREACH);
        assert_eq!(classify(&net_unreachable, checkpoint), (-1.0, false));
    }

    #[test]
    fn connection_refused_and_reset_classify_as_errors() {
        let checkpoint = Instant::now();

        let (latency, error) =
            classify(&std::io::Error::from_raw_os_error(libc::ECONNREFUSED), checkpoint);
        assert!(latency >= 0.0);
        assert!(error);

        let (latency, error) =
            classify(&std::io::Error::from_raw_os_error(libc::ECONNRESET), checkpoint);
        assert!(latency >= 0.0);
        assert!(error);
    }

    #[test]
    fn a_v6_family_hint_fails_resolution_against_a_v4_only_address() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let protocol =
            Arc::new(TcpProtocol::new(port as u32, 0.05).unwrap().with_family(crate::Family::V6));
        let host = Host::new("127.0.0.1", protocol);

        host.start(Duration::ZERO);
        thread::sleep(Duration::from_millis(100));
        host.stop(true);

        assert_eq!(host.status().as_deref(), Some("Host resolution failed"));
        assert!(host.results().results().is_empty());
    }

    #[test]
    fn ping_loop_succeeds_against_an_open_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let accept_thread = thread::spawn(move || {
            for stream in listener.incoming().take(1) {
                drop(stream);
            }
        });

        let protocol = Arc::new(TcpProtocol::new(port as u32, 0.2).unwrap());
        let host = Host::new("127.0.0.1", protocol);

        host.start(Duration::ZERO);
        thread::sleep(Duration::from_millis(100));
        host.stop(true);
        accept_thread.join().unwrap();

        let results = host.results().results();
        assert!(!results.is_empty());
        assert!(results.iter().any(|r| r.latency >= 0.0 && !r.error));
    }

    #[test]
    fn ping_loop_reports_refused_connections_as_errors() {
        // Bind then immediately drop to free the port while keeping it
        // unlikely to be reused during the short test window.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let protocol = Arc::new(TcpProtocol::new(port as u32, 0.2).unwrap());
        let host = Host::new("127.0.0.1", protocol);

        host.start(Duration::ZERO);
        thread::sleep(Duration::from_millis(100));
        host.stop(true);

        let results = host.results().results();
        assert!(!results.is_empty());
        assert!(results.iter().any(|r| r.error || r.latency < 0.0));
    }
}
