//! `Host` and the `Protocol` trait it drives.
//!
//! Ported from `cping.protocols.Host`/`cping.protocols.Ping`: a `Host` owns
//! a result store and the threading primitives its probe loop and any
//! controller need to coordinate (`stop_signal`, `burst_mode`, the derived
//! `ready_signal`), and hands its thread off to whatever `Protocol` it was
//! built with.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::signal::{shared_event, ManualResetEvent};
use crate::store::{ProbeResult, ResultStore, Summary};

/// A probing strategy. Implementors drive a `Host`'s probe loop and own the
/// parameters of their probe (interval, and whatever else e.g. TCP's port).
pub trait Protocol: Send + Sync {
    /// Seconds, or a fraction thereof, between probes.
    fn interval(&self) -> f64;

    /// Blocking call that pings `host` until `host.stop_signal()` is set,
    /// recording results via `host.results()`'s backing store. Must expect
    /// to be stopped at any point and must account for `interval()` changing
    /// mid-flight.
    fn ping_loop(&self, host: &Arc<Host>);
}

/// A ping destination together with its results and run state.
pub struct Host {
    address: String,
    protocol: Arc<dyn Protocol>,
    status: Mutex<Option<String>>,
    burst_mode: ManualResetEvent,
    stop_signal: ManualResetEvent,
    ready_signal: ManualResetEvent,
    results: ResultStore,
    running: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Host {
    /// Builds a host for `address` using `protocol`, returning it already
    /// wrapped in `Arc` since it's shared between its probe thread, the ICMP
    /// receiver's registry, and any controller holding onto it.
    pub fn new(address: impl Into<String>, protocol: Arc<dyn Protocol>) -> Arc<Self> {
        let burst_mode = ManualResetEvent::new();
        let stop_signal = ManualResetEvent::new();
        let ready_signal = shared_event(&[burst_mode.clone(), stop_signal.clone()]);

        Arc::new(Self {
            address: address.into(),
            protocol,
            status: Mutex::new(None),
            burst_mode,
            stop_signal,
            ready_signal,
            results: ResultStore::new(),
            running: AtomicBool::new(false),
            thread: Mutex::new(None),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn protocol(&self) -> &Arc<dyn Protocol> {
        &self.protocol
    }

    /// Event that, when set, asks the probe loop to ignore `interval` and
    /// probe back-to-back.
    pub fn burst_mode(&self) -> &ManualResetEvent {
        &self.burst_mode
    }

    /// Event signaling the probe loop to stop at its next opportunity.
    pub fn stop_signal(&self) -> &ManualResetEvent {
        &self.stop_signal
    }

    /// Composite of `burst_mode`/`stop_signal`; a probe loop waits on this
    /// one so either condition wakes it early.
    pub fn ready_signal(&self) -> &ManualResetEvent {
        &self.ready_signal
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn results_summary(&self) -> Summary {
        self.results.summary()
    }

    /// Records a result via the backing store. Thin pass-through so probe
    /// loops don't need to reach past `Host` into its store directly.
    pub fn add_result(&self, result: ProbeResult) {
        self.results.append(result);
    }

    pub fn set_results_length(&self, length: usize) {
        self.results.set_capacity(length);
    }

    pub fn status(&self) -> Option<String> {
        self.status.lock().clone()
    }

    pub fn set_status(&self, status: impl Into<String>) {
        *self.status.lock() = Some(status.into());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Blocks until ready for the next probe: returns early if `burst_mode`
    /// or `stop_signal` became set, otherwise waits out the remainder of
    /// `interval` after accounting for `latency`. A `latency` of `-1.0`
    /// (the timeout sentinel) or burst mode skips the wait entirely.
    pub fn wait(&self, latency: f64) {
        if latency == -1.0 || self.burst_mode.is_set() {
            return;
        }

        let remaining = (self.protocol.interval() - latency).max(0.0);
        self.ready_signal.wait(Duration::from_secs_f64(remaining));
    }

    /// Clears `status` and starts the probe loop on a background thread,
    /// after an optional `delay`. A no-op if already running.
    pub fn start(self: &Arc<Self>, delay: Duration) {
        if self.is_running() {
            return;
        }

        *self.status.lock() = None;
        self.stop_signal.clear();
        self.running.store(true, Ordering::Release);

        let host = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("cping-{}", host.address))
            .spawn(move || {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }

                info!(host = %host.address, "probe loop starting");
                let protocol = Arc::clone(&host.protocol);
                protocol.ping_loop(&host);
                host.running.store(false, Ordering::Release);
                debug!(host = %host.address, "probe loop exited");
            })
            .expect("failed to spawn probe thread");

        *self.thread.lock() = Some(handle);
    }

    /// Signals the probe loop to stop. If `block`, waits for its thread to
    /// finish exiting.
    pub fn stop(&self, block: bool) {
        self.stop_signal.set();

        if block {
            if let Some(handle) = self.thread.lock().take() {
                let _ = handle.join();
            }
        }
    }
}

/// Starts `hosts` spread evenly over `interval`, so a burst of hosts doesn't
/// all probe in lockstep: host `i` of `n` starts after `interval * i / n`.
pub fn stagger_start(hosts: &[Arc<Host>], interval: Duration) {
    if hosts.is_empty() {
        return;
    }

    let stagger = interval.div_f64(hosts.len() as f64);

    for (index, host) in hosts.iter().enumerate() {
        host.start(stagger.mul_f64(index as f64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    struct CountingProtocol {
        interval: f64,
        calls: AtomicUsize,
    }

    impl Protocol for CountingProtocol {
        fn interval(&self) -> f64 {
            self.interval
        }

        fn ping_loop(&self, host: &Arc<Host>) {
            while !host.stop_signal().is_set() {
                self.calls.fetch_add(1, Ordering::SeqCst);
                host.add_result(ProbeResult::new(0.0, false, false, None));
                host.wait(0.0);
            }
        }
    }

    #[test]
    fn start_runs_the_loop_and_stop_joins_it() {
        let protocol = Arc::new(CountingProtocol {
            interval: 0.01,
            calls: AtomicUsize::new(0),
        });
        let host = Host::new("127.0.0.1", protocol.clone());

        host.start(Duration::ZERO);
        thread::sleep(Duration::from_millis(50));
        host.stop(true);

        assert!(!host.is_running());
        assert!(protocol.calls.load(Ordering::SeqCst) > 0);
        assert!(!host.results().is_empty());
    }

    #[test]
    fn wait_skips_timeout_for_error_sentinel() {
        let protocol = Arc::new(CountingProtocol {
            interval: 10.0,
            calls: AtomicUsize::new(0),
        });
        let host = Host::new("example", protocol);

        let start = Instant::now();
        host.wait(-1.0);
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn wait_skips_timeout_in_burst_mode() {
        let protocol = Arc::new(CountingProtocol {
            interval: 10.0,
            calls: AtomicUsize::new(0),
        });
        let host = Host::new("example", protocol);
        host.burst_mode().set();

        let start = Instant::now();
        host.wait(0.0);
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn stop_signal_wakes_a_waiting_host_early() {
        let protocol = Arc::new(CountingProtocol {
            interval: 10.0,
            calls: AtomicUsize::new(0),
        });
        let host = Host::new("example", protocol);

        let waiter = Arc::clone(&host);
        let handle = thread::spawn(move || {
            waiter.wait(0.0);
        });

        thread::sleep(Duration::from_millis(10));
        host.stop_signal().set();
        handle.join().unwrap();
    }

    #[test]
    fn stagger_start_spaces_hosts_over_the_interval() {
        let protocol = Arc::new(CountingProtocol {
            interval: 10.0,
            calls: AtomicUsize::new(0),
        });
        let hosts: Vec<_> = (0..3)
            .map(|i| Host::new(format!("host{i}"), protocol.clone()))
            .collect();

        stagger_start(&hosts, Duration::from_millis(30));
        thread::sleep(Duration::from_millis(5));

        // The first host should already be running; staggered ones haven't
        // started their delay-gated thread body yet logically, but all
        // threads are at least spawned.
        assert!(hosts[0].is_running());

        for host in &hosts {
            host.stop(true);
        }
    }
}
