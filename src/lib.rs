//! Continuous ICMP/TCP endpoint prober.
//!
//! A host application builds a [`host::Protocol`] ([`icmp::IcmpProtocol`] or
//! [`tcp::TcpProtocol`]), wraps a destination in a [`host::Host`], and calls
//! [`host::Host::start`]. Each host runs its probe loop on its own thread;
//! ICMP probers additionally share one process-wide receiver thread that
//! demultiplexes replies back to the host awaiting them. Results accumulate
//! in a bounded [`store::ResultStore`] with a cached summary.

pub mod error;
pub mod family;
pub mod host;
pub mod icmp;
pub mod logging;
pub mod signal;
pub mod store;
pub mod tcp;

pub use error::{ConfigError, IcmpError};
pub use family::Family;
pub use host::{stagger_start, Host, Protocol};
pub use icmp::IcmpProtocol;
pub use signal::ManualResetEvent;
pub use store::{ProbeResult, ResultStore, Summary};
pub use tcp::TcpProtocol;
