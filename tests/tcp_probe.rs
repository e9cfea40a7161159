//! End-to-end TCP probing against a local listener: open port, closed port,
//! and a port change mid-flight.

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cping::{Host, TcpProtocol};

#[test]
fn probing_an_open_port_yields_successful_results() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let acceptor = thread::spawn(move || {
        for stream in listener.incoming() {
            match stream {
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    });

    let protocol = Arc::new(TcpProtocol::new(port as u32, 0.05).unwrap());
    let host = Host::new("127.0.0.1", protocol);

    host.start(Duration::ZERO);
    thread::sleep(Duration::from_millis(200));
    host.stop(true);
    drop(acceptor);

    let results = host.results().results();
    assert!(results.len() >= 2);
    assert!(results.iter().all(|r| !r.error && r.latency >= 0.0));

    let summary = host.results_summary();
    assert!(summary.avg.is_some());
    assert_eq!(summary.loss, Some(0.0));
}

#[test]
fn probing_a_closed_port_records_failures() {
    // Reserve then release a port so nothing is listening on it.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let protocol = Arc::new(TcpProtocol::new(port as u32, 0.1).unwrap());
    let host = Host::new("127.0.0.1", protocol);

    host.start(Duration::ZERO);
    thread::sleep(Duration::from_millis(150));
    host.stop(true);

    let results = host.results().results();
    assert!(!results.is_empty());
    assert!(results.iter().any(|r| r.error || r.latency < 0.0));
}

#[test]
fn changing_the_port_mid_flight_switches_the_probe_target() {
    let open_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let open_port = open_listener.local_addr().unwrap().port();
    let closed_port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    };

    let acceptor = thread::spawn(move || {
        for stream in open_listener.incoming() {
            match stream {
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    });

    let protocol = Arc::new(TcpProtocol::new(closed_port as u32, 0.05).unwrap());
    let host = Host::new("127.0.0.1", protocol.clone());

    host.start(Duration::ZERO);
    thread::sleep(Duration::from_millis(100));
    assert!(host
        .results()
        .results()
        .iter()
        .any(|r| r.error || r.latency < 0.0));

    protocol.set_port(open_port as u32).unwrap();
    thread::sleep(Duration::from_millis(150));
    host.stop(true);
    drop(acceptor);

    let results = host.results().results();
    assert!(results.iter().any(|r| !r.error && r.latency >= 0.0));
}
