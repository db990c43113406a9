//! Loopback test for the discovery probe loop.
//!
//! A responder thread plays the phone: it sprays discovery replies at the
//! base probe port until the engine's receiver picks one up. Replies are
//! sent blind because the engine itself binds the probed port, so the
//! responder cannot also listen there.

use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use shexter_protocol::broadcast::BroadcastAddressSource;
use shexter_protocol::discovery::{DiscoveryEngine, DISCOVER_CONFIRM, PROBE_PORT_BASE};
use shexter_protocol::endpoint::Endpoint;
use shexter_protocol::error::Error;
use shexter_protocol::operator::Operator;

struct Loopback;

impl BroadcastAddressSource for Loopback {
    fn broadcast_addresses(&self) -> Vec<Ipv4Addr> {
        vec![Ipv4Addr::LOCALHOST]
    }
}

/// Operator that accepts the first candidate it is shown.
struct Accepting {
    confirmed: Vec<Ipv4Addr>,
}

impl Operator for Accepting {
    fn wait_until_ready(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn confirm_candidate(&mut self, _description: &str, sender: Ipv4Addr) -> Result<bool, Error> {
        self.confirmed.push(sender);
        Ok(true)
    }

    fn manual_entry(&mut self) -> Result<Option<Endpoint>, Error> {
        Ok(None)
    }
}

#[test]
fn base_port_reply_is_received_and_confirmed() {
    let stop = Arc::new(AtomicBool::new(false));
    let responder_stop = Arc::clone(&stop);

    let responder = thread::spawn(move || {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let reply = format!("{}\nPixel 6 (loopback)\n24001", DISCOVER_CONFIRM);
        while !responder_stop.load(Ordering::Relaxed) {
            let _ = socket.send_to(reply.as_bytes(), (Ipv4Addr::LOCALHOST, PROBE_PORT_BASE));
            thread::sleep(Duration::from_millis(20));
        }
    });

    let source = Loopback;
    let mut engine = DiscoveryEngine::new(&source);
    let mut operator = Accepting {
        confirmed: Vec::new(),
    };
    let found = engine.find_phone(&mut operator).unwrap();

    stop.store(true, Ordering::Relaxed);
    responder.join().unwrap();

    // The base port is probed first, so the scan never reaches the later
    // ports the responder ignores.
    let endpoint = found.expect("reply on the base port should be confirmed");
    assert_eq!(endpoint.address, Ipv4Addr::LOCALHOST);
    assert_eq!(endpoint.port, 24001);
    assert_eq!(operator.confirmed, vec![Ipv4Addr::LOCALHOST]);
}
