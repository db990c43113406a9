//! UDP broadcast discovery of the phone's TCP endpoint.
//!
//! The engine broadcasts a fixed token across a small contiguous port
//! range and waits briefly for a reply after each probe. A genuine reply
//! carries three newline-separated fields: the confirm token, a
//! human-readable phone description, and the TCP port the phone listens
//! on. The operator confirms or declines each candidate; declined hosts
//! are remembered for the rest of the run and never re-presented.
//!
//! # State machine
//!
//! ```text
//! Init → Probing(port) → CandidateFound → Confirmed → Done(endpoint)
//!                              │
//!                           Rejected → Probing (same window)
//!
//! Init → no broadcast addresses → Done(not found)
//! Probing → port range exhausted → Done(not found)
//! ```
//!
//! First confirmed candidate wins; there is no scoring and no way to
//! resume scanning once a candidate is confirmed, even if its advertised
//! port turns out invalid (the scan ends in an error and the caller
//! decides what to offer next).

use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

use mio::net::UdpSocket as MioUdpSocket;
use mio::{Events, Interest, Poll, Token};

use crate::broadcast::BroadcastAddressSource;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::operator::Operator;
use crate::port::parse_port;

// ============================================================================
// Constants (MUST match the phone app)
// ============================================================================

/// First port the phone may answer discovery probes on (its default).
pub const PROBE_PORT_BASE: u16 = 23456;

/// Number of contiguous ports probed, starting at the base.
pub const PROBE_PORT_COUNT: u16 = 5;

/// Probe datagram payload.
pub const DISCOVER_REQUEST: &str = "shexter-discover";

/// Prefix of every genuine reply.
pub const DISCOVER_CONFIRM: &str = "shexter-confirm";

/// Largest reply the phone sends (matches the app's send buffer).
const MAX_REPLY_LEN: usize = 256;

/// Wait per probe for a reply.
const REPLY_TIMEOUT: Duration = Duration::from_millis(250);

/// Attempts on the base port. The phone listens there unless the port was
/// taken, so it is far more likely to be the right one.
const BASE_PORT_TRIES: u32 = 4;

/// Attempts on each later port.
const LATER_PORT_TRIES: u32 = 2;

/// mio token for the reply receiver.
const RECV_TOKEN: Token = Token(0);

// ============================================================================
// Reply parsing
// ============================================================================

/// A well-formed discovery reply, consumed immediately after receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReply {
    /// Human-readable phone description shown to the operator.
    pub description: String,
    /// Advertised TCP port, still unvalidated text.
    pub tcp_port: String,
}

/// Validate and split a raw reply datagram.
///
/// Malformed replies (wrong token, missing lines, non-UTF-8) yield `None`;
/// the caller logs them and keeps waiting.
pub fn parse_reply(raw: &[u8]) -> Option<CandidateReply> {
    let text = std::str::from_utf8(raw).ok()?;
    let text = text.trim_end_matches([' ', '\0']);

    if !text.starts_with(DISCOVER_CONFIRM) {
        return None;
    }

    let mut lines = text.lines();
    let _confirm = lines.next()?;
    let description = lines.next()?.to_string();
    let tcp_port = lines.next()?.to_string();

    Some(CandidateReply {
        description,
        tcp_port,
    })
}

// ============================================================================
// Discovery engine
// ============================================================================

/// Drives the probe/confirm loop across the port range.
pub struct DiscoveryEngine<'a> {
    source: &'a dyn BroadcastAddressSource,
    /// Hosts the operator declined this run, in decline order.
    /// Discarded with the engine.
    rejected: Vec<Ipv4Addr>,
}

impl<'a> DiscoveryEngine<'a> {
    pub fn new(source: &'a dyn BroadcastAddressSource) -> Self {
        DiscoveryEngine {
            source,
            rejected: Vec::new(),
        }
    }

    /// Probe the port range and return the first operator-confirmed phone.
    ///
    /// `Ok(None)` means no usable broadcast address existed, or the range
    /// was exhausted without a confirmation.
    pub fn find_phone(&mut self, operator: &mut dyn Operator) -> Result<Option<Endpoint>, Error> {
        let broadcast_addrs = self.source.broadcast_addresses();
        if broadcast_addrs.is_empty() {
            log::warn!("no usable broadcast addresses; automatic discovery unavailable");
            return Ok(None);
        }
        log::info!("broadcasting to {:?}", broadcast_addrs);

        operator.wait_until_ready()?;

        let sender = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        sender.set_broadcast(true)?;

        for (port, tries) in probe_plan() {
            log::info!("searching on port {}", port);
            for attempt in 0..tries {
                log::debug!("probe {}/{} on port {}", attempt + 1, tries, port);
                if let Some(endpoint) =
                    self.probe_once(&sender, &broadcast_addrs, port, operator)?
                {
                    return Ok(Some(endpoint));
                }
            }
        }

        log::info!("port range exhausted; no phone confirmed");
        Ok(None)
    }

    /// One broadcast on every interface plus a bounded reply wait.
    ///
    /// Read-side socket errors are reported and absorbed here so the
    /// port/retry loop continues; only cancellation (including an
    /// interrupt during the wait) and a confirmed candidate with a bad
    /// advertised port abort the scan.
    fn probe_once(
        &mut self,
        sender: &UdpSocket,
        broadcast_addrs: &[Ipv4Addr],
        port: u16,
        operator: &mut dyn Operator,
    ) -> Result<Option<Endpoint>, Error> {
        // Send on ALL the interfaces (Windows in particular needs this).
        for addr in broadcast_addrs {
            let target = SocketAddrV4::new(*addr, port);
            if let Err(err) = sender.send_to(DISCOVER_REQUEST.as_bytes(), target) {
                log::warn!("broadcast to {} failed: {}", target, err);
            }
        }

        // The phone replies to the probed port, not to the sender's
        // ephemeral port.
        let mut receiver =
            match MioUdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))) {
                Ok(socket) => socket,
                Err(err) => {
                    log::warn!("could not listen on port {}: {}", port, err);
                    return Ok(None);
                }
            };

        let mut poll = Poll::new()?;
        poll.registry()
            .register(&mut receiver, RECV_TOKEN, Interest::READABLE)?;
        let mut events = Events::with_capacity(8);

        let deadline = Instant::now() + REPLY_TIMEOUT;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            if let Err(err) = poll.poll(&mut events, Some(deadline - now)) {
                return wait_failure(err, port);
            }
            if events.is_empty() {
                // Timed out.
                return Ok(None);
            }

            let mut buf = [0u8; MAX_REPLY_LEN];
            loop {
                match receiver.recv_from(&mut buf) {
                    Ok((len, from)) => {
                        if let Some(endpoint) = self.consider(&buf[..len], from, operator)? {
                            return Ok(Some(endpoint));
                        }
                        // Declined or malformed: keep waiting inside the
                        // same timeout window.
                    }
                    Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                    Err(err) => return wait_failure(err, port),
                }
            }
        }
    }

    /// Decide what to do with one reply datagram.
    ///
    /// Returns `Ok(Some(_))` only for an operator-accepted candidate.
    fn consider(
        &mut self,
        raw: &[u8],
        from: SocketAddr,
        operator: &mut dyn Operator,
    ) -> Result<Option<Endpoint>, Error> {
        // v4-only protocol; our own probe datagrams also land here and
        // fail the token check below.
        let IpAddr::V4(sender) = from.ip() else {
            return Ok(None);
        };

        let Some(reply) = parse_reply(raw) else {
            log::debug!(
                "ignoring malformed reply from {}: {:?}",
                from,
                String::from_utf8_lossy(raw)
            );
            return Ok(None);
        };

        if self.rejected.contains(&sender) {
            log::debug!("skipping previously declined host {}", sender);
            return Ok(None);
        }

        log::info!("got a response from {}", from);
        if operator.confirm_candidate(&reply.description, sender)? {
            let port = parse_port(&reply.tcp_port)
                .map_err(|_| Error::BadAdvertisedPort(reply.tcp_port.clone()))?;
            Ok(Some(Endpoint::new(sender, port)))
        } else {
            self.rejected.push(sender);
            Ok(None)
        }
    }
}

/// Port/tries schedule for one scan: the base port first with extra
/// attempts, then each later port in order.
fn probe_plan() -> Vec<(u16, u32)> {
    (PROBE_PORT_BASE..PROBE_PORT_BASE + PROBE_PORT_COUNT)
        .enumerate()
        .map(|(index, port)| {
            let tries = if index == 0 {
                BASE_PORT_TRIES
            } else {
                LATER_PORT_TRIES
            };
            (port, tries)
        })
        .collect()
}

/// Classify an error from the reply wait. An interrupt aborts the scan
/// as cancellation; anything else is reported and absorbed so the
/// port/retry loop continues.
fn wait_failure(err: std::io::Error, port: u16) -> Result<Option<Endpoint>, Error> {
    if err.kind() == ErrorKind::Interrupted {
        log::info!("interrupted while waiting for replies; stopping the scan");
        return Err(Error::Cancelled);
    }
    log::warn!("error waiting for replies on port {}: {}", port, err);
    Ok(None)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastAddressSource;
    use std::io;

    /// Scripted operator: pops one answer per confirmation request.
    struct Scripted {
        answers: Vec<bool>,
        confirmations: Vec<Ipv4Addr>,
        ready_calls: u32,
    }

    impl Scripted {
        fn new(mut answers: Vec<bool>) -> Self {
            answers.reverse();
            Scripted {
                answers,
                confirmations: Vec::new(),
                ready_calls: 0,
            }
        }
    }

    impl Operator for Scripted {
        fn wait_until_ready(&mut self) -> Result<(), Error> {
            self.ready_calls += 1;
            Ok(())
        }

        fn confirm_candidate(
            &mut self,
            _description: &str,
            sender: Ipv4Addr,
        ) -> Result<bool, Error> {
            self.confirmations.push(sender);
            Ok(self.answers.pop().expect("unexpected confirmation request"))
        }

        fn manual_entry(&mut self) -> Result<Option<Endpoint>, Error> {
            Ok(None)
        }
    }

    struct NoInterfaces;

    impl BroadcastAddressSource for NoInterfaces {
        fn broadcast_addresses(&self) -> Vec<Ipv4Addr> {
            Vec::new()
        }
    }

    fn from(address: [u8; 4]) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::from(address), 23456))
    }

    fn reply(description: &str, port: &str) -> Vec<u8> {
        format!("{DISCOVER_CONFIRM}\n{description}\n{port}").into_bytes()
    }

    #[test]
    fn parses_three_line_reply() {
        let parsed = parse_reply(&reply("Pixel 6 (Alice)", "23457")).unwrap();
        assert_eq!(parsed.description, "Pixel 6 (Alice)");
        assert_eq!(parsed.tcp_port, "23457");
    }

    #[test]
    fn parse_strips_trailing_padding() {
        let mut raw = reply("Pixel", "23457");
        raw.extend_from_slice(b"\0\0  ");
        assert!(parse_reply(&raw).is_some());
    }

    #[test]
    fn rejects_wrong_token_and_short_replies() {
        assert!(parse_reply(DISCOVER_REQUEST.as_bytes()).is_none());
        assert!(parse_reply(b"hello\nworld\n23457").is_none());
        assert!(parse_reply(format!("{DISCOVER_CONFIRM}\nPixel").as_bytes()).is_none());
        assert!(parse_reply(&[0xff, 0xfe, 0xfd]).is_none());
    }

    #[test]
    fn empty_source_fails_before_the_ready_gate() {
        let mut engine = DiscoveryEngine::new(&NoInterfaces);
        let mut operator = Scripted::new(vec![]);
        let found = engine.find_phone(&mut operator).unwrap();
        assert!(found.is_none());
        assert_eq!(operator.ready_calls, 0);
    }

    #[test]
    fn first_accepted_candidate_wins() {
        let mut engine = DiscoveryEngine::new(&NoInterfaces);
        let mut operator = Scripted::new(vec![false, true]);

        let first = engine
            .consider(&reply("Pixel (Alice)", "23457"), from([192, 168, 1, 50]), &mut operator)
            .unwrap();
        assert!(first.is_none());

        let second = engine
            .consider(&reply("Pixel (Bob)", "23458"), from([192, 168, 1, 60]), &mut operator)
            .unwrap()
            .expect("accepted candidate");
        assert_eq!(second.address, Ipv4Addr::new(192, 168, 1, 60));
        assert_eq!(second.port, 23458);
    }

    #[test]
    fn declined_host_is_never_re_presented() {
        let mut engine = DiscoveryEngine::new(&NoInterfaces);
        let mut operator = Scripted::new(vec![false]);
        let sender = from([192, 168, 1, 50]);

        assert!(engine
            .consider(&reply("Pixel", "23457"), sender, &mut operator)
            .unwrap()
            .is_none());

        // Same host replies again, twice; the operator is not asked.
        for _ in 0..2 {
            assert!(engine
                .consider(&reply("Pixel", "23457"), sender, &mut operator)
                .unwrap()
                .is_none());
        }
        assert_eq!(operator.confirmations.len(), 1);
    }

    #[test]
    fn malformed_replies_are_ignored_without_confirmation() {
        let mut engine = DiscoveryEngine::new(&NoInterfaces);
        let mut operator = Scripted::new(vec![]);

        let outcome = engine
            .consider(b"something else entirely", from([192, 168, 1, 50]), &mut operator)
            .unwrap();
        assert!(outcome.is_none());
        assert!(operator.confirmations.is_empty());
    }

    #[test]
    fn confirmed_candidate_with_bad_port_is_fatal() {
        let mut engine = DiscoveryEngine::new(&NoInterfaces);
        let mut operator = Scripted::new(vec![true]);

        let err = engine
            .consider(&reply("Pixel", "99999"), from([192, 168, 1, 50]), &mut operator)
            .unwrap_err();
        match err {
            Error::BadAdvertisedPort(text) => assert_eq!(text, "99999"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn scan_visits_ports_in_order_with_weighted_tries() {
        assert_eq!(
            probe_plan(),
            vec![(23456, 4), (23457, 2), (23458, 2), (23459, 2), (23460, 2)]
        );
    }

    #[test]
    fn interrupted_wait_stops_the_scan_as_cancellation() {
        let outcome = wait_failure(io::Error::from(ErrorKind::Interrupted), 23456);
        assert!(matches!(outcome, Err(Error::Cancelled)));
    }

    #[test]
    fn other_wait_errors_are_absorbed() {
        let outcome = wait_failure(io::Error::from(ErrorKind::PermissionDenied), 23456);
        assert!(matches!(outcome, Ok(None)));
    }

    #[test]
    fn cancellation_propagates_from_confirmation() {
        struct Cancels;
        impl Operator for Cancels {
            fn wait_until_ready(&mut self) -> Result<(), Error> {
                Ok(())
            }
            fn confirm_candidate(&mut self, _: &str, _: Ipv4Addr) -> Result<bool, Error> {
                Err(Error::Cancelled)
            }
            fn manual_entry(&mut self) -> Result<Option<Endpoint>, Error> {
                Ok(None)
            }
        }

        let mut engine = DiscoveryEngine::new(&NoInterfaces);
        let err = engine
            .consider(&reply("Pixel", "23457"), from([192, 168, 1, 50]), &mut Cancels)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
