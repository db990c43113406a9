//! The phone's TCP endpoint as discovered, entered, or persisted.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// An (address, port) pair identifying the phone's TCP listener.
///
/// The port has already passed validation wherever an `Endpoint` is
/// constructed; once handed to a caller it never changes for that session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        Endpoint { address, port }
    }

    /// Parse an operator-entered IPv4 literal.
    pub fn parse_address(text: &str) -> Result<Ipv4Addr, Error> {
        text.trim()
            .parse()
            .map_err(|_| Error::InvalidAddress(text.to_string()))
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, self.port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}
