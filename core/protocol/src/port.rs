//! Port validation shared by discovery, manual entry, and the stored config.

use crate::error::Error;

/// Lowest port the phone may advertise or the operator may enter.
pub const PORT_MIN_VALID: u16 = 1025;

/// Highest port the phone may advertise or the operator may enter.
pub const PORT_MAX_VALID: u16 = 49150;

/// Parse a textual port and bounds-check it.
pub fn parse_port(text: &str) -> Result<u16, Error> {
    text.trim()
        .parse::<u16>()
        .ok()
        .filter(|port| port_in_range(*port))
        .ok_or_else(|| Error::InvalidPort(text.to_string()))
}

/// Whether an already-numeric port falls in the accepted range.
pub fn port_in_range(port: u16) -> bool {
    (PORT_MIN_VALID..=PORT_MAX_VALID).contains(&port)
}
