//! Interactive gates between the protocol core and the operator.
//!
//! Discovery and endpoint resolution block on operator decisions: the
//! ready gate before probing, candidate confirmation, and manual entry.
//! The core only sees those through this trait, so the CLI can wire them
//! to stdin and tests can script them.
//!
//! Every method may return [`Error::Cancelled`] when the operator
//! interrupts; the current operation unwinds cleanly and is not retried.

use std::net::Ipv4Addr;

use crate::endpoint::Endpoint;
use crate::error::Error;

pub trait Operator {
    /// Gate before probing starts: the phone app must be open to answer.
    fn wait_until_ready(&mut self) -> Result<(), Error>;

    /// Binary confirmation that a discovered candidate is the right phone.
    fn confirm_candidate(&mut self, description: &str, sender: Ipv4Addr) -> Result<bool, Error>;

    /// Offer manual endpoint entry after discovery found nothing.
    ///
    /// `Ok(None)` means the operator declined to enter one.
    fn manual_entry(&mut self) -> Result<Option<Endpoint>, Error>;
}
