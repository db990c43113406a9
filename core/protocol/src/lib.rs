//! Shexter protocol core
//!
//! Everything needed to find the phone-side Shexter server on the local
//! network and talk to it:
//!
//! - UDP broadcast discovery across a small fixed port range, with operator
//!   confirmation of candidates
//! - the length-prefixed TCP request/response exchange
//! - endpoint persistence keyed by the machine's outbound local address
//!
//! The CLI layer supplies the interactive pieces through the
//! [`operator::Operator`] trait; nothing in here reads stdin directly.

pub mod broadcast;
pub mod config;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod operator;
pub mod port;
pub mod session;

pub use endpoint::Endpoint;
pub use error::{Error, SessionError};
