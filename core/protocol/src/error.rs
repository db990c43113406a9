//! Error taxonomy for discovery, resolution, and sessions.
//!
//! Cancellation is an explicit outcome, never an exception: every blocking
//! step returns success, a recoverable failure, or `Cancelled`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from port validation, discovery, and endpoint resolution.
#[derive(Debug, Error)]
pub enum Error {
    /// The text did not parse as a port in the accepted range.
    #[error("\"{0}\" is not a valid port: must be an integer between 1025 and 49150")]
    InvalidPort(String),

    /// The text did not parse as an IPv4 literal.
    #[error("\"{0}\" is not a valid IPv4 address")]
    InvalidAddress(String),

    /// A confirmed phone advertised a TCP port that fails validation.
    /// Ends the scan; resolution may still offer manual entry.
    #[error("the phone advertised an invalid TCP port \"{0}\"; cannot continue")]
    BadAdvertisedPort(String),

    /// Neither discovery nor manual entry produced an endpoint.
    #[error("no phone endpoint configured; run \"shexter config\" to try again")]
    NoEndpoint,

    /// The outbound-routable local address could not be determined.
    #[error("could not determine the local IP address: {0}")]
    LocalAddress(#[source] io::Error),

    /// No per-user configuration directory exists on this platform.
    #[error("could not locate a per-user configuration directory")]
    NoConfigDir,

    /// The settings file or its directory could not be read or written.
    #[error("could not access {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The settings could not be encoded for persistence.
    #[error("could not encode settings: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    /// Operator interrupt. Terminates the current operation, never retried.
    #[error("operation cancelled")]
    Cancelled,

    /// Socket failure outside any per-probe recovery.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures of a single TCP request/response exchange.
///
/// Every variant is terminal for the current call only; the caller decides
/// whether to issue another command. `Cancelled` is the one outcome callers
/// propagate instead of reporting as a network fault.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Nothing is listening at the endpoint.
    #[error("connection refused: the app is likely not running on your phone")]
    ConnectionRefused,

    /// The connect attempt timed out.
    #[error("connection timed out: the phone may be on a different network or the saved endpoint is stale")]
    ConnectTimeout,

    /// The connection dropped while reading the response header.
    #[error("connection reset while reading the response: the server crashed")]
    ServerCrashed,

    /// No response header arrived within the read timeout.
    #[error("timed out waiting for a response: the server is frozen")]
    ServerFrozen,

    /// The 32-byte header was not an ASCII decimal length.
    #[error("response header was not a length: {0:?}")]
    MalformedHeader(String),

    /// Operator interrupt during the connect.
    #[error("connect cancelled")]
    Cancelled,

    /// Any other OS-level error, reported verbatim.
    #[error(transparent)]
    Io(#[from] io::Error),
}
