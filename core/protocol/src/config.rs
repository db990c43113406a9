//! Endpoint persistence and startup resolution.
//!
//! The stored configuration maps the machine's outbound local IPv4
//! address (the Local Identity Key) to the endpoint confirmed for that
//! network, one TOML table per key, under the per-user configuration
//! directory. Entries are overwritten when re-confirmed and never pruned
//! automatically.
//!
//! Resolution order: stored entry for the current key, then discovery,
//! then manual entry. Whatever is obtained is written back immediately.
//! Writes are full-file rewrites; access is single-instance and
//! single-threaded, so no locking discipline is required.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};

use crate::broadcast::BroadcastAddressSource;
use crate::discovery::DiscoveryEngine;
use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::operator::Operator;
use crate::port::port_in_range;

/// Directory under the per-user configuration directory.
const APP_DIR: &str = "shexter";

/// Settings file name.
const SETTINGS_FILE: &str = "shexter.toml";

/// Well-known external address used to learn the outbound local address.
/// Connecting a UDP socket only selects a route; no packet is sent.
const OUTBOUND_PROBE_ADDR: &str = "8.8.8.8:80";

// ============================================================================
// Local identity
// ============================================================================

/// The machine's outbound-routable IPv4 address, as a lookup key.
///
/// Recomputed on every run, never cached across process lifetimes. Fails
/// when the network is unreachable.
pub fn local_identity_key() -> Result<String, Error> {
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(Error::LocalAddress)?;
    socket
        .connect(OUTBOUND_PROBE_ADDR)
        .map_err(Error::LocalAddress)?;
    let addr = socket.local_addr().map_err(Error::LocalAddress)?;

    if addr.ip().is_unspecified() {
        return Err(Error::LocalAddress(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no outbound address assigned",
        )));
    }
    Ok(addr.ip().to_string())
}

// ============================================================================
// Endpoint store
// ============================================================================

type StoredMap = BTreeMap<String, Endpoint>;

/// Persisted endpoint map, one entry per Local Identity Key.
pub struct EndpointStore {
    path: PathBuf,
}

impl EndpointStore {
    /// Store under the platform's per-user configuration directory.
    pub fn open_default() -> Result<Self, Error> {
        let base = dirs::config_dir().ok_or(Error::NoConfigDir)?;
        Ok(Self::at(base.join(APP_DIR).join(SETTINGS_FILE)))
    }

    /// Store at an explicit path (tests point this at a scratch dir).
    pub fn at(path: PathBuf) -> Self {
        EndpointStore { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Endpoint recorded for `key`, if present and still valid.
    ///
    /// An entry whose port no longer passes validation counts as missing,
    /// forcing a new resolution without touching the file.
    pub fn lookup(&self, key: &str) -> Option<Endpoint> {
        let endpoint = self.load().get(key).copied()?;
        if !port_in_range(endpoint.port) {
            log::warn!(
                "stored endpoint for {} has out-of-range port {}; ignoring",
                key,
                endpoint.port
            );
            return None;
        }
        Some(endpoint)
    }

    /// Record `endpoint` under `key`, overwriting any prior entry, and
    /// persist the whole file immediately.
    pub fn record(&self, key: &str, endpoint: Endpoint) -> Result<(), Error> {
        let mut map = self.load();
        map.insert(key.to_string(), endpoint);
        self.save(&map)?;
        log::info!("recorded endpoint {} for {}", endpoint, key);
        Ok(())
    }

    fn load(&self) -> StoredMap {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(_) => return StoredMap::new(),
        };
        match toml::from_str(&text) {
            Ok(map) => map,
            Err(err) => {
                log::warn!(
                    "could not parse {}: {}; starting fresh",
                    self.path.display(),
                    err
                );
                StoredMap::new()
            }
        }
    }

    fn save(&self, map: &StoredMap) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::ConfigIo {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = toml::to_string(map)?;
        fs::write(&self.path, text).map_err(|source| Error::ConfigIo {
            path: self.path.clone(),
            source,
        })
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the endpoint to use for this run.
///
/// Looks up the stored endpoint for the current Local Identity Key unless
/// `force_new`; otherwise runs discovery, then offers manual entry. The
/// obtained endpoint is persisted under the key before returning. Fails
/// with [`Error::NoEndpoint`] when every path comes up empty.
pub fn resolve(
    store: &EndpointStore,
    source: &dyn BroadcastAddressSource,
    operator: &mut dyn Operator,
    force_new: bool,
) -> Result<Endpoint, Error> {
    let key = local_identity_key()?;
    resolve_for_key(store, source, operator, &key, force_new)
}

fn resolve_for_key(
    store: &EndpointStore,
    source: &dyn BroadcastAddressSource,
    operator: &mut dyn Operator,
    key: &str,
    force_new: bool,
) -> Result<Endpoint, Error> {
    if !force_new {
        if let Some(endpoint) = store.lookup(key) {
            log::debug!("using stored endpoint {} for {}", endpoint, key);
            return Ok(endpoint);
        }
        log::info!("no stored endpoint for {}; starting discovery", key);
    }

    let mut engine = DiscoveryEngine::new(source);
    let endpoint = discovered_or_manual(engine.find_phone(operator), operator)?;

    store.record(key, endpoint)?;
    Ok(endpoint)
}

/// Turn a discovery outcome into an endpoint, offering manual entry when
/// the scan found nothing or a confirmed phone advertised an unusable
/// port. The scan itself is never resumed either way.
fn discovered_or_manual(
    outcome: Result<Option<Endpoint>, Error>,
    operator: &mut dyn Operator,
) -> Result<Endpoint, Error> {
    let found = match outcome {
        Ok(found) => found,
        Err(Error::BadAdvertisedPort(port)) => {
            log::warn!(
                "confirmed phone advertised unusable port {:?}; manual configuration required",
                port
            );
            None
        }
        Err(err) => return Err(err),
    };

    match found {
        Some(endpoint) => Ok(endpoint),
        None => operator.manual_entry()?.ok_or(Error::NoEndpoint),
    }
}

// ============================================================================
// Tests
// ============================================================================
