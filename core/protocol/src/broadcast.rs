//! IPv4 broadcast address enumeration.
//!
//! Discovery probes every usable interface's broadcast address. How those
//! addresses are obtained is platform-specific: on Unix we walk
//! `getifaddrs` and compute `address | !netmask`; on Windows we parse the
//! output of `ipconfig`. Both sit behind [`BroadcastAddressSource`],
//! selected once at startup.
//!
//! An empty result is never an error. It means automatic discovery is
//! unavailable on this host and the caller falls back to manual entry.

use std::net::Ipv4Addr;

/// The loopback interface shows up with this broadcast on some systems;
/// never probe it.
const LOOPBACK_BROADCAST: Ipv4Addr = Ipv4Addr::new(127, 255, 255, 255);

// ============================================================================
// Capability interface
// ============================================================================

/// Where the host's IPv4 broadcast addresses come from.
pub trait BroadcastAddressSource {
    /// Every usable interface broadcast address, in interface order,
    /// without duplicates.
    fn broadcast_addresses(&self) -> Vec<Ipv4Addr>;
}

/// The platform's default source, chosen at startup.
#[cfg(unix)]
pub fn platform_source() -> Box<dyn BroadcastAddressSource> {
    Box::new(IfAddrsSource)
}

/// The platform's default source, chosen at startup.
#[cfg(windows)]
pub fn platform_source() -> Box<dyn BroadcastAddressSource> {
    Box::new(IpconfigSource)
}

/// Broadcast address for one interface: `address | !netmask`.
///
/// Returns `None` for loopback interfaces and for interfaces whose
/// netmask is absent (all-zero), where no broadcast can be computed.
pub fn broadcast_of(address: Ipv4Addr, netmask: Ipv4Addr) -> Option<Ipv4Addr> {
    if address.is_loopback() || netmask.is_unspecified() {
        return None;
    }
    let broadcast = Ipv4Addr::from(u32::from(address) | !u32::from(netmask));
    if broadcast == LOOPBACK_BROADCAST {
        return None;
    }
    Some(broadcast)
}

// ============================================================================
// Unix: getifaddrs
// ============================================================================

/// Enumerates interfaces through `libc::getifaddrs`.
#[cfg(unix)]
pub struct IfAddrsSource;

#[cfg(unix)]
impl BroadcastAddressSource for IfAddrsSource {
    fn broadcast_addresses(&self) -> Vec<Ipv4Addr> {
        let mut out = Vec::new();

        unsafe {
            let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();
            if libc::getifaddrs(&mut ifaddrs) != 0 {
                log::warn!("getifaddrs failed; automatic discovery unavailable");
                return out;
            }

            let mut current = ifaddrs;
            while !current.is_null() {
                let ifa = &*current;

                if !ifa.ifa_addr.is_null() && !ifa.ifa_netmask.is_null() {
                    let family = (*ifa.ifa_addr).sa_family as i32;
                    if family == libc::AF_INET {
                        let address = ipv4_of(ifa.ifa_addr as *const libc::sockaddr_in);
                        let netmask = ipv4_of(ifa.ifa_netmask as *const libc::sockaddr_in);

                        if let Some(broadcast) = broadcast_of(address, netmask) {
                            if !out.contains(&broadcast) {
                                out.push(broadcast);
                            }
                        }
                    }
                }

                current = ifa.ifa_next;
            }

            libc::freeifaddrs(ifaddrs);
        }

        log::debug!("broadcast addresses: {:?}", out);
        out
    }
}

#[cfg(unix)]
unsafe fn ipv4_of(sockaddr: *const libc::sockaddr_in) -> Ipv4Addr {
    let bytes = (*sockaddr).sin_addr.s_addr.to_ne_bytes();
    Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])
}

// ============================================================================
// Windows: ipconfig
// ============================================================================

/// Enumerates interfaces by parsing `ipconfig` output.
#[cfg(windows)]
pub struct IpconfigSource;

#[cfg(windows)]
impl BroadcastAddressSource for IpconfigSource {
    fn broadcast_addresses(&self) -> Vec<Ipv4Addr> {
        match std::process::Command::new("ipconfig").output() {
            Ok(output) => {
                let out = parse_ipconfig(&String::from_utf8_lossy(&output.stdout));
                log::debug!("broadcast addresses: {:?}", out);
                out
            }
            Err(err) => {
                log::warn!("could not run ipconfig: {}", err);
                Vec::new()
            }
        }
    }
}

/// Parse `ipconfig` output. Each "IPv4 Address" line paired with the
/// "Subnet Mask" line that follows it yields one broadcast address.
pub fn parse_ipconfig(output: &str) -> Vec<Ipv4Addr> {
    let mut out = Vec::new();
    let mut pending: Option<Ipv4Addr> = None;

    for line in output.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        if label.contains("IPv4 Address") {
            pending = value.parse().ok();
        } else if label.contains("Subnet Mask") {
            if let (Some(address), Ok(netmask)) = (pending.take(), value.parse()) {
                if let Some(broadcast) = broadcast_of(address, netmask) {
                    if !out.contains(&broadcast) {
                        out.push(broadcast);
                    }
                }
            }
        }
    }

    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_slash_24_broadcast() {
        let broadcast = broadcast_of(
            Ipv4Addr::new(192, 168, 1, 7),
            Ipv4Addr::new(255, 255, 255, 0),
        );
        assert_eq!(broadcast, Some(Ipv4Addr::new(192, 168, 1, 255)));
    }

    #[test]
    fn computes_slash_16_broadcast() {
        let broadcast = broadcast_of(
            Ipv4Addr::new(10, 42, 3, 9),
            Ipv4Addr::new(255, 255, 0, 0),
        );
        assert_eq!(broadcast, Some(Ipv4Addr::new(10, 42, 255, 255)));
    }

    #[test]
    fn excludes_loopback() {
        let broadcast = broadcast_of(
            Ipv4Addr::new(127, 0, 0, 1),
            Ipv4Addr::new(255, 0, 0, 0),
        );
        assert_eq!(broadcast, None);
    }

    #[test]
    fn excludes_missing_netmask() {
        let broadcast = broadcast_of(
            Ipv4Addr::new(192, 168, 1, 7),
            Ipv4Addr::new(0, 0, 0, 0),
        );
        assert_eq!(broadcast, None);
    }

    #[test]
    fn parses_ipconfig_pairs() {
        let output = "\
Windows IP Configuration

Ethernet adapter Ethernet:

   Connection-specific DNS Suffix  . : home
   IPv4 Address. . . . . . . . . . . : 192.168.1.7
   Subnet Mask . . . . . . . . . . . : 255.255.255.0
   Default Gateway . . . . . . . . . : 192.168.1.1

Wireless LAN adapter Wi-Fi:

   IPv4 Address. . . . . . . . . . . : 10.0.0.5
   Subnet Mask . . . . . . . . . . . : 255.255.0.0
";
        let out = parse_ipconfig(output);
        assert_eq!(
            out,
            vec![
                Ipv4Addr::new(192, 168, 1, 255),
                Ipv4Addr::new(10, 0, 255, 255),
            ]
        );
    }

    #[test]
    fn ipconfig_without_addresses_is_empty() {
        assert!(parse_ipconfig("Windows IP Configuration\n").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn enumeration_does_not_panic() {
        // Content depends on the host; loopback must never appear.
        let out = IfAddrsSource.broadcast_addresses();
        assert!(!out.contains(&Ipv4Addr::new(127, 255, 255, 255)));
    }
}
