//! Network-origin allow-listing, the first and cheapest authorization stage.

use std::net::IpAddr;

use tracing::{debug, info, warn};

use super::error::GatewayError;

/// Exact-match allow-list of peer addresses.
///
/// Runs before any byte is read from the peer. No prefix or subnet matching
/// and no name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginGate {
    allowed: Vec<IpAddr>,
}

impl OriginGate {
    /// Build a gate from the configured allow-list.
    pub fn new(allowed: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// Addresses on the allow-list.
    #[must_use]
    pub fn allowed(&self) -> &[IpAddr] {
        &self.allowed
    }

    /// Whether `origin` exactly matches an allow-listed address.
    #[must_use]
    pub fn check(&self, origin: IpAddr) -> bool {
        let allowed = self.allowed.contains(&origin);
        if allowed {
            debug!(origin = %origin, "Origin is allow-listed");
        } else {
            warn!(
                origin = %origin,
                allowed = ?self.allowed,
                "Origin is not allow-listed"
            );
        }
        allowed
    }

    /// Find an allow-listed address among this host's IPv4 interfaces.
    ///
    /// Used when the gateway runs a local console session instead of serving
    /// remote peers: the host itself must sit on an authorized address.
    ///
    /// # Errors
    ///
    /// [`GatewayError::TransportRead`] if the interface list cannot be read.
    pub fn check_local_interfaces(&self) -> Result<Option<IpAddr>, GatewayError> {
        for (name, addr) in local_ipv4_addresses()? {
            if self.allowed.contains(&addr) {
                info!(interface = %name, address = %addr, "Authorized local interface found");
                return Ok(Some(addr));
            }
            debug!(interface = %name, address = %addr, "Interface address not allow-listed");
        }
        warn!(allowed = ?self.allowed, "No allow-listed address on any local interface");
        Ok(None)
    }
}

#[cfg(unix)]
fn local_ipv4_addresses() -> Result<Vec<(String, IpAddr)>, GatewayError> {
    use nix::ifaddrs::getifaddrs;

    let interfaces = getifaddrs()
        .map_err(|errno| GatewayError::TransportRead(std::io::Error::from(errno)))?;
    Ok(interfaces
        .filter_map(|ifaddr| {
            let addr = ifaddr.address?;
            let v4 = addr.as_sockaddr_in()?;
            Some((ifaddr.interface_name, IpAddr::V4(v4.ip())))
        })
        .collect())
}

#[cfg(not(unix))]
fn local_ipv4_addresses() -> Result<Vec<(String, IpAddr)>, GatewayError> {
    Ok(vec![(
        "loopback".to_string(),
        IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
    )])
}
