//! Discovery of the node's reachable address.

use crate::error::RegistryError;
use reqwest::Url;
use std::net::IpAddr;

/// Finds the address other nodes should use to reach this one.
pub trait AddressDiscovery: Send + Sync {
    /// Resolve a usable address.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AddressResolution`] if nothing usable is found.
    fn discover(&self) -> Result<IpAddr, RegistryError>;
}

/// Uses the interface of the default route.
///
/// Falls back to the first non-loopback IPv4 interface when the default route
/// cannot be determined.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalInterface;

impl AddressDiscovery for LocalInterface {
    fn discover(&self) -> Result<IpAddr, RegistryError> {
        match local_ip_address::local_ip() {
            Ok(ip) if usable(&ip) => {
                tracing::debug!(ip = %ip, "detected local IP address");
                return Ok(ip);
            }
            Ok(ip) => {
                tracing::debug!(ip = %ip, "default route address is not reachable from outside")
            }
            Err(e) => tracing::warn!(error = %e, "failed to detect default route address"),
        }

        let interfaces = local_ip_address::list_afinet_netifas()
            .map_err(|e| RegistryError::AddressResolution(e.to_string()))?;
        interfaces
            .into_iter()
            .map(|(_, ip)| ip)
            .find(|ip| ip.is_ipv4() && usable(ip))
            .ok_or_else(|| {
                RegistryError::AddressResolution("no non-loopback IPv4 interface found".into())
            })
    }
}

/// Always returns the same address. Useful in tests and behind NAT.
#[derive(Debug, Clone, Copy)]
pub struct FixedAddress(pub IpAddr);

impl AddressDiscovery for FixedAddress {
    fn discover(&self) -> Result<IpAddr, RegistryError> {
        Ok(self.0)
    }
}

fn usable(ip: &IpAddr) -> bool {
    !ip.is_loopback() && !ip.is_unspecified()
}

/// Build the node's base URI from a discovered address.
///
/// # Errors
///
/// Returns [`RegistryError::AddressResolution`] if the parts do not form a URI.
pub fn self_uri(ip: IpAddr, scheme: &str, port: u16) -> Result<Url, RegistryError> {
    let host = match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    };
    let raw = format!("{}://{}:{}/", scheme, host, port);
    Url::parse(&raw).map_err(|e| RegistryError::AddressResolution(format!("{}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_self_uri() {
        let uri = self_uri(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), "http", 5000).unwrap();
        assert_eq!(uri.as_str(), "http://10.0.0.5:5000/");

        let uri = self_uri(IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)), "https", 8443)
            .unwrap();
        assert_eq!(uri.as_str(), "https://[fe80::1]:8443/");
    }

    #[test]
    fn test_unusable_addresses() {
        assert!(!usable(&IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(!usable(&IpAddr::V4(Ipv4Addr::UNSPECIFIED)));
        assert!(!usable(&IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(usable(&IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))));
    }

    #[test]
    fn test_fixed_address() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(FixedAddress(ip).discover().unwrap(), ip);
    }
}
