use std::net::IpAddr;

use ipnetwork::IpNetwork;

use crate::Error;

/// Parses a lookup key into the network it covers.
///
/// A bare address becomes a host network (`/32` or `/128`). Host bits of a
/// CIDR key are cleared, so `10.1.2.3/8` queries `10.0.0.0/8`.
pub fn parse_key(key: &str) -> Result<IpNetwork, Error> {
    if key.contains('/') {
        let network: IpNetwork = key.parse().map_err(|e| Error::invalid_input(key, e))?;
        return IpNetwork::new(network.network(), network.prefix())
            .map_err(|e| Error::invalid_input(key, e));
    }

    let ip: IpAddr = key.parse().map_err(|e| Error::invalid_input(key, e))?;
    let prefix = match ip {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    IpNetwork::new(ip, prefix).map_err(|e| Error::invalid_input(key, e))
}

/// The network of `prefix_len` bits that contains `ip`.
///
/// IPv4 lookups start at the IPv4 subtree even in IPv6 databases, so their
/// depth is already an IPv4 prefix length.
pub fn containing_network(ip: IpAddr, prefix_len: usize) -> Result<IpNetwork, Error> {
    let prefix = u8::try_from(prefix_len).map_err(|e| Error::invalid_input(ip.to_string(), e))?;
    let network = IpNetwork::new(ip, prefix).map_err(|e| Error::invalid_input(ip.to_string(), e))?;
    IpNetwork::new(network.network(), prefix).map_err(|e| Error::invalid_input(ip.to_string(), e))
}
