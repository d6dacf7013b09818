use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
    path::Path,
};

use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use maxminddb::{MaxMindDbError, Reader};
use serde_json::Value;

use crate::Error;

use super::{NetworkLookup, Record, RecordForNetwork, containing_network, parse_key};

/// IPv6 ranges that IPv6 databases point at their IPv4 subtree, with the
/// prefix length after which the embedded IPv4 address starts.
const IPV4_ALIASES: [(Ipv6Addr, u8); 2] = [
    (Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0, 0), 96),
    (Ipv6Addr::new(0x2002, 0, 0, 0, 0, 0, 0, 0), 16),
];

/// A MaxMind DB file loaded into memory.
pub struct MmdbReader {
    reader: Reader<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub database_type: String,
    pub ip_version: u16,
    pub build_epoch: u64,
    pub node_count: u32,
}

impl fmt::Display for DatabaseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (IPv{}, {} nodes, built at {})",
            self.database_type, self.ip_version, self.node_count, self.build_epoch
        )
    }
}

impl MmdbReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("opening database {}", path.display());
        let reader = Reader::open_readfile(path)?;
        Ok(Self { reader })
    }

    pub fn info(&self) -> DatabaseInfo {
        let metadata = &self.reader.metadata;
        DatabaseInfo {
            database_type: metadata.database_type.clone(),
            ip_version: metadata.ip_version,
            build_epoch: metadata.build_epoch,
            node_count: metadata.node_count,
        }
    }

    /// Every database network overlapping `network`.
    ///
    /// When the query sits inside a single database network (always the case
    /// for a bare address) the result is that one containing network, so the
    /// reported network can be wider than the key.
    pub fn records_for_network(
        &self,
        key: &str,
        network: IpNetwork,
    ) -> Result<Vec<RecordForNetwork>, Error> {
        let address = network.network();
        let (found, depth) = self.reader.lookup_prefix::<Value>(address)?;
        let containing = containing_network(address, depth)?;

        if containing.prefix() <= network.prefix() {
            return match found {
                Some(value) => Ok(vec![RecordForNetwork::new(
                    containing.to_string(),
                    into_record(key, value)?,
                )]),
                None => Ok(Vec::new()),
            };
        }

        let mut records = Vec::new();
        let mut listed = Vec::new();
        for item in self.reader.within::<Value>(network)? {
            let item = item?;
            listed.push(item.ip_net);
            records.push(RecordForNetwork::new(
                item.ip_net.to_string(),
                into_record(key, item.info)?,
            ));
        }

        if let IpNetwork::V6(query) = network
            && self.reader.metadata.ip_version == 6
        {
            for (prefix, len) in IPV4_ALIASES {
                // a range holding its own data is not an alias
                if covers(query, prefix, len) && !listed.iter().any(|net| inside(net, prefix, len))
                {
                    self.aliased_records(key, prefix, len, &mut records)?;
                }
            }
        }
        Ok(records)
    }

    /// The IPv4 subtree as seen through one alias range. `within` skips alias
    /// nodes, so the subtree is walked as IPv4 and mapped back.
    fn aliased_records(
        &self,
        key: &str,
        prefix: Ipv6Addr,
        len: u8,
        records: &mut Vec<RecordForNetwork>,
    ) -> Result<(), Error> {
        let everything = Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0)
            .map_err(MaxMindDbError::InvalidNetwork)?;
        for item in self.reader.within::<Value>(IpNetwork::V4(everything))? {
            let item = item?;
            let IpNetwork::V4(v4) = item.ip_net else {
                continue;
            };
            records.push(RecordForNetwork::new(
                embed_ipv4(prefix, len, v4)?.to_string(),
                into_record(key, item.info)?,
            ));
        }
        Ok(())
    }
}

fn mask(bits: u128, len: u8) -> u128 {
    match len {
        0 => 0,
        len => bits & (u128::MAX << (128 - u32::from(len))),
    }
}

/// Whether `query` contains the whole range `prefix/len`.
fn covers(query: Ipv6Network, prefix: Ipv6Addr, len: u8) -> bool {
    query.prefix() <= len && mask(u128::from(prefix), query.prefix()) == u128::from(query.network())
}

fn inside(net: &IpNetwork, prefix: Ipv6Addr, len: u8) -> bool {
    match net {
        IpNetwork::V6(net) => {
            net.prefix() >= len && mask(u128::from(net.network()), len) == u128::from(prefix)
        }
        IpNetwork::V4(_) => false,
    }
}

fn embed_ipv4(prefix: Ipv6Addr, len: u8, v4: Ipv4Network) -> Result<Ipv6Network, Error> {
    let shift = 128 - 32 - u32::from(len);
    let bits = u128::from(prefix) | (u128::from(u32::from(v4.network())) << shift);
    Ipv6Network::new(Ipv6Addr::from(bits), len + v4.prefix())
        .map_err(|e| MaxMindDbError::InvalidNetwork(e).into())
}

impl NetworkLookup for MmdbReader {
    fn lookup(&self, key: &str) -> Result<Vec<RecordForNetwork>, Error> {
        let network = parse_key(key)?;
        if network.is_ipv6() && self.reader.metadata.ip_version == 4 {
            return Err(Error::invalid_input(
                key,
                "IPv6 network in an IPv4-only database",
            ));
        }
        self.records_for_network(key, network)
    }
}

fn into_record(key: &str, value: Value) -> Result<Record, Error> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::unexpected_shape(key, &other)),
    }
}
