mod mmdb;
mod network;

use serde::{Deserialize, Serialize};

use crate::Error;

pub use mmdb::{DatabaseInfo, MmdbReader};
pub use network::{containing_network, parse_key};

/// Field map decoded from a database record; the schema depends on the database.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// One database network that matched a lookup key, together with its record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordForNetwork {
    pub network: String,
    pub record: Record,
}

impl RecordForNetwork {
    pub fn new(network: impl Into<String>, record: Record) -> Self {
        Self {
            network: network.into(),
            record,
        }
    }
}

/// Resolves a lookup key to every matching network.
///
/// Implementations are shared across lookup tasks, so `lookup` is called
/// concurrently through `&self`.
pub trait NetworkLookup: Send + Sync {
    fn lookup(&self, key: &str) -> Result<Vec<RecordForNetwork>, Error>;
}

impl<F> NetworkLookup for F
where
    F: Fn(&str) -> Result<Vec<RecordForNetwork>, Error> + Send + Sync,
{
    fn lookup(&self, key: &str) -> Result<Vec<RecordForNetwork>, Error> {
        self(key)
    }
}
