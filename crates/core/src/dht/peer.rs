//! By-value peer descriptors.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use super::key::Key;

/// The coordinates of a node on the ring.
///
/// Peers are always referenced by value; there is no shared ownership across
/// nodes. The id is derived from the connection string, so only the address
/// and port are authoritative: a descriptor rebuilt from them yields the
/// same id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// IP address of the node.
    pub address: String,
    /// Listening port. Multiple nodes may share one address.
    pub port: u16,
    /// Ring position, `hash(address + ":" + port)`.
    pub id: Key,
}

impl PeerInfo {
    /// Build a descriptor, deriving the id from the connection string.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        let address = address.into();
        let id = Key::hash(&format!("{address}:{port}"));
        PeerInfo { address, port, id }
    }

    /// The `address:port` string used to reach the node.
    pub fn conn_string(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}
