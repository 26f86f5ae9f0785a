//! On-disk configuration: the bootstrap file and the mock-data archive.

use std::fs;
use std::path::Path;

use mailring_core::error::Error as CoreError;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;

/// One `address:port` entry of the bootstrap file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Endpoint {
    /// IP address to bind.
    pub address: String,
    /// Port to bind.
    pub port: u16,
}

/// The bootstrap file: the nodes an in-process ring spawns.
///
/// ```json
/// { "entities": [ { "address": "127.0.0.1", "port": 50001 } ] }
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RingConfig {
    /// Nodes to spawn, in any order.
    pub entities: Vec<Endpoint>,
}

impl RingConfig {
    /// Read a bootstrap file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json).map_err(CoreError::Deserialize)?)
    }
}

/// Sample users and message material for the mock loader.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MockData {
    /// Account addresses.
    pub users: Vec<String>,
    /// Cleartext passwords, index-aligned with `users`.
    pub passwords: Vec<String>,
    /// Subject lines to sample from.
    pub subjects: Vec<String>,
    /// Body texts to sample from.
    pub bodies: Vec<String>,
}

impl MockData {
    /// Read a mock-data archive.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json).map_err(CoreError::Deserialize)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_file_parses() {
        let json = r#"{ "entities": [
            { "address": "127.0.0.1", "port": 50001 },
            { "address": "127.0.0.1", "port": 50002 }
        ] }"#;
        let cfg: RingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.entities.len(), 2);
        assert_eq!(cfg.entities[0].address, "127.0.0.1");
        assert_eq!(cfg.entities[1].port, 50002);
    }
}
