//! Shared fixtures for the ring tests.
//!
//! Every test gets its own port block and its own data directory, so tests
//! can run in parallel and never read another test's dump files.
#![allow(dead_code)]

use std::time::Duration;

use mailring_node::Endpoint;
use mailring_node::NodeConfig;
use mailring_node::Ring;
use mailring_node::RingConfig;
use tempfile::TempDir;

pub const STABILIZE_INTERVAL: Duration = Duration::from_millis(500);

pub struct TestRing {
    pub ring: Ring,
    data_dir: TempDir,
}

impl TestRing {
    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            stabilize_interval: STABILIZE_INTERVAL,
            data_dir: self.data_dir.path().to_path_buf(),
        }
    }
}

pub fn ring_config(ports: &[u16]) -> RingConfig {
    RingConfig {
        entities: ports
            .iter()
            .map(|&port| Endpoint {
                address: "127.0.0.1".to_string(),
                port,
            })
            .collect(),
    }
}

pub async fn spawn_ring(ports: &[u16]) -> TestRing {
    let data_dir = TempDir::new().expect("create test data dir");
    let node_config = NodeConfig {
        stabilize_interval: STABILIZE_INTERVAL,
        data_dir: data_dir.path().to_path_buf(),
    };
    let ring = Ring::from_config(&ring_config(ports), node_config)
        .await
        .expect("spawn test ring");
    TestRing { ring, data_dir }
}
