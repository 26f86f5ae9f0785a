//! An in-process ring of nodes.
//!
//! This is the fixture behind the fleet console and the test suite: it
//! spawns every node of a bootstrap file in one process, chains their
//! successor pointers in id order and builds all finger tables, giving a
//! converged ring without waiting for stabilization.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::config::RingConfig;
use crate::error::Error;
use crate::error::Result;
use crate::node::Node;
use crate::node::NodeConfig;

/// A fleet of in-process nodes, kept sorted by id.
///
/// The ring owns its nodes; nodes know nothing about the ring.
pub struct Ring {
    nodes: Vec<Arc<Node>>,
    errors: Vec<String>,
}

impl Ring {
    /// Spawn the ring described by a bootstrap file.
    pub async fn bootstrap(path: impl AsRef<Path>) -> Result<Self> {
        let config = RingConfig::load(path)?;
        Self::from_config(&config, NodeConfig::default()).await
    }

    /// Spawn a ring from an in-memory config. Nodes that fail to bind are
    /// recorded in [Ring::errors] rather than aborting the fleet.
    pub async fn from_config(config: &RingConfig, node_config: NodeConfig) -> Result<Self> {
        let mut nodes = Vec::with_capacity(config.entities.len());
        let mut errors = Vec::new();
        for endpoint in &config.entities {
            match Node::start_with_config(&endpoint.address, endpoint.port, node_config.clone())
                .await
            {
                Ok(node) => nodes.push(node),
                Err(e) => {
                    tracing::error!(error = %e, "node failed to start");
                    errors.push(e.to_string());
                }
            }
        }
        if nodes.is_empty() {
            return Err(Error::EmptyRing);
        }

        nodes.sort_by_key(|node| node.info().id);
        for pair in nodes.windows(2) {
            pair[0].set_successor(pair[1].info().clone()).await?;
        }
        if nodes.len() > 1 {
            let first = nodes[0].info().clone();
            nodes[nodes.len() - 1].set_successor(first).await?;
        }
        for node in &nodes {
            node.build_finger_table().await?;
        }

        Ok(Ring { nodes, errors })
    }

    /// All live nodes, in id order.
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// The node with the smallest id, conventionally used as the entry
    /// point.
    pub fn entry_node(&self) -> &Arc<Node> {
        &self.nodes[0]
    }

    /// Bind failures collected while spawning.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Track an externally started node, keeping id order.
    pub fn push(&mut self, node: Arc<Node>) {
        self.nodes.push(node);
        self.nodes.sort_by_key(|node| node.info().id);
    }

    /// Stop every node in sequence.
    pub async fn shutdown(&mut self) {
        for node in self.nodes.drain(..) {
            node.stop().await;
        }
    }

    /// Write a Graphviz digraph of the successor pointers.
    pub fn dot(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = fs::File::create(path)?;
        writeln!(file, "digraph Ring {{")?;
        for node in &self.nodes {
            let successor = node.successor()?;
            writeln!(file, "\t{} -> {};", node.info().id, successor.id)?;
        }
        write!(file, "}}")?;
        Ok(())
    }
}

impl fmt::Display for Ring {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for error in &self.errors {
            writeln!(f, "{error}")?;
        }
        for node in &self.nodes {
            writeln!(
                f,
                "{} id: {:<20} managing {} mailboxes",
                node.info().conn_string(),
                node.info().id.to_string(),
                node.mailbox_count().unwrap_or(0)
            )?;
        }
        Ok(())
    }
}
