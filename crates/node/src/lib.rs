//! A live mailring node and the pieces around it.
//!
//! [Node] binds the RPC listener, answers every operation of the node
//! service and runs the background stabilizer that keeps successor,
//! predecessor and finger pointers converging after membership changes.
//! [Client] is the mail-application facade; [Ring] is the in-process fleet
//! used by the console binary and the test suite.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod ring;
pub mod rpc;
mod server;
mod stabilizer;

pub use client::Client;
pub use config::Endpoint;
pub use config::MockData;
pub use config::RingConfig;
pub use error::Error;
pub use error::Result;
pub use node::Node;
pub use node::NodeConfig;
pub use ring::Ring;
