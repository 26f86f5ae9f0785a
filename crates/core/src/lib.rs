//! Core model of the mailring network.
//!
//! A mailring is a Chord ring (ref: <https://pdos.csail.mit.edu/papers/ton:chord/paper-ton.pdf>)
//! whose stored resources are mailboxes: every node owns the arc of the key
//! space between its predecessor and itself, and a mailbox lives on the node
//! that succeeds the hash of its owner address.
//!
//! This crate holds everything that is independent of the network: the
//! identifier space and its interval arithmetic, peer descriptors, the finger
//! table, the mailbox model and the wire protocol types. The live node, the
//! stabilizer and the client facade are in `mailring-node`.

pub mod consts;
pub mod dht;
pub mod error;
pub mod mail;
pub mod proto;

pub use consts::CHORD_MOD;
pub use consts::M;
pub use dht::between;
pub use dht::FingerTable;
pub use dht::Key;
pub use dht::PeerInfo;
pub use error::Error;
pub use error::Result;
pub use mail::Mailbox;
pub use mail::Message;
