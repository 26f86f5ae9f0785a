#![warn(missing_docs)]
//! The identifier space of the ring and the structures built on it.

pub mod finger;
pub mod key;
pub mod peer;

pub use finger::FingerTable;
pub use key::between;
pub use key::Key;
pub use peer::PeerInfo;
