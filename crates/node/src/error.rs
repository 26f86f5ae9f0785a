//! Errors of the live node and the client facade.

use mailring_core::proto::Fault;

/// A wrapped `Result` for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds produced by the node, the transport and the client.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Couldn't bind node {0}. The connection is probably already taken, try to change the listening port")]
    Bind(String, #[source] std::io::Error),

    #[error("Couldn't reach {0}")]
    Connect(String, #[source] std::io::Error),

    #[error("Call to {0} timed out")]
    Timeout(String),

    #[error("Frame of {0} bytes exceeds the {1} byte cap")]
    FrameTooLarge(usize, usize),

    #[error("Unexpected reply variant from {0}")]
    UnexpectedReply(String),

    #[error("The node at {0} is not online")]
    Offline(String),

    #[error("The client is not logged in to any account")]
    NotLoggedIn,

    #[error("No node of the ring could be started")]
    EmptyRing,

    #[error("Couldn't acquire the {0} lock")]
    Lock(&'static str),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Frame encoding error")]
    Encode(#[source] bincode::Error),

    #[error("Frame decoding error")]
    Decode(#[source] bincode::Error),

    #[error(transparent)]
    Core(#[from] mailring_core::Error),

    #[error(transparent)]
    Fault(#[from] Fault),
}

impl Error {
    /// The wire fault behind this error, if the peer answered with one.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Error::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}
