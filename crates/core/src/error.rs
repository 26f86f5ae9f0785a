//! Errors of the core model.

/// A wrapped `Result` for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds produced by the core model.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error")]
    Serialize(#[source] serde_json::Error),

    #[error("JSON deserialization error")]
    Deserialize(#[source] serde_json::Error),

    #[error("Binary serialization error")]
    BincodeSerialize(#[source] bincode::Error),

    #[error("Binary deserialization error")]
    BincodeDeserialize(#[source] bincode::Error),
}
