use thiserror::Error;

/// Shared error type for the engine, covering the error kinds of §7.
///
/// `code()` mirrors the original's numeric `IN3_E*` codes closely enough
/// that a host surfacing them over JSON-RPC can keep a stable mapping.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("limit reached: {0}")]
    LimitReached(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl Error {
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) => -16_000,
            Error::InvalidData(_) => -16_001,
            Error::NotFound(_) => -16_002,
            Error::OutOfMemory => -16_003,
            Error::Rpc(_) => -16_004,
            Error::LimitReached(_) => -16_005,
            Error::Configuration(_) => -16_006,
            Error::Unknown(_) => -16_007,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
