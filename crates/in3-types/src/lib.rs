//! Shared types for the in3 request-execution engine: addresses, chain
//! identifiers, node property bits, proof modes, and the error type every
//! other crate in the workspace propagates via `#[from]`.

pub mod address;
pub mod chain;
pub mod error;
pub mod proof;
pub mod props;

pub use address::{Address, Hash32};
pub use chain::{well_known, ChainType};
pub use error::{Error, Result};
pub use proof::ProofMode;
pub use props::{NodeProps, DEFAULT_PROPS};
