//! The request context tree, its derived state machine, the executor, and
//! the external-interface traits a host implements (§4.5–§4.7, §6).

pub mod context;
pub mod executor;
pub mod payload;
pub mod traits;
pub mod verifier_registry;

pub use context::{ContextType, CtxState, RequestContext, VerificationState};
pub use executor::{build_transport_request, execute, send, Engine, EngineConfig, Step};
pub use payload::{build_payload, build_request_object, rewrite_url, RequestConfig, RpcRequest};
pub use traits::{
    Cache, PreHandleOutcome, RawResponse, Signer, SigningMode, Transport, TransportRequest,
    VerifyContext, VerifyOutcome, Verifier,
};
pub use verifier_registry::VerifierRegistry;
