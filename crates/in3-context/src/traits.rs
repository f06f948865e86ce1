//! External interfaces the engine depends on but never implements itself
//! (§6): the host supplies these, the engine only calls through them.

use in3_types::{Address, Error, Result};

/// A single node's raw response slot, filled exactly once by the transport.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub result: String,
    pub error: String,
}

impl RawResponse {
    pub fn is_empty_slot(&self) -> bool {
        self.result.is_empty() && self.error.is_empty()
    }
}

/// One outgoing transport request: a JSON payload fanned out to N node URLs,
/// each with its own pre-allocated response slot.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub payload: String,
    pub urls: Vec<String>,
}

/// Delivers a built payload to a set of node URLs and fills one
/// [`RawResponse`] per URL. May be synchronous or run its own async
/// machinery, as long as every slot is populated before it returns (§6).
pub trait Transport {
    fn send(&self, request: &TransportRequest) -> Result<Vec<RawResponse>>;
}

/// Signing mode requested of the host signer. Only EC-HASH exists today;
/// the enum exists so new modes don't change the trait signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningMode {
    EcHash,
}

/// Produces a 65-byte signature over `data` from `from_address`, called
/// inline by the executor — it must not itself suspend (§5, §6).
pub trait Signer {
    fn sign(&self, mode: SigningMode, data: &[u8], from_address: Address) -> Result<[u8; 65]>;
}

/// Optional write-through cache for nodelists/whitelists (§6). The engine
/// makes no timing guarantees around these calls.
pub trait Cache {
    fn store(&self, key: &str, value: &[u8]) -> Result<()>;
    fn load(&self, key: &str) -> Option<Vec<u8>>;
}

/// Outcome of [`Verifier::verify`].
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    Ok,
    /// The verifier has inserted its own required child context (e.g. to
    /// fetch a validator set change) and wants `find_valid_result` to
    /// suspend. No shipped verifier in this crate produces this variant
    /// today (see DESIGN.md).
    Waiting,
    Failed(Error),
}

/// Outcome of [`Verifier::pre_handle`]: either a synthetic response the
/// executor writes straight into `raw_response` with no node round trip, or
/// a fatal configuration/argument error.
#[derive(Debug, Clone)]
pub enum PreHandleOutcome {
    Handled(serde_json::Value),
    Failed(Error),
}

/// Per-chain-type response verification (§6, §4.6). Chain-specific proof
/// checking (Merkle proofs etc.) is out of scope for this crate; the
/// verifiers shipped here are permissive placeholders that always accept a
/// syntactically well-formed response (see `in3-context::verifier_registry`).
pub trait Verifier: Send + Sync {
    fn verify(&self, vctx: &VerifyContext<'_>) -> VerifyOutcome;

    /// Lets a verifier answer an RPC internally without a network round
    /// trip (e.g. a constant-folded method). Default: never applicable.
    fn pre_handle(&self, _method: &str, _params: &serde_json::Value) -> Option<PreHandleOutcome> {
        None
    }
}

/// The data handed to a verifier for one request slot of one node response
/// (§4.6).
pub struct VerifyContext<'a> {
    pub method: &'a str,
    pub result: &'a serde_json::Value,
    pub proof: Option<&'a serde_json::Value>,
    pub last_validator_change: Option<u64>,
    pub current_block: Option<u64>,
}
