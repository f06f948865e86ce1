//! Outgoing payload construction (§4.7): turns one request slot plus its
//! verification config into a JSON-RPC request object, optionally carrying
//! an `in3` proof-request object.

use std::sync::atomic::{AtomicU64, Ordering};

use in3_types::{Address, ProofMode};
use serde::Serialize;
use serde_json::{json, Value};

/// Monotonic per-process id counter (`rpc_id_counter` in the original),
/// used whenever a caller does not supply its own request id.
static RPC_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    RPC_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// One user-supplied RPC call, before the `in3` proof object is attached.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub id: Option<u64>,
    pub method: String,
    pub params: Value,
}

/// Per-request verification configuration, filled in by `configure_request`
/// (§4.5 step RPC.d) before the payload is built.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub proof: ProofMode,
    pub chain_id: Option<u64>,
    pub whitelist_contract: Option<Address>,
    pub client_signature: Option<String>,
    pub finality: Option<u32>,
    pub latest_block: Option<u64>,
    pub signers: Vec<Address>,
    pub include_code: bool,
    pub use_full_proof: bool,
    pub use_binary: bool,
    pub verified_hashes: Vec<String>,
}

const PROTOCOL_VERSION: &str = "2.2.0";

/// Builds one JSON-RPC request object, attaching an `in3` sub-object when
/// `config.proof != ProofMode::None`.
pub fn build_request_object(request: &RpcRequest, config: &RequestConfig) -> Value {
    let id = request.id.unwrap_or_else(next_id);
    let mut object = json!({
        "id": id,
        "jsonrpc": "2.0",
        "method": request.method,
        "params": request.params,
    });

    if config.proof != ProofMode::None {
        let mut in3 = serde_json::Map::new();
        in3.insert("verification".into(), json!("proof"));
        in3.insert("version".into(), json!(PROTOCOL_VERSION));
        if let Some(chain_id) = config.chain_id {
            in3.insert("chainId".into(), json!(chain_id));
        }
        if let Some(contract) = &config.whitelist_contract {
            in3.insert("whiteListContract".into(), json!(contract.to_string()));
        }
        if let Some(sig) = &config.client_signature {
            in3.insert("clientSignature".into(), json!(sig));
        }
        if let Some(finality) = config.finality {
            in3.insert("finality".into(), json!(finality));
        }
        if let Some(latest_block) = config.latest_block {
            in3.insert("latestBlock".into(), json!(latest_block));
        }
        if !config.signers.is_empty() {
            let signers: Vec<String> = config.signers.iter().map(|a| a.to_string()).collect();
            in3.insert("signers".into(), json!(signers));
        }
        if config.include_code && request.method == "eth_call" {
            in3.insert("includeCode".into(), json!(true));
        }
        in3.insert("useFullProof".into(), json!(config.use_full_proof));
        in3.insert("useBinary".into(), json!(config.use_binary));
        if !config.verified_hashes.is_empty() {
            in3.insert("verifiedHashes".into(), json!(config.verified_hashes));
        }
        object
            .as_object_mut()
            .expect("request object is always a JSON object")
            .insert("in3".into(), Value::Object(in3));
    }

    object
}

/// Builds the full request batch payload for one context (a JSON array).
pub fn build_payload(requests: &[RpcRequest], configs: &[RequestConfig]) -> String {
    let objects: Vec<Value> = requests
        .iter()
        .zip(configs.iter())
        .map(|(r, c)| build_request_object(r, c))
        .collect();
    Value::Array(objects).to_string()
}

/// Rewrites `https://` to `http://` when the client's `use_http` flag is
/// set (§4.7); otherwise passes the URL through unchanged.
pub fn rewrite_url(url: &str, use_http: bool) -> String {
    if use_http {
        if let Some(rest) = url.strip_prefix("https://") {
            return format!("http://{rest}");
        }
    }
    url.to_string()
}
