//! The executor (§4.5–§4.7): drives one [`RequestContext`] a step at a time
//! (`execute`) and the synchronous driver that performs real I/O between
//! steps (`send`). Nothing here owns a thread or blocks on a socket; `send`
//! is the only function that calls out to the host transport/signer, and it
//! does so exactly once per suspension point (§5).

use std::time::{SystemTime, UNIX_EPOCH};

use in3_registry::{
    apply_nodelist_refresh, parse_whitelist_result, Chain, ChainTable, FAILURE_BLACKLIST_MS,
};
use in3_types::{
    Address, Error, NodeProps, ProofMode, Result, DEFAULT_PROPS, PROP_DATA, PROP_HTTP,
    PROP_MULTICHAIN, PROP_PROOF, PROP_SIGNER,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::{ContextType, CtxState, RequestContext, VerificationState};
use crate::payload::{build_payload, rewrite_url, RequestConfig, RpcRequest};
use crate::traits::{
    Cache, PreHandleOutcome, RawResponse, Signer, SigningMode, Transport, TransportRequest,
    VerifyContext, VerifyOutcome, Verifier,
};
use crate::verifier_registry::VerifierRegistry;

/// Result of one [`execute`] step (§4.5): the third case, a terminal error,
/// is represented as `Err` rather than a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ok,
    Waiting,
}

/// Client-wide behaviour the executor consults on every step (§4.8's
/// recognised options, insofar as they affect engine behaviour). Lives in
/// `in3-context` rather than `in3-client` so the executor can be unit
/// tested without depending on the crate that owns `Client`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub request_count: usize,
    pub max_attempts: u32,
    pub min_deposit: u64,
    pub proof: ProofMode,
    pub use_http: bool,
    pub use_binary: bool,
    pub signature_count: u8,
    pub finality: u32,
    pub replace_latest_block: u32,
    pub auto_update_list: bool,
    pub include_code: bool,
    pub node_limit: u16,
    /// Client-wide extra required property bits, ORed into every picker
    /// call alongside DATA/HTTP/PROOF (§4.5 step RPC.d).
    pub node_props_extra: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_count: 1,
            max_attempts: 3,
            min_deposit: 0,
            proof: ProofMode::Standard,
            use_http: false,
            use_binary: false,
            signature_count: 0,
            finality: 0,
            replace_latest_block: 0,
            auto_update_list: true,
            include_code: false,
            node_limit: 0,
            node_props_extra: 0,
        }
    }
}

/// Everything the executor needs from its host: the chain table it mutates,
/// the verifier dispatch table, the three external collaborators of §6, and
/// the client-wide config above. Borrowed for the duration of one `send`.
pub struct Engine<'a> {
    pub chains: &'a ChainTable,
    pub verifiers: &'a VerifierRegistry,
    pub transport: &'a dyn Transport,
    pub signer: Option<&'a dyn Signer>,
    pub cache: Option<&'a dyn Cache>,
    pub config: &'a EngineConfig,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// §4.5 single-step operation: performs as much work as possible without
/// blocking and returns `Ok(Step::Ok)`, `Ok(Step::Waiting)`, or a terminal
/// `Err`.
pub fn execute(ctx: &mut RequestContext, env: &Engine) -> Result<Step> {
    // 1. an already-latched error short-circuits, surfacing the verifier's
    // own failure code when one was recorded, a generic unknown otherwise.
    if let Some(latched) = ctx.error.clone() {
        return Err(match &ctx.verification_state {
            VerificationState::Failed(e) => e.clone(),
            _ => Error::Unknown(latched.to_string()),
        });
    }

    // 2. the first request must name a method.
    if ctx.requests.is_empty() || ctx.requests[0].method.is_empty() {
        return Err(ctx.set_error(Error::Configuration("no method defined".into())));
    }

    // 3. already fully verified.
    if ctx.response_context.is_some() && matches!(ctx.verification_state, VerificationState::Ok) {
        return Ok(Step::Ok);
    }

    // 4. required child first.
    if let Some(required) = ctx.required.as_deref_mut() {
        match execute(required, env) {
            Ok(Step::Waiting) => return Ok(Step::Waiting),
            Ok(Step::Ok) => {
                apply_required_result(ctx, env)?;
                ctx.required = None;
            }
            Err(e) => {
                return Err(ctx.set_error(Error::Rpc(format!(
                    "Error updating node_list/white_list: {e}"
                ))))
            }
        }
    }

    match ctx.ctx_type {
        ContextType::Rpc => execute_rpc(ctx, env),
        ContextType::Sign => execute_sign(ctx),
    }
}

fn execute_sign(ctx: &mut RequestContext) -> Result<Step> {
    match &ctx.raw_response {
        None => Ok(Step::Waiting),
        Some(raw) => {
            let slot = &raw[0];
            if !slot.error.is_empty() {
                Err(ctx.set_error(Error::Rpc(slot.error.clone())))
            } else if slot.result.is_empty() {
                Ok(Step::Waiting)
            } else {
                ctx.verification_state = VerificationState::Ok;
                Ok(Step::Ok)
            }
        }
    }
}

fn execute_rpc(ctx: &mut RequestContext, env: &Engine) -> Result<Step> {
    let chain_type = match env.chains.with_chain(ctx.chain_id, |c| c.chain_type) {
        Some(t) => t,
        None => return Err(ctx.set_error(Error::NotFound("chain not found".into()))),
    };
    let verifier = match env.verifiers.get(chain_type) {
        Some(v) => v,
        None => return Err(ctx.set_error(Error::NotFound("no verifier found".into()))),
    };

    if ctx.raw_response.is_none() && ctx.response_context.is_none() && ctx.nodes.is_none() {
        if let Some(outcome) = verifier.pre_handle(&ctx.requests[0].method, &ctx.requests[0].params) {
            match outcome {
                PreHandleOutcome::Handled(value) => {
                    ctx.raw_response = Some(vec![RawResponse {
                        result: value.to_string(),
                        error: String::new(),
                    }]);
                }
                PreHandleOutcome::Failed(e) => return Err(ctx.set_error(e)),
            }
        }
    }

    if ctx.raw_response.is_none() && ctx.nodes.is_none() {
        if let Some(child) = maybe_build_refresh_child(ctx.chain_id, env) {
            ctx.required = Some(Box::new(child));
            return Ok(Step::Waiting);
        }

        let required_props = required_node_props(env);
        let picked = env
            .chains
            .with_chain_mut(ctx.chain_id, |chain| {
                in3_picker::pick_nodes(chain, now_ms(), env.config.request_count, required_props, env.config.min_deposit)
            })
            .expect("chain existence already checked above");

        match picked {
            Ok(candidates) => {
                ctx.nodes = Some(candidates);
                configure_requests(ctx, env)?;
            }
            Err(e) => return Err(ctx.set_error(e)),
        }
    }

    if ctx.raw_response.is_none() {
        return Ok(Step::Waiting);
    }

    let outcome = env
        .chains
        .with_chain_mut(ctx.chain_id, |chain| find_valid_result(ctx, chain, verifier.as_ref(), env))
        .expect("chain existence already checked above");

    match outcome {
        Ok(Step::Ok) => Ok(Step::Ok),
        Ok(Step::Waiting) => Ok(Step::Waiting),
        Err(e) => {
            ctx.discard_response();
            ctx.attempt += 1;
            if ctx.attempt < env.config.max_attempts.saturating_sub(1) {
                debug!(attempt = ctx.attempt, "retrying request after verification failure");
                ctx.error = None;
                execute(ctx, env)
            } else {
                let _ = e;
                Err(ctx.set_error(Error::LimitReached(
                    "reached max_attempts and giving up".into(),
                )))
            }
        }
    }
}

fn required_node_props(env: &Engine) -> NodeProps {
    let mut bits = PROP_DATA | env.config.node_props_extra;
    if env.config.use_http {
        bits |= PROP_HTTP;
    }
    if env.config.proof != ProofMode::None {
        bits |= PROP_PROOF;
    }
    NodeProps::new(bits)
}

/// §4.2/§4.3: a nodelist or whitelist refresh is only ever installed when no
/// other required child is already outstanding (the single `required` slot
/// handles one prerequisite at a time; a pending nodelist refresh is
/// resolved before a whitelist refresh is even considered).
fn maybe_build_refresh_child(chain_id: u64, env: &Engine) -> Option<RequestContext> {
    let (needs_nodelist, whitelist_refresh) = env.chains.with_chain(chain_id, |chain| {
        let needs_wl = chain
            .whitelist
            .as_ref()
            .map(|wl| !wl.is_manual() && wl.needs_update)
            .unwrap_or(false);
        let wl_contract = chain.whitelist.as_ref().map(|wl| wl.contract);
        (chain.needs_update, needs_wl.then_some(wl_contract).flatten())
    })?;

    if needs_nodelist {
        Some(build_nodelist_child(chain_id, env))
    } else {
        whitelist_refresh.map(|contract| build_whitelist_child(chain_id, contract))
    }
}

fn build_nodelist_child(chain_id: u64, env: &Engine) -> RequestContext {
    let seed: [u8; 32] = rand::random();
    let params = serde_json::json!([env.config.node_limit, format!("0x{}", hex::encode(seed)), []]);
    RequestContext::new_rpc(
        chain_id,
        vec![RpcRequest {
            id: None,
            method: "in3_nodeList".into(),
            params,
        }],
    )
}

fn build_whitelist_child(chain_id: u64, contract: Address) -> RequestContext {
    let params = serde_json::json!([contract.to_string()]);
    RequestContext::new_rpc(
        chain_id,
        vec![RpcRequest {
            id: None,
            method: "in3_whiteList".into(),
            params,
        }],
    )
}

/// Applies a just-succeeded `required` child's result to the chain it was
/// fetched for (§4.2/§4.3), then drops it so the next `execute` pass treats
/// the chain as fresh. Parsing failures here are wrapped as "Error updating
/// node_list/white_list" by the caller, per §7.
fn apply_required_result(ctx: &mut RequestContext, env: &Engine) -> Result<()> {
    let required = match &ctx.required {
        Some(r) => r,
        None => return Ok(()),
    };
    let method = required.requests[0].method.clone();
    let result = required
        .responses
        .as_ref()
        .and_then(|r| r.first())
        .and_then(|v| v.get("result"))
        .cloned()
        .unwrap_or(Value::Null);

    match method.as_str() {
        "in3_nodeList" => {
            env.chains
                .with_chain_mut(ctx.chain_id, |chain| apply_nodelist_refresh(chain, &result, now_ms()))
                .unwrap_or(Ok(()))?;
            if let Some(cache) = env.cache {
                env.chains.with_chain(ctx.chain_id, |chain| {
                    if let Ok(bytes) = serde_json::to_vec(&(chain.nodes(), chain.weights())) {
                        let _ = cache.store(&format!("nodelist_{}", ctx.chain_id), &bytes);
                    }
                });
            }
        }
        "in3_whiteList" => {
            let (last_block, addresses) = parse_whitelist_result(&result)?;
            env.chains
                .with_chain_mut(ctx.chain_id, |chain| -> Result<()> {
                    if let Some(wl) = chain.whitelist.as_mut() {
                        wl.apply_refresh(last_block, addresses)?;
                    }
                    chain.sync_whitelist_flags();
                    Ok(())
                })
                .unwrap_or(Ok(()))?;
            if let Some(cache) = env.cache {
                env.chains.with_chain(ctx.chain_id, |chain| {
                    if let Some(wl) = chain.whitelist.as_ref() {
                        if let Ok(bytes) = serde_json::to_vec(wl) {
                            let _ = cache.store(&format!("whitelist_{}", ctx.chain_id), &bytes);
                        }
                    }
                });
            }
        }
        _ => {}
    }
    Ok(())
}

fn configure_requests(ctx: &mut RequestContext, env: &Engine) -> Result<()> {
    let signers: Vec<Address> = if env.config.signature_count > 0 && env.config.proof != ProofMode::None {
        let props = NodeProps::new(DEFAULT_PROPS & PROP_SIGNER | PROP_SIGNER);
        let picked = env
            .chains
            .with_chain_mut(ctx.chain_id, |chain| {
                in3_picker::pick_nodes(
                    chain,
                    now_ms(),
                    env.config.signature_count as usize,
                    props,
                    env.config.min_deposit,
                )
            })
            .expect("chain existence already checked by caller");
        match picked {
            Ok(candidates) => candidates.into_iter().map(|c| c.address).collect(),
            Err(e) => {
                return Err(ctx.set_error(Error::Configuration(format!(
                    "Could not find any nodes for requesting signatures: {e}"
                ))))
            }
        }
    } else {
        Vec::new()
    };

    let whitelist_contract = env
        .chains
        .with_chain(ctx.chain_id, |c| c.whitelist.as_ref().map(|w| w.contract))
        .flatten();

    for cfg in ctx.configs.iter_mut() {
        cfg.proof = env.config.proof;
        cfg.whitelist_contract = whitelist_contract;
        cfg.finality = (env.config.finality > 0).then_some(env.config.finality);
        cfg.latest_block = (env.config.replace_latest_block > 0).then_some(env.config.replace_latest_block as u64);
        cfg.use_full_proof = env.config.proof == ProofMode::Full;
        cfg.use_binary = env.config.use_binary;
        cfg.signers = signers.clone();
        cfg.include_code = env.config.include_code;
    }
    Ok(())
}

/// §4.6: evaluates each raw per-node response in order, blacklisting nodes
/// that fail transport, parsing, or verification; returns as soon as one
/// node's response verifies for every request slot.
fn find_valid_result(ctx: &mut RequestContext, chain: &mut Chain, verifier: &dyn Verifier, env: &Engine) -> Result<Step> {
    let raw = ctx.raw_response.clone().unwrap_or_default();
    let candidates = ctx.nodes.clone();

    for (idx, resp) in raw.iter().enumerate() {
        let candidate = candidates.as_ref().and_then(|c| c.get(idx));

        if !resp.error.is_empty() || resp.result.is_empty() {
            blacklist(chain, candidate);
            continue;
        }

        let parsed: Value = match decode_response_text(&resp.result) {
            Ok(v) => v,
            Err(_) => {
                blacklist(chain, candidate);
                continue;
            }
        };

        let responses = match split_responses(parsed, ctx.requests.len()) {
            Ok(r) => r,
            Err(_) => {
                blacklist(chain, candidate);
                continue;
            }
        };

        let mut node_failed = false;
        for i in 0..ctx.requests.len() {
            let slot = &responses[i];
            let result = slot.get("result").cloned().unwrap_or(Value::Null);
            let in3 = slot.get("in3");

            if let Some(in3) = in3 {
                if env.config.auto_update_list {
                    if let Some(last_nodelist) = in3.get("lastNodeList").and_then(Value::as_u64) {
                        if last_nodelist > chain.last_block {
                            chain.needs_update = true;
                        }
                    }
                    if let Some(wl) = chain.whitelist.as_mut() {
                        if let Some(last_wl) = in3.get("lastWhiteList").and_then(Value::as_u64) {
                            if last_wl > wl.last_block {
                                wl.needs_update = true;
                            }
                        }
                    }
                }
            }

            let proof = in3.and_then(|o| o.get("proof"));
            let last_validator_change = in3.and_then(|o| o.get("lastValidatorChange")).and_then(Value::as_u64);
            let current_block = in3.and_then(|o| o.get("currentBlock")).and_then(Value::as_u64);

            let vctx = VerifyContext {
                method: &ctx.requests[i].method,
                result: &result,
                proof,
                last_validator_change,
                current_block,
            };

            match verifier.verify(&vctx) {
                VerifyOutcome::Ok => {
                    ctx.verification_state = VerificationState::Ok;
                }
                VerifyOutcome::Waiting => {
                    ctx.verification_state = VerificationState::Waiting;
                    return Ok(Step::Waiting);
                }
                VerifyOutcome::Failed(e) => {
                    warn!(node = %candidate.map(|c| c.url.as_str()).unwrap_or("<internal>"), error = %e, "response failed verification");
                    ctx.verification_state = VerificationState::Failed(e);
                    blacklist(chain, candidate);
                    node_failed = true;
                    break;
                }
            }
        }

        if !node_failed {
            ctx.response_context = Some(Value::Array(responses.clone()));
            ctx.responses = Some(responses);
            return Ok(Step::Ok);
        }
    }

    Err(Error::InvalidData("no valid response found".into()))
}

/// §4.6 / original `execute.c:220`: the first byte of the raw response text
/// picks the decoder — `{`/`[` is JSON, anything else is this system's
/// in-band binary encoding (`useBinary`, requested via `cfg.use_binary`).
/// The pack carries no grounding for the original's full binary token
/// decoder, so the supported case is the one actually produced by a
/// `useBinary` request: the same JSON-RPC result, hex-encoded.
fn decode_response_text(text: &str) -> Result<Value> {
    match text.as_bytes().first() {
        Some(b'{') | Some(b'[') => {
            serde_json::from_str(text).map_err(|e| Error::InvalidData(format!("malformed JSON response: {e}")))
        }
        _ => {
            let stripped = text.strip_prefix("0x").unwrap_or(text);
            let bytes = hex::decode(stripped).map_err(|e| Error::InvalidData(format!("malformed binary response: {e}")))?;
            let decoded =
                String::from_utf8(bytes).map_err(|e| Error::InvalidData(format!("binary response is not utf8: {e}")))?;
            serde_json::from_str(&decoded)
                .map_err(|e| Error::InvalidData(format!("malformed binary response payload: {e}")))
        }
    }
}

fn blacklist(chain: &mut Chain, candidate: Option<&in3_picker::Candidate>) {
    if let Some(candidate) = candidate {
        if let Some(weight) = chain.weight_at_mut(candidate.node_index) {
            weight.blacklist_for(now_ms(), FAILURE_BLACKLIST_MS);
            debug!(url = %candidate.url, "blacklisting node");
        }
    }
}

/// §4.6 / original `ctx_parse_response`: a single request gets a bare
/// response object; a batch gets an array of exactly `expected_len` of them.
fn split_responses(parsed: Value, expected_len: usize) -> Result<Vec<Value>> {
    if expected_len == 1 {
        return match parsed {
            Value::Object(_) => Ok(vec![parsed]),
            _ => Err(Error::InvalidData("the response must be a single object".into())),
        };
    }
    match parsed {
        Value::Array(arr) if arr.len() == expected_len => Ok(arr),
        _ => Err(Error::InvalidData(
            "the responses must be an array with the same number as the requests".into(),
        )),
    }
}

/// §4.7: builds the outgoing transport request for a context with nodes
/// already chosen, attaching `chainId` only when at least one chosen node
/// carries the MULTICHAIN property.
pub fn build_transport_request(ctx: &RequestContext, env: &Engine) -> TransportRequest {
    let nodes = ctx.nodes.as_ref();
    let multichain = nodes
        .map(|candidates| {
            candidates.iter().any(|c| {
                env.chains
                    .with_chain(ctx.chain_id, |chain| {
                        chain
                            .nodes()
                            .get(c.node_index)
                            .map(|n| n.props.has(PROP_MULTICHAIN))
                            .unwrap_or(false)
                    })
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false);

    let configs: Vec<RequestConfig> = ctx
        .configs
        .iter()
        .map(|c| {
            let mut c = c.clone();
            if multichain {
                c.chain_id = Some(ctx.chain_id);
            }
            c
        })
        .collect();

    let urls = nodes
        .map(|candidates| {
            candidates
                .iter()
                .map(|c| rewrite_url(&c.url, env.config.use_http))
                .collect()
        })
        .unwrap_or_default();

    TransportRequest {
        payload: build_payload(&ctx.requests, &configs),
        urls,
    }
}

/// §5 `send(ctx)`: the synchronous driver. Loops `execute`, and whenever it
/// reports `Waiting`, first drives any outstanding `required` child to
/// completion, then — only if the context itself (not a child) still lacks
/// a raw response — calls the transport or signer exactly once. Bounds
/// non-productive iterations at ten (`in3_send_ctx`'s literal retry cap).
pub fn send(ctx: &mut RequestContext, env: &Engine) -> Result<()> {
    let mut non_productive = 0u32;
    loop {
        match execute(ctx, env) {
            Ok(Step::Ok) => return Ok(()),
            Err(e) => return Err(e),
            Ok(Step::Waiting) => {
                non_productive += 1;
                if non_productive > 10 {
                    return Err(ctx.set_error(Error::Rpc(
                        "looks like the response is not valid or not set, since we are calling \
                         the execute over and over"
                            .into(),
                    )));
                }

                while ctx
                    .required
                    .as_deref()
                    .map(|r| r.state() != CtxState::Success)
                    .unwrap_or(false)
                {
                    let required = ctx.required.as_deref_mut().expect("checked above");
                    if let Err(e) = send(required, env) {
                        return Err(ctx.set_error(Error::Rpc(format!(
                            "Error updating node_list/white_list: {e}"
                        ))));
                    }
                    match execute(ctx, env) {
                        Ok(Step::Waiting) => {}
                        Ok(Step::Ok) => return Ok(()),
                        Err(e) => return Err(e),
                    }
                }

                if ctx.raw_response.is_none() {
                    drive_transport_or_signer(ctx, env)?;
                }
            }
        }
    }
}

fn drive_transport_or_signer(ctx: &mut RequestContext, env: &Engine) -> Result<()> {
    match ctx.ctx_type {
        ContextType::Rpc => {
            let request = build_transport_request(ctx, env);
            let responses = env.transport.send(&request)?;
            ctx.raw_response = Some(responses);
            Ok(())
        }
        ContextType::Sign => {
            let signer = env
                .signer
                .ok_or_else(|| ctx.set_error(Error::Configuration("no signer set".into())))?;
            let params = &ctx.requests[0].params;
            let data = params
                .get(0)
                .and_then(Value::as_str)
                .map(|s| s.strip_prefix("0x").unwrap_or(s))
                .and_then(|s| hex::decode(s).ok());
            let from = params.get(1).and_then(Value::as_str).and_then(Address::from_hex);

            let (data, from) = match (data, from) {
                (Some(d), Some(f)) => (d, f),
                (None, _) => return Err(ctx.set_error(Error::Configuration("missing data to sign".into()))),
                (_, None) => return Err(ctx.set_error(Error::Configuration("missing account to sign".into()))),
            };

            match signer.sign(SigningMode::EcHash, &data, from) {
                Ok(sig) => {
                    ctx.raw_response = Some(vec![RawResponse {
                        result: format!("0x{}", hex::encode(sig)),
                        error: String::new(),
                    }]);
                }
                Err(e) => {
                    ctx.raw_response = Some(vec![RawResponse {
                        result: String::new(),
                        error: e.to_string(),
                    }]);
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier_registry::VerifierRegistry;
    use in3_registry::{ChainTable, Whitelist};
    use in3_types::{Address as Addr, ChainType};
    use std::sync::Mutex;

    struct ScriptedTransport {
        responses: Mutex<Vec<Vec<RawResponse>>>,
    }

    impl Transport for ScriptedTransport {
        fn send(&self, _request: &TransportRequest) -> Result<Vec<RawResponse>> {
            let mut r = self.responses.lock().unwrap();
            if r.is_empty() {
                Ok(vec![])
            } else {
                Ok(r.remove(0))
            }
        }
    }

    fn addr(n: u8) -> Addr {
        let mut bytes = [0u8; 20];
        bytes[0] = n;
        Addr::new(bytes)
    }

    fn chain_with_nodes(n: u8) -> ChainTable {
        let table = ChainTable::new();
        table.register_chain(1, ChainType::Eth, Addr::ZERO, [0u8; 32], 2, None);
        table.with_chain_mut(1, |chain| {
            for i in 1..=n {
                chain.add_node(format!("http://node{i}"), NodeProps::new(DEFAULT_PROPS), addr(i));
            }
        });
        table
    }

    fn ok_response(id: u64) -> String {
        serde_json::json!({"id": id, "jsonrpc": "2.0", "result": "0x1"}).to_string()
    }

    #[test]
    fn success_path_returns_ok_and_records_response() {
        let chains = chain_with_nodes(2);
        let verifiers = VerifierRegistry::with_defaults();
        let transport = ScriptedTransport {
            responses: Mutex::new(vec![vec![
                RawResponse { result: ok_response(1), error: String::new() },
                RawResponse { result: ok_response(1), error: String::new() },
            ]]),
        };
        let config = EngineConfig { request_count: 2, ..Default::default() };
        let env = Engine {
            chains: &chains,
            verifiers: &verifiers,
            transport: &transport,
            signer: None,
            cache: None,
            config: &config,
        };

        let mut ctx = RequestContext::new_rpc(
            1,
            vec![RpcRequest { id: Some(1), method: "eth_blockNumber".into(), params: serde_json::json!([]) }],
        );
        send(&mut ctx, &env).unwrap();
        assert_eq!(ctx.state(), CtxState::Success);
        assert!(ctx.responses.is_some());
    }

    #[test]
    fn exhausting_attempts_surfaces_max_attempts_error_and_blacklists_both_nodes() {
        let chains = chain_with_nodes(2);
        let verifiers = VerifierRegistry::with_defaults();
        let failing = || {
            vec![
                RawResponse { result: String::new(), error: "boom".into() },
                RawResponse { result: String::new(), error: String::new() },
            ]
        };
        let transport = ScriptedTransport {
            responses: Mutex::new(vec![failing(), failing(), failing()]),
        };
        let config = EngineConfig { request_count: 2, max_attempts: 3, ..Default::default() };
        let env = Engine {
            chains: &chains,
            verifiers: &verifiers,
            transport: &transport,
            signer: None,
            cache: None,
            config: &config,
        };

        let mut ctx = RequestContext::new_rpc(
            1,
            vec![RpcRequest { id: Some(1), method: "eth_blockNumber".into(), params: serde_json::json!([]) }],
        );
        let err = send(&mut ctx, &env).unwrap_err();
        assert!(matches!(err, Error::LimitReached(_)));

        let now = now_ms();
        chains.with_chain(1, |chain| {
            assert!(chain.weights().iter().all(|w| w.is_blacklisted(now)));
        });
    }

    #[test]
    fn unknown_chain_is_fatal_not_found() {
        let chains = ChainTable::new();
        let verifiers = VerifierRegistry::with_defaults();
        let transport = ScriptedTransport { responses: Mutex::new(vec![]) };
        let config = EngineConfig::default();
        let env = Engine {
            chains: &chains,
            verifiers: &verifiers,
            transport: &transport,
            signer: None,
            cache: None,
            config: &config,
        };
        let mut ctx = RequestContext::new_rpc(
            0x99,
            vec![RpcRequest { id: Some(1), method: "eth_blockNumber".into(), params: serde_json::json!([]) }],
        );
        let err = send(&mut ctx, &env).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn manual_whitelist_never_triggers_a_refresh_child() {
        let chains = chain_with_nodes(1);
        chains.with_chain_mut(1, |chain| {
            chain.whitelist = Some(Whitelist::manual(vec![addr(1)]));
            chain.sync_whitelist_flags();
        });
        let verifiers = VerifierRegistry::with_defaults();
        let transport = ScriptedTransport {
            responses: Mutex::new(vec![vec![RawResponse { result: ok_response(1), error: String::new() }]]),
        };
        let config = EngineConfig::default();
        let env = Engine {
            chains: &chains,
            verifiers: &verifiers,
            transport: &transport,
            signer: None,
            cache: None,
            config: &config,
        };
        let mut ctx = RequestContext::new_rpc(
            1,
            vec![RpcRequest { id: Some(1), method: "eth_blockNumber".into(), params: serde_json::json!([]) }],
        );
        send(&mut ctx, &env).unwrap();
        assert_eq!(ctx.state(), CtxState::Success);
    }

    #[test]
    fn needs_update_chain_inserts_nodelist_refresh_before_picking() {
        let chains = chain_with_nodes(1);
        chains.with_chain_mut(1, |chain| chain.needs_update = true);
        let verifiers = VerifierRegistry::with_defaults();
        let nodelist_result = serde_json::json!({
            "id": 1, "jsonrpc": "2.0",
            "result": {
                "lastBlockNumber": 100,
                "nodes": [
                    {"address": addr(1).to_string(), "url": "http://node1"},
                    {"address": addr(2).to_string(), "url": "http://node2"},
                ]
            }
        })
        .to_string();
        let transport = ScriptedTransport {
            responses: Mutex::new(vec![
                vec![RawResponse { result: nodelist_result, error: String::new() }],
                vec![RawResponse { result: ok_response(1), error: String::new() }],
            ]),
        };
        let config = EngineConfig::default();
        let env = Engine {
            chains: &chains,
            verifiers: &verifiers,
            transport: &transport,
            signer: None,
            cache: None,
            config: &config,
        };
        let mut ctx = RequestContext::new_rpc(
            1,
            vec![RpcRequest { id: Some(1), method: "eth_blockNumber".into(), params: serde_json::json!([]) }],
        );
        send(&mut ctx, &env).unwrap();
        assert_eq!(ctx.state(), CtxState::Success);
        chains.with_chain(1, |chain| {
            assert_eq!(chain.nodes().len(), 2);
            assert!(!chain.needs_update);
        });
    }

    #[test]
    fn signature_count_two_records_two_distinct_signers() {
        // §8 concrete scenario 6: signatureCount=2 with three SIGNER-capable
        // nodes picks exactly two distinct signer addresses.
        let chains = ChainTable::new();
        chains.register_chain(1, ChainType::Eth, Addr::ZERO, [0u8; 32], 2, None);
        chains.with_chain_mut(1, |chain| {
            for i in 1..=3u8 {
                chain.add_node(
                    format!("http://signer{i}"),
                    NodeProps::new(DEFAULT_PROPS | PROP_SIGNER),
                    addr(i),
                );
            }
        });
        let verifiers = VerifierRegistry::with_defaults();
        let transport = ScriptedTransport { responses: Mutex::new(vec![]) };
        let config = EngineConfig { signature_count: 2, request_count: 1, ..Default::default() };
        let env = Engine {
            chains: &chains,
            verifiers: &verifiers,
            transport: &transport,
            signer: None,
            cache: None,
            config: &config,
        };
        let mut ctx = RequestContext::new_rpc(
            1,
            vec![RpcRequest { id: Some(1), method: "eth_call".into(), params: serde_json::json!([]) }],
        );
        ctx.nodes = Some(vec![]);
        configure_requests(&mut ctx, &env).unwrap();

        let signers = &ctx.configs[0].signers;
        assert_eq!(signers.len(), 2);
        let mut unique = signers.clone();
        unique.sort_by_key(|a| *a.as_bytes());
        unique.dedup();
        assert_eq!(unique.len(), 2);
    }

    struct MemCache {
        entries: Mutex<std::collections::HashMap<String, Vec<u8>>>,
    }

    impl MemCache {
        fn new() -> Self {
            Self { entries: Mutex::new(std::collections::HashMap::new()) }
        }
    }

    impl crate::traits::Cache for MemCache {
        fn store(&self, key: &str, value: &[u8]) -> Result<()> {
            self.entries.lock().unwrap().insert(key.to_string(), value.to_vec());
            Ok(())
        }

        fn load(&self, key: &str) -> Option<Vec<u8>> {
            self.entries.lock().unwrap().get(key).cloned()
        }
    }

    /// §4.3 symmetry with §4.2's nodelist cache-store: a successful
    /// `in3_whiteList` refresh must be persisted just like a successful
    /// `in3_nodeList` refresh is.
    #[test]
    fn apply_required_result_stores_refreshed_whitelist_in_cache() {
        let chains = chain_with_nodes(1);
        chains.with_chain_mut(1, |chain| {
            chain.whitelist = Some(Whitelist::managed(addr(9)));
        });
        let cache = MemCache::new();
        let verifiers = VerifierRegistry::with_defaults();
        let transport = ScriptedTransport { responses: Mutex::new(vec![]) };
        let config = EngineConfig::default();
        let env = Engine {
            chains: &chains,
            verifiers: &verifiers,
            transport: &transport,
            signer: None,
            cache: Some(&cache),
            config: &config,
        };

        let mut required = RequestContext::new_rpc(
            1,
            vec![RpcRequest { id: None, method: "in3_whiteList".into(), params: serde_json::json!([]) }],
        );
        required.responses = Some(vec![serde_json::json!({
            "result": { "lastBlockNumber": 5, "nodes": [addr(1).to_string()] }
        })]);

        let mut ctx = RequestContext::new_rpc(
            1,
            vec![RpcRequest { id: Some(1), method: "eth_blockNumber".into(), params: serde_json::json!([]) }],
        );
        ctx.required = Some(Box::new(required));

        apply_required_result(&mut ctx, &env).unwrap();

        assert!(cache.load("whitelist_1").is_some());
        chains.with_chain(1, |chain| {
            assert_eq!(chain.whitelist.as_ref().unwrap().addresses, vec![addr(1)]);
        });
    }

    #[test]
    fn decode_response_text_parses_plain_json() {
        let v = decode_response_text(r#"{"id":1,"result":"0x1"}"#).unwrap();
        assert_eq!(v["result"], "0x1");
    }

    #[test]
    fn decode_response_text_parses_hex_encoded_binary_payload() {
        let payload = r#"{"id":1,"result":"0x1"}"#;
        let encoded = format!("0x{}", hex::encode(payload));
        let v = decode_response_text(&encoded).unwrap();
        assert_eq!(v["result"], "0x1");
    }

    #[test]
    fn decode_response_text_rejects_garbage() {
        assert!(decode_response_text("not-hex-or-json!!").is_err());
    }

    #[test]
    fn success_path_accepts_binary_encoded_response() {
        let chains = chain_with_nodes(1);
        let verifiers = VerifierRegistry::with_defaults();
        let binary = format!("0x{}", hex::encode(ok_response(1)));
        let transport = ScriptedTransport {
            responses: Mutex::new(vec![vec![RawResponse { result: binary, error: String::new() }]]),
        };
        let config = EngineConfig { request_count: 1, use_binary: true, ..Default::default() };
        let env = Engine {
            chains: &chains,
            verifiers: &verifiers,
            transport: &transport,
            signer: None,
            cache: None,
            config: &config,
        };

        let mut ctx = RequestContext::new_rpc(
            1,
            vec![RpcRequest { id: Some(1), method: "eth_blockNumber".into(), params: serde_json::json!([]) }],
        );
        send(&mut ctx, &env).unwrap();
        assert_eq!(ctx.state(), CtxState::Success);
    }
}
