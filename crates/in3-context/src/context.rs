//! The request context (§3 "Request context", §4.5): a tree-structured
//! state object driving one in-flight RPC batch from submission to a
//! verified response.

use in3_picker::Candidate;
use in3_types::Error;
use serde_json::Value;

use crate::payload::{RequestConfig, RpcRequest};
use crate::traits::RawResponse;

/// `CT_RPC` vs `CT_SIGN` in the original (§3): an RPC batch dispatched to
/// nodes, or a single signing request serviced by the host signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextType {
    Rpc,
    Sign,
}

/// Last outcome of response verification for this context (§4.5, §4.6).
/// `Unverified` is the initial state before any node response has been
/// parsed; `Failed` retains the verifier's own error code so a latched
/// context error can surface it instead of a generic "unknown" (§4.5 step 1).
#[derive(Debug, Clone, Default)]
pub enum VerificationState {
    #[default]
    Unverified,
    Ok,
    Waiting,
    Failed(Error),
}

/// Derived states of §4.5: never stored directly, always computed from the
/// context's fields (and transitively from its `required` child's fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtxState {
    Error,
    WaitingForRequired,
    WaitingForResponse,
    Success,
}

/// One in-flight RPC batch (§3 "Request context"). Owns its payload,
/// response buffers, and verification configs outright; weakly references
/// nodes in the client's chain table by index (`Candidate::node_index`),
/// never copying node URLs/addresses into the context itself.
#[derive(Debug)]
pub struct RequestContext {
    pub ctx_type: ContextType,
    /// Which chain this batch targets. Fixed at construction; the spec's
    /// per-request `chainId` override via an inbound `in3` object is a
    /// documented no-op upstream (see DESIGN.md), so one context always
    /// targets exactly one chain.
    pub chain_id: u64,
    pub requests: Vec<RpcRequest>,
    pub configs: Vec<RequestConfig>,
    pub nodes: Option<Vec<Candidate>>,
    pub raw_response: Option<Vec<RawResponse>>,
    /// One parsed JSON document covering all per-request results from the
    /// node whose response was ultimately accepted.
    pub response_context: Option<Value>,
    /// Parsed per-request result tokens, one slice of `response_context`
    /// per request in `requests`.
    pub responses: Option<Vec<Value>>,
    pub attempt: u32,
    pub error: Option<Error>,
    pub verification_state: VerificationState,
    pub required: Option<Box<RequestContext>>,
}

impl RequestContext {
    pub fn new_rpc(chain_id: u64, requests: Vec<RpcRequest>) -> Self {
        let configs = requests.iter().map(|_| RequestConfig::default()).collect();
        Self {
            ctx_type: ContextType::Rpc,
            chain_id,
            requests,
            configs,
            nodes: None,
            raw_response: None,
            response_context: None,
            responses: None,
            attempt: 0,
            error: None,
            verification_state: VerificationState::Unverified,
            required: None,
        }
    }

    pub fn new_sign(chain_id: u64, request: RpcRequest) -> Self {
        let configs = vec![RequestConfig::default()];
        Self {
            ctx_type: ContextType::Sign,
            chain_id,
            requests: vec![request],
            configs,
            nodes: None,
            raw_response: None,
            response_context: None,
            responses: None,
            attempt: 0,
            error: None,
            verification_state: VerificationState::Unverified,
            required: None,
        }
    }

    /// §7 `set_error`/`ctx_set_error`: overwrites the latched error and
    /// returns it, for tail-call convenience at call sites that both latch
    /// and propagate in one expression.
    pub fn set_error(&mut self, err: Error) -> Error {
        self.error = Some(err.clone());
        err
    }

    /// §4.5: the derived state, recursing into `required` the way
    /// `in3_ctx_state` does in the original.
    pub fn state(&self) -> CtxState {
        if let Some(required) = &self.required {
            if required.state() == CtxState::Error {
                return CtxState::Error;
            }
        }
        if self.error.is_some() {
            return CtxState::Error;
        }
        if let Some(required) = &self.required {
            if required.state() != CtxState::Success {
                return CtxState::WaitingForRequired;
            }
        }
        if self.raw_response.is_none() {
            return CtxState::WaitingForResponse;
        }
        if self.ctx_type == ContextType::Rpc && self.response_context.is_none() {
            return CtxState::WaitingForResponse;
        }
        CtxState::Success
    }

    /// §8 property 9 / §5 "resource discipline": discards any stale
    /// response/verification state without touching `requests`/`configs`,
    /// ahead of a retry (§4.5 step RPC.g).
    pub fn discard_response(&mut self) {
        self.nodes = None;
        self.raw_response = None;
        self.response_context = None;
        self.responses = None;
        self.verification_state = VerificationState::Unverified;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn req(method: &str) -> RpcRequest {
        RpcRequest {
            id: Some(1),
            method: method.into(),
            params: json!([]),
        }
    }

    #[test]
    fn fresh_context_is_waiting_for_response() {
        let ctx = RequestContext::new_rpc(1, vec![req("eth_blockNumber")]);
        assert_eq!(ctx.state(), CtxState::WaitingForResponse);
    }

    #[test]
    fn latched_error_overrides_everything() {
        let mut ctx = RequestContext::new_rpc(1, vec![req("eth_blockNumber")]);
        ctx.raw_response = Some(vec![RawResponse::default()]);
        ctx.response_context = Some(json!({}));
        ctx.set_error(Error::NotFound("chain not found".into()));
        assert_eq!(ctx.state(), CtxState::Error);
    }

    #[test]
    fn waiting_for_required_propagates_until_child_succeeds() {
        let mut ctx = RequestContext::new_rpc(1, vec![req("eth_blockNumber")]);
        let child = RequestContext::new_rpc(1, vec![req("in3_nodeList")]);
        ctx.required = Some(Box::new(child));
        assert_eq!(ctx.state(), CtxState::WaitingForRequired);

        ctx.required.as_mut().unwrap().raw_response = Some(vec![RawResponse {
            result: "{}".into(),
            error: String::new(),
        }]);
        ctx.required.as_mut().unwrap().response_context = Some(json!({}));
        ctx.required.as_mut().unwrap().verification_state = VerificationState::Ok;
        assert_eq!(ctx.required.as_ref().unwrap().state(), CtxState::Success);
        // parent is still waiting for its own response even though the
        // required child is done.
        assert_eq!(ctx.state(), CtxState::WaitingForResponse);
    }

    #[test]
    fn child_error_makes_parent_error_too() {
        let mut ctx = RequestContext::new_rpc(1, vec![req("eth_blockNumber")]);
        let mut child = RequestContext::new_rpc(1, vec![req("in3_nodeList")]);
        child.set_error(Error::InvalidData("bad nodelist".into()));
        ctx.required = Some(Box::new(child));
        assert_eq!(ctx.state(), CtxState::Error);
    }

    #[test]
    fn success_requires_parsed_and_verified_response() {
        let mut ctx = RequestContext::new_rpc(1, vec![req("eth_blockNumber")]);
        ctx.raw_response = Some(vec![RawResponse {
            result: "{}".into(),
            error: String::new(),
        }]);
        assert_eq!(ctx.state(), CtxState::WaitingForResponse);
        ctx.response_context = Some(json!({}));
        ctx.verification_state = VerificationState::Ok;
        assert_eq!(ctx.state(), CtxState::Success);
    }

    #[test]
    fn sign_context_does_not_need_response_context() {
        let mut ctx = RequestContext::new_sign(1, req("sign"));
        ctx.raw_response = Some(vec![RawResponse {
            result: "deadbeef".into(),
            error: String::new(),
        }]);
        assert_eq!(ctx.state(), CtxState::Success);
    }
}
