use std::collections::HashMap;
use std::sync::Arc;

use in3_types::ChainType;

use crate::traits::{Verifier, VerifyContext, VerifyOutcome};

/// Accepts every syntactically-present result; used for chain types this
/// crate does not carry real Merkle-proof verification for (spec.md §1
/// puts proof checking out of scope).
struct NoopVerifier;

impl Verifier for NoopVerifier {
    fn verify(&self, vctx: &VerifyContext<'_>) -> VerifyOutcome {
        if vctx.result.is_null() {
            VerifyOutcome::Failed(in3_types::Error::InvalidData(
                "empty result for verified request".into(),
            ))
        } else {
            VerifyOutcome::Ok
        }
    }
}

/// Per-chain-type verifier lookup (§4.5 step "resolve the verifier by chain
/// type; absent -> fatal"), mirroring the original's `in3_get_verifier`
/// dispatch table.
pub struct VerifierRegistry {
    verifiers: HashMap<ChainType, Arc<dyn Verifier>>,
}

impl VerifierRegistry {
    /// Registers the permissive generic/ipfs pair; `in3-client` may add
    /// more via [`VerifierRegistry::register`].
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            verifiers: HashMap::new(),
        };
        registry.register(ChainType::Eth, Arc::new(NoopVerifier));
        registry.register(ChainType::Generic, Arc::new(NoopVerifier));
        registry.register(ChainType::Ipfs, Arc::new(NoopVerifier));
        registry.register(ChainType::Btc, Arc::new(NoopVerifier));
        registry
    }

    pub fn register(&mut self, chain_type: ChainType, verifier: Arc<dyn Verifier>) {
        self.verifiers.insert(chain_type, verifier);
    }

    pub fn get(&self, chain_type: ChainType) -> Option<Arc<dyn Verifier>> {
        self.verifiers.get(&chain_type).cloned()
    }
}

impl Default for VerifierRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
