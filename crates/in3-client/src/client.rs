//! The `Client`: brings the node registry, picker, and request-context
//! engine together behind one handle, owning the client-wide config the
//! configurator (§4.8) mutates and the host collaborators of §6.

use std::sync::Arc;

use in3_context::{
    send, Cache, Engine, EngineConfig, RequestContext, RpcRequest, Signer, Transport,
    VerifierRegistry,
};
use in3_registry::{ChainTable, Node, NodeWeight, Whitelist};
use in3_types::{well_known, Error, Result};
use parking_lot::RwLock;

use crate::bootstrap::register_well_known_chains;

/// Client-side runtime of the dispatcher (§2): the node registry, the
/// verifier dispatch table, client-wide engine config, and the host's
/// transport/signer/cache, all behind one `Arc`-shareable handle so a host
/// can hold one client across threads even though one context is driven
/// from one thread at a time (§5).
pub struct Client {
    pub chains: ChainTable,
    pub verifiers: VerifierRegistry,
    pub config: RwLock<EngineConfig>,
    /// The chain a request targets when the caller doesn't say otherwise.
    pub default_chain: RwLock<u64>,
    pub transport: RwLock<Option<Arc<dyn Transport + Send + Sync>>>,
    pub signer: RwLock<Option<Arc<dyn Signer + Send + Sync>>>,
    pub cache: RwLock<Option<Arc<dyn Cache + Send + Sync>>>,
}

impl Client {
    /// §8 concrete scenario 1: `chain_id == 0` bootstraps the five
    /// well-known chains with no particular default; any other value must
    /// name one of them, or construction fails with a configuration error
    /// (`IN3_ECONFIG` in the original).
    pub fn new(chain_id: u64) -> Result<Self> {
        let chains = ChainTable::new();
        register_well_known_chains(&chains);

        let default_chain = if chain_id == 0 {
            well_known::MAINNET
        } else if well_known::DEFAULT_BOOTSTRAP_ORDER.contains(&chain_id) {
            chain_id
        } else {
            return Err(Error::Configuration(format!(
                "unknown chain id {chain_id:#x}"
            )));
        };

        Ok(Self {
            chains,
            verifiers: VerifierRegistry::with_defaults(),
            config: RwLock::new(EngineConfig::default()),
            default_chain: RwLock::new(default_chain),
            transport: RwLock::new(None),
            signer: RwLock::new(None),
            cache: RwLock::new(None),
        })
    }

    pub fn set_transport(&self, transport: Arc<dyn Transport + Send + Sync>) {
        *self.transport.write() = Some(transport);
    }

    pub fn set_signer(&self, signer: Arc<dyn Signer + Send + Sync>) {
        *self.signer.write() = Some(signer);
    }

    /// Seeds every known chain from `cache` before adopting it (§6
    /// `Cache::load`): a persisted nodelist/whitelist lets a freshly
    /// constructed client skip the registration-grace blacklist a truly
    /// empty nodelist would otherwise force on its first refresh.
    pub fn set_cache(&self, cache: Arc<dyn Cache + Send + Sync>) {
        for chain_id in self.chains.chain_ids() {
            if let Some(bytes) = cache.load(&format!("nodelist_{chain_id}")) {
                if let Ok((nodes, weights)) = serde_json::from_slice::<(Vec<Node>, Vec<NodeWeight>)>(&bytes) {
                    self.chains.with_chain_mut(chain_id, |chain| {
                        chain.replace_nodelist(nodes, weights);
                        chain.needs_update = false;
                    });
                }
            }
            if let Some(bytes) = cache.load(&format!("whitelist_{chain_id}")) {
                if let Ok(wl) = serde_json::from_slice::<Whitelist>(&bytes) {
                    self.chains.with_chain_mut(chain_id, |chain| {
                        chain.whitelist = Some(wl);
                        chain.sync_whitelist_flags();
                    });
                }
            }
        }
        *self.cache.write() = Some(cache);
    }

    /// Builds and drives one RPC batch against `chain_id` to completion
    /// (§5 `send`), returning the parsed per-request result tokens.
    ///
    /// Fails with a configuration error up front if no transport has been
    /// set (§7 "configuration" error kind — "missing transport/signer").
    pub fn execute_rpc(&self, chain_id: u64, requests: Vec<RpcRequest>) -> Result<Vec<serde_json::Value>> {
        let transport_guard = self.transport.read();
        let transport = transport_guard
            .as_deref()
            .map(|t| t as &dyn Transport)
            .ok_or_else(|| Error::Configuration("no transport set".into()))?;
        let signer_guard = self.signer.read();
        let signer = signer_guard.as_deref().map(|s| s as &dyn Signer);
        let cache_guard = self.cache.read();
        let cache = cache_guard.as_deref().map(|c| c as &dyn Cache);
        let config = self.config.read();

        let env = Engine {
            chains: &self.chains,
            verifiers: &self.verifiers,
            transport,
            signer,
            cache,
            config: &*config,
        };

        let mut ctx = RequestContext::new_rpc(chain_id, requests);
        send(&mut ctx, &env)?;
        Ok(ctx.responses.unwrap_or_default())
    }

    /// Convenience over [`Client::execute_rpc`] that targets the client's
    /// default chain.
    pub fn execute_default(&self, requests: Vec<RpcRequest>) -> Result<Vec<serde_json::Value>> {
        let chain_id = *self.default_chain.read();
        self.execute_rpc(chain_id, requests)
    }
}
