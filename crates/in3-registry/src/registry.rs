use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::chain::Chain;
use in3_types::{Address, ChainType, Hash32};

/// The client's per-chain table (§4.1). Thread-safety mirrors the chain-wide
/// `RwLock` used elsewhere in the workspace for shared mutable registries;
/// the engine itself drives one context from one thread at a time (§5).
///
/// Backed by `IndexMap` rather than `HashMap` so that chain insertion order
/// is preserved — `new_client(chain_id=0)` must yield the well-known chains
/// in the literal order mainnet, kovan, goerli, ipfs, local (§8 concrete
/// scenario 1), which a `HashMap`'s randomized iteration order cannot
/// guarantee.
pub struct ChainTable {
    chains: RwLock<IndexMap<u64, Chain>>,
}

impl ChainTable {
    pub fn new() -> Self {
        Self {
            chains: RwLock::new(IndexMap::new()),
        }
    }

    pub fn find_chain(&self, id: u64) -> Option<Chain> {
        self.chains.read().get(&id).cloned()
    }

    pub fn with_chain<T>(&self, id: u64, f: impl FnOnce(&Chain) -> T) -> Option<T> {
        self.chains.read().get(&id).map(f)
    }

    pub fn with_chain_mut<T>(&self, id: u64, f: impl FnOnce(&mut Chain) -> T) -> Option<T> {
        self.chains.write().get_mut(&id).map(f)
    }

    /// §4.1 `register_chain`: updates an existing chain's metadata in place,
    /// or appends a new one. Registering over an existing chain replaces its
    /// contract/registry-id/version and clears its whitelist, but preserves
    /// its nodelist and weights.
    pub fn register_chain(
        &self,
        id: u64,
        chain_type: ChainType,
        contract: Address,
        registry_id: Hash32,
        registry_version: u32,
        whitelist_contract: Option<Address>,
    ) {
        let mut chains = self.chains.write();
        match chains.get_mut(&id) {
            Some(chain) => {
                chain.chain_type = chain_type;
                chain.contract = contract;
                chain.registry_id = registry_id;
                chain.registry_version = registry_version;
                chain.whitelist = whitelist_contract.map(crate::whitelist::Whitelist::managed);
            }
            None => {
                let mut chain = Chain::new(id, chain_type, contract, registry_id, registry_version);
                chain.whitelist = whitelist_contract.map(crate::whitelist::Whitelist::managed);
                chains.insert(id, chain);
            }
        }
    }

    /// Uses `shift_remove` rather than `IndexMap`'s default (swap-remove)
    /// so removing one chain never reorders the survivors.
    pub fn remove_chain(&self, id: u64) -> Option<Chain> {
        self.chains.write().shift_remove(&id)
    }

    /// Chain ids in insertion order (§8 concrete scenario 1).
    pub fn chain_ids(&self) -> Vec<u64> {
        self.chains.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.chains.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ChainTable {
    fn default() -> Self {
        Self::new()
    }
}
