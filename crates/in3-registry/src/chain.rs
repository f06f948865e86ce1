use crate::node::{Node, NodeWeight, REGISTRATION_BLACKLIST_MS};
use crate::whitelist::Whitelist;
use in3_types::{Address, ChainType, Hash32};

/// Per-chain state (§3 "Chain"): nodelist + weights kept as parallel arrays,
/// bound together for the lifetime of the chain.
#[derive(Debug, Clone)]
pub struct Chain {
    pub id: u64,
    pub chain_type: ChainType,
    pub contract: Address,
    pub registry_id: Hash32,
    pub registry_version: u32,
    pub needs_update: bool,
    pub last_block: u64,
    pub whitelist: Option<Whitelist>,
    nodes: Vec<Node>,
    weights: Vec<NodeWeight>,
}

impl Chain {
    pub fn new(
        id: u64,
        chain_type: ChainType,
        contract: Address,
        registry_id: Hash32,
        registry_version: u32,
    ) -> Self {
        Self {
            id,
            chain_type,
            contract,
            registry_id,
            registry_version,
            needs_update: false,
            last_block: 0,
            whitelist: None,
            nodes: Vec::new(),
            weights: Vec::new(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn weights(&self) -> &[NodeWeight] {
        &self.weights
    }

    pub fn weight_at(&self, index: usize) -> Option<&NodeWeight> {
        self.weights.get(index)
    }

    pub fn weight_at_mut(&mut self, index: usize) -> Option<&mut NodeWeight> {
        self.weights.get_mut(index)
    }

    /// Invariant (§8 property 1): `nodelist_length == length(weights)`.
    pub fn invariant_holds(&self) -> bool {
        self.nodes.len() == self.weights.len()
    }

    fn index_of(&self, address: &Address) -> Option<usize> {
        self.nodes.iter().position(|n| &n.address == address)
    }

    /// §4.1 `add_node`: updates an existing node in place (preserving its
    /// weight slot) or appends a new node + default weight slot.
    pub fn add_node(&mut self, url: String, props: in3_types::NodeProps, address: Address) {
        if let Some(i) = self.index_of(&address) {
            self.nodes[i].url = url;
            self.nodes[i].props = props;
        } else {
            let mut node = Node::new(address, url);
            node.props = props;
            self.nodes.push(node);
            self.weights.push(NodeWeight::default());
        }
    }

    /// §4.1 `add_node` plus the registration-grace blacklist applied to
    /// brand-new registrations only (not to an address that already existed).
    pub fn add_node_at(&mut self, url: String, props: in3_types::NodeProps, address: Address, now_ms: u64) {
        let already_known = self.index_of(&address).is_some();
        self.add_node(url, props, address);
        if !already_known {
            if let Some(i) = self.index_of(&address) {
                self.weights[i].blacklist_for(now_ms, REGISTRATION_BLACKLIST_MS);
            }
        }
    }

    /// §4.1 `remove_node`: compacts both parallel arrays, preserving the
    /// relative order of survivors (§8 property 2).
    pub fn remove_node(&mut self, address: &Address) -> bool {
        match self.index_of(address) {
            Some(i) => {
                self.nodes.remove(i);
                self.weights.remove(i);
                true
            }
            None => false,
        }
    }

    /// §4.1 `clear_nodes`: resets both parallel arrays to empty.
    pub fn clear_nodes(&mut self) {
        self.nodes.clear();
        self.weights.clear();
    }

    /// Swaps in a freshly parsed nodelist + weight vector wholesale, used by
    /// the nodelist refresh protocol (§4.2) once parsing has succeeded.
    pub fn replace_nodelist(&mut self, nodes: Vec<Node>, weights: Vec<NodeWeight>) {
        debug_assert_eq!(nodes.len(), weights.len());
        self.nodes = nodes;
        self.weights = weights;
    }

    pub fn node_by_address(&self, address: &Address) -> Option<(&Node, &NodeWeight)> {
        self.index_of(address)
            .map(|i| (&self.nodes[i], &self.weights[i]))
    }

    /// §4.3: after a whitelist refresh or explicit edit, re-derive every
    /// node's `whitelisted` flag from exact-bytes membership in the buffer.
    pub fn sync_whitelist_flags(&mut self) {
        match &self.whitelist {
            Some(wl) => {
                for node in self.nodes.iter_mut() {
                    node.whitelisted = wl.contains(&node.address);
                }
            }
            None => {
                for node in self.nodes.iter_mut() {
                    node.whitelisted = false;
                }
            }
        }
    }
}
