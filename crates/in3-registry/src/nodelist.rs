use in3_types::{Address, Error, NodeProps, Result, DEFAULT_PROPS};
use serde::Deserialize;

use crate::chain::Chain;
use crate::node::{Node, NodeWeight, REGISTRATION_BLACKLIST_MS};

/// One entry of a `in3_nodeList` response, before it is merged into a chain
/// (§4.2). Mandatory fields are `address` and `url`; the rest default.
#[derive(Debug, Clone, Deserialize)]
struct NodeListEntry {
    address: String,
    url: String,
    #[serde(default = "default_capacity")]
    capacity: u64,
    #[serde(default)]
    deposit: u64,
    #[serde(default = "default_props")]
    props: u64,
    #[serde(default)]
    index: Option<u32>,
    #[serde(rename = "registerTime", default)]
    register_time: u64,
}

fn default_capacity() -> u64 {
    1
}

fn default_props() -> u64 {
    DEFAULT_PROPS
}

#[derive(Debug, Deserialize)]
struct NodeListResponse {
    #[serde(rename = "lastBlockNumber")]
    last_block_number: u64,
    nodes: Vec<NodeListEntry>,
}

/// Parses and applies a `in3_nodeList` RPC result to `chain` (§4.2).
///
/// On a missing-field error the new list is discarded entirely and the
/// chain is left unchanged, per spec. `now_ms` is compared against each
/// entry's own `registerTime` to apply the registration-grace blacklist,
/// independent of whether its weight record is reused or fresh.
pub fn apply_nodelist_refresh(chain: &mut Chain, raw_result: &serde_json::Value, now_ms: u64) -> Result<()> {
    let parsed: NodeListResponse = serde_json::from_value(raw_result.clone())
        .map_err(|e| Error::InvalidData(format!("malformed in3_nodeList result: {e}")))?;

    if parsed.last_block_number <= chain.last_block {
        return Ok(());
    }

    let old_nodes = chain.nodes().to_vec();
    let old_weights = chain.weights().to_vec();

    let mut new_nodes = Vec::with_capacity(parsed.nodes.len());
    let mut new_weights = Vec::with_capacity(parsed.nodes.len());

    for (position, entry) in parsed.nodes.iter().enumerate() {
        let address = Address::from_hex(&entry.address)
            .ok_or_else(|| Error::InvalidData(format!("bad address {}", entry.address)))?;

        let reused = old_nodes
            .get(position)
            .filter(|n| n.address == address)
            .map(|_| old_weights[position])
            .or_else(|| {
                old_nodes
                    .iter()
                    .position(|n| n.address == address)
                    .map(|i| old_weights[i])
            });

        let mut weight = reused.unwrap_or_default();

        // §4.2 registration-grace blacklist (nodelist.c:120-125): applied to
        // every entry the wire reports as recently registered, regardless of
        // whether its weight record was reused, keyed off the node's own
        // `registerTime` rather than the refresh time.
        if now_ms > 0 && entry.register_time + REGISTRATION_BLACKLIST_MS > now_ms && now_ms > entry.register_time {
            weight.blacklisted_until = entry.register_time + REGISTRATION_BLACKLIST_MS;
        }

        let mut node = Node::new(address, entry.url.clone());
        node.capacity = entry.capacity;
        node.deposit = entry.deposit;
        node.props = NodeProps::new(entry.props);
        let _ = entry.index;

        new_nodes.push(node);
        new_weights.push(weight);
    }

    chain.replace_nodelist(new_nodes, new_weights);
    chain.last_block = parsed.last_block_number;
    chain.needs_update = false;
    Ok(())
}
