//! Wires up the well-known chains of §6 at client construction: their
//! registry contract, a couple of bootstrap nodes each, and (for `local`) a
//! single loopback node a caller typically overrides via `{"rpc": "..."}`.
//!
//! The literal addresses below are placeholder-but-correctly-shaped 20-byte
//! values, not the real mainnet registry deployment — see DESIGN.md.

use in3_registry::ChainTable;
use in3_types::{well_known, Address, ChainType, NodeProps, DEFAULT_PROPS};

fn addr(tag: u8, chain: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = tag;
    bytes[1] = chain;
    Address::new(bytes)
}

struct BootstrapChain {
    id: u64,
    chain_type: ChainType,
    contract: Address,
    node_urls: &'static [&'static str],
}

const MAINNET_NODES: &[&str] = &["https://in3-mainnet-a.example", "https://in3-mainnet-b.example"];
const KOVAN_NODES: &[&str] = &["https://in3-kovan-a.example", "https://in3-kovan-b.example"];
const GOERLI_NODES: &[&str] = &["https://in3-goerli-a.example", "https://in3-goerli-b.example"];
const IPFS_NODES: &[&str] = &["https://in3-ipfs-a.example", "https://in3-ipfs-b.example"];
const LOCAL_NODES: &[&str] = &["http://localhost:8545"];

fn bootstrap_chains() -> [BootstrapChain; 5] {
    [
        BootstrapChain { id: well_known::MAINNET, chain_type: ChainType::Eth, contract: addr(0xc1, 1), node_urls: MAINNET_NODES },
        BootstrapChain { id: well_known::KOVAN, chain_type: ChainType::Eth, contract: addr(0xc1, 2), node_urls: KOVAN_NODES },
        BootstrapChain { id: well_known::GOERLI, chain_type: ChainType::Eth, contract: addr(0xc1, 3), node_urls: GOERLI_NODES },
        BootstrapChain { id: well_known::IPFS, chain_type: ChainType::Ipfs, contract: addr(0xc1, 4), node_urls: IPFS_NODES },
        BootstrapChain { id: well_known::LOCAL, chain_type: ChainType::Eth, contract: Address::ZERO, node_urls: LOCAL_NODES },
    ]
}

/// Registers the five well-known chains, in bootstrap order (§8 concrete
/// scenario 1: mainnet, kovan, goerli, ipfs, local).
pub fn register_well_known_chains(chains: &ChainTable) {
    for (i, bc) in bootstrap_chains().iter().enumerate() {
        chains.register_chain(bc.id, bc.chain_type, bc.contract, [0u8; 32], 2, None);
        chains.with_chain_mut(bc.id, |chain| {
            for (n, url) in bc.node_urls.iter().enumerate() {
                chain.add_node(
                    url.to_string(),
                    NodeProps::new(DEFAULT_PROPS),
                    addr(0xA0 + n as u8, i as u8),
                );
            }
        });
    }
}
