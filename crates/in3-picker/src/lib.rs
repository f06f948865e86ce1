//! The weighted node picker (§4.4): filters a chain's nodelist by deposit,
//! required capability bits, whitelist, and blacklist-expiry, scores the
//! survivors, and samples a subset of them without replacement by weight.

use in3_registry::Chain;
use in3_types::{Address, Error, NodeProps, Result};
use rand::Rng;
use tracing::debug;

/// One node selected by [`pick_nodes`]: its identity/endpoint plus the two
/// scalars used during sampling (§4.4).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub address: Address,
    pub url: String,
    /// Index into the owning chain's nodelist, standing in for the
    /// original's node pointer for duplicate detection.
    pub node_index: usize,
    /// Cumulative weight sum of all preceding candidates.
    pub s: u64,
    /// This candidate's own score.
    pub w: u64,
}

struct Scored {
    node_index: usize,
    address: Address,
    url: String,
    w: u64,
}

fn score(weight: u64, capacity: u64, avg_response_time: u64) -> u64 {
    let base = 500 / avg_response_time.max(1);
    weight * capacity * base
}

fn filter_candidates(chain: &Chain, now_ms: u64, required: NodeProps, min_deposit: u64) -> Vec<Scored> {
    let has_whitelist = chain.whitelist.is_some();
    chain
        .nodes()
        .iter()
        .enumerate()
        .filter_map(|(i, node)| {
            if has_whitelist && !node.whitelisted {
                return None;
            }
            if node.deposit < min_deposit {
                return None;
            }
            if !node.props.satisfies(required) {
                return None;
            }
            let weight = chain.weight_at(i)?;
            if weight.is_blacklisted(now_ms) {
                return None;
            }
            Some(Scored {
                node_index: i,
                address: node.address,
                url: node.url.clone(),
                w: score(weight.weight, node.capacity, weight.avg_response_time()),
            })
        })
        .collect()
}

/// §4.4: selects up to `requested` nodes satisfying `required` from `chain`.
///
/// Clears every blacklist mark on the chain and retries the filter once if
/// nothing survives and more than half the nodelist is blacklisted — a
/// last-resort unstick for a chain whose whole nodelist went bad at once.
pub fn pick_nodes(
    chain: &mut Chain,
    now_ms: u64,
    requested: usize,
    required: NodeProps,
    min_deposit: u64,
) -> Result<Vec<Candidate>> {
    let mut scored = filter_candidates(chain, now_ms, required, min_deposit);

    if scored.is_empty() && !chain.nodes().is_empty() {
        let blacklisted = chain
            .weights()
            .iter()
            .filter(|w| w.is_blacklisted(now_ms))
            .count();
        if blacklisted * 2 > chain.nodes().len() {
            debug!(chain_id = chain.id, "majority of nodelist blacklisted, clearing and retrying");
            for w in 0..chain.weights().len() {
                if let Some(weight) = chain.weight_at_mut(w) {
                    weight.clear_blacklist();
                }
            }
            scored = filter_candidates(chain, now_ms, required, min_deposit);
        }
    }

    if scored.is_empty() {
        return Err(Error::NotFound("no node found".into()));
    }

    let mut candidates = Vec::with_capacity(scored.len());
    let mut cumulative = 0u64;
    for s in &scored {
        candidates.push(Candidate {
            address: s.address,
            url: s.url.clone(),
            node_index: s.node_index,
            s: cumulative,
            w: s.w,
        });
        cumulative += s.w;
    }
    let total_weight = cumulative;

    let k = requested.min(candidates.len());
    if k == candidates.len() {
        return Ok(candidates);
    }

    if total_weight == 0 {
        // every survivor scored zero (avg_response_time > 500 for all);
        // degrade to a stable prefix rather than stalling on sampling.
        return Ok(candidates.into_iter().take(k).collect());
    }

    let mut rng = rand::thread_rng();
    let mut chosen: Vec<usize> = Vec::with_capacity(k);
    let mut seen = std::collections::HashSet::with_capacity(k);
    let max_draws = 10 * k;
    for _ in 0..max_draws {
        if chosen.len() == k {
            break;
        }
        let r: u64 = rng.gen_range(0..total_weight);
        if let Some(pos) = candidates
            .iter()
            .position(|c| r >= c.s && r < c.s + c.w)
        {
            if seen.insert(candidates[pos].node_index) {
                chosen.push(pos);
            }
        }
    }

    Ok(chosen.into_iter().map(|i| candidates[i].clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use in3_registry::Chain;
    use in3_types::{ChainType, DEFAULT_PROPS};

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[0] = n;
        Address::new(bytes)
    }

    fn chain_with_nodes(n: u8) -> Chain {
        let mut chain = Chain::new(1, ChainType::Eth, Address::ZERO, [0u8; 32], 2);
        for i in 1..=n {
            chain.add_node(format!("http://{i}"), NodeProps::new(DEFAULT_PROPS), addr(i));
        }
        chain
    }

    #[test]
    fn never_selects_below_min_deposit() {
        let mut chain = chain_with_nodes(3);
        // every node defaults to deposit 0; a min_deposit of 100 excludes all of them.
        let err = pick_nodes(&mut chain, 0, 3, NodeProps::new(DEFAULT_PROPS), 100).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn returns_error_when_no_candidate_survives() {
        let mut chain = Chain::new(1, ChainType::Eth, Address::ZERO, [0u8; 32], 2);
        let err = pick_nodes(&mut chain, 0, 1, NodeProps::new(DEFAULT_PROPS), 0).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn never_selects_blacklisted_node() {
        let mut chain = chain_with_nodes(2);
        chain.weight_at_mut(0).unwrap().blacklist_for(0, 1_000_000);
        let picked = pick_nodes(&mut chain, 0, 2, NodeProps::new(DEFAULT_PROPS), 0).unwrap();
        assert!(picked.iter().all(|c| c.address != addr(1)));
    }

    #[test]
    fn clears_blacklist_and_retries_when_majority_blacklisted() {
        let mut chain = chain_with_nodes(3);
        for i in 0..3 {
            chain.weight_at_mut(i).unwrap().blacklist_for(0, 1_000_000);
        }
        let picked = pick_nodes(&mut chain, 0, 3, NodeProps::new(DEFAULT_PROPS), 0).unwrap();
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn requesting_all_returns_every_candidate_in_order() {
        let mut chain = chain_with_nodes(4);
        let picked = pick_nodes(&mut chain, 0, 4, NodeProps::new(DEFAULT_PROPS), 0).unwrap();
        assert_eq!(picked.len(), 4);
        let addrs: Vec<u8> = picked.iter().map(|c| c.address.as_bytes()[0]).collect();
        assert_eq!(addrs, vec![1, 2, 3, 4]);
    }

    #[test]
    fn never_returns_duplicate_nodes() {
        let mut chain = chain_with_nodes(5);
        let picked = pick_nodes(&mut chain, 0, 2, NodeProps::new(DEFAULT_PROPS), 0).unwrap();
        let mut addrs: Vec<u8> = picked.iter().map(|c| c.address.as_bytes()[0]).collect();
        addrs.sort_unstable();
        addrs.dedup();
        assert_eq!(addrs.len(), picked.len());
    }
}
