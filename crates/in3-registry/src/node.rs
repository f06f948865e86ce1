use in3_types::{Address, NodeProps, DEFAULT_PROPS};
use serde::{Deserialize, Serialize};

/// A single remote service endpoint (§3 "Node").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub address: Address,
    pub url: String,
    pub capacity: u64,
    pub deposit: u64,
    pub props: NodeProps,
    pub whitelisted: bool,
}

impl Node {
    pub fn new(address: Address, url: String) -> Self {
        Self {
            address,
            url,
            capacity: 1,
            deposit: 0,
            props: NodeProps::new(DEFAULT_PROPS),
            whitelisted: false,
        }
    }
}

/// Per-node rolling selection state, parallel to `Node` by index (§3 "Node
/// weight"). `blacklisted_until == 0` means not blacklisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeWeight {
    pub blacklisted_until: u64,
    pub response_count: u64,
    pub total_response_time: u64,
    pub weight: u64,
}

impl Default for NodeWeight {
    fn default() -> Self {
        Self {
            blacklisted_until: 0,
            response_count: 0,
            total_response_time: 0,
            weight: 1,
        }
    }
}

impl NodeWeight {
    pub fn is_blacklisted(&self, now_ms: u64) -> bool {
        self.blacklisted_until > now_ms
    }

    pub fn blacklist_for(&mut self, now_ms: u64, duration_ms: u64) {
        self.blacklisted_until = now_ms + duration_ms;
    }

    pub fn clear_blacklist(&mut self) {
        self.blacklisted_until = 0;
    }

    /// `500` when no response has been observed yet — equivalent to a
    /// multiplier of 1 in the scoring formula (§4.4).
    pub fn avg_response_time(&self) -> u64 {
        if self.response_count == 0 {
            500
        } else {
            self.total_response_time / self.response_count
        }
    }

    pub fn record_response(&mut self, elapsed_ms: u64) {
        self.response_count += 1;
        self.total_response_time += elapsed_ms;
    }
}

/// A node response that has just been blacklisted for a transport or
/// verification failure (§4.6): one hour, in milliseconds.
pub const FAILURE_BLACKLIST_MS: u64 = 3_600_000;

/// Registration-grace blacklist applied to a freshly-registered node
/// (§4.1): the intended 24h, not the original's off-by-`DAY`-bug value
/// (see DESIGN.md).
pub const REGISTRATION_BLACKLIST_MS: u64 = 24 * 3_600_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avg_response_time_defaults_to_500() {
        let w = NodeWeight::default();
        assert_eq!(w.avg_response_time(), 500);
    }

    #[test]
    fn avg_response_time_is_integer_mean() {
        let mut w = NodeWeight::default();
        w.record_response(100);
        w.record_response(300);
        assert_eq!(w.avg_response_time(), 200);
    }

    #[test]
    fn blacklist_for_sets_absolute_expiry() {
        let mut w = NodeWeight::default();
        w.blacklist_for(1_000, FAILURE_BLACKLIST_MS);
        assert_eq!(w.blacklisted_until, 1_000 + FAILURE_BLACKLIST_MS);
        assert!(w.is_blacklisted(1_000));
        assert!(!w.is_blacklisted(1_000 + FAILURE_BLACKLIST_MS));
    }
}
