//! The node registry: per-chain nodelists, weights, and whitelists, plus the
//! pure mutation and refresh-parsing operations of §4.1–4.3. Issuing a
//! refresh as a child context lives one layer up, in `in3-context`.

pub mod chain;
pub mod node;
pub mod nodelist;
pub mod registry;
pub mod whitelist;

pub use chain::Chain;
pub use node::{Node, NodeWeight, FAILURE_BLACKLIST_MS, REGISTRATION_BLACKLIST_MS};
pub use nodelist::apply_nodelist_refresh;
pub use registry::ChainTable;
pub use whitelist::{parse_whitelist_result, Whitelist};
