//! The configurator (§4.8): applies a declarative JSON document to a
//! [`Client`], validating it fully before mutating anything so a rejected
//! document never leaves the client half-updated.

use in3_registry::Whitelist;
use in3_types::{well_known, Address, NodeProps, ProofMode, DEFAULT_PROPS};
use in3_types::{Error, Result};
use serde_json::Value;

use crate::client::Client;

/// A validated per-chain override parsed from the `servers`/`nodes` key,
/// applied only after the whole document has parsed successfully.
struct ServerOverride {
    chain_id: u64,
    contract: Option<Address>,
    registry_id: Option<[u8; 32]>,
    whitelist_contract: Option<Address>,
    whitelist_addresses: Option<Vec<Address>>,
    needs_update: Option<bool>,
    node_list: Option<Vec<NodeEntry>>,
}

struct NodeEntry {
    address: Address,
    url: String,
    props: NodeProps,
}

fn expect_bool(key: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::InvalidArgument(format!("{key} must be a boolean")))
}

fn expect_u64(key: &str, value: &Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| Error::InvalidArgument(format!("{key} must be a non-negative integer")))
}

fn expect_u32(key: &str, value: &Value) -> Result<u32> {
    expect_u64(key, value).and_then(|v| {
        u32::try_from(v).map_err(|_| Error::InvalidArgument(format!("{key} out of range")))
    })
}

fn expect_u16(key: &str, value: &Value) -> Result<u16> {
    expect_u64(key, value).and_then(|v| {
        u16::try_from(v).map_err(|_| Error::InvalidArgument(format!("{key} out of range")))
    })
}

fn expect_u8(key: &str, value: &Value) -> Result<u8> {
    expect_u64(key, value).and_then(|v| {
        u8::try_from(v).map_err(|_| Error::InvalidArgument(format!("{key} out of range")))
    })
}

fn parse_address(key: &str, value: &Value) -> Result<Address> {
    let text = value
        .as_str()
        .ok_or_else(|| Error::InvalidArgument(format!("{key} must be a hex address string")))?;
    Address::from_hex(text).ok_or_else(|| Error::InvalidArgument(format!("{key}: malformed 20-byte address {text}")))
}

fn parse_registry_id(value: &Value) -> Result<[u8; 32]> {
    let text = value
        .as_str()
        .ok_or_else(|| Error::InvalidArgument("registryId must be a hex string".into()))?;
    let bytes = hex::decode(text.strip_prefix("0x").unwrap_or(text))
        .map_err(|_| Error::InvalidArgument("registryId is not valid hex".into()))?;
    if bytes.len() != 32 {
        return Err(Error::InvalidArgument("registryId must be exactly 32 bytes".into()));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Resolves a chain key — decimal id, `0x`-prefixed hex id, or a well-known
/// name — the way `servers`/`nodes`/`chainId` accept either form (§4.8).
fn resolve_chain_id(text: &str) -> Result<u64> {
    match text {
        "mainnet" => return Ok(well_known::MAINNET),
        "kovan" => return Ok(well_known::KOVAN),
        "goerli" => return Ok(well_known::GOERLI),
        "ipfs" => return Ok(well_known::IPFS),
        "local" => return Ok(well_known::LOCAL),
        _ => {}
    }
    if let Some(hex) = text.strip_prefix("0x") {
        return u64::from_str_radix(hex, 16)
            .map_err(|_| Error::InvalidArgument(format!("invalid chain id {text}")));
    }
    text.parse::<u64>()
        .map_err(|_| Error::InvalidArgument(format!("invalid chain id {text}")))
}

pub fn parse_chain_id(value: &Value) -> Result<u64> {
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    if let Some(s) = value.as_str() {
        return resolve_chain_id(s);
    }
    Err(Error::InvalidArgument("chainId must be an integer or a well-known chain name".into()))
}

fn parse_node_list(value: &Value) -> Result<Vec<NodeEntry>> {
    let entries = value
        .as_array()
        .ok_or_else(|| Error::InvalidArgument("nodeList must be an array".into()))?;
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let address = entry
            .get("address")
            .ok_or_else(|| Error::InvalidArgument("nodeList entry missing address".into()))
            .and_then(|v| parse_address("nodeList[].address", v))?;
        let url = entry
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidArgument("nodeList entry missing url".into()))?
            .to_string();
        let props = entry
            .get("props")
            .map(|v| expect_u64("nodeList[].props", v))
            .transpose()?
            .unwrap_or(DEFAULT_PROPS);
        out.push(NodeEntry { address, url, props: NodeProps::new(props) });
    }
    Ok(out)
}

fn parse_server_override(chain_key: &str, value: &Value) -> Result<ServerOverride> {
    let chain_id = resolve_chain_id(chain_key)?;
    let obj = value
        .as_object()
        .ok_or_else(|| Error::InvalidArgument(format!("server override for {chain_key} must be an object")))?;

    let contract = obj.get("contract").map(|v| parse_address("contract", v)).transpose()?;
    let registry_id = obj.get("registryId").map(parse_registry_id).transpose()?;
    let whitelist_contract = obj
        .get("whiteListContract")
        .map(|v| parse_address("whiteListContract", v))
        .transpose()?;
    let whitelist_addresses = obj
        .get("whiteList")
        .map(|v| {
            v.as_array()
                .ok_or_else(|| Error::InvalidArgument("whiteList must be an array".into()))?
                .iter()
                .map(|e| parse_address("whiteList[]", e))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;
    let needs_update = obj.get("needsUpdate").map(|v| expect_bool("needsUpdate", v)).transpose()?;
    let node_list = obj.get("nodeList").map(parse_node_list).transpose()?;

    Ok(ServerOverride {
        chain_id,
        contract,
        registry_id,
        whitelist_contract,
        whitelist_addresses,
        needs_update,
        node_list,
    })
}

fn apply_server_override(client: &Client, ov: ServerOverride) {
    client.chains.with_chain_mut(ov.chain_id, |chain| {
        if let Some(contract) = ov.contract {
            chain.contract = contract;
        }
        if let Some(registry_id) = ov.registry_id {
            chain.registry_id = registry_id;
        }
        if let Some(contract) = ov.whitelist_contract {
            chain.whitelist = Some(Whitelist::managed(contract));
        }
        if let Some(addresses) = ov.whitelist_addresses {
            match chain.whitelist.as_mut() {
                Some(wl) => wl.addresses = addresses,
                None => chain.whitelist = Some(Whitelist::manual(addresses)),
            }
        }
        if let Some(needs_update) = ov.needs_update {
            chain.needs_update = needs_update;
        }
        if let Some(nodes) = ov.node_list {
            chain.clear_nodes();
            for entry in nodes {
                chain.add_node(entry.url, entry.props, entry.address);
            }
        }
        chain.sync_whitelist_flags();
    });
}

/// Applies the `rpc` shortcut (§4.8): proof off, one node per request,
/// default chain `local`, and the existing local node's URL rewritten in
/// place — the bootstrap node's address is kept, only its endpoint changes
/// (§8 concrete scenario 2).
fn apply_rpc_shortcut(client: &Client, url: String) {
    client.chains.with_chain_mut(well_known::LOCAL, |chain| {
        let (address, props) = chain
            .nodes()
            .first()
            .map(|n| (n.address, n.props))
            .unwrap_or((Address::ZERO, NodeProps::new(DEFAULT_PROPS)));
        chain.clear_nodes();
        chain.add_node(url, props, address);
    });
}

/// Applies a declarative config document to `client` (§4.8). Recognised
/// keys are listed in SPEC_FULL.md's table; unrecognised keys are ignored
/// rather than rejected, matching the original's forward-compatible option
/// parsing. Every recognised key is validated before any part of `client`
/// is mutated.
pub fn apply(client: &Client, doc: &Value) -> Result<()> {
    let obj = doc
        .as_object()
        .ok_or_else(|| Error::InvalidArgument("config document must be a JSON object".into()))?;

    let mut pending = client.config.read().clone();
    let mut pending_default_chain = None;
    let mut server_overrides = Vec::new();
    let mut rpc_shortcut = None;

    for (key, value) in obj {
        match key.as_str() {
            "autoUpdateList" => pending.auto_update_list = expect_bool(key, value)?,
            "chainId" => pending_default_chain = Some(parse_chain_id(value)?),
            "signatureCount" => pending.signature_count = expect_u8(key, value)?,
            "finality" => pending.finality = expect_u32(key, value)?,
            "includeCode" => pending.include_code = expect_bool(key, value)?,
            "maxAttempts" => pending.max_attempts = expect_u32(key, value)?,
            "keepIn3" => {
                expect_bool(key, value)?;
            }
            "maxBlockCache" | "maxCodeCache" => {
                expect_u32(key, value)?;
            }
            "minDeposit" => pending.min_deposit = expect_u64(key, value)?,
            "nodeLimit" => pending.node_limit = expect_u16(key, value)?,
            "proof" => {
                let s = value
                    .as_str()
                    .ok_or_else(|| Error::InvalidArgument("proof must be a string".into()))?;
                pending.proof = ProofMode::parse(s)
                    .ok_or_else(|| Error::InvalidArgument(format!("unknown proof mode {s}")))?;
            }
            "replaceLatestBlock" => pending.replace_latest_block = expect_u32(key, value)?,
            "requestCount" => pending.request_count = expect_u32(key, value)? as usize,
            "rpc" => {
                let url = value
                    .as_str()
                    .ok_or_else(|| Error::InvalidArgument("rpc must be a URL string".into()))?;
                rpc_shortcut = Some(url.to_string());
            }
            "servers" | "nodes" => {
                let entries = value
                    .as_object()
                    .ok_or_else(|| Error::InvalidArgument(format!("{key} must be an object")))?;
                for (chain_key, chain_value) in entries {
                    server_overrides.push(parse_server_override(chain_key, chain_value)?);
                }
            }
            _ => {}
        }
    }

    if rpc_shortcut.is_some() {
        pending.proof = ProofMode::None;
        pending.request_count = 1;
        pending_default_chain = Some(well_known::LOCAL);
    }

    // Everything above only read `doc` and built local values; nothing on
    // `client` has been touched yet, so a rejected document never leaves a
    // chain half-updated.
    *client.config.write() = pending;
    if let Some(chain_id) = pending_default_chain {
        *client.default_chain.write() = chain_id;
    }
    for ov in server_overrides {
        apply_server_override(client, ov);
    }
    if let Some(url) = rpc_shortcut {
        apply_rpc_shortcut(client, url);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rpc_shortcut_rewrites_local_node_url_and_sets_proof_none() {
        let client = Client::new(0).unwrap();
        apply(&client, &json!({"rpc": "http://localhost:8545"})).unwrap();
        assert_eq!(*client.default_chain.read(), well_known::LOCAL);
        assert_eq!(client.config.read().proof, ProofMode::None);
        assert_eq!(client.config.read().request_count, 1);
        let chain = client.chains.find_chain(well_known::LOCAL).unwrap();
        assert_eq!(chain.nodes().len(), 1);
        assert_eq!(chain.nodes()[0].url, "http://localhost:8545");
    }

    #[test]
    fn invalid_document_mutates_nothing() {
        let client = Client::new(0).unwrap();
        let before = client.config.read().max_attempts;
        let err = apply(&client, &json!({"maxAttempts": "not-a-number"})).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(client.config.read().max_attempts, before);
    }

    #[test]
    fn malformed_server_override_rejects_without_partial_mutation() {
        let client = Client::new(0).unwrap();
        let doc = json!({
            "servers": {
                "mainnet": { "contract": "0xnotanaddress" }
            }
        });
        let err = apply(&client, &doc).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let chain = client.chains.find_chain(well_known::MAINNET).unwrap();
        assert_eq!(chain.contract.to_string(), "0xc101000000000000000000000000000000000000");
    }

    #[test]
    fn signature_count_two_with_valid_document() {
        let client = Client::new(0).unwrap();
        apply(&client, &json!({"signatureCount": 2, "maxAttempts": 5})).unwrap();
        assert_eq!(client.config.read().signature_count, 2);
        assert_eq!(client.config.read().max_attempts, 5);
    }

    #[test]
    fn chain_id_by_name_sets_default_chain() {
        let client = Client::new(0).unwrap();
        apply(&client, &json!({"chainId": "ipfs"})).unwrap();
        assert_eq!(*client.default_chain.read(), well_known::IPFS);
    }
}
