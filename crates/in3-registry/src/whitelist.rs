use in3_types::{Address, Error, Result};
use serde::{Deserialize, Serialize};

/// An additional membership filter over a chain's nodelist (§3, §4.3).
///
/// A whitelist with a zero contract is manual — edited directly by a caller
/// or the configurator — and is never refreshed from the network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Whitelist {
    pub contract: Address,
    pub last_block: u64,
    pub needs_update: bool,
    pub addresses: Vec<Address>,
}

impl Whitelist {
    pub fn manual(addresses: Vec<Address>) -> Self {
        Self {
            contract: Address::ZERO,
            last_block: 0,
            needs_update: false,
            addresses,
        }
    }

    pub fn managed(contract: Address) -> Self {
        Self {
            contract,
            last_block: 0,
            needs_update: true,
            addresses: Vec::new(),
        }
    }

    pub fn is_manual(&self) -> bool {
        self.contract.is_zero()
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.addresses.iter().any(|a| a == addr)
    }

    /// Parse a `in3_whiteList` RPC result (§4.3). `nodes` is the flat array
    /// of addresses; iterates one address per entry — the original's loop
    /// bound double-counts a stride of 20, underfilling the buffer by 20x
    /// (spec.md §9 Open Question 2); this implements the intended
    /// one-address-per-entry semantics.
    pub fn apply_refresh(&mut self, last_block_number: u64, addresses: Vec<Address>) -> Result<()> {
        if last_block_number <= self.last_block {
            return Ok(());
        }
        if self.is_manual() {
            return Err(Error::Configuration(
                "manual whitelist cannot be refreshed from the network".into(),
            ));
        }
        self.addresses = addresses;
        self.last_block = last_block_number;
        self.needs_update = false;
        Ok(())
    }
}

/// Parses a `in3_whiteList` RPC result (§4.3): `lastBlockNumber` plus a flat
/// array of 20-byte addresses.
pub fn parse_whitelist_result(raw: &serde_json::Value) -> Result<(u64, Vec<Address>)> {
    let last_block_number = raw
        .get("lastBlockNumber")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| Error::InvalidData("in3_whiteList missing lastBlockNumber".into()))?;

    let nodes = raw
        .get("nodes")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::InvalidData("in3_whiteList missing nodes".into()))?;

    let mut addresses = Vec::with_capacity(nodes.len());
    for entry in nodes {
        let text = entry
            .as_str()
            .ok_or_else(|| Error::InvalidData("in3_whiteList entry not a string".into()))?;
        let addr = Address::from_hex(text)
            .ok_or_else(|| Error::InvalidData(format!("bad whitelist address {text}")))?;
        addresses.push(addr);
    }
    Ok((last_block_number, addresses))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[0] = n;
        Address::new(bytes)
    }

    #[test]
    fn manual_whitelist_has_zero_contract_and_never_needs_update() {
        let wl = Whitelist::manual(vec![addr(1)]);
        assert!(wl.is_manual());
        assert!(!wl.needs_update);
    }

    #[test]
    fn managed_whitelist_starts_flagged_for_update() {
        let wl = Whitelist::managed(addr(0xaa));
        assert!(!wl.is_manual());
        assert!(wl.needs_update);
    }

    #[test]
    fn refresh_address_count_matches_nodes() {
        let mut wl = Whitelist::managed(addr(0xaa));
        let addresses: Vec<Address> = (0..5u8).map(addr).collect();
        wl.apply_refresh(10, addresses.clone()).unwrap();
        assert_eq!(wl.addresses.len(), 5);
        assert_eq!(wl.addresses, addresses);
        assert!(!wl.needs_update);
    }

    #[test]
    fn refresh_is_noop_when_block_not_advanced() {
        let mut wl = Whitelist::managed(addr(0xaa));
        wl.apply_refresh(10, vec![addr(1)]).unwrap();
        wl.apply_refresh(10, vec![addr(1), addr(2)]).unwrap();
        assert_eq!(wl.addresses.len(), 1);
    }

    #[test]
    fn manual_whitelist_rejects_refresh() {
        let mut wl = Whitelist::manual(vec![addr(1)]);
        assert!(wl.apply_refresh(10, vec![addr(2)]).is_err());
    }

    #[test]
    fn parse_whitelist_result_reads_flat_address_array() {
        let hex1 = addr(1).to_string();
        let hex2 = addr(2).to_string();
        let payload = serde_json::json!({
            "lastBlockNumber": 42,
            "nodes": [hex1, hex2],
        });
        let (block, addresses) = parse_whitelist_result(&payload).unwrap();
        assert_eq!(block, 42);
        assert_eq!(addresses, vec![addr(1), addr(2)]);
    }

    #[test]
    fn parse_whitelist_result_rejects_missing_last_block() {
        let payload = serde_json::json!({ "nodes": [] });
        assert!(parse_whitelist_result(&payload).is_err());
    }
}
