//! Function selectors and event topics.
//!
//! A function selector is the first 4 bytes of keccak256 of the canonical
//! signature; an event topic is the full 32-byte hash:
//!   keccak256("Transfer(address,address,uint256)")
//!   → 0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef

use tiny_keccak::{Hasher, Keccak};
use walletwatch_core::rules::RuleTable;

fn keccak256(input: &str) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(input.as_bytes());
    hasher.finalize(&mut output);
    output
}

/// `0x`-prefixed event topic of `signature`.
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature)))
}

/// `0x`-prefixed 4-byte selector of `signature`.
pub fn selector(signature: &str) -> String {
    format!("0x{}", hex::encode(&keccak256(signature)[..4]))
}

pub const TRANSFER_EVENT: &str = "Transfer(address,address,uint256)";
pub const TRANSFER_FN: &str = "transfer(address,uint256)";
pub const TRANSFER_FROM_FN: &str = "transferFrom(address,address,uint256)";

const SWAP_FNS: &[&str] = &[
    "swapExactTokensForTokens(uint256,uint256,address[],address,uint256)",
    "swapTokensForExactTokens(uint256,uint256,address[],address,uint256)",
    "swapExactETHForTokens(uint256,address[],address,uint256)",
    "swapETHForExactTokens(uint256,address[],address,uint256)",
    "swapExactTokensForETH(uint256,uint256,address[],address,uint256)",
    "swapTokensForExactETH(uint256,uint256,address[],address,uint256)",
    "execute(bytes,bytes[],uint256)",
];

const SWAP_EVENTS: &[&str] = &[
    "Swap(address,uint256,uint256,uint256,uint256,address)",
    "Swap(address,address,int256,int256,uint160,uint128,int24)",
];

const INITIALIZE_FNS: &[&str] = &["initialize()", "initialize(address)"];

const INITIALIZE_EVENTS: &[&str] = &["Initialized(uint8)", "Initialize(uint160,int24)"];

/// Built-in markers: ERC-20 transfers, Uniswap-style router swaps and
/// proxy/pool initializers.
pub fn default_rules() -> RuleTable {
    RuleTable {
        token_transfer: vec![
            event_topic(TRANSFER_EVENT),
            selector(TRANSFER_FN),
            selector(TRANSFER_FROM_FN),
        ],
        swap: SWAP_FNS
            .iter()
            .map(|s| selector(s))
            .chain(SWAP_EVENTS.iter().map(|s| event_topic(s)))
            .collect(),
        initialize: INITIALIZE_FNS
            .iter()
            .map(|s| selector(s))
            .chain(INITIALIZE_EVENTS.iter().map(|s| event_topic(s)))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erc20_transfer_topic() {
        assert_eq!(
            event_topic(TRANSFER_EVENT),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn well_known_selectors() {
        assert_eq!(selector(TRANSFER_FN), "0xa9059cbb");
        assert_eq!(selector(TRANSFER_FROM_FN), "0x23b872dd");
        assert_eq!(selector("initialize()"), "0x8129fc1c");
    }

    #[test]
    fn uniswap_v3_swap_topic() {
        assert_eq!(
            event_topic("Swap(address,address,int256,int256,uint160,uint128,int24)"),
            "0xc42079f94a6350d7e6235f29174924f928cc2ac818eb64fed8004e115fbcca67"
        );
    }

    #[test]
    fn defaults_cover_all_lists() {
        let rules = default_rules();
        assert_eq!(rules.token_transfer.len(), 3);
        assert_eq!(rules.swap.len(), SWAP_FNS.len() + SWAP_EVENTS.len());
        assert!(!rules.initialize.is_empty());
    }
}
