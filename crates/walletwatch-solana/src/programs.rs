//! Well-known program ids and the default rule table.

use walletwatch_core::rules::RuleTable;

pub const SYSTEM_PROGRAM: &str = "11111111111111111111111111111111";
pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

pub const JUPITER_V6: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";
pub const RAYDIUM_AMM_V4: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const RAYDIUM_CLMM: &str = "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK";
pub const ORCA_WHIRLPOOL: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";

pub fn default_rules() -> RuleTable {
    RuleTable {
        token_transfer: vec![
            "Program log: Instruction: Transfer".to_string(),
        ],
        swap: vec![
            JUPITER_V6.to_string(),
            RAYDIUM_AMM_V4.to_string(),
            RAYDIUM_CLMM.to_string(),
            ORCA_WHIRLPOOL.to_string(),
            "Program log: Instruction: Swap".to_string(),
        ],
        initialize: vec!["Program log: Instruction: Initialize".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walletwatch_core::record::TxType;

    #[test]
    fn token_program_log_beats_swap_marker() {
        let rules = default_rules();
        let lines = [
            "Program log: Instruction: Swap",
            "Program log: Instruction: TransferChecked",
        ];
        assert_eq!(rules.classify(lines), Some(TxType::TokenTransfer));
    }

    #[test]
    fn amm_program_is_a_swap() {
        assert_eq!(default_rules().classify([RAYDIUM_AMM_V4]), Some(TxType::Swap));
    }

    #[test]
    fn account_setup_is_initialize() {
        let lines = ["Program log: Instruction: InitializeAccount3"];
        assert_eq!(default_rules().classify(lines), Some(TxType::Initialize));
    }

    #[test]
    fn system_program_has_no_marker() {
        assert_eq!(default_rules().classify([SYSTEM_PROGRAM]), None);
    }
}
