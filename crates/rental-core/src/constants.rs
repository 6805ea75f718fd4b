//! Protocol constants. All monetary values in lovelace (1 ADA = 10^6 lovelace).

/// Lovelace per whole ADA.
pub const LOVELACE_PER_ADA: u64 = 1_000_000;

/// CIP-1852 purpose index for Shelley-era wallets.
pub const CIP1852_PURPOSE: u32 = 1852;

/// SLIP-44 coin type registered for ADA.
pub const ADA_COIN_TYPE: u32 = 1815;

/// Offset marking a derivation index as hardened.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Length of a Blake2b-224 key or script hash.
pub const KEY_HASH_LEN: usize = 28;

/// Length of a Blake2b-256 transaction id.
pub const TX_HASH_LEN: usize = 32;

/// Maximum length of a native asset name in bytes.
pub const MAX_ASSET_NAME_LEN: usize = 32;

/// Constant overhead added to an output's serialized size in the min-ADA rule.
pub const MIN_UTXO_OVERHEAD_BYTES: u64 = 160;

/// Slots added to the chain tip to form a transaction's TTL.
pub const DEFAULT_TTL_HORIZON_SLOTS: u64 = 2_500;

/// Witnesses expected on a rental transaction: payment key plus stake key.
pub const DEFAULT_WITNESS_COUNT: usize = 2;

/// Upper bound on fee-convergence passes in the assembler.
pub const MAX_FEE_PASSES: usize = 4;

/// Upper bound on selection/assembly negotiation rounds in the builder.
pub const MAX_NEGOTIATION_ROUNDS: usize = 4;

/// Transaction size used to seed the initial fee reserve before a draft exists.
pub const INITIAL_SIZE_ESTIMATE: usize = 400;
