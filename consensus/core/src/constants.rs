/// Number of satoshis in one XPI
pub const COIN: i64 = 1_000_000;

/// Upper bound of any single amount and of any sum of amounts
pub const MAX_MONEY: i64 = 2_100_000_000_000 * COIN;

/// Maximal serialized size of a transaction
pub const MAX_TX_SIZE: usize = 1_000_000;

/// Minimal serialized size of a transaction
pub const MIN_TX_SIZE: usize = 100;

/// Coinbase outputs are spendable after this many blocks
pub const COINBASE_MATURITY: u32 = 100;

/// Maximal number of signature checks a single transaction may execute
pub const MAX_TX_SIGCHECKS: usize = 3000;

/// Bounds of the coinbase signature script size
pub const MIN_COINBASE_SCRIPT_SIG_SIZE: usize = 2;
pub const MAX_COINBASE_SCRIPT_SIG_SIZE: usize = 100;

/// Largest output count a transaction of [`MAX_TX_SIZE`] could encode, each output taking
/// at least 9 bytes (8 bytes of value and an empty script length).
pub const MAX_OUTPUTS_PER_TX: u32 = (MAX_TX_SIZE / 9) as u32;

/// Locking scripts larger than this can never be executed and are never stored as coins
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Lock times below this value are block heights, above it unix timestamps
pub const LOCK_TIME_THRESHOLD: u32 = 500_000_000;

/// An input with this sequence number is final
pub const MAX_TX_IN_SEQUENCE_NUM: u32 = u32::MAX;

/// Relative lock time semantics of the sequence number (BIP68)
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000ffff;

/// Transaction versions accepted by standardness rules
pub const MIN_TX_VERSION: i32 = 1;
pub const MAX_TX_VERSION: i32 = 2;
