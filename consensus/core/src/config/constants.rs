pub mod consensus {
    //!
    //! A module for constants which directly impact consensus.
    //!

    use crate::BlockHeight;

    /// Mainnet height from which covenant token balances must be conserved
    pub const MAINNET_COVENANT_ACTIVATION_HEIGHT: BlockHeight = 1_134_000;
}

pub mod perf {
    //!
    //! A module for performance critical constants which do not impact consensus.
    //!

    /// Default memory ceiling of the tip coin cache in bytes
    pub const DEFAULT_COIN_CACHE_MAX_BYTES: usize = 450 * 1024 * 1024;

    /// Transactions with at least this many inputs verify their scripts in parallel
    pub const DEFAULT_PARALLEL_SCRIPT_CHECK_THRESHOLD: usize = 16;
}

pub use consensus::*;
pub use perf::*;
