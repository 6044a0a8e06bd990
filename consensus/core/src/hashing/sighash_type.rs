pub const SIG_HASH_ALL: SigHashType = SigHashType(0x01);
pub const SIG_HASH_NONE: SigHashType = SigHashType(0x02);
pub const SIG_HASH_SINGLE: SigHashType = SigHashType(0x03);
pub const SIG_HASH_FORKID: SigHashType = SigHashType(0x40);
pub const SIG_HASH_ANY_ONE_CAN_PAY: SigHashType = SigHashType(0x80);

/// SIG_HASH_MASK defines the number of bits of the hash type which are used
/// to identify which outputs are signed.
pub const SIG_HASH_MASK: u8 = 0x1f;

const ALLOWED_BASE_TYPES: [u8; 3] = [SIG_HASH_ALL.0, SIG_HASH_NONE.0, SIG_HASH_SINGLE.0];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SigHashType(pub(crate) u8);

/// Reasons a hash type byte is rejected
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SigHashTypeError {
    /// Undefined base type or stray bits
    Invalid,
    /// The replay protecting fork id bit is missing
    MissingForkId,
}

impl SigHashType {
    /// The type used by standard wallets: all inputs and outputs, with fork id
    pub const fn all_forkid() -> Self {
        Self(SIG_HASH_ALL.0 | SIG_HASH_FORKID.0)
    }

    pub fn base_type(self) -> u8 {
        self.0 & SIG_HASH_MASK
    }

    pub fn is_sighash_all(self) -> bool {
        self.base_type() == SIG_HASH_ALL.0
    }

    pub fn is_sighash_none(self) -> bool {
        self.base_type() == SIG_HASH_NONE.0
    }

    pub fn is_sighash_single(self) -> bool {
        self.base_type() == SIG_HASH_SINGLE.0
    }

    pub fn is_sighash_anyone_can_pay(self) -> bool {
        self.0 & SIG_HASH_ANY_ONE_CAN_PAY.0 == SIG_HASH_ANY_ONE_CAN_PAY.0
    }

    pub fn has_forkid(self) -> bool {
        self.0 & SIG_HASH_FORKID.0 == SIG_HASH_FORKID.0
    }

    pub fn to_u8(self) -> u8 {
        self.0
    }

    pub fn from_u8(val: u8) -> Result<Self, SigHashTypeError> {
        let base = val & SIG_HASH_MASK;
        let extra = val & !(SIG_HASH_MASK | SIG_HASH_FORKID.0 | SIG_HASH_ANY_ONE_CAN_PAY.0);
        if !ALLOWED_BASE_TYPES.contains(&base) || extra != 0 {
            return Err(SigHashTypeError::Invalid);
        }
        let hash_type = Self(val);
        if !hash_type.has_forkid() {
            return Err(SigHashTypeError::MissingForkId);
        }
        Ok(hash_type)
    }
}
