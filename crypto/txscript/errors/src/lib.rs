use thiserror::Error;

#[derive(Error, PartialEq, Eq, Debug, Clone)]
pub enum TxScriptError {
    #[error("invalid opcode length: {0:02x?}")]
    MalformedPushSize(Vec<u8>),
    #[error("opcode requires {0} bytes, but script only has {1} remaining")]
    MalformedPush(usize, usize),
    #[error("transaction output index {0} >= {1}")]
    InvalidOutputIndex(i64, usize),
    #[error("combined stack size {0} > max allowed {1}")]
    StackSizeExceeded(usize, usize),
    #[error("attempt to execute invalid opcode {0}")]
    InvalidOpcode(String),
    #[error("attempt to execute reserved opcode {0}")]
    OpcodeReserved(String),
    #[error("attempt to execute disabled opcode {0}")]
    OpcodeDisabled(String),
    #[error("attempt to read from empty stack")]
    EmptyStack,
    #[error("stack contains {0} unexpected items")]
    CleanStack(usize),
    // We return error if stack entry is false
    #[error("false stack entry at end of script execution")]
    EvalFalse,
    #[error("script returned early")]
    EarlyReturn,
    #[error("script ran, but verification failed")]
    VerifyError,
    #[error("encountered invalid state while running script: {0}")]
    InvalidState(String),
    #[error("signature invalid: {0}")]
    InvalidSignature(secp256k1::Error),
    #[error("exceeded max operation limit of {0}")]
    TooManyOperations(i32),
    #[error("engine is not running on a transaction input")]
    NotATransactionInput,
    #[error("element size {0} exceeds max allowed size {1}")]
    ElementTooBig(usize, usize),
    #[error("push encoding is not minimal: {0}")]
    NotMinimalData(String),
    #[error("negative lock time: {0}")]
    NegativeLockTime(i64),
    #[error("unsatisfied lock time: {0}")]
    UnsatisfiedLockTime(String),
    #[error("number too big: {0}")]
    NumberTooBig(String),
    #[error("attempt to divide by zero")]
    DivByZero,
    #[error("attempt to split {1} bytes at position {0}")]
    InvalidSplitRange(i64, usize),
    #[error("operands of sizes {0} and {1} do not match")]
    InvalidOperandSize(usize, usize),
    #[error("number encoded as {0:02x?} does not fit in {1} bytes")]
    ImpossibleEncoding(Vec<u8>, usize),
    #[error("not all signatures empty on failed check")]
    NullFail,
    #[error("dummy checkmultisig argument must be empty")]
    SigNullDummy,
    #[error("invalid signature count: {0}")]
    InvalidSignatureCount(String),
    #[error("invalid pubkey count: {0}")]
    InvalidPubKeyCount(String),
    #[error("invalid hash type {0:#04x}")]
    InvalidSigHashType(u8),
    #[error("signature hash type is missing the fork id")]
    MustUseForkId,
    #[error("non-canonical DER signature")]
    SigDer,
    #[error("signature S value is unnecessarily high")]
    SigHighS,
    #[error("unsupported public key type")]
    PubKeyFormat,
    #[error("no scripts to run")]
    NoScripts,
    #[error("signature script is not push only")]
    SignatureScriptNotPushOnly,
    #[error("end of script reached in conditional execution")]
    ErrUnbalancedConditional,
    #[error("opcode requires at least {0} but stack has only {1}")]
    InvalidStackOperation(usize, usize),
    #[error("script of size {0} exceeded maximum allowed size of {1}")]
    ScriptSize(usize, usize),
    #[error("upgradable nop {0} is discouraged")]
    DiscourageUpgradableNops(String),
    #[error("exceeded max signature checks of {0}")]
    TooManySigChecks(usize),
}
