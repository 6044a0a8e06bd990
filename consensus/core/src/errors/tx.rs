use crate::{BlockHeight, tx::TransactionOutpoint};
use lotus_hashes::Hash;
use lotus_txscript_errors::TxScriptError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxRuleError {
    #[error("transaction has no inputs")]
    NoTxInputs,

    #[error("transaction has no outputs")]
    NoTxOutputs,

    #[error("transaction size {0} is larger than max allowed size of {1}")]
    TxTooLarge(usize, usize),

    #[error("transaction size {0} is smaller than min allowed size of {1}")]
    TxTooSmall(usize, usize),

    #[error("transaction output {0} has a value of {1} which is outside the allowed range")]
    BadTxOutValue(usize, i64),

    #[error("total value of all transaction outputs is higher than the max allowed value")]
    TotalTxOutTooHigh,

    #[error("transaction has duplicate inputs")]
    TxDuplicateInputs,

    #[error("coinbase signature script of {0} bytes is outside the range 2..=100")]
    BadCoinbaseScriptSize(usize),

    #[error("input {0} of a non-coinbase transaction spends the null outpoint")]
    NullPrevout(usize),

    #[error("coinbase transactions are only valid in blocks")]
    CoinbaseInMempool,

    #[error("transaction spends missing or spent coins: {0:?}")]
    MissingInputs(Vec<TransactionOutpoint>),

    #[error("transaction would overwrite the unspent output {0}")]
    OverwritesUnspentOutput(TransactionOutpoint),

    #[error("input {0} tries to spend coinbase outpoint {1} created at height {2} at height {3} before the required maturity of {4} blocks")]
    ImmatureCoinbaseSpend(usize, TransactionOutpoint, BlockHeight, BlockHeight, u32),

    #[error("input value {0} is outside the allowed range")]
    InputAmountOutOfRange(i64),

    #[error("total input value is higher than the max allowed value")]
    InputAmountTooHigh,

    #[error("transaction output value {0} is higher than its input value {1}")]
    SpendTooHigh(i128, i128),

    #[error("transaction executed {0} signature checks, more than the allowed {1}")]
    TooManySigChecks(usize, usize),

    #[error("failed to verify the signature script: {0}")]
    SignatureInvalid(TxScriptError),

    #[error("failed to verify empty signature script. Inner error: {0}")]
    SignatureEmpty(TxScriptError),

    #[error("input {0} fails the mandatory script rules: {1}")]
    MandatoryScriptVerify(usize, TxScriptError),

    #[error("input {0} fails the standard script rules: {1}")]
    NonMandatoryScriptVerify(usize, TxScriptError),

    #[error("covenant token {genesis} is not conserved: inputs carry {input}, outputs carry {output}")]
    CovenantBalanceNotConserved { genesis: Hash, input: i128, output: i128 },
}

impl TxRuleError {
    /// Short machine readable rejection reason, as relayed to peers and RPC clients
    pub fn reject_reason(&self) -> &'static str {
        match self {
            TxRuleError::NoTxInputs => "bad-txns-vin-empty",
            TxRuleError::NoTxOutputs => "bad-txns-vout-empty",
            TxRuleError::TxTooLarge(..) => "bad-txns-oversize",
            TxRuleError::TxTooSmall(..) => "bad-txns-undersize",
            TxRuleError::BadTxOutValue(_, value) if *value < 0 => "bad-txns-vout-negative",
            TxRuleError::BadTxOutValue(..) => "bad-txns-vout-toolarge",
            TxRuleError::TotalTxOutTooHigh => "bad-txns-txouttotal-toolarge",
            TxRuleError::TxDuplicateInputs => "bad-txns-inputs-duplicate",
            TxRuleError::BadCoinbaseScriptSize(_) => "bad-cb-length",
            TxRuleError::NullPrevout(_) => "bad-txns-prevout-null",
            TxRuleError::CoinbaseInMempool => "coinbase",
            TxRuleError::MissingInputs(_) => "bad-txns-inputs-missingorspent",
            TxRuleError::OverwritesUnspentOutput(_) => "bad-txns-BIP30",
            TxRuleError::ImmatureCoinbaseSpend(..) => "bad-txns-premature-spend-of-coinbase",
            TxRuleError::InputAmountOutOfRange(_) | TxRuleError::InputAmountTooHigh => "bad-txns-inputvalues-outofrange",
            TxRuleError::SpendTooHigh(..) => "bad-txns-in-belowout",
            TxRuleError::TooManySigChecks(..) => "bad-txns-too-many-sigchecks",
            TxRuleError::SignatureInvalid(_) | TxRuleError::SignatureEmpty(_) | TxRuleError::MandatoryScriptVerify(..) => {
                "mandatory-script-verify-flag-failed"
            }
            TxRuleError::NonMandatoryScriptVerify(..) => "non-mandatory-script-verify-flag",
            TxRuleError::CovenantBalanceNotConserved { .. } => "bad-txns-covenant-balance",
        }
    }

    /// Whether the rejection stems from a consensus rule, as opposed to a relay policy
    pub fn is_consensus_violation(&self) -> bool {
        !matches!(self, TxRuleError::NonMandatoryScriptVerify(..))
    }
}

pub type TxResult<T> = std::result::Result<T, TxRuleError>;
