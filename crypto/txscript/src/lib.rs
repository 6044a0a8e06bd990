pub mod caches;
pub mod context;
pub mod covenants;
mod data_stack;
pub mod flags;
pub mod opcodes;
pub mod script_builder;
pub mod standard;

use crate::context::{NoTxContext, TxContext};
use crate::data_stack::{DataStack, Stack};
use crate::flags::ScriptFlags;
use crate::opcodes::{OpCodeImplementation, OpCond, deserialize_next_opcode};
use itertools::Itertools;
use log::trace;
use lotus_consensus_core::constants::MAX_TX_SIGCHECKS;
use lotus_consensus_core::hashing::sighash_type::{SigHashType, SigHashTypeError};
use secp256k1::ecdsa::Signature;

pub use lotus_txscript_errors::TxScriptError;

pub mod prelude {
    pub use super::context::{NoTxContext, TransactionChecker, TxContext};
    pub use super::flags::{MANDATORY_SCRIPT_VERIFY_FLAGS, STANDARD_SCRIPT_VERIFY_FLAGS, ScriptFlags};
    pub use super::{SigCacheKey, TxScriptEngine, TxScriptError};
}

pub const MAX_STACK_SIZE: usize = 1000;
pub const MAX_SCRIPTS_SIZE: usize = 10_000;
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;
pub const MAX_OPS_PER_SCRIPT: i32 = 201;
pub const MAX_PUB_KEYS_PER_MULTISIG: i32 = 20;

// Note that this includes OP_RESERVED which counts as a push operation.
pub const NO_COST_OPCODE: u8 = 0x60;

type DynOpcodeImplementation<C> = Box<dyn OpCodeImplementation<C>>;

#[derive(Clone, Hash, PartialEq, Eq)]
pub struct SigCacheKey {
    pub(crate) signature: Signature,
    pub(crate) pub_key: secp256k1::PublicKey,
    pub(crate) message: secp256k1::Message,
}

enum ScriptSource<'a> {
    /// The signature script and the spent locking script, both taken from the context
    TxInput,
    StandAloneScripts(Vec<&'a [u8]>),
}

pub struct TxScriptEngine<'a, C: TxContext> {
    dstack: Stack,
    astack: Stack,

    script_source: ScriptSource<'a>,
    ctx: &'a C,
    flags: ScriptFlags,

    cond_stack: Vec<OpCond>, // Following if stacks, and whether it is running

    num_ops: i32,
    sig_checks: usize,

    // The running script, the offset right after the opcode being executed and the
    // offset following the last executed OP_CODESEPARATOR
    script: &'a [u8],
    next_offset: usize,
    code_separator: usize,
}

fn parse_script<C: TxContext>(script: &[u8]) -> impl Iterator<Item = Result<DynOpcodeImplementation<C>, TxScriptError>> + '_ {
    script.iter().batching(|it| deserialize_next_opcode(it))
}

/// Whether `script` parses and consists of data pushes only
pub fn is_push_only(script: &[u8]) -> bool {
    parse_script::<NoTxContext>(script).all(|opcode| opcode.is_ok_and(|opcode| opcode.is_push_opcode()))
}

/// BIP66 strict DER encoding of an ECDSA signature, without the trailing hash type byte
fn is_strict_der(sig: &[u8]) -> bool {
    // 0x30 [total-length] 0x02 [R-length] [R] 0x02 [S-length] [S]
    if sig.len() < 8 || sig.len() > 72 {
        return false;
    }
    if sig[0] != 0x30 || sig[1] as usize != sig.len() - 2 {
        return false;
    }
    let len_r = sig[3] as usize;
    if 5 + len_r >= sig.len() {
        return false;
    }
    let len_s = sig[5 + len_r] as usize;
    if len_r + len_s + 6 != sig.len() {
        return false;
    }

    if sig[2] != 0x02 || len_r == 0 || sig[4] & 0x80 != 0 {
        return false;
    }
    // No unnecessary leading zero in R
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }

    if sig[len_r + 4] != 0x02 || len_s == 0 || sig[len_r + 6] & 0x80 != 0 {
        return false;
    }
    !(len_s > 1 && sig[len_r + 6] == 0x00 && sig[len_r + 7] & 0x80 == 0)
}

impl<'a, C: TxContext> TxScriptEngine<'a, C> {
    pub fn new(ctx: &'a C, flags: ScriptFlags) -> Self {
        Self::with_source(ctx, ScriptSource::StandAloneScripts(vec![]), flags)
    }

    /// Creates an engine validating the input described by `ctx`: its signature script
    /// runs first, then the locking script of the coin it spends.
    pub fn from_transaction_input(ctx: &'a C, flags: ScriptFlags) -> Self {
        Self::with_source(ctx, ScriptSource::TxInput, flags)
    }

    fn with_source(ctx: &'a C, script_source: ScriptSource<'a>, flags: ScriptFlags) -> Self {
        Self {
            dstack: Default::default(),
            astack: Default::default(),
            script_source,
            ctx,
            flags,
            cond_stack: Default::default(),
            num_ops: 0,
            sig_checks: 0,
            script: &[],
            next_offset: 0,
            code_separator: 0,
        }
    }

    /// Signature checks performed so far
    pub fn sig_checks(&self) -> usize {
        self.sig_checks
    }

    #[inline]
    pub fn is_executing(&self) -> bool {
        matches!(self.cond_stack.last(), None | Some(OpCond::True))
    }

    fn execute_opcode(&mut self, opcode: DynOpcodeImplementation<C>) -> Result<(), TxScriptError> {
        if !opcode.is_push_opcode() {
            self.num_ops += 1;
            if self.num_ops > MAX_OPS_PER_SCRIPT {
                return Err(TxScriptError::TooManyOperations(MAX_OPS_PER_SCRIPT));
            }
        } else if opcode.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(TxScriptError::ElementTooBig(opcode.len(), MAX_SCRIPT_ELEMENT_SIZE));
        }

        if self.is_executing() || opcode.is_conditional() {
            if self.flags.contains(ScriptFlags::VERIFY_MINIMALDATA) && opcode.value() > 0 && opcode.value() <= opcodes::codes::OpPushData4
            {
                opcode.check_minimal_data_push()?;
            }
            opcode.execute(self)
        } else {
            Ok(())
        }
    }

    fn execute_script(&mut self, script: &'a [u8], verify_only_push: bool) -> Result<(), TxScriptError> {
        self.script = script;
        self.next_offset = 0;
        self.code_separator = 0;

        let script_result = parse_script(script).try_for_each(|opcode| {
            let opcode = opcode?;
            if opcode.is_disabled() {
                return Err(TxScriptError::OpcodeDisabled(format!("{:?}", opcode)));
            }

            if opcode.always_illegal() {
                return Err(TxScriptError::OpcodeReserved(format!("{:?}", opcode)));
            }

            if verify_only_push && !opcode.is_push_opcode() {
                return Err(TxScriptError::SignatureScriptNotPushOnly);
            }

            self.next_offset += opcode.encoded_len();
            self.execute_opcode(opcode)?;

            let combined_size = self.astack.len() + self.dstack.len();
            if combined_size > MAX_STACK_SIZE {
                return Err(TxScriptError::StackSizeExceeded(combined_size, MAX_STACK_SIZE));
            }
            Ok(())
        });

        // Moving between scripts - we can't be inside an if
        if script_result.is_ok() && !self.cond_stack.is_empty() {
            return Err(TxScriptError::ErrUnbalancedConditional);
        }

        // Alt stack doesn't persist
        self.astack.clear();
        self.num_ops = 0; // number of ops is per script.

        script_result
    }

    pub fn execute(&mut self) -> Result<(), TxScriptError> {
        let ctx = self.ctx;
        let scripts = match &self.script_source {
            ScriptSource::TxInput => {
                let signature_script = ctx.signature_script().ok_or(TxScriptError::NotATransactionInput)?;
                let locking_script = ctx.active_bytecode().ok_or(TxScriptError::NotATransactionInput)?;
                trace!("executing the scripts of input {:?}", ctx.input_index());
                vec![signature_script, locking_script]
            }
            ScriptSource::StandAloneScripts(scripts) => scripts.clone(),
        };

        // When both the signature script and public key script are empty the
        // result is necessarily an error since the stack would end up being
        // empty which is equivalent to a false top element. Thus, just return
        // the relevant error now as an optimization.
        if scripts.is_empty() {
            return Err(TxScriptError::NoScripts);
        }

        if scripts.iter().all(|e| e.is_empty()) {
            return Err(TxScriptError::EvalFalse);
        }
        if let Some(s) = scripts.iter().find(|e| e.len() > MAX_SCRIPTS_SIZE) {
            return Err(TxScriptError::ScriptSize(s.len(), MAX_SCRIPTS_SIZE));
        }

        let verify_push_only =
            matches!(self.script_source, ScriptSource::TxInput) && self.flags.contains(ScriptFlags::VERIFY_SIGPUSHONLY);
        // try_for_each quits only if an error occurred. So, we always run over all scripts if
        // each is successful
        scripts
            .into_iter()
            .enumerate()
            .filter(|(_, s)| !s.is_empty())
            .try_for_each(|(idx, s)| self.execute_script(s, verify_push_only && idx == 0))?;

        self.check_error_condition()
    }

    // Returns Ok(()) if the scripts ended leaving a single true element on the stack
    // (or any number of elements topped by true, without clean stack rules).
    #[inline]
    fn check_error_condition(&mut self) -> Result<(), TxScriptError> {
        if self.dstack.is_empty() {
            return Err(TxScriptError::EmptyStack);
        }
        if self.flags.contains(ScriptFlags::VERIFY_CLEANSTACK) && self.dstack.len() > 1 {
            return Err(TxScriptError::CleanStack(self.dstack.len() - 1));
        }

        let [v]: [bool; 1] = self.dstack.pop_items()?;
        match v {
            true => Ok(()),
            false => Err(TxScriptError::EvalFalse),
        }
    }

    // *** SIGNATURE SPECIFIC CODE **

    /// The part of the running script signatures commit to
    fn script_code(&self) -> &'a [u8] {
        &self.script[self.code_separator.min(self.script.len())..]
    }

    fn check_pub_key_encoding(pub_key: &[u8]) -> Result<(), TxScriptError> {
        match (pub_key.len(), pub_key.first()) {
            (33, Some(0x02 | 0x03)) | (65, Some(0x04)) => Ok(()),
            _ => Err(TxScriptError::PubKeyFormat),
        }
    }

    /// Checks a DER signature followed by its hash type byte. The empty signature is
    /// always well formed and simply fails verification.
    fn check_signature_encoding(&self, sig: &[u8]) -> Result<(), TxScriptError> {
        let Some((&hash_type, der)) = sig.split_last() else {
            return Ok(());
        };
        if !is_strict_der(der) {
            return Err(TxScriptError::SigDer);
        }
        if self.flags.contains(ScriptFlags::VERIFY_LOW_S) {
            let signature = Signature::from_der(der).map_err(|_| TxScriptError::SigDer)?;
            let mut normalized = signature;
            normalized.normalize_s();
            if normalized != signature {
                return Err(TxScriptError::SigHighS);
            }
        }
        match SigHashType::from_u8(hash_type) {
            Ok(_) => Ok(()),
            Err(SigHashTypeError::MissingForkId) => Err(TxScriptError::MustUseForkId),
            Err(SigHashTypeError::Invalid) => Err(TxScriptError::InvalidSigHashType(hash_type)),
        }
    }

    fn count_sig_checks(&mut self, count: usize) -> Result<(), TxScriptError> {
        self.sig_checks += count;
        if self.sig_checks > MAX_TX_SIGCHECKS {
            return Err(TxScriptError::TooManySigChecks(MAX_TX_SIGCHECKS));
        }
        Ok(())
    }

    fn check_sig(&mut self, sig: &[u8], key: &[u8]) -> Result<bool, TxScriptError> {
        self.check_signature_encoding(sig)?;
        Self::check_pub_key_encoding(key)?;
        if sig.is_empty() {
            return Ok(false);
        }

        self.count_sig_checks(1)?;
        let valid = self.ctx.check_sig(sig, key, self.script_code())?;
        if !valid && self.flags.contains(ScriptFlags::VERIFY_NULLFAIL) {
            return Err(TxScriptError::NullFail);
        }
        Ok(valid)
    }

    fn op_check_multisig(&mut self) -> Result<bool, TxScriptError> {
        let [num_keys]: [i32; 1] = self.dstack.pop_items()?;
        if !(0..=MAX_PUB_KEYS_PER_MULTISIG).contains(&num_keys) {
            return Err(TxScriptError::InvalidPubKeyCount(format!("number of pubkeys {num_keys} is out of range")));
        }
        let num_keys = num_keys as usize;
        self.num_ops += num_keys as i32;
        if self.num_ops > MAX_OPS_PER_SCRIPT {
            return Err(TxScriptError::TooManyOperations(MAX_OPS_PER_SCRIPT));
        }
        if self.dstack.len() < num_keys {
            return Err(TxScriptError::InvalidStackOperation(num_keys, self.dstack.len()));
        }
        let pub_keys = self.dstack.split_off(self.dstack.len() - num_keys);

        let [num_sigs]: [i32; 1] = self.dstack.pop_items()?;
        if num_sigs < 0 || num_sigs as usize > num_keys {
            return Err(TxScriptError::InvalidSignatureCount(format!(
                "number of signatures {num_sigs} is out of range for {num_keys} pubkeys"
            )));
        }
        let num_sigs = num_sigs as usize;
        if self.dstack.len() < num_sigs {
            return Err(TxScriptError::InvalidStackOperation(num_sigs, self.dstack.len()));
        }
        let signatures = self.dstack.split_off(self.dstack.len() - num_sigs);

        // The extra element consumed by the historic multisig off-by-one must be empty
        let [dummy] = self.dstack.pop_raw()?;
        if !dummy.is_empty() {
            return Err(TxScriptError::SigNullDummy);
        }

        // Signatures are matched against the keys in order, a key can not be revisited
        let (mut sig_idx, mut key_idx) = (0, 0);
        let mut success = true;
        while success && sig_idx < num_sigs {
            let (sig, key) = (&signatures[sig_idx], &pub_keys[key_idx]);
            self.check_signature_encoding(sig)?;
            Self::check_pub_key_encoding(key)?;
            if !sig.is_empty() && self.ctx.check_sig(sig, key, self.script_code())? {
                sig_idx += 1;
            }
            key_idx += 1;
            if num_sigs - sig_idx > num_keys - key_idx {
                success = false;
            }
        }

        let has_signatures = signatures.iter().any(|sig| !sig.is_empty());
        if !success && has_signatures && self.flags.contains(ScriptFlags::VERIFY_NULLFAIL) {
            return Err(TxScriptError::NullFail);
        }
        if has_signatures {
            self.count_sig_checks(num_keys)?;
        }
        Ok(success)
    }
}

impl<'a> TxScriptEngine<'a, NoTxContext> {
    /// Creates an engine running a bare script, outside of any transaction
    pub fn from_script(script: &'a [u8], flags: ScriptFlags) -> Self {
        Self::with_source(&NoTxContext, ScriptSource::StandAloneScripts(vec![script]), flags)
    }

    /// Runs `scripts` in order over a shared data stack. Opcodes which need a transaction fail.
    pub fn execute_standalone(scripts: Vec<&'a [u8]>, flags: ScriptFlags) -> Result<(), TxScriptError> {
        Self::with_source(&NoTxContext, ScriptSource::StandAloneScripts(scripts), flags).execute()
    }
}
