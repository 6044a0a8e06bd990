use bitflags::bitflags;

bitflags! {
    /// Verification rules applied on top of the base script semantics
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ScriptFlags: u32 {
        /// Unlocking scripts may only push data
        const VERIFY_SIGPUSHONLY = 1 << 0;
        /// Data must be pushed with the smallest possible opcode
        const VERIFY_MINIMALDATA = 1 << 1;
        /// Signatures must carry the lower of the two equivalent S values
        const VERIFY_LOW_S = 1 << 2;
        /// A failed signature check requires an empty signature
        const VERIFY_NULLFAIL = 1 << 3;
        /// Exactly one element must remain on the stack after execution
        const VERIFY_CLEANSTACK = 1 << 4;
        /// Executing NOP1 and NOP4..NOP10 is an error
        const VERIFY_DISCOURAGE_UPGRADABLE_NOPS = 1 << 5;
        const VERIFY_CHECKLOCKTIMEVERIFY = 1 << 6;
        const VERIFY_CHECKSEQUENCEVERIFY = 1 << 7;
        /// Enables the transaction introspection opcodes (0xc0..=0xc8)
        const ENABLE_INTROSPECTION = 1 << 8;
    }
}

/// Rules every block transaction must satisfy
pub const MANDATORY_SCRIPT_VERIFY_FLAGS: ScriptFlags = ScriptFlags::VERIFY_SIGPUSHONLY
    .union(ScriptFlags::VERIFY_LOW_S)
    .union(ScriptFlags::VERIFY_NULLFAIL)
    .union(ScriptFlags::VERIFY_CLEANSTACK)
    .union(ScriptFlags::VERIFY_CHECKLOCKTIMEVERIFY)
    .union(ScriptFlags::VERIFY_CHECKSEQUENCEVERIFY)
    .union(ScriptFlags::ENABLE_INTROSPECTION);

/// Rules applied to transactions relayed and accepted to the mempool
pub const STANDARD_SCRIPT_VERIFY_FLAGS: ScriptFlags =
    MANDATORY_SCRIPT_VERIFY_FLAGS.union(ScriptFlags::VERIFY_MINIMALDATA).union(ScriptFlags::VERIFY_DISCOURAGE_UPGRADABLE_NOPS);

/// Standard-only rules, whose violation is a policy failure rather than a consensus one
pub const STANDARD_NOT_MANDATORY_VERIFY_FLAGS: ScriptFlags = STANDARD_SCRIPT_VERIFY_FLAGS.difference(MANDATORY_SCRIPT_VERIFY_FLAGS);
