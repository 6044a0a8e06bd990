use std::iter::once;

use crate::{
    MAX_SCRIPT_ELEMENT_SIZE, MAX_SCRIPTS_SIZE,
    data_stack::OpcodeData,
    opcodes::{OP_1_NEGATE_VAL, OP_DATA_MAX_VAL, OP_DATA_MIN_VAL, OP_SMALL_INT_MAX_VAL, codes::*},
};
use thiserror::Error;

/// Initial capacity of the script buffer, enough for any standard locking or unlocking script
const DEFAULT_SCRIPT_ALLOC: usize = 128;

#[derive(Error, PartialEq, Eq, Debug, Clone, Copy)]
pub enum ScriptBuilderError {
    #[error("adding opcode {0} would exceed the maximum allowed canonical script length of {MAX_SCRIPTS_SIZE}")]
    OpCodeRejected(u8),

    #[error("adding {0} opcodes would exceed the maximum allowed canonical script length of {MAX_SCRIPTS_SIZE}")]
    OpCodesRejected(usize),

    #[error("adding {0} bytes of data would exceed the maximum allowed canonical script length of {MAX_SCRIPTS_SIZE}")]
    DataRejected(usize),

    #[error("adding a data element of {0} bytes exceed the maximum allowed script element size of {MAX_SCRIPT_ELEMENT_SIZE}")]
    ElementExceedsMaxSize(usize),

    #[error("adding integer {0} would exceed the maximum allowed canonical script length of {MAX_SCRIPTS_SIZE}")]
    IntegerRejected(i64),
}
pub type ScriptBuilderResult<T> = std::result::Result<T, ScriptBuilderError>;

/// Builds scripts from opcodes, numbers and data, always choosing the minimal push encoding.
/// Anything the engine would refuse to run (oversized elements or scripts) is rejected
/// and leaves the script untouched.
///
/// ```
/// use lotus_txscript::opcodes::codes::*;
/// use lotus_txscript::script_builder::{ScriptBuilder, ScriptBuilderResult};
/// fn build_p2pkh_script(pubkey_hash: &[u8; 20]) -> ScriptBuilderResult<Vec<u8>> {
///     Ok(ScriptBuilder::new()
///         .add_ops(&[OpDup, OpHash160])?
///         .add_data(pubkey_hash)?
///         .add_ops(&[OpEqualVerify, OpCheckSig])?
///         .drain())
/// }
/// ```
pub struct ScriptBuilder {
    script: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self { script: Vec::with_capacity(DEFAULT_SCRIPT_ALLOC) }
    }

    pub fn script(&self) -> &[u8] {
        &self.script
    }

    /// Takes the built script, leaving the builder empty
    pub fn drain(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.script)
    }

    pub fn add_op(&mut self, opcode: u8) -> ScriptBuilderResult<&mut Self> {
        if self.script.len() >= MAX_SCRIPTS_SIZE {
            return Err(ScriptBuilderError::OpCodeRejected(opcode));
        }
        self.script.push(opcode);
        Ok(self)
    }

    pub fn add_ops(&mut self, opcodes: &[u8]) -> ScriptBuilderResult<&mut Self> {
        if self.script.len() + opcodes.len() > MAX_SCRIPTS_SIZE {
            return Err(ScriptBuilderError::OpCodesRejected(opcodes.len()));
        }
        self.script.extend_from_slice(opcodes);
        Ok(self)
    }

    /// Number of script bytes the minimal push of `data` takes
    pub fn canonical_data_size(data: &[u8]) -> usize {
        let data_len = data.len();
        if data_len == 0 || (data_len == 1 && (data[0] <= OP_SMALL_INT_MAX_VAL || data[0] == OP_1_NEGATE_VAL)) {
            return 1;
        }

        data_len
            + match data_len {
                l if l <= OP_DATA_MAX_VAL as usize => 1,
                l if l <= u8::MAX as usize => 2,
                l if l <= u16::MAX as usize => 3,
                _ => 5,
            }
    }

    fn add_raw_data(&mut self, data: &[u8]) -> &mut Self {
        let data_len = data.len();

        // Small numbers have dedicated opcodes
        match data {
            [] | [0] => {
                self.script.push(Op0);
                return self;
            }
            [n] if *n <= OP_SMALL_INT_MAX_VAL => {
                self.script.push((Op1 - 1) + n);
                return self;
            }
            [OP_1_NEGATE_VAL] => {
                self.script.push(Op1Negate);
                return self;
            }
            _ => {}
        }

        if data_len <= OP_DATA_MAX_VAL as usize {
            self.script.push((OP_DATA_MIN_VAL - 1) + data_len as u8);
        } else if data_len <= u8::MAX as usize {
            self.script.extend(once(OpPushData1).chain(once(data_len as u8)));
        } else if data_len <= u16::MAX as usize {
            self.script.extend(once(OpPushData2).chain((data_len as u16).to_le_bytes()));
        } else {
            self.script.extend(once(OpPushData4).chain((data_len as u32).to_le_bytes()));
        }
        self.script.extend_from_slice(data);
        self
    }

    /// Pushes data without the size limits, to build scripts the engine must reject
    #[cfg(test)]
    pub fn add_data_unchecked(&mut self, data: &[u8]) -> &mut Self {
        self.add_raw_data(data)
    }

    /// Pushes `data` with the minimal push opcode. Elements above [`MAX_SCRIPT_ELEMENT_SIZE`]
    /// and pushes overflowing [`MAX_SCRIPTS_SIZE`] are rejected.
    pub fn add_data(&mut self, data: &[u8]) -> ScriptBuilderResult<&mut Self> {
        let data_size = Self::canonical_data_size(data);
        if self.script.len() + data_size > MAX_SCRIPTS_SIZE {
            return Err(ScriptBuilderError::DataRejected(data_size));
        }
        if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(ScriptBuilderError::ElementExceedsMaxSize(data.len()));
        }
        Ok(self.add_raw_data(data))
    }

    /// Pushes `val` as a minimally encoded script number
    pub fn add_i64(&mut self, val: i64) -> ScriptBuilderResult<&mut Self> {
        if self.script.len() + 1 > MAX_SCRIPTS_SIZE {
            return Err(ScriptBuilderError::IntegerRejected(val));
        }
        match val {
            0 => {
                self.script.push(Op0);
                Ok(self)
            }
            -1 | 1..=16 => {
                self.script.push(((Op1 as i64 - 1) + val) as u8);
                Ok(self)
            }
            _ => {
                let bytes = <Vec<u8> as OpcodeData<i64>>::serialize(&val);
                self.add_data(&bytes)
            }
        }
    }

    /// Pushes an OP_CHECKLOCKTIMEVERIFY operand
    pub fn add_lock_time(&mut self, lock_time: u32) -> ScriptBuilderResult<&mut Self> {
        self.add_i64(lock_time as i64)
    }

    /// Pushes an OP_CHECKSEQUENCEVERIFY operand
    pub fn add_sequence(&mut self, sequence: u32) -> ScriptBuilderResult<&mut Self> {
        self.add_i64(sequence as i64)
    }
}

impl Default for ScriptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::iter::repeat_n;

    #[test]
    fn test_add_op() {
        let mut builder = ScriptBuilder::new();
        builder.add_op(OpTrue).unwrap().add_op(OpDup).unwrap();
        assert_eq!(builder.script(), &[OpTrue, OpDup]);

        let result = ScriptBuilder::new().add_ops(&[OpHash160, OpEqual]).expect("the script is canonical").drain();
        assert_eq!(result, vec![OpHash160, OpEqual]);
    }

    #[test]
    fn test_add_i64() {
        struct Test {
            val: i64,
            expected: Vec<u8>,
        }

        let tests = vec![
            Test { val: -1, expected: vec![Op1Negate] },
            Test { val: 0, expected: vec![Op0] },
            Test { val: 1, expected: vec![Op1] },
            Test { val: 16, expected: vec![Op16] },
            Test { val: 17, expected: vec![OpData1, 0x11] },
            Test { val: 127, expected: vec![OpData1, 0x7f] },
            Test { val: 128, expected: vec![OpData2, 0x80, 0] },
            Test { val: 256, expected: vec![OpData2, 0, 0x01] },
            Test { val: 32768, expected: vec![OpData3, 0, 0x80, 0] },
            Test { val: -2, expected: vec![OpData1, 0x82] },
            Test { val: -127, expected: vec![OpData1, 0xff] },
            Test { val: -128, expected: vec![OpData2, 0x80, 0x80] },
            Test { val: -32768, expected: vec![OpData3, 0x00, 0x80, 0x80] },
        ];

        for test in tests {
            let result = ScriptBuilder::new().add_i64(test.val).expect("the script is canonical").drain();
            assert_eq!(result, test.expected, "push {} wrong result", test.val);
        }
    }

    #[test]
    fn test_add_data() {
        struct Test {
            name: &'static str,
            data: Vec<u8>,
            expected: ScriptBuilderResult<Vec<u8>>,
        }

        let tests = vec![
            Test { name: "empty", data: vec![], expected: Ok(vec![Op0]) },
            Test { name: "byte 0x00", data: vec![0x00], expected: Ok(vec![Op0]) },
            Test { name: "byte 0x01", data: vec![0x01], expected: Ok(vec![Op1]) },
            Test { name: "byte 0x10", data: vec![0x10], expected: Ok(vec![Op16]) },
            Test { name: "byte 0x81", data: vec![0x81], expected: Ok(vec![Op1Negate]) },
            Test { name: "byte 0x11", data: vec![0x11], expected: Ok(vec![OpData1, 0x11]) },
            Test { name: "byte 0x80", data: vec![0x80], expected: Ok(vec![OpData1, 0x80]) },
            Test { name: "20 bytes", data: vec![0x49; 20], expected: Ok(once(OpData20).chain(repeat_n(0x49, 20)).collect()) },
            Test { name: "75 bytes", data: vec![0x49; 75], expected: Ok(once(OpData75).chain(repeat_n(0x49, 75)).collect()) },
            Test {
                name: "76 bytes",
                data: vec![0x49; 76],
                expected: Ok(once(OpPushData1).chain(once(76)).chain(repeat_n(0x49, 76)).collect()),
            },
            Test {
                name: "256 bytes",
                data: vec![0x49; 256],
                expected: Ok(once(OpPushData2).chain([0, 1]).chain(repeat_n(0x49, 256)).collect()),
            },
            Test {
                name: "520 bytes",
                data: vec![0x49; 520],
                expected: Ok(once(OpPushData2).chain([8, 2]).chain(repeat_n(0x49, 520)).collect()),
            },
            Test { name: "521 bytes", data: vec![0x49; 521], expected: Err(ScriptBuilderError::ElementExceedsMaxSize(521)) },
            Test { name: "65536 bytes", data: vec![0x49; 65536], expected: Err(ScriptBuilderError::DataRejected(65541)) },
        ];

        for test in tests {
            let result = ScriptBuilder::new().add_data(&test.data).map(|builder| builder.drain());
            assert_eq!(result, test.expected, "{} wrong result", test.name);
        }

        let mut builder = ScriptBuilder::new();
        builder.add_data_unchecked(&[0x49; 65536]);
        assert_eq!(builder.script()[..5], [OpPushData4, 0, 0, 1, 0]);
    }

    #[test]
    fn test_lock_time_is_a_script_number() {
        // A raw little endian 0xff would read back as -127
        assert_eq!(ScriptBuilder::new().add_lock_time(0xff).unwrap().drain(), vec![OpData2, 0xff, 0x00]);
        assert_eq!(ScriptBuilder::new().add_lock_time(500_000_000).unwrap().drain(), vec![OpData4, 0x00, 0x65, 0xcd, 0x1d]);
        assert_eq!(ScriptBuilder::new().add_sequence(u32::MAX).unwrap().drain(), vec![OpData5, 0xff, 0xff, 0xff, 0xff, 0x00]);
        assert_eq!(ScriptBuilder::new().add_sequence(10).unwrap().drain(), vec![Op10]);
    }

    #[test]
    fn test_exceed_max_script_size() {
        let mut builder = ScriptBuilder::new();
        builder.add_data_unchecked(&[0u8; MAX_SCRIPTS_SIZE - 3]);
        let full = builder.script().to_vec();
        assert_eq!(full.len(), MAX_SCRIPTS_SIZE);

        assert_eq!(builder.add_data(&[0u8]).map(|_| ()), Err(ScriptBuilderError::DataRejected(1)));
        assert_eq!(builder.add_op(Op0).map(|_| ()), Err(ScriptBuilderError::OpCodeRejected(Op0)));
        assert_eq!(builder.add_ops(&[OpCheckSig]).map(|_| ()), Err(ScriptBuilderError::OpCodesRejected(1)));
        assert_eq!(builder.add_i64(0).map(|_| ()), Err(ScriptBuilderError::IntegerRejected(0)));
        assert_eq!(builder.add_lock_time(0).map(|_| ()), Err(ScriptBuilderError::IntegerRejected(0)));
        assert_eq!(builder.script(), &full);
    }
}
