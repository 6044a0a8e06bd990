#[macro_use]
mod macros;

use crate::{
    MAX_SCRIPT_ELEMENT_SIZE, NO_COST_OPCODE, TxScriptEngine, TxScriptError,
    context::TxContext,
    data_stack::{DEFAULT_SCRIPT_NUM_LEN, DataStack, OpcodeData, SizedEncodeInt, minimally_encode},
    flags::ScriptFlags,
};
use lotus_consensus_core::constants::SEQUENCE_LOCKTIME_DISABLE_FLAG;
use lotus_hashes::{Hasher, Sha256d, hash160};
use ripemd::Ripemd160;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt::{Debug, Formatter};

/// First value in the range formed by the "small integer" Op# opcodes
pub const OP_SMALL_INT_MIN_VAL: u8 = 1;
/// Last value in the range formed by the "small integer" Op# opcodes
pub const OP_SMALL_INT_MAX_VAL: u8 = 16;
/// First value in the range formed by OpData# opcodes (where opcode == value)
pub const OP_DATA_MIN_VAL: u8 = self::codes::OpData1;
/// Last value in the range formed by OpData# opcodes (where opcode == value)
pub const OP_DATA_MAX_VAL: u8 = self::codes::OpData75;
/// Minus 1 value
pub const OP_1_NEGATE_VAL: u8 = 0x81;

#[derive(PartialEq, Eq, Debug)]
pub(crate) enum OpCond {
    False,
    True,
    Skip,
}

impl OpCond {
    pub fn negate(&self) -> OpCond {
        match self {
            OpCond::True => OpCond::False,
            OpCond::False => OpCond::True,
            OpCond::Skip => OpCond::Skip,
        }
    }
}

type OpCodeResult = Result<(), TxScriptError>;

pub(crate) struct OpCode<const CODE: u8> {
    data: Vec<u8>,
}

impl<const CODE: u8> Debug for OpCode<CODE> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Opcode<{:#04x}>{{ data:{:?} }}", CODE, self.data)
    }
}

pub trait OpCodeMetadata: Debug {
    // Opcode number
    fn value(&self) -> u8;
    // length of data
    fn len(&self) -> usize;
    // Conditionals are evaluated even inside a non-executed branch
    fn is_conditional(&self) -> bool;
    // For push data- check if we can use shorter encoding
    fn check_minimal_data_push(&self) -> Result<(), TxScriptError>;

    fn is_push_opcode(&self) -> bool;
    // Disabled opcodes fail a script even when they appear in a non-executed branch
    fn is_disabled(&self) -> bool;
    fn always_illegal(&self) -> bool;
    fn get_data(&self) -> &[u8];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait OpCodeExecution<C: TxContext> {
    fn empty() -> Result<Box<dyn OpCodeImplementation<C>>, TxScriptError>
    where
        Self: Sized;
    #[allow(clippy::new_ret_no_self)]
    fn new(data: Vec<u8>) -> Result<Box<dyn OpCodeImplementation<C>>, TxScriptError>
    where
        Self: Sized;

    fn execute(&self, vm: &mut TxScriptEngine<C>) -> OpCodeResult;
}

pub trait OpcodeSerialization {
    fn serialize(&self) -> Vec<u8>;
    /// Number of script bytes the opcode occupies, including its push data
    fn encoded_len(&self) -> usize;
    fn deserialize<'i, I: Iterator<Item = &'i u8>, C: TxContext>(
        it: &mut I,
    ) -> Result<Box<dyn OpCodeImplementation<C>>, TxScriptError>
    where
        Self: Sized;
}

pub trait OpCodeImplementation<C: TxContext>: OpCodeExecution<C> + OpCodeMetadata + OpcodeSerialization {}

impl<const CODE: u8> OpCodeMetadata for OpCode<CODE> {
    fn value(&self) -> u8 {
        CODE
    }

    fn is_push_opcode(&self) -> bool {
        CODE <= NO_COST_OPCODE
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn is_conditional(&self) -> bool {
        (codes::OpIf..=codes::OpEndIf).contains(&CODE)
    }

    fn check_minimal_data_push(&self) -> Result<(), TxScriptError> {
        let data_len = self.len();
        let opcode = self.value();

        if data_len == 0 {
            if opcode != codes::OpFalse {
                return Err(TxScriptError::NotMinimalData(format!(
                    "zero length data push is encoded with opcode {self:?} instead of OpFalse"
                )));
            }
        } else if data_len == 1 && OP_SMALL_INT_MIN_VAL <= self.data[0] && self.data[0] <= OP_SMALL_INT_MAX_VAL {
            if opcode != codes::OpTrue + self.data[0] - 1 {
                return Err(TxScriptError::NotMinimalData(format!(
                    "data push of the value {} encoded with opcode {:?} instead of Op{}",
                    self.data[0], self, self.data[0]
                )));
            }
        } else if data_len == 1 && self.data[0] == OP_1_NEGATE_VAL {
            if opcode != codes::Op1Negate {
                return Err(TxScriptError::NotMinimalData(format!(
                    "data push of the value -1 encoded with opcode {self:?} instead of Op1Negate"
                )));
            }
        } else if data_len <= OP_DATA_MAX_VAL as usize {
            if opcode as usize != data_len {
                return Err(TxScriptError::NotMinimalData(format!(
                    "data push of {data_len} bytes encoded with opcode {self:?} instead of OpData{data_len}"
                )));
            }
        } else if data_len <= u8::MAX as usize {
            if opcode != codes::OpPushData1 {
                return Err(TxScriptError::NotMinimalData(format!(
                    "data push of {data_len} bytes encoded with opcode {self:?} instead of OpPushData1"
                )));
            }
        } else if data_len <= u16::MAX as usize && opcode != codes::OpPushData2 {
            return Err(TxScriptError::NotMinimalData(format!(
                "data push of {data_len} bytes encoded with opcode {self:?} instead of OpPushData2"
            )));
        }
        Ok(())
    }

    fn is_disabled(&self) -> bool {
        matches!(CODE, codes::OpInvert | codes::Op2Mul | codes::Op2Div | codes::OpMul | codes::OpLShift | codes::OpRShift)
    }

    fn always_illegal(&self) -> bool {
        matches!(CODE, codes::OpVerIf | codes::OpVerNotIf)
    }

    fn get_data(&self) -> &[u8] {
        &self.data
    }
}

// Helpers for some opcodes with shared data
#[inline]
fn push_data<C: TxContext>(data: Vec<u8>, vm: &mut TxScriptEngine<C>) -> OpCodeResult {
    vm.dstack.push(data);
    Ok(())
}

#[inline]
fn push_number<C: TxContext>(number: i64, vm: &mut TxScriptEngine<C>) -> OpCodeResult {
    vm.dstack.push_item(number);
    Ok(())
}

#[inline]
fn push_element<C: TxContext>(data: Vec<u8>, vm: &mut TxScriptEngine<C>) -> OpCodeResult {
    if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
        return Err(TxScriptError::ElementTooBig(data.len(), MAX_SCRIPT_ELEMENT_SIZE));
    }
    vm.dstack.push(data);
    Ok(())
}

/// Arithmetic results must stay representable as an 8 byte script number
#[inline]
fn checked_number(value: Option<i64>) -> Result<i64, TxScriptError> {
    match value {
        Some(value) if value != i64::MIN => Ok(value),
        _ => Err(TxScriptError::NumberTooBig("result of arithmetic operation does not fit in 8 bytes".to_string())),
    }
}

#[inline]
fn bitwise<C: TxContext>(vm: &mut TxScriptEngine<C>, op: impl Fn(u8, u8) -> u8) -> OpCodeResult {
    let [a, b] = vm.dstack.pop_raw()?;
    if a.len() != b.len() {
        return Err(TxScriptError::InvalidOperandSize(a.len(), b.len()));
    }
    vm.dstack.push(a.iter().zip(b.iter()).map(|(x, y)| op(*x, *y)).collect());
    Ok(())
}

#[inline]
fn require_introspection<C: TxContext>(opcode: &impl Debug, vm: &TxScriptEngine<C>) -> OpCodeResult {
    match vm.flags.contains(ScriptFlags::ENABLE_INTROSPECTION) {
        true => Ok(()),
        false => Err(TxScriptError::OpcodeDisabled(format!("{opcode:?}"))),
    }
}

#[inline]
fn tx_field<T>(value: Option<T>) -> Result<T, TxScriptError> {
    value.ok_or(TxScriptError::NotATransactionInput)
}

fn pop_output_index<C: TxContext>(vm: &mut TxScriptEngine<C>) -> Result<usize, TxScriptError> {
    let [index]: [i64; 1] = vm.dstack.pop_items()?;
    let count = tx_field(vm.ctx.output_count())?;
    if index < 0 || index as usize >= count {
        return Err(TxScriptError::InvalidOutputIndex(index, count));
    }
    Ok(index as usize)
}

#[inline]
fn upgradable_nop<C: TxContext>(opcode: &impl Debug, vm: &TxScriptEngine<C>) -> OpCodeResult {
    match vm.flags.contains(ScriptFlags::VERIFY_DISCOURAGE_UPGRADABLE_NOPS) {
        true => Err(TxScriptError::DiscourageUpgradableNops(format!("{opcode:?}"))),
        false => Ok(()),
    }
}

fn pop_condition<C: TxContext>(vm: &mut TxScriptEngine<C>) -> Result<bool, TxScriptError> {
    let [mut cond_buf] = vm.dstack.pop_raw().map_err(|_| TxScriptError::EmptyStack)?;
    if cond_buf.len() > 1 {
        return Err(TxScriptError::InvalidState("expected boolean".to_string()));
    }
    match cond_buf.pop() {
        Some(1) => Ok(true),
        Some(_) => Err(TxScriptError::InvalidState("expected boolean".to_string())),
        None => Ok(false),
    }
}

/*
The following is the implementation and metadata of all opcodes. Each opcode has unique
number (and template system makes it impossible to use two opcodes), length specification,
and execution code.

The syntax is as follows:
```
opcode OpCodeName<id, length>(self, vm) {
    code;
    output
}
// OR
opcode OpCodeName<id, length>(self, vm) statement

// in case of an opcode alias
opcode |OpCodeAlias| OpCodeName<id, length>(self, vm) statement
```

Length specification is either a number (for fixed length, counting the opcode byte) or an
unsigned integer type (for var length). You can access the engine using the `vm` variable.

Implementation details in `opcodes/macros.rs`.
*/
opcode_list! {

    // Data push opcodes.
    opcode |Op0| OpFalse<0x00, 1>(self, vm) {
        vm.dstack.push(vec![]);
        Ok(())
    }

    opcode OpData1<0x01, 2>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData2<0x02, 3>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData3<0x03, 4>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData4<0x04, 5>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData5<0x05, 6>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData6<0x06, 7>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData7<0x07, 8>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData8<0x08, 9>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData9<0x09, 10>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData10<0x0a, 11>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData11<0x0b, 12>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData12<0x0c, 13>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData13<0x0d, 14>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData14<0x0e, 15>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData15<0x0f, 16>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData16<0x10, 17>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData17<0x11, 18>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData18<0x12, 19>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData19<0x13, 20>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData20<0x14, 21>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData21<0x15, 22>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData22<0x16, 23>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData23<0x17, 24>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData24<0x18, 25>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData25<0x19, 26>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData26<0x1a, 27>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData27<0x1b, 28>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData28<0x1c, 29>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData29<0x1d, 30>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData30<0x1e, 31>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData31<0x1f, 32>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData32<0x20, 33>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData33<0x21, 34>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData34<0x22, 35>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData35<0x23, 36>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData36<0x24, 37>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData37<0x25, 38>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData38<0x26, 39>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData39<0x27, 40>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData40<0x28, 41>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData41<0x29, 42>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData42<0x2a, 43>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData43<0x2b, 44>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData44<0x2c, 45>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData45<0x2d, 46>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData46<0x2e, 47>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData47<0x2f, 48>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData48<0x30, 49>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData49<0x31, 50>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData50<0x32, 51>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData51<0x33, 52>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData52<0x34, 53>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData53<0x35, 54>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData54<0x36, 55>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData55<0x37, 56>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData56<0x38, 57>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData57<0x39, 58>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData58<0x3a, 59>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData59<0x3b, 60>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData60<0x3c, 61>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData61<0x3d, 62>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData62<0x3e, 63>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData63<0x3f, 64>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData64<0x40, 65>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData65<0x41, 66>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData66<0x42, 67>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData67<0x43, 68>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData68<0x44, 69>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData69<0x45, 70>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData70<0x46, 71>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData71<0x47, 72>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData72<0x48, 73>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData73<0x49, 74>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData74<0x4a, 75>(self, vm) push_data(self.data.clone(), vm)
    opcode OpData75<0x4b, 76>(self, vm) push_data(self.data.clone(), vm)
    opcode OpPushData1<0x4c, u8>(self, vm) push_data(self.data.clone(), vm)
    opcode OpPushData2<0x4d, u16>(self, vm) push_data(self.data.clone(), vm)
    opcode OpPushData4<0x4e, u32>(self, vm) push_data(self.data.clone(), vm)

    opcode Op1Negate<0x4f, 1>(self, vm) push_number(-1, vm)

    opcode OpReserved<0x50, 1>(self, vm) Err(TxScriptError::OpcodeReserved(format!("{self:?}")))

    opcode |Op1| OpTrue<0x51, 1>(self, vm) push_number(1, vm)
    opcode Op2<0x52, 1>(self, vm) push_number(2, vm)
    opcode Op3<0x53, 1>(self, vm) push_number(3, vm)
    opcode Op4<0x54, 1>(self, vm) push_number(4, vm)
    opcode Op5<0x55, 1>(self, vm) push_number(5, vm)
    opcode Op6<0x56, 1>(self, vm) push_number(6, vm)
    opcode Op7<0x57, 1>(self, vm) push_number(7, vm)
    opcode Op8<0x58, 1>(self, vm) push_number(8, vm)
    opcode Op9<0x59, 1>(self, vm) push_number(9, vm)
    opcode Op10<0x5a, 1>(self, vm) push_number(10, vm)
    opcode Op11<0x5b, 1>(self, vm) push_number(11, vm)
    opcode Op12<0x5c, 1>(self, vm) push_number(12, vm)
    opcode Op13<0x5d, 1>(self, vm) push_number(13, vm)
    opcode Op14<0x5e, 1>(self, vm) push_number(14, vm)
    opcode Op15<0x5f, 1>(self, vm) push_number(15, vm)
    opcode Op16<0x60, 1>(self, vm) push_number(16, vm)

    // Control opcodes.
    opcode OpNop<0x61, 1>(self, vm) Ok(())
    opcode OpVer<0x62, 1>(self, vm) Err(TxScriptError::OpcodeReserved(format!("{self:?}")))

    opcode OpIf<0x63, 1>(self, vm) {
        let cond = match vm.is_executing() {
            true => match pop_condition(vm)? {
                true => OpCond::True,
                false => OpCond::False,
            },
            false => OpCond::Skip,
        };
        vm.cond_stack.push(cond);
        Ok(())
    }

    opcode OpNotIf<0x64, 1>(self, vm) {
        let cond = match vm.is_executing() {
            true => match pop_condition(vm)? {
                true => OpCond::False,
                false => OpCond::True,
            },
            false => OpCond::Skip,
        };
        vm.cond_stack.push(cond);
        Ok(())
    }

    opcode OpVerIf<0x65, 1>(self, vm) Err(TxScriptError::OpcodeReserved(format!("{self:?}")))
    opcode OpVerNotIf<0x66, 1>(self, vm) Err(TxScriptError::OpcodeReserved(format!("{self:?}")))

    opcode OpElse<0x67, 1>(self, vm) {
        if let Some(cond) = vm.cond_stack.last_mut() {
            *cond = cond.negate();
            Ok(())
        } else {
            Err(TxScriptError::InvalidState("condition stack empty".to_string()))
        }
    }

    opcode OpEndIf<0x68, 1>(self, vm) {
        match vm.cond_stack.pop() {
            None => Err(TxScriptError::InvalidState("condition stack empty".to_string())),
            _ => Ok(())
        }
    }

    opcode OpVerify<0x69, 1>(self, vm) {
        let [result]: [bool; 1] = vm.dstack.pop_items()?;
        match result {
            true => Ok(()),
            false => Err(TxScriptError::VerifyError)
        }
    }

    opcode OpReturn<0x6a, 1>(self, vm) Err(TxScriptError::EarlyReturn)

    // Stack opcodes.
    opcode OpToAltStack<0x6b, 1>(self, vm) {
        let [item] = vm.dstack.pop_raw()?;
        vm.astack.push(item);
        Ok(())
    }

    opcode OpFromAltStack<0x6c, 1>(self, vm) {
        match vm.astack.pop() {
            Some(last) => {
                vm.dstack.push(last);
                Ok(())
            },
            None => Err(TxScriptError::EmptyStack)
        }
    }

    opcode Op2Drop<0x6d, 1>(self, vm) vm.dstack.drop_items::<2>()
    opcode Op2Dup<0x6e, 1>(self, vm) vm.dstack.dup_items::<2>()
    opcode Op3Dup<0x6f, 1>(self, vm) vm.dstack.dup_items::<3>()
    opcode Op2Over<0x70, 1>(self, vm) vm.dstack.over_items::<2>()
    opcode Op2Rot<0x71, 1>(self, vm) vm.dstack.rot_items::<2>()
    opcode Op2Swap<0x72, 1>(self, vm) vm.dstack.swap_items::<2>()

    opcode OpIfDup<0x73, 1>(self, vm) {
        let [result] = vm.dstack.peek_raw()?;
        if OpcodeData::<bool>::deserialize(&result)? {
            vm.dstack.push(result);
        }
        Ok(())
    }

    opcode OpDepth<0x74, 1>(self, vm) push_number(vm.dstack.len() as i64, vm)

    opcode OpDrop<0x75, 1>(self, vm) vm.dstack.drop_items::<1>()
    opcode OpDup<0x76, 1>(self, vm) vm.dstack.dup_items::<1>()

    opcode OpNip<0x77, 1>(self, vm) {
        match vm.dstack.len() >= 2 {
            true => {
                vm.dstack.remove(vm.dstack.len() - 2);
                Ok(())
            }
            false => Err(TxScriptError::InvalidStackOperation(2, vm.dstack.len())),
        }
    }

    opcode OpOver<0x78, 1>(self, vm) vm.dstack.over_items::<1>()

    opcode OpPick<0x79, 1>(self, vm) {
        let [loc]: [i32; 1] = vm.dstack.pop_items()?;
        if loc < 0 || loc as usize >= vm.dstack.len() {
            return Err(TxScriptError::InvalidState("pick at an invalid location".to_string()));
        }
        vm.dstack.push(vm.dstack[vm.dstack.len() - (loc as usize) - 1].clone());
        Ok(())
    }

    opcode OpRoll<0x7a, 1>(self, vm) {
        let [loc]: [i32; 1] = vm.dstack.pop_items()?;
        if loc < 0 || loc as usize >= vm.dstack.len() {
            return Err(TxScriptError::InvalidState("roll at an invalid location".to_string()));
        }
        let item = vm.dstack.remove(vm.dstack.len() - (loc as usize) - 1);
        vm.dstack.push(item);
        Ok(())
    }

    opcode OpRot<0x7b, 1>(self, vm) vm.dstack.rot_items::<1>()
    opcode OpSwap<0x7c, 1>(self, vm) vm.dstack.swap_items::<1>()

    opcode OpTuck<0x7d, 1>(self, vm) {
        match vm.dstack.len() >= 2 {
            true => {
                vm.dstack.insert(vm.dstack.len() - 2, vm.dstack[vm.dstack.len() - 1].clone());
                Ok(())
            }
            false => Err(TxScriptError::InvalidStackOperation(2, vm.dstack.len())),
        }
    }

    // Splice opcodes.
    opcode OpCat<0x7e, 1>(self, vm) {
        let [mut first, second] = vm.dstack.pop_raw()?;
        if first.len() + second.len() > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(TxScriptError::ElementTooBig(first.len() + second.len(), MAX_SCRIPT_ELEMENT_SIZE));
        }
        first.extend(second);
        vm.dstack.push(first);
        Ok(())
    }

    opcode OpSplit<0x7f, 1>(self, vm) {
        let [position]: [i64; 1] = vm.dstack.pop_items()?;
        let [mut data] = vm.dstack.pop_raw()?;
        if position < 0 || position as usize > data.len() {
            return Err(TxScriptError::InvalidSplitRange(position, data.len()));
        }
        let tail = data.split_off(position as usize);
        vm.dstack.push(data);
        vm.dstack.push(tail);
        Ok(())
    }

    opcode OpNum2Bin<0x80, 1>(self, vm) {
        let [size]: [i64; 1] = vm.dstack.pop_items()?;
        if size < 0 || size as usize > MAX_SCRIPT_ELEMENT_SIZE {
            return Err(TxScriptError::ElementTooBig(size.max(0) as usize, MAX_SCRIPT_ELEMENT_SIZE));
        }
        let size = size as usize;
        let [mut number] = vm.dstack.pop_raw()?;
        minimally_encode(&mut number);
        if number.len() > size {
            return Err(TxScriptError::ImpossibleEncoding(number, size));
        }
        if number.len() < size {
            let sign_bit = match number.last_mut() {
                Some(last) => {
                    let sign_bit = *last & 0x80;
                    *last &= 0x7f;
                    sign_bit
                }
                None => 0,
            };
            number.resize(size - 1, 0);
            number.push(sign_bit);
        }
        vm.dstack.push(number);
        Ok(())
    }

    opcode OpBin2Num<0x81, 1>(self, vm) {
        let [mut number] = vm.dstack.pop_raw()?;
        minimally_encode(&mut number);
        if number.len() > DEFAULT_SCRIPT_NUM_LEN {
            return Err(TxScriptError::NumberTooBig(format!(
                "{} bytes do not encode a script number of at most {DEFAULT_SCRIPT_NUM_LEN} bytes", number.len()
            )));
        }
        vm.dstack.push(number);
        Ok(())
    }

    opcode OpSize<0x82, 1>(self, vm) {
        let size = vm.dstack.last().map(|last| last.len()).ok_or(TxScriptError::InvalidStackOperation(1, 0))?;
        push_number(size as i64, vm)
    }

    // Bitwise logic opcodes.
    opcode OpInvert<0x83, 1>(self, vm) Err(TxScriptError::OpcodeDisabled(format!("{self:?}")))
    opcode OpAnd<0x84, 1>(self, vm) bitwise(vm, |a, b| a & b)
    opcode OpOr<0x85, 1>(self, vm) bitwise(vm, |a, b| a | b)
    opcode OpXor<0x86, 1>(self, vm) bitwise(vm, |a, b| a ^ b)

    opcode OpEqual<0x87, 1>(self, vm) {
        let [first, second] = vm.dstack.pop_raw()?;
        vm.dstack.push_item(first == second);
        Ok(())
    }

    opcode OpEqualVerify<0x88, 1>(self, vm) {
        let [first, second] = vm.dstack.pop_raw()?;
        match first == second {
            true => Ok(()),
            false => Err(TxScriptError::VerifyError),
        }
    }

    opcode OpReserved1<0x89, 1>(self, vm) Err(TxScriptError::OpcodeReserved(format!("{self:?}")))
    opcode OpReserved2<0x8a, 1>(self, vm) Err(TxScriptError::OpcodeReserved(format!("{self:?}")))

    // Numeric related opcodes.
    opcode Op1Add<0x8b, 1>(self, vm) {
        let [value]: [i64; 1] = vm.dstack.pop_items()?;
        vm.dstack.push_item(checked_number(value.checked_add(1))?);
        Ok(())
    }

    opcode Op1Sub<0x8c, 1>(self, vm) {
        let [value]: [i64; 1] = vm.dstack.pop_items()?;
        vm.dstack.push_item(checked_number(value.checked_sub(1))?);
        Ok(())
    }

    opcode Op2Mul<0x8d, 1>(self, vm) Err(TxScriptError::OpcodeDisabled(format!("{self:?}")))
    opcode Op2Div<0x8e, 1>(self, vm) Err(TxScriptError::OpcodeDisabled(format!("{self:?}")))

    opcode OpNegate<0x8f, 1>(self, vm) {
        let [value]: [i64; 1] = vm.dstack.pop_items()?;
        vm.dstack.push_item(checked_number(value.checked_neg())?);
        Ok(())
    }

    opcode OpAbs<0x90, 1>(self, vm) {
        let [value]: [i64; 1] = vm.dstack.pop_items()?;
        vm.dstack.push_item(checked_number(value.checked_abs())?);
        Ok(())
    }

    opcode OpNot<0x91, 1>(self, vm) {
        let [value]: [i64; 1] = vm.dstack.pop_items()?;
        vm.dstack.push_item(value == 0);
        Ok(())
    }

    opcode Op0NotEqual<0x92, 1>(self, vm) {
        let [value]: [i64; 1] = vm.dstack.pop_items()?;
        vm.dstack.push_item(value != 0);
        Ok(())
    }

    opcode OpAdd<0x93, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        vm.dstack.push_item(checked_number(a.checked_add(b))?);
        Ok(())
    }

    opcode OpSub<0x94, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        vm.dstack.push_item(checked_number(a.checked_sub(b))?);
        Ok(())
    }

    opcode OpMul<0x95, 1>(self, vm) Err(TxScriptError::OpcodeDisabled(format!("{self:?}")))

    opcode OpDiv<0x96, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        if b == 0 {
            return Err(TxScriptError::DivByZero);
        }
        vm.dstack.push_item(checked_number(a.checked_div(b))?);
        Ok(())
    }

    opcode OpMod<0x97, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        if b == 0 {
            return Err(TxScriptError::DivByZero);
        }
        vm.dstack.push_item(checked_number(a.checked_rem(b))?);
        Ok(())
    }

    opcode OpLShift<0x98, 1>(self, vm) Err(TxScriptError::OpcodeDisabled(format!("{self:?}")))
    opcode OpRShift<0x99, 1>(self, vm) Err(TxScriptError::OpcodeDisabled(format!("{self:?}")))

    opcode OpBoolAnd<0x9a, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        vm.dstack.push_item(a != 0 && b != 0);
        Ok(())
    }

    opcode OpBoolOr<0x9b, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        vm.dstack.push_item(a != 0 || b != 0);
        Ok(())
    }

    opcode OpNumEqual<0x9c, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        vm.dstack.push_item(a == b);
        Ok(())
    }

    opcode OpNumEqualVerify<0x9d, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        match a == b {
            true => Ok(()),
            false => Err(TxScriptError::VerifyError),
        }
    }

    opcode OpNumNotEqual<0x9e, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        vm.dstack.push_item(a != b);
        Ok(())
    }

    opcode OpLessThan<0x9f, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        vm.dstack.push_item(a < b);
        Ok(())
    }

    opcode OpGreaterThan<0xa0, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        vm.dstack.push_item(a > b);
        Ok(())
    }

    opcode OpLessThanOrEqual<0xa1, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        vm.dstack.push_item(a <= b);
        Ok(())
    }

    opcode OpGreaterThanOrEqual<0xa2, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        vm.dstack.push_item(a >= b);
        Ok(())
    }

    opcode OpMin<0xa3, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        vm.dstack.push_item(a.min(b));
        Ok(())
    }

    opcode OpMax<0xa4, 1>(self, vm) {
        let [a, b]: [i64; 2] = vm.dstack.pop_items()?;
        vm.dstack.push_item(a.max(b));
        Ok(())
    }

    opcode OpWithin<0xa5, 1>(self, vm) {
        let [x, l, u]: [i64; 3] = vm.dstack.pop_items()?;
        vm.dstack.push_item(x >= l && x < u);
        Ok(())
    }

    // Crypto opcodes.
    opcode OpRipeMd160<0xa6, 1>(self, vm) {
        let [data] = vm.dstack.pop_raw()?;
        vm.dstack.push(Ripemd160::digest(data).to_vec());
        Ok(())
    }

    opcode OpSha1<0xa7, 1>(self, vm) {
        let [data] = vm.dstack.pop_raw()?;
        vm.dstack.push(Sha1::digest(data).to_vec());
        Ok(())
    }

    opcode OpSHA256<0xa8, 1>(self, vm) {
        let [data] = vm.dstack.pop_raw()?;
        vm.dstack.push(Sha256::digest(data).to_vec());
        Ok(())
    }

    opcode OpHash160<0xa9, 1>(self, vm) {
        let [data] = vm.dstack.pop_raw()?;
        vm.dstack.push(hash160(&data).to_vec());
        Ok(())
    }

    opcode OpHash256<0xaa, 1>(self, vm) {
        let [data] = vm.dstack.pop_raw()?;
        vm.dstack.push(Sha256d::hash(data).as_bytes().to_vec());
        Ok(())
    }

    opcode OpCodeSeparator<0xab, 1>(self, vm) {
        vm.code_separator = vm.next_offset;
        Ok(())
    }

    opcode OpCheckSig<0xac, 1>(self, vm) {
        let [sig, key] = vm.dstack.pop_raw()?;
        let valid = vm.check_sig(&sig, &key)?;
        vm.dstack.push_item(valid);
        Ok(())
    }

    opcode OpCheckSigVerify<0xad, 1>(self, vm) {
        let [sig, key] = vm.dstack.pop_raw()?;
        match vm.check_sig(&sig, &key)? {
            true => Ok(()),
            false => Err(TxScriptError::VerifyError),
        }
    }

    opcode OpCheckMultiSig<0xae, 1>(self, vm) {
        let valid = vm.op_check_multisig()?;
        vm.dstack.push_item(valid);
        Ok(())
    }

    opcode OpCheckMultiSigVerify<0xaf, 1>(self, vm) {
        match vm.op_check_multisig()? {
            true => Ok(()),
            false => Err(TxScriptError::VerifyError),
        }
    }

    // Expansion opcodes.
    opcode OpNop1<0xb0, 1>(self, vm) upgradable_nop(self, vm)

    opcode OpCheckLockTimeVerify<0xb1, 1>(self, vm) {
        if !vm.flags.contains(ScriptFlags::VERIFY_CHECKLOCKTIMEVERIFY) {
            return upgradable_nop(self, vm);
        }
        // Lock times are compared against the unsigned 32 bit field of the transaction,
        // so 5 bytes are needed to express the whole range.
        let [lock_time]: [SizedEncodeInt<5>; 1] = vm.dstack.peek_items()?;
        if lock_time.0 < 0 {
            return Err(TxScriptError::NegativeLockTime(lock_time.0));
        }
        vm.ctx.check_lock_time(lock_time.0)
    }

    opcode OpCheckSequenceVerify<0xb2, 1>(self, vm) {
        if !vm.flags.contains(ScriptFlags::VERIFY_CHECKSEQUENCEVERIFY) {
            return upgradable_nop(self, vm);
        }
        let [sequence]: [SizedEncodeInt<5>; 1] = vm.dstack.peek_items()?;
        if sequence.0 < 0 {
            return Err(TxScriptError::NegativeLockTime(sequence.0));
        }
        // Operands with the disable flag set are reserved for future soft forks
        if sequence.0 & SEQUENCE_LOCKTIME_DISABLE_FLAG as i64 != 0 {
            return Ok(());
        }
        vm.ctx.check_sequence(sequence.0)
    }

    opcode OpNop4<0xb3, 1>(self, vm) upgradable_nop(self, vm)
    opcode OpNop5<0xb4, 1>(self, vm) upgradable_nop(self, vm)
    opcode OpNop6<0xb5, 1>(self, vm) upgradable_nop(self, vm)
    opcode OpNop7<0xb6, 1>(self, vm) upgradable_nop(self, vm)
    opcode OpNop8<0xb7, 1>(self, vm) upgradable_nop(self, vm)
    opcode OpNop9<0xb8, 1>(self, vm) upgradable_nop(self, vm)
    opcode OpNop10<0xb9, 1>(self, vm) upgradable_nop(self, vm)

    // Undefined opcodes.
    opcode OpUnknown186<0xba, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown187<0xbb, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown188<0xbc, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown189<0xbd, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown190<0xbe, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown191<0xbf, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))

    // Native introspection opcodes.
    opcode OpInputIndex<0xc0, 1>(self, vm) {
        require_introspection(self, vm)?;
        let index = tx_field(vm.ctx.input_index())?;
        push_number(index as i64, vm)
    }

    opcode OpActiveBytecode<0xc1, 1>(self, vm) {
        require_introspection(self, vm)?;
        let bytecode = tx_field(vm.ctx.active_bytecode())?.to_vec();
        push_element(bytecode, vm)
    }

    opcode OpTxVersion<0xc2, 1>(self, vm) {
        require_introspection(self, vm)?;
        let version = tx_field(vm.ctx.tx_version())?;
        push_number(version as i64, vm)
    }

    opcode OpTxInputCount<0xc3, 1>(self, vm) {
        require_introspection(self, vm)?;
        let count = tx_field(vm.ctx.input_count())?;
        push_number(count as i64, vm)
    }

    opcode OpTxOutputCount<0xc4, 1>(self, vm) {
        require_introspection(self, vm)?;
        let count = tx_field(vm.ctx.output_count())?;
        push_number(count as i64, vm)
    }

    opcode OpTxLockTime<0xc5, 1>(self, vm) {
        require_introspection(self, vm)?;
        let lock_time = tx_field(vm.ctx.lock_time())?;
        push_number(lock_time as i64, vm)
    }

    opcode OpUtxoValue<0xc6, 1>(self, vm) {
        require_introspection(self, vm)?;
        let amount = tx_field(vm.ctx.spent_amount())?;
        push_number(amount, vm)
    }

    opcode OpOutputValue<0xc7, 1>(self, vm) {
        require_introspection(self, vm)?;
        let index = pop_output_index(vm)?;
        let value = tx_field(vm.ctx.output(index))?.value;
        push_number(value, vm)
    }

    opcode OpOutputBytecode<0xc8, 1>(self, vm) {
        require_introspection(self, vm)?;
        let index = pop_output_index(vm)?;
        let script = tx_field(vm.ctx.output(index))?.script_public_key.script().to_vec();
        push_element(script, vm)
    }

    opcode OpUnknown201<0xc9, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown202<0xca, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown203<0xcb, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown204<0xcc, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown205<0xcd, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown206<0xce, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown207<0xcf, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown208<0xd0, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown209<0xd1, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown210<0xd2, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown211<0xd3, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown212<0xd4, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown213<0xd5, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown214<0xd6, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown215<0xd7, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown216<0xd8, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown217<0xd9, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown218<0xda, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown219<0xdb, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown220<0xdc, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown221<0xdd, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown222<0xde, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown223<0xdf, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown224<0xe0, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown225<0xe1, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown226<0xe2, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown227<0xe3, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown228<0xe4, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown229<0xe5, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown230<0xe6, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown231<0xe7, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown232<0xe8, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown233<0xe9, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown234<0xea, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown235<0xeb, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown236<0xec, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown237<0xed, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown238<0xee, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown239<0xef, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown240<0xf0, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown241<0xf1, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown242<0xf2, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown243<0xf3, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown244<0xf4, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown245<0xf5, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown246<0xf6, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown247<0xf7, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown248<0xf8, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown249<0xf9, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown250<0xfa, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown251<0xfb, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown252<0xfc, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown253<0xfd, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown254<0xfe, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
    opcode OpUnknown255<0xff, 1>(self, vm) Err(TxScriptError::InvalidOpcode(format!("{self:?}")))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::caches::Cache;
    use crate::context::{NoTxContext, TransactionChecker};
    use crate::data_stack::Stack;
    use crate::flags::{MANDATORY_SCRIPT_VERIFY_FLAGS, STANDARD_SCRIPT_VERIFY_FLAGS};
    use crate::opcodes;
    use lotus_consensus_core::hashing::sighash::SigHashReusedValues;
    use lotus_consensus_core::tx::{
        PopulatedTransaction, ScriptPublicKey, Transaction, TransactionInput, TransactionOutpoint, TransactionOutput,
    };
    use lotus_consensus_core::utxo::Coin;

    struct TestCase {
        init: Stack,
        code: Box<dyn OpCodeImplementation<NoTxContext>>,
        dstack: Stack,
    }

    struct ErrorTestCase {
        init: Stack,
        code: Box<dyn OpCodeImplementation<NoTxContext>>,
        error: TxScriptError,
    }

    fn run_test_cases(tests: Vec<TestCase>) {
        for TestCase { init, code, dstack } in tests {
            let mut vm = TxScriptEngine::new(&NoTxContext, MANDATORY_SCRIPT_VERIFY_FLAGS);
            vm.dstack = init;
            code.execute(&mut vm).unwrap_or_else(|err| panic!("Opcode {code:?} failed: {err}"));
            assert_eq!(vm.dstack, dstack, "OpCode {} pushed wrong value", code.value());
        }
    }

    fn run_error_test_cases(tests: Vec<ErrorTestCase>) {
        for ErrorTestCase { init, code, error } in tests {
            let mut vm = TxScriptEngine::new(&NoTxContext, MANDATORY_SCRIPT_VERIFY_FLAGS);
            vm.dstack = init;
            assert_eq!(code.execute(&mut vm), Err(error), "Opcode {code:?} returned an unexpected result");
        }
    }

    #[test]
    fn test_opcode_disabled() {
        let tests: Vec<Box<dyn OpCodeImplementation<NoTxContext>>> = vec![
            opcodes::OpInvert::empty().expect("Should accept empty"),
            opcodes::Op2Mul::empty().expect("Should accept empty"),
            opcodes::Op2Div::empty().expect("Should accept empty"),
            opcodes::OpMul::empty().expect("Should accept empty"),
            opcodes::OpLShift::empty().expect("Should accept empty"),
            opcodes::OpRShift::empty().expect("Should accept empty"),
        ];

        let mut vm = TxScriptEngine::new(&NoTxContext, MANDATORY_SCRIPT_VERIFY_FLAGS);
        for pop in tests {
            assert!(pop.is_disabled(), "Opcode {pop:?} should be flagged as disabled");
            match pop.execute(&mut vm) {
                Err(TxScriptError::OpcodeDisabled(_)) => {}
                _ => panic!("Opcode {pop:?} should be disabled"),
            }
        }
    }

    #[test]
    fn test_opcode_reserved() {
        let tests: Vec<Box<dyn OpCodeImplementation<NoTxContext>>> = vec![
            opcodes::OpReserved::empty().expect("Should accept empty"),
            opcodes::OpVer::empty().expect("Should accept empty"),
            opcodes::OpVerIf::empty().expect("Should accept empty"),
            opcodes::OpVerNotIf::empty().expect("Should accept empty"),
            opcodes::OpReserved1::empty().expect("Should accept empty"),
            opcodes::OpReserved2::empty().expect("Should accept empty"),
        ];

        let mut vm = TxScriptEngine::new(&NoTxContext, MANDATORY_SCRIPT_VERIFY_FLAGS);
        for pop in tests {
            match pop.execute(&mut vm) {
                Err(TxScriptError::OpcodeReserved(_)) => {}
                _ => panic!("Opcode {pop:?} should be reserved"),
            }
        }
    }

    #[test]
    fn test_opcode_invalid() {
        let tests: Vec<Box<dyn OpCodeImplementation<NoTxContext>>> = vec![
            opcodes::OpUnknown186::empty().expect("Should accept empty"),
            opcodes::OpUnknown187::empty().expect("Should accept empty"),
            opcodes::OpUnknown188::empty().expect("Should accept empty"),
            opcodes::OpUnknown189::empty().expect("Should accept empty"),
            opcodes::OpUnknown190::empty().expect("Should accept empty"),
            opcodes::OpUnknown191::empty().expect("Should accept empty"),
            opcodes::OpUnknown201::empty().expect("Should accept empty"),
            opcodes::OpUnknown230::empty().expect("Should accept empty"),
            opcodes::OpUnknown255::empty().expect("Should accept empty"),
        ];

        let mut vm = TxScriptEngine::new(&NoTxContext, MANDATORY_SCRIPT_VERIFY_FLAGS);
        for pop in tests {
            match pop.execute(&mut vm) {
                Err(TxScriptError::InvalidOpcode(_)) => {}
                _ => panic!("Opcode {pop:?} should be invalid"),
            }
        }
    }

    #[test]
    fn test_push_data() {
        run_test_cases(vec![
            TestCase { code: opcodes::OpFalse::empty().expect("Should accept empty"), dstack: vec![vec![]], init: Default::default() },
            TestCase {
                code: opcodes::OpData1::new([0x02].to_vec()).expect("Valid opcode"),
                dstack: vec![[0x02].to_vec()],
                init: Default::default(),
            },
            TestCase {
                code: opcodes::OpPushData1::new(vec![0xaa; 80]).expect("Valid opcode"),
                dstack: vec![vec![0xaa; 80]],
                init: Default::default(),
            },
            TestCase { code: opcodes::Op1Negate::empty().expect("Should accept empty"), dstack: vec![vec![0x81]], init: Default::default() },
            TestCase { code: opcodes::Op16::empty().expect("Should accept empty"), dstack: vec![vec![0x10]], init: Default::default() },
        ]);

        assert_eq!(
            <opcodes::OpData2 as OpCodeExecution<NoTxContext>>::new(vec![1]).map(|op| op.value()),
            Err(TxScriptError::MalformedPush(2, 1))
        );
    }

    #[test]
    fn test_check_minimal_data_push() {
        let minimal: Vec<Box<dyn OpCodeImplementation<NoTxContext>>> = vec![
            opcodes::OpFalse::empty().expect("Should accept empty"),
            opcodes::OpData1::new(vec![0x11]).expect("Valid opcode"),
            opcodes::OpData2::new(vec![0x01, 0x02]).expect("Valid opcode"),
            opcodes::OpPushData1::new(vec![0; 76]).expect("Valid opcode"),
        ];
        for op in minimal {
            op.check_minimal_data_push().unwrap_or_else(|err| panic!("{op:?} should be minimal: {err}"));
        }

        let not_minimal: Vec<Box<dyn OpCodeImplementation<NoTxContext>>> = vec![
            opcodes::OpData1::new(vec![0x05]).expect("Valid opcode"),
            opcodes::OpData1::new(vec![0x81]).expect("Valid opcode"),
            opcodes::OpPushData1::new(vec![0; 20]).expect("Valid opcode"),
            opcodes::OpPushData2::new(vec![0; 200]).expect("Valid opcode"),
            opcodes::OpPushData1::new(vec![]).expect("Valid opcode"),
        ];
        for op in not_minimal {
            assert!(matches!(op.check_minimal_data_push(), Err(TxScriptError::NotMinimalData(_))), "{op:?} should not be minimal");
        }
    }

    #[test]
    fn test_conditionals() {
        let mut vm = TxScriptEngine::new(&NoTxContext, MANDATORY_SCRIPT_VERIFY_FLAGS);
        let op_if: Box<dyn OpCodeImplementation<NoTxContext>> = opcodes::OpIf::empty().expect("Should accept empty");
        let op_else: Box<dyn OpCodeImplementation<NoTxContext>> = opcodes::OpElse::empty().expect("Should accept empty");
        let op_endif: Box<dyn OpCodeImplementation<NoTxContext>> = opcodes::OpEndIf::empty().expect("Should accept empty");

        vm.dstack = vec![vec![1]];
        op_if.execute(&mut vm).expect("boolean operand");
        assert_eq!(vm.cond_stack, vec![OpCond::True]);
        op_else.execute(&mut vm).expect("open conditional");
        assert_eq!(vm.cond_stack, vec![OpCond::False]);
        assert!(!vm.is_executing());

        // Nested conditionals inside a non executed branch do not touch the stack
        op_if.execute(&mut vm).expect("skipped conditional");
        assert_eq!(vm.cond_stack, vec![OpCond::False, OpCond::Skip]);
        op_endif.execute(&mut vm).expect("open conditional");
        op_endif.execute(&mut vm).expect("open conditional");
        assert!(vm.cond_stack.is_empty());
        assert_eq!(op_endif.execute(&mut vm), Err(TxScriptError::InvalidState("condition stack empty".to_string())));

        vm.dstack = vec![vec![2]];
        assert!(matches!(op_if.execute(&mut vm), Err(TxScriptError::InvalidState(_))));
        vm.dstack = vec![];
        assert_eq!(op_if.execute(&mut vm), Err(TxScriptError::EmptyStack));
    }

    #[test]
    fn test_stack_opcodes() {
        run_test_cases(vec![
            TestCase {
                code: opcodes::OpPick::empty().expect("Should accept empty"),
                init: vec![vec![1], vec![2], vec![3], vec![2]],
                dstack: vec![vec![1], vec![2], vec![3], vec![1]],
            },
            TestCase {
                code: opcodes::OpRoll::empty().expect("Should accept empty"),
                init: vec![vec![1], vec![2], vec![3], vec![2]],
                dstack: vec![vec![2], vec![3], vec![1]],
            },
            TestCase {
                code: opcodes::OpNip::empty().expect("Should accept empty"),
                init: vec![vec![1], vec![2]],
                dstack: vec![vec![2]],
            },
            TestCase {
                code: opcodes::OpTuck::empty().expect("Should accept empty"),
                init: vec![vec![1], vec![2]],
                dstack: vec![vec![2], vec![1], vec![2]],
            },
            TestCase {
                code: opcodes::OpIfDup::empty().expect("Should accept empty"),
                init: vec![vec![]],
                dstack: vec![vec![]],
            },
            TestCase {
                code: opcodes::OpDepth::empty().expect("Should accept empty"),
                init: vec![vec![], vec![]],
                dstack: vec![vec![], vec![], vec![2]],
            },
        ]);

        run_error_test_cases(vec![ErrorTestCase {
            code: opcodes::OpNip::empty().expect("Should accept empty"),
            init: vec![vec![1]],
            error: TxScriptError::InvalidStackOperation(2, 1),
        }]);
    }

    #[test]
    fn test_arithmetic() {
        run_test_cases(vec![
            TestCase { code: opcodes::OpAdd::empty().expect("Should accept empty"), init: vec![vec![2], vec![3]], dstack: vec![vec![5]] },
            TestCase { code: opcodes::OpSub::empty().expect("Should accept empty"), init: vec![vec![2], vec![3]], dstack: vec![vec![0x81]] },
            TestCase { code: opcodes::OpDiv::empty().expect("Should accept empty"), init: vec![vec![7], vec![2]], dstack: vec![vec![3]] },
            TestCase { code: opcodes::OpDiv::empty().expect("Should accept empty"), init: vec![vec![0x87], vec![2]], dstack: vec![vec![0x83]] },
            TestCase { code: opcodes::OpMod::empty().expect("Should accept empty"), init: vec![vec![7], vec![3]], dstack: vec![vec![1]] },
            TestCase { code: opcodes::OpMod::empty().expect("Should accept empty"), init: vec![vec![0x87], vec![3]], dstack: vec![vec![0x81]] },
            TestCase { code: opcodes::OpAbs::empty().expect("Should accept empty"), init: vec![vec![0x85]], dstack: vec![vec![5]] },
            TestCase { code: opcodes::OpNegate::empty().expect("Should accept empty"), init: vec![vec![5]], dstack: vec![vec![0x85]] },
            TestCase { code: opcodes::OpNot::empty().expect("Should accept empty"), init: vec![vec![]], dstack: vec![vec![1]] },
            TestCase { code: opcodes::Op0NotEqual::empty().expect("Should accept empty"), init: vec![vec![9]], dstack: vec![vec![1]] },
            TestCase {
                code: opcodes::OpWithin::empty().expect("Should accept empty"),
                init: vec![vec![3], vec![1], vec![3]],
                dstack: vec![vec![]],
            },
            TestCase { code: opcodes::OpMin::empty().expect("Should accept empty"), init: vec![vec![3], vec![0x81]], dstack: vec![vec![0x81]] },
            TestCase {
                code: opcodes::Op1Add::empty().expect("Should accept empty"),
                init: vec![vec![0x7f]],
                dstack: vec![vec![0x80, 0x00]],
            },
        ]);

        let max: Vec<u8> = OpcodeData::<i64>::serialize(&i64::MAX);
        let min: Vec<u8> = OpcodeData::<i64>::serialize(&-i64::MAX);
        run_error_test_cases(vec![
            ErrorTestCase { code: opcodes::OpDiv::empty().expect("Should accept empty"), init: vec![vec![1], vec![]], error: TxScriptError::DivByZero },
            ErrorTestCase { code: opcodes::OpMod::empty().expect("Should accept empty"), init: vec![vec![1], vec![]], error: TxScriptError::DivByZero },
            ErrorTestCase {
                code: opcodes::OpAdd::empty().expect("Should accept empty"),
                init: vec![max.clone(), vec![1]],
                error: TxScriptError::NumberTooBig("result of arithmetic operation does not fit in 8 bytes".to_string()),
            },
            ErrorTestCase {
                code: opcodes::Op1Sub::empty().expect("Should accept empty"),
                init: vec![min],
                error: TxScriptError::NumberTooBig("result of arithmetic operation does not fit in 8 bytes".to_string()),
            },
            ErrorTestCase {
                code: opcodes::OpAdd::empty().expect("Should accept empty"),
                init: vec![vec![0x01, 0x00], vec![1]],
                error: TxScriptError::NotMinimalData("numeric value encoded as [1, 0] is not minimally encoded".to_string()),
            },
        ]);
    }

    #[test]
    fn test_splice() {
        run_test_cases(vec![
            TestCase {
                code: opcodes::OpCat::empty().expect("Should accept empty"),
                init: vec![vec![1, 2], vec![3]],
                dstack: vec![vec![1, 2, 3]],
            },
            TestCase {
                code: opcodes::OpSplit::empty().expect("Should accept empty"),
                init: vec![vec![1, 2, 3], vec![1]],
                dstack: vec![vec![1], vec![2, 3]],
            },
            TestCase {
                code: opcodes::OpSplit::empty().expect("Should accept empty"),
                init: vec![vec![1, 2, 3], vec![3]],
                dstack: vec![vec![1, 2, 3], vec![]],
            },
            TestCase {
                code: opcodes::OpNum2Bin::empty().expect("Should accept empty"),
                init: vec![vec![0x85], vec![4]],
                dstack: vec![vec![0x05, 0x00, 0x00, 0x80]],
            },
            TestCase {
                code: opcodes::OpNum2Bin::empty().expect("Should accept empty"),
                init: vec![vec![], vec![]],
                dstack: vec![vec![]],
            },
            TestCase {
                code: opcodes::OpBin2Num::empty().expect("Should accept empty"),
                init: vec![vec![0x05, 0x00, 0x00, 0x80]],
                dstack: vec![vec![0x85]],
            },
            TestCase {
                code: opcodes::OpSize::empty().expect("Should accept empty"),
                init: vec![vec![1, 2, 3]],
                dstack: vec![vec![1, 2, 3], vec![3]],
            },
            TestCase {
                code: opcodes::OpXor::empty().expect("Should accept empty"),
                init: vec![vec![0x0f, 0xf0], vec![0xff, 0xff]],
                dstack: vec![vec![0xf0, 0x0f]],
            },
        ]);

        run_error_test_cases(vec![
            ErrorTestCase {
                code: opcodes::OpCat::empty().expect("Should accept empty"),
                init: vec![vec![0; 300], vec![0; 300]],
                error: TxScriptError::ElementTooBig(600, MAX_SCRIPT_ELEMENT_SIZE),
            },
            ErrorTestCase {
                code: opcodes::OpSplit::empty().expect("Should accept empty"),
                init: vec![vec![1, 2, 3], vec![4]],
                error: TxScriptError::InvalidSplitRange(4, 3),
            },
            ErrorTestCase {
                code: opcodes::OpNum2Bin::empty().expect("Should accept empty"),
                init: vec![vec![0x01, 0x02], vec![1]],
                error: TxScriptError::ImpossibleEncoding(vec![0x01, 0x02], 1),
            },
            ErrorTestCase {
                code: opcodes::OpAnd::empty().expect("Should accept empty"),
                init: vec![vec![1, 2], vec![3]],
                error: TxScriptError::InvalidOperandSize(2, 1),
            },
        ]);
    }

    #[test]
    fn test_hashes() {
        run_test_cases(vec![
            TestCase {
                code: opcodes::OpSHA256::empty().expect("Should accept empty"),
                init: vec![vec![]],
                dstack: vec![Sha256::digest(b"").to_vec()],
            },
            TestCase {
                code: opcodes::OpHash160::empty().expect("Should accept empty"),
                init: vec![vec![0x02; 33]],
                dstack: vec![hash160(&[0x02; 33]).to_vec()],
            },
            TestCase {
                code: opcodes::OpHash256::empty().expect("Should accept empty"),
                init: vec![vec![]],
                dstack: vec![Sha256::digest(Sha256::digest(b"")).to_vec()],
            },
        ]);
    }

    #[test]
    fn test_upgradable_nops() {
        let nops: Vec<Box<dyn OpCodeImplementation<NoTxContext>>> = vec![
            opcodes::OpNop1::empty().expect("Should accept empty"),
            opcodes::OpNop4::empty().expect("Should accept empty"),
            opcodes::OpNop10::empty().expect("Should accept empty"),
        ];
        let mut mandatory = TxScriptEngine::new(&NoTxContext, MANDATORY_SCRIPT_VERIFY_FLAGS);
        let mut standard = TxScriptEngine::new(&NoTxContext, STANDARD_SCRIPT_VERIFY_FLAGS);
        for nop in nops {
            nop.execute(&mut mandatory).expect("upgradable nops are allowed by consensus");
            assert!(matches!(nop.execute(&mut standard), Err(TxScriptError::DiscourageUpgradableNops(_))));
        }
    }

    #[test]
    fn test_lock_time_opcodes() {
        let cltv: Box<dyn OpCodeImplementation<NoTxContext>> = opcodes::OpCheckLockTimeVerify::empty().expect("Should accept empty");
        let csv: Box<dyn OpCodeImplementation<NoTxContext>> = opcodes::OpCheckSequenceVerify::empty().expect("Should accept empty");

        // Without their flags both behave as upgradable nops
        let mut vm = TxScriptEngine::new(&NoTxContext, ScriptFlags::empty());
        cltv.execute(&mut vm).expect("nop");
        csv.execute(&mut vm).expect("nop");

        let mut vm = TxScriptEngine::new(&NoTxContext, MANDATORY_SCRIPT_VERIFY_FLAGS);
        vm.dstack = vec![vec![0x81]];
        assert_eq!(cltv.execute(&mut vm), Err(TxScriptError::NegativeLockTime(-1)));
        assert_eq!(csv.execute(&mut vm), Err(TxScriptError::NegativeLockTime(-1)));

        vm.dstack = vec![vec![0x0a]];
        assert_eq!(cltv.execute(&mut vm), Err(TxScriptError::NotATransactionInput));
        // The operand is left on the stack
        assert_eq!(vm.dstack, vec![vec![0x0a]]);

        // Disable flag in the operand turns CSV into a nop
        vm.dstack = vec![vec![0x00, 0x00, 0x00, 0x80, 0x00]];
        csv.execute(&mut vm).expect("disabled sequence lock");

        vm.dstack = vec![vec![1, 2, 3, 4, 5, 6]];
        assert!(matches!(cltv.execute(&mut vm), Err(TxScriptError::NumberTooBig(_))));
    }

    #[test]
    fn test_introspection_requires_flag_and_context() {
        let ops: Vec<Box<dyn OpCodeImplementation<NoTxContext>>> = vec![
            opcodes::OpInputIndex::empty().expect("Should accept empty"),
            opcodes::OpActiveBytecode::empty().expect("Should accept empty"),
            opcodes::OpTxVersion::empty().expect("Should accept empty"),
            opcodes::OpTxInputCount::empty().expect("Should accept empty"),
            opcodes::OpTxOutputCount::empty().expect("Should accept empty"),
            opcodes::OpTxLockTime::empty().expect("Should accept empty"),
            opcodes::OpUtxoValue::empty().expect("Should accept empty"),
            opcodes::OpOutputValue::empty().expect("Should accept empty"),
            opcodes::OpOutputBytecode::empty().expect("Should accept empty"),
        ];

        for op in ops {
            let mut vm = TxScriptEngine::new(&NoTxContext, MANDATORY_SCRIPT_VERIFY_FLAGS - ScriptFlags::ENABLE_INTROSPECTION);
            vm.dstack = vec![vec![]];
            assert!(matches!(op.execute(&mut vm), Err(TxScriptError::OpcodeDisabled(_))), "{op:?} should need the introspection flag");

            let mut vm = TxScriptEngine::new(&NoTxContext, MANDATORY_SCRIPT_VERIFY_FLAGS);
            vm.dstack = vec![vec![]];
            assert_eq!(op.execute(&mut vm), Err(TxScriptError::NotATransactionInput), "{op:?} should need a transaction");
        }
    }

    #[test]
    fn test_introspection_of_transaction() {
        let spent_script = ScriptPublicKey::from_vec(vec![codes::OpTxOutputCount, codes::OpDrop, codes::OpTrue]);
        let tx = Transaction::new(
            2,
            vec![
                TransactionInput::new(TransactionOutpoint::new(1.into(), 0), vec![], 0),
                TransactionInput::new(TransactionOutpoint::new(1.into(), 1), vec![], 0),
            ],
            vec![
                TransactionOutput::new(600, ScriptPublicKey::from_vec(vec![codes::OpTrue])),
                TransactionOutput::new(400, ScriptPublicKey::from_vec(vec![codes::OpFalse, codes::OpDrop])),
                TransactionOutput::new(0, ScriptPublicKey::from_vec(vec![codes::OpReturn])),
            ],
            77,
        );
        let entries = vec![
            Coin::new(TransactionOutput::new(700, spent_script.clone()), 5, false),
            Coin::new(TransactionOutput::new(300, spent_script.clone()), 5, false),
        ];
        let populated = PopulatedTransaction::new(&tx, entries);
        let reused_values = SigHashReusedValues::new();
        let sig_cache = Cache::new(10);
        let ctx = TransactionChecker::new(&populated, 1, &reused_values, &sig_cache);

        let cases: Vec<(Box<dyn OpCodeImplementation<TransactionChecker<PopulatedTransaction>>>, Stack, Stack)> = vec![
            (opcodes::OpInputIndex::empty().expect("Should accept empty"), vec![], vec![vec![1]]),
            (opcodes::OpActiveBytecode::empty().expect("Should accept empty"), vec![], vec![spent_script.script().to_vec()]),
            (opcodes::OpTxVersion::empty().expect("Should accept empty"), vec![], vec![vec![2]]),
            (opcodes::OpTxInputCount::empty().expect("Should accept empty"), vec![], vec![vec![2]]),
            (opcodes::OpTxOutputCount::empty().expect("Should accept empty"), vec![], vec![vec![3]]),
            (opcodes::OpTxLockTime::empty().expect("Should accept empty"), vec![], vec![vec![77]]),
            (opcodes::OpUtxoValue::empty().expect("Should accept empty"), vec![], vec![vec![0x2c, 0x01]]),
            (opcodes::OpOutputValue::empty().expect("Should accept empty"), vec![vec![]], vec![vec![0x58, 0x02]]),
            (opcodes::OpOutputBytecode::empty().expect("Should accept empty"), vec![vec![1]], vec![vec![codes::OpFalse, codes::OpDrop]]),
        ];
        for (op, init, expected) in cases {
            let mut vm = TxScriptEngine::new(&ctx, MANDATORY_SCRIPT_VERIFY_FLAGS);
            vm.dstack = init;
            op.execute(&mut vm).unwrap_or_else(|err| panic!("{op:?} failed: {err}"));
            assert_eq!(vm.dstack, expected, "{op:?} pushed a wrong value");
        }

        let output_value: Box<dyn OpCodeImplementation<TransactionChecker<PopulatedTransaction>>> =
            opcodes::OpOutputValue::empty().expect("Should accept empty");
        let mut vm = TxScriptEngine::new(&ctx, MANDATORY_SCRIPT_VERIFY_FLAGS);
        vm.dstack = vec![vec![3]];
        assert_eq!(output_value.execute(&mut vm), Err(TxScriptError::InvalidOutputIndex(3, 3)));
        vm.dstack = vec![vec![0x81]];
        assert_eq!(output_value.execute(&mut vm), Err(TxScriptError::InvalidOutputIndex(-1, 3)));
    }

    #[test]
    fn test_deserialize_truncated_push() {
        let script = [codes::OpPushData1, 0x05, 0x01, 0x02];
        let mut it = script.iter();
        let result = deserialize_next_opcode::<_, NoTxContext>(&mut it).expect("one opcode");
        assert!(matches!(result, Err(TxScriptError::MalformedPush(5, 2))));

        let script = [codes::OpPushData2, 0x05];
        let mut it = script.iter();
        let result = deserialize_next_opcode::<_, NoTxContext>(&mut it).expect("one opcode");
        assert!(matches!(result, Err(TxScriptError::MalformedPushSize(_))));

        let mut empty = [].iter();
        assert!(deserialize_next_opcode::<_, NoTxContext>(&mut empty).is_none());
    }
}
