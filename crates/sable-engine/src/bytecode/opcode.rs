//! Instruction set for the Sable word-stream bytecode.
//!
//! Code is a flat `Vec<Word>`: an opcode word followed by its operand words.
//! Operand conventions:
//!
//! - Jump instructions carry the *target* operand first, then any condition
//!   slot, so the patcher always rewrites the word right after the opcode.
//! - A value operand `>= MAX_STACK_INDEX` refers to constant-pool entry
//!   `operand - MAX_STACK_INDEX` instead of a stack slot.
//! - Call instructions end with the return-value slot (or [`NPOS`] when the
//!   callee returns void), written after the argument slots.

/// One element of the code stream.
pub type Word = u32;

/// "No position / no slot" sentinel.
pub const NPOS: Word = u32::MAX;

/// Operands below this value are stack slots; operands at or above it are
/// constant-pool references (`operand - MAX_STACK_INDEX`). A function frame
/// needing more slots than this is an internal-consistency failure.
pub const MAX_STACK_INDEX: Word = 100_000;

/// Bytecode operations.
///
/// Discriminants are sequential from zero and are the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    /// `dst, pool` — copy constant-pool entry into a slot.
    LoadConst,
    /// `dst, name` — load a global variable by interned name.
    LoadGlobalVar,
    /// `dst, static_index` — load a function-local static.
    LoadStaticVar,
    /// `dst, base_slot, name_index` — load a struct member (unit name table).
    LoadStructVar,
    /// `dst, name` — load a read-only variable injected by the host.
    LoadReadOnlyFunctionVar,
    /// `dst, src` — copy between slots.
    StoreLocalVar,
    /// `name, src` — store into a global.
    StoreGlobalVar,
    /// `name, src` — store a temporary into a global (move hint).
    StoreRvalueGlobalVar,
    /// `static_index, src` — store into a function-local static.
    StoreStaticVar,
    /// `base_slot, name_index, src` — store into a struct member.
    StoreStructVar,
    /// `dst, class` — default-construct an instance.
    CreateVar,
    /// `dst, class` — typed null reference.
    CreateNullVar,
    /// `dst, src` — clone an instance.
    CloneVar,
    /// `slot, class` — (re)initialize a slot to the type's default value.
    InitVar,
    /// `dst, a, b`
    Add,
    /// `dst, a, b`
    Subtract,
    /// `dst, a, b`
    Multiply,
    /// `dst, a, b`
    Divide,
    /// `dst, src`
    Negate,
    /// `dst, src` — logical not.
    Not,
    /// `dst, src` — coerce to bool.
    IsTrue,
    /// `dst, class, src` — runtime cast.
    Cast,
    /// `dst, a, b`
    Equal,
    /// `dst, a, b`
    NotEqual,
    /// `dst, a, b` — greater-than compiles to Less with swapped operands.
    Less,
    /// `dst, a, b`
    LessEqual,
    /// `target`
    Jump,
    /// `target, cond`
    JumpIfTrue,
    /// `target, cond`
    JumpIfFalse,
    /// `target, static_index` — skip unless this is the first execution.
    JumpIfNotFirst,
    /// `base_slot, method_index, argc, args..., ret`
    CallAppFunction,
    /// `class, method_index, argc, args..., ret`
    CallStaticAppFunction,
    /// `script_name, argc, args..., ret`
    CallScript,
    /// `base_slot, script_name, argc, args..., ret`
    CallStructScript,
    /// `base_slot, name_index, argc, args..., ret` — member resolved at run time.
    CallDynStructScript,
    /// `slot` — return the value in a slot.
    ReturnFunctionSp,
    /// `pool` — return a constant directly.
    ReturnFunctionDp,
    /// End of function; implicit void return.
    End,
}

const OPCODES: &[Opcode] = &[
    Opcode::LoadConst,
    Opcode::LoadGlobalVar,
    Opcode::LoadStaticVar,
    Opcode::LoadStructVar,
    Opcode::LoadReadOnlyFunctionVar,
    Opcode::StoreLocalVar,
    Opcode::StoreGlobalVar,
    Opcode::StoreRvalueGlobalVar,
    Opcode::StoreStaticVar,
    Opcode::StoreStructVar,
    Opcode::CreateVar,
    Opcode::CreateNullVar,
    Opcode::CloneVar,
    Opcode::InitVar,
    Opcode::Add,
    Opcode::Subtract,
    Opcode::Multiply,
    Opcode::Divide,
    Opcode::Negate,
    Opcode::Not,
    Opcode::IsTrue,
    Opcode::Cast,
    Opcode::Equal,
    Opcode::NotEqual,
    Opcode::Less,
    Opcode::LessEqual,
    Opcode::Jump,
    Opcode::JumpIfTrue,
    Opcode::JumpIfFalse,
    Opcode::JumpIfNotFirst,
    Opcode::CallAppFunction,
    Opcode::CallStaticAppFunction,
    Opcode::CallScript,
    Opcode::CallStructScript,
    Opcode::CallDynStructScript,
    Opcode::ReturnFunctionSp,
    Opcode::ReturnFunctionDp,
    Opcode::End,
];

impl Opcode {
    #[inline]
    pub fn as_word(self) -> Word {
        self as Word
    }

    pub fn from_word(word: Word) -> Option<Opcode> {
        OPCODES.get(word as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_round_trip() {
        for &op in OPCODES {
            assert_eq!(Opcode::from_word(op.as_word()), Some(op));
        }
        assert_eq!(Opcode::from_word(OPCODES.len() as Word), None);
    }

    #[test]
    fn discriminants_are_sequential() {
        for (i, &op) in OPCODES.iter().enumerate() {
            assert_eq!(op.as_word(), i as Word);
        }
    }
}
