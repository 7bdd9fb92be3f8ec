//! Compiled script units.
//!
//! A [`ScriptUnit`] is the output of compiling one function: the word-stream
//! code, a constant pool, a unit-local name table (for struct member access
//! resolved at run time), and the debug side-tables the executor and
//! debugger consume.

pub mod opcode;

pub use opcode::{Opcode, Word, MAX_STACK_INDEX, NPOS};

use crate::types::PrototypeId;

/// A pooled constant.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

/// Maps an instruction's position in the code stream back to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMapEntry {
    /// Word index of the opcode in [`ScriptUnit::ops`].
    pub code_offset: u32,
    /// Byte offset in the source text.
    pub source_offset: u32,
    /// 1-based source line.
    pub source_line: u32,
}

/// Debug record for one declared variable.
///
/// `slot` is the stack slot for locals; statics are encoded as
/// `-(static_index) - 1` so the debugger can tell the storage classes apart.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVarRecord {
    pub name: String,
    pub type_name: String,
    pub slot: i64,
    /// Code offset after which the variable is in scope.
    pub valid_after: u32,
    /// Code offset at which the variable leaves scope.
    pub valid_before: u32,
}

/// One compiled function.
#[derive(Debug, Clone, Default)]
pub struct ScriptUnit {
    pub name: String,
    pub prototype: Option<PrototypeId>,
    /// Interleaved opcode/operand words.
    pub ops: Vec<Word>,
    pub constants: Vec<ConstValue>,
    /// Unit-local name table for struct-member instructions.
    pub names: Vec<String>,
    pub argument_names: Vec<String>,
    /// Number of stack slots the frame needs.
    pub stack_size: u32,
    /// Number of function-local static slots.
    pub static_count: u32,
    pub local_vars: Vec<LocalVarRecord>,
    pub source_map: Vec<SourceMapEntry>,
}

impl ScriptUnit {
    /// Intern a constant into the pool, reusing an identical entry.
    ///
    /// Pools are small, so a linear scan beats carrying a side map (and
    /// sidesteps hashing f64).
    pub fn const_index(&mut self, value: ConstValue) -> u32 {
        if let Some(pos) = self.constants.iter().position(|c| *c == value) {
            return pos as u32;
        }
        self.constants.push(value);
        (self.constants.len() - 1) as u32
    }

    /// Intern a name into the unit-local name table.
    pub fn name_index(&mut self, name: &str) -> u32 {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            return pos as u32;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u32
    }

    /// Source line for a code offset, if the unit carries a source map.
    pub fn line_at(&self, code_offset: u32) -> Option<u32> {
        let idx = self
            .source_map
            .partition_point(|e| e.code_offset <= code_offset);
        idx.checked_sub(1).map(|i| self.source_map[i].source_line)
    }

    /// Opcodes in emission order, skipping operand words.
    ///
    /// Test and tooling helper; the executor walks the raw words directly.
    pub fn opcodes(&self) -> Vec<Opcode> {
        let mut out = Vec::new();
        let mut i = 0usize;
        while i < self.ops.len() {
            let op = match Opcode::from_word(self.ops[i]) {
                Some(op) => op,
                None => break,
            };
            out.push(op);
            i += 1 + operand_count(op, &self.ops[i + 1..]);
        }
        out
    }
}

/// Number of operand words following `op`. Call instructions are variable
/// length; `rest` must start at the first operand.
fn operand_count(op: Opcode, rest: &[Word]) -> usize {
    use Opcode::*;
    match op {
        End => 0,
        Jump | ReturnFunctionSp | ReturnFunctionDp => 1,
        LoadConst | LoadGlobalVar | LoadStaticVar | LoadReadOnlyFunctionVar | StoreLocalVar
        | StoreGlobalVar | StoreRvalueGlobalVar | StoreStaticVar | CreateVar | CreateNullVar
        | CloneVar | InitVar | Negate | Not | IsTrue | JumpIfTrue | JumpIfFalse
        | JumpIfNotFirst => 2,
        LoadStructVar | StoreStructVar | Add | Subtract | Multiply | Divide | Equal | NotEqual
        | Less | LessEqual | Cast => 3,
        // name/base, argc, args..., ret
        CallScript => 2 + rest[1] as usize + 1,
        // base/class, method, argc, args..., ret
        CallAppFunction | CallStaticAppFunction | CallStructScript | CallDynStructScript => {
            3 + rest[2] as usize + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_pool_deduplicates() {
        let mut unit = ScriptUnit::default();
        let a = unit.const_index(ConstValue::Int(42));
        let b = unit.const_index(ConstValue::String("x".into()));
        let c = unit.const_index(ConstValue::Int(42));
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(unit.constants.len(), 2);
    }

    #[test]
    fn name_table_deduplicates() {
        let mut unit = ScriptUnit::default();
        let a = unit.name_index("heading");
        let b = unit.name_index("altitude");
        assert_eq!(unit.name_index("heading"), a);
        assert_eq!(b, 1);
    }

    #[test]
    fn opcode_walk_skips_operands() {
        let mut unit = ScriptUnit::default();
        unit.ops.extend([
            Opcode::LoadConst.as_word(),
            0,
            MAX_STACK_INDEX, // pool ref operand, must not be decoded as opcode
            Opcode::End.as_word(),
        ]);
        assert_eq!(unit.opcodes(), vec![Opcode::LoadConst, Opcode::End]);
    }

    #[test]
    fn line_lookup() {
        let mut unit = ScriptUnit::default();
        unit.source_map.push(SourceMapEntry {
            code_offset: 0,
            source_offset: 0,
            source_line: 1,
        });
        unit.source_map.push(SourceMapEntry {
            code_offset: 5,
            source_offset: 20,
            source_line: 3,
        });
        assert_eq!(unit.line_at(0), Some(1));
        assert_eq!(unit.line_at(4), Some(1));
        assert_eq!(unit.line_at(9), Some(3));
    }
}
