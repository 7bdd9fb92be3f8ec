//! Bytecode compiler for the sable scripting language.
//!
//! Scripts run embedded in a host application: the host registers its types
//! and methods into a [`TypeRegistry`], then drives a [`Compiler`] from its
//! parser, one entry point per syntax node. The output is a [`ScriptUnit`]
//! per function — a `u32` word stream plus its constant pool and debug
//! side-tables — executed by a register-frame interpreter.
//!
//! The overall flow:
//!
//! ```no_run
//! use sable_engine::{Compiler, Prototype, ScriptScope, StringInterner, TypeRegistry};
//!
//! let interner = StringInterner::new();
//! let registry = TypeRegistry::with_basic_types(interner.clone()).unwrap();
//! // ... host registers its classes, then:
//! registry.initialize().unwrap();
//!
//! let mut scope = ScriptScope::new();
//! let mut compiler = Compiler::new(&registry, &mut scope).unwrap();
//! let proto = Prototype::new(interner.intern("int"), vec![interner.intern("int")]);
//! compiler.begin_function("twice", proto, &["n"]);
//! // ... parser drives the expression/statement entry points ...
//! let unit = compiler.end_function().unwrap();
//! assert_eq!(unit.name, "twice");
//! ```
//!
//! Operand words below [`MAX_STACK_INDEX`] are stack slots; words at or
//! above it refer to the constant pool (`word - MAX_STACK_INDEX`). The
//! sentinel [`NPOS`] marks a discarded result or an unpatched jump.

pub mod bytecode;
pub mod compiler;
pub mod interner;
pub mod types;

pub use bytecode::{
    ConstValue, LocalVarRecord, Opcode, ScriptUnit, SourceMapEntry, Word, MAX_STACK_INDEX, NPOS,
};
pub use compiler::{
    print_diagnostics, render_diagnostics, AssignOp, BinOp, BlockKind, CmpOp, CompileError,
    Compiler, Diagnostic, DiagnosticSink, GlobalVarDef, LabelId, Literal, ScriptScope, SourcePos,
    UnOp, Val, VarStorage,
};
pub use interner::{StringInterner, Symbol};
pub use types::{
    ClassRef, ClassType, ContainerKind, Method, Prototype, PrototypeId, RegistryError,
    TypeRegistry,
};
