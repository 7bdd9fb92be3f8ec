//! The bytecode compiler.
//!
//! [`Compiler`] is a driver surface: a parser (or any front end) walks its
//! syntax tree and calls one entry point per node — literals, identifier
//! lookup, operators, statements, blocks, control flow, function begin/end.
//! Each entry point takes and returns [`Val`]s, emits words into the
//! current [`ScriptUnit`], and records semantic problems in a diagnostic
//! sink without stopping.
//!
//! Compilation state is function-at-a-time: `begin_function` resets the
//! unit, the frame allocator and the label table; `end_function` closes the
//! body scope, runs the missing-return check and hands back the finished
//! unit. Scripts and globals registered along the way live in the
//! session-wide [`ScriptScope`].

pub mod emit;
pub mod error;
pub mod scope;
pub mod value;

mod call;
mod expr;

pub use emit::LabelId;
pub use error::{
    print_diagnostics, render_diagnostics, CompileError, Diagnostic, DiagnosticSink, SourcePos,
};
pub use scope::{BlockKind, GlobalVarDef, ScriptScope};
pub use value::{AssignOp, BinOp, CmpOp, Literal, UnOp, Val};

use std::sync::Arc;

use crate::bytecode::{Opcode, ScriptUnit, Word, NPOS};
use crate::interner::{StringInterner, Symbol};
use crate::types::basic::CoreTypes;
use crate::types::{ClassRef, Prototype, TypeRegistry};

use emit::LabelState;
use scope::{Frame, Scope, VarRecord};
use value::{InitEntry, ValKind};

/// Storage class of a variable declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarStorage {
    Local,
    /// Function-local static slot with a one-time-initialization guard.
    Static,
    Global,
    /// Declared here, defined by another compilation unit.
    Extern,
}

/// Per-function bytecode compiler. See the module docs for the driving
/// protocol.
pub struct Compiler<'env> {
    registry: &'env TypeRegistry,
    interner: StringInterner,
    core: CoreTypes,
    scripts: &'env mut ScriptScope,
    unit: ScriptUnit,
    scopes: Vec<Scope>,
    frame: Frame,
    labels: Vec<LabelState>,
    diags: DiagnosticSink,
    pos: SourcePos,
    /// Word index of the last store-destination operand, for the
    /// store-elision peephole.
    last_store: Option<usize>,
    /// Slots that must not become the target of store elision for the
    /// pending store (they are read by the instruction that produced it).
    no_recycle: Vec<Word>,
    /// Unbound one-time-initialization guard of a static declaration,
    /// bound at the first store.
    static_guard: Option<LabelId>,
    cur_proto: Option<Arc<Prototype>>,
}

impl<'env> Compiler<'env> {
    pub fn new(
        registry: &'env TypeRegistry,
        scripts: &'env mut ScriptScope,
    ) -> Result<Self, CompileError> {
        let core = CoreTypes::from_registry(registry)?;
        Ok(Compiler {
            registry,
            interner: registry.interner().clone(),
            core,
            scripts,
            unit: ScriptUnit::default(),
            scopes: Vec::new(),
            frame: Frame::new(),
            labels: Vec::new(),
            diags: DiagnosticSink::new(),
            pos: SourcePos::default(),
            last_store: None,
            no_recycle: Vec::new(),
            static_guard: None,
            cur_proto: None,
        })
    }

    pub fn registry(&self) -> &TypeRegistry {
        self.registry
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diags.diagnostics()
    }

    // ---- literals -------------------------------------------------------

    pub fn bool_literal(&mut self, v: bool) -> Val {
        Val::literal(Literal::Bool(v), self.core.bool_.clone())
    }

    pub fn int_literal(&mut self, v: i64) -> Val {
        Val::literal(Literal::Int(v), self.core.int.clone())
    }

    pub fn double_literal(&mut self, v: f64) -> Val {
        Val::literal(Literal::Double(v), self.core.double.clone())
    }

    /// A string literal whose text is already processed.
    pub fn string_literal(&mut self, text: &str) -> Val {
        Val::literal(Literal::String(text.to_string()), self.core.string.clone())
    }

    /// A raw quoted string literal as it appears in source: quotes are
    /// stripped and escape sequences processed.
    pub fn quoted_string_literal(&mut self, raw: &str) -> Val {
        let inner = raw
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(raw);
        self.string_literal(&unescape(inner))
    }

    pub fn null_literal(&mut self) -> Val {
        Val {
            kind: ValKind::Null,
            ty: Some(self.core.null.clone()),
        }
    }

    /// An empty `{...}` initializer list; fill it with
    /// [`add_to_initializer_list`](Self::add_to_initializer_list).
    pub fn new_initializer_list(&mut self) -> Val {
        Val {
            kind: ValKind::InitList(Vec::new()),
            ty: None,
        }
    }

    pub fn add_to_initializer_list(&mut self, list: &mut Val, value: Val, key: Option<Val>) {
        match &mut list.kind {
            ValKind::InitList(entries) => entries.push(InitEntry { key, value }),
            _ => self
                .diags
                .error("Internal error: not an initializer list", self.pos),
        }
    }

    // ---- name lookup ----------------------------------------------------

    /// Resolve an identifier: innermost scope outward, then globals, then
    /// script functions.
    pub fn identifier(&mut self, name: &str) -> Val {
        let sym = self.interner.intern(name);
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.symbols.get(&sym) {
                return v.clone();
            }
        }
        if let Some(def) = self.scripts.global(sym) {
            return Val {
                kind: ValKind::Global {
                    name: sym,
                    read_only_fn: def.read_only,
                },
                ty: Some(def.ty.clone()),
            };
        }
        if let Some(proto) = self.scripts.script(sym) {
            return Val {
                kind: ValKind::ScriptRef {
                    name: sym,
                    proto,
                    base: None,
                },
                ty: Some(self.core.void.clone()),
            };
        }
        self.diags
            .error(format!("Unknown variable or script '{name}'"), self.pos);
        Val::invalid()
    }

    /// Resolve a type name, instantiating container specifications on the
    /// fly. Unknown names are a diagnostic and yield `None`.
    pub fn type_ref(&mut self, name: &str) -> Option<ClassRef> {
        match self.registry.lookup_type(name) {
            Some(class) => Some(class),
            None => {
                self.diags
                    .error(format!("Invalid type '{name}'"), self.pos);
                None
            }
        }
    }

    pub(crate) fn class_for(&mut self, sym: Symbol) -> Option<ClassRef> {
        if let Some(class) = self.registry.get_class_sym(sym) {
            return Some(class);
        }
        let name = self.interner.resolve(sym);
        if name.contains('<') {
            self.registry.get_or_create_container(&name).ok()
        } else {
            None
        }
    }

    // ---- declarations ---------------------------------------------------

    pub fn var_decl(&mut self, ty: ClassRef, name: &str, storage: VarStorage) -> Val {
        if self.core.is_void(&ty) || self.core.is_null(&ty) {
            let tn = self.interner.resolve(ty.name());
            self.diags
                .error(format!("Cannot declare a variable of type '{tn}'"), self.pos);
            return Val::invalid();
        }
        let sym = self.interner.intern(name);
        match storage {
            VarStorage::Local => {
                let scope = self.scopes.last_mut().expect("no open scope");
                if scope.symbols.contains_key(&sym) {
                    self.diags
                        .error(format!("Variable '{name}' is already declared"), self.pos);
                    return Val::invalid();
                }
                let slot = self.frame.alloc_slot(false);
                let val = Val::local(slot, ty.clone());
                let scope = self.scopes.last_mut().expect("no open scope");
                scope.symbols.insert(sym, val.clone());
                scope.locals.push(slot);
                scope.var_records.push(VarRecord {
                    name: sym,
                    type_name: ty.name(),
                    slot: slot as i64,
                    valid_after: self.unit.ops.len() as u32,
                });
                val
            }
            VarStorage::Static => {
                let scope = self.scopes.last_mut().expect("no open scope");
                if scope.symbols.contains_key(&sym) {
                    self.diags
                        .error(format!("Variable '{name}' is already declared"), self.pos);
                    return Val::invalid();
                }
                let index = self.frame.alloc_static();
                let val = Val {
                    kind: ValKind::Static { index },
                    ty: Some(ty.clone()),
                };
                let scope = self.scopes.last_mut().expect("no open scope");
                scope.symbols.insert(sym, val.clone());
                scope.var_records.push(VarRecord {
                    name: sym,
                    type_name: ty.name(),
                    slot: -(index as i64) - 1,
                    valid_after: self.unit.ops.len() as u32,
                });
                val
            }
            VarStorage::Global => {
                if let Some(def) = self.scripts.global(sym) {
                    if !def.external {
                        self.diags.error(
                            format!("Global variable '{name}' is already declared"),
                            self.pos,
                        );
                        return Val::invalid();
                    }
                    if !Arc::ptr_eq(&def.ty, &ty) {
                        self.diags.error(
                            format!("Type of '{name}' does not match its extern declaration"),
                            self.pos,
                        );
                    }
                }
                self.scripts.insert_global(
                    sym,
                    GlobalVarDef {
                        ty: ty.clone(),
                        read_only: false,
                        external: false,
                    },
                );
                Val {
                    kind: ValKind::Global {
                        name: sym,
                        read_only_fn: false,
                    },
                    ty: Some(ty),
                }
            }
            VarStorage::Extern => {
                if let Some(def) = self.scripts.global(sym) {
                    if !Arc::ptr_eq(&def.ty, &ty) {
                        self.diags.error(
                            format!("Type of '{name}' does not match its previous declaration"),
                            self.pos,
                        );
                    }
                } else {
                    self.scripts.insert_global(
                        sym,
                        GlobalVarDef {
                            ty: ty.clone(),
                            read_only: false,
                            external: true,
                        },
                    );
                }
                Val {
                    kind: ValKind::Global {
                        name: sym,
                        read_only_fn: false,
                    },
                    ty: Some(ty),
                }
            }
        }
    }

    /// Default-initialize a freshly declared local of a constructible
    /// reference type.
    pub fn var_decl_init(&mut self, var: &Val) {
        let Some(ty) = var.ty.clone() else { return };
        if ty.is_basic() || self.core.is_var(&ty) || !ty.is_constructible() {
            return;
        }
        if let Some(slot) = var.stack_slot() {
            self.instr(Opcode::InitVar);
            self.word(slot);
            self.word(ty.name().as_u32());
        }
    }

    /// Call before compiling the initializer of a static declaration:
    /// emits the one-time guard, bound at the first store.
    pub fn var_decl_pre_assign(&mut self, var: &Val) {
        if let ValKind::Static { index } = var.kind {
            let label = self.new_label();
            self.instr(Opcode::JumpIfNotFirst);
            self.jump_operand(label);
            self.word(index);
            self.static_guard = Some(label);
        }
    }

    // ---- statements and blocks ------------------------------------------

    /// Open a statement. Every statement — including each compound
    /// statement as a whole — must be bracketed by `begin_stat`/`end_stat`
    /// so its temporaries are released.
    pub fn begin_stat(&mut self) -> u32 {
        self.frame.begin_stat()
    }

    pub fn end_stat(&mut self, id: u32) {
        self.frame.end_stat(id);
        // Elision never reaches across a statement boundary.
        self.last_store = None;
    }

    pub fn begin_block(&mut self, kind: BlockKind) {
        let (exit_label, continue_label) = if kind.is_loop() {
            (Some(self.new_label()), Some(self.new_label()))
        } else {
            (None, None)
        };
        let loop_top = self.code_offset();
        let parent = self.scopes.last().expect("no open scope");
        let mut scope = Scope::new(kind);
        scope.all_paths_return = parent.all_paths_return;
        scope.if_block = parent.if_parent;
        scope.exit_label = exit_label;
        scope.continue_label = continue_label;
        scope.loop_top = loop_top;
        self.scopes.push(scope);
        if kind == BlockKind::While {
            // The condition is re-evaluated at the loop top.
            let cont = continue_label.expect("loop without continue label");
            self.bind_to(cont, loop_top);
        }
    }

    /// Re-anchor the loop top after a for-loop's init statement.
    pub fn mark_loop_top(&mut self) {
        let offset = self.code_offset();
        let scope = self.scopes.last_mut().expect("no open scope");
        scope.loop_top = offset;
    }

    pub fn end_block(&mut self) {
        let kind = self.scopes.last().expect("no open scope").kind;
        // Loops that re-test at the top get their back edge here; do/while
        // falls through into its own condition.
        if matches!(kind, BlockKind::While | BlockKind::For | BlockKind::ForEach) {
            // The back edge is synthetic; a body that ends in a return (or
            // break) must not flag it as unreachable.
            let scope = self.scopes.last_mut().expect("no open scope");
            scope.has_returned = false;
            scope.all_paths_return = false;
            let cont = scope.continue_label.expect("loop without continue label");
            self.instr(Opcode::Jump);
            self.jump_operand(cont);
        }
        if let Some(exit) = self.scopes.last().expect("no open scope").exit_label {
            self.bind(exit);
        }
        let scope = self.scopes.pop().expect("no open scope");
        let close = self.unit.ops.len() as u32;
        for rec in &scope.var_records {
            self.unit.local_vars.push(crate::bytecode::LocalVarRecord {
                name: self.interner.resolve(rec.name),
                type_name: self.interner.resolve(rec.type_name),
                slot: rec.slot,
                valid_after: rec.valid_after,
                valid_before: close,
            });
        }
        for &slot in &scope.locals {
            self.frame.free_local(slot);
        }
        if let Some(parent) = self.scopes.last_mut() {
            if !scope.empty {
                parent.empty = false;
            }
            match scope.kind {
                BlockKind::Normal => {
                    let straight_line =
                        parent.kind == BlockKind::Normal && !parent.if_parent && !parent.if_block;
                    if straight_line {
                        parent.all_paths_return = scope.all_paths_return && !scope.empty;
                    } else {
                        parent.all_paths_return =
                            parent.all_paths_return && scope.all_paths_return && !scope.empty;
                    }
                }
                // A loop body may execute zero times.
                _ => parent.all_paths_return = false,
            }
        }
    }

    // ---- control flow ---------------------------------------------------

    /// Emit the conditional branch of an `if`. Returns the label to pass to
    /// [`if_true_end`](Self::if_true_end).
    pub fn if_cond(&mut self, cond: Val) -> LabelId {
        let cond = self.temp_stack(cond, false);
        let label = self.new_label();
        self.instr(Opcode::JumpIfFalse);
        self.jump_operand(label);
        let op = self.operand_or_npos(&cond);
        self.word(op);
        self.free_if_temporary(&cond);
        let scope = self.scopes.last_mut().expect("no open scope");
        scope.all_paths_return = true;
        scope.if_parent = true;
        label
    }

    /// Close the true branch. With an else branch pending, emits the
    /// skip-over jump and returns its label for [`if_else_end`] — unless
    /// the true branch returned on every path, in which case it cannot
    /// fall through and no jump is needed.
    ///
    /// [`if_else_end`]: Self::if_else_end
    pub fn if_true_end(&mut self, false_target: LabelId, has_else: bool) -> Option<LabelId> {
        if has_else {
            let diverges = self.scopes.last().expect("no open scope").all_paths_return;
            let skip = if diverges {
                None
            } else {
                let skip = self.new_label();
                self.instr(Opcode::Jump);
                self.jump_operand(skip);
                Some(skip)
            };
            self.bind(false_target);
            skip
        } else {
            self.bind(false_target);
            let scope = self.scopes.last_mut().expect("no open scope");
            scope.all_paths_return = false;
            scope.if_parent = false;
            None
        }
    }

    pub fn if_else_end(&mut self, skip: Option<LabelId>) {
        if let Some(skip) = skip {
            self.bind(skip);
        }
        let scope = self.scopes.last_mut().expect("no open scope");
        scope.if_parent = false;
    }

    /// Emit the exit test of a `while` loop; call inside the loop block,
    /// after compiling the condition expression.
    pub fn while_cond(&mut self, cond: Val) {
        let exit = self.current_loop_exit();
        let cond = self.to_stack(cond, false);
        self.instr(Opcode::JumpIfFalse);
        self.jump_operand(exit);
        let op = self.operand_or_npos(&cond);
        self.word(op);
        self.free_if_temporary(&cond);
    }

    /// Call before compiling a do/while condition: continues jump here.
    pub fn do_while_cond_start(&mut self) {
        let offset = self.code_offset();
        let scope = self.scopes.last().expect("no open scope");
        let cont = scope.continue_label.expect("not in a do/while block");
        self.bind_to(cont, offset);
    }

    /// Emit the back edge of a do/while loop.
    pub fn do_while_cond(&mut self, cond: Val) {
        let top = self.scopes.last().expect("no open scope").loop_top;
        let cond = self.to_stack(cond, false);
        self.instr(Opcode::JumpIfTrue);
        self.word(top);
        let op = self.operand_or_npos(&cond);
        self.word(op);
        self.free_if_temporary(&cond);
    }

    /// Emit the condition of a `for` loop: jump into the body when true,
    /// exit otherwise. The increment section follows; continues target it.
    pub fn for_cond(&mut self, cond: Val) {
        let exit = self.current_loop_exit();
        let body = self.new_label();
        let cond = self.to_stack(cond, false);
        self.instr(Opcode::JumpIfTrue);
        self.jump_operand(body);
        let op = self.operand_or_npos(&cond);
        self.word(op);
        self.instr(Opcode::Jump);
        self.jump_operand(exit);
        let offset = self.code_offset();
        let scope = self.scopes.last_mut().expect("no open scope");
        scope.body_label = Some(body);
        let cont = scope.continue_label.expect("not in a for block");
        self.bind_to(cont, offset);
        self.free_if_temporary(&cond);
    }

    /// Close the increment section of a `for` loop: jump back to the
    /// condition, then open the body.
    pub fn for_inc(&mut self) {
        let scope = self.scopes.last().expect("no open scope");
        let top = scope.loop_top;
        let body = scope.body_label.expect("for_inc before for_cond");
        self.instr(Opcode::Jump);
        self.word(top);
        self.bind(body);
    }

    pub fn brk(&mut self) {
        let Some(idx) = self.innermost_loop() else {
            self.diags.error(
                "Break statement found outside of a breakable block",
                self.pos,
            );
            return;
        };
        let exit = self.scopes[idx].exit_label.expect("loop without exit label");
        self.instr(Opcode::Jump);
        self.jump_operand(exit);
    }

    pub fn cont(&mut self) {
        let Some(idx) = self.innermost_loop() else {
            self.diags
                .error("Continue statement found outside of a loop", self.pos);
            return;
        };
        let cont = self.scopes[idx]
            .continue_label
            .expect("loop without continue label");
        self.instr(Opcode::Jump);
        self.jump_operand(cont);
    }

    /// Compile a return statement.
    pub fn ret(&mut self, value: Option<Val>) {
        let rtype = self.func_return_type();
        let returns_value = !self.core.is_void(&rtype);
        match value {
            Some(v) if returns_value => {
                let v = self.implicit_cast(v, rtype);
                let v = self.temp_stack(v, true);
                match v.kind {
                    ValKind::PoolRef(pool) => {
                        self.instr(Opcode::ReturnFunctionDp);
                        self.word(pool);
                    }
                    _ => {
                        self.instr(Opcode::ReturnFunctionSp);
                        let op = self.operand_or_npos(&v);
                        self.word(op);
                    }
                }
                self.free_if_temporary(&v);
            }
            Some(_) => {
                self.diags
                    .error("Cannot return a value from a void function", self.pos);
            }
            None => {
                if returns_value {
                    self.diags.error("A return value is expected", self.pos);
                }
                self.instr(Opcode::ReturnFunctionSp);
                self.word(NPOS);
            }
        }
        let scope = self.scopes.last_mut().expect("no open scope");
        scope.has_returned = true;
        scope.all_paths_return = true;
    }

    // ---- functions ------------------------------------------------------

    /// Start compiling a function. Registers the script in the session
    /// scope and declares the parameters as the first locals, in order.
    pub fn begin_function(&mut self, name: &str, proto: Prototype, param_names: &[&str]) {
        self.unit = ScriptUnit::default();
        self.frame = Frame::new();
        self.labels.clear();
        self.diags = DiagnosticSink::new();
        self.last_store = None;
        self.no_recycle.clear();
        self.static_guard = None;

        let sym = self.interner.intern(name);
        if let Some(existing) = self.scripts.script(sym) {
            if *self.registry.prototype(existing) != proto {
                self.diags.error(
                    format!("Script '{name}' signature differs from a previous declaration"),
                    self.pos,
                );
            } else {
                self.diags
                    .error(format!("Script '{name}' is already defined"), self.pos);
            }
        }
        if param_names.len() != proto.args.len() {
            self.diags.error(
                format!("Script '{name}' declares a name for each of its arguments"),
                self.pos,
            );
        }
        let id = self.registry.add_prototype(proto);
        self.scripts.insert_script(sym, id);
        self.cur_proto = Some(self.registry.prototype(id));
        self.unit.name = name.to_string();
        self.unit.prototype = Some(id);
        self.scopes.push(Scope::new(BlockKind::Function));

        let proto = self.cur_proto.clone().expect("prototype just set");
        for (i, pname) in param_names.iter().enumerate() {
            let Some(&arg) = proto.args.get(i) else { break };
            let ty = match self.class_for(arg) {
                Some(ty) => ty,
                None => {
                    let tn = self.interner.resolve(arg);
                    self.diags
                        .error(format!("Invalid type '{tn}'"), self.pos);
                    self.core.var.clone()
                }
            };
            self.var_decl(ty, pname, VarStorage::Local);
            self.unit.argument_names.push(pname.to_string());
        }
    }

    /// Finish the current function: missing-return check, END terminator,
    /// debug tables. Fails with the collected diagnostics when any were
    /// recorded.
    pub fn end_function(&mut self) -> Result<ScriptUnit, CompileError> {
        let rtype = self.func_return_type();
        {
            let scope = self.scopes.last_mut().expect("no open scope");
            if !self.core.is_void(&rtype) && !scope.all_paths_return {
                let msg = "Not all code paths return a value".to_string();
                self.diags.error(msg, self.pos);
            }
            // The terminator is not user code; suppress reachability checks.
            scope.has_returned = false;
            scope.all_paths_return = false;
        }
        self.instr(Opcode::End);
        let scope = self.scopes.pop().expect("no open scope");
        let close = self.unit.ops.len() as u32;
        for rec in &scope.var_records {
            self.unit.local_vars.push(crate::bytecode::LocalVarRecord {
                name: self.interner.resolve(rec.name),
                type_name: self.interner.resolve(rec.type_name),
                slot: rec.slot,
                valid_after: rec.valid_after,
                valid_before: close,
            });
        }
        self.unit.stack_size = self.frame.stack_size();
        self.unit.static_count = self.frame.static_count();
        self.cur_proto = None;
        let unit = std::mem::take(&mut self.unit);
        if self.diags.has_errors() {
            Err(CompileError::Semantic(self.diags.take()))
        } else {
            log::debug!(
                "compiled '{}': {} words, {} slots",
                unit.name,
                unit.ops.len(),
                unit.stack_size
            );
            Ok(unit)
        }
    }

    // ---- shared helpers -------------------------------------------------

    pub(crate) fn func_return_type(&mut self) -> ClassRef {
        let Some(proto) = self.cur_proto.clone() else {
            return self.core.void.clone();
        };
        self.class_for(proto.return_type)
            .unwrap_or_else(|| self.core.void.clone())
    }

    pub(crate) fn operand_or_npos(&self, v: &Val) -> Word {
        v.operand().unwrap_or(NPOS)
    }

    pub(crate) fn free_if_temporary(&mut self, v: &Val) {
        if let ValKind::Slot { index, temp: true } = v.kind {
            self.frame.free_temp(index);
        }
    }

    fn innermost_loop(&self) -> Option<usize> {
        self.scopes.iter().rposition(|s| s.kind.is_loop())
    }

    fn current_loop_exit(&self) -> LabelId {
        let scope = self.scopes.last().expect("no open scope");
        scope.exit_label.expect("not in a loop block")
    }

    pub(crate) fn type_name_of(&self, v: &Val) -> String {
        match &v.ty {
            Some(ty) => self.interner.resolve(ty.name()),
            None => "<unknown>".to_string(),
        }
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_processes_common_sequences() {
        assert_eq!(unescape(r"a\tb\nc"), "a\tb\nc");
        assert_eq!(unescape(r#"say \"hi\""#), "say \"hi\"");
        assert_eq!(unescape(r"back\\slash"), "back\\slash");
        assert_eq!(unescape(r"plain"), "plain");
    }

    #[test]
    fn rejected_static_redeclaration_consumes_no_index() {
        let reg = TypeRegistry::with_basic_types(StringInterner::new()).unwrap();
        let interner = reg.interner().clone();
        let mut scripts = ScriptScope::new();
        let mut c = Compiler::new(&reg, &mut scripts).unwrap();
        c.begin_function("f", Prototype::new(interner.intern("void"), Vec::new()), &[]);
        let int_ty = c.type_ref("int").unwrap();
        c.var_decl(int_ty.clone(), "s", VarStorage::Static);
        let dup = c.var_decl(int_ty.clone(), "s", VarStorage::Static);
        assert!(!dup.is_valid());
        // The rejected redeclaration left no hole in the static indices.
        let next = c.var_decl(int_ty, "t", VarStorage::Static);
        assert!(matches!(next.kind, ValKind::Static { index: 1 }));
        assert_eq!(c.frame.static_count(), 2);
    }
}
