//! Expression lowering: the casting engine, value materialization,
//! operators and short-circuit logic.
//!
//! Values stay symbolic ([`Val`]) until an instruction needs an operand;
//! `to_stack`/`temp_stack` materialize them on demand. Literal operands are
//! folded at compile time wherever both sides are known, and numeric
//! promotion always widens (bool -> int -> double) — a narrower operand is
//! promoted, a wider one is never truncated.

use std::sync::Arc;

use crate::bytecode::{ConstValue, Opcode};
use crate::compiler::emit::LabelId;
use crate::compiler::value::{BinOp, CmpOp, InitEntry, Literal, UnOp, Val, ValKind};
use crate::compiler::Compiler;
use crate::types::{ClassRef, ContainerKind};

fn const_value_of(lit: &Literal) -> ConstValue {
    match lit {
        Literal::Bool(b) => ConstValue::Bool(*b),
        Literal::Int(i) => ConstValue::Int(*i),
        Literal::Double(d) => ConstValue::Double(*d),
        Literal::String(s) => ConstValue::String(s.clone()),
    }
}

impl Compiler<'_> {
    // ---- materialization ------------------------------------------------

    /// Ensure `v` has an operand word. With `direct`, a literal becomes a
    /// constant-pool operand instead of being loaded into a slot.
    pub(crate) fn to_stack(&mut self, v: Val, direct: bool) -> Val {
        match v.kind {
            ValKind::Invalid
            | ValKind::Slot { .. }
            | ValKind::PoolRef(_)
            | ValKind::Discard => v,
            ValKind::Literal(ref lit) => {
                let pool = self.unit.const_index(const_value_of(lit));
                if direct {
                    Val {
                        kind: ValKind::PoolRef(pool),
                        ty: v.ty,
                    }
                } else {
                    let ty = v.ty.clone().unwrap_or_else(|| self.core.var.clone());
                    let slot = self.frame.alloc_slot(true);
                    self.instr(Opcode::LoadConst);
                    self.store_target(slot);
                    self.word(pool);
                    Val::temp(slot, ty)
                }
            }
            ValKind::Null => {
                // A typed null reference. Outlives the current statement:
                // the slot is promoted outward and swept by the enclosing
                // statement's close.
                let ty = v.ty.clone().unwrap_or_else(|| self.core.null.clone());
                let slot = self.frame.alloc_slot(false);
                self.instr(Opcode::CreateNullVar);
                self.store_target(slot);
                self.word(ty.name().as_u32());
                Val::local(slot, ty)
            }
            ValKind::Global { name, read_only_fn } => {
                let ty = v.ty.clone().unwrap_or_else(|| self.core.var.clone());
                let slot = self.frame.alloc_slot(true);
                self.instr(if read_only_fn {
                    Opcode::LoadReadOnlyFunctionVar
                } else {
                    Opcode::LoadGlobalVar
                });
                self.store_target(slot);
                self.word(name.as_u32());
                Val::temp(slot, ty)
            }
            ValKind::Static { index } => {
                let ty = v.ty.clone().unwrap_or_else(|| self.core.var.clone());
                let slot = self.frame.alloc_slot(true);
                self.instr(Opcode::LoadStaticVar);
                self.store_target(slot);
                self.word(index);
                Val::temp(slot, ty)
            }
            ValKind::StructMember { base, member, .. } => {
                let ty = v.ty.clone().unwrap_or_else(|| self.core.var.clone());
                let base = self.temp_stack(*base, false);
                let name = self.interner.resolve(member);
                let name_idx = self.unit.name_index(&name);
                let base_op = self.operand_or_npos(&base);
                let slot = self.frame.alloc_slot(true);
                self.instr(Opcode::LoadStructVar);
                self.store_target(slot);
                self.word(base_op);
                self.word(name_idx);
                Val::temp(slot, ty)
            }
            ValKind::InitList(_) => {
                let realized = self.realize_init_list(v, None);
                self.to_stack(realized, direct)
            }
            ValKind::MethodRef { .. }
            | ValKind::StaticMethodRef { .. }
            | ValKind::ScriptRef { .. } => {
                self.diags
                    .error("A method reference cannot be used as a value", self.pos);
                Val::invalid()
            }
        }
    }

    /// Materialize into a statement-scoped location.
    pub(crate) fn temp_stack(&mut self, v: Val, direct: bool) -> Val {
        self.to_stack(v, direct)
    }

    /// A fresh temporary of `ty`; reference types are default-constructed.
    pub(crate) fn create_val(&mut self, ty: ClassRef) -> Val {
        let slot = self.frame.alloc_slot(true);
        if ty.is_basic() || self.core.is_var(&ty) || self.core.is_void(&ty) {
            return Val::temp(slot, ty);
        }
        if ty.is_constructible() {
            self.instr(Opcode::CreateVar);
        } else {
            self.instr(Opcode::CreateNullVar);
        }
        self.store_target(slot);
        self.word(ty.name().as_u32());
        Val::temp(slot, ty)
    }

    // ---- casting --------------------------------------------------------

    /// Cast `v` to `ty` where the language allows it silently: identity,
    /// upcasts, `Var` in either direction, `null` to a reference type, or a
    /// registered implicit cast (which lowers to the explicit-cast path).
    pub(crate) fn implicit_cast(&mut self, v: Val, ty: ClassRef) -> Val {
        if !v.is_valid() {
            return v;
        }
        if matches!(v.kind, ValKind::InitList(_)) {
            return self.realize_init_list(v, Some(ty));
        }
        let Some(vty) = v.ty.clone() else { return v };
        if Arc::ptr_eq(&vty, &ty) {
            return v;
        }
        if vty.is_of_type(ty.name()) || self.core.is_var(&vty) || self.core.is_var(&ty) {
            return v.retyped(ty);
        }
        if self.core.is_null(&vty) {
            if !ty.is_basic() {
                return v.retyped(ty);
            }
        } else if vty.implicit_casts().contains(&ty.name()) {
            return self.cast(v, ty);
        }
        let from = self.interner.resolve(vty.name());
        let to = self.interner.resolve(ty.name());
        let explicit_possible =
            vty.explicit_casts().contains(&ty.name()) || ty.is_of_type(vty.name());
        let msg = if explicit_possible {
            format!("Cannot implicitly cast from '{from}' to '{to}'; an explicit cast is required")
        } else {
            format!("Cannot cast from '{from}' to '{to}'")
        };
        self.diags.error(msg, self.pos);
        Val::invalid()
    }

    /// Explicit cast: everything the implicit cast allows, plus the
    /// registered explicit set and downcasts. Literals fold at compile
    /// time; everything else emits a runtime CAST.
    pub fn cast(&mut self, v: Val, ty: ClassRef) -> Val {
        if !v.is_valid() {
            return v;
        }
        if matches!(v.kind, ValKind::InitList(_)) {
            return self.realize_init_list(v, Some(ty));
        }
        // Casting to null means casting to an untyped reference.
        let ty = if self.core.is_null(&ty) {
            self.core.object.clone()
        } else {
            ty
        };
        let Some(vty) = v.ty.clone() else { return v };
        if Arc::ptr_eq(&vty, &ty)
            || vty.is_of_type(ty.name())
            || self.core.is_var(&vty)
            || self.core.is_var(&ty)
            || self.core.is_null(&vty)
        {
            return v.retyped(ty);
        }
        let allowed = vty.implicit_casts().contains(&ty.name())
            || vty.explicit_casts().contains(&ty.name())
            || ty.is_of_type(vty.name());
        if !allowed {
            let from = self.interner.resolve(vty.name());
            let to = self.interner.resolve(ty.name());
            self.diags
                .error(format!("Cannot cast from '{from}' to '{to}'"), self.pos);
            return Val::invalid();
        }
        if let Some(lit) = v.literal_value() {
            if let Some(folded) = self.cast_literal(lit, &ty) {
                return Val::literal(folded, ty);
            }
        }
        let src = self.temp_stack(v, false);
        let src_op = self.operand_or_npos(&src);
        let slot = self.frame.alloc_slot(true);
        self.instr(Opcode::Cast);
        self.store_target(slot);
        self.word(ty.name().as_u32());
        self.word(src_op);
        self.free_if_temporary(&src);
        Val::temp(slot, ty)
    }

    fn cast_literal(&self, lit: &Literal, ty: &ClassRef) -> Option<Literal> {
        if Arc::ptr_eq(ty, &self.core.bool_) {
            Some(Literal::Bool(lit.to_bool()))
        } else if Arc::ptr_eq(ty, &self.core.int) {
            Some(Literal::Int(lit.to_int()))
        } else if Arc::ptr_eq(ty, &self.core.double) {
            Some(Literal::Double(lit.to_double()))
        } else if Arc::ptr_eq(ty, &self.core.string) {
            Some(Literal::String(lit.to_string_value()))
        } else {
            None
        }
    }

    /// The common type two operands combine at: the wider numeric width
    /// when both are numeric, the left type otherwise.
    fn combine_type(&self, lty: &ClassRef, rty: &ClassRef) -> ClassRef {
        if self.core.is_numeric(lty) && self.core.is_numeric(rty) {
            let width = |t: &ClassRef| {
                if Arc::ptr_eq(t, &self.core.double) {
                    2
                } else if Arc::ptr_eq(t, &self.core.int) {
                    1
                } else {
                    0
                }
            };
            if width(rty) > width(lty) {
                return rty.clone();
            }
        }
        lty.clone()
    }

    // ---- operators ------------------------------------------------------

    /// Binary arithmetic. Both literal operands fold to a literal result.
    pub fn arith(&mut self, op: BinOp, lhs: Val, rhs: Val) -> Val {
        if !lhs.is_valid() || !rhs.is_valid() {
            return Val::invalid();
        }
        let (Some(lty), Some(rty)) = (lhs.ty.clone(), rhs.ty.clone()) else {
            return Val::invalid();
        };
        let target = self.combine_type(&lty, &rty);
        let lhs = self.implicit_cast(lhs, target.clone());
        let rhs = self.implicit_cast(rhs, target.clone());
        if !lhs.is_valid() || !rhs.is_valid() {
            return Val::invalid();
        }
        if let (Some(a), Some(b)) = (lhs.literal_value(), rhs.literal_value()) {
            if let Some(folded) = Literal::arith(op, a, b) {
                return Val::literal(folded, target);
            }
        }
        let is_string = self.core.is_string(&target);
        let lv = self.temp_stack(lhs, true);
        let rv = self.temp_stack(rhs, true);
        // Reuse a basic-typed temporary operand as the result; strings are
        // built in place and never alias an operand.
        let result = if !is_string && target.is_basic() && lv.is_temp_slot() {
            lv.clone().retyped(target)
        } else if !is_string && target.is_basic() && rv.is_temp_slot() {
            rv.clone().retyped(target)
        } else {
            self.create_val(target)
        };
        let opcode = match op {
            BinOp::Add => Opcode::Add,
            BinOp::Sub => Opcode::Subtract,
            BinOp::Mul => Opcode::Multiply,
            BinOp::Div => Opcode::Divide,
        };
        let dst = self.operand_or_npos(&result);
        let a = self.operand_or_npos(&lv);
        let b = self.operand_or_npos(&rv);
        self.instr(opcode);
        self.store_target(dst);
        self.word(a);
        self.word(b);
        // A non-temporary operand slot must not become the elision target
        // of the store this instruction produced.
        for v in [&lv, &rv] {
            if let ValKind::Slot { index, temp: false } = v.kind {
                self.no_recycle.push(index);
            }
        }
        if is_string {
            // String concatenation appends into the destination; eliding
            // the store into a variable that may alias an operand is
            // unsound.
            self.clear_last_store();
        }
        let result_slot = result.stack_slot();
        for v in [&rv, &lv] {
            if v.stack_slot() != result_slot {
                self.free_if_temporary(v);
            }
        }
        result
    }

    /// Comparison. Greater-than forms lower to their less-than mirror with
    /// swapped operands.
    pub fn compare(&mut self, op: CmpOp, lhs: Val, rhs: Val) -> Val {
        if !lhs.is_valid() || !rhs.is_valid() {
            return Val::invalid();
        }
        let (Some(lty), Some(rty)) = (lhs.ty.clone(), rhs.ty.clone()) else {
            return Val::invalid();
        };
        let target = self.combine_type(&lty, &rty);
        let lhs = self.implicit_cast(lhs, target.clone());
        let rhs = self.implicit_cast(rhs, target.clone());
        if !lhs.is_valid() || !rhs.is_valid() {
            return Val::invalid();
        }
        if let (Some(a), Some(b)) = (lhs.literal_value(), rhs.literal_value()) {
            if let Some(folded) = Literal::compare(op, a, b) {
                return Val::literal(Literal::Bool(folded), self.core.bool_.clone());
            }
        }
        let (opcode, first, second) = match op {
            CmpOp::Eq => (Opcode::Equal, lhs, rhs),
            CmpOp::Ne => (Opcode::NotEqual, lhs, rhs),
            CmpOp::Lt => (Opcode::Less, lhs, rhs),
            CmpOp::Le => (Opcode::LessEqual, lhs, rhs),
            CmpOp::Gt => (Opcode::Less, rhs, lhs),
            CmpOp::Ge => (Opcode::LessEqual, rhs, lhs),
        };
        let av = self.temp_stack(first, true);
        let bv = self.temp_stack(second, true);
        let result = if av.is_temp_slot() && av.ty.as_ref().is_some_and(|t| t.is_basic()) {
            av.clone().retyped(self.core.bool_.clone())
        } else if bv.is_temp_slot() && bv.ty.as_ref().is_some_and(|t| t.is_basic()) {
            bv.clone().retyped(self.core.bool_.clone())
        } else {
            Val::temp(self.frame.alloc_slot(true), self.core.bool_.clone())
        };
        let dst = self.operand_or_npos(&result);
        let a = self.operand_or_npos(&av);
        let b = self.operand_or_npos(&bv);
        self.instr(opcode);
        self.store_target(dst);
        self.word(a);
        self.word(b);
        for v in [&av, &bv] {
            if let ValKind::Slot { index, temp: false } = v.kind {
                self.no_recycle.push(index);
            }
        }
        let result_slot = result.stack_slot();
        for v in [&bv, &av] {
            if v.stack_slot() != result_slot {
                self.free_if_temporary(v);
            }
        }
        result
    }

    /// Unary operators. Literal operands fold.
    pub fn unary(&mut self, op: UnOp, v: Val) -> Val {
        if !v.is_valid() {
            return v;
        }
        let Some(vty) = v.ty.clone() else { return v };
        if matches!(op, UnOp::Plus | UnOp::Minus)
            && !self.core.is_numeric(&vty)
            && !self.core.is_var(&vty)
        {
            let tn = self.interner.resolve(vty.name());
            self.diags.error(
                format!("Unary operator requires a numeric operand, found '{tn}'"),
                self.pos,
            );
            return Val::invalid();
        }
        if let Some(lit) = v.literal_value() {
            if let Some(folded) = Literal::unary(op, lit) {
                let ty = match folded {
                    Literal::Bool(_) => self.core.bool_.clone(),
                    Literal::Int(_) => self.core.int.clone(),
                    Literal::Double(_) => self.core.double.clone(),
                    Literal::String(_) => self.core.string.clone(),
                };
                return Val::literal(folded, ty);
            }
        }
        match op {
            UnOp::Plus => v,
            UnOp::Minus => {
                // Negating a bool yields an int.
                let ty = if Arc::ptr_eq(&vty, &self.core.bool_) {
                    self.core.int.clone()
                } else {
                    vty
                };
                let src = self.temp_stack(v, false);
                let src_op = self.operand_or_npos(&src);
                let result = if src.is_temp_slot() {
                    src.clone().retyped(ty)
                } else {
                    Val::temp(self.frame.alloc_slot(true), ty)
                };
                let dst = self.operand_or_npos(&result);
                self.instr(Opcode::Negate);
                self.store_target(dst);
                self.word(src_op);
                if src.stack_slot() != result.stack_slot() {
                    self.free_if_temporary(&src);
                }
                result
            }
            UnOp::Not => {
                let src = self.temp_stack(v, false);
                let src_op = self.operand_or_npos(&src);
                let result = if src.is_temp_slot() {
                    src.clone().retyped(self.core.bool_.clone())
                } else {
                    Val::temp(self.frame.alloc_slot(true), self.core.bool_.clone())
                };
                let dst = self.operand_or_npos(&result);
                self.instr(Opcode::Not);
                self.store_target(dst);
                self.word(src_op);
                if src.stack_slot() != result.stack_slot() {
                    self.free_if_temporary(&src);
                }
                result
            }
        }
    }

    // ---- assignment -----------------------------------------------------

    /// Assignment, including the compound forms. Returns the left-hand
    /// value so assignments chain.
    pub fn assign(&mut self, lhs: Val, rhs: Val, op: crate::compiler::AssignOp) -> Val {
        if !lhs.is_valid() {
            return lhs;
        }
        let Some(lty) = lhs.ty.clone() else {
            self.diags.error("Invalid assignment target", self.pos);
            return Val::invalid();
        };
        let rhs = match op.bin_op() {
            Some(bin) => self.arith(bin, lhs.clone(), rhs),
            None => rhs,
        };
        let rhs = if matches!(rhs.kind, ValKind::InitList(_)) {
            self.realize_init_list(rhs, Some(lty.clone()))
        } else {
            rhs
        };
        let rhs = self.implicit_cast(rhs, lty);
        if !rhs.is_valid() {
            return lhs;
        }
        let rv = self.temp_stack(rhs, true);
        match lhs.kind.clone() {
            ValKind::Slot { index, temp: false } => {
                let elide = rv.is_temp_slot()
                    && self.last_store_target().is_some()
                    && self.last_store_target() == rv.operand()
                    && !self.no_recycle.contains(&index);
                if elide {
                    // The producing instruction writes the variable
                    // directly; the temporary is dead.
                    self.redirect_last_store(index);
                } else if let ValKind::PoolRef(pool) = rv.kind {
                    self.instr(Opcode::LoadConst);
                    self.store_target(index);
                    self.word(pool);
                } else {
                    let src = self.operand_or_npos(&rv);
                    self.instr(Opcode::StoreLocalVar);
                    self.store_target(index);
                    self.word(src);
                }
            }
            ValKind::Global { name, read_only_fn } => {
                if read_only_fn {
                    self.diags
                        .error("Cannot assign to a read-only variable", self.pos);
                } else {
                    let src = self.operand_or_npos(&rv);
                    self.instr(if rv.is_temp_slot() {
                        Opcode::StoreRvalueGlobalVar
                    } else {
                        Opcode::StoreGlobalVar
                    });
                    self.word(name.as_u32());
                    self.word(src);
                }
            }
            ValKind::Static { index } => {
                let src = self.operand_or_npos(&rv);
                self.instr(Opcode::StoreStaticVar);
                self.word(index);
                self.word(src);
                // Close the one-time-initialization guard of a static
                // declaration at its first store.
                if let Some(guard) = self.static_guard.take() {
                    self.bind(guard);
                }
            }
            ValKind::StructMember { base, member, .. } => {
                let b = self.temp_stack(*base, false);
                let base_op = self.operand_or_npos(&b);
                let name = self.interner.resolve(member);
                let name_idx = self.unit.name_index(&name);
                let src = self.operand_or_npos(&rv);
                self.instr(Opcode::StoreStructVar);
                self.word(base_op);
                self.word(name_idx);
                self.word(src);
                self.free_if_temporary(&b);
            }
            _ => {
                self.diags.error("Invalid assignment target", self.pos);
            }
        }
        self.free_if_temporary(&rv);
        lhs
    }

    // ---- short-circuit logic --------------------------------------------

    /// Coerce a value into a fresh boolean temporary, reusing it when it
    /// already is one.
    fn coerce_condition(&mut self, v: Val) -> Val {
        let v = self.temp_stack(v, false);
        if v.is_temp_slot() && v.ty.as_ref().is_some_and(|t| Arc::ptr_eq(t, &self.core.bool_)) {
            return v;
        }
        let src = self.operand_or_npos(&v);
        let slot = self.frame.alloc_slot(true);
        self.instr(Opcode::IsTrue);
        self.store_target(slot);
        self.word(src);
        self.free_if_temporary(&v);
        Val::temp(slot, self.core.bool_.clone())
    }

    /// Left side of `&&`: the result slot holds the truth of the left
    /// operand and a false value bypasses the right side.
    pub fn and_check(&mut self, lhs: Val) -> (Val, LabelId) {
        let result = self.coerce_condition(lhs);
        let join = self.new_label();
        let op = self.operand_or_npos(&result);
        self.instr(Opcode::JumpIfFalse);
        self.jump_operand(join);
        self.word(op);
        (result, join)
    }

    /// Right side of `&&`: its truth lands in the same result slot.
    pub fn and_complete(&mut self, result: Val, rhs: Val, join: LabelId) -> Val {
        let rv = self.temp_stack(rhs, false);
        let src = self.operand_or_npos(&rv);
        let dst = self.operand_or_npos(&result);
        self.instr(Opcode::IsTrue);
        self.word(dst);
        self.word(src);
        self.free_if_temporary(&rv);
        self.bind(join);
        // Both paths defined the result; elision across the join would see
        // only one of them.
        self.clear_last_store();
        result
    }

    /// Left side of `||`: a true value bypasses the right side.
    pub fn or_check(&mut self, lhs: Val) -> (Val, LabelId) {
        let result = self.coerce_condition(lhs);
        let join = self.new_label();
        let op = self.operand_or_npos(&result);
        self.instr(Opcode::JumpIfTrue);
        self.jump_operand(join);
        self.word(op);
        (result, join)
    }

    /// Right side of `||`.
    pub fn or_complete(&mut self, result: Val, rhs: Val, join: LabelId) -> Val {
        self.and_complete(result, rhs, join)
    }

    // ---- initializer lists ----------------------------------------------

    /// Realize a `{...}` initializer list into a container instance.
    ///
    /// The target type comes from context (`expected`) when available and
    /// unambiguous; otherwise it is inferred from the elements. Keyed
    /// entries build a `Map`, keyless entries an `Array` (or fill a `Set`
    /// when the context says so).
    pub(crate) fn realize_init_list(&mut self, v: Val, expected: Option<ClassRef>) -> Val {
        let ValKind::InitList(entries) = v.kind else {
            return v;
        };
        let keyed = entries.first().map_or(false, |e| e.key.is_some());
        if entries.iter().any(|e| e.key.is_some() != keyed) {
            self.diags.error(
                "An initializer list cannot mix keyed and keyless elements",
                self.pos,
            );
            return Val::invalid();
        }
        let target = match expected {
            Some(ty) if !self.core.is_var(&ty) && !Arc::ptr_eq(&ty, &self.core.object) => ty,
            _ => match self.infer_container_type(&entries, keyed) {
                Some(ty) => ty,
                None => return Val::invalid(),
            },
        };
        if !target.is_container() {
            if entries.is_empty() && target.is_constructible() {
                return self.create_val(target);
            }
            let tn = self.interner.resolve(target.name());
            self.diags.error(
                format!("Type '{tn}' cannot be built from an initializer list"),
                self.pos,
            );
            return Val::invalid();
        }
        let kind = target
            .container_kind()
            .expect("container without container kind");
        if keyed && kind != ContainerKind::Map {
            let tn = self.interner.resolve(target.name());
            self.diags.error(
                format!("Keyed initializer elements require a Map type, found '{tn}'"),
                self.pos,
            );
            return Val::invalid();
        }
        if !keyed && kind == ContainerKind::Map && !entries.is_empty() {
            self.diags.error(
                "A Map initializer list requires 'key : value' elements",
                self.pos,
            );
            return Val::invalid();
        }
        let container = self.create_val(target);
        for entry in entries {
            let stat = self.begin_stat();
            let method = match kind {
                ContainerKind::Map => self.core.names.set,
                ContainerKind::Set => self.core.names.insert,
                _ => self.core.names.push_back,
            };
            let f = Val {
                kind: ValKind::MethodRef {
                    base: Box::new(container.clone()),
                    method,
                },
                ty: Some(self.core.void.clone()),
            };
            let args = match entry.key {
                Some(key) => vec![key, entry.value],
                None => vec![entry.value],
            };
            self.call(f, args);
            self.end_stat(stat);
        }
        container
    }

    fn infer_container_type(&mut self, entries: &[InitEntry], keyed: bool) -> Option<ClassRef> {
        if entries.is_empty() {
            self.diags.error(
                "Cannot infer the type of an empty initializer list",
                self.pos,
            );
            return None;
        }
        let common = |vals: Vec<Option<ClassRef>>, core_object: &ClassRef| -> ClassRef {
            let mut iter = vals.into_iter().flatten();
            let first = match iter.next() {
                Some(ty) => ty,
                None => return core_object.clone(),
            };
            for ty in iter {
                if !Arc::ptr_eq(&ty, &first) {
                    return core_object.clone();
                }
            }
            first
        };
        let value_ty = common(
            entries.iter().map(|e| e.value.ty.clone()).collect(),
            &self.core.object,
        );
        let value_name = self.interner.resolve(value_ty.name());
        let spec = if keyed {
            let key_ty = common(
                entries.iter().map(|e| e.key.clone().and_then(|k| k.ty)).collect(),
                &self.core.object,
            );
            let key_name = self.interner.resolve(key_ty.name());
            format!("Map<{key_name},{value_name}>")
        } else {
            format!("Array<{value_name}>")
        };
        match self.registry.get_or_create_container(&spec) {
            Ok(ty) => Some(ty),
            Err(err) => {
                self.diags.error(err.to_string(), self.pos);
                None
            }
        }
    }

    // ---- index operator and construction --------------------------------

    /// `base[index]` lowered to a `Get` call.
    pub fn index_get(&mut self, base: Val, index: Val) -> Val {
        let f = self.container_method(base, self.core.names.get);
        if !f.is_valid() {
            return f;
        }
        self.call(f, vec![index])
    }

    /// `base[index] = rhs` lowered to a `Set` call.
    pub fn index_set(&mut self, base: Val, index: Val, rhs: Val) -> Val {
        let f = self.container_method(base, self.core.names.set);
        if !f.is_valid() {
            return f;
        }
        self.call(f, vec![index, rhs])
    }

    fn container_method(&mut self, base: Val, method: crate::interner::Symbol) -> Val {
        let Some(ty) = base.ty.clone() else {
            return Val::invalid();
        };
        if !ty.has_method(method) {
            let tn = self.interner.resolve(ty.name());
            self.diags
                .error(format!("Type '{tn}' does not support indexing"), self.pos);
            return Val::invalid();
        }
        Val {
            kind: ValKind::MethodRef {
                base: Box::new(base),
                method,
            },
            ty: Some(self.core.void.clone()),
        }
    }

    /// `T()` default construction or `T(x)` copy construction.
    pub fn construct(&mut self, ty: ClassRef, mut args: Vec<Val>) -> Val {
        let tn = self.interner.resolve(ty.name());
        match args.len() {
            0 => {
                if !ty.is_basic() && !ty.is_constructible() {
                    self.diags
                        .error(format!("'{tn}' is not constructible"), self.pos);
                    return Val::invalid();
                }
                self.create_val(ty)
            }
            1 => {
                if !ty.is_cloneable() {
                    self.diags
                        .error(format!("'{tn}' cannot be copy constructed"), self.pos);
                    return Val::invalid();
                }
                let arg = args.remove(0);
                let arg = self.implicit_cast(arg, ty.clone());
                if !arg.is_valid() {
                    return arg;
                }
                let src = self.temp_stack(arg, false);
                let src_op = self.operand_or_npos(&src);
                let slot = self.frame.alloc_slot(true);
                self.instr(Opcode::CloneVar);
                self.store_target(slot);
                self.word(src_op);
                self.free_if_temporary(&src);
                Val::temp(slot, ty)
            }
            _ => {
                self.diags.error(
                    format!("The constructor for '{tn}' accepts at most one argument"),
                    self.pos,
                );
                Val::invalid()
            }
        }
    }

    /// Report a value whose type does not match an expected type. Returns
    /// the cast value for fluent use at statement boundaries.
    pub fn expected_type(&mut self, v: Val, ty: &ClassRef) -> Val {
        self.implicit_cast(v, ty.clone())
    }
}
