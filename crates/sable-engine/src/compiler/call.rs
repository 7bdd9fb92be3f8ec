//! Member access and call emission.
//!
//! Four call shapes share one emission discipline: opcode, callee words,
//! argument count, argument operands, then the return slot. Basic-typed
//! temporary arguments are released before the return slot is chosen, so
//! a call's result can land in a slot an argument just vacated; reference
//! arguments stay live until after the call is fully encoded.

use crate::bytecode::{Opcode, Word};
use crate::compiler::value::{Val, ValKind};
use crate::compiler::Compiler;
use crate::interner::Symbol;
use crate::types::{ClassRef, PrototypeId};

impl Compiler<'_> {
    // ---- member access --------------------------------------------------

    /// `obj.name`: a struct member or struct script on a script-defined
    /// struct, a method reference otherwise.
    pub fn member(&mut self, v: Val, name: &str) -> Val {
        if !v.is_valid() {
            return v;
        }
        let sym = self.interner.intern(name);
        let Some(ty) = v.ty.clone() else {
            self.diags.error(
                format!("Cannot access '{name}' on a value of unknown type"),
                self.pos,
            );
            return Val::invalid();
        };
        if ty.is_pseudo_class() {
            if let Some(member_ty) = ty.struct_member_type(sym) {
                let mty = self
                    .class_for(member_ty)
                    .unwrap_or_else(|| self.core.var.clone());
                let base = self.temp_stack(v, false);
                return Val {
                    kind: ValKind::StructMember {
                        base: Box::new(base),
                        member: sym,
                        typed: true,
                    },
                    ty: Some(mty),
                };
            }
            if let Some(proto) = ty.struct_script(sym) {
                let base = self.temp_stack(v, false);
                return Val {
                    kind: ValKind::ScriptRef {
                        name: sym,
                        proto,
                        base: Some(Box::new(base)),
                    },
                    ty: Some(self.core.void.clone()),
                };
            }
            let tn = self.interner.resolve(ty.name());
            self.diags.error(
                format!("'{name}' is not a member of struct '{tn}'"),
                self.pos,
            );
            return Val::invalid();
        }
        if ty.has_method(sym) {
            return Val {
                kind: ValKind::MethodRef {
                    base: Box::new(v),
                    method: sym,
                },
                ty: Some(self.core.void.clone()),
            };
        }
        let tn = self.interner.resolve(ty.name());
        self.diags.error(
            format!("Method '{name}' does not exist on class '{tn}'"),
            self.pos,
        );
        Val::invalid()
    }

    /// `obj->name`: member resolved at run time; the result is `Var`.
    pub fn dyn_member(&mut self, v: Val, name: &str) -> Val {
        if !v.is_valid() {
            return v;
        }
        let sym = self.interner.intern(name);
        let base = self.temp_stack(v, false);
        Val {
            kind: ValKind::StructMember {
                base: Box::new(base),
                member: sym,
                typed: false,
            },
            ty: Some(self.core.var.clone()),
        }
    }

    /// `Type.Method`: reference to a static method.
    pub fn attribute(&mut self, ty: ClassRef, name: &str) -> Val {
        let sym = self.interner.intern(name);
        if !ty.has_static_method(sym) {
            let tn = self.interner.resolve(ty.name());
            self.diags.error(
                format!("Class '{tn}' has no static method '{name}'"),
                self.pos,
            );
            return Val::invalid();
        }
        Val {
            kind: ValKind::StaticMethodRef { class: ty, method: sym },
            ty: Some(self.core.void.clone()),
        }
    }

    // ---- call emission --------------------------------------------------

    /// Call any callable value: a method reference, a static method
    /// reference, a script function, or a dynamically resolved struct
    /// member.
    pub fn call(&mut self, f: Val, args: Vec<Val>) -> Val {
        self.call_into(f, args, None)
    }

    /// As [`call`](Self::call), with an optional caller-provided return
    /// destination.
    pub(crate) fn call_into(&mut self, f: Val, args: Vec<Val>, ret_into: Option<Val>) -> Val {
        match f.kind {
            ValKind::MethodRef { base, method } => {
                self.call_method(Some(*base), None, method, args, ret_into)
            }
            ValKind::StaticMethodRef { class, method } => {
                self.call_method(None, Some(class), method, args, ret_into)
            }
            ValKind::ScriptRef { name, proto, base } => {
                self.call_script(name, proto, base.map(|b| *b), args, ret_into)
            }
            ValKind::StructMember { base, member, .. } => {
                self.call_dyn_struct(*base, member, args, ret_into)
            }
            ValKind::Invalid => Val::invalid(),
            _ => {
                self.diags.error("This value is not callable", self.pos);
                Val::invalid()
            }
        }
    }

    fn call_method(
        &mut self,
        base: Option<Val>,
        static_class: Option<ClassRef>,
        method: Symbol,
        mut args: Vec<Val>,
        ret_into: Option<Val>,
    ) -> Val {
        let class = match (&base, &static_class) {
            (Some(b), _) => match b.ty.clone() {
                Some(ty) => ty,
                None => return Val::invalid(),
            },
            (None, Some(c)) => c.clone(),
            (None, None) => return Val::invalid(),
        };
        // Initializer-list arguments realize against the formal type when
        // every overload agrees on it.
        for i in 0..args.len() {
            if matches!(args[i].kind, ValKind::InitList(_)) {
                let hint = self.method_parameter_type(&class, method, i);
                let list = std::mem::replace(&mut args[i], Val::invalid());
                args[i] = self.realize_init_list(list, hint);
            }
        }
        let actuals: Vec<Option<ClassRef>> = args.iter().map(|a| a.ty.clone()).collect();
        let Some(m) = self.registry.find_method(&class, method, &actuals) else {
            let cname = self.interner.resolve(class.name());
            let mname = self.interner.resolve(method);
            let candidates = self.registry.method_candidates(&class, method);
            let mut msg = format!(
                "Cannot resolve a call to '{cname}.{mname}' with the given argument types"
            );
            if !candidates.is_empty() {
                msg.push_str("; candidates: ");
                msg.push_str(&candidates.join(", "));
            }
            self.diags.error(msg, self.pos);
            return Val::invalid();
        };
        if static_class.is_some() && !m.is_static {
            let mname = self.interner.resolve(method);
            self.diags
                .error(format!("'{mname}' is not a static method"), self.pos);
            return Val::invalid();
        }
        let mut arg_vals = Vec::with_capacity(args.len());
        for (i, a) in args.into_iter().enumerate() {
            let a = match m.formal_at(i).and_then(|s| self.class_for(s)) {
                Some(formal) => self.implicit_cast(a, formal),
                None => a,
            };
            arg_vals.push(self.temp_stack(a, true));
        }
        let base_val = match (m.is_static, base) {
            (false, Some(b)) => Some(self.temp_stack(b, false)),
            _ => None,
        };
        self.instr(if m.is_static {
            Opcode::CallStaticAppFunction
        } else {
            Opcode::CallAppFunction
        });
        match &base_val {
            Some(b) => {
                let op = self.operand_or_npos(b);
                self.word(op);
            }
            None => self.word(class.name().as_u32()),
        }
        self.word(m.index as Word);
        self.word(arg_vals.len() as Word);
        for a in &arg_vals {
            let op = self.operand_or_npos(a);
            self.word(op);
        }
        self.release_basic_args(&arg_vals);
        let ret = self.alloc_return(m.return_type, ret_into);
        self.emit_return_slot(&ret);
        self.release_remaining(&arg_vals, base_val.as_ref(), &ret);
        ret
    }

    fn call_script(
        &mut self,
        name: Symbol,
        proto_id: PrototypeId,
        base: Option<Val>,
        mut args: Vec<Val>,
        ret_into: Option<Val>,
    ) -> Val {
        let proto = self.registry.prototype(proto_id);
        if args.len() != proto.args.len() {
            let sname = self.interner.resolve(name);
            self.diags.error(
                format!(
                    "Script '{}' expects {} argument(s), {} given",
                    sname,
                    proto.args.len(),
                    args.len()
                ),
                self.pos,
            );
            return Val::invalid();
        }
        for i in 0..args.len() {
            let formal = self.class_for(proto.args[i]);
            if matches!(args[i].kind, ValKind::InitList(_)) {
                let list = std::mem::replace(&mut args[i], Val::invalid());
                args[i] = self.realize_init_list(list, formal.clone());
            }
            if let Some(formal) = formal {
                let a = std::mem::replace(&mut args[i], Val::invalid());
                args[i] = self.implicit_cast(a, formal);
            }
        }
        let mut arg_vals = Vec::with_capacity(args.len());
        for a in args {
            arg_vals.push(self.temp_stack(a, true));
        }
        let base_val = base.map(|b| self.temp_stack(b, false));
        match &base_val {
            Some(b) => {
                let op = self.operand_or_npos(b);
                self.instr(Opcode::CallStructScript);
                self.word(op);
                self.word(name.as_u32());
            }
            None => {
                self.instr(Opcode::CallScript);
                self.word(name.as_u32());
            }
        }
        self.word(arg_vals.len() as Word);
        for a in &arg_vals {
            let op = self.operand_or_npos(a);
            self.word(op);
        }
        self.release_basic_args(&arg_vals);
        let ret = self.alloc_return(proto.return_type, ret_into);
        self.emit_return_slot(&ret);
        self.release_remaining(&arg_vals, base_val.as_ref(), &ret);
        ret
    }

    /// `obj->name(...)`: the member is looked up at run time, so arguments
    /// pass uncast and the result is `Var`.
    fn call_dyn_struct(
        &mut self,
        base: Val,
        member: Symbol,
        mut args: Vec<Val>,
        ret_into: Option<Val>,
    ) -> Val {
        for i in 0..args.len() {
            if matches!(args[i].kind, ValKind::InitList(_)) {
                let list = std::mem::replace(&mut args[i], Val::invalid());
                args[i] = self.realize_init_list(list, None);
            }
        }
        let mut arg_vals = Vec::with_capacity(args.len());
        for a in args {
            arg_vals.push(self.temp_stack(a, true));
        }
        let base_val = self.temp_stack(base, false);
        let base_op = self.operand_or_npos(&base_val);
        let name = self.interner.resolve(member);
        let name_idx = self.unit.name_index(&name);
        self.instr(Opcode::CallDynStructScript);
        self.word(base_op);
        self.word(name_idx);
        self.word(arg_vals.len() as Word);
        for a in &arg_vals {
            let op = self.operand_or_npos(a);
            self.word(op);
        }
        self.release_basic_args(&arg_vals);
        let ret = match ret_into {
            Some(r) => r,
            None => Val::temp(self.frame.alloc_slot(true), self.core.var.clone()),
        };
        self.emit_return_slot(&ret);
        self.release_remaining(&arg_vals, Some(&base_val), &ret);
        ret
    }

    fn alloc_return(&mut self, return_type: Symbol, ret_into: Option<Val>) -> Val {
        if let Some(r) = ret_into {
            return r;
        }
        let rty = self
            .class_for(return_type)
            .unwrap_or_else(|| self.core.var.clone());
        if self.core.is_void(&rty) {
            Val {
                kind: ValKind::Discard,
                ty: Some(rty),
            }
        } else {
            Val::temp(self.frame.alloc_slot(true), rty)
        }
    }

    fn emit_return_slot(&mut self, ret: &Val) {
        match ret.stack_slot() {
            Some(slot) => self.store_target(slot),
            None => {
                let op = self.operand_or_npos(ret);
                self.word(op);
            }
        }
    }

    /// Release basic-typed temporary arguments. Their values are copied
    /// into the callee's frame at dispatch, so the slots are free before
    /// the return slot is chosen.
    fn release_basic_args(&mut self, args: &[Val]) {
        for a in args {
            if a.is_temp_slot() && a.ty.as_ref().is_some_and(|t| t.is_basic()) {
                self.free_if_temporary(a);
            }
        }
    }

    fn release_remaining(&mut self, args: &[Val], base: Option<&Val>, ret: &Val) {
        let ret_slot = ret.stack_slot();
        for a in args {
            if a.ty.as_ref().is_some_and(|t| t.is_basic()) {
                continue; // already released
            }
            if a.stack_slot() != ret_slot {
                self.free_if_temporary(a);
            }
        }
        if let Some(b) = base {
            if b.stack_slot() != ret_slot {
                self.free_if_temporary(b);
            }
        }
    }

    /// The formal type at position `i` when every overload of `method`
    /// agrees on it; the context for realizing initializer-list arguments.
    fn method_parameter_type(
        &mut self,
        class: &ClassRef,
        method: Symbol,
        i: usize,
    ) -> Option<ClassRef> {
        let mut found: Option<Symbol> = None;
        for m in class.methods_named(method) {
            match m.formal_at(i) {
                None => return None,
                Some(f) => match found {
                    Some(prev) if prev != f => return None,
                    _ => found = Some(f),
                },
            }
        }
        let sym = found?;
        self.class_for(sym)
    }

    // ---- foreach --------------------------------------------------------

    /// Emit the iteration header of a `foreach` loop.
    ///
    /// Call inside an open [`BlockKind::ForEach`] block, after declaring
    /// the key/value variables and compiling the container expression. The
    /// loop's continue label lands before the `HasNext` test; a false test
    /// exits the loop. `Next` (and `Key`, when a key variable is present)
    /// write straight into the declared variables' slots.
    ///
    /// [`BlockKind::ForEach`]: crate::compiler::BlockKind
    pub fn foreach_begin(&mut self, key: Option<Val>, value: Val, container: Val) {
        if !container.is_valid() {
            return;
        }
        let Some(cty) = container.ty.clone() else {
            return;
        };
        if !cty.is_container() {
            let tn = self.interner.resolve(cty.name());
            self.diags
                .error(format!("Type '{tn}' is not iterable"), self.pos);
            return;
        }
        if let Some(elem) = cty.value_type() {
            if let Some(vty) = value.ty.clone() {
                if let Some(elem_class) = self.class_for(elem) {
                    if !self.registry.is_compatible(vty.name(), &elem_class)
                        && !self.core.is_var(&vty)
                    {
                        let en = self.interner.resolve(elem);
                        let vn = self.interner.resolve(vty.name());
                        self.diags.error(
                            format!("Cannot iterate '{en}' elements into a '{vn}' variable"),
                            self.pos,
                        );
                    }
                }
            }
        }
        if let (Some(k), Some(kt)) = (&key, cty.key_type()) {
            if let Some(kty) = k.ty.clone() {
                if let Some(key_class) = self.class_for(kt) {
                    if !self.registry.is_compatible(kty.name(), &key_class)
                        && !self.core.is_var(&kty)
                    {
                        let kn = self.interner.resolve(kt);
                        let vn = self.interner.resolve(kty.name());
                        self.diags.error(
                            format!("Cannot iterate '{kn}' keys into a '{vn}' variable"),
                            self.pos,
                        );
                    }
                }
            }
        }
        // The container and its iterator live for the whole loop; their
        // slots are swept when the enclosing statement closes.
        let mut cont_val = self.temp_stack(container, false);
        if let ValKind::Slot { index, ref mut temp } = cont_val.kind {
            if *temp {
                self.frame.promote_to_parent(index);
                *temp = false;
            }
        }
        let get_iter = Val {
            kind: ValKind::MethodRef {
                base: Box::new(cont_val),
                method: self.core.names.get_iterator,
            },
            ty: Some(self.core.void.clone()),
        };
        let mut iter = self.call_into(get_iter, Vec::new(), None);
        if let ValKind::Slot { index, ref mut temp } = iter.kind {
            if *temp {
                self.frame.promote_to_parent(index);
                *temp = false;
            }
        }
        let scope = self.scopes.last().expect("no open scope");
        let cont_label = scope.continue_label.expect("not in a foreach block");
        let exit_label = scope.exit_label.expect("not in a foreach block");
        let top = self.code_offset();
        self.bind_to(cont_label, top);
        let has_next = Val {
            kind: ValKind::MethodRef {
                base: Box::new(iter.clone()),
                method: self.core.names.has_next,
            },
            ty: Some(self.core.void.clone()),
        };
        let test = self.call_into(has_next, Vec::new(), None);
        let test_op = self.operand_or_npos(&test);
        self.instr(Opcode::JumpIfFalse);
        self.jump_operand(exit_label);
        self.word(test_op);
        self.free_if_temporary(&test);
        let next = Val {
            kind: ValKind::MethodRef {
                base: Box::new(iter.clone()),
                method: self.core.names.next,
            },
            ty: Some(self.core.void.clone()),
        };
        self.call_into(next, Vec::new(), Some(value));
        if let Some(k) = key {
            let key_method = Val {
                kind: ValKind::MethodRef {
                    base: Box::new(iter),
                    method: self.core.names.key,
                },
                ty: Some(self.core.void.clone()),
            };
            self.call_into(key_method, Vec::new(), Some(k));
        }
        // Next/Key wrote the loop variables; an assignment in the body must
        // not rewrite those stores.
        self.clear_last_store();
    }
}
