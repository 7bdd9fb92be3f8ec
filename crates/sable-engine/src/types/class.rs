//! Script classes and their method tables.
//!
//! A [`ClassType`] describes one type visible to scripts: its place in the
//! single-inheritance hierarchy, its cast sets, and its method table. The
//! *position* of a method in the table is its dispatch index — the executor
//! calls through `(class, index)` pairs, so index parity across a hierarchy
//! is a hard invariant enforced by [`TypeRegistry::initialize`].
//!
//! [`TypeRegistry::initialize`]: super::TypeRegistry::initialize

use rustc_hash::FxHashMap;

use crate::interner::{StringInterner, Symbol};
use crate::types::prototype::PrototypeId;
use crate::types::template::split_type_list;

/// What a container class is, for the compiler's element-protocol lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Array,
    Map,
    Set,
    Iterator,
}

/// One entry in a class's method table.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: Symbol,
    pub return_type: Symbol,
    /// Argument type names. For a variadic method the last entry is the
    /// type of every trailing argument.
    pub arg_types: Vec<Symbol>,
    pub is_variadic: bool,
    pub is_static: bool,
    /// Dispatch index; assigned when the method is added to a class.
    pub index: usize,
}

impl Method {
    pub fn new(name: Symbol, return_type: Symbol, arg_types: Vec<Symbol>) -> Self {
        Method {
            name,
            return_type,
            arg_types,
            is_variadic: false,
            is_static: false,
            index: 0,
        }
    }

    /// Build a method from textual type names, splitting `args_spec` with
    /// the template-aware splitter so specs like `Map<int,string>` survive.
    pub fn parse(
        interner: &StringInterner,
        name: &str,
        return_type: &str,
        args_spec: &str,
    ) -> Self {
        let arg_types = split_type_list(args_spec)
            .iter()
            .map(|t| interner.intern(t))
            .collect();
        Method::new(
            interner.intern(name),
            interner.intern(return_type),
            arg_types,
        )
    }

    pub fn variadic(mut self) -> Self {
        self.is_variadic = true;
        self
    }

    pub fn static_method(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// `true` when this method could be called with `argc` arguments.
    pub fn accepts_arity(&self, argc: usize) -> bool {
        if self.is_variadic {
            self.arg_types.len().saturating_sub(1) <= argc
        } else {
            self.arg_types.len() == argc
        }
    }

    /// Formal type for actual argument `i`, extending the last formal over
    /// the variadic tail.
    pub fn formal_at(&self, i: usize) -> Option<Symbol> {
        if self.is_variadic && i + 1 >= self.arg_types.len() {
            self.arg_types.last().copied()
        } else {
            self.arg_types.get(i).copied()
        }
    }

    /// Human-readable signature for diagnostics.
    pub fn signature(&self, interner: &StringInterner) -> String {
        let mut s = format!(
            "{} {}(",
            interner.resolve(self.return_type),
            interner.resolve(self.name)
        );
        for (i, arg) in self.arg_types.iter().enumerate() {
            if i > 0 {
                s.push_str(", ");
            }
            s.push_str(&interner.resolve(*arg));
        }
        if self.is_variadic {
            s.push_str(", ...");
        }
        s.push(')');
        s
    }
}

/// A type visible to scripts.
#[derive(Debug)]
pub struct ClassType {
    name: Symbol,
    /// Ancestor chain, root first, `self` last. Every class except `Object`
    /// itself has `Object` at index 0.
    hierarchy: Vec<Symbol>,
    /// Method table in dispatch-index order.
    methods: Vec<Method>,
    /// Indices into `methods`, ordered by name symbol for binary search.
    sorted: Vec<usize>,
    implicit_casts: Vec<Symbol>,
    explicit_casts: Vec<Symbol>,
    /// Template arguments of a container instantiation: `[key, value]` type
    /// name symbols.
    template_args: Vec<Symbol>,
    container_kind: Option<ContainerKind>,
    /// Script-defined struct: member name to type name.
    struct_members: FxHashMap<Symbol, Symbol>,
    /// Script-defined struct: method name to signature.
    struct_scripts: FxHashMap<Symbol, PrototypeId>,
    basic: bool,
    constructible: bool,
    cloneable: bool,
    pseudo_class: bool,
}

impl ClassType {
    pub fn new(interner: &StringInterner, name: &str) -> Self {
        let object = interner.intern("Object");
        let name = interner.intern(name);
        let hierarchy = if name == object {
            vec![object]
        } else {
            vec![object, name]
        };
        ClassType {
            name,
            hierarchy,
            methods: Vec::new(),
            sorted: Vec::new(),
            implicit_casts: Vec::new(),
            explicit_casts: Vec::new(),
            template_args: Vec::new(),
            container_kind: None,
            struct_members: FxHashMap::default(),
            struct_scripts: FxHashMap::default(),
            basic: false,
            constructible: false,
            cloneable: false,
            pseudo_class: false,
        }
    }

    pub fn name(&self) -> Symbol {
        self.name
    }

    pub fn hierarchy(&self) -> &[Symbol] {
        &self.hierarchy
    }

    /// Nearest base class, excluding the implicit `Object` root.
    pub fn base_class(&self) -> Option<Symbol> {
        let n = self.hierarchy.len();
        if n >= 3 {
            Some(self.hierarchy[n - 2])
        } else {
            None
        }
    }

    /// Insert `base` just below `self` in the chain. Call in root-first
    /// order when building a multi-level chain.
    pub fn add_base_class(&mut self, interner: &StringInterner, base: &str) {
        let base = interner.intern(base);
        let at = self.hierarchy.len() - 1;
        self.hierarchy.insert(at, base);
    }

    pub fn is_of_type(&self, name: Symbol) -> bool {
        self.hierarchy.contains(&name)
    }

    pub fn set_basic(&mut self, basic: bool) {
        self.basic = basic;
    }

    pub fn is_basic(&self) -> bool {
        self.basic
    }

    pub fn set_constructible(&mut self, constructible: bool) {
        self.constructible = constructible;
    }

    pub fn is_constructible(&self) -> bool {
        self.constructible
    }

    pub fn set_cloneable(&mut self, cloneable: bool) {
        self.cloneable = cloneable;
    }

    pub fn is_cloneable(&self) -> bool {
        self.cloneable
    }

    pub fn set_pseudo_class(&mut self, pseudo: bool) {
        self.pseudo_class = pseudo;
    }

    /// Script-defined struct type: member and method lookup happens against
    /// script tables, not the method table.
    pub fn is_pseudo_class(&self) -> bool {
        self.pseudo_class
    }

    pub fn set_container_kind(&mut self, kind: ContainerKind) {
        self.container_kind = Some(kind);
    }

    pub fn container_kind(&self) -> Option<ContainerKind> {
        self.container_kind
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self.container_kind,
            Some(ContainerKind::Array | ContainerKind::Map | ContainerKind::Set)
        )
    }

    pub fn set_template_args(&mut self, args: Vec<Symbol>) {
        self.template_args = args;
    }

    /// Key type of a container instantiation (`int` for arrays).
    pub fn key_type(&self) -> Option<Symbol> {
        self.template_args.first().copied()
    }

    /// Value (element) type of a container instantiation.
    pub fn value_type(&self) -> Option<Symbol> {
        self.template_args.last().copied()
    }

    pub fn add_implicit_cast(&mut self, target: Symbol) {
        if !self.implicit_casts.contains(&target) {
            self.implicit_casts.push(target);
        }
    }

    pub fn add_explicit_cast(&mut self, target: Symbol) {
        if !self.explicit_casts.contains(&target) {
            self.explicit_casts.push(target);
        }
    }

    pub(crate) fn implicit_casts(&self) -> &[Symbol] {
        &self.implicit_casts
    }

    pub(crate) fn explicit_casts(&self) -> &[Symbol] {
        &self.explicit_casts
    }

    pub fn struct_member_type(&self, name: Symbol) -> Option<Symbol> {
        self.struct_members.get(&name).copied()
    }

    pub fn add_struct_member(&mut self, name: Symbol, ty: Symbol) {
        self.struct_members.insert(name, ty);
    }

    pub fn struct_script(&self, name: Symbol) -> Option<PrototypeId> {
        self.struct_scripts.get(&name).copied()
    }

    pub fn add_struct_script(&mut self, name: Symbol, proto: PrototypeId) {
        self.struct_scripts.insert(name, proto);
    }

    /// Add a method, replacing an entry with the same name and argument
    /// types in place so its dispatch index is preserved. New methods are
    /// appended at the end of the table.
    pub fn add_method(&mut self, mut method: Method) {
        if let Some(at) = self.find_exact(method.name, &method.arg_types) {
            method.index = at;
            self.methods[at] = method;
            return;
        }
        method.index = self.methods.len();
        self.methods.push(method);
        self.rebuild_sorted();
    }

    /// Dispatch index of the method with this exact name and argument list.
    pub fn find_exact(&self, name: Symbol, arg_types: &[Symbol]) -> Option<usize> {
        self.methods_named(name)
            .find(|m| m.arg_types == arg_types)
            .map(|m| m.index)
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn has_method(&self, name: Symbol) -> bool {
        self.methods_named(name).next().is_some()
    }

    pub fn has_static_method(&self, name: Symbol) -> bool {
        self.methods_named(name).any(|m| m.is_static)
    }

    /// All overloads with `name`, in dispatch-index order.
    pub fn methods_named(&self, name: Symbol) -> impl Iterator<Item = &Method> {
        let lo = self.sorted.partition_point(|&i| self.methods[i].name < name);
        let hi = self.sorted.partition_point(|&i| self.methods[i].name <= name);
        self.sorted[lo..hi].iter().map(move |&i| &self.methods[i])
    }

    /// Overload resolution against already-resolved actual compatibility.
    ///
    /// `compat(formal, actual_index)` answers whether actual argument
    /// `actual_index` is acceptable where `formal` is expected. A
    /// non-variadic overload whose arity matches exactly always wins over a
    /// variadic one.
    pub(crate) fn find_method_with(
        &self,
        name: Symbol,
        argc: usize,
        compat: impl Fn(Symbol, usize) -> bool,
    ) -> Option<&Method> {
        let matches = |m: &Method| {
            (0..argc).all(|i| match m.formal_at(i) {
                Some(formal) => compat(formal, i),
                None => false,
            })
        };
        if let Some(m) = self
            .methods_named(name)
            .find(|m| !m.is_variadic && m.arg_types.len() == argc && matches(m))
        {
            return Some(m);
        }
        self.methods_named(name)
            .find(|m| m.is_variadic && m.accepts_arity(argc) && matches(m))
    }

    fn rebuild_sorted(&mut self) {
        self.sorted = (0..self.methods.len()).collect();
        let methods = &self.methods;
        self.sorted
            .sort_by_key(|&i| (methods[i].name, methods[i].index));
    }

    /// Merge `parent`'s method table below this class's own methods so
    /// dispatch indices line up across the hierarchy. The class's own
    /// declarations override matching parent entries in place; everything
    /// else is appended after the inherited block.
    pub(crate) fn merge_parent_table(&mut self, parent: &ClassType) {
        let own = std::mem::take(&mut self.methods);
        self.methods = parent.methods.clone();
        for mut m in own {
            if let Some(at) = self
                .methods
                .iter()
                .position(|p| p.name == m.name && p.arg_types == m.arg_types)
            {
                m.index = at;
                self.methods[at] = m;
            } else {
                m.index = self.methods.len();
                self.methods.push(m);
            }
        }
        self.rebuild_sorted();
    }
}
