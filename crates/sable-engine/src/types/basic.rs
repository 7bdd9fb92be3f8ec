//! Bootstrap classes: the types every compilation depends on.
//!
//! Installs `Object`, `Var`, `null`, `void`, the four basic value types with
//! their cast sets, and the container base classes that anchor template
//! instantiation. [`CoreTypes`] is the compiler's cached handle bundle so
//! hot paths never go back through the registry for these.

use std::sync::Arc;

use crate::interner::Symbol;
use crate::types::{ClassRef, ClassType, ContainerKind, RegistryError, TypeRegistry};

/// Register the bootstrap classes into `registry`.
///
/// Numeric implicit casts only widen (`bool` -> `int` -> `double`); the
/// narrowing directions and every conversion to `string` are explicit-only.
pub fn install_basic_types(registry: &TypeRegistry) -> Result<(), RegistryError> {
    let interner = registry.interner().clone();
    let sym = |s: &str| interner.intern(s);

    registry.register_class(ClassType::new(&interner, "Object"))?;
    registry.register_class(ClassType::new(&interner, "Var"))?;
    registry.register_class(ClassType::new(&interner, "null"))?;
    registry.register_class(ClassType::new(&interner, "void"))?;

    let mut bool_ty = ClassType::new(&interner, "bool");
    bool_ty.set_basic(true);
    bool_ty.set_cloneable(true);
    bool_ty.add_implicit_cast(sym("int"));
    bool_ty.add_implicit_cast(sym("double"));
    for t in ["int", "double", "string"] {
        bool_ty.add_explicit_cast(sym(t));
    }
    registry.register_class(bool_ty)?;

    let mut int_ty = ClassType::new(&interner, "int");
    int_ty.set_basic(true);
    int_ty.set_cloneable(true);
    int_ty.add_implicit_cast(sym("double"));
    for t in ["bool", "double", "string"] {
        int_ty.add_explicit_cast(sym(t));
    }
    registry.register_class(int_ty)?;

    let mut double_ty = ClassType::new(&interner, "double");
    double_ty.set_basic(true);
    double_ty.set_cloneable(true);
    for t in ["bool", "int", "string"] {
        double_ty.add_explicit_cast(sym(t));
    }
    registry.register_class(double_ty)?;

    let mut string_ty = ClassType::new(&interner, "string");
    string_ty.set_basic(true);
    string_ty.set_cloneable(true);
    for t in ["bool", "int", "double"] {
        string_ty.add_explicit_cast(sym(t));
    }
    registry.register_class(string_ty)?;

    // Container bases anchor template instantiation; the bases themselves
    // carry no element types and are not directly usable.
    for (name, kind) in [
        ("Array", ContainerKind::Array),
        ("Map", ContainerKind::Map),
        ("Set", ContainerKind::Set),
        ("ArrayIterator", ContainerKind::Iterator),
        ("MapIterator", ContainerKind::Iterator),
        ("SetIterator", ContainerKind::Iterator),
    ] {
        let mut base = ClassType::new(&interner, name);
        base.set_container_kind(kind);
        registry.register_class(base)?;
    }
    Ok(())
}

/// Interned names of the container element protocol.
#[derive(Debug, Clone, Copy)]
pub struct ProtocolNames {
    pub get: Symbol,
    pub set: Symbol,
    pub insert: Symbol,
    pub push_back: Symbol,
    pub size: Symbol,
    pub get_iterator: Symbol,
    pub has_next: Symbol,
    pub next: Symbol,
    pub key: Symbol,
}

/// Cached handles to the bootstrap classes.
#[derive(Clone)]
pub struct CoreTypes {
    pub object: ClassRef,
    pub var: ClassRef,
    pub null: ClassRef,
    pub void: ClassRef,
    pub bool_: ClassRef,
    pub int: ClassRef,
    pub double: ClassRef,
    pub string: ClassRef,
    pub names: ProtocolNames,
}

impl CoreTypes {
    pub fn from_registry(registry: &TypeRegistry) -> Result<Self, RegistryError> {
        let class = |name: &str| {
            registry
                .get_class(name)
                .ok_or_else(|| RegistryError::UnknownClass(name.to_string()))
        };
        let interner = registry.interner();
        Ok(CoreTypes {
            object: class("Object")?,
            var: class("Var")?,
            null: class("null")?,
            void: class("void")?,
            bool_: class("bool")?,
            int: class("int")?,
            double: class("double")?,
            string: class("string")?,
            names: ProtocolNames {
                get: interner.intern("Get"),
                set: interner.intern("Set"),
                insert: interner.intern("Insert"),
                push_back: interner.intern("PushBack"),
                size: interner.intern("Size"),
                get_iterator: interner.intern("GetIterator"),
                has_next: interner.intern("HasNext"),
                next: interner.intern("Next"),
                key: interner.intern("Key"),
            },
        })
    }

    /// Dynamically typed? (`Var` casts both ways without instructions.)
    pub fn is_var(&self, class: &ClassRef) -> bool {
        Arc::ptr_eq(class, &self.var)
    }

    pub fn is_null(&self, class: &ClassRef) -> bool {
        Arc::ptr_eq(class, &self.null)
    }

    pub fn is_void(&self, class: &ClassRef) -> bool {
        Arc::ptr_eq(class, &self.void)
    }

    pub fn is_numeric(&self, class: &ClassRef) -> bool {
        Arc::ptr_eq(class, &self.bool_)
            || Arc::ptr_eq(class, &self.int)
            || Arc::ptr_eq(class, &self.double)
    }

    pub fn is_string(&self, class: &ClassRef) -> bool {
        Arc::ptr_eq(class, &self.string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interner::StringInterner;

    #[test]
    fn bootstrap_installs_and_resolves() {
        let reg = TypeRegistry::with_basic_types(StringInterner::new()).unwrap();
        let core = CoreTypes::from_registry(&reg).unwrap();
        assert!(core.int.is_basic());
        assert!(!core.object.is_basic());
        assert!(core.is_numeric(&core.bool_));
        assert!(!core.is_numeric(&core.string));
    }

    #[test]
    fn numeric_casts_only_widen_implicitly() {
        let reg = TypeRegistry::with_basic_types(StringInterner::new()).unwrap();
        let interner = reg.interner();
        let int_ty = reg.get_class("int").unwrap();
        let double_ty = reg.get_class("double").unwrap();
        assert!(int_ty.implicit_casts().contains(&interner.intern("double")));
        assert!(!double_ty.implicit_casts().contains(&interner.intern("int")));
        assert!(double_ty.explicit_casts().contains(&interner.intern("int")));
    }

    #[test]
    fn string_conversions_are_explicit_only() {
        let reg = TypeRegistry::with_basic_types(StringInterner::new()).unwrap();
        let interner = reg.interner();
        let string_sym = interner.intern("string");
        for name in ["bool", "int", "double"] {
            let ty = reg.get_class(name).unwrap();
            assert!(!ty.implicit_casts().contains(&string_sym), "{name}");
            assert!(ty.explicit_casts().contains(&string_sym), "{name}");
        }
    }
}
