//! The type registry.
//!
//! All classes a compilation can see live in one [`TypeRegistry`], passed
//! around as an explicit handle. The registry is write-heavy while the host
//! application registers its classes, then read-mostly during compilation;
//! the inner state sits behind a `parking_lot::RwLock` and classes are
//! handed out as `Arc<ClassType>` so identity is pointer identity.
//!
//! Container classes (`Array<T>`, `Map<K,V>`, `Set<T>` and their iterator
//! types) are instantiated on first reference and cached under their
//! space-stripped specification string: every mention of `Map<string,int>`
//! yields the same instance.

pub mod basic;
pub mod class;
pub mod prototype;
pub mod template;

pub use class::{ClassType, ContainerKind, Method};
pub use prototype::{Prototype, PrototypeId};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::interner::{StringInterner, Symbol};
use template::{parse_template_spec, strip_spaces};

/// Shared class handle.
pub type ClassRef = Arc<ClassType>;

/// Errors raised while building or validating the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("class '{0}' is already registered")]
    DuplicateClass(String),
    #[error("unknown class '{0}'")]
    UnknownClass(String),
    #[error("'{0}' is not a valid container specification")]
    BadTemplate(String),
    #[error("class '{0}' is in use; methods can no longer be added")]
    FrozenClass(String),
    #[error(
        "dispatch index mismatch in '{class}': '{method}' is at slot {actual}, \
         inherited slot is {expected}"
    )]
    DispatchMismatch {
        class: String,
        method: String,
        expected: usize,
        actual: usize,
    },
    #[error("class '{class}' is missing inherited method '{method}'")]
    MissingOverride { class: String, method: String },
}

#[derive(Default)]
struct Inner {
    classes: Vec<ClassRef>,
    by_name: FxHashMap<Symbol, usize>,
    prototypes: Vec<Arc<Prototype>>,
    proto_ids: FxHashMap<Prototype, PrototypeId>,
}

pub struct TypeRegistry {
    inner: RwLock<Inner>,
    interner: StringInterner,
    var_sym: Symbol,
    null_sym: Symbol,
}

impl TypeRegistry {
    pub fn new(interner: StringInterner) -> Self {
        let var_sym = interner.intern("Var");
        let null_sym = interner.intern("null");
        TypeRegistry {
            inner: RwLock::new(Inner::default()),
            interner,
            var_sym,
            null_sym,
        }
    }

    /// A registry pre-populated with the basic classes every compilation
    /// needs (`Object`, `Var`, `null`, `void`, the value types and the
    /// container bases).
    pub fn with_basic_types(interner: StringInterner) -> Result<Self, RegistryError> {
        let registry = TypeRegistry::new(interner);
        basic::install_basic_types(&registry)?;
        Ok(registry)
    }

    pub fn interner(&self) -> &StringInterner {
        &self.interner
    }

    /// Register a fully built class.
    ///
    /// If the class declares a base, the base's method table is merged in
    /// below the class's own methods so dispatch indices line up; the base
    /// must already be registered.
    pub fn register_class(&self, mut class: ClassType) -> Result<ClassRef, RegistryError> {
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(&class.name()) {
            return Err(RegistryError::DuplicateClass(
                self.interner.resolve(class.name()),
            ));
        }
        if let Some(base) = class.base_class() {
            let parent = inner
                .by_name
                .get(&base)
                .map(|&i| inner.classes[i].clone())
                .ok_or_else(|| RegistryError::UnknownClass(self.interner.resolve(base)))?;
            class.merge_parent_table(&parent);
        }
        let idx = inner.classes.len();
        let handle = Arc::new(class);
        inner.by_name.insert(handle.name(), idx);
        inner.classes.push(handle.clone());
        log::debug!(
            "registered class '{}' ({} methods)",
            self.interner.resolve(handle.name()),
            handle.methods().len()
        );
        Ok(handle)
    }

    /// Add (or replace in place) a method on an already registered class
    /// and on every registered subclass, keeping dispatch indices aligned.
    ///
    /// Load-phase only: fails with [`RegistryError::FrozenClass`] once
    /// outside handles to the class exist.
    pub fn add_method(&self, class_name: &str, method: Method) -> Result<(), RegistryError> {
        let sym = self
            .interner
            .get(class_name)
            .ok_or_else(|| RegistryError::UnknownClass(class_name.to_string()))?;
        let mut inner = self.inner.write();
        if !inner.by_name.contains_key(&sym) {
            return Err(RegistryError::UnknownClass(class_name.to_string()));
        }
        for i in 0..inner.classes.len() {
            if !inner.classes[i].is_of_type(sym) || inner.classes[i].is_pseudo_class() {
                continue;
            }
            let class = Arc::get_mut(&mut inner.classes[i])
                .ok_or_else(|| RegistryError::FrozenClass(class_name.to_string()))?;
            class.add_method(method.clone());
        }
        Ok(())
    }

    pub fn get_class(&self, name: &str) -> Option<ClassRef> {
        let sym = self.interner.get(&strip_spaces(name))?;
        self.get_class_sym(sym)
    }

    pub fn get_class_sym(&self, sym: Symbol) -> Option<ClassRef> {
        let inner = self.inner.read();
        inner.by_name.get(&sym).map(|&i| inner.classes[i].clone())
    }

    /// Resolve a type name, instantiating container specifications on the
    /// fly. `None` for names that are neither registered classes nor valid
    /// container specs over registered element types.
    pub fn lookup_type(&self, name: &str) -> Option<ClassRef> {
        if name.contains('<') {
            self.get_or_create_container(name).ok()
        } else {
            self.get_class(name)
        }
    }

    /// Instantiate (or fetch the cached) container class for `spec`.
    pub fn get_or_create_container(&self, spec: &str) -> Result<ClassRef, RegistryError> {
        let spec = strip_spaces(spec);
        let mut inner = self.inner.write();
        let idx = self.create_container_locked(&mut inner, &spec)?;
        Ok(inner.classes[idx].clone())
    }

    fn create_container_locked(
        &self,
        inner: &mut Inner,
        spec: &str,
    ) -> Result<usize, RegistryError> {
        let spec_sym = self.interner.intern(spec);
        if let Some(&idx) = inner.by_name.get(&spec_sym) {
            return Ok(idx);
        }
        let (base, args) = parse_template_spec(spec)
            .ok_or_else(|| RegistryError::BadTemplate(spec.to_string()))?;
        let expected_args = match base.as_str() {
            "Array" | "Set" | "ArrayIterator" | "SetIterator" => 1,
            "Map" | "MapIterator" => 2,
            _ => return Err(RegistryError::BadTemplate(spec.to_string())),
        };
        if args.len() != expected_args {
            return Err(RegistryError::BadTemplate(spec.to_string()));
        }
        // Element types must resolve; nested specs instantiate recursively.
        for arg in &args {
            let known = self
                .interner
                .get(arg)
                .map_or(false, |s| inner.by_name.contains_key(&s));
            if !known {
                if arg.contains('<') {
                    self.create_container_locked(inner, arg)?;
                } else {
                    return Err(RegistryError::UnknownClass(arg.clone()));
                }
            }
        }
        let interner = &self.interner;
        let arg_syms: Vec<Symbol> = args.iter().map(|a| interner.intern(a)).collect();
        let int_sym = interner.intern("int");

        let mut class = ClassType::new(interner, spec);
        class.add_base_class(interner, &base);
        let mut iterator_spec = None;
        match base.as_str() {
            "Array" => {
                let t = &args[0];
                class.set_container_kind(ContainerKind::Array);
                class.set_template_args(vec![int_sym, arg_syms[0]]);
                class.set_constructible(true);
                class.set_cloneable(true);
                class.add_method(Method::parse(interner, "Get", t, "int"));
                class.add_method(Method::parse(
                    interner,
                    "Set",
                    "void",
                    &format!("int,{t}"),
                ));
                class.add_method(Method::parse(interner, "PushBack", "void", t));
                class.add_method(Method::parse(interner, "Size", "int", ""));
                iterator_spec = Some(format!("ArrayIterator<{t}>"));
            }
            "Map" => {
                let (k, v) = (&args[0], &args[1]);
                class.set_container_kind(ContainerKind::Map);
                class.set_template_args(arg_syms.clone());
                class.set_constructible(true);
                class.set_cloneable(true);
                class.add_method(Method::parse(interner, "Get", v, k));
                class.add_method(Method::parse(
                    interner,
                    "Set",
                    "void",
                    &format!("{k},{v}"),
                ));
                class.add_method(Method::parse(interner, "Size", "int", ""));
                iterator_spec = Some(format!("MapIterator<{k},{v}>"));
            }
            "Set" => {
                let t = &args[0];
                class.set_container_kind(ContainerKind::Set);
                class.set_template_args(vec![arg_syms[0], arg_syms[0]]);
                class.set_constructible(true);
                class.set_cloneable(true);
                class.add_method(Method::parse(interner, "Insert", "void", t));
                class.add_method(Method::parse(interner, "Size", "int", ""));
                iterator_spec = Some(format!("SetIterator<{t}>"));
            }
            "ArrayIterator" => {
                let t = &args[0];
                class.set_container_kind(ContainerKind::Iterator);
                class.set_template_args(vec![int_sym, arg_syms[0]]);
                class.add_method(Method::parse(interner, "HasNext", "bool", ""));
                class.add_method(Method::parse(interner, "Next", t, ""));
                class.add_method(Method::parse(interner, "Key", "int", ""));
            }
            "MapIterator" => {
                let (k, v) = (&args[0], &args[1]);
                class.set_container_kind(ContainerKind::Iterator);
                class.set_template_args(arg_syms.clone());
                class.add_method(Method::parse(interner, "HasNext", "bool", ""));
                class.add_method(Method::parse(interner, "Next", v, ""));
                class.add_method(Method::parse(interner, "Key", k, ""));
            }
            "SetIterator" => {
                let t = &args[0];
                class.set_container_kind(ContainerKind::Iterator);
                class.set_template_args(vec![arg_syms[0], arg_syms[0]]);
                class.add_method(Method::parse(interner, "HasNext", "bool", ""));
                class.add_method(Method::parse(interner, "Next", t, ""));
                class.add_method(Method::parse(interner, "Key", t, ""));
            }
            _ => unreachable!(),
        }
        if let Some(iter_spec) = iterator_spec {
            let iter_sym = interner.intern("GetIterator");
            class.add_method(Method::new(
                iter_sym,
                interner.intern(&iter_spec),
                Vec::new(),
            ));
            self.create_container_locked(inner, &iter_spec)?;
        }

        let idx = inner.classes.len();
        inner.by_name.insert(spec_sym, idx);
        inner.classes.push(Arc::new(class));
        log::debug!("instantiated container class '{spec}'");
        Ok(idx)
    }

    /// Register a script-defined struct type.
    ///
    /// `members` is `(type_name, member_name)` pairs; `scripts` maps method
    /// names to their signatures.
    pub fn register_struct(
        &self,
        name: &str,
        members: &[(&str, &str)],
        scripts: &[(&str, Prototype)],
    ) -> Result<ClassRef, RegistryError> {
        let mut class = ClassType::new(&self.interner, name);
        class.set_pseudo_class(true);
        class.set_constructible(true);
        class.set_cloneable(true);
        for (ty, member) in members {
            class.add_struct_member(self.interner.intern(member), self.interner.intern(ty));
        }
        for (script, proto) in scripts {
            let id = self.add_prototype(proto.clone());
            class.add_struct_script(self.interner.intern(script), id);
        }
        self.register_class(class)
    }

    /// Intern a script signature.
    pub fn add_prototype(&self, proto: Prototype) -> PrototypeId {
        let mut inner = self.inner.write();
        if let Some(&id) = inner.proto_ids.get(&proto) {
            return id;
        }
        let id = PrototypeId(inner.prototypes.len() as u32);
        inner.proto_ids.insert(proto.clone(), id);
        inner.prototypes.push(Arc::new(proto));
        id
    }

    pub fn prototype(&self, id: PrototypeId) -> Arc<Prototype> {
        self.inner.read().prototypes[id.0 as usize].clone()
    }

    /// Validate dispatch-index parity across every registered hierarchy.
    ///
    /// Call once after the load phase. A subclass must carry every method
    /// its ancestors carry, at the same table slot; anything else is a
    /// registration error.
    pub fn initialize(&self) -> Result<(), RegistryError> {
        let inner = self.inner.read();
        for class in &inner.classes {
            if class.is_pseudo_class() {
                continue;
            }
            let Some(base) = class.base_class() else {
                continue;
            };
            let Some(&pidx) = inner.by_name.get(&base) else {
                return Err(RegistryError::UnknownClass(self.interner.resolve(base)));
            };
            let parent = &inner.classes[pidx];
            for pm in parent.methods() {
                match class.find_exact(pm.name, &pm.arg_types) {
                    Some(at) if at == pm.index => {}
                    Some(at) => {
                        return Err(RegistryError::DispatchMismatch {
                            class: self.interner.resolve(class.name()),
                            method: self.interner.resolve(pm.name),
                            expected: pm.index,
                            actual: at,
                        })
                    }
                    None => {
                        return Err(RegistryError::MissingOverride {
                            class: self.interner.resolve(class.name()),
                            method: self.interner.resolve(pm.name),
                        })
                    }
                }
            }
        }
        log::debug!("type registry validated: {} classes", inner.classes.len());
        Ok(())
    }

    /// Resolve the best overload of `class.name` for the given actual
    /// argument types. `None` entries in `actuals` (error-recovery values)
    /// are treated as compatible with anything.
    pub fn find_method(
        &self,
        class: &ClassType,
        name: Symbol,
        actuals: &[Option<ClassRef>],
    ) -> Option<Method> {
        let inner = self.inner.read();
        class
            .find_method_with(name, actuals.len(), |formal, i| match &actuals[i] {
                None => true,
                Some(actual) => self.is_compatible_locked(&inner, formal, actual),
            })
            .cloned()
    }

    /// Whether a value of class `actual` is acceptable where type name
    /// `formal` is expected (hierarchy, Var in either direction, null vs
    /// reference types, or a registered implicit cast).
    pub fn is_compatible(&self, formal: Symbol, actual: &ClassType) -> bool {
        self.is_compatible_locked(&self.inner.read(), formal, actual)
    }

    fn is_compatible_locked(&self, inner: &Inner, formal: Symbol, actual: &ClassType) -> bool {
        if formal == self.var_sym || actual.name() == self.var_sym {
            return true;
        }
        if actual.is_of_type(formal) {
            return true;
        }
        if let Some(&fidx) = inner.by_name.get(&formal) {
            let f = &inner.classes[fidx];
            if f.name() == self.null_sym {
                return !actual.is_basic();
            }
            if actual.name() == self.null_sym {
                return !f.is_basic();
            }
        } else if actual.name() == self.null_sym {
            // Unresolved formal names only arise for container specs, which
            // are always reference types.
            return true;
        }
        actual.implicit_casts().contains(&formal)
    }

    /// Signatures of every overload of `name` on `class`, for diagnostics.
    pub fn method_candidates(&self, class: &ClassType, name: Symbol) -> Vec<String> {
        class
            .methods_named(name)
            .map(|m| m.signature(&self.interner))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn class_count(&self) -> usize {
        self.inner.read().classes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::with_basic_types(StringInterner::new()).unwrap()
    }

    #[test]
    fn class_handles_are_shared_instances() {
        let reg = registry();
        let a = reg.get_class("int").unwrap();
        let b = reg.get_class("int").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn container_instances_are_cached() {
        let reg = registry();
        let a = reg.get_or_create_container("Map<string, int>").unwrap();
        let b = reg.get_or_create_container("Map<string,int>").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.container_kind(), Some(ContainerKind::Map));
    }

    #[test]
    fn nested_container_specs_resolve() {
        let reg = registry();
        let c = reg.get_or_create_container("Array<Map<int,string>>").unwrap();
        let value = c.value_type().unwrap();
        assert_eq!(reg.interner().resolve(value), "Map<int,string>");
        assert!(reg.get_class("Map<int,string>").is_some());
    }

    #[test]
    fn container_over_unknown_element_fails() {
        let reg = registry();
        let err = reg.get_or_create_container("Array<Missing>").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownClass(_)));
    }

    #[test]
    fn duplicate_registration_fails() {
        let reg = registry();
        let class = ClassType::new(reg.interner(), "Track");
        reg.register_class(class).unwrap();
        let class = ClassType::new(reg.interner(), "Track");
        assert!(matches!(
            reg.register_class(class),
            Err(RegistryError::DuplicateClass(_))
        ));
    }

    #[test]
    fn subclass_inherits_dispatch_indices() {
        let reg = registry();
        let interner = reg.interner().clone();
        let mut base = ClassType::new(&interner, "Sensor");
        base.add_method(Method::parse(&interner, "TurnOn", "void", ""));
        base.add_method(Method::parse(&interner, "Range", "double", ""));
        reg.register_class(base).unwrap();

        let mut child = ClassType::new(&interner, "Radar");
        child.add_base_class(&interner, "Sensor");
        // Override plus an addition; inherited slots must be preserved.
        child.add_method(Method::parse(&interner, "Range", "double", ""));
        child.add_method(Method::parse(&interner, "Frequency", "double", ""));
        let child = reg.register_class(child).unwrap();

        let turn_on = interner.intern("TurnOn");
        let range = interner.intern("Range");
        let freq = interner.intern("Frequency");
        assert_eq!(child.find_exact(turn_on, &[]), Some(0));
        assert_eq!(child.find_exact(range, &[]), Some(1));
        assert_eq!(child.find_exact(freq, &[]), Some(2));
        reg.initialize().unwrap();
    }

    #[test]
    fn late_base_method_breaks_parity() {
        let reg = registry();
        let interner = reg.interner().clone();
        let mut base = ClassType::new(&interner, "Mover");
        base.add_method(Method::parse(&interner, "Go", "void", ""));
        reg.register_class(base).unwrap();

        let mut child = ClassType::new(&interner, "AirMover");
        child.add_base_class(&interner, "Mover");
        child.add_method(Method::parse(&interner, "Climb", "void", "double"));
        reg.register_class(child).unwrap();

        // Retrofit on the base only: the subclass never sees it.
        {
            let mut inner = reg.inner.write();
            let sym = interner.get("Mover").unwrap();
            let idx = *inner.by_name.get(&sym).unwrap();
            let class = Arc::get_mut(&mut inner.classes[idx]).unwrap();
            class.add_method(Method::parse(&interner, "Stop", "void", ""));
        }
        assert!(matches!(
            reg.initialize(),
            Err(RegistryError::MissingOverride { .. })
        ));
    }

    #[test]
    fn add_method_propagates_to_subclasses() {
        let reg = registry();
        let interner = reg.interner().clone();
        let mut base = ClassType::new(&interner, "Processor");
        base.add_method(Method::parse(&interner, "Update", "void", ""));
        reg.register_class(base).unwrap();

        let mut child = ClassType::new(&interner, "TrackProcessor");
        child.add_base_class(&interner, "Processor");
        reg.register_class(child).unwrap();

        reg.add_method(
            "Processor",
            Method::parse(&interner, "Reset", "void", ""),
        )
        .unwrap();
        reg.initialize().unwrap();

        let child = reg.get_class("TrackProcessor").unwrap();
        assert_eq!(child.find_exact(interner.intern("Reset"), &[]), Some(1));
    }

    #[test]
    fn exact_arity_beats_variadic() {
        let reg = registry();
        let interner = reg.interner().clone();
        let mut class = ClassType::new(&interner, "Logger");
        class.add_method(Method::parse(&interner, "Write", "void", "string"));
        class.add_method(Method::parse(&interner, "Write", "void", "string,Object").variadic());
        let class = reg.register_class(class).unwrap();

        let write = interner.intern("Write");
        let string_ty = reg.get_class("string");
        let m = reg.find_method(&class, write, &[string_ty.clone()]).unwrap();
        assert!(!m.is_variadic);

        let int_ty = reg.get_class("int");
        let m = reg
            .find_method(&class, write, &[string_ty, int_ty])
            .unwrap();
        assert!(m.is_variadic);
    }

    #[test]
    fn compatibility_covers_null_and_var() {
        let reg = registry();
        let interner = reg.interner();
        let track = reg
            .register_class(ClassType::new(interner, "Track"))
            .unwrap();
        let null = reg.get_class("null").unwrap();
        let int_ty = reg.get_class("int").unwrap();

        assert!(reg.is_compatible(track.name(), &null));
        assert!(!reg.is_compatible(int_ty.name(), &null));
        assert!(reg.is_compatible(interner.intern("Var"), &track));
        // int promotes to double, never the reverse.
        let double_sym = interner.intern("double");
        assert!(reg.is_compatible(double_sym, &int_ty));
        let double_ty = reg.get_class("double").unwrap();
        assert!(!reg.is_compatible(int_ty.name(), &double_ty));
    }
}
