//! Script function signatures.
//!
//! Prototypes are interned by the [`TypeRegistry`](super::TypeRegistry) so a
//! signature is a single [`PrototypeId`] word everywhere else: in script
//! registration, in struct-script tables and in compiled units.

use crate::interner::Symbol;

/// A script function signature: return type name plus argument type names.
///
/// Types are stored by name symbol, not by class handle, so prototypes can
/// be interned before every referenced class exists (container classes in
/// particular are created on first reference).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Prototype {
    pub return_type: Symbol,
    pub args: Vec<Symbol>,
}

impl Prototype {
    pub fn new(return_type: Symbol, args: Vec<Symbol>) -> Self {
        Prototype { return_type, args }
    }
}

/// Handle to an interned [`Prototype`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrototypeId(pub(crate) u32);

impl PrototypeId {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}
