//! Process-wide string interning service.
//!
//! Every name comparison in the type registry and the compiler goes through
//! interned [`Symbol`]s so that lookups are integer compares. The service is
//! shared between the registry, the compiler and (eventually) the executor,
//! so the public handle is cheaply cloneable and internally synchronized.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

/// An interned string id.
///
/// Symbols are 4 bytes, `Copy`, and compare in O(1). The raw value doubles
/// as the name operand in emitted bytecode (global variable and script call
/// instructions), which is why it is exposed through [`Symbol::as_u32`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(NonZeroU32);

impl Symbol {
    fn from_index(index: usize) -> Self {
        // Offset by one so index 0 stays representable in NonZeroU32.
        Symbol(NonZeroU32::new(index as u32 + 1).expect("interner overflow"))
    }

    fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    /// Raw id, stable for the lifetime of the interner.
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

#[derive(Default)]
struct Interner {
    map: FxHashMap<String, Symbol>,
    strings: Vec<String>,
}

impl Interner {
    fn intern(&mut self, text: &str) -> Symbol {
        if let Some(&sym) = self.map.get(text) {
            return sym;
        }
        let sym = Symbol::from_index(self.strings.len());
        self.strings.push(text.to_string());
        self.map.insert(text.to_string(), sym);
        sym
    }

    fn get(&self, text: &str) -> Option<Symbol> {
        self.map.get(text).copied()
    }

    fn resolve(&self, sym: Symbol) -> &str {
        &self.strings[sym.index()]
    }
}

/// Shared handle to the interning service.
///
/// Reads vastly outnumber writes once scenario loading has finished, so a
/// read-write lock is sufficient; `resolve` returns an owned `String` to keep
/// lock scopes minimal.
#[derive(Clone, Default)]
pub struct StringInterner {
    inner: Arc<RwLock<Interner>>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `text`, returning the existing symbol if already present.
    pub fn intern(&self, text: &str) -> Symbol {
        self.inner.write().intern(text)
    }

    /// Look up an already-interned string without inserting.
    pub fn get(&self, text: &str) -> Option<Symbol> {
        self.inner.read().get(text)
    }

    /// Resolve a symbol back to its text.
    ///
    /// # Panics
    ///
    /// Panics if `sym` did not come from this interner.
    pub fn resolve(&self, sym: Symbol) -> String {
        self.inner.read().resolve(sym).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_deduplicates() {
        let interner = StringInterner::new();
        let a = interner.intern("Platform");
        let b = interner.intern("Sensor");
        let c = interner.intern("Platform");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(interner.resolve(a), "Platform");
    }

    #[test]
    fn get_does_not_insert() {
        let interner = StringInterner::new();
        assert!(interner.get("missing").is_none());
        let sym = interner.intern("present");
        assert_eq!(interner.get("present"), Some(sym));
    }

    #[test]
    fn handles_share_state() {
        let interner = StringInterner::new();
        let clone = interner.clone();
        let sym = interner.intern("shared");
        assert_eq!(clone.get("shared"), Some(sym));
    }
}
