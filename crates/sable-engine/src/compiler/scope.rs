//! Lexical scopes, the stack-slot allocator, and statement-bounded
//! temporaries.
//!
//! Slot allocation is a free list: released slots are reused before the
//! high-water mark grows, so a function's frame stays as small as its
//! deepest live set. Temporaries are tracked in two stacks segmented by
//! statement-id boundary markers; releasing a value mid-statement erases it
//! in place (a shift would invalidate the boundary structure), and closing
//! a statement sweeps its segment back onto the free list.

use rustc_hash::FxHashMap;

use crate::bytecode::MAX_STACK_INDEX;
use crate::compiler::emit::LabelId;
use crate::compiler::value::Val;
use crate::interner::Symbol;
use crate::types::{ClassRef, PrototypeId};

/// What kind of construct a scope belongs to; loops are break/continue
/// targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Normal,
    While,
    DoWhile,
    For,
    ForEach,
    /// The function body itself.
    Function,
}

impl BlockKind {
    pub fn is_loop(self) -> bool {
        matches!(
            self,
            BlockKind::While | BlockKind::DoWhile | BlockKind::For | BlockKind::ForEach
        )
    }
}

/// Pending debug record for a variable declared in a scope.
#[derive(Debug, Clone)]
pub(crate) struct VarRecord {
    pub name: Symbol,
    pub type_name: Symbol,
    /// Stack slot, or `-(static_index) - 1` for statics.
    pub slot: i64,
    pub valid_after: u32,
}

/// One lexical scope.
#[derive(Debug)]
pub(crate) struct Scope {
    pub kind: BlockKind,
    pub symbols: FxHashMap<Symbol, Val>,
    /// Stack slots owned by variables declared here; released at close.
    pub locals: Vec<u32>,
    pub var_records: Vec<VarRecord>,
    /// Break target for loops.
    pub exit_label: Option<LabelId>,
    /// Continue target for loops.
    pub continue_label: Option<LabelId>,
    /// Code offset of the loop top (condition re-entry for while/for).
    pub loop_top: u32,
    /// For-loop: jump from the condition into the body, emitted over the
    /// increment section.
    pub body_label: Option<LabelId>,
    /// No instruction emitted in this scope yet.
    pub empty: bool,
    /// Every path through the code emitted so far ends in a return.
    pub all_paths_return: bool,
    /// The instruction just emitted was a return.
    pub has_returned: bool,
    /// This scope directly contains an if whose branches are being built.
    pub if_parent: bool,
    /// This scope is an if/else branch of its parent.
    pub if_block: bool,
}

impl Scope {
    pub fn new(kind: BlockKind) -> Self {
        Scope {
            kind,
            symbols: FxHashMap::default(),
            locals: Vec::new(),
            var_records: Vec::new(),
            exit_label: None,
            continue_label: None,
            loop_top: 0,
            body_label: None,
            empty: true,
            all_paths_return: false,
            has_returned: false,
            if_parent: false,
            if_block: false,
        }
    }
}

/// Temp-stack entry. Boundaries carry the statement id they open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TempEntry {
    Slot(u32),
    Erased,
    Boundary(u32),
}

/// Per-function allocation state.
#[derive(Debug, Default)]
pub(crate) struct Frame {
    next_slot: u32,
    next_static: u32,
    free_slots: Vec<u32>,
    /// Temporaries owned by the current statement.
    cur_temps: Vec<TempEntry>,
    /// Slots that outlive the current statement (declarations, materialized
    /// null references); promoted outward when the statement closes.
    parent_temps: Vec<TempEntry>,
    next_stat_id: u32,
}

impl Frame {
    pub fn new() -> Self {
        Frame::default()
    }

    /// Highest slot count reached; the unit's frame size.
    pub fn stack_size(&self) -> u32 {
        self.next_slot
    }

    pub fn static_count(&self) -> u32 {
        self.next_static
    }

    /// Allocate a slot, reusing a released one when available.
    pub fn alloc_slot(&mut self, temp: bool) -> u32 {
        let slot = self.free_slots.pop().unwrap_or_else(|| {
            let s = self.next_slot;
            self.next_slot += 1;
            s
        });
        assert!(
            self.next_slot < MAX_STACK_INDEX,
            "function frame exceeded {MAX_STACK_INDEX} stack slots"
        );
        if temp {
            self.cur_temps.push(TempEntry::Slot(slot));
        } else {
            self.parent_temps.push(TempEntry::Slot(slot));
        }
        slot
    }

    pub fn alloc_static(&mut self) -> u32 {
        let idx = self.next_static;
        self.next_static += 1;
        idx
    }

    /// Open a statement: pushes a boundary onto both temp stacks.
    pub fn begin_stat(&mut self) -> u32 {
        let id = self.next_stat_id;
        self.next_stat_id += 1;
        self.cur_temps.push(TempEntry::Boundary(id));
        self.parent_temps.push(TempEntry::Boundary(id));
        id
    }

    /// Close statement `id`.
    ///
    /// Sweeps the current-statement segment onto the free list (closing any
    /// statements left open inside on the way down) and promotes the
    /// parent-lifetime segment into the enclosing statement.
    pub fn end_stat(&mut self, id: u32) {
        while let Some(entry) = self.cur_temps.pop() {
            match entry {
                TempEntry::Slot(slot) => self.free_slots.push(slot),
                TempEntry::Erased => {}
                TempEntry::Boundary(b) if b == id => break,
                TempEntry::Boundary(_) => {}
            }
        }
        while let Some(entry) = self.parent_temps.pop() {
            match entry {
                TempEntry::Slot(slot) => self.cur_temps.push(TempEntry::Slot(slot)),
                TempEntry::Erased => {}
                TempEntry::Boundary(b) if b == id => break,
                TempEntry::Boundary(_) => {}
            }
        }
    }

    /// Release a temporary slot mid-statement: erase it in place within the
    /// current statement's segment and return it to the free list.
    pub fn free_temp(&mut self, slot: u32) {
        for entry in self.cur_temps.iter_mut().rev() {
            match *entry {
                TempEntry::Slot(s) if s == slot => {
                    *entry = TempEntry::Erased;
                    self.free_slots.push(slot);
                    return;
                }
                TempEntry::Slot(_) | TempEntry::Erased => {}
                TempEntry::Boundary(_) => break,
            }
        }
    }

    /// Move a temporary into the parent-lifetime segment so it survives
    /// until the enclosing statement closes. Used for values a loop keeps
    /// live across its body, like the container and iterator of a foreach.
    pub fn promote_to_parent(&mut self, slot: u32) {
        for entry in self.cur_temps.iter_mut().rev() {
            match *entry {
                TempEntry::Slot(s) if s == slot => {
                    *entry = TempEntry::Erased;
                    self.parent_temps.push(TempEntry::Slot(slot));
                    return;
                }
                TempEntry::Slot(_) | TempEntry::Erased => {}
                TempEntry::Boundary(_) => break,
            }
        }
    }

    /// Release a declared local at scope close, erasing any pending temp
    /// stack entry so the statement sweep cannot release it twice.
    pub fn free_local(&mut self, slot: u32) {
        for entry in self
            .cur_temps
            .iter_mut()
            .chain(self.parent_temps.iter_mut())
        {
            if *entry == TempEntry::Slot(slot) {
                *entry = TempEntry::Erased;
            }
        }
        self.free_slots.push(slot);
    }
}

/// A global variable known to the compilation session.
#[derive(Debug, Clone)]
pub struct GlobalVarDef {
    pub ty: ClassRef,
    /// Injected by the host; loads use LOAD_READ_ONLY_FUNCTION_VAR and
    /// stores are rejected.
    pub read_only: bool,
    /// Declared `extern`: defined by another compilation unit.
    pub external: bool,
}

/// Scripts and globals shared across the functions of one compilation
/// session.
#[derive(Debug, Default)]
pub struct ScriptScope {
    scripts: FxHashMap<Symbol, PrototypeId>,
    globals: FxHashMap<Symbol, GlobalVarDef>,
}

impl ScriptScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, name: Symbol) -> Option<PrototypeId> {
        self.scripts.get(&name).copied()
    }

    pub fn insert_script(&mut self, name: Symbol, proto: PrototypeId) {
        self.scripts.insert(name, proto);
    }

    pub fn global(&self, name: Symbol) -> Option<&GlobalVarDef> {
        self.globals.get(&name)
    }

    pub fn insert_global(&mut self, name: Symbol, def: GlobalVarDef) {
        self.globals.insert(name, def);
    }

    /// Register a host-injected read-only variable visible to every script
    /// of the session.
    pub fn register_read_only_variable(&mut self, name: Symbol, ty: ClassRef) {
        self.globals.insert(
            name,
            GlobalVarDef {
                ty,
                read_only: true,
                external: false,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_come_from_the_free_list_first() {
        let mut frame = Frame::new();
        let a = frame.alloc_slot(false);
        let b = frame.alloc_slot(false);
        assert_eq!((a, b), (0, 1));
        frame.free_local(b);
        frame.free_local(a);
        // Most recently freed first.
        assert_eq!(frame.alloc_slot(false), 0);
        assert_eq!(frame.alloc_slot(false), 1);
        assert_eq!(frame.stack_size(), 2);
    }

    #[test]
    fn statement_close_releases_its_temporaries() {
        let mut frame = Frame::new();
        let id = frame.begin_stat();
        let t0 = frame.alloc_slot(true);
        let t1 = frame.alloc_slot(true);
        frame.end_stat(id);
        let id2 = frame.begin_stat();
        let r0 = frame.alloc_slot(true);
        let r1 = frame.alloc_slot(true);
        frame.end_stat(id2);
        assert_eq!((r0, r1), (t0, t1));
        assert_eq!(frame.stack_size(), 2);
    }

    #[test]
    fn mid_statement_release_erases_in_place() {
        let mut frame = Frame::new();
        let id = frame.begin_stat();
        let t0 = frame.alloc_slot(true);
        let _t1 = frame.alloc_slot(true);
        frame.free_temp(t0);
        // The freed slot is immediately reusable.
        assert_eq!(frame.alloc_slot(true), t0);
        // Closing the statement must not double-free t0.
        frame.end_stat(id);
        let id2 = frame.begin_stat();
        let mut seen = vec![
            frame.alloc_slot(true),
            frame.alloc_slot(true),
            frame.alloc_slot(true),
        ];
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
        frame.end_stat(id2);
        assert_eq!(frame.stack_size(), 3);
    }

    #[test]
    fn nested_statement_left_open_is_closed_by_the_outer_end() {
        let mut frame = Frame::new();
        let outer = frame.begin_stat();
        let _inner = frame.begin_stat();
        let t = frame.alloc_slot(true);
        frame.end_stat(outer);
        assert_eq!(frame.alloc_slot(true), t);
    }

    #[test]
    fn promoted_temporaries_survive_their_statement() {
        let mut frame = Frame::new();
        let outer = frame.begin_stat();
        let inner = frame.begin_stat();
        let t = frame.alloc_slot(true);
        frame.promote_to_parent(t);
        frame.end_stat(inner);
        assert_ne!(frame.alloc_slot(true), t);
        frame.end_stat(outer);
        assert_eq!(frame.alloc_slot(true), t);
    }

    #[test]
    fn parent_lifetime_slots_survive_their_statement() {
        let mut frame = Frame::new();
        let outer = frame.begin_stat();
        let inner = frame.begin_stat();
        let local = frame.alloc_slot(false);
        frame.end_stat(inner);
        // Not yet released: promoted into the outer statement.
        let other = frame.alloc_slot(true);
        assert_ne!(other, local);
        frame.end_stat(outer);
        assert_eq!(frame.alloc_slot(true), local);
    }
}
