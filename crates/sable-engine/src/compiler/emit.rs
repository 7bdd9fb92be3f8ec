//! Instruction emission and jump patching.
//!
//! All writes into the code stream funnel through here. Forward jumps go
//! through [`LabelId`]s: a jump to an unbound label emits a placeholder
//! word and records the site; binding the label patches every recorded
//! site and any jump emitted afterwards resolves immediately. The only
//! other post-hoc code rewrite is the store-elision peephole, which keeps
//! the index of the last store-destination word (see `Compiler::assign`).

use crate::bytecode::{Opcode, SourceMapEntry, Word, NPOS};
use crate::compiler::error::SourcePos;
use crate::compiler::Compiler;

/// Handle to a jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelId(pub(crate) u32);

#[derive(Debug, Default)]
pub(crate) struct LabelState {
    target: Option<Word>,
    /// Word indices holding placeholder targets, patched at bind.
    sites: Vec<usize>,
}

impl Compiler<'_> {
    /// Record the source position for subsequently emitted instructions.
    pub fn set_position(&mut self, offset: u32, line: u32) {
        self.pos = SourcePos::new(offset, line);
    }

    pub(crate) fn code_offset(&self) -> u32 {
        self.unit.ops.len() as u32
    }

    /// Emit an opcode word.
    ///
    /// This is also where unreachable code is detected: emitting anything
    /// right after a return, or after a region whose every path returned,
    /// is a diagnostic.
    pub(crate) fn instr(&mut self, op: Opcode) {
        let scope = self.scopes.last_mut().expect("no open scope");
        let unreachable = scope.has_returned || (!scope.empty && scope.all_paths_return);
        scope.empty = false;
        scope.all_paths_return = false;
        scope.has_returned = false;
        if unreachable {
            self.diags.error("Unreachable code", self.pos);
        }
        self.unit.source_map.push(SourceMapEntry {
            code_offset: self.unit.ops.len() as u32,
            source_offset: self.pos.offset,
            source_line: self.pos.line,
        });
        self.unit.ops.push(op.as_word());
    }

    /// Emit an operand word.
    pub(crate) fn word(&mut self, w: Word) {
        self.unit.ops.push(w);
    }

    /// Emit a store-destination operand and remember its position for the
    /// store-elision peephole. Clears any pending no-recycle marker.
    pub(crate) fn store_target(&mut self, dst: Word) {
        self.last_store = Some(self.unit.ops.len());
        self.no_recycle.clear();
        self.unit.ops.push(dst);
    }

    /// Rewrite the destination operand of the most recent store-producing
    /// instruction. Caller must have verified it still targets `from`.
    pub(crate) fn redirect_last_store(&mut self, to: Word) {
        let site = self.last_store.expect("no store to redirect");
        self.unit.ops[site] = to;
    }

    /// Destination operand of the most recent store, if still tracked.
    pub(crate) fn last_store_target(&self) -> Option<Word> {
        self.last_store.map(|site| self.unit.ops[site])
    }

    /// Forget the tracked store; elision across this point is unsafe.
    pub(crate) fn clear_last_store(&mut self) {
        self.last_store = None;
    }

    pub(crate) fn new_label(&mut self) -> LabelId {
        self.labels.push(LabelState::default());
        LabelId(self.labels.len() as u32 - 1)
    }

    /// Emit a jump-target operand word referring to `label`.
    pub(crate) fn jump_operand(&mut self, label: LabelId) {
        let state = &mut self.labels[label.0 as usize];
        match state.target {
            Some(target) => self.unit.ops.push(target),
            None => {
                state.sites.push(self.unit.ops.len());
                self.unit.ops.push(NPOS);
            }
        }
    }

    /// Bind `label` to the current end of the code stream.
    pub(crate) fn bind(&mut self, label: LabelId) {
        let offset = self.code_offset();
        self.bind_to(label, offset);
    }

    /// Bind `label` to an explicit code offset, patching every recorded
    /// site.
    pub(crate) fn bind_to(&mut self, label: LabelId, offset: u32) {
        let state = &mut self.labels[label.0 as usize];
        debug_assert!(state.target.is_none(), "label bound twice");
        state.target = Some(offset);
        for site in std::mem::take(&mut state.sites) {
            self.unit.ops[site] = offset;
        }
    }
}
