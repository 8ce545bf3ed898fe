use std::fmt::{self, Debug, Formatter};

use tracing::{trace};

use super::{Register, RegisterClass, RegisterLayout, BasicType, CompileError};
use super::notation::{NotationTable, RegisterNotation, BytecodeRange};
use crate::util::{ArrayMap, CommaSeparated};

/**
 * Reference-counted ownership of the [`Register`]s of one CPU, for the
 * duration of one method compilation.
 *
 * A `Register` with a reference count of zero is free. Allocation visits the
 * members of each [`RegisterClass`] in round-robin order, starting after the
 * most recently allocated member, so that recently freed registers are
 * reused last. A separate cursor does the same for choosing spill victims.
 *
 * When common subexpression tracking is enabled, the allocator also owns the
 * [`NotationTable`]. A notation only lives as long as its register is
 * referenced: allocating a register, or dropping its last reference, wipes
 * it.
 *
 * The allocator does not know which values live in which registers, so it
 * cannot spill by itself. See [`CompilerContext`].
 *
 * [`CompilerContext`]: super::CompilerContext
 */
pub struct RegisterAllocator {
    layout: RegisterLayout,
    /** The reference count of each real register. */
    ref_counts: ArrayMap<Register, u32>,
    /** For each class, the index into its members at which to start searching. */
    cursors: [usize; 3],
    /** The register index at which to start searching for a spill victim. */
    spill_cursor: usize,
    /** `None` if CSE tracking is disabled. */
    notations: Option<NotationTable>,
}

impl RegisterAllocator {
    pub fn new(layout: RegisterLayout, cse: bool) -> Self {
        let n = layout.len();
        RegisterAllocator {
            layout,
            ref_counts: ArrayMap::new(n),
            cursors: [0; 3],
            spill_cursor: 0,
            notations: if cse { Some(NotationTable::new(n)) } else { None },
        }
    }

    pub fn layout(&self) -> &RegisterLayout { &self.layout }

    /** Frees every register and forgets all notations, ready for a new method. */
    pub fn reset(&mut self) {
        self.ref_counts.fill_with(|| 0);
        self.cursors = [0; 3];
        self.spill_cursor = 0;
        self.wipe_all_notations();
    }

    pub fn ref_count(&self, reg: Register) -> u32 {
        self.ref_counts.get(reg).copied().unwrap_or(0)
    }

    pub fn is_referenced(&self, reg: Register) -> bool { self.ref_count(reg) > 0 }

    /** All registers with a nonzero reference count, in index order. */
    pub fn referenced_registers(&self) -> Vec<Register> {
        self.layout.all_registers().filter(|&reg| self.is_referenced(reg)).collect()
    }

    /** The number of members of `class` that are free. */
    pub fn free_count(&self, class: RegisterClass) -> usize {
        self.layout.members(class).iter().filter(|&&reg| !self.is_referenced(reg)).count()
    }

    /**
     * Allocates the next free member of `class` in round-robin order, with a
     * reference count of one. Returns `None` if every member is referenced.
     */
    pub fn try_allocate(&mut self, class: RegisterClass) -> Option<Register> {
        let members = self.layout.members(class);
        let n = members.len();
        let start = self.cursors[class as usize];
        let found = (0..n)
            .map(|k| (start + k) % n)
            .find(|&i| self.ref_counts[members[i]] == 0);
        let i = found?;
        let reg = members[i];
        self.cursors[class as usize] = (i + 1) % n;
        self.ref_counts[reg] = 1;
        self.wipe_notation_of(reg);
        trace!(?reg, ?class, "allocate");
        Some(reg)
    }

    /**
     * Allocates `reg` specifically, if it is free. Returns `Ok(false)` if it
     * is referenced, in which case the caller must evict its occupant first.
     */
    pub fn try_claim(&mut self, reg: Register) -> Result<bool, CompileError> {
        if !self.layout.is_allocatable(reg) {
            return Err(CompileError::BadSpecificRegister(reg));
        }
        if self.ref_counts[reg] > 0 { return Ok(false); }
        self.ref_counts[reg] = 1;
        self.wipe_notation_of(reg);
        trace!(?reg, "claim");
        Ok(true)
    }

    /**
     * The members of `class` that have exactly one reference, in the order
     * in which they should be considered for spilling.
     */
    pub fn spill_candidates(&self, class: RegisterClass) -> Vec<Register> {
        let n = self.layout.len().max(1);
        let mut candidates: Vec<Register> = self.layout.members(class).iter()
            .copied()
            .filter(|&reg| self.ref_counts[reg] == 1)
            .collect();
        let cursor = self.spill_cursor;
        candidates.sort_by_key(|reg| (reg.0 as usize + n - cursor) % n);
        candidates
    }

    /** Records that `reg` was spilled, moving the spill cursor past it. */
    pub fn note_spilled(&mut self, reg: Register) {
        self.spill_cursor = (reg.0 as usize + 1) % self.layout.len().max(1);
    }

    /** Adds a reference to `reg`. Pseudo-registers are ignored. */
    pub fn reference(&mut self, reg: Register) {
        if let Some(count) = self.ref_counts.get_mut(reg) {
            *count += 1;
        }
    }

    /**
     * Removes a reference to `reg`. Pseudo-registers are ignored.
     * When the last reference goes, any notation of `reg` is wiped.
     */
    pub fn dereference(&mut self, reg: Register) -> Result<(), CompileError> {
        let count = match self.ref_counts.get_mut(reg) {
            None => return Ok(()),
            Some(count) => count,
        };
        if *count == 0 {
            debug_assert!(false, "dereferenced {:?} which is free", reg);
            return Err(CompileError::UnreferencedRegister(reg));
        }
        *count -= 1;
        if *count == 0 {
            self.wipe_notation_of(reg);
            trace!(?reg, "free");
        }
        Ok(())
    }

    // CSE notation.

    pub fn is_cse_enabled(&self) -> bool { self.notations.is_some() }

    pub fn is_notated(&self, reg: Register) -> bool {
        self.notations.as_ref().map_or(false, |t| t.is_notated(reg))
    }

    pub fn notation(&self, reg: Register) -> Option<&RegisterNotation> {
        self.notations.as_ref().and_then(|t| t.get(reg))
    }

    /**
     * Records that the value in `reg` is the result of the `length`
     * bytecodes starting at `bci`.
     * Ignored if `reg` is not referenced.
     */
    pub fn set_notation(&mut self, reg: Register, bci: u16, length: u16, ty: BasicType) {
        if !self.is_referenced(reg) { return; }
        if let Some(t) = self.notations.as_mut() {
            t.set(reg, BytecodeRange::new(bci, length), ty);
            trace!(?reg, bci, length, "notate");
        }
    }

    /**
     * Returns a referenced register holding the result of the `length`
     * bytecodes starting at `bci`, if any.
     */
    pub fn find_notation(&self, bci: u16, length: u16) -> Option<Register> {
        let t = self.notations.as_ref()?;
        t.find(BytecodeRange::new(bci, length)).filter(|&reg| self.is_referenced(reg))
    }

    fn dependencies(&mut self, reg: Register) -> Option<&mut RegisterNotation> {
        self.notations.as_mut().and_then(|t| t.dependencies_mut(reg))
    }

    /** Records that the value in `reg` was derived from local variable `index`. */
    pub fn add_local_dependency(&mut self, reg: Register, index: usize) {
        if let Some(n) = self.dependencies(reg) { n.locals.insert(index); }
    }

    /** Records that the value in `reg` was derived from field `constant_index`. */
    pub fn add_field_dependency(&mut self, reg: Register, constant_index: usize) {
        if let Some(n) = self.dependencies(reg) { n.fields.insert(constant_index); }
    }

    /** Records that the value in `reg` was loaded from an array of `element`. */
    pub fn add_array_type_dependency(&mut self, reg: Register, element: BasicType) {
        if let Some(n) = self.dependencies(reg) { n.array_types.insert(element.tag()); }
    }

    /**
     * Adds the dependencies of `src` to those of `dst`, e.g. when `dst` is
     * computed from `src`.
     */
    pub fn merge_dependencies(&mut self, dst: Register, src: Register) {
        let n = match self.notations.as_ref().and_then(|t| t.get(src)) {
            None => return,
            Some(n) => *n,
        };
        if let Some(d) = self.dependencies(dst) {
            d.locals |= n.locals;
            d.fields |= n.fields;
            d.array_types |= n.array_types;
        }
    }

    /** Moves the notation of `src` to `dst`, wiping `src`. */
    pub fn move_notation(&mut self, src: Register, dst: Register) {
        if let Some(t) = self.notations.as_mut() { t.move_notation(src, dst); }
    }

    pub fn wipe_notation_of(&mut self, reg: Register) {
        if let Some(t) = self.notations.as_mut() { t.wipe(reg); }
    }

    /** Forgets all notations. Used at control flow merge points. */
    pub fn wipe_all_notations(&mut self) {
        if let Some(t) = self.notations.as_mut() { t.wipe_all(); }
    }

    /** Forgets all notations except those of `keep`. */
    pub fn wipe_all_notation_except(&mut self, keep: &[Register]) {
        if let Some(t) = self.notations.as_mut() { t.wipe_all_except(keep); }
    }

    /** Call when local variable `index` may have changed. */
    pub fn kill_by_locals(&mut self, index: usize) {
        if let Some(t) = self.notations.as_mut() {
            let n = t.kill_by_locals(index);
            if n > 0 { trace!(index, killed = n, "kill by local"); }
        }
    }

    /** Call when field `constant_index` may have changed. */
    pub fn kill_by_fields(&mut self, constant_index: usize) {
        if let Some(t) = self.notations.as_mut() {
            let n = t.kill_by_fields(constant_index);
            if n > 0 { trace!(constant_index, killed = n, "kill by field"); }
        }
    }

    /** Call when an element of an array of `element` may have changed. */
    pub fn kill_by_array_type(&mut self, element: BasicType) {
        if let Some(t) = self.notations.as_mut() {
            let n = t.kill_by_array_type(element);
            if n > 0 { trace!(?element, killed = n, "kill by array type"); }
        }
    }

    pub fn set_bound_mark(&mut self, reg: Register) {
        if let Some(t) = self.notations.as_mut() { t.set_bound_mark(reg); }
    }

    pub fn clear_bound_mark(&mut self) {
        if let Some(t) = self.notations.as_mut() { t.clear_bound_mark(); }
    }

    pub fn is_checked_before(&self, reg: Register) -> bool {
        self.notations.as_ref().map_or(false, |t| t.is_checked_before(reg))
    }

    pub fn set_checked_before(&mut self, reg: Register) {
        if let Some(t) = self.notations.as_mut() { t.set_checked_before(reg); }
    }
}

impl Debug for RegisterAllocator {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        let referenced = self.referenced_registers();
        f.debug_struct("RegisterAllocator")
            .field("referenced", &CommaSeparated(|| referenced.iter().map(|&reg| (reg, self.ref_count(reg)))))
            .field("cursors", &self.cursors)
            .field("spill_cursor", &self.spill_cursor)
            .finish()
    }
}

//-----------------------------------------------------------------------------
