/*!
 * Common subexpression tracking.
 *
 * A [`RegisterNotation`] records which bytecodes computed the value cached in
 * a [`Register`], and which mutable state that value was derived from. It is
 * a promise that re-evaluating the same bytecodes would produce the same
 * value. The promise is withdrawn ("killed") whenever a dependency may have
 * been mutated.
 */

use super::{Register, BasicType};
use crate::util::{ArrayMap, Bits32};

/** A range of bytecode, packed into one 32-bit word. */
#[derive(Copy, Clone, Default, Hash, PartialEq, Eq)]
pub struct BytecodeRange(u32);

impl BytecodeRange {
    pub fn new(start: u16, length: u16) -> Self {
        BytecodeRange(((start as u32) << 16) | length as u32)
    }

    pub fn start(self) -> u16 { (self.0 >> 16) as u16 }

    pub fn length(self) -> u16 { self.0 as u16 }

    pub fn packed(self) -> u32 { self.0 }
}

impl std::fmt::Debug for BytecodeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}+{}", self.start(), self.length())
    }
}

//-----------------------------------------------------------------------------

/** The provenance of the value in one [`Register`]. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RegisterNotation {
    /** The bytecodes whose evaluation produced the value. */
    pub range: BytecodeRange,
    /** Local variable indices that the value depends on. */
    pub locals: Bits32,
    /** Constant pool indices of fields that the value depends on. */
    pub fields: Bits32,
    /** [`BasicType::tag()`]s of array elements that the value depends on. */
    pub array_types: Bits32,
    /** The type of the cached value. */
    pub ty: BasicType,
}

impl Default for RegisterNotation {
    fn default() -> Self {
        RegisterNotation {
            range: BytecodeRange::default(),
            locals: Bits32::EMPTY,
            fields: Bits32::EMPTY,
            array_types: Bits32::EMPTY,
            ty: BasicType::Illegal,
        }
    }
}

//-----------------------------------------------------------------------------

/**
 * A [`RegisterNotation`] for every [`Register`], plus two flags per
 * register: whether the notation is valid ("notated"), and whether the value
 * has been checked against the current bound mark.
 */
#[derive(Debug, Clone)]
pub struct NotationTable {
    notations: ArrayMap<Register, RegisterNotation>,
    notated: ArrayMap<Register, bool>,
    checked: ArrayMap<Register, bool>,
    /** The `Register` holding the cached array length, if any. */
    bound_mark: Option<Register>,
}

impl NotationTable {
    pub fn new(num_registers: usize) -> Self {
        NotationTable {
            notations: ArrayMap::new(num_registers),
            notated: ArrayMap::new(num_registers),
            checked: ArrayMap::new(num_registers),
            bound_mark: None,
        }
    }

    pub fn get(&self, reg: Register) -> Option<&RegisterNotation> {
        if self.is_notated(reg) { self.notations.get(reg) } else { None }
    }

    pub fn is_notated(&self, reg: Register) -> bool {
        self.notated.get(reg).copied().unwrap_or(false)
    }

    /** The registers that currently hold a notation. */
    pub fn notated_registers(&self) -> impl Iterator<Item=Register> + '_ {
        self.notated.iter().enumerate()
            .filter(|&(_, &n)| n)
            .map(|(i, _)| Register(i as u8))
    }

    /**
     * Records that the value in `reg` was produced by `range`, keeping any
     * dependencies accumulated since `reg` was last wiped.
     */
    pub fn set(&mut self, reg: Register, range: BytecodeRange, ty: BasicType) {
        if !self.notations.contains_key(reg) { return; }
        let n = &mut self.notations[reg];
        n.range = range;
        n.ty = ty;
        self.notated[reg] = true;
    }

    /** Returns the (possibly not yet valid) notation of `reg` for editing. */
    pub fn dependencies_mut(&mut self, reg: Register) -> Option<&mut RegisterNotation> {
        self.notations.get_mut(reg)
    }

    /** Finds a register whose notation says it holds the result of `range`. */
    pub fn find(&self, range: BytecodeRange) -> Option<Register> {
        self.notated_registers().find(|&reg| self.notations[reg].range == range)
    }

    /**
     * Moves the notation and checked status of `src` to `dst`, then wipes
     * `src`.
     */
    pub fn move_notation(&mut self, src: Register, dst: Register) {
        if src == dst || !self.notations.contains_key(src) || !self.notations.contains_key(dst) {
            return;
        }
        if self.bound_mark == Some(dst) {
            self.clear_bound_mark();
        }
        self.notations[dst] = self.notations[src];
        self.notated[dst] = self.notated[src];
        self.checked[dst] = self.checked[src];
        if self.bound_mark == Some(src) {
            self.bound_mark = Some(dst);
        }
        // Do not call `wipe()`: `src` no longer holds the bound mark.
        self.notations[src] = RegisterNotation::default();
        self.notated[src] = false;
        self.checked[src] = false;
    }

    /** Forgets everything about `reg`. */
    pub fn wipe(&mut self, reg: Register) {
        if !self.notations.contains_key(reg) { return; }
        self.notations[reg] = RegisterNotation::default();
        self.notated[reg] = false;
        self.checked[reg] = false;
        if self.bound_mark == Some(reg) {
            self.clear_bound_mark();
        }
    }

    pub fn wipe_all(&mut self) {
        self.notations.fill_with(RegisterNotation::default);
        self.notated.fill_with(|| false);
        self.checked.fill_with(|| false);
        self.bound_mark = None;
    }

    /** Wipes every register except those in `keep`. */
    pub fn wipe_all_except(&mut self, keep: &[Register]) {
        let doomed: Vec<Register> = (0..self.notations.len())
            .map(|i| Register(i as u8))
            .filter(|reg| !keep.contains(reg))
            .collect();
        for reg in doomed { self.wipe(reg); }
    }

    /** Wipes every notated register for which `depends` returns `true`. */
    fn kill_if(&mut self, depends: impl Fn(&RegisterNotation) -> bool) -> usize {
        let doomed: Vec<Register> = self.notated_registers()
            .filter(|&reg| depends(&self.notations[reg]))
            .collect();
        for &reg in &doomed { self.wipe(reg); }
        doomed.len()
    }

    pub fn kill_by_locals(&mut self, local: usize) -> usize {
        self.kill_if(|n| n.locals.contains(local))
    }

    pub fn kill_by_fields(&mut self, constant_index: usize) -> usize {
        self.kill_if(|n| n.fields.contains(constant_index))
    }

    pub fn kill_by_array_type(&mut self, element: BasicType) -> usize {
        self.kill_if(|n| n.array_types.contains(element.tag()))
    }

    pub fn bound_mark(&self) -> Option<Register> { self.bound_mark }

    /** Records that `reg` holds the array length that bound checks use. */
    pub fn set_bound_mark(&mut self, reg: Register) {
        self.checked.fill_with(|| false);
        self.bound_mark = Some(reg);
    }

    /** Forgets the cached array length and every check made against it. */
    pub fn clear_bound_mark(&mut self) {
        self.checked.fill_with(|| false);
        self.bound_mark = None;
    }

    pub fn is_checked_before(&self, reg: Register) -> bool {
        self.bound_mark.is_some() && self.checked.get(reg).copied().unwrap_or(false)
    }

    /**
     * Records that `reg` passed a bound check against the bound mark.
     * Ignored if there is no bound mark.
     */
    pub fn set_checked_before(&mut self, reg: Register) {
        if self.bound_mark.is_some() && self.checked.contains_key(reg) {
            self.checked[reg] = true;
        }
    }
}

//-----------------------------------------------------------------------------
