use std::fmt::{self, Debug, Formatter};

use super::{Register, RegisterAllocator, BasicType, CompileError};
use super::{Value, Where, Immediate, Home, CodeGenerator};
use crate::oop::{Oop};

/**
 * A local variable or operand stack slot of a [`VirtualStackFrame`]: a
 * [`Value`] plus its memory-resident home.
 *
 * If `flushed` is set, the home holds the current value. A `Location` whose
 * value is nowhere but which is flushed lives in memory only.
 */
pub struct Location {
    value: Value,
    home: Home,
    flushed: bool,
}

impl Location {
    fn new(value: Value, home: Home, flushed: bool) -> Self {
        Location {value, home, flushed}
    }

    pub fn value(&self) -> &Value { &self.value }

    /** Takes the value of a `Location` that has left the frame. */
    pub(super) fn into_value(self) -> Value { self.value }

    pub fn home(&self) -> Home { self.home }

    pub fn is_flushed(&self) -> bool { self.flushed }

    pub fn is_in_memory_only(&self) -> bool { self.flushed && !self.value.is_present() }

    /** The homes of the low word and, for two-word values, the high word. */
    pub fn homes(&self) -> impl Iterator<Item=Home> {
        let hi = if self.value.ty().is_two_word() { Some(self.home.next()) } else { None };
        std::iter::once(self.home).chain(hi)
    }

    /** Writes the value to its home, if necessary, keeping any registers. */
    pub fn write_back(&mut self, gen: &mut impl CodeGenerator) {
        if self.flushed { return; }
        match self.value.where_() {
            Where::Nowhere => return,
            Where::Register(reg) => gen.store(reg, self.home),
            Where::Pair {lo, hi} => {
                gen.store(lo, self.home);
                gen.store(hi, self.home.next());
            },
            Where::Immediate(Immediate::Null) => gen.store_oop(Oop::NULL, self.home),
            Where::Immediate(imm) => {
                let (lo, hi) = imm.words();
                gen.store_word(lo, self.home);
                if let Some(hi) = hi { gen.store_word(hi, self.home.next()); }
            },
        }
        self.flushed = true;
    }

    /** Writes the value to its home and gives back its registers. */
    pub fn spill(
        &mut self,
        ra: &mut RegisterAllocator,
        gen: &mut impl CodeGenerator,
    ) -> Result<(), CompileError> {
        self.write_back(gen);
        self.value.release(ra)
    }
}

impl Debug for Location {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        write!(f, "{:?}: {:?}{}", self.home, self.value, if self.flushed { " (flushed)" } else { "" })
    }
}

//-----------------------------------------------------------------------------

/**
 * The compile-time model of one method activation: where each local
 * variable and each operand stack entry currently lives.
 *
 * Operations that may need registers are on [`CompilerContext`], which owns
 * the frame together with the allocator and code generator.
 *
 * [`CompilerContext`]: super::CompilerContext
 */
pub struct VirtualStackFrame {
    locals: Vec<Location>,
    stack: Vec<Location>,
    /** The number of words used by `stack`. */
    stack_words: usize,
    max_stack: usize,
}

impl VirtualStackFrame {
    /**
     * Constructs a frame whose locals are in memory and have no known type
     * yet, and whose operand stack is empty.
     */
    pub fn new(max_locals: usize, max_stack: usize) -> Self {
        let locals = (0..max_locals)
            .map(|i| Location::new(Value::new(BasicType::Illegal), Home::Local(i), true))
            .collect();
        VirtualStackFrame {locals, stack: Vec::new(), stack_words: 0, max_stack}
    }

    pub fn max_locals(&self) -> usize { self.locals.len() }

    pub fn max_stack(&self) -> usize { self.max_stack }

    /** The number of values on the operand stack. */
    pub fn depth(&self) -> usize { self.stack.len() }

    /** The number of words used by the operand stack. */
    pub fn stack_words(&self) -> usize { self.stack_words }

    pub fn local(&self, index: usize) -> &Location { &self.locals[index] }

    pub(super) fn local_mut(&mut self, index: usize) -> &mut Location { &mut self.locals[index] }

    /** Declares that local `index` is an incoming argument of type `ty`, in memory. */
    pub fn declare_local(&mut self, index: usize, ty: BasicType) {
        debug_assert!(!self.locals[index].value.in_register());
        self.locals[index] = Location::new(Value::new(ty), Home::Local(index), true);
    }

    /** The `depth`th operand stack entry from the top, counting from zero. */
    pub fn peek(&self, depth: usize) -> Option<&Location> {
        self.stack.len().checked_sub(depth + 1).map(|i| &self.stack[i])
    }

    pub(super) fn push(&mut self, value: Value) {
        let words = value.ty().word_size();
        debug_assert!(self.stack_words + words <= self.max_stack, "operand stack overflow");
        let home = Home::Stack(self.stack_words);
        self.stack_words += words;
        self.stack.push(Location::new(value, home, false));
    }

    pub(super) fn pop(&mut self) -> Option<Location> {
        let loc = self.stack.pop()?;
        self.stack_words -= loc.value.ty().word_size();
        Some(loc)
    }

    /** Replaces local `index`, returning the previous `Location`. */
    pub(super) fn set_local(&mut self, index: usize, value: Value, flushed: bool) -> Location {
        std::mem::replace(&mut self.locals[index], Location::new(value, Home::Local(index), flushed))
    }

    pub fn locations(&self) -> impl Iterator<Item=&Location> {
        self.locals.iter().chain(self.stack.iter())
    }

    pub(super) fn locations_mut(&mut self) -> impl Iterator<Item=&mut Location> {
        self.locals.iter_mut().chain(self.stack.iter_mut())
    }

    /** The first `Location` whose value names `reg`. */
    pub(super) fn location_of_mut(&mut self, reg: Register) -> Option<&mut Location> {
        self.locations_mut().find(|loc| loc.value.names(reg))
    }

    /** Tests whether any `Location` names `reg`. */
    pub fn is_mapping(&self, reg: Register) -> bool {
        self.locations().any(|loc| loc.value.names(reg))
    }

    /** Gives back every register held by the frame, and empties the stack. */
    pub(super) fn destroy_all(&mut self, ra: &mut RegisterAllocator) -> Result<(), CompileError> {
        for loc in self.locations_mut() {
            loc.value.destroy(ra)?;
        }
        self.stack.clear();
        self.stack_words = 0;
        Ok(())
    }

    /** Like `destroy_all()`, but without touching the allocator. */
    pub(super) fn forget_all(&mut self) {
        for loc in self.locations_mut() {
            loc.value.forget();
        }
        self.stack.clear();
        self.stack_words = 0;
    }
}

impl Debug for VirtualStackFrame {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("VirtualStackFrame")
            .field("locals", &self.locals)
            .field("stack", &self.stack)
            .finish()
    }
}

//-----------------------------------------------------------------------------
