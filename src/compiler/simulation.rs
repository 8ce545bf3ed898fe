use std::collections::{HashMap};
use std::fmt::{self, Debug, Formatter};

use super::{Register, Home, CodeGenerator};
use crate::oop::{Oop};

/** One emitted instruction, as recorded by a [`Simulation`]. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Instruction {
    LoadWord(Register, u32),
    LoadOop(Register, Oop),
    Move(Register, Register),
    Load(Register, Home),
    Store(Register, Home),
    StoreWord(u32, Home),
    StoreOop(Oop, Home),
}

/** The contents of a register or memory word. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Content {
    Word(u32),
    Oop(Oop),
}

/**
 * A [`CodeGenerator`] that records the instructions it is given, and executes
 * them on an abstract machine as it goes.
 *
 * Reading a register or memory word that was never written yields `None`, so
 * that tests can tell a lost value apart from a zero.
 */
#[derive(Default, Clone)]
pub struct Simulation {
    instructions: Vec<Instruction>,
    registers: HashMap<Register, Content>,
    memory: HashMap<Home, Content>,
}

impl Simulation {
    pub fn new() -> Self { Self::default() }

    /** All instructions emitted so far. */
    pub fn instructions(&self) -> &[Instruction] { &self.instructions }

    /** The number of [`Instruction::Store`]s emitted so far, i.e. spills and flushes. */
    pub fn num_stores(&self) -> usize {
        self.instructions.iter().filter(|i| matches!(i, Instruction::Store(..))).count()
    }

    pub fn register(&self, reg: Register) -> Option<Content> {
        self.registers.get(&reg).copied()
    }

    pub fn memory(&self, home: Home) -> Option<Content> {
        self.memory.get(&home).copied()
    }

    /** Overwrite a memory word, e.g. to model an incoming argument. */
    pub fn poke(&mut self, home: Home, content: Content) {
        self.memory.insert(home, content);
    }

    fn set_register(&mut self, reg: Register, content: Option<Content>) {
        match content {
            Some(c) => { self.registers.insert(reg, c); },
            None => { self.registers.remove(&reg); },
        }
    }

    fn set_memory(&mut self, home: Home, content: Option<Content>) {
        match content {
            Some(c) => { self.memory.insert(home, c); },
            None => { self.memory.remove(&home); },
        }
    }
}

impl CodeGenerator for Simulation {
    fn load_word(&mut self, dst: Register, bits: u32) {
        self.instructions.push(Instruction::LoadWord(dst, bits));
        self.set_register(dst, Some(Content::Word(bits)));
    }

    fn load_oop(&mut self, dst: Register, oop: Oop) {
        self.instructions.push(Instruction::LoadOop(dst, oop));
        self.set_register(dst, Some(Content::Oop(oop)));
    }

    fn move_register(&mut self, dst: Register, src: Register) {
        self.instructions.push(Instruction::Move(dst, src));
        let c = self.register(src);
        self.set_register(dst, c);
    }

    fn load(&mut self, dst: Register, home: Home) {
        self.instructions.push(Instruction::Load(dst, home));
        let c = self.memory(home);
        self.set_register(dst, c);
    }

    fn store(&mut self, src: Register, home: Home) {
        self.instructions.push(Instruction::Store(src, home));
        let c = self.register(src);
        self.set_memory(home, c);
    }

    fn store_word(&mut self, bits: u32, home: Home) {
        self.instructions.push(Instruction::StoreWord(bits, home));
        self.set_memory(home, Some(Content::Word(bits)));
    }

    fn store_oop(&mut self, oop: Oop, home: Home) {
        self.instructions.push(Instruction::StoreOop(oop, home));
        self.set_memory(home, Some(Content::Oop(oop)));
    }
}

impl Debug for Simulation {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_list().entries(self.instructions.iter()).finish()
    }
}

//-----------------------------------------------------------------------------
