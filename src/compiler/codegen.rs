use super::{Register};
use crate::oop::{Oop};

/**
 * The memory-resident home of a frame slot. Two-word values occupy their
 * home and the word after it.
 */
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Home {
    Local(usize),
    Stack(usize),
}

impl Home {
    /** The home of the high word of a two-word value whose low word is here. */
    pub fn next(self) -> Self {
        match self {
            Home::Local(i) => Home::Local(i + 1),
            Home::Stack(i) => Home::Stack(i + 1),
        }
    }
}

/**
 * The instruction emitter that the register allocation machinery drives.
 *
 * Every method appends code that runs after all code previously emitted.
 * Words are 32 bits. An [`Oop`] always occupies one register or one word of
 * memory, and must be emitted with the `oop` methods so that the collector
 * can find and relocate it.
 */
pub trait CodeGenerator {
    /** Assemble `dst = bits`. */
    fn load_word(&mut self, dst: Register, bits: u32);

    /** Assemble `dst = oop`, recording a relocation. */
    fn load_oop(&mut self, dst: Register, oop: Oop);

    /** Assemble `dst = src`. */
    fn move_register(&mut self, dst: Register, src: Register);

    /** Assemble `dst = [home]`. */
    fn load(&mut self, dst: Register, home: Home);

    /** Assemble `[home] = src`. */
    fn store(&mut self, src: Register, home: Home);

    /** Assemble `[home] = bits`. */
    fn store_word(&mut self, bits: u32, home: Home);

    /** Assemble `[home] = oop`, recording a relocation. */
    fn store_oop(&mut self, oop: Oop, home: Home);
}
