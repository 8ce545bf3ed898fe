use thiserror::Error;

use super::{Register, RegisterClass};

/**
 * Reasons why a method cannot be compiled.
 *
 * All of these indicate that the compiler exceeded a design limit or broke
 * one of its own invariants. None is continuable: compilation of the current
 * method is abandoned, the [`CompilerContext`] is reset, and the method stays
 * interpreted. They are distinct from resource exhaustion that the VM
 * reports to the user.
 *
 * [`CompilerContext`]: super::CompilerContext
 */
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("no {class:?} register is free and none can be spilled")]
    RegistersExhausted { class: RegisterClass },
    #[error("dereferenced {0:?}, which is not referenced")]
    UnreferencedRegister(Register),
    #[error("two-word value uses {0:?} for both halves")]
    OverlappingPair(Register),
    #[error("{0:?} is not an allocatable register")]
    BadSpecificRegister(Register),
    #[error("{0:?} is held outside the frame and cannot be evicted")]
    RegisterPinned(Register),
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("registers still referenced at the end of the method: {0:?}")]
    LeakedRegisters(Vec<Register>),
}
