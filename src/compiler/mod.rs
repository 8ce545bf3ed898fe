/*!
 * The register allocation machinery of the method compiler.
 *
 * A method is compiled by walking its bytecodes while maintaining a
 * [`VirtualStackFrame`]: a model of where each local variable and operand
 * stack entry currently lives. Each entry is a [`Value`], which is either
 * nowhere (in memory), an immediate constant, or in one or two
 * [`Register`]s. Registers are reference counted by the
 * [`RegisterAllocator`], which optionally remembers, for each register,
 * which bytecodes computed its contents, so that a repeated computation can
 * reuse it.
 *
 * The [`CompilerContext`] ties these together with a [`CodeGenerator`],
 * and spills values to memory when registers run out. A compilation that
 * fails returns a [`CompileError`]; the method is then interpreted.
 */

pub mod register;
pub use register::{Register, RegisterClass, RegisterLayout};

mod types;
pub use types::{BasicType};

mod notation;
pub use notation::{BytecodeRange, RegisterNotation, NotationTable};

mod error;
pub use error::{CompileError};

mod allocator;
pub use allocator::{RegisterAllocator};

mod codegen;
pub use codegen::{Home, CodeGenerator};

mod simulation;
pub use simulation::{Simulation, Instruction, Content};

mod value;
pub use value::{Immediate, Where, ValueFlags, FieldValue, StaticField, Value, register_class};

mod frame;
pub use frame::{Location, VirtualStackFrame};

mod context;
pub use context::{CompilerContext};
