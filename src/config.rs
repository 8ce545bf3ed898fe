/*!
 * Tuning knobs for the compiler and the scheduler.
 */

/** Options that affect how a method is compiled. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /**
     * Record a [`RegisterNotation`] for cached values so that repeated
     * evaluation of the same bytecode range can reuse a register.
     *
     * [`RegisterNotation`]: crate::compiler::RegisterNotation
     */
    pub cse: bool,
    /**
     * The code being compiled will be written into a relocatable image.
     * Object constants must not be folded, because the image writer may
     * place the referent in a different memory block.
     */
    pub relocatable_image: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {cse: true, relocatable_image: false}
    }
}

/** Options that affect thread scheduling. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /** The most threads that may exist at once, excluding terminated ones. */
    pub max_threads: usize,
    /**
     * How long a thread runs before the interpreter is asked to reach a
     * scheduling point, in milliseconds.
     */
    pub time_slice_millis: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {max_threads: 256, time_slice_millis: 10}
    }
}
