use tracing::{debug, warn};

use super::{Register, RegisterClass, RegisterLayout, RegisterAllocator, CompileError};
use super::{BasicType, Value, VirtualStackFrame, Home, CodeGenerator};
use crate::config::{CompilerConfig};

/**
 * Everything that lives for the duration of one method compilation: the
 * [`RegisterAllocator`], the [`VirtualStackFrame`], and the
 * [`CodeGenerator`].
 *
 * Allocation lives here rather than on the `RegisterAllocator` because
 * spilling needs all three: the allocator picks a victim register, the frame
 * says which value it holds, and the code generator stores it to memory.
 */
pub struct CompilerContext<G: CodeGenerator> {
    pub(super) allocator: RegisterAllocator,
    pub(super) frame: VirtualStackFrame,
    pub(super) gen: G,
    pub(super) config: CompilerConfig,
}

impl<G: CodeGenerator> CompilerContext<G> {
    pub fn new(layout: RegisterLayout, config: CompilerConfig, gen: G) -> Self {
        CompilerContext {
            allocator: RegisterAllocator::new(layout, config.cse),
            frame: VirtualStackFrame::new(0, 0),
            gen,
            config,
        }
    }

    pub fn allocator(&self) -> &RegisterAllocator { &self.allocator }

    pub fn allocator_mut(&mut self) -> &mut RegisterAllocator { &mut self.allocator }

    pub fn frame(&self) -> &VirtualStackFrame { &self.frame }

    pub fn gen(&self) -> &G { &self.gen }

    pub fn gen_mut(&mut self) -> &mut G { &mut self.gen }

    pub fn config(&self) -> &CompilerConfig { &self.config }

    // Method lifecycle.

    /** Resets the allocator and sets up an empty frame. */
    pub fn begin_method(&mut self, max_locals: usize, max_stack: usize) {
        self.allocator.reset();
        self.frame = VirtualStackFrame::new(max_locals, max_stack);
        debug!(max_locals, max_stack, "begin method");
    }

    /**
     * Gives back every register held by the frame. Fails if any register is
     * still referenced afterwards, which means some `Value` outside the
     * frame was never destroyed.
     */
    pub fn finish_method(&mut self) -> Result<(), CompileError> {
        self.frame.destroy_all(&mut self.allocator)?;
        let leaked = self.allocator.referenced_registers();
        if !leaked.is_empty() {
            return Err(CompileError::LeakedRegisters(leaked));
        }
        debug!("finish method");
        Ok(())
    }

    /**
     * Throws away the state of a failed compilation, leaving every register
     * free.
     */
    pub fn abandon_method(&mut self) {
        self.frame.forget_all();
        self.allocator.reset();
    }

    /**
     * Compiles one method by calling `body`, between [`begin_method()`] and
     * [`finish_method()`]. On failure the context is reset, so it can be
     * used for the next method, and the error is returned: the VM must then
     * interpret the method.
     *
     * [`begin_method()`]: Self::begin_method
     * [`finish_method()`]: Self::finish_method
     */
    pub fn compile_method<T>(
        &mut self,
        max_locals: usize,
        max_stack: usize,
        body: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        self.begin_method(max_locals, max_stack);
        let result = body(self).and_then(|t| {
            self.finish_method()?;
            Ok(t)
        });
        if let Err(e) = &result {
            warn!(error = %e, "compilation abandoned; method stays interpreted");
            self.abandon_method();
        }
        result
    }

    // Allocation.

    /**
     * Allocates a free member of `class`, spilling a frame value if there is
     * none.
     */
    pub fn allocate(&mut self, class: RegisterClass) -> Result<Register, CompileError> {
        loop {
            if let Some(reg) = self.allocator.try_allocate(class) {
                return Ok(reg);
            }
            self.spill(class)?;
        }
    }

    pub fn allocate_byte_register(&mut self) -> Result<Register, CompileError> {
        self.allocate(RegisterClass::Byte)
    }

    pub fn allocate_float_register(&mut self) -> Result<Register, CompileError> {
        self.allocate(RegisterClass::Float)
    }

    /**
     * Allocates `reg` specifically, e.g. because an instruction requires its
     * operand there. Frame values in `reg` are spilled first.
     */
    pub fn allocate_specific(&mut self, reg: Register) -> Result<Register, CompileError> {
        if self.allocator.try_claim(reg)? { return Ok(reg); }
        while let Some(loc) = self.frame.location_of_mut(reg) {
            loc.spill(&mut self.allocator, &mut self.gen)?;
        }
        if self.allocator.try_claim(reg)? {
            debug!(?reg, "evicted");
            Ok(reg)
        } else {
            Err(CompileError::RegisterPinned(reg))
        }
    }

    /**
     * Frees one member of `class` by writing a frame value to memory. Only
     * registers with exactly one reference, held by the frame, qualify:
     * anything else is still needed by the code being generated.
     */
    pub fn spill(&mut self, class: RegisterClass) -> Result<(), CompileError> {
        for reg in self.allocator.spill_candidates(class) {
            if let Some(loc) = self.frame.location_of_mut(reg) {
                debug!(?reg, home = ?loc.home(), "spill");
                loc.spill(&mut self.allocator, &mut self.gen)?;
                self.allocator.note_spilled(reg);
                return Ok(());
            }
        }
        Err(CompileError::RegistersExhausted {class})
    }

    /**
     * Tests whether `count` members of `class` are free, or could be freed
     * by spilling if `spill` is set, without changing anything.
     */
    pub fn has_free(&self, count: usize, class: RegisterClass, spill: bool) -> bool {
        let mut free = self.allocator.free_count(class);
        if spill {
            free += self.allocator.spill_candidates(class).into_iter()
                .filter(|&reg| self.frame.is_mapping(reg))
                .count();
        }
        free >= count
    }

    /**
     * Tests whether `reg` is in use: referenced, or named by a frame value.
     * The latter includes pseudo-registers, which are not counted.
     */
    pub fn is_mapping_something(&self, reg: Register) -> bool {
        self.allocator.is_referenced(reg) || self.frame.is_mapping(reg)
    }

    // Frame operations.

    /** Pushes `value` onto the operand stack, which takes over its registers. */
    pub fn push(&mut self, value: Value) {
        self.frame.push(value);
    }

    /**
     * Pops the top of the operand stack. A value that had been spilled is
     * loaded back into registers.
     */
    pub fn pop(&mut self) -> Result<Value, CompileError> {
        let loc = self.frame.pop().ok_or(CompileError::StackUnderflow)?;
        if !loc.is_in_memory_only() {
            return Ok(loc.into_value());
        }
        let homes: Vec<Home> = loc.homes().collect();
        let mut value = loc.into_value();
        value.assign_register(self)?;
        for (reg, &home) in value.registers().zip(&homes) {
            self.gen.load(reg, home);
        }
        Ok(value)
    }

    /** Duplicates the top of the operand stack, sharing its registers. */
    pub fn dup(&mut self) -> Result<(), CompileError> {
        let value = self.pop()?;
        let copy = value.copy(&mut self.allocator);
        self.push(value);
        self.push(copy);
        Ok(())
    }

    /**
     * Pushes a copy of local `index`. A local that is only in memory is
     * loaded into registers, which the local keeps as a cache.
     */
    pub fn load_local(&mut self, index: usize) -> Result<(), CompileError> {
        let local = self.frame.local(index);
        if !local.is_in_memory_only() {
            let copy = local.value().copy(&mut self.allocator);
            for reg in copy.registers() {
                self.allocator.add_local_dependency(reg, index);
            }
            self.push(copy);
            return Ok(());
        }
        let ty = local.value().ty();
        debug_assert!(ty != BasicType::Illegal, "local {} is undefined", index);
        let homes: Vec<_> = local.homes().collect();
        let mut value = Value::new(ty);
        value.assign_register(self)?;
        for (reg, &home) in value.registers().zip(&homes) {
            self.gen.load(reg, home);
        }
        let cached = value.copy(&mut self.allocator);
        self.frame.set_local(index, cached, true);
        for reg in value.registers() {
            self.allocator.add_local_dependency(reg, index);
        }
        self.push(value);
        Ok(())
    }

    /**
     * Pops the top of the operand stack into local `index`. Locals that
     * overlap it are invalidated, and so is every notation that depends on
     * them.
     */
    pub fn store_local(&mut self, index: usize) -> Result<(), CompileError> {
        let value = self.pop()?;
        let two_word = value.ty().is_two_word();
        if index > 0 && self.frame.local(index - 1).value().ty().is_two_word() {
            self.invalidate_local(index - 1)?;
        }
        if two_word {
            self.invalidate_local(index + 1)?;
        }
        let mut old = self.frame.set_local(index, value, false).into_value();
        old.destroy(&mut self.allocator)?;
        self.allocator.kill_by_locals(index);
        if two_word { self.allocator.kill_by_locals(index + 1); }
        Ok(())
    }

    /** Forgets the contents of local `index`. */
    fn invalidate_local(&mut self, index: usize) -> Result<(), CompileError> {
        let mut old = self.frame.set_local(index, Value::new(BasicType::Illegal), false).into_value();
        self.allocator.kill_by_locals(index);
        old.destroy(&mut self.allocator)
    }

    /**
     * Writes every value that is not yet in memory to its home, keeping the
     * registers as a cache. Used before calls and at merge points.
     */
    pub fn flush_all(&mut self) {
        for loc in self.frame.locations_mut() {
            loc.write_back(&mut self.gen);
        }
    }

    /**
     * Prepares for a branch target: everything is flushed, and no notation
     * can be trusted because the other predecessors did not compute it.
     */
    pub fn merge_point(&mut self) {
        self.flush_all();
        self.allocator.wipe_all_notations();
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;
    use super::super::{register, Simulation, Content, Immediate};
    use super::super::register::{x86};
    use RegisterClass::*;
    use BasicType::*;

    fn context(layout: RegisterLayout) -> CompilerContext<Simulation> {
        CompilerContext::new(layout, CompilerConfig::default(), Simulation::new())
    }

    /** Pushes an `Int` constant, loaded into a register. */
    fn push_int(ctx: &mut CompilerContext<Simulation>, i: i32) -> Register {
        let mut v = Value::new(Int);
        v.set_int(i);
        v.materialize(ctx).unwrap();
        let reg = v.register().unwrap();
        ctx.push(v);
        reg
    }

    #[test]
    fn spill_and_reload() {
        let mut ctx = context(register::uniform(4));
        ctx.begin_method(0, 8);
        for i in 0..4 { push_int(&mut ctx, 10 + i); }
        assert_eq!(ctx.gen().num_stores(), 0);
        let mut v = Value::new(Int);
        v.assign_register(&mut ctx).unwrap();
        // The victim is the first register after the spill cursor.
        assert_eq!(v.register(), Some(Register(0)));
        assert_eq!(ctx.gen().num_stores(), 1);
        assert_eq!(ctx.allocator().ref_count(Register(0)), 1);
        assert!(ctx.frame().peek(3).unwrap().is_in_memory_only());
        assert_eq!(ctx.gen().memory(Home::Stack(0)), Some(Content::Word(10)));
        v.destroy(ctx.allocator_mut()).unwrap();
        for _ in 0..3 {
            ctx.pop().unwrap().destroy(ctx.allocator_mut()).unwrap();
        }
        let mut bottom = ctx.pop().unwrap();
        let reg = bottom.register().unwrap();
        assert_eq!(ctx.gen().register(reg), Some(Content::Word(10)));
        bottom.destroy(ctx.allocator_mut()).unwrap();
        assert_eq!(ctx.finish_method(), Ok(()));
    }

    #[test]
    fn shared_registers_are_not_spilled() {
        let mut ctx = context(register::uniform(2));
        ctx.begin_method(0, 4);
        let shared = push_int(&mut ctx, 1);
        ctx.dup().unwrap();
        push_int(&mut ctx, 2);
        let reg = ctx.allocate(General).unwrap();
        assert_ne!(reg, shared);
        assert!(ctx.frame().peek(0).unwrap().is_in_memory_only());
        assert!(ctx.frame().peek(1).unwrap().value().names(shared));
        ctx.allocator_mut().dereference(reg).unwrap();
        assert_eq!(ctx.finish_method(), Ok(()));
    }

    #[test]
    fn exhausted() {
        let mut ctx = context(register::uniform(2));
        ctx.begin_method(0, 0);
        ctx.allocate(General).unwrap();
        ctx.allocate(General).unwrap();
        assert!(!ctx.has_free(1, General, true));
        assert_eq!(ctx.allocate(General), Err(CompileError::RegistersExhausted {class: General}));
    }

    #[test]
    fn spill_pair_and_reload() {
        let mut ctx = context(register::uniform(4));
        ctx.begin_method(0, 4);
        let mut v = Value::new(Long);
        v.set_long(0x1_0000_0002);
        v.materialize(&mut ctx).unwrap();
        ctx.push(v);
        ctx.spill(General).unwrap();
        assert!(ctx.frame().peek(0).unwrap().is_in_memory_only());
        assert!(ctx.allocator().referenced_registers().is_empty());
        let mut v = ctx.pop().unwrap();
        assert_eq!(v.ty(), Long);
        assert_eq!(ctx.gen().register(v.register().unwrap()), Some(Content::Word(2)));
        assert_eq!(ctx.gen().register(v.hi_register().unwrap()), Some(Content::Word(1)));
        v.destroy(ctx.allocator_mut()).unwrap();
        assert_eq!(ctx.finish_method(), Ok(()));
    }

    #[test]
    fn allocate_specific() {
        let mut ctx = context(x86::layout());
        ctx.begin_method(0, 4);
        let mut v = Value::new(Int);
        v.set_register(ctx.allocate_specific(x86::EAX).unwrap());
        ctx.push(v);
        assert_eq!(ctx.allocate_specific(x86::EAX), Ok(x86::EAX));
        assert_eq!(ctx.gen().num_stores(), 1);
        assert!(ctx.frame().peek(0).unwrap().is_in_memory_only());
        assert_eq!(ctx.allocate_specific(x86::EAX), Err(CompileError::RegisterPinned(x86::EAX)));
        assert_eq!(ctx.allocate_specific(x86::ESP), Err(CompileError::BadSpecificRegister(x86::ESP)));
        assert!(ctx.is_mapping_something(x86::EAX));
        assert!(!ctx.is_mapping_something(x86::EDX));
    }

    #[test]
    fn has_free() {
        let mut ctx = context(register::uniform(3));
        ctx.begin_method(0, 4);
        push_int(&mut ctx, 1);
        let held = ctx.allocate(General).unwrap();
        assert!(ctx.has_free(1, General, false));
        assert!(!ctx.has_free(2, General, false));
        assert!(ctx.has_free(2, General, true));
        assert!(!ctx.has_free(3, General, true));
        // Nothing was spilled.
        assert_eq!(ctx.gen().num_stores(), 0);
        ctx.allocator_mut().dereference(held).unwrap();
    }

    #[test]
    fn compile_method() {
        let mut ctx = context(register::uniform(2));
        let result = ctx.compile_method(0, 0, |ctx| {
            ctx.allocate(General)?;
            ctx.allocate(General)?;
            ctx.allocate(General).map(|_| ())
        });
        assert_eq!(result, Err(CompileError::RegistersExhausted {class: General}));
        assert!(ctx.allocator().referenced_registers().is_empty());

        let result = ctx.compile_method(0, 0, |ctx| ctx.allocate(General));
        assert!(matches!(result, Err(CompileError::LeakedRegisters(_))));
        assert!(ctx.allocator().referenced_registers().is_empty());

        let result = ctx.compile_method(1, 2, |ctx| {
            push_int(ctx, 3);
            ctx.store_local(0)?;
            Ok(7)
        });
        assert_eq!(result, Ok(7));
        assert!(ctx.allocator().referenced_registers().is_empty());
    }

    #[test]
    fn load_and_store_local() {
        let mut ctx = context(register::uniform(4));
        ctx.begin_method(2, 4);
        ctx.frame.declare_local(0, Int);
        ctx.gen_mut().poke(Home::Local(0), Content::Word(5));
        ctx.load_local(0).unwrap();
        let reg = ctx.frame().peek(0).unwrap().value().register().unwrap();
        assert_eq!(ctx.gen().register(reg), Some(Content::Word(5)));
        // The local keeps the register as a cache.
        assert_eq!(ctx.allocator().ref_count(reg), 2);
        ctx.allocator_mut().set_notation(reg, 0, 1, Int);
        assert_eq!(ctx.allocator().find_notation(0, 1), Some(reg));

        let mut v = Value::new(Int);
        v.set_int(1);
        ctx.push(v);
        ctx.store_local(0).unwrap();
        assert!(!ctx.allocator().is_notated(reg));
        assert_eq!(ctx.allocator().ref_count(reg), 1);
        assert_eq!(ctx.frame().local(0).value().immediate(), Some(Immediate::Int(1)));

        ctx.load_local(0).unwrap();
        assert_eq!(ctx.frame().depth(), 2);
        assert_eq!(ctx.finish_method(), Ok(()));
    }

    #[test]
    fn cached_local_keeps_dependency() {
        let mut ctx = context(register::uniform(4));
        ctx.begin_method(1, 4);
        ctx.frame.declare_local(0, Int);
        ctx.gen_mut().poke(Home::Local(0), Content::Word(5));
        ctx.load_local(0).unwrap();
        ctx.pop().unwrap().destroy(ctx.allocator_mut()).unwrap();
        // This time the local's register is reused.
        ctx.load_local(0).unwrap();
        assert_eq!(ctx.gen().instructions().len(), 1);
        let reg = ctx.frame().peek(0).unwrap().value().register().unwrap();
        ctx.allocator_mut().set_notation(reg, 7, 1, Int);
        let mut v = Value::new(Int);
        v.set_int(1);
        ctx.push(v);
        ctx.store_local(0).unwrap();
        assert!(!ctx.allocator().is_notated(reg));
        assert_eq!(ctx.allocator().find_notation(7, 1), None);
        assert_eq!(ctx.finish_method(), Ok(()));
    }

    #[test]
    fn underflow() {
        let mut ctx = context(register::uniform(2));
        ctx.begin_method(0, 2);
        assert_eq!(ctx.pop().err(), Some(CompileError::StackUnderflow));
        let result = ctx.compile_method(0, 2, |ctx| ctx.dup());
        assert_eq!(result, Err(CompileError::StackUnderflow));
    }

    #[test]
    fn spill_for_byte_register() {
        let mut ctx = context(x86::layout());
        ctx.begin_method(0, 8);
        // Fills EAX, EDX, ECX, EBX, ESI, EDI.
        for i in 0..6 { push_int(&mut ctx, 10 + i); }
        let reg = ctx.allocate_byte_register().unwrap();
        assert_eq!(reg, x86::EAX);
        assert_eq!(ctx.gen().num_stores(), 1);
        assert_eq!(ctx.gen().memory(Home::Stack(0)), Some(Content::Word(10)));
        assert!(ctx.frame().peek(5).unwrap().is_in_memory_only());
        assert!(ctx.frame().peek(4).unwrap().value().in_register());
        ctx.allocator_mut().dereference(reg).unwrap();
        assert_eq!(ctx.finish_method(), Ok(()));
    }

    #[test]
    fn spill_for_float_register() {
        let mut ctx = context(x86::layout());
        ctx.begin_method(0, 8);
        for i in 0..8 {
            let mut v = Value::new(BasicType::Float);
            v.set_float(1.5 + i as f32);
            v.materialize(&mut ctx).unwrap();
            ctx.push(v);
        }
        // General registers are free, but do not help.
        assert!(!ctx.has_free(1, RegisterClass::Float, false));
        let reg = ctx.allocate_float_register().unwrap();
        assert_eq!(reg, x86::XMM[0]);
        assert_eq!(ctx.gen().num_stores(), 1);
        assert_eq!(ctx.gen().memory(Home::Stack(0)), Some(Content::Word(1.5f32.to_bits())));
        assert!(ctx.frame().peek(7).unwrap().is_in_memory_only());
        ctx.allocator_mut().dereference(reg).unwrap();
        assert_eq!(ctx.finish_method(), Ok(()));
    }

    #[test]
    fn store_two_word_local() {
        let mut ctx = context(register::uniform(4));
        ctx.begin_method(3, 4);
        push_int(&mut ctx, 9);
        ctx.store_local(1).unwrap();
        let mut v = Value::new(Double);
        v.set_double(0.5);
        ctx.push(v);
        ctx.store_local(0).unwrap();
        // Local 1 was the high half of the double.
        assert_eq!(ctx.frame().local(1).value().ty(), Illegal);
        assert!(ctx.allocator().referenced_registers().is_empty());
        assert_eq!(ctx.finish_method(), Ok(()));
    }

    #[test]
    fn merge_point() {
        let mut ctx = context(register::uniform(4));
        ctx.begin_method(0, 4);
        let reg = push_int(&mut ctx, 6);
        ctx.allocator_mut().set_notation(reg, 3, 2, Int);
        ctx.allocator_mut().set_bound_mark(reg);
        ctx.merge_point();
        assert!(!ctx.allocator().is_notated(reg));
        assert_eq!(ctx.gen().memory(Home::Stack(0)), Some(Content::Word(6)));
        assert!(ctx.frame().peek(0).unwrap().is_flushed());
        assert!(ctx.frame().peek(0).unwrap().value().in_register());
        assert_eq!(ctx.finish_method(), Ok(()));
    }
}
