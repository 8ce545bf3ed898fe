use std::fmt::{self, Debug, Formatter};

use super::{Register, RegisterClass, RegisterAllocator, BasicType, CompileError};
use super::{CodeGenerator, CompilerContext};
use crate::oop::{Oop};

/** A constant that can be encoded without a register. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Immediate {
    Int(i32),
    Long(i64),
    /** The IEEE bits of a `float`. */
    Float(u32),
    /** The IEEE bits of a `double`. */
    Double(u64),
    /** The null reference. No other object reference is ever immediate. */
    Null,
}

impl Immediate {
    /** The low word and, for two-word constants, the high word. */
    pub fn words(self) -> (u32, Option<u32>) {
        match self {
            Immediate::Int(i) => (i as u32, None),
            Immediate::Float(bits) => (bits, None),
            Immediate::Null => (0, None),
            Immediate::Long(l) => (l as u32, Some((l >> 32) as u32)),
            Immediate::Double(bits) => (bits as u32, Some((bits >> 32) as u32)),
        }
    }
}

/** Where the compiler currently keeps a [`Value`]. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Where {
    /** Not materialized anywhere the compiler tracks. */
    Nowhere,
    Immediate(Immediate),
    /** A one-word value in a register. */
    Register(Register),
    /** A two-word value. The registers always differ. */
    Pair {lo: Register, hi: Register},
}

//-----------------------------------------------------------------------------

/** Facts known about a [`Value`] at compile time. */
#[derive(Copy, Clone, Default, Hash, PartialEq, Eq)]
pub struct ValueFlags(u8);

impl ValueFlags {
    pub const MUST_BE_NULL: ValueFlags = ValueFlags(0x01);
    pub const MUST_BE_NONNULL: ValueFlags = ValueFlags(0x02);
    /** The referent is in ROM or the permanent area, never in the heap. */
    pub const NOT_ON_HEAP: ValueFlags = ValueFlags(0x04);
    pub const IS_STRING: ValueFlags = ValueFlags(0x08);
    /** The class of the referent is exactly [`Value::class_id()`]. */
    pub const HAS_EXACT_TYPE: ValueFlags = ValueFlags(0x10);
    /** The array is at least [`Value::min_length()`] elements long. */
    pub const HAS_KNOWN_MIN_LENGTH: ValueFlags = ValueFlags(0x20);
    /** The array's length was checked against the current bound mark. */
    pub const ARRAY_LENGTH_CHECKED: ValueFlags = ValueFlags(0x40);

    pub fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }
}

impl std::ops::BitOr for ValueFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output { ValueFlags(self.0 | rhs.0) }
}

impl Debug for ValueFlags {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        write!(f, "{:#04x}", self.0)
    }
}

//-----------------------------------------------------------------------------

/** The value of a static field, as recorded in its class. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /** Primitive values, zero-extended. */
    Bits(u64),
    Oop(Oop),
}

/** What the compiler knows about a field it is reading. */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StaticField {
    pub ty: BasicType,
    pub is_static: bool,
    pub is_final: bool,
    pub value: FieldValue,
}

//-----------------------------------------------------------------------------

/**
 * One slot of the Java operand stack or of the local variables, during
 * compilation.
 *
 * A `Value` in a register owns one reference to each register it names.
 * Those references are given back by [`destroy()`], which must be called
 * before the `Value` is dropped. `Value` is deliberately not `Clone`: use
 * [`copy()`], which takes new references.
 *
 * [`destroy()`]: Self::destroy
 * [`copy()`]: Self::copy
 */
#[derive(PartialEq, Eq)]
pub struct Value {
    ty: BasicType,
    loc: Where,
    flags: ValueFlags,
    class_id: u16,
    min_length: u32,
}

/** The class of register needed to hold a value of type `ty`. */
pub fn register_class(ty: BasicType) -> RegisterClass {
    if ty.is_float() { RegisterClass::Float } else { RegisterClass::General }
}

impl Value {
    pub fn new(ty: BasicType) -> Self {
        Value {ty, loc: Where::Nowhere, flags: ValueFlags::default(), class_id: 0, min_length: 0}
    }

    pub fn ty(&self) -> BasicType { self.ty }

    pub fn where_(&self) -> Where { self.loc }

    pub fn is_present(&self) -> bool { self.loc != Where::Nowhere }

    pub fn in_register(&self) -> bool {
        matches!(self.loc, Where::Register(_) | Where::Pair {..})
    }

    pub fn is_immediate(&self) -> bool { matches!(self.loc, Where::Immediate(_)) }

    pub fn immediate(&self) -> Option<Immediate> {
        if let Where::Immediate(imm) = self.loc { Some(imm) } else { None }
    }

    /** The register holding a one-word value, or the low half of a two-word value. */
    pub fn register(&self) -> Option<Register> {
        match self.loc {
            Where::Register(reg) => Some(reg),
            Where::Pair {lo, ..} => Some(lo),
            _ => None,
        }
    }

    /** The register holding the high half of a two-word value. */
    pub fn hi_register(&self) -> Option<Register> {
        if let Where::Pair {hi, ..} = self.loc { Some(hi) } else { None }
    }

    /** Every register this `Value` holds a reference to. */
    pub fn registers(&self) -> impl Iterator<Item=Register> {
        let (lo, hi) = match self.loc {
            Where::Register(reg) => (Some(reg), None),
            Where::Pair {lo, hi} => (Some(lo), Some(hi)),
            _ => (None, None),
        };
        lo.into_iter().chain(hi)
    }

    pub fn names(&self, reg: Register) -> bool {
        self.registers().any(|r| r == reg)
    }

    // Immediates.

    fn set_immediate(&mut self, imm: Immediate) {
        debug_assert!(!self.in_register(), "{:?} would leak its registers", self);
        self.loc = Where::Immediate(imm);
    }

    pub fn set_int(&mut self, value: i32) {
        debug_assert!(self.ty.is_int_like(), "set_int on {:?}", self.ty);
        self.set_immediate(Immediate::Int(value));
    }

    pub fn set_long(&mut self, value: i64) {
        debug_assert_eq!(self.ty, BasicType::Long);
        self.set_immediate(Immediate::Long(value));
    }

    pub fn set_float(&mut self, value: f32) {
        debug_assert_eq!(self.ty, BasicType::Float);
        self.set_immediate(Immediate::Float(value.to_bits()));
    }

    pub fn set_double(&mut self, value: f64) {
        debug_assert_eq!(self.ty, BasicType::Double);
        self.set_immediate(Immediate::Double(value.to_bits()));
    }

    /**
     * Sets this reference-typed `Value` to `oop`. The null reference becomes
     * an immediate. Any other reference is loaded into a register, because
     * the collector cannot relocate an untracked immediate operand.
     */
    pub fn set_obj<G: CodeGenerator>(
        &mut self,
        oop: Oop,
        ctx: &mut CompilerContext<G>,
    ) -> Result<(), CompileError> {
        debug_assert!(self.ty.is_reference(), "set_obj on {:?}", self.ty);
        if oop.is_null() {
            self.set_immediate(Immediate::Null);
            self.set_flag(ValueFlags::MUST_BE_NULL, true);
            return Ok(());
        }
        let reg = ctx.allocate(RegisterClass::General)?;
        ctx.gen.load_oop(reg, oop);
        self.set_register(reg);
        self.set_flag(ValueFlags::MUST_BE_NONNULL, true);
        Ok(())
    }

    /**
     * Folds the value of `field` into an immediate, if that is allowed.
     * Returns `false` if the field must be read at run time: it is not both
     * `static` and `final`, or it is an object that might be relocated into
     * a different part of a relocatable image.
     */
    pub fn set_immediate_from_static_field<G: CodeGenerator>(
        &mut self,
        field: &StaticField,
        ctx: &mut CompilerContext<G>,
    ) -> Result<bool, CompileError> {
        if !(field.is_static && field.is_final) { return Ok(false); }
        debug_assert_eq!(self.ty, field.ty);
        match (field.ty, field.value) {
            (ty, FieldValue::Bits(bits)) if ty.is_int_like() => self.set_int(bits as i32),
            (BasicType::Long, FieldValue::Bits(bits)) => self.set_long(bits as i64),
            (BasicType::Float, FieldValue::Bits(bits)) => self.set_float(f32::from_bits(bits as u32)),
            (BasicType::Double, FieldValue::Bits(bits)) => self.set_double(f64::from_bits(bits)),
            (ty, FieldValue::Oop(oop)) if ty.is_reference() => {
                if ctx.config.relocatable_image && !oop.is_null() { return Ok(false); }
                self.set_obj(oop, ctx)?;
            },
            _ => return Ok(false),
        }
        Ok(true)
    }

    // Registers.

    /**
     * Puts this one-word `Value` in `reg`. Takes over a reference that the
     * caller already holds, e.g. from [`CompilerContext::allocate()`].
     */
    pub fn set_register(&mut self, reg: Register) {
        debug_assert!(!self.ty.is_two_word(), "{:?} needs two registers", self.ty);
        debug_assert!(!self.in_register(), "{:?} would leak its registers", self);
        self.loc = Where::Register(reg);
    }

    /**
     * Puts this two-word `Value` in `lo` and `hi`. Takes over references
     * that the caller already holds.
     */
    pub fn set_registers(&mut self, lo: Register, hi: Register) -> Result<(), CompileError> {
        debug_assert!(self.ty.is_two_word(), "{:?} needs one register", self.ty);
        debug_assert!(!self.in_register(), "{:?} would leak its registers", self);
        if lo == hi { return Err(CompileError::OverlappingPair(lo)); }
        self.loc = Where::Pair {lo, hi};
        Ok(())
    }

    /** Allocates registers of the right class and number for this `Value`. */
    fn allocate_registers<G: CodeGenerator>(
        &self,
        ctx: &mut CompilerContext<G>,
    ) -> Result<Where, CompileError> {
        let class = register_class(self.ty);
        let lo = ctx.allocate(class)?;
        if !self.ty.is_two_word() { return Ok(Where::Register(lo)); }
        match ctx.allocate(class) {
            Ok(hi) => Ok(Where::Pair {lo, hi}),
            Err(e) => {
                ctx.allocator.dereference(lo)?;
                Err(e)
            },
        }
    }

    /**
     * Ensures this `Value` is in registers. An immediate is loaded; a
     * `Value` that is nowhere gets fresh registers for the code generator to
     * compute it into.
     */
    pub fn assign_register<G: CodeGenerator>(
        &mut self,
        ctx: &mut CompilerContext<G>,
    ) -> Result<(), CompileError> {
        match self.loc {
            Where::Register(_) | Where::Pair {..} => Ok(()),
            Where::Immediate(_) => self.materialize(ctx),
            Where::Nowhere => {
                self.loc = self.allocate_registers(ctx)?;
                Ok(())
            },
        }
    }

    /**
     * Loads an immediate into registers. The knowledge of the constant is
     * kept in the flags where it matters (e.g. `MUST_BE_NULL`).
     * Does nothing if this `Value` is not an immediate.
     */
    pub fn materialize<G: CodeGenerator>(
        &mut self,
        ctx: &mut CompilerContext<G>,
    ) -> Result<(), CompileError> {
        let imm = match self.loc {
            Where::Immediate(imm) => imm,
            _ => return Ok(()),
        };
        let loc = self.allocate_registers(ctx)?;
        match (loc, imm) {
            (Where::Register(reg), Immediate::Null) => ctx.gen.load_oop(reg, Oop::NULL),
            (Where::Register(reg), imm) => ctx.gen.load_word(reg, imm.words().0),
            (Where::Pair {lo, hi}, imm) => {
                let (lo_bits, hi_bits) = imm.words();
                ctx.gen.load_word(lo, lo_bits);
                ctx.gen.load_word(hi, hi_bits.unwrap_or(0));
            },
            _ => unreachable!(),
        }
        self.loc = loc;
        Ok(())
    }

    /** Gives back all registers and forgets where this `Value` was. */
    pub fn destroy(&mut self, ra: &mut RegisterAllocator) -> Result<(), CompileError> {
        self.flags = ValueFlags::default();
        self.release(ra)
    }

    /**
     * Gives back all registers, keeping the type and flags, e.g. because the
     * value now lives in memory.
     */
    pub(super) fn release(&mut self, ra: &mut RegisterAllocator) -> Result<(), CompileError> {
        let regs: Vec<Register> = self.registers().collect();
        self.loc = Where::Nowhere;
        for reg in regs { ra.dereference(reg)?; }
        Ok(())
    }

    /**
     * Forgets where this `Value` was without giving back its registers.
     * Only for use when the allocator is about to be reset.
     */
    pub(super) fn forget(&mut self) {
        self.loc = Where::Nowhere;
    }

    /**
     * Returns a second `Value` in the same place, e.g. for `dup`. Registers
     * are shared and gain a reference each. Their notations are wiped: the
     * duplicate is not the result of the original bytecodes.
     */
    pub fn copy(&self, ra: &mut RegisterAllocator) -> Value {
        for reg in self.registers() {
            ra.reference(reg);
            ra.wipe_notation_of(reg);
        }
        Value {..*self}
    }

    /**
     * Returns this `Value` in registers that the caller may overwrite. If
     * `self` is the only referencer of its registers, they are reused
     * directly; otherwise the value is moved to fresh registers and `self`
     * gives up its references.
     */
    pub fn writable_copy<G: CodeGenerator>(
        mut self,
        ctx: &mut CompilerContext<G>,
    ) -> Result<Value, CompileError> {
        match self.loc {
            Where::Nowhere => Ok(self),
            Where::Immediate(_) => {
                self.materialize(ctx)?;
                Ok(self)
            },
            Where::Register(_) | Where::Pair {..} => {
                if self.registers().all(|reg| ctx.allocator.ref_count(reg) == 1) {
                    for reg in self.registers() { ctx.allocator.wipe_notation_of(reg); }
                    return Ok(self);
                }
                let loc = self.allocate_registers(ctx)?;
                let ret = Value {loc, ..self};
                for (dst, src) in ret.registers().zip(self.registers()) {
                    ctx.gen.move_register(dst, src);
                }
                self.destroy(&mut ctx.allocator)?;
                Ok(ret)
            },
        }
    }

    // Flags.

    pub fn flags(&self) -> ValueFlags { self.flags }

    fn set_flag(&mut self, flag: ValueFlags, on: bool) {
        if on { self.flags.0 |= flag.0; } else { self.flags.0 &= !flag.0; }
    }

    pub fn must_be_null(&self) -> bool { self.flags.contains(ValueFlags::MUST_BE_NULL) }

    pub fn set_must_be_null(&mut self) {
        self.set_flag(ValueFlags::MUST_BE_NONNULL, false);
        self.set_flag(ValueFlags::MUST_BE_NULL, true);
    }

    pub fn must_be_nonnull(&self) -> bool { self.flags.contains(ValueFlags::MUST_BE_NONNULL) }

    pub fn set_must_be_nonnull(&mut self) {
        self.set_flag(ValueFlags::MUST_BE_NULL, false);
        self.set_flag(ValueFlags::MUST_BE_NONNULL, true);
    }

    pub fn not_on_heap(&self) -> bool { self.flags.contains(ValueFlags::NOT_ON_HEAP) }

    pub fn set_not_on_heap(&mut self) { self.set_flag(ValueFlags::NOT_ON_HEAP, true); }

    pub fn is_string(&self) -> bool { self.flags.contains(ValueFlags::IS_STRING) }

    /** Marks the referent as a `java.lang.String` of class `class_id`. */
    pub fn set_is_string(&mut self, class_id: u16) {
        self.set_flag(ValueFlags::IS_STRING, true);
        self.set_exact_type(class_id);
    }

    /** The exact class of the referent, if known. */
    pub fn class_id(&self) -> Option<u16> {
        if self.flags.contains(ValueFlags::HAS_EXACT_TYPE) { Some(self.class_id) } else { None }
    }

    pub fn set_exact_type(&mut self, class_id: u16) {
        self.set_flag(ValueFlags::HAS_EXACT_TYPE, true);
        self.class_id = class_id;
    }

    /** A lower bound on the length of the array, if known. */
    pub fn min_length(&self) -> Option<u32> {
        if self.flags.contains(ValueFlags::HAS_KNOWN_MIN_LENGTH) { Some(self.min_length) } else { None }
    }

    pub fn set_min_length(&mut self, length: u32) {
        self.set_flag(ValueFlags::HAS_KNOWN_MIN_LENGTH, true);
        self.min_length = length;
    }

    pub fn is_array_length_checked(&self) -> bool {
        self.flags.contains(ValueFlags::ARRAY_LENGTH_CHECKED)
    }

    pub fn set_array_length_checked(&mut self, on: bool) {
        self.set_flag(ValueFlags::ARRAY_LENGTH_CHECKED, on);
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        write!(f, "{:?}@{:?}", self.ty, self.loc)?;
        if self.flags != ValueFlags::default() {
            write!(f, " {:?}", self.flags)?;
        }
        Ok(())
    }
}

//-----------------------------------------------------------------------------
