use std::fmt::{self, Debug, Formatter};

use crate::util::{AsUsize};

/**
 * One of a fixed number of abstract machine registers.
 *
 * A `Register` is only a handle. Ownership is tracked by reference counts in
 * the [`RegisterAllocator`]. Indices at or beyond the
 * [`RegisterLayout::len()`] of the current CPU are pseudo-registers: aliases
 * that are not real resources and are ignored by reference counting.
 *
 * [`RegisterAllocator`]: super::RegisterAllocator
 */
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Register(pub u8);

impl Debug for Register {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        write!(f, "r{}", self.0)
    }
}

impl AsUsize for Register {
    fn as_usize(self) -> usize { self.0 as usize }
}

/** The subsets of the registers that the allocator hands out. */
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
#[repr(u8)]
pub enum RegisterClass {
    General = 0,
    /** General-purpose registers whose low byte is addressable. */
    Byte = 1,
    Float = 2,
}

pub const ALL_CLASSES: [RegisterClass; 3] = [
    RegisterClass::General, RegisterClass::Byte, RegisterClass::Float,
];

//-----------------------------------------------------------------------------

/**
 * The CPU-specific register conventions: how many registers exist, which of
 * them may be allocated, and the round-robin order in which each
 * [`RegisterClass`] is visited.
 *
 * A register may belong to several classes. On CPUs without separate
 * floating-point registers, the float class lists general registers.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterLayout {
    /** The number of real registers. */
    num_registers: usize,
    /** The allocatable registers of each class, in round-robin order. */
    classes: [Box<[Register]>; 3],
}

impl RegisterLayout {
    /**
     * Constructs a `RegisterLayout`.
     * Panics if a register is out of range or listed twice in one class.
     */
    pub fn new(
        num_registers: usize,
        general: &[Register],
        byte: &[Register],
        float: &[Register],
    ) -> Self {
        assert!(num_registers <= u8::MAX as usize);
        for class in [general, byte, float] {
            for (i, &reg) in class.iter().enumerate() {
                assert!(reg.as_usize() < num_registers, "{:?} out of range", reg);
                assert!(!class[..i].contains(&reg), "{:?} listed twice", reg);
            }
        }
        RegisterLayout {
            num_registers,
            classes: [general.into(), byte.into(), float.into()],
        }
    }

    /** The number of real registers, allocatable or not. */
    pub fn len(&self) -> usize { self.num_registers }

    pub fn is_empty(&self) -> bool { self.num_registers == 0 }

    /** Tests whether `reg` is a real register rather than a pseudo-register. */
    pub fn is_real(&self, reg: Register) -> bool { reg.as_usize() < self.num_registers }

    /** The allocatable members of `class` in round-robin order. */
    pub fn members(&self, class: RegisterClass) -> &[Register] {
        &self.classes[class as usize]
    }

    /** Tests whether `reg` is allocatable in any class. */
    pub fn is_allocatable(&self, reg: Register) -> bool {
        ALL_CLASSES.iter().any(|&class| self.members(class).contains(&reg))
    }

    /**
     * The successor of `reg` in the round-robin order of `class`, or `None`
     * if `reg` is not a member of `class`.
     */
    pub fn next(&self, class: RegisterClass, reg: Register) -> Option<Register> {
        let members = self.members(class);
        members.iter().position(|&r| r == reg)
            .map(|i| members[(i + 1) % members.len()])
    }

    /** Iterates through all real registers. */
    pub fn all_registers(&self) -> impl Iterator<Item=Register> {
        (0..self.num_registers).map(|i| Register(i as u8))
    }
}

//-----------------------------------------------------------------------------

/**
 * `n` interchangeable registers. Every register is byte-addressable and
 * floating-point values share them.
 */
pub fn uniform(n: usize) -> RegisterLayout {
    let regs: Vec<Register> = (0..n).map(|i| Register(i as u8)).collect();
    RegisterLayout::new(n, &regs, &regs, &regs)
}

/** Registers of 32-bit x86. */
pub mod x86 {
    use super::{Register, RegisterLayout};

    pub const EAX: Register = Register(0);
    pub const ECX: Register = Register(1);
    pub const EDX: Register = Register(2);
    pub const EBX: Register = Register(3);
    // ESP is the native stack pointer.
    pub const ESP: Register = Register(4);
    // EBP is the frame pointer.
    pub const EBP: Register = Register(5);
    pub const ESI: Register = Register(6);
    pub const EDI: Register = Register(7);

    pub const XMM: [Register; 8] = [
        Register(8), Register(9), Register(10), Register(11),
        Register(12), Register(13), Register(14), Register(15),
    ];

    pub fn layout() -> RegisterLayout {
        RegisterLayout::new(
            16,
            &[EAX, EDX, ECX, EBX, ESI, EDI],
            &[EAX, EDX, ECX, EBX],
            &XMM,
        )
    }
}

/** Registers of 32-bit ARM with a VFP unit. */
pub mod arm {
    use super::{Register, RegisterLayout};

    // R11 is the frame pointer. R13 to R15 are SP, LR and PC.
    pub const FP: Register = Register(11);
    pub const SP: Register = Register(13);
    pub const LR: Register = Register(14);
    pub const PC: Register = Register(15);

    /** The register holding the VM globals pointer. Never allocated. */
    pub const GP: Register = Register(5);

    /** `S0` to `S15` are registers 16 to 31. */
    pub fn s(i: u8) -> Register {
        assert!(i < 16);
        Register(16 + i)
    }

    pub fn layout() -> RegisterLayout {
        let general: Vec<Register> = [0, 1, 2, 3, 4, 6, 7, 8, 9, 10, 12]
            .iter().map(|&i| Register(i)).collect();
        let float: Vec<Register> = (0..16).map(s).collect();
        RegisterLayout::new(32, &general, &general, &float)
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn successor_wraps() {
        let layout = uniform(4);
        assert_eq!(layout.next(RegisterClass::General, Register(3)), Some(Register(0)));
        assert_eq!(layout.next(RegisterClass::General, Register(1)), Some(Register(2)));
        assert_eq!(layout.next(RegisterClass::General, Register(7)), None);
    }

    #[test]
    fn x86_subsets() {
        let layout = x86::layout();
        assert!(!layout.is_allocatable(x86::ESP));
        assert!(!layout.is_allocatable(x86::EBP));
        assert!(layout.members(RegisterClass::Byte).iter()
            .all(|r| layout.members(RegisterClass::General).contains(r)));
        assert!(!layout.members(RegisterClass::Byte).contains(&x86::ESI));
        assert_eq!(layout.next(RegisterClass::Float, x86::XMM[7]), Some(x86::XMM[0]));
    }

    #[test]
    fn arm_reserved() {
        let layout = arm::layout();
        for reg in [arm::GP, arm::FP, arm::SP, arm::LR, arm::PC] {
            assert!(!layout.is_allocatable(reg));
        }
        assert!(layout.is_real(arm::s(15)));
        assert!(!layout.is_real(Register(32)));
    }

    #[test]
    #[should_panic]
    fn duplicate() {
        RegisterLayout::new(2, &[Register(0), Register(0)], &[], &[]);
    }
}
