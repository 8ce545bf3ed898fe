/** The basic types of Java values, as seen by the compiler. */
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
#[repr(u8)]
pub enum BasicType {
    Boolean = 4,
    Char = 5,
    Float = 6,
    Double = 7,
    Byte = 8,
    Short = 9,
    Int = 10,
    Long = 11,
    Object = 12,
    Array = 13,
    Illegal = 14,
}

use BasicType::*;

impl BasicType {
    /** The number of operand stack words occupied by a value of this type. */
    pub fn word_size(self) -> usize {
        if self.is_two_word() { 2 } else { 1 }
    }

    pub fn is_two_word(self) -> bool { matches!(self, Long | Double) }

    /** Types that are held as a 32-bit integer on the operand stack. */
    pub fn is_int_like(self) -> bool {
        matches!(self, Boolean | Char | Byte | Short | Int)
    }

    pub fn is_float(self) -> bool { matches!(self, Float | Double) }

    /** Types whose values are heap references. */
    pub fn is_reference(self) -> bool { matches!(self, Object | Array) }

    /** Types that need only one byte of storage in an array. */
    pub fn is_byte_sized(self) -> bool { matches!(self, Boolean | Byte) }

    /** A small integer, unique to this type, usable as a bitmap index. */
    pub fn tag(self) -> usize { self as usize }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(Long.word_size(), 2);
        assert_eq!(Double.word_size(), 2);
        assert_eq!(Array.word_size(), 1);
        assert!(Char.is_int_like());
        assert!(!Float.is_int_like());
        assert!(Array.is_reference());
        assert!(Illegal.tag() < 32);
    }
}
