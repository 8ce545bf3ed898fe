use std::fmt::{self, Debug, Formatter};

/**
 * A set of up to 32 small integers, internally a bitmask.
 *
 * Indices that do not fit are folded modulo 32. A `Bits32` used to record
 * dependencies therefore over-approximates: a membership test may report an
 * index that was never inserted, but never misses one that was.
 */
#[derive(Copy, Clone, Default, Hash, PartialEq, Eq)]
pub struct Bits32(pub u32);

impl Bits32 {
    pub const EMPTY: Bits32 = Bits32(0);

    fn bit(index: usize) -> u32 { 1 << (index % 32) }

    pub fn insert(&mut self, index: usize) { self.0 |= Self::bit(index); }

    pub fn contains(self, index: usize) -> bool { self.0 & Self::bit(index) != 0 }

    /** Yields the members in increasing order. */
    pub fn iter(self) -> impl Iterator<Item=usize> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 { return None; }
            let i = bits.trailing_zeros();
            bits &= bits - 1;
            Some(i as usize)
        })
    }
}

impl std::ops::BitOrAssign for Bits32 {
    fn bitor_assign(&mut self, rhs: Self) { self.0 |= rhs.0; }
}

impl Debug for Bits32 {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_set().entries(self.iter()).finish()
    }
}

//-----------------------------------------------------------------------------
