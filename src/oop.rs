/*!
 * Heap references.
 *
 * The execution core never dereferences an [`Oop`]. It only stores them,
 * compares them, and hands them to the garbage collector through traversal
 * entry points such as [`Scheduler::oops_do()`], which may rewrite them when
 * objects move.
 *
 * [`Scheduler::oops_do()`]: crate::scheduler::Scheduler::oops_do
 */

use std::fmt::{self, Debug, Formatter};

/** An ordinary object pointer: a heap reference the collector may relocate. */
#[derive(Copy, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Oop(pub u64);

impl Oop {
    pub const NULL: Oop = Oop(0);

    pub fn is_null(self) -> bool { self == Self::NULL }
}

impl Debug for Oop {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        if self.is_null() {
            f.write_str("null")
        } else {
            write!(f, "Oop({:#x})", self.0)
        }
    }
}
