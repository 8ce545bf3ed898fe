use std::fmt::{self, Debug, Formatter};

use crate::oop::{Oop};

/** Identifies a [`JavaThread`] within one [`Scheduler`](super::Scheduler). */
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl Debug for ThreadId {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        write!(f, "thread{}", self.0)
    }
}

/** Identifies a task (isolate): a group of threads suspended and resumed together. */
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskId(pub u32);

//-----------------------------------------------------------------------------

/**
 * A Java thread priority, from [`MIN`] to [`MAX`]. A numerically higher
 * priority is more urgent.
 *
 * [`MIN`]: Self::MIN
 * [`MAX`]: Self::MAX
 */
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(u8);

impl Priority {
    pub const MIN: Priority = Priority(1);
    pub const NORM: Priority = Priority(5);
    pub const MAX: Priority = Priority(10);

    /** Returns `None` unless `MIN <= p <= MAX`. */
    pub fn new(p: u8) -> Option<Self> {
        if (Self::MIN.0..=Self::MAX.0).contains(&p) { Some(Priority(p)) } else { None }
    }

    pub fn get(self) -> u8 { self.0 }

    /** The bit representing this priority in a set of priorities. */
    pub(super) fn bit(self) -> u16 { 1 << self.0 }

    /** The most urgent priority in a set of priorities, if any. */
    pub(super) fn most_urgent(bits: u16) -> Option<Self> {
        if bits == 0 { None } else { Some(Priority((15 - bits.leading_zeros()) as u8)) }
    }
}

impl Default for Priority {
    fn default() -> Self { Self::NORM }
}

impl Debug for Priority {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        write!(f, "p{}", self.0)
    }
}

//-----------------------------------------------------------------------------

/** Per-thread flags that are independent of the [`ThreadState`]. */
#[derive(Copy, Clone, Default, Hash, PartialEq, Eq)]
pub struct ThreadStatus(u8);

impl ThreadStatus {
    /** `Thread.interrupt()` was called and nobody has observed it yet. */
    pub const INTERRUPTED: Self = ThreadStatus(1);
    /** The thread will be terminated at its next scheduling decision point. */
    pub const TERMINATING: Self = ThreadStatus(2);

    pub fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }

    pub(super) fn insert(&mut self, other: Self) { self.0 |= other.0; }

    pub(super) fn remove(&mut self, other: Self) { self.0 &= !other.0; }
}

impl Debug for ThreadStatus {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        let mut names = Vec::new();
        if self.contains(Self::INTERRUPTED) { names.push("INTERRUPTED"); }
        if self.contains(Self::TERMINATING) { names.push("TERMINATING"); }
        write!(f, "{}", names.join(" | "))
    }
}

//-----------------------------------------------------------------------------

/**
 * Where a thread is in its life cycle. Each state other than `New`,
 * `Running`, `Suspended`, `BlockedAsync` and `Terminated` corresponds to
 * membership of exactly one queue. Deadlines are in milliseconds of the
 * scheduler's [`Clock`](super::Clock).
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ThreadState {
    /** Created but not yet started. */
    New,
    /** In the ready queue of its priority. */
    Ready,
    /** The current thread. */
    Running,
    /** In the wait set of `obj`'s monitor, optionally until `deadline`. */
    Waiting { obj: Oop, deadline: Option<u64> },
    /** In the entry queue of `obj`'s monitor. */
    Entering { obj: Oop },
    /** Asleep until `deadline`. */
    Sleeping { deadline: u64 },
    /**
     * Paused with the rest of its task. On resumption the thread sleeps
     * until `deadline` if there is one, and is otherwise ready.
     */
    Suspended { deadline: Option<u64> },
    /** Waiting for an external I/O event. */
    BlockedAsync,
    Terminated,
}

impl ThreadState {
    /** Tests whether the thread has been started and has not terminated. */
    pub fn is_alive(self) -> bool {
        !matches!(self, ThreadState::New | ThreadState::Terminated)
    }

    /** The object whose monitor the thread is queued on, if any. */
    pub fn monitor(self) -> Option<Oop> {
        match self {
            ThreadState::Waiting {obj, ..} | ThreadState::Entering {obj} => Some(obj),
            _ => None,
        }
    }
}

//-----------------------------------------------------------------------------

/**
 * The scheduler's record of one Java thread.
 *
 * The interpreter keeps its own per-thread state (e.g. the Java stack)
 * elsewhere. The scheduler only holds what it needs to make decisions, and
 * the object references that the collector must see.
 */
pub struct JavaThread {
    id: ThreadId,
    task: TaskId,
    pub(super) priority: Priority,
    pub(super) state: ThreadState,
    pub(super) status: ThreadStatus,
    /** The `java.lang.Thread` object. */
    pub thread_obj: Oop,
    /** An exception to be thrown when the thread next runs. */
    pub pending_exception: Option<Oop>,
    /** Other object references held on behalf of the thread. */
    pub roots: Vec<Oop>,
    /**
     * A monitor to re-acquire, and the recursion depth to restore, before
     * the thread runs again. Set while waiting and after a notify.
     */
    pub(super) reacquire: Option<(Oop, u32)>,
    /** Data that the I/O layer needs to resume an asynchronously blocked thread. */
    pub(super) reentry: Option<Box<[u8]>>,
}

impl JavaThread {
    pub(super) fn new(id: ThreadId, task: TaskId, priority: Priority, thread_obj: Oop) -> Self {
        JavaThread {
            id,
            task,
            priority,
            state: ThreadState::New,
            status: ThreadStatus::default(),
            thread_obj,
            pending_exception: None,
            roots: Vec::new(),
            reacquire: None,
            reentry: None,
        }
    }

    pub fn id(&self) -> ThreadId { self.id }

    pub fn task(&self) -> TaskId { self.task }

    pub fn priority(&self) -> Priority { self.priority }

    pub fn state(&self) -> ThreadState { self.state }

    pub fn status(&self) -> ThreadStatus { self.status }

    /** Visits every object reference held by this thread. */
    pub(super) fn oops_do(&mut self, f: &mut impl FnMut(&mut Oop)) {
        f(&mut self.thread_obj);
        if let Some(e) = self.pending_exception.as_mut() { f(e); }
        for oop in self.roots.iter_mut() { f(oop); }
        match &mut self.state {
            ThreadState::Waiting {obj, ..} | ThreadState::Entering {obj} => f(obj),
            _ => {},
        }
        if let Some((obj, _)) = self.reacquire.as_mut() { f(obj); }
    }
}

impl Debug for JavaThread {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        f.debug_struct("JavaThread")
            .field("id", &self.id)
            .field("task", &self.task)
            .field("priority", &self.priority)
            .field("state", &self.state)
            .field("status", &self.status)
            .finish()
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn priority_range() {
        assert_eq!(Priority::new(0), None);
        assert_eq!(Priority::new(11), None);
        assert_eq!(Priority::new(5), Some(Priority::NORM));
        assert!(Priority::MAX > Priority::MIN);
    }

    #[test]
    fn most_urgent() {
        assert_eq!(Priority::most_urgent(0), None);
        let bits = Priority::MIN.bit() | Priority::NORM.bit() | Priority::new(7).unwrap().bit();
        assert_eq!(Priority::most_urgent(bits), Priority::new(7));
        assert_eq!(Priority::most_urgent(Priority::MAX.bit()), Some(Priority::MAX));
        assert_eq!(Priority::most_urgent(Priority::MIN.bit()), Some(Priority::MIN));
    }

    #[test]
    fn status_flags() {
        let mut s = ThreadStatus::default();
        s.insert(ThreadStatus::INTERRUPTED);
        assert!(s.contains(ThreadStatus::INTERRUPTED));
        assert!(!s.contains(ThreadStatus::TERMINATING));
        s.remove(ThreadStatus::INTERRUPTED);
        assert_eq!(s, ThreadStatus::default());
    }

    #[test]
    fn oops_in_every_field() {
        let mut t = JavaThread::new(ThreadId(0), TaskId(0), Priority::NORM, Oop(0x10));
        t.pending_exception = Some(Oop(0x20));
        t.roots.push(Oop(0x30));
        t.state = ThreadState::Waiting {obj: Oop(0x40), deadline: None};
        t.reacquire = Some((Oop(0x40), 1));
        let mut seen = Vec::new();
        t.oops_do(&mut |oop: &mut Oop| { seen.push(*oop); oop.0 += 1; });
        assert_eq!(seen, vec![Oop(0x10), Oop(0x20), Oop(0x30), Oop(0x40), Oop(0x40)]);
        assert_eq!(t.state.monitor(), Some(Oop(0x41)));
        assert_eq!(t.thread_obj, Oop(0x11));
    }
}
