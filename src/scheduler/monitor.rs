use std::collections::{VecDeque};

use indexmap::{IndexMap};

use super::{ThreadId, SchedulerError};
use crate::oop::{Oop};

/**
 * The monitor of one object: its owner and recursion depth, the threads
 * queued to enter it, and the threads in its wait set.
 */
#[derive(Debug, Default, Clone)]
pub struct Monitor {
    owner: Option<ThreadId>,
    depth: u32,
    /** Threads blocked in `monitor_enter`, with the depth they will own it at. */
    entrants: VecDeque<(ThreadId, u32)>,
    waiters: VecDeque<ThreadId>,
}

impl Monitor {
    pub fn owner(&self) -> Option<ThreadId> { self.owner }

    pub fn depth(&self) -> u32 { self.depth }

    pub fn entrants(&self) -> impl Iterator<Item=ThreadId> + '_ {
        self.entrants.iter().map(|&(t, _)| t)
    }

    pub fn waiters(&self) -> impl Iterator<Item=ThreadId> + '_ {
        self.waiters.iter().copied()
    }

    fn is_idle(&self) -> bool {
        self.owner.is_none() && self.entrants.is_empty() && self.waiters.is_empty()
    }

    /** Passes ownership to the first entrant, if any, and returns it. */
    fn hand_off(&mut self) -> Option<ThreadId> {
        let (next, depth) = match self.entrants.pop_front() {
            Some(entrant) => (Some(entrant.0), entrant.1),
            None => (None, 0),
        };
        self.owner = next;
        self.depth = depth;
        next
    }
}

//-----------------------------------------------------------------------------

/**
 * The [`Monitor`]s that are in use, keyed by object. A monitor with no
 * owner, no entrants and no waiters is forgotten.
 */
#[derive(Debug, Default, Clone)]
pub struct MonitorTable {
    monitors: IndexMap<Oop, Monitor>,
}

impl MonitorTable {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.monitors.len() }

    pub fn is_empty(&self) -> bool { self.monitors.is_empty() }

    pub fn get(&self, obj: Oop) -> Option<&Monitor> { self.monitors.get(&obj) }

    pub fn owner(&self, obj: Oop) -> Option<ThreadId> {
        self.get(obj).and_then(Monitor::owner)
    }

    fn prune(&mut self, obj: Oop) {
        if self.monitors.get(&obj).map_or(false, Monitor::is_idle) {
            self.monitors.shift_remove(&obj);
        }
    }

    /**
     * Acquires `obj`'s monitor for `thread` or, if `thread` already owns
     * it, increments the recursion depth. Returns `false` if another thread
     * owns it.
     */
    pub fn enter(&mut self, obj: Oop, thread: ThreadId) -> bool {
        let m = self.monitors.entry(obj).or_default();
        match m.owner {
            None => { m.owner = Some(thread); m.depth = 1; true },
            Some(owner) if owner == thread => { m.depth += 1; true },
            Some(_) => false,
        }
    }

    /**
     * Acquires `obj`'s monitor for `thread` at recursion depth `depth`, if
     * it is free. Used by a thread returning from `wait`.
     */
    pub fn try_reacquire(&mut self, obj: Oop, thread: ThreadId, depth: u32) -> bool {
        let m = self.monitors.entry(obj).or_default();
        if m.owner.is_some() { return false; }
        m.owner = Some(thread);
        m.depth = depth;
        true
    }

    /**
     * Releases one level of `thread`'s ownership of `obj`'s monitor. If that
     * was the last level, the monitor passes to the first entrant, which is
     * returned.
     */
    pub fn exit(&mut self, obj: Oop, thread: ThreadId) -> Result<Option<ThreadId>, SchedulerError> {
        let m = self.monitors.get_mut(&obj)
            .filter(|m| m.owner == Some(thread))
            .ok_or(SchedulerError::IllegalMonitorState(obj))?;
        m.depth -= 1;
        let next = if m.depth == 0 { m.hand_off() } else { None };
        self.prune(obj);
        Ok(next)
    }

    /**
     * Releases all levels of `thread`'s ownership of `obj`'s monitor.
     * Returns the recursion depth to restore later, and the new owner.
     */
    pub fn release(&mut self, obj: Oop, thread: ThreadId) -> Result<(u32, Option<ThreadId>), SchedulerError> {
        let m = self.monitors.get_mut(&obj)
            .filter(|m| m.owner == Some(thread))
            .ok_or(SchedulerError::IllegalMonitorState(obj))?;
        let depth = m.depth;
        let next = m.hand_off();
        self.prune(obj);
        Ok((depth, next))
    }

    /**
     * Releases every monitor owned by `thread`, e.g. because it is
     * terminating. Returns the new owners.
     */
    pub fn release_all(&mut self, thread: ThreadId) -> Vec<ThreadId> {
        let owned: Vec<Oop> = self.monitors.iter()
            .filter(|(_, m)| m.owner == Some(thread))
            .map(|(&obj, _)| obj)
            .collect();
        owned.into_iter()
            .filter_map(|obj| self.release(obj, thread).ok().and_then(|(_, next)| next))
            .collect()
    }

    pub fn add_entrant(&mut self, obj: Oop, thread: ThreadId, depth: u32) {
        self.monitors.entry(obj).or_default().entrants.push_back((thread, depth));
    }

    /** Removes `thread` from the entry queue of `obj`. Returns the depth it was queued at. */
    pub fn remove_entrant(&mut self, obj: Oop, thread: ThreadId) -> Option<u32> {
        let m = self.monitors.get_mut(&obj)?;
        let i = m.entrants.iter().position(|&(t, _)| t == thread)?;
        let depth = m.entrants.remove(i).map(|(_, d)| d);
        self.prune(obj);
        depth
    }

    pub fn add_waiter(&mut self, obj: Oop, thread: ThreadId) {
        self.monitors.entry(obj).or_default().waiters.push_back(thread);
    }

    /** Removes `thread` from the wait set of `obj`. Returns `false` if it was not there. */
    pub fn remove_waiter(&mut self, obj: Oop, thread: ThreadId) -> bool {
        let m = match self.monitors.get_mut(&obj) {
            None => return false,
            Some(m) => m,
        };
        let found = match m.waiters.iter().position(|&t| t == thread) {
            None => false,
            Some(i) => { m.waiters.remove(i); true },
        };
        self.prune(obj);
        found
    }

    /** Removes the longest waiter, or all waiters if `all`, from the wait set of `obj`. */
    pub fn take_waiters(&mut self, obj: Oop, all: bool) -> Vec<ThreadId> {
        let m = match self.monitors.get_mut(&obj) {
            None => return Vec::new(),
            Some(m) => m,
        };
        let n = if all { m.waiters.len() } else { m.waiters.len().min(1) };
        let woken = m.waiters.drain(..n).collect();
        self.prune(obj);
        woken
    }

    /** Visits the object of every monitor. */
    pub fn oops_do(&mut self, mut f: impl FnMut(&mut Oop)) {
        let monitors = std::mem::take(&mut self.monitors);
        self.monitors = monitors.into_iter()
            .map(|(mut obj, m)| { f(&mut obj); (obj, m) })
            .collect();
    }
}

//-----------------------------------------------------------------------------
