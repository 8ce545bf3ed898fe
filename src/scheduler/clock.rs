use std::time::{Instant};

/** A source of time for deadlines, in milliseconds. */
pub trait Clock {
    /** Milliseconds since some fixed point. Never decreases. */
    fn now_millis(&self) -> u64;
}

/** Real time, measured from the construction of the `SystemClock`. */
#[derive(Debug, Copy, Clone)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self { SystemClock {epoch: Instant::now()} }
}

impl Default for SystemClock {
    fn default() -> Self { Self::new() }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

/** A clock that only moves when told to. */
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct VirtualClock {
    now: u64,
}

impl VirtualClock {
    pub fn new() -> Self { Self::default() }

    pub fn advance(&mut self, millis: u64) {
        self.now = self.now.saturating_add(millis);
    }
}

impl Clock for VirtualClock {
    fn now_millis(&self) -> u64 { self.now }
}
