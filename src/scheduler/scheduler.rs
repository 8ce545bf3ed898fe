use std::collections::{VecDeque};
use std::fmt::{self, Debug, Formatter};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use super::{ThreadId, TaskId, Priority, ThreadStatus, ThreadState, JavaThread};
use super::{MonitorTable, Clock, SchedulerError};
use crate::config::{SchedulerConfig};
use crate::oop::{Oop};

/** The number of ready queues. Indexed by priority; index 0 is unused. */
const NUM_QUEUES: usize = 11;

/**
 * Multiplexes Java threads onto the single thread of control that runs the
 * interpreter and compiled code.
 *
 * Scheduling is cooperative. The VM runs the [`current()`] thread until it
 * reaches a scheduling point (a timer tick, a monitor operation, a sleep, a
 * blocking call, or an explicit yield) and then calls [`switch_thread()`].
 * Operations that stop the current thread (e.g. [`wait()`]) leave no
 * current thread; the caller must call `switch_thread()` before running
 * Java code again.
 *
 * The most urgent non-empty ready queue always wins, and each queue is
 * served in round-robin order. The current thread is not in any queue.
 *
 * [`current()`]: Self::current
 * [`switch_thread()`]: Self::switch_thread
 * [`wait()`]: Self::wait
 */
pub struct Scheduler<C: Clock> {
    config: SchedulerConfig,
    clock: C,
    threads: IndexMap<ThreadId, JavaThread>,
    next_id: u32,
    ready: [VecDeque<ThreadId>; NUM_QUEUES],
    /** Bit `p` is set iff `ready[p]` is non-empty. */
    valid: u16,
    /** The result of the last `next_runnable_thread()`, if still correct. */
    cached_next: Option<(ThreadId, Priority)>,
    current: Option<ThreadId>,
    /** When `current` was dispatched. */
    slice_start: u64,
    suspended_tasks: IndexSet<TaskId>,
    monitors: MonitorTable,
    timer_tick: bool,
    /** The number of started threads that have not terminated. */
    active: usize,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(config: SchedulerConfig, clock: C) -> Self {
        Scheduler {
            config,
            clock,
            threads: IndexMap::new(),
            next_id: 0,
            ready: Default::default(),
            valid: 0,
            cached_next: None,
            current: None,
            slice_start: 0,
            suspended_tasks: IndexSet::new(),
            monitors: MonitorTable::new(),
            timer_tick: false,
            active: 0,
        }
    }

    pub fn config(&self) -> &SchedulerConfig { &self.config }

    pub fn clock(&self) -> &C { &self.clock }

    pub fn clock_mut(&mut self) -> &mut C { &mut self.clock }

    pub fn monitors(&self) -> &MonitorTable { &self.monitors }

    /** The running thread, if any. */
    pub fn current(&self) -> Option<ThreadId> { self.current }

    /** The number of started threads that have not terminated. */
    pub fn active_count(&self) -> usize { self.active }

    pub fn thread(&self, id: ThreadId) -> Result<&JavaThread, SchedulerError> {
        self.threads.get(&id).ok_or(SchedulerError::NoSuchThread(id))
    }

    pub fn thread_mut(&mut self, id: ThreadId) -> Result<&mut JavaThread, SchedulerError> {
        self.threads.get_mut(&id).ok_or(SchedulerError::NoSuchThread(id))
    }

    pub fn state(&self, id: ThreadId) -> Result<ThreadState, SchedulerError> {
        Ok(self.thread(id)?.state)
    }

    /** The threads of `task`, in creation order. */
    pub fn threads_of(&self, task: TaskId) -> impl Iterator<Item=ThreadId> + '_ {
        self.threads.values().filter(move |t| t.task() == task).map(JavaThread::id)
    }

    /** The ready queue of `priority`, front first. */
    pub fn ready_queue(&self, priority: Priority) -> impl Iterator<Item=ThreadId> + '_ {
        self.ready[priority.get() as usize].iter().copied()
    }

    fn current_id(&self) -> Result<ThreadId, SchedulerError> {
        self.current.ok_or(SchedulerError::NoCurrentThread)
    }

    // Queue maintenance.

    /** Appends `id` to the ready queue of `priority`. */
    fn enqueue(&mut self, id: ThreadId, priority: Priority) {
        self.ready[priority.get() as usize].push_back(id);
        self.valid |= priority.bit();
        if let Some((_, p)) = self.cached_next {
            if priority >= p { self.cached_next = None; }
        }
    }

    /** Removes `id` from the ready queue of `priority`. */
    fn dequeue(&mut self, id: ThreadId, priority: Priority) {
        let queue = &mut self.ready[priority.get() as usize];
        if let Some(i) = queue.iter().position(|&t| t == id) {
            queue.remove(i);
        }
        if queue.is_empty() { self.valid &= !priority.bit(); }
        if matches!(self.cached_next, Some((t, _)) if t == id) {
            self.cached_next = None;
        }
    }

    /**
     * Removes `id` from whichever queue it is in, and stops it running. The
     * caller must then set its state.
     */
    fn detach(&mut self, id: ThreadId) {
        let (state, priority) = {
            let t = &self.threads[&id];
            (t.state, t.priority)
        };
        match state {
            ThreadState::Ready => self.dequeue(id, priority),
            ThreadState::Running => {
                if self.current == Some(id) { self.current = None; }
            },
            ThreadState::Waiting {obj, ..} => { self.monitors.remove_waiter(obj, id); },
            ThreadState::Entering {obj} => { self.monitors.remove_entrant(obj, id); },
            _ => {},
        }
    }

    /** Makes detached thread `id` ready, ignoring task suspension. */
    fn force_ready(&mut self, id: ThreadId) {
        let t = &mut self.threads[&id];
        t.state = ThreadState::Ready;
        let priority = t.priority;
        self.enqueue(id, priority);
    }

    /** Makes detached thread `id` ready, or suspended if its task is. */
    fn make_ready(&mut self, id: ThreadId) {
        let t = &mut self.threads[&id];
        if self.suspended_tasks.contains(&t.task()) {
            t.state = ThreadState::Suspended {deadline: None};
            trace!(thread = ?id, "ready but suspended");
            return;
        }
        self.force_ready(id);
    }

    /** Moves a sleeping or waiting thread to the ready queue. */
    fn wake(&mut self, id: ThreadId) {
        self.detach(id);
        self.make_ready(id);
        trace!(thread = ?id, "wake");
    }

    // Thread life cycle.

    /**
     * Creates a thread in the `New` state. Fails if there would be more than
     * `max_threads` threads that have not terminated.
     */
    pub fn add_thread(
        &mut self,
        task: TaskId,
        priority: Priority,
        thread_obj: Oop,
    ) -> Result<ThreadId, SchedulerError> {
        let live = self.threads.values().filter(|t| t.state != ThreadState::Terminated).count();
        if live >= self.config.max_threads {
            return Err(SchedulerError::ResourceLimit {max: self.config.max_threads});
        }
        let id = ThreadId(self.next_id);
        self.next_id += 1;
        self.threads.insert(id, JavaThread::new(id, task, priority, thread_obj));
        debug!(thread = ?id, ?task, ?priority, "new thread");
        Ok(id)
    }

    /** Makes a `New` thread ready. */
    pub fn start(&mut self, id: ThreadId) -> Result<(), SchedulerError> {
        let state = self.state(id)?;
        if state != ThreadState::New {
            return Err(SchedulerError::IllegalThreadState {thread: id, state});
        }
        self.active += 1;
        self.make_ready(id);
        debug!(thread = ?id, "start");
        Ok(())
    }

    /**
     * Terminates `id` in whatever state it is in, releasing any monitors it
     * owns. Terminating a terminated thread does nothing.
     */
    pub fn terminate(&mut self, id: ThreadId) -> Result<(), SchedulerError> {
        if self.state(id)? != ThreadState::Terminated {
            self.terminate_thread(id);
        }
        Ok(())
    }

    fn terminate_thread(&mut self, id: ThreadId) {
        let was_alive = self.threads[&id].state.is_alive();
        self.detach(id);
        for next in self.monitors.release_all(id) {
            self.make_ready(next);
        }
        let t = &mut self.threads[&id];
        t.state = ThreadState::Terminated;
        t.status.remove(ThreadStatus::TERMINATING);
        t.reacquire = None;
        t.reentry = None;
        if was_alive { self.active -= 1; }
        debug!(thread = ?id, "terminate");
    }

    /**
     * Asks `id` to terminate at its next scheduling decision point. A thread
     * that is blocked is made ready so that it reaches one. A `New` thread is
     * terminated immediately.
     */
    pub fn request_termination(&mut self, id: ThreadId) -> Result<(), SchedulerError> {
        let state = self.state(id)?;
        match state {
            ThreadState::Terminated => return Ok(()),
            ThreadState::New => {
                self.terminate_thread(id);
                return Ok(());
            },
            _ => {},
        }
        self.threads[&id].status.insert(ThreadStatus::TERMINATING);
        match state {
            ThreadState::Ready | ThreadState::Running => {},
            _ => {
                self.detach(id);
                self.force_ready(id);
            },
        }
        debug!(thread = ?id, "termination requested");
        Ok(())
    }

    /** Forgets all terminated threads, and returns them. */
    pub fn remove_terminated(&mut self) -> Vec<JavaThread> {
        let dead: Vec<ThreadId> = self.threads.values()
            .filter(|t| t.state == ThreadState::Terminated)
            .map(JavaThread::id)
            .collect();
        dead.into_iter().filter_map(|id| self.threads.shift_remove(&id)).collect()
    }

    /** Changes the priority of `id`, moving it to the right ready queue. */
    pub fn set_priority(&mut self, id: ThreadId, priority: Priority) -> Result<(), SchedulerError> {
        let t = self.thread(id)?;
        let (old, state) = (t.priority, t.state);
        if state == ThreadState::Ready {
            self.dequeue(id, old);
            self.threads[&id].priority = priority;
            self.enqueue(id, priority);
        } else {
            self.threads[&id].priority = priority;
        }
        Ok(())
    }

    // Scheduling decisions.

    /**
     * The thread that [`switch_thread()`] would dispatch if the current
     * thread stopped: the front of the most urgent non-empty ready queue.
     *
     * [`switch_thread()`]: Self::switch_thread
     */
    pub fn next_runnable_thread(&mut self) -> Option<ThreadId> {
        if let Some((id, _)) = self.cached_next { return Some(id); }
        let priority = Priority::most_urgent(self.valid)?;
        let id = *self.ready[priority.get() as usize].front()?;
        self.cached_next = Some((id, priority));
        Some(id)
    }

    /**
     * Makes ready every sleeping thread, and every waiting thread with a
     * timeout, whose deadline has passed. Returns the number woken.
     */
    pub fn wake_up_timed_out_sleepers(&mut self) -> usize {
        let now = self.clock.now_millis();
        let mut due: Vec<(u64, ThreadId)> = self.threads.values().filter_map(|t| match t.state {
            ThreadState::Sleeping {deadline} if deadline <= now => Some((deadline, t.id())),
            ThreadState::Waiting {deadline: Some(deadline), ..} if deadline <= now => Some((deadline, t.id())),
            _ => None,
        }).collect();
        due.sort_by_key(|&(deadline, _)| deadline);
        for &(_, id) in &due { self.wake(id); }
        due.len()
    }

    /**
     * The scheduling decision point. Wakes threads whose deadlines have
     * passed, puts the current thread (if it is still runnable) at the back
     * of its ready queue, and dispatches the next runnable thread, which
     * becomes current and is returned.
     *
     * Threads with a termination request are terminated instead of being
     * dispatched. A thread returning from `wait()` re-acquires its monitor
     * first; if the monitor is held, it joins the monitor's entry queue.
     */
    pub fn switch_thread(&mut self) -> Option<ThreadId> {
        let now = self.clock.now_millis();
        self.wake_up_timed_out_sleepers();
        self.timer_tick = false;
        if let Some(id) = self.current.take() {
            if self.threads[&id].status.contains(ThreadStatus::TERMINATING) {
                self.terminate_thread(id);
            } else {
                self.make_ready(id);
            }
        }
        loop {
            let id = self.next_runnable_thread()?;
            let priority = self.threads[&id].priority;
            self.dequeue(id, priority);
            let t = &mut self.threads[&id];
            if t.status.contains(ThreadStatus::TERMINATING) {
                self.terminate_thread(id);
                continue;
            }
            if let Some((obj, depth)) = t.reacquire.take() {
                if !self.monitors.try_reacquire(obj, id, depth) {
                    t.state = ThreadState::Entering {obj};
                    self.monitors.add_entrant(obj, id, depth);
                    trace!(thread = ?id, ?obj, "monitor busy");
                    continue;
                }
            }
            t.state = ThreadState::Running;
            self.current = Some(id);
            self.slice_start = now;
            trace!(thread = ?id, "dispatch");
            return Some(id);
        }
    }

    /** Gives other threads of the same priority a turn. */
    pub fn yield_thread(&mut self) -> Option<ThreadId> {
        self.switch_thread()
    }

    /** Asks the running thread to reach a scheduling point soon. */
    pub fn set_timer_tick(&mut self) { self.timer_tick = true; }

    /** Reads and clears the timer tick. */
    pub fn take_timer_tick(&mut self) -> bool {
        std::mem::replace(&mut self.timer_tick, false)
    }

    /**
     * Sets the timer tick if the current thread has used up its time slice.
     * Returns whether the timer tick is set.
     */
    pub fn check_time_slice(&mut self) -> bool {
        if self.current.is_some()
            && self.clock.now_millis().saturating_sub(self.slice_start) >= self.config.time_slice_millis
        {
            self.timer_tick = true;
        }
        self.timer_tick
    }

    // Blocking.

    /**
     * Puts the current thread to sleep for `millis`. Fails without sleeping,
     * and clears the flag, if the thread has been interrupted.
     */
    pub fn sleep_current_thread(&mut self, millis: u64) -> Result<(), SchedulerError> {
        let id = self.current_id()?;
        if self.take_interrupted(id)? { return Err(SchedulerError::Interrupted(id)); }
        let deadline = self.clock.now_millis().saturating_add(millis);
        self.threads[&id].state = ThreadState::Sleeping {deadline};
        self.current = None;
        debug!(thread = ?id, deadline, "sleep");
        Ok(())
    }

    /**
     * Blocks the current thread until [`unblock_thread()`] is called for
     * it. `reentry` is kept for the I/O layer.
     *
     * [`unblock_thread()`]: Self::unblock_thread
     */
    pub fn block_current_thread(&mut self, reentry: Box<[u8]>) -> Result<(), SchedulerError> {
        let id = self.current_id()?;
        let t = &mut self.threads[&id];
        t.state = ThreadState::BlockedAsync;
        t.reentry = Some(reentry);
        self.current = None;
        debug!(thread = ?id, "block");
        Ok(())
    }

    /**
     * Makes a thread blocked by [`block_current_thread()`] ready, and
     * returns its reentry data. Returns `None`, and does nothing, if the
     * thread is not blocked.
     *
     * [`block_current_thread()`]: Self::block_current_thread
     */
    pub fn unblock_thread(&mut self, id: ThreadId) -> Result<Option<Box<[u8]>>, SchedulerError> {
        if self.state(id)? != ThreadState::BlockedAsync { return Ok(None); }
        let reentry = self.threads[&id].reentry.take().unwrap_or_default();
        self.make_ready(id);
        debug!(thread = ?id, "unblock");
        Ok(Some(reentry))
    }

    /** Sets the interrupted flag of `id`, waking it if it is sleeping or waiting. */
    pub fn interrupt(&mut self, id: ThreadId) -> Result<(), SchedulerError> {
        let t = self.thread_mut(id)?;
        t.status.insert(ThreadStatus::INTERRUPTED);
        let state = t.state;
        match state {
            ThreadState::Sleeping {..} | ThreadState::Waiting {..} => self.wake(id),
            ThreadState::Suspended {deadline: Some(_)} => {
                self.threads[&id].state = ThreadState::Suspended {deadline: None};
            },
            _ => {},
        }
        debug!(thread = ?id, "interrupt");
        Ok(())
    }

    /** Reads and clears the interrupted flag of `id`. */
    pub fn take_interrupted(&mut self, id: ThreadId) -> Result<bool, SchedulerError> {
        let t = self.thread_mut(id)?;
        let was = t.status.contains(ThreadStatus::INTERRUPTED);
        t.status.remove(ThreadStatus::INTERRUPTED);
        Ok(was)
    }

    // Monitors.

    /**
     * Acquires `obj`'s monitor for the current thread, or increments its
     * recursion depth. Returns `false` if the monitor is held by another
     * thread, in which case the current thread blocks until it is handed
     * the monitor.
     */
    pub fn monitor_enter(&mut self, obj: Oop) -> Result<bool, SchedulerError> {
        let id = self.current_id()?;
        if self.monitors.enter(obj, id) { return Ok(true); }
        self.monitors.add_entrant(obj, id, 1);
        self.threads[&id].state = ThreadState::Entering {obj};
        self.current = None;
        debug!(thread = ?id, ?obj, "monitor contended");
        Ok(false)
    }

    /**
     * Releases one level of the current thread's ownership of `obj`'s
     * monitor. On the last level, the first entrant becomes the owner and is
     * made ready.
     */
    pub fn monitor_exit(&mut self, obj: Oop) -> Result<(), SchedulerError> {
        let id = self.current_id()?;
        if let Some(next) = self.monitors.exit(obj, id)? {
            self.make_ready(next);
        }
        Ok(())
    }

    /**
     * Releases `obj`'s monitor, which the current thread must own, and waits
     * in its wait set until notified, interrupted, or, if `millis` is
     * nonzero, until `millis` have passed. The monitor is re-acquired
     * before the thread runs again.
     */
    pub fn wait(&mut self, obj: Oop, millis: u64) -> Result<(), SchedulerError> {
        let id = self.current_id()?;
        if self.monitors.owner(obj) != Some(id) {
            return Err(SchedulerError::IllegalMonitorState(obj));
        }
        if self.take_interrupted(id)? { return Err(SchedulerError::Interrupted(id)); }
        let (depth, next) = self.monitors.release(obj, id)?;
        if let Some(next) = next { self.make_ready(next); }
        self.monitors.add_waiter(obj, id);
        let deadline = if millis > 0 {
            Some(self.clock.now_millis().saturating_add(millis))
        } else {
            None
        };
        let t = &mut self.threads[&id];
        t.reacquire = Some((obj, depth));
        t.state = ThreadState::Waiting {obj, deadline};
        self.current = None;
        debug!(thread = ?id, ?obj, ?deadline, "wait");
        Ok(())
    }

    /**
     * Makes ready the longest-waiting thread in `obj`'s wait set, or all of
     * them. Unless `must_be_owner` is `false`, the current thread must own
     * `obj`'s monitor. Returns the number of threads woken.
     */
    pub fn notify(&mut self, obj: Oop, all: bool, must_be_owner: bool) -> Result<usize, SchedulerError> {
        if must_be_owner {
            let id = self.current_id()?;
            if self.monitors.owner(obj) != Some(id) {
                return Err(SchedulerError::IllegalMonitorState(obj));
            }
        }
        let woken = self.monitors.take_waiters(obj, all);
        for &id in &woken { self.make_ready(id); }
        if !woken.is_empty() { debug!(?obj, woken = woken.len(), "notify"); }
        Ok(woken.len())
    }

    // Tasks.

    /**
     * Suspends every ready, running or sleeping thread of `task`, and any
     * thread of `task` that becomes ready until [`resume_threads()`].
     * Returns the number of threads suspended.
     *
     * [`resume_threads()`]: Self::resume_threads
     */
    pub fn suspend_threads(&mut self, task: TaskId) -> usize {
        if !self.suspended_tasks.insert(task) { return 0; }
        let ids: Vec<ThreadId> = self.threads_of(task).collect();
        let mut count = 0;
        for id in ids {
            let (state, priority) = {
                let t = &self.threads[&id];
                (t.state, t.priority)
            };
            let deadline = match state {
                ThreadState::Ready | ThreadState::Running => None,
                ThreadState::Sleeping {deadline} => Some(deadline),
                _ => continue,
            };
            if state == ThreadState::Ready { self.dequeue(id, priority); }
            if self.current == Some(id) { self.current = None; }
            self.threads[&id].state = ThreadState::Suspended {deadline};
            count += 1;
        }
        debug!(?task, count, "suspend task");
        count
    }

    /**
     * Undoes [`suspend_threads()`]. Returns the number of threads resumed.
     *
     * [`suspend_threads()`]: Self::suspend_threads
     */
    pub fn resume_threads(&mut self, task: TaskId) -> usize {
        if !self.suspended_tasks.shift_remove(&task) { return 0; }
        let ids: Vec<ThreadId> = self.threads_of(task).collect();
        let mut count = 0;
        for id in ids {
            match self.threads[&id].state {
                ThreadState::Suspended {deadline: None} => self.make_ready(id),
                ThreadState::Suspended {deadline: Some(deadline)} => {
                    self.threads[&id].state = ThreadState::Sleeping {deadline};
                },
                _ => continue,
            }
            count += 1;
        }
        debug!(?task, count, "resume task");
        count
    }

    // Garbage collection.

    /**
     * Visits every object reference held by the scheduler, in every thread
     * whatever its state, and the object of every monitor in use. `f` may
     * change the references, e.g. to relocate objects.
     */
    pub fn oops_do(&mut self, mut f: impl FnMut(&mut Oop)) {
        for t in self.threads.values_mut() {
            t.oops_do(&mut f);
        }
        self.monitors.oops_do(&mut f);
    }
}

impl<C: Clock> Debug for Scheduler<C> {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        let ready: Vec<(u8, &VecDeque<ThreadId>)> = (1..NUM_QUEUES as u8).rev()
            .map(|p| (p, &self.ready[p as usize]))
            .filter(|(_, q)| !q.is_empty())
            .collect();
        f.debug_struct("Scheduler")
            .field("current", &self.current)
            .field("ready", &ready)
            .field("active", &self.active)
            .finish()
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
pub mod tests {
    use super::*;
    use super::super::{VirtualClock};
    use ThreadState::*;

    const OBJ: Oop = Oop(0x2000);

    fn scheduler() -> Scheduler<VirtualClock> {
        Scheduler::new(SchedulerConfig::default(), VirtualClock::new())
    }

    /** Adds and starts a thread. */
    fn spawn(s: &mut Scheduler<VirtualClock>, task: u32, priority: u8) -> ThreadId {
        let id = s.add_thread(TaskId(task), Priority::new(priority).unwrap(), Oop(0x1000)).unwrap();
        s.start(id).unwrap();
        id
    }

    #[test]
    fn priority_dominance() {
        let mut s = scheduler();
        let p3 = spawn(&mut s, 0, 3);
        let p7 = spawn(&mut s, 0, 7);
        let p5 = spawn(&mut s, 0, 5);
        assert_eq!(s.next_runnable_thread(), Some(p7));
        assert_eq!(s.switch_thread(), Some(p7));
        assert_eq!(s.switch_thread(), Some(p7));
        s.terminate(p7).unwrap();
        assert_eq!(s.switch_thread(), Some(p5));
        s.terminate(p5).unwrap();
        assert_eq!(s.switch_thread(), Some(p3));
    }

    #[test]
    fn cache_is_preempted() {
        let mut s = scheduler();
        let low = spawn(&mut s, 0, 3);
        assert_eq!(s.next_runnable_thread(), Some(low));
        let same = spawn(&mut s, 0, 3);
        assert_eq!(s.next_runnable_thread(), Some(low));
        let high = spawn(&mut s, 0, 8);
        assert_eq!(s.next_runnable_thread(), Some(high));
        s.set_priority(same, Priority::MAX).unwrap();
        assert_eq!(s.next_runnable_thread(), Some(same));
        assert_eq!(s.ready_queue(Priority::new(3).unwrap()).collect::<Vec<_>>(), vec![low]);
    }

    #[test]
    fn round_robin() {
        let mut s = scheduler();
        let ids: Vec<ThreadId> = (0..3).map(|_| spawn(&mut s, 0, 5)).collect();
        let order: Vec<ThreadId> = (0..6).map(|_| s.switch_thread().unwrap()).collect();
        assert_eq!(order, [&ids[..], &ids[..]].concat());
        assert_eq!(s.yield_thread(), Some(ids[0]));
    }

    #[test]
    fn sleep_and_wake() {
        let mut s = scheduler();
        let a = spawn(&mut s, 0, 7);
        let b = spawn(&mut s, 0, 3);
        assert_eq!(s.switch_thread(), Some(a));
        s.sleep_current_thread(100).unwrap();
        assert_eq!(s.current(), None);
        assert_eq!(s.state(a), Ok(Sleeping {deadline: 100}));
        assert_eq!(s.switch_thread(), Some(b));
        s.clock_mut().advance(50);
        assert_eq!(s.switch_thread(), Some(b));
        s.clock_mut().advance(50);
        assert_eq!(s.switch_thread(), Some(a));
        assert_eq!(s.state(b), Ok(Ready));
    }

    #[test]
    fn wait_and_notify() {
        let mut s = scheduler();
        let a = spawn(&mut s, 0, 5);
        let b = spawn(&mut s, 0, 5);
        assert_eq!(s.switch_thread(), Some(a));
        assert_eq!(s.monitor_enter(OBJ), Ok(true));
        assert_eq!(s.monitor_enter(OBJ), Ok(true));
        s.wait(OBJ, 0).unwrap();
        assert_eq!(s.state(a), Ok(Waiting {obj: OBJ, deadline: None}));
        assert_eq!(s.monitors().owner(OBJ), None);
        assert_eq!(s.switch_thread(), Some(b));
        assert_eq!(s.monitor_enter(OBJ), Ok(true));
        assert_eq!(s.notify(OBJ, false, true), Ok(1));
        assert_eq!(s.state(a), Ok(Ready));
        assert_eq!(s.notify(OBJ, false, true), Ok(0));
        s.monitor_exit(OBJ).unwrap();
        assert_eq!(s.switch_thread(), Some(a));
        assert_eq!(s.monitors().owner(OBJ), Some(a));
        assert_eq!(s.monitors().get(OBJ).unwrap().depth(), 2);
    }

    #[test]
    fn notified_waiter_queues_for_busy_monitor() {
        let mut s = scheduler();
        let a = spawn(&mut s, 0, 5);
        let b = spawn(&mut s, 0, 5);
        s.switch_thread();
        s.monitor_enter(OBJ).unwrap();
        s.wait(OBJ, 0).unwrap();
        assert_eq!(s.switch_thread(), Some(b));
        s.monitor_enter(OBJ).unwrap();
        s.notify(OBJ, true, true).unwrap();
        // `a` cannot re-acquire the monitor, so `b` runs again.
        assert_eq!(s.switch_thread(), Some(b));
        assert_eq!(s.state(a), Ok(Entering {obj: OBJ}));
        s.monitor_exit(OBJ).unwrap();
        assert_eq!(s.monitors().owner(OBJ), Some(a));
        assert_eq!(s.state(a), Ok(Ready));
        assert_eq!(s.switch_thread(), Some(a));
        assert_eq!(s.monitors().get(OBJ).unwrap().depth(), 1);
    }

    #[test]
    fn timed_wait() {
        let mut s = scheduler();
        let a = spawn(&mut s, 0, 5);
        let b = spawn(&mut s, 0, 5);
        s.switch_thread();
        s.monitor_enter(OBJ).unwrap();
        s.wait(OBJ, 30).unwrap();
        assert_eq!(s.state(a), Ok(Waiting {obj: OBJ, deadline: Some(30)}));
        assert_eq!(s.switch_thread(), Some(b));
        s.clock_mut().advance(30);
        assert_eq!(s.switch_thread(), Some(a));
        assert_eq!(s.monitors().owner(OBJ), Some(a));
        assert!(s.monitors().get(OBJ).unwrap().waiters().next().is_none());
    }

    #[test]
    fn monitor_errors() {
        let mut s = scheduler();
        assert_eq!(s.monitor_enter(OBJ), Err(SchedulerError::NoCurrentThread));
        let a = spawn(&mut s, 0, 5);
        s.switch_thread();
        assert_eq!(s.wait(OBJ, 0), Err(SchedulerError::IllegalMonitorState(OBJ)));
        assert_eq!(s.notify(OBJ, false, true), Err(SchedulerError::IllegalMonitorState(OBJ)));
        assert_eq!(s.notify(OBJ, false, false), Ok(0));
        assert_eq!(s.monitor_exit(OBJ), Err(SchedulerError::IllegalMonitorState(OBJ)));
        assert_eq!(s.state(a), Ok(Running));
    }

    #[test]
    fn contended_enter() {
        let mut s = scheduler();
        let a = spawn(&mut s, 0, 5);
        let b = spawn(&mut s, 0, 5);
        s.switch_thread();
        s.monitor_enter(OBJ).unwrap();
        assert_eq!(s.switch_thread(), Some(b));
        assert_eq!(s.monitor_enter(OBJ), Ok(false));
        assert_eq!(s.current(), None);
        assert_eq!(s.switch_thread(), Some(a));
        s.monitor_exit(OBJ).unwrap();
        assert_eq!(s.monitors().owner(OBJ), Some(b));
        assert_eq!(s.switch_thread(), Some(b));
    }

    #[test]
    fn suspend_and_resume() {
        let mut s = scheduler();
        let a = spawn(&mut s, 1, 5);
        let b = spawn(&mut s, 1, 5);
        let c = spawn(&mut s, 2, 3);
        assert_eq!(s.suspend_threads(TaskId(1)), 2);
        assert_eq!(s.suspend_threads(TaskId(1)), 0);
        assert_eq!(s.state(b), Ok(Suspended {deadline: None}));
        assert_eq!(s.switch_thread(), Some(c));
        assert_eq!(s.switch_thread(), Some(c));
        assert_eq!(s.resume_threads(TaskId(1)), 2);
        assert_eq!(s.switch_thread(), Some(a));
        assert_eq!(s.suspend_threads(TaskId(9)), 0);
        assert_eq!(s.resume_threads(TaskId(9)), 0);
    }

    #[test]
    fn suspend_sleeper() {
        let mut s = scheduler();
        let a = spawn(&mut s, 1, 5);
        s.switch_thread();
        s.sleep_current_thread(100).unwrap();
        assert_eq!(s.suspend_threads(TaskId(1)), 1);
        s.clock_mut().advance(200);
        assert_eq!(s.switch_thread(), None);
        assert_eq!(s.state(a), Ok(Suspended {deadline: Some(100)}));
        assert_eq!(s.resume_threads(TaskId(1)), 1);
        assert_eq!(s.state(a), Ok(Sleeping {deadline: 100}));
        assert_eq!(s.switch_thread(), Some(a));
    }

    #[test]
    fn suspend_current() {
        let mut s = scheduler();
        let a = spawn(&mut s, 1, 5);
        assert_eq!(s.switch_thread(), Some(a));
        assert_eq!(s.suspend_threads(TaskId(1)), 1);
        assert_eq!(s.current(), None);
        // A thread started while its task is suspended does not run.
        let b = spawn(&mut s, 1, 9);
        assert_eq!(s.state(b), Ok(Suspended {deadline: None}));
        assert_eq!(s.switch_thread(), None);
        s.resume_threads(TaskId(1));
        assert_eq!(s.switch_thread(), Some(b));
    }

    #[test]
    fn terminate() {
        let mut s = scheduler();
        let a = spawn(&mut s, 0, 5);
        let b = spawn(&mut s, 0, 8);
        assert_eq!(s.active_count(), 2);
        assert_eq!(s.next_runnable_thread(), Some(b));
        s.terminate(b).unwrap();
        assert_eq!(s.state(b), Ok(Terminated));
        assert_eq!(s.active_count(), 1);
        assert_eq!(s.next_runnable_thread(), Some(a));
        s.terminate(b).unwrap();
        assert_eq!(s.active_count(), 1);
        assert_eq!(s.terminate(ThreadId(99)), Err(SchedulerError::NoSuchThread(ThreadId(99))));
        assert_eq!(s.start(b), Err(SchedulerError::IllegalThreadState {thread: b, state: Terminated}));
        assert_eq!(s.remove_terminated().len(), 1);
        assert_eq!(s.state(b), Err(SchedulerError::NoSuchThread(b)));
    }

    #[test]
    fn terminate_releases_monitors() {
        let mut s = scheduler();
        let a = spawn(&mut s, 0, 5);
        let b = spawn(&mut s, 0, 5);
        s.switch_thread();
        s.monitor_enter(OBJ).unwrap();
        s.switch_thread();
        assert_eq!(s.monitor_enter(OBJ), Ok(false));
        s.terminate(a).unwrap();
        assert_eq!(s.monitors().owner(OBJ), Some(b));
        assert_eq!(s.state(b), Ok(Ready));
    }

    #[test]
    fn request_termination() {
        let mut s = scheduler();
        let a = spawn(&mut s, 0, 5);
        let b = spawn(&mut s, 0, 5);
        assert_eq!(s.switch_thread(), Some(a));
        s.sleep_current_thread(1000).unwrap();
        s.request_termination(a).unwrap();
        assert_eq!(s.state(a), Ok(Ready));
        assert_eq!(s.switch_thread(), Some(b));
        assert_eq!(s.switch_thread(), Some(b));
        assert_eq!(s.state(a), Ok(Terminated));
        s.request_termination(b).unwrap();
        assert_eq!(s.current(), Some(b));
        assert_eq!(s.switch_thread(), None);
        assert_eq!(s.active_count(), 0);
        let c = s.add_thread(TaskId(0), Priority::NORM, Oop(0x1000)).unwrap();
        s.request_termination(c).unwrap();
        assert_eq!(s.state(c), Ok(Terminated));
    }

    #[test]
    fn interrupt() {
        let mut s = scheduler();
        let a = spawn(&mut s, 0, 5);
        s.switch_thread();
        s.sleep_current_thread(1000).unwrap();
        s.interrupt(a).unwrap();
        assert_eq!(s.state(a), Ok(Ready));
        assert_eq!(s.take_interrupted(a), Ok(true));
        assert_eq!(s.take_interrupted(a), Ok(false));
        assert_eq!(s.switch_thread(), Some(a));
        s.interrupt(a).unwrap();
        assert_eq!(s.sleep_current_thread(10), Err(SchedulerError::Interrupted(a)));
        assert_eq!(s.state(a), Ok(Running));
        assert_eq!(s.take_interrupted(a), Ok(false));
    }

    #[test]
    fn interrupt_waiter() {
        let mut s = scheduler();
        let a = spawn(&mut s, 0, 5);
        let b = spawn(&mut s, 0, 5);
        s.switch_thread();
        s.monitor_enter(OBJ).unwrap();
        s.monitor_enter(OBJ).unwrap();
        s.wait(OBJ, 0).unwrap();
        assert_eq!(s.switch_thread(), Some(b));
        s.monitor_enter(OBJ).unwrap();
        s.interrupt(a).unwrap();
        assert_eq!(s.state(a), Ok(Ready));
        assert!(s.monitors().get(OBJ).unwrap().waiters().next().is_none());
        // `b` still owns the monitor, so `a` queues for it.
        assert_eq!(s.switch_thread(), Some(b));
        assert_eq!(s.state(a), Ok(Entering {obj: OBJ}));
        s.monitor_exit(OBJ).unwrap();
        assert_eq!(s.switch_thread(), Some(a));
        assert_eq!(s.monitors().owner(OBJ), Some(a));
        assert_eq!(s.monitors().get(OBJ).unwrap().depth(), 2);
        assert_eq!(s.take_interrupted(a), Ok(true));
    }

    #[test]
    fn block_and_unblock() {
        let mut s = scheduler();
        let a = spawn(&mut s, 0, 5);
        let b = spawn(&mut s, 0, 5);
        s.switch_thread();
        s.block_current_thread(vec![1, 2, 3].into_boxed_slice()).unwrap();
        assert_eq!(s.state(a), Ok(BlockedAsync));
        assert_eq!(s.switch_thread(), Some(b));
        assert_eq!(s.switch_thread(), Some(b));
        assert_eq!(s.unblock_thread(b), Ok(None));
        assert_eq!(s.unblock_thread(a), Ok(Some(vec![1, 2, 3].into_boxed_slice())));
        assert_eq!(s.state(a), Ok(Ready));
        assert_eq!(s.unblock_thread(a), Ok(None));
    }

    #[test]
    fn oops_in_every_state() {
        let mut s = scheduler();
        let objs: Vec<Oop> = (1..=6).map(|i| Oop(0x1000 * i)).collect();
        let ids: Vec<ThreadId> = objs.iter().enumerate().map(|(i, &obj)| {
            let task = if i == 4 { TaskId(1) } else { TaskId(0) };
            s.add_thread(task, Priority::NORM, obj).unwrap()
        }).collect();
        for &id in &ids[..5] { s.start(id).unwrap(); }
        s.switch_thread();
        s.sleep_current_thread(100).unwrap();
        s.switch_thread();
        s.monitor_enter(OBJ).unwrap();
        s.wait(OBJ, 0).unwrap();
        s.switch_thread();
        s.block_current_thread(Box::default()).unwrap();
        s.switch_thread();
        s.suspend_threads(TaskId(1));
        let states: Vec<ThreadState> = ids.iter().map(|&id| s.state(id).unwrap()).collect();
        assert_eq!(states, vec![
            Sleeping {deadline: 100},
            Waiting {obj: OBJ, deadline: None},
            BlockedAsync,
            Running,
            Suspended {deadline: None},
            New,
        ]);

        let mut seen = Vec::new();
        s.oops_do(|oop| { seen.push(*oop); oop.0 += 1; });
        for obj in &objs {
            assert!(seen.contains(obj), "{:?} not visited", obj);
        }
        for (&id, obj) in ids.iter().zip(&objs) {
            assert_eq!(s.thread(id).unwrap().thread_obj, Oop(obj.0 + 1));
        }
        let moved = Oop(OBJ.0 + 1);
        assert_eq!(s.state(ids[1]), Ok(Waiting {obj: moved, deadline: None}));
        assert_eq!(s.monitors().get(moved).unwrap().waiters().collect::<Vec<_>>(), vec![ids[1]]);
    }

    #[test]
    fn resource_limit() {
        let config = SchedulerConfig {max_threads: 2, ..SchedulerConfig::default()};
        let mut s = Scheduler::new(config, VirtualClock::new());
        let a = s.add_thread(TaskId(0), Priority::NORM, Oop(1)).unwrap();
        s.add_thread(TaskId(0), Priority::NORM, Oop(2)).unwrap();
        assert_eq!(s.add_thread(TaskId(0), Priority::NORM, Oop(3)), Err(SchedulerError::ResourceLimit {max: 2}));
        s.terminate(a).unwrap();
        assert!(s.add_thread(TaskId(0), Priority::NORM, Oop(3)).is_ok());
    }

    #[test]
    fn time_slice() {
        let mut s = scheduler();
        spawn(&mut s, 0, 5);
        assert!(!s.check_time_slice());
        s.switch_thread();
        s.clock_mut().advance(9);
        assert!(!s.check_time_slice());
        s.clock_mut().advance(1);
        assert!(s.check_time_slice());
        assert!(s.take_timer_tick());
        assert!(!s.take_timer_tick());
        s.set_timer_tick();
        s.switch_thread();
        assert!(!s.take_timer_tick());
    }
}
