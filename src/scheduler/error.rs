use thiserror::Error;

use super::{ThreadId, ThreadState};
use crate::oop::{Oop};

/**
 * Reasons why a [`Scheduler`] operation was refused.
 *
 * The VM reports these as Java exceptions (`IllegalMonitorStateException`,
 * `IllegalThreadStateException`, `InterruptedException`) or, for
 * `ResourceLimit`, as a resource condition. A failed operation changes
 * nothing, except that `Interrupted` clears the thread's interrupted flag.
 *
 * [`Scheduler`]: super::Scheduler
 */
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("current thread does not own the monitor of {0:?}")]
    IllegalMonitorState(Oop),
    #[error("{thread:?} is {state:?}")]
    IllegalThreadState { thread: ThreadId, state: ThreadState },
    #[error("no such thread: {0:?}")]
    NoSuchThread(ThreadId),
    #[error("cannot create more than {max} threads")]
    ResourceLimit { max: usize },
    #[error("no thread is running")]
    NoCurrentThread,
    #[error("{0:?} was interrupted")]
    Interrupted(ThreadId),
}
