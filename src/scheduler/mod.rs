/*!
 * Cooperative scheduling of Java threads.
 *
 * All Java threads share one native thread. A [`Scheduler`] keeps a ready
 * queue for each [`Priority`], and decides which [`JavaThread`] runs next
 * whenever the running thread reaches a scheduling point. It also owns the
 * [`MonitorTable`], because entering, waiting on and notifying monitors
 * block and wake threads.
 *
 * Time is read from a [`Clock`], so that tests can use a [`VirtualClock`].
 */

mod thread;
pub use thread::{ThreadId, TaskId, Priority, ThreadStatus, ThreadState, JavaThread};

mod error;
pub use error::{SchedulerError};

mod monitor;
pub use monitor::{Monitor, MonitorTable};

mod clock;
pub use clock::{Clock, SystemClock, VirtualClock};

mod scheduler;
pub use scheduler::{Scheduler};
