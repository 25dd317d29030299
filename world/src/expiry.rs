//! Wall clock and one-shot timers that drive cache expiry.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, SystemTime},
};

use storyworld_core::Timestamp;
use tokio::{
    runtime::{Handle, TryCurrentError},
    task::AbortHandle,
};

/// Deferred work handed to a [`Scheduler`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Source of time and one-shot timers.
pub trait Scheduler: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> Timestamp;

    /// Runs `task` once after `delay`, unless the returned handle is cancelled first.
    fn after(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// Cancellation handle for a timer armed through [`Scheduler::after`].
#[derive(Clone, Debug, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    task: Option<AbortHandle>,
}

impl TimerHandle {
    /// Creates a live handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn aborting(mut self, task: AbortHandle) -> Self {
        self.task = Some(task);
        self
    }

    /// Prevents the associated task from running and releases its timer.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Reports whether [`TimerHandle::cancel`] was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Scheduler whose clock only moves when told to.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    now: Timestamp,
    next_sequence: u64,
    timers: Vec<PendingTimer>,
}

struct PendingTimer {
    due: Timestamp,
    sequence: u64,
    handle: TimerHandle,
    task: Task,
}

impl ManualScheduler {
    /// Creates a scheduler whose clock starts at `now`.
    #[must_use]
    pub fn starting_at(now: Timestamp) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now,
                ..ManualState::default()
            }),
        }
    }

    /// Moves the clock forward by `by`, running every timer that falls due.
    ///
    /// Timers fire in due order with the clock set to their due time. Tasks
    /// run without the scheduler lock held and may arm new timers, which fire
    /// within the same call when they fall due before its end.
    pub fn advance(&self, by: Duration) {
        let target = self.lock().now.saturating_add(by);
        loop {
            let next = {
                let mut state = self.lock();
                let due = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, timer)| timer.due <= target)
                    .min_by_key(|(_, timer)| (timer.due, timer.sequence))
                    .map(|(index, _)| index);
                match due {
                    Some(index) => {
                        let timer = state.timers.swap_remove(index);
                        state.now = state.now.max(timer.due);
                        Some(timer)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };

            let Some(timer) = next else {
                break;
            };
            if !timer.handle.is_cancelled() {
                (timer.task)();
            }
        }
    }

    /// Number of armed timers that have not been cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock()
            .timers
            .iter()
            .filter(|timer| !timer.handle.is_cancelled())
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Timestamp {
        self.lock().now
    }

    fn after(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = self.lock();
        let due = state.now.saturating_add(delay);
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.timers.push(PendingTimer {
            due,
            sequence,
            handle: handle.clone(),
            task,
        });
        handle
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("timers", &state.timers.len())
            .finish()
    }
}

/// Scheduler backed by the system clock and tokio timers.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    /// Creates a scheduler that spawns its timers onto `runtime`.
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Creates a scheduler bound to the runtime the caller is running on.
    pub fn current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Timestamp {
        let since_epoch = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::from_millis(u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX))
    }

    fn after(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let armed = handle.clone();
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if !armed.is_cancelled() {
                task();
            }
        });
        handle.aborting(timer.abort_handle())
    }
}
