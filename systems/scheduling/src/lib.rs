#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Cancellable, pausable periodic timer used to pace scenario launches.
//!
//! A [`TimedTask`] owns one worker thread spawned through a [`Scheduler`].
//! The worker sleeps for a delay drawn from the task's current interval
//! bounds, invokes the callback, and re-arms with a fresh delay for as long as
//! the callback returns `true`. Control calls may arrive from any thread.
//! Firings of one task never overlap.

use std::{
    fmt, io,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use rand::{rngs::SmallRng, Rng, SeedableRng};

/// Lifecycle of a timed task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Constructed or self-stopped; no firing is pending.
    Idle,
    /// A firing is pending or in progress.
    Armed,
    /// Firings are suspended until [`TimedTask::resume`].
    Paused,
    /// Terminal state; no firing will ever happen again.
    Cancelled,
}

/// Errors surfaced while creating timed tasks.
#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    /// The operating system refused to spawn the worker thread.
    #[error("failed to spawn timer worker `{name}`")]
    Spawn {
        /// Name requested for the worker thread.
        name: String,
        /// Underlying spawn failure.
        #[source]
        source: io::Error,
    },
}

/// Source of the randomised delays between firings.
pub trait DelaySource: Send {
    /// Draws a delay from `[min, max)`. Implementations return `min` when the
    /// range is empty.
    fn draw(&mut self, min: Duration, max: Duration) -> Duration;
}

/// Uniform delay source backed by an entropy-seeded [`SmallRng`].
#[derive(Debug)]
pub struct UniformDelay {
    rng: SmallRng,
}

impl UniformDelay {
    /// Creates a new source seeded from operating system entropy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }
}

impl Default for UniformDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl DelaySource for UniformDelay {
    fn draw(&mut self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..max)
    }
}

/// Timer resource that spawns and tracks the workers of its tasks.
///
/// Shutting the scheduler down cancels every task bound to it. Tasks created
/// afterwards start out [`TaskState::Cancelled`].
pub struct Scheduler {
    name: String,
    tasks: Mutex<Vec<Arc<Shared>>>,
    spawned: AtomicUsize,
    shutdown: AtomicBool,
}

impl Scheduler {
    /// Creates a scheduler whose worker threads are named after `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Mutex::new(Vec::new()),
            spawned: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Reports whether [`Scheduler::shutdown_now`] has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Cancels every task bound to the scheduler and waits for their workers.
    ///
    /// When this returns, no callback of those tasks is running or will run,
    /// unless it was invoked from inside one of the callbacks.
    pub fn shutdown_now(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let tasks = std::mem::take(&mut *lock(&self.tasks));
        let count = tasks.len();
        for shared in tasks {
            shared.cancel_and_join();
        }
        tracing::debug!(scheduler = %self.name, tasks = count, "scheduler shut down");
    }

    fn bind<F>(
        &self,
        shared: &Arc<Shared>,
        callback: F,
        delays: Box<dyn DelaySource>,
    ) -> Result<(), SchedulingError>
    where
        F: FnMut(&TaskControl) -> bool + Send + 'static,
    {
        let index = self.spawned.fetch_add(1, Ordering::AcqRel);
        let name = format!("{}-timer-{index}", self.name);
        let worker_shared = Arc::clone(shared);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(worker_shared, callback, delays))
            .map_err(|source| SchedulingError::Spawn { name, source })?;
        *lock(&shared.worker) = Some(handle);

        let mut tasks = lock(&self.tasks);
        if self.is_shutdown() {
            drop(tasks);
            shared.cancel_and_join();
            return Ok(());
        }
        // Tasks cancelled through their own handle no longer need tracking.
        tasks.retain(|task| task.lock().state != TaskState::Cancelled);
        tasks.push(Arc::clone(shared));
        Ok(())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name)
            .field("spawned", &self.spawned.load(Ordering::Relaxed))
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}

/// Handle passed to the callback so a firing can adjust its own task.
#[derive(Debug)]
pub struct TaskControl {
    shared: Arc<Shared>,
}

impl TaskControl {
    /// Replaces the interval bounds used by the next scheduling decision.
    pub fn update_intervals(&self, min: Duration, max: Duration) {
        self.shared.update_intervals(min, max);
    }

    /// Current interval bounds.
    #[must_use]
    pub fn intervals(&self) -> (Duration, Duration) {
        let control = self.shared.lock();
        (control.min, control.max)
    }
}

/// Periodic task firing a callback at randomised delays.
#[derive(Debug)]
pub struct TimedTask {
    shared: Arc<Shared>,
}

impl TimedTask {
    /// Creates an idle task bound to the provided scheduler.
    pub fn new<F>(
        callback: F,
        min_interval: Duration,
        max_interval: Duration,
        scheduler: &Scheduler,
    ) -> Result<Self, SchedulingError>
    where
        F: FnMut(&TaskControl) -> bool + Send + 'static,
    {
        Self::with_delay_source(
            callback,
            min_interval,
            max_interval,
            scheduler,
            UniformDelay::new(),
        )
    }

    /// Creates an idle task drawing its delays from a custom source.
    pub fn with_delay_source<F, D>(
        callback: F,
        min_interval: Duration,
        max_interval: Duration,
        scheduler: &Scheduler,
        delays: D,
    ) -> Result<Self, SchedulingError>
    where
        F: FnMut(&TaskControl) -> bool + Send + 'static,
        D: DelaySource + 'static,
    {
        let shared = Arc::new(Shared::new(min_interval, max_interval));
        if scheduler.is_shutdown() {
            shared.lock().state = TaskState::Cancelled;
            tracing::warn!("timed task created on a shut down scheduler");
            return Ok(Self { shared });
        }
        scheduler.bind(&shared, callback, Box::new(delays))?;
        Ok(Self { shared })
    }

    /// Arms the task. An armed task is re-armed with a fresh delay.
    ///
    /// Returns `false` when the task is cancelled.
    pub fn start(&self) -> bool {
        let mut control = self.shared.lock();
        if control.state == TaskState::Cancelled {
            tracing::debug!("start ignored on cancelled task");
            return false;
        }
        control.state = TaskState::Armed;
        control.epoch = control.epoch.wrapping_add(1);
        drop(control);
        self.shared.wake.notify_all();
        true
    }

    /// Suspends firings. Returns `false` when the task was not armed.
    pub fn pause(&self) -> bool {
        let mut control = self.shared.lock();
        if control.state != TaskState::Armed {
            tracing::debug!(state = ?control.state, "pause ignored");
            return false;
        }
        control.state = TaskState::Paused;
        control.epoch = control.epoch.wrapping_add(1);
        drop(control);
        self.shared.wake.notify_all();
        true
    }

    /// Resumes a paused task with a freshly drawn delay. Returns `false`
    /// when the task was not paused.
    pub fn resume(&self) -> bool {
        let mut control = self.shared.lock();
        if control.state != TaskState::Paused {
            tracing::debug!(state = ?control.state, "resume ignored");
            return false;
        }
        control.state = TaskState::Armed;
        control.epoch = control.epoch.wrapping_add(1);
        drop(control);
        self.shared.wake.notify_all();
        true
    }

    /// Replaces the interval bounds. A pending firing keeps its deadline.
    pub fn update_intervals(&self, min: Duration, max: Duration) {
        self.shared.update_intervals(min, max);
    }

    /// Current interval bounds.
    #[must_use]
    pub fn intervals(&self) -> (Duration, Duration) {
        let control = self.shared.lock();
        (control.min, control.max)
    }

    /// Cancels the task irreversibly and waits for an in-flight firing.
    pub fn reset(&self) {
        self.shared.cancel_and_join();
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.shared.lock().state
    }

    /// Number of completed callback invocations.
    #[must_use]
    pub fn firings(&self) -> u64 {
        self.shared.lock().firings
    }
}

impl Drop for TimedTask {
    fn drop(&mut self) {
        self.shared.cancel_and_join();
    }
}

#[derive(Debug)]
struct Shared {
    control: Mutex<Control>,
    wake: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct Control {
    state: TaskState,
    min: Duration,
    max: Duration,
    /// Bumped whenever a pending deadline must be discarded.
    epoch: u64,
    firings: u64,
}

impl Shared {
    fn new(min: Duration, max: Duration) -> Self {
        Self {
            control: Mutex::new(Control {
                state: TaskState::Idle,
                min,
                max,
                epoch: 0,
                firings: 0,
            }),
            wake: Condvar::new(),
            worker: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Control> {
        lock(&self.control)
    }

    fn update_intervals(&self, min: Duration, max: Duration) {
        let mut control = self.lock();
        control.min = min;
        control.max = max;
    }

    fn cancel_and_join(&self) {
        {
            let mut control = self.lock();
            control.state = TaskState::Cancelled;
            control.epoch = control.epoch.wrapping_add(1);
        }
        self.wake.notify_all();

        let Some(handle) = lock(&self.worker).take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Cancelled from inside the callback; the worker exits once it returns.
            return;
        }
        if handle.join().is_err() {
            tracing::warn!("timer worker panicked before shutdown");
        }
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Control>) -> MutexGuard<'a, Control> {
        self.wake.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps until `deadline`. The flag is `false` when the pending firing
    /// was discarded by a state change.
    fn wait_until<'a>(
        &'a self,
        mut guard: MutexGuard<'a, Control>,
        epoch: u64,
        deadline: Instant,
    ) -> (MutexGuard<'a, Control>, bool) {
        loop {
            if guard.epoch != epoch || guard.state != TaskState::Armed {
                return (guard, false);
            }
            let now = Instant::now();
            if now >= deadline {
                return (guard, true);
            }
            let (next, _) = self
                .wake
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            guard = next;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_worker<F>(shared: Arc<Shared>, mut callback: F, mut delays: Box<dyn DelaySource>)
where
    F: FnMut(&TaskControl) -> bool,
{
    let control = TaskControl {
        shared: Arc::clone(&shared),
    };
    let mut guard = shared.lock();
    loop {
        match guard.state {
            TaskState::Cancelled => return,
            TaskState::Idle | TaskState::Paused => {
                guard = shared.wait(guard);
                continue;
            }
            TaskState::Armed => {}
        }

        let epoch = guard.epoch;
        let delay = delays.draw(guard.min, guard.max);
        tracing::trace!(?delay, "timed task armed");
        let (next, due) = shared.wait_until(guard, epoch, Instant::now() + delay);
        guard = next;
        if !due {
            continue;
        }

        drop(guard);
        let keep_going = callback(&control);
        guard = shared.lock();
        guard.firings = guard.firings.saturating_add(1);

        if guard.state == TaskState::Cancelled {
            return;
        }
        if !keep_going {
            tracing::debug!(firings = guard.firings, "timed task stopped itself");
            guard.state = TaskState::Idle;
        }
    }
}
