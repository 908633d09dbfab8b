use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use star_siege_system_scheduling::{
    DelaySource, Scheduler, TaskControl, TaskState, TimedTask, UniformDelay,
};

/// Records every requested range and answers from a script, falling back to
/// a uniform draw once the script runs out.
#[derive(Clone, Default)]
struct ScriptedDelay {
    requests: Arc<Mutex<Vec<(Duration, Duration)>>>,
    script: Arc<Mutex<VecDeque<Duration>>>,
}

struct ScriptedDelaySource {
    handle: ScriptedDelay,
    fallback: UniformDelay,
}

impl ScriptedDelay {
    fn with_script(script: &[u64]) -> Self {
        let handle = Self::default();
        handle
            .script
            .lock()
            .unwrap()
            .extend(script.iter().map(|ms| Duration::from_millis(*ms)));
        handle
    }

    fn source(&self) -> ScriptedDelaySource {
        ScriptedDelaySource {
            handle: self.clone(),
            fallback: UniformDelay::new(),
        }
    }

    fn requests(&self) -> Vec<(Duration, Duration)> {
        self.requests.lock().unwrap().clone()
    }
}

impl DelaySource for ScriptedDelaySource {
    fn draw(&mut self, min: Duration, max: Duration) -> Duration {
        self.handle.requests.lock().unwrap().push((min, max));
        match self.handle.script.lock().unwrap().pop_front() {
            Some(delay) => delay,
            None => self.fallback.draw(min, max),
        }
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(ms(1));
    }
    condition()
}

fn counting_callback(counter: &Arc<AtomicU32>) -> impl FnMut(&TaskControl) -> bool + Send {
    let counter = Arc::clone(counter);
    move |_: &TaskControl| {
        let _ = counter.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[test]
fn callback_returning_false_stops_rearming() {
    let scheduler = Scheduler::new("self-stop");
    let counter = Arc::new(AtomicU32::new(0));
    let observed = Arc::clone(&counter);
    let task = TimedTask::new(
        move |_: &TaskControl| observed.fetch_add(1, Ordering::SeqCst) + 1 < 3,
        ms(1),
        ms(3),
        &scheduler,
    )
    .expect("task");
    assert_eq!(task.state(), TaskState::Idle);

    task.start();
    assert!(
        wait_for(ms(2_000), || task.state() == TaskState::Idle
            && counter.load(Ordering::SeqCst) == 3),
        "task should stop itself after the third firing"
    );
    thread::sleep(ms(30));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(task.firings(), 3);
}

#[test]
fn pause_suppresses_firings_and_resume_draws_a_fresh_delay() {
    let scheduler = Scheduler::new("pause");
    let delays = ScriptedDelay::with_script(&[400, 5]);
    let counter = Arc::new(AtomicU32::new(0));
    let task = TimedTask::with_delay_source(
        counting_callback(&counter),
        ms(400),
        ms(401),
        &scheduler,
        delays.source(),
    )
    .expect("task");

    assert!(task.start());
    thread::sleep(ms(20));
    assert!(task.pause());
    assert!(!task.pause(), "second pause is a no-op");
    assert_eq!(task.state(), TaskState::Paused);

    thread::sleep(ms(40));
    assert_eq!(counter.load(Ordering::SeqCst), 0, "no firing while paused");

    let resumed_at = Instant::now();
    assert!(task.resume());
    assert!(
        wait_for(ms(2_000), || counter.load(Ordering::SeqCst) >= 1),
        "resume should fire again"
    );
    assert!(
        resumed_at.elapsed() < ms(300),
        "resume must not wait for the remainder of the discarded delay"
    );
    assert!(delays.requests().len() >= 2, "resume draws a new delay");
    task.reset();
}

#[test]
fn resume_without_pause_is_ignored() {
    let scheduler = Scheduler::new("resume-idle");
    let counter = Arc::new(AtomicU32::new(0));
    let task = TimedTask::new(counting_callback(&counter), ms(1), ms(2), &scheduler)
        .expect("task");

    assert!(!task.resume());
    assert!(!task.pause());
    assert_eq!(task.state(), TaskState::Idle);
    thread::sleep(ms(20));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn interval_update_only_affects_the_next_scheduling_decision() {
    let scheduler = Scheduler::new("update");
    let delays = ScriptedDelay::default();
    let fired_at = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&fired_at);
    let task = TimedTask::with_delay_source(
        move |_: &TaskControl| {
            recorder.lock().unwrap().push(Instant::now());
            true
        },
        ms(150),
        ms(151),
        &scheduler,
        delays.source(),
    )
    .expect("task");

    let started_at = Instant::now();
    task.start();
    thread::sleep(ms(10));
    task.update_intervals(ms(1), ms(2));
    assert_eq!(task.intervals(), (ms(1), ms(2)));

    assert!(
        wait_for(ms(2_000), || fired_at.lock().unwrap().len() >= 3),
        "task should keep firing"
    );
    task.reset();

    let first = fired_at.lock().unwrap()[0];
    assert!(
        first.duration_since(started_at) >= ms(150),
        "pending firing must keep its original deadline"
    );
    let requests = delays.requests();
    assert_eq!(requests[0], (ms(150), ms(151)));
    assert!(requests[1..].iter().all(|range| *range == (ms(1), ms(2))));
}

#[test]
fn callback_can_narrow_its_own_window() {
    let scheduler = Scheduler::new("self-update");
    let delays = ScriptedDelay::default();
    let counter = Arc::new(AtomicU32::new(0));
    let observed = Arc::clone(&counter);
    let task = TimedTask::with_delay_source(
        move |control: &TaskControl| {
            if observed.fetch_add(1, Ordering::SeqCst) == 0 {
                control.update_intervals(ms(2), ms(4));
            }
            true
        },
        ms(5),
        ms(8),
        &scheduler,
        delays.source(),
    )
    .expect("task");

    task.start();
    assert!(wait_for(ms(2_000), || counter.load(Ordering::SeqCst) >= 3));
    task.reset();

    let requests = delays.requests();
    assert_eq!(requests[0], (ms(5), ms(8)));
    assert!(requests[1..].iter().all(|range| *range == (ms(2), ms(4))));
}

#[test]
fn reset_stops_all_future_firings() {
    let scheduler = Scheduler::new("reset");
    let counter = Arc::new(AtomicU32::new(0));
    let task = TimedTask::new(counting_callback(&counter), ms(1), ms(2), &scheduler)
        .expect("task");

    task.start();
    assert!(wait_for(ms(2_000), || counter.load(Ordering::SeqCst) >= 5));
    task.reset();
    let after_reset = counter.load(Ordering::SeqCst);

    thread::sleep(ms(40));
    assert_eq!(counter.load(Ordering::SeqCst), after_reset);
    assert_eq!(task.state(), TaskState::Cancelled);

    assert!(!task.start());
    assert!(!task.resume());
    thread::sleep(ms(20));
    assert_eq!(task.state(), TaskState::Cancelled, "reset is irreversible");
    assert_eq!(counter.load(Ordering::SeqCst), after_reset);
}

#[test]
fn scheduler_shutdown_cancels_bound_tasks() {
    let scheduler = Scheduler::new("shutdown");
    let first = Arc::new(AtomicU32::new(0));
    let second = Arc::new(AtomicU32::new(0));
    let task_a =
        TimedTask::new(counting_callback(&first), ms(1), ms(2), &scheduler).expect("task");
    let task_b =
        TimedTask::new(counting_callback(&second), ms(1), ms(2), &scheduler).expect("task");

    task_a.start();
    task_b.start();
    assert!(wait_for(ms(2_000), || {
        first.load(Ordering::SeqCst) >= 2 && second.load(Ordering::SeqCst) >= 2
    }));

    scheduler.shutdown_now();
    assert!(scheduler.is_shutdown());
    let counts = (first.load(Ordering::SeqCst), second.load(Ordering::SeqCst));
    thread::sleep(ms(30));
    assert_eq!(
        counts,
        (first.load(Ordering::SeqCst), second.load(Ordering::SeqCst))
    );
    assert_eq!(task_a.state(), TaskState::Cancelled);
    assert_eq!(task_b.state(), TaskState::Cancelled);
}

#[test]
fn firings_are_serialised() {
    let scheduler = Scheduler::new("serial");
    let in_flight = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    let counter = Arc::new(AtomicU32::new(0));

    let (flag, overlap, count) = (
        Arc::clone(&in_flight),
        Arc::clone(&overlapped),
        Arc::clone(&counter),
    );
    let task = TimedTask::new(
        move |_: &TaskControl| {
            if flag.swap(true, Ordering::SeqCst) {
                overlap.store(true, Ordering::SeqCst);
            }
            thread::sleep(ms(3));
            flag.store(false, Ordering::SeqCst);
            let _ = count.fetch_add(1, Ordering::SeqCst);
            true
        },
        Duration::ZERO,
        ms(1),
        &scheduler,
    )
    .expect("task");

    task.start();
    for _ in 0..5 {
        task.start();
        thread::sleep(ms(2));
    }
    assert!(wait_for(ms(2_000), || counter.load(Ordering::SeqCst) >= 10));
    task.reset();
    assert!(!overlapped.load(Ordering::SeqCst), "callback re-entered");
}
