//! Thread orchestration and the run coordinator.
//!
//! One real OS thread is created per logical thread; a turnstile (the
//! `active` id under one mutex) guarantees at most one executes algorithm
//! code at any instant. Suspension points are exactly the instrumented
//! operations: each checkpoint consults the active scheduler, hands the
//! turnstile to the chosen thread and parks the caller. Given the same
//! scheduler decisions the run is reproducible bit for bit.
//!
//! There is no global run state: everything lives in a per-iteration
//! [`Exec`] threaded through [`TestContext`] handles.

use std::fmt::Debug;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::debug;

use crate::clock::VectorClock;
use crate::config::{Config, SchedulerKind};
use crate::error::{Failure, StepResult, Stop};
use crate::exhaustive::ExhaustiveScheduler;
use crate::scheduler::{RandomScheduler, Scheduler};
use crate::set::MAX_THREADS;
use crate::thread::ShadowThread;
use crate::trace::EventLog;

/// Identity allocation for atomics, monitors and cells. Identity only; run
/// state is never process-global.
pub(crate) fn next_object_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Per-iteration run state, owned by the turnstile mutex.
pub(crate) struct Exec {
    pub(crate) scheduler: Box<dyn Scheduler>,
    threads: Vec<ShadowThread>,
    seq_cst_fence: VectorClock,
    log: EventLog,
    schedule_trace: Vec<usize>,
    active: Option<usize>,
    pub(crate) aborting: bool,
    failure: Option<Failure>,
    notes: Vec<Failure>,
    op_count: usize,
    livelock_bound: usize,
}

impl Exec {
    fn new(scheduler: Box<dyn Scheduler>, num_threads: usize, config: &Config) -> Self {
        Self {
            scheduler,
            threads: (0..num_threads)
                .map(|i| ShadowThread::new(i, num_threads))
                .collect(),
            seq_cst_fence: VectorClock::new(num_threads),
            log: EventLog::new(config.trace),
            schedule_trace: Vec::new(),
            active: None,
            aborting: false,
            failure: None,
            notes: Vec::new(),
            op_count: 0,
            livelock_bound: config.livelock_bound,
        }
    }

    pub(crate) fn num_threads(&self) -> usize {
        self.threads.len()
    }

    pub(crate) fn thread_mut(&mut self, id: usize) -> &mut ShadowThread {
        &mut self.threads[id]
    }

    /// Split borrow for operations that need the calling thread's shadow
    /// state and the scheduler at once (load lookback choices).
    pub(crate) fn threads_and_scheduler(
        &mut self,
    ) -> (&mut [ShadowThread], &mut dyn Scheduler) {
        (&mut self.threads, &mut *self.scheduler)
    }

    pub(crate) fn trace(
        &mut self,
        thread_id: usize,
        clock: u64,
        location: &'static Location<'static>,
        what: String,
    ) {
        self.log.record(thread_id, clock, location, what);
    }

    /// Record a failure. The first one is retained; later ones become notes.
    pub(crate) fn fail(&mut self, failure: Failure) {
        if self.failure.is_none() {
            debug!(%failure, "run failed");
            self.failure = Some(failure);
        } else {
            self.notes.push(failure);
        }
        self.aborting = true;
    }

    pub(crate) fn fence(&mut self, id: usize, order: Ordering) {
        let thread = &mut self.threads[id];
        thread.advance();
        thread.fence(order, &mut self.seq_cst_fence);
    }

    pub(crate) fn global_fence(&mut self, id: usize) {
        self.threads[id].advance();
        for thread in self.threads.iter() {
            self.seq_cst_fence.join(&thread.releases_acquired);
        }
        self.threads[id].releases_acquired.join(&self.seq_cst_fence);
    }
}

pub(crate) struct Shared {
    exec: Mutex<Exec>,
    condvar: Condvar,
}

pub(crate) type ExecGuard<'a> = MutexGuard<'a, Exec>;

/// Handle to the run, one per logical thread. Thread bodies receive one and
/// pass it to every instrumented operation.
pub struct TestContext<'a> {
    id: usize,
    shared: &'a Shared,
}

impl<'a> TestContext<'a> {
    /// This logical thread's id (its index in the test's thread list).
    pub fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn exec(&self) -> ExecGuard<'a> {
        self.shared.exec.lock()
    }

    /// Scheduling checkpoint: every instrumented operation calls this first.
    pub(crate) fn checkpoint(&self) -> StepResult<()> {
        self.checkpoint_inner(false)
    }

    /// Explicit fairness point for spin loops: tells the scheduler other
    /// threads must run for the caller to make progress.
    pub fn yield_now(&self) -> StepResult<()> {
        self.checkpoint_inner(true)
    }

    fn checkpoint_inner(&self, yielding: bool) -> StepResult<()> {
        let mut exec = self.exec();
        if exec.aborting {
            return Err(Stop);
        }
        debug_assert_eq!(exec.scheduler.running_thread(), self.id);
        exec.op_count += 1;
        if exec.op_count > exec.livelock_bound {
            let bound = exec.livelock_bound;
            return Err(self.fail_in(&mut exec, Failure::Livelock(bound)));
        }
        if yielding {
            exec.scheduler.yield_point();
        }
        match exec.scheduler.maybe_switch() {
            Ok(next) => {
                exec.schedule_trace.push(next);
                if next != self.id {
                    exec.active = Some(next);
                    self.shared.condvar.notify_all();
                    self.park(&mut exec)?;
                }
                Ok(())
            }
            Err(fault) => Err(self.fail_in(&mut exec, fault.into())),
        }
    }

    /// Block until the turnstile points at the caller again (or the run is
    /// aborting).
    pub(crate) fn park(&self, exec: &mut ExecGuard<'_>) -> StepResult<()> {
        while exec.active != Some(self.id) && !exec.aborting {
            self.shared.condvar.wait(exec);
        }
        if exec.aborting {
            Err(Stop)
        } else {
            Ok(())
        }
    }

    /// Hand the turnstile to the scheduler's next pick and park. Used when
    /// the caller has just blocked itself (monitor enter/wait).
    pub(crate) fn switch_away(&self, exec: &mut ExecGuard<'_>) -> StepResult<()> {
        match exec.scheduler.maybe_switch() {
            Ok(next) => {
                exec.schedule_trace.push(next);
                exec.active = Some(next);
                self.shared.condvar.notify_all();
                self.park(exec)
            }
            Err(fault) => Err(self.fail_in(exec, fault.into())),
        }
    }

    /// Record a failure, wake everyone and return the stop signal.
    pub(crate) fn fail_in(&self, exec: &mut Exec, failure: Failure) -> Stop {
        exec.fail(failure);
        self.shared.condvar.notify_all();
        Stop
    }

    /// User-level correctness check; a false condition fails the run.
    #[track_caller]
    pub fn assert(&self, condition: bool, message: impl Into<String>) -> StepResult<()> {
        if condition {
            return Ok(());
        }
        let location = Location::caller();
        let mut exec = self.exec();
        Err(self.fail_in(
            &mut exec,
            Failure::Assertion {
                message: message.into(),
                location: location.to_string(),
            },
        ))
    }

    /// Equality variant of [`assert`](Self::assert).
    #[track_caller]
    pub fn assert_eq<V: PartialEq + Debug>(&self, actual: V, expected: V) -> StepResult<()> {
        if actual == expected {
            return Ok(());
        }
        let location = Location::caller();
        let mut exec = self.exec();
        Err(self.fail_in(
            &mut exec,
            Failure::Assertion {
                message: format!("expected {:?}, got {:?}", expected, actual),
                location: location.to_string(),
            },
        ))
    }
}

type ThreadBody = Box<dyn FnOnce(&TestContext<'_>) -> StepResult<()> + Send>;

/// One test: an ordered list of thread entry procedures plus optional
/// begin/end hooks. Rebuilt by the setup closure for every iteration.
#[derive(Default)]
pub struct Test {
    bodies: Vec<ThreadBody>,
    on_begin: Option<Box<dyn FnOnce()>>,
    on_end: Option<Box<dyn FnOnce()>>,
}

impl Test {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a thread entry procedure; its id is its position.
    pub fn thread(
        mut self,
        body: impl FnOnce(&TestContext<'_>) -> StepResult<()> + Send + 'static,
    ) -> Self {
        self.bodies.push(Box::new(body));
        self
    }

    /// Hook invoked before the threads start.
    pub fn on_begin(mut self, hook: impl FnOnce() + 'static) -> Self {
        self.on_begin = Some(Box::new(hook));
        self
    }

    /// Hook invoked after every thread has been joined.
    pub fn on_end(mut self, hook: impl FnOnce() + 'static) -> Self {
        self.on_end = Some(Box::new(hook));
        self
    }
}

/// Outcome of a whole `check` call.
#[derive(Debug)]
pub struct Report {
    /// First detected failure, if any.
    pub failure: Option<Failure>,
    /// Failures detected after the first.
    pub notes: Vec<Failure>,
    /// Iterations actually run.
    pub iterations: u64,
    /// Event log of the reported (failing or final) iteration.
    pub trace: EventLog,
    /// Scheduling decisions of the reported iteration.
    pub schedule_trace: Vec<usize>,
}

impl Report {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

struct IterationOutcome {
    failure: Option<Failure>,
    notes: Vec<Failure>,
    log: EventLog,
    schedule_trace: Vec<usize>,
}

fn make_scheduler(config: &Config, num_threads: usize) -> Box<dyn Scheduler> {
    match config.scheduler {
        SchedulerKind::Random { iterations, seed } => {
            Box::new(RandomScheduler::new(num_threads, iterations, seed))
        }
        SchedulerKind::Exhaustive { max_choice_depth } => {
            Box::new(ExhaustiveScheduler::new(num_threads, max_choice_depth))
        }
    }
}

/// Run `setup`'s test under `config` until a failure is found, the random
/// iteration budget is spent, or the exhaustive enumeration completes.
///
/// `setup` is invoked once per iteration and must build the same thread
/// structure each time (the exhaustive scheduler replays decision prefixes).
pub fn check(config: Config, mut setup: impl FnMut() -> Test) -> Report {
    let mut scheduler: Option<Box<dyn Scheduler>> = None;
    let mut expected_threads = None;
    let mut iterations = 0u64;
    loop {
        let test = setup();
        let num_threads = test.bodies.len();
        assert!(
            (1..=MAX_THREADS).contains(&num_threads),
            "tests need between 1 and {MAX_THREADS} threads"
        );
        match expected_threads {
            None => expected_threads = Some(num_threads),
            Some(expected) => assert_eq!(
                expected, num_threads,
                "setup must build the same thread structure every iteration"
            ),
        }
        let sched = scheduler
            .take()
            .unwrap_or_else(|| make_scheduler(&config, num_threads));
        let (sched, outcome) = run_iteration(test, sched, &config);
        iterations += 1;
        let mut sched = sched;
        if outcome.failure.is_some() || !sched.new_iteration() {
            debug!(iterations, failed = outcome.failure.is_some(), "check done");
            return Report {
                failure: outcome.failure,
                notes: outcome.notes,
                iterations,
                trace: outcome.log,
                schedule_trace: outcome.schedule_trace,
            };
        }
        scheduler = Some(sched);
    }
}

fn run_iteration(
    test: Test,
    scheduler: Box<dyn Scheduler>,
    config: &Config,
) -> (Box<dyn Scheduler>, IterationOutcome) {
    let Test {
        bodies,
        on_begin,
        on_end,
    } = test;
    let num_threads = bodies.len();

    if let Some(begin) = on_begin {
        begin();
    }

    let shared = Shared {
        exec: Mutex::new(Exec::new(scheduler, num_threads, config)),
        condvar: Condvar::new(),
    };

    // First scheduling decision happens before any thread starts; every
    // thread parks at birth until the turnstile points at it.
    {
        let mut exec = shared.exec.lock();
        match exec.scheduler.maybe_switch() {
            Ok(first) => {
                exec.schedule_trace.push(first);
                exec.active = Some(first);
            }
            Err(fault) => exec.fail(fault.into()),
        }
    }

    std::thread::scope(|scope| {
        for (id, body) in bodies.into_iter().enumerate() {
            let shared = &shared;
            scope.spawn(move || thread_main(id, body, shared));
        }
    });

    if let Some(end) = on_end {
        end();
    }

    let exec = shared.exec.into_inner();
    (
        exec.scheduler,
        IterationOutcome {
            failure: exec.failure,
            notes: exec.notes,
            log: exec.log,
            schedule_trace: exec.schedule_trace,
        },
    )
}

/// Entry wrapper for one logical thread: park at birth, run the body,
/// report completion and hand the turnstile onward.
fn thread_main(id: usize, body: ThreadBody, shared: &Shared) {
    let ctx = TestContext { id, shared };
    {
        let mut exec = shared.exec.lock();
        if ctx.park(&mut exec).is_err() {
            return; // run failed before this thread ever ran
        }
    }

    // An Err here means a failure was already recorded at some checkpoint;
    // nothing more to do than unwind cleanly.
    let _ = body(&ctx);

    let mut exec = shared.exec.lock();
    if exec.aborting {
        exec.active = None;
        shared.condvar.notify_all();
        return;
    }
    exec.scheduler.thread_finished();
    debug!(thread = id, "finished");
    if exec.scheduler.all_finished() {
        exec.active = None;
        shared.condvar.notify_all();
        return;
    }
    match exec.scheduler.maybe_switch() {
        Ok(next) => {
            exec.schedule_trace.push(next);
            exec.active = Some(next);
            shared.condvar.notify_all();
        }
        Err(fault) => {
            let failure: Failure = fault.into();
            exec.fail(failure);
            shared.condvar.notify_all();
        }
    }
}
