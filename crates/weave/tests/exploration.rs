//! Behavior of the exhaustive scheduler as a whole: enumeration terminates,
//! deadlocks and livelocks are reported, yields defeat spin livelock.

use std::sync::Arc;

use weave::{check, Atomic, Config, Failure, Monitor, Ordering, Test};

#[test]
fn test_exhaustive_enumeration_terminates() {
    let report = check(Config::exhaustive(), || {
        let x = Arc::new(Atomic::new(0u32));
        let y = Arc::new(Atomic::new(0u32));

        let a = x.clone();
        let test = Test::new().thread(move |ctx| a.store(ctx, 1, Ordering::Relaxed));
        test.thread(move |ctx| y.store(ctx, 1, Ordering::Relaxed))
    });
    assert!(report.passed(), "unexpected failure: {:?}", report.failure);
    // Two independent single-op threads: more than one schedule, but a small
    // finite number of them.
    assert!(report.iterations >= 2, "iterations: {}", report.iterations);
    assert!(report.iterations <= 32, "iterations: {}", report.iterations);
}

/// Opposite lock order must be reported as a deadlock, not hung on.
#[test]
fn test_opposite_lock_order_deadlocks() {
    let report = check(Config::exhaustive(), || {
        let a = Arc::new(Monitor::new());
        let b = Arc::new(Monitor::new());

        let (m1, m2) = (a.clone(), b.clone());
        let test = Test::new().thread(move |ctx| {
            m1.enter(ctx)?;
            m2.enter(ctx)?;
            m2.exit(ctx)?;
            m1.exit(ctx)
        });

        let (m1, m2) = (b, a);
        test.thread(move |ctx| {
            m1.enter(ctx)?;
            m2.enter(ctx)?;
            m2.exit(ctx)?;
            m1.exit(ctx)
        })
    });
    assert!(
        matches!(report.failure, Some(Failure::Deadlock(_))),
        "expected a deadlock, got {:?}",
        report.failure
    );
}

/// A spin loop that never yields exceeds the per-run operation budget.
#[test]
fn test_unyielding_spin_is_a_livelock() {
    let config = Config::exhaustive().with_livelock_bound(200);
    let report = check(config, || {
        let flag = Arc::new(Atomic::new(false));

        let f = flag.clone();
        let test = Test::new().thread(move |ctx| {
            while !f.load(ctx, Ordering::Acquire)? {}
            Ok(())
        });

        test.thread(move |ctx| {
            // The setter spins too, so the schedule where only the reader
            // runs burns the whole budget.
            for _ in 0..4 {
                ctx.yield_now()?;
            }
            flag.store(ctx, true, Ordering::Release)
        })
    });
    assert!(
        matches!(report.failure, Some(Failure::Livelock(_))),
        "expected a livelock, got {:?}",
        report.failure
    );
}

/// The same spin loop with a yield lets the fairness machinery schedule the
/// setter, so exploration completes with no failure.
#[test]
fn test_yielding_spin_completes() {
    let report = check(Config::exhaustive().with_livelock_bound(2_000), || {
        let flag = Arc::new(Atomic::new(false));

        let f = flag.clone();
        let test = Test::new().thread(move |ctx| {
            while !f.load(ctx, Ordering::Acquire)? {
                ctx.yield_now()?;
            }
            Ok(())
        });

        test.thread(move |ctx| flag.store(ctx, true, Ordering::Release))
    });
    assert!(report.passed(), "unexpected failure: {:?}", report.failure);
}

/// A torn read-modify-write (separate load and store) loses updates; the
/// exploration must find the interleaving that proves it.
#[test]
fn test_exploration_finds_lost_update() {
    let saw_lost_update = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let outer = saw_lost_update.clone();
    let report = check(Config::exhaustive(), move || {
        let counter = Arc::new(Atomic::new(0u32));
        let prevs = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = outer.clone();

        let mut test = Test::new();
        for _ in 0..2 {
            let (c, p) = (counter.clone(), prevs.clone());
            test = test.thread(move |ctx| {
                let v = c.load(ctx, Ordering::SeqCst)?;
                p.lock().push(v);
                c.store(ctx, v + 1, Ordering::SeqCst)
            });
        }

        test.on_end(move || {
            if *prevs.lock() == [0, 0] {
                seen.store(true, Ordering::Relaxed);
            }
        })
    });
    assert!(report.passed(), "unexpected failure: {:?}", report.failure);
    assert!(
        saw_lost_update.load(Ordering::Relaxed),
        "the lost-update interleaving was never explored"
    );
}

/// Random scheduling runs exactly the configured number of iterations when
/// nothing fails, and the same seed reproduces the same exploration.
#[test]
fn test_random_iteration_budget_and_reproducibility() {
    let run = |seed: u64| {
        check(Config::random(50).with_seed(seed), || {
            let x = Arc::new(Atomic::new(0u32));
            let w = x.clone();
            let test = Test::new().thread(move |ctx| w.store(ctx, 1, Ordering::Release));
            test.thread(move |ctx| {
                x.load(ctx, Ordering::Acquire)?;
                Ok(())
            })
        })
    };
    let a = run(7);
    let b = run(7);
    assert!(a.passed());
    assert_eq!(a.iterations, 50);
    assert_eq!(a.schedule_trace, b.schedule_trace);
}
