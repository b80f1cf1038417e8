//! The message-passing litmus test in its classic variants.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use weave::{check, fence, Atomic, Config, Failure, Ordering, Test};

/// Release store / acquire load: the payload is visible whenever the flag is.
#[test]
fn test_release_acquire_delivers_payload() {
    let report = check(Config::exhaustive(), || {
        let data = Arc::new(Atomic::new(0u32));
        let flag = Arc::new(Atomic::new(false));

        let (d, f) = (data.clone(), flag.clone());
        let test = Test::new().thread(move |ctx| {
            d.store(ctx, 42, Ordering::Relaxed)?;
            f.store(ctx, true, Ordering::Release)
        });

        let (d, f) = (data, flag);
        test.thread(move |ctx| {
            if f.load(ctx, Ordering::Acquire)? {
                ctx.assert_eq(d.load(ctx, Ordering::Relaxed)?, 42)?;
            }
            Ok(())
        })
    });
    assert!(report.passed(), "unexpected failure: {:?}", report.failure);
}

/// Spin until the flag is observed: the payload must then be visible in
/// every explored interleaving.
#[test]
fn test_spinning_reader_always_observes_payload() {
    let report = check(Config::exhaustive(), || {
        let data = Arc::new(Atomic::new(0u32));
        let flag = Arc::new(Atomic::new(false));

        let (d, f) = (data.clone(), flag.clone());
        let test = Test::new().thread(move |ctx| {
            d.store(ctx, 42, Ordering::Relaxed)?;
            f.store(ctx, true, Ordering::Release)
        });

        let (d, f) = (data, flag);
        test.thread(move |ctx| {
            while !f.load(ctx, Ordering::Acquire)? {
                ctx.yield_now()?;
            }
            ctx.assert_eq(d.load(ctx, Ordering::Relaxed)?, 42)
        })
    });
    assert!(report.passed(), "unexpected failure: {:?}", report.failure);
}

/// With everything relaxed the reader may see the flag without the payload.
#[test]
fn test_relaxed_flag_can_lose_payload() {
    let report = check(Config::exhaustive(), || {
        let data = Arc::new(Atomic::new(0u32));
        let flag = Arc::new(Atomic::new(false));

        let (d, f) = (data.clone(), flag.clone());
        let test = Test::new().thread(move |ctx| {
            d.store(ctx, 42, Ordering::Relaxed)?;
            f.store(ctx, true, Ordering::Relaxed)
        });

        let (d, f) = (data, flag);
        test.thread(move |ctx| {
            if f.load(ctx, Ordering::Relaxed)? {
                ctx.assert_eq(d.load(ctx, Ordering::Relaxed)?, 42)?;
            }
            Ok(())
        })
    });
    assert!(
        matches!(report.failure, Some(Failure::Assertion { .. })),
        "expected an assertion failure, got {:?}",
        report.failure
    );
}

/// Standalone fences upgrade relaxed accesses to the release/acquire pairing.
#[test]
fn test_fences_pair_like_release_acquire() {
    let report = check(Config::exhaustive(), || {
        let data = Arc::new(Atomic::new(0u32));
        let flag = Arc::new(Atomic::new(false));

        let (d, f) = (data.clone(), flag.clone());
        let test = Test::new().thread(move |ctx| {
            d.store(ctx, 42, Ordering::Relaxed)?;
            fence(ctx, Ordering::Release)?;
            f.store(ctx, true, Ordering::Relaxed)
        });

        let (d, f) = (data, flag);
        test.thread(move |ctx| {
            if f.load(ctx, Ordering::Relaxed)? {
                fence(ctx, Ordering::Acquire)?;
                ctx.assert_eq(d.load(ctx, Ordering::Relaxed)?, 42)?;
            }
            Ok(())
        })
    });
    assert!(report.passed(), "unexpected failure: {:?}", report.failure);
}

/// Store buffering: with SeqCst accesses, both threads reading zero is
/// impossible.
#[test]
fn test_store_buffering_seq_cst_forbids_both_zero() {
    let report = check(Config::exhaustive(), || {
        let x = Arc::new(Atomic::new(0u32));
        let y = Arc::new(Atomic::new(0u32));
        let results = Arc::new(parking_lot::Mutex::new([None, None]));

        let (a, b, r) = (x.clone(), y.clone(), results.clone());
        let test = Test::new().thread(move |ctx| {
            a.store(ctx, 1, Ordering::SeqCst)?;
            r.lock()[0] = Some(b.load(ctx, Ordering::SeqCst)?);
            Ok(())
        });

        let (a, b, r) = (y, x, results.clone());
        let test = test.thread(move |ctx| {
            a.store(ctx, 1, Ordering::SeqCst)?;
            r.lock()[1] = Some(b.load(ctx, Ordering::SeqCst)?);
            Ok(())
        });

        test.on_end(move || {
            let r = results.lock();
            assert!(
                r[0] == Some(1) || r[1] == Some(1),
                "store buffering outcome under SeqCst: {:?}",
                *r
            );
        })
    });
    assert!(report.passed(), "unexpected failure: {:?}", report.failure);
}

/// Store buffering: relaxed loads may look past the other thread's store, so
/// the both-zero outcome must show up somewhere in the exploration.
#[test]
fn test_store_buffering_relaxed_allows_both_zero() {
    let saw_both_zero = Arc::new(AtomicBool::new(false));
    let outer = saw_both_zero.clone();
    let report = check(Config::exhaustive(), move || {
        let x = Arc::new(Atomic::new(0u32));
        let y = Arc::new(Atomic::new(0u32));
        let results = Arc::new(parking_lot::Mutex::new([None, None]));
        let seen = outer.clone();

        let (a, b, r) = (x.clone(), y.clone(), results.clone());
        let test = Test::new().thread(move |ctx| {
            a.store(ctx, 1, Ordering::Relaxed)?;
            r.lock()[0] = Some(b.load(ctx, Ordering::Relaxed)?);
            Ok(())
        });

        let (a, b, r) = (y, x, results.clone());
        let test = test.thread(move |ctx| {
            a.store(ctx, 1, Ordering::Relaxed)?;
            r.lock()[1] = Some(b.load(ctx, Ordering::Relaxed)?);
            Ok(())
        });

        test.on_end(move || {
            let r = results.lock();
            if *r == [Some(0), Some(0)] {
                seen.store(true, Ordering::Relaxed);
            }
        })
    });
    assert!(report.passed(), "unexpected failure: {:?}", report.failure);
    assert!(
        saw_both_zero.load(Ordering::Relaxed),
        "the relaxed both-zero outcome was never explored"
    );
}
