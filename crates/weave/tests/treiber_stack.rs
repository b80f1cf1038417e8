//! A Treiber stack over index-based links, pushed through the exhaustive
//! scheduler: no element is lost or duplicated, and sequenced operations are
//! LIFO.

use std::sync::Arc;

use weave::{check, Atomic, Config, Ordering, StepResult, Test, TestContext};

const EMPTY: usize = usize::MAX;

/// Fixed-capacity stack: node identity is its index, `next[i]` is the link.
struct Stack {
    head: Atomic<usize>,
    next: Vec<Atomic<usize>>,
}

impl Stack {
    fn new(capacity: usize) -> Self {
        Self {
            head: Atomic::new(EMPTY),
            next: (0..capacity).map(|_| Atomic::new(EMPTY)).collect(),
        }
    }

    fn push(&self, ctx: &TestContext<'_>, node: usize) -> StepResult<()> {
        loop {
            let head = self.head.load(ctx, Ordering::Acquire)?;
            self.next[node].store(ctx, head, Ordering::Relaxed)?;
            if self.head.compare_exchange(ctx, head, node, Ordering::AcqRel)? {
                return Ok(());
            }
            ctx.yield_now()?;
        }
    }

    fn pop(&self, ctx: &TestContext<'_>) -> StepResult<Option<usize>> {
        loop {
            let head = self.head.load(ctx, Ordering::Acquire)?;
            if head == EMPTY {
                return Ok(None);
            }
            let next = self.next[head].load(ctx, Ordering::Relaxed)?;
            if self.head.compare_exchange(ctx, head, next, Ordering::AcqRel)? {
                return Ok(Some(head));
            }
            ctx.yield_now()?;
        }
    }
}

#[test]
fn test_sequenced_operations_are_lifo() {
    let report = check(Config::exhaustive(), || {
        let stack = Arc::new(Stack::new(2));
        Test::new().thread(move |ctx| {
            stack.push(ctx, 0)?;
            stack.push(ctx, 1)?;
            ctx.assert_eq(stack.pop(ctx)?, Some(1))?;
            ctx.assert_eq(stack.pop(ctx)?, Some(0))?;
            ctx.assert_eq(stack.pop(ctx)?, None)
        })
    });
    assert!(report.passed(), "unexpected failure: {:?}", report.failure);
}

#[test]
fn test_concurrent_push_pop_loses_nothing() {
    let report = check(Config::exhaustive(), || {
        let stack = Arc::new(Stack::new(2));
        let popped = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut test = Test::new();
        for node in 0..2 {
            let (s, p) = (stack.clone(), popped.clone());
            test = test.thread(move |ctx| {
                s.push(ctx, node)?;
                let got = s.pop(ctx)?;
                ctx.assert(got.is_some(), "pop after own push found an empty stack")?;
                p.lock().push(got.unwrap());
                Ok(())
            });
        }

        test.on_end(move || {
            let mut popped = popped.lock();
            popped.sort_unstable();
            assert_eq!(*popped, [0, 1], "elements lost or duplicated");
        })
    });
    assert!(report.passed(), "unexpected failure: {:?}", report.failure);
}
