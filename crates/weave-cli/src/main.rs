//! Scenario driver: runs bundled litmus tests under a chosen scheduler and
//! prints the outcome, including the event trace of a failing run.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use weave::{check, Atomic, Config, Monitor, Ordering, RaceCell, Report, Test};

#[derive(Parser)]
#[command(name = "weave", about = "Run concurrency litmus scenarios under the weave checker")]
struct Cli {
    /// Scenario to run.
    #[arg(value_enum)]
    scenario: Scenario,

    /// Exhaustively enumerate interleavings instead of random fuzzing.
    #[arg(long)]
    exhaustive: bool,

    /// Iteration budget for random scheduling.
    #[arg(long, default_value_t = 10_000)]
    iterations: u64,

    /// Seed for random scheduling.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Per-run instrumented-operation budget.
    #[arg(long, default_value_t = 10_000)]
    livelock_bound: usize,

    /// Print the full event trace even for passing runs.
    #[arg(long)]
    trace: bool,
}

#[derive(Copy, Clone, ValueEnum)]
enum Scenario {
    /// Relaxed message passing: the flag may outrun the payload.
    MessagePassing,
    /// Relaxed store buffering: both readers may see zero.
    StoreBuffering,
    /// Two monitors taken in opposite order.
    Deadlock,
    /// A torn increment (separate load and store) losing an update.
    TornCounter,
    /// Peterson's lock with relaxed accesses racing on plain data.
    Peterson,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = if cli.exhaustive {
        Config::exhaustive()
    } else {
        Config::random(cli.iterations).with_seed(cli.seed)
    };
    config = config.with_livelock_bound(cli.livelock_bound);

    info!(exhaustive = cli.exhaustive, "starting");
    let report = run_scenario(cli.scenario, config)?;

    println!("iterations: {}", report.iterations);
    match &report.failure {
        Some(failure) => {
            println!("FAILED: {failure}");
            for note in &report.notes {
                println!("  also: {note}");
            }
            println!("schedule: {:?}", report.schedule_trace);
            print!("{}", report.trace.interleaved());
            Ok(ExitCode::FAILURE)
        }
        None => {
            println!("passed");
            if cli.trace {
                print!("{}", report.trace.interleaved());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_scenario(scenario: Scenario, config: Config) -> anyhow::Result<Report> {
    let report = match scenario {
        Scenario::MessagePassing => check(config, message_passing),
        Scenario::StoreBuffering => check(config, store_buffering),
        Scenario::Deadlock => check(config, deadlock),
        Scenario::TornCounter => check(config, torn_counter),
        Scenario::Peterson => check(config, peterson),
    };
    if report.iterations == 0 {
        bail!("scenario ran no iterations");
    }
    Ok(report)
}

fn message_passing() -> Test {
    let data = Arc::new(Atomic::new(0u32));
    let flag = Arc::new(Atomic::new(false));

    let (d, f) = (data.clone(), flag.clone());
    let test = Test::new().thread(move |ctx| {
        d.store(ctx, 42, Ordering::Relaxed)?;
        f.store(ctx, true, Ordering::Relaxed)
    });

    test.thread(move |ctx| {
        if flag.load(ctx, Ordering::Relaxed)? {
            ctx.assert_eq(data.load(ctx, Ordering::Relaxed)?, 42)?;
        }
        Ok(())
    })
}

fn store_buffering() -> Test {
    let x = Arc::new(Atomic::new(0u32));
    let y = Arc::new(Atomic::new(0u32));
    let results = Arc::new(parking_lot::Mutex::new([1u32, 1u32]));

    let (a, b, r) = (x.clone(), y.clone(), results.clone());
    let test = Test::new().thread(move |ctx| {
        a.store(ctx, 1, Ordering::Relaxed)?;
        r.lock()[0] = b.load(ctx, Ordering::Relaxed)?;
        Ok(())
    });

    let (a, b, r) = (y, x, results.clone());
    let test = test.thread(move |ctx| {
        a.store(ctx, 1, Ordering::Relaxed)?;
        r.lock()[1] = b.load(ctx, Ordering::Relaxed)?;
        Ok(())
    });

    test.on_end(move || {
        let r = results.lock();
        if *r == [0, 0] {
            info!("observed the store-buffering outcome r0 = r1 = 0");
        }
    })
}

fn deadlock() -> Test {
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
}

fn torn_counter() -> Test {
    let counter = Arc::new(Atomic::new(0u32));
    let prevs = Arc::new(parking_lot::Mutex::new(Vec::new()));

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
            info!("observed a lost update: both increments read 0");
        }
    })
}

fn peterson() -> Test {
    let flag = Arc::new([Atomic::new(false), Atomic::new(false)]);
    let turn = Arc::new(Atomic::new(0usize));
    let counter = Arc::new(RaceCell::new(0u32));

    let mut test = Test::new();
    for me in 0..2usize {
        let other = 1 - me;
        let (flag, turn, counter) = (flag.clone(), turn.clone(), counter.clone());
        test = test.thread(move |ctx| {
            flag[me].store(ctx, true, Ordering::Relaxed)?;
            turn.store(ctx, other, Ordering::Relaxed)?;
            while flag[other].load(ctx, Ordering::Relaxed)?
                && turn.load(ctx, Ordering::Relaxed)? == other
            {
                ctx.yield_now()?;
            }
            let v = counter.read(ctx)?;
            counter.write(ctx, v + 1)?;
            flag[me].store(ctx, false, Ordering::Relaxed)
        });
    }
    test
}
