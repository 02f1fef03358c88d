//! A linear reduction: 1296 ones folded by associative binary sums.
//!
//! The chain is the worst case for stealing (no parallelism at all), so
//! it mostly exercises expansion, reservation order, and the chunk churn
//! of boxed intermediates.

use std::error::Error;
use std::sync::Arc;

use stealdag::{ClusterConfig, ClusterRuntime, Input, Thunk, ThunkBuilder, ThunkFn, Value};

type TestResult = Result<(), Box<dyn Error>>;

fn add2() -> ThunkFn {
    Arc::new(|args: Vec<Value>| {
        Ok(Value::Int(args[0].expect_int()? + args[1].expect_int()?))
    })
}

/// `n` ones combined by `n - 1` binary adds; the last add is the root.
fn ones_chain(n: usize) -> Arc<Thunk> {
    assert!(n >= 2);
    let mut acc = ThunkBuilder::literal(Value::Int(1)).build();
    for _ in 1..n - 1 {
        acc = ThunkBuilder::func(
            "add",
            add2(),
            vec![Input::Thunk(acc), Input::Literal(Value::Int(1))],
        )
        .build();
    }
    ThunkBuilder::func(
        "add",
        add2(),
        vec![Input::Thunk(acc), Input::Literal(Value::Int(1))],
    )
    .get_result(true)
    .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chain_of_1296_ones_sums_to_1296() -> TestResult {
    let root = ones_chain(1296);
    let mut runtime = ClusterRuntime::new(ClusterConfig::local("node1-", 2))?;

    let result = runtime.submit(&root).await?;
    assert_eq!(result, Value::Int(1296));

    // Every boxed intermediate had a single consumer and is reclaimed.
    assert!(runtime.pool().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rerunning_after_a_reset_gives_the_same_result() -> TestResult {
    let root = ones_chain(64);
    let mut runtime = ClusterRuntime::new(ClusterConfig::local("node1-", 2))?;

    let first = runtime.submit(&root).await?;
    runtime.reset(true);
    let second = runtime.submit(&root).await?;

    assert_eq!(first, second);
    assert_eq!(second, Value::Int(64));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resubmitting_without_reset_serves_the_cached_root() -> TestResult {
    let root = ones_chain(64);
    let mut runtime = ClusterRuntime::new(ClusterConfig::local("node1-", 2))?;

    let first = runtime.submit(&root).await?;
    // The root result is still in the metadata store; the broker's keep
    // short-circuits and no executor runs anything.
    let second = runtime.submit(&root).await?;
    assert_eq!(first, second);
    Ok(())
}
