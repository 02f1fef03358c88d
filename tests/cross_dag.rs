//! A small hand-built DAG with internal fan-in / fan-out: two literal
//! leaves feed both a sum and a product, which feed the root.

use std::error::Error;
use std::sync::Arc;

use stealdag::{ClusterConfig, ClusterRuntime, Input, Thunk, ThunkBuilder, ThunkFn, Value};

type TestResult = Result<(), Box<dyn Error>>;

fn add() -> ThunkFn {
    Arc::new(|args: Vec<Value>| {
        let mut sum = 0;
        for a in args.iter() {
            sum += a.expect_int()?;
        }
        Ok(Value::Int(sum))
    })
}

fn mul() -> ThunkFn {
    Arc::new(|args: Vec<Value>| {
        let mut product = 1;
        for a in args.iter() {
            product *= a.expect_int()?;
        }
        Ok(Value::Int(product))
    })
}

/// (3 + 4) * (3 * 4) = 84, with each leaf consumed by two nodes.
fn cross_dag() -> Arc<Thunk> {
    let a = ThunkBuilder::literal(Value::Int(3)).build();
    let b = ThunkBuilder::literal(Value::Int(4)).build();
    let sum = ThunkBuilder::func(
        "sum",
        add(),
        vec![Input::Thunk(a.clone()), Input::Thunk(b.clone())],
    )
    .build();
    let product = ThunkBuilder::func("product", mul(), vec![Input::Thunk(a), Input::Thunk(b)])
        .build();
    ThunkBuilder::func("combine", mul(), vec![Input::Thunk(sum), Input::Thunk(product)])
        .get_result(true)
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fan_in_dag_produces_84() -> TestResult {
    let root = cross_dag();
    let mut runtime = ClusterRuntime::new(ClusterConfig::local("node1-", 3))?;

    let result = runtime.submit(&root).await?;
    assert_eq!(result, Value::Int(84));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fan_in_dag_runs_on_a_single_executor_too() -> TestResult {
    // A lone executor must be able to drain its own shareable ring.
    let root = cross_dag();
    let mut runtime = ClusterRuntime::new(ClusterConfig::local("solo-", 1))?;

    let result = runtime.submit(&root).await?;
    assert_eq!(result, Value::Int(84));
    Ok(())
}
