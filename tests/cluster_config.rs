//! Loading a cluster from a TOML file and driving a run with it.

use std::error::Error;
use std::io::Write;
use std::sync::Arc;

use stealdag::config::{load_and_validate, load_from_path};
use stealdag::{ClusterRuntime, Input, Role, ThunkBuilder, Value};

type TestResult = Result<(), Box<dyn Error>>;

const CONFIG: &str = r#"
[cluster]
poll_interval_ms = 1

[[executor]]
name = "node1-broker"
role = "broker"

[[executor]]
name = "node1-executor1"
help_threshold = 8

[[executor]]
name = "node1-executor2"
share_limit = 256
"#;

fn write_config(contents: &str) -> Result<tempfile::NamedTempFile, Box<dyn Error>> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[test]
fn toml_config_round_trips_with_defaults() -> TestResult {
    let file = write_config(CONFIG)?;
    let cfg = load_and_validate(file.path())?;

    assert_eq!(cfg.cluster.poll_interval_ms, 1);
    assert_eq!(cfg.executors.len(), 3);
    assert_eq!(cfg.executors[0].role, Role::Broker);
    assert_eq!(cfg.executors[1].help_threshold, 8);
    assert_eq!(cfg.executors[1].share_limit, 1024);
    assert_eq!(cfg.executors[2].share_limit, 256);
    assert!(!cfg.executors[2].debug);
    Ok(())
}

#[test]
fn invalid_configs_fail_validation_not_parsing() -> TestResult {
    let file = write_config(
        r#"
        [[executor]]
        name = "only-executor"
        "#,
    )?;
    assert!(load_from_path(file.path()).is_ok());
    assert!(load_and_validate(file.path()).is_err());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn a_loaded_config_drives_a_run() -> TestResult {
    let file = write_config(CONFIG)?;
    let cfg = load_and_validate(file.path())?;
    let mut runtime = ClusterRuntime::new(cfg)?;

    let a = ThunkBuilder::literal(Value::Int(40)).build();
    let root = ThunkBuilder::func(
        "add",
        Arc::new(|args: Vec<Value>| {
            Ok(Value::Int(args[0].expect_int()? + args[1].expect_int()?))
        }),
        vec![Input::Thunk(a), Input::Literal(Value::Int(2))],
    )
    .get_result(true)
    .build();

    assert_eq!(runtime.submit(&root).await?, Value::Int(42));
    Ok(())
}
