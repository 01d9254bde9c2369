use std::sync::atomic::Ordering;

use atoll::{Boundary, Interpreter, Phase, Program, Progress, RunReport, StepReport, WorkerBoundary};
use serde_json::json;

use super::common::{Scripted, ScriptedBoundary};

#[tokio::test]
async fn worker_transport_is_transparent() -> anyhow::Result<()> {
    let inner = ScriptedBoundary::new([
        Scripted::Step(StepReport::pending("fetch", vec![json!(1)], 0)),
        Scripted::Step(StepReport::complete(RunReport {
            value: json!(11),
            ..RunReport::default()
        })),
    ]);
    let log = inner.log();
    let mut interp = Interpreter::new(WorkerBoundary::spawn(inner));

    let progress = interp.start(Program::new("fetch(1)")).await?;
    let Progress::Pending(call) = progress else {
        anyhow::bail!("expected a pending call");
    };
    assert_eq!(call.function_name, "fetch");

    let progress = interp.resume(json!(10)).await?;
    let Progress::Complete(result) = progress else {
        anyhow::bail!("expected completion");
    };
    assert_eq!(result.value, json!(11));

    let log = log.lock().expect("log lock");
    assert_eq!(log.len(), 2);
    assert_eq!(log[1], "resume 10");
    Ok(())
}

#[tokio::test]
async fn dispose_tears_the_worker_down() {
    let inner = ScriptedBoundary::new([]);
    let dispose_calls = inner.dispose_calls();
    let mut interp = Interpreter::new(WorkerBoundary::spawn(inner));

    interp.dispose().await;
    interp.dispose().await;
    assert_eq!(dispose_calls.load(Ordering::SeqCst), 1);
    assert_eq!(interp.phase(), Phase::Disposed);
}

#[tokio::test]
async fn operations_after_teardown_are_transport_faults() {
    let inner = ScriptedBoundary::new([]);
    let mut worker = WorkerBoundary::spawn(inner);

    worker.dispose().await;
    let error = worker.run(Program::new("x")).await.unwrap_err();
    assert!(
        error.to_string().contains("worker terminated"),
        "got: {error}"
    );
}
