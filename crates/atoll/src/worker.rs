//! Message transport: every boundary operation is forwarded as a
//! request/response pair to a dedicated task hosting exactly one inner
//! boundary instance. Tearing the worker down (dispose, or dropping the
//! handle) is the only available "cancellation": an in-flight execution is
//! abandoned, never interrupted.

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use crate::TRACE_TARGET_EXEC;
use crate::boundary::{Boundary, BoxError, Program, RunReport, Snapshot, StepReport};

struct Envelope {
    /// Monotonically increasing per-boundary sequence id; request/response
    /// correlation on the wire.
    seq: u64,
    op: Op,
    reply: oneshot::Sender<Reply>,
}

enum Op {
    Run(Program),
    Start(Program),
    Resume(Value),
    ResumeWithError(String),
    ResumeAsFuture,
    ResolveFutures {
        results: Map<String, Value>,
        errors: Map<String, Value>,
    },
    Snapshot,
    RestoreSnapshot(Snapshot),
    Dispose,
}

enum Reply {
    Run(core::result::Result<RunReport, String>),
    Step(core::result::Result<StepReport, String>),
    Snapshot(core::result::Result<Snapshot, String>),
    Disposed,
}

/// Client half of the worker transport; implements [`Boundary`] by relaying
/// every operation to the worker task.
pub struct WorkerBoundary {
    requests: mpsc::Sender<Envelope>,
    seq: u64,
}

impl WorkerBoundary {
    /// Spawn a worker task hosting `inner` on the current tokio runtime.
    ///
    /// One worker hosts exactly one engine instance. Dropping the returned
    /// handle without disposing closes the channel and abandons whatever the
    /// worker was doing.
    #[must_use]
    pub fn spawn<B>(inner: B) -> Self
    where
        B: Boundary + 'static,
    {
        let (requests, receiver) = mpsc::channel(1);
        drop(tokio::spawn(serve(inner, receiver)));
        Self { requests, seq: 0 }
    }

    async fn call(&mut self, op: Op) -> core::result::Result<Reply, BoxError> {
        let (reply, response) = oneshot::channel();
        self.seq += 1;
        self.requests
            .send(Envelope {
                seq: self.seq,
                op,
                reply,
            })
            .await
            .map_err(|_| worker_gone())?;
        response.await.map_err(|_| worker_gone())
    }

    async fn step(&mut self, op: Op) -> core::result::Result<StepReport, BoxError> {
        match self.call(op).await? {
            Reply::Step(Ok(report)) => Ok(report),
            Reply::Step(Err(message)) => Err(remote_fault(message)),
            Reply::Run(_) | Reply::Snapshot(_) | Reply::Disposed => Err(reply_mismatch()),
        }
    }
}

#[async_trait::async_trait]
impl Boundary for WorkerBoundary {
    async fn run(&mut self, program: Program) -> core::result::Result<RunReport, BoxError> {
        match self.call(Op::Run(program)).await? {
            Reply::Run(Ok(report)) => Ok(report),
            Reply::Run(Err(message)) => Err(remote_fault(message)),
            Reply::Step(_) | Reply::Snapshot(_) | Reply::Disposed => Err(reply_mismatch()),
        }
    }

    async fn start(&mut self, program: Program) -> core::result::Result<StepReport, BoxError> {
        self.step(Op::Start(program)).await
    }

    async fn resume(&mut self, value: Value) -> core::result::Result<StepReport, BoxError> {
        self.step(Op::Resume(value)).await
    }

    async fn resume_with_error(
        &mut self,
        message: String,
    ) -> core::result::Result<StepReport, BoxError> {
        self.step(Op::ResumeWithError(message)).await
    }

    async fn resume_as_future(&mut self) -> core::result::Result<StepReport, BoxError> {
        self.step(Op::ResumeAsFuture).await
    }

    async fn resolve_futures(
        &mut self,
        results: Map<String, Value>,
        errors: Map<String, Value>,
    ) -> core::result::Result<StepReport, BoxError> {
        self.step(Op::ResolveFutures { results, errors }).await
    }

    async fn snapshot(&mut self) -> core::result::Result<Snapshot, BoxError> {
        match self.call(Op::Snapshot).await? {
            Reply::Snapshot(Ok(snapshot)) => Ok(snapshot),
            Reply::Snapshot(Err(message)) => Err(remote_fault(message)),
            Reply::Run(_) | Reply::Step(_) | Reply::Disposed => Err(reply_mismatch()),
        }
    }

    async fn restore_snapshot(
        &mut self,
        snapshot: Snapshot,
    ) -> core::result::Result<StepReport, BoxError> {
        self.step(Op::RestoreSnapshot(snapshot)).await
    }

    async fn dispose(&mut self) {
        // A worker that is already gone counts as disposed.
        let _ = self.call(Op::Dispose).await;
    }
}

async fn serve<B: Boundary>(mut inner: B, mut requests: mpsc::Receiver<Envelope>) {
    while let Some(Envelope { seq, op, reply }) = requests.recv().await {
        trace!(target: TRACE_TARGET_EXEC, seq, "worker request");
        let (response, shutdown) = match op {
            Op::Run(program) => (
                Reply::Run(inner.run(program).await.map_err(|e| e.to_string())),
                false,
            ),
            Op::Start(program) => (
                Reply::Step(inner.start(program).await.map_err(|e| e.to_string())),
                false,
            ),
            Op::Resume(value) => (
                Reply::Step(inner.resume(value).await.map_err(|e| e.to_string())),
                false,
            ),
            Op::ResumeWithError(message) => (
                Reply::Step(
                    inner
                        .resume_with_error(message)
                        .await
                        .map_err(|e| e.to_string()),
                ),
                false,
            ),
            Op::ResumeAsFuture => (
                Reply::Step(inner.resume_as_future().await.map_err(|e| e.to_string())),
                false,
            ),
            Op::ResolveFutures { results, errors } => (
                Reply::Step(
                    inner
                        .resolve_futures(results, errors)
                        .await
                        .map_err(|e| e.to_string()),
                ),
                false,
            ),
            Op::Snapshot => (
                Reply::Snapshot(inner.snapshot().await.map_err(|e| e.to_string())),
                false,
            ),
            Op::RestoreSnapshot(snapshot) => (
                Reply::Step(
                    inner
                        .restore_snapshot(snapshot)
                        .await
                        .map_err(|e| e.to_string()),
                ),
                false,
            ),
            Op::Dispose => {
                inner.dispose().await;
                (Reply::Disposed, true)
            }
        };
        let _ = reply.send(response);
        if shutdown {
            return;
        }
    }
    // Channel closed without a dispose: the host dropped its handle and
    // abandoned the worker along with any in-flight execution.
    trace!(target: TRACE_TARGET_EXEC, "worker channel closed, abandoning engine");
}

fn worker_gone() -> BoxError {
    std::io::Error::other("worker terminated").into()
}

fn reply_mismatch() -> BoxError {
    std::io::Error::other("worker reply did not match request").into()
}

fn remote_fault(message: String) -> BoxError {
    std::io::Error::other(message).into()
}
