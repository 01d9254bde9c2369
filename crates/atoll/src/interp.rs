use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::{Instrument, debug, info_span};

use crate::TRACE_TARGET_EXEC;
use crate::boundary::{Boundary, Program, RunReport, Snapshot, StepReport};
use crate::error::{Error, Result};
use crate::lifecycle::{Lifecycle, Phase};
use crate::types::{PendingCall, PendingFutures, Progress, RunResult, ScriptError};

/// Host-side driver for one engine instance behind a [`Boundary`].
///
/// Owns the lifecycle value and the single translation routine through which
/// every transport-neutral progress report becomes a domain [`Progress`];
/// lifecycle transitions happen nowhere else, apart from [`dispose`].
///
/// [`dispose`]: Interpreter::dispose
pub struct Interpreter<B: Boundary> {
    boundary: B,
    lifecycle: Lifecycle,
}

impl<B: Boundary> Interpreter<B> {
    pub fn new(boundary: B) -> Self {
        Self {
            boundary,
            lifecycle: Lifecycle::new(),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    /// Run a program to completion.
    ///
    /// The interpreter never leaves Idle: a failure intermediate result is
    /// raised as [`Error::Script`] and the instance stays reusable.
    ///
    /// # Errors
    /// [`Error::Precondition`] when not Idle or already disposed;
    /// [`Error::Script`] when the script fails; [`Error::Transport`] when
    /// the boundary itself fails.
    pub async fn run(&mut self, program: Program) -> Result<RunResult> {
        self.lifecycle.assert_not_disposed("run")?;
        self.lifecycle.assert_idle("run")?;
        let span = info_span!(target: TRACE_TARGET_EXEC, "interp.run");
        let report = self
            .boundary
            .run(program)
            .instrument(span)
            .await
            .map_err(Error::Transport)?;
        into_run_result(report)
    }

    /// Begin iterative execution.
    ///
    /// # Errors
    /// [`Error::Precondition`] when not Idle or already disposed; otherwise
    /// as the translation routine dictates.
    pub async fn start(&mut self, program: Program) -> Result<Progress> {
        self.lifecycle.assert_not_disposed("start")?;
        self.lifecycle.assert_idle("start")?;
        let span = info_span!(target: TRACE_TARGET_EXEC, "interp.start");
        let report = self
            .boundary
            .start(program)
            .instrument(span)
            .await
            .map_err(Error::Transport)?;
        self.translate(report)
    }

    /// Answer the pending external call with `value`.
    ///
    /// # Errors
    /// [`Error::Precondition`] when no call is pending or already disposed;
    /// otherwise as the translation routine dictates.
    pub async fn resume(&mut self, value: Value) -> Result<Progress> {
        self.lifecycle.assert_not_disposed("resume")?;
        self.lifecycle.assert_active("resume")?;
        let report = self.boundary.resume(value).await.map_err(Error::Transport)?;
        self.translate(report)
    }

    /// Answer the pending external call by raising `message` inside the
    /// script, as if the call itself had thrown.
    ///
    /// # Errors
    /// [`Error::Precondition`] when no call is pending or already disposed;
    /// otherwise as the translation routine dictates.
    pub async fn resume_with_error(&mut self, message: impl Into<String>) -> Result<Progress> {
        self.lifecycle.assert_not_disposed("resume_with_error")?;
        self.lifecycle.assert_active("resume_with_error")?;
        let report = self
            .boundary
            .resume_with_error(message.into())
            .await
            .map_err(Error::Transport)?;
        self.translate(report)
    }

    /// Convert the pending external call into an awaitable inside the
    /// script instead of answering it now.
    ///
    /// # Errors
    /// [`Error::Precondition`] when no call is pending or already disposed;
    /// otherwise as the translation routine dictates.
    pub async fn resume_as_future(&mut self) -> Result<Progress> {
        self.lifecycle.assert_not_disposed("resume_as_future")?;
        self.lifecycle.assert_active("resume_as_future")?;
        let report = self
            .boundary
            .resume_as_future()
            .await
            .map_err(Error::Transport)?;
        self.translate(report)
    }

    /// Resolve future-ized calls out of order.
    ///
    /// Ids omitted from both maps are not an error: they stay pending and a
    /// later call may supply them.
    ///
    /// # Errors
    /// [`Error::Precondition`] when no futures are pending or already
    /// disposed; otherwise as the translation routine dictates.
    pub async fn resolve_futures(
        &mut self,
        results: HashMap<u32, Value>,
        errors: HashMap<u32, String>,
    ) -> Result<Progress> {
        self.lifecycle.assert_not_disposed("resolve_futures")?;
        self.lifecycle.assert_active("resolve_futures")?;
        let results: Map<String, Value> = results
            .into_iter()
            .map(|(id, value)| (id.to_string(), value))
            .collect();
        let errors: Map<String, Value> = errors
            .into_iter()
            .map(|(id, message)| (id.to_string(), Value::String(message)))
            .collect();
        let report = self
            .boundary
            .resolve_futures(results, errors)
            .await
            .map_err(Error::Transport)?;
        self.translate(report)
    }

    /// Capture the paused execution as an opaque blob.
    ///
    /// # Errors
    /// [`Error::Precondition`] when nothing is paused or already disposed;
    /// [`Error::Transport`] when the boundary fails.
    pub async fn snapshot(&mut self) -> Result<Snapshot> {
        self.lifecycle.assert_not_disposed("snapshot")?;
        self.lifecycle.assert_active("snapshot")?;
        self.boundary.snapshot().await.map_err(Error::Transport)
    }

    /// Load a previously captured execution; the adapter's report re-describes
    /// the paused position and flows through the normal translation path.
    ///
    /// # Errors
    /// [`Error::Precondition`] when not Idle or already disposed; otherwise
    /// as the translation routine dictates.
    pub async fn restore_snapshot(&mut self, snapshot: Snapshot) -> Result<Progress> {
        self.lifecycle.assert_not_disposed("restore_snapshot")?;
        self.lifecycle.assert_idle("restore_snapshot")?;
        let report = self
            .boundary
            .restore_snapshot(snapshot)
            .await
            .map_err(Error::Transport)?;
        self.translate(report)
    }

    /// Tear down the engine instance. Idempotent; disposing while Active
    /// abandons the execution rather than cancelling it.
    pub async fn dispose(&mut self) {
        if self.lifecycle.phase() == Phase::Disposed {
            return;
        }
        debug!(target: TRACE_TARGET_EXEC, "disposing interpreter");
        self.boundary.dispose().await;
        self.lifecycle.mark_disposed();
    }

    /// The single place transport-neutral progress becomes a domain outcome
    /// and the lifecycle moves.
    fn translate(&mut self, report: StepReport) -> Result<Progress> {
        match report.state.as_str() {
            StepReport::STATE_COMPLETE => {
                self.lifecycle.mark_idle();
                into_run_result(report.result.unwrap_or_default()).map(Progress::Complete)
            }
            StepReport::STATE_PENDING => {
                self.lifecycle.mark_active();
                // Defensive defaulting: an adapter that omits call metadata
                // still yields a usable pending call.
                let call = PendingCall {
                    function_name: report.function_name.unwrap_or_default(),
                    args: report.args.unwrap_or_default(),
                    kwargs: report.kwargs.unwrap_or_default(),
                    call_id: report.call_id.unwrap_or(0),
                    method_call: report.method_call.unwrap_or(false),
                };
                debug!(
                    target: TRACE_TARGET_EXEC,
                    function = %call.function_name,
                    call_id = call.call_id,
                    "paused at external call"
                );
                Ok(Progress::Pending(call))
            }
            StepReport::STATE_RESOLVE_FUTURES => {
                self.lifecycle.mark_active();
                Ok(Progress::ResolveFutures(PendingFutures {
                    call_ids: report.pending_call_ids.unwrap_or_default(),
                }))
            }
            StepReport::STATE_ERROR => {
                self.lifecycle.mark_idle();
                let error = report.result.and_then(|result| result.error).unwrap_or_else(|| {
                    ScriptError::new("script failed without an error payload")
                });
                Err(Error::Script(Box::new(error)))
            }
            other => {
                self.lifecycle.mark_idle();
                Err(Error::Protocol(format!(
                    "unrecognized progress state {other:?} from boundary adapter"
                )))
            }
        }
    }
}

fn into_run_result(report: RunReport) -> Result<RunResult> {
    if let Some(error) = report.error {
        return Err(Error::Script(Box::new(error)));
    }
    Ok(RunResult {
        value: report.value,
        usage: report.usage,
        print_output: report.print_output,
    })
}
