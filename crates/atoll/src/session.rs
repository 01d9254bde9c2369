use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::{Instrument, debug, info_span};

use crate::TRACE_TARGET_EXEC;
use crate::boundary::{Boundary, Program};
use crate::error::Result;
use crate::interp::Interpreter;
use crate::resource::ResourceLimits;
use crate::synth::{self, PERSIST_STATE_FN, RESTORE_STATE_FN};
use crate::types::{PendingCall, Progress, RunResult};

/// Configuration for a [`Session`].
#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// Filename used in tracebacks for every script the session runs.
    pub script_name: Option<String>,
    /// Resource ceilings applied to every script the session runs.
    pub limits: ResourceLimits,
    /// External functions the caller will service itself in iterative mode.
    /// The two reserved state-transfer names are always added on top.
    pub external_functions: Vec<String>,
}

/// Simulates persistent variables on top of the stateless run primitive.
///
/// Before every execution the user's script is rewritten to call
/// [`RESTORE_STATE_FN`] up front and [`PERSIST_STATE_FN`] at the end; the
/// session answers both transparently from its own state map. Any other
/// pending call is surfaced to the caller in iterative mode, or answered
/// with an injected error in single-shot mode.
///
/// The session never disposes the interpreter it wraps: ownership stays with
/// whoever constructed it, and [`into_inner`] hands it back.
///
/// [`into_inner`]: Session::into_inner
pub struct Session<B: Boundary> {
    interp: Interpreter<B>,
    options: SessionOptions,
    state: Map<String, Value>,
    /// State handed to `__persist_state__` during the current cycle; only
    /// committed when the cycle completes successfully.
    staged: Option<Map<String, Value>>,
}

enum Mode {
    SingleShot,
    Iterative,
}

impl<B: Boundary> Session<B> {
    pub fn new(interp: Interpreter<B>) -> Self {
        Self::with_options(interp, SessionOptions::default())
    }

    pub fn with_options(interp: Interpreter<B>, options: SessionOptions) -> Self {
        Self {
            interp,
            options,
            state: Map::new(),
            staged: None,
        }
    }

    /// Variables currently persisted across calls.
    #[must_use]
    pub const fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    pub fn clear_state(&mut self) {
        self.state.clear();
    }

    /// Give the wrapped interpreter back without disposing it.
    #[must_use]
    pub fn into_inner(self) -> Interpreter<B> {
        self.interp
    }

    /// Run a script to completion with session state, resolving every
    /// external call internally. A pending call that is not one of the two
    /// reserved names is answered with an injected "unexpected external
    /// function call" error, so it surfaces exactly like a script exception.
    ///
    /// # Errors
    /// As [`Interpreter::start`] and the resume-class operations.
    pub async fn run(&mut self, code: &str) -> Result<RunResult> {
        let program = self.compose(code);
        let span = info_span!(target: TRACE_TARGET_EXEC, "session.run");
        async {
            self.staged = None;
            let first = self.interp.start(program).await;
            match self.drive(first, &Mode::SingleShot).await? {
                Progress::Complete(result) => Ok(result),
                Progress::Pending(_) | Progress::ResolveFutures(_) => {
                    unreachable!("single-shot drive only returns Complete")
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Begin iterative execution with session state. Reserved state-transfer
    /// calls are answered internally and never surface; the first other
    /// outcome is returned to the caller.
    ///
    /// # Errors
    /// As [`Interpreter::start`] and the resume-class operations.
    pub async fn start(&mut self, code: &str) -> Result<Progress> {
        let program = self.compose(code);
        let span = info_span!(target: TRACE_TARGET_EXEC, "session.start");
        async {
            self.staged = None;
            let first = self.interp.start(program).await;
            self.drive(first, &Mode::Iterative).await
        }
        .instrument(span)
        .await
    }

    /// # Errors
    /// As [`Interpreter::resume`].
    pub async fn resume(&mut self, value: Value) -> Result<Progress> {
        let next = self.interp.resume(value).await;
        self.drive(next, &Mode::Iterative).await
    }

    /// # Errors
    /// As [`Interpreter::resume_with_error`].
    pub async fn resume_with_error(&mut self, message: impl Into<String>) -> Result<Progress> {
        let next = self.interp.resume_with_error(message.into()).await;
        self.drive(next, &Mode::Iterative).await
    }

    /// # Errors
    /// As [`Interpreter::resume_as_future`].
    pub async fn resume_as_future(&mut self) -> Result<Progress> {
        let next = self.interp.resume_as_future().await;
        self.drive(next, &Mode::Iterative).await
    }

    /// # Errors
    /// As [`Interpreter::resolve_futures`].
    pub async fn resolve_futures(
        &mut self,
        results: HashMap<u32, Value>,
        errors: HashMap<u32, String>,
    ) -> Result<Progress> {
        let next = self.interp.resolve_futures(results, errors).await;
        self.drive(next, &Mode::Iterative).await
    }

    fn compose(&self, code: &str) -> Program {
        let known: Vec<String> = self.state.keys().cloned().collect();
        let synthesized = synth::synthesize(code, &known);

        let mut externals = vec![RESTORE_STATE_FN.to_string(), PERSIST_STATE_FN.to_string()];
        externals.extend(self.options.external_functions.iter().cloned());

        let mut program = Program::new(synthesized.code)
            .external_functions(externals)
            .limits(self.options.limits.clone());
        program.script_name = self.options.script_name.clone();
        program
    }

    /// The interception loop: answer reserved calls from/into session state,
    /// pass everything else through according to `mode`, and commit staged
    /// state when the cycle completes.
    async fn drive(&mut self, mut next: Result<Progress>, mode: &Mode) -> Result<Progress> {
        loop {
            let progress = match next {
                Ok(progress) => progress,
                Err(error) => {
                    self.staged = None;
                    return Err(error);
                }
            };
            next = match progress {
                Progress::Complete(result) => {
                    if let Some(staged) = self.staged.take() {
                        self.state = staged;
                    }
                    return Ok(Progress::Complete(result));
                }
                Progress::Pending(call) if call.function_name == RESTORE_STATE_FN => {
                    debug!(target: TRACE_TARGET_EXEC, keys = self.state.len(), "restoring session state");
                    self.interp.resume(Value::Object(self.state.clone())).await
                }
                Progress::Pending(call) if call.function_name == PERSIST_STATE_FN => {
                    self.stage(call.args.first());
                    self.interp.resume(Value::Null).await
                }
                Progress::Pending(call) => match mode {
                    Mode::Iterative => return Ok(Progress::Pending(call)),
                    Mode::SingleShot => self.reject_unexpected(&call).await,
                },
                Progress::ResolveFutures(futures) => match mode {
                    Mode::Iterative => return Ok(Progress::ResolveFutures(futures)),
                    Mode::SingleShot => {
                        // No external calls are expected in single-shot mode,
                        // so nothing can have been future-ized by us; error
                        // every listed id to keep the loop closed.
                        let errors: HashMap<u32, String> = futures
                            .call_ids
                            .iter()
                            .map(|id| (*id, "unexpected external function call".to_string()))
                            .collect();
                        self.interp.resolve_futures(HashMap::new(), errors).await
                    }
                },
            };
        }
    }

    async fn reject_unexpected(&mut self, call: &PendingCall) -> Result<Progress> {
        debug!(
            target: TRACE_TARGET_EXEC,
            function = %call.function_name,
            "rejecting external call in single-shot mode"
        );
        self.interp
            .resume_with_error(format!(
                "unexpected external function call: {}",
                call.function_name
            ))
            .await
    }

    /// Stage the persist payload. Underscore-prefixed names are machinery
    /// temporaries and never enter session state; a non-object payload
    /// stages empty state rather than failing the cycle.
    fn stage(&mut self, payload: Option<&Value>) {
        let mut staged = Map::new();
        if let Some(Value::Object(map)) = payload {
            for (key, value) in map {
                if !key.starts_with('_') {
                    staged.insert(key.clone(), value.clone());
                }
            }
        }
        debug!(target: TRACE_TARGET_EXEC, keys = staged.len(), "staging session state");
        self.staged = Some(staged);
    }
}
