use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::resource::{ResourceLimits, ResourceUsage};
use crate::types::ScriptError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One unit of executable source handed to the engine, with the external
/// function names it may call and the resource ceilings to apply.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub code: String,
    pub external_functions: Vec<String>,
    /// Filename used in tracebacks. The engine defaults to `"<input>"`.
    pub script_name: Option<String>,
    pub limits: ResourceLimits,
}

impl Program {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn external_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.external_functions = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn script_name(mut self, name: impl Into<String>) -> Self {
        self.script_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Transport-neutral result of a run-to-completion call.
///
/// Success and failure travel in one shape: `error` present means the script
/// failed, and `value` is meaningless. Adapters never raise script failures
/// through their `Err` channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ScriptError>,
    #[serde(default)]
    pub usage: ResourceUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_output: Option<String>,
}

/// Transport-neutral intermediate result of a `start`/`resume`-class call.
///
/// The discriminant is carried as a string so that an adapter speaking a
/// newer protocol revision stays representable; the translator treats an
/// unrecognized tag as a protocol violation rather than guessing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<RunReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_call: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_call_ids: Option<Vec<u32>>,
}

impl StepReport {
    pub const STATE_COMPLETE: &'static str = "complete";
    pub const STATE_PENDING: &'static str = "pending";
    pub const STATE_RESOLVE_FUTURES: &'static str = "resolve_futures";
    pub const STATE_ERROR: &'static str = "error";

    #[must_use]
    pub fn complete(result: RunReport) -> Self {
        Self {
            state: Self::STATE_COMPLETE.into(),
            result: Some(result),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn pending(function_name: impl Into<String>, args: Vec<Value>, call_id: u32) -> Self {
        Self {
            state: Self::STATE_PENDING.into(),
            function_name: Some(function_name.into()),
            args: Some(args),
            call_id: Some(call_id),
            method_call: Some(false),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn resolve_futures(call_ids: Vec<u32>) -> Self {
        Self {
            state: Self::STATE_RESOLVE_FUTURES.into(),
            pending_call_ids: Some(call_ids),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn error(error: ScriptError) -> Self {
        Self {
            state: Self::STATE_ERROR.into(),
            result: Some(RunReport {
                error: Some(error),
                ..RunReport::default()
            }),
            ..Self::default()
        }
    }
}

/// Opaque capture of a paused execution.
///
/// The bytes are never inspected here; they are only valid against the exact
/// engine version that produced them, and nothing guarantees compatibility
/// across transports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub engine_version: String,
    pub bytes: Bytes,
}

/// Uniform asynchronous contract over one embedded engine instance, whether
/// it lives behind a native handle ABI or a worker/message transport.
///
/// Script and compile failures are reported in-band ([`RunReport::error`],
/// [`StepReport::STATE_ERROR`]); the `Err` channel is reserved for faults of
/// the transport itself. Implementations host exactly one engine instance
/// and service one execution at a time; the caller serializes operations via
/// `&mut self`.
#[async_trait]
pub trait Boundary: Send {
    /// Run a program to completion.
    async fn run(&mut self, program: Program) -> core::result::Result<RunReport, BoxError>;

    /// Begin iterative execution, pausing at the first external call.
    async fn start(&mut self, program: Program) -> core::result::Result<StepReport, BoxError>;

    /// Answer the pending external call with a return value.
    async fn resume(&mut self, value: Value) -> core::result::Result<StepReport, BoxError>;

    /// Answer the pending external call by raising inside the script.
    async fn resume_with_error(
        &mut self,
        message: String,
    ) -> core::result::Result<StepReport, BoxError>;

    /// Turn the pending external call into an awaitable inside the script;
    /// the script keeps running until it completes or blocks on an `await`.
    async fn resume_as_future(&mut self) -> core::result::Result<StepReport, BoxError>;

    /// Resolve future-ized calls by id. Wire maps are keyed by the decimal
    /// call id; `errors` values are message strings. Ids absent from both
    /// maps stay pending.
    async fn resolve_futures(
        &mut self,
        results: Map<String, Value>,
        errors: Map<String, Value>,
    ) -> core::result::Result<StepReport, BoxError>;

    /// Capture the paused execution as an opaque blob.
    async fn snapshot(&mut self) -> core::result::Result<Snapshot, BoxError>;

    /// Load a previously captured execution. The report re-describes the
    /// paused position and flows through the normal translation path.
    async fn restore_snapshot(
        &mut self,
        snapshot: Snapshot,
    ) -> core::result::Result<StepReport, BoxError>;

    /// Tear down the engine instance. Abandons any in-flight execution.
    async fn dispose(&mut self);
}
