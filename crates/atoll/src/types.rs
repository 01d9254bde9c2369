use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::resource::ResourceUsage;

/// Domain-level outcome of one `start`/`resume`-class step.
///
/// Execution failure is deliberately not a variant: it is raised as
/// [`crate::Error::Script`] at translation time and is terminal for the
/// execution exactly like `Complete`.
#[derive(Clone, Debug, PartialEq)]
pub enum Progress {
    /// The execution finished; the interpreter is Idle again.
    Complete(RunResult),
    /// The script called an external function and is paused until the host
    /// answers with a resume-class call.
    Pending(PendingCall),
    /// One or more future-ized calls reached an `await` point and need
    /// resolution before the script can make progress.
    ResolveFutures(PendingFutures),
}

/// An external function invocation the host must service.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PendingCall {
    pub function_name: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    /// Monotonically increasing id the engine assigns to each external call,
    /// used to correlate future-ized calls with their resolutions.
    pub call_id: u32,
    /// `true` when the script used `obj.method()` syntax rather than `func()`.
    pub method_call: bool,
}

/// Call ids of future-ized calls blocking the script at an `await` point.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingFutures {
    pub call_ids: Vec<u32>,
}

/// Successful result of a completed execution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunResult {
    pub value: Value,
    pub usage: ResourceUsage,
    /// Text the script printed, accumulated across every suspend/resume step
    /// of the execution. Absent when nothing was printed.
    pub print_output: Option<String>,
}

/// Structured exception reported by the engine.
///
/// The `filename`/`line_number`/`column_number`/`source_code` fields repeat
/// the last traceback frame for callers that only want one location.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ScriptError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exc_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traceback: Vec<TraceFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
}

impl ScriptError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_exc_type(mut self, exc_type: impl Into<String>) -> Self {
        self.exc_type = Some(exc_type.into());
        self
    }
}

/// One stack frame of a script traceback, outermost first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFrame {
    pub filename: String,
    pub start_line: u32,
    pub start_column: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_line: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hide_caret: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hide_frame_name: bool,
}
