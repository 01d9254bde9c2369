mod boundary;
mod error;
mod interp;
mod lifecycle;
mod resource;
mod session;
mod synth;
mod types;
#[cfg(feature = "worker")]
mod worker;

pub const TRACE_TARGET_EXEC: &str = "atoll::exec";

pub use boundary::{Boundary, BoxError, Program, RunReport, Snapshot, StepReport};
pub use error::{Error, Result};
pub use interp::Interpreter;
pub use lifecycle::Phase;
pub use resource::{ResourceLimits, ResourceUsage};
pub use session::{Session, SessionOptions};
pub use synth::{PERSIST_STATE_FN, RESTORE_STATE_FN};
pub use types::{PendingCall, PendingFutures, Progress, RunResult, ScriptError, TraceFrame};
#[cfg(feature = "worker")]
pub use worker::WorkerBoundary;
