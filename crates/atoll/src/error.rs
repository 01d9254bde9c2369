use thiserror::Error;

use crate::boundary::BoxError;
use crate::lifecycle::Phase;
use crate::types::ScriptError;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// Caller bug: an operation was invoked in a lifecycle phase that cannot
    /// service it. The instance stays usable unless the violation was an
    /// operation on a disposed instance.
    #[error("precondition violated: {op} requires {needs} interpreter, found {actual:?}")]
    Precondition {
        op: &'static str,
        needs: &'static str,
        actual: Phase,
    },

    /// The script failed, either while compiling or while executing. Carries
    /// the structured exception reported by the engine.
    #[error(transparent)]
    Script(Box<ScriptError>),

    /// The boundary adapter produced an outcome the protocol does not
    /// recognize. A transport bug, not a script failure.
    #[error("boundary protocol violation: {0}")]
    Protocol(String),

    /// The transport itself failed (worker gone, I/O fault). Adapters never
    /// carry script failures through this channel.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
}

impl From<ScriptError> for Error {
    fn from(value: ScriptError) -> Self {
        Self::Script(Box::new(value))
    }
}
