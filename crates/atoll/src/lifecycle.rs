use crate::error::{Error, Result};

/// Where an interpreter instance sits in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Ready to start a new execution, or finished the previous one.
    Idle,
    /// An execution is paused awaiting a resume-class call.
    Active,
    /// Terminal. Only `dispose` remains legal, as a no-op.
    Disposed,
}

/// Owned lifecycle value; every adapter-backed interpreter composes one and
/// delegates its guards to it. Transitions happen only through the `mark_*`
/// methods, which only the progress translator and `dispose` call.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    phase: Phase,
}

impl Lifecycle {
    pub(crate) const fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    pub(crate) const fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn assert_not_disposed(&self, op: &'static str) -> Result<()> {
        if self.phase == Phase::Disposed {
            return Err(Error::Precondition {
                op,
                needs: "a live",
                actual: self.phase,
            });
        }
        Ok(())
    }

    /// A second execution cannot begin while one is suspended; the caller
    /// must resume or dispose first.
    pub(crate) fn assert_idle(&self, op: &'static str) -> Result<()> {
        if self.phase == Phase::Active {
            return Err(Error::Precondition {
                op,
                needs: "an idle",
                actual: self.phase,
            });
        }
        Ok(())
    }

    /// Resume-class operations are meaningless without a pending call.
    pub(crate) fn assert_active(&self, op: &'static str) -> Result<()> {
        if self.phase != Phase::Active {
            return Err(Error::Precondition {
                op,
                needs: "an active",
                actual: self.phase,
            });
        }
        Ok(())
    }

    pub(crate) fn mark_active(&mut self) {
        debug_assert!(self.phase != Phase::Disposed);
        self.phase = Phase::Active;
    }

    pub(crate) fn mark_idle(&mut self) {
        debug_assert!(self.phase != Phase::Disposed);
        self.phase = Phase::Idle;
    }

    pub(crate) fn mark_disposed(&mut self) {
        self.phase = Phase::Disposed;
    }
}
