use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Ceilings forwarded to the engine before `run`/`start`.
///
/// These are requests, not guarantees: the core cannot interrupt an execution
/// the engine refuses to stop. A caller wanting a hard ceiling must apply an
/// external supervisory timeout and be prepared to tear the adapter down.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stack_depth: Option<usize>,
}

impl ResourceLimits {
    #[must_use]
    pub const fn unconstrained() -> Self {
        Self {
            max_memory: None,
            max_duration: None,
            max_stack_depth: None,
        }
    }

    #[must_use]
    pub const fn memory(mut self, bytes: usize) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    #[must_use]
    pub const fn duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    #[must_use]
    pub const fn stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = Some(depth);
        self
    }

    #[must_use]
    pub const fn is_unconstrained(&self) -> bool {
        self.max_memory.is_none() && self.max_duration.is_none() && self.max_stack_depth.is_none()
    }
}

/// Counters the engine reports with every completed result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    #[serde(default)]
    pub memory_bytes_used: u64,
    #[serde(default)]
    pub time_elapsed_ms: u64,
    #[serde(default)]
    pub stack_depth_used: u64,
}
