//! Runtime configuration.

/// Default bound on nested host calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Options fixed when a [`State`](crate::State) is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateOptions {
    /// Maximum number of nested calls before
    /// [`RuntimeError::CallDepthExceeded`](crate::RuntimeError::CallDepthExceeded)
    /// is raised.
    pub max_call_depth: usize,
}

impl StateOptions {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}
