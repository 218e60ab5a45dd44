//! Registry anchors with scoped lifetime.

use std::fmt;
use std::rc::Rc;

use lunabind_core::{RegistryKey, State, WeakState};

use crate::error::{BindError, BindResult};

/// Keeps a runtime value alive in the registry for as long as the tracker
/// lives.
///
/// Trackers are shared through `Rc`; the registry entry is released when the
/// last clone is dropped. A tracker that outlives its state releases
/// nothing.
pub struct RefTracker {
    state: WeakState,
    key: RegistryKey,
}

impl RefTracker {
    /// Anchor the value at `idx`. The stack is left unchanged.
    pub fn capture(state: &State, idx: i32) -> Rc<Self> {
        state.push_copy(idx);
        let key = state.create_ref();
        log::trace!("captured registry reference {}", key.id());
        Rc::new(RefTracker {
            state: state.downgrade(),
            key,
        })
    }

    pub fn key(&self) -> RegistryKey {
        self.key
    }

    /// The owning state, while it is still open.
    pub fn state(&self) -> BindResult<State> {
        match self.state.upgrade() {
            Some(state) if !state.is_closed() => Ok(state),
            _ => Err(BindError::StateClosed),
        }
    }

    /// Push the anchored value.
    pub fn push(&self) -> BindResult<State> {
        let state = self.state()?;
        state.push_ref(self.key);
        Ok(state)
    }
}

impl Drop for RefTracker {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade()
            && !state.is_closed()
        {
            state.release_ref(self.key);
        }
    }
}

impl fmt::Debug for RefTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefTracker")
            .field("key", &self.key.id())
            .field("state", &self.state)
            .finish()
    }
}
