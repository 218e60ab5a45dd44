//! Binding configuration.
//!
//! A [`BindConfig`] is attached to a state with [`BindConfig::install`].
//! States without one behave as if the default configuration were installed.

use std::rc::Rc;

use lunabind_core::State;

/// What member lookup does when the whole prototype chain misses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingMemberPolicy {
    /// Print a diagnostic to standard error and terminate the process with a
    /// failure status.
    #[default]
    Abort,
    /// Raise [`BindError::MissingMember`](crate::BindError::MissingMember)
    /// into the runtime.
    Raise,
}

/// Per-state binding options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BindConfig {
    pub missing_member: MissingMemberPolicy,
    /// Reject required primitive arguments whose slot has the wrong type
    /// instead of reading the runtime's coerced default.
    pub strict_arguments: bool,
}

impl BindConfig {
    pub fn with_missing_member(mut self, policy: MissingMemberPolicy) -> Self {
        self.missing_member = policy;
        self
    }

    pub fn with_strict_arguments(mut self, strict: bool) -> Self {
        self.strict_arguments = strict;
        self
    }

    /// Attach this configuration to `state`, replacing any previous one.
    pub fn install(self, state: &State) {
        log::debug!("installing binding config {self:?}");
        state.set_app_data(self);
    }

    /// The configuration in effect for `state`.
    pub fn current(state: &State) -> Rc<BindConfig> {
        state
            .app_data::<BindConfig>()
            .unwrap_or_else(|| Rc::new(BindConfig::default()))
    }
}
