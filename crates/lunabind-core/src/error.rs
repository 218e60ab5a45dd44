//! Runtime error type.
//!
//! Every fallible runtime operation returns [`RuntimeError`]. Native functions
//! report failures through the same type, so an error raised deep inside a
//! host function travels up the call chain until a protected call
//! ([`State::pcall`](crate::State::pcall)) catches it.
//!
//! Layers built on top of the runtime wrap their own error types in
//! [`RuntimeError::External`] and recover them with
//! [`RuntimeError::downcast_external`].

use std::error::Error;

use thiserror::Error;

/// Errors raised while executing runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A plain error message, the equivalent of a script-side `error("...")`.
    #[error("{0}")]
    Message(String),

    /// A value that is neither a function nor has a `__call` metamethod was called.
    #[error("attempt to call a {type_name} value")]
    NotCallable { type_name: &'static str },

    /// A value without an `__index` / `__newindex` path was indexed.
    #[error("attempt to index a {type_name} value")]
    NotIndexable { type_name: &'static str },

    /// `nil` or NaN was used as a table key.
    #[error("table index is {0}")]
    InvalidKey(&'static str),

    /// An operation needed more stack slots than the current frame holds.
    #[error("stack underflow: needed {needed} values, frame holds {available}")]
    StackUnderflow { needed: usize, available: usize },

    /// Nested calls went deeper than the configured limit.
    #[error("stack overflow: call depth exceeded {0}")]
    CallDepthExceeded(usize),

    /// `require` found neither a loaded module nor a preload entry.
    #[error("module '{0}' not found")]
    ModuleNotFound(String),

    /// An error produced by a layer above the runtime.
    #[error("{0}")]
    External(Box<dyn Error>),
}

impl RuntimeError {
    /// Build a [`RuntimeError::Message`] from anything printable.
    pub fn message(msg: impl Into<String>) -> Self {
        RuntimeError::Message(msg.into())
    }

    /// Wrap a foreign error.
    pub fn external<E: Error + 'static>(err: E) -> Self {
        RuntimeError::External(Box::new(err))
    }

    /// Recover a wrapped foreign error of type `E`.
    ///
    /// Returns the original error unchanged when it is not an
    /// [`External`](RuntimeError::External) wrapping an `E`.
    pub fn downcast_external<E: Error + 'static>(self) -> Result<E, RuntimeError> {
        match self {
            RuntimeError::External(inner) => match inner.downcast::<E>() {
                Ok(err) => Ok(*err),
                Err(inner) => Err(RuntimeError::External(inner)),
            },
            other => Err(other),
        }
    }

    /// Borrowing variant of [`downcast_external`](Self::downcast_external).
    pub fn external_ref<E: Error + 'static>(&self) -> Option<&E> {
        match self {
            RuntimeError::External(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}
