//! Host function values.

use std::fmt;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::state::State;

/// Signature of every host function.
///
/// A call receives the state with its frame set up: slot 1 is the first
/// argument. The callable leaves its results on top of the frame and returns
/// how many of them to hand back to the caller.
pub type HostFn = dyn Fn(&State) -> Result<usize, RuntimeError>;

/// Type-erased function value.
///
/// Cloning shares the underlying callable; two clones compare equal by
/// identity.
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    inner: Rc<HostFn>,
}

impl Function {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&State) -> Result<usize, RuntimeError> + 'static,
    {
        Self {
            name: Rc::from(name),
            inner: Rc::new(f),
        }
    }

    /// Name given at creation, used in diagnostics only.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, state: &State) -> Result<usize, RuntimeError> {
        (self.inner)(state)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
