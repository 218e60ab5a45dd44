//! Script functions held by native code.

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use lunabind_core::{RuntimeError, State};

use crate::codec::{FromStack, IntoStack, IntoStackMulti, check_strict};
use crate::error::{BindError, BindResult};
use crate::tracker::RefTracker;

/// Empties the current frame when dropped.
struct ResetGuard<'a>(&'a State);

impl Drop for ResetGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.0.set_top(0) {
            log::warn!("failed to reset stack after callback: {err}");
        }
    }
}

/// A script callable anchored in the registry.
///
/// `A` is the argument tuple and `R` the result type. The callable is
/// invoked with a `nil` placeholder in front of the arguments, so a script
/// function written as a method (`function(self, ...)`) sees the arguments
/// where it expects them. Every call leaves the current frame empty, on
/// success and on failure alike.
///
/// ```
/// use lunabind::{Callback, FromStack};
/// use lunabind_core::{Function, State};
///
/// let state = State::new();
/// state.push_function(Function::new("double", |state| {
///     state.push_integer(state.to_integer(2) * 2);
///     Ok(1)
/// }));
/// let double = Callback::<(i32,), i32>::from_stack(&state, 1).unwrap();
/// assert_eq!(double.call((21,)).unwrap(), 42);
/// ```
pub struct Callback<A, R> {
    tracker: Rc<RefTracker>,
    _marker: PhantomData<fn(A) -> R>,
}

impl<A, R> Callback<A, R>
where
    A: IntoStackMulti,
    R: FromStack,
{
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&self, args: A) -> BindResult<R> {
        let state = self.tracker.state()?;
        let top = state.get_top();
        let _reset = ResetGuard(&state);

        state.push_ref(self.tracker.key());
        state.push_nil();
        let nargs = args.push_all(&state)?;
        if let Err(err) = state.pcall(nargs + 1, R::RESULTS) {
            log::warn!("callback raised an error: {err}");
            return Err(BindError::from_runtime(err));
        }
        R::from_stack(&state, top + 1)
    }
}

impl<A, R> Callback<A, R> {
    /// Whether the owning state is still open.
    pub fn is_valid(&self) -> bool {
        self.tracker.state().is_ok()
    }

    pub fn tracker(&self) -> &Rc<RefTracker> {
        &self.tracker
    }
}

impl<A, R> Clone for Callback<A, R> {
    fn clone(&self) -> Self {
        Callback {
            tracker: Rc::clone(&self.tracker),
            _marker: PhantomData,
        }
    }
}

impl<A, R> fmt::Debug for Callback<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").field(&self.tracker).finish()
    }
}

impl<A, R> FromStack for Callback<A, R> {
    fn accepts(state: &State, idx: i32) -> bool {
        state.is_function(idx)
    }

    fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
        check_strict(state, idx, Self::accepts(state, idx), "function")?;
        Ok(Callback {
            tracker: RefTracker::capture(state, idx),
            _marker: PhantomData,
        })
    }
}

impl<A, R> IntoStack for Callback<A, R> {
    fn push_to(self, state: &State) -> BindResult<()> {
        let owner = self.tracker.state()?;
        if !owner.ptr_eq(state) {
            return Err(RuntimeError::message("callback belongs to a different state").into());
        }
        state.push_ref(self.tracker.key());
        Ok(())
    }
}
