//! Embedded scripting runtime used by `lunabind`.
//!
//! This crate provides the stack-based runtime that native bindings talk
//! to: tagged [`Value`]s, shared [`TableRef`] tables with metatables, host
//! [`Function`]s, runtime-owned [`AnyUserdata`] slots, registry references
//! and module loading. It has no parser; script-side behaviour is expressed
//! with host functions.
//!
//! # Example
//!
//! ```
//! use lunabind_core::{Function, State, Value};
//!
//! let state = State::new();
//! state.push_function(Function::new("add", |state| {
//!     let sum = state.to_integer(1) + state.to_integer(2);
//!     state.push_integer(sum);
//!     Ok(1)
//! }));
//! state.push_integer(2);
//! state.push_integer(3);
//! state.call(2, 1).unwrap();
//! assert_eq!(state.value_at(-1), Value::Integer(5));
//! ```

mod error;
mod function;
mod options;
mod state;
mod table;
mod userdata;
mod value;

pub use error::RuntimeError;
pub use function::{Function, HostFn};
pub use options::{DEFAULT_MAX_CALL_DEPTH, StateOptions};
pub use state::{LOADED_TABLE, MULTRET, PRELOAD_TABLE, RegistryKey, State, WeakState};
pub use table::TableRef;
pub use userdata::{AnyUserdata, UserdataHeap, UserdataId};
pub use value::{TypeMask, Value, ValueType};
