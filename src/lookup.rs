//! Member lookup on class instances.
//!
//! Every class metatable installs [`index_hook`] as `__index` and
//! [`newindex_hook`] as `__newindex`. Both walk the instance's metatable,
//! then that metatable's own metatable, and so on, with raw reads only; the
//! first entry found under the key wins. A parent class is reachable this
//! way because registration sets the parent's metatable as the child
//! metatable's metatable.
//!
//! - read: a function entry is called with the receiver and its single
//!   result returned, any other entry is returned as-is;
//! - write: a function entry is called with `(receiver, value, key)`, any
//!   other entry makes the member read-only.
//!
//! Keys starting with `__` name metamethods. They are returned raw on read
//! and are never writable, so `obj.__gc` cannot run a destructor early.
//!
//! A key found nowhere is handled according to
//! [`BindConfig::missing_member`](crate::BindConfig::missing_member).

use lunabind_core::{Function, RuntimeError, State, TableRef, Value};

use crate::config::{BindConfig, MissingMemberPolicy};
use crate::error::BindError;
use crate::object::MAX_CLASS_DEPTH;

/// Find `key` along the metatable chain starting at `value`'s metatable.
pub(crate) fn find_member(value: &Value, key: &Value) -> Option<Value> {
    let mut current: Option<TableRef> = value.metatable();
    for _ in 0..MAX_CLASS_DEPTH {
        let table = current?;
        let found = table.raw_get(key);
        if !found.is_nil() {
            return Some(found);
        }
        current = table.metatable();
    }
    None
}

fn missing_member(state: &State, key: &Value) -> RuntimeError {
    let member = key.to_string();
    match BindConfig::current(state).missing_member {
        MissingMemberPolicy::Abort => {
            log::error!("missing member '{member}', aborting");
            eprintln!("The object does not have the requested member");
            std::process::exit(1);
        }
        MissingMemberPolicy::Raise => BindError::MissingMember { member }.into(),
    }
}

fn is_metamethod(key: &Value) -> bool {
    matches!(key, Value::String(name) if name.starts_with("__"))
}

fn index(state: &State) -> Result<usize, RuntimeError> {
    let object = state.value_at(1);
    let key = state.value_at(2);
    match find_member(&object, &key) {
        Some(member @ Value::Function(_)) if !is_metamethod(&key) => {
            let mut results = state.call_function(member, [object], 1)?;
            state.push_value(results.pop().unwrap_or_default());
            Ok(1)
        }
        Some(member) => {
            state.push_value(member);
            Ok(1)
        }
        None => Err(missing_member(state, &key)),
    }
}

fn newindex(state: &State) -> Result<usize, RuntimeError> {
    let object = state.value_at(1);
    let key = state.value_at(2);
    let value = state.value_at(3);
    match find_member(&object, &key) {
        Some(member @ Value::Function(_)) if !is_metamethod(&key) => {
            state.call_function(member, [object, value, key], 0)?;
            Ok(0)
        }
        Some(_) => Err(BindError::NotWritable {
            member: key.to_string(),
        }
        .into()),
        None => Err(missing_member(state, &key)),
    }
}

/// The `__index` hook shared by every class metatable.
pub fn index_hook() -> Function {
    Function::new("__index", index)
}

/// The `__newindex` hook shared by every class metatable.
pub fn newindex_hook() -> Function {
    Function::new("__newindex", newindex)
}
