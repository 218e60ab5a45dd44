//! Structured view over runtime tables.
//!
//! A [`Table`] aliases a runtime table and reads or writes it through
//! dotted paths: `"a.b.c"` walks `a`, then `b`, then accesses `c`. Integer
//! keys address array slots and are never split. Access honours
//! `__index` / `__newindex` and leaves the stack as it found it.
//!
//! ```
//! use lunabind::Table;
//! use lunabind_core::State;
//!
//! let state = State::new();
//! let config = Table::global(&state, "config").unwrap();
//! config.set("window.size.width", 640).unwrap();
//! assert_eq!(config.get::<i32>("window.size.width").unwrap(), 640);
//! assert!(config.is_table("window.size"));
//! assert_eq!(state.get_top(), 0);
//! ```

use std::fmt;

use lunabind_core::{State, TableRef, Value, WeakState};

use crate::codec::{FromStack, IntoStack, check_strict};
use crate::error::{BindError, BindResult};

/// Where a [`Table`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOrigin {
    /// Aliases a global variable.
    Global,
    /// Aliases a value read from the stack.
    Stack,
    /// Created by native code.
    Anonymous,
}

/// Handle to a runtime table.
///
/// The handle keeps the table alive. Cloning a `Table` copies the
/// top-level number- and string-keyed entries into a new anonymous table;
/// nested tables are shared between the copies.
pub struct Table {
    name: Option<String>,
    table: TableRef,
    origin: TableOrigin,
    state: WeakState,
}

/// A key usable with the `is_*` predicates: a dotted path or an array index.
pub trait TableKey {
    #[doc(hidden)]
    fn lookup(&self, table: &Table, state: &State) -> BindResult<Value>;
}

impl TableKey for &str {
    fn lookup(&self, table: &Table, state: &State) -> BindResult<Value> {
        table.resolve_path(state, self)
    }
}

impl TableKey for String {
    fn lookup(&self, table: &Table, state: &State) -> BindResult<Value> {
        table.resolve_path(state, self)
    }
}

macro_rules! impl_index_key {
    ($($ty:ty),*) => {
        $(
            impl TableKey for $ty {
                fn lookup(&self, table: &Table, state: &State) -> BindResult<Value> {
                    Ok(state.index_value(&Value::Table(table.table.clone()), Value::Integer(*self as i64))?)
                }
            }
        )*
    };
}

impl_index_key!(i32, i64, u32, usize);

/// Decode `value` through a temporary stack slot.
fn decode<U: FromStack>(state: &State, value: Value) -> BindResult<U> {
    state.push_value(value);
    let result = U::from_stack(state, state.get_top());
    state.pop(1);
    result
}

/// Encode `value` into a runtime value; a value that pushes nothing is `nil`.
fn encode(state: &State, value: impl IntoStack) -> BindResult<Value> {
    let top = state.get_top();
    value.push_to(state)?;
    if state.get_top() > top {
        Ok(state.pop_value())
    } else {
        Ok(Value::Nil)
    }
}

impl Table {
    fn alias(state: &State, table: TableRef, origin: TableOrigin, name: Option<String>) -> Self {
        Table {
            name,
            table,
            origin,
            state: state.downgrade(),
        }
    }

    /// A new empty table.
    pub fn new(state: &State) -> Self {
        Self::alias(state, TableRef::new(), TableOrigin::Anonymous, None)
    }

    /// The global table `name`, created when the global is `nil`.
    pub fn global(state: &State, name: &str) -> BindResult<Self> {
        let globals = state.globals();
        let table = match globals.raw_get_str(name) {
            Value::Table(table) => table,
            Value::Nil => {
                let table = TableRef::new();
                globals.raw_set_str(name, table.clone());
                table
            }
            _ => {
                return Err(BindError::PathNotTable {
                    path: name.to_string(),
                    segment: name.to_string(),
                });
            }
        };
        Ok(Self::alias(
            state,
            table,
            TableOrigin::Global,
            Some(name.to_string()),
        ))
    }

    /// Alias the table at stack slot `idx`.
    pub fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
        match state.value_at(idx) {
            Value::Table(table) => Ok(Self::alias(state, table, TableOrigin::Stack, None)),
            other => Err(BindError::argument(idx, "table", other.type_name())),
        }
    }

    /// An anonymous copy of the table at stack slot `idx`.
    pub fn copy_from_stack(state: &State, idx: i32) -> BindResult<Self> {
        Ok(Self::from_stack(state, idx)?.clone())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn origin(&self) -> TableOrigin {
        self.origin
    }

    /// The underlying runtime table.
    pub fn table_ref(&self) -> &TableRef {
        &self.table
    }

    fn state(&self) -> BindResult<State> {
        match self.state.upgrade() {
            Some(state) if !state.is_closed() => Ok(state),
            _ => Err(BindError::StateClosed),
        }
    }

    fn resolve_path(&self, state: &State, path: &str) -> BindResult<Value> {
        let mut current = Value::Table(self.table.clone());
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let value = state.index_value(&current, Value::from(segment))?;
            if segments.peek().is_none() {
                return Ok(value);
            }
            if !matches!(value, Value::Table(_)) {
                return Err(BindError::PathNotTable {
                    path: path.to_string(),
                    segment: segment.to_string(),
                });
            }
            current = value;
        }
        Ok(Value::Nil)
    }

    /// Read the value at `path`.
    pub fn get<U: FromStack>(&self, path: &str) -> BindResult<U> {
        let state = self.state()?;
        let value = self.resolve_path(&state, path)?;
        decode(&state, value)
    }

    /// Write `value` at `path`, creating missing intermediate tables.
    pub fn set(&self, path: &str, value: impl IntoStack) -> BindResult<()> {
        let state = self.state()?;
        let value = encode(&state, value)?;
        let mut current = Value::Table(self.table.clone());
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                state.assign_value(&current, Value::from(segment), value)?;
                return Ok(());
            }
            current = match state.index_value(&current, Value::from(segment))? {
                table @ Value::Table(_) => table,
                Value::Nil => {
                    let table = Value::Table(TableRef::new());
                    state.assign_value(&current, Value::from(segment), table.clone())?;
                    table
                }
                _ => {
                    return Err(BindError::PathNotTable {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    });
                }
            };
        }
        Ok(())
    }

    pub fn get_index<U: FromStack>(&self, index: i64) -> BindResult<U> {
        let state = self.state()?;
        let value = index.lookup(self, &state)?;
        decode(&state, value)
    }

    pub fn set_index(&self, index: i64, value: impl IntoStack) -> BindResult<()> {
        let state = self.state()?;
        let value = encode(&state, value)?;
        state.assign_value(
            &Value::Table(self.table.clone()),
            Value::Integer(index),
            value,
        )?;
        Ok(())
    }

    /// Length of the array part (a border of the integer keys).
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.entry_count() == 0
    }

    fn check(&self, key: impl TableKey, test: fn(&State, i32) -> bool) -> bool {
        let Ok(state) = self.state() else {
            return false;
        };
        match key.lookup(self, &state) {
            Ok(value) => {
                state.push_value(value);
                let matched = test(&state, state.get_top());
                state.pop(1);
                matched
            }
            Err(_) => false,
        }
    }

    /// Whether the value at `key` is a number or a numeric string.
    pub fn is_number(&self, key: impl TableKey) -> bool {
        self.check(key, State::is_number)
    }

    /// Whether the value at `key` is a string or a number.
    pub fn is_string(&self, key: impl TableKey) -> bool {
        self.check(key, State::is_string)
    }

    pub fn is_nil(&self, key: impl TableKey) -> bool {
        self.check(key, State::is_none_or_nil)
    }

    pub fn is_table(&self, key: impl TableKey) -> bool {
        self.check(key, State::is_table)
    }

    pub fn is_function(&self, key: impl TableKey) -> bool {
        self.check(key, State::is_function)
    }

    pub fn is_userdata(&self, key: impl TableKey) -> bool {
        self.check(key, State::is_userdata)
    }
}

impl Clone for Table {
    fn clone(&self) -> Self {
        let copy = TableRef::new();
        for (key, value) in self.table.pairs() {
            if matches!(
                key,
                Value::Integer(_) | Value::Number(_) | Value::String(_)
            ) {
                // Keys taken from a live table are never nil or NaN.
                let _ = copy.raw_set(key, value);
            }
        }
        Table {
            name: None,
            table: copy,
            origin: TableOrigin::Anonymous,
            state: self.state.clone(),
        }
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("entries", &self.table.entry_count())
            .finish()
    }
}

impl FromStack for Table {
    fn accepts(state: &State, idx: i32) -> bool {
        state.is_table(idx)
    }

    /// Aliases the table in the slot. Outside strict mode, any other value
    /// decodes as a new empty table.
    fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
        if Self::accepts(state, idx) {
            return Table::from_stack(state, idx);
        }
        check_strict(state, idx, false, "table")?;
        Ok(Table::new(state))
    }
}

impl IntoStack for Table {
    fn push_to(self, state: &State) -> BindResult<()> {
        state.push_table(self.table);
        Ok(())
    }
}

impl IntoStack for &Table {
    fn push_to(self, state: &State) -> BindResult<()> {
        state.push_table(self.table.clone());
        Ok(())
    }
}
