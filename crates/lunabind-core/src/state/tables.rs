//! Table access through the stack.
//!
//! The non-raw operations honour `__index` and `__newindex`: a function
//! handler is called, a table handler is indexed in turn.

use std::rc::Rc;

use crate::error::RuntimeError;
use crate::table::TableRef;
use crate::value::{Value, ValueType};

use super::State;

/// Bound on `__index` / `__newindex` table chains.
const MAX_META_CHAIN: usize = 100;

impl State {
    /// Push a new empty table and return a handle to it.
    pub fn new_table(&self) -> TableRef {
        let table = TableRef::new();
        self.push_value(Value::Table(table.clone()));
        table
    }

    /// `target[key]`, honouring `__index`.
    pub fn index_value(&self, target: &Value, key: Value) -> Result<Value, RuntimeError> {
        let mut current = target.clone();
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                Value::Table(table) => {
                    let raw = table.raw_get(&key);
                    if !raw.is_nil() {
                        return Ok(raw);
                    }
                    let handler = table.metamethod("__index");
                    if handler.is_nil() {
                        return Ok(Value::Nil);
                    }
                    handler
                }
                other => {
                    let handler = other
                        .metatable()
                        .map(|mt| mt.raw_get_str("__index"))
                        .unwrap_or_default();
                    if handler.is_nil() {
                        return Err(RuntimeError::NotIndexable {
                            type_name: other.type_name(),
                        });
                    }
                    handler
                }
            };
            if let Value::Function(_) = handler {
                let mut results = self.call_function(handler, [current, key], 1)?;
                return Ok(results.pop().unwrap_or_default());
            }
            current = handler;
        }
        Err(RuntimeError::message("'__index' chain too long; possible loop"))
    }

    /// `target[key] = value`, honouring `__newindex`.
    pub fn assign_value(
        &self,
        target: &Value,
        key: Value,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let mut current = target.clone();
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                Value::Table(table) => {
                    let handler = table.metamethod("__newindex");
                    if handler.is_nil() || !table.raw_get(&key).is_nil() {
                        return table.raw_set(key, value);
                    }
                    handler
                }
                other => {
                    let handler = other
                        .metatable()
                        .map(|mt| mt.raw_get_str("__newindex"))
                        .unwrap_or_default();
                    if handler.is_nil() {
                        return Err(RuntimeError::NotIndexable {
                            type_name: other.type_name(),
                        });
                    }
                    handler
                }
            };
            if let Value::Function(_) = handler {
                self.call_function(handler, [current, key, value], 0)?;
                return Ok(());
            }
            current = handler;
        }
        Err(RuntimeError::message("'__newindex' chain too long; possible loop"))
    }

    /// Push `t[key]` where `t` is the value at `idx`.
    pub fn get_field(&self, idx: i32, key: &str) -> Result<ValueType, RuntimeError> {
        let target = self.value_at(idx);
        let value = self.index_value(&target, Value::String(Rc::from(key)))?;
        let ty = value.type_of();
        self.push_value(value);
        Ok(ty)
    }

    /// `t[key] = v` where `t` is the value at `idx` and `v` the top value, which is popped.
    pub fn set_field(&self, idx: i32, key: &str) -> Result<(), RuntimeError> {
        let target = self.value_at(idx);
        let value = self.pop_value();
        self.assign_value(&target, Value::String(Rc::from(key)), value)
    }

    /// Pop a key and push `t[key]` where `t` is the value at `idx`.
    pub fn get_table(&self, idx: i32) -> Result<ValueType, RuntimeError> {
        let target = self.value_at(idx);
        let key = self.pop_value();
        let value = self.index_value(&target, key)?;
        let ty = value.type_of();
        self.push_value(value);
        Ok(ty)
    }

    /// Pop a value and a key and assign `t[key] = value` where `t` is the value at `idx`.
    pub fn set_table(&self, idx: i32) -> Result<(), RuntimeError> {
        let target = self.value_at(idx);
        let value = self.pop_value();
        let key = self.pop_value();
        self.assign_value(&target, key, value)
    }

    /// Pop a key and push the raw entry of the table at `idx`.
    pub fn raw_get(&self, idx: i32) -> Result<ValueType, RuntimeError> {
        let table = self.table_at(idx)?;
        let key = self.pop_value();
        let value = table.raw_get(&key);
        let ty = value.type_of();
        self.push_value(value);
        Ok(ty)
    }

    /// Pop a value and a key and store them raw into the table at `idx`.
    pub fn raw_set(&self, idx: i32) -> Result<(), RuntimeError> {
        let table = self.table_at(idx)?;
        let value = self.pop_value();
        let key = self.pop_value();
        table.raw_set(key, value)
    }

    pub fn raw_get_field(&self, idx: i32, key: &str) -> Result<ValueType, RuntimeError> {
        let table = self.table_at(idx)?;
        let value = table.raw_get_str(key);
        let ty = value.type_of();
        self.push_value(value);
        Ok(ty)
    }

    /// Pop the top value into the raw field `key` of the table at `idx`.
    pub fn raw_set_field(&self, idx: i32, key: &str) -> Result<(), RuntimeError> {
        let table = self.table_at(idx)?;
        let value = self.pop_value();
        table.raw_set_str(key, value);
        Ok(())
    }

    /// Push the metatable of the value at `idx`, if it has one.
    pub fn get_metatable(&self, idx: i32) -> bool {
        match self.value_at(idx).metatable() {
            Some(mt) => {
                self.push_table(mt);
                true
            }
            None => false,
        }
    }

    /// Pop a table (or `nil`) and make it the metatable of the value at `idx`.
    pub fn set_metatable(&self, idx: i32) -> Result<(), RuntimeError> {
        let target = self.value_at(idx);
        let metatable = match self.pop_value() {
            Value::Table(t) => Some(t),
            Value::Nil => None,
            other => {
                return Err(RuntimeError::message(format!(
                    "metatable must be a table or nil, got {}",
                    other.type_name()
                )));
            }
        };
        match target {
            Value::Table(t) => t.set_metatable(metatable),
            Value::Userdata(ud) => ud.set_metatable(metatable),
            other => {
                return Err(RuntimeError::message(format!(
                    "cannot set the metatable of a {} value",
                    other.type_name()
                )));
            }
        }
        Ok(())
    }

    /// Push the global `name`.
    pub fn get_global(&self, name: &str) -> Result<ValueType, RuntimeError> {
        let globals = Value::Table(self.globals());
        let value = self.index_value(&globals, Value::String(Rc::from(name)))?;
        let ty = value.type_of();
        self.push_value(value);
        Ok(ty)
    }

    /// Pop the top value into the global `name`.
    pub fn set_global(&self, name: &str) {
        let value = self.pop_value();
        self.globals().raw_set_str(name, value);
    }

    fn table_at(&self, idx: i32) -> Result<TableRef, RuntimeError> {
        match self.value_at(idx) {
            Value::Table(t) => Ok(t),
            other => Err(RuntimeError::message(format!(
                "table expected at index {idx}, got {}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;

    #[test]
    fn field_round_trip() {
        let state = State::new();
        state.new_table();
        state.push_integer(10);
        state.set_field(1, "foo").unwrap();
        assert_eq!(state.get_top(), 1);
        assert_eq!(state.get_field(1, "foo").unwrap(), ValueType::Number);
        assert_eq!(state.to_integer(-1), 10);
    }

    #[test]
    fn index_falls_back_to_table_handler() {
        let state = State::new();
        let base = TableRef::new();
        base.raw_set_str("x", 5);
        let mt = TableRef::new();
        mt.raw_set_str("__index", base);
        let t = TableRef::new();
        t.set_metatable(Some(mt));
        let got = state
            .index_value(&Value::Table(t), Value::from("x"))
            .unwrap();
        assert_eq!(got, Value::Integer(5));
    }

    #[test]
    fn index_calls_function_handler() {
        let state = State::new();
        let mt = TableRef::new();
        mt.raw_set_str(
            "__index",
            Function::new("__index", |state| {
                let key = state.to_str(2).unwrap_or_default();
                state.push_string(&format!("key:{key}"));
                Ok(1)
            }),
        );
        let t = TableRef::new();
        t.set_metatable(Some(mt));
        let got = state
            .index_value(&Value::Table(t), Value::from("abc"))
            .unwrap();
        assert_eq!(got, Value::from("key:abc"));
        assert_eq!(state.get_top(), 0);
    }

    #[test]
    fn newindex_handler_receives_target_key_value() {
        let state = State::new();
        let log = TableRef::new();
        let sink = log.clone();
        let mt = TableRef::new();
        mt.raw_set_str(
            "__newindex",
            Function::new("__newindex", move |state| {
                sink.raw_set(state.value_at(2), state.value_at(3))?;
                Ok(0)
            }),
        );
        let t = TableRef::new();
        t.set_metatable(Some(mt));
        state
            .assign_value(&Value::Table(t.clone()), Value::from("k"), Value::Integer(1))
            .unwrap();
        assert!(t.raw_get_str("k").is_nil());
        assert_eq!(log.raw_get_str("k"), Value::Integer(1));
    }

    #[test]
    fn indexing_non_table_fails() {
        let state = State::new();
        let err = state
            .index_value(&Value::Integer(1), Value::from("x"))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::NotIndexable { type_name: "number" }));
    }

    #[test]
    fn self_referencing_index_chain_is_bounded() {
        let state = State::new();
        let t = TableRef::new();
        let mt = TableRef::new();
        mt.raw_set_str("__index", t.clone());
        t.set_metatable(Some(mt));
        assert!(state.index_value(&Value::Table(t), Value::from("x")).is_err());
    }

    #[test]
    fn metatable_push_and_set() {
        let state = State::new();
        state.new_table();
        assert!(!state.get_metatable(1));
        state.new_table();
        state.set_metatable(1).unwrap();
        assert!(state.get_metatable(1));
        state.push_integer(1);
        state.new_table();
        assert!(state.set_metatable(-2).is_err());
    }

    #[test]
    fn globals() {
        let state = State::new();
        state.push_integer(4);
        state.set_global("four");
        state.get_global("four").unwrap();
        assert_eq!(state.to_integer(-1), 4);
        assert!(state.globals().raw_get_str("_G").as_table().is_some());
    }

    #[test]
    fn raw_access_skips_metamethods() {
        let state = State::new();
        let t = state.new_table();
        let mt = TableRef::new();
        mt.raw_set_str("__index", Function::new("__index", |_| Ok(0)));
        t.set_metatable(Some(mt));
        state.push_string("k");
        state.push_integer(2);
        state.raw_set(1).unwrap();
        state.push_string("k");
        state.raw_get(1).unwrap();
        assert_eq!(state.to_integer(-1), 2);
        state.raw_get_field(1, "missing").unwrap();
        assert!(state.is_nil(-1));
    }
}
