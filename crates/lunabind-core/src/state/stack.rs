//! Stack slot access.
//!
//! Indices are relative to the current call frame: `1` is the first slot of
//! the frame, `-1` the top. An index that does not name a slot reads as
//! "no value" (`ValueType::None`, `Value::Nil`).

use std::rc::Rc;

use crate::error::RuntimeError;
use crate::function::Function;
use crate::table::TableRef;
use crate::userdata::AnyUserdata;
use crate::value::{TypeMask, Value, ValueType, format_number, parse_number};

use super::State;

impl State {
    /// Number of slots in the current frame.
    pub fn get_top(&self) -> i32 {
        self.0.stack.borrow().frame_len() as i32
    }

    /// Resize the current frame.
    ///
    /// A non-negative `idx` sets the frame size, padding with `nil`; a
    /// negative one drops slots above `idx` (`-1` keeps everything).
    pub fn set_top(&self, idx: i32) -> Result<(), RuntimeError> {
        let removed = {
            let mut stack = self.0.stack.borrow_mut();
            let base = stack.base();
            let frame_len = stack.frame_len();
            let new_len = if idx >= 0 {
                base + idx as usize
            } else {
                let drop_count = (idx.unsigned_abs() as usize) - 1;
                if drop_count > frame_len {
                    return Err(RuntimeError::StackUnderflow {
                        needed: drop_count,
                        available: frame_len,
                    });
                }
                stack.values.len() - drop_count
            };
            if new_len >= stack.values.len() {
                stack.values.resize(new_len, Value::Nil);
                Vec::new()
            } else {
                stack.values.split_off(new_len)
            }
        };
        drop(removed);
        Ok(())
    }

    /// Remove up to `n` values from the top of the frame.
    pub fn pop(&self, n: usize) {
        let removed = {
            let mut stack = self.0.stack.borrow_mut();
            let n = n.min(stack.frame_len());
            let at = stack.values.len() - n;
            stack.values.split_off(at)
        };
        drop(removed);
    }

    /// Remove and return the top value, `nil` when the frame is empty.
    pub fn pop_value(&self) -> Value {
        let mut stack = self.0.stack.borrow_mut();
        if stack.frame_len() == 0 {
            return Value::Nil;
        }
        stack.values.pop().unwrap_or_default()
    }

    pub(crate) fn truncate_to(&self, absolute: usize) {
        let removed = {
            let mut stack = self.0.stack.borrow_mut();
            if absolute < stack.values.len() {
                stack.values.split_off(absolute)
            } else {
                Vec::new()
            }
        };
        drop(removed);
    }

    pub(crate) fn absolute_top(&self) -> usize {
        self.0.stack.borrow().values.len()
    }

    pub fn push_value(&self, value: Value) {
        self.0.stack.borrow_mut().values.push(value);
    }

    pub fn push_nil(&self) {
        self.push_value(Value::Nil);
    }

    pub fn push_bool(&self, b: bool) {
        self.push_value(Value::Boolean(b));
    }

    pub fn push_integer(&self, i: i64) {
        self.push_value(Value::Integer(i));
    }

    pub fn push_number(&self, n: f64) {
        self.push_value(Value::Number(n));
    }

    pub fn push_string(&self, s: &str) {
        self.push_value(Value::String(Rc::from(s)));
    }

    pub fn push_light_userdata(&self, ptr: usize) {
        self.push_value(Value::LightUserdata(ptr));
    }

    pub fn push_function(&self, function: Function) {
        self.push_value(Value::Function(function));
    }

    pub fn push_table(&self, table: TableRef) {
        self.push_value(Value::Table(table));
    }

    /// Push a copy of the value at `idx`.
    pub fn push_copy(&self, idx: i32) {
        let value = self.value_at(idx);
        self.push_value(value);
    }

    /// Move the top value into position `idx`, shifting the values above up.
    pub fn insert(&self, idx: i32) -> Result<(), RuntimeError> {
        let mut stack = self.0.stack.borrow_mut();
        let pos = stack
            .absolute(idx)
            .ok_or_else(|| RuntimeError::message(format!("invalid stack index {idx}")))?;
        if let Some(top) = stack.values.pop() {
            stack.values.insert(pos, top);
        }
        Ok(())
    }

    /// Remove the value at `idx`, shifting the values above down.
    pub fn remove(&self, idx: i32) -> Result<Value, RuntimeError> {
        let mut stack = self.0.stack.borrow_mut();
        let pos = stack
            .absolute(idx)
            .ok_or_else(|| RuntimeError::message(format!("invalid stack index {idx}")))?;
        Ok(stack.values.remove(pos))
    }

    /// Clone of the value at `idx`; `nil` for an invalid index.
    pub fn value_at(&self, idx: i32) -> Value {
        let stack = self.0.stack.borrow();
        stack
            .absolute(idx)
            .map(|pos| stack.values[pos].clone())
            .unwrap_or_default()
    }

    pub fn is_valid_index(&self, idx: i32) -> bool {
        self.0.stack.borrow().absolute(idx).is_some()
    }

    pub fn type_at(&self, idx: i32) -> ValueType {
        let stack = self.0.stack.borrow();
        stack
            .absolute(idx)
            .map(|pos| stack.values[pos].type_of())
            .unwrap_or(ValueType::None)
    }

    /// Whether the slot's type is in `mask`.
    pub fn check_type(&self, idx: i32, mask: TypeMask) -> bool {
        mask.contains(TypeMask::from(self.type_at(idx)))
    }

    pub fn is_none(&self, idx: i32) -> bool {
        self.type_at(idx) == ValueType::None
    }

    pub fn is_nil(&self, idx: i32) -> bool {
        self.type_at(idx) == ValueType::Nil
    }

    pub fn is_none_or_nil(&self, idx: i32) -> bool {
        self.check_type(idx, TypeMask::NONE_OR_NIL)
    }

    pub fn is_boolean(&self, idx: i32) -> bool {
        self.type_at(idx) == ValueType::Boolean
    }

    /// Number, or a string convertible to one.
    pub fn is_number(&self, idx: i32) -> bool {
        match self.value_at(idx) {
            Value::Integer(_) | Value::Number(_) => true,
            Value::String(s) => parse_number(&s).is_some(),
            _ => false,
        }
    }

    /// String, or a number (numbers convert to strings).
    pub fn is_string(&self, idx: i32) -> bool {
        self.check_type(idx, TypeMask::STRING | TypeMask::NUMBER)
    }

    pub fn is_table(&self, idx: i32) -> bool {
        self.type_at(idx) == ValueType::Table
    }

    pub fn is_function(&self, idx: i32) -> bool {
        self.type_at(idx) == ValueType::Function
    }

    /// Full or light userdata.
    pub fn is_userdata(&self, idx: i32) -> bool {
        self.check_type(idx, TypeMask::ANY_USERDATA)
    }

    pub fn to_boolean(&self, idx: i32) -> bool {
        self.value_at(idx).is_truthy()
    }

    /// Integer view of the slot: floats truncate, numeric strings parse,
    /// anything else reads as `0`.
    pub fn to_integer(&self, idx: i32) -> i64 {
        self.to_integer_opt(idx).unwrap_or(0)
    }

    pub fn to_integer_opt(&self, idx: i32) -> Option<i64> {
        match self.value_at(idx) {
            Value::Integer(i) => Some(i),
            Value::Number(n) => Some(n as i64),
            Value::String(s) => match parse_number(&s)? {
                Value::Integer(i) => Some(i),
                Value::Number(n) => Some(n as i64),
                _ => None,
            },
            _ => None,
        }
    }

    /// Float view of the slot, `0.0` when not convertible.
    pub fn to_number(&self, idx: i32) -> f64 {
        self.to_number_opt(idx).unwrap_or(0.0)
    }

    pub fn to_number_opt(&self, idx: i32) -> Option<f64> {
        self.value_at(idx).as_number()
    }

    /// String view of the slot; numbers are formatted, other types give `None`.
    pub fn to_str(&self, idx: i32) -> Option<String> {
        match self.value_at(idx) {
            Value::String(s) => Some(s.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Number(n) => Some(format_number(n)),
            _ => None,
        }
    }

    pub fn to_userdata(&self, idx: i32) -> Option<AnyUserdata> {
        match self.value_at(idx) {
            Value::Userdata(ud) => Some(ud),
            _ => None,
        }
    }

    pub fn to_table(&self, idx: i32) -> Option<TableRef> {
        match self.value_at(idx) {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Address behind the slot: light userdata pointer, or the identity of a
    /// reference value. `0` for everything else.
    pub fn to_pointer(&self, idx: i32) -> usize {
        match self.value_at(idx) {
            Value::LightUserdata(p) => p,
            Value::Userdata(ud) => ud.addr(),
            Value::Table(t) => t.addr(),
            Value::Function(f) => f.addr(),
            _ => 0,
        }
    }

    pub fn raw_equal(&self, a: i32, b: i32) -> bool {
        self.is_valid_index(a) && self.is_valid_index(b) && self.value_at(a) == self.value_at(b)
    }
}
