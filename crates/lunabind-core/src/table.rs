//! Shared hash tables with optional metatables.
//!
//! Values removed from a table are always dropped after the table's borrow is
//! released: dropping a value can run native code (a captured callable
//! releasing its registry slot, for instance) that touches other tables.

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

use crate::error::RuntimeError;
use crate::value::{Value, float_to_integer};

/// Normalized table key.
///
/// Floats with an integral value collapse onto the integer key, so `t[1]`
/// and `t[1.0]` address the same entry. Reference values key by identity.
#[derive(Clone)]
enum Key {
    Boolean(bool),
    Integer(i64),
    Number(OrderedFloat<f64>),
    String(Rc<str>),
    Ref(usize, Value),
}

impl Key {
    fn from_value(value: &Value) -> Result<Key, RuntimeError> {
        Ok(match value {
            Value::Nil => return Err(RuntimeError::InvalidKey("nil")),
            Value::Boolean(b) => Key::Boolean(*b),
            Value::Integer(i) => Key::Integer(*i),
            Value::Number(n) if n.is_nan() => return Err(RuntimeError::InvalidKey("NaN")),
            Value::Number(n) => match float_to_integer(*n) {
                Some(i) => Key::Integer(i),
                None => Key::Number(OrderedFloat(*n)),
            },
            Value::String(s) => Key::String(s.clone()),
            Value::LightUserdata(p) => Key::Ref(*p, value.clone()),
            Value::Table(t) => Key::Ref(t.addr(), value.clone()),
            Value::Function(f) => Key::Ref(f.addr(), value.clone()),
            Value::Userdata(u) => Key::Ref(u.addr(), value.clone()),
        })
    }

    fn to_value(&self) -> Value {
        match self {
            Key::Boolean(b) => Value::Boolean(*b),
            Key::Integer(i) => Value::Integer(*i),
            Key::Number(n) => Value::Number(n.0),
            Key::String(s) => Value::String(s.clone()),
            Key::Ref(_, v) => v.clone(),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Boolean(a), Key::Boolean(b)) => a == b,
            (Key::Integer(a), Key::Integer(b)) => a == b,
            (Key::Number(a), Key::Number(b)) => a == b,
            (Key::String(a), Key::String(b)) => a == b,
            (Key::Ref(a, va), Key::Ref(b, vb)) => {
                a == b && std::mem::discriminant(va) == std::mem::discriminant(vb)
            }
            _ => false,
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Key::Boolean(b) => b.hash(state),
            Key::Integer(i) => i.hash(state),
            Key::Number(n) => n.hash(state),
            Key::String(s) => s.hash(state),
            Key::Ref(addr, _) => addr.hash(state),
        }
    }
}

#[derive(Default)]
struct TableData {
    entries: FxHashMap<Key, Value>,
    metatable: Option<TableRef>,
}

/// Reference-counted handle to a runtime table.
///
/// Cloning the handle aliases the same table.
#[derive(Clone, Default)]
pub struct TableRef(Rc<RefCell<TableData>>);

impl TableRef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an entry without consulting metamethods.
    pub fn raw_get(&self, key: &Value) -> Value {
        let Ok(key) = Key::from_value(key) else {
            return Value::Nil;
        };
        self.0.borrow().entries.get(&key).cloned().unwrap_or_default()
    }

    pub fn raw_get_str(&self, key: &str) -> Value {
        self.0
            .borrow()
            .entries
            .get(&Key::String(Rc::from(key)))
            .cloned()
            .unwrap_or_default()
    }

    pub fn raw_get_int(&self, key: i64) -> Value {
        self.0
            .borrow()
            .entries
            .get(&Key::Integer(key))
            .cloned()
            .unwrap_or_default()
    }

    /// Write an entry without consulting metamethods. Assigning `nil` removes the entry.
    pub fn raw_set(&self, key: Value, value: Value) -> Result<(), RuntimeError> {
        let key = Key::from_value(&key)?;
        let old = {
            let mut data = self.0.borrow_mut();
            if value.is_nil() {
                data.entries.remove(&key)
            } else {
                data.entries.insert(key, value)
            }
        };
        drop(old);
        Ok(())
    }

    pub fn raw_set_str(&self, key: &str, value: impl Into<Value>) {
        let key = Key::String(Rc::from(key));
        let value = value.into();
        let old = {
            let mut data = self.0.borrow_mut();
            if value.is_nil() {
                data.entries.remove(&key)
            } else {
                data.entries.insert(key, value)
            }
        };
        drop(old);
    }

    pub fn raw_set_int(&self, key: i64, value: impl Into<Value>) {
        let key = Key::Integer(key);
        let value = value.into();
        let old = {
            let mut data = self.0.borrow_mut();
            if value.is_nil() {
                data.entries.remove(&key)
            } else {
                data.entries.insert(key, value)
            }
        };
        drop(old);
    }

    /// Border of the array part: the largest `n` with `t[n] ~= nil` reachable from 1.
    pub fn len(&self) -> usize {
        let data = self.0.borrow();
        let mut n = 0i64;
        while data.entries.contains_key(&Key::Integer(n + 1)) {
            n += 1;
        }
        n as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().entries.is_empty()
    }

    /// Number of entries of any key type.
    pub fn entry_count(&self) -> usize {
        self.0.borrow().entries.len()
    }

    /// Snapshot of every `(key, value)` pair. Iteration order is unspecified.
    pub fn pairs(&self) -> Vec<(Value, Value)> {
        self.0
            .borrow()
            .entries
            .iter()
            .map(|(k, v)| (k.to_value(), v.clone()))
            .collect()
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.0.borrow().metatable.clone()
    }

    pub fn set_metatable(&self, metatable: Option<TableRef>) {
        let old = std::mem::replace(&mut self.0.borrow_mut().metatable, metatable);
        drop(old);
    }

    /// Metamethod lookup: raw field `event` of this table's metatable.
    pub fn metamethod(&self, event: &str) -> Value {
        self.metatable()
            .map(|mt| mt.raw_get_str(event))
            .unwrap_or_default()
    }

    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Remove every entry and the metatable, returning what was held.
    ///
    /// Used at shutdown to break reference cycles between tables.
    pub(crate) fn take_contents(&self) -> (Vec<Value>, Option<TableRef>) {
        let data = std::mem::take(&mut *self.0.borrow_mut());
        let mut values = Vec::with_capacity(data.entries.len() * 2);
        for (k, v) in data.entries {
            if let Key::Ref(_, kv) = k {
                values.push(kv);
            }
            values.push(v);
        }
        (values, data.metatable)
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableRef")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("entries", &self.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_set_and_get() {
        let t = TableRef::new();
        t.raw_set(Value::from("foo"), Value::Integer(10)).unwrap();
        assert_eq!(t.raw_get(&Value::from("foo")), Value::Integer(10));
        assert_eq!(t.raw_get_str("foo"), Value::Integer(10));
        assert!(t.raw_get_str("bar").is_nil());
    }

    #[test]
    fn integral_float_keys_collapse() {
        let t = TableRef::new();
        t.raw_set(Value::Number(1.0), Value::from("one")).unwrap();
        assert_eq!(t.raw_get_int(1), Value::from("one"));
        t.raw_set(Value::Number(1.5), Value::from("half")).unwrap();
        assert_eq!(t.raw_get(&Value::Number(1.5)), Value::from("half"));
    }

    #[test]
    fn nil_and_nan_keys_rejected() {
        let t = TableRef::new();
        assert!(matches!(
            t.raw_set(Value::Nil, Value::Integer(1)),
            Err(RuntimeError::InvalidKey("nil"))
        ));
        assert!(matches!(
            t.raw_set(Value::Number(f64::NAN), Value::Integer(1)),
            Err(RuntimeError::InvalidKey("NaN"))
        ));
        assert!(t.raw_get(&Value::Nil).is_nil());
    }

    #[test]
    fn nil_assignment_removes() {
        let t = TableRef::new();
        t.raw_set_str("a", 1);
        assert_eq!(t.entry_count(), 1);
        t.raw_set_str("a", Value::Nil);
        assert!(t.is_empty());
    }

    #[test]
    fn length_border() {
        let t = TableRef::new();
        assert_eq!(t.len(), 0);
        for i in 1..=3 {
            t.raw_set_int(i, i * 10);
        }
        t.raw_set_int(5, 50);
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn reference_keys_use_identity() {
        let t = TableRef::new();
        let k1 = TableRef::new();
        let k2 = TableRef::new();
        t.raw_set(Value::Table(k1.clone()), Value::Integer(1)).unwrap();
        assert_eq!(t.raw_get(&Value::Table(k1)), Value::Integer(1));
        assert!(t.raw_get(&Value::Table(k2)).is_nil());
    }

    #[test]
    fn metamethod_lookup() {
        let t = TableRef::new();
        let mt = TableRef::new();
        mt.raw_set_str("__index", Value::from("marker"));
        assert!(t.metamethod("__index").is_nil());
        t.set_metatable(Some(mt.clone()));
        assert_eq!(t.metamethod("__index"), Value::from("marker"));
        assert!(t.metatable().unwrap().ptr_eq(&mt));
    }

    #[test]
    fn pairs_snapshot() {
        let t = TableRef::new();
        t.raw_set_str("x", 1);
        t.raw_set_int(1, "y");
        let mut pairs = t.pairs();
        pairs.sort_by_key(|(k, _)| k.type_name());
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, Value::Integer(1));
        assert_eq!(pairs[1].0, Value::from("x"));
    }
}
