//! Registry references and named registry entries.

use crate::table::TableRef;
use crate::value::{Value, ValueType};

use super::State;

/// Integer handle to a value anchored in the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistryKey(i64);

impl RegistryKey {
    /// Handle returned for a `nil` value; pushing it pushes `nil`.
    pub const NIL: RegistryKey = RegistryKey(-1);

    pub fn id(self) -> i64 {
        self.0
    }

    pub fn is_nil(self) -> bool {
        self == Self::NIL
    }
}

impl State {
    /// Pop the top value and anchor it in the registry.
    pub fn create_ref(&self) -> RegistryKey {
        let value = self.pop_value();
        if value.is_nil() {
            return RegistryKey::NIL;
        }
        let id = match self.0.ref_free_list.borrow_mut().pop() {
            Some(id) => id,
            None => {
                let id = self.0.next_ref.get();
                self.0.next_ref.set(id + 1);
                id
            }
        };
        self.0.registry.raw_set_int(id, value);
        RegistryKey(id)
    }

    /// Push the value anchored under `key`.
    pub fn push_ref(&self, key: RegistryKey) {
        let value = if key.is_nil() {
            Value::Nil
        } else {
            self.0.registry.raw_get_int(key.0)
        };
        self.push_value(value);
    }

    /// Drop the anchor for `key` so its slot can be reused.
    ///
    /// Releasing a key that is not anchored is ignored.
    pub fn release_ref(&self, key: RegistryKey) {
        if key.is_nil() {
            return;
        }
        if self.0.registry.raw_get_int(key.0).is_nil() {
            log::warn!("registry reference {} released twice", key.0);
            return;
        }
        self.0.registry.raw_set_int(key.0, Value::Nil);
        self.0.ref_free_list.borrow_mut().push(key.0);
    }

    /// Push the registry table named `name`, creating it when absent.
    ///
    /// Returns `true` when the table was created by this call.
    pub fn new_metatable(&self, name: &str) -> bool {
        match self.0.registry.raw_get_str(name) {
            Value::Nil => {
                let table = TableRef::new();
                self.0.registry.raw_set_str(name, table.clone());
                self.push_table(table);
                true
            }
            existing => {
                self.push_value(existing);
                false
            }
        }
    }

    /// Push the registry entry named `name`.
    pub fn get_registry_field(&self, name: &str) -> ValueType {
        let value = self.0.registry.raw_get_str(name);
        let ty = value.type_of();
        self.push_value(value);
        ty
    }

    /// Named registry sub-table, created on first use.
    pub fn registry_subtable(&self, name: &str) -> TableRef {
        match self.0.registry.raw_get_str(name) {
            Value::Table(t) => t,
            _ => {
                let table = TableRef::new();
                self.0.registry.raw_set_str(name, table.clone());
                table
            }
        }
    }
}
