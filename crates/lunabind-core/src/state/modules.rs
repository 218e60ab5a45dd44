//! Module preloading and `require`.
//!
//! Loaders are registered in the preload table. The first `require` of a
//! name runs its loader with the module name as argument and caches the
//! result in the loaded table; later calls return the cached value.

use crate::error::RuntimeError;
use crate::function::Function;
use crate::table::TableRef;
use crate::value::Value;

use super::State;

/// Registry key of the table caching loaded modules.
pub const LOADED_TABLE: &str = "_LOADED";
/// Registry key of the table of module loaders.
pub const PRELOAD_TABLE: &str = "_PRELOAD";

impl State {
    /// Install the `package` table and the global `require` function.
    pub(super) fn open_package(&self) {
        let loaded = self.registry_subtable(LOADED_TABLE);
        let preload = self.registry_subtable(PRELOAD_TABLE);

        let package = TableRef::new();
        package.raw_set_str("loaded", loaded);
        package.raw_set_str("preload", preload);

        let globals = self.globals();
        globals.raw_set_str("package", package);
        globals.raw_set_str(
            "require",
            Function::new("require", |state| {
                let name = state
                    .to_str(1)
                    .ok_or_else(|| RuntimeError::message("bad argument #1 to 'require' (string expected)"))?;
                let module = state.require(&name)?;
                state.push_value(module);
                Ok(1)
            }),
        );
    }

    /// Register `loader` as the loader for module `name`.
    pub fn preload(&self, name: &str, loader: Function) {
        log::debug!("preloading module '{name}'");
        self.registry_subtable(PRELOAD_TABLE)
            .raw_set_str(name, loader);
    }

    /// Load module `name`, running its loader the first time.
    pub fn require(&self, name: &str) -> Result<Value, RuntimeError> {
        let loaded = self.registry_subtable(LOADED_TABLE);
        let cached = loaded.raw_get_str(name);
        if !cached.is_nil() {
            return Ok(cached);
        }

        let loader = self.registry_subtable(PRELOAD_TABLE).raw_get_str(name);
        if loader.is_nil() {
            return Err(RuntimeError::ModuleNotFound(name.to_string()));
        }

        log::debug!("loading module '{name}'");
        let mut results = self.call_function(loader, [Value::from(name)], 1)?;
        let module = match results.pop() {
            Some(Value::Nil) | None => Value::Boolean(true),
            Some(value) => value,
        };
        // A loader may have stored its own value while running.
        let stored = loaded.raw_get_str(name);
        if !stored.is_nil() {
            return Ok(stored);
        }
        loaded.raw_set_str(name, module.clone());
        Ok(module)
    }

    /// Whether module `name` has already been loaded.
    pub fn is_loaded(&self, name: &str) -> bool {
        !self.registry_subtable(LOADED_TABLE).raw_get_str(name).is_nil()
    }
}
