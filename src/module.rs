//! Modules: named units of registration loaded through `require`.
//!
//! [`register_module`] stores a loader in the runtime's preload table. The
//! loader runs the first time a script requires the module; it fills a
//! fresh module table through a [`ModuleBuilder`] and hands the table back
//! to `require`, which caches it.
//!
//! ```
//! use lunabind::{register_module, BindResult, ModuleBuilder};
//! use lunabind_core::{State, Value};
//!
//! fn open_math(module: &mut ModuleBuilder) -> BindResult<()> {
//!     module.function("double", |x: i64| x * 2);
//!     module.value("answer", 42);
//!     Ok(())
//! }
//!
//! let state = State::new();
//! register_module(&state, "math2", open_math);
//! let math = state.require("math2").unwrap();
//! let answer = state.index_value(&math, Value::from("answer")).unwrap();
//! assert_eq!(answer, Value::Integer(42));
//! ```

use std::fmt;

use lunabind_core::{Function, State, TableRef, Value};

use crate::class::ClassBuilder;
use crate::dispatch::IntoFunction;
use crate::error::BindResult;
use crate::userdata::UserData;

/// Builder handed to a module loader.
pub struct ModuleBuilder {
    state: State,
    name: String,
    table: TableRef,
}

impl ModuleBuilder {
    pub(crate) fn new(state: &State, name: &str) -> Self {
        ModuleBuilder {
            state: state.clone(),
            name: name.to_string(),
            table: TableRef::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// The module table being filled.
    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Bind a free function under `name`.
    ///
    /// Scripts call module functions with a leading placeholder
    /// (`Module.f(nil, ...)`); arguments are read from slot 2.
    pub fn function<M>(&mut self, name: &str, f: impl IntoFunction<M>) -> &mut Self {
        self.table.raw_set_str(name, f.into_function(name, 2));
        self
    }

    /// Bind a plain value under `name`.
    pub fn value(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.table.raw_set_str(name, value);
        self
    }

    /// Start registering class `T` under `name`.
    pub fn class<T: UserData>(&mut self, name: &str) -> ClassBuilder<'_, T> {
        ClassBuilder::new(self, name)
    }
}

impl fmt::Debug for ModuleBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBuilder")
            .field("name", &self.name)
            .field("entries", &self.table.entry_count())
            .finish()
    }
}

/// Make module `name` loadable with `require(name)`.
pub fn register_module<F>(state: &State, name: &str, loader: F)
where
    F: Fn(&mut ModuleBuilder) -> BindResult<()> + 'static,
{
    let module = name.to_string();
    state.preload(
        name,
        Function::new(name, move |state| {
            log::debug!("building module '{module}'");
            let mut builder = ModuleBuilder::new(state, &module);
            loader(&mut builder)?;
            state.push_table(builder.table);
            Ok(1)
        }),
    );
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use lunabind_core::RuntimeError;

    use super::*;
    use crate::error::BindError;

    #[test]
    fn loader_runs_once() {
        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        let state = State::new();
        register_module(&state, "Once", move |module| {
            counter.set(counter.get() + 1);
            module.value("loaded", true);
            Ok(())
        });
        assert!(!state.is_loaded("Once"));
        let first = state.require("Once").unwrap();
        let second = state.require("Once").unwrap();
        assert_eq!(first, second);
        assert_eq!(runs.get(), 1);
        assert!(state.is_loaded("Once"));
    }

    #[test]
    fn functions_read_after_the_placeholder() {
        let state = State::new();
        register_module(&state, "Calc", |module| {
            module.function("add", |a: i32, b: i32| a + b);
            Ok(())
        });
        let calc = state.require("Calc").unwrap();
        let add = state.index_value(&calc, Value::from("add")).unwrap();
        let result = state
            .call_function(add, [Value::Nil, Value::Integer(2), Value::Integer(3)], 1)
            .unwrap();
        assert_eq!(result, vec![Value::Integer(5)]);
    }

    #[test]
    fn loader_errors_reach_require() {
        let state = State::new();
        register_module(&state, "Broken", |_| {
            Err(BindError::UnknownParent {
                parent: "Nowhere.Base".into(),
            })
        });
        let err = state.require("Broken").unwrap_err();
        assert!(matches!(err, RuntimeError::External(_)));
        assert!(!state.is_loaded("Broken"));
    }

    #[test]
    fn builder_exposes_its_module() {
        let state = State::new();
        let mut builder = ModuleBuilder::new(&state, "Named");
        builder.value("x", 1);
        assert_eq!(builder.name(), "Named");
        assert!(builder.state().ptr_eq(&state));
        assert_eq!(builder.table().raw_get_str("x"), Value::Integer(1));
    }
}
