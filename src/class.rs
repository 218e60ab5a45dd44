//! Class registration.
//!
//! A class is materialized as two tables:
//!
//! - the **class metatable**, stored in the registry under
//!   [`class_key::<T>()`](crate::class_key), given to every instance. It
//!   holds the lookup hooks, the `__gc` hook, `_prototype` and one entry per
//!   member;
//! - the **constructor table**, bound in the module table under the class
//!   name. Calling it constructs an instance; its fields are the static
//!   functions and `prototype` points at the class metatable.
//!
//! ```
//! use lunabind::{register_module, UserData};
//! use lunabind_core::{State, Value};
//!
//! struct Counter {
//!     hits: u32,
//! }
//! impl UserData for Counter {}
//!
//! impl Counter {
//!     fn new(start: u32) -> Self {
//!         Counter { hits: start }
//!     }
//!     fn hit(&mut self) -> u32 {
//!         self.hits += 1;
//!         self.hits
//!     }
//! }
//!
//! let state = State::new();
//! register_module(&state, "Game", |module| {
//!     module
//!         .class::<Counter>("Counter")
//!         .constructor(Counter::new)
//!         .method("hit", Counter::hit)
//!         .register()
//! });
//!
//! let game = state.require("Game").unwrap();
//! let class = state.index_value(&game, Value::from("Counter")).unwrap();
//! let counter = state.call_function(class, [Value::Integer(4)], 1).unwrap().remove(0);
//! let hit = state.index_value(&counter, Value::from("hit")).unwrap();
//! let result = state.call_function(hit, [counter], 1).unwrap();
//! assert_eq!(result, vec![Value::Integer(5)]);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use lunabind_core::{Function, State, TableRef, Value};
use rustc_hash::FxHashMap;

use crate::codec::{FromStack, IntoStack};
use crate::dispatch::{IntoConstructor, IntoFunction, IntoMethod, raw_method, receiver};
use crate::error::{BindError, BindResult};
use crate::identity::{ClassPath, TypeHash, class_key};
use crate::lookup::{index_hook, newindex_hook};
use crate::module::ModuleBuilder;
use crate::object::class_metatable;
use crate::userdata::UserData;

/// Registry sub-table mapping qualified class names to class metatables.
pub const CLASS_TABLE: &str = "_lunabind_classes";

/// Registered classes of a state, keyed by [`TypeHash`].
#[derive(Debug, Default)]
pub struct ClassDirectory {
    classes: RefCell<FxHashMap<TypeHash, String>>,
}

impl ClassDirectory {
    fn of(state: &State) -> Rc<ClassDirectory> {
        match state.app_data::<ClassDirectory>() {
            Some(directory) => directory,
            None => {
                state.set_app_data(ClassDirectory::default());
                state.app_data::<ClassDirectory>().unwrap_or_default()
            }
        }
    }

    /// Record `T` under its qualified name, returning the previous name.
    fn record<T: UserData>(state: &State, qualified: &str) -> Option<String> {
        Self::of(state)
            .classes
            .borrow_mut()
            .insert(TypeHash::of::<T>(), qualified.to_string())
    }

    /// Qualified `Module.Class` name `T` was registered under.
    pub fn qualified_name<T: UserData>(state: &State) -> Option<String> {
        let directory = state.app_data::<ClassDirectory>()?;
        let name = directory.classes.borrow().get(&TypeHash::of::<T>()).cloned();
        name
    }

    /// Number of distinct classes registered in `state`.
    pub fn len(state: &State) -> usize {
        state
            .app_data::<ClassDirectory>()
            .map_or(0, |directory| directory.classes.borrow().len())
    }
}

/// Member entries collected for a class metatable.
pub struct MemberTable<T> {
    entries: Vec<(String, Function)>,
    _marker: PhantomData<fn(T)>,
}

impl<T: UserData> MemberTable<T> {
    fn new() -> Self {
        MemberTable {
            entries: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Bind a method. Lookup returns the method thunk, which the script
    /// then calls with the receiver in front of the arguments.
    pub fn method<M>(&mut self, name: &str, f: impl IntoMethod<T, M>) -> &mut Self {
        let thunk = f.into_method(name);
        self.entries.push((name.to_string(), method_getter(name, thunk)));
        self
    }

    /// Bind a method that works on the stack directly.
    pub fn method_raw<F, R>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&mut T, &State) -> R + 'static,
        R: IntoStack,
    {
        let thunk = raw_method(name, f);
        self.entries.push((name.to_string(), method_getter(name, thunk)));
        self
    }

    /// Bind a field, readable as `object.name` and writable as
    /// `object.name = value`.
    ///
    /// Reads go through `get` under a shared borrow, so a `&self` method
    /// whose callback reads the same object does not conflict with it.
    pub fn attribute<A, G, S>(&mut self, name: &str, get: G, set: S) -> &mut Self
    where
        A: FromStack + IntoStack + Clone,
        G: Fn(&T) -> &A + 'static,
        S: Fn(&mut T) -> &mut A + 'static,
    {
        let member = name.to_string();
        let hook = Function::new(name, move |state| {
            let object = receiver::<T>(state, &member)?;
            if state.get_top() >= 2 {
                let value = A::from_stack(state, 2)?;
                let mut guard = object.borrow_mut()?;
                *set(&mut *guard) = value;
                Ok(0)
            } else {
                let value = get(&*object.borrow()?).clone();
                value.push_to(state)?;
                Ok(1)
            }
        });
        self.entries.push((name.to_string(), hook));
        self
    }
}

/// Outer getter of a method: called by lookup with the receiver, returns
/// the method thunk.
fn method_getter(name: &str, thunk: Function) -> Function {
    Function::new(name, move |state| {
        state.push_function(thunk.clone());
        Ok(1)
    })
}

/// Entries collected for a constructor table.
#[derive(Default)]
pub struct StaticTable {
    entries: Vec<(String, Value)>,
}

impl StaticTable {
    /// Bind a static function. Scripts call it straight off the constructor
    /// table (`Module.Class.f(...)`); arguments are read from slot 1.
    pub fn function<M>(&mut self, name: &str, f: impl IntoFunction<M>) -> &mut Self {
        self.entries
            .push((name.to_string(), Value::Function(f.into_function(name, 1))));
        self
    }

    pub fn value(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.entries.push((name.to_string(), value.into()));
        self
    }
}

/// Fluent registration of class `T` into a module.
#[must_use = "a class is only registered once `register` is called"]
pub struct ClassBuilder<'m, T: UserData> {
    module: &'m mut ModuleBuilder,
    name: String,
    constructor: Option<Function>,
    parent: Option<ClassPath>,
    members: MemberTable<T>,
    statics: StaticTable,
}

impl<'m, T: UserData> ClassBuilder<'m, T> {
    pub(crate) fn new(module: &'m mut ModuleBuilder, name: &str) -> Self {
        ClassBuilder {
            module,
            name: name.to_string(),
            constructor: None,
            parent: None,
            members: MemberTable::new(),
            statics: StaticTable::default(),
        }
    }

    pub fn constructor<M>(mut self, f: impl IntoConstructor<T, M>) -> Self {
        self.constructor = Some(f.into_constructor(&self.name));
        self
    }

    /// Inherit from `path`: a class of the same module by bare name, or
    /// `"Module.Class"`, in which case the module is required first.
    ///
    /// `T` must implement [`UserData::parent`] and [`UserData::parent_mut`]
    /// returning its embedded base object. Without them, inherited methods
    /// and attributes fail with [`BindError::BaseNotReachable`].
    pub fn parent(mut self, path: &str) -> Self {
        self.parent = Some(ClassPath::parse(path));
        self
    }

    pub fn members(mut self, register: impl FnOnce(&mut MemberTable<T>)) -> Self {
        register(&mut self.members);
        self
    }

    pub fn method<M>(mut self, name: &str, f: impl IntoMethod<T, M>) -> Self {
        self.members.method(name, f);
        self
    }

    pub fn method_raw<F, R>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&mut T, &State) -> R + 'static,
        R: IntoStack,
    {
        self.members.method_raw(name, f);
        self
    }

    pub fn attribute<A, G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        A: FromStack + IntoStack + Clone,
        G: Fn(&T) -> &A + 'static,
        S: Fn(&mut T) -> &mut A + 'static,
    {
        self.members.attribute(name, get, set);
        self
    }

    pub fn statics(mut self, register: impl FnOnce(&mut StaticTable)) -> Self {
        register(&mut self.statics);
        self
    }

    pub fn static_function<M>(mut self, name: &str, f: impl IntoFunction<M>) -> Self {
        self.statics.function(name, f);
        self
    }

    /// Install the class: metatable and lookup hooks, parent, members,
    /// destructor hook, constructor table, statics, module binding.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn register(self) -> BindResult<()> {
        let ClassBuilder {
            module,
            name,
            constructor,
            parent,
            members,
            statics,
        } = self;
        let state = module.state().clone();
        let qualified = format!("{}.{}", module.name(), name);

        if !state.new_metatable(&class_key::<T>()) {
            log::warn!("class {qualified} registered again; the last registration wins");
        }
        state.pop(1);
        let metatable = class_metatable::<T>(&state)?;
        metatable.raw_set_str("__index", index_hook());
        metatable.raw_set_str("__newindex", newindex_hook());
        metatable.raw_set_str("_prototype", metatable.clone());

        state
            .registry_subtable(CLASS_TABLE)
            .raw_set_str(&qualified, metatable.clone());
        if let Some(previous) = ClassDirectory::record::<T>(&state, &qualified)
            && previous != qualified
        {
            log::warn!("type of class {qualified} was already registered as {previous}");
        }

        if let Some(parent) = &parent {
            let parent_metatable = resolve_parent(&state, module.name(), parent)?;
            metatable.set_metatable(Some(parent_metatable));
        }

        for (member, function) in members.entries {
            metatable.raw_set_str(&member, function);
        }

        metatable.raw_set_str(
            "__gc",
            Function::new("__gc", |state| {
                if let Some(userdata) = state.to_userdata(1) {
                    drop(userdata.take_payload());
                }
                Ok(0)
            }),
        );

        let constructor_table = TableRef::new();
        let constructor_meta = TableRef::new();
        let call = constructor.unwrap_or_else(|| missing_constructor(&qualified));
        constructor_meta.raw_set_str("__call", call);
        constructor_table.set_metatable(Some(constructor_meta));
        constructor_table.raw_set_str("prototype", metatable);

        for (entry, value) in statics.entries {
            constructor_table.raw_set_str(&entry, value);
        }

        module.table().raw_set_str(&name, constructor_table);
        log::debug!("registered class {qualified}");
        Ok(())
    }
}

impl<T: UserData> fmt::Debug for ClassBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassBuilder")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("members", &self.members.entries.len())
            .field("statics", &self.statics.entries.len())
            .finish()
    }
}

fn missing_constructor(qualified: &str) -> Function {
    let class = qualified.to_string();
    Function::new("__call", move |_| {
        Err(BindError::NoConstructor {
            class: class.clone(),
        }
        .into())
    })
}

/// The class metatable a parent path refers to, loading its module first
/// when it lives elsewhere.
fn resolve_parent(state: &State, current_module: &str, parent: &ClassPath) -> BindResult<TableRef> {
    if parent.is_foreign(current_module)
        && let Some(module) = parent.module.as_deref()
    {
        log::debug!("loading module '{module}' for parent class {parent}");
        state.require(module)?;
    }
    match state
        .registry_subtable(CLASS_TABLE)
        .raw_get_str(&parent.qualified(current_module))
    {
        Value::Table(metatable) => Ok(metatable),
        _ => Err(BindError::UnknownParent {
            parent: parent.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use lunabind_core::RuntimeError;

    use super::*;
    use crate::config::{BindConfig, MissingMemberPolicy};
    use crate::module::register_module;

    #[derive(Clone)]
    struct Point {
        x: i32,
    }
    impl UserData for Point {}

    impl Point {
        fn new(x: i32) -> Self {
            Point { x }
        }
        fn x(&self) -> i32 {
            self.x
        }
    }

    fn raise_state() -> State {
        let state = State::new();
        BindConfig::default()
            .with_missing_member(MissingMemberPolicy::Raise)
            .install(&state);
        state
    }

    fn field(state: &State, target: &Value, key: &str) -> Value {
        state.index_value(target, Value::from(key)).unwrap()
    }

    #[test]
    fn registration_layout() {
        let state = raise_state();
        register_module(&state, "Geo", |module| {
            module
                .class::<Point>("Point")
                .constructor(Point::new)
                .method("x", Point::x)
                .static_function("origin", || 0)
                .register()
        });
        let geo = state.require("Geo").unwrap();
        let class = field(&state, &geo, "Point");
        let metatable = class_metatable::<Point>(&state).unwrap();

        let Value::Table(constructor) = &class else {
            panic!("constructor is not a table");
        };
        assert!(matches!(
            constructor.raw_get_str("prototype"),
            Value::Table(t) if t.ptr_eq(&metatable)
        ));
        assert!(matches!(constructor.raw_get_str("origin"), Value::Function(_)));
        assert!(matches!(metatable.raw_get_str("__gc"), Value::Function(_)));
        assert!(matches!(
            metatable.raw_get_str("_prototype"),
            Value::Table(t) if t.ptr_eq(&metatable)
        ));
        assert_eq!(
            ClassDirectory::qualified_name::<Point>(&state).as_deref(),
            Some("Geo.Point")
        );
        assert_eq!(ClassDirectory::len(&state), 1);
    }

    #[test]
    fn constructed_instance_dispatches_methods() {
        let state = raise_state();
        register_module(&state, "Geo", |module| {
            module
                .class::<Point>("Point")
                .constructor(Point::new)
                .method("x", Point::x)
                .register()
        });
        let geo = state.require("Geo").unwrap();
        let class = field(&state, &geo, "Point");
        let point = state
            .call_function(class, [Value::Integer(7)], 1)
            .unwrap()
            .remove(0);
        let x = field(&state, &point, "x");
        assert_eq!(
            state.call_function(x, [point], 1).unwrap(),
            vec![Value::Integer(7)]
        );
    }

    #[test]
    fn class_without_constructor_cannot_be_called() {
        let state = raise_state();
        register_module(&state, "Geo", |module| module.class::<Point>("Point").register());
        let geo = state.require("Geo").unwrap();
        let class = field(&state, &geo, "Point");
        let err = state.call_function(class, [], 1).unwrap_err();
        assert!(matches!(
            BindError::from_runtime(err),
            BindError::NoConstructor { class } if class == "Geo.Point"
        ));
    }

    #[test]
    fn unknown_parent_fails_registration() {
        let state = raise_state();
        register_module(&state, "Geo", |module| {
            module.class::<Point>("Point").parent("Shape").register()
        });
        let err = state.require("Geo").unwrap_err();
        assert!(matches!(
            BindError::from_runtime(err),
            BindError::UnknownParent { parent } if parent == "Shape"
        ));
    }

    #[test]
    fn missing_parent_module_fails_registration() {
        let state = raise_state();
        register_module(&state, "Geo", |module| {
            module.class::<Point>("Point").parent("Shapes.Shape").register()
        });
        let err = state.require("Geo").unwrap_err();
        assert!(matches!(
            BindError::from_runtime(err),
            BindError::Runtime(RuntimeError::ModuleNotFound(name)) if name == "Shapes"
        ));
    }

    #[test]
    fn collected_instances_are_destroyed() {
        let state = raise_state();
        register_module(&state, "Geo", |module| {
            module
                .class::<Point>("Point")
                .constructor(Point::new)
                .register()
        });
        let geo = state.require("Geo").unwrap();
        let class = field(&state, &geo, "Point");
        let point = state
            .call_function(class, [Value::Integer(1)], 1)
            .unwrap()
            .remove(0);
        let userdata = point.as_userdata().cloned().unwrap();
        drop(point);
        drop(userdata);
        assert_eq!(state.collect_garbage(), 1);
        assert_eq!(state.userdata_count(), 0);
    }
}
