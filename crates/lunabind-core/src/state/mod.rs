//! The runtime state.
//!
//! A [`State`] bundles the value stack, the registry, the global table and
//! the userdata heap. Handles are cheap to clone and single-threaded; the
//! state shuts down (finalizing every userdata) when the last handle is
//! dropped or [`State::close`] is called.
//!
//! The operations are split by concern:
//!
//! - `stack`: slot access, pushes, coercing reads
//! - `tables`: field access honouring `__index` / `__newindex`
//! - `call`: calls, protected calls, `__call`
//! - `registry`: registry references and named registry entries
//! - `modules`: preload table and `require`

mod call;
mod modules;
mod registry;
mod stack;
mod tables;

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::fmt::Write as _;
use std::rc::{Rc, Weak};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::options::StateOptions;
use crate::table::TableRef;
use crate::userdata::{AnyUserdata, UserdataHeap};
use crate::value::Value;

pub use call::MULTRET;
pub use modules::{LOADED_TABLE, PRELOAD_TABLE};
pub use registry::RegistryKey;

/// Value stack plus the base of every active call frame.
#[derive(Default)]
struct Stack {
    values: Vec<Value>,
    frames: Vec<usize>,
}

impl Stack {
    /// Absolute position of slot 1 in the current frame.
    fn base(&self) -> usize {
        self.frames.last().copied().unwrap_or(0)
    }

    fn frame_len(&self) -> usize {
        self.values.len() - self.base()
    }

    /// Map a frame-relative index (1-based or negative) to an absolute position.
    fn absolute(&self, idx: i32) -> Option<usize> {
        let base = self.base();
        let len = self.values.len();
        if idx > 0 {
            let pos = base + idx as usize - 1;
            (pos < len).then_some(pos)
        } else if idx < 0 {
            let offset = idx.unsigned_abs() as usize;
            (offset <= len - base).then(|| len - offset)
        } else {
            None
        }
    }
}

struct StateInner {
    stack: RefCell<Stack>,
    registry: TableRef,
    globals: TableRef,
    heap: RefCell<UserdataHeap>,
    ref_free_list: RefCell<Vec<i64>>,
    next_ref: Cell<i64>,
    app_data: RefCell<FxHashMap<TypeId, Rc<dyn Any>>>,
    options: StateOptions,
    closed: Cell<bool>,
}

/// Handle to a runtime state.
pub struct State(Rc<StateInner>);

/// Non-owning handle to a [`State`].
#[derive(Clone)]
pub struct WeakState(Weak<StateInner>);

impl WeakState {
    /// Recover a strong handle while the state is alive.
    pub fn upgrade(&self) -> Option<State> {
        self.0.upgrade().map(State)
    }
}

impl fmt::Debug for WeakState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakState")
            .field("alive", &(self.0.strong_count() > 0))
            .finish()
    }
}

impl State {
    pub fn new() -> Self {
        Self::with_options(StateOptions::default())
    }

    pub fn with_options(options: StateOptions) -> Self {
        let globals = TableRef::new();
        globals.raw_set_str("_G", globals.clone());

        let state = State(Rc::new(StateInner {
            stack: RefCell::new(Stack::default()),
            registry: TableRef::new(),
            globals,
            heap: RefCell::new(UserdataHeap::new()),
            ref_free_list: RefCell::new(Vec::new()),
            next_ref: Cell::new(1),
            app_data: RefCell::new(FxHashMap::default()),
            options,
            closed: Cell::new(false),
        }));
        state.open_package();
        state
    }

    pub fn options(&self) -> &StateOptions {
        &self.0.options
    }

    pub fn downgrade(&self) -> WeakState {
        WeakState(Rc::downgrade(&self.0))
    }

    pub fn ptr_eq(&self, other: &State) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The registry table.
    pub fn registry(&self) -> TableRef {
        self.0.registry.clone()
    }

    /// The global table.
    pub fn globals(&self) -> TableRef {
        self.0.globals.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.get()
    }

    /// Attach host data to the state, replacing any previous value of the same type.
    pub fn set_app_data<T: Any>(&self, data: T) -> Option<Rc<T>> {
        let previous = self
            .0
            .app_data
            .borrow_mut()
            .insert(TypeId::of::<T>(), Rc::new(data));
        previous.and_then(|old| old.downcast::<T>().ok())
    }

    pub fn app_data<T: Any>(&self) -> Option<Rc<T>> {
        let entry = self.0.app_data.borrow().get(&TypeId::of::<T>()).cloned()?;
        entry.downcast::<T>().ok()
    }

    /// Allocate a userdata from the heap and push it.
    pub fn new_userdata(&self) -> AnyUserdata {
        let ud = self.0.heap.borrow_mut().allocate();
        self.push_value(Value::Userdata(ud.clone()));
        ud
    }

    /// Number of userdata the heap still tracks.
    pub fn userdata_count(&self) -> usize {
        self.0.heap.borrow().len()
    }

    /// Finalize every userdata that nothing but the heap refers to.
    ///
    /// Returns how many userdata were finalized.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn collect_garbage(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        let mut finalized = 0;
        loop {
            let batch = self.0.heap.borrow().unreachable();
            if batch.is_empty() {
                break;
            }
            for ud in batch {
                self.finalize(&ud);
                finalized += 1;
            }
        }
        log::trace!("collected {finalized} userdata");
        finalized
    }

    /// Shut the state down.
    ///
    /// Every live userdata is finalized, newest first, exactly once. The
    /// stack, the registry and the globals are emptied afterwards. Calling
    /// `close` again is a no-op.
    pub fn close(&self) {
        if self.0.closed.replace(true) {
            return;
        }
        let live = self.0.heap.borrow().live_newest_first();
        log::debug!("closing state with {} live userdata", live.len());
        for ud in live {
            self.finalize(&ud);
        }

        let values = {
            let mut stack = self.0.stack.borrow_mut();
            stack.frames.clear();
            std::mem::take(&mut stack.values)
        };
        drop(values);

        self.break_cycles();

        let app_data = std::mem::take(&mut *self.0.app_data.borrow_mut());
        drop(app_data);
    }

    /// Render the current frame, one slot per line.
    pub fn dump_stack(&self) -> String {
        let stack = self.0.stack.borrow();
        let base = stack.base();
        let mut out = String::new();
        for (i, value) in stack.values[base..].iter().enumerate() {
            let _ = writeln!(out, "{}: [{}] {:?}", i + 1, value.type_name(), value);
        }
        log::trace!("stack dump:\n{out}");
        out
    }

    fn finalize(&self, ud: &AnyUserdata) {
        if !ud.mark_finalized() {
            return;
        }
        let gc = ud
            .metatable()
            .map(|mt| mt.raw_get_str("__gc"))
            .unwrap_or_default();
        if let Value::Function(_) = gc
            && let Err(err) = self.call_function(gc, [Value::Userdata(ud.clone())], 0)
        {
            log::warn!("error in __gc metamethod: {err}");
        }
        let removed = self.0.heap.borrow_mut().free(ud.id());
        drop(removed);
    }

    /// Empty every table reachable from the registry and the globals so
    /// self-referencing metatables do not outlive the state.
    fn break_cycles(&self) {
        let mut pending = vec![self.0.registry.clone(), self.0.globals.clone()];
        let mut seen = FxHashSet::default();
        let mut garbage = Vec::new();
        while let Some(table) = pending.pop() {
            if !seen.insert(table.addr()) {
                continue;
            }
            let (values, metatable) = table.take_contents();
            for value in &values {
                match value {
                    Value::Table(inner) => pending.push(inner.clone()),
                    Value::Userdata(ud) => {
                        if let Some(mt) = ud.metatable() {
                            pending.push(mt);
                        }
                    }
                    _ => {}
                }
            }
            if let Some(mt) = &metatable {
                pending.push(mt.clone());
            }
            garbage.push((values, metatable));
        }
        drop(garbage);
    }
}

impl Clone for State {
    fn clone(&self) -> Self {
        State(Rc::clone(&self.0))
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for State {
    fn drop(&mut self) {
        if Rc::strong_count(&self.0) == 1 {
            self.close();
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stack = self.0.stack.borrow();
        f.debug_struct("State")
            .field("top", &stack.frame_len())
            .field("depth", &stack.frames.len())
            .field("userdata", &self.0.heap.borrow().len())
            .field("closed", &self.0.closed.get())
            .finish()
    }
}
