//! Handles to bound native objects.
//!
//! | Form     | Decoding                                   | Encoding                       |
//! |----------|--------------------------------------------|--------------------------------|
//! | [`Ref`]  | shares the script's object, class-checked  | pushes the same userdata       |
//! | [`Val`]  | clones the object out, class-checked       | moves the value into a new one |
//! | [`Ptr`]  | nullable, `nil` decodes as null            | null pushes `nil`              |
//!
//! A class check succeeds when the userdata's metatable, or one of its
//! ancestors, is the registered metatable of the requested class. Objects
//! of a derived class therefore decode as their base class.

use std::cell::{Ref as CellRef, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use lunabind_core::{AnyUserdata, State, TableRef, Value};

use crate::codec::{FromStack, IntoStack, check_strict};
use crate::error::{BindError, BindResult};
use crate::identity::class_key;
use crate::userdata::{Stored, UserData, payload_mut, payload_ref};

/// Bound on metatable ancestry walks.
pub(crate) const MAX_CLASS_DEPTH: usize = 64;

/// The registered metatable of `T`.
pub(crate) fn class_metatable<T: UserData>(state: &State) -> BindResult<TableRef> {
    let key = class_key::<T>();
    match state.registry().raw_get_str(&key) {
        Value::Table(table) => Ok(table),
        _ => Err(BindError::ClassNotRegistered { class: key }),
    }
}

/// Whether `metatable` is `class` or derives from it.
pub(crate) fn derives_from(metatable: Option<TableRef>, class: &TableRef) -> bool {
    let mut current = metatable;
    for _ in 0..MAX_CLASS_DEPTH {
        match current {
            Some(mt) if mt.ptr_eq(class) => return true,
            Some(mt) => current = mt.metatable(),
            None => return false,
        }
    }
    false
}

fn instance_of<T: UserData>(state: &State, userdata: &AnyUserdata) -> bool {
    class_metatable::<T>(state).is_ok_and(|class| derives_from(userdata.metatable(), &class))
}

/// Move `value` into a new userdata of class `T` and push it.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn push_object<T: UserData>(state: &State, value: T) -> BindResult<AnyUserdata> {
    let metatable = class_metatable::<T>(state)?;
    let userdata = state.new_userdata();
    userdata.set_payload(Box::new(Stored::new(value)));
    userdata.set_metatable(Some(metatable));
    Ok(userdata)
}

/// An empty payload was destroyed; a live one lacks a `parent` link to `T`.
fn unresolved<T: UserData>(empty: bool) -> BindError {
    let class = class_key::<T>();
    if empty {
        BindError::ObjectDestroyed { class }
    } else {
        BindError::BaseNotReachable { class }
    }
}

/// Shared handle to a native object owned by the runtime.
///
/// The object is borrowed on demand; a second mutable borrow while one is
/// outstanding fails with [`BindError::ObjectBorrowed`].
pub struct Ref<T: UserData> {
    userdata: AnyUserdata,
    _marker: PhantomData<fn() -> T>,
}

impl<T: UserData> Ref<T> {
    pub(crate) fn new(userdata: AnyUserdata) -> Self {
        Ref {
            userdata,
            _marker: PhantomData,
        }
    }

    /// Move `value` into a new runtime-owned object of class `T`.
    ///
    /// The object is left on top of the stack.
    pub fn create(state: &State, value: T) -> BindResult<Self> {
        push_object(state, value).map(Ref::new)
    }

    pub fn userdata(&self) -> &AnyUserdata {
        &self.userdata
    }

    pub fn borrow(&self) -> BindResult<CellRef<'_, T>> {
        let payload = self
            .userdata
            .try_borrow_payload()
            .map_err(|_| BindError::ObjectBorrowed {
                class: class_key::<T>(),
            })?;
        CellRef::filter_map(payload, payload_ref::<T>)
            .map_err(|payload| unresolved::<T>(payload.is_none()))
    }

    pub fn borrow_mut(&self) -> BindResult<RefMut<'_, T>> {
        let payload = self
            .userdata
            .try_borrow_payload_mut()
            .map_err(|_| BindError::ObjectBorrowed {
                class: class_key::<T>(),
            })?;
        RefMut::filter_map(payload, payload_mut::<T>)
            .map_err(|payload| unresolved::<T>(payload.is_none()))
    }

    /// Whether both handles refer to the same runtime object.
    pub fn ptr_eq(&self, other: &Ref<T>) -> bool {
        self.userdata.ptr_eq(&other.userdata)
    }
}

impl<T: UserData> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Ref::new(self.userdata.clone())
    }
}

impl<T: UserData> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("class", &class_key::<T>())
            .field("addr", &format_args!("{:#x}", self.userdata.addr()))
            .finish()
    }
}

impl<T: UserData> FromStack for Ref<T> {
    fn accepts(state: &State, idx: i32) -> bool {
        match state.value_at(idx) {
            Value::Userdata(userdata) => instance_of::<T>(state, &userdata),
            _ => false,
        }
    }

    fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
        let class = class_metatable::<T>(state)?;
        match state.value_at(idx) {
            Value::Userdata(userdata) if derives_from(userdata.metatable(), &class) => {
                Ok(Ref::new(userdata))
            }
            other => Err(BindError::argument(
                idx,
                class_key::<T>(),
                other.type_name(),
            )),
        }
    }
}

impl<T: UserData> IntoStack for Ref<T> {
    fn push_to(self, state: &State) -> BindResult<()> {
        state.push_value(Value::Userdata(self.userdata));
        Ok(())
    }
}

impl<T: UserData> IntoStack for &Ref<T> {
    fn push_to(self, state: &State) -> BindResult<()> {
        state.push_value(Value::Userdata(self.userdata.clone()));
        Ok(())
    }
}

/// A native object passed by value.
///
/// Decoding clones the script's object; encoding moves the value into a new
/// runtime-owned object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Val<T>(pub T);

impl<T> Val<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Val<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Val<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: UserData + Clone> FromStack for Val<T> {
    fn accepts(state: &State, idx: i32) -> bool {
        Ref::<T>::accepts(state, idx)
    }

    fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
        let object = Ref::<T>::from_stack(state, idx)?;
        let value = object.borrow()?.clone();
        Ok(Val(value))
    }
}

impl<T: UserData> IntoStack for Val<T> {
    fn push_to(self, state: &State) -> BindResult<()> {
        push_object(state, self.0).map(drop)
    }
}

/// Nullable handle to a native object.
///
/// `nil`, an absent slot, or (outside strict mode) any other non-userdata
/// value decodes as null. Access goes through the payload type, so a
/// userdata of an unrelated class reads as `None`.
pub struct Ptr<T: UserData> {
    userdata: Option<AnyUserdata>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: UserData> Ptr<T> {
    pub fn null() -> Self {
        Ptr {
            userdata: None,
            _marker: PhantomData,
        }
    }

    pub fn is_null(&self) -> bool {
        self.userdata.is_none()
    }

    pub fn get(&self) -> Option<CellRef<'_, T>> {
        let payload = self.userdata.as_ref()?.try_borrow_payload().ok()?;
        CellRef::filter_map(payload, payload_ref::<T>).ok()
    }

    pub fn get_mut(&self) -> Option<RefMut<'_, T>> {
        let payload = self.userdata.as_ref()?.try_borrow_payload_mut().ok()?;
        RefMut::filter_map(payload, payload_mut::<T>).ok()
    }
}

impl<T: UserData> From<Ref<T>> for Ptr<T> {
    fn from(object: Ref<T>) -> Self {
        Ptr {
            userdata: Some(object.userdata),
            _marker: PhantomData,
        }
    }
}

impl<T: UserData> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        Ptr {
            userdata: self.userdata.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: UserData> Default for Ptr<T> {
    fn default() -> Self {
        Ptr::null()
    }
}

impl<T: UserData> fmt::Debug for Ptr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.userdata {
            Some(userdata) => write!(f, "Ptr({:#x})", userdata.addr()),
            None => f.write_str("Ptr(null)"),
        }
    }
}

impl<T: UserData> FromStack for Ptr<T> {
    fn accepts(state: &State, idx: i32) -> bool {
        state.is_none_or_nil(idx) || Ref::<T>::accepts(state, idx)
    }

    fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
        match state.value_at(idx) {
            Value::Userdata(userdata) => Ok(Ptr {
                userdata: Some(userdata),
                _marker: PhantomData,
            }),
            Value::Nil => Ok(Ptr::null()),
            _ => {
                check_strict(state, idx, false, "userdata")?;
                Ok(Ptr::null())
            }
        }
    }
}

impl<T: UserData> IntoStack for Ptr<T> {
    fn push_to(self, state: &State) -> BindResult<()> {
        match self.userdata {
            Some(userdata) => state.push_value(Value::Userdata(userdata)),
            None => state.push_nil(),
        }
        Ok(())
    }
}
