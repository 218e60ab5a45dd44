//! Conversion between stack slots and native values.
//!
//! - [`FromStack`]: decode a native value from a stack slot
//! - [`IntoStack`]: push a native value onto the stack
//! - [`FromStackMulti`] / [`IntoStackMulti`]: the same for argument tuples
//!
//! ## Primitive decoding
//!
//! Primitives and strings read through the runtime's coercing accessors:
//! numeric strings convert to numbers, floats truncate to integers, and a
//! slot that cannot be converted reads as `0`, `0.0`, `false` or `""`.
//! Unsigned integers reinterpret the integer bits, so the full `u64` range
//! survives a round trip. With
//! [`BindConfig::strict_arguments`](crate::BindConfig::strict_arguments)
//! a mismatched slot is reported as [`BindError::ArgumentType`] instead.
//!
//! ## Optional values
//!
//! `Option<T>` runs `T`'s type test and yields `None` instead of failing.
//! Absent trailing arguments therefore decode as `None`.
//!
//! ```
//! use lunabind::{FromStack, IntoStack};
//! use lunabind_core::State;
//!
//! let state = State::new();
//! 42i32.push_to(&state).unwrap();
//! assert_eq!(i32::from_stack(&state, 1).unwrap(), 42);
//! assert_eq!(Option::<i32>::from_stack(&state, 2).unwrap(), None);
//! ```

use std::any::Any;

use lunabind_core::{Function, State, TableRef, Value};

use crate::config::BindConfig;
use crate::error::{BindError, BindResult};
use crate::userdata::payload_mut;

/// Decode a native value from a stack slot.
pub trait FromStack: Sized {
    /// Number of results a callable returning `Self` produces.
    const RESULTS: i32 = 1;

    /// Type test: whether the slot holds something decodable as `Self`.
    fn accepts(state: &State, idx: i32) -> bool;

    fn from_stack(state: &State, idx: i32) -> BindResult<Self>;
}

/// Push a native value onto the stack.
pub trait IntoStack {
    fn push_to(self, state: &State) -> BindResult<()>;
}

/// Decode consecutive slots into a tuple.
pub trait FromStackMulti: Sized {
    fn from_stack_multi(state: &State, start: i32) -> BindResult<Self>;
}

/// Push every element of a tuple, returning how many values were pushed.
pub trait IntoStackMulti {
    fn push_all(self, state: &State) -> BindResult<i32>;
}

/// In strict mode, turn a failed type test into an argument error.
pub(crate) fn check_strict(
    state: &State,
    idx: i32,
    accepted: bool,
    expected: &'static str,
) -> BindResult<()> {
    if accepted || !BindConfig::current(state).strict_arguments {
        return Ok(());
    }
    Err(BindError::argument(idx, expected, state.type_at(idx).name()))
}

macro_rules! impl_integer {
    ($($ty:ty),*) => {
        $(
            impl FromStack for $ty {
                fn accepts(state: &State, idx: i32) -> bool {
                    state.is_number(idx)
                }

                fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
                    check_strict(state, idx, Self::accepts(state, idx), "number")?;
                    Ok(state.to_integer(idx) as $ty)
                }
            }

            impl IntoStack for $ty {
                fn push_to(self, state: &State) -> BindResult<()> {
                    state.push_integer(self as i64);
                    Ok(())
                }
            }
        )*
    };
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! impl_float {
    ($($ty:ty),*) => {
        $(
            impl FromStack for $ty {
                fn accepts(state: &State, idx: i32) -> bool {
                    state.is_number(idx)
                }

                fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
                    check_strict(state, idx, Self::accepts(state, idx), "number")?;
                    Ok(state.to_number(idx) as $ty)
                }
            }

            impl IntoStack for $ty {
                fn push_to(self, state: &State) -> BindResult<()> {
                    state.push_number(self as f64);
                    Ok(())
                }
            }
        )*
    };
}

impl_float!(f32, f64);

impl FromStack for bool {
    fn accepts(state: &State, idx: i32) -> bool {
        state.is_boolean(idx)
    }

    fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
        check_strict(state, idx, Self::accepts(state, idx), "boolean")?;
        Ok(state.to_boolean(idx))
    }
}

impl IntoStack for bool {
    fn push_to(self, state: &State) -> BindResult<()> {
        state.push_bool(self);
        Ok(())
    }
}

impl FromStack for String {
    fn accepts(state: &State, idx: i32) -> bool {
        state.is_string(idx)
    }

    fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
        check_strict(state, idx, Self::accepts(state, idx), "string")?;
        Ok(state.to_str(idx).unwrap_or_default())
    }
}

impl IntoStack for String {
    fn push_to(self, state: &State) -> BindResult<()> {
        state.push_string(&self);
        Ok(())
    }
}

impl IntoStack for &str {
    fn push_to(self, state: &State) -> BindResult<()> {
        state.push_string(self);
        Ok(())
    }
}

impl IntoStack for &String {
    fn push_to(self, state: &State) -> BindResult<()> {
        state.push_string(self);
        Ok(())
    }
}

/// The unit type produces no value: a callable returning `()` pushes nothing
/// and a callback returning `()` expects no result.
impl FromStack for () {
    const RESULTS: i32 = 0;

    fn accepts(_: &State, _: i32) -> bool {
        true
    }

    fn from_stack(_: &State, _: i32) -> BindResult<Self> {
        Ok(())
    }
}

impl IntoStack for () {
    fn push_to(self, _: &State) -> BindResult<()> {
        Ok(())
    }
}

/// Any runtime value, unconverted.
impl FromStack for Value {
    fn accepts(state: &State, idx: i32) -> bool {
        !state.is_none(idx)
    }

    fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
        Ok(state.value_at(idx))
    }
}

impl IntoStack for Value {
    fn push_to(self, state: &State) -> BindResult<()> {
        state.push_value(self);
        Ok(())
    }
}

impl IntoStack for Function {
    fn push_to(self, state: &State) -> BindResult<()> {
        state.push_function(self);
        Ok(())
    }
}

impl IntoStack for TableRef {
    fn push_to(self, state: &State) -> BindResult<()> {
        state.push_table(self);
        Ok(())
    }
}

/// Explicit `nil`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Nil;

impl FromStack for Nil {
    fn accepts(state: &State, idx: i32) -> bool {
        state.is_none_or_nil(idx)
    }

    fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
        check_strict(state, idx, Self::accepts(state, idx), "nil")?;
        Ok(Nil)
    }
}

impl IntoStack for Nil {
    fn push_to(self, state: &State) -> BindResult<()> {
        state.push_nil();
        Ok(())
    }
}

impl<T: FromStack> FromStack for Option<T> {
    fn accepts(_: &State, _: i32) -> bool {
        true
    }

    fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
        if T::accepts(state, idx) {
            Ok(T::from_stack(state, idx).ok())
        } else {
            Ok(None)
        }
    }
}

impl<T: IntoStack> IntoStack for Option<T> {
    fn push_to(self, state: &State) -> BindResult<()> {
        match self {
            Some(value) => value.push_to(state),
            None => {
                state.push_nil();
                Ok(())
            }
        }
    }
}

/// Address of the native object behind a slot, or null.
fn slot_pointer<T: Any>(state: &State, idx: i32) -> *mut T {
    match state.value_at(idx) {
        Value::LightUserdata(addr) => addr as *mut T,
        Value::Userdata(ud) => match ud.try_borrow_payload_mut() {
            Ok(mut payload) => payload_mut::<T>(&mut payload)
                .map(|object| object as *mut T)
                .unwrap_or(std::ptr::null_mut()),
            Err(_) => std::ptr::null_mut(),
        },
        _ => std::ptr::null_mut(),
    }
}

/// Raw pointer: a light userdata address, or the address of the object
/// stored in a full userdata. Null when the slot holds neither.
impl<T: Any> FromStack for *mut T {
    fn accepts(state: &State, idx: i32) -> bool {
        state.is_userdata(idx)
    }

    fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
        Ok(slot_pointer::<T>(state, idx))
    }
}

impl<T: Any> FromStack for *const T {
    fn accepts(state: &State, idx: i32) -> bool {
        state.is_userdata(idx)
    }

    fn from_stack(state: &State, idx: i32) -> BindResult<Self> {
        Ok(slot_pointer::<T>(state, idx) as *const T)
    }
}

impl<T> IntoStack for *mut T {
    fn push_to(self, state: &State) -> BindResult<()> {
        state.push_light_userdata(self as usize);
        Ok(())
    }
}

impl<T> IntoStack for *const T {
    fn push_to(self, state: &State) -> BindResult<()> {
        state.push_light_userdata(self as usize);
        Ok(())
    }
}

macro_rules! impl_multi {
    ($($ty:ident),*) => {
        impl<$($ty: FromStack),*> FromStackMulti for ($($ty,)*) {
            #[allow(unused_variables, unused_mut, unused_assignments)]
            fn from_stack_multi(state: &State, start: i32) -> BindResult<Self> {
                let mut idx = start;
                Ok(($(
                    {
                        let value = <$ty as FromStack>::from_stack(state, idx)?;
                        idx += 1;
                        value
                    },
                )*))
            }
        }

        impl<$($ty: IntoStack),*> IntoStackMulti for ($($ty,)*) {
            #[allow(non_snake_case, unused_variables, unused_mut)]
            fn push_all(self, state: &State) -> BindResult<i32> {
                let ($($ty,)*) = self;
                let mut count = 0;
                $(
                    $ty.push_to(state)?;
                    count += 1;
                )*
                Ok(count)
            }
        }
    };
}

impl_multi!();
impl_multi!(A1);
impl_multi!(A1, A2);
impl_multi!(A1, A2, A3);
impl_multi!(A1, A2, A3, A4);
impl_multi!(A1, A2, A3, A4, A5);
impl_multi!(A1, A2, A3, A4, A5, A6);
impl_multi!(A1, A2, A3, A4, A5, A6, A7);
impl_multi!(A1, A2, A3, A4, A5, A6, A7, A8);

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T>(value: T) -> T
    where
        T: IntoStack + FromStack,
    {
        let state = State::new();
        value.push_to(&state).unwrap();
        T::from_stack(&state, -1).unwrap()
    }

    #[test]
    fn integer_round_trips() {
        assert_eq!(round_trip(0i32), 0);
        assert_eq!(round_trip(-17i32), -17);
        assert_eq!(round_trip(i32::MAX), i32::MAX);
        assert_eq!(round_trip(i32::MIN), i32::MIN);
        assert_eq!(round_trip(u32::MAX), u32::MAX);
        assert_eq!(round_trip(i64::MAX), i64::MAX);
        assert_eq!(round_trip(i64::MIN), i64::MIN);
        assert_eq!(round_trip(u64::MAX), u64::MAX);
        assert_eq!(round_trip(u8::MAX), u8::MAX);
    }

    #[test]
    fn float_and_bool_round_trips() {
        assert_eq!(round_trip(0.0f64), 0.0);
        assert_eq!(round_trip(-2.5f64), -2.5);
        assert_eq!(round_trip(1.5f32), 1.5);
        assert_eq!(round_trip(f64::MAX), f64::MAX);
        assert_eq!(round_trip(f64::MIN), f64::MIN);
        assert_eq!(round_trip(f32::MAX), f32::MAX);
        assert_eq!(round_trip(f32::MIN_POSITIVE), f32::MIN_POSITIVE);
        assert!(round_trip(true));
        assert!(!round_trip(false));
    }

    #[test]
    fn string_round_trips() {
        assert_eq!(round_trip(String::new()), "");
        assert_eq!(round_trip(String::from("Dummy")), "Dummy");
    }

    #[test]
    fn permissive_defaults() {
        let state = State::new();
        state.new_table();
        assert_eq!(i32::from_stack(&state, 1).unwrap(), 0);
        assert_eq!(f64::from_stack(&state, 1).unwrap(), 0.0);
        assert_eq!(String::from_stack(&state, 1).unwrap(), "");
        assert!(bool::from_stack(&state, 1).unwrap());
        assert!(!bool::from_stack(&state, 2).unwrap());
    }

    #[test]
    fn numeric_strings_coerce() {
        let state = State::new();
        state.push_string("12");
        state.push_number(7.9);
        assert_eq!(i32::from_stack(&state, 1).unwrap(), 12);
        assert_eq!(i32::from_stack(&state, 2).unwrap(), 7);
        assert_eq!(String::from_stack(&state, 2).unwrap(), "7.9");
    }

    #[test]
    fn strict_mode_rejects_mismatch() {
        let state = State::new();
        BindConfig::default().with_strict_arguments(true).install(&state);
        state.new_table();
        let err = i32::from_stack(&state, 1).unwrap_err();
        assert!(matches!(
            err,
            BindError::ArgumentType { index: 1, found: "table", .. }
        ));
        assert!(String::from_stack(&state, 2).is_err());
    }

    #[test]
    fn option_absence() {
        let state = State::new();
        state.push_integer(9);
        state.push_string("text");
        assert_eq!(Option::<i32>::from_stack(&state, 1).unwrap(), Some(9));
        assert_eq!(Option::<i32>::from_stack(&state, 2).unwrap(), None);
        assert_eq!(Option::<i32>::from_stack(&state, 3).unwrap(), None);
        assert_eq!(Option::<bool>::from_stack(&state, 1).unwrap(), None);
    }

    #[test]
    fn option_encodes_nil() {
        let state = State::new();
        Option::<i32>::None.push_to(&state).unwrap();
        Some(3i32).push_to(&state).unwrap();
        assert!(state.is_nil(1));
        assert_eq!(state.to_integer(2), 3);
    }

    #[test]
    fn unit_pushes_nothing() {
        let state = State::new();
        ().push_to(&state).unwrap();
        assert_eq!(state.get_top(), 0);
        assert_eq!(<() as FromStack>::RESULTS, 0);
        assert_eq!(<i32 as FromStack>::RESULTS, 1);
    }

    #[test]
    fn nil_marker() {
        let state = State::new();
        Nil.push_to(&state).unwrap();
        assert!(Nil::accepts(&state, 1));
        assert!(Nil::accepts(&state, 2));
        assert_eq!(Nil::from_stack(&state, 1).unwrap(), Nil);
    }

    #[test]
    fn raw_pointers_use_light_userdata() {
        let state = State::new();
        let mut target = 5u32;
        let ptr: *mut u32 = &mut target;
        ptr.push_to(&state).unwrap();
        let back = <*mut u32>::from_stack(&state, 1).unwrap();
        assert_eq!(back, ptr);
        state.push_integer(1);
        assert!(<*const u32>::from_stack(&state, 2).unwrap().is_null());
    }

    #[test]
    fn tuples() {
        let state = State::new();
        let pushed = (1i32, "two", 3.5f64).push_all(&state).unwrap();
        assert_eq!(pushed, 3);
        let (a, b, c) = <(i32, String, f64)>::from_stack_multi(&state, 1).unwrap();
        assert_eq!((a, b.as_str(), c), (1, "two", 3.5));
        assert_eq!(().push_all(&state).unwrap(), 0);
    }
}
