//! Call dispatch: turning native functions into runtime functions.
//!
//! The traits here are implemented for every `Fn` of up to eight
//! parameters. The marker type parameter encodes the receiver kind, the
//! parameter list and the return type, so registration takes only the
//! function path and the signature is deduced:
//!
//! ```ignore
//! builder.function("add", add);                 // IntoFunction<fn(i32, i32) -> i32>
//! members.method("name", Widget::name);         // IntoMethod<Widget, (Shared, fn() -> String)>
//! members.method("resize", Widget::resize);     // IntoMethod<Widget, (Exclusive, fn(u32) -> ())>
//! ```
//!
//! Every generated thunk follows the same protocol: decode the arguments
//! left to right starting at a fixed slot, trim the frame down to the slot
//! just below the first argument, call the native function and push its
//! result. The thunk hands back at most one value: the result, or, for a
//! function returning `()`, whatever is left at the top of the trimmed frame
//! (the receiver or the placeholder).

use lunabind_core::{Function, RuntimeError, State};

use crate::codec::{FromStack, FromStackMulti, IntoStack};
use crate::error::{BindError, BindResult};
use crate::identity::class_key;
use crate::object::Ref;
use crate::userdata::UserData;

/// Marker for methods taking `&mut self`.
pub struct Exclusive;

/// Marker for methods taking `&self`.
pub struct Shared;

/// A native function callable from scripts.
pub trait IntoFunction<Marker>: 'static {
    /// Build the thunk. Arguments are read from slot `start` onwards.
    fn into_function(self, name: &str, start: i32) -> Function;
}

/// A native method of class `T`.
pub trait IntoMethod<T, Marker>: 'static {
    /// Build the thunk. The receiver is read from slot 1, arguments from
    /// slot 2 onwards.
    fn into_method(self, name: &str) -> Function;
}

/// A native constructor of class `T`.
pub trait IntoConstructor<T, Marker>: 'static {
    /// Build the `__call` hook of a constructor table. Slot 1 holds the
    /// constructor table itself; arguments are read from slot 2 onwards.
    fn into_constructor(self, name: &str) -> Function;
}

/// Push `result` and report how many values the thunk returns.
#[inline]
fn finish<R: IntoStack>(state: &State, result: R) -> Result<usize, RuntimeError> {
    result.push_to(state)?;
    Ok(state.get_top().min(1) as usize)
}

/// Resolve the receiver in slot 1.
pub(crate) fn receiver<T: UserData>(state: &State, method: &str) -> BindResult<Ref<T>> {
    if Ref::<T>::accepts(state, 1) {
        return Ref::from_stack(state, 1);
    }
    Err(BindError::InvalidReceiver {
        method: method.to_string(),
        class: class_key::<T>(),
        found: state.type_at(1).name(),
    })
}

impl<F, R> IntoFunction<fn() -> R> for F
where
    F: Fn() -> R + 'static,
    R: IntoStack,
{
    fn into_function(self, name: &str, start: i32) -> Function {
        Function::new(name, move |state| {
            #[cfg(feature = "profiling")]
            profiling::scope!("lunabind::function");
            state.set_top(start - 1)?;
            finish(state, (self)())
        })
    }
}

macro_rules! impl_into_function {
    ($($arg:ident),+) => {
        impl<F, R, $($arg),+> IntoFunction<fn($($arg),+) -> R> for F
        where
            F: Fn($($arg),+) -> R + 'static,
            R: IntoStack,
            $($arg: FromStack,)+
        {
            #[allow(non_snake_case)]
            fn into_function(self, name: &str, start: i32) -> Function {
                Function::new(name, move |state| {
                    #[cfg(feature = "profiling")]
                    profiling::scope!("lunabind::function");
                    let ($($arg,)+) = <($($arg,)+)>::from_stack_multi(state, start)?;
                    state.set_top(start - 1)?;
                    finish(state, (self)($($arg),+))
                })
            }
        }
    };
}

impl_into_function!(A1);
impl_into_function!(A1, A2);
impl_into_function!(A1, A2, A3);
impl_into_function!(A1, A2, A3, A4);
impl_into_function!(A1, A2, A3, A4, A5);
impl_into_function!(A1, A2, A3, A4, A5, A6);
impl_into_function!(A1, A2, A3, A4, A5, A6, A7);
impl_into_function!(A1, A2, A3, A4, A5, A6, A7, A8);

macro_rules! impl_into_method {
    ($($arg:ident),*) => {
        impl<T, F, R, $($arg),*> IntoMethod<T, (Exclusive, fn($($arg),*) -> R)> for F
        where
            T: UserData,
            F: Fn(&mut T, $($arg),*) -> R + 'static,
            R: IntoStack,
            $($arg: FromStack,)*
        {
            #[allow(non_snake_case)]
            fn into_method(self, name: &str) -> Function {
                let method = name.to_string();
                Function::new(name, move |state| {
                    #[cfg(feature = "profiling")]
                    profiling::scope!("lunabind::method");
                    let object = receiver::<T>(state, &method)?;
                    let ($($arg,)*) = <($($arg,)*)>::from_stack_multi(state, 2)?;
                    state.set_top(1)?;
                    let result = {
                        let mut guard = object.borrow_mut()?;
                        (self)(&mut *guard, $($arg),*)
                    };
                    finish(state, result)
                })
            }
        }

        impl<T, F, R, $($arg),*> IntoMethod<T, (Shared, fn($($arg),*) -> R)> for F
        where
            T: UserData,
            F: Fn(&T, $($arg),*) -> R + 'static,
            R: IntoStack,
            $($arg: FromStack,)*
        {
            #[allow(non_snake_case)]
            fn into_method(self, name: &str) -> Function {
                let method = name.to_string();
                Function::new(name, move |state| {
                    #[cfg(feature = "profiling")]
                    profiling::scope!("lunabind::method");
                    let object = receiver::<T>(state, &method)?;
                    let ($($arg,)*) = <($($arg,)*)>::from_stack_multi(state, 2)?;
                    state.set_top(1)?;
                    let result = {
                        let guard = object.borrow()?;
                        (self)(&*guard, $($arg),*)
                    };
                    finish(state, result)
                })
            }
        }
    };
}

impl_into_method!();
impl_into_method!(A1);
impl_into_method!(A1, A2);
impl_into_method!(A1, A2, A3);
impl_into_method!(A1, A2, A3, A4);
impl_into_method!(A1, A2, A3, A4, A5);
impl_into_method!(A1, A2, A3, A4, A5, A6);
impl_into_method!(A1, A2, A3, A4, A5, A6, A7);
impl_into_method!(A1, A2, A3, A4, A5, A6, A7, A8);

/// Build the thunk of a raw-state method. The native method sees the frame
/// exactly as the script left it, receiver in slot 1.
pub(crate) fn raw_method<T, F, R>(name: &str, f: F) -> Function
where
    T: UserData,
    F: Fn(&mut T, &State) -> R + 'static,
    R: IntoStack,
{
    let method = name.to_string();
    Function::new(name, move |state| {
        let object = receiver::<T>(state, &method)?;
        let result = {
            let mut guard = object.borrow_mut()?;
            f(&mut *guard, state)
        };
        let before = state.get_top();
        result.push_to(state)?;
        Ok((state.get_top() - before).max(0) as usize)
    })
}

macro_rules! impl_into_constructor {
    ($($arg:ident),*) => {
        impl<T, F, $($arg),*> IntoConstructor<T, fn($($arg),*) -> T> for F
        where
            T: UserData,
            F: Fn($($arg),*) -> T + 'static,
            $($arg: FromStack,)*
        {
            #[allow(non_snake_case)]
            fn into_constructor(self, name: &str) -> Function {
                Function::new(name, move |state| {
                    #[cfg(feature = "profiling")]
                    profiling::scope!("lunabind::constructor");
                    let ($($arg,)*) = <($($arg,)*)>::from_stack_multi(state, 2)?;
                    state.set_top(1)?;
                    crate::object::push_object(state, (self)($($arg),*))?;
                    Ok(1)
                })
            }
        }
    };
}

impl_into_constructor!();
impl_into_constructor!(A1);
impl_into_constructor!(A1, A2);
impl_into_constructor!(A1, A2, A3);
impl_into_constructor!(A1, A2, A3, A4);
impl_into_constructor!(A1, A2, A3, A4, A5);
impl_into_constructor!(A1, A2, A3, A4, A5, A6);
impl_into_constructor!(A1, A2, A3, A4, A5, A6, A7);
impl_into_constructor!(A1, A2, A3, A4, A5, A6, A7, A8);

#[cfg(test)]
mod tests {
    use lunabind_core::Value;

    use super::*;

    fn sum(a: i32, b: i32) -> i32 {
        a + b
    }

    fn ten() -> i32 {
        10
    }

    #[test]
    fn free_function_from_placeholder_slot() {
        let state = State::new();
        state.push_function(sum.into_function("sum", 2));
        state.push_nil();
        state.push_integer(3);
        state.push_integer(5);
        state.call(3, 1).unwrap();
        assert_eq!(state.value_at(-1), Value::Integer(8));
    }

    #[test]
    fn static_function_from_first_slot() {
        let state = State::new();
        state.push_function(sum.into_function("sum", 1));
        state.push_integer(3);
        state.push_integer(5);
        state.call(2, 1).unwrap();
        assert_eq!(state.to_integer(-1), 8);
    }

    #[test]
    fn zero_arity_ignores_extra_arguments() {
        let state = State::new();
        state.push_function(ten.into_function("ten", 1));
        state.push_string("ignored");
        state.call(1, 1).unwrap();
        assert_eq!(state.to_integer(-1), 10);
    }

    #[test]
    fn unit_return_hands_back_placeholder_or_nothing() {
        let state = State::new();
        state.push_function((|| ()).into_function("noop", 2));
        state.push_string("placeholder");
        state.call(1, lunabind_core::MULTRET).unwrap();
        assert_eq!(state.get_top(), 1);
        assert_eq!(state.to_str(1).as_deref(), Some("placeholder"));

        state.set_top(0).unwrap();
        state.push_function((|| ()).into_function("noop", 1));
        state.call(0, lunabind_core::MULTRET).unwrap();
        assert_eq!(state.get_top(), 0);
    }

    #[test]
    fn closures_are_functions() {
        let state = State::new();
        let offset = 100;
        let add_offset = move |x: i64| x + offset;
        let result = state
            .call_function(
                Value::Function(add_offset.into_function("add_offset", 1)),
                [Value::Integer(1)],
                1,
            )
            .unwrap();
        assert_eq!(result, vec![Value::Integer(101)]);
    }

    #[test]
    fn method_with_wrong_receiver_is_an_error() {
        struct Counter;
        impl UserData for Counter {}
        impl Counter {
            fn get(&self) -> i32 {
                1
            }
        }

        let state = State::new();
        let thunk = IntoMethod::<Counter, _>::into_method(Counter::get, "get");
        let err = state
            .call_function(Value::Function(thunk), [Value::Integer(3)], 1)
            .unwrap_err();
        let err = BindError::from_runtime(err);
        assert!(matches!(
            err,
            BindError::InvalidReceiver { found: "number", .. }
        ));
    }
}
