//! Native object storage.
//!
//! Bound objects live inside runtime userdata as a [`Stored`] payload, which
//! boxes the object behind the [`UserData`] trait. The trait's `parent`
//! accessors describe single inheritance: a derived class embeds its base
//! and hands it out, so a method registered on the base class can resolve
//! its receiver from a derived instance.

use std::any::Any;

/// Upcast helper, implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A native type that can be bound as a class.
///
/// Implement `parent` / `parent_mut` for a class registered with a parent,
/// returning the embedded base object.
///
/// ```
/// use lunabind::UserData;
///
/// struct Base {
///     ten: i32,
/// }
/// impl UserData for Base {}
///
/// struct Derived {
///     base: Base,
/// }
/// impl UserData for Derived {
///     fn parent(&self) -> Option<&dyn UserData> {
///         Some(&self.base)
///     }
///     fn parent_mut(&mut self) -> Option<&mut dyn UserData> {
///         Some(&mut self.base)
///     }
/// }
/// ```
///
/// Primitives are not classes; asking for a reference to one does not compile:
///
/// ```compile_fail
/// use lunabind::Ref;
/// fn takes(_: Ref<i32>) {}
/// ```
pub trait UserData: AsAny {
    fn parent(&self) -> Option<&dyn UserData> {
        None
    }

    fn parent_mut(&mut self) -> Option<&mut dyn UserData> {
        None
    }
}

/// Payload placed in a runtime userdata slot.
pub(crate) struct Stored(pub(crate) Box<dyn UserData>);

impl Stored {
    pub(crate) fn new<T: UserData>(value: T) -> Self {
        Stored(Box::new(value))
    }
}

/// Find `T` in `object` or along its parent chain.
pub(crate) fn resolve<T: Any>(object: &dyn UserData) -> Option<&T> {
    if let Some(found) = (*object).as_any().downcast_ref::<T>() {
        return Some(found);
    }
    resolve::<T>(object.parent()?)
}

pub(crate) fn resolve_mut<T: Any>(object: &mut dyn UserData) -> Option<&mut T> {
    if (*object).as_any().is::<T>() {
        return (*object).as_any_mut().downcast_mut::<T>();
    }
    resolve_mut::<T>(object.parent_mut()?)
}

/// Resolve `T` inside a userdata payload.
pub(crate) fn payload_ref<T: Any>(payload: &Option<Box<dyn Any>>) -> Option<&T> {
    let stored = payload.as_ref()?.downcast_ref::<Stored>()?;
    resolve::<T>(&*stored.0)
}

pub(crate) fn payload_mut<T: Any>(payload: &mut Option<Box<dyn Any>>) -> Option<&mut T> {
    let stored = payload.as_mut()?.downcast_mut::<Stored>()?;
    resolve_mut::<T>(&mut *stored.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base {
        ten: i32,
    }
    impl UserData for Base {}

    struct Derived {
        base: Base,
        seven: i32,
    }
    impl UserData for Derived {
        fn parent(&self) -> Option<&dyn UserData> {
            Some(&self.base)
        }
        fn parent_mut(&mut self) -> Option<&mut dyn UserData> {
            Some(&mut self.base)
        }
    }

    struct Unrelated;
    impl UserData for Unrelated {}

    #[test]
    fn resolves_exact_type() {
        let derived = Derived {
            base: Base { ten: 10 },
            seven: 7,
        };
        assert_eq!(resolve::<Derived>(&derived).map(|d| d.seven), Some(7));
    }

    #[test]
    fn resolves_through_parent() {
        let mut derived = Derived {
            base: Base { ten: 10 },
            seven: 7,
        };
        assert_eq!(resolve::<Base>(&derived).map(|b| b.ten), Some(10));
        resolve_mut::<Base>(&mut derived).unwrap().ten = 8;
        assert_eq!(derived.base.ten, 8);
    }

    #[test]
    fn resolves_mutably_through_a_trait_object() {
        let mut boxed: Box<dyn UserData> = Box::new(Derived {
            base: Base { ten: 10 },
            seven: 7,
        });
        resolve_mut::<Derived>(&mut *boxed).unwrap().seven = 6;
        resolve_mut::<Base>(&mut *boxed).unwrap().ten = 11;
        assert!(resolve_mut::<Unrelated>(&mut *boxed).is_none());
        assert_eq!(resolve::<Derived>(&*boxed).map(|d| (d.seven, d.base.ten)), Some((6, 11)));
    }

    #[test]
    fn unrelated_type_does_not_resolve() {
        let base = Base { ten: 1 };
        assert!(resolve::<Unrelated>(&base).is_none());
        assert!(resolve::<Derived>(&base).is_none());
    }

    #[test]
    fn payload_helpers() {
        let mut payload: Option<Box<dyn Any>> = Some(Box::new(Stored::new(Derived {
            base: Base { ten: 10 },
            seven: 7,
        })));
        assert_eq!(payload_ref::<Base>(&payload).map(|b| b.ten), Some(10));
        payload_mut::<Derived>(&mut payload).unwrap().seven = 9;
        assert_eq!(payload_ref::<Derived>(&payload).map(|d| d.seven), Some(9));

        let empty: Option<Box<dyn Any>> = None;
        assert!(payload_ref::<Base>(&empty).is_none());
        let foreign: Option<Box<dyn Any>> = Some(Box::new(5u32));
        assert!(payload_ref::<u32>(&foreign).is_none());
    }
}
