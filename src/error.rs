//! Error types for the binding layer.

use lunabind_core::RuntimeError;
use thiserror::Error;

/// Errors raised while binding, decoding or dispatching.
///
/// A `BindError` returned from a host function travels through the runtime
/// as [`RuntimeError::External`]; [`BindError::from_runtime`] recovers it on
/// the other side of a call.
#[derive(Debug, Error)]
pub enum BindError {
    /// A stack slot could not be decoded as the requested type.
    #[error("bad argument #{index}: {expected} expected, got {found}")]
    ArgumentType {
        index: i32,
        expected: String,
        found: &'static str,
    },

    /// The receiver of a method call is not an instance of the method's class.
    #[error("calling '{method}' on bad self: {class} expected, got {found}")]
    InvalidReceiver {
        method: String,
        class: String,
        found: &'static str,
    },

    /// The native object is already borrowed in a conflicting way.
    #[error("object of class {class} is already borrowed")]
    ObjectBorrowed { class: String },

    /// The native object was destroyed or never constructed.
    #[error("object of class {class} has been destroyed")]
    ObjectDestroyed { class: String },

    /// The object passes the class check for `class` but its native value
    /// does not hand out an embedded `class` through `UserData::parent`.
    #[error("object does not expose its {class} base; implement UserData::parent for the derived type")]
    BaseNotReachable { class: String },

    /// Member lookup walked the whole prototype chain without a match.
    #[error("the object does not have the requested member '{member}'")]
    MissingMember { member: String },

    /// Assignment hit a member that is not an attribute hook.
    #[error("member '{member}' is not writable")]
    NotWritable { member: String },

    /// A class was used before it was registered.
    #[error("class {class} is not registered")]
    ClassNotRegistered { class: String },

    /// A parent class reference could not be resolved.
    #[error("unknown parent class '{parent}'")]
    UnknownParent { parent: String },

    /// The class was registered without a constructor.
    #[error("class {class} has no constructor")]
    NoConstructor { class: String },

    /// A dotted table path crossed a value that is not a table.
    #[error("'{segment}' in path '{path}' is not a table")]
    PathNotTable { path: String, segment: String },

    /// The runtime a handle belongs to has been closed or dropped.
    #[error("the runtime state has been closed")]
    StateClosed,

    /// An error raised by the runtime itself.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl BindError {
    /// Convert a runtime error, unwrapping a `BindError` that travelled
    /// through the runtime as [`RuntimeError::External`].
    pub fn from_runtime(err: RuntimeError) -> Self {
        match err.downcast_external::<BindError>() {
            Ok(bind) => bind,
            Err(other) => BindError::Runtime(other),
        }
    }

    pub(crate) fn argument(index: i32, expected: impl Into<String>, found: &'static str) -> Self {
        BindError::ArgumentType {
            index,
            expected: expected.into(),
            found,
        }
    }
}

impl From<BindError> for RuntimeError {
    fn from(err: BindError) -> Self {
        match err {
            BindError::Runtime(inner) => inner,
            other => RuntimeError::external(other),
        }
    }
}

/// Result alias used throughout the crate.
pub type BindResult<T> = Result<T, BindError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_survives_runtime_round_trip() {
        let err: RuntimeError = BindError::MissingMember {
            member: "foo".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "the object does not have the requested member 'foo'"
        );
        let back = BindError::from_runtime(err);
        assert!(matches!(back, BindError::MissingMember { member } if member == "foo"));
    }

    #[test]
    fn runtime_errors_are_not_double_wrapped() {
        let err: RuntimeError = BindError::Runtime(RuntimeError::message("inner")).into();
        assert!(matches!(err, RuntimeError::Message(ref m) if m == "inner"));
    }

    #[test]
    fn plain_runtime_error_maps_to_runtime_variant() {
        let back = BindError::from_runtime(RuntimeError::ModuleNotFound("X".into()));
        assert!(matches!(
            back,
            BindError::Runtime(RuntimeError::ModuleNotFound(_))
        ));
    }

    #[test]
    fn argument_error_message() {
        let err = BindError::argument(2, "number", "table");
        assert_eq!(err.to_string(), "bad argument #2: number expected, got table");
    }
}
