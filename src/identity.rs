//! Class identity.
//!
//! Every bound class has two identities:
//!
//! - a **class key**, the native type name with every non-alphabetic
//!   character removed, under which the class metatable lives in the
//!   registry;
//! - a [`TypeHash`], a 64-bit hash of the class key used for map lookups.
//!
//! Parent classes are referenced by [`ClassPath`], either a bare class name
//! (same module) or `"Module.Class"`.
//!
//! ```
//! use lunabind::{ClassPath, TypeHash, class_key};
//!
//! struct Widget;
//! assert!(class_key::<Widget>().ends_with("Widget"));
//! assert_eq!(TypeHash::of::<Widget>(), TypeHash::from_key(&class_key::<Widget>()));
//!
//! let parent = ClassPath::parse("Module2.BaseModule");
//! assert_eq!(parent.module.as_deref(), Some("Module2"));
//! assert_eq!(parent.class, "BaseModule");
//! ```

use std::fmt;

use xxhash_rust::xxh64::xxh64;

/// Domain marker mixed into class hashes.
const CLASS_DOMAIN: u64 = 0x2fac10b63a6cc57c;

/// Registry key for `T`'s class metatable.
pub fn class_key<T: ?Sized>() -> String {
    std::any::type_name::<T>()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect()
}

/// Deterministic hash of a class key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    #[inline]
    pub fn from_key(key: &str) -> Self {
        TypeHash(CLASS_DOMAIN ^ xxh64(key.as_bytes(), 0))
    }

    #[inline]
    pub fn of<T: ?Sized>() -> Self {
        Self::from_key(&class_key::<T>())
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

/// Reference to a class by name, optionally qualified by its module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassPath {
    pub module: Option<String>,
    pub class: String,
}

impl ClassPath {
    /// Split `"Module.Class"` on its last dot; a bare name has no module.
    pub fn parse(path: &str) -> Self {
        match path.rsplit_once('.') {
            Some((module, class)) if !module.is_empty() => ClassPath {
                module: Some(module.to_string()),
                class: class.to_string(),
            },
            _ => ClassPath {
                module: None,
                class: path.trim_start_matches('.').to_string(),
            },
        }
    }

    /// Fully qualified name, resolving a bare name against `current_module`.
    pub fn qualified(&self, current_module: &str) -> String {
        format!(
            "{}.{}",
            self.module.as_deref().unwrap_or(current_module),
            self.class
        )
    }

    /// Whether the class lives in a module other than `current_module`.
    pub fn is_foreign(&self, current_module: &str) -> bool {
        self.module
            .as_deref()
            .is_some_and(|module| module != current_module)
    }
}

impl fmt::Display for ClassPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{module}.{}", self.class),
            None => f.write_str(&self.class),
        }
    }
}
