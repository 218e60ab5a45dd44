//! Tagged runtime values.

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::function::Function;
use crate::table::TableRef;
use crate::userdata::AnyUserdata;

/// Runtime type codes, numbered the way the reference runtime numbers them.
///
/// `None` is reported for stack indices that do not refer to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i8)]
pub enum ValueType {
    None = -1,
    Nil = 0,
    Boolean = 1,
    LightUserdata = 2,
    Number = 3,
    String = 4,
    Table = 5,
    Function = 6,
    Userdata = 7,
}

impl ValueType {
    /// Script-facing name of the type.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::None => "no value",
            ValueType::Nil => "nil",
            ValueType::Boolean => "boolean",
            ValueType::LightUserdata | ValueType::Userdata => "userdata",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Table => "table",
            ValueType::Function => "function",
        }
    }
}

bitflags! {
    /// A set of [`ValueType`]s, used for slot type checks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeMask: u16 {
        const NONE = 1 << 0;
        const NIL = 1 << 1;
        const BOOLEAN = 1 << 2;
        const LIGHT_USERDATA = 1 << 3;
        const NUMBER = 1 << 4;
        const STRING = 1 << 5;
        const TABLE = 1 << 6;
        const FUNCTION = 1 << 7;
        const USERDATA = 1 << 8;

        const NONE_OR_NIL = Self::NONE.bits() | Self::NIL.bits();
        const ANY_USERDATA = Self::LIGHT_USERDATA.bits() | Self::USERDATA.bits();
    }
}

impl From<ValueType> for TypeMask {
    fn from(ty: ValueType) -> Self {
        match ty {
            ValueType::None => TypeMask::NONE,
            ValueType::Nil => TypeMask::NIL,
            ValueType::Boolean => TypeMask::BOOLEAN,
            ValueType::LightUserdata => TypeMask::LIGHT_USERDATA,
            ValueType::Number => TypeMask::NUMBER,
            ValueType::String => TypeMask::STRING,
            ValueType::Table => TypeMask::TABLE,
            ValueType::Function => TypeMask::FUNCTION,
            ValueType::Userdata => TypeMask::USERDATA,
        }
    }
}

/// A runtime value.
///
/// Integers and floats share the `number` type; integers are kept separately
/// so 64-bit values survive a trip through the runtime unchanged. Reference
/// variants compare by identity.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(Rc<str>),
    Table(TableRef),
    Function(Function),
    Userdata(AnyUserdata),
    LightUserdata(usize),
}

impl Value {
    pub fn type_of(&self) -> ValueType {
        match self {
            Value::Nil => ValueType::Nil,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Integer(_) | Value::Number(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Table(_) => ValueType::Table,
            Value::Function(_) => ValueType::Function,
            Value::Userdata(_) => ValueType::Userdata,
            Value::LightUserdata(_) => ValueType::LightUserdata,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_of().name()
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Truthiness: only `nil` and `false` are false.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    /// Integer view, converting floats with an exact integral value and numeric strings.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Number(n) => float_to_integer(*n),
            Value::String(s) => parse_number(s).and_then(|v| v.as_integer()),
            _ => None,
        }
    }

    /// Float view, converting integers and numeric strings.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            Value::String(s) => parse_number(s).and_then(|v| v.as_number()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_userdata(&self) -> Option<&AnyUserdata> {
        match self {
            Value::Userdata(u) => Some(u),
            _ => None,
        }
    }

    /// Metatable of a table or full userdata.
    pub fn metatable(&self) -> Option<TableRef> {
        match self {
            Value::Table(t) => t.metatable(),
            Value::Userdata(u) => u.metatable(),
            _ => None,
        }
    }

    /// Identity comparison that ignores metamethods.
    pub fn raw_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                (*a as f64) == *b && float_to_integer(*b) == Some(*a)
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Userdata(a), Value::Userdata(b)) => a.ptr_eq(b),
            (Value::LightUserdata(a), Value::LightUserdata(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equal(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Table(t) => write!(f, "table: {:#x}", t.addr()),
            Value::Function(func) => write!(f, "function '{}': {:#x}", func.name(), func.addr()),
            Value::Userdata(u) => write!(f, "userdata: {:#x}", u.addr()),
            Value::LightUserdata(p) => write!(f, "lightuserdata: {p:#x}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Number(n) => f.write_str(&format_number(*n)),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

impl From<Function> for Value {
    fn from(func: Function) -> Self {
        Value::Function(func)
    }
}

impl From<AnyUserdata> for Value {
    fn from(u: AnyUserdata) -> Self {
        Value::Userdata(u)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Nil)
    }
}

/// Exact integral value of `n`, if any.
pub(crate) fn float_to_integer(n: f64) -> Option<i64> {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Some(n as i64)
    } else {
        None
    }
}

/// Parse a numeric string the way the runtime's string-to-number coercion does.
pub(crate) fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        let v = u64::from_str_radix(hex, 16).ok()? as i64;
        return Some(Value::Integer(if negative { v.wrapping_neg() } else { v }));
    }
    if s.bytes()
        .any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E')
    {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    s.parse::<f64>().ok().map(Value::Number)
}

/// `%.14g`-style rendering used when numbers are coerced to strings.
pub(crate) fn format_number(n: f64) -> String {
    if let Some(i) = float_to_integer(n) {
        if n.abs() < 1e15 {
            return format!("{i}.0");
        }
    }
    format!("{n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_round_trip_through_i8() {
        assert_eq!(i8::from(ValueType::Userdata), 7);
        assert_eq!(ValueType::try_from(3i8).unwrap(), ValueType::Number);
        assert_eq!(ValueType::try_from(-1i8).unwrap(), ValueType::None);
        assert!(ValueType::try_from(42i8).is_err());
    }

    #[test]
    fn integers_and_floats_share_number_type() {
        assert_eq!(Value::Integer(1).type_of(), ValueType::Number);
        assert_eq!(Value::Number(1.5).type_of(), ValueType::Number);
        assert_eq!(Value::from("x").type_name(), "string");
    }

    #[test]
    fn numeric_coercions() {
        assert_eq!(Value::Number(3.0).as_integer(), Some(3));
        assert_eq!(Value::Number(3.5).as_integer(), None);
        assert_eq!(Value::from("42").as_integer(), Some(42));
        assert_eq!(Value::from("0x10").as_integer(), Some(16));
        assert_eq!(Value::from(" 2.5 ").as_number(), Some(2.5));
        assert_eq!(Value::from("abc").as_number(), None);
        assert_eq!(Value::Boolean(true).as_integer(), None);
    }

    #[test]
    fn raw_equality_mixes_integer_and_float() {
        assert_eq!(Value::Integer(2), Value::Number(2.0));
        assert_ne!(Value::Integer(2), Value::Number(2.5));
        assert_ne!(Value::from("2"), Value::Integer(2));
    }

    #[test]
    fn tables_compare_by_identity() {
        let a = TableRef::new();
        let b = TableRef::new();
        assert_eq!(Value::Table(a.clone()), Value::Table(a));
        assert_ne!(Value::Table(b), Value::Table(TableRef::new()));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::from("").is_truthy());
    }

    #[test]
    fn masks_from_types() {
        let mask = TypeMask::from(ValueType::Nil) | TypeMask::from(ValueType::None);
        assert_eq!(mask, TypeMask::NONE_OR_NIL);
        assert!(TypeMask::ANY_USERDATA.contains(TypeMask::USERDATA));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(10.0), "10.0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(Value::Integer(10).to_string(), "10");
    }
}
