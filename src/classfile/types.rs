//! JVM value types as seen by the lowering rules.

use once_cell::sync::Lazy;
use std::fmt;

use crate::consts;

/// A concrete JVM type.
///
/// Reference types carry the internal form of the class name
/// (`java/lang/String`); array types nest their element type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Reference(String),
    Array(Box<Type>),
}

static OBJECT: Lazy<Type> = Lazy::new(|| Type::Reference(consts::JAVA_LANG_OBJECT.to_string()));
static STRING: Lazy<Type> = Lazy::new(|| Type::Reference(consts::JAVA_LANG_STRING.to_string()));
static CLASS: Lazy<Type> = Lazy::new(|| Type::Reference(consts::JAVA_LANG_CLASS.to_string()));
static THROWABLE: Lazy<Type> =
    Lazy::new(|| Type::Reference(consts::JAVA_LANG_THROWABLE.to_string()));
static ASSERTION_ERROR: Lazy<Type> =
    Lazy::new(|| Type::Reference(consts::JAVA_LANG_ASSERTION_ERROR.to_string()));

impl Type {
    pub fn object() -> &'static Type {
        &OBJECT
    }

    pub fn string() -> &'static Type {
        &STRING
    }

    pub fn class() -> &'static Type {
        &CLASS
    }

    pub fn throwable() -> &'static Type {
        &THROWABLE
    }

    pub fn assertion_error() -> &'static Type {
        &ASSERTION_ERROR
    }

    /// Array type with `self` as the element type.
    pub fn array_of(self) -> Type {
        Type::Array(Box::new(self))
    }

    /// Stack width in slots (JVMS 2.6.2: long and double take two).
    pub fn width(&self) -> u16 {
        match self {
            Type::Long | Type::Double => 2,
            _ => 1,
        }
    }

    /// Computational category: 1 for single-slot values, 2 for long/double.
    pub fn category(&self) -> u8 {
        self.width() as u8
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Reference(_) | Type::Array(_))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, Type::Boolean)
    }

    /// Primitives that widen to int on the operand stack (JVMS 2.11.1).
    pub fn is_sub_int(&self) -> bool {
        matches!(self, Type::Boolean | Type::Byte | Type::Char | Type::Short)
    }

    /// Collapse this type to the representation used for anonymous slot
    /// identities: sub-int primitives become int, every reference and array
    /// type becomes `java/lang/Object`. Declared locals and parameters never
    /// go through this.
    pub fn normalized(&self) -> Type {
        match self {
            Type::Boolean | Type::Byte | Type::Char | Type::Short | Type::Int => Type::Int,
            Type::Long => Type::Long,
            Type::Float => Type::Float,
            Type::Double => Type::Double,
            Type::Reference(_) | Type::Array(_) => Type::object().clone(),
        }
    }

    /// Single-character tag naming the normalized slot kind, used when
    /// building variable identities.
    pub fn normalized_tag(&self) -> char {
        match self.normalized() {
            Type::Int => 'I',
            Type::Long => 'J',
            Type::Float => 'F',
            Type::Double => 'D',
            _ => 'L',
        }
    }

    /// Render as a field descriptor (JVMS 4.3.2).
    pub fn descriptor(&self) -> String {
        match self {
            Type::Boolean => "Z".to_string(),
            Type::Byte => "B".to_string(),
            Type::Char => "C".to_string(),
            Type::Short => "S".to_string(),
            Type::Int => "I".to_string(),
            Type::Long => "J".to_string(),
            Type::Float => "F".to_string(),
            Type::Double => "D".to_string(),
            Type::Reference(name) => format!("L{};", name),
            Type::Array(elem) => format!("[{}", elem.descriptor()),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Boolean => write!(f, "boolean"),
            Type::Byte => write!(f, "byte"),
            Type::Char => write!(f, "char"),
            Type::Short => write!(f, "short"),
            Type::Int => write!(f, "int"),
            Type::Long => write!(f, "long"),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::Reference(name) => write!(f, "{}", name),
            Type::Array(elem) => write!(f, "{}[]", elem),
        }
    }
}
