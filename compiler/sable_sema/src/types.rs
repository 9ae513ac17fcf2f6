//! The Sable type system
//!
//! Everything is unsigned; the widest value is the 16-bit word. Structural
//! equality doubles as identity: two types compare equal iff they describe
//! the same shape.

use sable_parser::{BinaryOp, UnaryOp};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// 1-byte unsigned integer.
    Byte,
    /// 2-byte unsigned integer.
    Word,
    /// 1-byte truth value.
    Bool,
    Void,
    /// Reference type, only produced by string literals and consumed by
    /// intrinsics.
    Str,
    /// `element[len]`; `len` absent for the unsized `element[]`.
    Array {
        element: Box<Type>,
        len: Option<u16>,
    },
    Function {
        params: Vec<Type>,
        ret: Box<Type>,
    },
    /// Enumerations are byte- or word-sized depending on their members.
    Enum {
        name: String,
        members: Vec<(String, i64)>,
    },
    /// Error-recovery type; compatible with everything so one mistake does
    /// not cascade.
    Unknown,
}

impl Type {
    pub fn byte_array(len: Option<u16>) -> Type {
        Type::Array { element: Box::new(Type::Byte), len }
    }

    pub fn size_in_bytes(&self) -> u32 {
        match self {
            Type::Byte | Type::Bool => 1,
            Type::Word => 2,
            Type::Void => 0,
            // References and function pointers are 16-bit addresses.
            Type::Str | Type::Function { .. } => 2,
            Type::Array { element, len } => {
                element.size_in_bytes() * len.map(u32::from).unwrap_or(0)
            }
            Type::Enum { members, .. } => {
                if members.iter().any(|(_, v)| *v > 0xFF || *v < 0) {
                    2
                } else {
                    1
                }
            }
            Type::Unknown => 0,
        }
    }

    /// Always false: the language has no signed types.
    pub fn is_signed(&self) -> bool {
        false
    }

    /// Whether a variable of this type can be declared and assigned.
    pub fn is_assignable(&self) -> bool {
        !matches!(self, Type::Void | Type::Str | Type::Unknown)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Byte | Type::Word)
    }

    /// Types usable in boolean context; bytes and words test non-zero.
    pub fn is_bool_like(&self) -> bool {
        matches!(self, Type::Bool | Type::Byte | Type::Word)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    /// The numeric carrier of a type: enums decay to their byte/word
    /// representation, booleans to byte.
    pub fn numeric_repr(&self) -> Option<Type> {
        match self {
            Type::Byte | Type::Word => Some(self.clone()),
            Type::Bool => Some(Type::Byte),
            Type::Enum { .. } => Some(if self.size_in_bytes() == 2 { Type::Word } else { Type::Byte }),
            _ => None,
        }
    }

    /// The mask for in-width constant folding.
    pub fn value_mask(&self) -> u32 {
        match self.size_in_bytes() {
            1 => 0xFF,
            2 => 0xFFFF,
            _ => 0xFFFF,
        }
    }

    /// Largest value representable in this type, for range diagnostics.
    pub fn max_value(&self) -> Option<u32> {
        match self {
            Type::Byte | Type::Bool => Some(0xFF),
            Type::Word => Some(0xFFFF),
            Type::Enum { .. } => Some(self.value_mask()),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Byte => write!(f, "byte"),
            Type::Word => write!(f, "word"),
            Type::Bool => write!(f, "bool"),
            Type::Void => write!(f, "void"),
            Type::Str => write!(f, "string"),
            Type::Array { element, len: Some(n) } => write!(f, "{}[{}]", element, n),
            Type::Array { element, len: None } => write!(f, "{}[]", element),
            Type::Function { params, ret } => {
                write!(f, "function(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, "): {}", ret)
            }
            Type::Enum { name, .. } => write!(f, "{}", name),
            Type::Unknown => write!(f, "<unknown>"),
        }
    }
}

/// The three-valued (plus failure) verdict on converting `source` into
/// `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeCompat {
    /// Structurally the same type.
    Identical,
    /// Implicit conversion allowed (e.g. byte → word).
    Compatible,
    /// Needs an explicit narrowing (e.g. word → byte via `lo`).
    RequiresConversion,
    Incompatible,
}

/// Total compatibility function over (source, target).
pub fn compatibility(source: &Type, target: &Type) -> TypeCompat {
    // Unknown is the error-recovery type; pretend it fits everywhere.
    if source.is_unknown() || target.is_unknown() {
        return TypeCompat::Identical;
    }
    if source == target {
        return TypeCompat::Identical;
    }

    match (source, target) {
        (Type::Byte, Type::Word) => TypeCompat::Compatible,
        (Type::Bool, Type::Byte) | (Type::Byte, Type::Bool) => TypeCompat::Compatible,
        (Type::Bool, Type::Word) => TypeCompat::Compatible,
        (Type::Word, Type::Byte) | (Type::Word, Type::Bool) => TypeCompat::RequiresConversion,

        // An enum decays to its numeric representation, not the reverse.
        (Type::Enum { .. }, t) if t.is_numeric() => {
            match (source.size_in_bytes(), t.size_in_bytes()) {
                (1, 2) | (1, 1) | (2, 2) => TypeCompat::Compatible,
                _ => TypeCompat::RequiresConversion,
            }
        }
        (s, Type::Enum { .. }) if s.is_numeric() => TypeCompat::RequiresConversion,

        // A sized array fits an unsized parameter of the same element type.
        (
            Type::Array { element: se, len: Some(_) },
            Type::Array { element: te, len: None },
        ) if se == te => TypeCompat::Compatible,

        _ => TypeCompat::Incompatible,
    }
}

pub fn can_assign(source: &Type, target: &Type) -> bool {
    matches!(
        compatibility(source, target),
        TypeCompat::Identical | TypeCompat::Compatible
    )
}

/// The wider of two numeric carriers.
fn wider(a: &Type, b: &Type) -> Type {
    if matches!(a, Type::Word) || matches!(b, Type::Word) {
        Type::Word
    } else {
        Type::Byte
    }
}

/// The result type of a binary operation, or `None` when the operand types
/// do not admit the operator.
pub fn binary_result(op: BinaryOp, lhs: &Type, rhs: &Type) -> Option<Type> {
    if lhs.is_unknown() || rhs.is_unknown() {
        return Some(Type::Unknown);
    }

    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let l = lhs.numeric_repr()?;
            let r = rhs.numeric_repr()?;
            Some(wider(&l, &r))
        }
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
            let l = lhs.numeric_repr()?;
            let r = rhs.numeric_repr()?;
            Some(wider(&l, &r))
        }
        // Shifts preserve the width of the shifted operand.
        BinaryOp::Shl | BinaryOp::Shr => {
            let l = lhs.numeric_repr()?;
            rhs.numeric_repr()?;
            Some(l)
        }
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let comparable = (lhs.numeric_repr().is_some() && rhs.numeric_repr().is_some())
                || (matches!(lhs, Type::Bool) && matches!(rhs, Type::Bool));
            comparable.then_some(Type::Bool)
        }
        BinaryOp::And | BinaryOp::Or => {
            (lhs.is_bool_like() && rhs.is_bool_like()).then_some(Type::Bool)
        }
    }
}

/// The result type of a unary operation.
pub fn unary_result(op: UnaryOp, operand: &Type) -> Option<Type> {
    if operand.is_unknown() {
        return Some(Type::Unknown);
    }
    match op {
        UnaryOp::Not => operand.is_bool_like().then_some(Type::Bool),
        UnaryOp::BitNot | UnaryOp::Neg | UnaryOp::Plus => operand.numeric_repr(),
        // Taking an address always yields a 16-bit pointer-sized word.
        UnaryOp::AddressOf => Some(Type::Word),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_widens_to_word() {
        assert_eq!(binary_result(BinaryOp::Add, &Type::Byte, &Type::Byte), Some(Type::Byte));
        assert_eq!(binary_result(BinaryOp::Add, &Type::Byte, &Type::Word), Some(Type::Word));
        assert_eq!(binary_result(BinaryOp::Add, &Type::Word, &Type::Byte), Some(Type::Word));
        assert_eq!(binary_result(BinaryOp::Add, &Type::Word, &Type::Word), Some(Type::Word));
    }

    #[test]
    fn comparisons_yield_bool() {
        assert_eq!(binary_result(BinaryOp::Lt, &Type::Byte, &Type::Word), Some(Type::Bool));
        assert_eq!(binary_result(BinaryOp::Eq, &Type::Bool, &Type::Bool), Some(Type::Bool));
    }

    #[test]
    fn logical_not_needs_bool_like() {
        assert_eq!(unary_result(UnaryOp::Not, &Type::Bool), Some(Type::Bool));
        assert_eq!(unary_result(UnaryOp::Not, &Type::Byte), Some(Type::Bool));
        assert_eq!(unary_result(UnaryOp::Not, &Type::Str), None);
    }

    #[test]
    fn shifts_preserve_left_width() {
        assert_eq!(binary_result(BinaryOp::Shl, &Type::Byte, &Type::Word), Some(Type::Byte));
        assert_eq!(binary_result(BinaryOp::Shr, &Type::Word, &Type::Byte), Some(Type::Word));
    }

    #[test]
    fn assignability_verdicts() {
        assert!(can_assign(&Type::Byte, &Type::Word));
        assert!(can_assign(&Type::Bool, &Type::Byte));
        assert!(can_assign(&Type::Byte, &Type::Bool));
        assert!(!can_assign(&Type::Word, &Type::Byte));
        assert_eq!(
            compatibility(&Type::Word, &Type::Byte),
            TypeCompat::RequiresConversion
        );
    }

    #[test]
    fn sized_array_decays_to_unsized() {
        let sized = Type::byte_array(Some(8));
        let unsized_ty = Type::byte_array(None);
        assert_eq!(compatibility(&sized, &unsized_ty), TypeCompat::Compatible);
        // The reverse direction is not allowed.
        assert_eq!(compatibility(&unsized_ty, &sized), TypeCompat::Incompatible);
    }

    #[test]
    fn sizes() {
        assert_eq!(Type::Byte.size_in_bytes(), 1);
        assert_eq!(Type::Word.size_in_bytes(), 2);
        assert_eq!(Type::byte_array(Some(10)).size_in_bytes(), 10);
        assert_eq!(
            Type::Array { element: Box::new(Type::Word), len: Some(4) }.size_in_bytes(),
            8
        );
    }
}
