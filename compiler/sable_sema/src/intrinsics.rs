//! Built-in intrinsics recognized by name
//!
//! The type checker validates their signatures and the lowerer turns them
//! into dedicated IL opcodes instead of user-function calls.

use crate::types::Type;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intrinsic {
    /// 8-bit memory load: `(word) -> byte`
    Peek,
    /// 8-bit memory store: `(word, byte) -> void`
    Poke,
    /// 16-bit little-endian load: `(word) -> word`
    PeekW,
    /// 16-bit little-endian store: `(word, word) -> void`
    PokeW,
    /// Low byte of a word: `(word) -> byte`
    Lo,
    /// High byte of a word: `(word) -> byte`
    Hi,
    Sei,
    Cli,
    Nop,
    Brk,
    Pha,
    /// The only CPU op producing a value: `() -> byte`
    Pla,
    Php,
    Plp,
    /// Optimization barrier: `() -> void`
    Barrier,
    /// `peek` the optimizer may not CSE or reorder.
    VolatileRead,
    /// `poke` with the same restriction.
    VolatileWrite,
    /// Folded to a constant byte at lowering time.
    Sizeof,
    /// Folded to a constant word at lowering time.
    Length,
}

impl Intrinsic {
    pub fn lookup(name: &str) -> Option<Intrinsic> {
        let intrinsic = match name {
            "peek" => Intrinsic::Peek,
            "poke" => Intrinsic::Poke,
            "peekw" => Intrinsic::PeekW,
            "pokew" => Intrinsic::PokeW,
            "lo" => Intrinsic::Lo,
            "hi" => Intrinsic::Hi,
            "sei" => Intrinsic::Sei,
            "cli" => Intrinsic::Cli,
            "nop" => Intrinsic::Nop,
            "brk" => Intrinsic::Brk,
            "pha" => Intrinsic::Pha,
            "pla" => Intrinsic::Pla,
            "php" => Intrinsic::Php,
            "plp" => Intrinsic::Plp,
            "barrier" => Intrinsic::Barrier,
            "volatile_read" => Intrinsic::VolatileRead,
            "volatile_write" => Intrinsic::VolatileWrite,
            "sizeof" => Intrinsic::Sizeof,
            "length" => Intrinsic::Length,
            _ => return None,
        };
        Some(intrinsic)
    }

    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::Peek => "peek",
            Intrinsic::Poke => "poke",
            Intrinsic::PeekW => "peekw",
            Intrinsic::PokeW => "pokew",
            Intrinsic::Lo => "lo",
            Intrinsic::Hi => "hi",
            Intrinsic::Sei => "sei",
            Intrinsic::Cli => "cli",
            Intrinsic::Nop => "nop",
            Intrinsic::Brk => "brk",
            Intrinsic::Pha => "pha",
            Intrinsic::Pla => "pla",
            Intrinsic::Php => "php",
            Intrinsic::Plp => "plp",
            Intrinsic::Barrier => "barrier",
            Intrinsic::VolatileRead => "volatile_read",
            Intrinsic::VolatileWrite => "volatile_write",
            Intrinsic::Sizeof => "sizeof",
            Intrinsic::Length => "length",
        }
    }

    /// Parameter types. `Sizeof`/`Length` take a type name or an array and
    /// are arity-checked here but type-checked specially.
    pub fn params(self) -> Vec<Type> {
        match self {
            Intrinsic::Peek | Intrinsic::PeekW | Intrinsic::Lo | Intrinsic::Hi
            | Intrinsic::VolatileRead => vec![Type::Word],
            Intrinsic::Poke | Intrinsic::VolatileWrite => vec![Type::Word, Type::Byte],
            Intrinsic::PokeW => vec![Type::Word, Type::Word],
            Intrinsic::Sei
            | Intrinsic::Cli
            | Intrinsic::Nop
            | Intrinsic::Brk
            | Intrinsic::Pha
            | Intrinsic::Pla
            | Intrinsic::Php
            | Intrinsic::Plp
            | Intrinsic::Barrier => Vec::new(),
            Intrinsic::Sizeof | Intrinsic::Length => vec![Type::Unknown],
        }
    }

    pub fn return_type(self) -> Type {
        match self {
            Intrinsic::Peek | Intrinsic::Lo | Intrinsic::Hi | Intrinsic::Pla
            | Intrinsic::VolatileRead | Intrinsic::Sizeof => Type::Byte,
            Intrinsic::PeekW | Intrinsic::Length => Type::Word,
            _ => Type::Void,
        }
    }

    /// Whether the checker folds this call to a constant.
    pub fn folds_to_constant(self) -> bool {
        matches!(self, Intrinsic::Sizeof | Intrinsic::Length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_covers_every_intrinsic() {
        for intrinsic in [
            Intrinsic::Peek,
            Intrinsic::Poke,
            Intrinsic::PeekW,
            Intrinsic::PokeW,
            Intrinsic::Lo,
            Intrinsic::Hi,
            Intrinsic::Sei,
            Intrinsic::Cli,
            Intrinsic::Nop,
            Intrinsic::Brk,
            Intrinsic::Pha,
            Intrinsic::Pla,
            Intrinsic::Php,
            Intrinsic::Plp,
            Intrinsic::Barrier,
            Intrinsic::VolatileRead,
            Intrinsic::VolatileWrite,
            Intrinsic::Sizeof,
            Intrinsic::Length,
        ] {
            assert_eq!(Intrinsic::lookup(intrinsic.name()), Some(intrinsic));
        }
        assert_eq!(Intrinsic::lookup("printf"), None);
    }

    #[test]
    fn signatures_match_the_table() {
        assert_eq!(Intrinsic::Peek.params(), vec![Type::Word]);
        assert_eq!(Intrinsic::Peek.return_type(), Type::Byte);
        assert_eq!(Intrinsic::PokeW.params(), vec![Type::Word, Type::Word]);
        assert_eq!(Intrinsic::Pla.return_type(), Type::Byte);
        assert_eq!(Intrinsic::Sei.return_type(), Type::Void);
        assert_eq!(Intrinsic::Length.return_type(), Type::Word);
    }
}
