//! Token definitions for the Sable language

use sable_common::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token kinds in the Sable language.
///
/// Literal tokens keep their raw lexeme so the number radix stays
/// reconstructable (`$D020`, `0xD020`, `0b1010`, `%1010` and `53280` are
/// all distinct lexemes for the same value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    Number(String),
    Str(String),
    True,
    False,

    // Identifiers
    Identifier(String),

    // Declaration keywords
    Module,
    Import,
    Export,
    From,
    Function,
    Callback,
    Let,
    Const,
    Type,
    Enum,

    // Statement keywords
    If,
    Else,
    While,
    For,
    To,
    Downto,
    Step,
    Do,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,

    // Storage-class keywords (recognized at lex time, raw includes the '@')
    Zp,
    Ram,
    Data,
    Address,

    // Operators
    Plus,          // +
    Minus,         // -
    Star,          // *
    Slash,         // /
    Percent,       // %
    Assign,        // =
    PlusAssign,    // +=
    MinusAssign,   // -=
    StarAssign,    // *=
    SlashAssign,   // /=
    PercentAssign, // %=
    AmpAssign,     // &=
    PipeAssign,    // |=
    CaretAssign,   // ^=
    ShlAssign,     // <<=
    ShrAssign,     // >>=
    Eq,            // ==
    NotEq,         // !=
    Less,          // <
    LessEq,        // <=
    Greater,       // >
    GreaterEq,     // >=
    AndAnd,        // &&
    OrOr,          // ||
    Bang,          // !
    Amp,           // &
    Pipe,          // |
    Caret,         // ^
    Tilde,         // ~
    Shl,           // <<
    Shr,           // >>
    Question,      // ?
    At,            // @ (address-of when not a storage-class keyword)

    // Punctuation
    Colon,     // :
    Semicolon, // ;
    Comma,     // ,
    Dot,       // .
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]

    // Only emitted when the "keep comments" option is set
    LineComment(String),
    BlockComment(String),

    Eof,
}

impl TokenKind {
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::Number(_) | TokenKind::Str(_) | TokenKind::True | TokenKind::False
        )
    }

    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Module
                | TokenKind::Import
                | TokenKind::Export
                | TokenKind::From
                | TokenKind::Function
                | TokenKind::Callback
                | TokenKind::Let
                | TokenKind::Const
                | TokenKind::Type
                | TokenKind::Enum
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::While
                | TokenKind::For
                | TokenKind::To
                | TokenKind::Downto
                | TokenKind::Step
                | TokenKind::Do
                | TokenKind::Switch
                | TokenKind::Case
                | TokenKind::Default
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Return
        )
    }

    pub fn is_storage_class(&self) -> bool {
        matches!(
            self,
            TokenKind::Zp | TokenKind::Ram | TokenKind::Data | TokenKind::Address
        )
    }

    pub fn is_assignment_op(&self) -> bool {
        matches!(
            self,
            TokenKind::Assign
                | TokenKind::PlusAssign
                | TokenKind::MinusAssign
                | TokenKind::StarAssign
                | TokenKind::SlashAssign
                | TokenKind::PercentAssign
                | TokenKind::AmpAssign
                | TokenKind::PipeAssign
                | TokenKind::CaretAssign
                | TokenKind::ShlAssign
                | TokenKind::ShrAssign
        )
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, TokenKind::LineComment(_) | TokenKind::BlockComment(_))
    }

    /// The keyword kind for an identifier lexeme, if it is one.
    pub fn keyword(ident: &str) -> Option<TokenKind> {
        let kind = match ident {
            "module" => TokenKind::Module,
            "import" => TokenKind::Import,
            "export" => TokenKind::Export,
            "from" => TokenKind::From,
            "function" => TokenKind::Function,
            "callback" => TokenKind::Callback,
            "let" => TokenKind::Let,
            "const" => TokenKind::Const,
            "type" => TokenKind::Type,
            "enum" => TokenKind::Enum,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "to" => TokenKind::To,
            "downto" => TokenKind::Downto,
            "step" => TokenKind::Step,
            "do" => TokenKind::Do,
            "switch" => TokenKind::Switch,
            "case" => TokenKind::Case,
            "default" => TokenKind::Default,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "return" => TokenKind::Return,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => return None,
        };
        Some(kind)
    }

    /// The storage-class kind for an `@`-prefixed lexeme, if it is one.
    /// Everything else after `@` lexes as `@` followed by an identifier.
    pub fn storage_class(word: &str) -> Option<TokenKind> {
        match word {
            "zp" => Some(TokenKind::Zp),
            "ram" => Some(TokenKind::Ram),
            "data" => Some(TokenKind::Data),
            "address" => Some(TokenKind::Address),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(raw) => write!(f, "{}", raw),
            TokenKind::Str(value) => write!(f, "\"{}\"", value),
            TokenKind::True => write!(f, "true"),
            TokenKind::False => write!(f, "false"),
            TokenKind::Identifier(name) => write!(f, "{}", name),
            TokenKind::LineComment(text) => write!(f, "//{}", text),
            TokenKind::BlockComment(text) => write!(f, "/*{}*/", text),
            TokenKind::Eof => write!(f, "<eof>"),
            other => {
                let text = match other {
                    TokenKind::Module => "module",
                    TokenKind::Import => "import",
                    TokenKind::Export => "export",
                    TokenKind::From => "from",
                    TokenKind::Function => "function",
                    TokenKind::Callback => "callback",
                    TokenKind::Let => "let",
                    TokenKind::Const => "const",
                    TokenKind::Type => "type",
                    TokenKind::Enum => "enum",
                    TokenKind::If => "if",
                    TokenKind::Else => "else",
                    TokenKind::While => "while",
                    TokenKind::For => "for",
                    TokenKind::To => "to",
                    TokenKind::Downto => "downto",
                    TokenKind::Step => "step",
                    TokenKind::Do => "do",
                    TokenKind::Switch => "switch",
                    TokenKind::Case => "case",
                    TokenKind::Default => "default",
                    TokenKind::Break => "break",
                    TokenKind::Continue => "continue",
                    TokenKind::Return => "return",
                    TokenKind::Zp => "@zp",
                    TokenKind::Ram => "@ram",
                    TokenKind::Data => "@data",
                    TokenKind::Address => "@address",
                    TokenKind::Plus => "+",
                    TokenKind::Minus => "-",
                    TokenKind::Star => "*",
                    TokenKind::Slash => "/",
                    TokenKind::Percent => "%",
                    TokenKind::Assign => "=",
                    TokenKind::PlusAssign => "+=",
                    TokenKind::MinusAssign => "-=",
                    TokenKind::StarAssign => "*=",
                    TokenKind::SlashAssign => "/=",
                    TokenKind::PercentAssign => "%=",
                    TokenKind::AmpAssign => "&=",
                    TokenKind::PipeAssign => "|=",
                    TokenKind::CaretAssign => "^=",
                    TokenKind::ShlAssign => "<<=",
                    TokenKind::ShrAssign => ">>=",
                    TokenKind::Eq => "==",
                    TokenKind::NotEq => "!=",
                    TokenKind::Less => "<",
                    TokenKind::LessEq => "<=",
                    TokenKind::Greater => ">",
                    TokenKind::GreaterEq => ">=",
                    TokenKind::AndAnd => "&&",
                    TokenKind::OrOr => "||",
                    TokenKind::Bang => "!",
                    TokenKind::Amp => "&",
                    TokenKind::Pipe => "|",
                    TokenKind::Caret => "^",
                    TokenKind::Tilde => "~",
                    TokenKind::Shl => "<<",
                    TokenKind::Shr => ">>",
                    TokenKind::Question => "?",
                    TokenKind::At => "@",
                    TokenKind::Colon => ":",
                    TokenKind::Semicolon => ";",
                    TokenKind::Comma => ",",
                    TokenKind::Dot => ".",
                    TokenKind::LParen => "(",
                    TokenKind::RParen => ")",
                    TokenKind::LBrace => "{",
                    TokenKind::RBrace => "}",
                    TokenKind::LBracket => "[",
                    TokenKind::RBracket => "]",
                    _ => unreachable!(),
                };
                write!(f, "{}", text)
            }
        }
    }
}

/// A token with its source span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.span)
    }
}
