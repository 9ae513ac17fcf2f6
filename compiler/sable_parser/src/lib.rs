//! Parser for the Sable language
//!
//! Features:
//! - Recursive descent declarations/statements with Pratt expressions
//! - Error recovery at statement and declaration boundaries
//! - Spanned, metadata-carrying AST nodes for downstream passes

pub mod ast;
pub mod parser;
pub mod precedence;

pub use ast::*;
pub use parser::*;
pub use precedence::*;
