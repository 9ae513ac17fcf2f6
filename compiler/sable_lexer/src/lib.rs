//! Lexical analyzer for the Sable language
//!
//! Features:
//! - Single-pass tokenization over the raw source buffer
//! - Four number radices with the raw lexeme preserved
//! - `@`-prefixed storage-class keywords with address-of fallback
//! - Comment preservation mode for formatters
//! - Error recovery: diagnostics are collected, the scan never aborts

pub mod lexer;
pub mod token;

pub use lexer::*;
pub use token::*;
