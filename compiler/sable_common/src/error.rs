//! Error types for the Sable compiler
//!
//! These cover *pass-boundary* failures. Problems in user source are
//! reported through [`crate::Diagnostics`] instead and never unwind a pass.

use thiserror::Error;

/// The main error type for the Sable compiler.
#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("lexical error: {message}")]
    Lex { message: String },

    #[error("parse error: {message}")]
    Parse { message: String },

    #[error("semantic error: {message}")]
    Semantic { message: String },

    #[error("lowering error: {message}")]
    Lowering { message: String },

    #[error("invalid IL: {message}")]
    Validation { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("I/O error: {message}")]
    Io { message: String },
}

/// Result type alias for Sable compiler operations.
pub type CompileResult<T> = Result<T, CompileError>;

impl CompileError {
    pub fn lex(message: impl Into<String>) -> Self {
        Self::Lex { message: message.into() }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::Semantic { message: message.into() }
    }

    pub fn lowering(message: impl Into<String>) -> Self {
        Self::Lowering { message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io { message: message.into() }
    }
}
