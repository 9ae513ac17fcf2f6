//! Shared utilities for the Sable compiler
//!
//! This crate provides the pieces every pipeline stage depends on:
//! - Source location tracking (positions, half-open spans)
//! - Diagnostic records with stable numeric codes
//! - Error types for the pass boundaries
//! - Metadata maps attached to AST nodes and IL instructions

pub mod diagnostics;
pub mod error;
pub mod metadata;
pub mod span;

pub use diagnostics::*;
pub use error::*;
pub use metadata::*;
pub use span::*;
