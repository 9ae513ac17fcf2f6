//! Intermediate language for the Sable compiler
//!
//! Contains the typed IL data model, the AST → IL lowerer, SSA
//! construction (dominators, frontiers, phi placement, renaming) and the
//! read-only validator that gates codegen.

pub mod builder;
pub mod il;
pub mod ssa;
pub mod validate;

pub use builder::*;
pub use il::*;
pub use ssa::*;
pub use validate::*;
