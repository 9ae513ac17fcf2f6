//! Symbol table, type system and analysis passes for the Sable language
//!
//! The analyzer runs as a sequence of AST walkers sharing one symbol table
//! and one diagnostic sink:
//! 1. declaration collection (forward references)
//! 2. type checking with mandatory constant folding
//! 3. lvalue verification
//! 4. per-function control-flow graphs with reachability warnings
//! 5. call-graph construction, recursion and inline-candidate analysis
//! 6. unused-function analysis
//!
//! The analysis succeeds iff no Error-severity diagnostic was emitted.

pub mod analyzer;
pub mod callgraph;
pub mod cfg;
pub mod check;
pub mod intrinsics;
pub mod symbols;
pub mod types;

pub use analyzer::*;
pub use callgraph::*;
pub use cfg::*;
pub use intrinsics::*;
pub use symbols::*;
pub use types::*;
