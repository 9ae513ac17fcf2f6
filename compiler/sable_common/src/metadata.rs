//! Metadata maps attached to AST nodes and IL instructions
//!
//! Later passes annotate earlier products without mutating their structure.
//! Keys form a closed enumeration; values are a small tagged union rather
//! than arbitrary dynamic typing.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// The closed set of metadata keys known to the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaKey {
    /// Number of call sites targeting a function (call-graph pass).
    CallGraphCallCount,
    /// Function has no call sites and is not an entry point or export.
    CallGraphUnused,
    /// Function satisfies every inlining precondition.
    CallGraphInlineCandidate,
    /// Function participates in a call cycle.
    CallGraphRecursive,
    /// Expression folded to a constant during type checking.
    ConstantValue,
    /// Instruction produced while lowering an intrinsic; codegen must not
    /// reorder across it.
    OptimizationBarrier,
    /// Fixed address of a memory-mapped global.
    MappedAddress,
}

/// Values storable under a [`MetaKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaValue {
    Int(i64),
    Bool(bool),
    /// A 6502 address.
    Addr(u16),
}

impl MetaValue {
    pub fn as_int(self) -> Option<i64> {
        match self {
            MetaValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            MetaValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_addr(self) -> Option<u16> {
        match self {
            MetaValue::Addr(v) => Some(v),
            _ => None,
        }
    }
}

/// A heterogeneous key-value store carried by AST nodes and IL instructions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    entries: HashMap<MetaKey, MetaValue>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: MetaKey, value: MetaValue) {
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: MetaKey) -> Option<MetaValue> {
        self.entries.get(&key).copied()
    }

    pub fn get_int(&self, key: MetaKey) -> Option<i64> {
        self.get(key).and_then(MetaValue::as_int)
    }

    pub fn get_bool(&self, key: MetaKey) -> Option<bool> {
        self.get(key).and_then(MetaValue::as_bool)
    }

    pub fn get_addr(&self, key: MetaKey) -> Option<u16> {
        self.get(key).and_then(MetaValue::as_addr)
    }

    pub fn contains(&self, key: MetaKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
