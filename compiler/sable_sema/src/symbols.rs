//! Lexically scoped symbol table
//!
//! One table per compilation: a root module scope created eagerly with the
//! built-in types, nested function/parameter scopes, nested block scopes.
//! Lookup is innermost-first; shadowing is allowed only across scope
//! boundaries.

use crate::types::Type;
use hashbrown::HashMap;
use sable_common::Span;
use sable_parser::StorageClassKind;
use serde::{Deserialize, Serialize};

pub type SymbolId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Variable,
    Function,
    Parameter,
    Type,
    Enum,
    EnumMember,
    Module,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFlags {
    pub is_const: bool,
    pub is_exported: bool,
    pub storage: Option<StorageClassKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub span: Span,
    pub ty: Type,
    pub flags: SymbolFlags,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Scope {
    symbols: HashMap<String, SymbolId>,
}

/// Scoped symbol table with explicit push/pop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolTable {
    arena: Vec<Symbol>,
    scopes: Vec<Scope>,
}

impl SymbolTable {
    /// Create a table holding the eager module scope with every built-in
    /// primitive type pre-declared.
    pub fn new(module_name: &str, module_span: Span) -> Self {
        let mut table = Self {
            arena: Vec::new(),
            scopes: vec![Scope::default()],
        };

        for (name, ty) in [
            ("byte", Type::Byte),
            ("word", Type::Word),
            ("bool", Type::Bool),
            ("void", Type::Void),
            ("string", Type::Str),
        ] {
            let _ = table.declare(name, SymbolKind::Type, module_span, ty, SymbolFlags::default());
        }
        let _ = table.declare(
            module_name,
            SymbolKind::Module,
            module_span,
            Type::Void,
            SymbolFlags::default(),
        );

        table
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pop the innermost scope. The module scope is never popped.
    pub fn exit_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Declare a symbol in the innermost scope. On a duplicate, the
    /// existing symbol's id comes back as the error payload.
    pub fn declare(
        &mut self,
        name: &str,
        kind: SymbolKind,
        span: Span,
        ty: Type,
        flags: SymbolFlags,
    ) -> Result<SymbolId, SymbolId> {
        if let Some(&existing) = self.scopes.last().and_then(|s| s.symbols.get(name)) {
            return Err(existing);
        }
        let id = self.arena.len() as SymbolId;
        self.arena.push(Symbol {
            id,
            name: name.to_string(),
            kind,
            span,
            ty,
            flags,
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.symbols.insert(name.to_string(), id);
        }
        Ok(id)
    }

    pub fn declare_variable(
        &mut self,
        name: &str,
        span: Span,
        ty: Type,
        flags: SymbolFlags,
    ) -> Result<SymbolId, SymbolId> {
        self.declare(name, SymbolKind::Variable, span, ty, flags)
    }

    /// Declare a function symbol; its type is finalized here with the
    /// parameters bound.
    pub fn declare_function(
        &mut self,
        name: &str,
        span: Span,
        return_type: Type,
        params: &[Type],
        is_exported: bool,
    ) -> Result<SymbolId, SymbolId> {
        let ty = Type::Function {
            params: params.to_vec(),
            ret: Box::new(return_type),
        };
        self.declare(
            name,
            SymbolKind::Function,
            span,
            ty,
            SymbolFlags { is_exported, ..SymbolFlags::default() },
        )
    }

    /// Innermost-first lookup across the whole scope chain.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        for scope in self.scopes.iter().rev() {
            if let Some(&id) = scope.symbols.get(name) {
                return Some(&self.arena[id as usize]);
            }
        }
        None
    }

    /// Lookup restricted to the module scope, for qualified references.
    pub fn lookup_module_scope(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .first()
            .and_then(|s| s.symbols.get(name))
            .map(|&id| &self.arena[id as usize])
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.arena[id as usize]
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.arena.iter()
    }
}
