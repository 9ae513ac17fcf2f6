//! Analysis orchestration and declaration collection
//!
//! The analyzer is a sequence of walkers sharing one symbol table and one
//! diagnostic sink. Declarations are collected for the whole module before
//! any body is visited so forward references work.

use crate::callgraph::CallGraph;
use crate::cfg::ControlFlowGraph;
use crate::symbols::{SymbolFlags, SymbolId, SymbolKind, SymbolTable};
use crate::types::Type;
use hashbrown::HashMap;
use sable_common::{DiagnosticCode, Diagnostics};
use sable_parser::{
    BinaryOp, Expr, ExprKind, ItemKind, Literal, NodeId, Program, TypeExpr, TypeExprKind, UnaryOp,
};
use serde::{Deserialize, Serialize};

/// Per-expression annotation produced by the type checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExprInfo {
    pub ty: Type,
    pub is_const: bool,
    pub value: Option<i64>,
}

impl ExprInfo {
    pub fn non_const(ty: Type) -> Self {
        Self { ty, is_const: false, value: None }
    }

    pub fn constant(ty: Type, value: i64) -> Self {
        Self { ty, is_const: true, value: Some(value) }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnalyzerOptions {
    /// Gates the CFG and call-graph passes.
    pub run_advanced_analysis: bool,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self { run_advanced_analysis: true }
    }
}

/// Everything the analysis passes produce for one module.
#[derive(Debug)]
pub struct Analysis {
    pub symbols: SymbolTable,
    pub expr_info: HashMap<NodeId, ExprInfo>,
    /// Resolved type of each local declaration (and each for-loop
    /// induction variable), keyed by the owning statement.
    pub local_types: HashMap<NodeId, Type>,
    pub cfgs: HashMap<String, ControlFlowGraph>,
    pub call_graph: CallGraph,
}

pub struct Analyzer {
    pub(crate) symbols: SymbolTable,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) expr_info: HashMap<NodeId, ExprInfo>,
    pub(crate) local_types: HashMap<NodeId, Type>,
    /// Values of `const` globals whose initializers folded, for constant
    /// propagation through identifiers.
    pub(crate) const_globals: HashMap<SymbolId, i64>,
    /// Nesting depth of loops (for `continue`).
    pub(crate) loop_depth: usize,
    /// Nesting depth of breakable constructs (loops and switches).
    pub(crate) breakable_depth: usize,
    options: AnalyzerOptions,
}

impl Analyzer {
    /// Run every analysis pass over `program`. The program is only mutated
    /// through node metadata (call-graph annotations).
    pub fn analyze(program: &mut Program, options: AnalyzerOptions) -> (Analysis, Diagnostics) {
        let mut analyzer = Analyzer {
            symbols: SymbolTable::new(&program.module.name(), program.module.span),
            diagnostics: Diagnostics::new(),
            expr_info: HashMap::new(),
            local_types: HashMap::new(),
            const_globals: HashMap::new(),
            loop_depth: 0,
            breakable_depth: 0,
            options,
        };

        analyzer.collect_declarations(program);
        analyzer.check_program(program);

        let (cfgs, call_graph) = if analyzer.options.run_advanced_analysis {
            let cfgs = analyzer.build_cfgs(program);
            let call_graph = analyzer.build_call_graph(program);
            (cfgs, call_graph)
        } else {
            (HashMap::new(), CallGraph::default())
        };

        log::debug!(
            "analysis of module '{}' finished: {} errors, {} warnings",
            program.module.name(),
            analyzer.diagnostics.error_count(),
            analyzer.diagnostics.warning_count()
        );

        let analysis = Analysis {
            symbols: analyzer.symbols,
            expr_info: analyzer.expr_info,
            local_types: analyzer.local_types,
            cfgs,
            call_graph,
        };
        (analysis, analyzer.diagnostics)
    }

    // ------------------------------------------------------------------
    // Pass 1: declaration collection
    // ------------------------------------------------------------------

    fn collect_declarations(&mut self, program: &Program) {
        // Types first so later signatures can reference them, in source
        // order (aliases may build on earlier aliases).
        for item in &program.items {
            match &item.kind {
                ItemKind::TypeAlias(alias) => {
                    let ty = self.resolve_type_expr(&alias.ty);
                    let flags = SymbolFlags {
                        is_exported: alias.is_exported,
                        ..SymbolFlags::default()
                    };
                    self.declare_or_report(
                        &alias.name.value,
                        SymbolKind::Type,
                        alias.name.span,
                        ty,
                        flags,
                    );
                }
                ItemKind::Enum(decl) => {
                    let mut members = Vec::new();
                    let mut next_value: i64 = 0;
                    for member in &decl.members {
                        let value = match &member.value {
                            Some(expr) => match self.eval_const_expr(expr) {
                                Some(v) => v,
                                None => {
                                    self.diagnostics.error(
                                        DiagnosticCode::TypeMismatch,
                                        format!(
                                            "enum member '{}' needs a constant value",
                                            member.name.value
                                        ),
                                        member.span,
                                    );
                                    next_value
                                }
                            },
                            None => next_value,
                        };
                        next_value = value + 1;
                        members.push((member.name.value.clone(), value));
                    }

                    let ty = Type::Enum { name: decl.name.value.clone(), members: members.clone() };
                    let flags = SymbolFlags {
                        is_exported: decl.is_exported,
                        ..SymbolFlags::default()
                    };
                    self.declare_or_report(
                        &decl.name.value,
                        SymbolKind::Enum,
                        decl.name.span,
                        ty.clone(),
                        flags,
                    );
                    for (name, _) in &members {
                        let qualified = format!("{}.{}", decl.name.value, name);
                        let _ = self.symbols.declare(
                            &qualified,
                            SymbolKind::EnumMember,
                            decl.name.span,
                            ty.clone(),
                            SymbolFlags { is_const: true, ..SymbolFlags::default() },
                        );
                    }
                }
                _ => {}
            }
        }

        for item in &program.items {
            match &item.kind {
                ItemKind::Function(func) => {
                    let params: Vec<Type> = func
                        .params
                        .iter()
                        .map(|p| self.resolve_type_expr(&p.ty))
                        .collect();
                    let return_type = func
                        .return_type
                        .as_ref()
                        .map(|t| self.resolve_type_expr(t))
                        .unwrap_or(Type::Void);
                    if let Err(existing) = self.symbols.declare_function(
                        &func.name.value,
                        func.name.span,
                        return_type,
                        &params,
                        func.is_exported,
                    ) {
                        let prev = self.symbols.symbol(existing).span;
                        self.diagnostics.push(
                            sable_common::Diagnostic::error(
                                DiagnosticCode::DuplicateDeclaration,
                                format!("duplicate declaration of '{}'", func.name.value),
                                func.name.span,
                            )
                            .with_related(prev),
                        );
                    }
                }
                ItemKind::Variable(var) => {
                    let ty = match &var.ty {
                        Some(annotation) => self.resolve_type_expr(annotation),
                        None => self.infer_global_type(var.initializer.as_ref()),
                    };
                    if matches!(ty, Type::Unknown) && var.ty.is_none() {
                        self.diagnostics.error(
                            DiagnosticCode::TypeMismatch,
                            format!("cannot infer a type for '{}'", var.name.value),
                            var.name.span,
                        );
                    }
                    let flags = SymbolFlags {
                        is_const: var.is_const,
                        is_exported: var.is_exported,
                        storage: var.storage.as_ref().map(|s| s.class),
                    };
                    if let Some(id) = self.declare_or_report(
                        &var.name.value,
                        SymbolKind::Variable,
                        var.name.span,
                        ty,
                        flags,
                    ) {
                        if var.is_const {
                            if let Some(value) =
                                var.initializer.as_ref().and_then(|e| self.eval_const_expr(e))
                            {
                                self.const_globals.insert(id, value);
                            }
                        }
                    }
                }
                ItemKind::Import(import) => {
                    // Module resolution happens outside the core; imported
                    // names get Unknown-typed function symbols so uses do
                    // not error.
                    for name in &import.names {
                        let _ = self.symbols.declare(
                            &name.value,
                            SymbolKind::Function,
                            name.span,
                            Type::Unknown,
                            SymbolFlags::default(),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn declare_or_report(
        &mut self,
        name: &str,
        kind: SymbolKind,
        span: sable_common::Span,
        ty: Type,
        flags: SymbolFlags,
    ) -> Option<SymbolId> {
        match self.symbols.declare(name, kind, span, ty, flags) {
            Ok(id) => Some(id),
            Err(existing) => {
                let prev = self.symbols.symbol(existing).span;
                self.diagnostics.push(
                    sable_common::Diagnostic::error(
                        DiagnosticCode::DuplicateDeclaration,
                        format!("duplicate declaration of '{}'", name),
                        span,
                    )
                    .with_related(prev),
                );
                None
            }
        }
    }

    /// Minimal inference for unannotated globals: enough to type
    /// `let x = 5;` and `let f = true;`.
    fn infer_global_type(&mut self, initializer: Option<&Expr>) -> Type {
        let Some(init) = initializer else {
            return Type::Unknown;
        };
        match init.kind.as_ref() {
            ExprKind::Literal(Literal::Bool(_)) => Type::Bool,
            ExprKind::Literal(Literal::Str(_)) => Type::Str,
            ExprKind::ArrayLiteral(elements) => Type::Array {
                element: Box::new(Type::Byte),
                len: Some(elements.len() as u16),
            },
            _ => match self.eval_const_expr(init) {
                Some(v) if (0..=0xFF).contains(&v) => Type::Byte,
                Some(_) => Type::Word,
                None => Type::Unknown,
            },
        }
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    /// Resolve a syntactic type annotation to a semantic type.
    pub(crate) fn resolve_type_expr(&mut self, ty: &TypeExpr) -> Type {
        match &ty.kind {
            TypeExprKind::Named(name) => match self.symbols.lookup(name) {
                Some(sym) if matches!(sym.kind, SymbolKind::Type | SymbolKind::Enum) => {
                    sym.ty.clone()
                }
                _ => {
                    self.diagnostics.error(
                        DiagnosticCode::UnknownType,
                        format!("unknown type '{}'", name),
                        ty.span,
                    );
                    Type::Unknown
                }
            },
            TypeExprKind::Array { element, size } => {
                let element_ty = self.resolve_type_expr(element);
                let len = match size {
                    Some(expr) => match self.eval_const_expr(expr) {
                        Some(v) if (0..=0xFFFF).contains(&v) => Some(v as u16),
                        Some(_) => {
                            self.diagnostics.error(
                                DiagnosticCode::TypeMismatch,
                                "array size is out of the 16-bit range",
                                expr.span,
                            );
                            None
                        }
                        None => {
                            self.diagnostics.error(
                                DiagnosticCode::TypeMismatch,
                                "array size must be a constant expression",
                                expr.span,
                            );
                            None
                        }
                    },
                    None => None,
                };
                Type::Array { element: Box::new(element_ty), len }
            }
        }
    }

    /// Fold a constant expression without diagnostics. Handles literals,
    /// const globals, enum members and pure operators; 16-bit unsigned
    /// arithmetic mod 65536. Division or modulo by zero is simply
    /// non-constant here; the checker warns separately.
    pub(crate) fn eval_const_expr(&self, expr: &Expr) -> Option<i64> {
        match expr.kind.as_ref() {
            ExprKind::Literal(Literal::Number { value, .. }) => Some(i64::from(*value)),
            ExprKind::Literal(Literal::Bool(b)) => Some(i64::from(*b)),
            ExprKind::Identifier(name) => {
                let sym = self.symbols.lookup(name)?;
                self.const_globals.get(&sym.id).copied()
            }
            ExprKind::Member { base, member } => {
                let sym = self.symbols.lookup(&base.value)?;
                match &sym.ty {
                    Type::Enum { members, .. } => members
                        .iter()
                        .find(|(name, _)| name == &member.value)
                        .map(|(_, v)| *v),
                    _ => None,
                }
            }
            ExprKind::Unary { op, operand } => {
                let v = self.eval_const_expr(operand)?;
                let folded = match op {
                    UnaryOp::Plus => v,
                    UnaryOp::Neg => (0x10000 - (v & 0xFFFF)) & 0xFFFF,
                    UnaryOp::BitNot => !v & 0xFFFF,
                    UnaryOp::Not => i64::from(v == 0),
                    UnaryOp::AddressOf => return None,
                };
                Some(folded)
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.eval_const_expr(left)?;
                let r = self.eval_const_expr(right)?;
                fold_binary(*op, l, r)
            }
            ExprKind::Ternary { condition, then_expr, else_expr } => {
                let c = self.eval_const_expr(condition)?;
                if c != 0 {
                    self.eval_const_expr(then_expr)
                } else {
                    self.eval_const_expr(else_expr)
                }
            }
            _ => None,
        }
    }
}

/// 16-bit unsigned constant folding for one binary operator. `None` for
/// division/modulo by zero.
pub(crate) fn fold_binary(op: BinaryOp, l: i64, r: i64) -> Option<i64> {
    let (l, r) = (l & 0xFFFF, r & 0xFFFF);
    let folded = match op {
        BinaryOp::Add => (l + r) & 0xFFFF,
        BinaryOp::Sub => (l - r) & 0xFFFF,
        BinaryOp::Mul => (l * r) & 0xFFFF,
        BinaryOp::Div => {
            if r == 0 {
                return None;
            }
            l / r
        }
        BinaryOp::Mod => {
            if r == 0 {
                return None;
            }
            l % r
        }
        BinaryOp::BitAnd => l & r,
        BinaryOp::BitOr => l | r,
        BinaryOp::BitXor => l ^ r,
        BinaryOp::Shl => (l << (r & 0x0F)) & 0xFFFF,
        BinaryOp::Shr => (l & 0xFFFF) >> (r & 0x0F),
        BinaryOp::Eq => i64::from(l == r),
        BinaryOp::Ne => i64::from(l != r),
        BinaryOp::Lt => i64::from(l < r),
        BinaryOp::Le => i64::from(l <= r),
        BinaryOp::Gt => i64::from(l > r),
        BinaryOp::Ge => i64::from(l >= r),
        BinaryOp::And => i64::from(l != 0 && r != 0),
        BinaryOp::Or => i64::from(l != 0 || r != 0),
    };
    Some(folded)
}
