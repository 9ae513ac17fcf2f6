//! Type checking, constant folding and lvalue verification
//!
//! Expressions are visited bottom-up; each gets an [`ExprInfo`] annotation
//! with its type, constness and folded value. A node that fails to check
//! becomes `Unknown` so one mistake does not cascade.

use crate::analyzer::{fold_binary, Analyzer, ExprInfo};
use crate::intrinsics::Intrinsic;
use crate::symbols::{SymbolFlags, SymbolKind};
use crate::types::{binary_result, can_assign, unary_result, Type};
use sable_common::{DiagnosticCode, Span};
use sable_parser::{
    BinaryOp, Block, Expr, ExprKind, Function, ItemKind, Literal, LocalVariable, Program, Stmt,
    StmtKind, UnaryOp, VariableDecl,
};

/// Name of the synthetic symbol carrying the enclosing function's expected
/// return type.
const RETURN_SLOT: &str = "$return";

impl Analyzer {
    pub(crate) fn check_program(&mut self, program: &Program) {
        for item in &program.items {
            match &item.kind {
                ItemKind::Variable(var) => self.check_global(var),
                ItemKind::Function(func) => self.check_function(func),
                _ => {}
            }
        }
    }

    fn check_global(&mut self, var: &VariableDecl) {
        let target_ty = self
            .symbols
            .lookup(&var.name.value)
            .map(|s| s.ty.clone())
            .unwrap_or(Type::Unknown);

        if let Some(init) = &var.initializer {
            let info = self.check_expr(init);
            self.check_assignable(&info, &target_ty, init.span);
        }
        if let Some(storage) = &var.storage {
            if let Some(address) = &storage.address {
                let info = self.check_expr(address);
                if !info.ty.is_unknown() && info.ty.numeric_repr().is_none() {
                    self.diagnostics.error(
                        DiagnosticCode::TypeMismatch,
                        format!("address expression must be numeric, found {}", info.ty),
                        address.span,
                    );
                }
            }
        }
    }

    fn check_function(&mut self, func: &Function) {
        let Some(body) = &func.body else {
            return; // stubs have nothing to check
        };

        let return_type = self
            .symbols
            .lookup(&func.name.value)
            .and_then(|s| match &s.ty {
                Type::Function { ret, .. } => Some((**ret).clone()),
                _ => None,
            })
            .unwrap_or(Type::Void);

        self.symbols.enter_scope();
        for param in &func.params {
            let ty = self.resolve_type_expr(&param.ty);
            if ty == Type::Void {
                self.diagnostics.error(
                    DiagnosticCode::TypeMismatch,
                    format!("parameter '{}' cannot be void", param.name.value),
                    param.span,
                );
            }
            if let Err(existing) = self.symbols.declare(
                &param.name.value,
                SymbolKind::Parameter,
                param.name.span,
                ty,
                SymbolFlags::default(),
            ) {
                let prev = self.symbols.symbol(existing).span;
                self.diagnostics.push(
                    sable_common::Diagnostic::error(
                        DiagnosticCode::DuplicateDeclaration,
                        format!("duplicate parameter '{}'", param.name.value),
                        param.name.span,
                    )
                    .with_related(prev),
                );
            }
        }
        let _ = self.symbols.declare(
            RETURN_SLOT,
            SymbolKind::Type,
            func.name.span,
            return_type,
            SymbolFlags::default(),
        );

        self.check_block(body);
        self.symbols.exit_scope();
    }

    fn check_block(&mut self, block: &Block) {
        self.symbols.enter_scope();
        for stmt in &block.statements {
            self.check_stmt(stmt);
        }
        self.symbols.exit_scope();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Block(block) => self.check_block(block),
            StmtKind::Expr(expr) => {
                self.check_expr(expr);
            }
            StmtKind::Local(local) => self.check_local(local, stmt.id),
            StmtKind::If { condition, then_block, else_block } => {
                self.check_condition(condition);
                self.check_block(then_block);
                if let Some(else_block) = else_block {
                    self.check_block(else_block);
                }
            }
            StmtKind::While { condition, body } => {
                self.check_condition(condition);
                self.loop_depth += 1;
                self.breakable_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
                self.breakable_depth -= 1;
            }
            StmtKind::For { var, start, end, step, body, direction: _ } => {
                let start_info = self.check_expr(start);
                let end_info = self.check_expr(end);
                if let Some(step) = step {
                    let step_info = self.check_expr(step);
                    self.require_numeric(&step_info, step.span, "for-loop step");
                }
                self.require_numeric(&start_info, start.span, "for-loop bound");
                self.require_numeric(&end_info, end.span, "for-loop bound");

                // The induction variable lives in the loop's own scope; its
                // width follows the wider bound.
                let var_ty = match (start_info.ty.numeric_repr(), end_info.ty.numeric_repr()) {
                    (Some(Type::Word), _) | (_, Some(Type::Word)) => Type::Word,
                    _ => Type::Byte,
                };
                self.local_types.insert(stmt.id, var_ty.clone());
                self.symbols.enter_scope();
                let _ = self.symbols.declare(
                    &var.value,
                    SymbolKind::Variable,
                    var.span,
                    var_ty,
                    SymbolFlags::default(),
                );
                self.loop_depth += 1;
                self.breakable_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
                self.breakable_depth -= 1;
                self.symbols.exit_scope();
            }
            StmtKind::Switch { scrutinee, cases, default } => {
                let scrutinee_info = self.check_expr(scrutinee);
                self.require_numeric(&scrutinee_info, scrutinee.span, "switch scrutinee");

                self.breakable_depth += 1;
                for case in cases {
                    let value_info = self.check_expr(&case.value);
                    if !value_info.is_const && !value_info.ty.is_unknown() {
                        self.diagnostics.error(
                            DiagnosticCode::TypeMismatch,
                            "case label must be a constant expression",
                            case.value.span,
                        );
                    }
                    self.symbols.enter_scope();
                    for stmt in &case.body {
                        self.check_stmt(stmt);
                    }
                    self.symbols.exit_scope();
                }
                if let Some(default) = default {
                    self.symbols.enter_scope();
                    for stmt in default {
                        self.check_stmt(stmt);
                    }
                    self.symbols.exit_scope();
                }
                self.breakable_depth -= 1;
            }
            StmtKind::Break => {
                if self.breakable_depth == 0 {
                    self.diagnostics.error(
                        DiagnosticCode::BreakOutsideLoop,
                        "'break' outside a loop or switch",
                        stmt.span,
                    );
                }
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.diagnostics.error(
                        DiagnosticCode::ContinueOutsideLoop,
                        "'continue' outside a loop",
                        stmt.span,
                    );
                }
            }
            StmtKind::Return(value) => {
                let expected = self
                    .symbols
                    .lookup(RETURN_SLOT)
                    .map(|s| s.ty.clone())
                    .unwrap_or(Type::Void);
                match value {
                    Some(expr) => {
                        let info = self.check_expr(expr);
                        if expected == Type::Void {
                            self.diagnostics.error(
                                DiagnosticCode::TypeMismatch,
                                "void function cannot return a value",
                                expr.span,
                            );
                        } else {
                            self.check_assignable(&info, &expected, expr.span);
                        }
                    }
                    None => {
                        if expected != Type::Void && !expected.is_unknown() {
                            self.diagnostics.error(
                                DiagnosticCode::MissingReturn,
                                format!("function must return {}", expected),
                                stmt.span,
                            );
                        }
                    }
                }
            }
        }
    }

    fn check_local(&mut self, local: &LocalVariable, stmt_id: sable_parser::NodeId) {
        let declared = local.ty.as_ref().map(|t| self.resolve_type_expr(t));
        let init_info = local.initializer.as_ref().map(|e| (self.check_expr(e), e.span));

        let ty = match (&declared, &init_info) {
            (Some(ty), Some((info, span))) => {
                self.check_assignable(info, ty, *span);
                ty.clone()
            }
            (Some(ty), None) => ty.clone(),
            (None, Some((info, span))) => {
                if !info.ty.is_assignable() {
                    if !info.ty.is_unknown() {
                        self.diagnostics.error(
                            DiagnosticCode::TypeMismatch,
                            format!("cannot declare a variable of type {}", info.ty),
                            *span,
                        );
                    }
                    Type::Unknown
                } else {
                    info.ty.clone()
                }
            }
            (None, None) => {
                self.diagnostics.error(
                    DiagnosticCode::TypeMismatch,
                    format!("'{}' needs a type annotation or an initializer", local.name.value),
                    local.name.span,
                );
                Type::Unknown
            }
        };

        self.local_types.insert(stmt_id, ty.clone());

        if let Err(existing) = self.symbols.declare_variable(
            &local.name.value,
            local.name.span,
            ty,
            SymbolFlags { is_const: local.is_const, ..SymbolFlags::default() },
        ) {
            let prev = self.symbols.symbol(existing).span;
            self.diagnostics.push(
                sable_common::Diagnostic::error(
                    DiagnosticCode::DuplicateDeclaration,
                    format!("duplicate declaration of '{}'", local.name.value),
                    local.name.span,
                )
                .with_related(prev),
            );
        }
    }

    fn check_condition(&mut self, expr: &Expr) {
        let info = self.check_expr(expr);
        if !info.ty.is_bool_like() && !info.ty.is_unknown() {
            self.diagnostics.error(
                DiagnosticCode::TypeMismatch,
                format!("condition must be boolean, found {}", info.ty),
                expr.span,
            );
        }
    }

    fn require_numeric(&mut self, info: &ExprInfo, span: Span, what: &str) {
        if info.ty.numeric_repr().is_none() && !info.ty.is_unknown() {
            self.diagnostics.error(
                DiagnosticCode::TypeMismatch,
                format!("{} must be numeric, found {}", what, info.ty),
                span,
            );
        }
    }

    /// Assignability plus constant range checking. A constant that does not
    /// fit the target is an error, not a silent wrap.
    fn check_assignable(&mut self, source: &ExprInfo, target: &Type, span: Span) {
        if target.is_unknown() || source.ty.is_unknown() {
            return;
        }
        // Array initializers: element-wise compatible and no longer than
        // the target. An empty literal fits any array.
        if let (
            Type::Array { element: se, len: Some(n) },
            Type::Array { element: te, len },
        ) = (&source.ty, target)
        {
            let elements_fit = *n == 0 || can_assign(se, te);
            let length_fits = len.map_or(true, |m| *n <= m);
            if elements_fit && length_fits {
                return;
            }
        }
        if let (true, Some(value), Some(max)) = (source.is_const, source.value, target.max_value())
        {
            if value < 0 || value as u32 > max {
                self.diagnostics.error(
                    DiagnosticCode::TypeMismatch,
                    format!("value {} does not fit in {}", value, target),
                    span,
                );
                return;
            }
            // In-range constants cross width boundaries freely.
            if source.ty.numeric_repr().is_some() {
                return;
            }
        }
        if !can_assign(&source.ty, target) {
            self.diagnostics.error(
                DiagnosticCode::TypeMismatch,
                format!("cannot assign {} to {}", source.ty, target),
                span,
            );
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub(crate) fn check_expr(&mut self, expr: &Expr) -> ExprInfo {
        let info = self.check_expr_inner(expr);
        self.expr_info.insert(expr.id, info.clone());
        info
    }

    fn check_expr_inner(&mut self, expr: &Expr) -> ExprInfo {
        match expr.kind.as_ref() {
            ExprKind::Literal(literal) => self.check_literal(literal, expr.span),
            ExprKind::Identifier(name) => self.check_identifier(name, expr.span),
            ExprKind::Member { base, member } => self.check_member(base, member),
            ExprKind::Binary { op, left, right } => self.check_binary(*op, left, right, expr.span),
            ExprKind::Unary { op, operand } => self.check_unary(*op, operand, expr.span),
            ExprKind::Ternary { condition, then_expr, else_expr } => {
                self.check_ternary(condition, then_expr, else_expr, expr.span)
            }
            ExprKind::Call { callee, args } => self.check_call(callee, args, expr.span),
            ExprKind::Index { base, index } => self.check_index(base, index),
            ExprKind::ArrayLiteral(elements) => self.check_array_literal(elements),
            ExprKind::Assign { target, op, value } => self.check_assign(target, *op, value),
        }
    }

    fn check_literal(&mut self, literal: &Literal, span: Span) -> ExprInfo {
        match literal {
            Literal::Number { value, .. } => {
                let v = *value;
                if v <= 0xFF {
                    ExprInfo::constant(Type::Byte, i64::from(v))
                } else if v <= 0xFFFF {
                    ExprInfo::constant(Type::Word, i64::from(v))
                } else {
                    self.diagnostics.error(
                        DiagnosticCode::TypeMismatch,
                        format!("number {} exceeds the 16-bit range", v),
                        span,
                    );
                    ExprInfo::constant(Type::Word, i64::from(v & 0xFFFF))
                }
            }
            Literal::Str(_) => ExprInfo::non_const(Type::Str),
            Literal::Bool(b) => ExprInfo::constant(Type::Bool, i64::from(*b)),
        }
    }

    fn check_identifier(&mut self, name: &str, span: Span) -> ExprInfo {
        let Some(sym) = self.symbols.lookup(name) else {
            self.diagnostics.error(
                DiagnosticCode::UndefinedIdentifier,
                format!("undefined identifier '{}'", name),
                span,
            );
            return ExprInfo::non_const(Type::Unknown);
        };
        let (id, kind, ty) = (sym.id, sym.kind, sym.ty.clone());
        match kind {
            SymbolKind::Variable | SymbolKind::Parameter => {
                if let Some(&value) = self.const_globals.get(&id) {
                    ExprInfo::constant(ty, value)
                } else {
                    ExprInfo::non_const(ty)
                }
            }
            SymbolKind::Function => ExprInfo::non_const(ty),
            SymbolKind::Type | SymbolKind::Enum | SymbolKind::EnumMember | SymbolKind::Module => {
                self.diagnostics.error(
                    DiagnosticCode::InvalidOperand,
                    format!("'{}' is not a value", name),
                    span,
                );
                ExprInfo::non_const(Type::Unknown)
            }
        }
    }

    fn check_member(
        &mut self,
        base: &sable_common::Spanned<String>,
        member: &sable_common::Spanned<String>,
    ) -> ExprInfo {
        let Some(sym) = self.symbols.lookup(&base.value) else {
            self.diagnostics.error(
                DiagnosticCode::UndefinedIdentifier,
                format!("undefined identifier '{}'", base.value),
                base.span,
            );
            return ExprInfo::non_const(Type::Unknown);
        };
        let ty = sym.ty.clone();
        match &ty {
            Type::Enum { members, .. } => {
                let found = members.iter().find(|(n, _)| n == &member.value).map(|(_, v)| *v);
                match found {
                    Some(value) => ExprInfo::constant(ty.clone(), value),
                    None => {
                        self.diagnostics.error(
                            DiagnosticCode::UndefinedIdentifier,
                            format!("'{}' has no member '{}'", base.value, member.value),
                            member.span,
                        );
                        ExprInfo::non_const(Type::Unknown)
                    }
                }
            }
            Type::Unknown => ExprInfo::non_const(Type::Unknown),
            other => {
                self.diagnostics.error(
                    DiagnosticCode::InvalidOperand,
                    format!("member access is only valid on enums, found {}", other),
                    base.span,
                );
                ExprInfo::non_const(Type::Unknown)
            }
        }
    }

    fn check_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, span: Span) -> ExprInfo {
        let li = self.check_expr(left);
        let ri = self.check_expr(right);

        let Some(ty) = binary_result(op, &li.ty, &ri.ty) else {
            self.diagnostics.error(
                DiagnosticCode::InvalidOperand,
                format!("operator '{}' cannot be applied to {} and {}", op, li.ty, ri.ty),
                span,
            );
            return ExprInfo::non_const(Type::Unknown);
        };

        // Short-circuit operators fold from a constant left operand alone.
        if op.is_logical() {
            if let (true, Some(lv)) = (li.is_const, li.value) {
                match (op, lv != 0) {
                    (BinaryOp::And, false) => return ExprInfo::constant(Type::Bool, 0),
                    (BinaryOp::Or, true) => return ExprInfo::constant(Type::Bool, 1),
                    _ => {
                        return if let (true, Some(rv)) = (ri.is_const, ri.value) {
                            ExprInfo::constant(Type::Bool, i64::from(rv != 0))
                        } else {
                            ExprInfo::non_const(Type::Bool)
                        };
                    }
                }
            }
            return ExprInfo::non_const(ty);
        }

        if let (true, Some(lv), true, Some(rv)) = (li.is_const, li.value, ri.is_const, ri.value) {
            match fold_binary(op, lv, rv) {
                Some(folded) => {
                    let masked = if ty.is_numeric() {
                        folded & i64::from(ty.value_mask())
                    } else {
                        folded
                    };
                    return ExprInfo::constant(ty, masked);
                }
                None => {
                    self.diagnostics.warning(
                        DiagnosticCode::DivisionByZero,
                        "division by zero in constant expression",
                        span,
                    );
                    return ExprInfo::non_const(ty);
                }
            }
        }

        ExprInfo::non_const(ty)
    }

    fn check_unary(&mut self, op: UnaryOp, operand: &Expr, span: Span) -> ExprInfo {
        let oi = self.check_expr(operand);

        if op == UnaryOp::AddressOf {
            // The parser guarantees the operand is an identifier; it must
            // name something with a memory address, not a register local.
            if let ExprKind::Identifier(name) = operand.kind.as_ref() {
                let module_sym = self.symbols.lookup_module_scope(name).map(|s| s.id);
                let found = self.symbols.lookup(name).map(|s| s.id);
                if found.is_some() && found != module_sym {
                    self.diagnostics.error(
                        DiagnosticCode::InvalidOperand,
                        format!("cannot take the address of local '{}'", name),
                        span,
                    );
                }
            }
            return ExprInfo::non_const(Type::Word);
        }

        let Some(ty) = unary_result(op, &oi.ty) else {
            self.diagnostics.error(
                DiagnosticCode::InvalidOperand,
                format!("operator '{}' cannot be applied to {}", op, oi.ty),
                span,
            );
            return ExprInfo::non_const(Type::Unknown);
        };

        if let (true, Some(v)) = (oi.is_const, oi.value) {
            let folded = match op {
                UnaryOp::Plus => v,
                UnaryOp::Neg => (0x10000 - (v & 0xFFFF)) & 0xFFFF,
                UnaryOp::BitNot => !v & 0xFFFF,
                UnaryOp::Not => i64::from(v == 0),
                UnaryOp::AddressOf => unreachable!("handled above"),
            };
            let masked = if ty.is_numeric() {
                folded & i64::from(ty.value_mask())
            } else {
                folded
            };
            return ExprInfo::constant(ty, masked);
        }

        ExprInfo::non_const(ty)
    }

    fn check_ternary(
        &mut self,
        condition: &Expr,
        then_expr: &Expr,
        else_expr: &Expr,
        span: Span,
    ) -> ExprInfo {
        let ci = self.check_expr(condition);
        if !ci.ty.is_bool_like() && !ci.ty.is_unknown() {
            self.diagnostics.error(
                DiagnosticCode::TypeMismatch,
                format!("ternary condition must be boolean, found {}", ci.ty),
                condition.span,
            );
        }
        let ti = self.check_expr(then_expr);
        let ei = self.check_expr(else_expr);

        let ty = if ti.ty == ei.ty {
            ti.ty.clone()
        } else if ti.ty.is_unknown() || ei.ty.is_unknown() {
            Type::Unknown
        } else {
            match (ti.ty.numeric_repr(), ei.ty.numeric_repr()) {
                (Some(Type::Word), Some(_)) | (Some(_), Some(Type::Word)) => Type::Word,
                (Some(_), Some(_)) => Type::Byte,
                _ => {
                    self.diagnostics.error(
                        DiagnosticCode::TypeMismatch,
                        format!("ternary branches disagree: {} vs {}", ti.ty, ei.ty),
                        span,
                    );
                    Type::Unknown
                }
            }
        };

        // A constant condition selects its branch at compile time.
        if let (true, Some(cv)) = (ci.is_const, ci.value) {
            let chosen = if cv != 0 { &ti } else { &ei };
            if let (true, Some(v)) = (chosen.is_const, chosen.value) {
                return ExprInfo::constant(ty, v);
            }
        }
        ExprInfo::non_const(ty)
    }

    fn check_call(
        &mut self,
        callee: &sable_common::Spanned<String>,
        args: &[Expr],
        span: Span,
    ) -> ExprInfo {
        if let Some(intrinsic) = Intrinsic::lookup(&callee.value) {
            return self.check_intrinsic_call(intrinsic, args, span);
        }

        let Some(sym) = self.symbols.lookup(&callee.value) else {
            self.diagnostics.error(
                DiagnosticCode::UndefinedIdentifier,
                format!("undefined identifier '{}'", callee.value),
                callee.span,
            );
            for arg in args {
                self.check_expr(arg);
            }
            return ExprInfo::non_const(Type::Unknown);
        };
        let (kind, ty) = (sym.kind, sym.ty.clone());

        match (kind, ty) {
            (_, Type::Unknown) => {
                // Imported stub with an externally resolved signature.
                for arg in args {
                    self.check_expr(arg);
                }
                ExprInfo::non_const(Type::Unknown)
            }
            (SymbolKind::Function, Type::Function { params, ret })
            | (SymbolKind::Variable, Type::Function { params, ret })
            | (SymbolKind::Parameter, Type::Function { params, ret }) => {
                if args.len() != params.len() {
                    self.diagnostics.error(
                        DiagnosticCode::ArityMismatch,
                        format!(
                            "'{}' expects {} argument(s), found {}",
                            callee.value,
                            params.len(),
                            args.len()
                        ),
                        span,
                    );
                    for arg in args {
                        self.check_expr(arg);
                    }
                    return ExprInfo::non_const((*ret).clone());
                }
                for (arg, param_ty) in args.iter().zip(params.iter()) {
                    let info = self.check_expr(arg);
                    self.check_assignable(&info, param_ty, arg.span);
                }
                ExprInfo::non_const((*ret).clone())
            }
            (_, other) => {
                self.diagnostics.error(
                    DiagnosticCode::NotCallable,
                    format!("'{}' is not callable (type {})", callee.value, other),
                    callee.span,
                );
                for arg in args {
                    self.check_expr(arg);
                }
                ExprInfo::non_const(Type::Unknown)
            }
        }
    }

    fn check_intrinsic_call(&mut self, intrinsic: Intrinsic, args: &[Expr], span: Span) -> ExprInfo {
        let params = intrinsic.params();
        if args.len() != params.len() {
            self.diagnostics.error(
                DiagnosticCode::ArityMismatch,
                format!(
                    "'{}' expects {} argument(s), found {}",
                    intrinsic.name(),
                    params.len(),
                    args.len()
                ),
                span,
            );
            for arg in args {
                self.check_expr(arg);
            }
            return ExprInfo::non_const(intrinsic.return_type());
        }

        match intrinsic {
            Intrinsic::Sizeof => {
                let ty = self.type_of_sizeof_operand(&args[0]);
                ExprInfo::constant(Type::Byte, i64::from(ty.size_in_bytes()))
            }
            Intrinsic::Length => {
                let info = self.check_expr(&args[0]);
                match &info.ty {
                    Type::Array { len: Some(n), .. } => {
                        ExprInfo::constant(Type::Word, i64::from(*n))
                    }
                    Type::Array { len: None, .. } => {
                        self.diagnostics.error(
                            DiagnosticCode::InvalidOperand,
                            "'length' needs an array with a known size",
                            args[0].span,
                        );
                        ExprInfo::non_const(Type::Word)
                    }
                    Type::Unknown => ExprInfo::non_const(Type::Word),
                    other => {
                        self.diagnostics.error(
                            DiagnosticCode::InvalidOperand,
                            format!("'length' needs an array, found {}", other),
                            args[0].span,
                        );
                        ExprInfo::non_const(Type::Word)
                    }
                }
            }
            _ => {
                for (arg, param_ty) in args.iter().zip(params.iter()) {
                    let info = self.check_expr(arg);
                    self.check_assignable(&info, param_ty, arg.span);
                }
                ExprInfo::non_const(intrinsic.return_type())
            }
        }
    }

    /// `sizeof` takes either a type name or a value expression.
    fn type_of_sizeof_operand(&mut self, arg: &Expr) -> Type {
        if let ExprKind::Identifier(name) = arg.kind.as_ref() {
            if let Some(sym) = self.symbols.lookup(name) {
                if matches!(sym.kind, SymbolKind::Type | SymbolKind::Enum) {
                    let ty = sym.ty.clone();
                    self.expr_info.insert(arg.id, ExprInfo::non_const(ty.clone()));
                    return ty;
                }
            }
        }
        self.check_expr(arg).ty
    }

    fn check_index(&mut self, base: &Expr, index: &Expr) -> ExprInfo {
        let bi = self.check_expr(base);
        let ii = self.check_expr(index);
        self.require_numeric(&ii, index.span, "array index");

        match &bi.ty {
            Type::Array { element, .. } => ExprInfo::non_const((**element).clone()),
            Type::Unknown => ExprInfo::non_const(Type::Unknown),
            other => {
                self.diagnostics.error(
                    DiagnosticCode::InvalidOperand,
                    format!("{} cannot be indexed", other),
                    base.span,
                );
                ExprInfo::non_const(Type::Unknown)
            }
        }
    }

    fn check_array_literal(&mut self, elements: &[Expr]) -> ExprInfo {
        let mut element_ty = Type::Byte;
        for (i, element) in elements.iter().enumerate() {
            let info = self.check_expr(element);
            if i == 0 && !info.ty.is_unknown() {
                element_ty = info.ty.clone();
            } else {
                self.check_assignable(&info, &element_ty, element.span);
            }
        }
        ExprInfo::non_const(Type::Array {
            element: Box::new(element_ty),
            len: Some(elements.len() as u16),
        })
    }

    /// The lvalue checker: an assignment target is an identifier or an
    /// array index, nothing else.
    fn check_assign(&mut self, target: &Expr, op: Option<BinaryOp>, value: &Expr) -> ExprInfo {
        let target_ty = match target.kind.as_ref() {
            ExprKind::Identifier(name) => {
                let info = self.check_expr(target);
                if let Some(sym) = self.symbols.lookup(name) {
                    if sym.flags.is_const {
                        self.diagnostics.error(
                            DiagnosticCode::AssignToConst,
                            format!("cannot assign to constant '{}'", name),
                            target.span,
                        );
                    }
                }
                info.ty
            }
            ExprKind::Index { .. } => self.check_expr(target).ty,
            _ => {
                self.diagnostics.error(
                    DiagnosticCode::InvalidAssignmentTarget,
                    "assignment target must be an identifier or an array element",
                    target.span,
                );
                self.check_expr(value);
                return ExprInfo::non_const(Type::Unknown);
            }
        };

        let value_info = self.check_expr(value);
        match op {
            Some(binop) => {
                // Compound assignment: the combined result must still fit
                // the target.
                match binary_result(binop, &target_ty, &value_info.ty) {
                    Some(result_ty) => {
                        if !can_assign(&result_ty, &target_ty) {
                            self.diagnostics.error(
                                DiagnosticCode::TypeMismatch,
                                format!("cannot assign {} back to {}", result_ty, target_ty),
                                value.span,
                            );
                        }
                    }
                    None => {
                        self.diagnostics.error(
                            DiagnosticCode::InvalidOperand,
                            format!(
                                "operator '{}' cannot be applied to {} and {}",
                                binop, target_ty, value_info.ty
                            ),
                            value.span,
                        );
                    }
                }
            }
            None => self.check_assignable(&value_info, &target_ty, value.span),
        }

        ExprInfo::non_const(target_ty)
    }
}
