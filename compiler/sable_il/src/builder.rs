//! AST → IL lowering
//!
//! Five phases per module: imports, globals, function stubs (so forward
//! references and mutual recursion work), function bodies, exports and the
//! entry point. Expressions the checker folded arrive here as constants
//! and lower straight to `Const` instructions.
//!
//! Locals live in virtual registers: every assignment produces a fresh
//! register and records the definition site; reads go through `Copy`
//! instructions whose operands SSA renaming later rewires to the
//! dominating version.

use crate::il::*;
use hashbrown::HashMap;
use sable_common::{
    Diagnostics, DiagnosticCode, MetaKey, MetaValue, Span,
};
use sable_parser::{
    BinaryOp, Block, Expr, ExprKind, ForDirection, Function as AstFunction, ItemKind, Literal,
    Program, Stmt, StmtKind, StorageClassKind, UnaryOp,
};
use sable_sema::{Analysis, ExprInfo, Intrinsic, Type};

/// Lower an analyzed program to an IL module.
pub fn lower_program(program: &Program, analysis: &Analysis) -> (Module, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let mut module = Module::new(&program.module.name());

    // Phase 1: imports.
    for item in &program.items {
        if let ItemKind::Import(import) = &item.kind {
            for name in &import.names {
                module.imports.push(IlImport {
                    name: name.value.clone(),
                    module_path: import.path.join("."),
                });
            }
        }
    }

    // Phase 2: globals.
    for item in &program.items {
        if let ItemKind::Variable(var) = &item.kind {
            lower_global(var, analysis, &mut module, &mut diagnostics);
        }
    }

    // Phase 3: every function is created with its signature and entry
    // block before any body is lowered.
    for item in &program.items {
        if let ItemKind::Function(func) = &item.kind {
            let (params, ret) = function_signature(func, analysis);
            module.add_function(Function::new(
                &func.name.value,
                params,
                ret,
                func.is_exported,
                func.is_callback,
                func.is_stub(),
            ));
        }
    }

    // Side tables so body lowering only needs one mutable borrow.
    let global_types: HashMap<String, IlType> = module
        .globals
        .iter()
        .map(|g| (g.name.clone(), g.ty.clone()))
        .collect();
    let func_sigs: HashMap<String, (Vec<IlType>, IlType)> = module
        .functions
        .iter()
        .map(|f| {
            let params = f.params.iter().map(|p| p.ty.clone()).collect();
            (f.name.clone(), (params, f.return_type.clone()))
        })
        .collect();

    // Phase 4: function bodies.
    for item in &program.items {
        let ItemKind::Function(ast_func) = &item.kind else {
            continue;
        };
        let Some(body) = &ast_func.body else {
            continue;
        };
        let Some(func) = module.function_mut(&ast_func.name.value) else {
            continue;
        };
        let lowerer = FunctionLowerer {
            current: func.entry,
            func,
            analysis,
            diagnostics: &mut diagnostics,
            global_types: &global_types,
            func_sigs: &func_sigs,
            terminated: false,
            scopes: Vec::new(),
            var_regs: HashMap::new(),
            loop_stack: Vec::new(),
            hoisted: Vec::new(),
        };
        let hoisted = lowerer.lower_body(ast_func, body);
        module.globals.extend(hoisted);
    }

    // Phase 5: exports and the entry point.
    for item in &program.items {
        match &item.kind {
            ItemKind::Function(func) if func.is_exported => {
                module.exports.push(IlExport {
                    local_name: func.name.value.clone(),
                    export_name: func.name.value.clone(),
                    kind: ExportKind::Function,
                });
            }
            ItemKind::Variable(var) if var.is_exported => {
                module.exports.push(IlExport {
                    local_name: var.name.value.clone(),
                    export_name: var.name.value.clone(),
                    kind: ExportKind::Variable,
                });
            }
            _ => {}
        }
    }
    if module.function("main").is_some() {
        module.entry_point = Some("main".to_string());
    }

    log::debug!(
        "lowered module '{}': {} globals, {} functions",
        module.name,
        module.globals.len(),
        module.functions.len()
    );
    (module, diagnostics)
}

/// Map a semantic type onto its IL representation. Unsized arrays and
/// strings are passed around as 16-bit addresses.
pub fn lower_type(ty: &Type) -> IlType {
    match ty {
        Type::Byte => IlType::Byte,
        Type::Word => IlType::Word,
        Type::Bool => IlType::Bool,
        Type::Void => IlType::Void,
        Type::Str => IlType::Pointer,
        Type::Array { element, len } => match len {
            Some(n) => IlType::Array { element: Box::new(lower_type(element)), len: Some(*n) },
            None => IlType::Pointer,
        },
        Type::Function { params, ret } => IlType::Function {
            params: params.iter().map(lower_type).collect(),
            ret: Box::new(lower_type(ret)),
        },
        Type::Enum { .. } => {
            if ty.size_in_bytes() == 2 {
                IlType::Word
            } else {
                IlType::Byte
            }
        }
        // Error recovery: lower as the narrowest storable thing.
        Type::Unknown => IlType::Byte,
    }
}

fn storage_class(storage: Option<StorageClassKind>) -> StorageClass {
    match storage {
        Some(StorageClassKind::ZeroPage) => StorageClass::ZeroPage,
        Some(StorageClassKind::Ram) | None => StorageClass::Ram,
        Some(StorageClassKind::Data) => StorageClass::Data,
        Some(StorageClassKind::Address) => StorageClass::Map,
    }
}

fn function_signature(func: &AstFunction, analysis: &Analysis) -> (Vec<(String, IlType)>, IlType) {
    if let Some(sym) = analysis.symbols.lookup_module_scope(&func.name.value) {
        if let Type::Function { params, ret } = &sym.ty {
            let named = func
                .params
                .iter()
                .zip(params.iter())
                .map(|(p, ty)| (p.name.value.clone(), lower_type(ty)))
                .collect();
            return (named, lower_type(ret));
        }
    }
    // Fallback when declaration collection failed for this name.
    let named = func
        .params
        .iter()
        .map(|p| (p.name.value.clone(), IlType::Byte))
        .collect();
    (named, IlType::Void)
}

fn lower_global(
    var: &sable_parser::VariableDecl,
    analysis: &Analysis,
    module: &mut Module,
    diagnostics: &mut Diagnostics,
) {
    let ty = analysis
        .symbols
        .lookup_module_scope(&var.name.value)
        .map(|s| lower_type(&s.ty))
        .unwrap_or(IlType::Byte);

    let storage = storage_class(var.storage.as_ref().map(|s| s.class));

    // Map globals need an address that folded to a constant.
    let address = match var.storage.as_ref().and_then(|s| s.address.as_ref()) {
        Some(expr) => {
            let value = analysis
                .expr_info
                .get(&expr.id)
                .filter(|info| info.is_const)
                .and_then(|info| info.value);
            match value {
                Some(v) if (0..=0xFFFF).contains(&v) => Some(v as u16),
                _ => {
                    diagnostics.error(
                        DiagnosticCode::NonConstantAddress,
                        format!("'@address' for '{}' must be a constant address", var.name.value),
                        expr.span,
                    );
                    return; // this global is abandoned, the module continues
                }
            }
        }
        None => None,
    };

    let initial = var.initializer.as_ref().and_then(|init| {
        extract_initial(init, analysis).or_else(|| {
            diagnostics.error(
                DiagnosticCode::UnsupportedConstruct,
                format!("initializer for global '{}' must be constant", var.name.value),
                init.span,
            );
            None
        })
    });

    module.globals.push(GlobalVariable {
        name: var.name.value.clone(),
        ty,
        storage,
        initial,
        address,
        is_exported: var.is_exported,
        is_const: var.is_const,
    });
}

/// Constant initial value of a global: a folded scalar (booleans lower to
/// 0/1) or an array literal of folded scalars.
fn extract_initial(init: &Expr, analysis: &Analysis) -> Option<GlobalInit> {
    if let ExprKind::ArrayLiteral(elements) = init.kind.as_ref() {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            let info = analysis.expr_info.get(&element.id)?;
            values.push(info.value.filter(|_| info.is_const)?);
        }
        return Some(GlobalInit::Array(values));
    }
    let info = analysis.expr_info.get(&init.id)?;
    info.value.filter(|_| info.is_const).map(GlobalInit::Scalar)
}

/// Resolution of a name inside a function body.
enum LocalSlot {
    Var(VarId),
    /// A local array hoisted to a module global.
    Hoisted(String),
}

struct LoopCtx {
    /// `None` for switches; `continue` searches outward.
    continue_target: Option<BlockId>,
    break_target: BlockId,
}

struct FunctionLowerer<'a> {
    func: &'a mut Function,
    analysis: &'a Analysis,
    diagnostics: &'a mut Diagnostics,
    global_types: &'a HashMap<String, IlType>,
    func_sigs: &'a HashMap<String, (Vec<IlType>, IlType)>,
    current: BlockId,
    terminated: bool,
    scopes: Vec<HashMap<String, LocalSlot>>,
    /// Last-assigned register per variable; flow-insensitive until SSA
    /// renaming fixes the uses.
    var_regs: HashMap<VarId, ValueId>,
    loop_stack: Vec<LoopCtx>,
    hoisted: Vec<GlobalVariable>,
}

impl<'a> FunctionLowerer<'a> {
    fn lower_body(mut self, ast_func: &AstFunction, body: &Block) -> Vec<GlobalVariable> {
        self.scopes.push(HashMap::new());

        // Parameters are variable slots whose first definition is the
        // pre-allocated parameter register at entry.
        let params: Vec<(String, IlType, ValueId)> = self
            .func
            .params
            .iter()
            .map(|p| (p.name.clone(), p.ty.clone(), p.register))
            .collect();
        for (name, ty, register) in params {
            let var = self.func.locals.add_slot(&name, ty);
            self.func.locals.params.push((var, register));
            self.var_regs.insert(var, register);
            self.scope_insert(&name, LocalSlot::Var(var));
        }

        self.lower_block(body);

        // Fall-through off the end of the body.
        if !self.terminated {
            let span = body.span;
            if self.func.return_type == IlType::Void {
                self.push(InstKind::ReturnVoid, None, span);
            } else {
                let ret_ty = self.func.return_type.clone();
                let zero = self.emit_const(Constant::zero(ret_ty), span);
                self.push(InstKind::Return(Value::Reg(zero)), None, span);
            }
        }

        self.scopes.pop();
        log::trace!(
            "lowered '{}': {} blocks, {} registers",
            ast_func.name.value,
            self.func.blocks.len(),
            self.func.register_count()
        );
        self.hoisted
    }

    // ------------------------------------------------------------------
    // Infrastructure
    // ------------------------------------------------------------------

    fn info(&self, expr: &Expr) -> Option<&ExprInfo> {
        self.analysis.expr_info.get(&expr.id)
    }

    fn expr_il_type(&self, expr: &Expr) -> IlType {
        self.info(expr).map(|i| lower_type(&i.ty)).unwrap_or(IlType::Byte)
    }

    fn push(&mut self, kind: InstKind, result: Option<ValueId>, span: Span) -> InstId {
        self.func.push_instruction(self.current, kind, result, span)
    }

    fn emit(&mut self, kind: InstKind, ty: IlType, span: Span) -> ValueId {
        let result = self.func.alloc_register(ty, None);
        self.push(kind, Some(result), span);
        result
    }

    fn emit_const(&mut self, constant: Constant, span: Span) -> ValueId {
        let ty = constant.ty.clone();
        self.emit(InstKind::Const(constant), ty, span)
    }

    fn start_block(&mut self, block: BlockId) {
        self.current = block;
        self.terminated = false;
    }

    fn jump(&mut self, target: BlockId, span: Span) {
        if !self.terminated {
            self.push(InstKind::Jump(target), None, span);
            self.terminated = true;
        }
    }

    fn scope_insert(&mut self, name: &str, slot: LocalSlot) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), slot);
        }
    }

    fn resolve_slot(&self, name: &str) -> Option<&LocalSlot> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn register_ty(&self, id: ValueId) -> IlType {
        self.func.register_type(id).cloned().unwrap_or(IlType::Byte)
    }

    /// Read the current version of a variable through a Copy whose operand
    /// SSA renaming will rewrite.
    fn read_var(&mut self, var: VarId, span: Span) -> ValueId {
        let ty = self.func.locals.slots[var as usize].1.clone();
        let source = match self.var_regs.get(&var) {
            Some(&reg) => Value::Reg(reg),
            // Use before any definition; renaming falls back to zero too.
            None => Value::Imm(Constant::zero(ty.clone())),
        };
        let result = self.func.alloc_register(ty, None);
        let inst = self.push(InstKind::Copy(source), Some(result), span);
        self.func.locals.record_use(inst, 0, var);
        result
    }

    /// Assign a new version of a variable: a fresh register defined by a
    /// Copy of the value.
    fn write_var(&mut self, var: VarId, value: Value, span: Span) -> ValueId {
        let ty = self.func.locals.slots[var as usize].1.clone();
        let name = self.func.locals.slots[var as usize].0.clone();
        let result = self.func.alloc_register(ty, Some(&name));
        let inst = self.push(InstKind::Copy(value), Some(result), span);
        let block = self.current;
        self.func.locals.record_def(var, block, inst);
        self.var_regs.insert(var, result);
        result
    }

    /// Width/representation coercion between scalar IL types.
    fn coerce(&mut self, value: ValueId, to: &IlType, span: Span) -> ValueId {
        let from = self.register_ty(value);
        if &from == to {
            return value;
        }
        match (&from, to) {
            (IlType::Byte, IlType::Word) | (IlType::Bool, IlType::Word) => self.emit(
                InstKind::Unary { op: UnaryIlOp::Zext, operand: Value::Reg(value) },
                IlType::Word,
                span,
            ),
            (IlType::Word, IlType::Byte) | (IlType::Pointer, IlType::Byte) => self.emit(
                InstKind::Unary { op: UnaryIlOp::Trunc, operand: Value::Reg(value) },
                IlType::Byte,
                span,
            ),
            (IlType::Bool, IlType::Byte) | (IlType::Byte, IlType::Bool) => {
                self.emit(InstKind::Copy(Value::Reg(value)), to.clone(), span)
            }
            (IlType::Word, IlType::Pointer) | (IlType::Pointer, IlType::Word) => {
                self.emit(InstKind::Copy(Value::Reg(value)), to.clone(), span)
            }
            (IlType::Byte, IlType::Pointer) => self.emit(
                InstKind::Unary { op: UnaryIlOp::Zext, operand: Value::Reg(value) },
                IlType::Pointer,
                span,
            ),
            _ => self.emit(InstKind::Copy(Value::Reg(value)), to.clone(), span),
        }
    }

    /// Boolean coercion: bytes and words test non-zero.
    fn as_bool(&mut self, value: ValueId, span: Span) -> ValueId {
        let ty = self.register_ty(value);
        if ty == IlType::Bool {
            return value;
        }
        let zero = Value::Imm(Constant::zero(ty));
        self.emit(
            InstKind::Cmp { op: CmpOp::Ne, lhs: Value::Reg(value), rhs: zero },
            IlType::Bool,
            span,
        )
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn lower_block(&mut self, block: &Block) {
        self.scopes.push(HashMap::new());
        for stmt in &block.statements {
            self.lower_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        // Statements after a terminator land in a fresh, unreachable
        // block; the validator reports those as warnings only.
        if self.terminated {
            let dead = self.func.add_block("dead");
            self.start_block(dead);
        }

        match &stmt.kind {
            StmtKind::Block(block) => self.lower_block(block),
            StmtKind::Expr(expr) => {
                // In statement position a void call needs no result
                // placeholder.
                if let ExprKind::Call { callee, args } = expr.kind.as_ref() {
                    self.lower_call(callee, args, expr);
                } else {
                    self.lower_expr(expr);
                }
            }
            StmtKind::Local(local) => self.lower_local(local, stmt.id, stmt.span),
            StmtKind::If { condition, then_block, else_block } => {
                self.lower_if(condition, then_block, else_block.as_ref(), stmt.span)
            }
            StmtKind::While { condition, body } => self.lower_while(condition, body, stmt.span),
            StmtKind::For { var, start, end, direction, step, body } => {
                self.lower_for(var, start, end, *direction, step.as_ref(), body, stmt.id, stmt.span)
            }
            StmtKind::Switch { scrutinee, cases, default } => {
                self.lower_switch(scrutinee, cases, default.as_deref(), stmt.span)
            }
            StmtKind::Break => {
                let target = self.loop_stack.iter().rev().map(|c| c.break_target).next();
                if let Some(target) = target {
                    self.jump(target, stmt.span);
                }
            }
            StmtKind::Continue => {
                let target = self
                    .loop_stack
                    .iter()
                    .rev()
                    .find_map(|c| c.continue_target);
                if let Some(target) = target {
                    self.jump(target, stmt.span);
                }
            }
            StmtKind::Return(value) => {
                match value {
                    Some(expr) => {
                        let reg = self.lower_expr(expr);
                        let ret_ty = self.func.return_type.clone();
                        let reg = self.coerce(reg, &ret_ty, expr.span);
                        self.push(InstKind::Return(Value::Reg(reg)), None, stmt.span);
                    }
                    None => {
                        self.push(InstKind::ReturnVoid, None, stmt.span);
                    }
                }
                self.terminated = true;
            }
        }
    }

    fn lower_local(
        &mut self,
        local: &sable_parser::LocalVariable,
        stmt_id: sable_parser::NodeId,
        span: Span,
    ) {
        // The checker recorded the declaration's resolved type; fall back
        // to the initializer annotation after semantic errors.
        let ty = match self.analysis.local_types.get(&stmt_id) {
            Some(t) if !t.is_unknown() => t.clone(),
            _ => local
                .initializer
                .as_ref()
                .and_then(|init| self.info(init).map(|i| i.ty.clone()))
                .unwrap_or(Type::Byte),
        };

        if let Type::Array { .. } = ty {
            self.hoist_local_array(local, &ty, span);
            return;
        }

        let il_ty = lower_type(&ty);
        let var = self.func.locals.add_slot(&local.name.value, il_ty.clone());
        self.scope_insert(&local.name.value, LocalSlot::Var(var));
        if let Some(init) = &local.initializer {
            let value = self.lower_expr(init);
            let value = self.coerce(value, &il_ty, init.span);
            self.write_var(var, Value::Reg(value), span);
        }
    }

    /// A local of array type cannot live in a register; it becomes a
    /// function-scoped module global.
    fn hoist_local_array(&mut self, local: &sable_parser::LocalVariable, ty: &Type, span: Span) {
        let global_name = format!("{}__{}", self.func.name, local.name.value);
        let il_ty = lower_type(ty);

        let initial = local.initializer.as_ref().and_then(|init| {
            if let ExprKind::ArrayLiteral(elements) = init.kind.as_ref() {
                let values: Option<Vec<i64>> = elements
                    .iter()
                    .map(|e| {
                        self.analysis
                            .expr_info
                            .get(&e.id)
                            .filter(|i| i.is_const)
                            .and_then(|i| i.value)
                    })
                    .collect();
                values.map(GlobalInit::Array)
            } else {
                None
            }
        });
        if local.initializer.is_some() && initial.is_none() {
            self.diagnostics.error(
                DiagnosticCode::UnsupportedConstruct,
                format!(
                    "initializer for array '{}' must be a constant array literal",
                    local.name.value
                ),
                span,
            );
        }

        self.hoisted.push(GlobalVariable {
            name: global_name.clone(),
            ty: il_ty,
            storage: StorageClass::Ram,
            initial,
            address: None,
            is_exported: false,
            is_const: local.is_const,
        });
        self.scope_insert(&local.name.value, LocalSlot::Hoisted(global_name));
    }

    fn lower_if(
        &mut self,
        condition: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
        span: Span,
    ) {
        let cond = self.lower_expr(condition);
        let cond = self.as_bool(cond, condition.span);

        let then_bb = self.func.add_block("then");
        let merge_bb = self.func.add_block("merge");
        let else_bb = match else_block {
            Some(_) => self.func.add_block("else"),
            None => merge_bb,
        };

        self.push(
            InstKind::Branch { cond: Value::Reg(cond), then_block: then_bb, else_block: else_bb },
            None,
            span,
        );
        self.terminated = true;

        self.start_block(then_bb);
        self.lower_block(then_block);
        self.jump(merge_bb, span);

        if let Some(else_block) = else_block {
            self.start_block(else_bb);
            self.lower_block(else_block);
            self.jump(merge_bb, span);
        }

        self.start_block(merge_bb);
    }

    fn lower_while(&mut self, condition: &Expr, body: &Block, span: Span) {
        let header = self.func.add_block("while_header");
        let body_bb = self.func.add_block("while_body");
        let join = self.func.add_block("while_join");

        self.jump(header, span);
        self.start_block(header);
        let cond = self.lower_expr(condition);
        let cond = self.as_bool(cond, condition.span);
        self.push(
            InstKind::Branch { cond: Value::Reg(cond), then_block: body_bb, else_block: join },
            None,
            span,
        );
        self.terminated = true;

        self.start_block(body_bb);
        self.loop_stack.push(LoopCtx {
            continue_target: Some(header),
            break_target: join,
        });
        self.lower_block(body);
        self.loop_stack.pop();
        self.jump(header, span);

        self.start_block(join);
    }

    /// `for` lowers to a while-shaped loop over the induction variable,
    /// with a dedicated step block as the `continue` target.
    #[allow(clippy::too_many_arguments)]
    fn lower_for(
        &mut self,
        var: &sable_common::Spanned<String>,
        start: &Expr,
        end: &Expr,
        direction: ForDirection,
        step: Option<&Expr>,
        body: &Block,
        stmt_id: sable_parser::NodeId,
        span: Span,
    ) {
        self.scopes.push(HashMap::new());

        // The induction variable's width follows the wider bound; the
        // checker already made that call.
        let var_ty = match self.analysis.local_types.get(&stmt_id) {
            Some(ty) => lower_type(ty),
            None => match (
                self.info(start).map(|i| lower_type(&i.ty)),
                self.info(end).map(|i| lower_type(&i.ty)),
            ) {
                (Some(IlType::Word), _) | (_, Some(IlType::Word)) => IlType::Word,
                _ => IlType::Byte,
            },
        };
        let slot = self.func.locals.add_slot(&var.value, var_ty.clone());
        self.scope_insert(&var.value, LocalSlot::Var(slot));

        let start_val = self.lower_expr(start);
        let start_val = self.coerce(start_val, &var_ty, start.span);
        self.write_var(slot, Value::Reg(start_val), span);

        let header = self.func.add_block("for_header");
        let body_bb = self.func.add_block("for_body");
        let step_bb = self.func.add_block("for_step");
        let join = self.func.add_block("for_join");

        self.jump(header, span);
        self.start_block(header);
        let current = self.read_var(slot, span);
        let bound = self.lower_expr(end);
        let bound = self.coerce(bound, &var_ty, end.span);
        let cmp_op = match direction {
            ForDirection::To => CmpOp::Le,
            ForDirection::Downto => CmpOp::Ge,
        };
        let cond = self.emit(
            InstKind::Cmp { op: cmp_op, lhs: Value::Reg(current), rhs: Value::Reg(bound) },
            IlType::Bool,
            span,
        );
        self.push(
            InstKind::Branch { cond: Value::Reg(cond), then_block: body_bb, else_block: join },
            None,
            span,
        );
        self.terminated = true;

        self.start_block(body_bb);
        self.loop_stack.push(LoopCtx {
            continue_target: Some(step_bb),
            break_target: join,
        });
        self.lower_block(body);
        self.loop_stack.pop();
        self.jump(step_bb, span);

        self.start_block(step_bb);
        let current = self.read_var(slot, span);
        let step_val = match step {
            Some(expr) => {
                let v = self.lower_expr(expr);
                self.coerce(v, &var_ty, expr.span)
            }
            None => self.emit_const(Constant { value: 1, ty: var_ty.clone() }, span),
        };
        let step_op = match direction {
            ForDirection::To => BinaryIlOp::Add,
            ForDirection::Downto => BinaryIlOp::Sub,
        };
        let stepped = self.emit(
            InstKind::Binary { op: step_op, lhs: Value::Reg(current), rhs: Value::Reg(step_val) },
            var_ty,
            span,
        );
        self.write_var(slot, Value::Reg(stepped), span);
        self.jump(header, span);

        self.start_block(join);
        self.scopes.pop();
    }

    /// A switch lowers to a chain of equality tests, one case body block
    /// each, all joining after the statement. `break` exits the switch.
    fn lower_switch(
        &mut self,
        scrutinee: &Expr,
        cases: &[sable_parser::SwitchCase],
        default: Option<&[Stmt]>,
        span: Span,
    ) {
        let scrut = self.lower_expr(scrutinee);
        let scrut_ty = self.register_ty(scrut);
        let join = self.func.add_block("switch_join");

        self.loop_stack.push(LoopCtx { continue_target: None, break_target: join });

        for case in cases {
            let value = self.lower_expr(&case.value);
            let value = self.coerce(value, &scrut_ty, case.value.span);
            let cond = self.emit(
                InstKind::Cmp { op: CmpOp::Eq, lhs: Value::Reg(scrut), rhs: Value::Reg(value) },
                IlType::Bool,
                case.span,
            );
            let body_bb = self.func.add_block("case_body");
            let next_bb = self.func.add_block("case_next");
            self.push(
                InstKind::Branch { cond: Value::Reg(cond), then_block: body_bb, else_block: next_bb },
                None,
                case.span,
            );
            self.terminated = true;

            self.start_block(body_bb);
            self.scopes.push(HashMap::new());
            for stmt in &case.body {
                self.lower_stmt(stmt);
            }
            self.scopes.pop();
            self.jump(join, case.span);

            self.start_block(next_bb);
        }

        if let Some(stmts) = default {
            self.scopes.push(HashMap::new());
            for stmt in stmts {
                self.lower_stmt(stmt);
            }
            self.scopes.pop();
        }
        self.jump(join, span);

        self.loop_stack.pop();
        self.start_block(join);
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Lower an expression to the register holding its value.
    fn lower_expr(&mut self, expr: &Expr) -> ValueId {
        // Whatever the checker folded lowers to a plain constant load.
        if let Some(info) = self.info(expr) {
            if info.is_const {
                if let Some(value) = info.value {
                    let ty = lower_type(&info.ty);
                    if matches!(ty, IlType::Byte | IlType::Word | IlType::Bool | IlType::Pointer) {
                        return self.emit_const(Constant { value, ty }, expr.span);
                    }
                }
            }
        }

        match expr.kind.as_ref() {
            ExprKind::Literal(literal) => self.lower_literal(literal, expr.span),
            ExprKind::Identifier(name) => self.lower_identifier(name, expr.span),
            ExprKind::Binary { op, left, right } => {
                self.lower_binary(*op, left, right, expr)
            }
            ExprKind::Unary { op, operand } => self.lower_unary(*op, operand, expr),
            ExprKind::Ternary { condition, then_expr, else_expr } => {
                self.lower_ternary(condition, then_expr, else_expr, expr)
            }
            ExprKind::Call { callee, args } => self
                .lower_call(callee, args, expr)
                .unwrap_or_else(|| self.emit_const(Constant::byte(0), expr.span)),
            ExprKind::Index { .. } => {
                let (addr, elem_ty) = self.lower_address(expr);
                self.load_element(addr, &elem_ty, expr.span)
            }
            ExprKind::Member { .. } => {
                // Non-constant member access survives only after a semantic
                // error; produce a placeholder.
                self.emit_const(Constant::byte(0), expr.span)
            }
            ExprKind::ArrayLiteral(_) => {
                self.diagnostics.error(
                    DiagnosticCode::UnsupportedConstruct,
                    "array literals are only valid as initializers",
                    expr.span,
                );
                self.emit_const(Constant::byte(0), expr.span)
            }
            ExprKind::Assign { target, op, value } => {
                self.lower_assign(target, *op, value, expr.span)
            }
        }
    }

    fn lower_literal(&mut self, literal: &Literal, span: Span) -> ValueId {
        match literal {
            Literal::Number { value, .. } => {
                let ty = if *value <= 0xFF { IlType::Byte } else { IlType::Word };
                self.emit_const(Constant { value: i64::from(*value), ty }, span)
            }
            Literal::Bool(b) => {
                self.emit_const(Constant { value: i64::from(*b), ty: IlType::Bool }, span)
            }
            Literal::Str(_) => {
                self.diagnostics.error(
                    DiagnosticCode::UnsupportedConstruct,
                    "string literals have no runtime representation here",
                    span,
                );
                self.emit_const(Constant::byte(0), span)
            }
        }
    }

    fn lower_identifier(&mut self, name: &str, span: Span) -> ValueId {
        if let Some(slot) = self.resolve_slot(name) {
            return match slot {
                LocalSlot::Var(var) => {
                    let var = *var;
                    self.read_var(var, span)
                }
                LocalSlot::Hoisted(global) => {
                    let global = global.clone();
                    self.emit(InstKind::AddrOfGlobal { name: global }, IlType::Pointer, span)
                }
            };
        }
        if let Some(ty) = self.global_types.get(name) {
            return match ty {
                // A bare array reference decays to its address.
                IlType::Array { .. } => self.emit(
                    InstKind::AddrOfGlobal { name: name.to_string() },
                    IlType::Pointer,
                    span,
                ),
                _ => {
                    let ty = ty.clone();
                    self.emit(InstKind::LoadGlobal { name: name.to_string() }, ty, span)
                }
            };
        }
        if self.func_sigs.contains_key(name) {
            return self.emit(
                InstKind::AddrOfFunction { name: name.to_string() },
                IlType::Pointer,
                span,
            );
        }
        // Undefined; the checker already reported it.
        self.emit_const(Constant::byte(0), span)
    }

    fn lower_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, expr: &Expr) -> ValueId {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.lower_short_circuit(op, left, right, expr.span);
        }

        let lhs = self.lower_expr(left);
        let rhs = self.lower_expr(right);

        if op.is_comparison() {
            // Compare at the wider operand width.
            let lty = self.register_ty(lhs);
            let rty = self.register_ty(rhs);
            let wide = if lty == IlType::Word || rty == IlType::Word {
                IlType::Word
            } else if lty == IlType::Bool && rty == IlType::Bool {
                IlType::Bool
            } else {
                IlType::Byte
            };
            let lhs = self.coerce(lhs, &wide, left.span);
            let rhs = self.coerce(rhs, &wide, right.span);
            let cmp = match op {
                BinaryOp::Eq => CmpOp::Eq,
                BinaryOp::Ne => CmpOp::Ne,
                BinaryOp::Lt => CmpOp::Lt,
                BinaryOp::Le => CmpOp::Le,
                BinaryOp::Gt => CmpOp::Gt,
                BinaryOp::Ge => CmpOp::Ge,
                _ => CmpOp::Eq,
            };
            return self.emit(
                InstKind::Cmp { op: cmp, lhs: Value::Reg(lhs), rhs: Value::Reg(rhs) },
                IlType::Bool,
                expr.span,
            );
        }

        let result_ty = self.expr_il_type(expr);
        let lhs = self.coerce(lhs, &result_ty, left.span);
        let rhs = self.coerce(rhs, &result_ty, right.span);
        let il_op = match op {
            BinaryOp::Add => BinaryIlOp::Add,
            BinaryOp::Sub => BinaryIlOp::Sub,
            BinaryOp::Mul => BinaryIlOp::Mul,
            BinaryOp::Div => BinaryIlOp::Div,
            BinaryOp::Mod => BinaryIlOp::Mod,
            BinaryOp::BitAnd => BinaryIlOp::And,
            BinaryOp::BitOr => BinaryIlOp::Or,
            BinaryOp::BitXor => BinaryIlOp::Xor,
            BinaryOp::Shl => BinaryIlOp::Shl,
            BinaryOp::Shr => BinaryIlOp::Shr,
            BinaryOp::And | BinaryOp::Or | BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt
            | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => BinaryIlOp::Add,
        };
        self.emit(
            InstKind::Binary { op: il_op, lhs: Value::Reg(lhs), rhs: Value::Reg(rhs) },
            result_ty,
            expr.span,
        )
    }

    /// `&&`/`||` lower to a branch over a synthetic temporary; the right
    /// operand only evaluates when it matters. SSA construction later
    /// turns the join into a phi.
    fn lower_short_circuit(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        span: Span,
    ) -> ValueId {
        let tmp = self.func.locals.add_slot("$sc", IlType::Bool);

        let lhs = self.lower_expr(left);
        let lhs = self.as_bool(lhs, left.span);
        self.write_var(tmp, Value::Reg(lhs), span);

        let rhs_bb = self.func.add_block("sc_rhs");
        let join = self.func.add_block("sc_join");
        let (then_block, else_block) = match op {
            BinaryOp::And => (rhs_bb, join),
            _ => (join, rhs_bb),
        };
        self.push(
            InstKind::Branch { cond: Value::Reg(lhs), then_block, else_block },
            None,
            span,
        );
        self.terminated = true;

        self.start_block(rhs_bb);
        let rhs = self.lower_expr(right);
        let rhs = self.as_bool(rhs, right.span);
        self.write_var(tmp, Value::Reg(rhs), span);
        self.jump(join, span);

        self.start_block(join);
        self.read_var(tmp, span)
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: &Expr, expr: &Expr) -> ValueId {
        match op {
            UnaryOp::Plus => self.lower_expr(operand),
            UnaryOp::Not => {
                let value = self.lower_expr(operand);
                let value = self.as_bool(value, operand.span);
                self.emit(
                    InstKind::Unary { op: UnaryIlOp::Not, operand: Value::Reg(value) },
                    IlType::Bool,
                    expr.span,
                )
            }
            UnaryOp::Neg | UnaryOp::BitNot => {
                let value = self.lower_expr(operand);
                let ty = self.register_ty(value);
                let il_op = if op == UnaryOp::Neg { UnaryIlOp::Neg } else { UnaryIlOp::BitNot };
                self.emit(InstKind::Unary { op: il_op, operand: Value::Reg(value) }, ty, expr.span)
            }
            UnaryOp::AddressOf => {
                let ExprKind::Identifier(name) = operand.kind.as_ref() else {
                    return self.emit_const(Constant::word(0), expr.span);
                };
                if let Some(LocalSlot::Hoisted(global)) = self.resolve_slot(name) {
                    let global = global.clone();
                    return self.emit(
                        InstKind::AddrOfGlobal { name: global },
                        IlType::Pointer,
                        expr.span,
                    );
                }
                if self.global_types.contains_key(name) {
                    return self.emit(
                        InstKind::AddrOfGlobal { name: name.to_string() },
                        IlType::Pointer,
                        expr.span,
                    );
                }
                if self.func_sigs.contains_key(name) {
                    return self.emit(
                        InstKind::AddrOfFunction { name: name.to_string() },
                        IlType::Pointer,
                        expr.span,
                    );
                }
                // Taking the address of a register local was already
                // rejected by the checker.
                self.emit_const(Constant::word(0), expr.span)
            }
        }
    }

    fn lower_ternary(
        &mut self,
        condition: &Expr,
        then_expr: &Expr,
        else_expr: &Expr,
        expr: &Expr,
    ) -> ValueId {
        let result_ty = self.expr_il_type(expr);
        let tmp = self.func.locals.add_slot("$sel", result_ty.clone());

        let cond = self.lower_expr(condition);
        let cond = self.as_bool(cond, condition.span);

        let then_bb = self.func.add_block("sel_then");
        let else_bb = self.func.add_block("sel_else");
        let join = self.func.add_block("sel_join");
        self.push(
            InstKind::Branch { cond: Value::Reg(cond), then_block: then_bb, else_block: else_bb },
            None,
            expr.span,
        );
        self.terminated = true;

        self.start_block(then_bb);
        let then_val = self.lower_expr(then_expr);
        let then_val = self.coerce(then_val, &result_ty, then_expr.span);
        self.write_var(tmp, Value::Reg(then_val), expr.span);
        self.jump(join, expr.span);

        self.start_block(else_bb);
        let else_val = self.lower_expr(else_expr);
        let else_val = self.coerce(else_val, &result_ty, else_expr.span);
        self.write_var(tmp, Value::Reg(else_val), expr.span);
        self.jump(join, expr.span);

        self.start_block(join);
        self.read_var(tmp, expr.span)
    }

    /// Lower a call; `None` when the call produces no value.
    fn lower_call(
        &mut self,
        callee: &sable_common::Spanned<String>,
        args: &[Expr],
        expr: &Expr,
    ) -> Option<ValueId> {
        if let Some(intrinsic) = Intrinsic::lookup(&callee.value) {
            return self.lower_intrinsic(intrinsic, args, expr);
        }

        let lowered: Vec<ValueId> = args.iter().map(|a| self.lower_expr(a)).collect();

        if let Some((param_tys, ret_ty)) = self.func_sigs.get(&callee.value).cloned() {
            let mut values = Vec::with_capacity(lowered.len());
            for ((reg, arg), ty) in lowered.into_iter().zip(args).zip(param_tys.iter()) {
                values.push(Value::Reg(self.coerce(reg, ty, arg.span)));
            }
            let kind = InstKind::Call { callee: callee.value.clone(), args: values };
            return if ret_ty == IlType::Void {
                self.push(kind, None, expr.span);
                None
            } else {
                Some(self.emit(kind, ret_ty, expr.span))
            };
        }

        // Calling through a function-typed variable or an import.
        let target = if self.resolve_slot(&callee.value).is_some()
            || self.global_types.contains_key(&callee.value)
        {
            self.lower_identifier(&callee.value, callee.span)
        } else {
            // Imported name without a local signature: call by name.
            let values = lowered.into_iter().map(Value::Reg).collect();
            let kind = InstKind::Call { callee: callee.value.clone(), args: values };
            let ret_ty = self.expr_il_type(expr);
            return if ret_ty == IlType::Void {
                self.push(kind, None, expr.span);
                None
            } else {
                Some(self.emit(kind, ret_ty, expr.span))
            };
        };

        let values = lowered.into_iter().map(Value::Reg).collect();
        let kind = InstKind::CallIndirect { target: Value::Reg(target), args: values };
        let ret_ty = self.expr_il_type(expr);
        if ret_ty == IlType::Void {
            self.push(kind, None, expr.span);
            None
        } else {
            Some(self.emit(kind, ret_ty, expr.span))
        }
    }

    /// Intrinsics lower to dedicated opcodes; `None` for the void ones.
    fn lower_intrinsic(
        &mut self,
        intrinsic: Intrinsic,
        args: &[Expr],
        expr: &Expr,
    ) -> Option<ValueId> {
        let span = expr.span;
        match intrinsic {
            Intrinsic::Peek | Intrinsic::PeekW | Intrinsic::VolatileRead => {
                let addr = self.lower_expr(&args[0]);
                let addr = self.coerce(addr, &IlType::Word, args[0].span);
                let (kind, ty) = match intrinsic {
                    Intrinsic::Peek => (InstKind::Peek { addr: Value::Reg(addr) }, IlType::Byte),
                    Intrinsic::PeekW => (InstKind::PeekW { addr: Value::Reg(addr) }, IlType::Word),
                    _ => (InstKind::VolatileRead { addr: Value::Reg(addr) }, IlType::Byte),
                };
                let result = self.emit(kind, ty, span);
                if intrinsic == Intrinsic::VolatileRead {
                    self.mark_barrier();
                }
                Some(result)
            }
            Intrinsic::Poke | Intrinsic::PokeW | Intrinsic::VolatileWrite => {
                let addr = self.lower_expr(&args[0]);
                let addr = self.coerce(addr, &IlType::Word, args[0].span);
                let value = self.lower_expr(&args[1]);
                let value_ty = if intrinsic == Intrinsic::PokeW { IlType::Word } else { IlType::Byte };
                let value = self.coerce(value, &value_ty, args[1].span);
                let kind = match intrinsic {
                    Intrinsic::Poke => {
                        InstKind::Poke { addr: Value::Reg(addr), value: Value::Reg(value) }
                    }
                    Intrinsic::PokeW => {
                        InstKind::PokeW { addr: Value::Reg(addr), value: Value::Reg(value) }
                    }
                    _ => InstKind::VolatileWrite {
                        addr: Value::Reg(addr),
                        value: Value::Reg(value),
                    },
                };
                self.push(kind, None, span);
                if intrinsic == Intrinsic::VolatileWrite {
                    self.mark_barrier();
                }
                None
            }
            Intrinsic::Lo => {
                let value = self.lower_expr(&args[0]);
                let value = self.coerce(value, &IlType::Word, args[0].span);
                let masked = self.emit(
                    InstKind::Binary {
                        op: BinaryIlOp::And,
                        lhs: Value::Reg(value),
                        rhs: Value::Imm(Constant::word(0x00FF)),
                    },
                    IlType::Word,
                    span,
                );
                Some(self.emit(
                    InstKind::Unary { op: UnaryIlOp::Trunc, operand: Value::Reg(masked) },
                    IlType::Byte,
                    span,
                ))
            }
            Intrinsic::Hi => {
                let value = self.lower_expr(&args[0]);
                let value = self.coerce(value, &IlType::Word, args[0].span);
                let shifted = self.emit(
                    InstKind::Binary {
                        op: BinaryIlOp::Shr,
                        lhs: Value::Reg(value),
                        rhs: Value::Imm(Constant::word(8)),
                    },
                    IlType::Word,
                    span,
                );
                Some(self.emit(
                    InstKind::Unary { op: UnaryIlOp::Trunc, operand: Value::Reg(shifted) },
                    IlType::Byte,
                    span,
                ))
            }
            Intrinsic::Sei
            | Intrinsic::Cli
            | Intrinsic::Nop
            | Intrinsic::Brk
            | Intrinsic::Pha
            | Intrinsic::Php
            | Intrinsic::Plp => {
                let op = match intrinsic {
                    Intrinsic::Sei => CpuOp::Sei,
                    Intrinsic::Cli => CpuOp::Cli,
                    Intrinsic::Nop => CpuOp::Nop,
                    Intrinsic::Brk => CpuOp::Brk,
                    Intrinsic::Pha => CpuOp::Pha,
                    Intrinsic::Php => CpuOp::Php,
                    _ => CpuOp::Plp,
                };
                self.push(InstKind::Cpu(op), None, span);
                None
            }
            Intrinsic::Pla => Some(self.emit(InstKind::Cpu(CpuOp::Pla), IlType::Byte, span)),
            Intrinsic::Barrier => {
                self.push(InstKind::Barrier, None, span);
                self.mark_barrier();
                None
            }
            // These fold during checking; reaching here means the fold
            // failed and an error is already recorded.
            Intrinsic::Sizeof | Intrinsic::Length => {
                Some(self.emit_const(Constant::byte(0), span))
            }
        }
    }

    /// Tag the most recent instruction as an optimization barrier.
    fn mark_barrier(&mut self) {
        if let Some(inst) = self.func.blocks[self.current as usize].instructions.last_mut() {
            inst.metadata.set(MetaKey::OptimizationBarrier, MetaValue::Bool(true));
        }
    }

    /// Address arithmetic for an index expression: base address plus the
    /// scaled index. Returns the address register and the element type.
    fn lower_address(&mut self, expr: &Expr) -> (ValueId, IlType) {
        let ExprKind::Index { base, index } = expr.kind.as_ref() else {
            let zero = self.emit_const(Constant::word(0), expr.span);
            return (zero, IlType::Byte);
        };

        // Element type comes from the checker's annotation on the whole
        // index expression.
        let elem_ty = self.expr_il_type(expr);

        let base_ptr = match base.kind.as_ref() {
            ExprKind::Identifier(_) | ExprKind::Call { .. } => {
                let v = self.lower_expr(base);
                self.coerce(v, &IlType::Pointer, base.span)
            }
            ExprKind::Index { .. } => {
                let (addr, _) = self.lower_address(base);
                addr
            }
            _ => {
                self.diagnostics.error(
                    DiagnosticCode::UnsupportedConstruct,
                    "unsupported indexing base",
                    base.span,
                );
                self.emit_const(Constant { value: 0, ty: IlType::Pointer }, base.span)
            }
        };

        let idx = self.lower_expr(index);
        let idx = self.coerce(idx, &IlType::Word, index.span);
        let elem_size = elem_ty.size_in_bytes().max(1);
        let scaled = if elem_size > 1 {
            self.emit(
                InstKind::Binary {
                    op: BinaryIlOp::Mul,
                    lhs: Value::Reg(idx),
                    rhs: Value::Imm(Constant::word(i64::from(elem_size))),
                },
                IlType::Word,
                index.span,
            )
        } else {
            idx
        };
        let base_word = self.coerce(base_ptr, &IlType::Word, base.span);
        let addr = self.emit(
            InstKind::Binary {
                op: BinaryIlOp::Add,
                lhs: Value::Reg(base_word),
                rhs: Value::Reg(scaled),
            },
            IlType::Word,
            expr.span,
        );
        (addr, elem_ty)
    }

    fn load_element(&mut self, addr: ValueId, elem_ty: &IlType, span: Span) -> ValueId {
        match elem_ty {
            IlType::Word | IlType::Pointer => {
                self.emit(InstKind::PeekW { addr: Value::Reg(addr) }, IlType::Word, span)
            }
            // Partially applied multi-dimensional index: the address is
            // the value.
            IlType::Array { .. } => addr,
            _ => self.emit(InstKind::Peek { addr: Value::Reg(addr) }, IlType::Byte, span),
        }
    }

    fn store_element(&mut self, addr: ValueId, value: ValueId, elem_ty: &IlType, span: Span) {
        match elem_ty {
            IlType::Word | IlType::Pointer => {
                self.push(
                    InstKind::PokeW { addr: Value::Reg(addr), value: Value::Reg(value) },
                    None,
                    span,
                );
            }
            _ => {
                self.push(
                    InstKind::Poke { addr: Value::Reg(addr), value: Value::Reg(value) },
                    None,
                    span,
                );
            }
        }
    }

    fn lower_assign(
        &mut self,
        target: &Expr,
        op: Option<BinaryOp>,
        value: &Expr,
        span: Span,
    ) -> ValueId {
        match target.kind.as_ref() {
            ExprKind::Identifier(name) => {
                if let Some(slot) = self.resolve_slot(name) {
                    match slot {
                        LocalSlot::Var(var) => {
                            let var = *var;
                            let var_ty = self.func.locals.slots[var as usize].1.clone();
                            let new_value = match op {
                                Some(binop) => {
                                    let current = self.read_var(var, span);
                                    let rhs = self.lower_expr(value);
                                    let rhs = self.coerce(rhs, &var_ty, value.span);
                                    self.apply_binary(binop, current, rhs, &var_ty, span)
                                }
                                None => {
                                    let rhs = self.lower_expr(value);
                                    self.coerce(rhs, &var_ty, value.span)
                                }
                            };
                            return self.write_var(var, Value::Reg(new_value), span);
                        }
                        LocalSlot::Hoisted(_) => {
                            // Whole-array assignment; rejected upstream.
                            return self.lower_expr(value);
                        }
                    }
                }
                if let Some(global_ty) = self.global_types.get(name).cloned() {
                    let new_value = match op {
                        Some(binop) => {
                            let current = self.emit(
                                InstKind::LoadGlobal { name: name.to_string() },
                                global_ty.clone(),
                                span,
                            );
                            let rhs = self.lower_expr(value);
                            let rhs = self.coerce(rhs, &global_ty, value.span);
                            self.apply_binary(binop, current, rhs, &global_ty, span)
                        }
                        None => {
                            let rhs = self.lower_expr(value);
                            self.coerce(rhs, &global_ty, value.span)
                        }
                    };
                    self.push(
                        InstKind::StoreGlobal {
                            name: name.to_string(),
                            value: Value::Reg(new_value),
                        },
                        None,
                        span,
                    );
                    return new_value;
                }
                // Undefined target; already reported.
                self.lower_expr(value)
            }
            ExprKind::Index { .. } => {
                let (addr, elem_ty) = self.lower_address(target);
                let new_value = match op {
                    Some(binop) => {
                        let current = self.load_element(addr, &elem_ty, span);
                        let rhs = self.lower_expr(value);
                        let rhs = self.coerce(rhs, &elem_ty, value.span);
                        self.apply_binary(binop, current, rhs, &elem_ty, span)
                    }
                    None => {
                        let rhs = self.lower_expr(value);
                        self.coerce(rhs, &elem_ty, value.span)
                    }
                };
                self.store_element(addr, new_value, &elem_ty, span);
                new_value
            }
            _ => {
                // Invalid lvalue; the checker reported it.
                self.lower_expr(value)
            }
        }
    }

    fn apply_binary(
        &mut self,
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
        ty: &IlType,
        span: Span,
    ) -> ValueId {
        let il_op = match op {
            BinaryOp::Add => BinaryIlOp::Add,
            BinaryOp::Sub => BinaryIlOp::Sub,
            BinaryOp::Mul => BinaryIlOp::Mul,
            BinaryOp::Div => BinaryIlOp::Div,
            BinaryOp::Mod => BinaryIlOp::Mod,
            BinaryOp::BitAnd => BinaryIlOp::And,
            BinaryOp::BitOr => BinaryIlOp::Or,
            BinaryOp::BitXor => BinaryIlOp::Xor,
            BinaryOp::Shl => BinaryIlOp::Shl,
            BinaryOp::Shr => BinaryIlOp::Shr,
            // Compound assignment never carries comparison or logical ops.
            _ => BinaryIlOp::Add,
        };
        self.emit(
            InstKind::Binary { op: il_op, lhs: Value::Reg(lhs), rhs: Value::Reg(rhs) },
            ty.clone(),
            span,
        )
    }
}
