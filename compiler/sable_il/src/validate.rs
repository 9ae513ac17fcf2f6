//! Read-only IL validation
//!
//! The last gate before codegen: structural shape, type agreement, SSA
//! uniqueness, dominance of uses, phi placement and reachability. Each
//! check family can be disabled individually. Validation failures are
//! fatal for codegen; unreachable blocks only warn, since earlier
//! transformations may leave dead blocks behind.

use crate::il::{
    BlockId, ExportKind, Function, IlType, InstId, InstKind, Module, Value, ValueId,
};
use crate::ssa::DominatorTree;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    pub structural: bool,
    pub types: bool,
    pub ssa: bool,
    /// When set, duplicate register definitions only warn; keeps pre-SSA
    /// IL tractable.
    pub allow_pre_ssa: bool,
    pub dominance: bool,
    pub phis: bool,
    pub reachability: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            structural: true,
            types: true,
            ssa: true,
            allow_pre_ssa: false,
            dominance: true,
            phis: true,
            reachability: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub message: String,
    pub function: Option<String>,
    pub block: Option<BlockId>,
    pub inst: Option<InstId>,
}

impl ValidationIssue {
    fn new(message: String) -> Self {
        Self { message, function: None, block: None, inst: None }
    }

    fn in_function(mut self, name: &str) -> Self {
        self.function = Some(name.to_string());
        self
    }

    fn in_block(mut self, block: BlockId) -> Self {
        self.block = Some(block);
        self
    }

    fn at_inst(mut self, inst: InstId) -> Self {
        self.inst = Some(inst);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

/// Render a validation result to a human-readable log.
pub fn format_report(module_name: &str, result: &ValidationResult) -> String {
    let mut out = String::new();
    let verdict = if result.valid { "valid" } else { "INVALID" };
    let _ = writeln!(
        out,
        "IL validation of '{}': {} ({} error(s), {} warning(s))",
        module_name,
        verdict,
        result.errors.len(),
        result.warnings.len()
    );
    for issue in &result.errors {
        let _ = writeln!(out, "  error: {}", render_issue(issue));
    }
    for issue in &result.warnings {
        let _ = writeln!(out, "  warning: {}", render_issue(issue));
    }
    out
}

fn render_issue(issue: &ValidationIssue) -> String {
    let mut text = issue.message.clone();
    if let Some(function) = &issue.function {
        let _ = write!(text, " [fn {}", function);
        if let Some(block) = issue.block {
            let _ = write!(text, ", block {}", block);
        }
        if let Some(inst) = issue.inst {
            let _ = write!(text, ", inst {}", inst);
        }
        text.push(']');
    }
    text
}

struct Validator<'a> {
    module: &'a Module,
    config: ValidatorConfig,
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

/// Validate a whole module. Read-only.
pub fn validate_module(module: &Module, config: &ValidatorConfig) -> ValidationResult {
    let mut validator = Validator {
        module,
        config: *config,
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    if config.structural {
        validator.check_module_structure();
    }
    for func in &module.functions {
        if func.is_stub {
            continue;
        }
        validator.check_function(func);
    }

    let valid = validator.errors.is_empty();
    log::debug!(
        "validated module '{}': {} errors, {} warnings",
        module.name,
        validator.errors.len(),
        validator.warnings.len()
    );
    ValidationResult {
        valid,
        errors: validator.errors,
        warnings: validator.warnings,
    }
}

impl<'a> Validator<'a> {
    fn error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    fn warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    // ------------------------------------------------------------------
    // Module-level structure
    // ------------------------------------------------------------------

    fn check_module_structure(&mut self) {
        if let Some(entry) = &self.module.entry_point {
            if self.module.function(entry).is_none() {
                self.error(ValidationIssue::new(format!(
                    "entry point '{}' does not resolve to a function",
                    entry
                )));
            }
        }
        for export in &self.module.exports {
            let resolved = match export.kind {
                ExportKind::Function => self.module.function(&export.local_name).is_some(),
                ExportKind::Variable => self.module.global(&export.local_name).is_some(),
            };
            if !resolved {
                self.error(ValidationIssue::new(format!(
                    "export '{}' does not resolve to a {}",
                    export.export_name,
                    match export.kind {
                        ExportKind::Function => "function",
                        ExportKind::Variable => "global variable",
                    }
                )));
            }
        }
        for global in &self.module.globals {
            let is_map = matches!(global.storage, crate::il::StorageClass::Map);
            if is_map && global.address.is_none() {
                self.error(ValidationIssue::new(format!(
                    "mapped global '{}' has no fixed address",
                    global.name
                )));
            }
            if !is_map && global.address.is_some() {
                self.error(ValidationIssue::new(format!(
                    "global '{}' carries an address without Map storage",
                    global.name
                )));
            }
        }
    }

    // ------------------------------------------------------------------
    // Function-level checks
    // ------------------------------------------------------------------

    fn check_function(&mut self, func: &Function) {
        if self.config.structural {
            self.check_blocks(func);
        }
        if self.config.types {
            self.check_types(func);
        }
        if self.config.ssa {
            self.check_unique_definitions(func);
        }
        if self.config.phis {
            self.check_phis(func);
        }
        if self.config.dominance || self.config.reachability {
            let domtree = DominatorTree::build(func);
            if self.config.dominance {
                self.check_dominance(func, &domtree);
            }
            if self.config.reachability {
                for block in &func.blocks {
                    if !domtree.is_reachable(block.id) {
                        self.warning(
                            ValidationIssue::new("block unreachable from entry".to_string())
                                .in_function(&func.name)
                                .in_block(block.id),
                        );
                    }
                }
            }
        }
    }

    fn check_blocks(&mut self, func: &Function) {
        if func.blocks.get(func.entry as usize).is_none() {
            self.error(
                ValidationIssue::new("function has no entry block".to_string())
                    .in_function(&func.name),
            );
            return;
        }

        for block in &func.blocks {
            let terminator_count = block
                .instructions
                .iter()
                .filter(|i| i.kind.is_terminator())
                .count();
            if !block.instructions.is_empty() {
                match terminator_count {
                    0 => self.error(
                        ValidationIssue::new("block has no terminator".to_string())
                            .in_function(&func.name)
                            .in_block(block.id),
                    ),
                    1 => {
                        if !block.instructions.last().map(|i| i.kind.is_terminator()).unwrap_or(false) {
                            self.error(
                                ValidationIssue::new(
                                    "terminator is not the last instruction".to_string(),
                                )
                                .in_function(&func.name)
                                .in_block(block.id),
                            );
                        }
                    }
                    n => self.error(
                        ValidationIssue::new(format!("block has {} terminators", n))
                            .in_function(&func.name)
                            .in_block(block.id),
                    ),
                }
            }

            // Branch targets must exist and the edge lists must agree in
            // both directions.
            if let Some(terminator) = block.terminator() {
                for target in terminator.kind.targets() {
                    if func.blocks.get(target as usize).is_none() {
                        self.error(
                            ValidationIssue::new(format!("jump to unknown block {}", target))
                                .in_function(&func.name)
                                .in_block(block.id)
                                .at_inst(terminator.id),
                        );
                        continue;
                    }
                    if !block.succs.contains(&target) {
                        self.error(
                            ValidationIssue::new(format!(
                                "edge to block {} missing from successor list",
                                target
                            ))
                            .in_function(&func.name)
                            .in_block(block.id),
                        );
                    }
                    if !func.block(target).preds.contains(&block.id) {
                        self.error(
                            ValidationIssue::new(format!(
                                "block {} does not list block {} as predecessor",
                                target, block.id
                            ))
                            .in_function(&func.name)
                            .in_block(block.id),
                        );
                    }
                }
            }
        }
    }

    fn value_type(&self, func: &Function, value: &Value) -> Option<IlType> {
        func.value_type(value)
    }

    /// Pointer and word are interchangeable 16-bit quantities.
    fn same_width_class(a: &IlType, b: &IlType) -> bool {
        let norm = |t: &IlType| match t {
            IlType::Pointer => IlType::Word,
            other => other.clone(),
        };
        norm(a) == norm(b)
    }

    fn check_types(&mut self, func: &Function) {
        for block in &func.blocks {
            for inst in &block.instructions {
                match &inst.kind {
                    InstKind::Binary { lhs, rhs, .. } => {
                        let (lt, rt) = (self.value_type(func, lhs), self.value_type(func, rhs));
                        if let (Some(lt), Some(rt)) = (lt, rt) {
                            if !Self::same_width_class(&lt, &rt) {
                                self.error(
                                    ValidationIssue::new(format!(
                                        "binary operands disagree: {} vs {}",
                                        lt, rt
                                    ))
                                    .in_function(&func.name)
                                    .in_block(block.id)
                                    .at_inst(inst.id),
                                );
                            }
                        }
                    }
                    InstKind::Cmp { lhs, rhs, .. } => {
                        let (lt, rt) = (self.value_type(func, lhs), self.value_type(func, rhs));
                        if let (Some(lt), Some(rt)) = (lt, rt) {
                            if !Self::same_width_class(&lt, &rt) {
                                self.error(
                                    ValidationIssue::new(format!(
                                        "comparison operands disagree: {} vs {}",
                                        lt, rt
                                    ))
                                    .in_function(&func.name)
                                    .in_block(block.id)
                                    .at_inst(inst.id),
                                );
                            }
                        }
                        let result_ty = inst.result.and_then(|r| func.register_type(r));
                        if result_ty != Some(&IlType::Bool) {
                            self.error(
                                ValidationIssue::new(
                                    "comparison result register is not bool".to_string(),
                                )
                                .in_function(&func.name)
                                .in_block(block.id)
                                .at_inst(inst.id),
                            );
                        }
                    }
                    InstKind::Call { callee, args } => {
                        if let Some(target) = self.module.function(callee) {
                            if target.params.len() != args.len() {
                                self.error(
                                    ValidationIssue::new(format!(
                                        "call to '{}' passes {} argument(s) for {} parameter(s)",
                                        callee,
                                        args.len(),
                                        target.params.len()
                                    ))
                                    .in_function(&func.name)
                                    .in_block(block.id)
                                    .at_inst(inst.id),
                                );
                            } else {
                                for (arg, param) in args.iter().zip(&target.params) {
                                    if let Some(arg_ty) = self.value_type(func, arg) {
                                        if !Self::same_width_class(&arg_ty, &param.ty) {
                                            self.error(
                                                ValidationIssue::new(format!(
                                                    "argument for '{}' has type {}, expected {}",
                                                    param.name, arg_ty, param.ty
                                                ))
                                                .in_function(&func.name)
                                                .in_block(block.id)
                                                .at_inst(inst.id),
                                            );
                                        }
                                    }
                                }
                            }
                        }
                    }
                    InstKind::Return(value) => {
                        if let Some(ty) = self.value_type(func, value) {
                            if !Self::same_width_class(&ty, &func.return_type) {
                                self.error(
                                    ValidationIssue::new(format!(
                                        "returned {} from a function of type {}",
                                        ty, func.return_type
                                    ))
                                    .in_function(&func.name)
                                    .in_block(block.id)
                                    .at_inst(inst.id),
                                );
                            }
                        }
                    }
                    InstKind::ReturnVoid => {
                        if func.return_type != IlType::Void {
                            self.error(
                                ValidationIssue::new(format!(
                                    "void return in a function of type {}",
                                    func.return_type
                                ))
                                .in_function(&func.name)
                                .in_block(block.id)
                                .at_inst(inst.id),
                            );
                        }
                    }
                    InstKind::StoreGlobal { name, value } => {
                        if let (Some(global), Some(ty)) =
                            (self.module.global(name), self.value_type(func, value))
                        {
                            if !Self::same_width_class(&ty, &global.ty) {
                                self.error(
                                    ValidationIssue::new(format!(
                                        "stored {} into global '{}' of type {}",
                                        ty, name, global.ty
                                    ))
                                    .in_function(&func.name)
                                    .in_block(block.id)
                                    .at_inst(inst.id),
                                );
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn check_unique_definitions(&mut self, func: &Function) {
        let mut defined: HashMap<ValueId, InstId> = HashMap::new();
        for block in &func.blocks {
            for inst in &block.instructions {
                let Some(result) = inst.result else { continue };
                if let Some(&first) = defined.get(&result) {
                    let issue = ValidationIssue::new(format!(
                        "register r{} defined by instruction {} and again by instruction {}",
                        result, first, inst.id
                    ))
                    .in_function(&func.name)
                    .in_block(block.id)
                    .at_inst(inst.id);
                    if self.config.allow_pre_ssa {
                        self.warning(issue);
                    } else {
                        self.error(issue);
                    }
                } else {
                    defined.insert(result, inst.id);
                }
            }
        }
    }

    fn check_phis(&mut self, func: &Function) {
        for block in &func.blocks {
            let phi_count = block.phi_count();
            for (index, inst) in block.instructions.iter().enumerate() {
                if inst.kind.is_phi() && index >= phi_count {
                    self.error(
                        ValidationIssue::new("phi follows a non-phi instruction".to_string())
                            .in_function(&func.name)
                            .in_block(block.id)
                            .at_inst(inst.id),
                    );
                }
                if let InstKind::Phi { sources } = &inst.kind {
                    if sources.len() != block.preds.len() {
                        self.error(
                            ValidationIssue::new(format!(
                                "phi has {} source(s) for {} predecessor(s)",
                                sources.len(),
                                block.preds.len()
                            ))
                            .in_function(&func.name)
                            .in_block(block.id)
                            .at_inst(inst.id),
                        );
                    } else {
                        for &(_, pred) in sources {
                            if !block.preds.contains(&pred) {
                                self.error(
                                    ValidationIssue::new(format!(
                                        "phi source references non-predecessor block {}",
                                        pred
                                    ))
                                    .in_function(&func.name)
                                    .in_block(block.id)
                                    .at_inst(inst.id),
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    /// Every use must be dominated by its definition. Parameter registers
    /// count as defined at entry; phi uses count at the end of the
    /// corresponding predecessor.
    fn check_dominance(&mut self, func: &Function, domtree: &DominatorTree) {
        // Definition site per register: (block, index in block).
        let mut defs: HashMap<ValueId, (BlockId, usize)> = HashMap::new();
        for param in &func.params {
            defs.insert(param.register, (func.entry, 0));
        }
        for block in &func.blocks {
            for (index, inst) in block.instructions.iter().enumerate() {
                if let Some(result) = inst.result {
                    defs.entry(result).or_insert((block.id, index));
                }
            }
        }

        for block in &func.blocks {
            if !domtree.is_reachable(block.id) {
                continue;
            }
            for (index, inst) in block.instructions.iter().enumerate() {
                if let InstKind::Phi { sources } = &inst.kind {
                    for (value, pred) in sources {
                        let Some(reg) = value.as_reg() else { continue };
                        let Some(&(def_block, _)) = defs.get(&reg) else {
                            self.error(
                                ValidationIssue::new(format!("use of undefined register r{}", reg))
                                    .in_function(&func.name)
                                    .in_block(block.id)
                                    .at_inst(inst.id),
                            );
                            continue;
                        };
                        if domtree.is_reachable(*pred) && !domtree.dominates(def_block, *pred) {
                            self.error(
                                ValidationIssue::new(format!(
                                    "phi source r{} does not dominate predecessor {}",
                                    reg, pred
                                ))
                                .in_function(&func.name)
                                .in_block(block.id)
                                .at_inst(inst.id),
                            );
                        }
                    }
                    continue;
                }

                for value in inst.operands() {
                    let Some(reg) = value.as_reg() else { continue };
                    let Some(&(def_block, def_index)) = defs.get(&reg) else {
                        self.error(
                            ValidationIssue::new(format!("use of undefined register r{}", reg))
                                .in_function(&func.name)
                                .in_block(block.id)
                                .at_inst(inst.id),
                        );
                        continue;
                    };
                    let dominated = if def_block == block.id {
                        let is_param = func.params.iter().any(|p| p.register == reg);
                        is_param || def_index < index
                    } else {
                        domtree.dominates(def_block, block.id)
                    };
                    if !dominated {
                        self.error(
                            ValidationIssue::new(format!(
                                "use of r{} is not dominated by its definition",
                                reg
                            ))
                            .in_function(&func.name)
                            .in_block(block.id)
                            .at_inst(inst.id),
                        );
                    }
                }
            }
        }
    }
}
