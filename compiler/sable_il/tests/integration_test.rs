//! Integration tests for lowering, SSA construction and validation

use pretty_assertions::assert_eq;
use sable_il::{
    lower_program, validate_module, BinaryIlOp, CmpOp, Constant, Function, IlType, InstKind,
    Module, StorageClass, ValidatorConfig, Value,
};
use sable_lexer::Lexer;
use sable_parser::Parser;
use sable_sema::{Analyzer, AnalyzerOptions};

fn lower(source: &str) -> Module {
    let tokens = Lexer::new(source, 0).tokenize();
    let mut parser = Parser::new(tokens);
    let mut program = parser.parse();
    let (analysis, diagnostics) = Analyzer::analyze(&mut program, AnalyzerOptions::default());
    assert!(!diagnostics.has_errors(), "semantic errors: {:?}", diagnostics);
    let (module, lowering_diags) = lower_program(&program, &analysis);
    assert!(!lowering_diags.has_errors(), "lowering errors: {:?}", lowering_diags);
    module
}

fn lower_with_ssa(source: &str) -> Module {
    let mut module = lower(source);
    sable_il::run_ssa(&mut module).expect("ssa construction");
    module
}

/// Every register defined across all blocks must be distinct.
fn assert_unique_register_ids(func: &Function) {
    let mut seen = std::collections::HashSet::new();
    for param in &func.params {
        assert!(seen.insert(param.register), "parameter register collides");
    }
    for block in &func.blocks {
        for inst in &block.instructions {
            if let Some(result) = inst.result {
                assert!(
                    seen.insert(result),
                    "register r{} defined more than once in '{}'",
                    result,
                    func.name
                );
            }
        }
    }
}

#[test]
fn poke_lowers_to_const_const_poke_return() {
    let module = lower("module t; function main(): void { poke($D020, 0); }");
    let main = module.function("main").expect("main lowered");
    assert_eq!(main.blocks.len(), 1);
    let kinds: Vec<&InstKind> = main.blocks[0].instructions.iter().map(|i| &i.kind).collect();
    assert_eq!(kinds.len(), 4);
    assert!(matches!(kinds[0], InstKind::Const(Constant { value: 0xD020, .. })));
    assert!(matches!(kinds[1], InstKind::Const(Constant { value: 0, .. })));
    assert!(matches!(kinds[2], InstKind::Poke { .. }));
    assert!(matches!(kinds[3], InstKind::ReturnVoid));
    assert_eq!(module.entry_point.as_deref(), Some("main"));
}

#[test]
fn return_of_constant_is_const_then_return() {
    let module = lower("module t; function f(): byte { return 42; }");
    let f = module.function("f").unwrap();
    assert_eq!(f.blocks.len(), 1);
    let kinds: Vec<&InstKind> = f.blocks[0].instructions.iter().map(|i| &i.kind).collect();
    assert_eq!(kinds.len(), 2);
    assert!(matches!(kinds[0], InstKind::Const(Constant { value: 42, ty: IlType::Byte })));
    assert!(matches!(kinds[1], InstKind::Return(_)));
}

#[test]
fn folded_arithmetic_lowers_to_one_constant() {
    let module = lower("module t; function f(): byte { return 5 + 3; }");
    let f = module.function("f").unwrap();
    let consts: Vec<i64> = f.blocks[0]
        .instructions
        .iter()
        .filter_map(|i| match &i.kind {
            InstKind::Const(c) => Some(c.value),
            _ => None,
        })
        .collect();
    assert_eq!(consts, vec![8]);
}

#[test]
fn storage_classes_map_onto_memory_regions() {
    let source = r#"
        module t;
        @zp let fast: byte = 1;
        let plain: byte = 2;
        @data const table: byte[3] = [1, 2, 3];
        @address($D020) let border: byte;
    "#;
    let module = lower(source);
    assert_eq!(module.global("fast").unwrap().storage, StorageClass::ZeroPage);
    assert_eq!(module.global("plain").unwrap().storage, StorageClass::Ram);
    let table = module.global("table").unwrap();
    assert_eq!(table.storage, StorageClass::Data);
    assert_eq!(
        table.initial,
        Some(sable_il::GlobalInit::Array(vec![1, 2, 3]))
    );
    let border = module.global("border").unwrap();
    assert_eq!(border.storage, StorageClass::Map);
    assert_eq!(border.address, Some(0xD020));
}

#[test]
fn non_constant_map_address_is_a_lowering_error() {
    let source = r#"
        module t;
        let base: word = $D000;
        @address(base + 32) let border: byte;
    "#;
    let tokens = Lexer::new(source, 0).tokenize();
    let mut parser = Parser::new(tokens);
    let mut program = parser.parse();
    let (analysis, _) = Analyzer::analyze(&mut program, AnalyzerOptions::default());
    let (module, diagnostics) = lower_program(&program, &analysis);
    assert!(diagnostics
        .with_code(sable_common::DiagnosticCode::NonConstantAddress)
        .next()
        .is_some());
    // The offending global is abandoned; the module keeps lowering.
    assert!(module.global("border").is_none());
    assert!(module.global("base").is_some());
}

#[test]
fn if_else_produces_branch_and_merge_blocks() {
    let source = r#"
        module t;
        function f(x: byte): byte {
            let r: byte = 0;
            if (x > 0) { r = 1; } else { r = 2; }
            return r;
        }
    "#;
    let module = lower_with_ssa(source);
    let f = module.function("f").unwrap();
    assert!(f.blocks.len() >= 4, "entry, then, else, merge");
    let has_branch = f
        .blocks
        .iter()
        .any(|b| b.instructions.iter().any(|i| matches!(i.kind, InstKind::Branch { .. })));
    assert!(has_branch);
    // The merge point selects r with a phi.
    let has_phi = f
        .blocks
        .iter()
        .any(|b| b.instructions.iter().any(|i| i.kind.is_phi()));
    assert!(has_phi, "reassigned local must get a phi at the merge");
    assert_unique_register_ids(f);
}

#[test]
fn while_loop_registers_stay_unique_after_ssa() {
    let source = r#"
        module t;
        function f(): byte {
            let i: byte = 0;
            while (i < 10) {
                i = i + 1;
            }
            return i;
        }
    "#;
    let module = lower_with_ssa(source);
    let f = module.function("f").unwrap();
    assert_unique_register_ids(f);

    // The loop header merges the initial and incremented versions.
    let phi_blocks: Vec<_> = f
        .blocks
        .iter()
        .filter(|b| b.instructions.iter().any(|i| i.kind.is_phi()))
        .collect();
    assert!(!phi_blocks.is_empty());
    for block in &f.blocks {
        for inst in &block.instructions {
            if let InstKind::Phi { sources } = &inst.kind {
                assert_eq!(
                    sources.len(),
                    block.preds.len(),
                    "phi sources must match predecessor count"
                );
            }
        }
        let phi_count = block.phi_count();
        for (index, inst) in block.instructions.iter().enumerate() {
            if inst.kind.is_phi() {
                assert!(index < phi_count, "phis must lead the block");
            }
        }
    }
}

#[test]
fn recursive_fibonacci_survives_ssa_and_validation() {
    let source = r#"
        module t;
        function fib(n: byte): byte {
            if (n < 2) { return n; }
            return fib(n - 1) + fib(n - 2);
        }
        function main(): void { poke($0400, fib(10)); }
    "#;
    let module = lower_with_ssa(source);
    let fib = module.function("fib").unwrap();
    assert_unique_register_ids(fib);

    let result = validate_module(&module, &ValidatorConfig::default());
    assert!(result.valid, "{}", sable_il::format_report(&module.name, &result));
}

#[test]
fn short_circuit_and_lowers_to_branches() {
    let source = r#"
        module t;
        function f(a: byte, b: byte): bool {
            return a > 0 && b > 0;
        }
    "#;
    let module = lower_with_ssa(source);
    let f = module.function("f").unwrap();
    // One branch for the short circuit plus a join with a phi.
    assert!(f.blocks.len() >= 3);
    assert!(f
        .blocks
        .iter()
        .any(|b| b.instructions.iter().any(|i| i.kind.is_phi())));
    let result = validate_module(&module, &ValidatorConfig::default());
    assert!(result.valid, "{}", sable_il::format_report(&module.name, &result));
}

#[test]
fn array_indexing_lowers_to_address_arithmetic() {
    let source = r#"
        module t;
        @data const table: word[8] = [];
        function f(i: byte): word {
            return table[i];
        }
    "#;
    let module = lower(source);
    let f = module.function("f").unwrap();
    let kinds: Vec<&InstKind> = f.blocks[0].instructions.iter().map(|i| &i.kind).collect();
    assert!(kinds.iter().any(|k| matches!(k, InstKind::AddrOfGlobal { name } if name == "table")));
    assert!(kinds
        .iter()
        .any(|k| matches!(k, InstKind::Binary { op: BinaryIlOp::Mul, .. })));
    assert!(kinds
        .iter()
        .any(|k| matches!(k, InstKind::Binary { op: BinaryIlOp::Add, .. })));
    assert!(kinds.iter().any(|k| matches!(k, InstKind::PeekW { .. })));
}

#[test]
fn local_arrays_are_hoisted_to_globals() {
    let source = r#"
        module t;
        function f(): byte {
            let buf: byte[4] = [1, 2, 3, 4];
            return buf[0];
        }
    "#;
    let module = lower(source);
    let hoisted = module.global("f__buf").expect("hoisted array global");
    assert_eq!(hoisted.storage, StorageClass::Ram);
    assert_eq!(
        hoisted.initial,
        Some(sable_il::GlobalInit::Array(vec![1, 2, 3, 4]))
    );
}

#[test]
fn lo_hi_lower_to_mask_and_shift() {
    let source = r#"
        module t;
        function f(w: word): byte { return lo(w); }
        function g(w: word): byte { return hi(w); }
    "#;
    let module = lower(source);
    let f = module.function("f").unwrap();
    assert!(f.blocks[0].instructions.iter().any(|i| matches!(
        &i.kind,
        InstKind::Binary { op: BinaryIlOp::And, rhs: Value::Imm(Constant { value: 0xFF, .. }), .. }
    )));
    let g = module.function("g").unwrap();
    assert!(g.blocks[0].instructions.iter().any(|i| matches!(
        &i.kind,
        InstKind::Binary { op: BinaryIlOp::Shr, rhs: Value::Imm(Constant { value: 8, .. }), .. }
    )));
}

#[test]
fn for_loop_compares_and_steps_induction_variable() {
    let source = r#"
        module t;
        function f(): void {
            for i = 0 to 9 {
                poke($0400, i);
            }
        }
    "#;
    let module = lower_with_ssa(source);
    let f = module.function("f").unwrap();
    assert_unique_register_ids(f);
    let all_kinds: Vec<&InstKind> = f
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter().map(|i| &i.kind))
        .collect();
    assert!(all_kinds.iter().any(|k| matches!(k, InstKind::Cmp { op: CmpOp::Le, .. })));
    assert!(all_kinds
        .iter()
        .any(|k| matches!(k, InstKind::Binary { op: BinaryIlOp::Add, .. })));
    let result = validate_module(&module, &ValidatorConfig::default());
    assert!(result.valid, "{}", sable_il::format_report(&module.name, &result));
}

// ----------------------------------------------------------------------
// Validator checks on hand-built IL
// ----------------------------------------------------------------------

fn empty_function() -> Function {
    Function::new("f", Vec::new(), IlType::Void, false, false, false)
}

fn span() -> sable_common::Span {
    sable_common::Span::point(sable_common::Position::origin(), 0)
}

fn module_with(func: Function) -> Module {
    let mut module = Module::new("t");
    module.add_function(func);
    module
}

#[test]
fn missing_terminator_is_an_error() {
    let mut func = empty_function();
    let entry = func.entry;
    let reg = func.alloc_register(IlType::Byte, None);
    func.push_instruction(entry, InstKind::Const(Constant::byte(1)), Some(reg), span());

    let result = validate_module(&module_with(func), &ValidatorConfig::default());
    assert!(!result.valid);
    assert!(result.errors.iter().any(|e| e.message.contains("no terminator")));
}

#[test]
fn mismatched_binary_operands_are_an_error() {
    let mut func = empty_function();
    let entry = func.entry;
    let a = func.alloc_register(IlType::Byte, None);
    func.push_instruction(entry, InstKind::Const(Constant::byte(1)), Some(a), span());
    let b = func.alloc_register(IlType::Word, None);
    func.push_instruction(entry, InstKind::Const(Constant::word(2)), Some(b), span());
    let sum = func.alloc_register(IlType::Word, None);
    func.push_instruction(
        entry,
        InstKind::Binary { op: BinaryIlOp::Add, lhs: Value::Reg(a), rhs: Value::Reg(b) },
        Some(sum),
        span(),
    );
    func.push_instruction(entry, InstKind::ReturnVoid, None, span());

    let result = validate_module(&module_with(func), &ValidatorConfig::default());
    assert!(!result.valid);
    assert!(result.errors.iter().any(|e| e.message.contains("binary operands disagree")));
}

#[test]
fn non_bool_comparison_result_is_an_error() {
    let mut func = empty_function();
    let entry = func.entry;
    let a = func.alloc_register(IlType::Byte, None);
    func.push_instruction(entry, InstKind::Const(Constant::byte(1)), Some(a), span());
    let bad = func.alloc_register(IlType::Byte, None); // should be Bool
    func.push_instruction(
        entry,
        InstKind::Cmp { op: CmpOp::Eq, lhs: Value::Reg(a), rhs: Value::Imm(Constant::byte(0)) },
        Some(bad),
        span(),
    );
    func.push_instruction(entry, InstKind::ReturnVoid, None, span());

    let result = validate_module(&module_with(func), &ValidatorConfig::default());
    assert!(!result.valid);
    assert!(result
        .errors
        .iter()
        .any(|e| e.message.contains("comparison result register is not bool")));
}

#[test]
fn duplicate_definition_is_error_or_pre_ssa_warning() {
    let mut func = empty_function();
    let entry = func.entry;
    let reg = func.alloc_register(IlType::Byte, None);
    func.push_instruction(entry, InstKind::Const(Constant::byte(1)), Some(reg), span());
    func.push_instruction(entry, InstKind::Const(Constant::byte(2)), Some(reg), span());
    func.push_instruction(entry, InstKind::ReturnVoid, None, span());
    let module = module_with(func);

    let strict = validate_module(&module, &ValidatorConfig::default());
    assert!(!strict.valid);
    assert!(strict
        .errors
        .iter()
        .any(|e| e.message.contains("defined by instruction 0 and again by instruction 1")));

    let relaxed = ValidatorConfig { allow_pre_ssa: true, ..ValidatorConfig::default() };
    let result = validate_module(&module, &relaxed);
    assert!(result.valid, "pre-SSA duplicates downgrade to warnings");
    assert_eq!(result.warnings.iter().filter(|w| w.message.contains("defined")).count(), 1);
}

#[test]
fn use_not_dominated_by_definition_is_an_error() {
    let mut func = empty_function();
    let entry = func.entry;
    let side = func.add_block("side");
    let join = func.add_block("join");

    let cond = func.alloc_register(IlType::Bool, None);
    func.push_instruction(entry, InstKind::Const(Constant { value: 1, ty: IlType::Bool }), Some(cond), span());
    func.push_instruction(
        entry,
        InstKind::Branch { cond: Value::Reg(cond), then_block: side, else_block: join },
        None,
        span(),
    );

    // Defined only on the side path...
    let only_side = func.alloc_register(IlType::Byte, None);
    func.push_instruction(side, InstKind::Const(Constant::byte(7)), Some(only_side), span());
    func.push_instruction(side, InstKind::Jump(join), None, span());

    // ...but used at the join, which the side block does not dominate.
    func.push_instruction(
        join,
        InstKind::StoreGlobal { name: "g".to_string(), value: Value::Reg(only_side) },
        None,
        span(),
    );
    func.push_instruction(join, InstKind::ReturnVoid, None, span());

    let mut module = module_with(func);
    module.globals.push(sable_il::GlobalVariable {
        name: "g".to_string(),
        ty: IlType::Byte,
        storage: StorageClass::Ram,
        initial: None,
        address: None,
        is_exported: false,
        is_const: false,
    });

    let result = validate_module(&module, &ValidatorConfig::default());
    assert!(!result.valid);
    assert!(result
        .errors
        .iter()
        .any(|e| e.message.contains("not dominated by its definition")));
}

#[test]
fn unreachable_block_is_only_a_warning() {
    let mut func = empty_function();
    let entry = func.entry;
    func.push_instruction(entry, InstKind::ReturnVoid, None, span());
    let dead = func.add_block("dead");
    func.push_instruction(dead, InstKind::ReturnVoid, None, span());

    let result = validate_module(&module_with(func), &ValidatorConfig::default());
    assert!(result.valid);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.message.contains("unreachable from entry")));
}

#[test]
fn ssa_construction_is_idempotent_on_straight_line_code() {
    let source = "module t; function f(): byte { let x: byte = 1; return x; }";
    let module = lower_with_ssa(source);
    let f = module.function("f").unwrap();
    // Straight-line code needs no phis at all.
    assert!(f.blocks.iter().all(|b| b.phi_count() == 0));
    assert_unique_register_ids(f);
}

#[test]
fn switch_lowers_to_test_chain_with_join() {
    let source = r#"
        module t;
        function f(x: byte): byte {
            let r: byte = 0;
            switch (x) {
                case 1: r = 10;
                case 2: r = 20; break;
                default: r = 30;
            }
            return r;
        }
    "#;
    let module = lower_with_ssa(source);
    let f = module.function("f").unwrap();
    let eq_tests = f
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .filter(|i| matches!(i.kind, InstKind::Cmp { op: CmpOp::Eq, .. }))
        .count();
    assert_eq!(eq_tests, 2, "one equality test per case");
    assert_unique_register_ids(f);
    let result = validate_module(&module, &ValidatorConfig::default());
    assert!(result.valid, "{}", sable_il::format_report(&module.name, &result));
}

#[test]
fn continue_jumps_to_the_step_block() {
    let source = r#"
        module t;
        function f(): byte {
            let total: byte = 0;
            for i = 0 to 9 {
                if (i == 3) { continue; }
                total = total + 1;
            }
            return total;
        }
    "#;
    let module = lower_with_ssa(source);
    let f = module.function("f").unwrap();
    assert_unique_register_ids(f);
    let result = validate_module(&module, &ValidatorConfig::default());
    assert!(result.valid, "{}", sable_il::format_report(&module.name, &result));
}

#[test]
fn validate_full_pipeline_module() {
    let source = r#"
        module game;
        @zp let frame: byte = 0;
        @address($D020) let border: byte;
        enum Mode { Idle, Run = 5 }

        function tick(count: byte): byte {
            let total: byte = 0;
            for i = 0 to 7 {
                if (count > i && total < 200) {
                    total += count;
                } else {
                    total += 1;
                }
            }
            return total;
        }

        export function main(): void {
            sei();
            frame = tick(3);
            poke($D020, frame);
            cli();
        }
    "#;
    let module = lower_with_ssa(source);
    for func in &module.functions {
        assert_unique_register_ids(func);
    }
    let result = validate_module(&module, &ValidatorConfig::default());
    assert!(result.valid, "{}", sable_il::format_report(&module.name, &result));
    assert_eq!(module.entry_point.as_deref(), Some("main"));
}
