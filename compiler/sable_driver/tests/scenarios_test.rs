//! End-to-end scenarios: source text in, diagnostics and IL shape out

use pretty_assertions::assert_eq;
use sable_common::{DiagnosticCode, MetaKey};
use sable_driver::{compile_source, CompileOptions};
use sable_il::{Constant, IlType, InstKind};
use sable_sema::{can_assign, Type};

fn compile(source: &str) -> sable_driver::CompileOutput {
    compile_source("test.sbl", source, &CompileOptions::default())
}

#[test]
fn scenario_poke_compiles_to_one_block() {
    let output = compile("module t; function main(): void { poke($D020, 0); }");
    assert!(!output.diagnostics.has_errors(), "{:?}", output.diagnostics);
    assert!(output.success);

    let unit = &output.units[0];
    assert_eq!(unit.il.entry_point.as_deref(), Some("main"));
    let main = unit.il.function("main").expect("main in IL");
    assert_eq!(main.blocks.len(), 1);

    let kinds: Vec<&InstKind> = main.blocks[0].instructions.iter().map(|i| &i.kind).collect();
    assert!(matches!(kinds[0], InstKind::Const(Constant { value: 0xD020, .. })));
    assert!(matches!(kinds[1], InstKind::Const(Constant { value: 0, .. })));
    assert!(matches!(kinds[2], InstKind::Poke { .. }));
    assert!(matches!(kinds[3], InstKind::ReturnVoid));
}

#[test]
fn scenario_return_42_single_block() {
    let output = compile("module t; function f(): byte { return 42; }");
    assert!(!output.diagnostics.has_errors(), "{:?}", output.diagnostics);

    let f = output.units[0].il.function("f").unwrap();
    assert_eq!(f.blocks.len(), 1);
    let kinds: Vec<&InstKind> = f.blocks[0].instructions.iter().map(|i| &i.kind).collect();
    assert_eq!(kinds.len(), 2);
    assert!(matches!(
        kinds[0],
        InstKind::Const(Constant { value: 42, ty: IlType::Byte })
    ));
    assert!(matches!(kinds[1], InstKind::Return(_)));

    assert!(can_assign(&Type::Byte, &Type::Byte));
}

#[test]
fn scenario_unreachable_let_after_return() {
    let output = compile("module t; function f(): void { return; let x: byte = 1; }");
    assert_eq!(
        output.diagnostics.with_code(DiagnosticCode::UnreachableCode).count(),
        1
    );
    assert_eq!(output.diagnostics.error_count(), 0);
    assert!(output.success, "warnings alone never fail a build");

    // The warning points at the let statement.
    let warning = output
        .diagnostics
        .with_code(DiagnosticCode::UnreachableCode)
        .next()
        .unwrap();
    assert!(warning.span.start.offset > 0);
}

#[test]
fn scenario_byte_overflow_fails_but_still_lowers() {
    let output = compile("module t; function f(): byte { let x: byte = 256; return x; }");
    assert!(!output.success);
    assert!(output.diagnostics.has_errors());
    // IL is still produced for the unit.
    assert!(output.units[0].il.function("f").is_some());
}

#[test]
fn scenario_code_after_fully_returning_if_else() {
    let source = r#"
        module t;
        function g(x: byte): byte {
            if (x > 0) { return 1; } else { return 0; }
            let dead: byte = 0;
            return dead;
        }
    "#;
    let output = compile(source);
    assert_eq!(
        output.diagnostics.with_code(DiagnosticCode::UnreachableCode).count(),
        1
    );
}

#[test]
fn scenario_fibonacci_recursion_flags_and_ssa() {
    let source = r#"
        module t;
        function fib(n: byte): byte {
            if (n < 2) { return n; }
            return fib(n - 1) + fib(n - 2);
        }
        function main(): void {
            poke($0400, fib(10));
        }
    "#;
    let output = compile(source);
    assert!(!output.diagnostics.has_errors(), "{:?}", output.diagnostics);
    assert!(output.success);

    let unit = &output.units[0];
    let node = unit.analysis.call_graph.node("fib").expect("fib in call graph");
    assert!(node.is_recursive);
    assert!(!node.inline_candidate);

    // Metadata mirrors the call-graph verdicts on the AST item.
    let fib_item = unit
        .ast
        .items
        .iter()
        .find(|i| matches!(&i.kind, sable_parser::ItemKind::Function(f) if f.name.value == "fib"))
        .unwrap();
    assert_eq!(fib_item.metadata.get_bool(MetaKey::CallGraphRecursive), Some(true));
    assert_eq!(fib_item.metadata.get_bool(MetaKey::CallGraphInlineCandidate), Some(false));

    // All register IDs across all blocks are distinct.
    let fib = unit.il.function("fib").unwrap();
    let mut seen = std::collections::HashSet::new();
    for param in &fib.params {
        assert!(seen.insert(param.register));
    }
    for block in &fib.blocks {
        for inst in &block.instructions {
            if let Some(result) = inst.result {
                assert!(seen.insert(result), "register id collision on r{}", result);
            }
        }
    }

    assert!(unit.validation.valid);
}

#[test]
fn strict_mode_turns_warnings_into_failure() {
    let source = "module t; function f(): void { return; let x: byte = 1; }";
    let relaxed = compile(source);
    assert!(relaxed.success);

    let strict = compile_source(
        "test.sbl",
        source,
        &CompileOptions { strict: true, ..CompileOptions::default() },
    );
    assert!(!strict.success);
}

#[test]
fn advanced_analysis_can_be_disabled() {
    let source = "module t; function orphan(): void { } function main(): void { }";
    let output = compile_source(
        "test.sbl",
        source,
        &CompileOptions { run_advanced_analysis: false, ..CompileOptions::default() },
    );
    // No call-graph pass means no unused-function warning.
    assert_eq!(
        output.diagnostics.with_code(DiagnosticCode::UnusedFunction).count(),
        0
    );
    assert!(output.units[0].analysis.call_graph.is_empty());
}

#[test]
fn multiple_sources_compile_independently() {
    let sources = vec![
        (
            "a.sbl".to_string(),
            "module a; export function tick(): void { }".to_string(),
        ),
        (
            "b.sbl".to_string(),
            "module b; import tick from a; function main(): void { tick(); }".to_string(),
        ),
    ];
    let output = sable_driver::compile(&sources, &CompileOptions::default());
    assert!(!output.diagnostics.has_errors(), "{:?}", output.diagnostics);
    assert_eq!(output.units.len(), 2);
    assert_eq!(output.units[0].il.name, "a");
    assert_eq!(output.units[1].il.name, "b");
    assert_eq!(output.units[1].il.imports.len(), 1);
    assert_eq!(output.units[1].il.imports[0].module_path, "a");
}

#[test]
fn lexical_garbage_never_panics_and_reports() {
    let output = compile("module t; function f(): void { poke(`, 0); }");
    assert!(!output.success);
    assert!(output
        .diagnostics
        .with_code(DiagnosticCode::UnknownCharacter)
        .next()
        .is_some());
}
