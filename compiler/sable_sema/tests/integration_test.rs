//! Integration tests for the semantic analyzer

use pretty_assertions::assert_eq;
use sable_common::{DiagnosticCode, Diagnostics};
use sable_lexer::Lexer;
use sable_parser::{ExprKind, ItemKind, Parser, Program, StmtKind};
use sable_sema::{Analysis, Analyzer, AnalyzerOptions, Type};

fn analyze_program(source: &str) -> (Program, Analysis, Diagnostics) {
    let tokens = Lexer::new(source, 0).tokenize();
    let mut parser = Parser::new(tokens);
    let mut program = parser.parse();
    assert!(
        !parser.diagnostics().has_errors(),
        "parse errors: {:?}",
        parser.diagnostics()
    );
    let (analysis, diagnostics) = Analyzer::analyze(&mut program, AnalyzerOptions::default());
    (program, analysis, diagnostics)
}

/// Type and constness of the expression initializing global `g`.
fn info_of_global_init(source: &str) -> (Type, bool, Option<i64>) {
    let (program, analysis, _) = analyze_program(source);
    for item in &program.items {
        if let ItemKind::Variable(var) = &item.kind {
            if var.name.value == "g" {
                let init = var.initializer.as_ref().expect("initializer");
                let info = &analysis.expr_info[&init.id];
                return (info.ty.clone(), info.is_const, info.value);
            }
        }
    }
    panic!("no global named g in {:?}", source);
}

#[test]
fn constant_folding_of_byte_addition() {
    let (ty, is_const, value) = info_of_global_init("module t; let g: byte = 5 + 3;");
    assert_eq!(ty, Type::Byte);
    assert!(is_const);
    assert_eq!(value, Some(8));
}

#[test]
fn constant_ternary_selects_branch() {
    let (_, is_const, value) = info_of_global_init("module t; let g: byte = true ? 5 : 10;");
    assert!(is_const);
    assert_eq!(value, Some(5));

    let (_, _, value) = info_of_global_init("module t; let g: byte = false ? 5 : 10;");
    assert_eq!(value, Some(10));
}

#[test]
fn word_arithmetic_wraps_mod_65536() {
    let (ty, is_const, value) = info_of_global_init("module t; let g: word = $FFFF + 1;");
    assert_eq!(ty, Type::Word);
    assert!(is_const);
    assert_eq!(value, Some(0));
}

#[test]
fn division_by_zero_is_nonconstant_warning_not_error() {
    let (program, analysis, diagnostics) =
        analyze_program("module t; function f(): byte { return 1 / 0; }");
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics);
    assert_eq!(diagnostics.with_code(DiagnosticCode::DivisionByZero).count(), 1);

    // The folded-away division stays non-constant.
    let ItemKind::Function(func) = &program.items[0].kind else {
        panic!("expected function");
    };
    let StmtKind::Return(Some(expr)) = &func.body.as_ref().unwrap().statements[0].kind else {
        panic!("expected return");
    };
    assert!(!analysis.expr_info[&expr.id].is_const);
}

#[test]
fn undefined_identifier_reports_once_with_unknown_type() {
    let source = "module t; function f(): byte { return missing; }";
    let tokens = Lexer::new(source, 0).tokenize();
    let mut parser = Parser::new(tokens);
    let mut program = parser.parse();
    let (analysis, diagnostics) = Analyzer::analyze(&mut program, AnalyzerOptions::default());

    assert_eq!(
        diagnostics.with_code(DiagnosticCode::UndefinedIdentifier).count(),
        1
    );
    // The failing expression's type is Unknown so nothing cascades.
    let ItemKind::Function(func) = &program.items[0].kind else {
        panic!("expected function");
    };
    let body = func.body.as_ref().unwrap();
    let StmtKind::Return(Some(expr)) = &body.statements[0].kind else {
        panic!("expected return");
    };
    assert_eq!(analysis.expr_info[&expr.id].ty, Type::Unknown);
}

#[test]
fn byte_overflow_in_initializer_is_an_error() {
    let source = "module t; function f(): byte { let x: byte = 256; return x; }";
    let tokens = Lexer::new(source, 0).tokenize();
    let mut parser = Parser::new(tokens);
    let mut program = parser.parse();
    let (_, diagnostics) = Analyzer::analyze(&mut program, AnalyzerOptions::default());
    assert!(diagnostics.has_errors());
    assert!(diagnostics.with_code(DiagnosticCode::TypeMismatch).count() >= 1);
}

#[test]
fn word_to_byte_assignment_requires_conversion() {
    let source = r#"
        module t;
        function f(w: word): byte { return w; }
    "#;
    let (_, _, diagnostics) = analyze_program(source);
    assert!(diagnostics.has_errors());
}

#[test]
fn byte_widens_to_word_implicitly() {
    let source = r#"
        module t;
        function f(b: byte): word { return b; }
    "#;
    let (_, _, diagnostics) = analyze_program(source);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics);
}

#[test]
fn call_arity_and_argument_types_are_checked() {
    let source = r#"
        module t;
        function add(a: byte, b: byte): byte { return a + b; }
        function main(): void {
            add(1);
        }
    "#;
    let (_, _, diagnostics) = analyze_program(source);
    assert_eq!(diagnostics.with_code(DiagnosticCode::ArityMismatch).count(), 1);
}

#[test]
fn calling_a_non_function_is_rejected() {
    let source = r#"
        module t;
        let x: byte = 1;
        function main(): void { x(); }
    "#;
    let (_, _, diagnostics) = analyze_program(source);
    assert_eq!(diagnostics.with_code(DiagnosticCode::NotCallable).count(), 1);
}

#[test]
fn assignment_target_must_be_lvalue() {
    let source = "module t; function f(): void { 1 = 2; }";
    let (_, _, diagnostics) = analyze_program(source);
    assert_eq!(
        diagnostics.with_code(DiagnosticCode::InvalidAssignmentTarget).count(),
        1
    );
}

#[test]
fn assigning_to_const_is_rejected() {
    let source = r#"
        module t;
        const limit: byte = 10;
        function f(): void { limit = 5; }
    "#;
    let (_, _, diagnostics) = analyze_program(source);
    assert_eq!(diagnostics.with_code(DiagnosticCode::AssignToConst).count(), 1);
}

#[test]
fn duplicate_declaration_in_same_scope() {
    let source = r#"
        module t;
        function f(): void {
            let x: byte = 1;
            let x: byte = 2;
        }
    "#;
    let (_, _, diagnostics) = analyze_program(source);
    assert_eq!(
        diagnostics.with_code(DiagnosticCode::DuplicateDeclaration).count(),
        1
    );
}

#[test]
fn shadowing_in_nested_block_is_fine() {
    let source = r#"
        module t;
        function f(): void {
            let x: byte = 1;
            {
                let x: word = 2;
                pokew($C000, x);
            }
            poke($D020, x);
        }
    "#;
    let (_, _, diagnostics) = analyze_program(source);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics);
}

#[test]
fn enum_members_are_constants_of_the_enum_type() {
    let source = r#"
        module t;
        enum Color { Black, White = 1, Red }
        let g: byte = Color.Red;
    "#;
    let (program, analysis, diagnostics) = analyze_program(source);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics);
    for item in &program.items {
        if let ItemKind::Variable(var) = &item.kind {
            let init = var.initializer.as_ref().unwrap();
            let info = &analysis.expr_info[&init.id];
            assert!(info.is_const);
            assert_eq!(info.value, Some(2));
            assert!(matches!(info.ty, Type::Enum { .. }));
        }
    }
}

#[test]
fn intrinsic_signatures_are_enforced() {
    let good = "module t; function f(): byte { poke($D020, 0); return peek($D020); }";
    let (_, _, diagnostics) = analyze_program(good);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics);

    let bad = "module t; function f(): void { poke($D020); }";
    let (_, _, diagnostics) = analyze_program(bad);
    assert_eq!(diagnostics.with_code(DiagnosticCode::ArityMismatch).count(), 1);
}

#[test]
fn sizeof_and_length_fold_to_constants() {
    let source = r#"
        module t;
        @data const table: word[16] = [];
        let g: byte = sizeof(word);
        function f(): word { return length(table); }
    "#;
    let (program, analysis, diagnostics) = analyze_program(source);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics);

    for item in &program.items {
        match &item.kind {
            ItemKind::Variable(var) if var.name.value == "g" => {
                let info = &analysis.expr_info[&var.initializer.as_ref().unwrap().id];
                assert_eq!(info.value, Some(2));
            }
            ItemKind::Function(func) => {
                let StmtKind::Return(Some(expr)) =
                    &func.body.as_ref().unwrap().statements[0].kind
                else {
                    panic!("expected return");
                };
                let info = &analysis.expr_info[&expr.id];
                assert!(info.is_const);
                assert_eq!(info.value, Some(16));
                assert_eq!(info.ty, Type::Word);
            }
            _ => {}
        }
    }
}

#[test]
fn logical_operators_need_bool_like_operands() {
    let source = "module t; function f(flag: bool, n: byte): bool { return flag && n; }";
    let (_, _, diagnostics) = analyze_program(source);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics);

    let bad = r#"module t; function f(s: string): bool { return s && true; }"#;
    let tokens = Lexer::new(bad, 0).tokenize();
    let mut parser = Parser::new(tokens);
    let mut program = parser.parse();
    let (_, diagnostics) = Analyzer::analyze(&mut program, AnalyzerOptions::default());
    assert!(diagnostics.with_code(DiagnosticCode::InvalidOperand).count() >= 1);
}

#[test]
fn comparison_annotates_bool() {
    let source = "module t; function f(a: byte, b: word): bool { return a < b; }";
    let (program, analysis, diagnostics) = analyze_program(source);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics);
    let ItemKind::Function(func) = &program.items[0].kind else {
        panic!("expected function");
    };
    let StmtKind::Return(Some(expr)) = &func.body.as_ref().unwrap().statements[0].kind else {
        panic!("expected return");
    };
    assert!(matches!(expr.kind.as_ref(), ExprKind::Binary { .. }));
    assert_eq!(analysis.expr_info[&expr.id].ty, Type::Bool);
}

#[test]
fn break_outside_loop_is_reported() {
    let source = "module t; function f(): void { break; }";
    let (_, _, diagnostics) = analyze_program(source);
    assert_eq!(diagnostics.with_code(DiagnosticCode::BreakOutsideLoop).count(), 1);
}

#[test]
fn for_loop_declares_its_induction_variable() {
    let source = r#"
        module t;
        function f(): void {
            for i = 0 to 10 {
                poke($0400, i);
            }
        }
    "#;
    let (_, _, diagnostics) = analyze_program(source);
    assert!(!diagnostics.has_errors(), "{:?}", diagnostics);
}
