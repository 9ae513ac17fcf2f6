//! Integration tests for the Sable parser

use pretty_assertions::assert_eq;
use sable_common::DiagnosticCode;
use sable_lexer::Lexer;
use sable_parser::{
    BinaryOp, Expr, ExprKind, ForDirection, ItemKind, Literal, Parser, Program, StmtKind,
};

fn parse(source: &str) -> (Program, Parser) {
    let tokens = Lexer::new(source, 0).tokenize();
    let mut parser = Parser::new(tokens);
    let program = parser.parse();
    (program, parser)
}

fn parse_expr(source: &str) -> Expr {
    let tokens = Lexer::new(source, 0).tokenize();
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expression().expect("expression should parse");
    assert!(!parser.diagnostics().has_errors(), "{:?}", parser.diagnostics());
    expr
}

#[test]
fn implicit_module_is_named_global() {
    let (program, _) = parse("function main(): void { }");
    assert!(program.module.implicit);
    assert_eq!(program.module.name(), "global");
}

#[test]
fn module_header_with_dotted_path() {
    let (program, parser) = parse("module game.sprites;\nlet x: byte = 0;");
    assert!(!parser.diagnostics().has_errors());
    assert_eq!(program.module.path, vec!["game".to_string(), "sprites".to_string()]);
    assert_eq!(program.items.len(), 1);
}

#[test]
fn duplicate_module_header_is_reported() {
    let (_, parser) = parse("module a;\nmodule b;\nlet x: byte = 0;");
    assert_eq!(
        parser.diagnostics().with_code(DiagnosticCode::DuplicateModule).count(),
        1
    );
}

#[test]
fn declarations_stay_in_source_order() {
    let source = r#"
        module t;
        let first: byte = 1;
        function second(): void { }
        enum Third { A, B }
    "#;
    let (program, parser) = parse(source);
    assert!(!parser.diagnostics().has_errors());
    assert_eq!(program.items.len(), 3);
    assert!(matches!(program.items[0].kind, ItemKind::Variable(_)));
    assert!(matches!(program.items[1].kind, ItemKind::Function(_)));
    assert!(matches!(program.items[2].kind, ItemKind::Enum(_)));
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let expr = parse_expr("1 + 2 * 3");
    match expr.kind.as_ref() {
        ExprKind::Binary { op: BinaryOp::Add, left, right } => {
            assert!(matches!(
                left.kind.as_ref(),
                ExprKind::Literal(Literal::Number { value: 1, .. })
            ));
            assert!(matches!(
                right.kind.as_ref(),
                ExprKind::Binary { op: BinaryOp::Mul, .. }
            ));
        }
        other => panic!("expected addition at the root, got {:?}", other),
    }
}

#[test]
fn parentheses_override_precedence() {
    let expr = parse_expr("(1 + 2) * 3");
    match expr.kind.as_ref() {
        ExprKind::Binary { op: BinaryOp::Mul, left, .. } => {
            assert!(matches!(
                left.kind.as_ref(),
                ExprKind::Binary { op: BinaryOp::Add, .. }
            ));
        }
        other => panic!("expected multiplication at the root, got {:?}", other),
    }
}

#[test]
fn ternary_is_right_associative() {
    let expr = parse_expr("a ? b : c ? d : e");
    match expr.kind.as_ref() {
        ExprKind::Ternary { condition, else_expr, .. } => {
            assert_eq!(condition.as_identifier(), Some("a"));
            assert!(matches!(else_expr.kind.as_ref(), ExprKind::Ternary { .. }));
        }
        other => panic!("expected ternary at the root, got {:?}", other),
    }
}

#[test]
fn address_of_rejects_literals() {
    let tokens = Lexer::new("@5", 0).tokenize();
    let mut parser = Parser::new(tokens);
    let _ = parser.parse_expression();
    assert_eq!(
        parser.diagnostics().with_code(DiagnosticCode::UnexpectedToken).count(),
        1
    );
}

#[test]
fn address_of_identifier_parses() {
    let expr = parse_expr("@buffer + 1");
    match expr.kind.as_ref() {
        ExprKind::Binary { op: BinaryOp::Add, left, .. } => {
            assert!(matches!(
                left.kind.as_ref(),
                ExprKind::Unary { op: sable_parser::UnaryOp::AddressOf, .. }
            ));
        }
        other => panic!("expected addition at the root, got {:?}", other),
    }
}

#[test]
fn compound_assignment_records_underlying_op() {
    let expr = parse_expr("x += 2");
    match expr.kind.as_ref() {
        ExprKind::Assign { op: Some(BinaryOp::Add), target, .. } => {
            assert_eq!(target.as_identifier(), Some("x"));
        }
        other => panic!("expected compound assignment, got {:?}", other),
    }
}

#[test]
fn member_access_does_not_chain() {
    // `a.b.c` is rejected; the parser stops at `a.b` and the statement
    // recovery reports the trailing `.c`.
    let (_, parser) = parse("module t; function f(): void { a.b.c; }");
    assert!(parser.diagnostics().has_errors());
}

#[test]
fn call_restricted_to_bare_identifier() {
    let expr = parse_expr("f(1, 2)[3]");
    match expr.kind.as_ref() {
        ExprKind::Index { base, .. } => match base.kind.as_ref() {
            ExprKind::Call { callee, args } => {
                assert_eq!(callee.value, "f");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected call under index, got {:?}", other),
        },
        other => panic!("expected index at the root, got {:?}", other),
    }
}

#[test]
fn array_literals_including_empty_and_nested() {
    let expr = parse_expr("[[1, 2], [3, 4],]");
    match expr.kind.as_ref() {
        ExprKind::ArrayLiteral(rows) => {
            assert_eq!(rows.len(), 2);
            assert!(matches!(rows[0].kind.as_ref(), ExprKind::ArrayLiteral(_)));
        }
        other => panic!("expected array literal, got {:?}", other),
    }
    assert!(matches!(
        parse_expr("[]").kind.as_ref(),
        ExprKind::ArrayLiteral(elements) if elements.is_empty()
    ));
}

#[test]
fn function_stub_has_no_body() {
    let (program, parser) = parse("module t; function joy_read(port: byte): byte;");
    assert!(!parser.diagnostics().has_errors());
    match &program.items[0].kind {
        ItemKind::Function(func) => {
            assert!(func.is_stub());
            assert_eq!(func.params.len(), 1);
        }
        other => panic!("expected function, got {:?}", other),
    }
}

#[test]
fn main_is_auto_exported_with_warning() {
    let (program, parser) = parse("module t; function main(): void { }");
    match &program.items[0].kind {
        ItemKind::Function(func) => assert!(func.is_exported),
        other => panic!("expected function, got {:?}", other),
    }
    assert_eq!(
        parser.diagnostics().with_code(DiagnosticCode::ImplicitMainExport).count(),
        1
    );
}

#[test]
fn storage_class_prefixes() {
    let source = r#"
        module t;
        @zp let fast: byte = 0;
        @data const table: byte[3] = [1, 2, 3];
        @address($D020) let border: byte;
    "#;
    let (program, parser) = parse(source);
    assert!(!parser.diagnostics().has_errors(), "{:?}", parser.diagnostics());
    assert_eq!(program.items.len(), 3);
    match &program.items[2].kind {
        ItemKind::Variable(var) => {
            let storage = var.storage.as_ref().expect("storage spec");
            assert_eq!(storage.class, sable_parser::StorageClassKind::Address);
            assert!(storage.address.is_some());
        }
        other => panic!("expected variable, got {:?}", other),
    }
}

#[test]
fn for_loop_with_downto_and_step() {
    let source = "module t; function f(): void { for i = 10 downto 0 step 2 { } }";
    let (program, parser) = parse(source);
    assert!(!parser.diagnostics().has_errors(), "{:?}", parser.diagnostics());
    let ItemKind::Function(func) = &program.items[0].kind else {
        panic!("expected function");
    };
    let body = func.body.as_ref().unwrap();
    match &body.statements[0].kind {
        StmtKind::For { direction, step, .. } => {
            assert_eq!(*direction, ForDirection::Downto);
            assert!(step.is_some());
        }
        other => panic!("expected for statement, got {:?}", other),
    }
}

#[test]
fn switch_with_cases_and_default() {
    let source = r#"
        module t;
        function f(x: byte): void {
            switch (x) {
                case 1: poke($D020, 1);
                case 2: poke($D020, 2); break;
                default: poke($D020, 0);
            }
        }
    "#;
    let (program, parser) = parse(source);
    assert!(!parser.diagnostics().has_errors(), "{:?}", parser.diagnostics());
    let ItemKind::Function(func) = &program.items[0].kind else {
        panic!("expected function");
    };
    match &func.body.as_ref().unwrap().statements[0].kind {
        StmtKind::Switch { cases, default, .. } => {
            assert_eq!(cases.len(), 2);
            assert_eq!(cases[1].body.len(), 2);
            assert!(default.is_some());
        }
        other => panic!("expected switch, got {:?}", other),
    }
}

#[test]
fn missing_semicolon_is_reported_but_parsing_continues() {
    let (program, parser) = parse("module t; function f(): void { let x: byte = 1 let y: byte = 2; }");
    assert!(parser
        .diagnostics()
        .with_code(DiagnosticCode::MissingSemicolon)
        .count()
        >= 1);
    let ItemKind::Function(func) = &program.items[0].kind else {
        panic!("expected function");
    };
    // Both locals survive the missing semicolon.
    assert_eq!(func.body.as_ref().unwrap().statements.len(), 2);
}

#[test]
fn invalid_module_scope_token_recovers() {
    let (program, parser) = parse("module t; 42; function f(): void { }");
    assert!(parser
        .diagnostics()
        .with_code(DiagnosticCode::InvalidModuleScope)
        .count()
        >= 1);
    assert_eq!(program.items.len(), 1);
}

#[test]
fn export_requires_declaration() {
    let (_, parser) = parse("module t; export 5;");
    assert_eq!(
        parser
            .diagnostics()
            .with_code(DiagnosticCode::ExportRequiresDeclaration)
            .count(),
        1
    );
}

#[test]
fn imports_parse_names_and_dotted_path() {
    let (program, parser) = parse("module t; import clear_screen, set_border from c64.video;");
    assert!(!parser.diagnostics().has_errors());
    match &program.items[0].kind {
        ItemKind::Import(import) => {
            assert_eq!(import.names.len(), 2);
            assert_eq!(import.path, vec!["c64".to_string(), "video".to_string()]);
        }
        other => panic!("expected import, got {:?}", other),
    }
}
