//! Integration tests for the shared compiler utilities

use pretty_assertions::assert_eq;
use sable_common::{
    Diagnostic, DiagnosticCode, Diagnostics, Position, Severity, Span, Spanned,
};

fn span_at(line: u32, col: u32, off: u32, len: u32) -> Span {
    Span::new(
        Position::new(line, col, off),
        Position::new(line, col + len, off + len),
        0,
    )
}

#[test]
fn diagnostic_display_includes_code_and_location() {
    let d = Diagnostic::error(
        DiagnosticCode::UndefinedIdentifier,
        "undefined identifier 'foo'",
        span_at(3, 5, 40, 3),
    );
    let rendered = format!("{}", d);
    assert!(rendered.contains("E3001"));
    assert!(rendered.contains("undefined identifier 'foo'"));
    assert!(rendered.contains("3:5"));
}

#[test]
fn related_spans_accumulate() {
    let d = Diagnostic::error(
        DiagnosticCode::DuplicateDeclaration,
        "duplicate declaration of 'x'",
        span_at(5, 1, 60, 1),
    )
    .with_related(span_at(2, 1, 10, 1));
    assert_eq!(d.related.len(), 1);
    assert_eq!(d.related[0].start.line, 2);
}

#[test]
fn sink_merge_preserves_order() {
    let mut a = Diagnostics::new();
    a.error(DiagnosticCode::TypeMismatch, "first", span_at(1, 1, 0, 1));
    let mut b = Diagnostics::new();
    b.warning(DiagnosticCode::UnreachableCode, "second", span_at(2, 1, 5, 1));
    a.extend(b);

    let severities: Vec<Severity> = a.iter().map(|d| d.severity).collect();
    assert_eq!(severities, vec![Severity::Error, Severity::Warning]);
}

#[test]
fn spanned_map_keeps_span() {
    let s = Spanned::new("42", span_at(1, 1, 0, 2));
    let mapped = s.map(|v| v.len());
    assert_eq!(mapped.value, 2);
    assert_eq!(mapped.span.len(), 2);
}
