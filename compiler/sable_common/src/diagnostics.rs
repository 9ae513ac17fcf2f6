//! Diagnostic records for the Sable compiler
//!
//! Downstream consumers discriminate on [`DiagnosticCode`], not on message
//! text. Codes are stable; messages are free to change.

use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Stable numeric diagnostic codes.
///
/// Grouped by pipeline stage: 1xxx lexical, 2xxx syntactic, 3xxx semantic,
/// 4xxx flow analysis, 5xxx lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum DiagnosticCode {
    // Lexical
    UnknownCharacter = 1001,
    UnterminatedString = 1002,
    UnterminatedComment = 1003,
    InvalidNumber = 1004,
    UnknownEscape = 1005,

    // Syntactic
    UnexpectedToken = 2001,
    ExpectedToken = 2002,
    DuplicateModule = 2003,
    InvalidModuleScope = 2004,
    ExportRequiresDeclaration = 2005,
    ImplicitMainExport = 2006,
    MissingSemicolon = 2007,

    // Semantic
    UndefinedIdentifier = 3001,
    TypeMismatch = 3002,
    InvalidOperand = 3003,
    InvalidAssignmentTarget = 3004,
    DuplicateDeclaration = 3005,
    ArityMismatch = 3006,
    NotCallable = 3007,
    DivisionByZero = 3008,
    UnknownType = 3009,
    AssignToConst = 3010,

    // Flow analysis
    UnreachableCode = 4001,
    UnusedFunction = 4002,
    MissingReturn = 4003,
    BreakOutsideLoop = 4004,
    ContinueOutsideLoop = 4005,

    // Lowering
    NonConstantAddress = 5001,
    UnsupportedConstruct = 5002,
}

impl DiagnosticCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.as_u32())
    }
}

/// A single diagnostic record. Append-only once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub span: Span,
    /// Secondary locations (e.g. the previous declaration for duplicates).
    pub related: Vec<Span>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            span,
            related: Vec::new(),
        }
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            span,
            related: Vec::new(),
        }
    }

    pub fn info(code: DiagnosticCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Info,
            code,
            message: message.into(),
            span,
            related: Vec::new(),
        }
    }

    pub fn with_related(mut self, span: Span) -> Self {
        self.related.push(span);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {} at {}", self.severity, self.code, self.message, self.span)
    }
}

/// The append-only diagnostic sink shared by every pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    records: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.records.push(diagnostic);
    }

    pub fn error(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::error(code, message, span));
    }

    pub fn warning(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::warning(code, message, span));
    }

    pub fn info(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        self.push(Diagnostic::info(code, message, span));
    }

    pub fn has_errors(&self) -> bool {
        self.records.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.records.iter().filter(|d| d.severity == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.records.iter().filter(|d| d.severity == Severity::Warning).count()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter().filter(|d| d.severity == Severity::Warning)
    }

    /// Records carrying the given code, in emission order.
    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &Diagnostic> {
        self.records.iter().filter(move |d| d.code == code)
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.records.extend(other.records);
    }
}
