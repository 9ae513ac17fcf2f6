//! Abstract Syntax Tree definitions for the Sable language
//!
//! Nodes are tagged sum types discriminated by their kind enum. Every node
//! carries a span and a metadata map that later passes may write to;
//! structural fields are set at construction and treated as immutable.

use sable_common::{Metadata, Span, Spanned};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type alias for node IDs. Unique within one parsed program.
pub type NodeId = u32;

/// A complete Sable compilation unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub module: ModuleDecl,
    pub items: Vec<Item>,
    pub span: Span,
}

/// The module header. A source file without one gets an implicit module
/// named `global`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDecl {
    pub path: Vec<String>,
    pub implicit: bool,
    pub span: Span,
}

impl ModuleDecl {
    pub fn name(&self) -> String {
        self.path.join(".")
    }
}

/// A module-scope declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub kind: ItemKind,
    pub span: Span,
    pub id: NodeId,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ItemKind {
    Function(Function),
    Variable(VariableDecl),
    TypeAlias(TypeAlias),
    Enum(EnumDecl),
    Import(Import),
}

/// `import NAME (, NAME)* from PATH ;`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Import {
    pub names: Vec<Spanned<String>>,
    pub path: Vec<String>,
}

/// Function declaration. `body` is `None` for stubs (`function f();`),
/// which are resolved at link time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: Spanned<String>,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeExpr>,
    pub body: Option<Block>,
    pub is_callback: bool,
    pub is_exported: bool,
}

impl Function {
    pub fn is_stub(&self) -> bool {
        self.body.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: Spanned<String>,
    pub ty: TypeExpr,
    pub span: Span,
}

/// Module-scope variable declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: Spanned<String>,
    pub is_const: bool,
    pub is_exported: bool,
    pub storage: Option<StorageSpec>,
    pub ty: Option<TypeExpr>,
    pub initializer: Option<Expr>,
}

/// Storage-class annotation on a global, mapping it onto a 6502 memory
/// region. `Address` carries the fixed-location expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSpec {
    pub class: StorageClassKind,
    pub address: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClassKind {
    ZeroPage,
    Ram,
    Data,
    Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeAlias {
    pub name: Spanned<String>,
    pub ty: TypeExpr,
    pub is_exported: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: Spanned<String>,
    pub members: Vec<EnumMember>,
    pub is_exported: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: Spanned<String>,
    pub value: Option<Expr>,
    pub span: Span,
}

/// A type annotation as written in source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeExprKind {
    /// `byte`, `word`, `bool`, `void`, `string`, or a user-defined name.
    Named(String),
    /// `T[10]` or the unsized `T[]`.
    Array {
        element: Box<TypeExpr>,
        size: Option<Box<Expr>>,
    },
}

/// A block of statements with its own lexical scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
    pub id: NodeId,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    Block(Block),
    If {
        condition: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    While {
        condition: Expr,
        body: Block,
    },
    For {
        var: Spanned<String>,
        start: Expr,
        end: Expr,
        direction: ForDirection,
        step: Option<Expr>,
        body: Block,
    },
    Switch {
        scrutinee: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Stmt>>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Expr(Expr),
    Local(LocalVariable),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForDirection {
    To,
    Downto,
}

/// One `case EXPR:` arm. There is no fallthrough: the body ends at the
/// next `case`/`default`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchCase {
    pub value: Expr,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalVariable {
    pub name: Spanned<String>,
    pub is_const: bool,
    pub ty: Option<TypeExpr>,
    pub initializer: Option<Expr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: Box<ExprKind>,
    pub span: Span,
    pub id: NodeId,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(String),
    Binary {
        op: BinaryOp,
        left: Expr,
        right: Expr,
    },
    Unary {
        op: UnaryOp,
        operand: Expr,
    },
    Ternary {
        condition: Expr,
        then_expr: Expr,
        else_expr: Expr,
    },
    /// Calls are restricted to a bare identifier callee.
    Call {
        callee: Spanned<String>,
        args: Vec<Expr>,
    },
    Index {
        base: Expr,
        index: Expr,
    },
    /// `base.member`, restricted to a bare identifier base with no
    /// further chaining (no `a.b.c`, `a.b[i]` or `a.b()`).
    Member {
        base: Spanned<String>,
        member: Spanned<String>,
    },
    ArrayLiteral(Vec<Expr>),
    /// `target = value` or a compound form; `op` holds the underlying
    /// binary operator for compound assignments.
    Assign {
        target: Expr,
        op: Option<BinaryOp>,
        value: Expr,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Numeric literal with the raw lexeme kept so the radix stays
    /// reconstructable.
    Number { value: u32, raw: String },
    Str(String),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `~`
    BitNot,
    /// `+`
    Plus,
    /// `-`
    Neg,
    /// `@`, legal only on a bare identifier
    AddressOf,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        };
        write!(f, "{}", op)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Plus => "+",
            UnaryOp::Neg => "-",
            UnaryOp::AddressOf => "@",
        };
        write!(f, "{}", op)
    }
}

impl Expr {
    /// The identifier name if this expression is a bare identifier.
    pub fn as_identifier(&self) -> Option<&str> {
        match self.kind.as_ref() {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}
