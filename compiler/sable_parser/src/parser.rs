//! Parser for the Sable language
//!
//! Recursive descent at declaration/statement level, Pratt precedence
//! climbing for expressions. The parser never aborts: errors become
//! diagnostics and the token stream is re-synchronized at the next
//! statement or declaration boundary.

use crate::ast::*;
use crate::precedence::{infix_precedence, Assoc, Precedence};
use sable_common::{
    CompileError, CompileResult, DiagnosticCode, Diagnostics, Metadata, Position, Span, Spanned,
};
use sable_lexer::{number_value, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    next_node_id: NodeId,
    diagnostics: Diagnostics,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            next_node_id: 0,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    /// Parse a whole compilation unit. Always returns a `Program`; syntax
    /// problems surface as diagnostics.
    pub fn parse(&mut self) -> Program {
        let start_span = self.current_span();
        let module = self.parse_module_header();
        let mut items = Vec::new();

        while !self.is_at_end() {
            // Stray semicolons between items are harmless.
            if self.match_token(&TokenKind::Semicolon) {
                continue;
            }
            if self.check(&TokenKind::Module) {
                let span = self.current_span();
                self.diagnostics.error(
                    DiagnosticCode::DuplicateModule,
                    "duplicate module header",
                    span,
                );
                self.skip_module_header();
                continue;
            }
            match self.parse_item() {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {}
                Err(_) => self.recover_to_item_boundary(),
            }
        }

        log::debug!("parsed {} items, {} diagnostics", items.len(), self.diagnostics.len());

        Program {
            module,
            items,
            span: start_span.merge(self.previous_span()),
        }
    }

    fn parse_module_header(&mut self) -> ModuleDecl {
        if !self.check(&TokenKind::Module) {
            return ModuleDecl {
                path: vec!["global".to_string()],
                implicit: true,
                span: Span::point(Position::origin(), self.file_id()),
            };
        }

        let start = self.current_span();
        self.advance(); // module
        let mut path = Vec::new();
        match self.expect_identifier() {
            Ok(name) => path.push(name.value),
            Err(_) => path.push("global".to_string()),
        }
        while self.match_token(&TokenKind::Dot) {
            match self.expect_identifier() {
                Ok(name) => path.push(name.value),
                Err(_) => break,
            }
        }
        self.expect_semicolon();

        ModuleDecl {
            path,
            implicit: false,
            span: start.merge(self.previous_span()),
        }
    }

    fn skip_module_header(&mut self) {
        self.advance(); // module
        while matches!(
            self.current_kind(),
            TokenKind::Identifier(_) | TokenKind::Dot
        ) {
            self.advance();
        }
        self.match_token(&TokenKind::Semicolon);
    }

    /// Parse one module-scope item. `Ok(None)` means the construct was
    /// consumed but produced nothing (already reported).
    fn parse_item(&mut self) -> CompileResult<Option<Item>> {
        let start_span = self.current_span();

        if self.check(&TokenKind::Import) {
            let import = self.parse_import()?;
            return Ok(Some(self.make_item(ItemKind::Import(import), start_span)));
        }

        let is_exported = self.match_token(&TokenKind::Export);

        // Storage classes may only prefix variable declarations.
        let storage = if self.current_kind().is_storage_class() {
            Some(self.parse_storage_spec()?)
        } else {
            None
        };

        match self.current_kind() {
            TokenKind::Function | TokenKind::Callback => {
                if let Some(spec) = &storage {
                    self.diagnostics.error(
                        DiagnosticCode::UnexpectedToken,
                        "storage class is not valid on a function",
                        spec.span,
                    );
                }
                let func = self.parse_function(is_exported)?;
                Ok(Some(self.make_item(ItemKind::Function(func), start_span)))
            }
            TokenKind::Let | TokenKind::Const => {
                let var = self.parse_variable(is_exported, storage)?;
                Ok(Some(self.make_item(ItemKind::Variable(var), start_span)))
            }
            TokenKind::Type => {
                let alias = self.parse_type_alias(is_exported)?;
                Ok(Some(self.make_item(ItemKind::TypeAlias(alias), start_span)))
            }
            TokenKind::Enum => {
                let decl = self.parse_enum(is_exported)?;
                Ok(Some(self.make_item(ItemKind::Enum(decl), start_span)))
            }
            _ if is_exported => {
                self.diagnostics.error(
                    DiagnosticCode::ExportRequiresDeclaration,
                    "'export' must be followed by a function, variable, type or enum declaration",
                    self.current_span(),
                );
                Err(CompileError::parse("export without declaration"))
            }
            _ => {
                self.diagnostics.error(
                    DiagnosticCode::InvalidModuleScope,
                    format!("'{}' is not valid at module scope", self.current_kind()),
                    self.current_span(),
                );
                Err(CompileError::parse("invalid module-scope token"))
            }
        }
    }

    /// `import NAME (, NAME)* from PATH ;`
    fn parse_import(&mut self) -> CompileResult<Import> {
        self.advance(); // import
        let mut names = vec![self.expect_identifier()?];
        while self.match_token(&TokenKind::Comma) {
            names.push(self.expect_identifier()?);
        }
        self.expect(&TokenKind::From)?;
        let mut path = vec![self.expect_identifier()?.value];
        while self.match_token(&TokenKind::Dot) {
            path.push(self.expect_identifier()?.value);
        }
        self.expect_semicolon();
        Ok(Import { names, path })
    }

    fn parse_storage_spec(&mut self) -> CompileResult<StorageSpec> {
        let span = self.current_span();
        let class = match self.current_kind() {
            TokenKind::Zp => StorageClassKind::ZeroPage,
            TokenKind::Ram => StorageClassKind::Ram,
            TokenKind::Data => StorageClassKind::Data,
            TokenKind::Address => StorageClassKind::Address,
            _ => unreachable!("caller checked for a storage-class token"),
        };
        self.advance();

        let address = if class == StorageClassKind::Address {
            self.expect(&TokenKind::LParen)?;
            let expr = self.parse_expression()?;
            self.expect(&TokenKind::RParen)?;
            Some(expr)
        } else {
            None
        };

        Ok(StorageSpec {
            class,
            address,
            span: span.merge(self.previous_span()),
        })
    }

    /// `[export] [callback] function NAME ( PARAMS ) [: TYPE] { BODY } | ;`
    fn parse_function(&mut self, is_exported: bool) -> CompileResult<Function> {
        let is_callback = self.match_token(&TokenKind::Callback);
        self.expect(&TokenKind::Function)?;
        let name = self.expect_identifier()?;

        self.expect(&TokenKind::LParen)?;
        let params = self.parse_parameter_list()?;
        self.expect(&TokenKind::RParen)?;

        let return_type = if self.match_token(&TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };

        // A trailing semicolon instead of a body marks a stub resolved at
        // link time.
        let body = if self.match_token(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_block()?)
        };

        // `main` is always exported; inserting the export implicitly is
        // worth telling the user about.
        let mut is_exported = is_exported;
        if name.value == "main" && !is_exported {
            self.diagnostics.warning(
                DiagnosticCode::ImplicitMainExport,
                "'main' is exported automatically",
                name.span,
            );
            is_exported = true;
        }

        Ok(Function {
            name,
            params,
            return_type,
            body,
            is_callback,
            is_exported,
        })
    }

    fn parse_parameter_list(&mut self) -> CompileResult<Vec<Parameter>> {
        let mut params = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let name = self.expect_identifier()?;
            self.expect(&TokenKind::Colon)?;
            let ty = self.parse_type_expr()?;
            let span = name.span.merge(ty.span);
            params.push(Parameter { name, ty, span });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    /// `[export] [@storage] (let|const) NAME [: TYPE] [= EXPR] ;`
    fn parse_variable(
        &mut self,
        is_exported: bool,
        storage: Option<StorageSpec>,
    ) -> CompileResult<VariableDecl> {
        let is_const = matches!(self.current_kind(), TokenKind::Const);
        self.advance(); // let | const
        let name = self.expect_identifier()?;

        let ty = if self.match_token(&TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };

        let initializer = if self.match_token(&TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.expect_semicolon();

        Ok(VariableDecl {
            name,
            is_const,
            is_exported,
            storage,
            ty,
            initializer,
        })
    }

    /// `type NAME = TYPE ;`
    fn parse_type_alias(&mut self, is_exported: bool) -> CompileResult<TypeAlias> {
        self.advance(); // type
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::Assign)?;
        let ty = self.parse_type_expr()?;
        self.expect_semicolon();
        Ok(TypeAlias { name, ty, is_exported })
    }

    /// `enum NAME { MEMBER [= EXPR] (, MEMBER [= EXPR])* [,] }`
    fn parse_enum(&mut self, is_exported: bool) -> CompileResult<EnumDecl> {
        self.advance(); // enum
        let name = self.expect_identifier()?;
        self.expect(&TokenKind::LBrace)?;

        let mut members = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let member_name = self.expect_identifier()?;
            let value = if self.match_token(&TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            let span = member_name.span.merge(self.previous_span());
            members.push(EnumMember { name: member_name, value, span });
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(&TokenKind::RBrace)?;
        Ok(EnumDecl { name, members, is_exported })
    }

    /// A named type followed by any number of `[size?]` suffixes. The
    /// first suffix is the outermost dimension: `byte[2][3]` is two rows
    /// of `byte[3]`.
    fn parse_type_expr(&mut self) -> CompileResult<TypeExpr> {
        let start = self.current_span();
        let name = self.expect_identifier()?;
        let mut ty = TypeExpr {
            kind: TypeExprKind::Named(name.value),
            span: name.span,
        };

        let mut sizes = Vec::new();
        while self.match_token(&TokenKind::LBracket) {
            let size = if self.check(&TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expression()?))
            };
            self.expect(&TokenKind::RBracket)?;
            sizes.push(size);
        }
        for size in sizes.into_iter().rev() {
            ty = TypeExpr {
                span: start.merge(self.previous_span()),
                kind: TypeExprKind::Array { element: Box::new(ty), size },
            };
        }
        Ok(ty)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_block(&mut self) -> CompileResult<Block> {
        let start = self.current_span();
        self.expect(&TokenKind::LBrace)?;

        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(_) => self.synchronize(),
            }
        }

        self.expect(&TokenKind::RBrace)?;
        Ok(Block {
            statements,
            span: start.merge(self.previous_span()),
        })
    }

    fn parse_statement(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        match self.current_kind() {
            TokenKind::LBrace => {
                let block = self.parse_block()?;
                Ok(self.make_stmt(StmtKind::Block(block), start))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Break => {
                self.advance();
                self.expect_semicolon();
                Ok(self.make_stmt(StmtKind::Break, start))
            }
            TokenKind::Continue => {
                self.advance();
                self.expect_semicolon();
                Ok(self.make_stmt(StmtKind::Continue, start))
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect_semicolon();
                Ok(self.make_stmt(StmtKind::Return(value), start))
            }
            TokenKind::Let | TokenKind::Const => {
                let local = self.parse_local_variable()?;
                Ok(self.make_stmt(StmtKind::Local(local), start))
            }
            _ => {
                let expr = self.parse_expression()?;
                self.expect_semicolon();
                Ok(self.make_stmt(StmtKind::Expr(expr), start))
            }
        }
    }

    fn parse_if(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance(); // if
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let then_block = self.parse_block()?;

        let else_block = if self.match_token(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                // `else if` nests the if inside a synthetic block.
                let nested_span = self.current_span();
                let nested = self.parse_if()?;
                let span = nested.span;
                Some(Block {
                    statements: vec![nested],
                    span: nested_span.merge(span),
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Ok(self.make_stmt(StmtKind::If { condition, then_block, else_block }, start))
    }

    fn parse_while(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance(); // while
        self.expect(&TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(self.make_stmt(StmtKind::While { condition, body }, start))
    }

    /// `for IDENT = EXPR (to|downto) EXPR [step EXPR] { BODY }`
    fn parse_for(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance(); // for
        let var = self.expect_identifier()?;
        self.expect(&TokenKind::Assign)?;
        let start_expr = self.parse_expression()?;

        let direction = match self.current_kind() {
            TokenKind::To => ForDirection::To,
            TokenKind::Downto => ForDirection::Downto,
            _ => {
                self.diagnostics.error(
                    DiagnosticCode::ExpectedToken,
                    format!("expected 'to' or 'downto', found '{}'", self.current_kind()),
                    self.current_span(),
                );
                return Err(CompileError::parse("malformed for loop"));
            }
        };
        self.advance();

        let end_expr = self.parse_expression()?;
        let step = if self.match_token(&TokenKind::Step) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let body = self.parse_block()?;

        Ok(self.make_stmt(
            StmtKind::For {
                var,
                start: start_expr,
                end: end_expr,
                direction,
                step,
                body,
            },
            start,
        ))
    }

    /// `switch ( EXPR ) { (case EXPR : STMT*)* [default : STMT*] }`
    fn parse_switch(&mut self) -> CompileResult<Stmt> {
        let start = self.current_span();
        self.advance(); // switch
        self.expect(&TokenKind::LParen)?;
        let scrutinee = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::LBrace)?;

        let mut cases = Vec::new();
        let mut default = None;
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.match_token(&TokenKind::Case) {
                let case_span = self.previous_span();
                let value = self.parse_expression()?;
                self.expect(&TokenKind::Colon)?;
                let body = self.parse_case_body();
                cases.push(SwitchCase {
                    value,
                    body,
                    span: case_span.merge(self.previous_span()),
                });
            } else if self.match_token(&TokenKind::Default) {
                self.expect(&TokenKind::Colon)?;
                let body = self.parse_case_body();
                if default.replace(body).is_some() {
                    self.diagnostics.error(
                        DiagnosticCode::UnexpectedToken,
                        "switch already has a default arm",
                        self.previous_span(),
                    );
                }
            } else {
                self.diagnostics.error(
                    DiagnosticCode::ExpectedToken,
                    format!("expected 'case' or 'default', found '{}'", self.current_kind()),
                    self.current_span(),
                );
                return Err(CompileError::parse("malformed switch"));
            }
        }

        self.expect(&TokenKind::RBrace)?;
        Ok(self.make_stmt(StmtKind::Switch { scrutinee, cases, default }, start))
    }

    /// Statements up to the next `case`/`default`/`}`.
    fn parse_case_body(&mut self) -> Vec<Stmt> {
        let mut body = Vec::new();
        while !matches!(
            self.current_kind(),
            TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
        ) {
            match self.parse_statement() {
                Ok(stmt) => body.push(stmt),
                Err(_) => self.synchronize(),
            }
        }
        body
    }

    fn parse_local_variable(&mut self) -> CompileResult<LocalVariable> {
        let is_const = matches!(self.current_kind(), TokenKind::Const);
        self.advance(); // let | const
        let name = self.expect_identifier()?;

        let ty = if self.match_token(&TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let initializer = if self.match_token(&TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect_semicolon();

        Ok(LocalVariable { name, is_const, ty, initializer })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expression(&mut self) -> CompileResult<Expr> {
        self.parse_precedence(Precedence::Assignment as u8)
    }

    fn parse_precedence(&mut self, min: u8) -> CompileResult<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let Some((prec, assoc)) = infix_precedence(self.current_kind()) else {
                break;
            };
            if (prec as u8) < min {
                break;
            }

            if prec == Precedence::Ternary {
                self.advance(); // ?
                let then_expr = self.parse_expression()?;
                self.expect(&TokenKind::Colon)?;
                // Right-associative: the else branch re-enters at the same
                // level so `a?b:c?d:e` groups as `a?b:(c?d:e)`.
                let else_expr = self.parse_precedence(Precedence::Ternary as u8)?;
                let span = left.span.merge(else_expr.span);
                left = self.make_expr(
                    ExprKind::Ternary { condition: left, then_expr, else_expr },
                    span,
                );
                continue;
            }

            if prec == Precedence::Assignment {
                let op = Self::compound_assign_op(self.current_kind());
                self.advance();
                let value = self.parse_precedence(Precedence::Assignment as u8)?;
                let span = left.span.merge(value.span);
                left = self.make_expr(ExprKind::Assign { target: left, op, value }, span);
                continue;
            }

            let Some(op) = Self::binary_op(self.current_kind()) else {
                break;
            };
            self.advance();
            let next_min = match assoc {
                Assoc::Left => prec as u8 + 1,
                Assoc::Right => prec as u8,
            };
            let right = self.parse_precedence(next_min)?;
            let span = left.span.merge(right.span);
            left = self.make_expr(ExprKind::Binary { op, left, right }, span);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> CompileResult<Expr> {
        let start = self.current_span();
        let op = match self.current_kind() {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::At => Some(UnaryOp::AddressOf),
            _ => None,
        };

        match op {
            Some(UnaryOp::AddressOf) => {
                self.advance();
                // Address-of binds to a bare identifier only.
                if !matches!(self.current_kind(), TokenKind::Identifier(_)) {
                    self.diagnostics.error(
                        DiagnosticCode::UnexpectedToken,
                        format!("'@' must be followed by an identifier, found '{}'", self.current_kind()),
                        self.current_span(),
                    );
                    return Err(CompileError::parse("bad address-of operand"));
                }
                let name = self.expect_identifier()?;
                let operand_span = name.span;
                let operand = self.make_expr(ExprKind::Identifier(name.value), operand_span);
                let span = start.merge(operand_span);
                Ok(self.make_expr(ExprKind::Unary { op: UnaryOp::AddressOf, operand }, span))
            }
            Some(op) => {
                self.advance();
                let operand = self.parse_unary()?;
                let span = start.merge(operand.span);
                Ok(self.make_expr(ExprKind::Unary { op, operand }, span))
            }
            None => self.parse_postfix(),
        }
    }

    /// Postfix forms are deliberately restricted: calls and member access
    /// only on a bare identifier, no chaining after `.`; indexing chains
    /// over arrays and call results.
    fn parse_postfix(&mut self) -> CompileResult<Expr> {
        let mut expr = self.parse_primary()?;

        if let Some(name) = expr.as_identifier().map(str::to_string) {
            if self.check(&TokenKind::LParen) {
                let callee = Spanned::new(name, expr.span);
                expr = self.parse_call(callee)?;
            } else if self.check(&TokenKind::Dot) {
                self.advance();
                let member = self.expect_identifier()?;
                let span = expr.span.merge(member.span);
                let base = Spanned::new(name, expr.span);
                // Nothing may chain after a member access.
                return Ok(self.make_expr(ExprKind::Member { base, member }, span));
            }
        }

        while self.match_token(&TokenKind::LBracket) {
            let index = self.parse_expression()?;
            self.expect(&TokenKind::RBracket)?;
            let span = expr.span.merge(self.previous_span());
            expr = self.make_expr(ExprKind::Index { base: expr, index }, span);
        }

        Ok(expr)
    }

    fn parse_call(&mut self, callee: Spanned<String>) -> CompileResult<Expr> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        let span = callee.span.merge(self.previous_span());
        Ok(self.make_expr(ExprKind::Call { callee, args }, span))
    }

    fn parse_primary(&mut self) -> CompileResult<Expr> {
        let span = self.current_span();
        let kind = self.current_kind().clone();
        match kind {
            TokenKind::Number(raw) => {
                self.advance();
                let value = number_value(&raw).unwrap_or_else(|| {
                    self.diagnostics.error(
                        DiagnosticCode::InvalidNumber,
                        format!("invalid number literal '{}'", raw),
                        span,
                    );
                    0
                });
                Ok(self.make_expr(ExprKind::Literal(Literal::Number { value, raw }), span))
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(self.make_expr(ExprKind::Literal(Literal::Str(value)), span))
            }
            TokenKind::True => {
                self.advance();
                Ok(self.make_expr(ExprKind::Literal(Literal::Bool(true)), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(self.make_expr(ExprKind::Literal(Literal::Bool(false)), span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(self.make_expr(ExprKind::Identifier(name), span))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            other => {
                self.diagnostics.error(
                    DiagnosticCode::UnexpectedToken,
                    format!("unexpected token '{}'", other),
                    span,
                );
                Err(CompileError::parse("unexpected token in expression"))
            }
        }
    }

    /// `[ expr (, expr)* [,] ]` including the empty `[]`; nesting gives
    /// multi-dimensional initializers.
    fn parse_array_literal(&mut self) -> CompileResult<Expr> {
        let start = self.current_span();
        self.advance(); // [
        let mut elements = Vec::new();
        while !self.check(&TokenKind::RBracket) && !self.is_at_end() {
            elements.push(self.parse_expression()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket)?;
        let span = start.merge(self.previous_span());
        Ok(self.make_expr(ExprKind::ArrayLiteral(elements), span))
    }

    fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
        let op = match kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::Ne,
            TokenKind::Less => BinaryOp::Lt,
            TokenKind::LessEq => BinaryOp::Le,
            TokenKind::Greater => BinaryOp::Gt,
            TokenKind::GreaterEq => BinaryOp::Ge,
            TokenKind::AndAnd => BinaryOp::And,
            TokenKind::OrOr => BinaryOp::Or,
            TokenKind::Amp => BinaryOp::BitAnd,
            TokenKind::Pipe => BinaryOp::BitOr,
            TokenKind::Caret => BinaryOp::BitXor,
            TokenKind::Shl => BinaryOp::Shl,
            TokenKind::Shr => BinaryOp::Shr,
            _ => return None,
        };
        Some(op)
    }

    fn compound_assign_op(kind: &TokenKind) -> Option<BinaryOp> {
        let op = match kind {
            TokenKind::PlusAssign => BinaryOp::Add,
            TokenKind::MinusAssign => BinaryOp::Sub,
            TokenKind::StarAssign => BinaryOp::Mul,
            TokenKind::SlashAssign => BinaryOp::Div,
            TokenKind::PercentAssign => BinaryOp::Mod,
            TokenKind::AmpAssign => BinaryOp::BitAnd,
            TokenKind::PipeAssign => BinaryOp::BitOr,
            TokenKind::CaretAssign => BinaryOp::BitXor,
            TokenKind::ShlAssign => BinaryOp::Shl,
            TokenKind::ShrAssign => BinaryOp::Shr,
            _ => return None,
        };
        Some(op)
    }

    // ------------------------------------------------------------------
    // Node construction
    // ------------------------------------------------------------------

    fn next_node_id(&mut self) -> NodeId {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    fn make_item(&mut self, kind: ItemKind, start: Span) -> Item {
        Item {
            kind,
            span: start.merge(self.previous_span()),
            id: self.next_node_id(),
            metadata: Metadata::new(),
        }
    }

    fn make_stmt(&mut self, kind: StmtKind, start: Span) -> Stmt {
        Stmt {
            kind,
            span: start.merge(self.previous_span()),
            id: self.next_node_id(),
            metadata: Metadata::new(),
        }
    }

    fn make_expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        Expr {
            kind: Box::new(kind),
            span,
            id: self.next_node_id(),
            metadata: Metadata::new(),
        }
    }

    // ------------------------------------------------------------------
    // Token stream helpers
    // ------------------------------------------------------------------

    fn current_token(&self) -> &Token {
        // The stream always ends with Eof, so the index is in range.
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current_token().kind
    }

    fn current_span(&self) -> Span {
        self.current_token().span
    }

    fn previous_span(&self) -> Span {
        if self.current > 0 {
            self.tokens[self.current - 1].span
        } else {
            self.current_span()
        }
    }

    fn file_id(&self) -> u32 {
        self.current_token().span.file
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.current += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current_kind()) == std::mem::discriminant(kind)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> CompileResult<()> {
        if self.match_token(kind) {
            return Ok(());
        }
        self.diagnostics.error(
            DiagnosticCode::ExpectedToken,
            format!("expected '{}', found '{}'", kind, self.current_kind()),
            self.current_span(),
        );
        Err(CompileError::parse("unexpected token"))
    }

    /// Missing semicolons are reported, then treated as inserted.
    fn expect_semicolon(&mut self) {
        if !self.match_token(&TokenKind::Semicolon) {
            self.diagnostics.error(
                DiagnosticCode::MissingSemicolon,
                format!("expected ';', found '{}'", self.current_kind()),
                self.current_span(),
            );
        }
    }

    fn expect_identifier(&mut self) -> CompileResult<Spanned<String>> {
        if let TokenKind::Identifier(name) = self.current_kind() {
            let spanned = Spanned::new(name.clone(), self.current_span());
            self.advance();
            return Ok(spanned);
        }
        self.diagnostics.error(
            DiagnosticCode::ExpectedToken,
            format!("expected identifier, found '{}'", self.current_kind()),
            self.current_span(),
        );
        Err(CompileError::parse("expected identifier"))
    }

    // ------------------------------------------------------------------
    // Error recovery
    // ------------------------------------------------------------------

    /// Skip to the next statement starter or closing brace.
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.match_token(&TokenKind::Semicolon) {
                return;
            }
            match self.current_kind() {
                TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Do
                | TokenKind::Switch
                | TokenKind::Return
                | TokenKind::Let
                | TokenKind::Const
                | TokenKind::RBrace => return,
                _ => self.advance(),
            }
        }
    }

    /// Skip to the next declaration introducer at module scope.
    fn recover_to_item_boundary(&mut self) {
        while !self.is_at_end() {
            match self.current_kind() {
                TokenKind::Function
                | TokenKind::Callback
                | TokenKind::Let
                | TokenKind::Const
                | TokenKind::Import
                | TokenKind::Export
                | TokenKind::Type
                | TokenKind::Enum
                | TokenKind::Zp
                | TokenKind::Ram
                | TokenKind::Data
                | TokenKind::Address => return,
                _ => self.advance(),
            }
        }
    }
}
