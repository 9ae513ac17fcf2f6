//! Single-pass lexer for the Sable language

use crate::{Token, TokenKind};
use sable_common::{DiagnosticCode, Diagnostics, FileId, Position, Span};

/// Parse the numeric value out of a raw number lexeme, honoring its radix
/// prefix (`$`, `0x`, `0b`, `%`, or plain decimal). Values wrap into the
/// 16-bit range only at the semantic layer; here the full u32 is kept so
/// out-of-range literals stay detectable.
pub fn number_value(raw: &str) -> Option<u32> {
    if let Some(hex) = raw.strip_prefix('$') {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = raw.strip_prefix("0b").or_else(|| raw.strip_prefix("0B")) {
        u32::from_str_radix(bin, 2).ok()
    } else if let Some(bin) = raw.strip_prefix('%') {
        u32::from_str_radix(bin, 2).ok()
    } else {
        raw.parse::<u32>().ok()
    }
}

/// Lexer options.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexerOptions {
    /// Emit `LineComment`/`BlockComment` tokens instead of skipping them.
    pub keep_comments: bool,
}

/// Single-pass lexer producing a finite token vector terminated by `Eof`.
///
/// Errors in the input never abort the scan: the lexer reports a
/// diagnostic, skips one unit and continues.
pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    position: usize,
    current_pos: Position,
    file: FileId,
    options: LexerOptions,
    /// Whether the next token sits in operand position. Disambiguates a
    /// `%`-prefixed binary literal from the modulo operator.
    expect_operand: bool,
    diagnostics: Diagnostics,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str, file: FileId) -> Self {
        Self::with_options(input, file, LexerOptions::default())
    }

    pub fn with_options(input: &'a str, file: FileId, options: LexerOptions) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            position: 0,
            current_pos: Position::origin(),
            file,
            options,
            expect_operand: true,
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    /// Tokenize the entire input. The result is never empty and always ends
    /// with exactly one `Eof` token.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        while let Some(token) = self.next_token() {
            self.expect_operand = !matches!(
                token.kind,
                TokenKind::Number(_)
                    | TokenKind::Str(_)
                    | TokenKind::True
                    | TokenKind::False
                    | TokenKind::Identifier(_)
                    | TokenKind::RParen
                    | TokenKind::RBracket
            );
            tokens.push(token);
        }

        let eof_span = Span::point(self.current_pos, self.file);
        tokens.push(Token::new(TokenKind::Eof, eof_span));
        tokens
    }

    fn next_token(&mut self) -> Option<Token> {
        loop {
            if let Some(comment) = self.skip_trivia() {
                return Some(comment);
            }
            if self.is_at_end() {
                return None;
            }

            let start_pos = self.current_pos;
            let kind = match self.current_char() {
                '(' => { self.advance(); Some(TokenKind::LParen) }
                ')' => { self.advance(); Some(TokenKind::RParen) }
                '{' => { self.advance(); Some(TokenKind::LBrace) }
                '}' => { self.advance(); Some(TokenKind::RBrace) }
                '[' => { self.advance(); Some(TokenKind::LBracket) }
                ']' => { self.advance(); Some(TokenKind::RBracket) }
                ';' => { self.advance(); Some(TokenKind::Semicolon) }
                ',' => { self.advance(); Some(TokenKind::Comma) }
                '.' => { self.advance(); Some(TokenKind::Dot) }
                '?' => { self.advance(); Some(TokenKind::Question) }
                ':' => { self.advance(); Some(TokenKind::Colon) }
                '~' => { self.advance(); Some(TokenKind::Tilde) }

                '+' => Some(self.scan_with_assign(TokenKind::Plus, TokenKind::PlusAssign)),
                '-' => Some(self.scan_with_assign(TokenKind::Minus, TokenKind::MinusAssign)),
                '*' => Some(self.scan_with_assign(TokenKind::Star, TokenKind::StarAssign)),
                '/' => Some(self.scan_with_assign(TokenKind::Slash, TokenKind::SlashAssign)),
                '^' => Some(self.scan_with_assign(TokenKind::Caret, TokenKind::CaretAssign)),
                '%' => Some(self.scan_percent()),
                '=' => Some(self.scan_equal()),
                '!' => Some(self.scan_bang()),
                '<' => Some(self.scan_less()),
                '>' => Some(self.scan_greater()),
                '&' => Some(self.scan_amp()),
                '|' => Some(self.scan_pipe()),
                '@' => Some(self.scan_at()),
                '$' => self.scan_dollar_hex(start_pos),

                '"' | '\'' => Some(self.scan_string()),

                c if c.is_ascii_digit() => Some(self.scan_number()),
                c if c.is_ascii_alphabetic() || c == '_' => Some(self.scan_identifier_or_keyword()),

                c => {
                    // Unknown character: report, skip one unit, keep going.
                    self.advance();
                    self.diagnostics.error(
                        DiagnosticCode::UnknownCharacter,
                        format!("unexpected character '{}'", c),
                        Span::new(start_pos, self.current_pos, self.file),
                    );
                    None
                }
            };

            match kind {
                Some(kind) => {
                    let span = Span::new(start_pos, self.current_pos, self.file);
                    return Some(Token::new(kind, span));
                }
                None if self.is_at_end() => return None,
                None => continue,
            }
        }
    }

    /// Skip whitespace and (unless kept) comments. Returns a comment token
    /// when `keep_comments` is set and one was found.
    fn skip_trivia(&mut self) -> Option<Token> {
        while !self.is_at_end() {
            match self.current_char() {
                ' ' | '\t' | '\r' => self.advance(),
                '\n' => self.advance_line(),
                '/' if self.peek_char() == Some('/') => {
                    let start = self.current_pos;
                    let text = self.consume_line_comment();
                    if self.options.keep_comments {
                        let span = Span::new(start, self.current_pos, self.file);
                        return Some(Token::new(TokenKind::LineComment(text), span));
                    }
                }
                '/' if self.peek_char() == Some('*') => {
                    let start = self.current_pos;
                    let text = self.consume_block_comment();
                    if self.options.keep_comments {
                        let span = Span::new(start, self.current_pos, self.file);
                        return Some(Token::new(TokenKind::BlockComment(text), span));
                    }
                }
                _ => break,
            }
        }
        None
    }

    fn consume_line_comment(&mut self) -> String {
        self.advance(); // '/'
        self.advance(); // '/'
        let start = self.position;
        while !self.is_at_end() && self.current_char() != '\n' {
            self.advance();
        }
        self.input[start..self.position].to_string()
    }

    /// Block comments do not nest.
    fn consume_block_comment(&mut self) -> String {
        self.advance(); // '/'
        self.advance(); // '*'
        let start = self.position;
        let mut end = self.position;
        loop {
            if self.is_at_end() {
                self.diagnostics.error(
                    DiagnosticCode::UnterminatedComment,
                    "unterminated block comment",
                    Span::point(self.current_pos, self.file),
                );
                end = self.position;
                break;
            }
            if self.current_char() == '*' && self.peek_char() == Some('/') {
                end = self.position;
                self.advance();
                self.advance();
                break;
            }
            if self.current_char() == '\n' {
                self.advance_line();
            } else {
                self.advance();
            }
        }
        self.input[start..end].to_string()
    }

    fn scan_with_assign(&mut self, plain: TokenKind, assign: TokenKind) -> TokenKind {
        self.advance();
        if self.current_char_is('=') {
            self.advance();
            assign
        } else {
            plain
        }
    }

    /// `%` is a binary-literal prefix only in operand position and only when
    /// a binary digit follows with no intervening space; otherwise modulo.
    fn scan_percent(&mut self) -> TokenKind {
        if self.expect_operand && matches!(self.peek_char(), Some('0') | Some('1')) {
            let start = self.position;
            self.advance(); // '%'
            while matches!(self.current_char(), '0' | '1') && !self.is_at_end() {
                self.advance();
            }
            return TokenKind::Number(self.input[start..self.position].to_string());
        }
        self.scan_with_assign(TokenKind::Percent, TokenKind::PercentAssign)
    }

    fn scan_equal(&mut self) -> TokenKind {
        self.advance();
        if self.current_char_is('=') {
            self.advance();
            TokenKind::Eq
        } else {
            TokenKind::Assign
        }
    }

    fn scan_bang(&mut self) -> TokenKind {
        self.advance();
        if self.current_char_is('=') {
            self.advance();
            TokenKind::NotEq
        } else {
            TokenKind::Bang
        }
    }

    fn scan_less(&mut self) -> TokenKind {
        self.advance();
        match self.current_char() {
            '=' => { self.advance(); TokenKind::LessEq }
            '<' => {
                self.advance();
                if self.current_char_is('=') {
                    self.advance();
                    TokenKind::ShlAssign
                } else {
                    TokenKind::Shl
                }
            }
            _ => TokenKind::Less,
        }
    }

    fn scan_greater(&mut self) -> TokenKind {
        self.advance();
        match self.current_char() {
            '=' => { self.advance(); TokenKind::GreaterEq }
            '>' => {
                self.advance();
                if self.current_char_is('=') {
                    self.advance();
                    TokenKind::ShrAssign
                } else {
                    TokenKind::Shr
                }
            }
            _ => TokenKind::Greater,
        }
    }

    fn scan_amp(&mut self) -> TokenKind {
        self.advance();
        match self.current_char() {
            '&' => { self.advance(); TokenKind::AndAnd }
            '=' => { self.advance(); TokenKind::AmpAssign }
            _ => TokenKind::Amp,
        }
    }

    fn scan_pipe(&mut self) -> TokenKind {
        self.advance();
        match self.current_char() {
            '|' => { self.advance(); TokenKind::OrOr }
            '=' => { self.advance(); TokenKind::PipeAssign }
            _ => TokenKind::Pipe,
        }
    }

    /// `@zp`/`@ram`/`@data`/`@address` are storage-class tokens. Any other
    /// `@word` lexes as `@` followed by a separate identifier token, which
    /// is how `@` doubles as the address-of prefix operator.
    fn scan_at(&mut self) -> TokenKind {
        let rest = &self.input[self.position + 1..];
        let word_len = rest
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
            .count();
        let word = &rest[..word_len];

        if let Some(kind) = TokenKind::storage_class(word) {
            for _ in 0..=word_len {
                self.advance();
            }
            kind
        } else {
            self.advance(); // just the '@'
            TokenKind::At
        }
    }

    /// 6502-style hex literal: `$D020`.
    fn scan_dollar_hex(&mut self, start_pos: Position) -> Option<TokenKind> {
        let start = self.position;
        self.advance(); // '$'
        let digits_start = self.position;
        while !self.is_at_end() && self.current_char().is_ascii_hexdigit() {
            self.advance();
        }
        if self.position == digits_start {
            self.diagnostics.error(
                DiagnosticCode::InvalidNumber,
                "'$' must be followed by hexadecimal digits",
                Span::new(start_pos, self.current_pos, self.file),
            );
            return None;
        }
        Some(TokenKind::Number(self.input[start..self.position].to_string()))
    }

    /// Decimal, `0x` hex or `0b` binary literal. The raw prefix is kept.
    fn scan_number(&mut self) -> TokenKind {
        let start = self.position;

        if self.current_char() == '0' {
            match self.peek_char() {
                Some('x') | Some('X') => {
                    self.advance();
                    self.advance();
                    while !self.is_at_end() && self.current_char().is_ascii_hexdigit() {
                        self.advance();
                    }
                    if self.position == start + 2 {
                        self.diagnostics.error(
                            DiagnosticCode::InvalidNumber,
                            "'0x' must be followed by hexadecimal digits",
                            Span::point(self.current_pos, self.file),
                        );
                    }
                    return TokenKind::Number(self.input[start..self.position].to_string());
                }
                Some('b') | Some('B') => {
                    self.advance();
                    self.advance();
                    while matches!(self.current_char(), '0' | '1') && !self.is_at_end() {
                        self.advance();
                    }
                    if self.position == start + 2 {
                        self.diagnostics.error(
                            DiagnosticCode::InvalidNumber,
                            "'0b' must be followed by binary digits",
                            Span::point(self.current_pos, self.file),
                        );
                    }
                    return TokenKind::Number(self.input[start..self.position].to_string());
                }
                _ => {}
            }
        }

        while !self.is_at_end() && self.current_char().is_ascii_digit() {
            self.advance();
        }
        TokenKind::Number(self.input[start..self.position].to_string())
    }

    /// String literal delimited by `"` or `'`. Newlines are permitted inside
    /// and advance the line counter; an unterminated literal is an error.
    fn scan_string(&mut self) -> TokenKind {
        let quote = self.current_char();
        self.advance();

        let mut value = String::new();
        loop {
            if self.is_at_end() {
                self.diagnostics.error(
                    DiagnosticCode::UnterminatedString,
                    "unterminated string literal",
                    Span::point(self.current_pos, self.file),
                );
                return TokenKind::Str(value);
            }
            let c = self.current_char();
            if c == quote {
                self.advance();
                return TokenKind::Str(value);
            }
            if c == '\\' {
                self.advance();
                if self.is_at_end() {
                    self.diagnostics.error(
                        DiagnosticCode::UnterminatedString,
                        "unterminated string literal",
                        Span::point(self.current_pos, self.file),
                    );
                    return TokenKind::Str(value);
                }
                let escaped = self.current_char();
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '\\' => value.push('\\'),
                    '"' => value.push('"'),
                    '\'' => value.push('\''),
                    other => {
                        // Unknown escape: the following character carries
                        // through literally.
                        self.diagnostics.warning(
                            DiagnosticCode::UnknownEscape,
                            format!("unknown escape sequence '\\{}'", other),
                            Span::point(self.current_pos, self.file),
                        );
                        value.push(other);
                    }
                }
                if escaped == '\n' {
                    self.advance_line();
                } else {
                    self.advance();
                }
            } else if c == '\n' {
                value.push('\n');
                self.advance_line();
            } else {
                value.push(c);
                self.advance();
            }
        }
    }

    fn scan_identifier_or_keyword(&mut self) -> TokenKind {
        let start = self.position;
        while !self.is_at_end()
            && (self.current_char().is_ascii_alphanumeric() || self.current_char() == '_')
        {
            self.advance();
        }
        let ident = &self.input[start..self.position];
        TokenKind::keyword(ident).unwrap_or_else(|| TokenKind::Identifier(ident.to_string()))
    }

    fn current_char(&self) -> char {
        if self.position >= self.bytes.len() {
            return '\0';
        }
        let byte = self.bytes[self.position];
        if byte < 128 {
            byte as char
        } else {
            self.input[self.position..].chars().next().unwrap_or('\0')
        }
    }

    fn current_char_is(&self, expected: char) -> bool {
        !self.is_at_end() && self.current_char() == expected
    }

    fn peek_char(&self) -> Option<char> {
        let next = self.position + self.current_char().len_utf8();
        if next >= self.bytes.len() {
            return None;
        }
        let byte = self.bytes[next];
        if byte < 128 {
            Some(byte as char)
        } else {
            self.input[next..].chars().next()
        }
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.position += self.current_char().len_utf8();
            self.current_pos.column += 1;
            self.current_pos.offset = self.position as u32;
        }
    }

    fn advance_line(&mut self) {
        if !self.is_at_end() {
            self.position += 1;
            self.current_pos.line += 1;
            self.current_pos.column = 1;
            self.current_pos.offset = self.position as u32;
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source, 0).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn maximal_munch_prefers_longest_operator() {
        assert_eq!(
            kinds("a <<= 1"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::ShlAssign,
                TokenKind::Number("1".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("a << 1"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Shl,
                TokenKind::Number("1".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn percent_is_modulo_after_operand() {
        assert_eq!(
            kinds("a % 10"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Percent,
                TokenKind::Number("10".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn percent_is_binary_literal_in_operand_position() {
        assert_eq!(
            kinds("x = %1010"),
            vec![
                TokenKind::Identifier("x".into()),
                TokenKind::Assign,
                TokenKind::Number("%1010".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unknown_character_is_skipped_with_diagnostic() {
        let mut lexer = Lexer::new("a ` b", 0);
        let tokens = lexer.tokenize();
        assert_eq!(tokens.len(), 3); // a, b, eof
        assert!(lexer.diagnostics().has_errors());
    }

    #[test]
    fn number_value_handles_all_radices() {
        assert_eq!(number_value("$D020"), Some(0xD020));
        assert_eq!(number_value("0xD020"), Some(0xD020));
        assert_eq!(number_value("0b1010"), Some(10));
        assert_eq!(number_value("%1010"), Some(10));
        assert_eq!(number_value("65535"), Some(65535));
    }

    #[test]
    fn keep_comments_emits_comment_tokens() {
        let options = LexerOptions { keep_comments: true };
        let mut lexer = Lexer::with_options("1 // note\n2", 0, options);
        let tokens = lexer.tokenize();
        assert!(tokens.iter().any(|t| matches!(t.kind, TokenKind::LineComment(_))));
    }
}
