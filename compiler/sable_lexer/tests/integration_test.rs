//! Integration tests for the Sable lexer

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sable_lexer::{number_value, Lexer, TokenKind};
use test_case::test_case;

fn kinds(source: &str) -> Vec<TokenKind> {
    Lexer::new(source, 0).tokenize().into_iter().map(|t| t.kind).collect()
}

#[test_case("$D020", 0xD020; "dollar hex")]
#[test_case("0xD020", 0xD020; "c hex")]
#[test_case("0b1010", 10; "binary")]
#[test_case("65535", 65535; "decimal")]
fn single_number_token(source: &str, value: u32) {
    let tokens = kinds(source);
    assert_eq!(tokens.len(), 2, "one number plus eof for {:?}", source);
    match &tokens[0] {
        TokenKind::Number(raw) => {
            assert_eq!(raw, source, "raw lexeme must be preserved");
            assert_eq!(number_value(raw), Some(value));
        }
        other => panic!("expected number token, got {:?}", other),
    }
    assert_eq!(tokens[1], TokenKind::Eof);
}

#[test]
fn storage_class_keywords_lex_as_single_tokens() {
    assert_eq!(kinds("@zp"), vec![TokenKind::Zp, TokenKind::Eof]);
    assert_eq!(kinds("@ram"), vec![TokenKind::Ram, TokenKind::Eof]);
    assert_eq!(kinds("@data"), vec![TokenKind::Data, TokenKind::Eof]);
    assert_eq!(kinds("@address"), vec![TokenKind::Address, TokenKind::Eof]);
}

#[test]
fn at_map_is_demoted_to_address_of_plus_identifier() {
    assert_eq!(
        kinds("@map"),
        vec![TokenKind::At, TokenKind::Identifier("map".into()), TokenKind::Eof]
    );
}

#[test]
fn address_of_expression_token_sequence() {
    assert_eq!(
        kinds("@buffer + 1"),
        vec![
            TokenKind::At,
            TokenKind::Identifier("buffer".into()),
            TokenKind::Plus,
            TokenKind::Number("1".into()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn keywords_and_identifiers() {
    assert_eq!(
        kinds("function main frame_count"),
        vec![
            TokenKind::Function,
            TokenKind::Identifier("main".into()),
            TokenKind::Identifier("frame_count".into()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn boolean_literals_are_distinct_tokens() {
    assert_eq!(kinds("true false"), vec![TokenKind::True, TokenKind::False, TokenKind::Eof]);
}

#[test]
fn string_escapes_are_decoded() {
    let tokens = kinds(r#""a\tb\n" 'c\'d'"#);
    assert_eq!(
        tokens,
        vec![
            TokenKind::Str("a\tb\n".into()),
            TokenKind::Str("c'd".into()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn newline_inside_string_advances_line_counter() {
    let mut lexer = Lexer::new("\"a\nb\" x", 0);
    let tokens = lexer.tokenize();
    assert_eq!(tokens[0].kind, TokenKind::Str("a\nb".into()));
    assert_eq!(tokens[1].span.start.line, 2, "x sits on the second line");
}

#[test]
fn unterminated_string_reports_error_and_still_terminates() {
    let mut lexer = Lexer::new("\"abc", 0);
    let tokens = lexer.tokenize();
    assert!(lexer.diagnostics().has_errors());
    assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
}

#[test]
fn all_compound_assignment_operators() {
    assert_eq!(
        kinds("+= -= *= /= %= &= |= ^= <<= >>="),
        vec![
            TokenKind::PlusAssign,
            TokenKind::MinusAssign,
            TokenKind::StarAssign,
            TokenKind::SlashAssign,
            TokenKind::PercentAssign,
            TokenKind::AmpAssign,
            TokenKind::PipeAssign,
            TokenKind::CaretAssign,
            TokenKind::ShlAssign,
            TokenKind::ShrAssign,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn comparison_and_logical_operators() {
    assert_eq!(
        kinds("== != <= >= && || < >"),
        vec![
            TokenKind::Eq,
            TokenKind::NotEq,
            TokenKind::LessEq,
            TokenKind::GreaterEq,
            TokenKind::AndAnd,
            TokenKind::OrOr,
            TokenKind::Less,
            TokenKind::Greater,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn comments_are_skipped_by_default() {
    let tokens = kinds("1 // line\n/* block\nstill block */ 2");
    assert_eq!(
        tokens,
        vec![
            TokenKind::Number("1".into()),
            TokenKind::Number("2".into()),
            TokenKind::Eof,
        ]
    );
}

#[test]
fn spans_are_monotonically_non_decreasing() {
    let source = "module t;\nfunction main(): void { poke($D020, 0); }\n";
    let tokens = Lexer::new(source, 0).tokenize();
    for pair in tokens.windows(2) {
        assert!(
            pair[0].span.start.offset <= pair[1].span.start.offset,
            "token spans must not go backwards: {} then {}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn round_trip_preserves_raw_lexemes() {
    // Tokens that keep their raw text (numbers, identifiers, operators)
    // reproduce the source up to whitespace normalization.
    let source = "border = $D020 + 0b10 * count";
    let tokens = Lexer::new(source, 0).tokenize();
    let rendered: Vec<String> = tokens
        .iter()
        .take_while(|t| !t.is_eof())
        .map(|t| t.kind.to_string())
        .collect();
    assert_eq!(rendered.join(" "), source);
}

proptest! {
    #[test]
    fn tokenize_never_panics_and_ends_with_eof(source in ".{0,200}") {
        let tokens = Lexer::new(&source, 0).tokenize();
        prop_assert!(!tokens.is_empty());
        prop_assert_eq!(&tokens.last().unwrap().kind, &TokenKind::Eof);
        prop_assert_eq!(tokens.iter().filter(|t| t.is_eof()).count(), 1);
    }

    #[test]
    fn spans_never_go_backwards(source in "[a-z0-9+*/%<>=!&|@$ \n]{0,120}") {
        let tokens = Lexer::new(&source, 0).tokenize();
        for pair in tokens.windows(2) {
            prop_assert!(pair[0].span.start.offset <= pair[1].span.start.offset);
        }
    }
}
