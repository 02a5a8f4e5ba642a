//! Lexer for cell formulas using logos

use logos::Logos;

use crate::workbook::CellRef;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Operators (longer first)
    #[token("<>")]
    NotEqual,
    #[token("<=")]
    LessOrEqual,
    #[token(">=")]
    GreaterOrEqual,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("=")]
    Equals,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,

    // Delimiters
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("!")]
    Bang,

    // Cell addresses win over identifiers of the same length (`A1`, `N9`)
    #[regex(r"\$?[A-Za-z]{1,3}\$?[0-9]+", |lex| CellRef::parse(lex.slice()).ok(), priority = 3)]
    Cell(CellRef),

    #[regex(r"[A-Za-z_][A-Za-z0-9_.]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    // Quoted sheet name, `''` escapes a quote
    #[regex(r"'([^']|'')+'", |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].replace("''", "'")
    })]
    SheetName(String),

    #[regex(r#""([^"]|"")*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].replace("\"\"", "\"")
    })]
    Str(String),

    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),
}

/// Lex a formula into tokens with spans, failing on the first unrecognised input
pub fn lex(input: &str) -> Result<Vec<(Token, Span)>, Span> {
    let mut tokens = Vec::new();
    for (tok, span) in Token::lexer(input).spanned() {
        match tok {
            Ok(t) => tokens.push((t, span)),
            Err(()) => return Err(span),
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        lex(input).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_cells_and_functions() {
        assert_eq!(
            kinds("SUM(N12:N40)"),
            vec![
                Token::Ident("SUM".to_string()),
                Token::ParenOpen,
                Token::Cell(CellRef::new(12, 14)),
                Token::Colon,
                Token::Cell(CellRef::new(40, 14)),
                Token::ParenClose,
            ]
        );
    }

    #[test]
    fn test_quoted_sheet_with_escape() {
        assert_eq!(
            kinds("'Bob''s (1)'!N9"),
            vec![
                Token::SheetName("Bob's (1)".to_string()),
                Token::Bang,
                Token::Cell(CellRef::new(9, 14)),
            ]
        );
    }

    #[test]
    fn test_comparison_operators() {
        assert_eq!(
            kinds("<> <= >= < > ="),
            vec![
                Token::NotEqual,
                Token::LessOrEqual,
                Token::GreaterOrEqual,
                Token::Less,
                Token::Greater,
                Token::Equals,
            ]
        );
    }

    #[test]
    fn test_numbers_and_strings() {
        assert_eq!(
            kinds(r#"0.42 "a ""b""" 55"#),
            vec![
                Token::Number(0.42),
                Token::Str("a \"b\"".to_string()),
                Token::Number(55.0),
            ]
        );
    }

    #[test]
    fn test_absolute_markers_dropped() {
        assert_eq!(kinds("$K$9"), vec![Token::Cell(CellRef::new(9, 11))]);
    }

    #[test]
    fn test_unknown_character_reports_span() {
        assert_eq!(lex("A1 # 2").unwrap_err(), 3..4);
    }
}
