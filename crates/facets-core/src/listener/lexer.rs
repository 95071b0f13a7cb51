//! Tokenizer for listener patterns

use crate::error::{FacetError, FacetResult};
use logos::Logos;

/// Listener pattern tokens
#[derive(Logos, Debug, Clone, PartialEq)]
pub(crate) enum Token {
    // Whitespace (skip)
    #[regex(r"[ \t\r\n]+", logos::skip)]
    Whitespace,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Name(String),

    #[token(".")]
    Dot,

    #[token(":")]
    Colon,

    #[token(",")]
    Comma,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("?")]
    Question,

    #[token("*")]
    Star,
}

/// Split `text` into tokens paired with their starting column
pub(crate) fn tokenize(text: &str) -> FacetResult<Vec<(Token, usize)>> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(text);
    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span().start)),
            Err(()) => {
                return Err(FacetError::PatternSyntax {
                    text: text.to_string(),
                    column: lexer.span().start,
                    message: format!("Unexpected character '{}'", lexer.slice()),
                })
            }
        }
    }
    Ok(tokens)
}
