//! Source front end: tokenizer and token classification.

pub mod lexer;

pub use lexer::{classify, parse_number, Lexer, NumberLiteral, SourcePos, Token, TokenClass};
