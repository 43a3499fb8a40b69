// lexer.rs - tokenizer for Fifth source files
//
// Splits a flat source file into whitespace-delimited tokens, line by line,
// remembering the 1-based line and column of each token. Comments are dropped
// here: `\` skips to the end of the line and `(` skips up to the next `)`,
// which may sit on a later line. Classification of a token (definition
// markers, control words, literals, everything else) is a separate pure step
// so the prescan and the code-emitting pass agree on it.

use std::fmt;

use crate::core::error::{CompileError, CompileResult};

/// 1-based position of a token in the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A raw token borrowed from the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'src> {
    pub text: &'src str,
    pub pos: SourcePos,
}

// ============================================================================
// TOKEN CLASSES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Colon,     // :
    Semicolon, // ;
    Variable,  // variable NAME
    If,
    Else,
    Then,
    Begin,
    Until,
    Again,
    While,
    Repeat,
    Do,
    Loop,
    PlusLoop,       // +loop
    LoopIndex,      // i
    OuterLoopIndex, // j
    Unloop,
    Exit,
    Recurse,
    Number(NumberLiteral),
    Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberLiteral {
    Value(i64),
    /// Looks like a number but does not fit in a cell.
    OutOfRange,
}

/// Classify a token. Keywords match case-insensitively.
pub fn classify(text: &str) -> TokenClass {
    const KEYWORDS: &[(&str, TokenClass)] = &[
        (":", TokenClass::Colon),
        (";", TokenClass::Semicolon),
        ("variable", TokenClass::Variable),
        ("if", TokenClass::If),
        ("else", TokenClass::Else),
        ("then", TokenClass::Then),
        ("begin", TokenClass::Begin),
        ("until", TokenClass::Until),
        ("again", TokenClass::Again),
        ("while", TokenClass::While),
        ("repeat", TokenClass::Repeat),
        ("do", TokenClass::Do),
        ("loop", TokenClass::Loop),
        ("+loop", TokenClass::PlusLoop),
        ("i", TokenClass::LoopIndex),
        ("j", TokenClass::OuterLoopIndex),
        ("unloop", TokenClass::Unloop),
        ("exit", TokenClass::Exit),
        ("recurse", TokenClass::Recurse),
    ];

    if let Some((_, class)) = KEYWORDS
        .iter()
        .find(|(keyword, _)| keyword.eq_ignore_ascii_case(text))
    {
        return *class;
    }

    match parse_number(text) {
        Some(literal) => TokenClass::Number(literal),
        None => TokenClass::Word,
    }
}

/// Parse a signed decimal (or `0x` hexadecimal) literal.
///
/// Returns `None` when the text is not shaped like a number at all, so that
/// words such as `1+` or `-` fall through to the dictionary.
pub fn parse_number(text: &str) -> Option<NumberLiteral> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let (radix, digits) = match body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
    {
        Some(hex) => (16, hex),
        None => (10, body),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    // Parse the magnitude wide so that i64::MIN round-trips.
    let magnitude = match i128::from_str_radix(digits, radix) {
        Ok(value) => value,
        Err(_) => return Some(NumberLiteral::OutOfRange),
    };
    let value = if negative { -magnitude } else { magnitude };
    Some(match i64::try_from(value) {
        Ok(value) => NumberLiteral::Value(value),
        Err(_) => NumberLiteral::OutOfRange,
    })
}

// ============================================================================
// LEXER
// ============================================================================

pub struct Lexer<'src> {
    source: &'src str,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self { source }
    }

    pub fn tokenize(&self) -> CompileResult<Vec<Token<'src>>> {
        let mut tokens = Vec::new();
        // Start of an open `( ...` comment, if one spans lines.
        let mut open_comment: Option<SourcePos> = None;

        for (line_idx, line) in self.source.lines().enumerate() {
            let line_no = line_idx as u32 + 1;
            let mut rest = line;
            let mut consumed = 0usize;

            loop {
                if open_comment.is_some() {
                    match rest.find(')') {
                        Some(close) => {
                            open_comment = None;
                            consumed += close + 1;
                            rest = &rest[close + 1..];
                        }
                        None => break,
                    }
                }

                let trimmed = rest.trim_start();
                consumed += rest.len() - trimmed.len();
                rest = trimmed;
                if rest.is_empty() {
                    break;
                }

                let len = rest.find(char::is_whitespace).unwrap_or(rest.len());
                let text = &rest[..len];
                let column = line[..consumed].chars().count() as u32 + 1;
                let pos = SourcePos::new(line_no, column);

                consumed += len;
                rest = &rest[len..];

                match text {
                    "\\" => break,
                    "(" => open_comment = Some(pos),
                    _ => tokens.push(Token { text, pos }),
                }
            }
        }

        if let Some(pos) = open_comment {
            return Err(CompileError::UnterminatedComment { pos });
        }

        Ok(tokens)
    }
}
