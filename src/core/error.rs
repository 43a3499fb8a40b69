// Error types for the fifthc backend, built with thiserror. CompileError covers the
// three failure families of the compiler: source problems (unresolved tokens,
// malformed literals and comments, definitions left open), control structure
// problems (stray or mismatched closing words, constructs left open, cache state
// disagreeing at a merge point) and environment problems (image writing and file
// I/O). Source-related variants carry the SourcePos of the offending token so the
// driver can print file:line:column diagnostics.

//! Error types for the fifthc compiler.

use std::path::PathBuf;

use thiserror::Error;

use super::code_buffer::CodeOffset;
use crate::frontend::SourcePos;
use crate::x64::cache::CacheState;

/// Main error type for compilation.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("{pos}: unresolved word `{word}`")]
    UnresolvedToken { word: String, pos: SourcePos },

    #[error("{pos}: `{word}` {reason}")]
    UnbalancedControl {
        word: String,
        pos: SourcePos,
        reason: &'static str,
    },

    #[error("{pos}: `{construct}` is never closed")]
    UnclosedControl {
        construct: &'static str,
        pos: SourcePos,
    },

    #[error("{pos}: definition of `{name}` is missing its closing `;`")]
    UnterminatedDefinition { name: String, pos: SourcePos },

    #[error("{pos}: `:` inside a definition or an open control structure")]
    NestedDefinition { pos: SourcePos },

    #[error("{pos}: `{word}` expects a name")]
    MissingName { word: &'static str, pos: SourcePos },

    #[error("{pos}: `{word}` is only valid inside a colon definition")]
    OutsideDefinition { word: String, pos: SourcePos },

    #[error("{pos}: `{word}` needs {needed} enclosing do loop(s)")]
    LoopWordOutsideLoop {
        word: &'static str,
        needed: usize,
        pos: SourcePos,
    },

    #[error("{pos}: comment is never closed with `)`")]
    UnterminatedComment { pos: SourcePos },

    #[error("{pos}: literal `{text}` does not fit in a 64-bit cell")]
    LiteralOutOfRange { text: String, pos: SourcePos },

    #[error("{pos}: forward reference to `{name}` was never resolved")]
    UnresolvedForwardCall { name: String, pos: SourcePos },

    #[error("{pos}: register cache is {found} at a merge point, expected {expected}")]
    CacheMismatch {
        pos: SourcePos,
        expected: CacheState,
        found: CacheState,
    },

    #[error("generated code is {size} bytes, limit is {limit}")]
    CodeTooLarge { size: usize, limit: usize },

    #[error("invalid options: {reason}")]
    InvalidOptions { reason: String },

    #[error("internal error: patch site {site} is outside the written code")]
    Patch { site: CodeOffset },

    #[error("image writer failed: {0}")]
    Image(#[from] object::write::Error),

    #[error("I/O error for file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    /// Source position of the error, when it stems from a token.
    pub fn pos(&self) -> Option<SourcePos> {
        match self {
            CompileError::UnresolvedToken { pos, .. }
            | CompileError::UnbalancedControl { pos, .. }
            | CompileError::UnclosedControl { pos, .. }
            | CompileError::UnterminatedDefinition { pos, .. }
            | CompileError::NestedDefinition { pos }
            | CompileError::MissingName { pos, .. }
            | CompileError::OutsideDefinition { pos, .. }
            | CompileError::LoopWordOutsideLoop { pos, .. }
            | CompileError::UnterminatedComment { pos }
            | CompileError::LiteralOutOfRange { pos, .. }
            | CompileError::UnresolvedForwardCall { pos, .. }
            | CompileError::CacheMismatch { pos, .. } => Some(*pos),
            _ => None,
        }
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;

/// Non-fatal diagnostic collected in best-effort mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub pos: SourcePos,
    pub message: String,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: warning: {}", self.pos, self.message)
    }
}
