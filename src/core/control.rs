//! Control-flow fixup stack.
//!
//! Opening words push a frame, closing words pop it in strict LIFO order.
//! Forward branches store the patch site of their rel32 placeholder; backward
//! branches store the already known target. Each frame also keeps the source
//! position of its opening word and the register cache state at its branch
//! point so the closing word can verify the merge.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;

use crate::core::code_buffer::CodeOffset;
use crate::core::error::{CompileError, CompileResult};
use crate::frontend::SourcePos;
use crate::x64::cache::CacheState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// `if`: the `jz` placeholder to patch at `else` or `then`.
    If { site: CodeOffset },
    /// `else`: the `jmp` placeholder to patch at `then`.
    Else { site: CodeOffset },
    /// `begin`: backward target of `until`, `again` and `repeat`.
    Begin { target: CodeOffset },
    /// `begin ... while`: the loop head plus the exit `jz` placeholder.
    While { target: CodeOffset, site: CodeOffset },
    /// `do`: start of the loop body.
    Do { body: CodeOffset },
}

impl FrameKind {
    /// Word that opened the frame.
    pub fn opener(self) -> &'static str {
        match self {
            FrameKind::If { .. } => "if",
            FrameKind::Else { .. } => "else",
            FrameKind::Begin { .. } => "begin",
            FrameKind::While { .. } => "while",
            FrameKind::Do { .. } => "do",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub kind: FrameKind,
    pub pos: SourcePos,
    /// Cache state the code at the branch point left behind.
    pub state: CacheState,
}

pub struct ControlStack<'arena> {
    frames: BumpVec<'arena, Frame>,
}

impl<'arena> ControlStack<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            frames: BumpVec::new_in(arena),
        }
    }

    pub fn push(&mut self, kind: FrameKind, pos: SourcePos, state: CacheState) {
        self.frames.push(Frame { kind, pos, state });
    }

    /// Pop the innermost frame for the closing word `word`. `select` picks
    /// the data the closer needs out of the frames it accepts and returns
    /// `None` for any other kind.
    pub fn pop_for<T>(
        &mut self,
        word: &str,
        pos: SourcePos,
        select: impl Fn(FrameKind) -> Option<T>,
    ) -> CompileResult<(T, Frame)> {
        let Some(&frame) = self.frames.last() else {
            return Err(CompileError::UnbalancedControl {
                word: word.to_string(),
                pos,
                reason: "has no matching opening word",
            });
        };
        let Some(selected) = select(frame.kind) else {
            return Err(CompileError::UnbalancedControl {
                word: word.to_string(),
                pos,
                reason: "does not match the innermost open construct",
            });
        };
        self.frames.pop();
        Ok((selected, frame))
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of open `do` loops, each holding two hardware stack cells.
    pub fn open_loops(&self) -> usize {
        self.frames
            .iter()
            .filter(|frame| matches!(frame.kind, FrameKind::Do { .. }))
            .count()
    }

    /// Fail on the innermost frame left open, if any.
    pub fn ensure_closed(&self) -> CompileResult<()> {
        match self.frames.last() {
            Some(frame) => Err(CompileError::UnclosedControl {
                construct: frame.kind.opener(),
                pos: frame.pos,
            }),
            None => Ok(()),
        }
    }
}
