//! Top-of-stack register cache.
//!
//! The data stack lives in memory below `rbx`. To avoid a store/load pair on
//! every operation the logical top cell may instead live in `rax`:
//!
//! - [`CacheState::Cached`]: TOS is in `rax` and *not* in memory; `[rbx]`
//!   holds the second cell.
//! - [`CacheState::Spilled`]: every cell is in memory; `[rbx]` is TOS and
//!   `rax` is dead.
//!
//! Every primitive encoder reads the state, emits code valid for it, and
//! leaves the tracker describing the state after its code.

use std::fmt;

use super::encoder::{Mem, X64Encoder};
use super::registers::{DSP, TOS};

/// Where the logical top-of-stack cell currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheState {
    Cached,
    #[default]
    Spilled,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheState::Cached => f.write_str("cached"),
            CacheState::Spilled => f.write_str("spilled"),
        }
    }
}

/// Tracks the cache state across the token stream.
#[derive(Debug, Default)]
pub struct RegisterCache {
    state: CacheState,
    spills: usize,
    fills: usize,
}

impl RegisterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    pub fn is_cached(&self) -> bool {
        self.state == CacheState::Cached
    }

    /// Record the state an encoder left behind.
    pub fn set(&mut self, state: CacheState) {
        self.state = state;
    }

    /// Write a cached TOS out to memory. No code when already spilled.
    pub fn spill(&mut self, enc: &mut X64Encoder) {
        if self.state == CacheState::Cached {
            push_rax(enc);
            self.spills += 1;
            self.state = CacheState::Spilled;
        }
    }

    /// Pop TOS from memory into `rax`. No code when already cached.
    pub fn fill(&mut self, enc: &mut X64Encoder) {
        if self.state == CacheState::Spilled {
            pop_rax(enc);
            self.fills += 1;
            self.state = CacheState::Cached;
        }
    }

    /// Free `rax` for a new value that will become the cached TOS.
    pub fn make_room(&mut self, enc: &mut X64Encoder) {
        self.spill(enc);
    }

    pub fn spills(&self) -> usize {
        self.spills
    }

    pub fn fills(&self) -> usize {
        self.fills
    }
}

/// `sub rbx, 8; mov [rbx], rax`
pub fn push_rax(enc: &mut X64Encoder) {
    enc.sub_reg_imm(DSP, 8);
    enc.mov_mem_reg(Mem::base(DSP), TOS);
}

/// `mov rax, [rbx]; add rbx, 8`
pub fn pop_rax(enc: &mut X64Encoder) {
    enc.mov_reg_mem(TOS, Mem::base(DSP));
    enc.add_reg_imm(DSP, 8);
}
