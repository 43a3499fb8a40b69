// This module provides the arena-based compilation session for fifthc using the bumpalo
// crate. CompilationSession owns nothing but a borrow of the arena; everything allocated
// through it (interned word names, the dictionary and control stack vectors built with
// bumpalo collections) shares the session lifetime, which spans exactly one call to
// compile(). It also accumulates SessionStats: tokens seen, literals, primitive usage
// broken down by name, calls, register cache spills and fills, fixups patched, words and
// variables defined and the final code size. The stats are printed by `fifthc --stats`
// and returned in every CompiledProgram.

//! Arena-based compilation session management.

use std::cell::RefCell;
use std::fmt;

use bumpalo::Bump;
use hashbrown::{HashMap, HashSet};

/// Arena-based compilation session.
///
/// All arena data has the session lifetime; the session itself is created
/// once per compilation and dropped with it.
pub struct CompilationSession<'arena> {
    arena: &'arena Bump,

    /// Session statistics.
    stats: RefCell<SessionStats>,

    /// Interned word names.
    interned_strings: RefCell<HashSet<&'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashSet::new()),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned: &'arena str = self.arena.alloc_str(s);
        strings.insert(interned);
        interned
    }

    pub fn record_token(&self) {
        self.stats.borrow_mut().tokens += 1;
    }

    pub fn record_literal(&self) {
        self.stats.borrow_mut().literals += 1;
    }

    pub fn record_primitive(&self, name: &'static str) {
        let mut stats = self.stats.borrow_mut();
        stats.primitives += 1;
        *stats.primitive_counts.entry(name).or_insert(0) += 1;
    }

    pub fn record_call(&self) {
        self.stats.borrow_mut().calls += 1;
    }

    pub fn record_fixup_patched(&self) {
        self.stats.borrow_mut().fixups_patched += 1;
    }

    pub fn record_word_defined(&self) {
        self.stats.borrow_mut().words_defined += 1;
    }

    pub fn record_variable_defined(&self) {
        self.stats.borrow_mut().variables_defined += 1;
    }

    pub fn record_unresolved(&self) {
        self.stats.borrow_mut().unresolved += 1;
    }

    /// Store the final register cache counters and code size.
    pub fn record_finished(&self, spills: usize, fills: usize, code_size: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.spills = spills;
        stats.fills = fills;
        stats.code_size = code_size;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Tokens compiled, comments excluded.
    pub tokens: usize,

    pub literals: usize,

    /// Primitive words compiled inline.
    pub primitives: usize,

    /// Count of each primitive, keyed by its canonical name.
    pub primitive_counts: HashMap<&'static str, usize>,

    /// Calls to colon definitions, including `recurse`.
    pub calls: usize,

    /// Register cache spills and fills emitted.
    pub spills: usize,
    pub fills: usize,

    /// Forward jumps and calls resolved by patching.
    pub fixups_patched: usize,

    pub words_defined: usize,
    pub variables_defined: usize,

    /// Tokens skipped in best-effort mode.
    pub unresolved: usize,

    /// Generated code size (bytes), headers excluded.
    pub code_size: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Tokens compiled: {}", self.tokens)?;
        writeln!(f, "  Literals: {}", self.literals)?;
        writeln!(f, "  Primitives: {}", self.primitives)?;
        writeln!(f, "  Calls: {}", self.calls)?;
        writeln!(f, "  Words defined: {}", self.words_defined)?;
        writeln!(f, "  Variables defined: {}", self.variables_defined)?;
        writeln!(f, "  Fixups patched: {}", self.fixups_patched)?;
        writeln!(f, "  Spills: {}", self.spills)?;
        writeln!(f, "  Fills: {}", self.fills)?;
        if self.unresolved > 0 {
            writeln!(f, "  Unresolved tokens skipped: {}", self.unresolved)?;
        }
        writeln!(f, "  Total code size: {} bytes", self.code_size)?;

        if !self.primitive_counts.is_empty() {
            writeln!(f, "  Primitive breakdown:")?;
            let mut sorted: Vec<_> = self.primitive_counts.iter().collect();
            sorted.sort_by(|(a_name, a_count), (b_name, b_count)| {
                b_count.cmp(a_count).then(a_name.cmp(b_name))
            });

            for (name, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", name, count)?;
            }
        }

        Ok(())
    }
}
