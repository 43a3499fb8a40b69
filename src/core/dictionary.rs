//! Word dictionary.
//!
//! An append-only list of user definitions in the session arena. Lookup scans
//! newest first so a redefinition shadows older entries for code compiled
//! after it, while calls already compiled keep their targets.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use hashbrown::HashMap;

use crate::core::code_buffer::CodeOffset;
use crate::frontend::SourcePos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Colon definition starting at this code offset.
    Colon { offset: CodeOffset },
    /// Variable cell at this absolute address.
    Variable { address: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct Entry<'arena> {
    pub name: &'arena str,
    pub kind: EntryKind,
    pub defined_at: SourcePos,
    /// Smudged while its definition is still open.
    pub hidden: bool,
}

/// Index of an entry, stable for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryId(usize);

pub struct Dictionary<'arena> {
    entries: BumpVec<'arena, Entry<'arena>>,
}

impl<'arena> Dictionary<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            entries: BumpVec::new_in(arena),
        }
    }

    pub fn define(
        &mut self,
        name: &'arena str,
        kind: EntryKind,
        defined_at: SourcePos,
        hidden: bool,
    ) -> EntryId {
        self.entries.push(Entry {
            name,
            kind,
            defined_at,
            hidden,
        });
        EntryId(self.entries.len() - 1)
    }

    /// Make a smudged entry visible.
    pub fn reveal(&mut self, id: EntryId) {
        if let Some(entry) = self.entries.get_mut(id.0) {
            entry.hidden = false;
        }
    }

    /// Newest visible entry with this name, compared ASCII case-insensitively.
    pub fn find(&self, name: &str) -> Option<&Entry<'arena>> {
        self.entries
            .iter()
            .rev()
            .find(|entry| !entry.hidden && entry.name.eq_ignore_ascii_case(name))
    }

    /// `(offset, name)` for every colon definition, for listings.
    pub fn code_labels(&self) -> Vec<(CodeOffset, &'arena str)> {
        self.entries
            .iter()
            .filter_map(|entry| match entry.kind {
                EntryKind::Colon { offset } => Some((offset, entry.name)),
                EntryKind::Variable { .. } => None,
            })
            .collect()
    }
}

/// A call emitted before its target was compiled.
#[derive(Debug, Clone, Copy)]
pub struct PendingCall<'arena> {
    pub name: &'arena str,
    pub site: CodeOffset,
    pub pos: SourcePos,
}

/// Names whose definitions appear later in the file, found by the prescan,
/// and the calls waiting on them.
pub struct ForwardRefs<'arena> {
    /// Lowercased name to the token indices of its `:` headers, ascending.
    headers: HashMap<String, Vec<usize>>,
    pending: BumpVec<'arena, PendingCall<'arena>>,
}

impl<'arena> ForwardRefs<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            headers: HashMap::new(),
            pending: BumpVec::new_in(arena),
        }
    }

    pub fn add_header(&mut self, name: &str, token_index: usize) {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(token_index);
    }

    /// Whether `name` has a definition header after `token_index`.
    pub fn defined_after(&self, name: &str, token_index: usize) -> bool {
        self.headers
            .get(name.to_ascii_lowercase().as_str())
            .is_some_and(|indices| indices.iter().any(|&idx| idx > token_index))
    }

    pub fn add_pending(&mut self, call: PendingCall<'arena>) {
        self.pending.push(call);
    }

    /// Remove and return the patch sites of every pending call to `name`.
    pub fn take_pending(&mut self, name: &str) -> Vec<CodeOffset> {
        let mut sites = Vec::new();
        self.pending.retain(|call| {
            if call.name.eq_ignore_ascii_case(name) {
                sites.push(call.site);
                false
            } else {
                true
            }
        });
        sites
    }

    pub fn first_pending(&self) -> Option<&PendingCall<'arena>> {
        self.pending.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(column: u32) -> SourcePos {
        SourcePos::new(1, column)
    }

    #[test]
    fn test_newest_definition_wins() {
        let arena = Bump::new();
        let mut dict = Dictionary::new(&arena);
        dict.define("sq", EntryKind::Colon { offset: CodeOffset::new(10) }, pos(1), false);
        dict.define("SQ", EntryKind::Colon { offset: CodeOffset::new(40) }, pos(20), false);

        let entry = dict.find("Sq").unwrap();
        assert_eq!(entry.kind, EntryKind::Colon { offset: CodeOffset::new(40) });
        assert_eq!(dict.code_labels().len(), 2);
    }

    #[test]
    fn test_hidden_entries_are_skipped() {
        let arena = Bump::new();
        let mut dict = Dictionary::new(&arena);
        dict.define("f", EntryKind::Colon { offset: CodeOffset::new(0) }, pos(1), false);
        let id = dict.define("f", EntryKind::Colon { offset: CodeOffset::new(8) }, pos(9), true);

        // The open redefinition still sees the old one.
        assert_eq!(
            dict.find("f").unwrap().kind,
            EntryKind::Colon { offset: CodeOffset::new(0) }
        );
        dict.reveal(id);
        assert_eq!(
            dict.find("f").unwrap().kind,
            EntryKind::Colon { offset: CodeOffset::new(8) }
        );
        assert!(dict.find("g").is_none());
    }

    #[test]
    fn test_code_labels_skip_variables() {
        let arena = Bump::new();
        let mut dict = Dictionary::new(&arena);
        dict.define("x", EntryKind::Variable { address: 0x610000 }, pos(1), false);
        dict.define("f", EntryKind::Colon { offset: CodeOffset::new(4) }, pos(12), false);
        assert_eq!(dict.code_labels(), vec![(CodeOffset::new(4), "f")]);
    }

    #[test]
    fn test_forward_refs() {
        let arena = Bump::new();
        let mut refs = ForwardRefs::new(&arena);
        refs.add_header("Later", 7);
        assert!(refs.defined_after("later", 2));
        assert!(!refs.defined_after("later", 7));
        assert!(!refs.defined_after("other", 0));

        refs.add_pending(PendingCall {
            name: "later",
            site: CodeOffset::new(3),
            pos: pos(5),
        });
        refs.add_pending(PendingCall {
            name: "other",
            site: CodeOffset::new(9),
            pos: pos(9),
        });
        assert_eq!(refs.take_pending("LATER"), vec![CodeOffset::new(3)]);
        assert!(refs.take_pending("later").is_empty());
        assert_eq!(refs.first_pending().map(|c| c.name), Some("other"));
    }
}
