use std::ops::Range;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::SourceSpan;

// Insertion order is kept so reference lists read in the order the
// assembler encountered them.
type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Location within source
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: usize,
    len: usize,
}

impl Span {
    pub fn new(offs: usize, len: usize) -> Self {
        Span { offs, len }
    }

    pub fn dummy() -> Self {
        Span { offs: 0, len: 0 }
    }

    pub fn offs(&self) -> usize {
        self.offs
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> usize {
        self.offs + self.len
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.offs()..value.end()
    }
}

/// Attempt to define a symbol that already has a defining address.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DuplicateSymbol;

/// Reference to a symbol with no definition anywhere in the program.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct UndefinedSymbol;

/// A defined symbol: where it lives and every address that refers to it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SymbolEntry {
    pub addr: u16,
    pub refs: Vec<u16>,
}

/// Symbol table of label -> defining address, append-only for the duration
/// of one assembly. Names are case sensitive.
#[derive(Default)]
pub struct SymbolTable {
    entries: FxMap<String, SymbolEntry>,
    longest: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            entries: IndexMap::with_hasher(FxBuildHasher::default()),
            longest: 0,
        }
    }

    /// Record a definition. The first definition of a name wins; a collision
    /// reports [`DuplicateSymbol`] and leaves the table untouched.
    pub fn define(&mut self, name: &str, addr: u16) -> Result<(), DuplicateSymbol> {
        if self.entries.contains_key(name) {
            return Err(DuplicateSymbol);
        }
        self.longest = self.longest.max(name.len());
        self.entries
            .insert(name.to_string(), SymbolEntry { addr, refs: Vec::new() });
        Ok(())
    }

    /// Look up a name on behalf of the instruction at `referenced_at`.
    ///
    /// A successful lookup appends the referencing address to the entry so the
    /// listing can report every use site in encounter order. A failed lookup
    /// has no side effects.
    pub fn resolve(&mut self, name: &str, referenced_at: u16) -> Result<u16, UndefinedSymbol> {
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.refs.push(referenced_at);
                Ok(entry.addr)
            }
            None => Err(UndefinedSymbol),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SymbolEntry> {
        self.entries.get(name)
    }

    /// All entries in case-sensitive ordinal name order, for listing and map
    /// output.
    pub fn entries_sorted_by_name(&self) -> Vec<(&str, &SymbolEntry)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Length of the longest defined name, used to size listing columns.
    pub fn longest_name(&self) -> usize {
        self.longest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
