//! A narrow term-construction interface standing in for the (out-of-scope)
//! surface-syntax parser. An external tokenizer/reader would drive this same
//! interface; tests and the embedding API's "evaluate a single query
//! expression" entry point use it directly.

use std::collections::HashMap;

use crate::engine::atoms::AtomTable;
use crate::engine::cell::Cell;
use crate::engine::term::{Term, TermBuf};

/// Builds one [`Term`], resolving repeated variable names to the same local
/// slot and counting how many distinct variables were introduced.
#[derive(Debug, Default)]
pub struct TermBuilder {
    buf: TermBuf,
    vars: HashMap<String, u32>,
    next_slot: u32,
}

impl TermBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { buf: TermBuf::new(), vars: HashMap::new(), next_slot: 0 }
    }

    /// A named variable (`_` and `_`-prefixed names always get a fresh slot,
    /// matching ISO's "anonymous variable" convention, rather than sharing
    /// one with an identically-named variable elsewhere in the term).
    pub fn var(&mut self, name: &str) -> usize {
        let slot = if name == "_" || name.starts_with('_') {
            let slot = self.next_slot;
            self.next_slot += 1;
            slot
        } else if let Some(&existing) = self.vars.get(name) {
            existing
        } else {
            let slot = self.next_slot;
            self.next_slot += 1;
            self.vars.insert(name.to_string(), slot);
            slot
        };
        self.buf.push_leaf(Cell::var(slot))
    }

    pub fn atom(&mut self, atoms: &mut AtomTable, name: &str) -> usize {
        let offset = atoms.intern(name);
        self.buf.push_leaf(Cell::atom(offset))
    }

    pub fn int(&mut self, n: i64) -> usize {
        self.buf.push_leaf(Cell::int(n))
    }

    pub fn float(&mut self, f: f64) -> usize {
        self.buf.push_leaf(Cell::float(f))
    }

    pub fn string(&mut self, s: &str) -> usize {
        self.buf.push_leaf(Cell::string(s))
    }

    /// Begin a compound term of `arity` children; call the matching
    /// `close_compound` once all of them have been pushed.
    pub fn open_compound(&mut self, atoms: &mut AtomTable, name: &str, arity: u8) -> usize {
        let offset = atoms.intern(name);
        self.buf.open_functor(Cell::functor(offset, arity))
    }

    pub fn close_compound(&mut self, mark: usize) {
        self.buf.close_functor(mark);
    }

    #[must_use]
    pub fn nbr_vars(&self) -> u32 {
        self.next_slot
    }

    #[must_use]
    pub fn finish(self) -> Term {
        let nbr_vars = self.nbr_vars();
        self.buf.finish(nbr_vars)
    }
}
